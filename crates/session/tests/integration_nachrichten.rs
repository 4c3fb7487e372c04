//! Integration-Tests: zwei Sitzungen tauschen verschluesselte Nachrichten aus

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;

use fluesterpost_core::{PeerAddress, PeerRecord};
use fluesterpost_crypto::asymmetric::generate_keypair;
use fluesterpost_crypto::KeyPair;
use fluesterpost_observability::P2pMetrics;
use fluesterpost_p2p::{P2pConfig, P2pError};
use fluesterpost_protocol::{FramingError, PayloadKind};
use fluesterpost_session::{
    BinaryKind, DeliveredMessage, PassthroughCodec, SessionError, SessionOrchestrator,
    StaticDirectory,
};

const WARTEZEIT: Duration = Duration::from_secs(10);

fn schluessel(name: &str) -> KeyPair {
    static ALICE: OnceLock<KeyPair> = OnceLock::new();
    static BOB: OnceLock<KeyPair> = OnceLock::new();
    let zelle = if name == "alice" { &ALICE } else { &BOB };
    zelle.get_or_init(|| generate_keypair().unwrap()).clone()
}

fn config() -> P2pConfig {
    P2pConfig {
        listen_host: "127.0.0.1".into(),
        ..P2pConfig::default()
    }
}

struct Knoten {
    session: SessionOrchestrator,
    rx: mpsc::Receiver<DeliveredMessage>,
    metriken: P2pMetrics,
}

impl Knoten {
    async fn empfangen(&mut self) -> DeliveredMessage {
        tokio::time::timeout(WARTEZEIT, self.rx.recv())
            .await
            .expect("Keine Nachricht zugestellt")
            .expect("Zustell-Queue geschlossen")
    }
}

/// Startet einen Knoten und traegt ihn im gemeinsamen Verzeichnis ein
async fn knoten(name: &str, verzeichnis: &Arc<StaticDirectory>) -> Knoten {
    knoten_mit(name, verzeichnis, config()).await
}

async fn knoten_mit(name: &str, verzeichnis: &Arc<StaticDirectory>, config: P2pConfig) -> Knoten {
    let kp = schluessel(name);
    let pem = kp.public_key_pem().unwrap();
    let metriken = P2pMetrics::neu().unwrap();
    let (session, rx) = SessionOrchestrator::neu(
        config,
        name,
        kp,
        verzeichnis.clone(),
        Arc::new(PassthroughCodec),
        Some(metriken.clone()),
    )
    .unwrap();

    let addr = session.start().await.unwrap();
    verzeichnis.eintragen(PeerRecord {
        username: name.into(),
        address: PeerAddress::from(addr),
        public_key_pem: pem,
    });

    Knoten {
        session,
        rx,
        metriken,
    }
}

async fn paar() -> (Knoten, Knoten, Arc<StaticDirectory>) {
    let verzeichnis = Arc::new(StaticDirectory::neu());
    let alice = knoten("alice", &verzeichnis).await;
    let bob = knoten("bob", &verzeichnis).await;
    (alice, bob, verzeichnis)
}

async fn warten_bis(mut bedingung: impl FnMut() -> bool) {
    let start = tokio::time::Instant::now();
    while !bedingung() {
        assert!(start.elapsed() < WARTEZEIT, "Bedingung nicht rechtzeitig erfuellt");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn alice_sendet_hello_an_bob() {
    let (alice, mut bob, _dir) = paar().await;

    alice.session.send_text("bob", "hello").await.unwrap();

    let nachricht = bob.empfangen().await;
    assert_eq!(nachricht.sender(), "alice");
    assert_eq!(nachricht.kind(), PayloadKind::ChatText);
    assert_eq!(
        nachricht,
        DeliveredMessage::Text {
            sender: "alice".into(),
            text: "hello".into()
        }
    );
    assert_eq!(
        bob.metriken
            .nachrichten_zugestellt
            .with_label_values(&["chat_text"])
            .get(),
        1
    );
}

#[tokio::test]
async fn antwort_ueber_eingehende_verbindung() {
    let (mut alice, mut bob, _dir) = paar().await;

    alice.session.send_text("bob", "ping").await.unwrap();
    bob.empfangen().await;

    // Bob nutzt die bestehende (eingehende) Verbindung
    bob.session.send_text("alice", "pong").await.unwrap();
    let antwort = alice.empfangen().await;
    assert_eq!(
        antwort,
        DeliveredMessage::Text {
            sender: "bob".into(),
            text: "pong".into()
        }
    );
    assert_eq!(alice.session.manager().connected_peers(), vec!["bob".to_string()]);
}

#[tokio::test]
async fn grosses_steg_bild_wird_vollstaendig_zugestellt() {
    let (alice, mut bob, _dir) = paar().await;

    let bild: Vec<u8> = (0..5 * 1024 * 1024).map(|i| (i % 251) as u8).collect();
    alice
        .session
        .send_steg_image("bob", &bild, "treffen um 8")
        .await
        .unwrap();

    match bob.empfangen().await {
        DeliveredMessage::StegImage {
            sender,
            image,
            hidden_message,
            extracted,
        } => {
            assert_eq!(sender, "alice");
            assert_eq!(image.len(), 5 * 1024 * 1024);
            assert_eq!(image, bild);
            assert_eq!(hidden_message, "treffen um 8");
            assert_eq!(extracted, None);
        }
        andere => panic!("StegImage erwartet, erhalten: {:?}", andere),
    }
}

#[tokio::test]
async fn audio_wird_zugestellt() {
    let (alice, mut bob, _dir) = paar().await;

    let audio = vec![7u8; 48_000];
    alice
        .session
        .send_binary("bob", &audio, BinaryKind::Audio)
        .await
        .unwrap();

    let nachricht = bob.empfangen().await;
    assert_eq!(nachricht.kind(), PayloadKind::Audio);
    assert_eq!(
        nachricht,
        DeliveredMessage::Audio {
            sender: "alice".into(),
            audio
        }
    );
}

#[tokio::test]
async fn manipuliertes_envelope_wird_verworfen_verbindung_bleibt() {
    let (alice, mut bob, _dir) = paar().await;

    alice.session.send_text("bob", "erste").await.unwrap();
    bob.empfangen().await;

    // Roher Frame am Orchestrator vorbei: gueltiges JSON, falsche Kryptografie
    let muell = br#"{"type":"chat_message","encrypted_key":"AAAA","encrypted_message":"AAAA","nonce":"AAAA","tag":"AAAA"}"#;
    alice
        .session
        .manager()
        .send("bob", Bytes::from_static(muell))
        .await
        .unwrap();
    alice
        .session
        .manager()
        .send("bob", Bytes::from_static(b"kein json"))
        .await
        .unwrap();

    alice.session.send_text("bob", "zweite").await.unwrap();

    let nachricht = bob.empfangen().await;
    assert_eq!(
        nachricht,
        DeliveredMessage::Text {
            sender: "alice".into(),
            text: "zweite".into()
        }
    );
    assert_eq!(bob.metriken.entschluesselung_fehlgeschlagen.get(), 2);
    assert!(bob.session.manager().is_connected("alice"));
}

#[tokio::test]
async fn zu_grosses_envelope_laesst_verbindung_bestehen() {
    let verzeichnis = Arc::new(StaticDirectory::neu());
    let alice = knoten_mit(
        "alice",
        &verzeichnis,
        P2pConfig {
            max_frame_size: 64 * 1024,
            ..config()
        },
    )
    .await;
    let mut bob = knoten("bob", &verzeichnis).await;

    alice.session.send_text("bob", "hallo").await.unwrap();
    bob.empfangen().await;
    let vorher = alice.session.manager().connection("bob").unwrap().id();

    let ergebnis = alice
        .session
        .send_binary("bob", &vec![0u8; 128 * 1024], BinaryKind::Audio)
        .await;
    assert!(matches!(
        ergebnis,
        Err(SessionError::Transport(P2pError::Framing(
            FramingError::NachrichtZuGross { .. }
        )))
    ));

    // Kein Neuaufbau, keine ersetzte Verbindung
    assert_eq!(alice.session.manager().connection("bob").unwrap().id(), vorher);
    assert_eq!(alice.metriken.verbindungen_ersetzt.get(), 0);
    assert!(bob.session.manager().is_connected("alice"));

    alice.session.send_text("bob", "danach").await.unwrap();
    assert_eq!(
        bob.empfangen().await,
        DeliveredMessage::Text {
            sender: "alice".into(),
            text: "danach".into()
        }
    );
}

#[tokio::test]
async fn online_benachrichtigung() {
    let (alice, mut bob, _dir) = paar().await;

    alice.session.send_text("bob", "hallo").await.unwrap();
    bob.empfangen().await;

    let erreicht = alice.session.announce_presence().await.unwrap();
    assert_eq!(erreicht, 1);

    let nachricht = bob.empfangen().await;
    assert_eq!(
        nachricht,
        DeliveredMessage::PresenceRefresh {
            sender: "alice".into()
        }
    );
}

#[tokio::test]
async fn online_freunde_verbinden() {
    let (alice, bob, _dir) = paar().await;

    let verbunden = alice.session.connect_online_friends().await.unwrap();
    assert_eq!(verbunden, vec!["bob".to_string()]);

    // Zweiter Aufruf: schon verbunden
    let verbunden = alice.session.connect_online_friends().await.unwrap();
    assert!(verbunden.is_empty());

    warten_bis(|| bob.session.manager().is_connected("alice")).await;
}

#[tokio::test]
async fn unbekannter_empfaenger() {
    let (alice, _bob, dir) = paar().await;

    let ergebnis = alice.session.send_text("carol", "hallo").await;
    assert!(matches!(
        ergebnis,
        Err(SessionError::PeerUnreachable { peer, .. }) if peer == "carol"
    ));

    // Bekannt, aber niemand hoert auf dem Port
    let frei = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = frei.local_addr().unwrap().port();
    drop(frei);
    dir.eintragen(PeerRecord {
        username: "carol".into(),
        address: PeerAddress::new("127.0.0.1", port),
        public_key_pem: schluessel("bob").public_key_pem().unwrap(),
    });
    let ergebnis = alice.session.send_text("carol", "hallo").await;
    assert!(matches!(ergebnis, Err(SessionError::PeerUnreachable { .. })));
}

#[tokio::test]
async fn neu_verbinden_nachdem_peer_getrennt_hat() {
    let (alice, mut bob, _dir) = paar().await;

    alice.session.send_text("bob", "eins").await.unwrap();
    bob.empfangen().await;

    assert!(bob.session.manager().close_connection("alice").await);
    warten_bis(|| !alice.session.manager().is_connected("bob")).await;

    alice.session.send_text("bob", "zwei").await.unwrap();
    let nachricht = bob.empfangen().await;
    assert_eq!(
        nachricht,
        DeliveredMessage::Text {
            sender: "alice".into(),
            text: "zwei".into()
        }
    );
}

#[tokio::test]
async fn shutdown_und_neustart() {
    let (alice, mut bob, dir) = paar().await;

    alice.session.send_text("bob", "vorher").await.unwrap();
    bob.empfangen().await;

    alice.session.shutdown().await;
    assert!(!alice.session.laeuft());
    assert!(alice.session.manager().connected_peers().is_empty());
    assert!(matches!(
        alice.session.send_text("bob", "x").await,
        Err(SessionError::NotStarted)
    ));
    warten_bis(|| !bob.session.manager().is_connected("alice")).await;

    let addr = alice.session.start().await.unwrap();
    assert!(dir.adresse_aktualisieren("alice", PeerAddress::from(addr)));

    alice.session.send_text("bob", "nachher").await.unwrap();
    let nachricht = bob.empfangen().await;
    assert_eq!(
        nachricht,
        DeliveredMessage::Text {
            sender: "alice".into(),
            text: "nachher".into()
        }
    );
}
