//! Integration-Tests: Befehle der Kommandozeile gegen eine echte Gegenstelle

use std::sync::Arc;
use std::time::Duration;

use fluesterpost_core::{PeerAddress, PeerRecord};
use fluesterpost_crypto::asymmetric::generate_keypair;
use fluesterpost_node::befehl::{parse_line, Befehl};
use fluesterpost_node::{ausfuehren, config::NodeConfig};
use fluesterpost_session::{DeliveredMessage, PassthroughCodec, SessionOrchestrator, StaticDirectory};
use tokio::sync::mpsc;

async fn sitzung(
    name: &str,
    verzeichnis: &Arc<StaticDirectory>,
) -> (SessionOrchestrator, mpsc::Receiver<DeliveredMessage>) {
    let mut config = NodeConfig::default();
    config.identitaet.benutzername = name.into();
    config.netzwerk.bind_adresse = "127.0.0.1".into();

    let kp = generate_keypair().unwrap();
    let pem = kp.public_key_pem().unwrap();
    let (session, rx) = SessionOrchestrator::neu(
        config.p2p_config(),
        name,
        kp,
        verzeichnis.clone(),
        Arc::new(PassthroughCodec),
        None,
    )
    .unwrap();
    let addr = session.start().await.unwrap();
    verzeichnis.eintragen(PeerRecord {
        username: name.into(),
        address: PeerAddress::from(addr),
        public_key_pem: pem,
    });
    (session, rx)
}

async fn empfangen(rx: &mut mpsc::Receiver<DeliveredMessage>) -> DeliveredMessage {
    tokio::time::timeout(Duration::from_secs(10), rx.recv())
        .await
        .expect("Keine Nachricht zugestellt")
        .expect("Zustell-Queue geschlossen")
}

#[tokio::test]
async fn befehle_gegen_gegenstelle() {
    let verzeichnis = Arc::new(StaticDirectory::neu());
    let (alice, _alice_rx) = sitzung("alice", &verzeichnis).await;
    let (_bob, mut bob_rx) = sitzung("bob", &verzeichnis).await;

    // msg
    let ausgabe = ausfuehren(&alice, &verzeichnis, parse_line("msg bob hallo bob").unwrap())
        .await
        .unwrap();
    assert_eq!(ausgabe, "-> bob: hallo bob");
    assert_eq!(
        empfangen(&mut bob_rx).await,
        DeliveredMessage::Text {
            sender: "alice".into(),
            text: "hallo bob".into()
        }
    );

    // peers
    let ausgabe = ausfuehren(&alice, &verzeichnis, Befehl::Peers).await.unwrap();
    assert_eq!(ausgabe, "bob");

    // audio aus Datei
    let dir = tempfile::tempdir().unwrap();
    let datei = dir.path().join("gruss.wav");
    std::fs::write(&datei, vec![3u8; 1000]).unwrap();
    let befehl = Befehl::Audio {
        peer: "bob".into(),
        datei: datei.display().to_string(),
    };
    let ausgabe = ausfuehren(&alice, &verzeichnis, befehl).await.unwrap();
    assert_eq!(ausgabe, "-> bob: Sprachnachricht (1000 Bytes)");
    match empfangen(&mut bob_rx).await {
        DeliveredMessage::Audio { sender, audio } => {
            assert_eq!(sender, "alice");
            assert_eq!(audio, vec![3u8; 1000]);
        }
        andere => panic!("Audio erwartet, erhalten: {:?}", andere),
    }

    // online
    let ausgabe = ausfuehren(&alice, &verzeichnis, Befehl::Online).await.unwrap();
    assert_eq!(ausgabe, "Online-Status an 1 Peer(s) gesendet");
    assert_eq!(
        empfangen(&mut bob_rx).await,
        DeliveredMessage::PresenceRefresh {
            sender: "alice".into()
        }
    );
}

#[tokio::test]
async fn fehler_werden_als_ergebnis_gemeldet() {
    let verzeichnis = Arc::new(StaticDirectory::neu());
    let (alice, _rx) = sitzung("alice", &verzeichnis).await;

    let ergebnis = ausfuehren(&alice, &verzeichnis, parse_line("msg carol hallo").unwrap()).await;
    assert!(ergebnis.is_err());

    let ausgabe = ausfuehren(&alice, &verzeichnis, parse_line("adresse carol 10.0.0.9 1").unwrap())
        .await
        .unwrap();
    assert_eq!(ausgabe, "carol ist nicht im Verzeichnis");

    let ausgabe = ausfuehren(&alice, &verzeichnis, Befehl::Verbinden).await.unwrap();
    assert_eq!(ausgabe, "Keine neuen Verbindungen");

    let ergebnis = ausfuehren(
        &alice,
        &verzeichnis,
        Befehl::Audio {
            peer: "alice".into(),
            datei: "/gibt/es/nicht.wav".into(),
        },
    )
    .await;
    assert!(ergebnis.is_err());
}
