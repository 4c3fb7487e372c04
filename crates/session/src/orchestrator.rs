//! SessionOrchestrator – verbindet Verzeichnis, Kryptografie und P2P-Schicht
//!
//! ```text
//! Senden:    Klartext -> Einmal-Schluessel -> AES-256-GCM
//!            Einmal-Schluessel -> RSA-OAEP (Empfaenger) -> Envelope -> Frame
//! Empfangen: Frame -> Envelope -> RSA-OAEP (eigener Schluessel)
//!            -> AES-256-GCM -> DeliveredMessage
//! ```
//!
//! Empfangsseitige Fehler (Parsen, Entschluesseln, Inhalt) werden geloggt,
//! gezaehlt und die Nachricht verworfen. Die Verbindung bleibt bestehen.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use fluesterpost_core::{Identity, PeerRecord};
use fluesterpost_crypto::asymmetric::{self, PublicKey};
use fluesterpost_crypto::{symmetric, KeyPair, SymmetricKey};
use fluesterpost_observability::P2pMetrics;
use fluesterpost_p2p::{InboundFrame, P2pConfig, PeerConnection, PeerConnectionManager};
use fluesterpost_protocol::{
    AudioMessage, ChatMessage, Envelope, HiddenMessageCrypto, OnlineNotify, StegImage,
};

use crate::codec::SteganographyCodec;
use crate::directory::Directory;
use crate::error::{SessionError, SessionResult};
use crate::message::{BinaryKind, DeliveredMessage};

// ---------------------------------------------------------------------------
// SessionOrchestrator
// ---------------------------------------------------------------------------

/// Laufender Verteiler-Task (Eingangs-Queue -> Entschluesseln -> Zustellung)
struct Verteiler {
    cancel: CancellationToken,
    /// Gibt die Eingangs-Queue beim Beenden zurueck (Neustart moeglich)
    task: JoinHandle<mpsc::Receiver<InboundFrame>>,
}

struct OrchestratorInner {
    manager: PeerConnectionManager,
    schluessel: KeyPair,
    verzeichnis: Arc<dyn Directory>,
    codec: Arc<dyn SteganographyCodec>,
    metriken: Option<P2pMetrics>,
    eingang: Mutex<Option<mpsc::Receiver<InboundFrame>>>,
    zustellung_tx: mpsc::Sender<DeliveredMessage>,
    verteiler: Mutex<Option<Verteiler>>,
}

/// Sitzung eines angemeldeten Benutzers
///
/// Clone teilt den inneren Zustand.
#[derive(Clone)]
pub struct SessionOrchestrator {
    inner: Arc<OrchestratorInner>,
}

impl SessionOrchestrator {
    /// Erstellt eine Sitzung fuer `username` mit dem eigenen Schluessel-Paar
    ///
    /// Gibt zusaetzlich die Queue zurueck, ueber die alle entschluesselten
    /// Nachrichten an die Anwendung gehen.
    pub fn neu(
        config: P2pConfig,
        username: impl Into<String>,
        schluessel: KeyPair,
        verzeichnis: Arc<dyn Directory>,
        codec: Arc<dyn SteganographyCodec>,
        metriken: Option<P2pMetrics>,
    ) -> SessionResult<(Self, mpsc::Receiver<DeliveredMessage>)> {
        let identity = Identity::new(username, schluessel.public_key_pem()?);
        let queue = config.inbound_queue.max(1);
        let (manager, eingang) = PeerConnectionManager::neu(config, identity, metriken.clone());
        let (zustellung_tx, zustellung_rx) = mpsc::channel(queue);

        let session = Self {
            inner: Arc::new(OrchestratorInner {
                manager,
                schluessel,
                verzeichnis,
                codec,
                metriken,
                eingang: Mutex::new(Some(eingang)),
                zustellung_tx,
                verteiler: Mutex::new(None),
            }),
        };
        Ok((session, zustellung_rx))
    }

    /// Zugrunde liegender Verbindungs-Manager
    pub fn manager(&self) -> &PeerConnectionManager {
        &self.inner.manager
    }

    pub fn username(&self) -> String {
        self.inner.manager.identity().username
    }

    pub fn laeuft(&self) -> bool {
        self.inner.verteiler.lock().is_some()
    }

    // -----------------------------------------------------------------------
    // Lebenszyklus
    // -----------------------------------------------------------------------

    /// Startet Listener und Verteiler-Task
    ///
    /// Gibt die gebundene Listener-Adresse zurueck (fuer das Verzeichnis).
    pub async fn start(&self) -> SessionResult<SocketAddr> {
        let addr = self.inner.manager.start_listener().await?;

        {
            let mut slot = self.inner.verteiler.lock();
            if slot.is_none() {
                if let Some(eingang) = self.inner.eingang.lock().take() {
                    let cancel = CancellationToken::new();
                    let task = tokio::spawn(verteilen(
                        Arc::clone(&self.inner),
                        eingang,
                        cancel.clone(),
                    ));
                    *slot = Some(Verteiler { cancel, task });
                }
            }
        }

        info!(username = %self.username(), adresse = %addr, "Sitzung gestartet");
        Ok(addr)
    }

    /// Stoppt den Listener, schliesst alle Verbindungen und beendet den
    /// Verteiler
    pub async fn shutdown(&self) {
        self.inner.manager.stop_listener().await;
        self.inner.manager.close_all_connections().await;

        let verteiler = self.inner.verteiler.lock().take();
        if let Some(verteiler) = verteiler {
            verteiler.cancel.cancel();
            match verteiler.task.await {
                Ok(eingang) => *self.inner.eingang.lock() = Some(eingang),
                Err(e) => warn!(fehler = %e, "Verteiler-Task nicht sauber beendet"),
            }
        }

        info!(username = %self.username(), "Sitzung beendet");
    }

    fn gestartet_pruefen(&self) -> SessionResult<()> {
        if self.laeuft() {
            Ok(())
        } else {
            Err(SessionError::NotStarted)
        }
    }

    // -----------------------------------------------------------------------
    // Senden
    // -----------------------------------------------------------------------

    /// Sendet eine Textnachricht
    pub async fn send_text(&self, empfaenger: &str, text: &str) -> SessionResult<()> {
        let (public_key, frisch) = self.verbindung_sicherstellen(empfaenger).await?;

        let einmal = symmetric::generate_key();
        let encrypted_key = asymmetric::encrypt_key(&public_key, einmal.as_bytes())?;
        let sealed = symmetric::encrypt(text.as_bytes(), &einmal)?;

        let envelope = Envelope::ChatMessage(ChatMessage {
            encrypted_key,
            encrypted_message: sealed.ciphertext,
            nonce: sealed.nonce.to_vec(),
            tag: sealed.tag.to_vec(),
        });
        self.envelope_senden(empfaenger, &envelope, frisch).await
    }

    /// Sendet Binaerdaten (Audio oder Steganografie-Bild)
    ///
    /// Bei `BinaryKind::StegImage` werden Bild und versteckte Nachricht mit
    /// demselben Einmal-Schluessel, aber unabhaengigen Nonces verschluesselt.
    pub async fn send_binary(
        &self,
        empfaenger: &str,
        payload: &[u8],
        kind: BinaryKind,
    ) -> SessionResult<()> {
        let (public_key, frisch) = self.verbindung_sicherstellen(empfaenger).await?;

        let einmal = symmetric::generate_key();
        let encrypted_key = asymmetric::encrypt_key(&public_key, einmal.as_bytes())?;
        let daten = symmetric::encrypt(payload, &einmal)?;

        let envelope = match kind {
            BinaryKind::Audio => Envelope::AudioMessage(AudioMessage {
                encrypted_key,
                encrypted_audio: daten.ciphertext,
                nonce: daten.nonce.to_vec(),
                tag: daten.tag.to_vec(),
            }),
            BinaryKind::StegImage { hidden_message } => {
                let versteckt = symmetric::encrypt(hidden_message.as_bytes(), &einmal)?;
                Envelope::StegImage(StegImage {
                    encrypted_image_data: daten.ciphertext,
                    image_nonce: daten.nonce.to_vec(),
                    image_tag: daten.tag.to_vec(),
                    hidden_message_crypto: HiddenMessageCrypto {
                        encrypted_key,
                        encrypted_hidden_msg: versteckt.ciphertext,
                        nonce: versteckt.nonce.to_vec(),
                        tag: versteckt.tag.to_vec(),
                    },
                })
            }
        };
        self.envelope_senden(empfaenger, &envelope, frisch).await
    }

    /// Bettet `hidden_message` ueber den Codec in das Bild ein und sendet es
    pub async fn send_steg_image(
        &self,
        empfaenger: &str,
        cover_image: &[u8],
        hidden_message: &str,
    ) -> SessionResult<()> {
        let bild = self.inner.codec.embed(cover_image, hidden_message)?;
        self.send_binary(
            empfaenger,
            &bild,
            BinaryKind::StegImage {
                hidden_message: hidden_message.to_string(),
            },
        )
        .await
    }

    /// Sendet eine Online-Benachrichtigung an alle verbundenen Peers
    ///
    /// Gibt die Anzahl der erreichten Peers zurueck. Einzelne Fehler werden
    /// nur geloggt.
    pub async fn announce_presence(&self) -> SessionResult<usize> {
        self.gestartet_pruefen()?;

        let envelope = Envelope::OnlineNotify(OnlineNotify {
            username: self.username(),
        });
        let payload = Bytes::from(envelope.to_bytes()?);

        let mut erreicht = 0;
        for peer in self.inner.manager.connected_peers() {
            match self.inner.manager.send(&peer, payload.clone()).await {
                Ok(()) => erreicht += 1,
                Err(e) => warn!(peer = %peer, fehler = %e, "Online-Benachrichtigung fehlgeschlagen"),
            }
        }

        info!(peers = erreicht, "Online-Status angekuendigt");
        Ok(erreicht)
    }

    /// Baut Verbindungen zu allen Online-Freunden des Verzeichnisses auf
    ///
    /// Bereits verbundene Peers werden uebersprungen. Gibt die Namen der neu
    /// verbundenen Peers zurueck.
    pub async fn connect_online_friends(&self) -> SessionResult<Vec<String>> {
        self.gestartet_pruefen()?;

        let eigener_name = self.username();
        let mut verbunden = Vec::new();
        for record in self.inner.verzeichnis.online_friends().await {
            if record.username == eigener_name || self.inner.manager.is_connected(&record.username) {
                continue;
            }
            match self.verbinden(&record).await {
                Ok(_) => verbunden.push(record.username),
                Err(e) => warn!(peer = %record.username, fehler = %e, "Freund nicht erreichbar"),
            }
        }
        Ok(verbunden)
    }

    // -----------------------------------------------------------------------
    // Interne Sende-Logik
    // -----------------------------------------------------------------------

    /// Stellt eine Verbindung zum Empfaenger sicher und waehlt dessen
    /// Schluessel
    ///
    /// Der Schluessel aus dem Verzeichnis hat Vorrang vor dem aus dem
    /// Handshake. Der zweite Rueckgabewert ist `true`, wenn die Verbindung
    /// gerade erst aufgebaut wurde.
    async fn verbindung_sicherstellen(&self, empfaenger: &str) -> SessionResult<(PublicKey, bool)> {
        self.gestartet_pruefen()?;

        let record = self.inner.verzeichnis.lookup(empfaenger).await;
        let verzeichnis_schluessel = record.as_ref().and_then(|r| {
            asymmetric::from_pem(&r.public_key_pem)
                .map_err(|e| {
                    warn!(peer = %empfaenger, fehler = %e, "Schluessel im Verzeichnis unbrauchbar");
                })
                .ok()
        });

        if let Some(conn) = self.inner.manager.connection(empfaenger) {
            let key = schluessel_waehlen(empfaenger, verzeichnis_schluessel, conn.public_key());
            return Ok((key, false));
        }

        let record = record.ok_or_else(|| SessionError::PeerUnreachable {
            peer: empfaenger.to_string(),
            grund: "nicht im Verzeichnis".into(),
        })?;
        let conn = self.verbinden(&record).await?;
        let key = schluessel_waehlen(empfaenger, verzeichnis_schluessel, conn.public_key());
        Ok((key, true))
    }

    async fn verbinden(&self, record: &PeerRecord) -> SessionResult<Arc<PeerConnection>> {
        self.inner
            .manager
            .connect(&record.username, &record.address)
            .await
            .map_err(|e| SessionError::PeerUnreachable {
                peer: record.username.clone(),
                grund: e.to_string(),
            })
    }

    /// Serialisiert und sendet ein Envelope
    ///
    /// Schlaegt das Senden ueber eine bestehende Verbindung fehl, wird genau
    /// einmal neu verbunden und erneut gesendet. Ein zu grosses Envelope wird
    /// nicht wiederholt.
    async fn envelope_senden(
        &self,
        empfaenger: &str,
        envelope: &Envelope,
        frisch: bool,
    ) -> SessionResult<()> {
        let payload = Bytes::from(envelope.to_bytes()?);
        let laenge = payload.len();
        let art = envelope.kind();

        match self.inner.manager.send(empfaenger, payload.clone()).await {
            Ok(()) => {}
            Err(e) if !frisch && !e.ist_lokal() => {
                warn!(
                    peer = %empfaenger,
                    fehler = %e,
                    "Bestehende Verbindung unbrauchbar – neuer Verbindungsversuch"
                );
                let record = self
                    .inner
                    .verzeichnis
                    .lookup(empfaenger)
                    .await
                    .ok_or(SessionError::Transport(e))?;
                self.verbinden(&record).await?;
                self.inner.manager.send(empfaenger, payload).await?;
            }
            Err(e) => return Err(e.into()),
        }

        debug!(peer = %empfaenger, art = %art, bytes = laenge, "Envelope gesendet");
        Ok(())
    }
}

impl std::fmt::Debug for SessionOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionOrchestrator")
            .field("manager", &self.inner.manager)
            .field("laeuft", &self.laeuft())
            .finish()
    }
}

fn schluessel_waehlen(
    peer: &str,
    verzeichnis: Option<PublicKey>,
    handshake: &PublicKey,
) -> PublicKey {
    match verzeichnis {
        Some(key) => {
            if &key != handshake {
                warn!(peer = %peer, "Schluessel im Verzeichnis weicht vom Handshake ab");
            }
            key
        }
        None => handshake.clone(),
    }
}

// ---------------------------------------------------------------------------
// Empfangen
// ---------------------------------------------------------------------------

/// Verteiler-Task: entschluesselt eingehende Frames und stellt sie zu
async fn verteilen(
    inner: Arc<OrchestratorInner>,
    mut eingang: mpsc::Receiver<InboundFrame>,
    cancel: CancellationToken,
) -> mpsc::Receiver<InboundFrame> {
    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => break,

            frame = eingang.recv() => {
                let Some(frame) = frame else { break };
                let absender = frame.peer.username.clone();

                // RSA und AES ueber bis zu max_frame_size Bytes: nicht auf dem Worker
                let arbeiter = Arc::clone(&inner);
                let ergebnis = tokio::task::spawn_blocking(move || arbeiter.verarbeiten(&frame)).await;
                let nachricht = match ergebnis {
                    Ok(Some(nachricht)) => nachricht,
                    Ok(None) => continue,
                    Err(e) => {
                        warn!(peer = %absender, fehler = %e, "Entschluesselungs-Task abgebrochen");
                        continue;
                    }
                };
                let art = nachricht.kind();

                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    gesendet = inner.zustellung_tx.send(nachricht) => {
                        match gesendet {
                            Ok(()) => {
                                if let Some(m) = &inner.metriken {
                                    m.zugestellt(art.as_str());
                                }
                            }
                            Err(_) => debug!(peer = %absender, "Zustell-Queue geschlossen – Nachricht verworfen"),
                        }
                    }
                }
            }
        }
    }

    debug!("Verteiler beendet");
    eingang
}

impl OrchestratorInner {
    /// Parst und entschluesselt einen Frame; `None` wenn er verworfen wurde
    fn verarbeiten(&self, frame: &InboundFrame) -> Option<DeliveredMessage> {
        let absender = frame.peer.username.as_str();
        let ergebnis = Envelope::from_bytes(&frame.payload)
            .map_err(SessionError::from)
            .and_then(|envelope| self.entschluesseln(absender, envelope));

        match ergebnis {
            Ok(nachricht) => {
                debug!(peer = %absender, art = %nachricht.kind(), "Nachricht entschluesselt");
                Some(nachricht)
            }
            Err(e) => {
                if let Some(m) = &self.metriken {
                    m.entschluesselung_fehlgeschlagen.inc();
                }
                warn!(
                    peer = %absender,
                    verbindung = %frame.connection_id,
                    fehler = %e,
                    "Nachricht verworfen"
                );
                None
            }
        }
    }

    fn entschluesseln(&self, absender: &str, envelope: Envelope) -> SessionResult<DeliveredMessage> {
        let sender = absender.to_string();
        match envelope {
            Envelope::ChatMessage(m) => {
                let einmal = self.einmal_schluessel(&m.encrypted_key)?;
                let klartext = symmetric::decrypt(&m.encrypted_message, &m.nonce, &m.tag, &einmal)?;
                Ok(DeliveredMessage::Text {
                    sender,
                    text: utf8(klartext, "Textnachricht")?,
                })
            }
            Envelope::StegImage(s) => {
                let h = &s.hidden_message_crypto;
                let einmal = self.einmal_schluessel(&h.encrypted_key)?;
                let versteckt = symmetric::decrypt(&h.encrypted_hidden_msg, &h.nonce, &h.tag, &einmal)?;
                let image =
                    symmetric::decrypt(&s.encrypted_image_data, &s.image_nonce, &s.image_tag, &einmal)?;

                let extracted = match self.codec.extract(&image) {
                    Ok(text) => text,
                    Err(e) => {
                        debug!(peer = %absender, fehler = %e, "Extraktion aus dem Bild fehlgeschlagen");
                        None
                    }
                };

                Ok(DeliveredMessage::StegImage {
                    sender,
                    image,
                    hidden_message: utf8(versteckt, "versteckte Nachricht")?,
                    extracted,
                })
            }
            Envelope::AudioMessage(a) => {
                let einmal = self.einmal_schluessel(&a.encrypted_key)?;
                let audio = symmetric::decrypt(&a.encrypted_audio, &a.nonce, &a.tag, &einmal)?;
                Ok(DeliveredMessage::Audio { sender, audio })
            }
            Envelope::OnlineNotify(n) => {
                if n.username != absender {
                    debug!(
                        peer = %absender,
                        angegeben = %n.username,
                        "Online-Benachrichtigung mit abweichendem Namen"
                    );
                }
                Ok(DeliveredMessage::PresenceRefresh { sender })
            }
        }
    }

    /// Packt den Einmal-Schluessel mit dem eigenen privaten Schluessel aus
    fn einmal_schluessel(&self, encrypted_key: &[u8]) -> SessionResult<SymmetricKey> {
        let roh = self.schluessel.decrypt_key(encrypted_key)?;
        Ok(SymmetricKey::from_bytes(roh.as_bytes())?)
    }
}

fn utf8(bytes: Vec<u8>, was: &str) -> SessionResult<String> {
    String::from_utf8(bytes).map_err(|_| SessionError::InvalidPayload(format!("{was} ist kein UTF-8")))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
