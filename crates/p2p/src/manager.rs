//! PeerConnectionManager – Listener, Verbindungstabelle, Empfangsschleifen
//!
//! Der Manager besitzt alle Verbindungen. Pro Benutzername gibt es hoechstens
//! eine lebende Verbindung; eine neue Verbindung zum selben Peer ersetzt die
//! alte (last-writer-wins).
//!
//! ## Concurrency-Modell
//! - Die Verbindungstabelle ist ein einzelner `parking_lot::Mutex<HashMap>`.
//!   Er wird nur fuer die Tabellenoperation gehalten, nie ueber Socket-I/O.
//! - Ersetzen = altes Element abbrechen + neues einfuegen unter einem Lock;
//!   das Herunterfahren des alten Sockets passiert danach.
//! - Jede Verbindung hat eine eigene Empfangsschleife (tokio-Task). Sie
//!   entfernt beim Beenden nur ihren eigenen Tabelleneintrag (ConnectionId).
//! - Listener und Empfangsschleifen reagieren ueber `select!` auf ein
//!   Abbruchsignal und warten nie auf Traffic.
//! - `stop_listener` bricht auch laufende eingehende Handshakes ab.
//!   `close_all_connections` erhoeht die Epoche; Verbindungen, deren Aufbau
//!   in einer aelteren Epoche begann, werden nicht mehr eingetragen.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_util::StreamExt;
use parking_lot::{Mutex, RwLock};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;

use fluesterpost_core::{ConnectionId, Direction, Identity, PeerAddress};
use fluesterpost_crypto::asymmetric::PublicKey;
use fluesterpost_observability::P2pMetrics;
use fluesterpost_protocol::{FrameCodec, FramingError, HandshakeMessage};

use crate::config::P2pConfig;
use crate::connection::{ConnectionState, PeerConnection};
use crate::error::{P2pError, P2pResult};
use crate::handshake::{self, PeerHandshake};
use crate::keepalive::keepalive_setzen;

/// Wartezeit auf das Ende der Accept-Loop beim Stoppen des Listeners
const LISTENER_STOPP_TIMEOUT: Duration = Duration::from_secs(2);

// ---------------------------------------------------------------------------
// InboundFrame
// ---------------------------------------------------------------------------

/// Ein vollstaendiger, noch verschluesselter Frame eines Peers
#[derive(Debug, Clone)]
pub struct InboundFrame {
    /// Identitaet aus dem Handshake der Verbindung
    pub peer: Identity,
    pub connection_id: ConnectionId,
    pub payload: Bytes,
}

// ---------------------------------------------------------------------------
// PeerConnectionManager
// ---------------------------------------------------------------------------

/// Laufender Listener
struct ListenerHandle {
    addr: SocketAddr,
    shutdown_tx: watch::Sender<bool>,
    /// Bricht eingehende Handshakes ab, die noch nicht eingetragen sind
    handshakes: CancellationToken,
    task: JoinHandle<()>,
}

/// Bedingungen, unter denen eine frisch aufgebaute Verbindung eingetragen
/// werden darf
struct Zulassung {
    epoche: u64,
    abbruch: Option<CancellationToken>,
}

impl Zulassung {
    fn gilt(&self, aktuelle_epoche: u64) -> bool {
        self.epoche == aktuelle_epoche && !self.abbruch.as_ref().is_some_and(|t| t.is_cancelled())
    }
}

struct ManagerInner {
    config: P2pConfig,
    /// Eigene Identitaet (Benutzername kann vor dem Login aktualisiert werden)
    identity: RwLock<Identity>,
    /// Benutzername -> lebende Verbindung
    verbindungen: Mutex<HashMap<String, Arc<PeerConnection>>>,
    listener: Mutex<Option<ListenerHandle>>,
    inbound_tx: mpsc::Sender<InboundFrame>,
    metriken: Option<P2pMetrics>,
    /// Wird von `close_all_connections` unter dem Tabellen-Lock erhoeht
    epoche: AtomicU64,
}

/// Verwaltet alle Peer-Verbindungen eines Knotens
///
/// Thread-safe via Arc. Clone des Managers teilt den inneren Zustand.
#[derive(Clone)]
pub struct PeerConnectionManager {
    inner: Arc<ManagerInner>,
}

impl PeerConnectionManager {
    /// Erstellt einen neuen Manager
    ///
    /// Gibt zusaetzlich die Eingangs-Queue zurueck, ueber die alle Frames
    /// aller Peers in Empfangsreihenfolge (pro Verbindung) geliefert werden.
    pub fn neu(
        config: P2pConfig,
        identity: Identity,
        metriken: Option<P2pMetrics>,
    ) -> (Self, mpsc::Receiver<InboundFrame>) {
        let (inbound_tx, inbound_rx) = mpsc::channel(config.inbound_queue.max(1));
        let manager = Self {
            inner: Arc::new(ManagerInner {
                config,
                identity: RwLock::new(identity),
                verbindungen: Mutex::new(HashMap::new()),
                listener: Mutex::new(None),
                inbound_tx,
                metriken,
                epoche: AtomicU64::new(0),
            }),
        };
        (manager, inbound_rx)
    }

    pub fn config(&self) -> &P2pConfig {
        &self.inner.config
    }

    /// Eigene Identitaet (wie sie im Handshake gesendet wird)
    pub fn identity(&self) -> Identity {
        self.inner.identity.read().clone()
    }

    /// Setzt den eigenen Benutzernamen (vor dem Login)
    ///
    /// Betrifft nur kuenftige Handshakes.
    pub fn update_identity(&self, username: impl Into<String>) {
        let username = username.into();
        tracing::info!(username = %username, "Eigene Identitaet aktualisiert");
        self.inner.identity.write().username = username;
    }

    // -----------------------------------------------------------------------
    // Listener
    // -----------------------------------------------------------------------

    /// Bindet den Listener und startet die Accept-Loop
    ///
    /// Gibt die tatsaechlich gebundene Adresse zurueck (Port 0 = vom
    /// Betriebssystem vergeben).
    pub async fn start_listener(&self) -> P2pResult<SocketAddr> {
        if self.inner.listener.lock().is_some() {
            return Err(P2pError::ListenerAlreadyRunning);
        }

        let host = self.inner.config.listen_host.as_str();
        let listener = TcpListener::bind((host, self.inner.config.listen_port)).await?;
        let addr = listener.local_addr()?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut slot = self.inner.listener.lock();
        if slot.is_some() {
            return Err(P2pError::ListenerAlreadyRunning);
        }

        let handshakes = CancellationToken::new();
        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(accept_loop(inner, listener, shutdown_rx, handshakes.clone()));
        *slot = Some(ListenerHandle {
            addr,
            shutdown_tx,
            handshakes,
            task,
        });

        tracing::info!(adresse = %addr, "P2P-Listener gestartet");
        Ok(addr)
    }

    /// Stoppt die Accept-Loop und schliesst den Listener-Socket
    ///
    /// Bereits akzeptierte Sockets, deren Handshake noch laeuft, werden
    /// verworfen. Wartet begrenzt auf das Ende der Loop. Ohne laufenden
    /// Listener passiert nichts.
    pub async fn stop_listener(&self) {
        let Some(handle) = self.inner.listener.lock().take() else {
            return;
        };

        handle.handshakes.cancel();
        let _ = handle.shutdown_tx.send(true);
        let mut task = handle.task;
        match tokio::time::timeout(LISTENER_STOPP_TIMEOUT, &mut task).await {
            Ok(_) => tracing::info!(adresse = %handle.addr, "P2P-Listener gestoppt"),
            Err(_) => {
                tracing::warn!(adresse = %handle.addr, "Accept-Loop reagiert nicht – wird abgebrochen");
                task.abort();
            }
        }
    }

    /// Gebundene Listener-Adresse, falls der Listener laeuft
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.inner.listener.lock().as_ref().map(|h| h.addr)
    }

    // -----------------------------------------------------------------------
    // Verbindungsaufbau
    // -----------------------------------------------------------------------

    /// Baut eine Verbindung zu `peer_username` unter `address` auf
    ///
    /// Eine bestehende Verbindung zum selben Peer wird ersetzt.
    pub async fn connect(
        &self,
        peer_username: &str,
        address: &PeerAddress,
    ) -> P2pResult<Arc<PeerConnection>> {
        let unerreichbar = |grund: String| P2pError::PeerUnreachable {
            peer: peer_username.to_string(),
            grund,
        };

        tracing::debug!(
            peer = %peer_username,
            adresse = %address,
            zustand = %ConnectionState::Idle,
            "Verbindungsaufbau"
        );
        let zulassung = Zulassung {
            epoche: self.inner.epoche.load(Ordering::SeqCst),
            abbruch: None,
        };

        let mut stream = tokio::time::timeout(
            self.inner.config.connect_timeout,
            TcpStream::connect(address.host_port()),
        )
        .await
        .map_err(|_| unerreichbar("Zeitlimit beim Verbindungsaufbau".into()))?
        .map_err(|e| unerreichbar(e.to_string()))?;

        let remote_addr = stream.peer_addr()?;
        stream_vorbereiten(&stream, &self.inner.config);

        tracing::debug!(
            peer = %peer_username,
            zustand = %ConnectionState::Handshaking,
            "Socket offen"
        );

        let eigene = self.inner.eigener_handshake();
        let peer = match handshake::ausgehend(
            &mut stream,
            &eigene,
            peer_username,
            self.inner.config.handshake_timeout,
        )
        .await
        {
            Ok(peer) => peer,
            Err(e) => {
                self.inner.handshake_fehlgeschlagen(remote_addr, &e);
                return Err(e);
            }
        };

        self.inner
            .registrieren(stream, peer, Direction::Outbound, remote_addr, zulassung)
            .await
    }

    // -----------------------------------------------------------------------
    // Senden
    // -----------------------------------------------------------------------

    /// Sendet einen Payload als Frame an einen verbundenen Peer
    ///
    /// Ein Payload ueber `max_frame_size` wird abgelehnt, ohne die Verbindung
    /// anzufassen. Schlaegt das Senden auf dem Socket fehl, wird die
    /// Verbindung geschlossen und aus der Tabelle entfernt.
    pub async fn send(&self, username: &str, payload: Bytes) -> P2pResult<()> {
        let laenge = payload.len();
        let maximum = self.inner.config.max_frame_size;
        if laenge > maximum {
            tracing::warn!(peer = %username, laenge, maximum, "Payload zu gross, nicht gesendet");
            return Err(FramingError::NachrichtZuGross { laenge, maximum }.into());
        }

        let conn = self
            .connection(username)
            .ok_or_else(|| P2pError::NotConnected(username.to_string()))?;

        match conn.senden(payload).await {
            Ok(()) => {
                if let Some(m) = &self.inner.metriken {
                    m.frames_gesendet.inc();
                    m.bytes_gesendet.inc_by(laenge as u64);
                }
                tracing::trace!(peer = %username, bytes = laenge, "Frame gesendet");
                Ok(())
            }
            Err(e) if e.ist_lokal() => {
                tracing::warn!(peer = %username, fehler = %e, "Senden abgelehnt, Verbindung bleibt bestehen");
                Err(e)
            }
            Err(e) => {
                tracing::warn!(peer = %username, fehler = %e, "Senden fehlgeschlagen – Verbindung wird geschlossen");
                self.inner.entfernen_wenn(username, conn.id());
                conn.schliessen().await;
                Err(e)
            }
        }
    }

    // -----------------------------------------------------------------------
    // Abfragen
    // -----------------------------------------------------------------------

    pub fn connection(&self, username: &str) -> Option<Arc<PeerConnection>> {
        self.inner.verbindungen.lock().get(username).cloned()
    }

    pub fn is_connected(&self, username: &str) -> bool {
        self.inner.verbindungen.lock().contains_key(username)
    }

    /// Benutzernamen aller verbundenen Peers (sortiert)
    pub fn connected_peers(&self) -> Vec<String> {
        let mut namen: Vec<String> = self.inner.verbindungen.lock().keys().cloned().collect();
        namen.sort();
        namen
    }

    pub fn peer_identity(&self, username: &str) -> Option<Identity> {
        self.connection(username).map(|c| c.identity().clone())
    }

    /// Oeffentlicher Schluessel aus dem Handshake eines verbundenen Peers
    pub fn peer_public_key(&self, username: &str) -> Option<PublicKey> {
        self.connection(username).map(|c| c.public_key().clone())
    }

    // -----------------------------------------------------------------------
    // Schliessen
    // -----------------------------------------------------------------------

    /// Schliesst die Verbindung zu einem Peer
    ///
    /// Gibt `false` zurueck, wenn keine Verbindung bestand.
    pub async fn close_connection(&self, username: &str) -> bool {
        let entfernt = {
            let mut tabelle = self.inner.verbindungen.lock();
            let entfernt = tabelle.remove(username);
            if let Some(conn) = &entfernt {
                conn.abbrechen();
            }
            self.inner.gauge_setzen(tabelle.len());
            entfernt
        };

        match entfernt {
            Some(conn) => {
                conn.schliessen().await;
                tracing::info!(peer = %username, "Verbindung geschlossen");
                true
            }
            None => false,
        }
    }

    /// Schliesst alle Verbindungen
    ///
    /// Verbindungen, deren Aufbau vor dem Aufruf begann, werden danach nicht
    /// mehr eingetragen.
    pub async fn close_all_connections(&self) {
        let alle: Vec<Arc<PeerConnection>> = {
            let mut tabelle = self.inner.verbindungen.lock();
            self.inner.epoche.fetch_add(1, Ordering::SeqCst);
            let alle: Vec<_> = tabelle.drain().map(|(_, conn)| conn).collect();
            for conn in &alle {
                conn.abbrechen();
            }
            self.inner.gauge_setzen(0);
            alle
        };

        let anzahl = alle.len();
        futures_util::future::join_all(alle.iter().map(|conn| conn.schliessen())).await;
        tracing::info!(anzahl, "Alle Verbindungen geschlossen");
    }
}

impl std::fmt::Debug for PeerConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerConnectionManager")
            .field("identity", &self.inner.identity.read().username)
            .field("listener", &self.local_addr())
            .field("verbindungen", &self.connected_peers())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Interne Logik
// ---------------------------------------------------------------------------

/// Nodelay + Keepalive fuer einen frischen Socket
fn stream_vorbereiten(stream: &TcpStream, config: &P2pConfig) {
    if let Err(e) = stream.set_nodelay(true) {
        tracing::debug!(fehler = %e, "TCP_NODELAY nicht gesetzt");
    }
    keepalive_setzen(stream, &config.keepalive);
}

impl ManagerInner {
    fn eigener_handshake(&self) -> HandshakeMessage {
        HandshakeMessage::from(&*self.identity.read())
    }

    fn gauge_setzen(&self, anzahl: usize) {
        if let Some(m) = &self.metriken {
            m.verbindungen_aktiv.set(anzahl as i64);
        }
    }

    fn handshake_fehlgeschlagen(&self, remote_addr: SocketAddr, fehler: &P2pError) {
        if let Some(m) = &self.metriken {
            m.handshakes_fehlgeschlagen.inc();
        }
        tracing::warn!(
            adresse = %remote_addr,
            fehler = %fehler,
            zustand = %ConnectionState::Closed,
            "Handshake fehlgeschlagen"
        );
    }

    /// Traegt eine frisch etablierte Verbindung ein und startet ihre
    /// Empfangsschleife
    ///
    /// Gilt die `zulassung` nicht mehr (Shutdown seit Beginn des Aufbaus),
    /// wird die Verbindung geschlossen statt eingetragen.
    async fn registrieren(
        self: &Arc<Self>,
        stream: TcpStream,
        peer: PeerHandshake,
        direction: Direction,
        remote_addr: SocketAddr,
        zulassung: Zulassung,
    ) -> P2pResult<Arc<PeerConnection>> {
        let codec = FrameCodec::with_max_size(self.config.max_frame_size);
        let (lesen, schreiben) = stream.into_split();
        let username = peer.identity.username.clone();

        let conn = Arc::new(PeerConnection::neu(
            peer.identity,
            peer.public_key,
            direction,
            remote_addr,
            FramedWrite::new(schreiben, codec.clone()),
        ));

        // Pruefen, alte abbrechen, neue eintragen: ein Lock
        let alte = {
            let mut tabelle = self.verbindungen.lock();
            if zulassung.gilt(self.epoche.load(Ordering::SeqCst)) {
                let alte = tabelle.insert(username.clone(), Arc::clone(&conn));
                if let Some(alte) = &alte {
                    alte.abbrechen();
                }
                self.gauge_setzen(tabelle.len());
                Ok(alte)
            } else {
                conn.abbrechen();
                Err(P2pError::ConnectionClosed)
            }
        };
        let alte = match alte {
            Ok(alte) => alte,
            Err(e) => {
                tracing::info!(
                    peer = %username,
                    richtung = %direction,
                    "Verbindung nach Shutdown verworfen"
                );
                conn.schliessen().await;
                return Err(e);
            }
        };

        if let Some(alte) = alte {
            tracing::info!(
                peer = %username,
                alt = %alte.id(),
                neu = %conn.id(),
                "Bestehende Verbindung ersetzt"
            );
            if let Some(m) = &self.metriken {
                m.verbindungen_ersetzt.inc();
            }
            alte.schliessen().await;
        }

        tracing::info!(
            peer = %username,
            verbindung = %conn.id(),
            richtung = %direction,
            adresse = %remote_addr,
            zustand = %ConnectionState::Established,
            "Verbindung hergestellt"
        );

        let inner = Arc::clone(self);
        let reader = FramedRead::new(lesen, codec);
        tokio::spawn(empfangsschleife(inner, Arc::clone(&conn), reader));

        Ok(conn)
    }

    /// Entfernt den Eintrag fuer `username` nur, wenn er zu `id` gehoert
    fn entfernen_wenn(&self, username: &str, id: ConnectionId) -> bool {
        let mut tabelle = self.verbindungen.lock();
        let eigene = tabelle.get(username).is_some_and(|c| c.id() == id);
        if eigene {
            tabelle.remove(username);
            self.gauge_setzen(tabelle.len());
        }
        eigene
    }
}

/// Accept-Loop des Listeners
///
/// Laeuft bis `shutdown_rx` ein `true`-Signal empfaengt. Jeder eingehende
/// Socket bekommt einen eigenen Task fuer den Handshake, damit ein langsamer
/// Peer keine weiteren Verbindungen blockiert.
async fn accept_loop(
    inner: Arc<ManagerInner>,
    listener: TcpListener,
    mut shutdown_rx: watch::Receiver<bool>,
    handshakes: CancellationToken,
) {
    loop {
        tokio::select! {
            // Neue eingehende Verbindung
            result = listener.accept() => {
                match result {
                    Ok((stream, peer_addr)) => {
                        tracing::debug!(
                            adresse = %peer_addr,
                            zustand = %ConnectionState::Handshaking,
                            "Verbindung akzeptiert"
                        );
                        let zulassung = Zulassung {
                            epoche: inner.epoche.load(Ordering::SeqCst),
                            abbruch: Some(handshakes.clone()),
                        };
                        let inner = Arc::clone(&inner);
                        tokio::spawn(eingehend_verarbeiten(inner, stream, peer_addr, zulassung));
                    }
                    Err(e) => {
                        tracing::error!(fehler = %e, "TCP-Accept-Fehler");
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }

            // Shutdown-Signal (oder Sender verworfen)
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    tracing::debug!("Accept-Loop: Shutdown-Signal empfangen");
                    break;
                }
            }
        }
    }
    // Listener-Socket wird hier verworfen
}

/// Handshake und Registrierung einer eingehenden Verbindung
///
/// Endet ohne Registrierung, sobald der Listener gestoppt wird.
async fn eingehend_verarbeiten(
    inner: Arc<ManagerInner>,
    mut stream: TcpStream,
    peer_addr: SocketAddr,
    zulassung: Zulassung,
) {
    stream_vorbereiten(&stream, &inner.config);

    let eigene = inner.eigener_handshake();
    let abbruch = zulassung.abbruch.clone().unwrap_or_default();
    let ergebnis = tokio::select! {
        biased;
        _ = abbruch.cancelled() => {
            tracing::debug!(adresse = %peer_addr, "Eingehender Handshake abgebrochen (Listener gestoppt)");
            return;
        }
        ergebnis = handshake::eingehend(&mut stream, &eigene, inner.config.handshake_timeout) => ergebnis,
    };

    match ergebnis {
        Ok(peer) => {
            // Fehler ist bereits geloggt, Socket wird geschlossen
            let _ = inner
                .registrieren(stream, peer, Direction::Inbound, peer_addr, zulassung)
                .await;
        }
        Err(e) => {
            inner.handshake_fehlgeschlagen(peer_addr, &e);
            // Socket wird beim Drop geschlossen, keine Registrierung
        }
    }
}

/// Empfangsschleife einer Verbindung
///
/// Liefert jeden vollstaendigen Frame an die Eingangs-Queue. Endet bei EOF,
/// Lesefehler, Framing-Fehler oder Abbruch und entfernt danach nur den
/// eigenen Tabelleneintrag.
async fn empfangsschleife(
    inner: Arc<ManagerInner>,
    conn: Arc<PeerConnection>,
    mut reader: FramedRead<OwnedReadHalf, FrameCodec>,
) {
    let username = conn.username().to_string();
    let cancel = conn.cancel_token().clone();

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                tracing::debug!(peer = %username, verbindung = %conn.id(), "Empfangsschleife abgebrochen");
                break;
            }

            frame = reader.next() => {
                match frame {
                    Some(Ok(payload)) => {
                        if let Some(m) = &inner.metriken {
                            m.frames_empfangen.inc();
                            m.bytes_empfangen.inc_by(payload.len() as u64);
                        }
                        tracing::trace!(peer = %username, bytes = payload.len(), "Frame empfangen");

                        let frame = InboundFrame {
                            peer: conn.identity().clone(),
                            connection_id: conn.id(),
                            payload: payload.freeze(),
                        };

                        // Volle Queue darf das Schliessen nicht blockieren
                        tokio::select! {
                            biased;
                            _ = cancel.cancelled() => break,
                            gesendet = inner.inbound_tx.send(frame) => {
                                if gesendet.is_err() {
                                    tracing::debug!(peer = %username, "Eingangs-Queue geschlossen");
                                    break;
                                }
                            }
                        }
                    }
                    Some(Err(FramingError::FrameZuGross { laenge, maximum })) => {
                        tracing::warn!(
                            peer = %username,
                            laenge,
                            maximum,
                            "Frame ueber dem Limit – Verbindung wird geschlossen"
                        );
                        break;
                    }
                    Some(Err(e)) => {
                        if cancel.is_cancelled() {
                            tracing::debug!(peer = %username, fehler = %e, "Lesefehler nach Abbruch");
                        } else {
                            tracing::warn!(peer = %username, fehler = %e, "Frame-Lesefehler");
                        }
                        break;
                    }
                    None => {
                        tracing::info!(peer = %username, verbindung = %conn.id(), "Verbindung vom Peer getrennt");
                        break;
                    }
                }
            }
        }
    }

    inner.entfernen_wenn(&username, conn.id());
    conn.schliessen().await;
    tracing::debug!(peer = %username, verbindung = %conn.id(), "Empfangs-Task beendet");
}
