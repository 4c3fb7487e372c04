//! Peer-Verbindung – eine etablierte TCP-Verbindung zu genau einem Peer
//!
//! ## State Machine
//! ```text
//! Idle -> Handshaking -> Established -> Closing -> Closed
//!              |                                     ^
//!              +-------------- Fehler ---------------+
//! ```
//!
//! `Idle` und `Handshaking` durchlaeuft nur der Verbindungsversuch; ein
//! `PeerConnection`-Objekt entsteht erst nach erfolgreichem Handshake.
//!
//! Lesen und Schreiben sind getrennt: die Empfangsschleife besitzt die
//! Lese-Haelfte, gesendet wird ueber die hier gehaltene Schreib-Haelfte.

use std::net::SocketAddr;

use bytes::Bytes;
use futures_util::SinkExt;
use parking_lot::Mutex;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio_util::codec::FramedWrite;
use tokio_util::sync::CancellationToken;

use fluesterpost_core::{ConnectionId, Direction, Identity};
use fluesterpost_crypto::asymmetric::PublicKey;
use fluesterpost_protocol::FrameCodec;

use crate::error::{P2pError, P2pResult};

// ---------------------------------------------------------------------------
// Verbindungszustand
// ---------------------------------------------------------------------------

/// Zustand eines Verbindungsversuchs bzw. einer Verbindung
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Noch kein Socket
    Idle,
    /// Socket offen, Identitaeten werden ausgetauscht
    Handshaking,
    /// Handshake abgeschlossen, Envelopes fliessen
    Established,
    /// Schliessen eingeleitet
    Closing,
    /// Socket geschlossen
    Closed,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Handshaking => "handshaking",
            ConnectionState::Established => "established",
            ConnectionState::Closing => "closing",
            ConnectionState::Closed => "closed",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// PeerConnection
// ---------------------------------------------------------------------------

/// Etablierte Verbindung zu einem Peer
///
/// Wird ausschliesslich vom `PeerConnectionManager` erzeugt und verwaltet.
pub struct PeerConnection {
    id: ConnectionId,
    identity: Identity,
    public_key: PublicKey,
    direction: Direction,
    remote_addr: SocketAddr,
    state: Mutex<ConnectionState>,
    writer: tokio::sync::Mutex<Option<FramedWrite<OwnedWriteHalf, FrameCodec>>>,
    cancel: CancellationToken,
}

impl PeerConnection {
    pub(crate) fn neu(
        identity: Identity,
        public_key: PublicKey,
        direction: Direction,
        remote_addr: SocketAddr,
        writer: FramedWrite<OwnedWriteHalf, FrameCodec>,
    ) -> Self {
        Self {
            id: ConnectionId::new(),
            identity,
            public_key,
            direction,
            remote_addr,
            state: Mutex::new(ConnectionState::Established),
            writer: tokio::sync::Mutex::new(Some(writer)),
            cancel: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn username(&self) -> &str {
        &self.identity.username
    }

    /// Oeffentlicher Schluessel aus dem Handshake
    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub(crate) fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Sendet einen Payload als einzelnen Frame
    ///
    /// Wird die Verbindung waehrend des Sendens geschlossen, bricht der
    /// Vorgang mit `ConnectionClosed` ab.
    pub(crate) async fn senden(&self, payload: Bytes) -> P2pResult<()> {
        if self.cancel.is_cancelled() {
            return Err(P2pError::ConnectionClosed);
        }

        let mut writer = self.writer.lock().await;
        let Some(framed) = writer.as_mut() else {
            return Err(P2pError::ConnectionClosed);
        };

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(P2pError::ConnectionClosed),
            result = framed.send(payload) => result.map_err(P2pError::from),
        }
    }

    /// Markiert die Verbindung als abgebrochen, ohne Socket-I/O
    ///
    /// Darf unter dem Tabellen-Lock aufgerufen werden. Die Empfangsschleife
    /// und laufende Sendevorgaenge beenden sich daraufhin.
    pub(crate) fn abbrechen(&self) {
        {
            let mut state = self.state.lock();
            if *state == ConnectionState::Established {
                *state = ConnectionState::Closing;
            }
        }
        self.cancel.cancel();
    }

    /// Schliesst die Verbindung und faehrt die Schreib-Haelfte herunter
    ///
    /// Mehrfacher Aufruf ist harmlos. "Not connected" beim Herunterfahren
    /// wird ignoriert.
    pub(crate) async fn schliessen(&self) {
        self.abbrechen();

        let framed = self.writer.lock().await.take();
        if let Some(framed) = framed {
            let mut schreiben = framed.into_inner();
            match schreiben.shutdown().await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotConnected => {}
                Err(e) => {
                    tracing::debug!(
                        peer = %self.identity.username,
                        verbindung = %self.id,
                        fehler = %e,
                        "Fehler beim Herunterfahren des Sockets"
                    );
                }
            }
            tracing::debug!(
                peer = %self.identity.username,
                verbindung = %self.id,
                "Verbindung geschlossen"
            );
        }

        *self.state.lock() = ConnectionState::Closed;
    }
}

impl std::fmt::Debug for PeerConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerConnection")
            .field("id", &self.id)
            .field("peer", &self.identity.username)
            .field("direction", &self.direction)
            .field("remote_addr", &self.remote_addr)
            .field("state", &self.state())
            .finish()
    }
}
