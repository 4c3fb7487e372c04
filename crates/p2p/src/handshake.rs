//! Handshake-Ablauf fuer eingehende und ausgehende Verbindungen
//!
//! ```text
//! eingehend:  Peer-Handshake lesen  -> eigenen Handshake senden
//! ausgehend:  eigenen Handshake senden -> Peer-Handshake lesen -> Name pruefen
//! ```
//!
//! Der gesamte Austausch laeuft unter einem Zeitlimit. Erst wenn der
//! oeffentliche Schluessel des Peers parsebar ist, gilt der Handshake als
//! erfolgreich.

use std::time::Duration;

use fluesterpost_core::Identity;
use fluesterpost_crypto::asymmetric::{from_pem, PublicKey};
use fluesterpost_protocol::{read_handshake, write_handshake, FramingError, HandshakeMessage};
use tokio::net::TcpStream;

use crate::error::{P2pError, P2pResult};

/// Ergebnis eines erfolgreichen Handshakes
#[derive(Debug)]
pub(crate) struct PeerHandshake {
    pub identity: Identity,
    pub public_key: PublicKey,
}

fn lesefehler(e: FramingError) -> P2pError {
    match e {
        FramingError::Geschlossen => P2pError::handshake("Gegenseite hat vor dem Handshake getrennt"),
        FramingError::Io(e) => P2pError::Io(e),
        andere => P2pError::handshake(andere.to_string()),
    }
}

fn pruefen(msg: HandshakeMessage) -> P2pResult<PeerHandshake> {
    let public_key = from_pem(&msg.public_key_pem).map_err(|e| {
        P2pError::handshake(format!("Schluessel von '{}' unbrauchbar: {e}", msg.username))
    })?;
    Ok(PeerHandshake {
        identity: msg.into(),
        public_key,
    })
}

/// Antwortet auf einen eingehenden Handshake (Listener-Seite)
pub(crate) async fn eingehend(
    stream: &mut TcpStream,
    eigene: &HandshakeMessage,
    zeitlimit: Duration,
) -> P2pResult<PeerHandshake> {
    tokio::time::timeout(zeitlimit, eingehend_ablauf(stream, eigene))
        .await
        .map_err(|_| P2pError::Timeout("Handshake (eingehend)".into()))?
}

async fn eingehend_ablauf(
    stream: &mut TcpStream,
    eigene: &HandshakeMessage,
) -> P2pResult<PeerHandshake> {
    let peer = read_handshake(stream).await.map_err(lesefehler)?;
    let peer = pruefen(peer)?;
    write_handshake(stream, eigene).await?;
    Ok(peer)
}

/// Fuehrt den Handshake nach einem eigenen Verbindungsaufbau durch
///
/// Meldet sich die Gegenseite mit einem anderen Namen als `erwartet`, wird
/// `PeerIdentityMismatch` zurueckgegeben.
pub(crate) async fn ausgehend(
    stream: &mut TcpStream,
    eigene: &HandshakeMessage,
    erwartet: &str,
    zeitlimit: Duration,
) -> P2pResult<PeerHandshake> {
    tokio::time::timeout(zeitlimit, ausgehend_ablauf(stream, eigene, erwartet))
        .await
        .map_err(|_| P2pError::Timeout("Handshake (ausgehend)".into()))?
}

async fn ausgehend_ablauf(
    stream: &mut TcpStream,
    eigene: &HandshakeMessage,
    erwartet: &str,
) -> P2pResult<PeerHandshake> {
    write_handshake(stream, eigene).await?;
    let peer = read_handshake(stream).await.map_err(lesefehler)?;
    if peer.username != erwartet {
        return Err(P2pError::PeerIdentityMismatch {
            erwartet: erwartet.to_string(),
            erhalten: peer.username,
        });
    }
    pruefen(peer)
}
