//! TCP-Keepalive fuer etablierte Peer-Verbindungen
//!
//! Feineinstellung (Idle/Intervall/Wiederholungen) gibt es nicht auf jeder
//! Plattform. Schlaegt sie fehl, wird stillschweigend auf einfaches
//! Keepalive zurueckgefallen.

use socket2::{SockRef, TcpKeepalive};
use tokio::net::TcpStream;

use crate::config::KeepaliveConfig;

/// Aktiviert TCP-Keepalive gemaess `config` auf `stream`
pub(crate) fn keepalive_setzen(stream: &TcpStream, config: &KeepaliveConfig) {
    if !config.aktiviert {
        return;
    }

    let socket = SockRef::from(stream);
    if let Err(e) = socket.set_tcp_keepalive(&feineinstellung(config)) {
        tracing::debug!(fehler = %e, "Keepalive-Feineinstellung nicht verfuegbar");
        if let Err(e) = socket.set_keepalive(true) {
            tracing::debug!(fehler = %e, "Keepalive konnte nicht aktiviert werden");
        }
    }
}

#[cfg(any(
    target_os = "linux",
    target_os = "android",
    target_os = "macos",
    target_os = "ios",
    target_os = "freebsd",
    target_os = "netbsd"
))]
fn feineinstellung(config: &KeepaliveConfig) -> TcpKeepalive {
    TcpKeepalive::new()
        .with_time(config.idle)
        .with_interval(config.intervall)
        .with_retries(config.wiederholungen)
}

#[cfg(not(any(
    target_os = "linux",
    target_os = "android",
    target_os = "macos",
    target_os = "ios",
    target_os = "freebsd",
    target_os = "netbsd"
)))]
fn feineinstellung(config: &KeepaliveConfig) -> TcpKeepalive {
    TcpKeepalive::new().with_time(config.idle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn keepalive_wird_aktiviert() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let stream = TcpStream::connect(addr).await.unwrap();

        keepalive_setzen(&stream, &KeepaliveConfig::default());
        assert!(SockRef::from(&stream).keepalive().unwrap());
    }

    #[tokio::test]
    async fn deaktiviertes_keepalive_bleibt_aus() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let stream = TcpStream::connect(addr).await.unwrap();

        let config = KeepaliveConfig {
            aktiviert: false,
            ..KeepaliveConfig::default()
        };
        keepalive_setzen(&stream, &config);
        assert!(!SockRef::from(&stream).keepalive().unwrap());
    }
}
