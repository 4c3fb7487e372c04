//! Health-Check-Endpunkt fuer Fluesterpost
//!
//! Endpoint: `GET /health`
//! Response: JSON mit Status, Version, Uptime, Listener-Status und Anzahl
//! verbundener Peers

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::metrics::P2pMetrics;

/// Status des Health-Checks
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
}

/// Antwort des Health-Check-Endpunkts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub version: String,
    pub uptime_seconds: u64,
    pub listener_active: bool,
    pub connected_peers: i64,
}

/// Geteilter Zustand fuer den Health-Check-Handler
#[derive(Clone)]
pub struct HealthState {
    start_time: Arc<Instant>,
    listener_aktiv: Arc<AtomicBool>,
    metriken: P2pMetrics,
}

impl HealthState {
    pub fn neu(metriken: P2pMetrics) -> Self {
        Self {
            start_time: Arc::new(Instant::now()),
            listener_aktiv: Arc::new(AtomicBool::new(false)),
            metriken,
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    pub fn listener_aktiv(&self) -> bool {
        self.listener_aktiv.load(Ordering::Relaxed)
    }

    pub fn listener_status_setzen(&self, aktiv: bool) {
        self.listener_aktiv.store(aktiv, Ordering::Relaxed);
    }

    /// Momentaufnahme fuer die Antwort
    pub fn antwort(&self) -> HealthResponse {
        let listener_active = self.listener_aktiv();
        HealthResponse {
            // Ohne Listener ist der Knoten nicht erreichbar, kann aber senden
            status: if listener_active {
                HealthStatus::Healthy
            } else {
                HealthStatus::Degraded
            },
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: self.uptime_seconds(),
            listener_active,
            connected_peers: self.metriken.verbindungen_aktiv.get(),
        }
    }
}

/// Axum-Router fuer den `/health`-Endpunkt
pub fn health_router(state: HealthState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .with_state(state)
}

/// `GET /health` – gibt den Knotenstatus zurueck
///
/// Auch `degraded` liefert 200, damit eine Probe nicht fehlschlaegt.
async fn health_handler(State(state): State<HealthState>) -> impl IntoResponse {
    (StatusCode::OK, Json(state.antwort()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> HealthState {
        HealthState::neu(P2pMetrics::neu().unwrap())
    }

    #[test]
    fn health_state_uptime_frisch() {
        assert!(state().uptime_seconds() < 5);
    }

    #[test]
    fn ohne_listener_degraded() {
        let state = state();
        let antwort = state.antwort();
        assert_eq!(antwort.status, HealthStatus::Degraded);
        assert!(!antwort.listener_active);
    }

    #[test]
    fn listener_status_umschalten() {
        let state = state();
        state.listener_status_setzen(true);
        assert_eq!(state.antwort().status, HealthStatus::Healthy);
        state.listener_status_setzen(false);
        assert!(!state.listener_aktiv());
    }

    #[test]
    fn verbundene_peers_aus_metriken() {
        let metriken = P2pMetrics::neu().unwrap();
        let state = HealthState::neu(metriken.clone());
        metriken.verbindungen_aktiv.set(4);
        assert_eq!(state.antwort().connected_peers, 4);
    }

    #[test]
    fn health_response_serialisierung() {
        let response = HealthResponse {
            status: HealthStatus::Healthy,
            version: "0.1.0".to_string(),
            uptime_seconds: 3600,
            listener_active: true,
            connected_peers: 2,
        };

        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"status\":\"healthy\""));
        assert!(json.contains("\"uptime_seconds\":3600"));
        assert!(json.contains("\"listener_active\":true"));
        assert!(json.contains("\"connected_peers\":2"));
    }
}
