//! Prometheus-kompatible Metriken fuer Fluesterpost
//!
//! Registrierte Metriken:
//! - `fluesterpost_connections_active` – Gauge: Aktuell verbundene Peers
//! - `fluesterpost_connections_replaced_total` – Counter: Ersetzte Verbindungen
//! - `fluesterpost_handshake_failures_total` – Counter: Fehlgeschlagene Handshakes
//! - `fluesterpost_frames_sent_total` / `_received_total` – Counter: Frames
//! - `fluesterpost_bytes_sent_total` / `_received_total` – Counter: Payload-Bytes
//! - `fluesterpost_decrypt_failures_total` – Counter: Verworfene Envelopes
//! - `fluesterpost_messages_delivered_total` – Counter: Zugestellte Nachrichten (kind)

use anyhow::Result;
use axum::{extract::State, response::IntoResponse, routing::get, Router};
use prometheus::{
    Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};
use std::sync::Arc;

/// Alle Fluesterpost-Prometheus-Metriken
#[derive(Clone)]
pub struct P2pMetrics {
    pub registry: Arc<Registry>,

    // Verbindungs-Metriken
    pub verbindungen_aktiv: IntGauge,
    pub verbindungen_ersetzt: IntCounter,
    pub handshakes_fehlgeschlagen: IntCounter,

    // Transport-Metriken
    pub frames_gesendet: IntCounter,
    pub frames_empfangen: IntCounter,
    pub bytes_gesendet: IntCounter,
    pub bytes_empfangen: IntCounter,

    // Sitzungs-Metriken
    pub entschluesselung_fehlgeschlagen: IntCounter,
    pub nachrichten_zugestellt: IntCounterVec,
}

fn zaehler(registry: &Registry, name: &str, hilfe: &str) -> Result<IntCounter> {
    let counter = IntCounter::with_opts(Opts::new(name, hilfe))?;
    registry.register(Box::new(counter.clone()))?;
    Ok(counter)
}

impl P2pMetrics {
    /// Erstellt und registriert alle Metriken in einer neuen Registry
    pub fn neu() -> Result<Self> {
        let registry = Registry::new();

        // --- Verbindungen ---
        let verbindungen_aktiv = IntGauge::with_opts(Opts::new(
            "fluesterpost_connections_active",
            "Anzahl aktuell verbundener Peers",
        ))?;
        registry.register(Box::new(verbindungen_aktiv.clone()))?;

        let verbindungen_ersetzt = zaehler(
            &registry,
            "fluesterpost_connections_replaced_total",
            "Durch eine neuere Verbindung ersetzte Verbindungen",
        )?;
        let handshakes_fehlgeschlagen = zaehler(
            &registry,
            "fluesterpost_handshake_failures_total",
            "Fehlgeschlagene Handshakes (eingehend und ausgehend)",
        )?;

        // --- Transport ---
        let frames_gesendet = zaehler(
            &registry,
            "fluesterpost_frames_sent_total",
            "Gesendete Frames",
        )?;
        let frames_empfangen = zaehler(
            &registry,
            "fluesterpost_frames_received_total",
            "Empfangene Frames",
        )?;
        let bytes_gesendet = zaehler(
            &registry,
            "fluesterpost_bytes_sent_total",
            "Gesendete Payload-Bytes",
        )?;
        let bytes_empfangen = zaehler(
            &registry,
            "fluesterpost_bytes_received_total",
            "Empfangene Payload-Bytes",
        )?;

        // --- Sitzung ---
        let entschluesselung_fehlgeschlagen = zaehler(
            &registry,
            "fluesterpost_decrypt_failures_total",
            "Verworfene Envelopes (Parsen oder Entschluesseln fehlgeschlagen)",
        )?;

        let nachrichten_zugestellt = IntCounterVec::new(
            Opts::new(
                "fluesterpost_messages_delivered_total",
                "An die Anwendung zugestellte Nachrichten",
            ),
            &["kind"],
        )?;
        registry.register(Box::new(nachrichten_zugestellt.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            verbindungen_aktiv,
            verbindungen_ersetzt,
            handshakes_fehlgeschlagen,
            frames_gesendet,
            frames_empfangen,
            bytes_gesendet,
            bytes_empfangen,
            entschluesselung_fehlgeschlagen,
            nachrichten_zugestellt,
        })
    }

    /// Zaehlt eine zugestellte Nachricht der Art `kind`
    pub fn zugestellt(&self, kind: &str) {
        self.nachrichten_zugestellt.with_label_values(&[kind]).inc();
    }

    /// Exportiert alle Metriken im Prometheus-Textformat
    pub fn exportieren(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

/// Axum-Router fuer den `/metrics`-Endpunkt
pub fn metrics_router(metriken: P2pMetrics) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(metriken)
}

async fn metrics_handler(State(metriken): State<P2pMetrics>) -> impl IntoResponse {
    match metriken.exportieren() {
        Ok(text) => (
            axum::http::StatusCode::OK,
            [(
                axum::http::header::CONTENT_TYPE,
                "text/plain; version=0.0.4",
            )],
            text,
        )
            .into_response(),
        Err(err) => {
            tracing::error!("Metriken-Export fehlgeschlagen: {err}");
            axum::http::StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
