//! fluesterpost-node – Bibliotheks-Root
//!
//! Deklariert die Knoten-Module und stellt den oeffentlichen Einstiegspunkt
//! fuer Integrationstests bereit.

pub mod befehl;
pub mod config;

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, watch};

use fluesterpost_core::PeerAddress;
use fluesterpost_crypto::asymmetric;
use fluesterpost_observability::{observability_server_starten, HealthState, P2pMetrics};
use fluesterpost_session::{
    BinaryKind, DeliveredMessage, PassthroughCodec, SessionOrchestrator, StaticDirectory,
};

use befehl::{Befehl, HILFE};
use config::NodeConfig;

/// Haelt den laufenden Knoten-Zustand zusammen
pub struct Node {
    pub config: NodeConfig,
}

impl Node {
    /// Erstellt einen neuen Knoten aus der gegebenen Konfiguration
    pub fn neu(config: NodeConfig) -> Self {
        Self { config }
    }

    /// Startet alle Subsysteme und laeuft bis `ende`, EOF oder Ctrl-C
    ///
    /// Reihenfolge:
    /// 1. Schluessel-Paar laden oder erzeugen
    /// 2. Sitzung aufbauen, Listener starten
    /// 3. Observability-Server starten (optional)
    /// 4. Mit Online-Freunden verbinden, Online-Status ankuendigen
    /// 5. Befehle von stdin verarbeiten
    pub async fn starten(self) -> Result<()> {
        let identitaet = &self.config.identitaet;
        let schluessel = asymmetric::load_or_create(
            Path::new(&identitaet.privater_schluessel),
            Path::new(&identitaet.oeffentlicher_schluessel),
        )?;

        let metriken = P2pMetrics::neu()?;
        let verzeichnis = Arc::new(StaticDirectory::mit_eintraegen(
            self.config.peer_records()?,
        ));

        let (session, zustellung) = SessionOrchestrator::neu(
            self.config.p2p_config(),
            identitaet.benutzername.clone(),
            schluessel,
            verzeichnis.clone(),
            Arc::new(PassthroughCodec),
            Some(metriken.clone()),
        )?;

        let addr = session.start().await?;
        let health = HealthState::neu(metriken.clone());
        health.listener_status_setzen(true);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        if self.config.observability.aktiviert {
            let bind = self.config.observability_bind_adresse()?;
            let (m, h) = (metriken.clone(), health.clone());
            tokio::spawn(async move {
                if let Err(e) = observability_server_starten(bind, m, h, shutdown_rx).await {
                    tracing::error!(fehler = %e, "Observability-Server beendet");
                }
            });
        }

        tracing::info!(
            benutzername = %identitaet.benutzername,
            adresse = %addr,
            peers = verzeichnis.len(),
            "Knoten laeuft"
        );

        // "Login": bekannte Freunde verbinden und benachrichtigen
        let verbunden = session.connect_online_friends().await?;
        if !verbunden.is_empty() {
            session.announce_presence().await?;
        }

        let anzeige = tokio::spawn(zustellung_anzeigen(zustellung));

        println!("Fluesterpost als '{}' auf {addr}. 'hilfe' fuer Befehle.", identitaet.benutzername);
        let ergebnis = kommandozeile(&session, &verzeichnis).await;

        session.shutdown().await;
        health.listener_status_setzen(false);
        let _ = shutdown_tx.send(true);
        anzeige.abort();

        tracing::info!("Knoten beendet");
        ergebnis
    }
}

/// Liest Befehle von stdin bis `ende`, EOF oder Ctrl-C
async fn kommandozeile(session: &SessionOrchestrator, verzeichnis: &StaticDirectory) -> Result<()> {
    let mut zeilen = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            zeile = zeilen.next_line() => {
                let Some(zeile) = zeile? else { break };
                if zeile.trim().is_empty() {
                    continue;
                }
                match befehl::parse_line(&zeile) {
                    Ok(Befehl::Ende) => break,
                    Ok(b) => match ausfuehren(session, verzeichnis, b).await {
                        Ok(ausgabe) => println!("{ausgabe}"),
                        Err(e) => println!("Fehler: {e}"),
                    },
                    Err(e) => println!("{e} ('hilfe' fuer eine Uebersicht)"),
                }
            }

            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutdown-Signal empfangen, Knoten wird beendet");
                break;
            }
        }
    }

    Ok(())
}

/// Fuehrt einen Befehl aus und gibt die Ausgabe fuer den Benutzer zurueck
pub async fn ausfuehren(
    session: &SessionOrchestrator,
    verzeichnis: &StaticDirectory,
    befehl: Befehl,
) -> Result<String> {
    let ausgabe = match befehl {
        Befehl::Nachricht { peer, text } => {
            session.send_text(&peer, &text).await?;
            format!("-> {peer}: {text}")
        }
        Befehl::Audio { peer, datei } => {
            let audio = tokio::fs::read(&datei).await?;
            session.send_binary(&peer, &audio, BinaryKind::Audio).await?;
            format!("-> {peer}: Sprachnachricht ({} Bytes)", audio.len())
        }
        Befehl::Steg { peer, bild, text } => {
            let cover = tokio::fs::read(&bild).await?;
            session.send_steg_image(&peer, &cover, &text).await?;
            format!("-> {peer}: Bild mit versteckter Nachricht ({} Bytes)", cover.len())
        }
        Befehl::Adresse { peer, ip, port } => {
            let adresse = PeerAddress::new(ip, port);
            if verzeichnis.adresse_aktualisieren(&peer, adresse.clone()) {
                format!("{peer} ist jetzt unter {adresse} erreichbar")
            } else {
                format!("{peer} ist nicht im Verzeichnis")
            }
        }
        Befehl::Verbinden => {
            let neu = session.connect_online_friends().await?;
            if neu.is_empty() {
                "Keine neuen Verbindungen".to_string()
            } else {
                format!("Verbunden mit: {}", neu.join(", "))
            }
        }
        Befehl::Online => {
            let anzahl = session.announce_presence().await?;
            format!("Online-Status an {anzahl} Peer(s) gesendet")
        }
        Befehl::Peers => {
            let peers = session.manager().connected_peers();
            if peers.is_empty() {
                "Keine verbundenen Peers".to_string()
            } else {
                peers.join("\n")
            }
        }
        Befehl::Hilfe => HILFE.to_string(),
        Befehl::Ende => String::new(),
    };
    Ok(ausgabe)
}

/// Gibt zugestellte Nachrichten auf stdout aus
async fn zustellung_anzeigen(mut zustellung: mpsc::Receiver<DeliveredMessage>) {
    while let Some(nachricht) = zustellung.recv().await {
        println!("{}", anzeige_text(&nachricht));
    }
}

/// Einzeilige Darstellung einer zugestellten Nachricht
pub fn anzeige_text(nachricht: &DeliveredMessage) -> String {
    match nachricht {
        DeliveredMessage::Text { sender, text } => format!("[{sender}] {text}"),
        DeliveredMessage::StegImage {
            sender,
            image,
            hidden_message,
            extracted,
        } => {
            let mut zeile = format!(
                "[{sender}] Bild ({} Bytes), versteckte Nachricht: {hidden_message}",
                image.len()
            );
            if let Some(text) = extracted {
                zeile.push_str(&format!(", aus dem Bild gelesen: {text}"));
            }
            zeile
        }
        DeliveredMessage::Audio { sender, audio } => {
            format!("[{sender}] Sprachnachricht ({} Bytes)", audio.len())
        }
        DeliveredMessage::PresenceRefresh { sender } => format!("* {sender} ist online"),
    }
}
