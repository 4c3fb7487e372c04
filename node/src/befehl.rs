//! Befehlsparser fuer die Kommandozeile des Knotens
//!
//! Zeilenbasierte Befehle:
//!   msg <peer> <text...>
//!   audio <peer> <datei>
//!   steg <peer> <bilddatei> <versteckter text...>
//!   adresse <peer> <ip> <port>
//!   verbinden | online | peers | hilfe | ende
//!
//! Dateipfade koennen mit "..." gequotet werden.

use thiserror::Error;

/// Ein geparster Befehl
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Befehl {
    Nachricht { peer: String, text: String },
    Audio { peer: String, datei: String },
    Steg { peer: String, bild: String, text: String },
    Adresse { peer: String, ip: String, port: u16 },
    /// Verbindungen zu allen Online-Freunden aufbauen
    Verbinden,
    /// Online-Status an verbundene Peers senden
    Online,
    Peers,
    Hilfe,
    Ende,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BefehlFehler {
    #[error("Leere Befehlszeile")]
    Leer,

    #[error("Unbekannter Befehl: {0}")]
    Unbekannt(String),

    #[error("{befehl}: Argument '{argument}' fehlt")]
    FehlendesArgument {
        befehl: &'static str,
        argument: &'static str,
    },

    #[error("Ungueltiger Port: {0}")]
    UngueltigerPort(String),
}

pub const HILFE: &str = "\
Befehle:
  msg <peer> <text>               Textnachricht senden
  audio <peer> <datei>            Sprachnachricht senden
  steg <peer> <bild> <text>       Bild mit versteckter Nachricht senden
  adresse <peer> <ip> <port>      Adresse eines Peers aktualisieren
  verbinden                       Mit allen Online-Freunden verbinden
  online                          Online-Status ankuendigen
  peers                           Verbundene Peers anzeigen
  hilfe                           Diese Hilfe
  ende                            Knoten beenden";

/// Parst eine Befehlszeile
pub fn parse_line(line: &str) -> Result<Befehl, BefehlFehler> {
    let (name, rest) = naechstes_token(line).ok_or(BefehlFehler::Leer)?;

    match name.to_lowercase().as_str() {
        "msg" => {
            let (peer, rest) = pflicht(rest, "msg", "peer")?;
            let text = rest_text(rest, "msg", "text")?;
            Ok(Befehl::Nachricht { peer, text })
        }
        "audio" => {
            let (peer, rest) = pflicht(rest, "audio", "peer")?;
            let (datei, _) = pflicht(rest, "audio", "datei")?;
            Ok(Befehl::Audio { peer, datei })
        }
        "steg" => {
            let (peer, rest) = pflicht(rest, "steg", "peer")?;
            let (bild, rest) = pflicht(rest, "steg", "bild")?;
            let text = rest_text(rest, "steg", "text")?;
            Ok(Befehl::Steg { peer, bild, text })
        }
        "adresse" => {
            let (peer, rest) = pflicht(rest, "adresse", "peer")?;
            let (ip, rest) = pflicht(rest, "adresse", "ip")?;
            let (port, _) = pflicht(rest, "adresse", "port")?;
            let port = port
                .parse::<u16>()
                .map_err(|_| BefehlFehler::UngueltigerPort(port))?;
            Ok(Befehl::Adresse { peer, ip, port })
        }
        "verbinden" => Ok(Befehl::Verbinden),
        "online" => Ok(Befehl::Online),
        "peers" => Ok(Befehl::Peers),
        "hilfe" | "help" | "?" => Ok(Befehl::Hilfe),
        "ende" | "quit" | "exit" => Ok(Befehl::Ende),
        _ => Err(BefehlFehler::Unbekannt(name)),
    }
}

fn pflicht<'a>(
    input: &'a str,
    befehl: &'static str,
    argument: &'static str,
) -> Result<(String, &'a str), BefehlFehler> {
    naechstes_token(input).ok_or(BefehlFehler::FehlendesArgument { befehl, argument })
}

/// Rest der Zeile als Freitext (Leerzeichen bleiben erhalten)
fn rest_text(
    input: &str,
    befehl: &'static str,
    argument: &'static str,
) -> Result<String, BefehlFehler> {
    let text = input.trim();
    if text.is_empty() {
        return Err(BefehlFehler::FehlendesArgument { befehl, argument });
    }
    Ok(text.to_string())
}

/// Liest das naechste Token, beachtet "quoted" Werte
///
/// Gibt das Token und den unverbrauchten Rest zurueck.
fn naechstes_token(input: &str) -> Option<(String, &str)> {
    let input = input.trim_start();
    if input.is_empty() {
        return None;
    }

    if let Some(quoted) = input.strip_prefix('"') {
        return match quoted.find('"') {
            Some(ende) => Some((quoted[..ende].to_string(), &quoted[ende + 1..])),
            // Ohne schliessendes Quote: Rest der Zeile
            None => Some((quoted.to_string(), "")),
        };
    }

    let ende = input.find(char::is_whitespace).unwrap_or(input.len());
    Some((input[..ende].to_string(), &input[ende..]))
}
