//! Verzeichnis-Schnittstelle: Benutzername -> Adresse + oeffentlicher Schluessel
//!
//! Das echte Verzeichnis (Login, Freundesliste, Schluesselabfrage) ist ein
//! externer Dienst. Die Sitzungsschicht kennt nur diesen Trait.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use fluesterpost_core::{PeerAddress, PeerRecord};

/// Quelle fuer Peer-Adressen und -Schluessel
#[async_trait]
pub trait Directory: Send + Sync {
    /// Sucht den aktuellen Eintrag eines Benutzers
    async fn lookup(&self, username: &str) -> Option<PeerRecord>;

    /// Alle aktuell erreichbaren Freunde
    async fn online_friends(&self) -> Vec<PeerRecord>;
}

/// In-Memory-Verzeichnis, zur Laufzeit aktualisierbar
///
/// Jeder Eintrag gilt als online.
#[derive(Debug, Default)]
pub struct StaticDirectory {
    eintraege: RwLock<HashMap<String, PeerRecord>>,
}

impl StaticDirectory {
    pub fn neu() -> Self {
        Self::default()
    }

    pub fn mit_eintraegen(eintraege: impl IntoIterator<Item = PeerRecord>) -> Self {
        let dir = Self::neu();
        for record in eintraege {
            dir.eintragen(record);
        }
        dir
    }

    /// Traegt einen Peer ein oder ersetzt dessen bisherigen Eintrag
    pub fn eintragen(&self, record: PeerRecord) -> Option<PeerRecord> {
        self.eintraege.write().insert(record.username.clone(), record)
    }

    pub fn entfernen(&self, username: &str) -> Option<PeerRecord> {
        self.eintraege.write().remove(username)
    }

    /// Setzt eine neue Listener-Adresse; `false` wenn der Peer unbekannt ist
    pub fn adresse_aktualisieren(&self, username: &str, address: PeerAddress) -> bool {
        match self.eintraege.write().get_mut(username) {
            Some(record) => {
                record.address = address;
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.eintraege.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.eintraege.read().is_empty()
    }
}

#[async_trait]
impl Directory for StaticDirectory {
    async fn lookup(&self, username: &str) -> Option<PeerRecord> {
        self.eintraege.read().get(username).cloned()
    }

    async fn online_friends(&self) -> Vec<PeerRecord> {
        let mut alle: Vec<PeerRecord> = self.eintraege.read().values().cloned().collect();
        alle.sort_by(|a, b| a.username.cmp(&b.username));
        alle
    }
}
