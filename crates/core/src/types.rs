//! Gemeinsame Grundtypen fuer Fluesterfon
//!
//! Benutzerkennungen sind frei gewaehlte Namen auf dem Rendezvous-Relay.
//! Das Newtype-Pattern verhindert Verwechslung mit sonstigen Strings und
//! erzwingt die Normalisierung (Whitespace-Laeufe werden zu `-`).

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Benutzerkennung auf dem Rendezvous-Kanal
///
/// Wird immer normalisiert gespeichert: fuehrende/folgende Leerzeichen
/// entfernt, innere Whitespace-Laeufe durch `-` ersetzt.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(String);

impl UserId {
    /// Erstellt eine normalisierte Benutzerkennung
    pub fn new(raw: &str) -> Self {
        Self(normalize_user_id(raw))
    }

    /// Gibt die Kennung als &str zurueck
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Vergleich ohne Beachtung der Gross-/Kleinschreibung
    ///
    /// Die Signalisierung vergleicht Benutzernamen case-insensitiv.
    pub fn matches(&self, other: &str) -> bool {
        self.0.eq_ignore_ascii_case(other)
    }

    /// Gibt true zurueck wenn die Kennung leer ist
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Ersetzt Whitespace-Laeufe durch `-` und schneidet Raender ab
pub fn normalize_user_id(raw: &str) -> String {
    raw.trim()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
}

/// Sicherheitsstufe der aktuellen Verbindung
///
/// Wird vom Session-Controller bei jeder Vertrauensentscheidung gesetzt
/// und an die einbettende Oberflaeche gemeldet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SecurityLevel {
    /// Unverschluesselt
    Unsecured,
    /// Verschluesselt, aber Gegenstelle nicht authentifiziert
    Unverified,
    /// Verschluesselt und gegen autorisierte Schluessel verifiziert
    Verified,
}

impl std::fmt::Display for SecurityLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Unsecured => "unverschluesselt",
            Self::Unverified => "verschluesselt/unverifiziert",
            Self::Verified => "verschluesselt/verifiziert",
        };
        write!(f, "{s}")
    }
}

/// Aktuelle Wanduhr-Zeit in Millisekunden seit der Unix-Epoche
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_id_normalisierung() {
        assert_eq!(UserId::new("  Max   Mustermann ").as_str(), "Max-Mustermann");
        assert_eq!(UserId::new("alice").as_str(), "alice");
        assert_eq!(UserId::new("a \t b\nc").as_str(), "a-b-c");
    }

    #[test]
    fn user_id_case_insensitiver_vergleich() {
        let id = UserId::new("Alice");
        assert!(id.matches("alice"));
        assert!(id.matches("ALICE"));
        assert!(!id.matches("bob"));
    }

    #[test]
    fn user_id_leer() {
        assert!(UserId::new("   ").is_empty());
        assert!(!UserId::new("x").is_empty());
    }

    #[test]
    fn security_level_anzeige() {
        assert_eq!(SecurityLevel::Unsecured.to_string(), "unverschluesselt");
        assert!(SecurityLevel::Verified.to_string().contains("verifiziert"));
    }

    #[test]
    fn user_id_serde_round_trip() {
        let id = UserId::new("Max Mustermann");
        let json = serde_json::to_string(&id).unwrap();
        let zurueck: UserId = serde_json::from_str(&json).unwrap();
        assert_eq!(zurueck, id);
    }

    #[test]
    fn now_ms_monoton_genug() {
        let a = now_ms();
        let b = now_ms();
        assert!(b >= a);
    }
}
