//! Fehlertypen fuer Fluesterfon
//!
//! Zentraler Fehler-Enum der obersten Ebene. Die Subsysteme (Krypto, Audio,
//! Medien, Signalisierung) definieren eigene Fehler und werden an der
//! Controller-Grenze in diesen Enum ueberfuehrt.

use thiserror::Error;

/// Globaler Result-Alias fuer Fluesterfon
pub type Result<T> = std::result::Result<T, FluesterfonError>;

/// Alle moeglichen Fehler an der obersten Ebene
#[derive(Debug, Error)]
pub enum FluesterfonError {
    // --- Verbindung & Netzwerk ---
    #[error("Verbindung fehlgeschlagen: {0}")]
    Verbindung(String),

    #[error("Verbindung getrennt: {0}")]
    Getrennt(String),

    #[error("Kein freier UDP-Port im Bereich ab {0}")]
    KeinFreierPort(u16),

    // --- Kryptographie ---
    #[error("Identitaet nicht einsatzbereit: {0}")]
    Identitaet(String),

    #[error("Vertrauenspruefung fehlgeschlagen: {0}")]
    Vertrauen(String),

    // --- Anruf ---
    #[error("Anruf bereits aktiv")]
    AnrufAktiv,

    #[error("Kein Anruf aktiv")]
    KeinAnruf,

    // --- Konfiguration ---
    #[error("Konfigurationsfehler: {0}")]
    Konfiguration(String),

    // --- Audio ---
    #[error("Audiofehler: {0}")]
    Audio(String),

    // --- Intern ---
    #[error("Interner Fehler: {0}")]
    Intern(String),
}

impl FluesterfonError {
    /// Erstellt einen internen Fehler aus einer beliebigen Nachricht
    pub fn intern(msg: impl Into<String>) -> Self {
        Self::Intern(msg.into())
    }

    /// Gibt true zurueck wenn der Fehler wiederholbar sein koennte
    pub fn ist_wiederholbar(&self) -> bool {
        matches!(self, Self::Verbindung(_) | Self::Getrennt(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fehler_anzeige() {
        let e = FluesterfonError::Verbindung("Host unbekannt".into());
        assert_eq!(e.to_string(), "Verbindung fehlgeschlagen: Host unbekannt");
    }

    #[test]
    fn wiederholbar_erkennung() {
        assert!(FluesterfonError::Getrennt("test".into()).ist_wiederholbar());
        assert!(!FluesterfonError::AnrufAktiv.ist_wiederholbar());
    }

    #[test]
    fn port_fehler_nennt_basis() {
        let e = FluesterfonError::KeinFreierPort(47000);
        assert!(e.to_string().contains("47000"));
    }
}
