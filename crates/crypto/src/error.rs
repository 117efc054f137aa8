//! Fehlertypen des Krypto-Subsystems

use thiserror::Error;

/// Result-Alias fuer Krypto-Operationen
pub type CryptoResult<T> = std::result::Result<T, CryptoError>;

/// Fehler im Krypto-Subsystem
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Schluesselerzeugung fehlgeschlagen: {0}")]
    KeyGeneration(String),

    #[error("Schluessel nicht dekodierbar: {0}")]
    KeyDecoding(String),

    #[error("Ungueltige Schluessellaenge: erwartet {erwartet}, erhalten {erhalten}")]
    UngueltigeSchluesselLaenge { erwartet: usize, erhalten: usize },

    #[error("Verschluesselung fehlgeschlagen: {0}")]
    Verschluesselung(String),

    #[error("Entschluesselung fehlgeschlagen: {0}")]
    Entschluesselung(String),

    #[error("Signatur fehlgeschlagen: {0}")]
    Signatur(String),

    #[error("Base64-Dekodierung fehlgeschlagen: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Objekt-Serialisierung fehlgeschlagen: {0}")]
    Serialisierung(#[from] serde_json::Error),

    #[error("Unerwarteter Objekttyp: erwartet {0}")]
    UnerwartetesObjekt(&'static str),

    #[error("RSA-Blockgroesse nicht positiv (Schluessel zu klein)")]
    BlockGroesse,

    #[error("Plausibilitaetspruefung des Schluesselpaars fehlgeschlagen")]
    SanityCheck,

    #[error("Identitaet inaktiv")]
    Inaktiv,

    #[error("IO-Fehler: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fehler_anzeige() {
        let e = CryptoError::UngueltigeSchluesselLaenge {
            erwartet: 4,
            erhalten: 0,
        };
        assert!(e.to_string().contains("erwartet 4"));
    }
}
