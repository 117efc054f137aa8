//! Fehlertypen des Audio-Subsystems

use thiserror::Error;

/// Result-Alias fuer Audio-Operationen
pub type AudioResult<T> = std::result::Result<T, AudioError>;

/// Fehler im Audio-Subsystem
#[derive(Debug, Error)]
pub enum AudioError {
    #[error("Geraetefehler: {0}")]
    Geraet(String),

    #[error("Kein Audio-Geraet verfuegbar")]
    KeinGeraet,

    #[error("Puffergroesse passt nicht: erwartet {erwartet}, erhalten {erhalten}")]
    PufferGroesse { erwartet: usize, erhalten: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fehler_anzeige() {
        let e = AudioError::PufferGroesse {
            erwartet: 320,
            erhalten: 100,
        };
        assert!(e.to_string().contains("320"));
    }
}
