//! Fehlertypen des Medien-Transports

use thiserror::Error;

/// Fehler im Medien-Transport
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("Kein freier UDP-Port im Bereich [{0}, {0}+100)")]
    KeinFreierPort(u16),

    #[error("IO-Fehler: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fehler_anzeige() {
        let e = MediaError::KeinFreierPort(47000);
        assert!(e.to_string().contains("47000"));
    }
}
