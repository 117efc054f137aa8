//! Fehlertypen der Signalisierung

use thiserror::Error;

/// Fehler im Signalisierungs-Client
#[derive(Debug, Error)]
pub enum SignalError {
    #[error("Verbindung fehlgeschlagen: {0}")]
    Verbindung(String),

    #[error("IO-Fehler: {0}")]
    Io(#[from] std::io::Error),

    #[error("Zeilen-Codec-Fehler: {0}")]
    Codec(#[from] tokio_util::codec::LinesCodecError),
}
