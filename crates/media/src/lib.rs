//! Fluesterfon Medien-Transport
//!
//! Peer-to-Peer-Sprachpfad ueber UDP: der Datagramm-Kanal bindet den Port
//! und ver-/entschluesselt pro Datagramm, der Remote-Peer entkoppelt den
//! Empfangspfad ueber eine Queue, der Anruf-Kontext fuehrt Sequenznummern
//! und Zeitbasis, und der Voice-Sender paketiert den 50-Hz-Strom.
//!
//! Besitzrichtung: Kanal -> Peer -> Anruf; der Anruf haelt nur eine
//! schwache Referenz zurueck auf den Peer (Sendepfad).

pub mod call;
pub mod channel;
pub mod error;
pub mod peer;
pub mod sender;

#[cfg(test)]
pub(crate) mod tests_support;

pub use call::CallContext;
pub use channel::DatagramChannel;
pub use error::MediaError;
pub use peer::RemotePeer;
pub use sender::VoiceSender;
