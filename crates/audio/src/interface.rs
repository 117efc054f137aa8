//! Audio-Schnittstelle und Paketierer
//!
//! `AudioInterface` ist die Sicht der Anruf-Schicht auf das Audio-Subsystem.
//! Codec-Varianten (A-law, u-law) umhuellen die PCM-Engine und exponieren
//! dieselbe Schnittstelle mit kleinerer Sample-Groesse.

use std::sync::Arc;

use crate::error::AudioResult;

/// Audio-Format eines Interfaces (Subclass des Voice-PDUs)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    /// 16-bit linear, little-endian (Durchreiche)
    Lin16,
    /// G.711 A-law
    Alaw,
    /// G.711 u-law
    Ulaw,
}

/// Paketierer: wird vom 50-Hz-Sende-Takt einmal pro Frame aufgerufen
pub trait Packetizer: Send {
    /// Nimmt einen Frame vom Mikrofon und verschickt ihn
    fn send(&mut self) -> std::io::Result<()>;
}

/// Schnittstelle zum Audio-Subsystem (Aufnahme, Wiedergabe, Rufton)
pub trait AudioInterface: Send + Sync {
    /// Sample-Groesse eines Frames in Bytes
    fn sample_size(&self) -> usize;

    /// Format dieses Interfaces
    fn sample_format(&self) -> SampleFormat;

    /// Liest einen Frame vom Mikrofon und liefert den Geraete-Zeitstempel
    ///
    /// Liegt kein frischer Frame vor, wird Stille geliefert (der Takt des
    /// Senders bleibt dadurch ehrlich).
    fn read_with_timestamp(&self, buf: &mut [u8]) -> AudioResult<i64>;

    /// Reiht einen empfangenen Frame in den De-Jitter-Ring ein
    fn write_buffered(&self, buf: &[u8], timestamp_ms: i64) -> AudioResult<()>;

    /// Schreibt direkt aufs Geraet, am De-Jitter-Ring vorbei (Rufton)
    fn write_directly(&self, buf: &[u8]);

    /// Startet die Aufnahme; liefert die Geraeteuhr beim Start
    fn start_recording(&self) -> i64;

    /// Stoppt die Aufnahme
    fn stop_recording(&self);

    /// Startet die Wiedergabe
    fn start_play(&self);

    /// Stoppt die Wiedergabe
    fn stop_play(&self);

    /// Startet das Rufsignal
    fn start_ringing(&self);

    /// Stoppt das Rufsignal
    fn stop_ringing(&self);

    /// Setzt (oder entfernt) den aktiven Paketierer des Sende-Takts
    fn set_packetizer(&self, packetizer: Option<Box<dyn Packetizer>>);

    /// Liefert eine Interface-Sicht im gewuenschten Format
    fn by_format(self: Arc<Self>, format: SampleFormat) -> Arc<dyn AudioInterface>;

    /// Beendet alle Worker und gibt Geraete frei
    fn shutdown(&self);
}
