//! PCM-Geraeteschnittstelle
//!
//! Der Zugriff auf echte Audio-Hardware ist ein externer Mitspieler; dieses
//! Modul definiert nur die Naht: ein blockierendes Frame-Geraet mit eigener
//! Uhr. `SimulatedDevice` ist die mitgelieferte Implementierung fuer Tests
//! und den Demo-Betrieb – eine wanduhr-getaktete Stille-Quelle bzw. eine
//! Senke, deren Puffer in Echtzeit abfliesst.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::error::AudioResult;

/// Blockierendes PCM-Geraet (Mikrofon- oder Lautsprecherseite)
pub trait PcmDevice: Send + Sync {
    /// Liest genau einen Frame; blockiert bis Daten vorliegen
    fn read(&self, buf: &mut [u8]) -> AudioResult<()>;

    /// Schreibt Samples in den Geraetepuffer
    fn write(&self, buf: &[u8]);

    /// Bytes, die ohne Blockieren geschrieben (Ausgabe) bzw. gelesen
    /// (Eingabe) werden koennen
    fn available(&self) -> usize;

    /// Geraeteuhr in Millisekunden
    fn clock_ms(&self) -> i64;

    /// Startet das Geraet
    fn start(&self);

    /// Stoppt das Geraet
    fn stop(&self);

    /// Verwirft gepufferte Daten
    fn flush(&self);

    /// Gibt true zurueck wenn das Geraet laeuft
    fn is_active(&self) -> bool;
}

/// Bytes pro Millisekunde bei 8 kHz / 16 bit / mono
const BYTES_PER_MS: u64 = 16;

/// Simuliertes PCM-Geraet
///
/// Eingaberolle: `read` taktet auf die Wanduhr (ein Frame pro Intervall)
/// und liefert Stille. Ausgaberolle: `write` fuellt einen Puffer fester
/// Kapazitaet, der mit Echtzeit-Rate abfliesst.
pub struct SimulatedDevice {
    created: Instant,
    active: AtomicBool,
    frame_len: usize,
    capacity: usize,
    state: Mutex<SimState>,
}

struct SimState {
    frames_read: u64,
    /// Bytes geschrieben (abzueglich Abfluss wird daraus `pending`)
    written_bytes: u64,
    /// Abfluss-Referenzpunkt
    drained_until: Instant,
}

impl SimulatedDevice {
    /// Erstellt ein Geraet mit Frame-Laenge und Ausgabepuffer-Kapazitaet
    pub fn new(frame_len: usize, capacity: usize) -> Self {
        let now = Instant::now();
        Self {
            created: now,
            active: AtomicBool::new(false),
            frame_len,
            capacity,
            state: Mutex::new(SimState {
                frames_read: 0,
                written_bytes: 0,
                drained_until: now,
            }),
        }
    }

    fn pending_bytes(&self) -> usize {
        let mut state = self.state.lock();
        let elapsed = state.drained_until.elapsed();
        let drained = elapsed.as_millis() as u64 * BYTES_PER_MS;
        if drained >= state.written_bytes {
            state.written_bytes = 0;
        } else {
            state.written_bytes -= drained;
        }
        state.drained_until = Instant::now();
        state.written_bytes as usize
    }
}

impl PcmDevice for SimulatedDevice {
    fn read(&self, buf: &mut [u8]) -> AudioResult<()> {
        let frame_ms = (self.frame_len as u64 / BYTES_PER_MS).max(1);
        let due = {
            let mut state = self.state.lock();
            state.frames_read += 1;
            self.created + Duration::from_millis(state.frames_read * frame_ms)
        };

        let now = Instant::now();
        if due > now {
            std::thread::sleep(due - now);
        }

        buf.fill(0);
        Ok(())
    }

    fn write(&self, buf: &[u8]) {
        self.pending_bytes();
        let mut state = self.state.lock();
        state.written_bytes = (state.written_bytes + buf.len() as u64)
            .min(self.capacity as u64);
    }

    fn available(&self) -> usize {
        self.capacity.saturating_sub(self.pending_bytes())
    }

    fn clock_ms(&self) -> i64 {
        self.created.elapsed().as_millis() as i64
    }

    fn start(&self) {
        self.active.store(true, Ordering::SeqCst);
    }

    fn stop(&self) {
        self.active.store(false, Ordering::SeqCst);
    }

    fn flush(&self) {
        let mut state = self.state.lock();
        state.written_bytes = 0;
        state.drained_until = Instant::now();
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_liefert_stille() {
        let dev = SimulatedDevice::new(64, 1920);
        let mut buf = vec![0xFFu8; 64];
        dev.read(&mut buf).unwrap();
        assert!(buf.iter().all(|&b| b == 0));
    }

    #[test]
    fn write_reduziert_available() {
        let dev = SimulatedDevice::new(320, 1920);
        let vorher = dev.available();
        dev.write(&[0u8; 640]);
        assert!(dev.available() < vorher);
    }

    #[test]
    fn flush_leert_puffer() {
        let dev = SimulatedDevice::new(320, 1920);
        dev.write(&[0u8; 1000]);
        dev.flush();
        assert_eq!(dev.available(), 1920);
    }

    #[test]
    fn start_stop_flag() {
        let dev = SimulatedDevice::new(320, 1920);
        assert!(!dev.is_active());
        dev.start();
        assert!(dev.is_active());
        dev.stop();
        assert!(!dev.is_active());
    }

    #[test]
    fn uhr_laeuft() {
        let dev = SimulatedDevice::new(32, 1920);
        let a = dev.clock_ms();
        std::thread::sleep(Duration::from_millis(5));
        assert!(dev.clock_ms() >= a);
    }
}
