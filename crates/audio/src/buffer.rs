//! Audio-Puffer mit Zeitstempel
//!
//! Ein Ring-Slot: Byte-Daten, Zeitstempel in Millisekunden und ein
//! `written`-Flag, das anzeigt ob geschriebene, noch ungelesene Daten
//! vorliegen.

/// Ein zeitgestempelter Audio-Slot
#[derive(Debug)]
pub struct AudioBuffer {
    data: Vec<u8>,
    timestamp: i64,
    written: bool,
}

impl AudioBuffer {
    /// Erstellt einen Slot der gegebenen Groesse (mit Nullen gefuellt)
    pub fn new(size: usize) -> Self {
        Self {
            data: vec![0u8; size],
            timestamp: 0,
            written: false,
        }
    }

    /// Zugriff auf die Daten
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Veraenderlicher Zugriff auf die Daten
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Slot-Groesse in Bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Gibt true zurueck wenn der Slot leer dimensioniert ist
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Status des `written`-Flags
    pub fn is_written(&self) -> bool {
        self.written
    }

    /// Setzt das `written`-Flag
    pub fn set_written(&mut self) {
        self.written = true;
    }

    /// Loescht das `written`-Flag (Slot gilt als gelesen)
    pub fn set_read(&mut self) {
        self.written = false;
    }

    /// Zeitstempel des Slots (ms)
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    /// Setzt den Zeitstempel (ms)
    pub fn set_timestamp(&mut self, timestamp: i64) {
        self.timestamp = timestamp;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_lebenszyklus() {
        let mut ab = AudioBuffer::new(4);
        assert!(!ab.is_written());
        ab.set_written();
        assert!(ab.is_written());
        ab.set_read();
        assert!(!ab.is_written());
    }

    #[test]
    fn zeitstempel_und_daten() {
        let mut ab = AudioBuffer::new(8);
        ab.set_timestamp(12340);
        ab.data_mut()[0] = 0xAB;
        assert_eq!(ab.timestamp(), 12340);
        assert_eq!(ab.data()[0], 0xAB);
        assert_eq!(ab.len(), 8);
    }
}
