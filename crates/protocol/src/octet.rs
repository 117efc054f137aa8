//! Oktett-Puffer mit Positions-Cursor
//!
//! Serialisierungs-Primitiv fuer den PDU-Codec: big-endian Lese- und
//! Schreiboperationen fuer 8/16/32-Bit-Werte am Cursor oder an absolutem
//! Offset, dazu Block-Transfers und Slicing. Grenzverletzungen liefern
//! `OctetError::OutOfRange` statt zu panicken – die Plattform-Byteorder
//! spielt nirgends eine Rolle.

use thiserror::Error;

/// Fehler bei Puffer-Operationen
#[derive(Debug, Error, PartialEq, Eq)]
pub enum OctetError {
    /// Zugriff ausserhalb des Puffers
    #[error("Zugriff ausserhalb des Puffers: Offset {offset} + {len} > Kapazitaet {cap}")]
    OutOfRange { offset: usize, len: usize, cap: usize },
}

/// Byte-Container mit Cursor und Slice-Offset
#[derive(Debug, Clone)]
pub struct OctetBuffer {
    store: Vec<u8>,
    position: usize,
    slice_offset: usize,
}

impl OctetBuffer {
    /// Allokiert einen Puffer mit `size` Null-Bytes
    pub fn allocate(size: usize) -> Self {
        Self {
            store: vec![0u8; size],
            position: 0,
            slice_offset: 0,
        }
    }

    /// Uebernimmt ein bestehendes Byte-Array
    pub fn wrap(bytes: Vec<u8>) -> Self {
        Self {
            store: bytes,
            position: 0,
            slice_offset: 0,
        }
    }

    /// Erstellt einen neuen Puffer ab der aktuellen Cursor-Position
    ///
    /// Der Slice teilt sich nicht den Speicher mit dem Original; er enthaelt
    /// eine Kopie der restlichen Bytes mit Cursor 0.
    pub fn slice(&self) -> Self {
        Self {
            store: self.store[self.slice_offset + self.position..].to_vec(),
            position: 0,
            slice_offset: 0,
        }
    }

    /// Gibt den gesamten Backing-Store zurueck
    pub fn into_store(self) -> Vec<u8> {
        self.store
    }

    /// Gibt den Backing-Store als Slice zurueck
    pub fn as_bytes(&self) -> &[u8] {
        &self.store
    }

    /// Aktuelle Cursor-Position
    pub fn position(&self) -> usize {
        self.position
    }

    /// Restkapazitaet ab Cursor
    pub fn free_space(&self) -> usize {
        self.store.len().saturating_sub(self.slice_offset + self.position)
    }

    fn check(&self, offset: usize, len: usize) -> Result<usize, OctetError> {
        let abs = self.slice_offset + offset;
        if abs + len > self.store.len() {
            return Err(OctetError::OutOfRange {
                offset,
                len,
                cap: self.store.len() - self.slice_offset,
            });
        }
        Ok(abs)
    }

    // -----------------------------------------------------------------------
    // u8
    // -----------------------------------------------------------------------

    /// Liest ein Byte am Cursor
    pub fn get_u8(&mut self) -> Result<u8, OctetError> {
        let abs = self.check(self.position, 1)?;
        self.position += 1;
        Ok(self.store[abs])
    }

    /// Schreibt ein Byte am Cursor
    pub fn put_u8(&mut self, value: u8) -> Result<(), OctetError> {
        let abs = self.check(self.position, 1)?;
        self.store[abs] = value;
        self.position += 1;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // u16 (big-endian)
    // -----------------------------------------------------------------------

    /// Liest ein big-endian u16 am Cursor
    pub fn get_u16(&mut self) -> Result<u16, OctetError> {
        let v = self.get_u16_at(self.position)?;
        self.position += 2;
        Ok(v)
    }

    /// Liest ein big-endian u16 an absolutem Offset (Cursor unveraendert)
    pub fn get_u16_at(&self, offset: usize) -> Result<u16, OctetError> {
        let abs = self.check(offset, 2)?;
        Ok(u16::from_be_bytes([self.store[abs], self.store[abs + 1]]))
    }

    /// Schreibt ein big-endian u16 am Cursor
    pub fn put_u16(&mut self, value: u16) -> Result<(), OctetError> {
        self.put_u16_at(self.position, value)?;
        self.position += 2;
        Ok(())
    }

    /// Schreibt ein big-endian u16 an absolutem Offset (Cursor unveraendert)
    pub fn put_u16_at(&mut self, offset: usize, value: u16) -> Result<(), OctetError> {
        let abs = self.check(offset, 2)?;
        self.store[abs..abs + 2].copy_from_slice(&value.to_be_bytes());
        Ok(())
    }

    // -----------------------------------------------------------------------
    // u32 (big-endian)
    // -----------------------------------------------------------------------

    /// Liest ein big-endian u32 am Cursor
    pub fn get_u32(&mut self) -> Result<u32, OctetError> {
        let abs = self.check(self.position, 4)?;
        self.position += 4;
        Ok(u32::from_be_bytes([
            self.store[abs],
            self.store[abs + 1],
            self.store[abs + 2],
            self.store[abs + 3],
        ]))
    }

    /// Schreibt ein big-endian u32 am Cursor
    pub fn put_u32(&mut self, value: u32) -> Result<(), OctetError> {
        let abs = self.check(self.position, 4)?;
        self.store[abs..abs + 4].copy_from_slice(&value.to_be_bytes());
        self.position += 4;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // i16 (big-endian, fuer PCM-Hilfen)
    // -----------------------------------------------------------------------

    /// Liest ein big-endian i16 an absolutem Offset
    pub fn get_i16_at(&self, offset: usize) -> Result<i16, OctetError> {
        Ok(self.get_u16_at(offset)? as i16)
    }

    /// Schreibt ein big-endian i16 an absolutem Offset
    pub fn put_i16_at(&mut self, offset: usize, value: i16) -> Result<(), OctetError> {
        self.put_u16_at(offset, value as u16)
    }

    // -----------------------------------------------------------------------
    // Byte-Bereiche
    // -----------------------------------------------------------------------

    /// Schreibt ein Byte-Array am Cursor
    pub fn put_bytes(&mut self, bytes: &[u8]) -> Result<(), OctetError> {
        let abs = self.check(self.position, bytes.len())?;
        self.store[abs..abs + bytes.len()].copy_from_slice(bytes);
        self.position += bytes.len();
        Ok(())
    }

    /// Liest in das uebergebene Array; fuellt hoechstens die Restkapazitaet
    pub fn get_bytes(&mut self, out: &mut [u8]) -> usize {
        let len = out.len().min(self.free_space());
        let abs = self.slice_offset + self.position;
        out[..len].copy_from_slice(&self.store[abs..abs + len]);
        self.position += len;
        len
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn u16_round_trip_big_endian() {
        let mut buf = OctetBuffer::allocate(4);
        buf.put_u16(0x3141).unwrap();
        assert_eq!(buf.as_bytes()[0], 0x31);
        assert_eq!(buf.as_bytes()[1], 0x41);

        let mut rd = OctetBuffer::wrap(buf.into_store());
        assert_eq!(rd.get_u16().unwrap(), 0x3141);
    }

    #[test]
    fn u32_round_trip_big_endian() {
        let mut buf = OctetBuffer::allocate(4);
        buf.put_u32(0xDEADBEEF).unwrap();
        assert_eq!(buf.as_bytes(), &[0xDE, 0xAD, 0xBE, 0xEF]);

        let mut rd = OctetBuffer::wrap(buf.into_store());
        assert_eq!(rd.get_u32().unwrap(), 0xDEADBEEF);
    }

    #[test]
    fn absolute_zugriffe_bewegen_cursor_nicht() {
        let mut buf = OctetBuffer::allocate(8);
        buf.put_u16_at(4, 0x0102).unwrap();
        assert_eq!(buf.position(), 0);
        assert_eq!(buf.get_u16_at(4).unwrap(), 0x0102);
    }

    #[test]
    fn grenzverletzung_liefert_fehler() {
        let mut buf = OctetBuffer::allocate(2);
        assert!(buf.put_u32(1).is_err());
        buf.put_u16(7).unwrap();
        assert_eq!(buf.get_u8().unwrap_err(), OctetError::OutOfRange {
            offset: 2,
            len: 1,
            cap: 2,
        });
    }

    #[test]
    fn slice_beginnt_am_cursor() {
        let mut buf = OctetBuffer::wrap(vec![1, 2, 3, 4, 5]);
        buf.get_u16().unwrap();
        let mut rest = buf.slice();
        assert_eq!(rest.free_space(), 3);
        assert_eq!(rest.get_u8().unwrap(), 3);
    }

    #[test]
    fn get_bytes_begrenzt_auf_restkapazitaet() {
        let mut buf = OctetBuffer::wrap(vec![9, 8, 7]);
        let mut out = [0u8; 8];
        let n = buf.get_bytes(&mut out);
        assert_eq!(n, 3);
        assert_eq!(&out[..3], &[9, 8, 7]);
        assert_eq!(buf.free_space(), 0);
    }

    #[test]
    fn i16_negativ_round_trip() {
        let mut buf = OctetBuffer::allocate(2);
        buf.put_i16_at(0, -12345).unwrap();
        assert_eq!(buf.get_i16_at(0).unwrap(), -12345);
    }
}
