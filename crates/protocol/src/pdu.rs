//! PDU-Codec (12-Byte-Header + Nutzdaten)
//!
//! ```text
//!                      1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1        Oktette:
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+  +---------------+
//! |F|     Source Call Number      |R|   Destination Call Number   |    0   1   2   3
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+  +---------------+
//! |                           Time-Stamp                          |    4   5   6   7
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+  +---------------+
//! |  Out Seq No   |   In Seq No   |    PDU Type   |   Sub Class   |    8   9  10  11
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+  +---------------+
//! |                            Nutzdaten                          |   12  ...
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! Beim Senden wird das F-Bit auf der Source Call Number gesetzt, das R-Bit
//! bleibt frei; beim Parsen werden beide Flag-Bits abgestreift. Der
//! Zeitstempel laeuft auf dem Draht als u32 (wrap mod 2^32) und wird im
//! Speicher als u64 gefuehrt.

use crate::octet::{OctetBuffer, OctetError};
use thiserror::Error;

/// Header-Groesse in Bytes
pub const PDU_HEADER_LEN: usize = 12;

/// PDU-Typ: Sprachdaten
pub const PDU_TYPE_VOICE: u8 = 0x02;

/// Source Call Number der einen zulaessigen Verbindung pro Gegenstelle
pub const SOURCE_CALL_NUMBER: u16 = 0x3141;

/// Destination Call Number der einen zulaessigen Verbindung pro Gegenstelle
pub const DEST_CALL_NUMBER: u16 = 0x5926;

/// Fehler des PDU-Codecs
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PduError {
    /// Eingang kuerzer als der 12-Byte-Header
    #[error("PDU zu kurz: {0} Bytes (erwartet mindestens {PDU_HEADER_LEN})")]
    TooShort(usize),

    /// Grenzverletzung im Oktett-Puffer
    #[error(transparent)]
    Octet(#[from] OctetError),
}

/// Audio-Format in der Subclass eines Voice-PDUs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum VoiceFormat {
    /// 16-bit linear, little-endian
    Lin16 = 0x01,
    /// G.711 A-law
    Alaw = 0x02,
    /// G.711 u-law
    Ulaw = 0x03,
}

impl VoiceFormat {
    /// Konvertiert ein Subclass-Byte in ein `VoiceFormat`
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(Self::Lin16),
            0x02 => Some(Self::Alaw),
            0x03 => Some(Self::Ulaw),
            _ => None,
        }
    }

    /// Subclass-Byte dieses Formats
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// Eine geparste bzw. zu sendende PDU
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pdu {
    /// Source Call Number (ohne F-Bit, 0..=0x7FFF)
    pub source_call: u16,
    /// Destination Call Number (ohne R-Bit, 0..=0x7FFF)
    pub dest_call: u16,
    /// Zeitstempel in ms seit Anrufbeginn (auf dem Draht mod 2^32)
    pub timestamp: u64,
    /// Ausgehende Sequenznummer (mod 256)
    pub out_seq: u8,
    /// Eingehende Sequenznummer (mod 256)
    pub in_seq: u8,
    /// PDU-Typ (VOICE = 0x02; unbekannte Typen werden nur geloggt)
    pub pdu_type: u8,
    /// Subclass (bei VOICE das Audio-Format)
    pub subclass: u8,
    /// Nutzdaten (fuer den Codec opak)
    pub payload: Vec<u8>,
}

impl Pdu {
    /// Parst eine empfangene PDU und streift die Flag-Bits ab
    pub fn parse(octets: &[u8]) -> Result<Self, PduError> {
        if octets.len() < PDU_HEADER_LEN {
            return Err(PduError::TooShort(octets.len()));
        }

        let mut buf = OctetBuffer::wrap(octets.to_vec());

        let source_call = buf.get_u16()? & 0x7FFF;
        let dest_call = buf.get_u16()? & 0x7FFF;
        let timestamp = buf.get_u32()? as u64;
        let out_seq = buf.get_u8()?;
        let in_seq = buf.get_u8()?;
        let pdu_type = buf.get_u8()?;
        let subclass = buf.get_u8()?;
        let payload = buf.slice().into_store();

        Ok(Self {
            source_call,
            dest_call,
            timestamp,
            out_seq,
            in_seq,
            pdu_type,
            subclass,
            payload,
        })
    }

    /// Serialisiert die PDU: F-Bit auf der Source Call Number, R-Bit frei,
    /// Zeitstempel auf 32 Bit gestutzt
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = OctetBuffer::allocate(PDU_HEADER_LEN + self.payload.len());

        // Header-Laenge ist oben reserviert; die puts koennen nicht fehlschlagen
        let _ = buf.put_u16(self.source_call | 0x8000);
        let _ = buf.put_u16(self.dest_call & 0x7FFF);
        let _ = buf.put_u32((self.timestamp & 0xFFFF_FFFF) as u32);
        let _ = buf.put_u8(self.out_seq);
        let _ = buf.put_u8(self.in_seq);
        let _ = buf.put_u8(self.pdu_type);
        let _ = buf.put_u8(self.subclass);
        let _ = buf.put_bytes(&self.payload);

        buf.into_store()
    }

    /// Erstellt ein ausgehendes Voice-PDU
    pub fn voice(
        source_call: u16,
        dest_call: u16,
        timestamp: u64,
        out_seq: u8,
        in_seq: u8,
        format: VoiceFormat,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            source_call,
            dest_call,
            timestamp,
            out_seq,
            in_seq,
            pdu_type: PDU_TYPE_VOICE,
            subclass: format.as_u8(),
            payload,
        }
    }

    /// Prueft ob dies ein Voice-PDU ist
    pub fn is_voice(&self) -> bool {
        self.pdu_type == PDU_TYPE_VOICE
    }

    /// Audio-Format der Subclass, falls bekannt
    pub fn voice_format(&self) -> Option<VoiceFormat> {
        VoiceFormat::from_u8(self.subclass)
    }
}
