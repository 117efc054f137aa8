//! Fluesterfon Wire-Protokoll
//!
//! Definiert die binaere Paketstruktur fuer die Sprachuebertragung via UDP:
//! den Oktett-Puffer als Serialisierungs-Primitiv und den 12-Byte-PDU-Codec.
//! Direkte Byte-Serialisierung, kein serde (Performance-kritisch).

pub mod octet;
pub mod pdu;

pub use octet::{OctetBuffer, OctetError};
pub use pdu::{Pdu, PduError, VoiceFormat, DEST_CALL_NUMBER, PDU_HEADER_LEN, PDU_TYPE_VOICE, SOURCE_CALL_NUMBER};
