//! Fluesterfon Audio – Geraeteabstraktion, De-Jitter und G.711-Codecs
//!
//! Feste Parameter: 8 kHz, 16-bit signed linear (little-endian), mono;
//! Frame-Intervall 20 ms. Die eigentliche PCM-Hardware liegt hinter dem
//! `PcmDevice`-Trait (externer Mitspieler); dieses Crate liefert die
//! Echtzeit-Maschinerie darueber: Aufnahme- und De-Jitter-Ringe,
//! Taktversatz-Ausgleich, Verlustverschleierung, Rufton und den 50-Hz-Takt
//! des Senders.

pub mod buffer;
pub mod codec;
pub mod device;
pub mod error;
pub mod interface;
pub mod pcm;

pub use buffer::AudioBuffer;
pub use device::{PcmDevice, SimulatedDevice};
pub use error::{AudioError, AudioResult};
pub use interface::{AudioInterface, Packetizer, SampleFormat};
pub use pcm::{PcmAudio, FRAME_COUNT, FRAME_INTERVAL_MS, LLBS, SAMPLE_RATE, SAMPLE_SIZE};
