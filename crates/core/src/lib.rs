//! Fluesterfon Core – gemeinsame Typen und Fehler
//!
//! Enthaelt die crate-uebergreifenden Grundtypen (Benutzerkennung,
//! Sicherheitsstufe, Zeit-Helfer) und den Fehler-Enum der obersten Ebene.

pub mod error;
pub mod types;

pub use error::{FluesterfonError, Result};
pub use types::{now_ms, SecurityLevel, UserId};
