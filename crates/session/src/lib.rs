//! Fluesterfon Session-Steuerung
//!
//! Verknuepft Signalisierung und Medien: der Controller haelt den
//! Signalisierungszustand (ausstehende Einladung, Vertrauensstatus,
//! Timer) und fuehrt alle Uebergaenge in einer einzigen seriellen
//! Ereignisschleife aus. Medien-Tasks fassen den Signalisierungszustand
//! nie an.

pub mod controller;

pub use controller::{Command, Notice, SessionController, SessionDeps};
