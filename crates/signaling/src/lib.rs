//! Fluesterfon Signalisierung
//!
//! Zeilenorientierter Client zum Rendezvous-Relay (oeffentlicher
//! Broadcast-Chat-Server). Jede Server-Zeile hat die Form
//! `[<user> :: ]<body>`; beginnt der Body mit `[$]`, ist es eine
//! Steuernachricht fuer den Session-Controller, sonst eine fuer den
//! Menschen bestimmte Chat-Zeile.

pub mod client;
pub mod control;
pub mod error;

pub use client::{RendezvousClient, SignalEvent};
pub use control::{ControlMessage, ControlType, InboundEvent};
pub use error::SignalError;
