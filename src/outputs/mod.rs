//! Notification output: rendering and delivery.
//!
//! # Submodules
//!
//! - [`digest`]: builds the subject, plain-text and HTML bodies for a run
//! - [`email`]: delivers the digest over SMTP and commits the sent ledger

pub mod digest;
pub mod email;
