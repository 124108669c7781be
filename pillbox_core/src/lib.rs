#![forbid(unsafe_code)]

//! Core domain model and scheduling logic for the Pillbox dispenser.
//!
//! This crate provides:
//! - Domain types (medicines, log entries, adherence records)
//! - SGT timestamp text and dose scheduling
//! - Dispense classification and the due-dose alarm
//! - Webhook client, speech queue and the background tick
//! - Local persistence (roster, outbox) and dashboard views

pub mod types;
pub mod error;
pub mod config;
pub mod logging;
pub mod sgt;
pub mod schedule;
pub mod dispense;
pub mod alarm;
pub mod records;
pub mod roster;
pub mod outbox;
pub mod service;
pub mod generation;
pub mod speech;
pub mod watch;
pub mod dashboard;

// Re-export commonly used types
pub use error::{Error, Result};
pub use types::*;
pub use config::Config;
pub use dispense::DispensePolicy;
pub use roster::Roster;
pub use outbox::{Delivery, Outbox};
pub use service::{CareService, WebhookClient};
pub use sgt::{format_sgt, parse_sgt};
