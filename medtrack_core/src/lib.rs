#![forbid(unsafe_code)]

//! Core domain model and business logic for medication tracking.
//!
//! This crate provides:
//! - Domain types (medications, frequencies, time slots)
//! - Schedule generation from a frequency
//! - The per-day dose ledger and adherence statistics
//! - Persistence behind a store trait (JSON file, in-memory)
//! - Same-day reminder scheduling behind a timer trait
//! - Report export (JSON, text, CSV)

pub mod types;
pub mod error;
pub mod config;
pub mod logging;
pub mod clock;
pub mod schedule;
pub mod ledger;
pub mod adherence;
pub mod store;
pub mod repository;
pub mod reminder;
pub mod tracker;
pub mod export;

// Re-export commonly used types
pub use error::{Error, Result};
pub use types::*;
pub use config::Config;
pub use clock::{Clock, FixedClock, SystemClock};
pub use schedule::generate_slots;
pub use adherence::{adherence, daily_overview, days_tracked, DailyOverview};
pub use store::{JsonFileStore, MedicationStore, MemoryStore};
pub use repository::MedicationRepository;
pub use reminder::{
    Notification, Permission, Reminder, ReminderScheduler, ReminderTag, Scheduler, SlotState,
    TimerHandle, TimerQueue,
};
pub use tracker::MedicationTracker;
