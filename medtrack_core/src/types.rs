//! Core domain types for the medication tracker.
//!
//! This module defines the fundamental types used throughout the system:
//! - Frequencies and time-of-day slots
//! - The persisted medication record and its dose ledger
//! - Create/update inputs
//! - The derived three-state day status

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Timelike, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Schedule Types
// ============================================================================

/// How often a medication is taken per day
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Once,
    Twice,
    Thrice,
    Custom,
}

impl Frequency {
    /// Number of slots for the fixed frequencies, `None` for custom
    pub fn fixed_slot_count(&self) -> Option<usize> {
        match self {
            Frequency::Once => Some(1),
            Frequency::Twice => Some(2),
            Frequency::Thrice => Some(3),
            Frequency::Custom => None,
        }
    }
}

impl FromStr for Frequency {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "once" => Ok(Frequency::Once),
            "twice" => Ok(Frequency::Twice),
            "thrice" => Ok(Frequency::Thrice),
            "custom" => Ok(Frequency::Custom),
            other => Err(crate::Error::Validation(format!(
                "unknown frequency: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Frequency::Once => write!(f, "once"),
            Frequency::Twice => write!(f, "twice"),
            Frequency::Thrice => write!(f, "thrice"),
            Frequency::Custom => write!(f, "custom"),
        }
    }
}

/// A wall-clock dose time, persisted as `HH:MM` (24h)
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeOfDay(NaiveTime);

impl TimeOfDay {
    /// Build from hour and minute; `None` when out of range
    pub fn from_hm(hour: u32, minute: u32) -> Option<Self> {
        NaiveTime::from_hms_opt(hour, minute, 0).map(TimeOfDay)
    }

    /// Minutes past midnight, wrapping at 24h
    pub fn from_minutes(minutes: u32) -> Self {
        let minutes = i64::from(minutes % (24 * 60));
        TimeOfDay(NaiveTime::default() + Duration::minutes(minutes))
    }

    pub fn time(&self) -> NaiveTime {
        self.0
    }

    pub fn hour(&self) -> u32 {
        self.0.hour()
    }

    pub fn minute(&self) -> u32 {
        self.0.minute()
    }
}

impl FromStr for TimeOfDay {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        NaiveTime::parse_from_str(s.trim(), "%H:%M")
            .map(TimeOfDay)
            .map_err(|e| crate::Error::Validation(format!("invalid time '{}': {}", s, e)))
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour(), self.minute())
    }
}

impl Serialize for TimeOfDay {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TimeOfDay {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// Medication Record
// ============================================================================

/// Per-day taken flags, one per slot as of the day the row was created
pub type TakenHistory = BTreeMap<NaiveDate, Vec<bool>>;

/// One prescription entry, as persisted under the `medications` key
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Medication {
    pub id: String,
    pub name: String,
    pub dosage: String,
    pub purpose: String,
    pub prescribed_by: String,
    pub frequency: Frequency,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_frequency: Option<u32>,
    pub time_slots: Vec<TimeOfDay>,
    pub start_date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u32>,
    #[serde(default)]
    pub with_food: bool,
    #[serde(default)]
    pub reminder_enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    #[serde(default)]
    pub taken_history: TakenHistory,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Medication {
    /// Last day of the course, from `end_date` or `start_date + duration`
    pub fn effective_end(&self) -> Option<NaiveDate> {
        self.end_date.or_else(|| {
            self.duration
                .filter(|days| *days > 0)
                .map(|days| self.start_date + Duration::days(i64::from(days) - 1))
        })
    }

    /// Whether the course covers `date`
    pub fn is_active_on(&self, date: NaiveDate) -> bool {
        date >= self.start_date && self.effective_end().map_or(true, |end| date <= end)
    }
}

// ============================================================================
// Create / Update Inputs
// ============================================================================

/// Fields supplied when creating a medication
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MedicationDraft {
    pub name: String,
    pub dosage: String,
    pub purpose: String,
    pub prescribed_by: String,
    pub frequency: Frequency,
    #[serde(default)]
    pub custom_frequency: Option<u32>,
    /// Explicit slots; generated from `frequency` when absent
    #[serde(default)]
    pub time_slots: Option<Vec<TimeOfDay>>,
    /// Defaults to today
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub duration: Option<u32>,
    #[serde(default)]
    pub with_food: bool,
    #[serde(default = "default_reminder_enabled")]
    pub reminder_enabled: bool,
    #[serde(default)]
    pub instructions: Option<String>,
}

fn default_reminder_enabled() -> bool {
    true
}

impl MedicationDraft {
    /// Draft with the required fields and defaults for everything else
    pub fn new(
        name: impl Into<String>,
        dosage: impl Into<String>,
        purpose: impl Into<String>,
        prescribed_by: impl Into<String>,
        frequency: Frequency,
    ) -> Self {
        Self {
            name: name.into(),
            dosage: dosage.into(),
            purpose: purpose.into(),
            prescribed_by: prescribed_by.into(),
            frequency,
            custom_frequency: None,
            time_slots: None,
            start_date: None,
            end_date: None,
            duration: None,
            with_food: false,
            reminder_enabled: default_reminder_enabled(),
            instructions: None,
        }
    }
}

/// Partial update; `None` leaves the stored field untouched.
///
/// The optional fields of the record use `Option<Option<_>>` so that a patch
/// can clear them.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MedicationPatch {
    pub name: Option<String>,
    pub dosage: Option<String>,
    pub purpose: Option<String>,
    pub prescribed_by: Option<String>,
    pub frequency: Option<Frequency>,
    pub custom_frequency: Option<u32>,
    pub time_slots: Option<Vec<TimeOfDay>>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<Option<NaiveDate>>,
    pub duration: Option<Option<u32>>,
    pub with_food: Option<bool>,
    pub reminder_enabled: Option<bool>,
    pub instructions: Option<Option<String>>,
}

// ============================================================================
// Derived Status
// ============================================================================

/// Three-state badge for one day of one medication
#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DayStatus {
    /// Every slot taken
    Complete,
    /// At least one, but not all, slots taken
    InProgress,
    /// Nothing taken yet
    Pending,
}
