//! The medication collection and the only writer of persisted state.
//!
//! Every mutation is applied to a copy, written to the store in full, and
//! only then committed to memory. A failed write leaves the repository as it
//! was before the call.

use crate::clock::Clock;
use crate::store::MedicationStore;
use crate::{
    ledger, schedule, Error, Frequency, Medication, MedicationDraft, MedicationPatch, Result,
};
use chrono::{NaiveDate, Utc};
use std::rc::Rc;
use uuid::Uuid;

pub struct MedicationRepository<S: MedicationStore> {
    store: S,
    clock: Rc<dyn Clock>,
    medications: Vec<Medication>,
    retention_days: Option<u32>,
}

impl<S: MedicationStore> MedicationRepository<S> {
    /// Load the collection from `store`.
    ///
    /// An unreadable collection is logged and replaced by an empty one; no
    /// individual records are salvaged.
    pub fn open(store: S, clock: Rc<dyn Clock>) -> Self {
        let medications = match store.load() {
            Ok(medications) => medications,
            Err(e) => {
                tracing::warn!(
                    "Failed to load medications: {}. Starting with an empty collection.",
                    e
                );
                Vec::new()
            }
        };
        tracing::info!("Opened repository with {} medication(s)", medications.len());

        Self {
            store,
            clock,
            medications,
            retention_days: None,
        }
    }

    /// Keep only the last `days` days of dose history (unbounded when `None`)
    pub fn with_retention(mut self, days: Option<u32>) -> Self {
        self.retention_days = days;
        self
    }

    /// All medications in insertion order
    pub fn list(&self) -> &[Medication] {
        &self.medications
    }

    pub fn get(&self, id: &str) -> Option<&Medication> {
        self.medications.iter().find(|m| m.id == id)
    }

    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }

    pub fn clock(&self) -> &Rc<dyn Clock> {
        &self.clock
    }

    /// Replace the in-memory collection with what the store holds now.
    ///
    /// Long-running hosts call this before writing so that changes made by
    /// other processes are not overwritten. On a load error the in-memory
    /// collection is kept.
    pub fn reload(&mut self) -> Result<()> {
        let medications = self.store.load()?;
        if medications != self.medications {
            tracing::debug!("Reloaded {} medication(s) from store", medications.len());
        }
        self.medications = medications;
        Ok(())
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Validate and persist a new medication with today's ledger row
    pub fn create(&mut self, draft: MedicationDraft) -> Result<Medication> {
        let today = self.today();
        let now = Utc::now();

        let time_slots = draft
            .time_slots
            .unwrap_or_else(|| schedule::generate_slots(draft.frequency));

        let mut medication = Medication {
            id: format!("medication-{}", Uuid::new_v4().simple()),
            name: draft.name.trim().to_string(),
            dosage: draft.dosage.trim().to_string(),
            purpose: draft.purpose.trim().to_string(),
            prescribed_by: draft.prescribed_by.trim().to_string(),
            frequency: draft.frequency,
            custom_frequency: draft.custom_frequency,
            time_slots,
            start_date: draft.start_date.unwrap_or(today),
            end_date: draft.end_date,
            duration: draft.duration,
            with_food: draft.with_food,
            reminder_enabled: draft.reminder_enabled,
            instructions: normalize_instructions(draft.instructions),
            taken_history: Default::default(),
            created_at: now,
            updated_at: now,
        };
        validate(&medication)?;
        ledger::ensure_day(&mut medication, today);

        let mut next = self.medications.clone();
        next.push(medication.clone());
        self.commit(next)?;

        tracing::info!("Created {} ({})", medication.id, medication.name);
        Ok(medication)
    }

    /// Merge `patch` into an existing medication.
    ///
    /// `id`, `created_at` and the whole dose history are kept as they are;
    /// history rows keep their original length even when the slot count
    /// changes.
    pub fn update(&mut self, id: &str, patch: MedicationPatch) -> Result<Medication> {
        let index = self.position(id)?;
        let mut medication = self.medications[index].clone();

        if let Some(name) = patch.name {
            medication.name = name.trim().to_string();
        }
        if let Some(dosage) = patch.dosage {
            medication.dosage = dosage.trim().to_string();
        }
        if let Some(purpose) = patch.purpose {
            medication.purpose = purpose.trim().to_string();
        }
        if let Some(prescribed_by) = patch.prescribed_by {
            medication.prescribed_by = prescribed_by.trim().to_string();
        }

        if let Some(frequency) = patch.frequency {
            if frequency != medication.frequency {
                medication.time_slots = schedule::slots_for_frequency_change(
                    medication.frequency,
                    frequency,
                    &medication.time_slots,
                );
                medication.frequency = frequency;
            }
        }
        match patch.custom_frequency {
            Some(count) => medication.custom_frequency = Some(count),
            None if medication.frequency != Frequency::Custom => {
                medication.custom_frequency = None
            }
            None => {}
        }
        if let Some(time_slots) = patch.time_slots {
            medication.time_slots = time_slots;
        }

        if let Some(start_date) = patch.start_date {
            medication.start_date = start_date;
        }
        if let Some(end_date) = patch.end_date {
            medication.end_date = end_date;
        }
        if let Some(duration) = patch.duration {
            medication.duration = duration;
        }
        if let Some(with_food) = patch.with_food {
            medication.with_food = with_food;
        }
        if let Some(reminder_enabled) = patch.reminder_enabled {
            medication.reminder_enabled = reminder_enabled;
        }
        if let Some(instructions) = patch.instructions {
            medication.instructions = normalize_instructions(instructions);
        }

        medication.updated_at = Utc::now();
        validate(&medication)?;

        let mut next = self.medications.clone();
        next[index] = medication.clone();
        self.commit(next)?;

        tracing::info!("Updated {}", medication.id);
        Ok(medication)
    }

    /// Permanently remove a medication and its history.
    ///
    /// Callers are expected to have confirmed the deletion.
    pub fn delete(&mut self, id: &str) -> Result<Medication> {
        let index = self.position(id)?;
        let mut next = self.medications.clone();
        let removed = next.remove(index);
        self.commit(next)?;

        tracing::info!("Deleted {} ({})", removed.id, removed.name);
        Ok(removed)
    }

    /// Stored row for `date`, initializing it first if absent
    pub fn doses(&mut self, id: &str, date: NaiveDate) -> Result<Vec<bool>> {
        self.modify(id, |medication| {
            ledger::ensure_day(medication, date);
            Ok(medication.taken_history.get(&date).cloned().unwrap_or_default())
        })
    }

    /// Initialize today's row for every medication.
    ///
    /// Returns how many rows were created; nothing is written when none were.
    pub fn ensure_today(&mut self) -> Result<usize> {
        let today = self.today();
        let mut next = self.medications.clone();
        let mut created = 0;
        for medication in &mut next {
            if ledger::ensure_day(medication, today) {
                created += 1;
            }
            self.apply_retention(medication, today);
        }
        if next != self.medications {
            self.commit(next)?;
        }
        Ok(created)
    }

    /// Flip one dose. Out-of-range slots are ignored and return `None`.
    pub fn toggle_dose(&mut self, id: &str, date: NaiveDate, slot: usize) -> Result<Option<bool>> {
        self.modify(id, |medication| Ok(ledger::toggle(medication, date, slot)))
    }

    /// Append a default slot to a custom schedule
    pub fn add_slot(&mut self, id: &str) -> Result<Medication> {
        self.modify(id, |medication| {
            schedule::add_slot(medication.frequency, &mut medication.time_slots)?;
            medication.updated_at = Utc::now();
            Ok(medication.clone())
        })
    }

    /// Remove a slot from a custom schedule
    pub fn remove_slot(&mut self, id: &str, index: usize) -> Result<Medication> {
        self.modify(id, |medication| {
            schedule::remove_slot(medication.frequency, &mut medication.time_slots, index)?;
            medication.updated_at = Utc::now();
            Ok(medication.clone())
        })
    }

    fn position(&self, id: &str) -> Result<usize> {
        self.medications
            .iter()
            .position(|m| m.id == id)
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    /// Apply `f` to a copy of one medication and persist it if it changed
    fn modify<F, T>(&mut self, id: &str, f: F) -> Result<T>
    where
        F: FnOnce(&mut Medication) -> Result<T>,
    {
        let index = self.position(id)?;
        let mut medication = self.medications[index].clone();
        let out = f(&mut medication)?;
        self.apply_retention(&mut medication, self.today());

        if medication != self.medications[index] {
            let mut next = self.medications.clone();
            next[index] = medication;
            self.commit(next)?;
        }
        Ok(out)
    }

    fn apply_retention(&self, medication: &mut Medication, today: NaiveDate) {
        if let Some(days) = self.retention_days {
            ledger::prune_history(medication, today, days);
        }
    }

    fn commit(&mut self, next: Vec<Medication>) -> Result<()> {
        self.store.save_all(&next)?;
        self.medications = next;
        Ok(())
    }
}

fn normalize_instructions(instructions: Option<String>) -> Option<String> {
    instructions
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
}

/// Field checks applied before anything is persisted
fn validate(medication: &Medication) -> Result<()> {
    for (field, value) in [
        ("name", &medication.name),
        ("dosage", &medication.dosage),
        ("purpose", &medication.purpose),
        ("prescribedBy", &medication.prescribed_by),
    ] {
        if value.trim().is_empty() {
            return Err(Error::Validation(format!("{} is required", field)));
        }
    }

    match (medication.frequency, medication.custom_frequency) {
        (Frequency::Custom, None) => {
            return Err(Error::Validation(
                "customFrequency is required for custom schedules".into(),
            ))
        }
        (Frequency::Custom, Some(0)) => {
            return Err(Error::Validation("customFrequency must be positive".into()))
        }
        (Frequency::Custom, Some(_)) => {}
        (frequency, Some(_)) => {
            return Err(Error::Validation(format!(
                "customFrequency is only allowed for custom schedules (frequency is {})",
                frequency
            )))
        }
        (_, None) => {}
    }

    schedule::validate_slots(medication.frequency, &medication.time_slots)?;

    if let Some(end) = medication.end_date {
        if end < medication.start_date {
            return Err(Error::Validation("endDate is before startDate".into()));
        }
    }
    if medication.duration == Some(0) {
        return Err(Error::Validation("duration must be at least one day".into()));
    }
    Ok(())
}
