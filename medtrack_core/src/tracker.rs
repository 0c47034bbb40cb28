//! Repository and reminders wired together.
//!
//! Every call that changes the collection re-runs the reminder sync so that
//! pending timers always match today's remaining slots.

use crate::reminder::{Notification, ReminderScheduler, Scheduler, SyncSummary, TimerQueue};
use crate::store::MedicationStore;
use crate::{Clock, Medication, MedicationDraft, MedicationPatch, MedicationRepository, Result};
use chrono::{NaiveDate, NaiveDateTime};

pub struct MedicationTracker<S: MedicationStore, T: Scheduler> {
    repository: MedicationRepository<S>,
    reminders: ReminderScheduler<T>,
}

impl<S: MedicationStore, T: Scheduler> MedicationTracker<S, T> {
    /// Start tracking: initialize today's ledger rows and schedule reminders
    pub fn start(
        repository: MedicationRepository<S>,
        reminders: ReminderScheduler<T>,
    ) -> Result<Self> {
        let mut tracker = Self {
            repository,
            reminders,
        };
        tracker.repository.ensure_today()?;
        tracker.sync_reminders();
        Ok(tracker)
    }

    pub fn repository(&self) -> &MedicationRepository<S> {
        &self.repository
    }

    pub fn reminders(&self) -> &ReminderScheduler<T> {
        &self.reminders
    }

    pub fn reminders_mut(&mut self) -> &mut ReminderScheduler<T> {
        &mut self.reminders
    }

    pub fn list(&self) -> &[Medication] {
        self.repository.list()
    }

    /// Recompute today's pending reminders from the current collection
    pub fn sync_reminders(&mut self) -> SyncSummary {
        let now = self.repository.clock().now();
        self.reminders.sync(self.repository.list(), now)
    }

    pub fn create(&mut self, draft: MedicationDraft) -> Result<Medication> {
        let medication = self.repository.create(draft)?;
        self.sync_reminders();
        Ok(medication)
    }

    pub fn update(&mut self, id: &str, patch: MedicationPatch) -> Result<Medication> {
        let medication = self.repository.update(id, patch)?;
        self.sync_reminders();
        Ok(medication)
    }

    /// Delete a medication and cancel its pending reminders
    pub fn delete(&mut self, id: &str) -> Result<Medication> {
        let medication = self.repository.delete(id)?;
        self.reminders.cancel_medication(id);
        self.sync_reminders();
        Ok(medication)
    }

    pub fn add_slot(&mut self, id: &str) -> Result<Medication> {
        let medication = self.repository.add_slot(id)?;
        self.sync_reminders();
        Ok(medication)
    }

    pub fn remove_slot(&mut self, id: &str, index: usize) -> Result<Medication> {
        let medication = self.repository.remove_slot(id, index)?;
        self.sync_reminders();
        Ok(medication)
    }

    /// Flip one dose. Reminders are unaffected by taken state.
    pub fn toggle_dose(&mut self, id: &str, date: NaiveDate, slot: usize) -> Result<Option<bool>> {
        self.repository.toggle_dose(id, date, slot)
    }

    pub fn doses(&mut self, id: &str, date: NaiveDate) -> Result<Vec<bool>> {
        self.repository.doses(id, date)
    }
}

impl<S: MedicationStore> MedicationTracker<S, TimerQueue> {
    /// Deliver every reminder due by now and record it as fired.
    ///
    /// The collection is reloaded from the store first, so medications and
    /// doses written by other processes are neither lost nor missed. Crossing
    /// midnight initializes the new day's ledger rows and schedules the new
    /// day's reminders; slots right at midnight are delivered in the same
    /// call.
    pub fn fire_due(&mut self) -> Result<Vec<Notification>> {
        self.repository.reload()?;
        let now = self.repository.clock().now();

        let mut delivered = self.deliver_due(now);
        self.repository.ensure_today()?;
        self.sync_reminders();
        delivered.extend(self.deliver_due(now));
        Ok(delivered)
    }

    fn deliver_due(&mut self, now: NaiveDateTime) -> Vec<Notification> {
        let due = self.reminders.timer_mut().pop_due(now);
        due.into_iter()
            .filter_map(|(handle, reminder)| {
                self.reminders
                    .deliver(self.repository.list(), handle, &reminder, now)
            })
            .collect()
    }
}
