//! One-shot dose reminders for the current day.
//!
//! [`ReminderScheduler`] decides *what* should fire today and keeps exactly
//! one timer per `{medicationId}-{slotIndex}` tag; the injected
//! [`Scheduler`] decides *how* a timer fires. Reminders ignore the dose
//! ledger: a slot still fires after its dose was marked taken.
//!
//! Per tag and day a slot moves from not-yet-scheduled to `Scheduled`, then
//! to `Fired` or `Canceled`. Nothing is scheduled past the current day and
//! nothing survives a restart; the next sync recomputes today's remaining
//! slots from the medications alone.

use crate::Medication;
use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

/// How late a timer may be delivered before it counts as missed.
///
/// Also the look-back applied when a running host crosses midnight, so a
/// slot at or just after 00:00 is not lost to the wake-up delay.
pub const LATE_DELIVERY_MINUTES: i64 = 5;

// ============================================================================
// Capability
// ============================================================================

/// Platform notification permission
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Permission {
    Granted,
    Denied,
    Unsupported,
}

/// Opaque handle for one pending timer
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerHandle(u64);

/// Timer capability supplied by the host
pub trait Scheduler {
    /// Arrange for `reminder` to be delivered at `at`
    fn schedule_at(&mut self, at: NaiveDateTime, reminder: Reminder) -> TimerHandle;

    /// Drop a pending timer. Unknown or already-fired handles are ignored.
    fn cancel(&mut self, handle: TimerHandle);

    fn permission(&self) -> Permission {
        Permission::Granted
    }
}

// ============================================================================
// Reminder Types
// ============================================================================

/// Idempotency key of a reminder: one medication slot
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ReminderTag {
    pub medication_id: String,
    pub slot: usize,
}

impl ReminderTag {
    pub fn new(medication_id: impl Into<String>, slot: usize) -> Self {
        Self {
            medication_id: medication_id.into(),
            slot,
        }
    }
}

impl fmt::Display for ReminderTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.medication_id, self.slot)
    }
}

/// Payload handed to the platform notification API
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub tag: String,
}

/// A reminder due at a specific instant today
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reminder {
    pub tag: ReminderTag,
    pub fire_at: NaiveDateTime,
    pub notification: Notification,
}

/// Lifecycle of one slot's reminder for the current day
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotState {
    Scheduled,
    Fired,
    Canceled,
}

#[derive(Clone, Debug)]
struct SlotRecord {
    handle: TimerHandle,
    fire_at: NaiveDateTime,
    notification: Notification,
    state: SlotState,
}

/// What a call to [`ReminderScheduler::sync`] changed
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SyncSummary {
    pub scheduled: usize,
    pub kept: usize,
    pub replaced: usize,
    pub canceled: usize,
}

enum SlotAction {
    Keep,
    Skip,
    Replace(TimerHandle),
    Schedule,
}

// ============================================================================
// Scheduler
// ============================================================================

pub struct ReminderScheduler<T: Scheduler> {
    timer: T,
    day: Option<NaiveDate>,
    slots: HashMap<ReminderTag, SlotRecord>,
    default_instructions: String,
}

impl<T: Scheduler> ReminderScheduler<T> {
    pub fn new(timer: T, default_instructions: impl Into<String>) -> Self {
        Self {
            timer,
            day: None,
            slots: HashMap::new(),
            default_instructions: default_instructions.into(),
        }
    }

    pub fn timer(&self) -> &T {
        &self.timer
    }

    pub fn timer_mut(&mut self) -> &mut T {
        &mut self.timer
    }

    /// State of a slot's reminder today; `None` when never scheduled
    pub fn state(&self, tag: &ReminderTag) -> Option<SlotState> {
        self.slots.get(tag).map(|record| record.state)
    }

    /// Tags with a pending timer, in tag order
    pub fn pending(&self) -> Vec<&ReminderTag> {
        let mut tags: Vec<_> = self
            .slots
            .iter()
            .filter(|(_, record)| record.state == SlotState::Scheduled)
            .map(|(tag, _)| tag)
            .collect();
        tags.sort();
        tags
    }

    /// Reminders that should still fire today after `now`
    pub fn plan(&self, medications: &[Medication], now: NaiveDateTime) -> Vec<Reminder> {
        self.plan_after(medications, now.date(), now)
    }

    /// Reminders on `today` firing strictly after `cutoff`
    fn plan_after(
        &self,
        medications: &[Medication],
        today: NaiveDate,
        cutoff: NaiveDateTime,
    ) -> Vec<Reminder> {
        medications
            .iter()
            .filter(|m| m.reminder_enabled)
            .flat_map(|m| {
                m.time_slots
                    .iter()
                    .enumerate()
                    .map(move |(slot, time)| (m, slot, today.and_time(time.time())))
            })
            .filter(|(_, _, fire_at)| *fire_at > cutoff)
            .map(|(m, slot, fire_at)| Reminder {
                tag: ReminderTag::new(&m.id, slot),
                fire_at,
                notification: self.notification_for(m, slot),
            })
            .collect()
    }

    fn notification_for(&self, medication: &Medication, slot: usize) -> Notification {
        let instructions = medication
            .instructions
            .as_deref()
            .unwrap_or(&self.default_instructions);
        Notification {
            title: format!("Time to take {}", medication.name),
            body: format!("{} - {}", medication.dosage, instructions),
            tag: ReminderTag::new(&medication.id, slot).to_string(),
        }
    }

    /// Bring pending timers in line with today's remaining slots.
    ///
    /// Identical pending timers are left alone, changed ones are replaced,
    /// and timers for removed slots, deleted medications or disabled
    /// reminders are canceled. A no-op without notification permission.
    ///
    /// Slots at or before `now` are skipped, except on the first sync after
    /// midnight of a host that also synced the previous day: there slots
    /// from the last [`LATE_DELIVERY_MINUTES`] are still scheduled and come
    /// due immediately.
    pub fn sync(&mut self, medications: &[Medication], now: NaiveDateTime) -> SyncSummary {
        let mut summary = SyncSummary::default();

        let permission = self.timer.permission();
        if permission != Permission::Granted {
            tracing::debug!("Notifications not available ({:?}), skipping reminders", permission);
            return summary;
        }

        let today = now.date();
        let crossed_midnight = self.day.and_then(|day| day.succ_opt()) == Some(today);
        self.roll_over(today);

        let cutoff = if crossed_midnight {
            now - Duration::minutes(LATE_DELIVERY_MINUTES)
        } else {
            now
        };
        let wanted = self.plan_after(medications, today, cutoff);
        let wanted_tags: HashSet<&ReminderTag> = wanted.iter().map(|r| &r.tag).collect();

        for (tag, record) in self.slots.iter_mut() {
            if record.state == SlotState::Scheduled && !wanted_tags.contains(tag) {
                self.timer.cancel(record.handle);
                record.state = SlotState::Canceled;
                summary.canceled += 1;
                tracing::debug!("Canceled reminder {}", tag);
            }
        }

        for reminder in wanted {
            let action = match self.slots.get(&reminder.tag) {
                Some(record)
                    if record.state == SlotState::Scheduled
                        && record.fire_at == reminder.fire_at
                        && record.notification == reminder.notification =>
                {
                    SlotAction::Keep
                }
                Some(record)
                    if record.state == SlotState::Fired && record.fire_at == reminder.fire_at =>
                {
                    SlotAction::Skip
                }
                Some(record) if record.state == SlotState::Scheduled => {
                    SlotAction::Replace(record.handle)
                }
                _ => SlotAction::Schedule,
            };

            match action {
                SlotAction::Keep => summary.kept += 1,
                SlotAction::Skip => {}
                SlotAction::Replace(old) => {
                    self.timer.cancel(old);
                    self.schedule(reminder);
                    summary.replaced += 1;
                }
                SlotAction::Schedule => {
                    self.schedule(reminder);
                    summary.scheduled += 1;
                }
            }
        }

        tracing::debug!("Reminder sync: {:?}", summary);
        summary
    }

    fn schedule(&mut self, reminder: Reminder) {
        let tag = reminder.tag.clone();
        let fire_at = reminder.fire_at;
        let notification = reminder.notification.clone();
        let handle = self.timer.schedule_at(fire_at, reminder);
        tracing::debug!("Scheduled reminder {} at {}", tag, fire_at);
        self.slots.insert(
            tag,
            SlotRecord {
                handle,
                fire_at,
                notification,
                state: SlotState::Scheduled,
            },
        );
    }

    /// Forget the previous day's slots when the date changes
    fn roll_over(&mut self, today: NaiveDate) {
        if self.day == Some(today) {
            return;
        }
        for record in self.slots.values() {
            if record.state == SlotState::Scheduled {
                self.timer.cancel(record.handle);
            }
        }
        if self.day.is_some() {
            tracing::info!("New day {}, recomputing reminders", today);
        }
        self.slots.clear();
        self.day = Some(today);
    }

    /// Cancel every pending timer of one medication.
    ///
    /// Reminders that already fired are left as they are.
    pub fn cancel_medication(&mut self, medication_id: &str) -> usize {
        let mut canceled = 0;
        for (tag, record) in self.slots.iter_mut() {
            if tag.medication_id == medication_id && record.state == SlotState::Scheduled {
                self.timer.cancel(record.handle);
                record.state = SlotState::Canceled;
                canceled += 1;
            }
        }
        if canceled > 0 {
            tracing::info!("Canceled {} pending reminder(s) for {}", canceled, medication_id);
        }
        canceled
    }

    /// Settle a timer that came due at `now`.
    ///
    /// The notification is rebuilt from `medications` so edits made since
    /// scheduling show up. Returns `None`, and records the slot as canceled,
    /// when the slot no longer exists at that time, its reminder was
    /// disabled, or the timer is more than [`LATE_DELIVERY_MINUTES`] late.
    pub fn deliver(
        &mut self,
        medications: &[Medication],
        handle: TimerHandle,
        reminder: &Reminder,
        now: NaiveDateTime,
    ) -> Option<Notification> {
        let tag = &reminder.tag;
        let current = medications
            .iter()
            .find(|m| m.id == tag.medication_id && m.reminder_enabled)
            .filter(|m| {
                m.time_slots.get(tag.slot).is_some_and(|time| {
                    reminder.fire_at.date().and_time(time.time()) == reminder.fire_at
                })
            });
        let late = now - reminder.fire_at > Duration::minutes(LATE_DELIVERY_MINUTES);

        match current {
            Some(medication) if !late => {
                self.mark_fired(handle);
                Some(self.notification_for(medication, tag.slot))
            }
            _ => {
                if let Some(record) = self.slots.get_mut(tag) {
                    if record.handle == handle && record.state == SlotState::Scheduled {
                        record.state = SlotState::Canceled;
                    }
                }
                tracing::info!("Dropped reminder {} due at {}", tag, reminder.fire_at);
                None
            }
        }
    }

    /// Record that the timer behind `handle` delivered its notification
    pub fn mark_fired(&mut self, handle: TimerHandle) -> Option<ReminderTag> {
        let (tag, record) = self
            .slots
            .iter_mut()
            .find(|(_, record)| record.handle == handle && record.state == SlotState::Scheduled)?;
        record.state = SlotState::Fired;
        tracing::info!("Reminder {} fired", tag);
        Some(tag.clone())
    }
}

// ============================================================================
// In-process timer queue
// ============================================================================

/// Single-threaded deadline queue polled by the host.
///
/// The host sleeps until [`TimerQueue::next_deadline`], then drains
/// [`TimerQueue::pop_due`] and delivers what it returns.
#[derive(Debug)]
pub struct TimerQueue {
    next_id: u64,
    entries: BTreeMap<(NaiveDateTime, TimerHandle), Reminder>,
    deadlines: HashMap<TimerHandle, NaiveDateTime>,
    permission: Permission,
}

impl Default for TimerQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl TimerQueue {
    pub fn new() -> Self {
        Self::with_permission(Permission::Granted)
    }

    pub fn with_permission(permission: Permission) -> Self {
        Self {
            next_id: 0,
            entries: BTreeMap::new(),
            deadlines: HashMap::new(),
            permission,
        }
    }

    pub fn set_permission(&mut self, permission: Permission) {
        self.permission = permission;
    }

    pub fn pending_count(&self) -> usize {
        self.entries.len()
    }

    /// Pending reminders in fire order
    pub fn pending(&self) -> impl Iterator<Item = &Reminder> {
        self.entries.values()
    }

    pub fn next_deadline(&self) -> Option<NaiveDateTime> {
        self.entries.keys().next().map(|(at, _)| *at)
    }

    /// Remove and return every reminder due at or before `now`, in fire order
    pub fn pop_due(&mut self, now: NaiveDateTime) -> Vec<(TimerHandle, Reminder)> {
        let mut due = Vec::new();
        while let Some(entry) = self.entries.first_entry() {
            if entry.key().0 > now {
                break;
            }
            let ((_, handle), reminder) = entry.remove_entry();
            self.deadlines.remove(&handle);
            due.push((handle, reminder));
        }
        due
    }
}

impl Scheduler for TimerQueue {
    fn schedule_at(&mut self, at: NaiveDateTime, reminder: Reminder) -> TimerHandle {
        self.next_id += 1;
        let handle = TimerHandle(self.next_id);
        self.entries.insert((at, handle), reminder);
        self.deadlines.insert(handle, at);
        handle
    }

    fn cancel(&mut self, handle: TimerHandle) {
        if let Some(at) = self.deadlines.remove(&handle) {
            self.entries.remove(&(at, handle));
        }
    }

    fn permission(&self) -> Permission {
        self.permission
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::tests::{date, medication};
    use crate::{ledger, Frequency, TimeOfDay};

    fn at(day: &str, hm: &str) -> NaiveDateTime {
        date(day).and_time(hm.parse::<TimeOfDay>().unwrap().time())
    }

    fn scheduler() -> ReminderScheduler<TimerQueue> {
        ReminderScheduler::new(TimerQueue::new(), "Take as prescribed")
    }

    fn twice(id: &str) -> Medication {
        let mut med = medication(Frequency::Twice);
        med.id = id.into();
        med
    }

    #[test]
    fn test_schedules_remaining_slots_only() {
        let mut reminders = scheduler();
        let med = twice("medication-a");

        let summary = reminders.sync(&[med], at("2026-01-15", "10:00"));
        assert_eq!(summary.scheduled, 1);

        let pending: Vec<_> = reminders.timer().pending().collect();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].fire_at, at("2026-01-15", "21:00"));
        assert_eq!(pending[0].notification.tag, "medication-a-1");
        assert_eq!(
            reminders.state(&ReminderTag::new("medication-a", 0)),
            None
        );
    }

    #[test]
    fn test_slot_at_now_is_not_scheduled() {
        let mut reminders = scheduler();
        reminders.sync(&[twice("medication-a")], at("2026-01-15", "21:00"));
        assert_eq!(reminders.timer().pending_count(), 0);
    }

    #[test]
    fn test_notification_payload() {
        let mut reminders = scheduler();
        let mut med = twice("medication-a");
        reminders.sync(&[med.clone()], at("2026-01-15", "08:00"));
        let first = reminders.timer().pending().next().cloned().unwrap();
        assert_eq!(first.notification.title, "Time to take Metformin");
        assert_eq!(first.notification.body, "500mg - Take as prescribed");
        assert_eq!(first.notification.tag, "medication-a-0");

        med.instructions = Some("After breakfast".into());
        let summary = reminders.sync(&[med], at("2026-01-15", "08:00"));
        assert_eq!(summary.replaced, 2);
        let first = reminders.timer().pending().next().unwrap();
        assert_eq!(first.notification.body, "500mg - After breakfast");
    }

    #[test]
    fn test_sync_is_idempotent() {
        let mut reminders = scheduler();
        let meds = vec![twice("medication-a"), twice("medication-b")];
        let now = at("2026-01-15", "08:00");

        assert_eq!(reminders.sync(&meds, now).scheduled, 4);
        let again = reminders.sync(&meds, now);
        assert_eq!(again.scheduled, 0);
        assert_eq!(again.kept, 4);
        assert_eq!(reminders.timer().pending_count(), 4);

        let tags: HashSet<_> = reminders
            .timer()
            .pending()
            .map(|r| r.notification.tag.clone())
            .collect();
        assert_eq!(tags.len(), 4);
    }

    #[test]
    fn test_taken_state_does_not_suppress_reminders() {
        let mut reminders = scheduler();
        let mut med = twice("medication-a");
        ledger::toggle(&mut med, date("2026-01-15"), 0);
        ledger::toggle(&mut med, date("2026-01-15"), 1);

        reminders.sync(&[med], at("2026-01-15", "08:00"));
        assert_eq!(reminders.timer().pending_count(), 2);
    }

    #[test]
    fn test_disabled_reminders_are_canceled() {
        let mut reminders = scheduler();
        let mut med = twice("medication-a");
        let now = at("2026-01-15", "08:00");
        reminders.sync(&[med.clone()], now);

        med.reminder_enabled = false;
        let summary = reminders.sync(&[med], now);
        assert_eq!(summary.canceled, 2);
        assert_eq!(reminders.timer().pending_count(), 0);
        assert_eq!(
            reminders.state(&ReminderTag::new("medication-a", 1)),
            Some(SlotState::Canceled)
        );
    }

    #[test]
    fn test_slot_edit_replaces_and_cancels() {
        let mut reminders = scheduler();
        let mut med = medication(Frequency::Thrice);
        med.id = "medication-a".into();
        let now = at("2026-01-15", "08:00");
        reminders.sync(&[med.clone()], now);

        // Edited down to once daily at a new time
        med.frequency = Frequency::Once;
        med.time_slots = vec!["11:30".parse().unwrap()];
        let summary = reminders.sync(&[med], now);
        assert_eq!(summary.replaced, 1);
        assert_eq!(summary.canceled, 2);

        let pending: Vec<_> = reminders.timer().pending().collect();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].fire_at, at("2026-01-15", "11:30"));
    }

    #[test]
    fn test_delete_cancels_pending_but_not_fired() {
        let mut reminders = scheduler();
        let med = twice("medication-a");
        reminders.sync(&[med.clone()], at("2026-01-15", "08:00"));

        let due = reminders.timer_mut().pop_due(at("2026-01-15", "09:00"));
        assert_eq!(due.len(), 1);
        let fired = reminders.mark_fired(due[0].0).unwrap();
        assert_eq!(fired, ReminderTag::new("medication-a", 0));

        assert_eq!(reminders.cancel_medication(&med.id), 1);
        assert_eq!(reminders.timer().pending_count(), 0);
        assert_eq!(reminders.state(&fired), Some(SlotState::Fired));
        assert_eq!(
            reminders.state(&ReminderTag::new("medication-a", 1)),
            Some(SlotState::Canceled)
        );

        // Syncing without the medication changes nothing further
        let summary = reminders.sync(&[], at("2026-01-15", "09:30"));
        assert_eq!(summary, SyncSummary::default());
    }

    #[test]
    fn test_permission_denied_is_noop() {
        for permission in [Permission::Denied, Permission::Unsupported] {
            let mut reminders =
                ReminderScheduler::new(TimerQueue::with_permission(permission), "Take as prescribed");
            let summary = reminders.sync(&[twice("medication-a")], at("2026-01-15", "08:00"));
            assert_eq!(summary, SyncSummary::default());
            assert_eq!(reminders.timer().pending_count(), 0);
        }
    }

    #[test]
    fn test_day_rollover_recomputes() {
        let mut reminders = scheduler();
        let meds = vec![twice("medication-a")];
        reminders.sync(&meds, at("2026-01-15", "22:00"));
        assert_eq!(reminders.timer().pending_count(), 0);

        let summary = reminders.sync(&meds, at("2026-01-16", "06:00"));
        assert_eq!(summary.scheduled, 2);
        assert_eq!(
            reminders.timer().next_deadline(),
            Some(at("2026-01-16", "09:00"))
        );
    }

    fn at_midnight(id: &str) -> Medication {
        let mut med = medication(Frequency::Once);
        med.id = id.into();
        med.time_slots = vec!["00:00".parse().unwrap()];
        med
    }

    #[test]
    fn test_midnight_slot_survives_rollover() {
        let mut reminders = scheduler();
        let meds = vec![at_midnight("medication-a")];
        reminders.sync(&meds, at("2026-01-15", "23:00"));
        assert_eq!(reminders.timer().pending_count(), 0);

        // Woken a little after midnight
        let now = date("2026-01-16").and_hms_opt(0, 0, 30).unwrap();
        assert_eq!(reminders.sync(&meds, now).scheduled, 1);

        let due = reminders.timer_mut().pop_due(now);
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].1.fire_at, at("2026-01-16", "00:00"));
    }

    #[test]
    fn test_cold_start_does_not_backfill() {
        let mut reminders = scheduler();
        let now = date("2026-01-16").and_hms_opt(0, 0, 30).unwrap();
        reminders.sync(&[at_midnight("medication-a")], now);
        assert_eq!(reminders.timer().pending_count(), 0);

        // A host that skipped a whole day gets no catch-up either
        let mut reminders = scheduler();
        reminders.sync(&[at_midnight("medication-a")], at("2026-01-14", "12:00"));
        reminders.sync(&[at_midnight("medication-a")], now);
        assert_eq!(reminders.timer().pending_count(), 0);
    }

    #[test]
    fn test_deliver_uses_current_collection() {
        let mut reminders = scheduler();
        let mut med = twice("medication-a");
        reminders.sync(&[med.clone()], at("2026-01-15", "08:00"));

        let now = at("2026-01-15", "09:00");
        let (handle, reminder) = reminders.timer_mut().pop_due(now).remove(0);
        med.name = "Metformin XR".into();
        let notification = reminders.deliver(&[med.clone()], handle, &reminder, now).unwrap();
        assert_eq!(notification.title, "Time to take Metformin XR");
        assert_eq!(reminders.state(&reminder.tag), Some(SlotState::Fired));

        // Disabled since it was scheduled
        med.reminder_enabled = false;
        let now = at("2026-01-15", "21:00");
        let (handle, reminder) = reminders.timer_mut().pop_due(now).remove(0);
        assert!(reminders.deliver(&[med], handle, &reminder, now).is_none());
        assert_eq!(reminders.state(&reminder.tag), Some(SlotState::Canceled));
    }

    #[test]
    fn test_late_timer_is_dropped() {
        let mut reminders = scheduler();
        let med = twice("medication-a");
        reminders.sync(&[med.clone()], at("2026-01-15", "08:00"));

        let now = at("2026-01-15", "09:04");
        let (handle, reminder) = reminders.timer_mut().pop_due(now).remove(0);
        assert!(reminders.deliver(&[med.clone()], handle, &reminder, now).is_some());

        let now = at("2026-01-15", "21:30");
        let (handle, reminder) = reminders.timer_mut().pop_due(now).remove(0);
        assert!(reminders.deliver(&[med], handle, &reminder, now).is_none());
    }

    #[test]
    fn test_pop_due_in_fire_order() {
        let mut reminders = scheduler();
        let mut early = medication(Frequency::Custom);
        early.id = "medication-b".into();
        early.time_slots = vec!["12:00".parse().unwrap(), "10:00".parse().unwrap()];
        reminders.sync(&[twice("medication-a"), early], at("2026-01-15", "08:00"));

        let due = reminders.timer_mut().pop_due(at("2026-01-15", "12:00"));
        let tags: Vec<_> = due.iter().map(|(_, r)| r.notification.tag.as_str()).collect();
        assert_eq!(tags, vec!["medication-a-0", "medication-b-1", "medication-b-0"]);
        assert_eq!(reminders.timer().pending_count(), 1);
    }
}
