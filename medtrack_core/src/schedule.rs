//! Daily dose slot generation.
//!
//! Maps a [`Frequency`] to its default time-of-day slots and implements the
//! add/remove edits allowed on custom schedules.

use crate::{Error, Frequency, Result, TimeOfDay};

const MORNING: u32 = 9 * 60;
const AFTERNOON: u32 = 14 * 60;
const EVENING: u32 = 21 * 60;

fn at(minutes: u32) -> TimeOfDay {
    TimeOfDay::from_minutes(minutes)
}

/// Slot appended by [`add_slot`]
pub fn default_slot() -> TimeOfDay {
    at(MORNING)
}

/// Default slots for a frequency.
///
/// Custom schedules are seeded with a single morning slot; the caller grows
/// them with [`add_slot`].
pub fn generate_slots(frequency: Frequency) -> Vec<TimeOfDay> {
    match frequency {
        Frequency::Once => vec![at(MORNING)],
        Frequency::Twice => vec![at(MORNING), at(EVENING)],
        Frequency::Thrice => vec![at(MORNING), at(AFTERNOON), at(EVENING)],
        Frequency::Custom => vec![at(MORNING)],
    }
}

/// Slots after switching from `old` to `new`.
///
/// Moving to a fixed frequency always resets to its template. Staying on
/// custom keeps the caller's slots; entering custom seeds a fresh schedule.
pub fn slots_for_frequency_change(
    old: Frequency,
    new: Frequency,
    current: &[TimeOfDay],
) -> Vec<TimeOfDay> {
    if new == Frequency::Custom && old == Frequency::Custom {
        current.to_vec()
    } else {
        generate_slots(new)
    }
}

/// Append a default slot to a custom schedule.
///
/// The declared custom dose count is not consulted; slots may outnumber or
/// undershoot it.
pub fn add_slot(frequency: Frequency, slots: &mut Vec<TimeOfDay>) -> Result<()> {
    if frequency != Frequency::Custom {
        return Err(Error::Schedule(format!(
            "slots can only be added to custom schedules (frequency is {})",
            frequency
        )));
    }
    slots.push(default_slot());
    Ok(())
}

/// Remove the slot at `index` from a custom schedule with more than one slot
pub fn remove_slot(frequency: Frequency, slots: &mut Vec<TimeOfDay>, index: usize) -> Result<TimeOfDay> {
    if frequency != Frequency::Custom {
        return Err(Error::Schedule(format!(
            "slots can only be removed from custom schedules (frequency is {})",
            frequency
        )));
    }
    if slots.len() <= 1 {
        return Err(Error::Schedule("a schedule needs at least one slot".into()));
    }
    if index >= slots.len() {
        return Err(Error::Schedule(format!(
            "slot {} out of range ({} slots)",
            index,
            slots.len()
        )));
    }
    Ok(slots.remove(index))
}

/// Check that `slots` fits `frequency`
pub fn validate_slots(frequency: Frequency, slots: &[TimeOfDay]) -> Result<()> {
    if slots.is_empty() {
        return Err(Error::Validation("at least one time slot is required".into()));
    }
    if let Some(expected) = frequency.fixed_slot_count() {
        if slots.len() != expected {
            return Err(Error::Validation(format!(
                "frequency {} needs {} time slot(s), got {}",
                frequency,
                expected,
                slots.len()
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hm(s: &str) -> TimeOfDay {
        s.parse().unwrap()
    }

    #[test]
    fn test_fixed_templates() {
        assert_eq!(generate_slots(Frequency::Once), vec![hm("09:00")]);
        assert_eq!(
            generate_slots(Frequency::Twice),
            vec![hm("09:00"), hm("21:00")]
        );
        assert_eq!(
            generate_slots(Frequency::Thrice),
            vec![hm("09:00"), hm("14:00"), hm("21:00")]
        );
        assert_eq!(generate_slots(Frequency::Custom), vec![hm("09:00")]);
    }

    #[test]
    fn test_fixed_counts_ignore_prior_state() {
        let customised = vec![hm("06:00"), hm("12:00"), hm("18:00"), hm("23:00")];
        for (freq, len) in [
            (Frequency::Once, 1),
            (Frequency::Twice, 2),
            (Frequency::Thrice, 3),
        ] {
            for old in [Frequency::Custom, Frequency::Once, Frequency::Thrice] {
                let slots = slots_for_frequency_change(old, freq, &customised);
                assert_eq!(slots.len(), len);
                assert_eq!(slots, generate_slots(freq));
            }
        }
    }

    #[test]
    fn test_custom_keeps_or_seeds() {
        let current = vec![hm("07:30"), hm("19:30")];
        assert_eq!(
            slots_for_frequency_change(Frequency::Custom, Frequency::Custom, &current),
            current
        );
        assert_eq!(
            slots_for_frequency_change(Frequency::Twice, Frequency::Custom, &current),
            vec![hm("09:00")]
        );
    }

    #[test]
    fn test_add_slot_does_not_fill_declared_count() {
        // customFrequency = 4 but only two slots configured
        let mut slots = generate_slots(Frequency::Custom);
        add_slot(Frequency::Custom, &mut slots).unwrap();
        assert_eq!(slots, vec![hm("09:00"), hm("09:00")]);
        assert!(validate_slots(Frequency::Custom, &slots).is_ok());
    }

    #[test]
    fn test_add_slot_rejected_for_fixed() {
        let mut slots = generate_slots(Frequency::Twice);
        assert!(matches!(
            add_slot(Frequency::Twice, &mut slots),
            Err(Error::Schedule(_))
        ));
        assert_eq!(slots.len(), 2);
    }

    #[test]
    fn test_remove_slot_rules() {
        let mut slots = vec![hm("08:00"), hm("12:00"), hm("20:00")];
        assert_eq!(remove_slot(Frequency::Custom, &mut slots, 1).unwrap(), hm("12:00"));
        assert_eq!(slots, vec![hm("08:00"), hm("20:00")]);

        assert!(remove_slot(Frequency::Custom, &mut slots, 5).is_err());
        remove_slot(Frequency::Custom, &mut slots, 0).unwrap();
        assert!(remove_slot(Frequency::Custom, &mut slots, 0).is_err());
        assert_eq!(slots.len(), 1);

        let mut fixed = generate_slots(Frequency::Thrice);
        assert!(remove_slot(Frequency::Thrice, &mut fixed, 0).is_err());
        assert_eq!(fixed.len(), 3);
    }

    #[test]
    fn test_validate_slots() {
        assert!(validate_slots(Frequency::Once, &[]).is_err());
        assert!(validate_slots(Frequency::Once, &[hm("08:00")]).is_ok());
        assert!(validate_slots(Frequency::Twice, &[hm("08:00")]).is_err());
    }
}
