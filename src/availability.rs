use crate::data::{Day, Hour, Professor, ProfessorId};
use std::collections::HashMap;

/// One bit per hour of the day, bit `h` set when `[h, h+1)` is free.
type DayMask = u32;

/// Week-by-hour free-time bitmap per professor.
#[derive(Debug, Clone, Default)]
pub struct AvailabilityIndex {
    masks: HashMap<ProfessorId, [DayMask; 6]>,
}

impl AvailabilityIndex {
    pub fn build<'a>(professors: impl IntoIterator<Item = &'a Professor>) -> Self {
        let mut masks = HashMap::new();
        for professor in professors {
            let week: &mut [DayMask; 6] = masks.entry(professor.id).or_insert([0; 6]);
            for window in &professor.availability {
                week[day_slot(window.day)] |= span_mask(window.start_hour, window.end_hour);
            }
        }
        AvailabilityIndex { masks }
    }

    /// True only if every hour of `[start, start + duration)` is inside a declared window.
    pub fn is_free(&self, professor_id: ProfessorId, day: Day, start: Hour, duration: u8) -> bool {
        let Some(week) = self.masks.get(&professor_id) else {
            return false;
        };
        let end = u16::from(start) + u16::from(duration);
        if duration == 0 || end > 24 {
            return false;
        }
        let wanted = span_mask(start, end as Hour);
        week[day_slot(day)] & wanted == wanted
    }
}

fn day_slot(day: Day) -> usize {
    usize::from(day.index() - 1)
}

fn span_mask(start: Hour, end: Hour) -> DayMask {
    let end = end.min(24);
    if start >= end {
        return 0;
    }
    let width = u32::from(end - start);
    ((1u32 << width) - 1) << start
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::AvailabilityWindow;

    fn professor(id: ProfessorId, windows: &[(Day, Hour, Hour)]) -> Professor {
        Professor {
            id,
            name: format!("P{id}"),
            status: "Regular".into(),
            availability: windows
                .iter()
                .map(|&(day, start_hour, end_hour)| AvailabilityWindow {
                    day,
                    start_hour,
                    end_hour,
                })
                .collect(),
        }
    }

    #[test]
    fn span_must_sit_inside_windows() {
        let p = professor(1, &[(Day::Monday, 8, 12)]);
        let index = AvailabilityIndex::build([&p]);
        assert!(index.is_free(1, Day::Monday, 8, 3));
        assert!(index.is_free(1, Day::Monday, 9, 3));
        assert!(!index.is_free(1, Day::Monday, 10, 3));
        assert!(!index.is_free(1, Day::Monday, 7, 2));
        assert!(!index.is_free(1, Day::Tuesday, 8, 1));
    }

    #[test]
    fn adjacent_windows_join() {
        let p = professor(2, &[(Day::Friday, 8, 10), (Day::Friday, 10, 13)]);
        let index = AvailabilityIndex::build([&p]);
        assert!(index.is_free(2, Day::Friday, 9, 3));
    }

    #[test]
    fn gap_between_windows_blocks_span() {
        let p = professor(3, &[(Day::Monday, 8, 10), (Day::Monday, 11, 13)]);
        let index = AvailabilityIndex::build([&p]);
        assert!(!index.is_free(3, Day::Monday, 9, 3));
        assert!(index.is_free(3, Day::Monday, 11, 2));
    }

    #[test]
    fn professors_without_windows_are_never_free() {
        let p = professor(4, &[]);
        let index = AvailabilityIndex::build([&p]);
        assert!(!index.is_free(4, Day::Monday, 8, 1));
        assert!(!index.is_free(99, Day::Monday, 8, 1));
    }

    #[test]
    fn end_of_day_windows_are_usable() {
        let p = professor(5, &[(Day::Saturday, 20, 24)]);
        let index = AvailabilityIndex::build([&p]);
        assert!(index.is_free(5, Day::Saturday, 21, 3));
        assert!(!index.is_free(5, Day::Saturday, 22, 3));
    }
}
