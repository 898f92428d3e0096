use crate::config::OperatingHours;
use crate::data::{Day, Hour, ProfessorId, RoomId, SectionId};
use crate::error::EngineError;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ResourceKind {
    Room,
    Professor,
    Section,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResourceKind::Room => "room",
            ResourceKind::Professor => "professor",
            ResourceKind::Section => "section",
        };
        f.write_str(name)
    }
}

/// Sorted, non-overlapping `[start, end)` reservations for one resource on one day.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct BusyIntervals(Vec<(Hour, Hour)>);

impl BusyIntervals {
    fn is_vacant(&self, start: Hour, end: Hour) -> bool {
        // first interval ending after `start` is the only candidate for overlap
        let idx = self.0.partition_point(|&(_, e)| e <= start);
        self.0.get(idx).is_none_or(|&(s, _)| s >= end)
    }

    fn holds(&self, start: Hour, end: Hour) -> bool {
        self.0.binary_search(&(start, end)).is_ok()
    }

    fn insert(&mut self, start: Hour, end: Hour) {
        let idx = self.0.partition_point(|&(s, _)| s < start);
        self.0.insert(idx, (start, end));
    }

    fn remove(&mut self, start: Hour, end: Hour) -> bool {
        match self.0.binary_search(&(start, end)) {
            Ok(idx) => {
                self.0.remove(idx);
                true
            }
            Err(_) => false,
        }
    }
}

type Lane = HashMap<u32, BTreeMap<Day, BusyIntervals>>;

/// Busy time for every room, professor and section within one generation run.
///
/// A tracker belongs to exactly one run; variants and concurrent runs each
/// build their own.
#[derive(Debug, Clone)]
pub struct OccupancyTracker {
    hours: OperatingHours,
    rooms: Lane,
    professors: Lane,
    sections: Lane,
}

/// A slot held by one placement: the room, the professor if any, and every section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reservation {
    pub day: Day,
    pub start: Hour,
    pub duration: u8,
    pub room_id: RoomId,
    pub professor_id: Option<ProfessorId>,
    pub section_ids: Vec<SectionId>,
}

impl Reservation {
    fn keys(&self) -> impl Iterator<Item = (ResourceKind, u32)> + '_ {
        std::iter::once((ResourceKind::Room, self.room_id))
            .chain(self.professor_id.map(|p| (ResourceKind::Professor, p)))
            .chain(self.section_ids.iter().map(|&s| (ResourceKind::Section, s)))
            .unique()
    }
}

impl OccupancyTracker {
    pub fn new(hours: OperatingHours) -> Self {
        OccupancyTracker {
            hours,
            rooms: HashMap::new(),
            professors: HashMap::new(),
            sections: HashMap::new(),
        }
    }

    pub fn operating_hours(&self) -> OperatingHours {
        self.hours
    }

    fn lane(&self, kind: ResourceKind) -> &Lane {
        match kind {
            ResourceKind::Room => &self.rooms,
            ResourceKind::Professor => &self.professors,
            ResourceKind::Section => &self.sections,
        }
    }

    fn lane_mut(&mut self, kind: ResourceKind) -> &mut Lane {
        match kind {
            ResourceKind::Room => &mut self.rooms,
            ResourceKind::Professor => &mut self.professors,
            ResourceKind::Section => &mut self.sections,
        }
    }

    pub fn is_vacant(
        &self,
        kind: ResourceKind,
        id: u32,
        day: Day,
        start: Hour,
        duration: u8,
    ) -> bool {
        let end = start.saturating_add(duration);
        self.lane(kind)
            .get(&id)
            .and_then(|days| days.get(&day))
            .is_none_or(|busy| busy.is_vacant(start, end))
    }

    /// True when exactly this interval was reserved for the resource.
    fn holds(&self, kind: ResourceKind, id: u32, day: Day, start: Hour, duration: u8) -> bool {
        let end = start.saturating_add(duration);
        self.lane(kind)
            .get(&id)
            .and_then(|days| days.get(&day))
            .is_some_and(|busy| busy.holds(start, end))
    }

    /// Marks the interval busy. Callers check `is_vacant` first; a clash here is a bug.
    pub fn reserve(
        &mut self,
        kind: ResourceKind,
        id: u32,
        day: Day,
        start: Hour,
        duration: u8,
    ) -> Result<(), EngineError> {
        self.check_hours(day, start, duration)?;
        if !self.is_vacant(kind, id, day, start, duration) {
            return Err(EngineError::SlotOccupied {
                kind,
                id,
                day,
                start,
                end: start + duration,
            });
        }
        self.insert(kind, id, day, start, duration);
        Ok(())
    }

    /// Drops a reservation made earlier with exactly the same interval.
    pub fn release(
        &mut self,
        kind: ResourceKind,
        id: u32,
        day: Day,
        start: Hour,
        duration: u8,
    ) -> Result<(), EngineError> {
        let end = start.saturating_add(duration);
        let removed = self
            .lane_mut(kind)
            .get_mut(&id)
            .and_then(|days| days.get_mut(&day))
            .is_some_and(|busy| busy.remove(start, end));
        if removed {
            Ok(())
        } else {
            Err(EngineError::NotReserved {
                kind,
                id,
                day,
                start,
                end,
            })
        }
    }

    /// True when the room, the professor and all sections are vacant.
    pub fn can_hold(&self, reservation: &Reservation) -> bool {
        let Reservation {
            day,
            start,
            duration,
            ..
        } = *reservation;
        reservation
            .keys()
            .all(|(kind, id)| self.is_vacant(kind, id, day, start, duration))
    }

    /// Reserves every resource of a placement, or nothing if any of them is taken.
    pub fn reserve_all(&mut self, reservation: &Reservation) -> Result<(), EngineError> {
        let Reservation {
            day,
            start,
            duration,
            ..
        } = *reservation;
        self.check_hours(day, start, duration)?;
        if let Some((kind, id)) = reservation
            .keys()
            .find(|&(kind, id)| !self.is_vacant(kind, id, day, start, duration))
        {
            return Err(EngineError::SlotOccupied {
                kind,
                id,
                day,
                start,
                end: start + duration,
            });
        }
        let keys: Vec<_> = reservation.keys().collect();
        for (kind, id) in keys {
            self.insert(kind, id, day, start, duration);
        }
        Ok(())
    }

    /// Releases every resource of a placement, or nothing if any of them does
    /// not hold exactly this interval.
    pub fn release_all(&mut self, reservation: &Reservation) -> Result<(), EngineError> {
        let Reservation {
            day,
            start,
            duration,
            ..
        } = *reservation;
        if let Some((kind, id)) = reservation
            .keys()
            .find(|&(kind, id)| !self.holds(kind, id, day, start, duration))
        {
            return Err(EngineError::NotReserved {
                kind,
                id,
                day,
                start,
                end: start.saturating_add(duration),
            });
        }
        let keys: Vec<_> = reservation.keys().collect();
        for (kind, id) in keys {
            self.release(kind, id, day, start, duration)?;
        }
        Ok(())
    }

    /// Loads a previously saved placement. Hours are not checked and clashes
    /// between saved rows are skipped rather than failing the run.
    pub fn preload(&mut self, reservation: &Reservation) -> usize {
        let keys: Vec<_> = reservation.keys().collect();
        let mut skipped = 0;
        for (kind, id) in keys {
            if self.is_vacant(kind, id, reservation.day, reservation.start, reservation.duration) {
                self.insert(kind, id, reservation.day, reservation.start, reservation.duration);
            } else {
                skipped += 1;
            }
        }
        skipped
    }

    fn insert(&mut self, kind: ResourceKind, id: u32, day: Day, start: Hour, duration: u8) {
        self.lane_mut(kind)
            .entry(id)
            .or_default()
            .entry(day)
            .or_default()
            .insert(start, start + duration);
    }

    fn check_hours(&self, day: Day, start: Hour, duration: u8) -> Result<(), EngineError> {
        if self.hours.contains(start, duration) {
            Ok(())
        } else {
            Err(EngineError::OutsideOperatingHours {
                day,
                start,
                end: start.saturating_add(duration),
                open: self.hours.open,
                close: self.hours.close,
            })
        }
    }
}
