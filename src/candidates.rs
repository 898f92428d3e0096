use crate::availability::AvailabilityIndex;
use crate::config::OperatingHours;
use crate::data::{Day, Hour, ProfessorId, Room, RoomId, SectionId};
use crate::occupancy::{OccupancyTracker, Reservation, ResourceKind};
use serde::{Deserialize, Serialize};

/// How strictly a room's type must match the course.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RoomMatch {
    /// Primary or secondary type equals the required type.
    Strict,
    /// Any vacant room.
    Relaxed,
}

/// A feasible (day, start hour, room) triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate {
    pub day: Day,
    pub start: Hour,
    pub room_id: RoomId,
}

/// What one assignment needs from a slot.
#[derive(Debug, Clone)]
pub struct SlotRequest<'a> {
    pub duration: u8,
    pub room_type: &'a str,
    pub professor_id: Option<ProfessorId>,
    pub section_ids: &'a [SectionId],
}

impl SlotRequest<'_> {
    pub fn reservation(&self, candidate: Candidate) -> Reservation {
        Reservation {
            day: candidate.day,
            start: candidate.start,
            duration: self.duration,
            room_id: candidate.room_id,
            professor_id: self.professor_id,
            section_ids: self.section_ids.to_vec(),
        }
    }
}

/// Lazily walks days, then start hours, then rooms, yielding feasible slots.
///
/// Nothing is materialized up front; `restart` rewinds to the first day.
/// The generator borrows the tracker, so it has to be dropped before the
/// chosen candidate is reserved.
#[derive(Debug, Clone)]
pub struct CandidateSlots<'a> {
    request: SlotRequest<'a>,
    mode: RoomMatch,
    days: &'a [Day],
    hours: OperatingHours,
    rooms: &'a [&'a Room],
    availability: &'a AvailabilityIndex,
    occupancy: &'a OccupancyTracker,
    day_idx: usize,
    hour: Hour,
    room_idx: usize,
}

impl<'a> CandidateSlots<'a> {
    pub fn new(
        request: SlotRequest<'a>,
        mode: RoomMatch,
        days: &'a [Day],
        rooms: &'a [&'a Room],
        availability: &'a AvailabilityIndex,
        occupancy: &'a OccupancyTracker,
    ) -> Self {
        let hours = occupancy.operating_hours();
        CandidateSlots {
            request,
            mode,
            days,
            hours,
            rooms,
            availability,
            occupancy,
            day_idx: 0,
            hour: hours.open,
            room_idx: 0,
        }
    }

    pub fn restart(&mut self) {
        self.day_idx = 0;
        self.hour = self.hours.open;
        self.room_idx = 0;
    }

    // professor and sections do not depend on the room, check them once per hour
    fn time_is_open(&self, day: Day, start: Hour) -> bool {
        let duration = self.request.duration;
        if let Some(professor_id) = self.request.professor_id {
            if !self.availability.is_free(professor_id, day, start, duration)
                || !self
                    .occupancy
                    .is_vacant(ResourceKind::Professor, professor_id, day, start, duration)
            {
                return false;
            }
        }
        self.request
            .section_ids
            .iter()
            .all(|&s| self.occupancy.is_vacant(ResourceKind::Section, s, day, start, duration))
    }

    fn room_fits(&self, room: &Room, day: Day, start: Hour) -> bool {
        let type_ok = match self.mode {
            RoomMatch::Strict => room.hosts(self.request.room_type),
            RoomMatch::Relaxed => true,
        };
        type_ok
            && self
                .occupancy
                .is_vacant(ResourceKind::Room, room.id, day, start, self.request.duration)
    }

    fn advance_hour(&mut self) {
        self.room_idx = 0;
        self.hour += 1;
        if !self.hours.contains(self.hour, self.request.duration) {
            self.hour = self.hours.open;
            self.day_idx += 1;
        }
    }
}

impl Iterator for CandidateSlots<'_> {
    type Item = Candidate;

    fn next(&mut self) -> Option<Candidate> {
        if !self.hours.contains(self.hours.open, self.request.duration) {
            return None;
        }
        while let Some(&day) = self.days.get(self.day_idx) {
            let start = self.hour;
            if self.room_idx == 0 && !self.time_is_open(day, start) {
                self.advance_hour();
                continue;
            }
            while let Some(room) = self.rooms.get(self.room_idx) {
                self.room_idx += 1;
                if self.room_fits(room, day, start) {
                    return Some(Candidate {
                        day,
                        start,
                        room_id: room.id,
                    });
                }
            }
            self.advance_hour();
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{AvailabilityWindow, Professor};

    fn room(id: RoomId, room_type: &str, secondary: &[&str]) -> Room {
        Room {
            id,
            code: format!("R{id}"),
            building: "Main".into(),
            floor: 1,
            room_type: room_type.into(),
            secondary_types: secondary.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn available(id: ProfessorId, windows: &[(Day, Hour, Hour)]) -> Professor {
        Professor {
            id,
            name: "P".into(),
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
    fn yields_in_day_hour_room_order() {
        let rooms = [room(1, "Lab", &[]), room(2, "Lab", &[])];
        let room_refs: Vec<&Room> = rooms.iter().collect();
        let professor = available(1, &[(Day::Monday, 8, 10), (Day::Tuesday, 8, 9)]);
        let availability = AvailabilityIndex::build([&professor]);
        let tracker = OccupancyTracker::new(OperatingHours::default());
        let request = SlotRequest {
            duration: 1,
            room_type: "Lab",
            professor_id: Some(1),
            section_ids: &[],
        };
        let found: Vec<(Day, Hour, RoomId)> = CandidateSlots::new(
            request,
            RoomMatch::Strict,
            &Day::ALL,
            &room_refs,
            &availability,
            &tracker,
        )
        .map(|c| (c.day, c.start, c.room_id))
        .collect();
        assert_eq!(
            found,
            vec![
                (Day::Monday, 8, 1),
                (Day::Monday, 8, 2),
                (Day::Monday, 9, 1),
                (Day::Monday, 9, 2),
                (Day::Tuesday, 8, 1),
                (Day::Tuesday, 8, 2),
            ]
        );
    }

    #[test]
    fn strict_mode_honours_secondary_types() {
        let rooms = [room(1, "Lecture", &[]), room(2, "Lecture", &["Lab"])];
        let room_refs: Vec<&Room> = rooms.iter().collect();
        let availability = AvailabilityIndex::default();
        let tracker = OccupancyTracker::new(OperatingHours::default());
        let request = SlotRequest {
            duration: 2,
            room_type: "Lab",
            professor_id: None,
            section_ids: &[],
        };
        let mut slots = CandidateSlots::new(
            request.clone(),
            RoomMatch::Strict,
            &Day::ALL,
            &room_refs,
            &availability,
            &tracker,
        );
        assert_eq!(
            slots.next(),
            Some(Candidate {
                day: Day::Monday,
                start: 7,
                room_id: 2
            })
        );
        let mut relaxed = CandidateSlots::new(
            request,
            RoomMatch::Relaxed,
            &Day::ALL,
            &room_refs,
            &availability,
            &tracker,
        );
        assert_eq!(relaxed.next().map(|c| c.room_id), Some(1));
    }

    #[test]
    fn skips_busy_rooms_and_sections() {
        let rooms = [room(1, "Lab", &[])];
        let room_refs: Vec<&Room> = rooms.iter().collect();
        let availability = AvailabilityIndex::default();
        let mut tracker = OccupancyTracker::new(OperatingHours::default());
        tracker.reserve(ResourceKind::Room, 1, Day::Monday, 7, 2).unwrap();
        tracker.reserve(ResourceKind::Section, 4, Day::Monday, 9, 1).unwrap();
        let sections = [4];
        let request = SlotRequest {
            duration: 2,
            room_type: "Lab",
            professor_id: None,
            section_ids: &sections,
        };
        let first = CandidateSlots::new(
            request,
            RoomMatch::Strict,
            &Day::ALL,
            &room_refs,
            &availability,
            &tracker,
        )
        .next()
        .unwrap();
        assert_eq!((first.day, first.start), (Day::Monday, 10));
    }

    #[test]
    fn last_start_keeps_the_class_inside_closing_time() {
        let rooms = [room(1, "Lab", &[])];
        let room_refs: Vec<&Room> = rooms.iter().collect();
        let availability = AvailabilityIndex::default();
        let tracker = OccupancyTracker::new(OperatingHours { open: 7, close: 10 });
        let days = [Day::Monday];
        let request = SlotRequest {
            duration: 2,
            room_type: "Lab",
            professor_id: None,
            section_ids: &[],
        };
        let mut slots = CandidateSlots::new(
            request,
            RoomMatch::Strict,
            &days,
            &room_refs,
            &availability,
            &tracker,
        );
        let starts: Vec<Hour> = slots.by_ref().map(|c| c.start).collect();
        assert_eq!(starts, vec![7, 8]);
        slots.restart();
        assert_eq!(slots.next().map(|c| c.start), Some(7));
    }

    #[test]
    fn too_long_for_the_day_yields_nothing() {
        let rooms = [room(1, "Lab", &[])];
        let room_refs: Vec<&Room> = rooms.iter().collect();
        let availability = AvailabilityIndex::default();
        let tracker = OccupancyTracker::new(OperatingHours { open: 7, close: 9 });
        let request = SlotRequest {
            duration: 3,
            room_type: "Lab",
            professor_id: None,
            section_ids: &[],
        };
        let mut slots = CandidateSlots::new(
            request,
            RoomMatch::Strict,
            &Day::ALL,
            &room_refs,
            &availability,
            &tracker,
        );
        assert_eq!(slots.next(), None);
    }
}
