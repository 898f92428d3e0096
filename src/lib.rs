//! Timetable generation for academic departments.
//!
//! Assignments (course, professor, sections) are placed into a weekly grid of
//! day, hour and room so that no room, professor or section is double-booked.
//! Generation is a two-step affair: [`batch::Generator`] produces an in-memory
//! [`batch::Proposal`], and [`batch::save_proposal`] persists it through a
//! [`store::TimetableStore`].

pub mod availability;
pub mod batch;
pub mod candidates;
pub mod config;
pub mod data;
pub mod error;
pub mod occupancy;
pub mod server;
pub mod solver;
pub mod sqlite_store;
pub mod store;
