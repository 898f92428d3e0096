use crate::data::{Day, Hour};
use crate::error::EngineError;
use log::info;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The daily window in which classes may start and end, `[open, close)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct OperatingHours {
    pub open: Hour,
    pub close: Hour,
}

impl Default for OperatingHours {
    fn default() -> Self {
        OperatingHours { open: 7, close: 21 }
    }
}

impl OperatingHours {
    pub fn contains(&self, start: Hour, duration: u8) -> bool {
        duration > 0
            && start >= self.open
            && u16::from(start) + u16::from(duration) <= u16::from(self.close)
    }
}

/// Which assignment gets first pick of a contested slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum AssignmentOrder {
    /// Descending course duration, then ascending assignment id.
    #[default]
    LongestFirst,
    /// Ascending assignment id only.
    ById,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    pub operating_hours: OperatingHours,
    pub days: Vec<Day>,
    pub assignment_order: AssignmentOrder,
    pub max_variants: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            operating_hours: OperatingHours::default(),
            days: Day::ALL.to_vec(),
            assignment_order: AssignmentOrder::default(),
            max_variants: 8,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), EngineError> {
        let OperatingHours { open, close } = self.operating_hours;
        if open >= close {
            return Err(EngineError::InvalidConfig(format!(
                "operating hours open at {open} but close at {close}"
            )));
        }
        if close > 24 {
            return Err(EngineError::InvalidConfig(format!("closing hour {close} is past 24")));
        }
        if self.days.is_empty() {
            return Err(EngineError::InvalidConfig("no scheduling days configured".to_string()));
        }
        if self.max_variants == 0 {
            return Err(EngineError::InvalidConfig("maxVariants must be at least 1".to_string()));
        }
        Ok(())
    }

    /// Configured days in ascending order without duplicates.
    pub fn ordered_days(&self) -> Vec<Day> {
        let mut days = self.days.clone();
        days.sort();
        days.dedup();
        days
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind: "127.0.0.1:8080".to_string(),
        }
    }
}

/// Where the service reads catalog data and writes saved schedules.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum DataSource {
    /// A JSON `TimetableInput` file loaded into memory; saves are not durable.
    Seed { path: Option<PathBuf> },
    Sqlite { path: PathBuf },
}

impl Default for DataSource {
    fn default() -> Self {
        DataSource::Seed { path: None }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppConfig {
    pub engine: EngineConfig,
    pub server: ServerConfig,
    pub data: DataSource,
}

impl AppConfig {
    pub fn from_file(path: &Path) -> Result<AppConfig, String> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| format!("cannot read config {}: {}", path.display(), e))?;
        serde_json::from_str(&raw)
            .map_err(|e| format!("cannot parse config {}: {}", path.display(), e))
    }

    /// Reads `TIMETABLE_CONFIG`, then applies `TIMETABLE_BIND` and `TIMETABLE_DB` overrides.
    pub fn from_env() -> Result<AppConfig, String> {
        let mut config = match std::env::var_os("TIMETABLE_CONFIG") {
            Some(path) => {
                let path = PathBuf::from(path);
                info!("Loading configuration from {}", path.display());
                AppConfig::from_file(&path)?
            }
            None => AppConfig::default(),
        };
        if let Ok(bind) = std::env::var("TIMETABLE_BIND") {
            config.server.bind = bind;
        }
        if let Some(db) = std::env::var_os("TIMETABLE_DB") {
            config.data = DataSource::Sqlite { path: PathBuf::from(db) };
        }
        config.engine.validate().map_err(|e| e.to_string())?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_a_seven_to_nine_week() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.operating_hours, OperatingHours { open: 7, close: 21 });
        assert_eq!(config.ordered_days().len(), 6);
    }

    #[test]
    fn operating_hours_bound_both_ends() {
        let hours = OperatingHours::default();
        assert!(hours.contains(7, 3));
        assert!(hours.contains(18, 3));
        assert!(!hours.contains(19, 3));
        assert!(!hours.contains(6, 1));
        assert!(!hours.contains(8, 0));
    }

    #[test]
    fn rejects_inverted_hours_and_empty_days() {
        let mut config = EngineConfig::default();
        config.operating_hours = OperatingHours { open: 12, close: 9 };
        assert!(matches!(config.validate(), Err(EngineError::InvalidConfig(_))));

        let mut config = EngineConfig::default();
        config.days.clear();
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.operating_hours.close = 25;
        assert!(config.validate().is_err());
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config: AppConfig = serde_json::from_str(
            r#"{"engine": {"assignmentOrder": "byId"}, "data": {"kind": "sqlite", "path": "t.db"}}"#,
        )
        .unwrap();
        assert_eq!(config.engine.assignment_order, AssignmentOrder::ById);
        assert_eq!(config.engine.max_variants, 8);
        assert_eq!(config.server.bind, "127.0.0.1:8080");
        assert_eq!(config.data, DataSource::Sqlite { path: PathBuf::from("t.db") });
    }
}
