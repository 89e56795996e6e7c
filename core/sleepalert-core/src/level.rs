//! Battery level bands and the threshold table.

use serde::Serialize;

use crate::config::LevelConfig;

/// Lowest percent that classifies as `Normal` while on battery.
pub const LOWEST_NORMAL_PERCENT: u8 = 6;
pub const CRITICAL_MAX_PERCENT: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LevelBand {
    Normal,
    Warn5,
    Warn4,
    Warn3,
    Critical,
}

impl LevelBand {
    pub fn as_str(&self) -> &'static str {
        match self {
            LevelBand::Normal => "normal",
            LevelBand::Warn5 => "warn5",
            LevelBand::Warn4 => "warn4",
            LevelBand::Warn3 => "warn3",
            LevelBand::Critical => "critical",
        }
    }

    pub fn is_warning(&self) -> bool {
        matches!(self, LevelBand::Warn5 | LevelBand::Warn4 | LevelBand::Warn3)
    }

    /// Brightness the display is dimmed to on entry, for the warning bands.
    pub fn dim_target(&self, levels: &LevelConfig) -> Option<f64> {
        match self {
            LevelBand::Warn5 => Some(levels.warn5),
            LevelBand::Warn4 => Some(levels.warn4),
            LevelBand::Warn3 => Some(levels.warn3),
            LevelBand::Normal | LevelBand::Critical => None,
        }
    }
}

impl std::fmt::Display for LevelBand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Maps a reading to its band. On AC power everything is `Normal`.
pub fn classify(on_battery: bool, percent: u8) -> LevelBand {
    if !on_battery {
        return LevelBand::Normal;
    }
    match percent {
        0..=CRITICAL_MAX_PERCENT => LevelBand::Critical,
        3 => LevelBand::Warn3,
        4 => LevelBand::Warn4,
        5 => LevelBand::Warn5,
        _ => LevelBand::Normal,
    }
}
