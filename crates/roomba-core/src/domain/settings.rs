//! Cleaning preferences that the robot stores as pairs of booleans.
//!
//! Writes always set both underlying booleans so the robot never ends up in
//! a combination the hub cannot represent.

/// Preference key: automatic pass selection disabled.
pub const PREF_NO_AUTO_PASSES: &str = "noAutoPasses";
/// Preference key: two passes when automatic selection is disabled.
pub const PREF_TWO_PASS: &str = "twoPass";
/// Preference key: clean open areas only (edge clean off).
pub const PREF_OPEN_ONLY: &str = "openOnly";
/// Preference key: carpet boost (automatic fan speed).
pub const PREF_CARPET_BOOST: &str = "carpetBoost";
/// Preference key: maximum vacuum power.
pub const PREF_VAC_HIGH: &str = "vacHigh";
/// Preference key: finish the job when the bin is full.
pub const PREF_BIN_PAUSE: &str = "binPause";

/// A single boolean preference write.
pub type PreferenceWrite = (&'static str, bool);

/// Number of cleaning passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleaningPasses {
    One,
    Two,
    Automatic,
}

impl CleaningPasses {
    /// Decodes the two stored booleans; automatic selection wins whenever it
    /// is not disabled.
    pub fn from_flags(no_auto_passes: bool, two_pass: bool) -> Self {
        if !no_auto_passes {
            CleaningPasses::Automatic
        } else if two_pass {
            CleaningPasses::Two
        } else {
            CleaningPasses::One
        }
    }

    pub fn preference_writes(self) -> [PreferenceWrite; 2] {
        match self {
            CleaningPasses::One => [(PREF_NO_AUTO_PASSES, true), (PREF_TWO_PASS, false)],
            CleaningPasses::Two => [(PREF_NO_AUTO_PASSES, true), (PREF_TWO_PASS, true)],
            CleaningPasses::Automatic => [(PREF_NO_AUTO_PASSES, false), (PREF_TWO_PASS, false)],
        }
    }

    pub fn index(self) -> i64 {
        match self {
            CleaningPasses::One => 1,
            CleaningPasses::Two => 2,
            CleaningPasses::Automatic => 3,
        }
    }

    pub fn from_index(index: i64) -> Option<Self> {
        match index {
            1 => Some(CleaningPasses::One),
            2 => Some(CleaningPasses::Two),
            3 => Some(CleaningPasses::Automatic),
            _ => None,
        }
    }
}

/// Vacuum fan speed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FanSpeed {
    Eco,
    /// Carpet boost: the robot raises suction on carpet.
    Automatic,
    Performance,
}

impl FanSpeed {
    /// Decodes the two stored booleans; carpet boost wins over high vacuum.
    pub fn from_flags(carpet_boost: bool, vac_high: bool) -> Self {
        if carpet_boost {
            FanSpeed::Automatic
        } else if vac_high {
            FanSpeed::Performance
        } else {
            FanSpeed::Eco
        }
    }

    pub fn preference_writes(self) -> [PreferenceWrite; 2] {
        match self {
            FanSpeed::Eco => [(PREF_CARPET_BOOST, false), (PREF_VAC_HIGH, false)],
            FanSpeed::Automatic => [(PREF_CARPET_BOOST, true), (PREF_VAC_HIGH, false)],
            FanSpeed::Performance => [(PREF_CARPET_BOOST, false), (PREF_VAC_HIGH, true)],
        }
    }

    pub fn index(self) -> i64 {
        match self {
            FanSpeed::Eco => 1,
            FanSpeed::Automatic => 2,
            FanSpeed::Performance => 3,
        }
    }

    pub fn from_index(index: i64) -> Option<Self> {
        match index {
            1 => Some(FanSpeed::Eco),
            2 => Some(FanSpeed::Automatic),
            3 => Some(FanSpeed::Performance),
            _ => None,
        }
    }
}

/// What the robot does when the bin fills up mid-mission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinFullBehavior {
    Continue,
    Finish,
}

impl BinFullBehavior {
    pub fn from_flag(bin_pause: bool) -> Self {
        if bin_pause {
            BinFullBehavior::Finish
        } else {
            BinFullBehavior::Continue
        }
    }

    pub fn preference_write(self) -> PreferenceWrite {
        (PREF_BIN_PAUSE, self == BinFullBehavior::Finish)
    }

    pub fn index(self) -> i64 {
        match self {
            BinFullBehavior::Continue => 0,
            BinFullBehavior::Finish => 1,
        }
    }

    pub fn from_index(index: i64) -> Option<Self> {
        match index {
            0 => Some(BinFullBehavior::Continue),
            1 => Some(BinFullBehavior::Finish),
            _ => None,
        }
    }
}

/// Edge cleaning is the inverse of the robot's "open areas only" flag.
pub fn edge_clean_from_open_only(open_only: bool) -> bool {
    !open_only
}

pub fn edge_clean_preference_write(edge_clean: bool) -> PreferenceWrite {
    (PREF_OPEN_ONLY, !edge_clean)
}
