//! Mission phase and fault code tables.

/// Phase string → hub state index.  The empty phase maps to 0.
const PHASES: &[(&str, i64)] = &[
    ("", 0),
    ("charge", 1),
    ("new", 2),
    ("run", 3),
    ("resume", 4),
    ("hmMidMsn", 5),
    ("recharge", 6),
    ("stuck", 7),
    ("hmUsrDock", 8),
    ("dock", 9),
    ("dockend", 10),
    ("cancelled", 11),
    ("stop", 12),
    ("pause", 13),
    ("hmPostMsn", 14),
    ("evac", 15),
];

/// Phase codes during which the robot counts as running:
/// new mission, run, resume, mid-mission recharge and recharge.
const RUNNING_CODES: &[i64] = &[2, 3, 4, 5, 6];

/// Fault code → operator-facing description.
const ERROR_DESCRIPTIONS: &[(i64, &str)] = &[
    (0, "None"),
    (1, "Roomba is stuck with its left or right wheel hanging down."),
    (2, "The debris extractors can't turn."),
    (5, "The left or right wheel is stuck."),
    (
        6,
        "The cliff sensors are dirty, it is hanging over a drop, or it is stuck on a dark surface.",
    ),
    (8, "The fan is stuck or its filter is clogged."),
    (9, "The bumper is stuck, or the bumper sensor is dirty."),
    (10, "The left or right wheel is not moving."),
    (11, "Roomba has an internal error."),
    (14, "The bin has a bad connection to the robot."),
    (15, "Roomba has an internal error."),
    (
        16,
        "Roomba has started while moving or at an angle, or was bumped while running.",
    ),
    (17, "The cleaning job is incomplete."),
    (18, "Roomba cannot return to the Home Base or starting position."),
];

/// Hub state index for a reported phase, or `None` for unknown phases.
pub fn phase_code(phase: &str) -> Option<i64> {
    PHASES
        .iter()
        .find(|(name, _)| *name == phase)
        .map(|(_, code)| *code)
}

pub fn is_running(code: i64) -> bool {
    RUNNING_CODES.contains(&code)
}

/// Description of a fault code; unknown codes have none.
pub fn error_description(code: i64) -> Option<&'static str> {
    ERROR_DESCRIPTIONS
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, text)| *text)
}
