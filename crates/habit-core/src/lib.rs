#![deny(warnings)]

//! Core domain models and invariants for the health progression engine.
//!
//! This crate defines the serializable types shared across the workspace
//! (daily log entries, challenge identifiers, ranks, the progression
//! aggregate) together with validation helpers and the static challenge
//! catalog. It contains no engine logic.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

/// A blood-pressure reading, both components in mmHg.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BloodPressure {
    /// Systolic pressure (> 0).
    pub systolic: u16,
    /// Diastolic pressure (> 0).
    pub diastolic: u16,
}

impl BloodPressure {
    /// Whether the reading is in the rewarded range (systolic < 130 and
    /// diastolic < 80). Anything else is penalized when scored.
    pub fn is_in_range(&self) -> bool {
        self.systolic < 130 && self.diastolic < 80
    }
}

/// One day's self-reported behaviors, prior to pricing.
///
/// `junk_score` uses an inverted scale: 10 means no junk consumed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyInput {
    /// Medication taken today.
    pub meds_taken: bool,
    /// Junk-food adherence, 0..=10 (10 = clean).
    pub junk_score: u8,
    /// Whole hours slept, 0..=24.
    pub sleep_hours: u8,
    /// Went to bed after midnight.
    pub slept_past_midnight: bool,
    /// Any deliberate movement/exercise.
    pub moved: bool,
    /// Optional blood-pressure reading; omitting it is never penalized.
    pub blood_pressure: Option<BloodPressure>,
}

/// A priced, dated log record. At most one per calendar day per user.
///
/// `points_awarded` is computed when the entry is created and frozen
/// thereafter; derived state is always recomputed from these records.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Calendar day this record covers (unique key within a history).
    pub date: NaiveDate,
    pub meds_taken: bool,
    pub junk_score: u8,
    pub sleep_hours: u8,
    pub slept_past_midnight: bool,
    pub moved: bool,
    pub blood_pressure: Option<BloodPressure>,
    /// Points granted for this day at submission time.
    pub points_awarded: i32,
}

impl LogEntry {
    /// Build a log record from a validated input and its awarded points.
    pub fn from_input(date: NaiveDate, input: &DailyInput, points_awarded: i32) -> Self {
        Self {
            date,
            meds_taken: input.meds_taken,
            junk_score: input.junk_score,
            sleep_hours: input.sleep_hours,
            slept_past_midnight: input.slept_past_midnight,
            moved: input.moved,
            blood_pressure: input.blood_pressure,
            points_awarded,
        }
    }

    /// The behavior fields of this record, without date or award.
    pub fn input(&self) -> DailyInput {
        DailyInput {
            meds_taken: self.meds_taken,
            junk_score: self.junk_score,
            sleep_hours: self.sleep_hours,
            slept_past_midnight: self.slept_past_midnight,
            moved: self.moved,
            blood_pressure: self.blood_pressure,
        }
    }
}

/// Challenge tiers, strictly ordered by difficulty. Each tier unlocks the
/// next; the ordering of the enum is the unlock ordering.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum ChallengeId {
    #[serde(rename = "7day")]
    SevenDay,
    #[serde(rename = "14day")]
    FourteenDay,
    #[serde(rename = "30day")]
    ThirtyDay,
}

impl ChallengeId {
    /// All tiers in unlock order.
    pub const ALL: [ChallengeId; 3] = [
        ChallengeId::SevenDay,
        ChallengeId::FourteenDay,
        ChallengeId::ThirtyDay,
    ];

    /// The tier that must be completed before this one unlocks.
    pub fn predecessor(&self) -> Option<ChallengeId> {
        match self {
            ChallengeId::SevenDay => None,
            ChallengeId::FourteenDay => Some(ChallengeId::SevenDay),
            ChallengeId::ThirtyDay => Some(ChallengeId::FourteenDay),
        }
    }
}

impl std::fmt::Display for ChallengeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChallengeId::SevenDay => write!(f, "7day"),
            ChallengeId::FourteenDay => write!(f, "14day"),
            ChallengeId::ThirtyDay => write!(f, "30day"),
        }
    }
}

impl std::str::FromStr for ChallengeId {
    type Err = ValidationError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "7day" => Ok(ChallengeId::SevenDay),
            "14day" => Ok(ChallengeId::FourteenDay),
            "30day" => Ok(ChallengeId::ThirtyDay),
            other => Err(ValidationError::UnknownChallenge(other.to_string())),
        }
    }
}

/// Rank labels, in ascending order. Derived from the completed-challenge
/// set, never stored independently of it.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum Rank {
    #[default]
    Rookie,
    Killer,
    King,
    Legend,
}

impl std::fmt::Display for Rank {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Rank::Rookie => write!(f, "Rookie"),
            Rank::Killer => write!(f, "Killer"),
            Rank::King => write!(f, "King"),
            Rank::Legend => write!(f, "Legend"),
        }
    }
}

impl std::str::FromStr for Rank {
    type Err = ValidationError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Rookie" => Ok(Rank::Rookie),
            "Killer" => Ok(Rank::Killer),
            "King" => Ok(Rank::King),
            "Legend" => Ok(Rank::Legend),
            other => Err(ValidationError::UnknownRank(other.to_string())),
        }
    }
}

/// A per-category guidance target for a challenge. Display-only: completion
/// is driven by cumulative points, not by these thresholds.
#[derive(Clone, Copy, Debug)]
pub struct TaskGoal {
    /// Days required (or minimum daily score, for the junk goal).
    pub target: u8,
    pub description: &'static str,
}

/// The five guidance targets shown for a challenge.
#[derive(Clone, Copy, Debug)]
pub struct TaskGoals {
    pub meds_days: TaskGoal,
    pub junk_floor: TaskGoal,
    pub sleep_days: TaskGoal,
    pub no_midnight_days: TaskGoal,
    pub move_days: TaskGoal,
}

/// Narrative shown at the start, midpoint, and end of a challenge.
#[derive(Clone, Copy, Debug)]
pub struct StageMessages {
    pub start: &'static str,
    pub middle: &'static str,
    pub end: &'static str,
}

/// Reward granted on completion: the rank badge and its flavor text.
#[derive(Clone, Copy, Debug)]
pub struct Reward {
    pub badge: Rank,
    pub message: &'static str,
}

/// A static challenge definition. Never mutated at runtime.
#[derive(Clone, Copy, Debug)]
pub struct ChallengeDefinition {
    pub id: ChallengeId,
    pub name: &'static str,
    pub description: &'static str,
    /// Length of the scoring window in days.
    pub duration_days: u16,
    /// Cumulative points within the window required for completion.
    pub points_goal: i32,
    pub tasks: TaskGoals,
    pub messages: StageMessages,
    pub reward: Reward,
    /// Next tier made available by completing this one.
    pub unlocks: Option<ChallengeId>,
}

/// The three-tier challenge table, in unlock order.
pub const CATALOG: [ChallengeDefinition; 3] = [
    ChallengeDefinition {
        id: ChallengeId::SevenDay,
        name: "Get Up, Sadman!",
        description: "Your first step to kidney domination. 7 days to prove you're a fighter.",
        duration_days: 7,
        points_goal: 250,
        tasks: TaskGoals {
            meds_days: TaskGoal {
                target: 5,
                description: "Take meds 5 out of 7 days",
            },
            junk_floor: TaskGoal {
                target: 5,
                description: "Keep junk score at 5+ daily (less junk = higher score)",
            },
            sleep_days: TaskGoal {
                target: 4,
                description: "Sleep 6+ hours 4 out of 7 days",
            },
            no_midnight_days: TaskGoal {
                target: 3,
                description: "No past midnight 3 out of 7 days",
            },
            move_days: TaskGoal {
                target: 3,
                description: "Move your body 3 out of 7 days",
            },
        },
        messages: StageMessages {
            start: "Sadman, you're in\u{2014}don't flop!",
            middle: "Halfway, dude\u{2014}keep it real!",
            end: "Rookie Killer! 14 days next?",
        },
        reward: Reward {
            badge: Rank::Killer,
            message: "You've earned the Killer badge! Ready to level up?",
        },
        unlocks: Some(ChallengeId::FourteenDay),
    },
    ChallengeDefinition {
        id: ChallengeId::FourteenDay,
        name: "Sadman Levels Up!",
        description: "Time to push harder. Show your kidneys who's boss for 14 straight days.",
        duration_days: 14,
        points_goal: 600,
        tasks: TaskGoals {
            meds_days: TaskGoal {
                target: 12,
                description: "Take meds 12 out of 14 days",
            },
            junk_floor: TaskGoal {
                target: 7,
                description: "Keep junk score at 7+ daily (mostly clean eating)",
            },
            sleep_days: TaskGoal {
                target: 10,
                description: "Sleep 6+ hours 10 out of 14 days",
            },
            no_midnight_days: TaskGoal {
                target: 8,
                description: "No past midnight 8 out of 14 days",
            },
            move_days: TaskGoal {
                target: 7,
                description: "Move your body 7 out of 14 days",
            },
        },
        messages: StageMessages {
            start: "Level 2 challenge accepted. Let's go!",
            middle: "Ten down, Sadman's a beast!",
            end: "Killer to King! 30 days up?",
        },
        reward: Reward {
            badge: Rank::King,
            message: "You've earned the King badge! Ready for the ultimate challenge?",
        },
        unlocks: Some(ChallengeId::ThirtyDay),
    },
    ChallengeDefinition {
        id: ChallengeId::ThirtyDay,
        name: "Sadman Rules!",
        description: "The ultimate challenge. 30 days to total kidney domination.",
        duration_days: 30,
        points_goal: 2000,
        tasks: TaskGoals {
            meds_days: TaskGoal {
                target: 27,
                description: "Take meds 27 out of 30 days",
            },
            junk_floor: TaskGoal {
                target: 8,
                description: "Keep junk score at 8+ daily (pro eating)",
            },
            sleep_days: TaskGoal {
                target: 25,
                description: "Sleep 6+ hours 25 out of 30 days",
            },
            no_midnight_days: TaskGoal {
                target: 20,
                description: "No past midnight 20 out of 30 days",
            },
            move_days: TaskGoal {
                target: 20,
                description: "Move your body 20 out of 30 days",
            },
        },
        messages: StageMessages {
            start: "The ultimate challenge begins! You got this, Sadman.",
            middle: "20 days? You're unreal!",
            end: "Sadman Rules! You're the king!",
        },
        reward: Reward {
            badge: Rank::Legend,
            message: "You've conquered the ultimate challenge! You're a Legend, Sadman!",
        },
        unlocks: None,
    },
];

/// Look up the static definition for a tier.
pub fn definition(id: ChallengeId) -> &'static ChallengeDefinition {
    match id {
        ChallengeId::SevenDay => &CATALOG[0],
        ChallengeId::FourteenDay => &CATALOG[1],
        ChallengeId::ThirtyDay => &CATALOG[2],
    }
}

/// The lowest uncompleted tier, or the top tier forever once everything is
/// done (the top challenge can be repeated).
pub fn next_challenge(completed: &BTreeSet<ChallengeId>) -> ChallengeId {
    for id in ChallengeId::ALL {
        if !completed.contains(&id) {
            return id;
        }
    }
    ChallengeId::ThirtyDay
}

/// The mutable progression aggregate for one user. All derived fields
/// (`points_total`, `streak`, `rank`) are recomputed from `logs` and the
/// completed set by the engine; only the engine's reducer replaces them.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgressionState {
    /// Log history keyed by date; the key enforces one entry per day.
    pub logs: BTreeMap<NaiveDate, LogEntry>,
    /// Sum of `points_awarded` over `logs`.
    pub points_total: i32,
    /// Current consecutive-day streak.
    pub streak: u32,
    /// Challenge currently in progress, if any.
    pub active_challenge: Option<ChallengeId>,
    /// Tiers completed at least once.
    pub completed_challenges: BTreeSet<ChallengeId>,
    /// Label of the highest completed tier.
    pub rank: Rank,
}

/// Persisted aggregate header, one row per user.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    pub name: String,
    pub points_total: i32,
    pub streak: u32,
    pub rank: Rank,
    pub active_challenge: Option<ChallengeId>,
    pub completed_challenges: Vec<ChallengeId>,
}

impl ProgressionState {
    /// Rebuild an aggregate from its persisted header and log rows.
    pub fn from_parts(record: &UserRecord, logs: Vec<LogEntry>) -> Self {
        Self {
            logs: logs.into_iter().map(|e| (e.date, e)).collect(),
            points_total: record.points_total,
            streak: record.streak,
            active_challenge: record.active_challenge,
            completed_challenges: record.completed_challenges.iter().copied().collect(),
            rank: record.rank,
        }
    }

    /// The persisted header for this aggregate.
    pub fn to_record(&self, name: &str) -> UserRecord {
        UserRecord {
            name: name.to_string(),
            points_total: self.points_total,
            streak: self.streak,
            rank: self.rank,
            active_challenge: self.active_challenge,
            completed_challenges: self.completed_challenges.iter().copied().collect(),
        }
    }
}

/// Validation errors for daily inputs and challenge identifiers.
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    /// Junk score must be within 0..=10.
    #[error("junk score {0} is out of range [0, 10]")]
    JunkScoreOutOfRange(u8),
    /// Sleep hours must be within 0..=24.
    #[error("sleep hours {0} is out of range [0, 24]")]
    SleepHoursOutOfRange(u8),
    /// Blood-pressure components must be strictly positive.
    #[error("blood pressure components must be positive")]
    NonPositiveBloodPressure,
    /// Challenge identifier not in the catalog.
    #[error("unknown challenge: {0}")]
    UnknownChallenge(String),
    /// Rank label not in the ladder.
    #[error("unknown rank: {0}")]
    UnknownRank(String),
}

/// Validate a daily input before pricing. Rejected inputs must not reach
/// the scoring calculator or mutate any state.
pub fn validate_input(input: &DailyInput) -> Result<(), ValidationError> {
    if input.junk_score > 10 {
        return Err(ValidationError::JunkScoreOutOfRange(input.junk_score));
    }
    if input.sleep_hours > 24 {
        return Err(ValidationError::SleepHoursOutOfRange(input.sleep_hours));
    }
    if let Some(bp) = &input.blood_pressure {
        if bp.systolic == 0 || bp.diastolic == 0 {
            return Err(ValidationError::NonPositiveBloodPressure);
        }
    }
    Ok(())
}
