//! Per-exercise repetition state machines.

pub mod rules;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use rules::{AngleRule, Exercise, HoldRule, JackRule};

/// Exercise selected for a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExerciseKind {
    Squat,
    Pushup,
    JumpingJack,
    Plank,
}

impl ExerciseKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Squat => "squat",
            Self::Pushup => "pushup",
            Self::JumpingJack => "jumping-jack",
            Self::Plank => "plank",
        }
    }

    /// Timed exercises accumulate hold duration instead of reps
    pub fn is_timed(&self) -> bool {
        matches!(self, Self::Plank)
    }
}

impl fmt::Display for ExerciseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExerciseKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "squat" => Ok(Self::Squat),
            "pushup" | "push-up" => Ok(Self::Pushup),
            "jumping-jack" | "jumpingjack" => Ok(Self::JumpingJack),
            "plank" => Ok(Self::Plank),
            other => Err(format!("unknown exercise: {}", other)),
        }
    }
}

/// Coarse cycle position: `Up` is rest/extended, `Down` is active/flexed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Phase {
    Up,
    Down,
}

/// Body region whose keypoints were not visible enough this frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyPart {
    Legs,
    Arms,
    HandsAndHead,
    FullBody,
    Torso,
}

impl fmt::Display for BodyPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Legs => "hip, knee and ankle",
            Self::Arms => "shoulder, elbow and wrist",
            Self::HandsAndHead => "hands and head",
            Self::FullBody => "whole body from shoulders to ankles",
            Self::Torso => "shoulders and hips",
        };
        f.write_str(s)
    }
}

/// What one frame tells the state machine
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Observation {
    /// Required keypoints not visible: no transition allowed
    Missing(BodyPart),
    /// Filtered joint angle (degrees) and the bottom-pose signature match in [0, 1]
    Angle { degrees: f32, form: f32 },
    /// Normalized wrist and head heights (y grows downwards) and the spread match
    Arms {
        left_wrist_y: f32,
        right_wrist_y: f32,
        head_y: f32,
        spread: f32,
    },
    /// Signature match for a held pose
    Hold { form: f32 },
}

/// Live state of the active exercise
#[derive(Debug, Clone, PartialEq)]
pub struct ExerciseState {
    pub kind: ExerciseKind,
    pub phase: Phase,
    pub rep_count: u32,
    /// 0..=100
    pub last_score: u8,
    pub last_phase_change_ms: Option<f64>,
    pub hold_start_ms: Option<f64>,
    pub hold_secs: f32,
    pub best_hold_secs: f32,
    /// 0..=100
    pub progress: u8,
    pub feedback: String,
}

impl ExerciseState {
    pub fn new(kind: ExerciseKind) -> Self {
        Self {
            kind,
            phase: Phase::Up,
            rep_count: 0,
            last_score: 0,
            last_phase_change_ms: None,
            hold_start_ms: None,
            hold_secs: 0.0,
            best_hold_secs: 0.0,
            progress: 0,
            feedback: "Get into position".to_string(),
        }
    }
}

/// Fraction in [0, 1] to an integer percentage
pub fn to_percent(fraction: f32) -> u8 {
    if !fraction.is_finite() {
        return 0;
    }
    (fraction * 100.0).round().clamp(0.0, 100.0) as u8
}
