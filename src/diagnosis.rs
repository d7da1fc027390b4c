//! Static posture diagnosis from a single standing pose.

use serde::{Deserialize, Serialize};

use crate::pose::{KeypointIndex, Pose};

const MIN_VISIBILITY: f32 = 0.5;

const SHOULDER_DANGER: f32 = 0.03;
const SHOULDER_WARNING: f32 = 0.015;
const PELVIS_WARNING: f32 = 0.02;
const HEAD_TILT_WARNING: f32 = 0.01;
const FORWARD_HEAD_DANGER: f32 = 0.05;
const FORWARD_HEAD_WARNING: f32 = 0.02;
const ROUNDED_SHOULDER_WARNING: f32 = 0.08;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum View {
    Front,
    Side,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Normal,
    Warning,
    Danger,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub label: String,
    pub value: String,
    pub status: Status,
    pub advice: String,
}

impl Finding {
    fn new(label: &str, value: &str, status: Status, advice: &str) -> Self {
        Self {
            label: label.to_string(),
            value: value.to_string(),
            status,
            advice: advice.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostureReport {
    /// Starts at 100, each finding deducts
    pub score: i32,
    pub summary: String,
    pub details: Vec<Finding>,
}

impl PostureReport {
    fn new() -> Self {
        Self {
            score: 100,
            summary: String::new(),
            details: Vec::new(),
        }
    }

    fn push(&mut self, penalty: i32, finding: Finding) {
        self.score -= penalty;
        self.details.push(finding);
    }

    fn summarize(&mut self) {
        self.summary = if self.score < 70 {
            "multiple imbalances detected"
        } else if self.score < 90 {
            "minor posture risks"
        } else {
            "posture looks good"
        }
        .to_string();
    }
}

/// Vertical offset between two keypoints, `None` if either is not visible
fn level_diff(pose: &Pose, a: KeypointIndex, b: KeypointIndex) -> Option<f32> {
    let (a, b) = (pose.get(a), pose.get(b));
    (a.is_visible(MIN_VISIBILITY) && b.is_visible(MIN_VISIBILITY)).then(|| (a.y - b.y).abs())
}

fn horizontal_offset(pose: &Pose, a: KeypointIndex, b: KeypointIndex) -> Option<f32> {
    let (a, b) = (pose.get(a), pose.get(b));
    (a.is_visible(MIN_VISIBILITY) && b.is_visible(MIN_VISIBILITY)).then(|| a.x - b.x)
}

pub fn diagnose(pose: &Pose, view: View) -> PostureReport {
    let mut report = PostureReport::new();
    match view {
        View::Front => diagnose_front(pose, &mut report),
        View::Side => diagnose_side(pose, &mut report),
    }
    report.summarize();
    report
}

fn diagnose_front(pose: &Pose, report: &mut PostureReport) {
    use KeypointIndex::*;

    if let Some(diff) = level_diff(pose, LeftShoulder, RightShoulder) {
        if diff > SHOULDER_DANGER {
            report.push(
                15,
                Finding::new(
                    "Uneven shoulders",
                    "pronounced",
                    Status::Danger,
                    "Add single-side resistance work and stretch the upper trapezius.",
                ),
            );
        } else if diff > SHOULDER_WARNING {
            report.push(
                5,
                Finding::new(
                    "Shoulder symmetry",
                    "slight offset",
                    Status::Warning,
                    "Watch how you carry bags and add chest-opening stretches.",
                ),
            );
        } else {
            report.push(
                0,
                Finding::new("Shoulder symmetry", "normal", Status::Normal, "Keep it up."),
            );
        }
    }

    if let Some(diff) = level_diff(pose, LeftHip, RightHip) {
        if diff > PELVIS_WARNING {
            report.push(
                10,
                Finding::new(
                    "Pelvic tilt",
                    "tilt detected",
                    Status::Warning,
                    "Check for leg length difference and strengthen the core.",
                ),
            );
        }
    }

    if let Some(diff) = level_diff(pose, LeftEye, RightEye) {
        if diff > HEAD_TILT_WARNING {
            report.push(
                5,
                Finding::new(
                    "Head tilt",
                    "slight tilt",
                    Status::Warning,
                    "Keep the neck neutral while reading and working.",
                ),
            );
        }
    }
}

fn diagnose_side(pose: &Pose, report: &mut PostureReport) {
    use KeypointIndex::*;

    if let Some(forward) = horizontal_offset(pose, LeftEar, LeftShoulder) {
        if forward > FORWARD_HEAD_DANGER {
            report.push(
                20,
                Finding::new(
                    "Forward head",
                    "severe",
                    Status::Danger,
                    "High risk for neck problems. Train the deep neck flexors.",
                ),
            );
        } else if forward > FORWARD_HEAD_WARNING {
            report.push(
                10,
                Finding::new(
                    "Forward head",
                    "mild",
                    Status::Warning,
                    "Raise your phone to eye level and practise chin tucks.",
                ),
            );
        }
    }

    if let Some(offset) = horizontal_offset(pose, LeftShoulder, LeftHip) {
        if offset.abs() > ROUNDED_SHOULDER_WARNING {
            report.push(
                15,
                Finding::new(
                    "Rounded shoulders",
                    "noticeable",
                    Status::Warning,
                    "Strengthen the upper back with rows and stretch the pec minor.",
                ),
            );
        }
    }
}
