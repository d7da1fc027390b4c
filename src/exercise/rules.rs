use crate::config::ExerciseConfig;
use crate::kinematics::one_euro::OneEuroFilter;
use crate::kinematics::signature::{
    match_signature, PoseSignature, JUMPING_JACK_SPREAD, PLANK, PUSHUP_BOTTOM, SQUAT_BOTTOM,
};
use crate::kinematics::skeleton::NormalizedSkeleton;
use crate::pose::{pose_angle, KeypointIndex, Pose};

use super::{to_percent, BodyPart, ExerciseKind, ExerciseState, Observation, Phase};

use KeypointIndex::*;

/// Angle-driven rep: Down below `down`, back Up above `up`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AngleRule {
    pub down: f32,
    pub up: f32,
    pub good_form: u8,
}

/// Jumping jack: Down (spread) when both hands are above the head and the spread
/// match exceeds `spread_match`, back Up when both hands drop `hand_margin` below the head
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JackRule {
    pub spread_match: f32,
    pub hand_margin: f32,
    pub good_form: u8,
}

/// Timed hold: the timer runs while the score stays above `hold_score`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HoldRule {
    pub hold_score: u8,
}

/// One exercise mode and its thresholds
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Exercise {
    Squat(AngleRule),
    Pushup(AngleRule),
    JumpingJack(JackRule),
    Plank(HoldRule),
}

const SQUAT_JOINT: [KeypointIndex; 3] = [RightHip, RightKnee, RightAnkle];
const PUSHUP_JOINT: [KeypointIndex; 3] = [RightShoulder, RightElbow, RightWrist];
const JACK_POINTS: [KeypointIndex; 3] = [Nose, LeftWrist, RightWrist];
const PLANK_POINTS: [KeypointIndex; 5] = [LeftShoulder, LeftHip, RightHip, LeftAnkle, RightAnkle];

impl Exercise {
    pub fn from_config(kind: ExerciseKind, config: &ExerciseConfig) -> Self {
        let good_form = config.good_form_score;
        match kind {
            ExerciseKind::Squat => Self::Squat(AngleRule {
                down: config.squat.down,
                up: config.squat.up,
                good_form,
            }),
            ExerciseKind::Pushup => Self::Pushup(AngleRule {
                down: config.pushup.down,
                up: config.pushup.up,
                good_form,
            }),
            ExerciseKind::JumpingJack => Self::JumpingJack(JackRule {
                spread_match: config.jumping_jack.spread_match,
                hand_margin: config.jumping_jack.hand_margin,
                good_form,
            }),
            ExerciseKind::Plank => Self::Plank(HoldRule {
                hold_score: config.plank.hold_score,
            }),
        }
    }

    pub fn kind(&self) -> ExerciseKind {
        match self {
            Self::Squat(_) => ExerciseKind::Squat,
            Self::Pushup(_) => ExerciseKind::Pushup,
            Self::JumpingJack(_) => ExerciseKind::JumpingJack,
            Self::Plank(_) => ExerciseKind::Plank,
        }
    }

    /// Reference pose scored by this mode
    pub fn signature(&self) -> &'static PoseSignature {
        match self {
            Self::Squat(_) => &SQUAT_BOTTOM,
            Self::Pushup(_) => &PUSHUP_BOTTOM,
            Self::JumpingJack(_) => &JUMPING_JACK_SPREAD,
            Self::Plank(_) => &PLANK,
        }
    }

    /// Keypoints that must be visible for the primary signal
    pub fn required_keypoints(&self) -> &'static [KeypointIndex] {
        match self {
            Self::Squat(_) => &SQUAT_JOINT,
            Self::Pushup(_) => &PUSHUP_JOINT,
            Self::JumpingJack(_) => &JACK_POINTS,
            Self::Plank(_) => &PLANK_POINTS,
        }
    }

    fn missing_part(&self) -> BodyPart {
        match self {
            Self::Squat(_) => BodyPart::Legs,
            Self::Pushup(_) => BodyPart::Arms,
            Self::JumpingJack(_) => BodyPart::HandsAndHead,
            Self::Plank(_) => BodyPart::FullBody,
        }
    }

    /// Reduce a filtered pose to this mode's observation.
    ///
    /// The angle filter only advances on frames that carry an angle, so an
    /// occluded frame leaves it untouched.
    pub fn observe(
        &self,
        pose: &Pose,
        skeleton: Option<&NormalizedSkeleton>,
        angle_filter: &mut OneEuroFilter,
        timestamp_ms: f64,
        min_visibility: f32,
    ) -> Observation {
        if !pose.all_visible(self.required_keypoints(), min_visibility) {
            return Observation::Missing(self.missing_part());
        }
        let form = skeleton.map_or(0.0, |s| match_signature(s, self.signature()));

        match self {
            Self::Squat(_) | Self::Pushup(_) => {
                let [a, b, c] = match self {
                    Self::Squat(_) => SQUAT_JOINT,
                    _ => PUSHUP_JOINT,
                };
                match pose_angle(pose, a, b, c, min_visibility) {
                    Some(raw) => Observation::Angle {
                        degrees: angle_filter.filter(raw, timestamp_ms),
                        form,
                    },
                    None => Observation::Missing(self.missing_part()),
                }
            }
            Self::JumpingJack(_) => match skeleton {
                Some(s) => Observation::Arms {
                    left_wrist_y: s.get(LeftWrist).y,
                    right_wrist_y: s.get(RightWrist).y,
                    head_y: s.get(Nose).y,
                    spread: form,
                },
                None => Observation::Missing(BodyPart::Torso),
            },
            Self::Plank(_) => Observation::Hold { form },
        }
    }

    /// Unfiltered progress (0..100) for this frame, independent of phase
    pub fn raw_progress(&self, obs: &Observation) -> Option<f32> {
        let progress = match (self, obs) {
            (Self::Squat(rule) | Self::Pushup(rule), Observation::Angle { degrees, .. }) => {
                (rule.up - degrees) / (rule.up - rule.down) * 100.0
            }
            (Self::JumpingJack(_), Observation::Arms { spread, .. }) => spread * 100.0,
            (Self::Plank(_), Observation::Hold { form }) => form * 100.0,
            _ => return None,
        };
        Some(progress.clamp(0.0, 100.0))
    }

    /// Advance the state machine by one observation.
    ///
    /// Transitions are edge-triggered: each fires only when the phase is on the
    /// opposite side of the crossed threshold. `rep_count` only ever grows.
    pub fn step(&self, state: &ExerciseState, obs: &Observation, now_ms: f64) -> ExerciseState {
        let mut next = state.clone();

        if let Observation::Missing(part) = obs {
            next.feedback = format!("Make sure your {} are visible to the camera", part);
            return next;
        }

        match (self, obs) {
            (Self::Squat(rule) | Self::Pushup(rule), Observation::Angle { degrees, form }) => {
                match state.phase {
                    Phase::Up if *degrees < rule.down => {
                        next.phase = Phase::Down;
                        next.last_score = to_percent(*form);
                        next.last_phase_change_ms = Some(now_ms);
                        next.feedback = self.bottom_feedback().to_string();
                    }
                    Phase::Down if *degrees > rule.up => {
                        next.phase = Phase::Up;
                        next.rep_count += 1;
                        next.last_phase_change_ms = Some(now_ms);
                        next.feedback = self.rep_feedback(next.rep_count, next.last_score, rule.good_form);
                    }
                    _ => {}
                }
            }
            (
                Self::JumpingJack(rule),
                Observation::Arms {
                    left_wrist_y,
                    right_wrist_y,
                    head_y,
                    spread,
                },
            ) => {
                let hands_up = *left_wrist_y < *head_y && *right_wrist_y < *head_y;
                let hands_down = left_wrist_y.min(*right_wrist_y) > head_y + rule.hand_margin;
                match state.phase {
                    Phase::Up if hands_up && *spread > rule.spread_match => {
                        next.phase = Phase::Down;
                        next.last_score = to_percent(*spread);
                        next.last_phase_change_ms = Some(now_ms);
                        next.feedback = self.bottom_feedback().to_string();
                    }
                    Phase::Down if hands_down => {
                        next.phase = Phase::Up;
                        next.rep_count += 1;
                        next.last_phase_change_ms = Some(now_ms);
                        next.feedback = self.rep_feedback(next.rep_count, next.last_score, rule.good_form);
                    }
                    _ => {}
                }
            }
            (Self::Plank(rule), Observation::Hold { form }) => {
                let score = to_percent(*form);
                next.last_score = score;
                if score > rule.hold_score {
                    let start = *next.hold_start_ms.get_or_insert(now_ms);
                    next.hold_secs = ((now_ms - start) / 1000.0).max(0.0) as f32;
                    next.best_hold_secs = next.best_hold_secs.max(next.hold_secs);
                    next.feedback = format!("Holding strong: {:.0}s", next.hold_secs);
                } else {
                    next.hold_start_ms = None;
                    next.hold_secs = 0.0;
                    next.feedback = "Keep shoulders, hips and ankles in one line".to_string();
                }
            }
            _ => {}
        }
        next
    }

    fn bottom_feedback(&self) -> &'static str {
        match self {
            Self::Squat(_) => "Good depth, now drive up",
            Self::Pushup(_) => "Chest low, push back up",
            Self::JumpingJack(_) => "Full spread, now bring it back in",
            Self::Plank(_) => "",
        }
    }

    fn rep_feedback(&self, reps: u32, score: u8, good_form: u8) -> String {
        if score > good_form {
            return format!("Rep {} done, great form!", reps);
        }
        let hint = match self {
            Self::Squat(_) => "keep your chest up and knees tracking over your toes",
            Self::Pushup(_) => "keep your body in a straight line",
            Self::JumpingJack(_) => "reach your arms fully overhead",
            Self::Plank(_) => "",
        };
        format!("Rep {} done, {}", reps, hint)
    }
}
