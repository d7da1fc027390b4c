//! One coaching session: filter, normalize, score, count, escalate.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::diagnosis::{diagnose, PostureReport, View};
use crate::error::CoachError;
use crate::escalation::{
    fallback_advice, jpeg_data_url, AnalysisMode, AnalysisRequest, EscalationOutcome, Escalator,
    MotionMetrics, VisionAnalyzer, VisionClient,
};
use crate::exercise::{to_percent, Exercise, ExerciseKind, ExerciseState, Phase};
use crate::kinematics::{FilterBank, Normalizer};
use crate::pose::Pose;

/// One detector output
#[derive(Debug, Clone)]
pub struct PoseFrame {
    pub timestamp_ms: f64,
    pub pose: Pose,
    pub jpeg: Option<Vec<u8>>,
}

/// What the presentation layer sees after each frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveState {
    pub mode: ExerciseKind,
    pub phase: Phase,
    pub rep_count: u32,
    pub progress: u8,
    pub last_score: u8,
    pub feedback: String,
    /// Current hold, timed exercises only
    pub duration_secs: Option<f32>,
    pub best_hold_secs: f32,
    pub safety_risk: Option<String>,
    pub tts_alert: Option<String>,
    pub remote_score: Option<f32>,
}

#[derive(Debug, Default)]
struct RemoteFeedback {
    safety_risk: Option<String>,
    tts_alert: Option<String>,
    remote_score: Option<f32>,
}

pub struct CoachSession {
    config: Config,
    exercise: Exercise,
    state: ExerciseState,
    filters: FilterBank,
    normalizer: Normalizer,
    escalator: Option<Escalator>,
    remote: RemoteFeedback,
    last_pose: Option<Pose>,
    active: bool,
    live: LiveState,
}

impl CoachSession {
    /// Start a session. Invalid configuration is rejected here, before any frame.
    pub fn new(config: &Config, kind: ExerciseKind) -> Result<Self, CoachError> {
        config.validate()?;

        let escalator = if config.escalation.enabled {
            let client = VisionClient::new(&config.escalation)?;
            info!("Remote analysis enabled: {}", client.url());
            Some(Escalator::from_config(&config.escalation, Arc::new(client)))
        } else {
            None
        };

        let state = ExerciseState::new(kind);
        let live = render(&state, &RemoteFeedback::default());
        Ok(Self {
            config: config.clone(),
            exercise: Exercise::from_config(kind, &config.exercise),
            state,
            filters: new_filters(config),
            normalizer: Normalizer::new(),
            escalator,
            remote: RemoteFeedback::default(),
            last_pose: None,
            active: true,
            live,
        })
    }

    /// Replace the remote analyzer
    pub fn with_analyzer(mut self, analyzer: Arc<dyn VisionAnalyzer>) -> Self {
        self.escalator = Some(Escalator::from_config(&self.config.escalation, analyzer));
        self
    }

    pub fn kind(&self) -> ExerciseKind {
        self.state.kind
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn live_state(&self) -> &LiveState {
        &self.live
    }

    pub fn exercise_state(&self) -> &ExerciseState {
        &self.state
    }

    pub fn process_frame(&mut self, frame: &PoseFrame) -> &LiveState {
        if !self.active {
            return &self.live;
        }
        let ts = frame.timestamp_ms;

        if let Some(outcome) = self.escalator.as_mut().and_then(Escalator::poll) {
            self.apply_outcome(outcome, ts);
        }

        let filtered = self.filters.filter_pose(&frame.pose, ts);
        let skeleton = self.normalizer.normalize(&filtered);
        let obs = self.exercise.observe(
            &filtered,
            skeleton.as_ref(),
            &mut self.filters.angle,
            ts,
            self.config.exercise.visibility_threshold,
        );

        let mut next = self.exercise.step(&self.state, &obs, ts);
        if let Some(raw) = self.exercise.raw_progress(&obs) {
            let smoothed = self.filters.progress.filter(raw, ts);
            next.progress = to_percent(smoothed / 100.0);
        }
        if next.rep_count != self.state.rep_count {
            debug!(mode = %next.kind, reps = next.rep_count, score = next.last_score, "Rep counted");
        }
        self.state = next;

        if let Some(escalator) = self.escalator.as_mut() {
            let state = &self.state;
            escalator.maybe_escalate(state.last_score, ts, self.active, state.kind, || AnalysisRequest {
                image: frame.jpeg.as_deref().map(jpeg_data_url),
                mode: AnalysisMode::Realtime,
                exercise_type: state.kind,
                keypoints: frame.pose.keypoints.to_vec(),
                normalized_keypoints: skeleton.as_ref().map(|s| s.keypoints.to_vec()),
                metrics: MotionMetrics {
                    progress: state.progress,
                    last_score: state.last_score,
                    rep_count: state.rep_count,
                },
            });
        }

        self.last_pose = Some(filtered);
        self.live = render(&self.state, &self.remote);
        &self.live
    }

    /// Merge a finished remote analysis. Only feedback fields change.
    fn apply_outcome(&mut self, outcome: EscalationOutcome, now_ms: f64) {
        debug!(
            latency_ms = now_ms - outcome.requested_at_ms,
            ok = outcome.result.is_ok(),
            "Remote analysis returned"
        );
        if outcome.exercise != self.state.kind {
            debug!("Dropping analysis for {} after mode change", outcome.exercise);
            return;
        }
        match outcome.result {
            Ok(response) => {
                if let Some(advice) = response.advice {
                    self.state.feedback = advice;
                }
                self.remote.tts_alert = response.tts_alert;
                self.remote.safety_risk = response.safety_risks;
                self.remote.remote_score = response.score_vlm.map(|s| s.clamp(0.0, 100.0));
            }
            Err(e) => {
                warn!(transient = e.is_transient(), "Remote analysis failed: {}", e);
                self.state.feedback = fallback_advice(self.state.kind, self.state.last_score);
            }
        }
        self.live = render(&self.state, &self.remote);
    }

    /// Switch exercise. All per-mode state starts over.
    pub fn set_mode(&mut self, kind: ExerciseKind) {
        info!("Mode {} -> {}", self.state.kind, kind);
        self.exercise = Exercise::from_config(kind, &self.config.exercise);
        self.restart(kind);
    }

    pub fn reset(&mut self) {
        self.restart(self.state.kind);
    }

    fn restart(&mut self, kind: ExerciseKind) {
        self.state = ExerciseState::new(kind);
        self.filters.reset();
        self.normalizer.reset();
        self.remote = RemoteFeedback::default();
        self.last_pose = None;
        if let Some(escalator) = self.escalator.as_mut() {
            escalator.reset();
        }
        self.live = render(&self.state, &self.remote);
    }

    /// Stop accepting frames. In-flight remote calls are abandoned.
    pub fn stop(&mut self) {
        self.active = false;
        self.escalator = None;
        info!(mode = %self.state.kind, reps = self.state.rep_count, "Session stopped");
    }

    /// Posture check on the most recent filtered pose
    pub fn diagnose(&self, view: View) -> Option<PostureReport> {
        self.last_pose.as_ref().map(|pose| diagnose(pose, view))
    }
}

fn new_filters(config: &Config) -> FilterBank {
    FilterBank::new(config.filter.body, config.filter.angle, config.filter.progress)
}

fn render(state: &ExerciseState, remote: &RemoteFeedback) -> LiveState {
    LiveState {
        mode: state.kind,
        phase: state.phase,
        rep_count: state.rep_count,
        progress: state.progress,
        last_score: state.last_score,
        feedback: state.feedback.clone(),
        duration_secs: state.kind.is_timed().then_some(state.hold_secs),
        best_hold_secs: state.best_hold_secs,
        safety_risk: remote.safety_risk.clone(),
        tts_alert: remote.tts_alert.clone(),
        remote_score: remote.remote_score,
    }
}
