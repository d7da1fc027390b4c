//! Cooldown-gated escalation to the remote vision-model analyzer.
//!
//! The frame loop never waits on the remote call. `Escalator::maybe_escalate`
//! spawns the request and returns; the finished result lands in a single-slot
//! channel that the next frame drains with `Escalator::poll`.

pub mod client;
pub mod fallback;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::EscalationConfig;
use crate::diagnosis::PostureReport;
use crate::error::{EscalationError, EscalationResult};
use crate::exercise::ExerciseKind;
use crate::pose::Keypoint;

pub use client::VisionClient;
pub use fallback::fallback_advice;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisMode {
    Realtime,
    Diagnosis,
}

/// Running metrics sent along with the frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MotionMetrics {
    pub progress: u8,
    pub last_score: u8,
    pub rep_count: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisRequest {
    /// JPEG as a data URL
    pub image: Option<String>,
    pub mode: AnalysisMode,
    pub exercise_type: ExerciseKind,
    pub keypoints: Vec<Keypoint>,
    pub normalized_keypoints: Option<Vec<Keypoint>>,
    pub metrics: MotionMetrics,
}

/// Wrap raw JPEG bytes as a data URL
pub fn jpeg_data_url(jpeg: &[u8]) -> String {
    format!("data:image/jpeg;base64,{}", STANDARD.encode(jpeg))
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct AnalysisResponse {
    #[serde(default)]
    pub advice: Option<String>,
    #[serde(default)]
    pub tts_alert: Option<String>,
    #[serde(default)]
    pub safety_risks: Option<String>,
    #[serde(default)]
    pub score_vlm: Option<f32>,
    /// Only in diagnosis mode
    #[serde(default)]
    pub report: Option<PostureReport>,
}

impl AnalysisResponse {
    pub fn is_empty(&self) -> bool {
        self.advice.is_none()
            && self.tts_alert.is_none()
            && self.safety_risks.is_none()
            && self.score_vlm.is_none()
            && self.report.is_none()
    }
}

/// The slower, higher-fidelity external analyzer
pub trait VisionAnalyzer: Send + Sync {
    fn analyze(&self, request: AnalysisRequest) -> BoxFuture<'static, EscalationResult<AnalysisResponse>>;
}

/// Clears the in-flight flag when dropped, whatever the call's outcome
pub struct InFlightGuard {
    flag: Arc<AtomicBool>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Decides whether a low score warrants a remote call
#[derive(Debug)]
pub struct EscalationGate {
    last_trigger_ms: Option<f64>,
    cooldown_ms: f64,
    score_threshold: u8,
    in_flight: Arc<AtomicBool>,
}

impl EscalationGate {
    pub fn new(score_threshold: u8, cooldown_ms: u64) -> Self {
        Self {
            last_trigger_ms: None,
            cooldown_ms: cooldown_ms as f64,
            score_threshold,
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn from_config(config: &EscalationConfig) -> Self {
        Self::new(config.score_threshold, config.cooldown_ms)
    }

    pub fn in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn should_fire(&self, score: u8, now_ms: f64, session_active: bool) -> bool {
        if !session_active || self.in_flight() {
            return false;
        }
        if score == 0 || score >= self.score_threshold {
            return false;
        }
        match self.last_trigger_ms {
            Some(last) => now_ms - last > self.cooldown_ms,
            None => true,
        }
    }

    /// Record the trigger and mark a call in flight
    pub fn arm(&mut self, now_ms: f64) -> InFlightGuard {
        self.last_trigger_ms = Some(now_ms);
        self.in_flight.store(true, Ordering::Release);
        InFlightGuard {
            flag: Arc::clone(&self.in_flight),
        }
    }
}

/// Result of one remote call, tagged with when and for what it was asked
#[derive(Debug)]
pub struct EscalationOutcome {
    pub requested_at_ms: f64,
    pub exercise: ExerciseKind,
    pub result: EscalationResult<AnalysisResponse>,
}

pub struct Escalator {
    gate: EscalationGate,
    analyzer: Arc<dyn VisionAnalyzer>,
    timeout: Duration,
    tx: mpsc::Sender<EscalationOutcome>,
    rx: mpsc::Receiver<EscalationOutcome>,
}

impl Escalator {
    pub fn new(gate: EscalationGate, analyzer: Arc<dyn VisionAnalyzer>, timeout: Duration) -> Self {
        let (tx, rx) = mpsc::channel(1);
        Self {
            gate,
            analyzer,
            timeout,
            tx,
            rx,
        }
    }

    pub fn from_config(config: &EscalationConfig, analyzer: Arc<dyn VisionAnalyzer>) -> Self {
        Self::new(
            EscalationGate::from_config(config),
            analyzer,
            Duration::from_secs(config.timeout_secs),
        )
    }

    pub fn gate(&self) -> &EscalationGate {
        &self.gate
    }

    /// Fire a remote analysis if the gate allows it. Returns whether a call was issued.
    ///
    /// `build_request` is only evaluated when the call actually goes out.
    pub fn maybe_escalate<F>(
        &mut self,
        score: u8,
        now_ms: f64,
        session_active: bool,
        exercise: ExerciseKind,
        build_request: F,
    ) -> bool
    where
        F: FnOnce() -> AnalysisRequest,
    {
        if !self.gate.should_fire(score, now_ms, session_active) {
            return false;
        }
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(h) => h,
            Err(_) => {
                warn!("No async runtime, skipping remote analysis");
                return false;
            }
        };

        let guard = self.gate.arm(now_ms);
        let request = self.analyzer.analyze(build_request());
        let tx = self.tx.clone();
        let timeout = self.timeout;
        info!(score, exercise = %exercise, "Requesting remote analysis");

        handle.spawn(async move {
            let result = match tokio::time::timeout(timeout, request).await {
                Ok(result) => result,
                Err(_) => Err(EscalationError::Timeout(timeout.as_millis() as u64)),
            };
            drop(guard);
            let outcome = EscalationOutcome {
                requested_at_ms: now_ms,
                exercise,
                result,
            };
            if tx.try_send(outcome).is_err() {
                debug!("Session gone or slot full, dropping analysis result");
            }
        });
        true
    }

    /// Take at most one completed result
    pub fn poll(&mut self) -> Option<EscalationOutcome> {
        self.rx.try_recv().ok()
    }

    /// Drop any queued result. The cooldown keeps running.
    pub fn reset(&mut self) {
        while self.rx.try_recv().is_ok() {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct CountingAnalyzer {
        calls: Arc<AtomicUsize>,
        delay: Duration,
        fail: bool,
    }

    impl VisionAnalyzer for CountingAnalyzer {
        fn analyze(&self, _request: AnalysisRequest) -> BoxFuture<'static, EscalationResult<AnalysisResponse>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let delay = self.delay;
            let fail = self.fail;
            Box::pin(async move {
                tokio::time::sleep(delay).await;
                if fail {
                    Err(EscalationError::RequestFailed("500 Internal Server Error".into()))
                } else {
                    Ok(AnalysisResponse {
                        advice: Some("Slow down on the way up".into()),
                        score_vlm: Some(72.0),
                        ..Default::default()
                    })
                }
            })
        }
    }

    fn request() -> AnalysisRequest {
        AnalysisRequest {
            image: None,
            mode: AnalysisMode::Realtime,
            exercise_type: ExerciseKind::Squat,
            keypoints: vec![Keypoint::default(); 33],
            normalized_keypoints: None,
            metrics: MotionMetrics {
                progress: 40,
                last_score: 35,
                rep_count: 2,
            },
        }
    }

    fn escalator(delay: Duration, fail: bool, timeout: Duration) -> (Escalator, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let analyzer = Arc::new(CountingAnalyzer {
            calls: Arc::clone(&calls),
            delay,
            fail,
        });
        (Escalator::new(EscalationGate::new(60, 25_000), analyzer, timeout), calls)
    }

    async fn wait_for_outcome(esc: &mut Escalator) -> EscalationOutcome {
        for _ in 0..200 {
            if let Some(outcome) = esc.poll() {
                return outcome;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("no outcome");
    }

    #[test]
    fn test_gate_score_window() {
        let gate = EscalationGate::new(60, 25_000);
        assert!(!gate.should_fire(0, 0.0, true));
        assert!(gate.should_fire(1, 0.0, true));
        assert!(gate.should_fire(59, 0.0, true));
        assert!(!gate.should_fire(60, 0.0, true));
        assert!(!gate.should_fire(30, 0.0, false));
    }

    #[test]
    fn test_gate_cooldown_and_in_flight() {
        let mut gate = EscalationGate::new(60, 25_000);
        let guard = gate.arm(1_000.0);
        assert!(gate.in_flight());
        assert!(!gate.should_fire(30, 100_000.0, true));
        drop(guard);
        assert!(!gate.in_flight());
        assert!(!gate.should_fire(30, 26_000.0, true));
        assert!(gate.should_fire(30, 26_001.0, true));
    }

    #[tokio::test]
    async fn test_cooldown_fires_once() {
        let (mut esc, calls) = escalator(Duration::from_millis(1), false, Duration::from_secs(1));
        assert!(esc.maybe_escalate(30, 0.0, true, ExerciseKind::Squat, request));
        let outcome = wait_for_outcome(&mut esc).await;
        assert!(outcome.result.is_ok());
        // in-flight cleared, but still inside the cooldown window
        assert!(!esc.maybe_escalate(30, 10_000.0, true, ExerciseKind::Squat, request));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(esc.maybe_escalate(30, 25_001.0, true, ExerciseKind::Squat, request));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_request_built_lazily() {
        let (mut esc, _) = escalator(Duration::from_millis(1), false, Duration::from_secs(1));
        let fired = esc.maybe_escalate(90, 0.0, true, ExerciseKind::Squat, || panic!("must not build"));
        assert!(!fired);
    }

    #[tokio::test]
    async fn test_failure_clears_in_flight() {
        let (mut esc, _) = escalator(Duration::from_millis(1), true, Duration::from_secs(1));
        assert!(esc.maybe_escalate(20, 0.0, true, ExerciseKind::Pushup, request));
        let outcome = wait_for_outcome(&mut esc).await;
        assert!(matches!(outcome.result, Err(EscalationError::RequestFailed(_))));
        assert_eq!(outcome.exercise, ExerciseKind::Pushup);
        assert!(!esc.gate().in_flight());
    }

    #[tokio::test]
    async fn test_timeout_is_recoverable() {
        let (mut esc, _) = escalator(Duration::from_secs(5), false, Duration::from_millis(20));
        assert!(esc.maybe_escalate(20, 0.0, true, ExerciseKind::Squat, request));
        assert!(esc.gate().in_flight());
        let outcome = wait_for_outcome(&mut esc).await;
        assert!(matches!(outcome.result, Err(EscalationError::Timeout(20))));
        assert!(!esc.gate().in_flight());
    }

    #[tokio::test]
    async fn test_reset_keeps_cooldown() {
        let (mut esc, calls) = escalator(Duration::from_millis(1), false, Duration::from_secs(1));
        assert!(esc.maybe_escalate(30, 0.0, true, ExerciseKind::Squat, request));
        wait_for_outcome(&mut esc).await;
        esc.reset();
        assert!(!esc.maybe_escalate(30, 1_000.0, true, ExerciseKind::Squat, request));
        esc.reset();
        assert!(!esc.maybe_escalate(30, 24_000.0, true, ExerciseKind::Squat, request));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(esc.maybe_escalate(30, 25_001.0, true, ExerciseKind::Squat, request));
    }

    #[tokio::test]
    async fn test_reset_drops_queued_result() {
        let (mut esc, _) = escalator(Duration::from_millis(1), false, Duration::from_secs(1));
        assert!(esc.maybe_escalate(30, 0.0, true, ExerciseKind::Squat, request));
        while esc.gate().in_flight() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        esc.reset();
        assert!(esc.poll().is_none());
    }

    #[test]
    fn test_without_runtime_does_not_arm() {
        let (mut esc, calls) = escalator(Duration::from_millis(1), false, Duration::from_secs(1));
        assert!(!esc.maybe_escalate(20, 0.0, true, ExerciseKind::Squat, request));
        assert!(!esc.gate().in_flight());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_data_url() {
        assert_eq!(jpeg_data_url(&[0xff, 0xd8]), "data:image/jpeg;base64,/9g=");
    }
}
