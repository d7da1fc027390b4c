use serde::{Deserialize, Serialize};

use crate::pose::{KeypointIndex, Pose};

/// Elapsed time used when a frame arrives with a non-increasing timestamp
const MIN_ELAPSED_SECS: f32 = 1e-4;

/// Tuning of one channel class
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FilterParams {
    /// Cutoff (Hz) when the signal is static
    #[serde(default = "default_min_cutoff")]
    pub min_cutoff: f32,
    /// Cutoff gain per unit of speed
    #[serde(default)]
    pub beta: f32,
    /// Cutoff (Hz) for the derivative estimate
    #[serde(default = "default_d_cutoff")]
    pub d_cutoff: f32,
}

fn default_min_cutoff() -> f32 { 1.0 }
fn default_d_cutoff() -> f32 { 1.0 }

impl FilterParams {
    pub fn new(min_cutoff: f32, beta: f32, d_cutoff: f32) -> Self {
        Self { min_cutoff, beta, d_cutoff }
    }
}

impl Default for FilterParams {
    fn default() -> Self {
        Self::new(default_min_cutoff(), 0.0, default_d_cutoff())
    }
}

/// alpha = 1 / (1 + tau/Te), tau = 1/(2*pi*fc)
fn smoothing_factor(te: f32, cutoff: f32) -> f32 {
    let tau = 1.0 / (2.0 * std::f32::consts::PI * cutoff);
    1.0 / (1.0 + tau / te)
}

/// One Euro Filter for a single scalar channel, driven by frame timestamps (ms)
#[derive(Debug, Clone)]
pub struct OneEuroFilter {
    params: FilterParams,
    last_value: Option<f32>,
    last_derivative: Option<f32>,
    last_timestamp: Option<f64>,
}

impl OneEuroFilter {
    pub fn new(params: FilterParams) -> Self {
        Self {
            params,
            last_value: None,
            last_derivative: None,
            last_timestamp: None,
        }
    }

    pub fn filter(&mut self, value: f32, timestamp_ms: f64) -> f32 {
        let (prev, last_ts) = match (self.last_value, self.last_timestamp) {
            (Some(prev), Some(ts)) => (prev, ts),
            _ => {
                self.last_value = Some(value);
                self.last_timestamp = Some(timestamp_ms);
                return value;
            }
        };

        let mut dt = ((timestamp_ms - last_ts) / 1000.0) as f32;
        if dt <= 0.0 {
            dt = MIN_ELAPSED_SECS;
        }

        let dx = (value - prev) / dt;
        let edx = match self.last_derivative {
            Some(last_dx) => {
                let a = smoothing_factor(dt, self.params.d_cutoff);
                a * dx + (1.0 - a) * last_dx
            }
            None => dx,
        };

        let cutoff = self.params.min_cutoff + self.params.beta * edx.abs();
        let a = smoothing_factor(dt, cutoff);
        let result = a * value + (1.0 - a) * prev;

        self.last_value = Some(result);
        self.last_derivative = Some(edx);
        self.last_timestamp = Some(timestamp_ms.max(last_ts));
        result
    }

    pub fn reset(&mut self) {
        self.last_value = None;
        self.last_derivative = None;
        self.last_timestamp = None;
    }

    pub fn last_value(&self) -> Option<f32> {
        self.last_value
    }
}

/// Number of body channels: every keypoint times (x, y, z)
pub const BODY_CHANNELS: usize = KeypointIndex::COUNT * 3;

/// Every filter channel one session owns
pub struct FilterBank {
    body: Vec<OneEuroFilter>,
    pub angle: OneEuroFilter,
    pub progress: OneEuroFilter,
}

impl FilterBank {
    pub fn new(body: FilterParams, angle: FilterParams, progress: FilterParams) -> Self {
        Self {
            body: (0..BODY_CHANNELS).map(|_| OneEuroFilter::new(body)).collect(),
            angle: OneEuroFilter::new(angle),
            progress: OneEuroFilter::new(progress),
        }
    }

    /// Smooth every coordinate of the pose. Visibility is passed through as detected.
    pub fn filter_pose(&mut self, pose: &Pose, timestamp_ms: f64) -> Pose {
        let mut filtered = pose.clone();
        for (i, kp) in filtered.keypoints.iter_mut().enumerate() {
            let base = i * 3;
            kp.x = self.body[base].filter(kp.x, timestamp_ms);
            kp.y = self.body[base + 1].filter(kp.y, timestamp_ms);
            kp.z = self.body[base + 2].filter(kp.z, timestamp_ms);
        }
        filtered
    }

    pub fn reset(&mut self) {
        for f in &mut self.body {
            f.reset();
        }
        self.angle.reset();
        self.progress.reset();
    }
}
