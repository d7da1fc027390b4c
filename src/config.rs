use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::warn;

use crate::error::CoachError;
use crate::kinematics::one_euro::FilterParams;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub filter: FilterConfig,
    #[serde(default)]
    pub exercise: ExerciseConfig,
    #[serde(default)]
    pub escalation: EscalationConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

/// Filter tuning per channel class
#[derive(Debug, Clone, Deserialize)]
pub struct FilterConfig {
    /// Keypoint coordinates (normalized image units)
    #[serde(default = "default_body_filter")]
    pub body: FilterParams,
    /// Joint angle (degrees)
    #[serde(default = "default_angle_filter")]
    pub angle: FilterParams,
    /// Progress percentage
    #[serde(default = "default_progress_filter")]
    pub progress: FilterParams,
}

fn default_body_filter() -> FilterParams { FilterParams::new(1.5, 0.3, 1.0) }
fn default_angle_filter() -> FilterParams { FilterParams::new(1.0, 0.01, 1.0) }
fn default_progress_filter() -> FilterParams { FilterParams::new(1.0, 0.005, 1.0) }

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            body: default_body_filter(),
            angle: default_angle_filter(),
            progress: default_progress_filter(),
        }
    }
}

/// Down/Up angle thresholds (degrees)
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct AngleThresholds {
    pub down: f32,
    pub up: f32,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct JackThresholds {
    /// Spread signature match required on the way up (0..1)
    #[serde(default = "default_spread_match")]
    pub spread_match: f32,
    /// How far below the head (torso units) both hands must drop
    #[serde(default = "default_hand_margin")]
    pub hand_margin: f32,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PlankThresholds {
    /// Score the hold timer requires (0..100, exclusive)
    #[serde(default = "default_hold_score")]
    pub hold_score: u8,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExerciseConfig {
    /// Keypoints below this visibility are "no signal"
    #[serde(default = "default_visibility_threshold")]
    pub visibility_threshold: f32,
    /// Scores above this are reported as good form
    #[serde(default = "default_good_form_score")]
    pub good_form_score: u8,
    #[serde(default = "default_squat")]
    pub squat: AngleThresholds,
    #[serde(default = "default_pushup")]
    pub pushup: AngleThresholds,
    #[serde(default = "default_jumping_jack")]
    pub jumping_jack: JackThresholds,
    #[serde(default = "default_plank")]
    pub plank: PlankThresholds,
}

fn default_visibility_threshold() -> f32 { 0.5 }
fn default_good_form_score() -> u8 { 80 }
fn default_squat() -> AngleThresholds { AngleThresholds { down: 105.0, up: 155.0 } }
fn default_pushup() -> AngleThresholds { AngleThresholds { down: 95.0, up: 150.0 } }
fn default_spread_match() -> f32 { 0.7 }
fn default_hand_margin() -> f32 { 0.2 }
fn default_jumping_jack() -> JackThresholds {
    JackThresholds { spread_match: default_spread_match(), hand_margin: default_hand_margin() }
}
fn default_hold_score() -> u8 { 85 }
fn default_plank() -> PlankThresholds { PlankThresholds { hold_score: default_hold_score() } }

impl Default for ExerciseConfig {
    fn default() -> Self {
        Self {
            visibility_threshold: default_visibility_threshold(),
            good_form_score: default_good_form_score(),
            squat: default_squat(),
            pushup: default_pushup(),
            jumping_jack: default_jumping_jack(),
            plank: default_plank(),
        }
    }
}

/// Remote vision-model analysis
#[derive(Debug, Clone, Deserialize)]
pub struct EscalationConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_analyze_path")]
    pub analyze_path: String,
    /// Bearer token, if the service wants one
    #[serde(default)]
    pub api_key: Option<String>,
    /// Scores strictly between 0 and this trigger a request
    #[serde(default = "default_score_threshold")]
    pub score_threshold: u8,
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_base_url() -> String { "http://localhost:8000/api".to_string() }
fn default_analyze_path() -> String { "/ai/vlm-analyze/".to_string() }
fn default_score_threshold() -> u8 { 60 }
fn default_cooldown_ms() -> u64 { 25_000 }
fn default_timeout_secs() -> u64 { 15 }

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: default_base_url(),
            analyze_path: default_analyze_path(),
            api_key: None,
            score_threshold: default_score_threshold(),
            cooldown_ms: default_cooldown_ms(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
}

fn default_listen_addr() -> String { "0.0.0.0:9100".to_string() }
fn default_log_dir() -> String { "logs".to_string() }

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            log_dir: default_log_dir(),
        }
    }
}

fn check_filter(name: &str, p: &FilterParams) -> Result<(), CoachError> {
    if !(p.min_cutoff > 0.0) || !(p.d_cutoff > 0.0) {
        return Err(CoachError::InvalidConfig(format!(
            "filter.{}: cutoffs must be positive (min_cutoff={}, d_cutoff={})",
            name, p.min_cutoff, p.d_cutoff
        )));
    }
    if !(p.beta >= 0.0) {
        return Err(CoachError::InvalidConfig(format!("filter.{}: beta must be >= 0, got {}", name, p.beta)));
    }
    Ok(())
}

fn check_angles(name: &str, t: &AngleThresholds) -> Result<(), CoachError> {
    let in_range = |v: f32| (0.0..=180.0).contains(&v);
    if !in_range(t.down) || !in_range(t.up) || t.down >= t.up {
        return Err(CoachError::InvalidConfig(format!(
            "exercise.{}: need 0 <= down < up <= 180 (down={}, up={})",
            name, t.down, t.up
        )));
    }
    Ok(())
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        Ok(config)
    }

    /// Load the file if present, otherwise fall back to defaults
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            return Self::default();
        }
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!("{:#}, using defaults", e);
                Self::default()
            }
        }
    }

    /// Reject settings no session can run with
    pub fn validate(&self) -> Result<(), CoachError> {
        check_filter("body", &self.filter.body)?;
        check_filter("angle", &self.filter.angle)?;
        check_filter("progress", &self.filter.progress)?;

        let ex = &self.exercise;
        if !(0.0..=1.0).contains(&ex.visibility_threshold) {
            return Err(CoachError::InvalidConfig(format!(
                "exercise.visibility_threshold must be within 0..1, got {}",
                ex.visibility_threshold
            )));
        }
        if ex.good_form_score > 100 {
            return Err(CoachError::InvalidConfig("exercise.good_form_score must be <= 100".into()));
        }
        check_angles("squat", &ex.squat)?;
        check_angles("pushup", &ex.pushup)?;
        if !(0.0..=1.0).contains(&ex.jumping_jack.spread_match) || !(ex.jumping_jack.hand_margin >= 0.0) {
            return Err(CoachError::InvalidConfig(
                "exercise.jumping_jack: spread_match must be within 0..1 and hand_margin >= 0".into(),
            ));
        }
        if ex.plank.hold_score > 100 {
            return Err(CoachError::InvalidConfig("exercise.plank.hold_score must be <= 100".into()));
        }

        let esc = &self.escalation;
        if esc.score_threshold == 0 || esc.score_threshold > 100 {
            return Err(CoachError::InvalidConfig(format!(
                "escalation.score_threshold must be within 1..=100, got {}",
                esc.score_threshold
            )));
        }
        if esc.timeout_secs == 0 {
            return Err(CoachError::InvalidConfig("escalation.timeout_secs must be positive".into()));
        }
        if esc.enabled && esc.base_url.trim().is_empty() {
            return Err(CoachError::InvalidConfig("escalation.base_url is empty".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.exercise.squat.down, 105.0);
        assert_eq!(config.exercise.pushup.up, 150.0);
        assert_eq!(config.escalation.cooldown_ms, 25_000);
        assert_eq!(config.escalation.score_threshold, 60);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
            [filter.angle]
            min_cutoff = 2.0

            [exercise.squat]
            down = 100.0
            up = 160.0

            [escalation]
            enabled = true
            cooldown_ms = 5000
            "#,
        )
        .unwrap();
        assert_eq!(config.filter.angle.min_cutoff, 2.0);
        assert_eq!(config.filter.angle.d_cutoff, 1.0);
        assert_eq!(config.filter.body, default_body_filter());
        assert_eq!(config.exercise.squat.down, 100.0);
        assert_eq!(config.exercise.pushup.down, 95.0);
        assert!(config.escalation.enabled);
        assert_eq!(config.escalation.cooldown_ms, 5000);
        assert_eq!(config.escalation.timeout_secs, 15);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_non_positive_cutoff() {
        let mut config = Config::default();
        config.filter.body.min_cutoff = 0.0;
        assert!(matches!(config.validate(), Err(CoachError::InvalidConfig(_))));

        let mut config = Config::default();
        config.filter.progress.d_cutoff = -1.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.filter.angle.beta = f32::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_inverted_thresholds() {
        let mut config = Config::default();
        config.exercise.squat = AngleThresholds { down: 160.0, up: 150.0 };
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.exercise.plank.hold_score = 101;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.escalation.score_threshold = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_sample_config_matches_defaults() {
        let config: Config = toml::from_str(include_str!("../config.toml")).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.filter.body, default_body_filter());
        assert_eq!(config.exercise.plank.hold_score, 85);
        assert_eq!(config.server.listen_addr, default_listen_addr());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[server]\nlisten_addr = \"127.0.0.1:7000\"").unwrap();
        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.server.listen_addr, "127.0.0.1:7000");
        assert_eq!(config.server.log_dir, "logs");
    }

    #[test]
    fn test_load_or_default_on_bad_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "this is not toml [").unwrap();
        let config = Config::load_or_default(file.path());
        assert_eq!(config.exercise.good_form_score, 80);

        let missing = Config::load_or_default("/nonexistent/coach.toml");
        assert_eq!(missing.server.listen_addr, "0.0.0.0:9100");
    }
}
