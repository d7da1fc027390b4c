//! Body-centric, scale-invariant skeleton.
//!
//! Every keypoint is re-expressed relative to the hip midpoint and divided by
//! the torso length (shoulder midpoint to hip midpoint), so camera distance and
//! framing drop out of every downstream comparison.

use nalgebra::Vector2;

use crate::pose::{Keypoint, KeypointIndex, Pose};

/// Torso lengths below this are treated as a collapsed or missing body
pub const MIN_TORSO_LENGTH: f32 = 1e-4;

/// Pose in torso units, centered on the hips
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedSkeleton {
    pub keypoints: [Keypoint; KeypointIndex::COUNT],
}

impl NormalizedSkeleton {
    pub fn get(&self, index: KeypointIndex) -> &Keypoint {
        &self.keypoints[index as usize]
    }

    /// 2D position of a keypoint
    pub fn point(&self, index: usize) -> Vector2<f32> {
        let kp = &self.keypoints[index];
        Vector2::new(kp.x, kp.y)
    }
}

fn midpoint(a: &Keypoint, b: &Keypoint) -> Vector2<f32> {
    Vector2::new((a.x + b.x) / 2.0, (a.y + b.y) / 2.0)
}

/// Shoulders and hips anchor the frame; below this they are "no signal"
pub const ANCHOR_MIN_VISIBILITY: f32 = 0.5;

const ANCHORS: [KeypointIndex; 4] = [
    KeypointIndex::LeftShoulder,
    KeypointIndex::RightShoulder,
    KeypointIndex::LeftHip,
    KeypointIndex::RightHip,
];

/// Normalize a pose, or `None` when the torso is occluded or degenerate
pub fn normalize(pose: &Pose) -> Option<NormalizedSkeleton> {
    if !pose.all_visible(&ANCHORS, ANCHOR_MIN_VISIBILITY) {
        return None;
    }
    let mid_shoulder = midpoint(
        pose.get(KeypointIndex::LeftShoulder),
        pose.get(KeypointIndex::RightShoulder),
    );
    let mid_hip = midpoint(pose.get(KeypointIndex::LeftHip), pose.get(KeypointIndex::RightHip));

    let torso_length = (mid_shoulder - mid_hip).norm();
    if !torso_length.is_finite() || torso_length < MIN_TORSO_LENGTH {
        return None;
    }

    let mut keypoints = pose.keypoints;
    for kp in keypoints.iter_mut() {
        kp.x = (kp.x - mid_hip.x) / torso_length;
        kp.y = (kp.y - mid_hip.y) / torso_length;
        kp.z /= torso_length;
    }
    Some(NormalizedSkeleton { keypoints })
}

/// Normalizer that keeps showing the last good skeleton through degenerate frames
#[derive(Debug, Default)]
pub struct Normalizer {
    last_valid: Option<NormalizedSkeleton>,
}

impl Normalizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn normalize(&mut self, pose: &Pose) -> Option<NormalizedSkeleton> {
        if let Some(skeleton) = normalize(pose) {
            self.last_valid = Some(skeleton);
        }
        self.last_valid.clone()
    }

    pub fn reset(&mut self) {
        self.last_valid = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Standing figure with a few asymmetric limbs so the check is not trivial
    fn sample_pose() -> Pose {
        let mut keypoints = [Keypoint::new(0.5, 0.5, 0.0, 0.9); KeypointIndex::COUNT];
        for (i, kp) in keypoints.iter_mut().enumerate() {
            let f = i as f32;
            kp.x = 0.3 + 0.013 * f;
            kp.y = 0.1 + 0.021 * f;
            kp.z = -0.05 + 0.004 * f;
        }
        keypoints[KeypointIndex::LeftShoulder as usize] = Keypoint::new(0.42, 0.30, -0.1, 0.9);
        keypoints[KeypointIndex::RightShoulder as usize] = Keypoint::new(0.58, 0.31, -0.1, 0.9);
        keypoints[KeypointIndex::LeftHip as usize] = Keypoint::new(0.45, 0.60, 0.0, 0.9);
        keypoints[KeypointIndex::RightHip as usize] = Keypoint::new(0.55, 0.61, 0.0, 0.9);
        Pose::new(keypoints)
    }

    fn transform(pose: &Pose, scale: f32, dx: f32, dy: f32) -> Pose {
        let mut out = pose.clone();
        for kp in out.keypoints.iter_mut() {
            kp.x = kp.x * scale + dx;
            kp.y = kp.y * scale + dy;
            kp.z *= scale;
        }
        out
    }

    fn assert_skeletons_close(a: &NormalizedSkeleton, b: &NormalizedSkeleton) {
        for (p, q) in a.keypoints.iter().zip(b.keypoints.iter()) {
            assert!((p.x - q.x).abs() < 1e-4, "x {} vs {}", p.x, q.x);
            assert!((p.y - q.y).abs() < 1e-4, "y {} vs {}", p.y, q.y);
            assert!((p.z - q.z).abs() < 1e-4, "z {} vs {}", p.z, q.z);
        }
    }

    #[test]
    fn test_hip_center_is_origin() {
        let n = normalize(&sample_pose()).unwrap();
        let mid_x = (n.get(KeypointIndex::LeftHip).x + n.get(KeypointIndex::RightHip).x) / 2.0;
        let mid_y = (n.get(KeypointIndex::LeftHip).y + n.get(KeypointIndex::RightHip).y) / 2.0;
        assert!(mid_x.abs() < 1e-6 && mid_y.abs() < 1e-6);
    }

    #[test]
    fn test_torso_is_unit_length() {
        let n = normalize(&sample_pose()).unwrap();
        let shoulder = (n.point(11) + n.point(12)) / 2.0;
        let hip = (n.point(23) + n.point(24)) / 2.0;
        assert!(((shoulder - hip).norm() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_scale_invariance() {
        let pose = sample_pose();
        let base = normalize(&pose).unwrap();
        for &s in &[0.25, 0.5, 2.0, 3.7] {
            let scaled = normalize(&transform(&pose, s, 0.0, 0.0)).unwrap();
            assert_skeletons_close(&base, &scaled);
        }
    }

    #[test]
    fn test_translation_invariance() {
        let pose = sample_pose();
        let base = normalize(&pose).unwrap();
        let moved = normalize(&transform(&pose, 1.0, 0.17, -0.23)).unwrap();
        assert_skeletons_close(&base, &moved);
    }

    #[test]
    fn test_degenerate_torso_is_unavailable() {
        let pose = Pose::new([Keypoint::new(0.5, 0.5, 0.0, 0.9); KeypointIndex::COUNT]);
        assert!(normalize(&pose).is_none());
    }

    #[test]
    fn test_occluded_hips_are_unavailable() {
        let mut pose = sample_pose();
        pose.keypoints[KeypointIndex::LeftHip as usize] = Keypoint::new(0.45, 3.0, 0.0, 0.05);
        pose.keypoints[KeypointIndex::RightHip as usize] = Keypoint::new(0.55, 3.0, 0.0, 0.05);
        assert!(normalize(&pose).is_none());

        let mut normalizer = Normalizer::new();
        let good = normalizer.normalize(&sample_pose()).unwrap();
        assert_eq!(normalizer.normalize(&pose), Some(good));
    }

    #[test]
    fn test_anchor_at_threshold_is_visible() {
        let mut pose = sample_pose();
        pose.keypoints[KeypointIndex::RightShoulder as usize].visibility = ANCHOR_MIN_VISIBILITY;
        assert!(normalize(&pose).is_some());
        pose.keypoints[KeypointIndex::RightShoulder as usize].visibility = 0.49;
        assert!(normalize(&pose).is_none());
    }

    #[test]
    fn test_normalizer_falls_back_to_last_valid() {
        let mut normalizer = Normalizer::new();
        let collapsed = Pose::new([Keypoint::new(0.5, 0.5, 0.0, 0.9); KeypointIndex::COUNT]);
        assert!(normalizer.normalize(&collapsed).is_none());

        let good = normalizer.normalize(&sample_pose()).unwrap();
        let fallback = normalizer.normalize(&collapsed).unwrap();
        assert_eq!(good, fallback);

        normalizer.reset();
        assert!(normalizer.normalize(&collapsed).is_none());
    }
}
