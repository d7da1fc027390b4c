//! Reference pose signatures and cosine-similarity matching.

use nalgebra::Vector2;

use super::skeleton::NormalizedSkeleton;

/// Vectors shorter than this carry no direction
const MIN_SEGMENT_LENGTH: f32 = 1e-6;

/// Endpoints below this visibility exclude their segment
pub const SEGMENT_MIN_VISIBILITY: f32 = 0.5;

/// One weighted body segment (from -> to) of a signature
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    pub from: usize,
    pub to: usize,
    pub weight: f32,
}

const fn seg(from: usize, to: usize, weight: f32) -> Segment {
    Segment { from, to, weight }
}

/// Named reference shape: segments and their target directions, pairwise
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoseSignature {
    pub name: &'static str,
    pub segments: &'static [Segment],
    pub targets: &'static [[f32; 2]],
}

pub const SQUAT_BOTTOM: PoseSignature = PoseSignature {
    name: "squat-bottom",
    segments: &[
        seg(24, 26, 1.0), // thigh
        seg(26, 28, 0.8), // shin
        seg(12, 24, 0.5), // back
    ],
    targets: &[[0.8, 0.6], [0.2, 0.98], [0.1, -0.99]],
};

pub const PUSHUP_BOTTOM: PoseSignature = PoseSignature {
    name: "pushup-bottom",
    segments: &[
        seg(12, 14, 1.0), // upper arm
        seg(14, 16, 0.8), // forearm
        seg(12, 24, 0.7), // trunk
    ],
    targets: &[[0.9, 0.4], [0.1, 0.98], [0.95, -0.1]],
};

pub const PLANK: PoseSignature = PoseSignature {
    name: "plank",
    segments: &[
        seg(11, 23, 1.0), // torso
        seg(23, 27, 1.0), // left leg
        seg(24, 28, 1.0), // right leg
    ],
    targets: &[[1.0, 0.0], [1.0, 0.0], [1.0, 0.0]],
};

pub const JUMPING_JACK_SPREAD: PoseSignature = PoseSignature {
    name: "jumping-jack-spread",
    segments: &[
        seg(11, 15, 1.0),
        seg(12, 16, 1.0),
        seg(23, 27, 0.8),
        seg(24, 28, 0.8),
    ],
    targets: &[[0.5, -0.8], [-0.5, -0.8], [0.5, 0.8], [-0.5, 0.8]],
};

/// Cosine similarity, or `None` if either vector has no direction
fn cosine_similarity(a: &Vector2<f32>, b: &Vector2<f32>) -> Option<f32> {
    let (na, nb) = (a.norm(), b.norm());
    if !(na > MIN_SEGMENT_LENGTH && nb > MIN_SEGMENT_LENGTH) {
        return None;
    }
    Some((a.dot(b) / (na * nb)).clamp(-1.0, 1.0))
}

/// Score a skeleton against a signature, in [0, 1].
///
/// Each segment's cosine similarity is remapped from [-1, 1] to [0, 1] and
/// averaged by weight. Degenerate or occluded segments drop out of both sums;
/// with nothing left the score is 0.
pub fn match_signature(skeleton: &NormalizedSkeleton, signature: &PoseSignature) -> f32 {
    let mut total_score = 0.0;
    let mut total_weight = 0.0;

    for (segment, target) in signature.segments.iter().zip(signature.targets.iter()) {
        let (from, to) = match (skeleton.keypoints.get(segment.from), skeleton.keypoints.get(segment.to)) {
            (Some(f), Some(t)) => (f, t),
            _ => continue,
        };
        if from.visibility < SEGMENT_MIN_VISIBILITY || to.visibility < SEGMENT_MIN_VISIBILITY {
            continue;
        }

        let current = skeleton.point(segment.to) - skeleton.point(segment.from);
        let target = Vector2::new(target[0], target[1]);
        let Some(similarity) = cosine_similarity(&current, &target) else {
            continue;
        };

        total_score += (similarity + 1.0) / 2.0 * segment.weight;
        total_weight += segment.weight;
    }

    if total_weight > 0.0 {
        (total_score / total_weight).clamp(0.0, 1.0)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose::{Keypoint, KeypointIndex};

    fn skeleton_with(points: &[(usize, f32, f32)]) -> NormalizedSkeleton {
        let mut keypoints = [Keypoint::new(0.0, 0.0, 0.0, 0.9); KeypointIndex::COUNT];
        for &(i, x, y) in points {
            keypoints[i] = Keypoint::new(x, y, 0.0, 0.9);
        }
        NormalizedSkeleton { keypoints }
    }

    const ALL_SIGNATURES: [&PoseSignature; 4] = [&SQUAT_BOTTOM, &PUSHUP_BOTTOM, &PLANK, &JUMPING_JACK_SPREAD];

    #[test]
    fn test_segments_pair_with_targets() {
        for s in ALL_SIGNATURES {
            assert_eq!(s.segments.len(), s.targets.len(), "{}", s.name);
        }
    }

    #[test]
    fn test_perfect_plank_scores_one() {
        let sk = skeleton_with(&[(11, -1.0, 0.0), (23, 0.0, 0.0), (24, 0.0, 0.05), (27, 1.0, 0.0), (28, 1.0, 0.05)]);
        let score = match_signature(&sk, &PLANK);
        assert!((score - 1.0).abs() < 1e-5, "score={}", score);
    }

    #[test]
    fn test_opposite_direction_scores_zero() {
        let sk = skeleton_with(&[(11, 1.0, 0.0), (23, 0.0, 0.0), (24, 0.0, 0.05), (27, -1.0, 0.0), (28, -1.0, 0.05)]);
        let score = match_signature(&sk, &PLANK);
        assert!(score.abs() < 1e-5, "score={}", score);
    }

    #[test]
    fn test_all_degenerate_is_zero() {
        // every keypoint at the origin: no segment has a direction
        let sk = skeleton_with(&[]);
        for s in ALL_SIGNATURES {
            assert_eq!(match_signature(&sk, s), 0.0);
        }
    }

    #[test]
    fn test_degenerate_segment_excluded() {
        // torso perfect, both legs collapsed onto the hips
        let sk = skeleton_with(&[(11, -1.0, 0.0), (23, 0.0, 0.0), (24, 0.2, 0.0), (27, 0.0, 0.0), (28, 0.2, 0.0)]);
        let score = match_signature(&sk, &PLANK);
        assert!((score - 1.0).abs() < 1e-5, "score={}", score);
    }

    #[test]
    fn test_occluded_segment_excluded() {
        let mut sk = skeleton_with(&[(11, -1.0, 0.0), (23, 0.0, 0.0), (24, 0.0, 0.0), (27, 1.0, 0.0), (28, -1.0, 0.0)]);
        let with_bad_leg = match_signature(&sk, &PLANK);
        sk.keypoints[28].visibility = 0.2;
        let without = match_signature(&sk, &PLANK);
        assert!(with_bad_leg < 0.7);
        assert!((without - 1.0).abs() < 1e-5, "score={}", without);
    }

    #[test]
    fn test_score_always_in_unit_range() {
        for k in 0..50 {
            let t = k as f32 * 0.37;
            let pts: Vec<(usize, f32, f32)> = (0..KeypointIndex::COUNT)
                .map(|i| (i, (t + i as f32).sin() * 2.0, (t * 1.3 + i as f32).cos() * 2.0))
                .collect();
            let sk = skeleton_with(&pts);
            for s in ALL_SIGNATURES {
                let score = match_signature(&sk, s);
                assert!((0.0..=1.0).contains(&score), "{} -> {}", s.name, score);
            }
        }
    }

    #[test]
    fn test_weights_bias_score() {
        // thigh (weight 1.0) perfect, back (0.5) reversed, shin perfect
        let sk = skeleton_with(&[(24, 0.0, 0.0), (26, 0.8, 0.6), (28, 1.0, 1.58), (12, 0.1, -0.99)]);
        let score = match_signature(&sk, &SQUAT_BOTTOM);
        let expected = (1.0 * 1.0 + 0.8 * 1.0 + 0.5 * 0.0) / 2.3;
        assert!((score - expected).abs() < 1e-3, "score={} expected={}", score, expected);
    }
}
