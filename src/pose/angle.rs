//! Joint angles from three keypoints.

use super::keypoint::{Keypoint, KeypointIndex, Pose};

/// Angle at `b` formed by `a-b-c`, in degrees within [0, 180].
///
/// Returns `None` when any of the three points is below `min_visibility`:
/// an occluded joint is "no signal", never a zero angle.
pub fn joint_angle(a: &Keypoint, b: &Keypoint, c: &Keypoint, min_visibility: f32) -> Option<f32> {
    if !a.is_visible(min_visibility) || !b.is_visible(min_visibility) || !c.is_visible(min_visibility) {
        return None;
    }
    let radians = f32::atan2(c.y - b.y, c.x - b.x) - f32::atan2(a.y - b.y, a.x - b.x);
    let mut angle = radians.to_degrees().abs();
    if angle > 180.0 {
        angle = 360.0 - angle;
    }
    Some(angle)
}

/// Convenience wrapper taking a pose and three indices
pub fn pose_angle(
    pose: &Pose,
    a: KeypointIndex,
    b: KeypointIndex,
    c: KeypointIndex,
    min_visibility: f32,
) -> Option<f32> {
    joint_angle(pose.get(a), pose.get(b), pose.get(c), min_visibility)
}
