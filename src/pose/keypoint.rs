use serde::{Deserialize, Serialize};

/// BlazePose 33-keypoint topology
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum KeypointIndex {
    Nose = 0,
    LeftEyeInner = 1,
    LeftEye = 2,
    LeftEyeOuter = 3,
    RightEyeInner = 4,
    RightEye = 5,
    RightEyeOuter = 6,
    LeftEar = 7,
    RightEar = 8,
    MouthLeft = 9,
    MouthRight = 10,
    LeftShoulder = 11,
    RightShoulder = 12,
    LeftElbow = 13,
    RightElbow = 14,
    LeftWrist = 15,
    RightWrist = 16,
    LeftPinky = 17,
    RightPinky = 18,
    LeftIndex = 19,
    RightIndex = 20,
    LeftThumb = 21,
    RightThumb = 22,
    LeftHip = 23,
    RightHip = 24,
    LeftKnee = 25,
    RightKnee = 26,
    LeftAnkle = 27,
    RightAnkle = 28,
    LeftHeel = 29,
    RightHeel = 30,
    LeftFootIndex = 31,
    RightFootIndex = 32,
}

impl KeypointIndex {
    pub const COUNT: usize = 33;
}

/// Single detected keypoint
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Keypoint {
    /// Normalized image X (0.0..1.0)
    pub x: f32,
    /// Normalized image Y (0.0..1.0, downwards)
    pub y: f32,
    /// Depth relative to the hips, same scale as x
    pub z: f32,
    /// Detection confidence (0.0..1.0)
    pub visibility: f32,
}

impl Keypoint {
    pub fn new(x: f32, y: f32, z: f32, visibility: f32) -> Self {
        Self { x, y, z, visibility }
    }

    /// Whether visibility reaches the threshold
    pub fn is_visible(&self, threshold: f32) -> bool {
        self.visibility >= threshold
    }
}

impl Default for Keypoint {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            z: 0.0,
            visibility: 0.0,
        }
    }
}

/// One frame of 33 keypoints
#[derive(Debug, Clone, PartialEq)]
pub struct Pose {
    pub keypoints: [Keypoint; KeypointIndex::COUNT],
}

impl Pose {
    pub fn new(keypoints: [Keypoint; KeypointIndex::COUNT]) -> Self {
        Self { keypoints }
    }

    /// Build from a detector output slice. Anything other than 33 points is rejected.
    pub fn from_slice(keypoints: &[Keypoint]) -> Option<Self> {
        let keypoints: [Keypoint; KeypointIndex::COUNT] = keypoints.try_into().ok()?;
        Some(Self { keypoints })
    }

    pub fn get(&self, index: KeypointIndex) -> &Keypoint {
        &self.keypoints[index as usize]
    }

    /// True when every listed keypoint reaches the visibility threshold
    pub fn all_visible(&self, indices: &[KeypointIndex], threshold: f32) -> bool {
        indices.iter().all(|&i| self.get(i).is_visible(threshold))
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self {
            keypoints: [Keypoint::default(); KeypointIndex::COUNT],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keypoint_index_count() {
        assert_eq!(KeypointIndex::COUNT, 33);
        assert_eq!(KeypointIndex::RightFootIndex as usize, 32);
    }

    #[test]
    fn test_keypoint_is_visible() {
        let kp = Keypoint::new(0.5, 0.5, 0.0, 0.5);
        assert!(kp.is_visible(0.5));
        assert!(!kp.is_visible(0.6));
    }

    #[test]
    fn test_pose_from_slice_length() {
        let points = vec![Keypoint::default(); 33];
        assert!(Pose::from_slice(&points).is_some());
        assert!(Pose::from_slice(&points[..17]).is_none());
        let too_many = vec![Keypoint::default(); 34];
        assert!(Pose::from_slice(&too_many).is_none());
    }

    #[test]
    fn test_pose_all_visible() {
        let mut keypoints = [Keypoint::new(0.0, 0.0, 0.0, 0.9); KeypointIndex::COUNT];
        keypoints[KeypointIndex::LeftKnee as usize].visibility = 0.3;
        let pose = Pose::new(keypoints);
        assert!(pose.all_visible(&[KeypointIndex::RightHip, KeypointIndex::RightKnee], 0.5));
        assert!(!pose.all_visible(&[KeypointIndex::LeftKnee], 0.5));
    }
}
