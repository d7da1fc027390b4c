pub mod angle;
pub mod keypoint;

pub use angle::{joint_angle, pose_angle};
pub use keypoint::{Keypoint, KeypointIndex, Pose};
