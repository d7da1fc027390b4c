pub mod config;
pub mod diagnosis;
pub mod error;
pub mod escalation;
pub mod exercise;
pub mod kinematics;
pub mod pose;
pub mod protocol;
pub mod session;
