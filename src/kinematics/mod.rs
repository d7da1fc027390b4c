pub mod one_euro;
pub mod signature;
pub mod skeleton;

pub use one_euro::{FilterBank, FilterParams, OneEuroFilter};
pub use signature::{match_signature, PoseSignature, Segment};
pub use skeleton::{normalize, NormalizedSkeleton, Normalizer};
