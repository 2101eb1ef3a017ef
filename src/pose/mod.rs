pub mod angles;
pub mod estimator;
pub mod landmark;
pub mod normalize;

pub use angles::{frame_angles, AngleId};
pub use estimator::PoseEstimator;
#[cfg(feature = "onnx")]
pub use estimator::MoveNetEstimator;
pub use landmark::{Arm, Detection, JointId, Landmark, VISIBILITY_THRESHOLD};
pub use normalize::{normalize, Anchor, NormPoint, NormalizedFrame};
