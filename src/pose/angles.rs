//! Joint-pair angles tracked per arm.

use serde::{Deserialize, Serialize};

use super::landmark::JointId;
use super::normalize::{NormPoint, NormalizedFrame};

/// Guard against zero-length segments in the interior-angle cosine.
const NORM_EPSILON: f32 = 1e-6;

/// The tracked joint-pair angles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(usize)]
#[serde(rename_all = "snake_case")]
pub enum AngleId {
    /// Interior angle at the elbow (shoulder-elbow-wrist), 0-180 degrees.
    LeftElbowAngle = 0,
    /// Upper arm relative to vertical, signed degrees.
    LeftShoulderAngle = 1,
    /// Interior angle at the wrist (elbow-wrist-index tip), 0-180 degrees.
    LeftWristAngle = 2,
    RightElbowAngle = 3,
    RightShoulderAngle = 4,
    RightWristAngle = 5,
}

impl AngleId {
    pub const COUNT: usize = 6;

    pub const ALL: [AngleId; AngleId::COUNT] = [
        AngleId::LeftElbowAngle,
        AngleId::LeftShoulderAngle,
        AngleId::LeftWristAngle,
        AngleId::RightElbowAngle,
        AngleId::RightShoulderAngle,
        AngleId::RightWristAngle,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::LeftElbowAngle => "left_elbow_angle",
            Self::LeftShoulderAngle => "left_shoulder_angle",
            Self::LeftWristAngle => "left_wrist_angle",
            Self::RightElbowAngle => "right_elbow_angle",
            Self::RightShoulderAngle => "right_shoulder_angle",
            Self::RightWristAngle => "right_wrist_angle",
        }
    }

    pub fn short_name(self) -> &'static str {
        match self {
            Self::LeftElbowAngle | Self::RightElbowAngle => "elbow angle",
            Self::LeftShoulderAngle | Self::RightShoulderAngle => "shoulder angle",
            Self::LeftWristAngle | Self::RightWristAngle => "wrist angle",
        }
    }

    pub fn is_shoulder(self) -> bool {
        matches!(self, Self::LeftShoulderAngle | Self::RightShoulderAngle)
    }

    /// The joints this angle is computed from, in order. Interior angles use
    /// all three; shoulder angles use the first two (segment vs vertical).
    fn joints(self) -> (JointId, JointId, Option<JointId>) {
        match self {
            Self::LeftElbowAngle => {
                (JointId::LeftShoulder, JointId::LeftElbow, Some(JointId::LeftWrist))
            }
            Self::LeftShoulderAngle => (JointId::LeftShoulder, JointId::LeftElbow, None),
            Self::LeftWristAngle => {
                (JointId::LeftElbow, JointId::LeftWrist, Some(JointId::LeftIndexTip))
            }
            Self::RightElbowAngle => {
                (JointId::RightShoulder, JointId::RightElbow, Some(JointId::RightWrist))
            }
            Self::RightShoulderAngle => (JointId::RightShoulder, JointId::RightElbow, None),
            Self::RightWristAngle => {
                (JointId::RightElbow, JointId::RightWrist, Some(JointId::RightIndexTip))
            }
        }
    }
}

/// Interior angle at `b` formed by a-b-c, in degrees (0-180).
pub fn interior_angle(a: &NormPoint, b: &NormPoint, c: &NormPoint) -> f32 {
    let v1 = (a.x - b.x, a.y - b.y);
    let v2 = (c.x - b.x, c.y - b.y);
    let n1 = (v1.0 * v1.0 + v1.1 * v1.1).sqrt();
    let n2 = (v2.0 * v2.0 + v2.1 * v2.1).sqrt();
    let cos = ((v1.0 * v2.0 + v1.1 * v2.1) / (n1 * n2 + NORM_EPSILON)).clamp(-1.0, 1.0);
    cos.acos().to_degrees()
}

/// Signed angle of the segment a->b relative to vertical, in degrees
/// (-180, 180]. Positive y is down in image coordinates.
pub fn angle_from_vertical(a: &NormPoint, b: &NormPoint) -> f32 {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    dx.atan2(dy).to_degrees()
}

/// Every tracked angle computable from the joints present in `frame`.
/// Angles whose joints are missing stay `None`.
pub fn frame_angles(frame: &NormalizedFrame) -> [Option<f32>; AngleId::COUNT] {
    let mut out = [None; AngleId::COUNT];
    for id in AngleId::ALL {
        let (ja, jb, jc) = id.joints();
        let value = match (frame.get(ja), frame.get(jb), jc) {
            (Some(a), Some(b), None) => Some(angle_from_vertical(a, b)),
            (Some(a), Some(b), Some(jc)) => {
                frame.get(jc).map(|c| interior_angle(a, b, c))
            }
            _ => None,
        };
        out[id as usize] = value;
    }
    out
}
