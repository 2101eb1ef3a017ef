use serde::{Deserialize, Serialize};

/// Landmarks with visibility below this are treated as absent, never as
/// zero-confidence data.
pub const VISIBILITY_THRESHOLD: f32 = 0.5;

/// Which arm a joint belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arm {
    Left,
    Right,
}

impl Arm {
    pub fn name(self) -> &'static str {
        match self {
            Arm::Left => "left_arm",
            Arm::Right => "right_arm",
        }
    }
}

/// The tracked joint set: shoulders, elbows, wrists per side plus the index
/// fingertip for forearm-to-hand continuity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(usize)]
#[serde(rename_all = "snake_case")]
pub enum JointId {
    LeftShoulder = 0,
    LeftElbow = 1,
    LeftWrist = 2,
    LeftIndexTip = 3,
    RightShoulder = 4,
    RightElbow = 5,
    RightWrist = 6,
    RightIndexTip = 7,
}

impl JointId {
    pub const COUNT: usize = 8;

    pub const ALL: [JointId; JointId::COUNT] = [
        JointId::LeftShoulder,
        JointId::LeftElbow,
        JointId::LeftWrist,
        JointId::LeftIndexTip,
        JointId::RightShoulder,
        JointId::RightElbow,
        JointId::RightWrist,
        JointId::RightIndexTip,
    ];

    pub fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(Self::LeftShoulder),
            1 => Some(Self::LeftElbow),
            2 => Some(Self::LeftWrist),
            3 => Some(Self::LeftIndexTip),
            4 => Some(Self::RightShoulder),
            5 => Some(Self::RightElbow),
            6 => Some(Self::RightWrist),
            7 => Some(Self::RightIndexTip),
            _ => None,
        }
    }

    pub fn arm(self) -> Arm {
        match self {
            Self::LeftShoulder | Self::LeftElbow | Self::LeftWrist | Self::LeftIndexTip => {
                Arm::Left
            }
            _ => Arm::Right,
        }
    }

    /// Full wire name, e.g. `left_shoulder`.
    pub fn name(self) -> &'static str {
        match self {
            Self::LeftShoulder => "left_shoulder",
            Self::LeftElbow => "left_elbow",
            Self::LeftWrist => "left_wrist",
            Self::LeftIndexTip => "left_index_tip",
            Self::RightShoulder => "right_shoulder",
            Self::RightElbow => "right_elbow",
            Self::RightWrist => "right_wrist",
            Self::RightIndexTip => "right_index_tip",
        }
    }

    /// Joint name without the side prefix, e.g. `shoulder`.
    pub fn short_name(self) -> &'static str {
        match self {
            Self::LeftShoulder | Self::RightShoulder => "shoulder",
            Self::LeftElbow | Self::RightElbow => "elbow",
            Self::LeftWrist | Self::RightWrist => "wrist",
            Self::LeftIndexTip | Self::RightIndexTip => "index_tip",
        }
    }
}

/// A single detected joint in source image pixel space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    /// Confidence score in [0, 1].
    pub visibility: f32,
}

impl Landmark {
    pub fn new(x: f32, y: f32, visibility: f32) -> Self {
        Self { x, y, visibility }
    }

    pub fn is_visible(&self) -> bool {
        self.visibility >= VISIBILITY_THRESHOLD
    }
}

/// Output contract of the external pose estimator for one frame: per-joint
/// pixel position + visibility, absent entry if not found in that frame.
#[derive(Debug, Clone)]
pub struct Detection {
    pub width: u32,
    pub height: u32,
    landmarks: [Option<Landmark>; JointId::COUNT],
}

impl Detection {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            landmarks: [None; JointId::COUNT],
        }
    }

    pub fn set(&mut self, joint: JointId, landmark: Landmark) {
        self.landmarks[joint as usize] = Some(landmark);
    }

    pub fn get(&self, joint: JointId) -> Option<&Landmark> {
        self.landmarks[joint as usize].as_ref()
    }

    /// Landmark for `joint` if present and above the visibility threshold.
    pub fn visible(&self, joint: JointId) -> Option<&Landmark> {
        self.get(joint).filter(|l| l.is_visible())
    }

    pub fn visible_count(&self) -> usize {
        JointId::ALL.iter().filter(|j| self.visible(**j).is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.visible_count() == 0
    }
}
