//! Landmark normalization: raw pixel coordinates into a position- and
//! scale-invariant unit-square representation.

use serde::{Deserialize, Serialize};

use super::landmark::{Detection, JointId};

/// Where the shoulder midpoint lands in the reference square.
const ANCHOR_X: f32 = 0.5;
const ANCHOR_Y: f32 = 0.45;
/// One shoulder width spans this fraction of the reference square. Chosen so
/// a fully extended arm stays inside [0, 1] in either direction.
const BODY_SCALE: f32 = 0.2;

/// A normalized joint position inside the unit square.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormPoint {
    pub x: f32,
    pub y: f32,
}

impl NormPoint {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &NormPoint) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}

/// One frame's joints in the bounded reference space. Joints absent in the
/// source stay absent, never zero-filled.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedFrame {
    joints: [Option<NormPoint>; JointId::COUNT],
}

impl NormalizedFrame {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, joint: JointId, point: NormPoint) {
        self.joints[joint as usize] = Some(point);
    }

    pub fn get(&self, joint: JointId) -> Option<&NormPoint> {
        self.joints[joint as usize].as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.joints.iter().all(|j| j.is_none())
    }

    pub fn joint_count(&self) -> usize {
        self.joints.iter().filter(|j| j.is_some()).count()
    }

    pub fn iter(&self) -> impl Iterator<Item = (JointId, &NormPoint)> {
        JointId::ALL
            .iter()
            .filter_map(move |j| self.get(*j).map(|p| (*j, p)))
    }
}

/// Mapping between source pixel space and the reference square for one frame.
///
/// When both shoulders are visible the anchor is the shoulder midpoint and
/// the unit is the shoulder width, making the result invariant to the
/// subject's distance from the camera and to framing offsets. Without the
/// shoulder pair the mapping falls back to plain image-relative coordinates.
#[derive(Debug, Clone, Copy)]
pub enum Anchor {
    Shoulders { mid_x: f32, mid_y: f32, width: f32 },
    Image { width: f32, height: f32 },
}

impl Anchor {
    pub fn from_detection(det: &Detection) -> Anchor {
        let left = det.visible(JointId::LeftShoulder);
        let right = det.visible(JointId::RightShoulder);
        match (left, right) {
            (Some(l), Some(r)) => {
                let dx = l.x - r.x;
                let dy = l.y - r.y;
                let width = (dx * dx + dy * dy).sqrt();
                // Degenerate shoulder width: the detection is unusable as an
                // anchor, fall back to image coordinates.
                if width > 1.0 {
                    return Anchor::Shoulders {
                        mid_x: (l.x + r.x) / 2.0,
                        mid_y: (l.y + r.y) / 2.0,
                        width,
                    };
                }
                Anchor::Image {
                    width: det.width as f32,
                    height: det.height as f32,
                }
            }
            _ => Anchor::Image {
                width: det.width as f32,
                height: det.height as f32,
            },
        }
    }

    /// Pixel position into the reference square, clamped to [0, 1].
    pub fn to_norm(&self, px: f32, py: f32) -> NormPoint {
        let (x, y) = match *self {
            Anchor::Shoulders { mid_x, mid_y, width } => (
                ANCHOR_X + (px - mid_x) / width * BODY_SCALE,
                ANCHOR_Y + (py - mid_y) / width * BODY_SCALE,
            ),
            Anchor::Image { width, height } => (px / width, py / height),
        };
        NormPoint::new(x.clamp(0.0, 1.0), y.clamp(0.0, 1.0))
    }

    /// Inverse mapping, used when drawing a baseline onto a live frame.
    pub fn to_pixel(&self, p: &NormPoint) -> (f32, f32) {
        match *self {
            Anchor::Shoulders { mid_x, mid_y, width } => (
                mid_x + (p.x - ANCHOR_X) / BODY_SCALE * width,
                mid_y + (p.y - ANCHOR_Y) / BODY_SCALE * width,
            ),
            Anchor::Image { width, height } => (p.x * width, p.y * height),
        }
    }
}

/// Normalize one detection. Joints below the visibility threshold are
/// dropped. Never errors: an empty result is a valid, distinct outcome
/// signaling "no usable pose this frame".
pub fn normalize(det: &Detection) -> NormalizedFrame {
    let anchor = Anchor::from_detection(det);
    let mut frame = NormalizedFrame::new();
    for joint in JointId::ALL {
        if let Some(lm) = det.visible(joint) {
            frame.set(joint, anchor.to_norm(lm.x, lm.y));
        }
    }
    frame
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose::landmark::Landmark;

    fn arm_detection(scale: f32, off_x: f32, off_y: f32) -> Detection {
        // A simple right-angle left arm, scaled and offset in pixel space.
        let mut det = Detection::new(1920, 1080);
        let joints = [
            (JointId::LeftShoulder, 400.0, 300.0),
            (JointId::RightShoulder, 200.0, 300.0),
            (JointId::LeftElbow, 450.0, 450.0),
            (JointId::LeftWrist, 600.0, 450.0),
        ];
        for (id, x, y) in joints {
            det.set(id, Landmark::new(x * scale + off_x, y * scale + off_y, 0.95));
        }
        det
    }

    fn approx_eq(a: f32, b: f32, eps: f32) -> bool {
        (a - b).abs() < eps
    }

    #[test]
    fn test_scale_and_translation_invariance() {
        let near = normalize(&arm_detection(1.0, 0.0, 0.0));
        let far = normalize(&arm_detection(0.5, 123.0, 57.0));

        for joint in JointId::ALL {
            match (near.get(joint), far.get(joint)) {
                (Some(a), Some(b)) => {
                    assert!(approx_eq(a.x, b.x, 1e-5), "{:?} x: {} vs {}", joint, a.x, b.x);
                    assert!(approx_eq(a.y, b.y, 1e-5), "{:?} y: {} vs {}", joint, a.y, b.y);
                }
                (None, None) => {}
                other => panic!("presence mismatch for {:?}: {:?}", joint, other),
            }
        }
    }

    #[test]
    fn test_shoulder_midpoint_maps_to_anchor() {
        let frame = normalize(&arm_detection(1.0, 0.0, 0.0));
        let l = frame.get(JointId::LeftShoulder).unwrap();
        let r = frame.get(JointId::RightShoulder).unwrap();
        assert!(approx_eq((l.x + r.x) / 2.0, 0.5, 1e-5));
        assert!(approx_eq((l.y + r.y) / 2.0, 0.45, 1e-5));
        // Shoulder width spans BODY_SCALE of the square.
        assert!(approx_eq(l.distance(r), 0.2, 1e-5));
    }

    #[test]
    fn test_low_visibility_joints_dropped() {
        let mut det = arm_detection(1.0, 0.0, 0.0);
        det.set(JointId::LeftWrist, Landmark::new(600.0, 450.0, 0.2));
        let frame = normalize(&det);
        assert!(frame.get(JointId::LeftWrist).is_none());
        assert!(frame.get(JointId::LeftElbow).is_some());
    }

    #[test]
    fn test_empty_detection_yields_empty_frame() {
        let frame = normalize(&Detection::new(640, 480));
        assert!(frame.is_empty());
        assert_eq!(frame.joint_count(), 0);
    }

    #[test]
    fn test_fallback_without_shoulder_pair() {
        let mut det = Detection::new(640, 480);
        det.set(JointId::LeftWrist, Landmark::new(320.0, 120.0, 0.9));
        let frame = normalize(&det);
        let p = frame.get(JointId::LeftWrist).unwrap();
        assert!(approx_eq(p.x, 0.5, 1e-5));
        assert!(approx_eq(p.y, 0.25, 1e-5));
    }

    #[test]
    fn test_output_stays_in_unit_square() {
        // Wrist far outside the body envelope still clamps into bounds.
        let mut det = arm_detection(1.0, 0.0, 0.0);
        det.set(JointId::LeftWrist, Landmark::new(5000.0, -3000.0, 0.9));
        let frame = normalize(&det);
        for (_, p) in frame.iter() {
            assert!((0.0..=1.0).contains(&p.x));
            assert!((0.0..=1.0).contains(&p.y));
        }
    }

    #[test]
    fn test_roundtrip_through_anchor() {
        let det = arm_detection(1.0, 0.0, 0.0);
        let anchor = Anchor::from_detection(&det);
        let n = anchor.to_norm(450.0, 450.0);
        let (px, py) = anchor.to_pixel(&n);
        assert!(approx_eq(px, 450.0, 1e-2));
        assert!(approx_eq(py, 450.0, 1e-2));
    }
}
