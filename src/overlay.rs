//! Comparison overlay: baseline skeleton and current detection drawn onto a
//! frame so a player can see the reference posture and their own at once.
//!
//! The baseline lives in normalized space; it is denormalized through the
//! frame's own anchor so the ghost skeleton tracks the player's position and
//! distance from the camera.

use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_hollow_circle_mut, draw_line_segment_mut};

use crate::baseline::BaselinePosture;
use crate::pose::{Anchor, Detection, JointId, NormPoint};
use crate::scoring::{AccuracyLevel, ComparisonResult};

const BASELINE_COLOR: Rgb<u8> = Rgb([0, 255, 255]);
const ACCURATE_COLOR: Rgb<u8> = Rgb([0, 200, 0]);
const INACCURATE_COLOR: Rgb<u8> = Rgb([220, 40, 40]);

const JOINT_RADIUS: i32 = 6;
const BASELINE_RADIUS: i32 = 8;
const DASH_LEN: f32 = 8.0;

/// Arm chains drawn as connected segments.
const CHAINS: [[JointId; 4]; 2] = [
    [
        JointId::LeftShoulder,
        JointId::LeftElbow,
        JointId::LeftWrist,
        JointId::LeftIndexTip,
    ],
    [
        JointId::RightShoulder,
        JointId::RightElbow,
        JointId::RightWrist,
        JointId::RightIndexTip,
    ],
];

/// Skeleton color for the overall accuracy bucket.
fn level_color(level: Option<AccuracyLevel>) -> Rgb<u8> {
    match level {
        Some(AccuracyLevel::Excellent) | Some(AccuracyLevel::Good) => ACCURATE_COLOR,
        Some(AccuracyLevel::Fair) => Rgb([255, 165, 0]),
        Some(AccuracyLevel::Poor) => INACCURATE_COLOR,
        None => Rgb([160, 160, 160]),
    }
}

/// Dashed segment, used for the baseline ghost so it reads as "reference"
/// rather than detection.
fn draw_dashed_segment(image: &mut RgbImage, start: (f32, f32), end: (f32, f32), color: Rgb<u8>) {
    let dx = end.0 - start.0;
    let dy = end.1 - start.1;
    let len = (dx * dx + dy * dy).sqrt();
    if len < 1.0 {
        return;
    }
    let steps = (len / DASH_LEN).ceil() as u32;
    for i in 0..steps {
        // Draw every other dash.
        if i % 2 == 1 {
            continue;
        }
        let t0 = i as f32 * DASH_LEN / len;
        let t1 = ((i + 1) as f32 * DASH_LEN / len).min(1.0);
        draw_line_segment_mut(
            image,
            (start.0 + dx * t0, start.1 + dy * t0),
            (start.0 + dx * t1, start.1 + dy * t1),
            color,
        );
    }
}

fn baseline_pixel(baseline: &BaselinePosture, anchor: &Anchor, joint: JointId) -> Option<(f32, f32)> {
    baseline
        .joint(joint)
        .map(|stat| anchor.to_pixel(&NormPoint::new(stat.x, stat.y)))
}

/// Draw the comparison overlay in place: the baseline as a dashed cyan ghost
/// anchored to the player's current stance, the detected skeleton colored by
/// the overall accuracy bucket, and per-joint dots green or red by their
/// individual checks.
pub fn draw_comparison(
    image: &mut RgbImage,
    det: &Detection,
    baseline: &BaselinePosture,
    result: &ComparisonResult,
) {
    let anchor = Anchor::from_detection(det);

    // Baseline ghost first so the live skeleton draws over it.
    for chain in &CHAINS {
        for pair in chain.windows(2) {
            if let (Some(a), Some(b)) = (
                baseline_pixel(baseline, &anchor, pair[0]),
                baseline_pixel(baseline, &anchor, pair[1]),
            ) {
                draw_dashed_segment(image, a, b, BASELINE_COLOR);
            }
        }
        for joint in chain {
            if let Some((x, y)) = baseline_pixel(baseline, &anchor, *joint) {
                draw_hollow_circle_mut(
                    image,
                    (x.round() as i32, y.round() as i32),
                    BASELINE_RADIUS,
                    BASELINE_COLOR,
                );
            }
        }
    }

    let skeleton_color = level_color(result.level);
    for chain in &CHAINS {
        for pair in chain.windows(2) {
            if let (Some(a), Some(b)) = (det.visible(pair[0]), det.visible(pair[1])) {
                draw_line_segment_mut(image, (a.x, a.y), (b.x, b.y), skeleton_color);
            }
        }
    }

    for joint in JointId::ALL {
        let Some(lm) = det.visible(joint) else {
            continue;
        };
        let accurate = result
            .joints
            .iter()
            .find(|c| c.joint == joint)
            .map(|c| c.accurate);
        let color = match accurate {
            Some(true) => ACCURATE_COLOR,
            Some(false) => INACCURATE_COLOR,
            // Present in the frame but not evaluated (no baseline entry).
            None => skeleton_color,
        };
        draw_filled_circle_mut(
            image,
            (lm.x.round() as i32, lm.y.round() as i32),
            JOINT_RADIUS,
            color,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::baseline::{collect_baseline, AggregateMethod};
    use crate::pose::{normalize, Landmark};
    use crate::scoring::{compare, ScoringConfig};

    fn detection() -> Detection {
        let mut det = Detection::new(640, 480);
        det.set(JointId::LeftShoulder, Landmark::new(380.0, 200.0, 0.9));
        det.set(JointId::RightShoulder, Landmark::new(260.0, 200.0, 0.9));
        det.set(JointId::LeftElbow, Landmark::new(400.0, 290.0, 0.9));
        det.set(JointId::LeftWrist, Landmark::new(470.0, 300.0, 0.9));
        det
    }

    #[test]
    fn test_overlay_marks_pixels() {
        let det = detection();
        let frame = normalize(&det);
        let baseline = collect_baseline(&[frame.clone()], AggregateMethod::Median).unwrap();
        let result = compare(&frame, &baseline, &ScoringConfig::default());

        let mut image = RgbImage::new(640, 480);
        draw_comparison(&mut image, &det, &baseline, &result);
        let touched = image.pixels().filter(|p| p.0 != [0, 0, 0]).count();
        assert!(touched > 0);

        // An exact match draws the wrist dot green.
        let wrist = det.visible(JointId::LeftWrist).unwrap();
        assert_eq!(
            *image.get_pixel(wrist.x as u32, wrist.y as u32),
            ACCURATE_COLOR
        );
    }

    #[test]
    fn test_inaccurate_joint_drawn_red() {
        let det = detection();
        let frame = normalize(&det);
        let baseline = collect_baseline(&[frame], AggregateMethod::Median).unwrap();

        let mut off = detection();
        off.set(JointId::LeftWrist, Landmark::new(560.0, 420.0, 0.9));
        let result = compare(&normalize(&off), &baseline, &ScoringConfig::default());

        let mut image = RgbImage::new(640, 480);
        draw_comparison(&mut image, &off, &baseline, &result);
        let wrist = off.visible(JointId::LeftWrist).unwrap();
        assert_eq!(
            *image.get_pixel(wrist.x as u32, wrist.y as u32),
            INACCURATE_COLOR
        );
    }

    #[test]
    fn test_overlay_handles_empty_detection() {
        let det = detection();
        let frame = normalize(&det);
        let baseline = collect_baseline(&[frame.clone()], AggregateMethod::Median).unwrap();
        let result = compare(&frame, &baseline, &ScoringConfig::default());

        // No visible joints: only the image-anchored baseline ghost draws.
        let empty = Detection::new(640, 480);
        let mut image = RgbImage::new(640, 480);
        draw_comparison(&mut image, &empty, &baseline, &result);
        assert!(image.pixels().all(|p| p.0 == [0, 0, 0] || *p == BASELINE_COLOR));
    }
}
