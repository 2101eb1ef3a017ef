//! Feedback generation: scorer output into structured, human-consumable
//! messages. Pure and deterministic; identical inputs yield identical output.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::scoring::{AngleCheck, ComparisonResult, JointCheck, ScoringConfig};

/// Deviation components below this don't contribute a direction word.
const DIRECTION_EPSILON: f32 = 0.02;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JointFeedback {
    pub joint: String,
    pub arm: String,
    pub deviation: f32,
    pub is_accurate: bool,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AngleFeedback {
    pub baseline: f32,
    pub current: f32,
    pub deviation: f32,
    pub is_accurate: bool,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Correction {
    pub joint: String,
    pub arm: String,
    pub message: String,
}

/// The full feedback payload for one scored frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feedback {
    pub score: Option<f32>,
    pub level: Option<String>,
    pub is_accurate: bool,
    pub needs_correction: bool,
    pub message: String,
    /// Keyed `{arm}_{joint}`, e.g. `left_arm_wrist`.
    pub joints: BTreeMap<String, JointFeedback>,
    /// Keyed by angle name, e.g. `left_elbow_angle`.
    pub angles: BTreeMap<String, AngleFeedback>,
    pub corrections: Vec<Correction>,
}

fn round2(v: f32) -> f32 {
    (v * 100.0).round() / 100.0
}

fn round4(v: f32) -> f32 {
    (v * 10_000.0).round() / 10_000.0
}

/// Human-readable direction from the signed deviation. Positive dx means the
/// joint sits right of the baseline in image space, which reads as "move
/// left" on a mirrored self-view.
fn direction(dx: f32, dy: f32) -> String {
    let mut parts = Vec::new();
    if dx.abs() > DIRECTION_EPSILON {
        parts.push(if dx > 0.0 { "left" } else { "right" });
    }
    if dy.abs() > DIRECTION_EPSILON {
        parts.push(if dy > 0.0 { "down" } else { "up" });
    }
    if parts.is_empty() {
        "slightly".to_string()
    } else {
        parts.join(" and ")
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

fn joint_message(check: &JointCheck) -> String {
    let name = check.joint.short_name().replace('_', " ");
    if check.accurate {
        format!("{} position is correct", capitalize(&name))
    } else {
        format!("Adjust {}: move {}", name, direction(check.dx, check.dy))
    }
}

fn angle_message(check: &AngleCheck) -> String {
    let name = check.angle.short_name();
    if check.accurate {
        format!("{} is correct", capitalize(name))
    } else {
        let adjustment = match (check.angle.is_shoulder(), check.current > check.baseline) {
            (true, true) => "lower",
            (true, false) => "raise",
            (false, true) => "decrease",
            (false, false) => "increase",
        };
        format!("Adjust {}: {} by {:.1}°", name, adjustment, check.deviation)
    }
}

/// Turn a comparison result into structured feedback.
pub fn generate(result: &ComparisonResult, config: &ScoringConfig) -> Feedback {
    let mut joints = BTreeMap::new();
    let mut corrections = Vec::new();
    let mut issues = Vec::new();

    for check in &result.joints {
        let message = joint_message(check);
        let arm = check.joint.arm().name();
        let joint = check.joint.short_name();
        if !check.accurate {
            issues.push(message.clone());
            corrections.push(Correction {
                joint: joint.to_string(),
                arm: arm.to_string(),
                message: message.clone(),
            });
        }
        joints.insert(
            format!("{}_{}", arm, joint),
            JointFeedback {
                joint: joint.to_string(),
                arm: arm.to_string(),
                deviation: round4(check.deviation),
                is_accurate: check.accurate,
                message,
            },
        );
    }

    let mut angles = BTreeMap::new();
    for check in &result.angles {
        let message = angle_message(check);
        if !check.accurate {
            issues.push(message.clone());
        }
        angles.insert(
            check.angle.name().to_string(),
            AngleFeedback {
                baseline: round2(check.baseline),
                current: round2(check.current),
                deviation: round2(check.deviation),
                is_accurate: check.accurate,
                message,
            },
        );
    }

    let score = result.accuracy.map(round2);
    let is_accurate = score.is_some_and(|s| s >= config.accuracy_threshold);
    let message = match score {
        None => "No pose evaluated".to_string(),
        Some(s) if is_accurate => format!("Great form! Accuracy: {s:.1}%"),
        Some(s) if issues.is_empty() => format!("Accuracy: {s:.1}%"),
        Some(s) => {
            let shown: Vec<&str> = issues.iter().take(3).map(String::as_str).collect();
            format!("Accuracy: {s:.1}%. Issues: {}", shown.join("; "))
        }
    };

    Feedback {
        score,
        level: result.level.map(|l| l.as_str().to_string()),
        is_accurate,
        needs_correction: score.is_some() && !is_accurate,
        message,
        joints,
        angles,
        corrections,
    }
}
