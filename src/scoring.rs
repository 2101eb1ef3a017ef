//! Deviation scoring: one normalized frame against the reference posture.

use serde::{Deserialize, Serialize};

use crate::baseline::BaselinePosture;
use crate::error::FormError;
use crate::pose::{frame_angles, AngleId, JointId, NormalizedFrame};
use crate::Result;

/// Comparison tolerances. Invalid updates are rejected atomically; the prior
/// config stays in effect.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Maximum accurate position deviation, in normalized units.
    #[serde(default = "default_position_threshold")]
    pub position_threshold: f32,
    /// Maximum accurate angle deviation, in degrees.
    #[serde(default = "default_angle_threshold")]
    pub angle_threshold: f32,
    /// Minimum overall accuracy percentage to count as "accurate form".
    #[serde(default = "default_accuracy_threshold")]
    pub accuracy_threshold: f32,
}

fn default_position_threshold() -> f32 { 0.10 }
fn default_angle_threshold() -> f32 { 15.0 }
fn default_accuracy_threshold() -> f32 { 75.0 }

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            position_threshold: default_position_threshold(),
            angle_threshold: default_angle_threshold(),
            accuracy_threshold: default_accuracy_threshold(),
        }
    }
}

/// Partial threshold update carried by the configure operation.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ConfigUpdate {
    pub position_threshold: Option<f32>,
    pub angle_threshold: Option<f32>,
    pub accuracy_threshold: Option<f32>,
}

impl ScoringConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.position_threshold > 0.0 && self.position_threshold <= 1.0) {
            return Err(FormError::Configuration {
                field: "position_threshold",
                message: format!("{} not in (0, 1]", self.position_threshold),
            });
        }
        if !(self.angle_threshold > 0.0 && self.angle_threshold <= 180.0) {
            return Err(FormError::Configuration {
                field: "angle_threshold",
                message: format!("{} not in (0, 180]", self.angle_threshold),
            });
        }
        if !(0.0..=100.0).contains(&self.accuracy_threshold) {
            return Err(FormError::Configuration {
                field: "accuracy_threshold",
                message: format!("{} not in [0, 100]", self.accuracy_threshold),
            });
        }
        Ok(())
    }

    /// Apply a partial update, validating the whole result before anything
    /// takes effect. On error `self` is untouched.
    pub fn apply(&self, update: &ConfigUpdate) -> Result<ScoringConfig> {
        let candidate = ScoringConfig {
            position_threshold: update.position_threshold.unwrap_or(self.position_threshold),
            angle_threshold: update.angle_threshold.unwrap_or(self.angle_threshold),
            accuracy_threshold: update.accuracy_threshold.unwrap_or(self.accuracy_threshold),
        };
        candidate.validate()?;
        Ok(candidate)
    }
}

/// Accuracy bucket derived from the overall percentage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccuracyLevel {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl AccuracyLevel {
    pub fn from_score(score: f32) -> Self {
        if score >= 90.0 {
            Self::Excellent
        } else if score >= 75.0 {
            Self::Good
        } else if score >= 50.0 {
            Self::Fair
        } else {
            Self::Poor
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Excellent => "excellent",
            Self::Good => "good",
            Self::Fair => "fair",
            Self::Poor => "poor",
        }
    }
}

/// One joint evaluated against the baseline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JointCheck {
    pub joint: JointId,
    /// Euclidean deviation in normalized space.
    pub deviation: f32,
    /// Signed offsets, current minus baseline.
    pub dx: f32,
    pub dy: f32,
    pub accurate: bool,
}

/// One angle evaluated against the baseline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AngleCheck {
    pub angle: AngleId,
    pub baseline: f32,
    pub current: f32,
    /// Absolute difference in degrees.
    pub deviation: f32,
    pub accurate: bool,
}

/// Scorer output: per-joint and per-angle deviations plus the overall
/// accuracy. `accuracy` is `None` when nothing was evaluable on both sides.
#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonResult {
    pub joints: Vec<JointCheck>,
    pub angles: Vec<AngleCheck>,
    pub accuracy: Option<f32>,
    pub level: Option<AccuracyLevel>,
}

impl ComparisonResult {
    pub fn evaluated_count(&self) -> usize {
        self.joints.len() + self.angles.len()
    }
}

/// Compare one normalized frame against the baseline under the given config.
///
/// A joint or angle absent from either side is excluded from both the
/// numerator and the denominator of the accuracy percentage. The per-item
/// threshold widens to two baseline standard deviations when the baseline
/// spread exceeds the configured tolerance. Never mutates the baseline.
pub fn compare(
    frame: &NormalizedFrame,
    baseline: &BaselinePosture,
    config: &ScoringConfig,
) -> ComparisonResult {
    let mut joints = Vec::new();
    for joint in JointId::ALL {
        let (current, stat) = match (frame.get(joint), baseline.joint(joint)) {
            (Some(c), Some(s)) => (c, s),
            _ => continue,
        };
        let dx = current.x - stat.x;
        let dy = current.y - stat.y;
        let deviation = (dx * dx + dy * dy).sqrt();
        let spread = (stat.std_x * stat.std_x + stat.std_y * stat.std_y).sqrt();
        let threshold = config.position_threshold.max(2.0 * spread);
        joints.push(JointCheck {
            joint,
            deviation,
            dx,
            dy,
            accurate: deviation <= threshold,
        });
    }

    let current_angles = frame_angles(frame);
    let mut angles = Vec::new();
    for id in AngleId::ALL {
        let (current, stat) = match (current_angles[id as usize], baseline.angle(id)) {
            (Some(c), Some(s)) => (c, s),
            _ => continue,
        };
        let deviation = (current - stat.value).abs();
        let threshold = config.angle_threshold.max(2.0 * stat.std);
        angles.push(AngleCheck {
            angle: id,
            baseline: stat.value,
            current,
            deviation,
            accurate: deviation <= threshold,
        });
    }

    let evaluated = joints.len() + angles.len();
    let accuracy = if evaluated == 0 {
        None
    } else {
        let accurate = joints.iter().filter(|c| c.accurate).count()
            + angles.iter().filter(|c| c.accurate).count();
        Some(accurate as f32 / evaluated as f32 * 100.0)
    };

    ComparisonResult {
        joints,
        angles,
        accuracy,
        level: accuracy.map(AccuracyLevel::from_score),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::baseline::{collect_baseline, AggregateMethod};
    use crate::pose::NormPoint;

    fn reference_frame() -> NormalizedFrame {
        let mut f = NormalizedFrame::new();
        f.set(JointId::LeftShoulder, NormPoint::new(0.40, 0.45));
        f.set(JointId::RightShoulder, NormPoint::new(0.60, 0.45));
        f.set(JointId::LeftElbow, NormPoint::new(0.38, 0.62));
        f.set(JointId::LeftWrist, NormPoint::new(0.50, 0.70));
        f.set(JointId::RightElbow, NormPoint::new(0.62, 0.62));
        f.set(JointId::RightWrist, NormPoint::new(0.52, 0.68));
        f
    }

    fn reference_baseline() -> BaselinePosture {
        collect_baseline(&[reference_frame()], AggregateMethod::Median).unwrap()
    }

    #[test]
    fn test_exact_match_scores_100() {
        let baseline = reference_baseline();
        let result = compare(&reference_frame(), &baseline, &ScoringConfig::default());
        assert_eq!(result.accuracy, Some(100.0));
        assert_eq!(result.level, Some(AccuracyLevel::Excellent));
        assert!(result.joints.iter().all(|c| c.accurate));
        assert!(result.angles.iter().all(|c| c.accurate));
    }

    #[test]
    fn test_empty_frame_scores_none() {
        let baseline = reference_baseline();
        let result = compare(&NormalizedFrame::new(), &baseline, &ScoringConfig::default());
        assert_eq!(result.accuracy, None);
        assert_eq!(result.level, None);
        assert_eq!(result.evaluated_count(), 0);
    }

    #[test]
    fn test_missing_joint_excluded_from_denominator() {
        let baseline = reference_baseline();
        let mut frame = reference_frame();
        // A frame missing the right wrist drops that joint check and the
        // right elbow angle, but the rest still scores perfect.
        frame = {
            let mut f = NormalizedFrame::new();
            for (j, p) in frame.iter() {
                if j != JointId::RightWrist {
                    f.set(j, *p);
                }
            }
            f
        };
        let full = compare(&reference_frame(), &baseline, &ScoringConfig::default());
        let partial = compare(&frame, &baseline, &ScoringConfig::default());
        assert!(partial.evaluated_count() < full.evaluated_count());
        assert_eq!(partial.accuracy, Some(100.0));
    }

    #[test]
    fn test_displaced_joint_lowers_score() {
        let baseline = reference_baseline();
        let mut frame = reference_frame();
        frame.set(JointId::LeftWrist, NormPoint::new(0.80, 0.90));
        let result = compare(&frame, &baseline, &ScoringConfig::default());
        let score = result.accuracy.unwrap();
        assert!(score < 100.0);
        let wrist = result
            .joints
            .iter()
            .find(|c| c.joint == JointId::LeftWrist)
            .unwrap();
        assert!(!wrist.accurate);
        assert!(wrist.dx > 0.0 && wrist.dy > 0.0);
    }

    #[test]
    fn test_threshold_widens_with_baseline_spread() {
        // Two reference frames far apart give the wrist a large spread.
        let mut a = NormalizedFrame::new();
        a.set(JointId::LeftWrist, NormPoint::new(0.30, 0.50));
        let mut b = NormalizedFrame::new();
        b.set(JointId::LeftWrist, NormPoint::new(0.50, 0.50));
        let baseline = collect_baseline(&[a, b], AggregateMethod::Average).unwrap();

        // 0.15 off-center: outside the 0.10 default threshold but inside
        // 2 * std = 0.2.
        let mut frame = NormalizedFrame::new();
        frame.set(JointId::LeftWrist, NormPoint::new(0.55, 0.50));
        let result = compare(&frame, &baseline, &ScoringConfig::default());
        assert!(result.joints[0].accurate);
    }

    #[test]
    fn test_accuracy_buckets() {
        assert_eq!(AccuracyLevel::from_score(95.0), AccuracyLevel::Excellent);
        assert_eq!(AccuracyLevel::from_score(90.0), AccuracyLevel::Excellent);
        assert_eq!(AccuracyLevel::from_score(80.0), AccuracyLevel::Good);
        assert_eq!(AccuracyLevel::from_score(60.0), AccuracyLevel::Fair);
        assert_eq!(AccuracyLevel::from_score(10.0), AccuracyLevel::Poor);
    }

    #[test]
    fn test_invalid_update_rejected_prior_retained() {
        let config = ScoringConfig::default();
        let update = ConfigUpdate {
            angle_threshold: Some(-5.0),
            ..Default::default()
        };
        let err = config.apply(&update).unwrap_err();
        assert!(matches!(
            err,
            FormError::Configuration { field: "angle_threshold", .. }
        ));
        assert_eq!(config.angle_threshold, 15.0);
    }

    #[test]
    fn test_partial_update_accepted() {
        let config = ScoringConfig::default();
        let update = ConfigUpdate {
            position_threshold: Some(0.2),
            ..Default::default()
        };
        let next = config.apply(&update).unwrap();
        assert_eq!(next.position_threshold, 0.2);
        assert_eq!(next.angle_threshold, config.angle_threshold);
    }

    #[test]
    fn test_config_validation_ranges() {
        let mut config = ScoringConfig::default();
        config.position_threshold = 0.0;
        assert!(config.validate().is_err());
        config = ScoringConfig::default();
        config.angle_threshold = 181.0;
        assert!(config.validate().is_err());
        config = ScoringConfig::default();
        config.accuracy_threshold = 100.5;
        assert!(config.validate().is_err());
        assert!(ScoringConfig::default().validate().is_ok());
    }
}
