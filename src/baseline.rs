//! Baseline aggregation: a batch of normalized reference frames into one
//! statistical reference posture.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::FormError;
use crate::pose::{frame_angles, AngleId, JointId, NormalizedFrame};
use crate::Result;

/// How reference frames are combined. `Median` is the default: it tolerates
/// a minority of corrupted reference frames without skewing the baseline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregateMethod {
    Average,
    #[default]
    Median,
}

impl FromStr for AggregateMethod {
    type Err = FormError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "average" => Ok(Self::Average),
            "median" => Ok(Self::Median),
            other => Err(FormError::Baseline(format!(
                "unknown aggregate method: {other}"
            ))),
        }
    }
}

/// Central position estimate and spread for one joint.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JointStat {
    pub x: f32,
    pub y: f32,
    pub std_x: f32,
    pub std_y: f32,
}

/// Central angle estimate (degrees) and spread for one joint pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AngleStat {
    pub value: f32,
    pub std: f32,
}

/// The aggregated reference posture. Immutable once produced; replaced
/// wholesale, never patched in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselinePosture {
    pub created_at: String,
    pub method: AggregateMethod,
    pub sample_count: usize,
    joints: BTreeMap<JointId, JointStat>,
    angles: BTreeMap<AngleId, AngleStat>,
}

impl BaselinePosture {
    pub fn joint(&self, id: JointId) -> Option<&JointStat> {
        self.joints.get(&id)
    }

    pub fn angle(&self, id: AngleId) -> Option<&AngleStat> {
        self.angles.get(&id)
    }

    pub fn joint_count(&self) -> usize {
        self.joints.len()
    }

    /// Serialize to a durable JSON snapshot, reloadable across restarts.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<BaselinePosture> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

fn mean(values: &[f32]) -> f32 {
    values.iter().sum::<f32>() / values.len() as f32
}

fn median(values: &[f32]) -> f32 {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let n = sorted.len();
    if n % 2 == 1 {
        sorted[n / 2]
    } else {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    }
}

/// Population standard deviation around the mean.
fn std_dev(values: &[f32]) -> f32 {
    let m = mean(values);
    (values.iter().map(|v| (v - m) * (v - m)).sum::<f32>() / values.len() as f32).sqrt()
}

fn central(values: &[f32], method: AggregateMethod) -> f32 {
    match method {
        AggregateMethod::Average => mean(values),
        AggregateMethod::Median => median(values),
    }
}

/// Aggregate a set of normalized reference frames into a new baseline.
///
/// Joints and angles contribute only from the frames in which they appear.
/// Errors when the set is empty or no frame contributed any joint.
pub fn collect_baseline(
    frames: &[NormalizedFrame],
    method: AggregateMethod,
) -> Result<BaselinePosture> {
    if frames.is_empty() {
        return Err(FormError::Baseline("no reference frames provided".into()));
    }

    let mut joints = BTreeMap::new();
    for joint in JointId::ALL {
        let mut xs = Vec::new();
        let mut ys = Vec::new();
        for frame in frames {
            if let Some(p) = frame.get(joint) {
                xs.push(p.x);
                ys.push(p.y);
            }
        }
        if !xs.is_empty() {
            joints.insert(
                joint,
                JointStat {
                    x: central(&xs, method),
                    y: central(&ys, method),
                    std_x: std_dev(&xs),
                    std_y: std_dev(&ys),
                },
            );
        }
    }

    if joints.is_empty() {
        return Err(FormError::Baseline(
            "no usable joints in any reference frame".into(),
        ));
    }

    let per_frame: Vec<[Option<f32>; AngleId::COUNT]> =
        frames.iter().map(frame_angles).collect();
    let mut angles = BTreeMap::new();
    for id in AngleId::ALL {
        let values: Vec<f32> = per_frame
            .iter()
            .filter_map(|a| a[id as usize])
            .collect();
        if !values.is_empty() {
            angles.insert(
                id,
                AngleStat {
                    value: central(&values, method),
                    std: std_dev(&values),
                },
            );
        }
    }

    Ok(BaselinePosture {
        created_at: chrono::Utc::now().to_rfc3339(),
        method,
        sample_count: frames.len(),
        joints,
        angles,
    })
}
