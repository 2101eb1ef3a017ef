//! Seam to the external pose estimation collaborator.
//!
//! The pipeline only depends on the [`PoseEstimator`] trait; the bundled
//! MoveNet implementation lives behind the `onnx` feature.

use image::RgbImage;

use super::landmark::Detection;
use crate::Result;

/// Maps one image to named joint coordinates with a confidence score.
pub trait PoseEstimator {
    fn detect(&mut self, image: &RgbImage) -> Result<Detection>;
}

#[cfg(feature = "onnx")]
pub use movenet::MoveNetEstimator;

#[cfg(feature = "onnx")]
mod movenet {
    use image::{imageops::FilterType, RgbImage};
    use ndarray::Array4;
    use ort::session::builder::GraphOptimizationLevel;
    use ort::session::Session;
    use ort::value::Tensor;
    use std::path::Path;

    use super::PoseEstimator;
    use crate::error::FormError;
    use crate::pose::landmark::{Detection, JointId, Landmark};
    use crate::Result;

    const INPUT_SIZE: u32 = 192;

    /// MoveNet keypoint rows for the joints we track. MoveNet has no hand
    /// landmarks, so fingertips stay absent with this estimator.
    const KP_MAP: [(usize, JointId); 6] = [
        (5, JointId::LeftShoulder),
        (6, JointId::RightShoulder),
        (7, JointId::LeftElbow),
        (8, JointId::RightElbow),
        (9, JointId::LeftWrist),
        (10, JointId::RightWrist),
    ];

    /// MoveNet Lightning pose estimator.
    pub struct MoveNetEstimator {
        session: Session,
    }

    impl MoveNetEstimator {
        pub fn new<P: AsRef<Path>>(model_path: P) -> Result<Self> {
            let session = Session::builder()
                .and_then(|b| b.with_optimization_level(GraphOptimizationLevel::Level3))
                .and_then(|b| b.commit_from_file(model_path.as_ref()))
                .map_err(|e| FormError::Estimator(format!("failed to load model: {e}")))?;
            Ok(Self { session })
        }

        fn preprocess(image: &RgbImage) -> Array4<f32> {
            let resized = image::imageops::resize(image, INPUT_SIZE, INPUT_SIZE, FilterType::Triangle);
            let mut input = Array4::<f32>::zeros((1, INPUT_SIZE as usize, INPUT_SIZE as usize, 3));
            for (x, y, pixel) in resized.enumerate_pixels() {
                for c in 0..3 {
                    input[[0, y as usize, x as usize, c]] = pixel.0[c] as f32;
                }
            }
            input
        }
    }

    impl PoseEstimator for MoveNetEstimator {
        fn detect(&mut self, image: &RgbImage) -> Result<Detection> {
            let (width, height) = image.dimensions();
            let input = Tensor::from_array(Self::preprocess(image))
                .map_err(|e| FormError::Estimator(e.to_string()))?;
            let outputs = self
                .session
                .run(ort::inputs!["serving_default_input_0" => input])
                .map_err(|e| FormError::Estimator(format!("inference failed: {e}")))?;

            // Output is [1, 1, 17, 3] (y, x, confidence), coordinates
            // normalized to the input image.
            let output: ndarray::ArrayViewD<f32> = outputs["StatefulPartitionedCall_0"]
                .try_extract_array()
                .map_err(|e| FormError::Estimator(format!("bad output tensor: {e}")))?;

            let mut det = Detection::new(width, height);
            for (row, joint) in KP_MAP {
                let y = output[[0, 0, row, 0]];
                let x = output[[0, 0, row, 1]];
                let confidence = output[[0, 0, row, 2]];
                det.set(
                    joint,
                    Landmark::new(x * width as f32, y * height as f32, confidence),
                );
            }
            Ok(det)
        }
    }
}
