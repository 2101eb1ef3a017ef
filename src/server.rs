//! Session server: owns the baseline and scoring config, turns inbound
//! messages into replies.
//!
//! Per-frame failures (undecodable image, no pose, no baseline yet) are
//! results, not faults: they travel back as `FrameResult.error` and the
//! session keeps going. Only transport-level breakage ends a connection.

use std::path::PathBuf;
use std::sync::Arc;

use image::RgbImage;
use tokio::sync::RwLock;

use crate::baseline::{collect_baseline, AggregateMethod, BaselinePosture};
use crate::error::FormError;
use crate::feedback;
use crate::overlay;
use crate::pose::{normalize, NormalizedFrame, PoseEstimator};
use crate::protocol::{ClientMessage, ServerMessage};
use crate::scoring::{compare, ScoringConfig};
use crate::Result;

const OVERLAY_JPEG_QUALITY: u8 = 70;

/// State shared by every connection: the installed baseline and the scoring
/// thresholds. The baseline is replaced wholesale by swapping the `Arc`, so
/// frames already scoring against the old one are unaffected.
pub struct ServerState {
    baseline: RwLock<Option<Arc<BaselinePosture>>>,
    config: RwLock<ScoringConfig>,
    /// Snapshot file the baseline is persisted to on install, if any.
    baseline_path: Option<PathBuf>,
}

impl ServerState {
    pub fn new(config: ScoringConfig, baseline_path: Option<PathBuf>) -> Self {
        Self {
            baseline: RwLock::new(None),
            config: RwLock::new(config),
            baseline_path,
        }
    }

    /// Load the persisted baseline snapshot if one exists, so scoring
    /// resumes across restarts without re-collecting.
    pub fn preload(&mut self) -> Result<bool> {
        let Some(path) = &self.baseline_path else {
            return Ok(false);
        };
        if !path.exists() {
            return Ok(false);
        }
        let snapshot = BaselinePosture::load(path)?;
        *self.baseline.get_mut() = Some(Arc::new(snapshot));
        Ok(true)
    }

    pub async fn baseline(&self) -> Option<Arc<BaselinePosture>> {
        self.baseline.read().await.clone()
    }

    pub async fn config(&self) -> ScoringConfig {
        *self.config.read().await
    }

    /// Persist and install a new baseline. The swap is atomic from the
    /// reader side; persistence failure leaves the old baseline in place.
    async fn install(&self, snapshot: BaselinePosture) -> Result<usize> {
        if let Some(path) = &self.baseline_path {
            snapshot.save(path)?;
        }
        let count = snapshot.sample_count;
        *self.baseline.write().await = Some(Arc::new(snapshot));
        Ok(count)
    }
}

/// One connection's message handler. The estimator is per-session; the
/// baseline and config live in the shared state.
pub struct SessionServer<E: PoseEstimator> {
    state: Arc<ServerState>,
    estimator: E,
}

impl<E: PoseEstimator> SessionServer<E> {
    pub fn new(state: Arc<ServerState>, estimator: E) -> Self {
        Self { state, estimator }
    }

    pub async fn handle(&mut self, msg: ClientMessage) -> ServerMessage {
        match msg {
            ClientMessage::Frame { seq, jpeg, overlay, .. } => {
                self.handle_frame(seq, &jpeg, overlay).await
            }
            ClientMessage::CollectBaseline { method, frames } => {
                self.handle_collect(method, &frames).await
            }
            ClientMessage::SetBaseline { snapshot } => {
                if snapshot.joint_count() == 0 {
                    return ServerMessage::BaselineRejected {
                        error: "snapshot has no joints".to_string(),
                    };
                }
                match self.state.install(snapshot).await {
                    Ok(sample_count) => ServerMessage::BaselineReady { sample_count },
                    Err(e) => ServerMessage::BaselineRejected { error: e.to_string() },
                }
            }
            ClientMessage::Configure { update } => {
                let current = self.state.config().await;
                match current.apply(&update) {
                    Ok(next) => {
                        *self.state.config.write().await = next;
                        ServerMessage::ConfigAccepted { config: next }
                    }
                    Err(e) => ServerMessage::ConfigRejected { error: e.to_string() },
                }
            }
            ClientMessage::GetBaseline => ServerMessage::Baseline {
                snapshot: self
                    .state
                    .baseline()
                    .await
                    .map(|b| BaselinePosture::clone(&b)),
            },
        }
    }

    async fn handle_frame(&mut self, seq: u64, jpeg: &[u8], want_overlay: bool) -> ServerMessage {
        let image = match decode_frame(jpeg) {
            Ok(image) => image,
            Err(e) => return frame_error(seq, &e),
        };
        let (det, frame) = match self.detect_frame(&image) {
            Ok(pair) => pair,
            Err(e) => return frame_error(seq, &e),
        };
        let Some(baseline) = self.state.baseline().await else {
            return frame_error(seq, &FormError::NoBaseline);
        };

        let config = self.state.config().await;
        let result = compare(&frame, &baseline, &config);
        let fb = feedback::generate(&result, &config);

        let overlay_jpeg = if want_overlay {
            let mut canvas = image;
            overlay::draw_comparison(&mut canvas, &det, &baseline, &result);
            encode_jpeg(&canvas).ok()
        } else {
            None
        };

        ServerMessage::FrameResult {
            seq,
            score: fb.score,
            feedback: Some(fb),
            error: None,
            overlay_jpeg,
        }
    }

    async fn handle_collect(&mut self, method: AggregateMethod, frames: &[Vec<u8>]) -> ServerMessage {
        // Undetectable stills are skipped, not fatal; the aggregator rejects
        // the batch if nothing usable remains.
        let mut normalized = Vec::new();
        for jpeg in frames {
            let Ok(image) = decode_frame(jpeg) else { continue };
            let Ok((_, frame)) = self.detect_frame(&image) else { continue };
            normalized.push(frame);
        }
        match collect_baseline(&normalized, method) {
            Ok(snapshot) => match self.state.install(snapshot).await {
                Ok(sample_count) => ServerMessage::BaselineReady { sample_count },
                Err(e) => ServerMessage::BaselineRejected { error: e.to_string() },
            },
            Err(e) => ServerMessage::BaselineRejected { error: e.to_string() },
        }
    }

    fn detect_frame(&mut self, image: &RgbImage) -> Result<(crate::pose::Detection, NormalizedFrame)> {
        let det = self.estimator.detect(image)?;
        if det.is_empty() {
            return Err(FormError::Detection);
        }
        let frame = normalize(&det);
        if frame.is_empty() {
            return Err(FormError::Detection);
        }
        Ok((det, frame))
    }
}

fn frame_error(seq: u64, error: &FormError) -> ServerMessage {
    ServerMessage::FrameResult {
        seq,
        score: None,
        feedback: None,
        error: Some(error.to_string()),
        overlay_jpeg: None,
    }
}

fn decode_frame(jpeg: &[u8]) -> Result<RgbImage> {
    let image = image::load_from_memory(jpeg)
        .map_err(|e| FormError::Decode(e.to_string()))?;
    Ok(image.to_rgb8())
}

fn encode_jpeg(image: &RgbImage) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buf, OVERLAY_JPEG_QUALITY);
    image.write_with_encoder(encoder)?;
    Ok(buf)
}
