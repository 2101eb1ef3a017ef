//! Frame streaming coordinator (client side).
//!
//! One persistent channel per session, at most one frame in flight. The
//! capture cadence comes from outside (the display refresh callback on a
//! real client); a tick transmits only when no previously sent frame is
//! still awaiting a result. Latched ticks drop the frame, never buffer it,
//! so the far end always sees the most recent posture.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use image::RgbImage;

use crate::error::FormError;
use crate::protocol::{ClientMessage, ServerMessage};
use crate::Result;

pub const DEFAULT_MAX_SEND_WIDTH: u32 = 640;
pub const DEFAULT_JPEG_QUALITY: u8 = 70;

/// Produces frames for the capture loop. Owning the camera (or file
/// sequence) lives behind this seam; dropping the source releases it.
pub trait FrameSource {
    /// The most recent frame, or `None` when nothing new is available yet.
    fn next_frame(&mut self) -> Result<Option<RgbImage>>;
}

/// Sends one message towards the server. Dropping the transport closes the
/// channel.
pub trait FrameTransport {
    fn send(&mut self, msg: ClientMessage) -> Result<()>;
}

#[derive(Debug, Clone, Copy)]
pub struct StreamConfig {
    /// Outbound frames are downsampled to at most this width, aspect kept.
    pub max_width: u32,
    pub jpeg_quality: u8,
    /// Ask the server for the comparison overlay image.
    pub overlay: bool,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            max_width: DEFAULT_MAX_SEND_WIDTH,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            overlay: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Active,
    Stopped,
}

/// What one capture tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// A frame was transmitted with this sequence number.
    Sent(u64),
    /// A previous frame is still in flight; this tick's frame was dropped.
    SkippedInFlight,
    /// The source had no frame ready.
    NoFrame,
    /// The session is not active.
    Inactive,
}

/// Accepts or discards inbound results for a session. Shared with the
/// receive side; a result is applied only while its generation still
/// matches, so anything arriving after `stop` is discarded.
#[derive(Clone)]
pub struct ResultGate {
    inflight: Arc<AtomicBool>,
    inflight_seq: Arc<AtomicU64>,
    generation: Arc<AtomicU64>,
    disconnected: Arc<AtomicBool>,
}

impl ResultGate {
    /// Returns the message for delivery, or `None` if it must be discarded.
    /// Accepting a frame result clears the single-flight latch, but only
    /// when it answers the frame actually in flight: a duplicate or
    /// spurious result must not open the latch early.
    pub fn accept(&self, generation: u64, msg: ServerMessage) -> Option<ServerMessage> {
        if generation != self.generation.load(Ordering::Acquire) {
            return None;
        }
        if let ServerMessage::FrameResult { seq, .. } = &msg {
            if *seq != self.inflight_seq.load(Ordering::Acquire) {
                return None;
            }
            if self
                .inflight
                .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                return None;
            }
        }
        Some(msg)
    }

    /// Mark the channel dead so the capture loop stops instead of skipping
    /// forever behind an unanswerable in-flight frame. Ignored when the
    /// generation no longer matches (a reader outliving its session).
    pub fn disconnect(&self, generation: u64) {
        if generation == self.generation.load(Ordering::Acquire) {
            self.disconnected.store(true, Ordering::Release);
        }
    }
}

/// Lifetime-scoped capture/transmit unit: owns the frame source and the
/// transport between `start` and `stop`.
pub struct StreamSession<S: FrameSource, T: FrameTransport> {
    config: StreamConfig,
    state: SessionState,
    seq: u64,
    source: Option<S>,
    transport: Option<T>,
    inflight: Arc<AtomicBool>,
    inflight_seq: Arc<AtomicU64>,
    generation: Arc<AtomicU64>,
    disconnected: Arc<AtomicBool>,
}

impl<S: FrameSource, T: FrameTransport> StreamSession<S, T> {
    pub fn new(config: StreamConfig) -> Self {
        Self {
            config,
            state: SessionState::Idle,
            seq: 0,
            source: None,
            transport: None,
            inflight: Arc::new(AtomicBool::new(false)),
            inflight_seq: Arc::new(AtomicU64::new(0)),
            generation: Arc::new(AtomicU64::new(0)),
            disconnected: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == SessionState::Active
    }

    /// Generation the receive side must tag results with.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub fn gate(&self) -> ResultGate {
        ResultGate {
            inflight: Arc::clone(&self.inflight),
            inflight_seq: Arc::clone(&self.inflight_seq),
            generation: Arc::clone(&self.generation),
            disconnected: Arc::clone(&self.disconnected),
        }
    }

    /// Acquire the source and channel and begin accepting ticks. Starting an
    /// already active session restarts it.
    pub fn start(&mut self, source: S, transport: T) {
        if self.state == SessionState::Active {
            self.stop();
        }
        self.source = Some(source);
        self.transport = Some(transport);
        self.seq = 0;
        self.inflight.store(false, Ordering::Release);
        self.inflight_seq.store(0, Ordering::Release);
        self.disconnected.store(false, Ordering::Release);
        self.state = SessionState::Active;
    }

    /// One capture tick. Skips entirely while a frame is in flight; errors
    /// once the receive side has reported the channel dead, so a broken
    /// connection surfaces here instead of skipping forever behind a frame
    /// that will never be answered.
    pub fn tick(&mut self) -> Result<TickOutcome> {
        if self.state != SessionState::Active {
            return Ok(TickOutcome::Inactive);
        }
        if self.disconnected.load(Ordering::Acquire) {
            return Err(FormError::Transport("channel closed".to_string()));
        }
        if self.inflight.load(Ordering::Acquire) {
            return Ok(TickOutcome::SkippedInFlight);
        }
        let frame = match self.source.as_mut() {
            Some(source) => source.next_frame()?,
            None => return Ok(TickOutcome::Inactive),
        };
        let Some(frame) = frame else {
            return Ok(TickOutcome::NoFrame);
        };
        let jpeg = encode_frame(&frame, self.config.max_width, self.config.jpeg_quality)?;

        // Claim the latch. Only a tick sets it, only a result clears it, so
        // the swap can fail only against a racing response callback.
        if self
            .inflight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Ok(TickOutcome::SkippedInFlight);
        }

        self.seq += 1;
        self.inflight_seq.store(self.seq, Ordering::Release);
        let msg = ClientMessage::Frame {
            seq: self.seq,
            timestamp_us: now_us(),
            jpeg,
            overlay: self.config.overlay,
        };
        match self.transport.as_mut() {
            Some(transport) => match transport.send(msg) {
                Ok(()) => Ok(TickOutcome::Sent(self.seq)),
                Err(e) => {
                    self.inflight.store(false, Ordering::Release);
                    Err(e)
                }
            },
            None => Ok(TickOutcome::Inactive),
        }
    }

    /// Cancel the loop, close the channel, release the source. Idempotent
    /// and safe from any state, including with a frame in flight; any result
    /// arriving afterwards is discarded by the gate.
    pub fn stop(&mut self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.inflight.store(false, Ordering::Release);
        self.source = None;
        self.transport = None;
        self.state = SessionState::Stopped;
    }
}

fn now_us() -> Option<u64> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .ok()
        .map(|d| d.as_micros() as u64)
}

/// Downsample to at most `max_width` (aspect preserved) and re-encode as
/// JPEG at the given quality, bounding payload size regardless of source
/// camera resolution.
pub fn encode_frame(frame: &RgbImage, max_width: u32, quality: u8) -> Result<Vec<u8>> {
    let (w, h) = frame.dimensions();
    let resized;
    let img = if w > max_width {
        let new_h = ((h as u64 * max_width as u64) / w as u64).max(1) as u32;
        resized = image::imageops::resize(
            frame,
            max_width,
            new_h,
            image::imageops::FilterType::Triangle,
        );
        &resized
    } else {
        frame
    };

    let mut buf = Vec::new();
    let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buf, quality);
    img.write_with_encoder(encoder)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct FakeSource {
        frames: u32,
        dropped: Option<Arc<AtomicBool>>,
    }

    impl FakeSource {
        fn new() -> Self {
            Self { frames: 0, dropped: None }
        }

        fn with_drop_flag(flag: Arc<AtomicBool>) -> Self {
            Self { frames: 0, dropped: Some(flag) }
        }
    }

    impl Drop for FakeSource {
        fn drop(&mut self) {
            if let Some(flag) = &self.dropped {
                flag.store(true, Ordering::Release);
            }
        }
    }

    impl FrameSource for FakeSource {
        fn next_frame(&mut self) -> Result<Option<RgbImage>> {
            self.frames += 1;
            Ok(Some(RgbImage::new(64, 48)))
        }
    }

    #[derive(Clone)]
    struct FakeTransport {
        sent: Arc<Mutex<Vec<u64>>>,
    }

    impl FakeTransport {
        fn new() -> Self {
            Self { sent: Arc::new(Mutex::new(Vec::new())) }
        }

        fn sent_seqs(&self) -> Vec<u64> {
            self.sent.lock().unwrap().clone()
        }
    }

    impl FrameTransport for FakeTransport {
        fn send(&mut self, msg: ClientMessage) -> Result<()> {
            if let ClientMessage::Frame { seq, .. } = msg {
                self.sent.lock().unwrap().push(seq);
            }
            Ok(())
        }
    }

    fn frame_result(seq: u64) -> ServerMessage {
        ServerMessage::FrameResult {
            seq,
            score: Some(90.0),
            feedback: None,
            error: None,
            overlay_jpeg: None,
        }
    }

    #[test]
    fn test_single_flight_latch() {
        let transport = FakeTransport::new();
        let mut session = StreamSession::new(StreamConfig::default());
        session.start(FakeSource::new(), transport.clone());
        let gate = session.gate();
        let gen = session.generation();

        assert_eq!(session.tick().unwrap(), TickOutcome::Sent(1));
        // Two more ticks arrive before the result: both dropped.
        assert_eq!(session.tick().unwrap(), TickOutcome::SkippedInFlight);
        assert_eq!(session.tick().unwrap(), TickOutcome::SkippedInFlight);
        assert_eq!(transport.sent_seqs(), vec![1]);

        // Result clears the latch; the next tick sends again.
        assert!(gate.accept(gen, frame_result(1)).is_some());
        assert_eq!(session.tick().unwrap(), TickOutcome::Sent(2));
        assert_eq!(transport.sent_seqs(), vec![1, 2]);
    }

    #[test]
    fn test_stop_is_idempotent_and_safe_without_start() {
        let mut session: StreamSession<FakeSource, FakeTransport> =
            StreamSession::new(StreamConfig::default());
        session.stop();
        session.stop();
        assert_eq!(session.state(), SessionState::Stopped);
        assert_eq!(session.tick().unwrap(), TickOutcome::Inactive);
    }

    #[test]
    fn test_stop_releases_resources() {
        let dropped = Arc::new(AtomicBool::new(false));
        let mut session = StreamSession::new(StreamConfig::default());
        session.start(
            FakeSource::with_drop_flag(Arc::clone(&dropped)),
            FakeTransport::new(),
        );
        assert!(!dropped.load(Ordering::Acquire));
        session.stop();
        assert!(dropped.load(Ordering::Acquire));
        session.stop();
    }

    #[test]
    fn test_late_result_after_stop_discarded() {
        let transport = FakeTransport::new();
        let mut session = StreamSession::new(StreamConfig::default());
        session.start(FakeSource::new(), transport);
        let gate = session.gate();
        let gen = session.generation();

        assert_eq!(session.tick().unwrap(), TickOutcome::Sent(1));
        session.stop();
        // The in-flight result lands after stop: discarded, not delivered.
        assert!(gate.accept(gen, frame_result(1)).is_none());
    }

    #[test]
    fn test_restart_discards_previous_generation() {
        let mut session = StreamSession::new(StreamConfig::default());
        session.start(FakeSource::new(), FakeTransport::new());
        let gate = session.gate();
        let old_gen = session.generation();
        session.tick().unwrap();

        session.start(FakeSource::new(), FakeTransport::new());
        assert!(gate.accept(old_gen, frame_result(1)).is_none());
        assert_eq!(session.tick().unwrap(), TickOutcome::Sent(1));
        assert!(gate.accept(session.generation(), frame_result(1)).is_some());
    }

    #[test]
    fn test_dead_channel_surfaces_transport_error() {
        let mut session = StreamSession::new(StreamConfig::default());
        session.start(FakeSource::new(), FakeTransport::new());
        let gate = session.gate();
        let gen = session.generation();

        // A frame goes out, then the connection dies before any reply.
        assert_eq!(session.tick().unwrap(), TickOutcome::Sent(1));
        assert_eq!(session.tick().unwrap(), TickOutcome::SkippedInFlight);
        gate.disconnect(gen);

        // The loop must see an error, not skip forever behind the latch.
        assert!(matches!(
            session.tick(),
            Err(FormError::Transport(_))
        ));
        assert!(session.tick().is_err());
    }

    #[test]
    fn test_stale_disconnect_ignored_after_restart() {
        let mut session = StreamSession::new(StreamConfig::default());
        session.start(FakeSource::new(), FakeTransport::new());
        let gate = session.gate();
        let old_gen = session.generation();

        session.start(FakeSource::new(), FakeTransport::new());
        gate.disconnect(old_gen);
        assert_eq!(session.tick().unwrap(), TickOutcome::Sent(1));
    }

    #[test]
    fn test_mismatched_seq_does_not_clear_latch() {
        let transport = FakeTransport::new();
        let mut session = StreamSession::new(StreamConfig::default());
        session.start(FakeSource::new(), transport.clone());
        let gate = session.gate();
        let gen = session.generation();

        assert_eq!(session.tick().unwrap(), TickOutcome::Sent(1));
        // A result for a frame that was never sent: discarded, latch held.
        assert!(gate.accept(gen, frame_result(99)).is_none());
        assert_eq!(session.tick().unwrap(), TickOutcome::SkippedInFlight);

        // The real result clears it; replaying it afterwards is discarded.
        assert!(gate.accept(gen, frame_result(1)).is_some());
        assert!(gate.accept(gen, frame_result(1)).is_none());
        assert_eq!(session.tick().unwrap(), TickOutcome::Sent(2));
        // A stale result for the previous frame no longer matches.
        assert!(gate.accept(gen, frame_result(1)).is_none());
        assert_eq!(session.tick().unwrap(), TickOutcome::SkippedInFlight);
        assert!(gate.accept(gen, frame_result(2)).is_some());
    }

    #[test]
    fn test_encode_frame_bounds_width() {
        let frame = RgbImage::new(1280, 720);
        let jpeg = encode_frame(&frame, 640, 70).unwrap();
        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!(decoded.width(), 640);
        assert_eq!(decoded.height(), 360);

        // Already small enough: left alone.
        let frame = RgbImage::new(320, 240);
        let jpeg = encode_frame(&frame, 640, 70).unwrap();
        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!(decoded.width(), 320);
    }
}
