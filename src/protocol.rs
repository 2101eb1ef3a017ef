//! TCP protocol for capture-client ↔ scoring-server communication.
//!
//! bincode messages over length-delimited framing. Delivery is at-most-once
//! per capture tick; dropped frames are never retried by design.

use bytes::Bytes;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, LengthDelimitedCodec};

use crate::baseline::{AggregateMethod, BaselinePosture};
use crate::feedback::Feedback;
use crate::scoring::{ConfigUpdate, ScoringConfig};

/// Client → Server
#[derive(Serialize, Deserialize, Debug)]
pub enum ClientMessage {
    /// One captured frame. `seq` is a per-session monotonic identifier so a
    /// client can discard replies that arrive after a newer request.
    Frame {
        seq: u64,
        timestamp_us: Option<u64>,
        jpeg: Vec<u8>,
        overlay: bool,
    },
    /// Build a new baseline from reference stills.
    CollectBaseline {
        method: AggregateMethod,
        frames: Vec<Vec<u8>>,
    },
    /// Install a prebuilt baseline snapshot.
    SetBaseline { snapshot: BaselinePosture },
    /// Partial threshold update.
    Configure { update: ConfigUpdate },
    GetBaseline,
}

/// Server → Client
#[derive(Serialize, Deserialize, Debug)]
pub enum ServerMessage {
    /// Result for one frame. Per-frame failures (no detection, no baseline)
    /// arrive as `error` data here, never as a closed connection.
    FrameResult {
        seq: u64,
        score: Option<f32>,
        feedback: Option<Feedback>,
        error: Option<String>,
        overlay_jpeg: Option<Vec<u8>>,
    },
    BaselineReady { sample_count: usize },
    BaselineRejected { error: String },
    ConfigAccepted { config: ScoringConfig },
    ConfigRejected { error: String },
    Baseline { snapshot: Option<BaselinePosture> },
}

// --- TCP codec helpers ---

const MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

pub type MessageStream = Framed<TcpStream, LengthDelimitedCodec>;
pub type MessageSink = SplitSink<MessageStream, Bytes>;

/// Create a framed message stream with length-delimited framing.
pub fn message_stream(stream: TcpStream) -> MessageStream {
    let codec = LengthDelimitedCodec::builder()
        .max_frame_length(MAX_FRAME_BYTES)
        .new_codec();
    Framed::new(stream, codec)
}

/// Send a serializable message (bincode + length prefix).
pub async fn send_message<T: Serialize>(
    stream: &mut MessageStream,
    msg: &T,
) -> anyhow::Result<()> {
    let data = bincode::serialize(msg)?;
    stream.send(Bytes::from(data)).await?;
    Ok(())
}

/// Send through a split sink half.
pub async fn send_to_sink<T: Serialize>(sink: &mut MessageSink, msg: &T) -> anyhow::Result<()> {
    let data = bincode::serialize(msg)?;
    sink.send(Bytes::from(data)).await?;
    Ok(())
}

/// Receive and deserialize a message. `Ok(None)` means the peer closed.
pub async fn recv_message<T: DeserializeOwned>(
    stream: &mut MessageStream,
) -> anyhow::Result<Option<T>> {
    match stream.next().await {
        Some(Ok(bytes)) => Ok(Some(bincode::deserialize(&bytes)?)),
        Some(Err(e)) => Err(e.into()),
        None => Ok(None),
    }
}
