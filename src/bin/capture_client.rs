//! Capture client: streams frames from a directory to the scoring server at
//! the display tick rate and prints the feedback that comes back.
//!
//! Stands in for the real capture front end; frames come from image files
//! instead of a camera, everything downstream is identical.

use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use image::RgbImage;

use formcheck::config::{ClientConfig, Config};
use formcheck::protocol::{self, ClientMessage, ServerMessage};
use formcheck::stream::{FrameSource, FrameTransport, StreamConfig, StreamSession, TickOutcome};
use formcheck::FormError;

// ===========================================================================
// Logging
// ===========================================================================

type LogFile = Arc<Mutex<std::io::BufWriter<std::fs::File>>>;

fn open_log_file() -> Result<LogFile> {
    std::fs::create_dir_all("logs")?;
    let ts = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let path = format!("logs/capture_{}.log", ts);
    let file = std::fs::File::create(&path)?;
    eprintln!("Log: {}", path);
    Ok(Arc::new(Mutex::new(std::io::BufWriter::new(file))))
}

macro_rules! log {
    ($logfile:expr, $($arg:tt)*) => {{
        let msg = format!($($arg)*);
        eprintln!("{}", msg);
        if let Ok(mut f) = $logfile.lock() {
            let _ = writeln!(f, "{}", msg);
        }
    }};
}

// ===========================================================================
// Frame source + transport
// ===========================================================================

const IMAGE_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "bmp", "webp"];

fn list_image_files(dir: &str) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("cannot read frames dir {}", dir))?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| IMAGE_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        })
        .collect();
    files.sort();
    Ok(files)
}

/// Cycles through the image files of a directory, one per tick.
struct DirFrameSource {
    files: Vec<PathBuf>,
    next: usize,
}

impl DirFrameSource {
    fn open(dir: &str) -> Result<Self> {
        let files = list_image_files(dir)?;
        if files.is_empty() {
            bail!("no image files in {}", dir);
        }
        Ok(Self { files, next: 0 })
    }
}

impl FrameSource for DirFrameSource {
    fn next_frame(&mut self) -> formcheck::Result<Option<RgbImage>> {
        let path = &self.files[self.next];
        self.next = (self.next + 1) % self.files.len();
        match image::open(path) {
            Ok(img) => Ok(Some(img.to_rgb8())),
            // One unreadable file shouldn't end the session.
            Err(_) => Ok(None),
        }
    }
}

/// Hands frames to the socket writer task.
struct ChannelTransport {
    tx: tokio::sync::mpsc::UnboundedSender<ClientMessage>,
}

impl FrameTransport for ChannelTransport {
    fn send(&mut self, msg: ClientMessage) -> formcheck::Result<()> {
        self.tx
            .send(msg)
            .map_err(|_| FormError::Transport("connection closed".to_string()))
    }
}

// ===========================================================================
// Session
// ===========================================================================

fn report(logfile: &LogFile, msg: ServerMessage) {
    match msg {
        ServerMessage::FrameResult { seq, score, feedback, error, .. } => match error {
            Some(error) => log!(logfile, "[{}] {}", seq, error),
            None => {
                let summary = feedback.map(|f| f.message).unwrap_or_default();
                log!(logfile, "[{}] score={:?} {}", seq, score, summary);
            }
        },
        other => log!(logfile, "{:?}", other),
    }
}

async fn run_session(client: &ClientConfig, logfile: &LogFile) -> Result<()> {
    let stream = tokio::net::TcpStream::connect(&client.server_addr)
        .await
        .with_context(|| format!("cannot connect to {}", client.server_addr))?;
    stream.set_nodelay(true)?;
    log!(logfile, "Connected to {}", client.server_addr);

    let framed = protocol::message_stream(stream);
    let (mut sink, mut read_half) = {
        use futures::StreamExt as _;
        framed.split()
    };

    let mut session = StreamSession::new(StreamConfig {
        max_width: client.max_send_width,
        jpeg_quality: client.jpeg_quality,
        overlay: client.want_overlay,
    });
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<ClientMessage>();
    session.start(DirFrameSource::open(&client.frames_dir)?, ChannelTransport { tx });
    let gate = session.gate();
    let generation = session.generation();

    // Writer: channel → socket.
    let writer = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if protocol::send_to_sink(&mut sink, &msg).await.is_err() {
                break;
            }
        }
    });

    // Reader: socket → gate. Results from a stopped session are discarded.
    // When the socket closes the gate is told, so a tick never spins behind
    // an in-flight frame the server will never answer.
    let reader_log = Arc::clone(logfile);
    let mut reader = tokio::spawn(async move {
        use futures::StreamExt as _;
        while let Some(Ok(bytes)) = read_half.next().await {
            let Ok(msg) = bincode::deserialize::<ServerMessage>(&bytes) else {
                break;
            };
            if let Some(msg) = gate.accept(generation, msg) {
                report(&reader_log, msg);
            }
        }
        gate.disconnect(generation);
    });

    let mut interval =
        tokio::time::interval(Duration::from_secs_f64(1.0 / client.tick_hz.max(1) as f64));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let result = loop {
        tokio::select! {
            _ = interval.tick() => {
                match session.tick() {
                    Ok(TickOutcome::Sent(_))
                    | Ok(TickOutcome::SkippedInFlight)
                    | Ok(TickOutcome::NoFrame) => {}
                    Ok(TickOutcome::Inactive) => break Ok(()),
                    Err(e) => break Err(anyhow::Error::from(e)),
                }
            }
            _ = &mut reader => {
                break Err(anyhow::anyhow!("server closed the connection"));
            }
            _ = tokio::signal::ctrl_c() => {
                log!(logfile, "Interrupted, stopping session");
                break Ok(());
            }
        }
    };

    session.stop();
    writer.abort();
    reader.abort();
    result
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load_or_default("formcheck.toml")?;
    let logfile = open_log_file()?;

    log!(logfile, "Capture Client ({})", env!("GIT_VERSION"));
    log!(logfile, "Server: {}", config.client.server_addr);
    log!(logfile, "Frames: {}", config.client.frames_dir);
    log!(logfile, "Tick: {} Hz", config.client.tick_hz);

    // One reconnect attempt, then give up; the server being gone twice in a
    // row is a setup problem, not a transient.
    match run_session(&config.client, &logfile).await {
        Ok(()) => return Ok(()),
        Err(e) => log!(logfile, "Session ended: {}. Reconnecting...", e),
    }
    tokio::time::sleep(Duration::from_secs(1)).await;
    match run_session(&config.client, &logfile).await {
        Ok(()) => Ok(()),
        Err(e) => {
            log!(logfile, "Reconnect failed: {}", e);
            bail!("scoring service unavailable");
        }
    }
}
