//! Scoring server: receives JPEG frames over TCP, runs ONNX pose estimation,
//! scores each frame against the installed baseline, and replies with
//! structured feedback.

use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};

use formcheck::config::Config;
use formcheck::pose::MoveNetEstimator;
use formcheck::protocol::{self, ClientMessage};
use formcheck::server::{ServerState, SessionServer};

// ===========================================================================
// Logging
// ===========================================================================

type LogFile = Arc<Mutex<std::io::BufWriter<std::fs::File>>>;

fn open_log_file() -> Result<LogFile> {
    std::fs::create_dir_all("logs")?;
    let ts = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let path = format!("logs/scoring_{}.log", ts);
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
// Connection handling
// ===========================================================================

async fn handle_connection(
    stream: tokio::net::TcpStream,
    state: Arc<ServerState>,
    model_path: String,
    logfile: LogFile,
    verbose: bool,
) -> Result<()> {
    // Sessions are independent: each gets its own estimator, the baseline
    // and thresholds are shared.
    let estimator = MoveNetEstimator::new(&model_path)?;
    let mut session = SessionServer::new(state, estimator);
    let mut framed = protocol::message_stream(stream);

    while let Some(msg) = protocol::recv_message::<ClientMessage>(&mut framed).await? {
        if verbose {
            match &msg {
                ClientMessage::Frame { seq, jpeg, .. } => {
                    log!(logfile, "[frame] seq={} ({} bytes)", seq, jpeg.len());
                }
                other => log!(logfile, "[msg] {:?}", std::mem::discriminant(other)),
            }
        }
        let reply = session.handle(msg).await;
        protocol::send_message(&mut framed, &reply).await?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load_or_default("formcheck.toml")?;
    let logfile = open_log_file()?;

    log!(logfile, "Scoring Server ({})", env!("GIT_VERSION"));
    log!(logfile, "Listen: {}", config.server.listen_addr);
    log!(logfile, "Model: {}", config.server.model_path);
    log!(logfile, "Baseline snapshot: {}", config.server.baseline_path);
    if config.server.verbose {
        log!(logfile, "Verbose mode: ON");
    }

    let mut state = ServerState::new(
        config.scoring,
        Some(PathBuf::from(&config.server.baseline_path)),
    );
    match state.preload() {
        Ok(true) => log!(logfile, "Baseline snapshot loaded"),
        Ok(false) => log!(logfile, "No baseline snapshot, waiting for collection"),
        Err(e) => log!(logfile, "Baseline snapshot unreadable, ignoring: {}", e),
    }
    let state = Arc::new(state);

    let bind_addr: std::net::SocketAddr = config
        .server
        .listen_addr
        .parse()
        .context("invalid listen_addr")?;
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    log!(logfile, "Listening on {}", bind_addr);
    log!(logfile, "");

    loop {
        let (tcp_stream, addr) = tokio::select! {
            accepted = listener.accept() => accepted?,
            _ = tokio::signal::ctrl_c() => {
                log!(logfile, "Shutting down");
                return Ok(());
            }
        };
        tcp_stream.set_nodelay(true)?;
        log!(logfile, "Client connected: {}", addr);

        let state = Arc::clone(&state);
        let model_path = config.server.model_path.clone();
        let logfile2 = Arc::clone(&logfile);
        let verbose = config.server.verbose;
        tokio::spawn(async move {
            match handle_connection(tcp_stream, state, model_path, Arc::clone(&logfile2), verbose)
                .await
            {
                Ok(()) => log!(logfile2, "Client disconnected: {}", addr),
                Err(e) => log!(logfile2, "Session error ({}): {}", addr, e),
            }
        });
    }
}
