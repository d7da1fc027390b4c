//! Coach server: receives keypoint frames over TCP, runs one coaching session
//! per connection and streams the live state back.

use std::fs::File;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use tokio::net::{TcpListener, TcpStream};
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use form_coach::config::Config;
use form_coach::protocol::{self, ClientMessage, ServerMessage};
use form_coach::session::{CoachSession, PoseFrame};
use form_coach::pose::Pose;

const DEFAULT_CONFIG_PATH: &str = "config.toml";

// ===========================================================================
// Logging
// ===========================================================================

/// Log to stderr and to a timestamped file under `log_dir`
fn init_logging(log_dir: &str) -> Result<String> {
    std::fs::create_dir_all(log_dir).with_context(|| format!("failed to create {}", log_dir))?;
    let ts = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let path = Path::new(log_dir).join(format!("coach_{}.log", ts));
    let file = File::create(&path).with_context(|| format!("failed to create {}", path.display()))?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        .init();
    Ok(path.display().to_string())
}

// ===========================================================================
// Per-connection dispatch
// ===========================================================================

struct Connection {
    config: Arc<Config>,
    session: Option<CoachSession>,
}

impl Connection {
    fn new(config: Arc<Config>) -> Self {
        Self { config, session: None }
    }

    /// Apply one client message. Every failure becomes an `Error` reply.
    fn handle(&mut self, msg: ClientMessage) -> Option<ServerMessage> {
        match msg {
            ClientMessage::StartSession { mode } => match CoachSession::new(&self.config, mode) {
                Ok(session) => {
                    info!("Session started: {}", mode);
                    self.session = Some(session);
                    Some(ServerMessage::SessionStarted { mode })
                }
                Err(e) => Some(ServerMessage::error(e.to_string())),
            },
            ClientMessage::Frame { timestamp_ms, keypoints, jpeg } => {
                let Some(session) = self.session.as_mut() else {
                    return Some(ServerMessage::error("no active session"));
                };
                let Some(pose) = Pose::from_slice(&keypoints) else {
                    return Some(ServerMessage::error(format!(
                        "expected 33 keypoints, got {}",
                        keypoints.len()
                    )));
                };
                let frame = PoseFrame { timestamp_ms, pose, jpeg };
                Some(ServerMessage::State(session.process_frame(&frame).clone()))
            }
            ClientMessage::SetMode { mode } => {
                let Some(session) = self.session.as_mut() else {
                    return Some(ServerMessage::error("no active session"));
                };
                session.set_mode(mode);
                Some(ServerMessage::SessionStarted { mode })
            }
            ClientMessage::Reset => {
                let Some(session) = self.session.as_mut() else {
                    return Some(ServerMessage::error("no active session"));
                };
                session.reset();
                Some(ServerMessage::State(session.live_state().clone()))
            }
            ClientMessage::Diagnose { view } => {
                let report = self.session.as_ref().and_then(|s| s.diagnose(view));
                Some(match report {
                    Some(report) => ServerMessage::Diagnosis(report),
                    None => ServerMessage::error("no pose received yet"),
                })
            }
            ClientMessage::StopSession => {
                if let Some(mut session) = self.session.take() {
                    session.stop();
                }
                None
            }
        }
    }
}

async fn serve_connection(stream: TcpStream, config: Arc<Config>) -> Result<()> {
    let mut framed = protocol::message_stream(stream);
    let mut conn = Connection::new(config);

    while let Some(msg) = protocol::recv_message::<_, ClientMessage>(&mut framed).await? {
        if let Some(reply) = conn.handle(msg) {
            protocol::send_message(&mut framed, &reply).await?;
        }
    }
    if let Some(mut session) = conn.session.take() {
        session.stop();
    }
    Ok(())
}

// ===========================================================================
// Main
// ===========================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args().nth(1).unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let config = Config::load_or_default(&config_path);
    let log_path = init_logging(&config.server.log_dir)?;
    config.validate().context("invalid configuration")?;

    info!("Coach server ({})", env!("COACH_BUILD_VERSION"));
    info!("Log: {}", log_path);
    info!("Config: {}", config_path);
    if config.escalation.enabled {
        info!("Remote analysis: {}{}", config.escalation.base_url, config.escalation.analyze_path);
    }

    let bind_addr: SocketAddr = config.server.listen_addr.parse().context("invalid listen_addr")?;
    let listener = TcpListener::bind(bind_addr).await?;
    info!("Listening on {}", bind_addr);

    let config = Arc::new(config);
    loop {
        let (stream, addr) = listener.accept().await?;
        stream.set_nodelay(true)?;
        info!("Client connected: {}", addr);

        let config = Arc::clone(&config);
        tokio::spawn(async move {
            match serve_connection(stream, config).await {
                Ok(()) => info!("Client disconnected: {}", addr),
                Err(e) => warn!("Connection {} closed: {:#}", addr, e),
            }
        });
    }
}
