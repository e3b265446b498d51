//! Command-line client for avatar sessions
//!
//! Connects to an avatar service, reports the session lifecycle on the
//! console and tears the session down on Ctrl-C, on a remote hang-up or after
//! `--duration` seconds.

mod config;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use avatar_rtc_client_core::recovery::{retry_with_backoff, RetryConfig};
use avatar_rtc_client_core::{CallbackSet, SessionEvent, SessionManager};

use crate::config::Overrides;

const DEFAULT_LOG_FILTER: &str = "avatar_rtc_client_core=info,avatar_rtc=info";

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to a TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Full URL the offer is posted to
    #[arg(long, env = "AVATAR_RTC_SIGNALING_URL")]
    signaling_url: Option<String>,

    /// Service base URL; `/offer` is appended
    #[arg(short, long, env = "AVATAR_RTC_BASE_URL")]
    base_url: Option<String>,

    /// Candidate-discovery wait in milliseconds
    #[arg(long)]
    ice_timeout_ms: Option<u64>,

    /// Signaling request timeout in milliseconds
    #[arg(long)]
    signaling_timeout_ms: Option<u64>,

    /// Fail when the service does not assign a session id
    #[arg(long)]
    require_session_id: bool,

    /// Also send local microphone and camera
    #[arg(long)]
    capture: bool,

    /// Skip the audio loudness policies
    #[arg(long)]
    no_audio_enhancement: bool,

    /// Extra connect attempts after a recoverable failure
    #[arg(short, long, default_value = "0")]
    retries: u32,

    /// Disconnect after this many seconds (0 = run until Ctrl-C)
    #[arg(short, long, default_value = "0")]
    duration: u64,

    /// Log filter, used when RUST_LOG is unset
    #[arg(long, default_value = DEFAULT_LOG_FILTER)]
    log_level: String,

    /// Print the resolved configuration as TOML and exit
    #[arg(long)]
    print_config: bool,
}

impl Args {
    fn overrides(&self) -> Overrides {
        Overrides {
            signaling_url: self.signaling_url.clone(),
            base_url: self.base_url.clone(),
            ice_gathering_timeout_ms: self.ice_timeout_ms,
            signaling_timeout_ms: self.signaling_timeout_ms,
            require_session_id: self.require_session_id,
            capture_local_media: self.capture,
            disable_audio_enhancement: self.no_audio_enhancement,
        }
    }
}

fn init_logging(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

fn console_handler() -> CallbackSet {
    CallbackSet::new()
        .on_connection_state_change(|state, connected| {
            info!("🔄 Connection state: {} (connected: {})", state, connected);
        })
        .on_remote_stream_update(|kind, stream| {
            info!("🎬 Remote {} stream {} ({} tracks)", kind, stream.id(), stream.track_count());
        })
        .on_session_id_received(|session_id| {
            info!("🆔 Session id: {}", session_id);
        })
        .on_error(|e| {
            error!("❌ Session error [{}]: {}", e.category(), e);
        })
}

/// Resolve once the live session has ended on its own
async fn session_ended(manager: &SessionManager) {
    let mut events = manager.subscribe_events();
    if manager.state().is_none() {
        return;
    }
    loop {
        match events.recv().await {
            Ok(SessionEvent::ConnectionStateChanged { info }) if info.state.is_terminal() => return,
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => warn!(skipped, "Event listener lagged"),
            Err(RecvError::Closed) => return,
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let config = config::load(args.config.as_deref(), &args.overrides())?;
    if args.print_config {
        print!("{}", config::to_toml(&config)?);
        return Ok(());
    }

    info!("🚀 Connecting to {}", config.signaling_url);
    let manager = SessionManager::builder().config(config).build()?;
    manager.initialize(Arc::new(console_handler())).await;

    let retry = RetryConfig::default().with_max_attempts(args.retries.saturating_add(1));
    let connected = retry_with_backoff("connect", retry, || {
        let manager = manager.clone();
        async move { manager.try_connect().await }
    })
    .await;

    if let Err(e) = connected {
        manager.cleanup().await;
        return Err(e.into());
    }
    info!("✅ Negotiation complete, waiting for media");

    let deadline = async {
        if args.duration == 0 {
            std::future::pending::<()>().await;
        }
        tokio::time::sleep(Duration::from_secs(args.duration)).await;
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("🛑 Interrupted"),
        _ = deadline => info!("⏱️ Duration elapsed"),
        _ = session_ended(&manager) => info!("📴 Session ended by the remote side"),
    }

    manager.cleanup().await;
    info!("👋 Done");
    Ok(())
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logging(&args.log_level);

    if let Err(e) = run(args).await {
        eprintln!("❌ Error: {:#}", e);
        std::process::exit(1);
    }
}
