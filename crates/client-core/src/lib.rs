//! Avatar-rtc client core: receive-only WebRTC sessions for digital human clients
//!
//! A client offers to receive audio and video from a remote avatar service,
//! exchanges descriptions with it over one HTTP round trip, and hands the
//! resulting per-kind media streams to the host for rendering.
//!
//! ## Layering
//! ```text
//! SessionManager -> {PeerConnectionController -> MediaEngine, SignalingTransport, AudioOutputEnhancer}
//! ```
//!
//! The crate focuses on:
//! - One negotiation per `connect`, with a bounded candidate-discovery wait
//! - Demultiplexing remote tracks into one stream per media kind
//! - Best-effort audio loudness policies once the session is connected
//! - Typed events for UI integration
//!
//! Rendering, capture devices and runtime permissions belong to the host and
//! are reached through the traits in [`platform`] and [`audio`].
//!
//! ## Example
//! ```rust,no_run
//! use std::sync::Arc;
//! use avatar_rtc_client_core::{CallbackSet, SessionConfig, SessionManager};
//!
//! # async fn run() -> avatar_rtc_client_core::SessionResult<()> {
//! let manager = SessionManager::builder()
//!     .config(SessionConfig::receive_only().with_base_url("http://127.0.0.1:8010"))
//!     .build()?;
//!
//! manager
//!     .initialize(Arc::new(CallbackSet::new().on_remote_stream_update(|kind, stream| {
//!         println!("{} stream {} ready", kind, stream.id());
//!     })))
//!     .await;
//!
//! if manager.connect().await {
//!     println!("session {:?}", manager.session_id());
//! }
//! manager.cleanup().await;
//! # Ok(())
//! # }
//! ```

pub mod audio;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod manager;
pub mod media;
pub mod peer;
pub mod platform;
pub mod recovery;
pub mod signaling;

pub use audio::{AudioOutputEnhancer, AudioPlatform, EnhancementReport, GainProcessor};
pub use config::{AudioEnhancementConfig, IceServerConfig, MediaConstraints, SessionConfig};
pub use engine::{MediaEngine, PeerConnection, SessionDescription};
pub use error::{SessionError, SessionResult};
pub use events::{CallbackSet, ConnectionStateInfo, RemoteStreamInfo, SessionEvent, SessionEventHandler};
pub use manager::{SessionManager, SessionManagerBuilder, SessionSnapshot};
pub use media::{AggregateStream, MediaKind, MediaTrack};
pub use peer::ControllerState;
pub use signaling::{HttpSignalingClient, SignalingTransport};

/// Client-core version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
