//! Host platform seams
//!
//! Runtime permissions and local capture are owned by the host OS. The
//! session core only asks through these traits; desktop builds, which have
//! no runtime permission model, use the permissive defaults.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::MediaConstraints;
use crate::error::SessionResult;
use crate::media::LocalMedia;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaPermission {
    Camera,
    Microphone,
}

impl fmt::Display for MediaPermission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaPermission::Camera => f.write_str("camera"),
            MediaPermission::Microphone => f.write_str("microphone"),
        }
    }
}

/// Outcome of one permission prompt
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermissionGrant {
    pub denied: Vec<MediaPermission>,
}

impl PermissionGrant {
    pub fn granted() -> Self {
        Self::default()
    }

    pub fn denied(denied: Vec<MediaPermission>) -> Self {
        Self { denied }
    }

    /// All requested permissions must be granted
    pub fn is_granted(&self) -> bool {
        self.denied.is_empty()
    }
}

#[async_trait]
pub trait PermissionProvider: Send + Sync {
    /// Request every permission in `permissions`.
    ///
    /// An `Err` is treated by the session exactly like a denial.
    async fn request(&self, permissions: &[MediaPermission]) -> SessionResult<PermissionGrant>;
}

/// Grants everything; for platforms without runtime permissions
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAllPermissions;

#[async_trait]
impl PermissionProvider for AllowAllPermissions {
    async fn request(&self, _permissions: &[MediaPermission]) -> SessionResult<PermissionGrant> {
        Ok(PermissionGrant::granted())
    }
}

/// Local capture device access
#[async_trait]
pub trait MediaSource: Send + Sync {
    /// Open capture devices matching `constraints`
    async fn acquire(&self, constraints: &MediaConstraints) -> SessionResult<LocalMedia>;
}

/// Captures nothing; receive-only sessions
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCaptureSource;

#[async_trait]
impl MediaSource for NoCaptureSource {
    async fn acquire(&self, _constraints: &MediaConstraints) -> SessionResult<LocalMedia> {
        Ok(LocalMedia::empty())
    }
}
