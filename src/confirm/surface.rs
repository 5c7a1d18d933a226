//! Approval surface hosting.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::SurfaceError;

/// Screen rectangle of a host window, in logical pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bounds {
    pub left: i32,
    pub top: i32,
    pub width: u32,
    pub height: u32,
}

/// Opaque handle of an open surface, assigned by the host.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SurfaceHandle(pub String);

impl std::fmt::Display for SurfaceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where and how big the surface should be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurfaceSpec {
    pub url: String,
    pub width: u32,
    pub height: u32,
    /// Unset when the host reports no focused window.
    pub left: Option<i32>,
    pub top: Option<i32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurfaceGeometry {
    pub width: u32,
    pub height: u32,
    /// Extra outer size on hosts that draw Windows-style chrome.
    pub chrome_extra_width: u32,
    pub chrome_extra_height: u32,
    pub min_offset: i32,
}

impl Default for SurfaceGeometry {
    fn default() -> Self {
        Self {
            width: 380,
            height: 600,
            chrome_extra_width: 16,
            chrome_extra_height: 17,
            min_offset: 20,
        }
    }
}

impl SurfaceGeometry {
    /// Size and position for a surface centered on `focused`.
    pub fn place(&self, url: String, focused: Option<Bounds>, window_chrome: bool) -> SurfaceSpec {
        let (width, height) = if window_chrome {
            (
                self.width + self.chrome_extra_width,
                self.height + self.chrome_extra_height,
            )
        } else {
            (self.width, self.height)
        };

        let center = |origin: i32, outer: u32, inner: u32| -> i32 {
            let offset = (i64::from(outer) - i64::from(inner)) / 2;
            let pos = i64::from(origin) + offset;
            pos.clamp(i64::from(self.min_offset), i64::from(i32::MAX)) as i32
        };

        SurfaceSpec {
            url,
            width,
            height,
            left: focused.map(|b| center(b.left, b.width, width)),
            top: focused.map(|b| center(b.top, b.height, height)),
        }
    }
}

/// Host runtime able to show approval surfaces.
///
/// Hosts that detect a surface being dismissed report it back through
/// `ConfirmationOrchestrator::surface_closed`.
#[async_trait]
pub trait SurfaceHost: Send + Sync {
    async fn focused_bounds(&self) -> Option<Bounds>;

    /// Whether surfaces get Windows-style chrome added to their size.
    fn window_chrome(&self) -> bool {
        false
    }

    async fn open(&self, spec: SurfaceSpec) -> Result<SurfaceHandle, SurfaceError>;

    async fn close(&self, handle: &SurfaceHandle) -> Result<(), SurfaceError>;
}

/// Opens approval surfaces in the user's default browser.
///
/// Browsers neither expose window geometry nor allow closing a tab from the
/// outside. The surface page closes itself after its decision is answered,
/// and a dropped intercom socket is reported as the surface closing.
#[derive(Debug, Default, Clone, Copy)]
pub struct BrowserSurfaceHost;

#[async_trait]
impl SurfaceHost for BrowserSurfaceHost {
    async fn focused_bounds(&self) -> Option<Bounds> {
        None
    }

    fn window_chrome(&self) -> bool {
        cfg!(windows)
    }

    async fn open(&self, spec: SurfaceSpec) -> Result<SurfaceHandle, SurfaceError> {
        open::that_detached(&spec.url).map_err(|e| SurfaceError::OpenFailed(e.to_string()))?;
        info!(url = %spec.url, "Opened approval surface in browser");
        Ok(SurfaceHandle(spec.url))
    }

    async fn close(&self, handle: &SurfaceHandle) -> Result<(), SurfaceError> {
        debug!(surface = %handle, "Browser surface closes itself");
        Ok(())
    }
}
