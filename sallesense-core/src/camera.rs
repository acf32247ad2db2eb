//! Camera capability for the capture loop.
//!
//! Provides a `Camera` trait with implementations for:
//! - **rpicam** — Raspberry Pi camera through the `rpicam-still` program
//! - **directory** — replays image files from a directory (no hardware needed)

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::CameraConfig;
use crate::image_format;

// ============================================================================
// Camera trait
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Abstraction over still-image sources.
///
/// Lifecycle: `configure` → `start` → `capture_still`* → `stop` → `close`.
/// The returned bytes are an encoded still image and are treated as opaque.
#[async_trait]
pub trait Camera: Send {
    async fn configure(&mut self, resolution: Resolution, buffer_count: u32)
        -> Result<(), CameraError>;

    async fn start(&mut self) -> Result<(), CameraError>;

    /// Capture one encoded still image into memory.
    async fn capture_still(&mut self) -> Result<Vec<u8>, CameraError>;

    async fn stop(&mut self) -> Result<(), CameraError>;

    async fn close(&mut self) -> Result<(), CameraError>;

    /// Backend name for logging.
    fn name(&self) -> &str;
}

// ============================================================================
// Error types
// ============================================================================

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("Camera used before configure()")]
    NotConfigured,

    #[error("Camera not started")]
    NotStarted,

    #[error("No camera detected: {0}")]
    NoCameraDetected(String),

    #[error("Failed to run {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{command} exited with status {code:?}: {stderr}")]
    ExitStatus {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("Capture timed out after {0:?}")]
    Timeout(Duration),

    #[error("Camera returned an empty image")]
    EmptyImage,

    #[error("No images found in {0}")]
    NoImages(String),

    #[error("Unknown camera backend '{0}' (expected 'rpicam' or 'directory')")]
    UnknownBackend(String),

    #[error("Invalid camera config: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

// ============================================================================
// Backend factory
// ============================================================================

/// Configuration union for the camera factory.
#[derive(Debug, Clone)]
pub enum CameraBackend {
    Rpicam { command: String, timeout: Duration },
    Directory { path: PathBuf },
}

impl CameraBackend {
    pub fn from_config(config: &CameraConfig) -> Result<Self, CameraError> {
        match config.backend.as_str() {
            "rpicam" => {
                if config.command.trim().is_empty() {
                    return Err(CameraError::InvalidConfig(
                        "camera.command must not be empty".to_string(),
                    ));
                }
                Ok(CameraBackend::Rpicam {
                    command: config.command.clone(),
                    timeout: Duration::from_secs(config.capture_timeout_seconds),
                })
            }
            "directory" => {
                let path = config.directory.as_ref().ok_or_else(|| {
                    CameraError::InvalidConfig(
                        "camera.directory is required for the directory backend".to_string(),
                    )
                })?;
                Ok(CameraBackend::Directory {
                    path: PathBuf::from(path),
                })
            }
            other => Err(CameraError::UnknownBackend(other.to_string())),
        }
    }
}

/// Create the camera for a backend. Nothing touches the device until `configure`/`start`.
pub fn create_camera(backend: CameraBackend) -> Box<dyn Camera> {
    match backend {
        CameraBackend::Rpicam { command, timeout } => {
            Box::new(crate::rpicam::RpicamCamera::new(&command, timeout))
        }
        CameraBackend::Directory { path } => Box::new(DirectoryCamera::new(path)),
    }
}

// ============================================================================
// DirectoryCamera
// ============================================================================

/// Serves the photo files of a directory in sorted order, wrapping around at the end.
pub struct DirectoryCamera {
    dir: PathBuf,
    files: Vec<PathBuf>,
    next: usize,
    configured: bool,
    started: bool,
}

impl DirectoryCamera {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            files: Vec::new(),
            next: 0,
            configured: false,
            started: false,
        }
    }
}

#[async_trait]
impl Camera for DirectoryCamera {
    async fn configure(
        &mut self,
        resolution: Resolution,
        buffer_count: u32,
    ) -> Result<(), CameraError> {
        // Files are served as-is; resolution only matters to real hardware.
        tracing::debug!(
            dir = %self.dir.display(),
            %resolution,
            buffer_count,
            "Directory camera configured"
        );
        self.configured = true;
        Ok(())
    }

    async fn start(&mut self) -> Result<(), CameraError> {
        if !self.configured {
            return Err(CameraError::NotConfigured);
        }
        let files = image_format::list_photo_files(&self.dir)?;
        if files.is_empty() {
            return Err(CameraError::NoImages(self.dir.display().to_string()));
        }
        tracing::info!(
            dir = %self.dir.display(),
            images = files.len(),
            "Directory camera started"
        );
        self.files = files;
        self.next = 0;
        self.started = true;
        Ok(())
    }

    async fn capture_still(&mut self) -> Result<Vec<u8>, CameraError> {
        if !self.started {
            return Err(CameraError::NotStarted);
        }
        let path = &self.files[self.next];
        self.next = (self.next + 1) % self.files.len();

        let bytes = tokio::fs::read(path).await?;
        if bytes.is_empty() {
            return Err(CameraError::EmptyImage);
        }
        Ok(bytes)
    }

    async fn stop(&mut self) -> Result<(), CameraError> {
        self.started = false;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), CameraError> {
        self.started = false;
        self.configured = false;
        self.files.clear();
        Ok(())
    }

    fn name(&self) -> &str {
        "directory"
    }
}

// ============================================================================
// TESTS
// ============================================================================
