//! Capture-and-persist loop
//!
//! Every `interval`: take one still from the camera, then write it as a
//! measurement row plus a `CAPTURE` event row in a single transaction.
//! A failed cycle is logged and skipped; only startup failures are fatal.
//!
//! States: Uninitialized → Ready → Capturing → Released. Released is terminal
//! and is also reached when startup fails.

use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use sallesense_core::config::CaptureConfig;
use sallesense_core::{
    Camera, CameraError, CaptureReceipt, CaptureStore, NewCapture, Resolution, SalleSenseError,
};
use thiserror::Error;
use tokio::sync::broadcast::{self, error::TryRecvError};

// ============================================================================
// PUBLIC API
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Uninitialized,
    Ready,
    Capturing,
    Released,
}

/// Immutable loop parameters, fixed at startup.
#[derive(Debug, Clone)]
pub struct CaptureSettings {
    pub room_id: i32,
    pub interval: Duration,
    pub settle_delay: Duration,
    pub sensor_type: String,
    pub resolution: Resolution,
    pub buffer_count: u32,
}

impl From<&CaptureConfig> for CaptureSettings {
    fn from(config: &CaptureConfig) -> Self {
        Self {
            room_id: config.room_id,
            interval: config.interval(),
            settle_delay: config.settle_delay(),
            sensor_type: config.sensor_type.clone(),
            resolution: Resolution {
                width: config.width,
                height: config.height,
            },
            buffer_count: config.buffer_count,
        }
    }
}

#[derive(Error, Debug)]
pub enum StartupError {
    #[error("Sensor lookup failed: {0}")]
    SensorLookup(#[source] SalleSenseError),

    #[error("No sensor of type '{0}' found")]
    SensorNotFound(String),

    #[error("Camera initialisation failed: {0}")]
    Camera(#[source] CameraError),
}

/// Result of a single acquire → persist cycle.
#[derive(Debug)]
pub enum CycleOutcome {
    Stored {
        receipt: CaptureReceipt,
        size_bytes: usize,
        count: u64,
    },
    CaptureFailed(CameraError),
    PersistFailed(SalleSenseError),
}

/// Running totals. `photos_captured` only counts committed writes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaptureReport {
    pub cycles: u64,
    pub photos_captured: u64,
    pub capture_failures: u64,
    pub persist_failures: u64,
}

pub struct CaptureLoop {
    camera: Box<dyn Camera>,
    store: Arc<dyn CaptureStore>,
    settings: CaptureSettings,
    sensor_id: Option<i32>,
    state: LoopState,
    report: CaptureReport,
}

impl CaptureLoop {
    pub fn new(
        camera: Box<dyn Camera>,
        store: Arc<dyn CaptureStore>,
        settings: CaptureSettings,
    ) -> Self {
        Self {
            camera,
            store,
            settings,
            sensor_id: None,
            state: LoopState::Uninitialized,
            report: CaptureReport::default(),
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn report(&self) -> &CaptureReport {
        &self.report
    }

    pub fn sensor_id(&self) -> Option<i32> {
        self.sensor_id
    }

    /// Resolve the camera sensor, then configure and start the camera.
    /// On failure the camera is released and the loop ends up `Released`.
    pub async fn setup(&mut self) -> Result<(), StartupError> {
        if self.state != LoopState::Uninitialized {
            tracing::warn!(state = ?self.state, "setup() called twice; ignoring");
            return Ok(());
        }

        let result = self.try_setup().await;
        if result.is_err() {
            self.release().await;
        }
        result
    }

    async fn try_setup(&mut self) -> Result<(), StartupError> {
        let sensor_type = self.settings.sensor_type.clone();
        let sensor_id = self
            .store
            .find_sensor_id(&sensor_type)
            .await
            .map_err(StartupError::SensorLookup)?
            .ok_or_else(|| StartupError::SensorNotFound(sensor_type.clone()))?;
        self.sensor_id = Some(sensor_id);
        tracing::info!(sensor_id, "Camera sensor found");

        self.camera
            .configure(self.settings.resolution, self.settings.buffer_count)
            .await
            .map_err(StartupError::Camera)?;
        self.camera.start().await.map_err(StartupError::Camera)?;

        tracing::info!(
            camera = self.camera.name(),
            resolution = %self.settings.resolution,
            settle_ms = self.settings.settle_delay.as_millis() as u64,
            "Camera started, waiting for exposure to settle"
        );
        tokio::time::sleep(self.settings.settle_delay).await;

        self.state = LoopState::Ready;
        Ok(())
    }

    /// One acquire → persist cycle. Never returns an error; the outcome says what happened.
    pub async fn run_cycle(&mut self) -> CycleOutcome {
        self.report.cycles += 1;

        let sensor_id = match self.sensor_id {
            Some(id) if matches!(self.state, LoopState::Ready | LoopState::Capturing) => id,
            _ => {
                self.report.capture_failures += 1;
                return CycleOutcome::CaptureFailed(CameraError::NotStarted);
            }
        };

        let photo = match self.camera.capture_still().await {
            Ok(bytes) if bytes.is_empty() => {
                self.report.capture_failures += 1;
                tracing::warn!("Capture returned no bytes; skipping cycle");
                return CycleOutcome::CaptureFailed(CameraError::EmptyImage);
            }
            Ok(bytes) => bytes,
            Err(e) => {
                self.report.capture_failures += 1;
                tracing::warn!(error = %e, "Capture failed; skipping cycle");
                return CycleOutcome::CaptureFailed(e);
            }
        };

        let size_bytes = photo.len();
        let capture = NewCapture {
            sensor_id,
            room_id: self.settings.room_id,
            photo,
            captured_at: Local::now(),
        };

        match self.store.record_capture(capture).await {
            Ok(receipt) => {
                self.report.photos_captured += 1;
                tracing::info!(
                    photo = self.report.photos_captured,
                    size_kb = format!("{:.1}", size_bytes as f64 / 1024.0),
                    id = receipt.measurement_id,
                    "Photo stored"
                );
                CycleOutcome::Stored {
                    receipt,
                    size_bytes,
                    count: self.report.photos_captured,
                }
            }
            Err(e) => {
                self.report.persist_failures += 1;
                tracing::error!(error = %e, "Failed to store photo; transaction rolled back");
                CycleOutcome::PersistFailed(e)
            }
        }
    }

    /// Capture every `interval` until a shutdown message arrives.
    ///
    /// Shutdown is checked between cycles and during the sleep; a cycle in
    /// progress always completes.
    pub async fn run(&mut self, mut shutdown: broadcast::Receiver<()>) -> CaptureReport {
        if self.state != LoopState::Ready {
            tracing::error!(state = ?self.state, "Capture loop not ready; not starting");
            return self.report.clone();
        }
        self.state = LoopState::Capturing;

        tracing::info!(
            interval_s = self.settings.interval.as_secs_f64(),
            room = self.settings.room_id,
            "Capture loop started"
        );

        loop {
            match shutdown.try_recv() {
                Err(TryRecvError::Empty) => {}
                _ => {
                    tracing::info!("Capture loop shutting down");
                    break;
                }
            }

            self.run_cycle().await;

            tokio::select! {
                _ = tokio::time::sleep(self.settings.interval) => {}
                _ = shutdown.recv() => {
                    tracing::info!("Capture loop shutting down");
                    break;
                }
            }
        }

        self.report.clone()
    }

    /// Stop and close the camera. Failures are logged and swallowed.
    pub async fn release(&mut self) -> CaptureReport {
        if self.state == LoopState::Released {
            return self.report.clone();
        }

        if let Err(e) = self.camera.stop().await {
            tracing::debug!(error = %e, "Camera stop failed during release");
        }
        if let Err(e) = self.camera.close().await {
            tracing::debug!(error = %e, "Camera close failed during release");
        }
        self.state = LoopState::Released;

        tracing::info!(
            photos = self.report.photos_captured,
            "Camera released"
        );
        self.report.clone()
    }
}

// ============================================================================
// TESTS
// ============================================================================
