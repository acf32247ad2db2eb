//! Raspberry Pi camera backend.
//!
//! Runs `rpicam-still` once per capture and reads the JPEG from its stdout,
//! so no intermediate file is written. The camera is probed with
//! `--list-cameras` on `start()`.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use crate::camera::{Camera, CameraError, Resolution};

pub struct RpicamCamera {
    program: String,
    base_args: Vec<String>,
    timeout: Duration,
    settings: Option<(Resolution, u32)>,
    started: bool,
}

impl RpicamCamera {
    /// `command` may carry leading arguments, e.g. `"sudo rpicam-still"`.
    pub fn new(command: &str, timeout: Duration) -> Self {
        let mut parts = command.split_whitespace().map(str::to_string);
        let program = parts.next().unwrap_or_else(|| "rpicam-still".to_string());
        Self {
            program,
            base_args: parts.collect(),
            timeout,
            settings: None,
            started: false,
        }
    }

    fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.base_args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    async fn run(&self, args: &[String]) -> Result<std::process::Output, CameraError> {
        let child = Command::new(&self.program)
            .args(&self.base_args)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| CameraError::Spawn {
                command: self.command_line(),
                source,
            })?;

        match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(output) => Ok(output?),
            Err(_) => Err(CameraError::Timeout(self.timeout)),
        }
    }
}

/// Arguments for one in-memory JPEG still.
pub fn still_args(resolution: Resolution, buffer_count: u32) -> Vec<String> {
    vec![
        "--width".to_string(),
        resolution.width.to_string(),
        "--height".to_string(),
        resolution.height.to_string(),
        "--buffer-count".to_string(),
        buffer_count.to_string(),
        "--encoding".to_string(),
        "jpg".to_string(),
        "--nopreview".to_string(),
        "--immediate".to_string(),
        "--output".to_string(),
        "-".to_string(),
    ]
}

/// `--list-cameras` prints a numbered list, or "No cameras available!".
fn cameras_listed(output: &str) -> bool {
    !output.contains("No cameras available")
        && output
            .lines()
            .any(|l| l.trim_start().starts_with("0 :") || l.contains("Available cameras"))
}

#[async_trait]
impl Camera for RpicamCamera {
    async fn configure(
        &mut self,
        resolution: Resolution,
        buffer_count: u32,
    ) -> Result<(), CameraError> {
        if resolution.width == 0 || resolution.height == 0 {
            return Err(CameraError::InvalidConfig(format!(
                "resolution must be non-zero, got {}",
                resolution
            )));
        }
        self.settings = Some((resolution, buffer_count));
        Ok(())
    }

    async fn start(&mut self) -> Result<(), CameraError> {
        let (resolution, _) = self.settings.ok_or(CameraError::NotConfigured)?;

        let output = self.run(&["--list-cameras".to_string()]).await?;
        let listing = format!(
            "{}{}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        );

        if !output.status.success() || !cameras_listed(&listing) {
            return Err(CameraError::NoCameraDetected(listing.trim().to_string()));
        }

        tracing::info!(command = %self.command_line(), %resolution, "Pi camera started");
        self.started = true;
        Ok(())
    }

    async fn capture_still(&mut self) -> Result<Vec<u8>, CameraError> {
        if !self.started {
            return Err(CameraError::NotStarted);
        }
        let (resolution, buffer_count) = self.settings.ok_or(CameraError::NotConfigured)?;

        let output = self.run(&still_args(resolution, buffer_count)).await?;
        if !output.status.success() {
            return Err(CameraError::ExitStatus {
                command: self.command_line(),
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        if output.stdout.is_empty() {
            return Err(CameraError::EmptyImage);
        }
        Ok(output.stdout)
    }

    async fn stop(&mut self) -> Result<(), CameraError> {
        self.started = false;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), CameraError> {
        self.started = false;
        self.settings = None;
        Ok(())
    }

    fn name(&self) -> &str {
        "rpicam"
    }
}
