pub mod camera;
pub mod config;
pub mod db;
pub mod error;
pub mod image_format;
pub mod models;
pub mod rpicam;
pub mod store;

pub use camera::{create_camera, Camera, CameraBackend, CameraError, DirectoryCamera, Resolution};
pub use config::SalleSenseConfig;
pub use error::SalleSenseError;
pub use image_format::ImageFormat;
pub use rpicam::RpicamCamera;
pub use store::{CaptureReceipt, CaptureStore, NewCapture, PgCaptureStore};
