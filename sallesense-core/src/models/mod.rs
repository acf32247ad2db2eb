pub mod event;
pub mod measurement;
pub mod sensor;

pub use event::{Event, RecentEvent, CAPTURE_EVENT_KIND};
pub use measurement::{Measurement, PhotoSummary, RoomPhotoStats};
pub use sensor::Sensor;
