use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind tag of the event written alongside every captured photo.
pub const CAPTURE_EVENT_KIND: &str = "CAPTURE";

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Event {
    pub id_evenement: i32,
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub event_type: String,
    pub id_donnee: i32,
    pub description: Option<String>,
}

/// An event joined to the measurement it refers to.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct RecentEvent {
    pub id_evenement: i32,
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub event_type: String,
    pub description: Option<String>,
    pub id_donnee: i32,
    pub date_heure: DateTime<Utc>,
    pub no_salle: i32,
    pub id_capteur: i32,
}
