use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A row of `donnees`. Photo rows carry `photo_blob` and a NULL `mesure`.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Measurement {
    pub id_donnee: i32,
    pub date_heure: DateTime<Utc>,
    pub id_capteur: i32,
    pub mesure: Option<f64>,
    #[serde(skip)]
    pub photo_blob: Option<Vec<u8>>,
    pub no_salle: i32,
}

/// Photo metadata without the blob itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct PhotoSummary {
    pub id_donnee: i32,
    pub date_heure: DateTime<Utc>,
    pub id_capteur: i32,
    pub no_salle: i32,
    pub size_bytes: i32,
}

impl PhotoSummary {
    pub fn size_kb(&self) -> f64 {
        self.size_bytes as f64 / 1024.0
    }
}

/// Photo counters for one room. `last_capture` is `None` until the first photo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct RoomPhotoStats {
    pub no_salle: i32,
    pub numero: String,
    pub photo_count: i64,
    pub photos_last_7_days: i64,
    pub last_capture: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_kb() {
        let summary = PhotoSummary {
            id_donnee: 7,
            date_heure: Utc::now(),
            id_capteur: 1,
            no_salle: 2,
            size_bytes: 3072,
        };
        assert!((summary.size_kb() - 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_summary_serializes_without_blob_fields() {
        let summary = PhotoSummary {
            id_donnee: 7,
            date_heure: Utc::now(),
            id_capteur: 1,
            no_salle: 2,
            size_bytes: 10,
        };
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["id_donnee"], 7);
        assert_eq!(json["size_bytes"], 10);
        assert!(json.get("photo_blob").is_none());
    }
}
