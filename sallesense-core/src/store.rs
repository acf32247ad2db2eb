use async_trait::async_trait;
use chrono::{DateTime, Local};
use sqlx::{PgPool, Postgres, Transaction};

use crate::error::SalleSenseError;
use crate::models::{
    Event, Measurement, PhotoSummary, RecentEvent, RoomPhotoStats, Sensor, CAPTURE_EVENT_KIND,
};

/// One captured photo on its way to the store. Owns the image bytes.
#[derive(Debug, Clone)]
pub struct NewCapture {
    pub sensor_id: i32,
    pub room_id: i32,
    pub photo: Vec<u8>,
    pub captured_at: DateTime<Local>,
}

impl NewCapture {
    pub fn description(&self) -> String {
        format!("Photo captured at {}", self.captured_at.format("%H:%M:%S"))
    }
}

/// Identifiers assigned by the store to a committed capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureReceipt {
    pub measurement_id: i32,
    pub event_id: i32,
}

/// Persistence used by the capture loop.
#[async_trait]
pub trait CaptureStore: Send + Sync {
    /// Id of the first sensor with the given type tag, if any.
    async fn find_sensor_id(&self, sensor_type: &str) -> Result<Option<i32>, SalleSenseError>;

    /// Write the measurement row and its `CAPTURE` event as one unit of work.
    /// On error neither row is persisted.
    async fn record_capture(&self, capture: NewCapture) -> Result<CaptureReceipt, SalleSenseError>;
}

pub struct PgCaptureStore {
    pool: PgPool,
}

impl PgCaptureStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn find_sensor(&self, sensor_type: &str) -> Result<Option<Sensor>, SalleSenseError> {
        let sensor = sqlx::query_as::<_, Sensor>(
            "SELECT id_capteur, nom, type FROM capteur WHERE type = $1 ORDER BY id_capteur LIMIT 1",
        )
        .bind(sensor_type)
        .fetch_optional(&self.pool)
        .await?;
        Ok(sensor)
    }

    /// Insert a photo measurement without an event row.
    pub async fn insert_photo(
        &self,
        sensor_id: i32,
        room_id: i32,
        photo: &[u8],
    ) -> Result<i32, SalleSenseError> {
        let mut tx = self.pool.begin().await?;
        let id = insert_measurement(&mut tx, sensor_id, room_id, photo).await?;
        tx.commit().await?;
        Ok(id)
    }

    pub async fn fetch_measurement(&self, id: i32) -> Result<Option<Measurement>, SalleSenseError> {
        let row = sqlx::query_as::<_, Measurement>(
            r#"
            SELECT id_donnee, date_heure, id_capteur, mesure, photo_blob, no_salle
            FROM donnees
            WHERE id_donnee = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Photo bytes of a measurement. Missing rows and NULL or empty blobs give `None`.
    pub async fn fetch_photo(&self, id: i32) -> Result<Option<Vec<u8>>, SalleSenseError> {
        let row: Option<(Option<Vec<u8>>,)> =
            sqlx::query_as("SELECT photo_blob FROM donnees WHERE id_donnee = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.and_then(|(blob,)| blob).filter(|b| !b.is_empty()))
    }

    /// Photo metadata, newest first, optionally limited to one room.
    pub async fn list_photos(&self, room_id: Option<i32>) -> Result<Vec<PhotoSummary>, SalleSenseError> {
        let photos = sqlx::query_as::<_, PhotoSummary>(
            r#"
            SELECT id_donnee, date_heure, id_capteur, no_salle,
                   octet_length(photo_blob) AS size_bytes
            FROM donnees
            WHERE photo_blob IS NOT NULL
              AND octet_length(photo_blob) > 0
              AND ($1::int IS NULL OR no_salle = $1)
            ORDER BY date_heure DESC, id_donnee DESC
            "#,
        )
        .bind(room_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(photos)
    }

    pub async fn events_for_measurement(&self, id: i32) -> Result<Vec<Event>, SalleSenseError> {
        let events = sqlx::query_as::<_, Event>(
            "SELECT id_evenement, type, id_donnee, description FROM evenement WHERE id_donnee = $1 ORDER BY id_evenement",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;
        Ok(events)
    }

    /// Latest events across all rooms, newest measurement first.
    pub async fn recent_events(&self, limit: i64) -> Result<Vec<RecentEvent>, SalleSenseError> {
        let events = sqlx::query_as::<_, RecentEvent>(
            r#"
            SELECT e.id_evenement, e.type, e.description, e.id_donnee,
                   d.date_heure, d.no_salle, d.id_capteur
            FROM evenement e
            JOIN donnees d ON d.id_donnee = e.id_donnee
            ORDER BY d.date_heure DESC, e.id_evenement DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(events)
    }

    /// Photo counters for a room, or `None` when the room does not exist.
    pub async fn room_photo_stats(
        &self,
        room_id: i32,
    ) -> Result<Option<RoomPhotoStats>, SalleSenseError> {
        let stats = sqlx::query_as::<_, RoomPhotoStats>(
            r#"
            SELECT s.id_salle AS no_salle,
                   s.numero,
                   COUNT(d.id_donnee) AS photo_count,
                   COUNT(d.id_donnee) FILTER (WHERE d.date_heure >= now() - interval '7 days')
                       AS photos_last_7_days,
                   MAX(d.date_heure) AS last_capture
            FROM salle s
            LEFT JOIN donnees d
                   ON d.no_salle = s.id_salle
                  AND d.photo_blob IS NOT NULL
                  AND octet_length(d.photo_blob) > 0
            WHERE s.id_salle = $1
            GROUP BY s.id_salle, s.numero
            "#,
        )
        .bind(room_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(stats)
    }
}

#[async_trait]
impl CaptureStore for PgCaptureStore {
    async fn find_sensor_id(&self, sensor_type: &str) -> Result<Option<i32>, SalleSenseError> {
        Ok(self.find_sensor(sensor_type).await?.map(|s| s.id_capteur))
    }

    async fn record_capture(&self, capture: NewCapture) -> Result<CaptureReceipt, SalleSenseError> {
        // Fresh transaction per capture; never reused across cycles.
        let mut tx = self.pool.begin().await?;

        match insert_capture(&mut tx, &capture).await {
            Ok(receipt) => {
                tx.commit().await?;
                Ok(receipt)
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::warn!(error = %rollback_err, "Rollback after failed capture write failed");
                }
                Err(e)
            }
        }
    }
}

async fn insert_measurement(
    tx: &mut Transaction<'_, Postgres>,
    sensor_id: i32,
    room_id: i32,
    photo: &[u8],
) -> Result<i32, SalleSenseError> {
    let (id,): (i32,) = sqlx::query_as(
        r#"
        INSERT INTO donnees (date_heure, id_capteur, mesure, photo_blob, no_salle)
        VALUES (now(), $1, NULL, $2, $3)
        RETURNING id_donnee
        "#,
    )
    .bind(sensor_id)
    .bind(photo)
    .bind(room_id)
    .fetch_one(&mut **tx)
    .await?;
    Ok(id)
}

async fn insert_capture(
    tx: &mut Transaction<'_, Postgres>,
    capture: &NewCapture,
) -> Result<CaptureReceipt, SalleSenseError> {
    let measurement_id =
        insert_measurement(tx, capture.sensor_id, capture.room_id, &capture.photo).await?;

    let (event_id,): (i32,) = sqlx::query_as(
        r#"
        INSERT INTO evenement (type, id_donnee, description)
        VALUES ($1, $2, $3)
        RETURNING id_evenement
        "#,
    )
    .bind(CAPTURE_EVENT_KIND)
    .bind(measurement_id)
    .bind(capture.description())
    .fetch_one(&mut **tx)
    .await?;

    Ok(CaptureReceipt {
        measurement_id,
        event_id,
    })
}
