//! Shared Postgres fixtures. Tests skip when SALLESENSE_TEST_DATABASE_URL is unset.
#![allow(dead_code)]

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

pub const TEST_DB_ENV: &str = "SALLESENSE_TEST_DATABASE_URL";

/// Connect and run the migrations, or `None` when no test database is configured.
pub async fn test_pool() -> Option<PgPool> {
    let url = std::env::var(TEST_DB_ENV).ok()?;
    let pool = PgPoolOptions::new()
        .max_connections(4)
        .connect(&url)
        .await
        .expect("SALLESENSE_TEST_DATABASE_URL is set but the database is unreachable");
    sallesense_core::db::run_migrations(&pool)
        .await
        .expect("failed to apply migrations to the test database");
    Some(pool)
}

/// A room and a camera sensor owned by one test.
pub struct Fixture {
    pub room_id: i32,
    pub sensor_id: i32,
    pub sensor_type: String,
}

/// `label` must be short; it ends up in VARCHAR(40) columns with a pid suffix.
pub async fn seed(pool: &PgPool, label: &str) -> Fixture {
    let tag = format!("{}-{}", label, std::process::id());

    let (room_id,): (i32,) = sqlx::query_as(
        "INSERT INTO salle (numero, capacite_maximale) VALUES ($1, 30) RETURNING id_salle",
    )
    .bind(&tag)
    .fetch_one(pool)
    .await
    .unwrap();

    let sensor_type = format!("CAM-{}", tag);
    let (sensor_id,): (i32,) =
        sqlx::query_as("INSERT INTO capteur (nom, type) VALUES ($1, $2) RETURNING id_capteur")
            .bind(format!("camera {}", tag))
            .bind(&sensor_type)
            .fetch_one(pool)
            .await
            .unwrap();

    Fixture {
        room_id,
        sensor_id,
        sensor_type,
    }
}

pub async fn count_rows(pool: &PgPool, room_id: i32) -> (i64, i64) {
    let (measurements,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM donnees WHERE no_salle = $1")
            .bind(room_id)
            .fetch_one(pool)
            .await
            .unwrap();
    let (events,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM evenement e JOIN donnees d ON d.id_donnee = e.id_donnee WHERE d.no_salle = $1",
    )
    .bind(room_id)
    .fetch_one(pool)
    .await
    .unwrap();
    (measurements, events)
}

pub async fn cleanup(pool: &PgPool, fixture: &Fixture) {
    sqlx::query(
        "DELETE FROM evenement WHERE id_donnee IN (SELECT id_donnee FROM donnees WHERE no_salle = $1)",
    )
    .bind(fixture.room_id)
    .execute(pool)
    .await
    .ok();
    sqlx::query("DELETE FROM donnees WHERE no_salle = $1")
        .bind(fixture.room_id)
        .execute(pool)
        .await
        .ok();
    sqlx::query("DELETE FROM capteur WHERE id_capteur = $1")
        .bind(fixture.sensor_id)
        .execute(pool)
        .await
        .ok();
    sqlx::query("DELETE FROM salle WHERE id_salle = $1")
        .bind(fixture.room_id)
        .execute(pool)
        .await
        .ok();
}

pub const PNG_BYTES: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 1, 2, 3];
pub const JPEG_BYTES: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0, 0x10, b'J', b'F', b'I', b'F', 0xFF, 0xD9];
