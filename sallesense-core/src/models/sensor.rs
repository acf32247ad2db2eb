use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Sensor {
    pub id_capteur: i32,
    pub nom: String,
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub sensor_type: String,
}
