use chrono::{DateTime, Utc};
use chrono_tz::{America::Halifax, Tz};
use serde::{Deserialize, Deserializer, Serialize, de::Error as _};

use super::bus::Bus;

/// Body of `GET /hrmbuses`. A JSON rendition of a GTFS-realtime vehicle feed.
#[derive(Debug, Deserialize, Serialize)]
pub struct HrmBusResponse {
    pub header: HrmHeader,
    #[serde(default)]
    pub entity: Vec<HrmEntity>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HrmHeader {
    pub gtfs_realtime_version: String,
    /// Seconds since the unix epoch. The feed sends it as a string.
    #[serde(default, deserialize_with = "timestamp_from_hrm_time")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl HrmHeader {
    /// Feed time in the feed's own timezone
    pub fn local_timestamp(&self) -> Option<DateTime<Tz>> {
        self.timestamp.map(|t| t.with_timezone(&Halifax))
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct HrmEntity {
    pub id: String,
    pub vehicle: HrmVehicle,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct HrmVehicle {
    pub trip: HrmTrip,
    pub position: HrmPosition,
    pub vehicle: HrmVehicleDetails,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HrmTrip {
    pub route_id: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct HrmPosition {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct HrmVehicleDetails {
    pub id: String,
    #[serde(default)]
    pub label: String,
}

impl From<HrmEntity> for Bus {
    fn from(entity: HrmEntity) -> Self {
        let vehicle = entity.vehicle;
        Bus {
            bus_id: vehicle.vehicle.id,
            label: vehicle.vehicle.label,
            route_id: vehicle.trip.route_id,
            latitude: vehicle.position.latitude,
            longitude: vehicle.position.longitude,
        }
    }
}

// The feed has been seen sending the timestamp both as "1733011200" and 1733011200
fn timestamp_from_hrm_time<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: serde_json::Value = Deserialize::deserialize(deserializer)?;

    let secs: i64 = match value {
        serde_json::Value::Null => return Ok(None),
        serde_json::Value::String(s) => s.trim().parse().map_err(D::Error::custom)?,
        serde_json::Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| D::Error::custom(format!("timestamp {n} isn't an integer")))?,
        other => return Err(D::Error::custom(format!("unexpected timestamp {other}"))),
    };

    Ok(DateTime::from_timestamp(secs, 0))
}
