use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::collections::HashMap;

/// One decoded telemetry record from the upstream feed.
///
/// Devices are inconsistent about numeric fields (sometimes quoted,
/// sometimes bare), so every numeric field goes through a lenient parser
/// that maps garbage to `None` instead of rejecting the whole frame.
#[derive(Debug, Deserialize)]
pub struct TelemetryFrame {
    #[serde(rename = "IMEI", alias = "imei")]
    pub imei: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub lat: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub lon: Option<f64>,
    #[serde(rename = "speedGps", alias = "speed", default, deserialize_with = "lenient_f64")]
    pub speed: Option<f64>,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub ignition: Option<bool>,
    #[serde(rename = "gpsTimestamp", default, deserialize_with = "lenient_timestamp")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(rename = "extendedData", default)]
    pub extended: ExtendedData,
}

#[derive(Debug, Default, Deserialize)]
pub struct ExtendedData {
    #[serde(rename = "vehicleBattery", default, deserialize_with = "lenient_f64")]
    pub vehicle_battery: Option<f64>,
    #[serde(rename = "tripOdometer", default, deserialize_with = "lenient_f64")]
    pub trip_odometer: Option<f64>,
    #[serde(rename = "totalOdometer", default, deserialize_with = "lenient_f64")]
    pub total_odometer: Option<f64>,
    #[serde(rename = "DIN1", default, deserialize_with = "lenient_f64")]
    pub din1: Option<f64>,
    #[serde(flatten)]
    pub other: HashMap<String, Value>,
}

impl TelemetryFrame {
    /// Ignition is on when the explicit flag says so or the DIN1 digital
    /// input reads 1.
    pub fn ignition_on(&self) -> bool {
        self.ignition == Some(true) || self.extended.din1 == Some(1.0)
    }

    pub fn ignition_off(&self) -> bool {
        self.ignition == Some(false) || self.extended.din1 == Some(0.0)
    }

    pub fn speed(&self) -> f64 {
        self.speed.unwrap_or(0.0)
    }

    /// Battery voltage, with absent, unparseable and exactly-zero readings
    /// collapsed to `None` (dead or unknown).
    pub fn battery(&self) -> Option<f64> {
        self.extended.vehicle_battery.filter(|v| *v != 0.0)
    }

    /// Devices report (0, 0) when they have no GPS fix.
    pub fn has_valid_position(&self) -> bool {
        matches!((self.lat, self.lon), (Some(lat), Some(lon)) if lat != 0.0 && lon != 0.0)
    }

    /// Extended payload as a JSON object for snapshot persistence.
    pub fn extended_json(&self) -> Value {
        let mut map = serde_json::Map::new();
        if let Some(v) = self.extended.vehicle_battery {
            map.insert("vehicleBattery".into(), v.into());
        }
        if let Some(v) = self.extended.trip_odometer {
            map.insert("tripOdometer".into(), v.into());
        }
        if let Some(v) = self.extended.total_odometer {
            map.insert("totalOdometer".into(), v.into());
        }
        if let Some(v) = self.extended.din1 {
            map.insert("DIN1".into(), v.into());
        }
        for (k, v) in &self.extended.other {
            map.insert(k.clone(), v.clone());
        }
        Value::Object(map)
    }
}

fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrFloat {
        Float(f64),
        String(String),
    }

    let v: Option<StringOrFloat> = Option::deserialize(deserializer)?;
    Ok(match v {
        Some(StringOrFloat::Float(f)) => Some(f),
        Some(StringOrFloat::String(s)) => s.trim().parse::<f64>().ok(),
        None => None,
    })
}

fn lenient_bool<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum BoolOrNumber {
        Bool(bool),
        Number(f64),
    }

    let v: Option<BoolOrNumber> = Option::deserialize(deserializer)?;
    Ok(match v {
        Some(BoolOrNumber::Bool(b)) => Some(b),
        Some(BoolOrNumber::Number(n)) => Some(n != 0.0),
        None => None,
    })
}

/// Frame timestamps arrive as epoch seconds, epoch milliseconds, or a
/// datetime string depending on device firmware.
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum EpochOrString {
        Epoch(i64),
        String(String),
    }

    let v: Option<EpochOrString> = Option::deserialize(deserializer)?;
    Ok(match v {
        Some(EpochOrString::Epoch(n)) => {
            // Values past the year ~33658 as seconds are millisecond epochs.
            if n > 100_000_000_000 {
                Utc.timestamp_millis_opt(n).single()
            } else {
                Utc.timestamp_opt(n, 0).single()
            }
        }
        Some(EpochOrString::String(s)) => parse_datetime_str(s.trim()),
        None => None,
    })
}

fn parse_datetime_str(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    None
}
