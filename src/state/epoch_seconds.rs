//! Wire format for timestamps in the mesh state file: fractional Unix epoch
//! seconds, matching `lastModified`/`startDate` in the JSON schema.

use chrono::{DateTime, Utc};

fn to_f64(dt: DateTime<Utc>) -> f64 {
    dt.timestamp() as f64 + dt.timestamp_subsec_nanos() as f64 / 1_000_000_000.0
}

fn from_f64(secs: f64) -> Option<DateTime<Utc>> {
    let whole = secs.trunc() as i64;
    let nanos = (secs.fract() * 1_000_000_000.0).round() as u32;
    DateTime::from_timestamp(whole, nanos)
}

pub mod required {
    use super::*;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(to_f64(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        from_f64(secs).ok_or_else(|| serde::de::Error::custom(format!("invalid epoch seconds: {secs}")))
    }
}

pub mod optional {
    use super::*;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(dt) => serializer.serialize_f64(to_f64(*dt)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error> {
        let secs: Option<f64> = Option::deserialize(deserializer)?;
        match secs {
            Some(secs) => from_f64(secs)
                .map(Some)
                .ok_or_else(|| serde::de::Error::custom(format!("invalid epoch seconds: {secs}"))),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn round_trips_through_f64() {
        let dt = Utc.with_ymd_and_hms(2025, 3, 4, 5, 6, 7).unwrap();
        let back = from_f64(to_f64(dt)).unwrap();
        assert_eq!(dt, back);
    }
}
