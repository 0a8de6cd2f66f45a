//! Serialises a [`Duration`] as fractional milliseconds.

use std::time::Duration;

use serde::{Deserialize, Deserializer, Serializer};

const NANOS_PER_MILLI: f64 = 1_000_000.0;

pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(duration.as_nanos() as f64 / NANOS_PER_MILLI)
}

pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    let millis = f64::deserialize(deserializer)?;
    if !millis.is_finite() || millis < 0.0 {
        return Err(serde::de::Error::custom(format!(
            "invalid duration in milliseconds: {millis}"
        )));
    }
    Ok(Duration::from_nanos((millis * NANOS_PER_MILLI).round() as u64))
}
