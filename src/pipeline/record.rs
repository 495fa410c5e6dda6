use serde::de::Error as SerdeError;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// One raw trip as received from a caller.
///
/// Zone ids are optional; a missing or `null` id falls back to the trained
/// global mean. Zone ids also accept integral floats and numeric strings,
/// and `trip_miles` defaults to `0.0` when omitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripRecord {
    #[serde(default)]
    pub pickup_dt_str: String,
    #[serde(default, deserialize_with = "deserialize_zone_id")]
    pub pulocationid: Option<i64>,
    #[serde(default, deserialize_with = "deserialize_zone_id")]
    pub dolocationid: Option<i64>,
    #[serde(default, deserialize_with = "deserialize_miles")]
    pub trip_miles: f64,
}

impl TripRecord {
    pub fn new(
        pickup_dt_str: impl Into<String>,
        pulocationid: Option<i64>,
        dolocationid: Option<i64>,
        trip_miles: f64,
    ) -> Self {
        Self {
            pickup_dt_str: pickup_dt_str.into(),
            pulocationid,
            dolocationid,
            trip_miles,
        }
    }
}

fn deserialize_zone_id<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                return Ok(Some(i));
            }
            // Fractional ids truncate toward zero
            match n.as_f64() {
                Some(f) if f.is_finite() && f.abs() < i64::MAX as f64 => Ok(Some(f.trunc() as i64)),
                _ => Err(SerdeError::custom(format!("zone id {} is out of range", n))),
            }
        }
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map(Some)
            .map_err(|_| SerdeError::custom(format!("zone id {:?} is not an integer", s))),
        other => Err(SerdeError::custom(format!("zone id must be an integer, got {}", other))),
    }
}

fn deserialize_miles<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| SerdeError::custom("trip_miles is not a finite number")),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| SerdeError::custom(format!("trip_miles {:?} is not a number", s))),
        other => Err(SerdeError::custom(format!("trip_miles must be a number, got {}", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_full_record() {
        let r: TripRecord = serde_json::from_value(json!({
            "pickup_dt_str": "2020-02-01T08:30:00Z",
            "pulocationid": 132,
            "dolocationid": 48,
            "trip_miles": 5.2
        }))
        .unwrap();
        assert_eq!(r, TripRecord::new("2020-02-01T08:30:00Z", Some(132), Some(48), 5.2));
    }

    #[test]
    fn test_missing_and_null_fields() {
        let r: TripRecord = serde_json::from_value(json!({
            "pickup_dt_str": "2020-02-01",
            "pulocationid": null
        }))
        .unwrap();
        assert_eq!(r.pulocationid, None);
        assert_eq!(r.dolocationid, None);
        assert_eq!(r.trip_miles, 0.0);
    }

    #[test]
    fn test_lenient_numbers() {
        let r: TripRecord = serde_json::from_value(json!({
            "pickup_dt_str": "2020-02-01",
            "pulocationid": "132",
            "dolocationid": 48.9,
            "trip_miles": "3.5"
        }))
        .unwrap();
        assert_eq!(r.pulocationid, Some(132));
        assert_eq!(r.dolocationid, Some(48));
        assert_eq!(r.trip_miles, 3.5);
    }

    #[test]
    fn test_rejects_non_numeric_zone() {
        let result: Result<TripRecord, _> = serde_json::from_value(json!({
            "pickup_dt_str": "2020-02-01",
            "pulocationid": "midtown"
        }));
        assert!(result.unwrap_err().to_string().contains("midtown"));
    }

    #[test]
    fn test_rejects_null_miles() {
        let result: Result<TripRecord, _> = serde_json::from_value(json!({
            "pickup_dt_str": "2020-02-01",
            "trip_miles": null
        }));
        assert!(result.is_err());
    }
}
