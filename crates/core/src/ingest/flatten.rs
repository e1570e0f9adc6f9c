use crate::error::IngestError;
use crate::ingest::types::{is_reserved_column, CurrentFeatures, FeatureRecord, RawReading};
use crate::time::calendar::DATE_FORMAT;
use chrono::NaiveDate;
use serde_json::{Map, Value};

const STATUS_OK: &str = "ok";

/// Turns one feed payload into one row per (pollutant, forecast day).
///
/// A missing optional field becomes null. A missing `data` object or a
/// non-ok status is an upstream error and fails the whole payload, as does
/// any malformed forecast entry or a `forecast`/`iaqi` that is present but
/// not an object. An empty or absent forecast yields no rows.
pub fn flatten(raw: &RawReading) -> Result<Vec<FeatureRecord>, IngestError> {
    let data = match (raw.status(), raw.data()) {
        (Some(STATUS_OK), Some(Value::Object(data))) => data,
        (Some(STATUS_OK), Some(_)) => return Err(IngestError::schema("'data' is not an object")),
        (Some(STATUS_OK), None) => return Err(IngestError::schema("missing 'data' field")),
        (status, _) => {
            return Err(IngestError::schema(format!(
                "status is {:?}, expected \"ok\"",
                status.unwrap_or("<missing>")
            )))
        }
    };

    let current = current_features(data)?;

    let daily = match data.get("forecast") {
        None => return Ok(Vec::new()),
        Some(Value::Object(forecast)) => match forecast.get("daily") {
            None => return Ok(Vec::new()),
            Some(Value::Object(daily)) => daily,
            Some(_) => return Err(IngestError::schema("forecast.daily is not an object")),
        },
        Some(_) => return Err(IngestError::schema("forecast is not an object")),
    };

    let mut out = Vec::new();
    for (pollutant, entries) in daily {
        let entries = entries.as_array().ok_or_else(|| {
            IngestError::schema(format!("forecast.daily.{pollutant} is not a list"))
        })?;

        for entry in entries {
            out.push(forecast_record(&current, pollutant, entry)?);
        }
    }

    Ok(out)
}

fn current_features(data: &Map<String, Value>) -> Result<CurrentFeatures, IngestError> {
    let geo = data
        .get("city")
        .and_then(|c| c.get("geo"))
        .and_then(Value::as_array);
    let coord = |idx: usize| geo.and_then(|g| g.get(idx)).and_then(Value::as_f64);

    let mut pollutants = Vec::new();
    match data.get("iaqi") {
        None => {}
        Some(Value::Object(iaqi)) => collect_pollutants(iaqi, &mut pollutants)?,
        Some(_) => return Err(IngestError::schema("iaqi is not an object")),
    }

    Ok(CurrentFeatures {
        timestamp: data
            .get("time")
            .and_then(|t| t.get("s"))
            .and_then(Value::as_str)
            .map(str::to_string),
        latitude: coord(0),
        longitude: coord(1),
        aqi: data.get("aqi").and_then(Value::as_f64),
        dominant_pollutant: data
            .get("dominentpol")
            .and_then(Value::as_str)
            .map(str::to_string),
        pollutants,
    })
}

fn collect_pollutants(
    iaqi: &Map<String, Value>,
    out: &mut Vec<(String, Option<f64>)>,
) -> Result<(), IngestError> {
    for (code, reading) in iaqi {
        if is_reserved_column(code) {
            return Err(IngestError::schema(format!(
                "iaqi key {code:?} collides with a fixed column"
            )));
        }
        out.push((code.clone(), reading.get("v").and_then(Value::as_f64)));
    }
    Ok(())
}

fn forecast_record(
    current: &CurrentFeatures,
    pollutant: &str,
    entry: &Value,
) -> Result<FeatureRecord, IngestError> {
    let entry = entry.as_object().ok_or_else(|| {
        IngestError::schema(format!("forecast entry for {pollutant} is not an object"))
    })?;

    let day = match entry.get("day") {
        Some(Value::String(s)) => s.as_str(),
        Some(other) => {
            return Err(IngestError::DateParse {
                value: other.to_string(),
                detail: "forecast day is not a string".to_string(),
            })
        }
        None => {
            return Err(IngestError::schema(format!(
                "forecast entry for {pollutant} has no 'day'"
            )))
        }
    };
    let forecast_date =
        NaiveDate::parse_from_str(day, DATE_FORMAT).map_err(|e| IngestError::DateParse {
            value: day.to_string(),
            detail: e.to_string(),
        })?;

    Ok(FeatureRecord {
        current: current.clone(),
        forecast_date,
        pollutant: pollutant.to_string(),
        forecast_avg: stat(entry, pollutant, "avg")?,
        forecast_min: stat(entry, pollutant, "min")?,
        forecast_max: stat(entry, pollutant, "max")?,
    })
}

// Present-but-null is carried through; absent or non-numeric is malformed.
fn stat(entry: &Map<String, Value>, pollutant: &str, key: &str) -> Result<Option<f64>, IngestError> {
    match entry.get(key) {
        Some(Value::Null) => Ok(None),
        Some(v) => v.as_f64().map(Some).ok_or_else(|| {
            IngestError::schema(format!("forecast {pollutant}.{key} is not numeric: {v}"))
        }),
        None => Err(IngestError::schema(format!(
            "forecast entry for {pollutant} has no '{key}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;
    use serde_json::json;

    fn reading(v: Value) -> RawReading {
        RawReading::new(v)
    }

    fn barcelona() -> Value {
        json!({
            "status": "ok",
            "data": {
                "aqi": 42,
                "dominentpol": "pm25",
                "time": {"s": "2025-01-20 10:00:00"},
                "city": {"geo": [41.4, 2.2]},
                "iaqi": {"pm25": {"v": 10}},
                "forecast": {"daily": {"pm25": [
                    {"day": "2025-01-21", "avg": 15, "min": 5, "max": 20}
                ]}}
            }
        })
    }

    #[test]
    fn flattens_single_forecast_entry() {
        let rows = flatten(&reading(barcelona())).unwrap();
        assert_eq!(rows.len(), 1);

        let row = &rows[0];
        assert_eq!(row.current.timestamp.as_deref(), Some("2025-01-20 10:00:00"));
        assert_eq!(row.current.latitude, Some(41.4));
        assert_eq!(row.current.longitude, Some(2.2));
        assert_eq!(row.current.aqi, Some(42.0));
        assert_eq!(row.current.dominant_pollutant.as_deref(), Some("pm25"));
        assert_eq!(row.current.pollutant("pm25"), Some(10.0));
        assert_eq!(row.forecast_date, NaiveDate::from_ymd_opt(2025, 1, 21).unwrap());
        assert_eq!(row.pollutant, "pm25");
        assert_eq!(row.forecast_avg, Some(15.0));
        assert_eq!(row.forecast_min, Some(5.0));
        assert_eq!(row.forecast_max, Some(20.0));
    }

    #[test]
    fn row_count_is_sum_of_forecast_lengths_in_feed_order() {
        let v = json!({
            "status": "ok",
            "data": {
                "aqi": 30,
                "iaqi": {"pm10": {"v": 7}, "o3": {"v": 21.5}, "t": {"v": 11}},
                "forecast": {"daily": {
                    "pm10": [
                        {"day": "2025-01-21", "avg": 1, "min": 0, "max": 2},
                        {"day": "2025-01-22", "avg": 2, "min": 1, "max": 3},
                        {"day": "2025-01-23", "avg": 3, "min": 2, "max": 4}
                    ],
                    "o3": [
                        {"day": "2025-01-21", "avg": 9, "min": 8, "max": 10},
                        {"day": "2025-01-22", "avg": 9, "min": 8, "max": 10}
                    ],
                    "uvi": []
                }}
            }
        });

        let rows = flatten(&reading(v)).unwrap();
        assert_eq!(rows.len(), 5);

        let order: Vec<_> = rows
            .iter()
            .map(|r| (r.pollutant.as_str(), r.forecast_date.to_string()))
            .collect();
        assert_eq!(order[0], ("pm10", "2025-01-21".to_string()));
        assert_eq!(order[2], ("pm10", "2025-01-23".to_string()));
        assert_eq!(order[3], ("o3", "2025-01-21".to_string()));

        let codes: Vec<_> = rows[0].current.pollutants.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(codes, vec!["pm10", "o3", "t"]);
        assert!(rows.iter().all(|r| r.current == rows[0].current));
    }

    #[test]
    fn empty_or_absent_forecast_yields_no_rows() {
        let mut v = barcelona();
        v["data"]["forecast"]["daily"] = json!({});
        assert!(flatten(&reading(v.clone())).unwrap().is_empty());

        v["data"].as_object_mut().unwrap().remove("forecast");
        assert!(flatten(&reading(v)).unwrap().is_empty());
    }

    #[test]
    fn non_object_forecast_is_a_schema_error() {
        for daily in [
            json!([{"day": "2025-01-21", "avg": 15, "min": 5, "max": 20}]),
            json!("pm25"),
            Value::Null,
        ] {
            let mut v = barcelona();
            v["data"]["forecast"]["daily"] = daily.clone();
            let err = flatten(&reading(v)).unwrap_err();
            assert_eq!(err.kind(), FailureKind::Schema, "daily = {daily}");
        }

        let mut v = barcelona();
        v["data"]["forecast"] = json!([]);
        assert_eq!(flatten(&reading(v)).unwrap_err().kind(), FailureKind::Schema);

        let mut v = barcelona();
        v["data"]["forecast"].as_object_mut().unwrap().remove("daily");
        assert!(flatten(&reading(v)).unwrap().is_empty());
    }

    #[test]
    fn non_object_iaqi_is_a_schema_error() {
        let mut v = barcelona();
        v["data"]["iaqi"] = json!([{"v": 10}]);
        let err = flatten(&reading(v)).unwrap_err();
        assert_eq!(err.kind(), FailureKind::Schema);
        assert!(err.to_string().contains("iaqi"));

        let mut v = barcelona();
        v["data"].as_object_mut().unwrap().remove("iaqi");
        let rows = flatten(&reading(v)).unwrap();
        assert!(rows[0].current.pollutants.is_empty());
    }

    #[test]
    fn missing_optional_fields_become_null() {
        let v = json!({
            "status": "ok",
            "data": {
                "aqi": "-",
                "iaqi": {"no2": {}},
                "forecast": {"daily": {"pm25": [
                    {"day": "2025-01-21", "avg": null, "min": 5, "max": 20}
                ]}}
            }
        });

        let rows = flatten(&reading(v)).unwrap();
        let row = &rows[0];
        assert_eq!(row.current.timestamp, None);
        assert_eq!(row.current.latitude, None);
        assert_eq!(row.current.longitude, None);
        assert_eq!(row.current.aqi, None);
        assert_eq!(row.current.dominant_pollutant, None);
        assert!(row.current.has_pollutant("no2"));
        assert_eq!(row.current.pollutant("no2"), None);
        assert_eq!(row.forecast_avg, None);
    }

    #[test]
    fn rejects_error_status_and_missing_data() {
        let err = flatten(&reading(json!({"status": "error", "data": "Unknown station"}))).unwrap_err();
        assert_eq!(err.kind(), FailureKind::Schema);

        let err = flatten(&reading(json!({"status": "ok"}))).unwrap_err();
        assert_eq!(err.kind(), FailureKind::Schema);

        let err = flatten(&reading(json!({"data": {}}))).unwrap_err();
        assert_eq!(err.kind(), FailureKind::Schema);
    }

    #[test]
    fn malformed_day_fails_the_whole_payload() {
        let v = json!({
            "status": "ok",
            "data": {
                "forecast": {"daily": {"pm25": [
                    {"day": "2025-01-21", "avg": 1, "min": 0, "max": 2},
                    {"day": "21/01/2025", "avg": 1, "min": 0, "max": 2}
                ]}}
            }
        });

        let err = flatten(&reading(v)).unwrap_err();
        assert_eq!(err.kind(), FailureKind::DateParse);
        assert!(err.to_string().contains("21/01/2025"));
    }

    #[test]
    fn missing_forecast_stat_is_a_schema_error() {
        let v = json!({
            "status": "ok",
            "data": {"forecast": {"daily": {"pm25": [{"day": "2025-01-21", "avg": 1, "min": 0}]}}}
        });
        let err = flatten(&reading(v)).unwrap_err();
        assert_eq!(err.kind(), FailureKind::Schema);
        assert!(err.to_string().contains("'max'"));
    }

    #[test]
    fn iaqi_key_shadowing_fixed_column_is_rejected() {
        let mut v = barcelona();
        v["data"]["iaqi"]["aqi"] = json!({"v": 1});
        let err = flatten(&reading(v)).unwrap_err();
        assert_eq!(err.kind(), FailureKind::Schema);
    }
}
