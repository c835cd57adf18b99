use anyhow::Result;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::{json, Value};

use chronopatch::{far_future, far_past, Direction, Slice};
use json_delta::Delta;

fn date(year: i32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, 1, 1, 0, 0, 0).unwrap()
}

#[test]
fn typed_round_trip_preserves_every_field() -> Result<()> {
    let slice = Slice::new(
        date(2022),
        date(2024),
        Some(Delta::from(json!({"p": ["foo", "bar"]}))),
        Direction::Forward,
    )
    .with_timestamp(Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap());

    let text = serde_json::to_string(&slice)?;
    let back: Slice = serde_json::from_str(&text)?;
    assert_eq!(back, slice);
    Ok(())
}

#[test]
fn sentinel_round_trip() -> Result<()> {
    let slice = Slice::new(far_past(), far_future(), None, Direction::Backward);
    let text = serde_json::to_string(&slice)?;
    let back: Slice = serde_json::from_str(&text)?;
    assert_eq!(back.from(), far_past());
    assert_eq!(back.to(), far_future());
    Ok(())
}

#[test]
fn reflective_field_names_are_stable() -> Result<()> {
    // The loose view of the document: persisted consumers key on these
    // exact field names.
    let slice = Slice::new(
        date(2022),
        date(2024),
        Some(Delta::from(json!({"p": ["foo", "bar"]}))),
        Direction::Forward,
    );
    let doc = serde_json::to_value(&slice)?;

    let fields = doc.as_object().expect("a slice serializes as an object");
    assert!(fields.contains_key("from"));
    assert!(fields.contains_key("to"));
    assert!(fields.contains_key("patch"));
    assert!(fields.contains_key("direction"));
    // The opaque row timestamp only appears once set.
    assert!(!fields.contains_key("timestamp"));

    assert_eq!(doc["direction"], json!("Forward"));
    assert_eq!(doc["patch"], json!({"p": ["foo", "bar"]}));
    assert!(doc["from"].as_str().unwrap().starts_with("2022-01-01T00:00:00"));
    Ok(())
}

#[test]
fn null_and_missing_ends_decode_as_the_far_future() -> Result<()> {
    let with_null: Slice = serde_json::from_value(json!({
        "from": "2022-01-01T00:00:00Z",
        "to": null,
        "patch": null,
        "direction": "Backward",
    }))?;
    assert_eq!(with_null.to(), far_future());
    assert_eq!(with_null.direction(), Direction::Backward);
    assert!(with_null.patch().is_none());

    let without_end: Slice = serde_json::from_value(json!({
        "from": "2022-01-01T00:00:00Z",
        "patch": null,
        "direction": "Forward",
    }))?;
    assert_eq!(without_end.to(), far_future());
    Ok(())
}

#[test]
fn timestamp_passes_through_untouched() -> Result<()> {
    let stamped: Slice = serde_json::from_value(json!({
        "from": "2022-01-01T00:00:00Z",
        "to": "2024-01-01T00:00:00Z",
        "patch": null,
        "timestamp": "2024-05-01T12:30:00Z",
        "direction": "Forward",
    }))?;
    assert_eq!(
        stamped.timestamp(),
        Some(Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap())
    );

    let doc = serde_json::to_value(&stamped)?;
    assert_eq!(doc["timestamp"], json!("2024-05-01T12:30:00Z"));
    Ok(())
}

#[test]
fn a_hand_written_document_parses() -> Result<()> {
    // The reflective path: a persisted row assembled without the typed
    // serializer still loads.
    let mut loose = serde_json::Map::new();
    loose.insert("from".to_string(), Value::String("2022-01-01T00:00:00Z".to_string()));
    loose.insert("to".to_string(), Value::String("2023-06-15T08:00:00Z".to_string()));
    loose.insert("patch".to_string(), json!({"n": [1, 2]}));
    loose.insert("direction".to_string(), Value::String("Forward".to_string()));

    let slice: Slice = serde_json::from_value(Value::Object(loose))?;
    assert_eq!(slice.from(), date(2022));
    assert_eq!(
        slice.patch().map(|delta| delta.as_value().clone()),
        Some(json!({"n": [1, 2]}))
    );
    Ok(())
}
