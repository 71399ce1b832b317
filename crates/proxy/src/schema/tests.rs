// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::HashMap;

use serde_json::json;

use super::Schema;

fn car_schema() -> &'static str {
    r#"{
        "name": "car/#1",
        "description": "a car",
        "states": [
            {"name": "speed", "type": "float", "range": {"min": 0.0, "max": 200.0}}
        ],
        "events": [
            {"name": "crashed", "args": [{"name": "severity", "type": "string",
                "range": {"option": [{"value": "minor"}, {"value": "major"}]}}]}
        ],
        "methods": [
            {"name": "QS", "args": [
                {"name": "angle", "type": "int", "range": {"min": 0, "max": 360}},
                {"name": "speed", "type": "string",
                    "range": {"option": [{"value": "slow"}, {"value": "fast"}]}}
            ], "response": [
                {"name": "res", "type": "bool"},
                {"name": "msg", "type": "string"},
                {"name": "time", "type": "uint"},
                {"name": "code", "type": "int"}
            ]}
        ]
    }"#
}

#[test]
fn parse_and_round_trip() -> anyhow::Result<()> {
    let schema = Schema::parse(car_schema().as_bytes(), &HashMap::new())?;
    assert_eq!(schema.name, "car/#1");
    assert_eq!(schema.all_states(), vec!["car/#1/speed"]);
    assert_eq!(schema.all_events(), vec!["car/#1/crashed"]);
    assert_eq!(schema.all_methods(), vec!["car/#1/QS"]);

    let canonical = schema.to_canonical_json().to_vec();
    let reparsed = Schema::parse(&canonical, &HashMap::new())?;
    assert_eq!(reparsed.name, schema.name);
    assert_eq!(reparsed.all_methods(), schema.all_methods());
    Ok(())
}

#[test]
fn template_resolution() -> anyhow::Result<()> {
    let raw = r#"{"name": "car/{id}", "states": [], "events": [], "methods": []}"#;
    let mut map = HashMap::new();
    map.insert("id".to_owned(), "#7".to_owned());
    let schema = Schema::parse(raw.as_bytes(), &map)?;
    assert_eq!(schema.name, "car/#7");
    Ok(())
}

#[test]
fn template_missing_token_is_error() {
    let raw = r#"{"name": "car/{id}", "states": [], "events": [], "methods": []}"#;
    let Err(err) = Schema::parse(raw.as_bytes(), &HashMap::new()) else {
        panic!("expected missing-template error");
    };
    assert!(err.0.contains("missing template value"));
}

#[test]
fn duplicate_state_names_rejected() {
    let raw = r#"{"name": "car", "states": [
        {"name": "x", "type": "bool"}, {"name": "x", "type": "bool"}
    ], "events": [], "methods": []}"#;
    let Err(err) = Schema::parse(raw.as_bytes(), &HashMap::new()) else {
        panic!("expected duplicate-name error");
    };
    assert!(err.0.contains("duplicate name"));
}

#[test]
fn float_range_min_greater_than_max_rejected() {
    let raw = r#"{"name": "car", "states": [
        {"name": "x", "type": "float", "range": {"min": 10.0, "max": 1.0}}
    ], "events": [], "methods": []}"#;
    let Err(err) = Schema::parse(raw.as_bytes(), &HashMap::new()) else {
        panic!("expected range error");
    };
    assert!(err.0.contains("range.min greater than range.max"));
}

#[test]
fn uint_rejects_negative_value() -> anyhow::Result<()> {
    let schema = Schema::parse(car_schema().as_bytes(), &HashMap::new())?;
    let result =
        schema.verify_method_resp("QS", &json!({"res": true, "msg": "ok", "time": -1, "code": 0}));
    assert!(result.is_err());
    Ok(())
}

#[test]
fn state_range_check() -> anyhow::Result<()> {
    let schema = Schema::parse(car_schema().as_bytes(), &HashMap::new())?;
    assert!(schema.verify_state("speed", &json!(55.0)).is_ok());
    let Err(err) = schema.verify_state("speed", &json!(500.0)) else {
        panic!("expected range error");
    };
    assert!(err.0.contains("greater than max"));
    Ok(())
}

#[test]
fn method_args_missing_field() -> anyhow::Result<()> {
    let schema = Schema::parse(car_schema().as_bytes(), &HashMap::new())?;
    let Err(err) = schema.verify_method_args("QS", &json!({"angle": 90})) else {
        panic!("expected missing-field error");
    };
    assert!(err.0.contains("missing"));
    Ok(())
}

#[test]
fn method_args_option_mismatch() -> anyhow::Result<()> {
    let schema = Schema::parse(car_schema().as_bytes(), &HashMap::new())?;
    let Err(err) = schema.verify_method_args("QS", &json!({"angle": 90, "speed": "ludicrous"}))
    else {
        panic!("expected option-mismatch error");
    };
    assert!(err.0.contains("NOT exist in options"));
    Ok(())
}

#[test]
fn array_length_mismatch() -> anyhow::Result<()> {
    let raw = r#"{"name": "m", "states": [
        {"name": "pair", "type": "array", "length": 2, "element": {"name": "e", "type": "int"}}
    ], "events": [], "methods": []}"#;
    let schema = Schema::parse(raw.as_bytes(), &HashMap::new())?;
    assert!(schema.verify_state("pair", &json!([1, 2])).is_ok());
    let Err(err) = schema.verify_state("pair", &json!([1, 2, 3])) else {
        panic!("expected array length error");
    };
    assert!(err.0.contains("array length"));
    Ok(())
}

#[test]
fn slice_rejects_non_array() -> anyhow::Result<()> {
    let raw = r#"{"name": "m", "states": [
        {"name": "items", "type": "slice", "element": {"name": "e", "type": "string"}}
    ], "events": [], "methods": []}"#;
    let schema = Schema::parse(raw.as_bytes(), &HashMap::new())?;
    assert!(schema.verify_state("items", &json!([])).is_ok());
    assert!(schema.verify_state("items", &json!(null)).is_err());
    Ok(())
}
