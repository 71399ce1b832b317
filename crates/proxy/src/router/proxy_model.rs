// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The proxy's own model: introspection methods served under `proxy/`.

use std::collections::HashMap;
use std::sync::OnceLock;

use serde_json::{json, Value};

use crate::schema::Schema;

use super::Router;

/// The proxy's own canonical schema, built once on first use.
pub fn proxy_schema() -> &'static Schema {
    static SCHEMA: OnceLock<Schema> = OnceLock::new();
    SCHEMA.get_or_init(|| {
        let raw = r#"{
            "name": "proxy",
            "description": "the device-model proxy's own introspection model",
            "states": [],
            "events": [
                {"name": "online", "description": "a model connected"},
                {"name": "offline", "description": "a model disconnected"},
                {"name": "closed", "description": "a connection's socket closed"},
                {"name": "metaCheckError", "description": "a model's schema failed validation"},
                {"name": "repeatModelNameError", "description": "a model name collided with an existing connection"}
            ],
            "methods": [
                {"name": "GetAllModel", "args": [], "response": [
                    {"name": "models", "type": "slice", "element": {"name": "e", "type": "string"}}
                ]},
                {"name": "GetModel", "args": [{"name": "name", "type": "string"}], "response": [
                    {"name": "name", "type": "string"},
                    {"name": "online", "type": "bool"},
                    {"name": "meta", "type": "meta"}
                ]},
                {"name": "ModelIsOnline", "args": [{"name": "name", "type": "string"}], "response": [
                    {"name": "online", "type": "bool"}
                ]},
                {"name": "GetSubState", "args": [{"name": "name", "type": "string"}], "response": [
                    {"name": "states", "type": "slice", "element": {"name": "e", "type": "string"}}
                ]},
                {"name": "GetSubEvent", "args": [{"name": "name", "type": "string"}], "response": [
                    {"name": "events", "type": "slice", "element": {"name": "e", "type": "string"}}
                ]}
            ]
        }"#;
        #[allow(clippy::expect_used)]
        Schema::parse(raw.as_bytes(), &HashMap::new()).expect("proxy's own schema is statically valid")
    })
}

/// Invoke one of the proxy's own methods synchronously against the
/// router's current state. Unknown methods or malformed args return an
/// empty object; the caller still receives a `response` frame either way.
pub fn invoke(router: &Router, method: &str, args: &Value) -> Value {
    match method {
        "GetAllModel" => {
            let models: Vec<&str> = router.connections.keys().map(String::as_str).collect();
            json!({ "models": models })
        }
        "GetModel" => {
            let Some(name) = args.get("name").and_then(Value::as_str) else { return json!({}) };
            match router.connections.get(name) {
                Some(conn) => json!({ "name": name, "online": true, "meta": conn.schema }),
                None => json!({
                    "name": name,
                    "online": false,
                    "meta": {"name": "", "description": "", "states": [], "events": [], "methods": []}
                }),
            }
        }
        "ModelIsOnline" => {
            let Some(name) = args.get("name").and_then(Value::as_str) else { return json!({}) };
            json!({ "online": router.connections.contains_key(name) })
        }
        "GetSubState" => {
            let Some(name) = args.get("name").and_then(Value::as_str) else { return json!({}) };
            match router.connections.get(name) {
                Some(conn) => json!({ "states": conn.state_subs.items() }),
                None => json!({ "states": Vec::<String>::new() }),
            }
        }
        "GetSubEvent" => {
            let Some(name) = args.get("name").and_then(Value::as_str) else { return json!({}) };
            match router.connections.get(name) {
                Some(conn) => json!({ "events": conn.event_subs.items() }),
                None => json!({ "events": Vec::<String>::new() }),
            }
        }
        _ => json!({}),
    }
}
