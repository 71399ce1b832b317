// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde_json::Value;

use super::param::{ParamDescriptor, ParamKind};
use super::{Schema, SchemaError};

impl Schema {
    pub fn verify_state(&self, name: &str, data: &Value) -> Result<(), SchemaError> {
        let p = self.state(name).ok_or_else(|| SchemaError(format!("state \"{name}\": NOT exist")))?;
        check_value(p, data, &format!("state \"{name}\""))
    }

    pub fn verify_event(&self, name: &str, args: &Value) -> Result<(), SchemaError> {
        let e = self.event(name).ok_or_else(|| SchemaError(format!("event \"{name}\": NOT exist")))?;
        check_fields(&e.args, args, &format!("event \"{name}\": args"))
    }

    pub fn verify_method_args(&self, name: &str, args: &Value) -> Result<(), SchemaError> {
        let m = self.method(name).ok_or_else(|| SchemaError(format!("method \"{name}\": NOT exist")))?;
        check_fields(&m.args, args, &format!("method \"{name}\": args"))
    }

    pub fn verify_method_resp(&self, name: &str, resp: &Value) -> Result<(), SchemaError> {
        let m = self.method(name).ok_or_else(|| SchemaError(format!("method \"{name}\": NOT exist")))?;
        check_fields(&m.response, resp, &format!("method \"{name}\": response"))
    }
}

/// Check each schema field is present (and type/range-valid) in `value`,
/// which must be a JSON object. Extra fields in `value` are ignored.
fn check_fields(fields: &[ParamDescriptor], value: &Value, path: &str) -> Result<(), SchemaError> {
    let obj = value
        .as_object()
        .ok_or_else(|| SchemaError(format!("{path}: type unmatched: expected object")))?;
    for field in fields {
        let sub_path = format!("{path}: field \"{}\"", field.name);
        let Some(v) = obj.get(&field.name) else {
            return Err(SchemaError(format!("{sub_path}: missing")));
        };
        check_value(field, v, &sub_path)?;
    }
    Ok(())
}

fn check_value(p: &ParamDescriptor, v: &Value, path: &str) -> Result<(), SchemaError> {
    match p.kind {
        ParamKind::Bool => {
            if !v.is_boolean() {
                return Err(SchemaError(format!("{path}: type unmatched: expected bool")));
            }
        }
        ParamKind::Int => {
            if v.as_i64().is_none() {
                return Err(SchemaError(format!("{path}: type unmatched: expected int")));
            }
            check_range(p, v, path)?;
        }
        ParamKind::Uint => {
            if v.as_u64().is_none() {
                return Err(SchemaError(format!("{path}: type unmatched: expected uint")));
            }
            check_range(p, v, path)?;
        }
        ParamKind::Float => {
            if v.as_f64().is_none() {
                return Err(SchemaError(format!("{path}: type unmatched: expected float")));
            }
            check_range(p, v, path)?;
        }
        ParamKind::String => {
            if !v.is_string() {
                return Err(SchemaError(format!("{path}: type unmatched: expected string")));
            }
            check_range(p, v, path)?;
        }
        ParamKind::Struct => {
            let fields = p.fields.as_deref().unwrap_or_default();
            check_fields(fields, v, path)?;
        }
        ParamKind::Array => {
            let arr = v.as_array().ok_or_else(|| {
                SchemaError(format!("{path}: type unmatched: expected array"))
            })?;
            let want_len = p.length.unwrap_or(0);
            if arr.len() != want_len {
                return Err(SchemaError(format!(
                    "{path}: array length {} does not match expected {want_len}",
                    arr.len()
                )));
            }
            if let Some(element) = &p.element {
                check_value_type(element, &zero_value(element), &format!("{path}: element type"))?;
                for (i, item) in arr.iter().enumerate() {
                    check_value(element, item, &format!("{path}: element[{i}]"))?;
                }
            }
        }
        ParamKind::Slice => {
            let arr = v.as_array().ok_or_else(|| SchemaError(format!("{path}: nil slice")))?;
            if let Some(element) = &p.element {
                check_value_type(element, &zero_value(element), &format!("{path}: element type"))?;
                for (i, item) in arr.iter().enumerate() {
                    check_value(element, item, &format!("{path}: element[{i}]"))?;
                }
            }
        }
        ParamKind::Meta => {
            let bytes = serde_json::to_vec(v)
                .map_err(|e| SchemaError(format!("{path}: meta: {e}")))?;
            Schema::parse(&bytes, &std::collections::HashMap::new())
                .map_err(|e| SchemaError(format!("{path}: meta: {e}")))?;
        }
    }
    Ok(())
}

/// The zero value of a descriptor's own type, used to pre-check an
/// array/slice element descriptor before any real elements are checked
/// (so a structurally bad element type is caught even on an empty slice).
fn zero_value(p: &ParamDescriptor) -> Value {
    match p.kind {
        ParamKind::Bool => Value::Bool(false),
        ParamKind::Int | ParamKind::Uint => Value::from(0),
        ParamKind::Float => Value::from(0.0),
        ParamKind::String => Value::String(String::new()),
        ParamKind::Struct => {
            let fields = p.fields.as_deref().unwrap_or_default();
            let map = fields.iter().map(|f| (f.name.clone(), zero_value(f))).collect();
            Value::Object(map)
        }
        ParamKind::Array => {
            let len = p.length.unwrap_or(0);
            let element = p.element.as_deref();
            Value::Array((0..len).map(|_| element.map(zero_value).unwrap_or(Value::Null)).collect())
        }
        ParamKind::Slice => Value::Array(Vec::new()),
        ParamKind::Meta => serde_json::json!({
            "name": "", "description": "", "states": [], "events": [], "methods": []
        }),
    }
}

/// Type-only counterpart of `check_value`: same structural shape checks,
/// but never calls `check_range`. Used to validate a zero element against
/// its own descriptor without tripping on range constraints that a
/// synthetic zero value has no reason to satisfy.
fn check_value_type(p: &ParamDescriptor, v: &Value, path: &str) -> Result<(), SchemaError> {
    match p.kind {
        ParamKind::Bool => {
            if !v.is_boolean() {
                return Err(SchemaError(format!("{path}: type unmatched: expected bool")));
            }
        }
        ParamKind::Int => {
            if v.as_i64().is_none() {
                return Err(SchemaError(format!("{path}: type unmatched: expected int")));
            }
        }
        ParamKind::Uint => {
            if v.as_u64().is_none() {
                return Err(SchemaError(format!("{path}: type unmatched: expected uint")));
            }
        }
        ParamKind::Float => {
            if v.as_f64().is_none() {
                return Err(SchemaError(format!("{path}: type unmatched: expected float")));
            }
        }
        ParamKind::String => {
            if !v.is_string() {
                return Err(SchemaError(format!("{path}: type unmatched: expected string")));
            }
        }
        ParamKind::Struct => {
            let fields = p.fields.as_deref().unwrap_or_default();
            let obj = v
                .as_object()
                .ok_or_else(|| SchemaError(format!("{path}: type unmatched: expected object")))?;
            for field in fields {
                let sub_path = format!("{path}: field \"{}\"", field.name);
                let Some(fv) = obj.get(&field.name) else {
                    return Err(SchemaError(format!("{sub_path}: missing")));
                };
                check_value_type(field, fv, &sub_path)?;
            }
        }
        ParamKind::Array | ParamKind::Slice => {
            let arr = v
                .as_array()
                .ok_or_else(|| SchemaError(format!("{path}: type unmatched: expected array")))?;
            if let Some(element) = &p.element {
                for (i, item) in arr.iter().enumerate() {
                    check_value_type(element, item, &format!("{path}: element[{i}]"))?;
                }
            }
        }
        ParamKind::Meta => {
            let bytes = serde_json::to_vec(v).map_err(|e| SchemaError(format!("{path}: meta: {e}")))?;
            Schema::parse(&bytes, &std::collections::HashMap::new())
                .map_err(|e| SchemaError(format!("{path}: meta: {e}")))?;
        }
    }
    Ok(())
}

fn check_range(p: &ParamDescriptor, v: &Value, path: &str) -> Result<(), SchemaError> {
    let Some(range) = &p.range else { return Ok(()) };
    if range.is_empty() {
        return Ok(());
    }
    if let Some(options) = &range.option {
        if !options.iter().any(|o| &o.value == v) {
            return Err(SchemaError(format!("{path}: value NOT exist in options")));
        }
        return Ok(());
    }
    match p.kind {
        ParamKind::Float => {
            let n = v.as_f64().unwrap_or_default();
            if let Some(min) = range.min.as_ref().and_then(|m| m.as_f64()) {
                if n < min {
                    return Err(SchemaError(format!("{path}: less than min")));
                }
            }
            if let Some(max) = range.max.as_ref().and_then(|m| m.as_f64()) {
                if n > max {
                    return Err(SchemaError(format!("{path}: greater than max")));
                }
            }
        }
        ParamKind::Uint => {
            let n = v.as_u64().unwrap_or_default();
            if let Some(min) = range.min.as_ref().and_then(|m| m.as_u64()) {
                if n < min {
                    return Err(SchemaError(format!("{path}: less than min")));
                }
            }
            if let Some(max) = range.max.as_ref().and_then(|m| m.as_u64()) {
                if n > max {
                    return Err(SchemaError(format!("{path}: greater than max")));
                }
            }
        }
        _ => {
            let n = v.as_i64().unwrap_or_default();
            if let Some(min) = range.min.as_ref().and_then(|m| m.as_i64()) {
                if n < min {
                    return Err(SchemaError(format!("{path}: less than min")));
                }
            }
            if let Some(max) = range.max.as_ref().and_then(|m| m.as_i64()) {
                if n > max {
                    return Err(SchemaError(format!("{path}: greater than max")));
                }
            }
        }
    }
    Ok(())
}
