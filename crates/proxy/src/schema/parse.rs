// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::HashMap;

use super::param::{ParamDescriptor, ParamKind};
use super::{Schema, SchemaError};

impl Schema {
    /// Parse and structurally validate a schema, resolving any `{token}`
    /// segments in the model name from `template`.
    pub fn parse(bytes: &[u8], template: &HashMap<String, String>) -> Result<Schema, SchemaError> {
        let mut schema: Schema = serde_json::from_slice(bytes)
            .map_err(|e| SchemaError(format!("invalid schema JSON: {e}")))?;

        schema.name = resolve_template(schema.name.trim(), template)?;
        if schema.name.is_empty() {
            return Err(SchemaError("name: must not be empty".into()));
        }

        for s in &mut schema.states {
            s.name = s.name.trim().to_owned();
        }
        for e in &mut schema.events {
            e.name = e.name.trim().to_owned();
        }
        for m in &mut schema.methods {
            m.name = m.name.trim().to_owned();
        }

        check_unique("state", schema.states.iter().map(|s| s.name.as_str()))?;
        check_unique("event", schema.events.iter().map(|e| e.name.as_str()))?;
        check_unique("method", schema.methods.iter().map(|m| m.name.as_str()))?;

        for (i, s) in schema.states.iter().enumerate() {
            validate_descriptor(s, &format!("state[{i}]"))?;
        }
        for (i, e) in schema.events.iter().enumerate() {
            for (j, a) in e.args.iter().enumerate() {
                validate_descriptor(a, &format!("event[{i}] \"{}\": args[{j}]", e.name))?;
            }
        }
        for (i, m) in schema.methods.iter().enumerate() {
            for (j, a) in m.args.iter().enumerate() {
                validate_descriptor(a, &format!("method[{i}] \"{}\": args[{j}]", m.name))?;
            }
            for (j, r) in m.response.iter().enumerate() {
                validate_descriptor(r, &format!("method[{i}] \"{}\": response[{j}]", m.name))?;
            }
        }

        schema.build_indices();
        Ok(schema)
    }
}

fn check_unique<'a>(kind: &str, names: impl Iterator<Item = &'a str>) -> Result<(), SchemaError> {
    let mut seen = std::collections::HashSet::new();
    for name in names {
        if !seen.insert(name) {
            return Err(SchemaError(format!("{kind} \"{name}\": duplicate name")));
        }
    }
    Ok(())
}

/// Resolve `{token}` segments in `name` from `template`. A name with no
/// braces is returned unchanged.
fn resolve_template(name: &str, template: &HashMap<String, String>) -> Result<String, SchemaError> {
    let mut out = String::with_capacity(name.len());
    let mut chars = name.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '{' {
            let mut token = String::new();
            let mut closed = false;
            for c in chars.by_ref() {
                if c == '}' {
                    closed = true;
                    break;
                }
                token.push(c);
            }
            if !closed {
                return Err(SchemaError(format!("name \"{name}\": unbalanced '{{'")));
            }
            match template.get(&token) {
                Some(value) if !value.is_empty() => out.push_str(value),
                Some(_) => {
                    return Err(SchemaError(format!(
                        "name \"{name}\": template token \"{token}\" resolves to an empty value"
                    )))
                }
                None => {
                    return Err(SchemaError(format!(
                        "name \"{name}\": missing template value for \"{token}\""
                    )))
                }
            }
        } else if c == '}' {
            return Err(SchemaError(format!("name \"{name}\": unbalanced '}}'")));
        } else {
            out.push(c);
        }
    }
    Ok(out)
}

/// Validate a parameter descriptor's structural shape (not a value
/// against it — see `validate.rs` for that).
fn validate_descriptor(p: &ParamDescriptor, path: &str) -> Result<(), SchemaError> {
    match p.kind {
        ParamKind::Bool => {
            if p.range.is_some() {
                return Err(SchemaError(format!("{path}: bool must not carry a range")));
            }
        }
        ParamKind::Int | ParamKind::Uint => validate_numeric_range(p, path, p.kind == ParamKind::Uint)?,
        ParamKind::Float => validate_float_range(p, path)?,
        ParamKind::String => validate_string_range(p, path)?,
        ParamKind::Array => {
            let len = p
                .length
                .ok_or_else(|| SchemaError(format!("{path}: array requires \"length\"")))?;
            if len == 0 {
                return Err(SchemaError(format!("{path}: array length must be positive")));
            }
            let element = p
                .element
                .as_deref()
                .ok_or_else(|| SchemaError(format!("{path}: array requires \"element\"")))?;
            validate_descriptor(element, &format!("{path}.element"))?;
        }
        ParamKind::Slice => {
            let element = p
                .element
                .as_deref()
                .ok_or_else(|| SchemaError(format!("{path}: slice requires \"element\"")))?;
            validate_descriptor(element, &format!("{path}.element"))?;
        }
        ParamKind::Struct => {
            let fields = p
                .fields
                .as_deref()
                .ok_or_else(|| SchemaError(format!("{path}: struct requires \"fields\"")))?;
            check_unique(
                "field",
                fields.iter().map(|f| f.name.as_str()),
            )
            .map_err(|e| SchemaError(format!("{path}: {e}")))?;
            for (i, f) in fields.iter().enumerate() {
                validate_descriptor(f, &format!("{path}.fields[{i}] \"{}\"", f.name))?;
            }
        }
        ParamKind::Meta => {
            if p.range.is_some() {
                return Err(SchemaError(format!("{path}: meta must not carry a range")));
            }
        }
    }
    Ok(())
}

fn validate_numeric_range(p: &ParamDescriptor, path: &str, unsigned: bool) -> Result<(), SchemaError> {
    let Some(range) = &p.range else { return Ok(()) };
    if range.is_empty() {
        return Ok(());
    }
    if let Some(options) = &range.option {
        if options.is_empty() {
            return Err(SchemaError(format!("{path}: range.option must not be empty")));
        }
        let mut seen = std::collections::HashSet::new();
        for (i, opt) in options.iter().enumerate() {
            if unsigned {
                if opt.value.as_u64().is_none() {
                    return Err(SchemaError(format!(
                        "{path}: range.option[{i}]: value must be a non-negative integer"
                    )));
                }
            } else if opt.value.as_i64().is_none() {
                return Err(SchemaError(format!("{path}: range.option[{i}]: value must be an integer")));
            }
            if !seen.insert(opt.value.to_string()) {
                return Err(SchemaError(format!("{path}: range.option[{i}]: duplicate value")));
            }
        }
        if let Some(default) = &range.default {
            if !options.iter().any(|o| &o.value == default) {
                return Err(SchemaError(format!("{path}: range.default: value NOT exist in options")));
            }
        }
        return Ok(());
    }
    match (&range.min, &range.max) {
        (None, None) => Err(SchemaError(format!("{path}: range requires min/max or option"))),
        (min, max) => {
            if let (Some(min), Some(max)) = (min, max) {
                let (min, max) = if unsigned {
                    (min.as_u64().map(|v| v as i128), max.as_u64().map(|v| v as i128))
                } else {
                    (min.as_i64().map(|v| v as i128), max.as_i64().map(|v| v as i128))
                };
                if let (Some(min), Some(max)) = (min, max) {
                    if min > max {
                        return Err(SchemaError(format!("{path}: range.min greater than range.max")));
                    }
                }
            }
            if unsigned {
                if let Some(min) = &range.min {
                    if min.as_u64().is_none() {
                        return Err(SchemaError(format!("{path}: range.min must be non-negative")));
                    }
                }
            }
            Ok(())
        }
    }
}

fn validate_float_range(p: &ParamDescriptor, path: &str) -> Result<(), SchemaError> {
    let Some(range) = &p.range else { return Ok(()) };
    if range.is_empty() {
        return Ok(());
    }
    if range.option.is_some() {
        return Err(SchemaError(format!("{path}: float does not support range.option")));
    }
    match (&range.min, &range.max) {
        (None, None) => Err(SchemaError(format!("{path}: range requires min and/or max"))),
        (Some(min), Some(max)) => {
            let min = min.as_f64().ok_or_else(|| SchemaError(format!("{path}: range.min must be numeric")))?;
            let max = max.as_f64().ok_or_else(|| SchemaError(format!("{path}: range.max must be numeric")))?;
            if min > max {
                return Err(SchemaError(format!("{path}: range.min greater than range.max")));
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

fn validate_string_range(p: &ParamDescriptor, path: &str) -> Result<(), SchemaError> {
    let Some(range) = &p.range else { return Ok(()) };
    if range.is_empty() {
        return Ok(());
    }
    let options = range
        .option
        .as_ref()
        .ok_or_else(|| SchemaError(format!("{path}: string range requires \"option\"")))?;
    if options.is_empty() {
        return Err(SchemaError(format!("{path}: range.option must not be empty")));
    }
    let mut seen = std::collections::HashSet::new();
    for (i, opt) in options.iter().enumerate() {
        if !opt.value.is_string() {
            return Err(SchemaError(format!("{path}: range.option[{i}]: value must be a string")));
        }
        if !seen.insert(opt.value.to_string()) {
            return Err(SchemaError(format!("{path}: range.option[{i}]: duplicate value")));
        }
    }
    if let Some(default) = &range.default {
        if !options.iter().any(|o| &o.value == default) {
            return Err(SchemaError(format!("{path}: range.default: value NOT exist in options")));
        }
    }
    Ok(())
}
