// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The meta-schema engine: parsing, structural validation, and runtime
//! payload checking for a model's self-description.

mod param;
mod parse;
mod validate;

#[cfg(test)]
#[path = "tests.rs"]
mod tests;

pub use param::{EventDescriptor, MethodDescriptor, ParamDescriptor, ParamKind, Range, RangeOption};

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use serde::{Deserialize, Serialize};

/// A structural error found while parsing or validating a schema or a
/// value against it. Always a single human-readable, path-qualified
/// message — never a structured variant, matching how these are reported
/// over the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaError(pub String);

impl std::fmt::Display for SchemaError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for SchemaError {}

impl From<String> for SchemaError {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A model's self-description: its name and the states, events, and
/// methods it exposes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schema {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub states: Vec<ParamDescriptor>,
    #[serde(default)]
    pub events: Vec<EventDescriptor>,
    #[serde(default)]
    pub methods: Vec<MethodDescriptor>,

    #[serde(skip)]
    state_index: HashMap<String, usize>,
    #[serde(skip)]
    event_index: HashMap<String, usize>,
    #[serde(skip)]
    method_index: HashMap<String, usize>,
    #[serde(skip)]
    canonical: Arc<OnceLock<Vec<u8>>>,
}

impl Schema {
    /// Fully-qualified names of every state: `<model>/<state>`.
    pub fn all_states(&self) -> Vec<String> {
        self.states.iter().map(|s| format!("{}/{}", self.name, s.name)).collect()
    }

    /// Fully-qualified names of every event.
    pub fn all_events(&self) -> Vec<String> {
        self.events.iter().map(|e| format!("{}/{}", self.name, e.name)).collect()
    }

    /// Fully-qualified names of every method.
    pub fn all_methods(&self) -> Vec<String> {
        self.methods.iter().map(|m| format!("{}/{}", self.name, m.name)).collect()
    }

    pub fn state(&self, name: &str) -> Option<&ParamDescriptor> {
        self.state_index.get(name).map(|&i| &self.states[i])
    }

    pub fn event(&self, name: &str) -> Option<&EventDescriptor> {
        self.event_index.get(name).map(|&i| &self.events[i])
    }

    pub fn method(&self, name: &str) -> Option<&MethodDescriptor> {
        self.method_index.get(name).map(|&i| &self.methods[i])
    }

    pub fn has_state(&self, name: &str) -> bool {
        self.state_index.contains_key(name)
    }

    pub fn has_event(&self, name: &str) -> bool {
        self.event_index.contains_key(name)
    }

    /// The schema's own canonical JSON encoding, computed once and reused
    /// for every `meta-info`/`query-meta` reply.
    pub fn to_canonical_json(&self) -> &[u8] {
        self.canonical.get_or_init(|| {
            serde_json::to_vec(self).unwrap_or_else(|_| b"{}".to_vec())
        })
    }

    fn build_indices(&mut self) {
        self.state_index =
            self.states.iter().enumerate().map(|(i, s)| (s.name.clone(), i)).collect();
        self.event_index =
            self.events.iter().enumerate().map(|(i, e)| (e.name.clone(), i)).collect();
        self.method_index =
            self.methods.iter().enumerate().map(|(i, m)| (m.name.clone(), i)).collect();
    }
}
