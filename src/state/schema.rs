// src/state/schema.rs
//! Declarative state schema
//!
//! Section layouts arrive as configuration data, so state types are built at
//! startup from explicit field descriptors rather than compiled in. A closed
//! [`FieldKind`] registry maps declared type names to value shapes (no runtime
//! type-name evaluation), and one [`PropertyMapping`] per field is derived at
//! schema-construction time (no reflection later).

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::utils::errors::{EngineError, Result};

/// Closed registry of declarable field types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Int,
    Float,
    Str,
    Bool,
    List,
    Dict,
    Any,
    /// Order-book sub-state; excluded from generic mapping and mirrored from
    /// the typed [`crate::state::MarketState`]
    #[serde(alias = "MarketState")]
    Market,
}

impl FieldKind {
    pub fn name(&self) -> &'static str {
        match self {
            FieldKind::Int => "int",
            FieldKind::Float => "float",
            FieldKind::Str => "str",
            FieldKind::Bool => "bool",
            FieldKind::List => "list",
            FieldKind::Dict => "dict",
            FieldKind::Any => "any",
            FieldKind::Market => "market",
        }
    }

    /// The value a field of this kind holds when no default is declared
    pub fn zero(&self) -> Value {
        match self {
            FieldKind::Int => json!(0),
            FieldKind::Float => json!(0.0),
            FieldKind::Str => json!(""),
            FieldKind::Bool => json!(false),
            FieldKind::List => json!([]),
            FieldKind::Dict => json!({}),
            FieldKind::Any => Value::Null,
            FieldKind::Market => json!({"orders": {}, "trades": []}),
        }
    }

    /// Whether a JSON value is admissible for this kind.
    ///
    /// Null is always admissible; the schema enforces shape, not presence.
    pub fn accepts(&self, value: &Value) -> bool {
        if value.is_null() {
            return true;
        }
        match self {
            FieldKind::Int => value.is_i64() || value.is_u64(),
            FieldKind::Float => value.is_number(),
            FieldKind::Str => value.is_string(),
            FieldKind::Bool => value.is_boolean(),
            FieldKind::List => value.is_array(),
            FieldKind::Dict | FieldKind::Market => value.is_object(),
            FieldKind::Any => true,
        }
    }
}

/// Descriptor for one field of a state section
#[derive(Debug, Clone)]
pub struct FieldSpec {
    /// Field name in the section (snake_case)
    pub name: String,

    /// Declared type, from the closed registry
    pub kind: FieldKind,

    /// Declared default; the kind's zero value when absent
    pub default: Option<Value>,

    /// Event-data key override; camelCase of `name` when absent
    pub event_key: Option<String>,

    /// Skip automatic mapping (for fields only touched by custom handlers)
    pub exclude_from_mapping: bool,

    /// Allow-list of event types the mapping applies in
    pub events: Option<Vec<String>>,

    /// Deny-list of event types the mapping is skipped in
    pub exclude_events: Option<Vec<String>>,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            default: None,
            event_key: None,
            exclude_from_mapping: false,
            events: None,
            exclude_events: None,
        }
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    pub fn with_event_key(mut self, event_key: impl Into<String>) -> Self {
        self.event_key = Some(event_key.into());
        self
    }

    pub fn excluded_from_mapping(mut self) -> Self {
        self.exclude_from_mapping = true;
        self
    }

    pub fn with_events(mut self, events: Vec<String>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_exclude_events(mut self, exclude_events: Vec<String>) -> Self {
        self.exclude_events = Some(exclude_events);
        self
    }

    /// The event-data key the mapping for this field listens on
    pub fn derived_event_key(&self) -> String {
        self.event_key
            .clone()
            .unwrap_or_else(|| snake_to_camel(&self.name))
    }

    /// The value a fresh instance of this field holds
    pub fn initial_value(&self) -> Value {
        self.default.clone().unwrap_or_else(|| self.kind.zero())
    }

    fn validate(&self) -> Result<()> {
        if self.events.is_some() && self.exclude_events.is_some() {
            return Err(EngineError::Config(format!(
                "field '{}' cannot specify both events and exclude_events",
                self.name
            )));
        }
        if let Some(default) = &self.default {
            if !self.kind.accepts(default) {
                return Err(EngineError::Config(format!(
                    "field '{}' declares a default incompatible with type '{}'",
                    self.name,
                    self.kind.name()
                )));
            }
        }
        Ok(())
    }
}

/// Convert a snake_case field name to its camelCase event key
pub fn snake_to_camel(name: &str) -> String {
    let mut parts = name.split('_');
    let mut out = String::with_capacity(name.len());
    if let Some(first) = parts.next() {
        out.push_str(first);
    }
    for part in parts {
        let mut chars = part.chars();
        if let Some(c) = chars.next() {
            out.extend(c.to_uppercase());
            out.push_str(chars.as_str());
        }
    }
    out
}

/// Which of the three state sections a mapping writes into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionKind {
    Meta,
    Private,
    Public,
}

impl SectionKind {
    pub fn name(&self) -> &'static str {
        match self {
            SectionKind::Meta => "meta",
            SectionKind::Private => "private",
            SectionKind::Public => "public",
        }
    }
}

/// Declarative rule binding an event-data key to a state field.
///
/// Each mapping writes a disjoint field, so application order does not matter.
#[derive(Debug, Clone)]
pub struct PropertyMapping {
    pub event_key: String,
    pub state_key: String,
    pub section: SectionKind,
    pub events: Option<Vec<String>>,
    pub exclude_events: Option<Vec<String>>,
}

impl PropertyMapping {
    pub fn new(
        event_key: impl Into<String>,
        state_key: impl Into<String>,
        section: SectionKind,
    ) -> Self {
        Self {
            event_key: event_key.into(),
            state_key: state_key.into(),
            section,
            events: None,
            exclude_events: None,
        }
    }

    /// Attach allow/deny event filters; specifying both is a configuration
    /// error.
    pub fn with_filters(
        mut self,
        events: Option<Vec<String>>,
        exclude_events: Option<Vec<String>>,
    ) -> Result<Self> {
        if events.is_some() && exclude_events.is_some() {
            return Err(EngineError::Config(format!(
                "mapping for '{}' cannot specify both events and exclude_events",
                self.state_key
            )));
        }
        self.events = events;
        self.exclude_events = exclude_events;
        Ok(self)
    }

    /// Whether this mapping applies for the given event type
    pub fn applies_to(&self, event_type: &str) -> bool {
        if let Some(events) = &self.events {
            return events.iter().any(|e| e == event_type);
        }
        if let Some(excluded) = &self.exclude_events {
            return !excluded.iter().any(|e| e == event_type);
        }
        true
    }
}

/// Ordered field list for one section
#[derive(Debug, Clone, Default)]
pub struct SectionSchema {
    fields: Vec<FieldSpec>,
}

impl SectionSchema {
    pub fn new(fields: Vec<FieldSpec>) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    fn contains(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f.name == name)
    }

    fn validate(&self, section: SectionKind) -> Result<()> {
        for (idx, field) in self.fields.iter().enumerate() {
            field.validate()?;
            if self.fields[..idx].iter().any(|f| f.name == field.name) {
                return Err(EngineError::Config(format!(
                    "duplicate field '{}' in {} section",
                    field.name,
                    section.name()
                )));
            }
        }
        Ok(())
    }
}

/// The full three-section layout plus derived mappings.
///
/// Built once per experiment; immutable thereafter.
#[derive(Debug, Clone)]
pub struct StateSchema {
    pub meta: SectionSchema,
    pub private: SectionSchema,
    pub public: SectionSchema,
}

impl StateSchema {
    /// Baseline meta fields every game carries, merged ahead of the
    /// config-declared ones.
    fn baseline_meta() -> Vec<FieldSpec> {
        vec![
            FieldSpec::new("game_id", FieldKind::Int).excluded_from_mapping(),
            FieldSpec::new("player_name", FieldKind::Str)
                .with_event_key("name")
                .with_events(vec!["assign-name".into()]),
            FieldSpec::new("player_number", FieldKind::Int)
                .with_event_key("number")
                .with_events(vec!["assign-name".into()]),
            FieldSpec::new("players", FieldKind::List),
            FieldSpec::new("phase", FieldKind::Int),
        ]
    }

    pub fn new(
        meta: SectionSchema,
        private: SectionSchema,
        public: SectionSchema,
    ) -> Result<Self> {
        let mut merged_meta = Self::baseline_meta();
        merged_meta.retain(|f| !meta.contains(&f.name));
        merged_meta.extend(meta.fields.iter().cloned());

        let schema = Self {
            meta: SectionSchema::new(merged_meta),
            private,
            public,
        };
        schema.meta.validate(SectionKind::Meta)?;
        schema.private.validate(SectionKind::Private)?;
        schema.public.validate(SectionKind::Public)?;
        Ok(schema)
    }

    pub fn section(&self, kind: SectionKind) -> &SectionSchema {
        match kind {
            SectionKind::Meta => &self.meta,
            SectionKind::Private => &self.private,
            SectionKind::Public => &self.public,
        }
    }

    /// Derive the full mapping list: one mapping per non-excluded field.
    ///
    /// Market-kind fields never map generically; the order-book handlers own
    /// their events.
    pub fn mappings(&self) -> Result<Vec<PropertyMapping>> {
        let mut mappings = Vec::new();
        for kind in [SectionKind::Meta, SectionKind::Private, SectionKind::Public] {
            for field in self.section(kind).fields() {
                if field.exclude_from_mapping || field.kind == FieldKind::Market {
                    continue;
                }
                mappings.push(
                    PropertyMapping::new(field.derived_event_key(), field.name.clone(), kind)
                        .with_filters(field.events.clone(), field.exclude_events.clone())?,
                );
            }
        }
        Ok(mappings)
    }

    /// Locate the declared market field, if any
    pub fn market_field(&self) -> Option<(SectionKind, String)> {
        for kind in [SectionKind::Public, SectionKind::Private, SectionKind::Meta] {
            if let Some(field) = self
                .section(kind)
                .fields()
                .iter()
                .find(|f| f.kind == FieldKind::Market)
            {
                return Some((kind, field.name.clone()));
            }
        }
        None
    }
}
