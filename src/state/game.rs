// src/state/game.rs
//! Three-section game state with a declarative update engine
//!
//! One [`GameState`] exists per agent manager and is mutated exclusively by
//! that manager's task, so no locking is needed anywhere in the update path.
//!
//! `update` resolves each inbound event in two steps:
//!
//! 1. A custom handler registered for the event type owns it exclusively and
//!    may touch any section.
//! 2. Otherwise every derived property mapping whose filter admits the event
//!    and whose key is present writes the event value verbatim into its field.
//!
//! Handlers are registered through an explicit API call; the engine never
//! executes configuration-supplied code.

use std::collections::{BTreeMap, HashMap};

use serde_json::{Map, Value};

use crate::events::Message;
use crate::state::market::{self, MarketState};
use crate::state::schema::{FieldKind, PropertyMapping, SectionKind, SectionSchema, StateSchema};
use crate::utils::errors::{EngineError, Result};

/// Handler owning the full interpretation of one event type.
///
/// A handler that fails is wrapped with the event type and re-raised; a
/// missing required key inside a handler is a hard failure, unlike the
/// soft skip of generic mappings.
pub type EventHandler = Box<dyn Fn(&mut StateSections, &Message) -> Result<()> + Send + Sync>;

#[derive(Debug, Clone)]
struct FieldSlot {
    kind: FieldKind,
    value: Value,
}

/// One dynamic state section built from its schema
#[derive(Debug, Clone, Default)]
pub struct Section {
    fields: BTreeMap<String, FieldSlot>,
}

impl Section {
    fn from_schema(schema: &SectionSchema) -> Self {
        let fields = schema
            .fields()
            .iter()
            .map(|f| {
                (
                    f.name.clone(),
                    FieldSlot {
                        kind: f.kind,
                        value: f.initial_value(),
                    },
                )
            })
            .collect();
        Self { fields }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name).map(|slot| &slot.value)
    }

    /// Write a field, enforcing the declared kind. Writing an undeclared
    /// name inserts it as an `any` field (handlers may carry extras).
    pub fn set(&mut self, name: &str, value: Value) -> Result<()> {
        match self.fields.get_mut(name) {
            Some(slot) => {
                if !slot.kind.accepts(&value) {
                    return Err(EngineError::TypeMismatch {
                        field: name.to_string(),
                        expected: slot.kind.name(),
                    });
                }
                slot.value = value;
            }
            None => {
                self.fields.insert(
                    name.to_string(),
                    FieldSlot {
                        kind: FieldKind::Any,
                        value,
                    },
                );
            }
        }
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn to_json(&self) -> Value {
        let map: Map<String, Value> = self
            .fields
            .iter()
            .map(|(name, slot)| (name.clone(), slot.value.clone()))
            .collect();
        Value::Object(map)
    }
}

/// The mutable data a handler may touch: the three sections plus the typed
/// order book.
#[derive(Debug, Default)]
pub struct StateSections {
    pub meta: Section,
    pub private: Section,
    pub public: Section,
    pub market: MarketState,
}

impl StateSections {
    pub fn section(&self, kind: SectionKind) -> &Section {
        match kind {
            SectionKind::Meta => &self.meta,
            SectionKind::Private => &self.private,
            SectionKind::Public => &self.public,
        }
    }

    pub fn section_mut(&mut self, kind: SectionKind) -> &mut Section {
        match kind {
            SectionKind::Meta => &mut self.meta,
            SectionKind::Private => &mut self.private,
            SectionKind::Public => &mut self.public,
        }
    }
}

/// Mutable aggregate owned exclusively by one agent manager
pub struct GameState {
    sections: StateSections,
    mappings: Vec<PropertyMapping>,
    handlers: HashMap<String, EventHandler>,
    market_field: Option<(SectionKind, String)>,
}

impl GameState {
    /// Instantiate a fresh state from its schema: every field at its declared
    /// default. A declared market field installs the order-book handlers.
    pub fn new(schema: &StateSchema) -> Result<Self> {
        let sections = StateSections {
            meta: Section::from_schema(&schema.meta),
            private: Section::from_schema(&schema.private),
            public: Section::from_schema(&schema.public),
            market: MarketState::default(),
        };
        let mut state = Self {
            sections,
            mappings: schema.mappings()?,
            handlers: HashMap::new(),
            market_field: schema.market_field(),
        };
        if state.market_field.is_some() {
            market::install_market_handlers(&mut state);
        }
        Ok(state)
    }

    /// Register a custom handler for an event type. The handler fully owns
    /// interpretation of matching events; mappings are not applied for them.
    pub fn register_handler(&mut self, event_type: impl Into<String>, handler: EventHandler) {
        self.handlers.insert(event_type.into(), handler);
    }

    /// Ingest one event: custom handler first, mappings otherwise.
    pub fn update(&mut self, event: &Message) -> Result<()> {
        if let Some(handler) = self.handlers.get(&event.event_type) {
            return handler(&mut self.sections, event)
                .map_err(|e| EngineError::during_update(&event.event_type, e));
        }

        for mapping in &self.mappings {
            if !mapping.applies_to(&event.event_type) {
                continue;
            }
            let Some(value) = event.data.get(&mapping.event_key) else {
                continue;
            };
            self.sections
                .section_mut(mapping.section)
                .set(&mapping.state_key, value.clone())?;
        }
        Ok(())
    }

    pub fn sections(&self) -> &StateSections {
        &self.sections
    }

    pub fn sections_mut(&mut self) -> &mut StateSections {
        &mut self.sections
    }

    pub fn meta(&self) -> &Section {
        &self.sections.meta
    }

    pub fn private_info(&self) -> &Section {
        &self.sections.private
    }

    pub fn public_info(&self) -> &Section {
        &self.sections.public
    }

    pub fn market(&self) -> &MarketState {
        &self.sections.market
    }

    /// Current phase as recorded in the meta section
    pub fn phase(&self) -> u32 {
        self.sections
            .meta
            .get("phase")
            .and_then(Value::as_u64)
            .unwrap_or(0) as u32
    }

    /// Dump the full state for prompt contexts. The declared market field, if
    /// any, serializes from the typed order book.
    pub fn snapshot(&self) -> Value {
        let mut meta = self.sections.meta.to_json();
        let mut private = self.sections.private.to_json();
        let mut public = self.sections.public.to_json();

        if let Some((section, name)) = &self.market_field {
            let book = serde_json::to_value(&self.sections.market).unwrap_or(Value::Null);
            let target = match section {
                SectionKind::Meta => &mut meta,
                SectionKind::Private => &mut private,
                SectionKind::Public => &mut public,
            };
            if let Some(obj) = target.as_object_mut() {
                obj.insert(name.clone(), book);
            }
        }

        serde_json::json!({
            "meta": meta,
            "private_information": private,
            "public_information": public,
        })
    }
}
