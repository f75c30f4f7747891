// src/state/mod.rs
//! Game state model
//!
//! A [`GameState`] is the typed mirror of everything one agent knows about the
//! game, split into three sections:
//!
//! - **meta**: cross-cutting identifiers (game id, phase, roster, own name)
//! - **private**: information visible only to this agent
//! - **public**: information visible to all agents
//!
//! Section layouts are declared as data ([`schema`]), not compiled in: a field
//! descriptor list produces the sections, their defaults, and the declarative
//! event-to-field mappings in one pass. Events the mappings cannot express are
//! handled by host-registered handlers ([`game::EventHandler`]), including the
//! built-in order-book mirror ([`market`]).

pub mod game;
pub mod market;
pub mod schema;

pub use game::{EventHandler, GameState, Section, StateSections};
pub use market::{MarketState, Order, OrderSide, Trade};
pub use schema::{FieldKind, FieldSpec, PropertyMapping, SectionKind, SectionSchema, StateSchema};
