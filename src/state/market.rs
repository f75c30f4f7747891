// src/state/market.rs
//! Passive order-book mirror
//!
//! The book mirrors server-authoritative truth: the client performs no
//! matching or validation, it only keeps current depth readable for agents
//! building a decision. Fills arrive as separate `update-order` /
//! `delete-order` events, so `contract-fulfilled` records the trade without
//! touching the matched orders.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::events::Message;
use crate::state::game::{GameState, StateSections};
use crate::utils::errors::{EngineError, Result};

/// Event types the order book consumes
pub const MARKET_EVENTS: [&str; 4] = [
    "add-order",
    "update-order",
    "delete-order",
    "contract-fulfilled",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Bid,
    Ask,
}

/// A resting order as announced by the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: u64,
    pub sender: u64,
    pub price: f64,
    pub quantity: f64,
    #[serde(rename = "type")]
    pub side: OrderSide,
    #[serde(default)]
    pub condition: Option<i64>,
    /// Immediate-execution flag
    #[serde(default)]
    pub now: bool,
}

/// An executed trade between two players
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    #[serde(rename = "from")]
    pub from_id: u64,
    #[serde(rename = "to")]
    pub to_id: u64,
    pub price: f64,
    #[serde(default = "default_quantity")]
    pub quantity: f64,
    #[serde(default)]
    pub condition: Option<i64>,
    #[serde(default)]
    pub median: Option<f64>,
}

fn default_quantity() -> f64 {
    1.0
}

/// Current market state: the open order book plus the trade log
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarketState {
    /// Active orders keyed by order id; each id appears at most once
    pub orders: HashMap<u64, Order>,

    /// Append-only log of executed trades
    pub trades: Vec<Trade>,
}

impl MarketState {
    /// Apply one market event to the book.
    ///
    /// - `add-order`: insert; an id collision overwrites (last write wins)
    /// - `update-order`: replace the record in place; an absent id behaves
    ///   like add (idempotent upsert)
    /// - `delete-order`: remove; an absent id is a silent no-op
    /// - `contract-fulfilled`: append the trade, leave the orders alone
    pub fn apply(&mut self, event_type: &str, data: &Map<String, Value>) -> Result<()> {
        match event_type {
            "add-order" | "update-order" => {
                let order = decode_order(data)?;
                self.orders.insert(order.id, order);
            }
            "delete-order" => {
                self.orders.remove(&order_id(data)?);
            }
            "contract-fulfilled" => {
                let trade: Trade = serde_json::from_value(Value::Object(data.clone()))?;
                self.trades.push(trade);
            }
            _ => {}
        }
        Ok(())
    }

    /// All resting orders placed by the given player
    pub fn orders_from(&self, player: u64) -> Vec<&Order> {
        self.orders
            .values()
            .filter(|order| order.sender == player)
            .collect()
    }
}

fn order_payload(data: &Map<String, Value>) -> Result<&Value> {
    data.get("order").ok_or_else(|| EngineError::MissingEventKey {
        key: "order".into(),
    })
}

fn decode_order(data: &Map<String, Value>) -> Result<Order> {
    Ok(serde_json::from_value(order_payload(data)?.clone())?)
}

fn order_id(data: &Map<String, Value>) -> Result<u64> {
    order_payload(data)?
        .get("id")
        .and_then(Value::as_u64)
        .ok_or_else(|| EngineError::MissingEventKey {
            key: "order.id".into(),
        })
}

/// Route the four market events into the state's order book.
///
/// Installed automatically when the schema declares a market-kind field.
pub fn install_market_handlers(state: &mut GameState) {
    for event in MARKET_EVENTS {
        state.register_handler(
            event,
            Box::new(|sections: &mut StateSections, message: &Message| {
                sections.market.apply(&message.event_type, &message.data)
            }),
        );
    }
}
