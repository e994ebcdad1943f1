//! Raw Delta Exchange API payloads and their conversions into core types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use straddle_core::{
    Contract, OrderHandle, OrderKind, OrderRequest, OrderState, Side, WalletBalance,
};

use crate::expiry::parse_option_symbol;

/// Standard `{ success, result, error }` response wrapper.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawEnvelope<T> {
    #[serde(default)]
    pub success: bool,
    pub result: Option<T>,
    pub error: Option<serde_json::Value>,
}

impl<T> RawEnvelope<T> {
    /// Describes the venue error, if any.
    pub fn error_message(&self) -> String {
        match &self.error {
            Some(serde_json::Value::Object(map)) => map
                .get("code")
                .and_then(|c| c.as_str())
                .map_or_else(|| serde_json::Value::Object(map.clone()).to_string(), str::to_string),
            Some(other) => other.to_string(),
            None => "unsuccessful response without error detail".to_string(),
        }
    }
}

/// Product listing entry.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawProduct {
    pub id: i64,
    pub symbol: String,
    pub contract_type: Option<String>,
    pub strike_price: Option<Decimal>,
    pub settlement_time: Option<String>,
    pub state: Option<String>,
}

impl RawProduct {
    /// Converts a listing entry into a contract. Non-option products and
    /// symbols that do not parse yield `None`.
    pub fn into_contract(self) -> Option<Contract> {
        if let Some(contract_type) = self.contract_type.as_deref() {
            if contract_type != "call_options" && contract_type != "put_options" {
                return None;
            }
        }
        if matches!(self.state.as_deref(), Some(state) if state != "live") {
            return None;
        }

        let parsed = parse_option_symbol(&self.symbol)?;
        let expiry_date = self
            .settlement_time
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|d| d.with_timezone(&Utc).date_naive())
            .unwrap_or(parsed.expiry_date);

        Some(Contract {
            symbol: self.symbol,
            underlying: parsed.underlying,
            kind: parsed.kind,
            strike: self.strike_price.unwrap_or(parsed.strike),
            expiry: parsed.expiry_tag,
            expiry_date: Some(expiry_date),
            product_id: self.id,
        })
    }
}

/// Ticker snapshot.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawTicker {
    #[allow(dead_code)]
    pub symbol: Option<String>,
    pub mark_price: Option<Decimal>,
    pub spot_price: Option<Decimal>,
}

/// Order as returned by the venue.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawOrder {
    pub id: i64,
    pub product_symbol: Option<String>,
    pub side: Option<String>,
    pub size: Option<u32>,
    pub unfilled_size: Option<u32>,
    pub state: Option<String>,
    pub average_fill_price: Option<Decimal>,
}

impl RawOrder {
    fn order_state(&self) -> OrderState {
        match self.state.as_deref() {
            Some("closed" | "cancelled") => self.done_state(),
            Some("rejected") => OrderState::Rejected,
            _ => OrderState::Pending,
        }
    }

    /// A finished order is filled, partly filled or cancelled depending on
    /// how much of it executed.
    fn done_state(&self) -> OrderState {
        let unfilled = self.unfilled_size.unwrap_or(0);
        let size = self.size.unwrap_or(unfilled);
        let filled = size.saturating_sub(unfilled);

        if unfilled == 0 && self.state.as_deref() == Some("closed") {
            OrderState::Filled
        } else if filled == 0 {
            OrderState::Cancelled
        } else {
            OrderState::PartiallyFilled { filled }
        }
    }

    /// Converts into an order handle, falling back to the request for
    /// fields the venue omitted.
    pub fn into_handle(self, request: Option<&OrderRequest>) -> OrderHandle {
        let state = self.order_state();
        let side = match self.side.as_deref() {
            Some("sell") => Side::Sell,
            Some("buy") => Side::Buy,
            _ => request.map_or(Side::Buy, |r| r.side),
        };

        OrderHandle {
            order_id: self.id.to_string(),
            symbol: self
                .product_symbol
                .or_else(|| request.map(|r| r.symbol.clone()))
                .unwrap_or_default(),
            side,
            quantity: self
                .size
                .or_else(|| request.map(|r| r.quantity))
                .unwrap_or(0),
            state,
            avg_fill_price: self.average_fill_price.filter(|p| !p.is_zero()),
        }
    }
}

/// Wallet balance row.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawWalletBalance {
    pub asset_symbol: String,
    pub balance: Option<Decimal>,
    pub available_balance: Option<Decimal>,
}

impl From<RawWalletBalance> for WalletBalance {
    fn from(raw: RawWalletBalance) -> Self {
        let balance = raw.balance.unwrap_or_default();
        Self {
            asset: raw.asset_symbol,
            balance,
            available: raw.available_balance.unwrap_or(balance),
        }
    }
}

/// Order placement body for `POST /v2/orders`.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct RawOrderRequest {
    pub product_id: i64,
    pub product_symbol: String,
    pub size: u32,
    pub side: String,
    pub order_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit_price: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_order_type: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_price: Option<String>,
    pub time_in_force: &'static str,
    pub post_only: bool,
    pub reduce_only: bool,
    pub client_order_id: String,
}

impl RawOrderRequest {
    pub fn new(order: &OrderRequest, client_order_id: String) -> Self {
        let (order_type, limit_price, stop_order_type, stop_price) = match order.kind {
            OrderKind::Market => ("market_order", None, None, None),
            OrderKind::Limit { price } => ("limit_order", Some(price.to_string()), None, None),
            OrderKind::StopLimit { trigger, limit } => (
                "limit_order",
                Some(limit.to_string()),
                Some("stop_loss_order"),
                Some(trigger.to_string()),
            ),
        };

        Self {
            product_id: order.product_id,
            product_symbol: order.symbol.clone(),
            size: order.quantity,
            side: order.side.to_string(),
            order_type,
            limit_price,
            stop_order_type,
            stop_price,
            time_in_force: "gtc",
            post_only: false,
            reduce_only: order.reduce_only,
            client_order_id,
        }
    }
}
