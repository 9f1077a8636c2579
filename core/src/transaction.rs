//! Inbound transaction-like events, as delivered by an event source.

use crate::types::Timestamp;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One observed transfer. Immutable once produced by the feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionEvent {
    pub id:                   String,
    pub hash:                 String,
    pub amount:               Decimal,
    pub currency:             String,
    /// 0..=100, higher is riskier.
    pub risk_score:           f64,
    pub timestamp:            Timestamp,
    pub originator_address:   String,
    pub counterparty_address: String,
    pub network:              String,
    pub gas_price:            Decimal,
}

impl TransactionEvent {
    /// A USDC transfer on ethereum between two placeholder wallets.
    /// Use the `with_*` methods to fill in the rest.
    pub fn new(
        id: impl Into<String>,
        amount: Decimal,
        risk_score: f64,
        timestamp: Timestamp,
    ) -> Self {
        let id = id.into();
        Self {
            hash: format!("0x{id}"),
            id,
            amount,
            currency: "USDC".into(),
            risk_score,
            timestamp,
            originator_address: "0x0000000000000000000000000000000000000001".into(),
            counterparty_address: "0x0000000000000000000000000000000000000002".into(),
            network: "ethereum".into(),
            gas_price: Decimal::ZERO,
        }
    }

    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = currency.into();
        self
    }

    pub fn with_originator(mut self, address: impl Into<String>) -> Self {
        self.originator_address = address.into();
        self
    }

    pub fn with_counterparty(mut self, address: impl Into<String>) -> Self {
        self.counterparty_address = address.into();
        self
    }

    pub fn with_network(mut self, network: impl Into<String>) -> Self {
        self.network = network.into();
        self
    }

    pub fn with_hash(mut self, hash: impl Into<String>) -> Self {
        self.hash = hash.into();
        self
    }

    pub fn with_gas_price(mut self, gas_price: Decimal) -> Self {
        self.gas_price = gas_price;
        self
    }
}
