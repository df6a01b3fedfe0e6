//! Records decoded from the sectioned CSV holdings export.

use serde::{Deserialize, Serialize};

/// One row of the account totals section (per account type or grand total).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SummaryRecord {
    pub title: String,
    pub estimate_amount: i64,
    pub estimate_amount_change: i64,
    pub estimate_amount_change_rate: f64,
    pub estimate_amount_month_change: i64,
    pub estimate_amount_month_change_rate: f64,
    pub estimate_profit_loss: i64,
    pub estimate_profit_loss_rate: f64,
    pub realized_profit_loss: i64,
    pub dividend: i64,
}

/// One position from the holdings detail section.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct HoldingRecord {
    pub kind: String,
    pub code: String,
    pub name: String,
    pub account: String,
    pub position: f64,
    pub average_cost: f64,
    pub price: f64,
    pub price_change: f64,
    pub estimate_amount: i64,
    pub estimate_profit_loss: i64,
    pub estimate_profit_loss_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ExchangeRateRecord {
    pub currency_name: String,
    pub rate: f64,
    pub unit: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AccountSnapshot {
    pub summaries: Vec<SummaryRecord>,
    pub holdings: Vec<HoldingRecord>,
    pub exchange_rates: Vec<ExchangeRateRecord>,
}

impl AccountSnapshot {
    pub fn is_empty(&self) -> bool {
        self.summaries.is_empty() && self.holdings.is_empty() && self.exchange_rates.is_empty()
    }
}
