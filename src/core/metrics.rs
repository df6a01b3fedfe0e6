//! Flattening of snapshots into metric records.
//!
//! Every logical record becomes one [`Metric`]: a measurement name, string
//! tags identifying the record, and numeric fields.

use crate::core::fund::{DepositGroup, FundAssets, InstrumentRecord};
use crate::core::snapshot::{AccountSnapshot, ExchangeRateRecord, HoldingRecord, SummaryRecord};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt::{self, Display};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Int(i64),
    Float(f64),
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Int(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Float(value)
    }
}

impl Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Int(i) => write!(f, "{i}i"),
            FieldValue::Float(v) => write!(f, "{v}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Metric {
    pub measurement: &'static str,
    pub tags: Vec<(&'static str, String)>,
    pub fields: Vec<(&'static str, FieldValue)>,
    pub timestamp: DateTime<Utc>,
}

impl Metric {
    pub fn new(measurement: &'static str, timestamp: DateTime<Utc>) -> Self {
        Self {
            measurement,
            tags: Vec::new(),
            fields: Vec::new(),
            timestamp,
        }
    }

    pub fn tag(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.tags.push((key, value.into()));
        self
    }

    pub fn field(mut self, key: &'static str, value: impl Into<FieldValue>) -> Self {
        self.fields.push((key, value.into()));
        self
    }

    pub fn tag_value(&self, key: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn field_value(&self, key: &str) -> Option<FieldValue> {
        self.fields.iter().find(|(k, _)| *k == key).map(|(_, v)| *v)
    }

    /// Renders the metric as one line of InfluxDB line protocol. Tags with an
    /// empty value are omitted since the protocol cannot represent them.
    pub fn to_line_protocol(&self) -> String {
        let mut line = escape(self.measurement, &[',', ' ']);
        for (key, value) in self.tags.iter().filter(|(_, v)| !v.is_empty()) {
            line.push(',');
            line.push_str(&escape(key, &[',', '=', ' ']));
            line.push('=');
            line.push_str(&escape(value, &[',', '=', ' ']));
        }
        let fields = self
            .fields
            .iter()
            .map(|(key, value)| format!("{}={value}", escape(key, &[',', '=', ' '])))
            .collect::<Vec<_>>()
            .join(",");
        line.push(' ');
        line.push_str(&fields);
        if let Some(nanos) = self.timestamp.timestamp_nanos_opt() {
            line.push(' ');
            line.push_str(&nanos.to_string());
        }
        line
    }
}

fn escape(s: &str, special: &[char]) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if special.contains(&c) || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

pub trait IntoMetrics {
    fn to_metrics(&self, timestamp: DateTime<Utc>) -> Vec<Metric>;
}

fn summary_metric(summary: &SummaryRecord, ts: DateTime<Utc>) -> Metric {
    Metric::new("rakuten_securities_asset_summaries", ts)
        .tag("title", &summary.title)
        .field("estimate_amount", summary.estimate_amount)
        .field("estimate_amount_change", summary.estimate_amount_change)
        .field("estimate_amount_change_rate", summary.estimate_amount_change_rate)
        .field("estimate_amount_month_change", summary.estimate_amount_month_change)
        .field(
            "estimate_amount_month_change_rate",
            summary.estimate_amount_month_change_rate,
        )
        .field("estimate_profit_loss", summary.estimate_profit_loss)
        .field("estimate_profit_loss_rate", summary.estimate_profit_loss_rate)
        .field("realized_profit_loss", summary.realized_profit_loss)
        .field("dividend", summary.dividend)
}

fn holding_metric(holding: &HoldingRecord, ts: DateTime<Utc>) -> Metric {
    Metric::new("rakuten_securities_assets", ts)
        .tag("kind", &holding.kind)
        .tag("code", &holding.code)
        .tag("name", &holding.name)
        .tag("account", &holding.account)
        .field("position", holding.position)
        .field("average_cost", holding.average_cost)
        .field("price", holding.price)
        .field("price_change", holding.price_change)
        .field("estimate_amount", holding.estimate_amount)
        .field("estimate_profit_loss", holding.estimate_profit_loss)
        .field("estimate_profit_loss_rate", holding.estimate_profit_loss_rate)
}

fn exchange_rate_metric(rate: &ExchangeRateRecord, ts: DateTime<Utc>) -> Metric {
    Metric::new("rakuten_securities_exchange_rates", ts)
        .tag("currency_name", &rate.currency_name)
        .tag("unit", &rate.unit)
        .field("rate", rate.rate)
}

impl IntoMetrics for AccountSnapshot {
    fn to_metrics(&self, timestamp: DateTime<Utc>) -> Vec<Metric> {
        let summaries = self.summaries.iter().map(|s| summary_metric(s, timestamp));
        let holdings = self.holdings.iter().map(|h| holding_metric(h, timestamp));
        let rates = self
            .exchange_rates
            .iter()
            .map(|r| exchange_rate_metric(r, timestamp));
        summaries.chain(holdings).chain(rates).collect()
    }
}

fn deposit_tags(metric: Metric, deposit: &DepositGroup) -> Metric {
    metric
        .tag("holding_type", deposit.holding_basis.as_str())
        .tag("holding_label", deposit.holding_basis.label())
        .tag("deposit_type", deposit.basis.as_str())
        .tag("deposit_label", deposit.basis.label())
}

fn deposit_metric(deposit: &DepositGroup, ts: DateTime<Utc>) -> Metric {
    deposit_tags(Metric::new("sbi_securities_fund_deposits", ts), deposit)
        .field("total_cost", deposit.cost_total)
        .field("total_estimate_amount", deposit.estimate_amount_total)
        .field("funds_count", deposit.funds_count)
        .field("previous_change", deposit.previous_change)
        .field("previous_ratio", deposit.previous_ratio)
        .field("total_profit_loss_amount", deposit.profit_loss_amount_total)
        .field("total_profit_loss_rate", deposit.profit_loss_rate_total)
}

fn instrument_metric(fund: &InstrumentRecord, deposit: &DepositGroup, ts: DateTime<Utc>) -> Metric {
    deposit_tags(Metric::new("sbi_securities_funds", ts), deposit)
        .tag("fund_name", &fund.fund_name)
        .tag("fund_code", &fund.association_code)
        .field("cost", fund.cost)
        .field("estimate_amount", fund.estimate_amount)
        .field("estimate_amount_previous", fund.estimate_amount_previous)
        .field("estimate_change", fund.estimate_change)
        .field("estimate_change_rate", fund.estimate_change_rate)
        .field("estimate_profit_loss", fund.estimate_profit_loss)
        .field("estimate_profit_loss_previous", fund.estimate_profit_loss_previous)
        .field("estimate_profit_loss_rate", fund.estimate_profit_loss_rate)
        .field(
            "estimate_profit_loss_rate_previous",
            fund.estimate_profit_loss_rate_previous,
        )
        .field("position", fund.position)
        .field("price", fund.price)
        .field("standard_price", fund.standard_price)
        .field("standard_price_previous", fund.standard_price_previous)
}

impl IntoMetrics for FundAssets {
    fn to_metrics(&self, timestamp: DateTime<Utc>) -> Vec<Metric> {
        let mut metrics = vec![
            Metric::new("sbi_securities_fund_summary", timestamp)
                .field("cost", self.cost_summary)
                .field("estimate_amount", self.estimate_amount_summary)
                .field(
                    "estimate_profit_loss_rate",
                    self.estimate_profit_loss_rate_summary,
                )
                .field("estimate_profit_loss", self.estimate_profit_loss_summary)
                .field("previous_change", self.previous_change_summary)
                .field("previous_ratio", self.previous_ratio_summary)
                .field("funds_count", self.total_count),
        ];

        for deposit in self.holdings.iter().flat_map(|h| h.deposits()) {
            metrics.push(deposit_metric(deposit, timestamp));
            metrics.extend(
                deposit
                    .instruments
                    .iter()
                    .map(|fund| instrument_metric(fund, deposit, timestamp)),
            );
        }
        metrics
    }
}
