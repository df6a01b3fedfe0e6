//! Parser for the JSON fund-assets export.
//!
//! The wire document nests deposits by name under two holding containers
//! (`amountHoldings`, `unitHoldings`). Decoding goes through loose DTOs first;
//! classification tags are attached while converting them into the
//! [`FundAssets`] domain types.

use crate::core::error::ScrapeError;
use crate::core::fund::{
    DepositBasis, DepositGroup, FundAssets, HoldingBasis, HoldingGroup, InstrumentRecord,
};
use crate::core::number::{parse_float, parse_int};
use serde::Deserialize;
use tracing::{debug, warn};

const SUCCESS_STATUS: &str = "SUCCESS";

/// A numeric field that the API sends as a decimal string, a JSON number, or
/// `null` depending on the field and the day.
#[derive(Debug, Default, Deserialize)]
#[serde(untagged)]
enum Lenient {
    Int(i64),
    Float(f64),
    Text(String),
    #[default]
    Missing,
}

impl Lenient {
    fn as_i64(&self) -> i64 {
        match self {
            Lenient::Int(i) => *i,
            Lenient::Float(f) => f.round() as i64,
            Lenient::Text(s) => parse_int(s),
            Lenient::Missing => 0,
        }
    }

    fn as_f64(&self) -> f64 {
        match self {
            Lenient::Int(i) => *i as f64,
            Lenient::Float(f) => *f,
            Lenient::Text(s) => parse_float(s),
            Lenient::Missing => 0.0,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawFundAssets {
    #[serde(default)]
    status: String,
    data: Option<RawData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawData {
    amount_holdings: Option<RawHoldings>,
    unit_holdings: Option<RawHoldings>,
    #[serde(default)]
    cost_summary: Lenient,
    #[serde(default)]
    estimate_amount_summary: Lenient,
    #[serde(default)]
    estimate_profit_loss_rate_summary: Lenient,
    #[serde(default)]
    estimate_profit_loss_summary: Lenient,
    #[serde(default)]
    previous_change_summary: Lenient,
    #[serde(default)]
    previous_ratio_summary: Lenient,
    #[serde(default)]
    specific_opened: bool,
    #[serde(default)]
    total_count: Lenient,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawHoldings {
    nisa_growth: Option<RawDeposit>,
    nisa_reserve: Option<RawDeposit>,
    normal_deposit: Option<RawDeposit>,
    specific_deposit: Option<RawDeposit>,
    tnisa_deposit: Option<RawDeposit>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDeposit {
    #[serde(default)]
    cost_total: Lenient,
    #[serde(default)]
    estimate_amount_total: Lenient,
    #[serde(default)]
    fund_infos: Option<Vec<serde_json::Value>>,
    #[serde(default)]
    hit_count: Lenient,
    #[serde(default)]
    previous_change: Lenient,
    #[serde(default)]
    previous_ratio: Lenient,
    #[serde(default)]
    profit_loss_amount_total: Lenient,
    #[serde(default)]
    profit_loss_rate_total: Lenient,
}

// The API spells "previous" as "privious"; accept both.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawFundInfo {
    #[serde(default)]
    association_code: String,
    #[serde(default)]
    fund_name: String,
    #[serde(default)]
    cost: Lenient,
    #[serde(default)]
    estimate_amount: Lenient,
    #[serde(default, rename = "estimateAmountPrivious", alias = "estimateAmountPrevious")]
    estimate_amount_previous: Lenient,
    #[serde(default)]
    estimate_change: Lenient,
    #[serde(default)]
    estimate_change_rate: Lenient,
    #[serde(default)]
    estimate_profit_loss: Lenient,
    #[serde(
        default,
        rename = "estimateProfitLossPrivious",
        alias = "estimateProfitLossPrevious"
    )]
    estimate_profit_loss_previous: Lenient,
    #[serde(default)]
    estimate_profit_loss_rate: Lenient,
    #[serde(
        default,
        rename = "estimateProfitLossRatePrivious",
        alias = "estimateProfitLossRatePrevious"
    )]
    estimate_profit_loss_rate_previous: Lenient,
    #[serde(default)]
    position: Lenient,
    #[serde(default)]
    price: Lenient,
    #[serde(default)]
    standard_price: Lenient,
    #[serde(
        default,
        rename = "standardPricePrivious",
        alias = "standardPricePrevious"
    )]
    standard_price_previous: Lenient,
}

impl From<RawFundInfo> for InstrumentRecord {
    fn from(raw: RawFundInfo) -> Self {
        InstrumentRecord {
            fund_name: raw.fund_name,
            association_code: raw.association_code,
            cost: raw.cost.as_i64(),
            estimate_amount: raw.estimate_amount.as_i64(),
            estimate_amount_previous: raw.estimate_amount_previous.as_i64(),
            estimate_change: raw.estimate_change.as_i64(),
            estimate_change_rate: raw.estimate_change_rate.as_f64(),
            estimate_profit_loss: raw.estimate_profit_loss.as_i64(),
            estimate_profit_loss_previous: raw.estimate_profit_loss_previous.as_i64(),
            estimate_profit_loss_rate: raw.estimate_profit_loss_rate.as_f64(),
            estimate_profit_loss_rate_previous: raw.estimate_profit_loss_rate_previous.as_f64(),
            position: raw.position.as_i64(),
            price: raw.price.as_f64(),
            standard_price: raw.standard_price.as_i64(),
            standard_price_previous: raw.standard_price_previous.as_i64(),
        }
    }
}

fn classify_deposit(
    raw: Option<RawDeposit>,
    holding_basis: HoldingBasis,
    basis: DepositBasis,
) -> Option<DepositGroup> {
    let raw = raw?;
    let instruments = raw
        .fund_infos
        .unwrap_or_default()
        .into_iter()
        .enumerate()
        .filter_map(|(index, value)| match serde_json::from_value::<RawFundInfo>(value) {
            Ok(info) => Some(InstrumentRecord::from(info)),
            Err(e) => {
                warn!(
                    %holding_basis,
                    deposit = %basis,
                    index,
                    error = %e,
                    "Skipping malformed fund record"
                );
                None
            }
        })
        .collect();

    Some(DepositGroup {
        holding_basis,
        basis,
        cost_total: raw.cost_total.as_i64(),
        estimate_amount_total: raw.estimate_amount_total.as_i64(),
        funds_count: raw.hit_count.as_i64(),
        previous_change: raw.previous_change.as_i64(),
        previous_ratio: raw.previous_ratio.as_f64(),
        profit_loss_amount_total: raw.profit_loss_amount_total.as_i64(),
        profit_loss_rate_total: raw.profit_loss_rate_total.as_f64(),
        instruments,
    })
}

fn classify_holdings(raw: RawHoldings, basis: HoldingBasis) -> HoldingGroup {
    HoldingGroup {
        basis,
        nisa_growth: classify_deposit(raw.nisa_growth, basis, DepositBasis::NisaGrowth),
        nisa_reserve: classify_deposit(raw.nisa_reserve, basis, DepositBasis::NisaReserve),
        normal: classify_deposit(raw.normal_deposit, basis, DepositBasis::Normal),
        specific: classify_deposit(raw.specific_deposit, basis, DepositBasis::Specific),
        tnisa: classify_deposit(raw.tnisa_deposit, basis, DepositBasis::Tnisa),
    }
}

pub fn parse_fund_assets(body: &[u8]) -> Result<FundAssets, ScrapeError> {
    let raw: RawFundAssets = serde_json::from_slice(body)
        .map_err(|e| ScrapeError::Parse(format!("invalid fund assets document: {e}")))?;

    if raw.status != SUCCESS_STATUS {
        return Err(ScrapeError::Parse(format!(
            "unexpected fund assets status: {:?}",
            raw.status
        )));
    }
    let data = raw
        .data
        .ok_or_else(|| ScrapeError::Parse("fund assets document has no data".to_string()))?;

    let mut holdings = Vec::with_capacity(2);
    for (container, basis) in [
        (data.amount_holdings, HoldingBasis::Amount),
        (data.unit_holdings, HoldingBasis::Unit),
    ] {
        match container {
            Some(raw_holdings) => holdings.push(classify_holdings(raw_holdings, basis)),
            None => debug!(%basis, "Holding container absent from export"),
        }
    }

    Ok(FundAssets {
        cost_summary: data.cost_summary.as_i64(),
        estimate_amount_summary: data.estimate_amount_summary.as_i64(),
        estimate_profit_loss_summary: data.estimate_profit_loss_summary.as_i64(),
        estimate_profit_loss_rate_summary: data.estimate_profit_loss_rate_summary.as_f64(),
        previous_change_summary: data.previous_change_summary.as_i64(),
        previous_ratio_summary: data.previous_ratio_summary.as_f64(),
        total_count: data.total_count.as_i64(),
        specific_opened: data.specific_opened,
        holdings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const NORMAL_ONLY: &str = r#"{
        "status": "SUCCESS",
        "data": {
            "amountHoldings": {
                "juniorNisaContinuous": null,
                "nisaGrowth": null,
                "normalDeposit": {
                    "costTotal": "100000",
                    "estimateAmountTotal": "123,456",
                    "fundInfos": [
                        {
                            "associationCode": "0331418A",
                            "fundName": "ｅＭＡＸＩＳ　Ｓｌｉｍ　米国株式（Ｓ＆Ｐ５００）",
                            "cost": 100000,
                            "estimateAmount": "123456",
                            "estimateAmountPrivious": "122000",
                            "estimateChange": "+1456",
                            "estimateChangeRate": 1.19,
                            "estimateProfitLoss": "23456",
                            "estimateProfitLossPrivious": "22000",
                            "estimateProfitLossRate": 23.45,
                            "estimateProfitLossRatePrivious": 22.0,
                            "position": "41234",
                            "price": 24251.5,
                            "standardPrice": 29940,
                            "standardPricePrivious": 29587
                        }
                    ],
                    "hitCount": 1,
                    "previousChange": "1456",
                    "previousRatio": 1.19,
                    "profitLossAmountTotal": "23456",
                    "profitLossRateTotal": 23.45
                }
            },
            "unitHoldings": {},
            "costSummary": "100000",
            "estimateAmountSummary": "123456",
            "estimateProfitLossRateSummary": 23.45,
            "estimateProfitLossSummary": "23456",
            "previousChangeSummary": "1456",
            "previousRatioSummary": 1.19,
            "specificOpened": true,
            "totalCount": 1
        }
    }"#;

    #[test]
    fn test_classification_enrichment() {
        let assets = parse_fund_assets(NORMAL_ONLY.as_bytes()).unwrap();

        assert_eq!(assets.holdings.len(), 2);
        let amount = &assets.holdings[0];
        assert_eq!(amount.basis, HoldingBasis::Amount);
        assert_eq!(assets.holdings[1].basis, HoldingBasis::Unit);

        let deposits: Vec<_> = amount.deposits().collect();
        assert_eq!(deposits.len(), 1);
        let normal = deposits[0];
        assert_eq!(normal.holding_basis, HoldingBasis::Amount);
        assert_eq!(normal.basis, DepositBasis::Normal);
        assert_eq!(normal.estimate_amount_total, 123_456);
        assert_eq!(normal.funds_count, 1);

        assert_eq!(assets.holdings[1].deposits().count(), 0);
    }

    #[test]
    fn test_instrument_fields() {
        let assets = parse_fund_assets(NORMAL_ONLY.as_bytes()).unwrap();
        let normal = assets.holdings[0].deposit(DepositBasis::Normal).unwrap();
        let fund = &normal.instruments[0];

        assert_eq!(fund.association_code, "0331418A");
        assert_eq!(fund.cost, 100_000);
        assert_eq!(fund.estimate_amount_previous, 122_000);
        assert_eq!(fund.estimate_change, 1_456);
        assert_eq!(fund.estimate_profit_loss_previous, 22_000);
        assert_eq!(fund.estimate_profit_loss_rate_previous, 22.0);
        assert_eq!(fund.position, 41_234);
        assert_eq!(fund.price, 24_251.5);
        assert_eq!(fund.standard_price_previous, 29_587);

        assert_eq!(assets.cost_summary, 100_000);
        assert_eq!(assets.total_count, 1);
        assert!(assets.specific_opened);
    }

    #[test]
    fn test_malformed_fund_record_is_skipped() {
        let body = r#"{
            "status": "SUCCESS",
            "data": {
                "unitHoldings": {
                    "specificDeposit": {
                        "fundInfos": [
                            {"fundName": ["not", "a", "string"]},
                            {"fundName": "ok", "estimateAmount": "-"}
                        ]
                    }
                }
            }
        }"#;
        let assets = parse_fund_assets(body.as_bytes()).unwrap();

        assert_eq!(assets.holdings.len(), 1);
        let specific = assets.holdings[0].deposit(DepositBasis::Specific).unwrap();
        assert_eq!(specific.holding_basis, HoldingBasis::Unit);
        assert_eq!(specific.instruments.len(), 1);
        assert_eq!(specific.instruments[0].fund_name, "ok");
        assert_eq!(specific.instruments[0].estimate_amount, 0);
    }

    #[test]
    fn test_unsuccessful_status_is_error() {
        let err = parse_fund_assets(br#"{"status": "ERROR", "data": null}"#).unwrap_err();
        assert!(matches!(err, ScrapeError::Parse(_)));
    }

    #[test]
    fn test_invalid_json_is_error() {
        let err = parse_fund_assets(b"<html>login</html>").unwrap_err();
        assert!(matches!(err, ScrapeError::Parse(_)));
    }
}
