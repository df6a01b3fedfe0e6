//! Records decoded from the JSON fund-assets export.
//!
//! Funds are grouped twice: first by how the position is held (by amount or by
//! unit count), then by the tax-treatment bucket it sits in. Both
//! classifications are closed sets, so their labels are exhaustive matches.

use serde::Serialize;
use std::fmt::{self, Display};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HoldingBasis {
    /// 金額指定保有
    Amount,
    /// 口数指定保有
    Unit,
}

impl HoldingBasis {
    pub fn as_str(self) -> &'static str {
        match self {
            HoldingBasis::Amount => "amount",
            HoldingBasis::Unit => "unit",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            HoldingBasis::Amount => "金額指定保有",
            HoldingBasis::Unit => "口数指定保有",
        }
    }
}

impl Display for HoldingBasis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DepositBasis {
    NisaGrowth,
    NisaReserve,
    Normal,
    Specific,
    Tnisa,
}

impl DepositBasis {
    pub const ALL: [DepositBasis; 5] = [
        DepositBasis::NisaGrowth,
        DepositBasis::NisaReserve,
        DepositBasis::Normal,
        DepositBasis::Specific,
        DepositBasis::Tnisa,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            DepositBasis::NisaGrowth => "nisa_growth",
            DepositBasis::NisaReserve => "nisa_reserve",
            DepositBasis::Normal => "normal",
            DepositBasis::Specific => "specific",
            DepositBasis::Tnisa => "tnisa",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            DepositBasis::NisaGrowth => "NISA (成長投資枠)",
            DepositBasis::NisaReserve => "NISA (つみたて投資枠)",
            DepositBasis::Normal => "普通預り",
            DepositBasis::Specific => "特定預り",
            DepositBasis::Tnisa => "旧つみたてNISA預り",
        }
    }
}

impl Display for DepositBasis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single fund position. Amounts are yen, rates are percentages.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct InstrumentRecord {
    pub fund_name: String,
    pub association_code: String,
    pub cost: i64,
    pub estimate_amount: i64,
    pub estimate_amount_previous: i64,
    pub estimate_change: i64,
    pub estimate_change_rate: f64,
    pub estimate_profit_loss: i64,
    pub estimate_profit_loss_previous: i64,
    pub estimate_profit_loss_rate: f64,
    pub estimate_profit_loss_rate_previous: f64,
    pub position: i64,
    pub price: f64,
    pub standard_price: i64,
    pub standard_price_previous: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DepositGroup {
    pub holding_basis: HoldingBasis,
    pub basis: DepositBasis,
    pub cost_total: i64,
    pub estimate_amount_total: i64,
    pub funds_count: i64,
    pub previous_change: i64,
    pub previous_ratio: f64,
    pub profit_loss_amount_total: i64,
    pub profit_loss_rate_total: f64,
    pub instruments: Vec<InstrumentRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HoldingGroup {
    pub basis: HoldingBasis,
    pub nisa_growth: Option<DepositGroup>,
    pub nisa_reserve: Option<DepositGroup>,
    pub normal: Option<DepositGroup>,
    pub specific: Option<DepositGroup>,
    pub tnisa: Option<DepositGroup>,
}

impl HoldingGroup {
    pub fn empty(basis: HoldingBasis) -> Self {
        Self {
            basis,
            nisa_growth: None,
            nisa_reserve: None,
            normal: None,
            specific: None,
            tnisa: None,
        }
    }

    pub fn deposit(&self, basis: DepositBasis) -> Option<&DepositGroup> {
        match basis {
            DepositBasis::NisaGrowth => self.nisa_growth.as_ref(),
            DepositBasis::NisaReserve => self.nisa_reserve.as_ref(),
            DepositBasis::Normal => self.normal.as_ref(),
            DepositBasis::Specific => self.specific.as_ref(),
            DepositBasis::Tnisa => self.tnisa.as_ref(),
        }
    }

    /// Deposits present in the export, in a fixed order. Absent slots are skipped.
    pub fn deposits(&self) -> impl Iterator<Item = &DepositGroup> + '_ {
        DepositBasis::ALL
            .into_iter()
            .filter_map(move |basis| self.deposit(basis))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FundAssets {
    pub cost_summary: i64,
    pub estimate_amount_summary: i64,
    pub estimate_profit_loss_summary: i64,
    pub estimate_profit_loss_rate_summary: f64,
    pub previous_change_summary: i64,
    pub previous_ratio_summary: f64,
    pub total_count: i64,
    pub specific_opened: bool,
    /// Amount-based group first, then unit-based. A container missing from
    /// the export is omitted.
    pub holdings: Vec<HoldingGroup>,
}
