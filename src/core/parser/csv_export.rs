//! Parser for the sectioned holdings CSV export.
//!
//! The export is a single file holding three tables, each introduced by a
//! one-column marker row:
//!
//! ```text
//! "■資産合計欄"
//! "","時価評価額[円]","前日比[円]",...        (12 columns)
//! "■ 保有商品詳細 (すべて）"
//! "種別","銘柄コード・ティッカー","銘柄",...  (18 columns)
//! "■参考為替レート"
//! "米ドル","146.26","円/USD","(04/04  01:20)" (4 columns)
//! ```

use crate::core::error::ScrapeError;
use crate::core::number::{parse_float, parse_int};
use crate::core::snapshot::{AccountSnapshot, ExchangeRateRecord, HoldingRecord, SummaryRecord};
use csv::ReaderBuilder;
use tracing::{debug, warn};

pub const SUMMARY_MARKER: &str = "■資産合計欄";
pub const HOLDINGS_MARKER: &str = "■ 保有商品詳細 (すべて）";
pub const EXCHANGE_RATE_MARKER: &str = "■参考為替レート";

const SUMMARY_COLUMNS: usize = 12;
const HOLDING_COLUMNS: usize = 18;
const EXCHANGE_RATE_COLUMNS: usize = 4;

const HOLDINGS_HEADER: &str = "種別";
/// Bank balance row emitted before the linked bank account has been synced.
const UNAVAILABLE_TITLE: &str = "楽天銀行普通預金残高";
const UNAVAILABLE_VALUE: &str = "未取得";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Summary,
    Holdings,
    ExchangeRates,
}

impl Section {
    fn from_marker(cell: &str) -> Option<Self> {
        match cell {
            SUMMARY_MARKER => Some(Section::Summary),
            HOLDINGS_MARKER => Some(Section::Holdings),
            EXCHANGE_RATE_MARKER => Some(Section::ExchangeRates),
            _ => None,
        }
    }
}

/// Accumulates rows into a snapshot. A new parser is created per document so
/// nothing carries over between exports.
#[derive(Debug, Default)]
struct SectionParser {
    section: Option<Section>,
    snapshot: AccountSnapshot,
}

impl SectionParser {
    fn push_row(&mut self, row: &[&str]) {
        match row {
            [] => {}
            [single] => {
                if let Some(section) = Section::from_marker(single) {
                    debug!(?section, "Entering export section");
                    self.section = Some(section);
                }
            }
            _ => match self.section {
                Some(Section::Summary) => self.push_summary(row),
                Some(Section::Holdings) => self.push_holding(row),
                Some(Section::ExchangeRates) => self.push_exchange_rate(row),
                None => {}
            },
        }
    }

    fn push_summary(&mut self, row: &[&str]) {
        // Column header row has an empty first cell
        if row[0].is_empty() {
            return;
        }
        if row[0] == UNAVAILABLE_TITLE && row[1] == UNAVAILABLE_VALUE {
            return;
        }
        if row.len() != SUMMARY_COLUMNS {
            warn!(columns = row.len(), ?row, "Illegal row while parsing total assets");
            return;
        }

        self.snapshot.summaries.push(SummaryRecord {
            title: row[0].to_string(),
            estimate_amount: parse_int(row[1]),
            estimate_amount_change: parse_int(row[2]),
            estimate_amount_change_rate: parse_float(row[3]),
            estimate_amount_month_change: parse_int(row[4]),
            estimate_amount_month_change_rate: parse_float(row[5]),
            estimate_profit_loss: parse_int(row[6]),
            estimate_profit_loss_rate: parse_float(row[7]),
            realized_profit_loss: parse_int(row[9]),
            dividend: parse_int(row[10]),
        });
    }

    fn push_holding(&mut self, row: &[&str]) {
        if row[0] == HOLDINGS_HEADER {
            return;
        }
        if row.len() != HOLDING_COLUMNS {
            warn!(columns = row.len(), ?row, "Illegal row while parsing holdings");
            return;
        }

        self.snapshot.holdings.push(HoldingRecord {
            kind: row[0].to_string(),
            code: row[1].to_string(),
            name: row[2].to_string(),
            account: row[3].to_string(),
            position: parse_float(row[4]),
            average_cost: parse_float(row[6]),
            price: parse_float(row[8]),
            price_change: parse_float(row[12]),
            estimate_amount: parse_int(row[14]),
            estimate_profit_loss: parse_int(row[16]),
            estimate_profit_loss_rate: parse_float(row[17]),
        });
    }

    fn push_exchange_rate(&mut self, row: &[&str]) {
        if row.len() != EXCHANGE_RATE_COLUMNS {
            warn!(columns = row.len(), ?row, "Illegal row while parsing exchange rates");
            return;
        }

        self.snapshot.exchange_rates.push(ExchangeRateRecord {
            currency_name: row[0].to_string(),
            rate: parse_float(row[1]),
            unit: row[2].to_string(),
        });
    }
}

/// Parses decoded (UTF-8) export text. Malformed rows are logged and dropped.
pub fn parse_csv_export(text: &str) -> Result<AccountSnapshot, ScrapeError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut parser = SectionParser::default();
    for (index, record) in reader.records().enumerate() {
        let record = match record {
            Ok(record) => record,
            Err(e) => {
                warn!(line = index + 1, error = %e, "Skipping unreadable CSV record");
                continue;
            }
        };
        let row: Vec<&str> = record.iter().collect();
        parser.push_row(&row);
    }

    debug!(
        summaries = parser.snapshot.summaries.len(),
        holdings = parser.snapshot.holdings.len(),
        exchange_rates = parser.snapshot.exchange_rates.len(),
        "Parsed CSV export"
    );
    Ok(parser.snapshot)
}
