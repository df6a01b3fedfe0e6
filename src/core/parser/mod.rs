//! Decoders that turn raw export payloads into domain snapshots.

pub mod csv_export;
pub mod fund_assets;

pub use csv_export::parse_csv_export;
pub use fund_assets::parse_fund_assets;
