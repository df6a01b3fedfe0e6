//! Core scraping abstractions shared by every brokerage source

pub mod browser;
pub mod collect;
pub mod config;
pub mod encoding;
pub mod error;
pub mod export;
pub mod fund;
pub mod log;
pub mod metrics;
pub mod number;
pub mod parser;
pub mod session;
pub mod snapshot;

// Re-export main types for cleaner imports
pub use collect::{BrokerageClient, collect};
pub use error::ScrapeError;
