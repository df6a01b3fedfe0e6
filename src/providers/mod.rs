pub mod rakuten;
pub mod sbi;

pub use rakuten::RakutenClient;
pub use sbi::SbiClient;
