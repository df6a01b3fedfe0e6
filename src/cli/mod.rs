pub mod collect;
pub mod setup;
pub mod ui;
