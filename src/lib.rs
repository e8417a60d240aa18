pub mod aggregation;
pub mod config;
pub mod error;
pub mod history_store;
pub(crate) mod persistence;
pub mod publication;
pub mod sources;
