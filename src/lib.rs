pub mod app;
pub mod archive;
pub mod classifier;
pub mod config;
pub mod dataset;
pub mod domain;
pub mod error;
pub mod fetcher;
pub mod field_index;
pub mod output;
pub mod schema;
pub mod store;
pub mod table;
pub mod transform;
