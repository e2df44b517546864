pub mod aggregate;
pub mod archive;
pub mod config;
pub mod date;
pub mod error;
pub mod fetch;
pub mod filter;
pub mod orchestrator;
pub mod output;
pub mod pipeline;
pub mod project;
pub mod sort;
pub mod stats;
pub mod table;
pub mod window;
