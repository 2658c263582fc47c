pub mod aggregate;
pub mod config;
pub mod domain;
pub mod error;
pub mod extract;
pub mod flatten;
pub mod input;
pub mod output;
pub mod pipeline;
pub mod sector;
pub mod store;
pub mod transport;
