// Kagami image gateway library

pub mod blob;
pub mod coalescing;
pub mod config;
pub mod constants;
pub mod engine;
pub mod error;
pub mod loader;
pub mod logging;
pub mod params;
pub mod processor;
pub mod proxy;
pub mod storage;
pub mod store;
