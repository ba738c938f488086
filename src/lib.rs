pub mod backend;
pub mod metrics;
pub mod models;
pub mod server;
pub mod service;
pub mod utils;
