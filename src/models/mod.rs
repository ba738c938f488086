pub mod common;
pub mod errors;
pub mod involvers;
pub mod logs;
pub mod messages;
pub mod tokens;
pub mod transactions;
