pub mod involvers;
pub mod logs;
pub mod transactions;
