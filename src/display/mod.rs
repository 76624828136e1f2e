//! Terminal output helpers.

pub mod tables;

pub use tables::{TableBuilder, product_table, results_table, stats_table};
