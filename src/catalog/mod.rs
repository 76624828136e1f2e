//! Catalog data model: product records, metadata patches and search filters.

mod filters;
mod product;

pub use filters::SearchFilters;
pub(crate) use filters::{contains_ignore_case, overlap_count_ignore_case};
pub use product::{Availability, ProductPatch, ProductRecord};
