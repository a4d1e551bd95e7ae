pub mod fetch;
pub mod queries;

pub use fetch::{Game, GridFetcher, Series};
