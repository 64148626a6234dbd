// RustyDB Statistics - JSON-aware column histograms
// Core library module

pub mod collation;
pub mod error;
pub mod histogram;

pub use error::{Result, StatsError};
pub use histogram::{JsonFunction, JsonHistogram, Operator, Primitive};
