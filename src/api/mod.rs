pub mod client;
pub mod source;

pub use client::ForecastApi;
pub use source::{MatchSource, ReliabilitySource};
