//! GreenFleet forecasting
//!
//! Turns hourly weather forecasts for wind and solar sites into production,
//! revenue and CO₂-savings series, optionally with a co-located battery
//! arbitraging against the price curve.

pub mod config;
pub mod controller;
pub mod domain;
pub mod error;
pub mod forecast;
pub mod optimizer;
pub mod repo;
pub mod telemetry;

pub use error::{ErrorKind, PipelineError, PipelineResult};
