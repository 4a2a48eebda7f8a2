//! Typed failures for the forecast pipeline.
//!
//! The taxonomy is transport-agnostic: callers that expose the pipeline over a
//! wire protocol map [`ErrorKind`] to their own status codes.

use serde::Serialize;
use thiserror::Error;

pub type PipelineResult<T> = Result<T, PipelineError>;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum PipelineError {
    #[error("invalid site type '{0}': expected 'wind' or 'solar'")]
    InvalidSiteType(String),

    #[error("price data unavailable for {country}: {reason}")]
    PriceDataUnavailable { country: String, reason: String },

    #[error("grid emission factor unavailable for {0}")]
    GridFactorUnavailable(String),

    #[error("weather fetch failed: {0}")]
    UpstreamFetchFailure(String),

    #[error("degenerate input: {0}")]
    DegenerateInput(String),

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("site {0} not found")]
    SiteNotFound(i64),
}

/// Coarse error classes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    Configuration,
    Dependency,
    Upstream,
    Input,
    NotFound,
}

impl PipelineError {
    pub fn price_unavailable(country: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::PriceDataUnavailable {
            country: country.into(),
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidSiteType(_) | Self::InvalidConfiguration(_) => ErrorKind::Configuration,
            Self::PriceDataUnavailable { .. } | Self::GridFactorUnavailable(_) => {
                ErrorKind::Dependency
            }
            Self::UpstreamFetchFailure(_) => ErrorKind::Upstream,
            Self::DegenerateInput(_) => ErrorKind::Input,
            Self::SiteNotFound(_) => ErrorKind::NotFound,
        }
    }

    /// Whether a caller may retry once reference data or the upstream recovers.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Dependency | ErrorKind::Upstream)
    }
}
