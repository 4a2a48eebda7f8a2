use serde::{Deserialize, Serialize};
use std::str::FromStr;
use validator::Validate;

use crate::error::{PipelineError, PipelineResult};

/// Generation technology of a site
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SiteType {
    Wind,
    Solar,
}

impl SiteType {
    /// Parse a raw site type as stored on a site record.
    pub fn parse(raw: &str) -> PipelineResult<Self> {
        SiteType::from_str(raw.trim()).map_err(|_| PipelineError::InvalidSiteType(raw.to_string()))
    }
}

/// Geographic location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct GeoLocation {
    #[validate(range(min = -90.0, max = 90.0))]
    pub latitude: f64,
    #[validate(range(min = -180.0, max = 180.0))]
    pub longitude: f64,
}

/// A generation site as held by the site registry.
///
/// `site_type` stays the raw string from the registry; the pipeline resolves it
/// with [`Site::kind`] so an unknown type surfaces as
/// [`PipelineError::InvalidSiteType`] at run time instead of at load time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct Site {
    pub id: i64,
    #[validate(length(min = 1))]
    pub name: String,
    #[validate(length(min = 2, max = 3))]
    pub country: String,
    #[validate(range(exclusive_min = 0.0))]
    pub capacity_mw: f64,
    pub site_type: String,
    #[validate(nested)]
    pub location: GeoLocation,
}

impl Site {
    pub fn kind(&self) -> PipelineResult<SiteType> {
        SiteType::parse(&self.site_type)
    }

    /// Check declared ranges of the record.
    pub fn check(&self) -> PipelineResult<()> {
        self.validate()
            .map_err(|e| PipelineError::InvalidConfiguration(format!("site {}: {e}", self.id)))
    }
}
