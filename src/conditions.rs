//! Observing conditions
//!
//! Each constraint is a small ordered enumeration of percentile bins, matching
//! the bins the legacy calculator was calibrated against. Air mass is a
//! positive real on the wire but the kernel only knows three tabulated
//! values, so it is bucketed on arrival and stays bucketed everywhere
//! downstream (including in cache keys).

use async_graphql::Enum;
use serde::{Deserialize, Serialize};

/// Delivered image quality bins, best first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Enum, Serialize, Deserialize)]
pub enum ImageQuality {
    /// 20th percentile seeing.
    #[graphql(name = "PERCENT_20")]
    #[serde(rename = "PERCENT_20")]
    Percent20,
    /// 70th percentile seeing.
    #[graphql(name = "PERCENT_70")]
    #[serde(rename = "PERCENT_70")]
    Percent70,
    /// 85th percentile seeing.
    #[graphql(name = "PERCENT_85")]
    #[serde(rename = "PERCENT_85")]
    Percent85,
    /// No constraint.
    #[graphql(name = "ANY")]
    #[serde(rename = "ANY")]
    Any,
}

/// Cloud extinction bins, clearest first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Enum, Serialize, Deserialize)]
pub enum CloudExtinction {
    /// Photometric sky, 50th percentile.
    #[graphql(name = "PERCENT_50")]
    #[serde(rename = "PERCENT_50")]
    Percent50,
    /// Thin cirrus, 70th percentile.
    #[graphql(name = "PERCENT_70")]
    #[serde(rename = "PERCENT_70")]
    Percent70,
    /// Cloudy, 80th percentile.
    #[graphql(name = "PERCENT_80")]
    #[serde(rename = "PERCENT_80")]
    Percent80,
    /// No constraint.
    #[graphql(name = "ANY")]
    #[serde(rename = "ANY")]
    Any,
}

/// Sky background (moon) bins, darkest first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Enum, Serialize, Deserialize)]
pub enum SkyBackground {
    /// Darkest sky, 20th percentile.
    #[graphql(name = "PERCENT_20")]
    #[serde(rename = "PERCENT_20")]
    Percent20,
    /// Grey sky, 50th percentile.
    #[graphql(name = "PERCENT_50")]
    #[serde(rename = "PERCENT_50")]
    Percent50,
    /// Bright sky, 80th percentile.
    #[graphql(name = "PERCENT_80")]
    #[serde(rename = "PERCENT_80")]
    Percent80,
    /// No constraint.
    #[graphql(name = "ANY")]
    #[serde(rename = "ANY")]
    Any,
}

/// Precipitable water vapor bins, driest first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Enum, Serialize, Deserialize)]
pub enum WaterVapor {
    /// Very dry, 20th percentile.
    #[graphql(name = "PERCENT_20")]
    #[serde(rename = "PERCENT_20")]
    Percent20,
    /// Dry, 50th percentile.
    #[graphql(name = "PERCENT_50")]
    #[serde(rename = "PERCENT_50")]
    Percent50,
    /// Median, 80th percentile.
    #[graphql(name = "PERCENT_80")]
    #[serde(rename = "PERCENT_80")]
    Percent80,
    /// No constraint.
    #[graphql(name = "ANY")]
    #[serde(rename = "ANY")]
    Any,
}

/// Air mass bucketed to the three values the kernel tabulates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AirMassBucket {
    /// Near-zenith observation.
    OnePointTwo,
    /// Intermediate elevation.
    OnePointFive,
    /// Low elevation.
    TwoPointZero,
}

impl AirMassBucket {
    /// Bucket a positive air mass. Cuts at 1.35 and 1.75.
    pub fn from_air_mass(air_mass: f64) -> Self {
        if air_mass < 1.35 {
            AirMassBucket::OnePointTwo
        } else if air_mass < 1.75 {
            AirMassBucket::OnePointFive
        } else {
            AirMassBucket::TwoPointZero
        }
    }

    /// The tabulated value sent to the kernel.
    pub fn value(self) -> f64 {
        match self {
            AirMassBucket::OnePointTwo => 1.2,
            AirMassBucket::OnePointFive => 1.5,
            AirMassBucket::TwoPointZero => 2.0,
        }
    }
}

/// The full conditions tuple attached to a calculation request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservingConditions {
    /// Delivered image quality bin.
    pub image_quality: ImageQuality,
    /// Cloud extinction bin.
    pub cloud_extinction: CloudExtinction,
    /// Sky background bin.
    pub sky_background: SkyBackground,
    /// Water vapor bin.
    pub water_vapor: WaterVapor,
    /// Bucketed air mass.
    pub air_mass: AirMassBucket,
}
