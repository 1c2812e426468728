//! Sweep configuration.
//!
//! [`SweepOptions`] gathers every knob the sweep layer reads. It is plain
//! data (serde round-trippable) and is passed explicitly to each component;
//! there is no process-wide configuration.

use std::ops::RangeInclusive;

use crate::sweep::aggregation::AGGREGATION_TAGS;
use crate::sweep::plan::LOCATION_TAGS;
use crate::sweep_error::SweepError;
use serde::{Deserialize, Serialize};

/// Default eager-send limit in bytes. Messages at or below this size are sent
/// fire-and-forget.
pub const DEFAULT_EAGER_LIMIT: usize = 32_000;

/// Default base tag for sweep traffic.
pub const DEFAULT_TAG_BASE: u16 = 0x4000;

/// Tags used by the setup exchanges (orderings, FLUDS negotiation,
/// aggregation). Sweep traffic must stay clear of them.
pub const SETUP_TAGS: RangeInclusive<u16> =
    LOCATION_TAGS.sizes.as_u16()..=AGGREGATION_TAGS.data.as_u16();

/// How directions are clustered into angle sets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AngleAggregationType {
    /// One direction per angle set.
    Single,
    /// One set per azimuthal angle and polar hemisphere.
    Polar,
    /// One set per polar level and azimuthal half-plane (curvilinear).
    Azimuthal,
}

impl AngleAggregationType {
    pub fn name(self) -> &'static str {
        match self {
            AngleAggregationType::Single => "single",
            AngleAggregationType::Polar => "polar",
            AngleAggregationType::Azimuthal => "azimuthal",
        }
    }
}

/// Problem geometry as seen by the transport solver.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GeometryType {
    OneDSlab,
    OneDSpherical,
    TwoDCartesian,
    TwoDCylindrical,
    ThreeDCartesian,
}

impl GeometryType {
    pub fn dimension(self) -> usize {
        match self {
            GeometryType::OneDSlab | GeometryType::OneDSpherical => 1,
            GeometryType::TwoDCartesian | GeometryType::TwoDCylindrical => 2,
            GeometryType::ThreeDCartesian => 3,
        }
    }

    pub fn is_curvilinear(self) -> bool {
        matches!(
            self,
            GeometryType::OneDSpherical | GeometryType::TwoDCylindrical
        )
    }
}

/// Order in which ready angle sets are offered execution.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SchedulingAlgorithm {
    /// Construction order.
    FirstIn,
    /// Deepest remaining task graph first, then by direction octant.
    DepthOfGraph,
}

/// All options read by the sweep layer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepOptions {
    pub aggregation: AngleAggregationType,
    pub geometry: GeometryType,
    /// Lag rank-level cyclic dependencies instead of rejecting them.
    pub allow_cycles: bool,
    /// Largest message (bytes) sent without splitting.
    pub eager_limit: usize,
    pub scheduling: SchedulingAlgorithm,
    /// Explicit number of angle-set groups; derived from geometry when `None`.
    pub angle_set_groups: Option<usize>,
    /// Abort a sweep that makes no progress for this long.
    pub stall_timeout_ms: Option<u64>,
    /// First tag of the range used for sweep traffic.
    pub tag_base: u16,
}

impl Default for SweepOptions {
    fn default() -> Self {
        Self {
            aggregation: AngleAggregationType::Single,
            geometry: GeometryType::ThreeDCartesian,
            allow_cycles: true,
            eager_limit: DEFAULT_EAGER_LIMIT,
            scheduling: SchedulingAlgorithm::DepthOfGraph,
            angle_set_groups: None,
            stall_timeout_ms: None,
            tag_base: DEFAULT_TAG_BASE,
        }
    }
}

impl SweepOptions {
    /// Reject settings that can never work.
    pub fn validate(&self) -> Result<(), SweepError> {
        if self.eager_limit < std::mem::size_of::<f64>() {
            return Err(SweepError::InvalidConfiguration(format!(
                "eager_limit must hold at least one value, got {} bytes",
                self.eager_limit
            )));
        }
        if self.angle_set_groups == Some(0) {
            return Err(SweepError::InvalidConfiguration(
                "angle_set_groups must be positive".into(),
            ));
        }
        if self.tag_base == u16::MAX {
            return Err(SweepError::InvalidConfiguration(
                "tag_base leaves no room for sweep tags".into(),
            ));
        }
        self.check_tag_span(1)
    }

    /// Sweep tags `tag_base..tag_base + span` must not reach into
    /// [`SETUP_TAGS`].
    pub fn check_tag_span(&self, span: usize) -> Result<(), SweepError> {
        let first = self.tag_base as usize;
        let last = first.saturating_add(span.max(1) - 1);
        if first <= *SETUP_TAGS.end() as usize && last >= *SETUP_TAGS.start() as usize {
            return Err(SweepError::InvalidConfiguration(format!(
                "sweep tags {first:#06x}..={last:#06x} overlap the setup tags {:#06x}..={:#06x}",
                SETUP_TAGS.start(),
                SETUP_TAGS.end()
            )));
        }
        Ok(())
    }

    /// Number of angle-set groups: 1 in 1-D, 4 otherwise, unless overridden.
    pub fn angle_set_group_count(&self) -> usize {
        self.angle_set_groups.unwrap_or(match self.geometry.dimension() {
            1 => 1,
            _ => 4,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options_validate() {
        let o = SweepOptions::default();
        assert!(o.validate().is_ok());
        assert_eq!(o.eager_limit, 32_000);
        assert_eq!(o.angle_set_group_count(), 4);
    }

    #[test]
    fn slab_geometry_uses_one_group() {
        let o = SweepOptions {
            geometry: GeometryType::OneDSlab,
            ..Default::default()
        };
        assert_eq!(o.angle_set_group_count(), 1);
    }

    #[test]
    fn zero_groups_rejected() {
        let o = SweepOptions {
            angle_set_groups: Some(0),
            ..Default::default()
        };
        assert!(matches!(
            o.validate(),
            Err(SweepError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn tag_base_clear_of_setup_exchanges() {
        for tag_base in [0x0100, 0x0111, 0x0121] {
            let o = SweepOptions {
                tag_base,
                ..Default::default()
            };
            assert!(matches!(
                o.validate(),
                Err(SweepError::InvalidConfiguration(_))
            ));
        }
        let below = SweepOptions {
            tag_base: 0x00f0,
            ..Default::default()
        };
        assert!(below.validate().is_ok());
        // 0x00f0 + 0x20 sweep tags would reach 0x0100
        assert!(below.check_tag_span(0x10).is_ok());
        assert!(below.check_tag_span(0x20).is_err());
        let above = SweepOptions {
            tag_base: 0x0122,
            ..Default::default()
        };
        assert!(above.validate().is_ok());
    }

    #[test]
    fn tiny_eager_limit_rejected() {
        let o = SweepOptions {
            eager_limit: 4,
            ..Default::default()
        };
        assert!(o.validate().is_err());
    }
}
