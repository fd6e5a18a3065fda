//! Drum zone hit testing and tip correction

use log::trace;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::kinematics::StickGeometry;
use crate::math::Vector3Ext;

/// One target volume of the kit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrumZone {
    pub name: String,
    pub center: Vector3<f32>,
    /// Horizontal (X-Z) radius, must be positive
    pub radius: f32,
    /// Height of the striking surface; defaults to `center.y`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub surface_height: Option<f32>,
}

impl DrumZone {
    pub fn new(name: impl Into<String>, center: Vector3<f32>, radius: f32) -> Self {
        Self {
            name: name.into(),
            center,
            radius,
            surface_height: None,
        }
    }

    pub fn surface_height(&self) -> f32 {
        self.surface_height.unwrap_or(self.center.y)
    }

    /// Tip lies within the radius and at or below the surface plus `clearance`.
    pub fn contains(&self, tip: &Vector3<f32>, clearance: f32) -> bool {
        tip.planar_distance(&self.center) <= self.radius && tip.y <= self.surface_height() + clearance
    }

    fn validate(&self, index: usize) -> Result<(), ConfigError> {
        let field = format!("zones[{index}]");
        if self.name.trim().is_empty() {
            return Err(ConfigError::invalid(format!("{field}.name"), "must not be empty"));
        }
        if !self.center.all_finite() {
            return Err(ConfigError::invalid(format!("{field}.center"), "must be finite"));
        }
        if !(self.radius.is_finite() && self.radius > 0.0) {
            return Err(ConfigError::invalid(
                format!("{field}.radius"),
                format!("must be a positive number, got {}", self.radius),
            ));
        }
        if !self.surface_height().is_finite() {
            return Err(ConfigError::invalid(
                format!("{field}.surface_height"),
                "must be finite",
            ));
        }
        Ok(())
    }
}

/// The shipped seven-piece layout, in priority order.
pub fn default_zones() -> Vec<DrumZone> {
    vec![
        DrumZone::new("hihat", Vector3::new(2.5, 1.0, -0.8), 1.0),
        DrumZone::new("snare", Vector3::new(1.0, 0.2, -0.8), 1.0),
        DrumZone::new("tom_high", Vector3::new(1.0, 1.2, 1.5), 1.0),
        DrumZone::new("tom_mid", Vector3::new(-1.0, 1.2, 1.5), 1.0),
        DrumZone::new("crash", Vector3::new(2.5, 2.5, 2.0), 1.5),
        DrumZone::new("ride", Vector3::new(-2.8, 2.5, 1.0), 1.5),
        DrumZone::new("tom_floor", Vector3::new(-2.0, 0.3, -0.8), 1.2),
    ]
}

/// Collision tolerances.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollisionSettings {
    /// Height above the surface that still counts as contact
    pub hit_clearance: f32,
    /// Height above the surface the corrected tip rests at
    pub rest_clearance: f32,
}

impl Default for CollisionSettings {
    fn default() -> Self {
        Self {
            hit_clearance: 0.05,
            rest_clearance: 0.03,
        }
    }
}

impl CollisionSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("collision.hit_clearance", self.hit_clearance),
            ("collision.rest_clearance", self.rest_clearance),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(ConfigError::invalid(field, "must be a non-negative number"));
            }
        }
        Ok(())
    }
}

/// Result of a collision test.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Strike<'a> {
    /// First zone containing the tip, if any
    pub zone: Option<&'a DrumZone>,
    /// Pitch that rests the tip on the struck surface, or the input pitch
    pub adjusted_pitch: f32,
}

impl Strike<'_> {
    pub fn zone_name(&self) -> Option<&str> {
        self.zone.map(|zone| zone.name.as_str())
    }
}

/// Tests tip positions against an ordered zone table.
#[derive(Debug, Clone, PartialEq)]
pub struct CollisionResolver {
    zones: Vec<DrumZone>,
    settings: CollisionSettings,
}

impl CollisionResolver {
    /// Validates every zone and rejects duplicate names.
    pub fn new(zones: Vec<DrumZone>, settings: CollisionSettings) -> Result<Self, ConfigError> {
        settings.validate()?;
        for (index, zone) in zones.iter().enumerate() {
            zone.validate(index)?;
            if zones[..index].iter().any(|other| other.name == zone.name) {
                return Err(ConfigError::DuplicateZone(zone.name.clone()));
            }
        }
        Ok(Self { zones, settings })
    }

    pub fn zones(&self) -> &[DrumZone] {
        &self.zones
    }

    pub fn settings(&self) -> CollisionSettings {
        self.settings
    }

    pub fn zone(&self, name: &str) -> Option<&DrumZone> {
        self.zones.iter().find(|zone| zone.name == name)
    }

    /// Find the struck zone and the pitch that places the tip on its surface.
    ///
    /// Zones are tested in table order and the first match wins. When the
    /// surface is out of reach from the grip (`|Δy| > L`) the zone is still
    /// reported but the pitch is returned unchanged.
    ///
    /// The corrected pitch is clamped to the geometry's pitch range, so it
    /// always reproduces the same tip through [`StickGeometry::compute_tip`].
    /// A surface that needs a steeper swing than the range allows leaves the
    /// tip short of it.
    ///
    /// # Arguments
    /// * `tip` - Tip position from [`StickGeometry::compute_tip`]
    /// * `grip_y` - Grip height the tip was computed from
    /// * `pitch` - Pitch in degrees the tip was computed from
    /// * `geometry` - Stick geometry used for the inverse swing mapping
    pub fn detect(
        &self,
        tip: &Vector3<f32>,
        grip_y: f32,
        pitch: f32,
        geometry: &StickGeometry,
    ) -> Strike<'_> {
        let Some(zone) = self
            .zones
            .iter()
            .find(|zone| zone.contains(tip, self.settings.hit_clearance))
        else {
            return Strike {
                zone: None,
                adjusted_pitch: pitch,
            };
        };

        let target_y = zone.surface_height() + self.settings.rest_clearance;
        let delta_y = target_y - grip_y;
        let length = geometry.stick_length;
        let adjusted_pitch = if delta_y.abs() <= length {
            let swing = (-delta_y / length).clamp(-1.0, 1.0).asin();
            geometry
                .pitch_for_swing(swing)
                .clamp(geometry.pitch_min, geometry.pitch_max)
        } else {
            trace!(
                "Zone {} surface out of reach (dy {delta_y:.3}, length {length})",
                zone.name
            );
            pitch
        };

        Strike {
            zone: Some(zone),
            adjusted_pitch,
        }
    }
}

impl Default for CollisionResolver {
    fn default() -> Self {
        Self {
            zones: default_zones(),
            settings: CollisionSettings::default(),
        }
    }
}
