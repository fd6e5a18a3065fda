//! Kit configuration document
//!
//! One versioned JSON document describes the whole kit: filter, detector,
//! stick geometry, zone table, per-hand calibration and sampling. Every
//! section falls back to its default when omitted, and the document is
//! validated once at load so no invalid value reaches a running stick.
//!
//! ```json
//! {
//!   "version": 1,
//!   "filter": { "alpha": 0.98 },
//!   "detector": {
//!     "cooldown_ms": 120,
//!     "policy": { "kind": "rise_fall", "rise_threshold": 15.0, "fall_threshold": 10.0 }
//!   },
//!   "zones": [
//!     { "name": "snare", "center": [1.0, 0.2, -0.8], "radius": 1.0 }
//!   ],
//!   "sticks": { "right": { "profile_file": "right_profile.json" } }
//! }
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::calibration::{CalibrationProfile, ProfileSource};
use crate::collision::{CollisionResolver, CollisionSettings, DrumZone, default_zones};
use crate::detector::DetectorSettings;
use crate::error::ConfigError;
use crate::estimator::FilterSettings;
use crate::kinematics::StickGeometry;
use crate::runner::SamplingSettings;
use crate::stick::{Kit, StickContext};
use crate::types::Hand;

/// Document version understood by this crate
pub const CONFIG_VERSION: u32 = 1;

/// Calibration source for one stick.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StickConfig {
    /// Inline profile; validated with the rest of the document
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<CalibrationProfile>,
    /// Standalone profile file, used when no inline profile is given.
    /// Relative paths resolve against the configuration file's directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StickConfigs {
    pub left: StickConfig,
    pub right: StickConfig,
}

impl StickConfigs {
    pub fn get(&self, hand: Hand) -> &StickConfig {
        match hand {
            Hand::Left => &self.left,
            Hand::Right => &self.right,
        }
    }
}

/// Complete kit configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KitConfig {
    pub version: u32,
    #[serde(default)]
    pub filter: FilterSettings,
    #[serde(default)]
    pub detector: DetectorSettings,
    #[serde(default)]
    pub geometry: StickGeometry,
    #[serde(default)]
    pub collision: CollisionSettings,
    /// Tested in order; the first zone containing the tip wins
    #[serde(default = "default_zones")]
    pub zones: Vec<DrumZone>,
    #[serde(default)]
    pub sticks: StickConfigs,
    #[serde(default)]
    pub sampling: SamplingSettings,
    /// Directory of the file this configuration was loaded from
    #[serde(skip)]
    base_dir: Option<PathBuf>,
}

impl Default for KitConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            filter: FilterSettings::default(),
            detector: DetectorSettings::default(),
            geometry: StickGeometry::default(),
            collision: CollisionSettings::default(),
            zones: default_zones(),
            sticks: StickConfigs::default(),
            sampling: SamplingSettings::default(),
            base_dir: None,
        }
    }
}

impl KitConfig {
    /// Parse and validate a configuration document.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_json_str(&contents)?;
        config.base_dir = path.parent().map(Path::to_path_buf);
        info!(
            "Loaded kit configuration {} ({} zones)",
            path.display(),
            config.zones.len()
        );
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version != CONFIG_VERSION {
            return Err(ConfigError::UnsupportedVersion {
                found: self.version,
                expected: CONFIG_VERSION,
            });
        }
        self.filter.validate()?;
        self.detector.validate()?;
        self.geometry.validate()?;
        self.sampling.validate()?;
        self.resolver()?;
        for hand in [Hand::Left, Hand::Right] {
            if let Some(profile) = &self.sticks.get(hand).profile {
                profile.validate(&format!("sticks.{hand}.profile"))?;
            }
        }
        if self.zones.is_empty() {
            warn!("Kit configuration defines no zones; hits will carry no zone");
        }
        Ok(())
    }

    fn resolver(&self) -> Result<CollisionResolver, ConfigError> {
        CollisionResolver::new(self.zones.clone(), self.collision)
    }

    /// Shared kit data for every stick.
    pub fn kit(&self) -> Result<Arc<Kit>, ConfigError> {
        Ok(Arc::new(Kit::new(self.geometry, self.resolver()?)))
    }

    /// Resolve the calibration profile for one stick.
    ///
    /// A profile file that is missing or invalid falls back to the identity
    /// profile; the returned [`ProfileSource`] records why.
    pub fn profile(&self, hand: Hand) -> (CalibrationProfile, ProfileSource) {
        let stick = self.sticks.get(hand);
        if let Some(profile) = stick.profile {
            return (profile, ProfileSource::Loaded);
        }
        match &stick.profile_file {
            Some(file) => {
                let path = match &self.base_dir {
                    Some(dir) if file.is_relative() => dir.join(file),
                    _ => file.clone(),
                };
                CalibrationProfile::load_or_identity(path)
            }
            None => {
                info!("No calibration profile for the {hand} stick, using identity");
                (
                    CalibrationProfile::identity(),
                    ProfileSource::Identity {
                        reason: "no profile configured".to_string(),
                    },
                )
            }
        }
    }

    /// Build the processing context for one stick.
    pub fn stick_context(&self, hand: Hand, kit: Arc<Kit>) -> StickContext {
        let (profile, source) = self.profile(hand);
        StickContext::new(hand, profile, source, self.filter, self.detector, kit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::{DetectionPolicy, PolicyKind};

    #[test]
    fn test_minimal_document() {
        let config = KitConfig::from_json_str(r#"{"version": 1}"#).unwrap();
        assert_eq!(config, KitConfig::default());
        assert_eq!(config.zones.len(), 7);
    }

    #[test]
    fn test_version_is_required() {
        assert!(matches!(
            KitConfig::from_json_str("{}"),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            KitConfig::from_json_str(r#"{"version": 2}"#),
            Err(ConfigError::UnsupportedVersion {
                found: 2,
                expected: 1
            })
        ));
    }

    #[test]
    fn test_sections_override_defaults() {
        let config = KitConfig::from_json_str(
            r#"{
                "version": 1,
                "filter": { "alpha": 0.96 },
                "detector": {
                    "cooldown_ms": 90,
                    "policy": { "kind": "threshold_and", "gyro_threshold": 200.0, "accel_threshold": 1.8 }
                },
                "zones": [{ "name": "pad", "center": [0.0, 0.5, 1.0], "radius": 0.8, "surface_height": 0.6 }]
            }"#,
        )
        .unwrap();
        assert_eq!(config.filter.alpha, 0.96);
        assert_eq!(config.detector.cooldown_ms, 90);
        assert_eq!(config.detector.policy.kind(), PolicyKind::ThresholdAnd);
        assert_eq!(config.zones.len(), 1);
        assert_eq!(config.zones[0].surface_height(), 0.6);
        assert_eq!(config.geometry, StickGeometry::default());
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let cases = [
            (r#"{"version":1,"filter":{"alpha":0.5}}"#, "filter.alpha"),
            (r#"{"version":1,"detector":{"cooldown_ms":40}}"#, "detector.cooldown_ms"),
            (
                r#"{"version":1,"detector":{"policy":{"kind":"rise_fall","rise_threshold":-1.0,"fall_threshold":3.0}}}"#,
                "detector.policy.rise_threshold",
            ),
            (r#"{"version":1,"geometry":{"stick_length":0.0}}"#, "geometry.stick_length"),
            (
                r#"{"version":1,"zones":[{"name":"x","center":[0,0,0],"radius":0.0}]}"#,
                "zones[0].radius",
            ),
            (
                r#"{"version":1,"sticks":{"left":{"profile":{"accel_scale":[1.0,0.0,1.0]}}}}"#,
                "sticks.left.profile.accel_scale",
            ),
            (r#"{"version":1,"sampling":{"poll_rate_hz":0.0}}"#, "sampling.poll_rate_hz"),
        ];
        for (json, expected) in cases {
            match KitConfig::from_json_str(json) {
                Err(ConfigError::InvalidValue { field, .. }) => assert_eq!(field, expected),
                other => panic!("{json}: expected invalid {expected}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_duplicate_zone_names() {
        let json = r#"{"version":1,"zones":[
            {"name":"snare","center":[0,0,0],"radius":1.0},
            {"name":"snare","center":[2,0,0],"radius":1.0}
        ]}"#;
        assert!(matches!(
            KitConfig::from_json_str(json),
            Err(ConfigError::DuplicateZone(name)) if name == "snare"
        ));
    }

    #[test]
    fn test_profile_resolution() {
        let config = KitConfig::from_json_str(
            r#"{"version":1,"sticks":{
                "right":{"profile":{"dead_zone":0.1}},
                "left":{"profile_file":"/nonexistent/left.json"}
            }}"#,
        )
        .unwrap();

        let (right, source) = config.profile(Hand::Right);
        assert_eq!(right.dead_zone, 0.1);
        assert_eq!(source, ProfileSource::Loaded);

        let (left, source) = config.profile(Hand::Left);
        assert_eq!(left, CalibrationProfile::identity());
        assert!(source.is_fallback());
    }

    #[test]
    fn test_stick_context_uses_settings() {
        let config = KitConfig {
            detector: DetectorSettings {
                policy: DetectionPolicy::DeltaBased {
                    pitch_delta_threshold: 4.0,
                    accel_threshold: 1.5,
                },
                cooldown_ms: 100,
            },
            ..KitConfig::default()
        };
        let stick = config.stick_context(Hand::Left, config.kit().unwrap());
        assert_eq!(stick.hand(), Hand::Left);
        assert_eq!(stick.detector().settings(), config.detector);
        assert!(stick.diagnostics().profile.is_fallback());
    }
}
