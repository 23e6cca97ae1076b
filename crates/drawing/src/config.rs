//! Engine configuration.
//!
//! Every field has a default, so `{}` is a complete config. Values can be
//! overridden from `BOUNDARY_*` environment variables.

use std::env;

use compute::{AreaRounding, AreaUnit, MergeOptions};
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    /// Screen distance within which a new vertex is pulled onto a snap point.
    #[serde(default = "default_snap_pixel_tolerance")]
    pub snap_pixel_tolerance: f64,
    /// Screen distance for vertex hit-testing and closing the ring.
    #[serde(default = "default_modify_pixel_tolerance")]
    pub modify_pixel_tolerance: f64,
    /// Snap points are only extracted at or above this zoom.
    #[serde(default = "default_snap_min_zoom")]
    pub snap_min_zoom: f64,
    #[serde(default = "default_snap_debounce_s")]
    pub snap_debounce_s: f64,

    // View-fit buffers, in display-projection metres.
    #[serde(default = "default_draw_buffer")]
    pub draw_buffer: f64,
    #[serde(default = "default_feature_buffer")]
    pub feature_buffer: f64,
    #[serde(default = "default_geojson_buffer")]
    pub geojson_buffer: f64,

    #[serde(default)]
    pub area_rounding: AreaRounding,
    /// Unit used for the static data area.
    #[serde(default)]
    pub area_unit: AreaUnit,
    #[serde(default = "default_feature_id_property")]
    pub feature_id_property: String,
    #[serde(default = "default_retained_properties")]
    pub retained_properties: Vec<String>,
}

fn default_snap_pixel_tolerance() -> f64 {
    15.0
}

fn default_modify_pixel_tolerance() -> f64 {
    10.0
}

fn default_snap_min_zoom() -> f64 {
    20.0
}

fn default_snap_debounce_s() -> f64 {
    0.2
}

fn default_draw_buffer() -> f64 {
    100.0
}

fn default_feature_buffer() -> f64 {
    40.0
}

fn default_geojson_buffer() -> f64 {
    12.0
}

fn default_feature_id_property() -> String {
    "TOID".to_string()
}

fn default_retained_properties() -> Vec<String> {
    vec!["TOID".to_string(), "DescriptiveGroup".to_string()]
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            snap_pixel_tolerance: default_snap_pixel_tolerance(),
            modify_pixel_tolerance: default_modify_pixel_tolerance(),
            snap_min_zoom: default_snap_min_zoom(),
            snap_debounce_s: default_snap_debounce_s(),
            draw_buffer: default_draw_buffer(),
            feature_buffer: default_feature_buffer(),
            geojson_buffer: default_geojson_buffer(),
            area_rounding: AreaRounding::default(),
            area_unit: AreaUnit::default(),
            feature_id_property: default_feature_id_property(),
            retained_properties: default_retained_properties(),
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(s: &str) -> Result<Self, EngineError> {
        serde_json::from_str(s).map_err(|e| EngineError::Config(e.to_string()))
    }

    /// Defaults overridden by `BOUNDARY_*` environment variables.
    pub fn from_env() -> Self {
        Self::default().overridden_by(|key| env::var(key).ok())
    }

    /// Applies overrides looked up by variable name. Unparseable values keep
    /// the current setting.
    pub fn overridden_by(self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let f64_var = |key: &str, current: f64| -> f64 {
            lookup(key)
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(current)
        };
        Self {
            snap_pixel_tolerance: f64_var("BOUNDARY_SNAP_PIXEL_TOLERANCE", self.snap_pixel_tolerance),
            modify_pixel_tolerance: f64_var(
                "BOUNDARY_MODIFY_PIXEL_TOLERANCE",
                self.modify_pixel_tolerance,
            ),
            snap_min_zoom: f64_var("BOUNDARY_SNAP_MIN_ZOOM", self.snap_min_zoom),
            snap_debounce_s: f64_var("BOUNDARY_SNAP_DEBOUNCE_S", self.snap_debounce_s),
            draw_buffer: f64_var("BOUNDARY_DRAW_BUFFER", self.draw_buffer),
            feature_buffer: f64_var("BOUNDARY_FEATURE_BUFFER", self.feature_buffer),
            geojson_buffer: f64_var("BOUNDARY_GEOJSON_BUFFER", self.geojson_buffer),
            area_rounding: match lookup("BOUNDARY_AREA_ROUNDING").as_deref() {
                Some("legacy") => AreaRounding::Legacy,
                Some("independent") => AreaRounding::Independent,
                _ => self.area_rounding,
            },
            area_unit: lookup("BOUNDARY_AREA_UNIT")
                .and_then(|v| v.parse().ok())
                .unwrap_or(self.area_unit),
            feature_id_property: lookup("BOUNDARY_FEATURE_ID_PROPERTY")
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(self.feature_id_property),
            retained_properties: lookup("BOUNDARY_RETAINED_PROPERTIES")
                .map(|v| {
                    v.split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or(self.retained_properties),
        }
    }

    pub fn merge_options(&self) -> MergeOptions {
        MergeOptions {
            id_property: self.feature_id_property.clone(),
            retained_properties: self.retained_properties.clone(),
            rounding: self.area_rounding,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::EngineConfig;
    use compute::{AreaRounding, AreaUnit};
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    #[test]
    fn empty_json_is_the_default_config() {
        let config = EngineConfig::from_json_str("{}").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.snap_pixel_tolerance, 15.0);
        assert_eq!(config.snap_min_zoom, 20.0);
        assert_eq!(config.draw_buffer, 100.0);
        assert_eq!(config.feature_buffer, 40.0);
        assert_eq!(config.geojson_buffer, 12.0);
        assert_eq!(config.merge_options().id_property, "TOID");
    }

    #[test]
    fn json_fields_are_camel_case() {
        let config = EngineConfig::from_json_str(
            r#"{ "snapPixelTolerance": 8, "areaRounding": "independent", "areaUnit": "ha" }"#,
        )
        .unwrap();
        assert_eq!(config.snap_pixel_tolerance, 8.0);
        assert_eq!(config.area_rounding, AreaRounding::Independent);
        assert_eq!(config.area_unit, AreaUnit::Hectares);
        assert!(EngineConfig::from_json_str("[]").is_err());
    }

    #[test]
    fn environment_overrides_apply_and_bad_values_are_ignored() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("BOUNDARY_SNAP_MIN_ZOOM", "18"),
            ("BOUNDARY_DRAW_BUFFER", "not-a-number"),
            ("BOUNDARY_AREA_ROUNDING", "independent"),
            ("BOUNDARY_RETAINED_PROPERTIES", "TOID, Theme,"),
        ]);
        let config =
            EngineConfig::default().overridden_by(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(config.snap_min_zoom, 18.0);
        assert_eq!(config.draw_buffer, 100.0);
        assert_eq!(config.area_rounding, AreaRounding::Independent);
        assert_eq!(config.retained_properties, vec!["TOID", "Theme"]);
    }
}
