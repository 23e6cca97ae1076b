use formats::ProjectedFeatures;
use foundation::Extent;
use serde::Serialize;

use crate::session::Mode;

/// Everything the engine reports to its host.
///
/// Serialized adjacently tagged: `{"type": "drawingChanged", "detail": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "detail", rename_all = "camelCase")]
pub enum Notification {
    /// The drawn features, in both projections. Empty after a reset.
    DrawingChanged(ProjectedFeatures),
    /// The merged parcel boundary, in both projections. Empty once the
    /// selection pool is emptied.
    FeaturesChanged(ProjectedFeatures),
    /// Formatted area of the static data layer, e.g. `"1234.5 m²"`.
    DataArea(String),
    ModeChanged(Mode),
    /// Fit the view to `[min_x, min_y, max_x, max_y]` in the display
    /// projection.
    FitView([f64; 4]),
    /// Restore the host's initial centre and zoom.
    ResetView,
    Failure { message: String, retryable: bool },
}

impl Notification {
    pub fn fit_view(extent: Extent) -> Self {
        Notification::FitView([extent.min[0], extent.min[1], extent.max[0], extent.max[1]])
    }
}

#[cfg(test)]
mod tests {
    use super::Notification;
    use crate::session::Mode;
    use formats::encode_projected;
    use serde_json::json;

    #[test]
    fn serializes_with_type_tag() {
        let v = serde_json::to_value(Notification::ModeChanged(Mode::Modifying)).unwrap();
        assert_eq!(v, json!({ "type": "modeChanged", "detail": "modifying" }));

        let v = serde_json::to_value(Notification::ResetView).unwrap();
        assert_eq!(v, json!({ "type": "resetView" }));

        let v = serde_json::to_value(Notification::DrawingChanged(encode_projected(&[]))).unwrap();
        assert_eq!(v["detail"]["EPSG:3857"]["type"], "FeatureCollection");
        assert_eq!(v["detail"]["EPSG:27700"]["features"], json!([]));
    }
}
