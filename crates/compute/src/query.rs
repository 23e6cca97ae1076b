//! Point-intersection queries against the external features service.
//!
//! The engine never performs I/O: it hands out a [`FeatureQuery`] describing
//! the WFS request, and the host reports back with the ticket once the request
//! resolves or fails. Tickets may resolve in any order.

use std::collections::BTreeMap;

use foundation::math::{Coordinate, Projection};
use runtime::{Ticket, TicketIssuer};
use serde::Serialize;
use thiserror::Error;

use crate::merge::SelectionMode;

pub const QUERY_TYPE_NAMES: &str = "Topography_TopographicArea";
pub const QUERY_PROPERTY_NAMES: &str = "TOID,DescriptiveGroup,SHAPE";
pub const QUERY_SRS_NAME: &str = "urn:ogc:def:crs:EPSG::4326";

/// Failure reported by the host for an outstanding query.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("point query failed: {0}")]
pub struct NetworkError(pub String);

/// Request the host should issue for one point query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureQuery {
    #[serde(skip)]
    pub ticket: Ticket,
    #[serde(skip)]
    pub mode: SelectionMode,
    /// WFS `GetFeature` parameters, ordered by name.
    pub params: BTreeMap<&'static str, String>,
}

/// OGC filter selecting areas that contain the point. GML coordinates are
/// written latitude first, as the EPSG:4326 URN axis order requires.
pub fn contains_filter(lon_lat: [f64; 2]) -> String {
    format!(
        "<ogc:Filter><ogc:Contains><ogc:PropertyName>SHAPE</ogc:PropertyName>\
         <gml:Point srsName=\"{QUERY_SRS_NAME}\"><gml:coordinates>{},{}</gml:coordinates>\
         </gml:Point></ogc:Contains></ogc:Filter>",
        lon_lat[1], lon_lat[0]
    )
}

pub fn wfs_params(point: Coordinate) -> BTreeMap<&'static str, String> {
    let lon_lat = point.to(Projection::Geographic).xy();
    BTreeMap::from([
        ("service", "WFS".to_string()),
        ("request", "GetFeature".to_string()),
        ("version", "2.0.0".to_string()),
        ("typeNames", QUERY_TYPE_NAMES.to_string()),
        ("propertyName", QUERY_PROPERTY_NAMES.to_string()),
        ("outputFormat", "GEOJSON".to_string()),
        ("srsName", QUERY_SRS_NAME.to_string()),
        ("filter", contains_filter(lon_lat)),
        ("count", "1".to_string()),
    ])
}

/// Outstanding queries keyed by ticket.
#[derive(Debug, Default)]
pub struct QueryTracker {
    issuer: TicketIssuer,
    pending: BTreeMap<Ticket, SelectionMode>,
}

impl QueryTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&mut self, point: Coordinate, mode: SelectionMode) -> FeatureQuery {
        let ticket = self.issuer.issue();
        self.pending.insert(ticket, mode);
        FeatureQuery {
            ticket,
            mode,
            params: wfs_params(point),
        }
    }

    /// Closes a ticket, returning its mode if it was outstanding.
    pub fn finish(&mut self, ticket: Ticket) -> Option<SelectionMode> {
        self.pending.remove(&ticket)
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}
