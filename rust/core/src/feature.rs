// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Input features: a geometry in map coordinates plus an attribute table.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use skyline_geometry::{Bounds2, Footprint, Point2};

/// Feature identifier, also used as the PRNG seed for template selection
pub type FeatureId = u64;

/// One attribute value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Bool(bool),
    Int(i64),
    Double(f64),
    String(String),
}

impl AttributeValue {
    /// Numeric view; strings are parsed and anything unparseable is `None`
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttributeValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            AttributeValue::Int(i) => Some(*i as f64),
            AttributeValue::Double(d) => Some(*d),
            AttributeValue::String(s) => s.trim().parse().ok(),
        }
    }

    pub fn as_string(&self) -> String {
        match self {
            AttributeValue::Bool(b) => b.to_string(),
            AttributeValue::Int(i) => i.to_string(),
            AttributeValue::Double(d) => d.to_string(),
            AttributeValue::String(s) => s.clone(),
        }
    }
}

impl From<f64> for AttributeValue {
    fn from(v: f64) -> Self {
        AttributeValue::Double(v)
    }
}

impl From<i64> for AttributeValue {
    fn from(v: i64) -> Self {
        AttributeValue::Int(v)
    }
}

impl From<&str> for AttributeValue {
    fn from(v: &str) -> Self {
        AttributeValue::String(v.to_string())
    }
}

/// Attribute table keyed by field name
pub type Attributes = FxHashMap<String, AttributeValue>;

/// Feature geometry in map coordinates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FeatureGeometry {
    Point(Point2<f64>),
    LineString(Vec<Point2<f64>>),
    Polygon(Footprint),
    MultiPolygon(Vec<Footprint>),
}

impl FeatureGeometry {
    /// Polygon parts, or `None` for point and line features
    pub fn polygons(&self) -> Option<Vec<&Footprint>> {
        match self {
            FeatureGeometry::Polygon(p) => Some(vec![p]),
            FeatureGeometry::MultiPolygon(parts) => Some(parts.iter().collect()),
            _ => None,
        }
    }

    pub fn polygons_mut(&mut self) -> Vec<&mut Footprint> {
        match self {
            FeatureGeometry::Polygon(p) => vec![p],
            FeatureGeometry::MultiPolygon(parts) => parts.iter_mut().collect(),
            _ => Vec::new(),
        }
    }

    pub fn bounds(&self) -> Bounds2 {
        match self {
            FeatureGeometry::Point(p) => Bounds2::from_points(std::iter::once(p)),
            FeatureGeometry::LineString(points) => Bounds2::from_points(points.iter()),
            FeatureGeometry::Polygon(p) => p.bounds(),
            FeatureGeometry::MultiPolygon(parts) => {
                Bounds2::from_points(parts.iter().flat_map(|p| p.outer.iter()))
            }
        }
    }

    /// True for polygonal geometry with at least one valid part
    pub fn is_valid_polygon(&self) -> bool {
        self.polygons()
            .map(|parts| parts.iter().any(|p| p.is_valid()))
            .unwrap_or(false)
    }
}

/// A vector feature as delivered by a feature source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    pub id: FeatureId,
    pub geometry: FeatureGeometry,
    #[serde(default)]
    pub attributes: Attributes,
}

impl Feature {
    pub fn new(id: FeatureId, geometry: FeatureGeometry) -> Self {
        Self {
            id,
            geometry,
            attributes: Attributes::default(),
        }
    }

    pub fn with_attribute(mut self, name: &str, value: impl Into<AttributeValue>) -> Self {
        self.attributes.insert(name.to_string(), value.into());
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes.get(name)
    }

    /// Center of the geometry's bounding rectangle
    pub fn centroid(&self) -> Point2<f64> {
        self.geometry.bounds().center()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attribute_views() {
        assert_eq!(AttributeValue::from("12.5").as_f64(), Some(12.5));
        assert_eq!(AttributeValue::from("tall").as_f64(), None);
        assert_eq!(AttributeValue::Int(3).as_string(), "3");
    }

    #[test]
    fn test_polygon_parts() {
        let square = Footprint::rectangle(0.0, 0.0, 2.0, 2.0);
        let multi = FeatureGeometry::MultiPolygon(vec![
            square.clone(),
            Footprint::rectangle(5.0, 5.0, 6.0, 6.0),
        ]);
        assert_eq!(multi.polygons().unwrap().len(), 2);
        assert!(multi.is_valid_polygon());
        assert_eq!(multi.bounds().max_x, 6.0);
        assert!(FeatureGeometry::Point(Point2::new(1.0, 1.0)).polygons().is_none());
    }

    #[test]
    fn test_attributes_deserialize_untagged() {
        let attrs: Attributes =
            serde_json::from_str(r#"{"height": 12, "name": "hall", "ratio": 0.5}"#).unwrap();
        assert_eq!(attrs["height"], AttributeValue::Int(12));
        assert_eq!(attrs["ratio"].as_f64(), Some(0.5));
    }
}
