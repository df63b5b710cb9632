//! GeoJSON export of cluster aggregates.

use crate::error::{ClusterError, Result};
use geojson::{Feature, FeatureCollection, Geometry, JsonObject, JsonValue, Value};
use quadcluster_types::ClusterAggregate;

/// Converts one aggregate into a point feature carrying its quadkey, zoom
/// and size as properties.
pub fn aggregate_to_feature(aggregate: &ClusterAggregate) -> Feature {
    let mut properties = JsonObject::new();
    properties.insert(
        "quadkey".to_string(),
        JsonValue::from(aggregate.quadkey.as_str()),
    );
    if let Some(zoom) = aggregate.zoom() {
        properties.insert("zoom".to_string(), JsonValue::from(zoom));
    }
    properties.insert("size".to_string(), JsonValue::from(aggregate.size));

    Feature {
        bbox: None,
        geometry: Some(Geometry::new(Value::Point(vec![
            aggregate.longitude,
            aggregate.latitude,
        ]))),
        id: None,
        properties: Some(properties),
        foreign_members: None,
    }
}

pub fn aggregates_to_geojson(aggregates: &[ClusterAggregate]) -> FeatureCollection {
    FeatureCollection {
        bbox: None,
        features: aggregates.iter().map(aggregate_to_feature).collect(),
        foreign_members: None,
    }
}

/// Serializes aggregates as a GeoJSON `FeatureCollection` string.
pub fn aggregates_to_geojson_string(aggregates: &[ClusterAggregate]) -> Result<String> {
    serde_json::to_string(&aggregates_to_geojson(aggregates)).map_err(|e| {
        ClusterError::Serialization(format!("Failed to serialize aggregates: {}", e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use quadcluster_types::QuadKey;

    fn aggregate(key: &str, lon: f64, lat: f64, size: u64) -> ClusterAggregate {
        ClusterAggregate::new(QuadKey::parse(key).unwrap(), lon, lat, size)
    }

    #[test]
    fn test_feature_properties() {
        let feature = aggregate_to_feature(&aggregate("3203", 37.6, 55.7, 12));
        let props = feature.properties.unwrap();
        assert_eq!(props["quadkey"], "3203");
        assert_eq!(props["zoom"], 3);
        assert_eq!(props["size"], 12);

        match feature.geometry.unwrap().value {
            Value::Point(coords) => assert_eq!(coords, vec![37.6, 55.7]),
            other => panic!("expected point, got {:?}", other),
        }
    }

    #[test]
    fn test_collection_string() {
        let json = aggregates_to_geojson_string(&[
            aggregate("30", 1.0, 2.0, 1),
            aggregate("31", 3.0, 4.0, 2),
        ])
        .unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["type"], "FeatureCollection");
        assert_eq!(parsed["features"].as_array().unwrap().len(), 2);
        assert_eq!(parsed["features"][1]["properties"]["size"], 2);
    }
}
