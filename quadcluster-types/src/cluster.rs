use geo::Point;
use serde::{Deserialize, Serialize};

use crate::quadkey::{BucketKey, QuadKey, Zoom};

/// Centroid and member count of one cluster bucket.
///
/// Serialized with the field names map clients expect:
/// `{"quadkey": "...", "longitude": .., "latitude": .., "size": ..}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterAggregate {
    pub quadkey: QuadKey,
    pub longitude: f64,
    pub latitude: f64,
    pub size: u64,
}

impl ClusterAggregate {
    pub fn new(quadkey: QuadKey, longitude: f64, latitude: f64, size: u64) -> Self {
        Self {
            quadkey,
            longitude,
            latitude,
            size,
        }
    }

    pub fn centroid(&self) -> Point<f64> {
        Point::new(self.longitude, self.latitude)
    }

    pub fn zoom(&self) -> Option<Zoom> {
        self.quadkey.zoom()
    }

    pub fn bucket_key(&self) -> Option<BucketKey> {
        BucketKey::from_quadkey(self.quadkey.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_field_names() {
        let aggregate = ClusterAggregate::new(QuadKey::parse("31").unwrap(), 1.5, -2.0, 3);
        let json = serde_json::to_value(&aggregate).unwrap();
        assert_eq!(json["quadkey"], "31");
        assert_eq!(json["longitude"], 1.5);
        assert_eq!(json["latitude"], -2.0);
        assert_eq!(json["size"], 3);
        assert_eq!(aggregate.zoom(), Some(1));
    }
}
