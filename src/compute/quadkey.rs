//! Quadkey encoder.
//!
//! A key is produced by repeatedly halving the bounds on both axes and
//! recording which quadrant holds the point. Keys nest: the key at depth
//! `d` is always a prefix of the key at depth `d + 1`.
//!
//! Coordinates are compared against the midpoint with `<` going to the
//! south/west half and `>=` going to the north/east half. Points outside the
//! bounds (or NaN) are not rejected; they produce well-formed but meaningless
//! keys.

use quadcluster_types::{BucketKey, Bounds, GeoPoint, QuadKey, Quadrant, Zoom};

/// Encode `point` into a key of exactly `depth` digits.
///
/// # Examples
///
/// ```
/// use quadcluster::compute::quadkey::encode;
/// use quadcluster_types::{Bounds, GeoPoint};
///
/// let moscow = GeoPoint::new(1, 37.61776, 55.75577);
/// assert_eq!(encode(&moscow, 4, &Bounds::WORLD).as_str(), "3203");
/// ```
pub fn encode(point: &GeoPoint, depth: usize, bounds: &Bounds) -> QuadKey {
    let mut cursor = QuadCursor::with_capacity(*bounds, depth);
    for _ in 0..depth {
        cursor.descend(point);
    }
    cursor.into_key()
}

/// Rectangle addressed by `key`, obtained by replaying its digits from
/// `bounds`.
pub fn cell_bounds(key: &QuadKey, bounds: &Bounds) -> Bounds {
    key.quadrants()
        .fold(*bounds, |cell, quadrant| cell.sub_bounds(quadrant))
}

/// Incremental encoder state: the current cell and the key that addresses it.
///
/// Walking a point from depth 0 to `n` through one cursor costs O(n) in
/// total, since every step only halves the current cell.
#[derive(Debug, Clone)]
pub struct QuadCursor {
    cell: Bounds,
    key: QuadKey,
}

impl QuadCursor {
    pub fn new(bounds: Bounds) -> Self {
        Self {
            cell: bounds,
            key: QuadKey::root(),
        }
    }

    pub fn with_capacity(bounds: Bounds, depth: usize) -> Self {
        Self {
            cell: bounds,
            key: QuadKey::with_capacity(depth),
        }
    }

    /// Subdivide once toward `point`, appending the chosen digit.
    #[inline]
    pub fn descend(&mut self, point: &GeoPoint) -> Quadrant {
        let quadrant = self.cell.quadrant(point);
        self.cell = self.cell.sub_bounds(quadrant);
        self.key.push(quadrant);
        quadrant
    }

    pub fn key(&self) -> &QuadKey {
        &self.key
    }

    pub fn cell(&self) -> &Bounds {
        &self.cell
    }

    pub fn depth(&self) -> usize {
        self.key.depth()
    }

    pub fn into_key(self) -> QuadKey {
        self.key
    }
}

/// Iterator over the buckets a point belongs to for zoom levels
/// `min_zoom..max_zoom`. The bucket at zoom `z` is the cell reached after
/// `z + 1` subdivisions.
///
/// ```
/// use quadcluster::compute::quadkey::BucketPath;
/// use quadcluster_types::{Bounds, GeoPoint};
///
/// let point = GeoPoint::new(7, 37.61776, 55.75577);
/// let keys: Vec<_> = BucketPath::new(&point, Bounds::WORLD, 1, 4)
///     .map(|bucket| (bucket.zoom, bucket.quadkey.into_string()))
///     .collect();
/// assert_eq!(
///     keys,
///     vec![(1, "32".to_string()), (2, "320".to_string()), (3, "3203".to_string())]
/// );
/// ```
#[derive(Debug, Clone)]
pub struct BucketPath<'a> {
    point: &'a GeoPoint,
    cursor: QuadCursor,
    zoom: Zoom,
    min_zoom: Zoom,
    max_zoom: Zoom,
}

impl<'a> BucketPath<'a> {
    pub fn new(point: &'a GeoPoint, bounds: Bounds, min_zoom: Zoom, max_zoom: Zoom) -> Self {
        Self {
            point,
            cursor: QuadCursor::with_capacity(bounds, usize::from(max_zoom)),
            zoom: 0,
            min_zoom,
            max_zoom,
        }
    }
}

impl Iterator for BucketPath<'_> {
    type Item = BucketKey;

    fn next(&mut self) -> Option<Self::Item> {
        while self.zoom < self.max_zoom {
            let zoom = self.zoom;
            self.zoom += 1;
            self.cursor.descend(self.point);
            if zoom >= self.min_zoom {
                return Some(BucketKey::new(zoom, self.cursor.key().clone()));
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = usize::from(self.max_zoom.saturating_sub(self.zoom.max(self.min_zoom)));
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for BucketPath<'_> {}
