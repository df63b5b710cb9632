//! Point sources feeding a build run.
//!
//! A source is read exactly once per run. Coordinates are passed through
//! untouched: a point outside the clustering bounds still gets (meaningless)
//! keys, it is never rejected here.

use crate::error::{ClusterError, Result};
use quadcluster_types::GeoPoint;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// A one-shot stream of points.
pub trait PointSource {
    fn points(&mut self) -> Box<dyn Iterator<Item = Result<GeoPoint>> + '_>;

    /// Number of points, when known up front.
    fn len_hint(&self) -> Option<usize> {
        None
    }
}

/// Points already held in memory.
#[derive(Debug, Clone, Default)]
pub struct VecSource {
    points: Vec<GeoPoint>,
}

impl VecSource {
    pub fn new(points: Vec<GeoPoint>) -> Self {
        Self { points }
    }
}

impl From<Vec<GeoPoint>> for VecSource {
    fn from(points: Vec<GeoPoint>) -> Self {
        Self::new(points)
    }
}

impl PointSource for VecSource {
    fn points(&mut self) -> Box<dyn Iterator<Item = Result<GeoPoint>> + '_> {
        Box::new(self.points.drain(..).map(Ok))
    }

    fn len_hint(&self) -> Option<usize> {
        Some(self.points.len())
    }
}

/// Adapts any point iterator.
#[derive(Debug)]
pub struct IterSource<I> {
    iter: Option<I>,
}

impl<I> IterSource<I>
where
    I: Iterator<Item = GeoPoint>,
{
    pub fn new(iter: I) -> Self {
        Self { iter: Some(iter) }
    }
}

impl<I> PointSource for IterSource<I>
where
    I: Iterator<Item = GeoPoint>,
{
    fn points(&mut self) -> Box<dyn Iterator<Item = Result<GeoPoint>> + '_> {
        match self.iter.as_mut() {
            Some(iter) => Box::new(iter.map(Ok)),
            None => Box::new(std::iter::empty()),
        }
    }
}

/// Newline-delimited JSON, one `{"id", "longitude", "latitude"}` object per
/// line. Blank lines are skipped.
pub struct JsonLinesSource<R> {
    reader: R,
}

impl<R: BufRead> JsonLinesSource<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }
}

impl JsonLinesSource<BufReader<File>> {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        log::debug!("reading points from {}", path.as_ref().display());
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R: BufRead> PointSource for JsonLinesSource<R> {
    fn points(&mut self) -> Box<dyn Iterator<Item = Result<GeoPoint>> + '_> {
        Box::new(
            (&mut self.reader)
                .lines()
                .enumerate()
                .filter_map(|(index, line)| {
                    let line = match line {
                        Ok(line) => line,
                        Err(e) => return Some(Err(ClusterError::Io(e))),
                    };
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        return None;
                    }
                    Some(serde_json::from_str::<GeoPoint>(trimmed).map_err(|e| {
                        ClusterError::Source(format!("line {}: {}", index + 1, e))
                    }))
                }),
        )
    }
}
