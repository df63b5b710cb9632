//! Quadkeys: base-4 digit strings addressing cells of a recursively
//! subdivided rectangle.
//!
//! Each digit selects one quadrant of the current cell:
//!
//! ```text
//!  +---+---+
//!  | 2 | 3 |   north
//!  +---+---+
//!  | 0 | 1 |   south
//!  +---+---+
//!   west east
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Zoom level of a cluster bucket. A bucket at zoom `z` is addressed by a
/// quadkey of `z + 1` digits.
pub type Zoom = u8;

/// Rejection reasons for externally supplied quadkey strings.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuadKeyError {
    #[error("quadkey is empty")]
    Empty,
    #[error("quadkey has {len} digits, at most {max} allowed")]
    TooLong { len: usize, max: usize },
    #[error("invalid quadkey digit {found:?} at position {position}")]
    InvalidDigit { position: usize, found: char },
}

/// One of the four sub-cells produced by a single subdivision step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum Quadrant {
    SouthWest = 0,
    SouthEast = 1,
    NorthWest = 2,
    NorthEast = 3,
}

impl Quadrant {
    pub const ALL: [Quadrant; 4] = [
        Quadrant::SouthWest,
        Quadrant::SouthEast,
        Quadrant::NorthWest,
        Quadrant::NorthEast,
    ];

    #[inline]
    pub const fn from_halves(north: bool, east: bool) -> Self {
        match (north, east) {
            (false, false) => Quadrant::SouthWest,
            (false, true) => Quadrant::SouthEast,
            (true, false) => Quadrant::NorthWest,
            (true, true) => Quadrant::NorthEast,
        }
    }

    #[inline]
    pub const fn digit(self) -> char {
        (b'0' + self as u8) as char
    }

    pub const fn from_digit(digit: char) -> Option<Self> {
        match digit {
            '0' => Some(Quadrant::SouthWest),
            '1' => Some(Quadrant::SouthEast),
            '2' => Some(Quadrant::NorthWest),
            '3' => Some(Quadrant::NorthEast),
            _ => None,
        }
    }

    #[inline]
    pub const fn is_north(self) -> bool {
        matches!(self, Quadrant::NorthWest | Quadrant::NorthEast)
    }

    #[inline]
    pub const fn is_east(self) -> bool {
        matches!(self, Quadrant::SouthEast | Quadrant::NorthEast)
    }
}

/// A quadkey: a string over `{0,1,2,3}` whose length is its subdivision depth.
///
/// Keys order lexicographically, so all descendants of a key sort directly
/// after it in an ordered map.
///
/// # Examples
///
/// ```
/// use quadcluster_types::quadkey::{QuadKey, Quadrant};
///
/// let mut key = QuadKey::root();
/// key.push(Quadrant::NorthEast);
/// key.push(Quadrant::NorthWest);
/// assert_eq!(key.as_str(), "32");
/// assert_eq!(key.zoom(), Some(1));
/// assert_eq!(key.parent().unwrap().as_str(), "3");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct QuadKey(String);

impl QuadKey {
    /// The zero-depth key covering the whole bounds.
    pub fn root() -> Self {
        Self(String::new())
    }

    pub fn with_capacity(depth: usize) -> Self {
        Self(String::with_capacity(depth))
    }

    /// Parse a key, checking only the digit alphabet. The empty string parses
    /// to the root key.
    pub fn parse(s: &str) -> Result<Self, QuadKeyError> {
        if let Some((position, found)) = s
            .chars()
            .enumerate()
            .find(|(_, c)| !('0'..='3').contains(c))
        {
            return Err(QuadKeyError::InvalidDigit { position, found });
        }
        Ok(Self(s.to_owned()))
    }

    /// Parse an externally supplied key: non-empty, at most `max_depth`
    /// digits, every digit in `{0,1,2,3}`.
    pub fn parse_bounded(s: &str, max_depth: usize) -> Result<Self, QuadKeyError> {
        if s.is_empty() {
            return Err(QuadKeyError::Empty);
        }
        let len = s.chars().count();
        if len > max_depth {
            return Err(QuadKeyError::TooLong {
                len,
                max: max_depth,
            });
        }
        Self::parse(s)
    }

    #[inline]
    pub fn push(&mut self, quadrant: Quadrant) {
        self.0.push(quadrant.digit());
    }

    pub fn child(&self, quadrant: Quadrant) -> Self {
        let mut child = Self::with_capacity(self.0.len() + 1);
        child.0.push_str(&self.0);
        child.push(quadrant);
        child
    }

    pub fn children(&self) -> [QuadKey; 4] {
        Quadrant::ALL.map(|quadrant| self.child(quadrant))
    }

    pub fn parent(&self) -> Option<QuadKey> {
        if self.0.is_empty() {
            return None;
        }
        Some(Self(self.0[..self.0.len() - 1].to_owned()))
    }

    /// Truncate to the first `depth` digits (no-op when already shorter).
    pub fn truncated(&self, depth: usize) -> QuadKey {
        Self(self.0[..depth.min(self.0.len())].to_owned())
    }

    /// Whether `self` is a strict prefix of `other`.
    pub fn is_ancestor_of(&self, other: &QuadKey) -> bool {
        other.0.len() > self.0.len() && other.0.starts_with(&self.0)
    }

    pub fn quadrants(&self) -> impl Iterator<Item = Quadrant> + '_ {
        self.0.chars().filter_map(Quadrant::from_digit)
    }

    #[inline]
    pub fn depth(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Zoom level of a bucket addressed by this key (`depth - 1`); `None` for
    /// the root key.
    pub fn zoom(&self) -> Option<Zoom> {
        self.0
            .len()
            .checked_sub(1)
            .and_then(|zoom| Zoom::try_from(zoom).ok())
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for QuadKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for QuadKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for QuadKey {
    type Err = QuadKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for QuadKey {
    type Error = QuadKeyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)?;
        Ok(Self(value))
    }
}

impl From<QuadKey> for String {
    fn from(key: QuadKey) -> Self {
        key.0
    }
}

/// Address of a cluster bucket: a zoom level and the quadkey of the cell.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BucketKey {
    pub zoom: Zoom,
    pub quadkey: QuadKey,
}

impl BucketKey {
    pub fn new(zoom: Zoom, quadkey: QuadKey) -> Self {
        Self { zoom, quadkey }
    }

    /// Build the bucket key addressed by `quadkey`, deriving the zoom from its
    /// length. Returns `None` for the root key.
    pub fn from_quadkey(quadkey: QuadKey) -> Option<Self> {
        let zoom = quadkey.zoom()?;
        Some(Self { zoom, quadkey })
    }
}

impl fmt::Display for BucketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "zoom {} quadkey {}", self.zoom, self.quadkey)
    }
}
