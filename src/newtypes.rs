/// A [``TableId``](crate::traits::TableId) for a node.
///
/// ```
/// use gentrees::prelude::*;
///
/// let n = NodeId::from(-1);
/// assert_eq!(n, -1);
/// let r = n.into_raw();
/// assert_eq!(r, -1);
/// ```
#[repr(transparent)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, std::hash::Hash)]
pub struct NodeId(pub(crate) i32);

/// A [``TableId``](crate::traits::TableId) for an edge.
#[repr(transparent)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, std::hash::Hash)]
pub struct EdgeId(pub(crate) i32);

/// A [``TableId``](crate::traits::TableId) for a site.
#[repr(transparent)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, std::hash::Hash)]
pub struct SiteId(pub(crate) i32);

/// A [``TableId``](crate::traits::TableId) for a mutation.
#[repr(transparent)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, std::hash::Hash)]
pub struct MutationId(pub(crate) i32);

/// A [``TableId``](crate::traits::TableId) for a deme.
#[repr(transparent)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, std::hash::Hash)]
pub struct DemeId(pub(crate) i32);

impl_table_id!(NodeId);
impl_table_id!(EdgeId);
impl_table_id!(SiteId);
impl_table_id!(MutationId);
impl_table_id!(DemeId);

/// A position/coordinate within a genome.
///
/// Positions are continuous.  Valid values
/// are finite and non-negative; table operations
/// reject anything else.
#[repr(transparent)]
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Position(pub(crate) f64);

/// A time value.
#[repr(transparent)]
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Time(pub(crate) f64);

impl Position {
    /// Minimum value
    pub const MIN: Position = Position(f64::MIN);
    /// Maximum value
    pub const MAX: Position = Position(f64::MAX);

    pub(crate) fn is_valid_coordinate(&self) -> bool {
        self.0.is_finite() && self.0 >= 0.0
    }
}

impl Time {
    /// Minimum value
    pub const MIN: Time = Time(f64::MIN);
    /// Maximum value
    pub const MAX: Time = Time(f64::MAX);
}

pub(crate) fn min_position(a: Position, b: Position) -> Position {
    if b < a {
        b
    } else {
        a
    }
}

impl std::ops::Add for Position {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self(self.0 + other.0)
    }
}

impl std::ops::Sub for Position {
    type Output = Self;

    fn sub(self, other: Self) -> Self {
        Self(self.0 - other.0)
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Position({})", self.0)
    }
}

impl PartialOrd for Position {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        match self.0.partial_cmp(&other.0) {
            None => panic!("fatal: partial_cmp for Position received non-finite values"),
            Some(x) => Some(x),
        }
    }
}

impl PartialEq<f64> for Position {
    fn eq(&self, other: &f64) -> bool {
        self.0 == *other
    }
}

impl PartialEq<Position> for f64 {
    fn eq(&self, other: &Position) -> bool {
        *self == other.0
    }
}

impl PartialOrd<f64> for Position {
    fn partial_cmp(&self, other: &f64) -> Option<std::cmp::Ordering> {
        self.0.partial_cmp(other)
    }
}

impl PartialOrd<Position> for f64 {
    fn partial_cmp(&self, other: &Position) -> Option<std::cmp::Ordering> {
        self.partial_cmp(&other.0)
    }
}

impl From<f64> for Position {
    fn from(value: f64) -> Self {
        Self(value)
    }
}

impl From<i64> for Position {
    fn from(value: i64) -> Self {
        Self(value as f64)
    }
}

impl From<i32> for Position {
    fn from(value: i32) -> Self {
        Self(value as f64)
    }
}

impl From<Position> for f64 {
    fn from(value: Position) -> Self {
        value.0
    }
}

impl std::ops::Add for Time {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self(self.0 + other.0)
    }
}

impl std::ops::Sub for Time {
    type Output = Self;

    fn sub(self, other: Self) -> Self {
        Self(self.0 - other.0)
    }
}

impl std::fmt::Display for Time {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Time({})", self.0)
    }
}

impl PartialOrd for Time {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        match self.0.partial_cmp(&other.0) {
            None => panic!("fatal: partial_cmp for Time received non-finite values"),
            Some(x) => Some(x),
        }
    }
}

impl PartialEq<f64> for Time {
    fn eq(&self, other: &f64) -> bool {
        self.0 == *other
    }
}

impl PartialEq<Time> for f64 {
    fn eq(&self, other: &Time) -> bool {
        *self == other.0
    }
}

impl From<f64> for Time {
    fn from(value: f64) -> Self {
        Self(value)
    }
}

impl From<i64> for Time {
    fn from(value: i64) -> Self {
        Self(value as f64)
    }
}

impl From<i32> for Time {
    fn from(value: i32) -> Self {
        Self(value as f64)
    }
}

impl From<Time> for f64 {
    fn from(value: Time) -> Self {
        value.0
    }
}
