//! Rasterized plane indexing.
//!
//! A series stores its planes in a flat list. The dimension order says which
//! of Z, C and T varies fastest: for `XYCTZ`, C changes first, then T, then Z.
//! [`raster_index`] and [`zct_coords`] convert between a flat plane index and
//! its `(z, c, t)` coordinates; they are mutual inverses for every valid
//! index.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::UsageError;

/// A single axis of a plane stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    Z,
    C,
    T,
}

/// Permutation of the Z/C/T axes; X and Y are always the raster axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DimensionOrder {
    XYZCT,
    XYZTC,
    XYCZT,
    XYCTZ,
    XYTZC,
    XYTCZ,
}

impl DimensionOrder {
    pub const ALL: [DimensionOrder; 6] = [
        DimensionOrder::XYZCT,
        DimensionOrder::XYZTC,
        DimensionOrder::XYCZT,
        DimensionOrder::XYCTZ,
        DimensionOrder::XYTZC,
        DimensionOrder::XYTCZ,
    ];

    /// Axes from fastest- to slowest-varying.
    pub const fn axes(&self) -> [Axis; 3] {
        match self {
            DimensionOrder::XYZCT => [Axis::Z, Axis::C, Axis::T],
            DimensionOrder::XYZTC => [Axis::Z, Axis::T, Axis::C],
            DimensionOrder::XYCZT => [Axis::C, Axis::Z, Axis::T],
            DimensionOrder::XYCTZ => [Axis::C, Axis::T, Axis::Z],
            DimensionOrder::XYTZC => [Axis::T, Axis::Z, Axis::C],
            DimensionOrder::XYTCZ => [Axis::T, Axis::C, Axis::Z],
        }
    }

    /// Build the order whose axes vary in the given sequence.
    pub fn from_axes(axes: [Axis; 3]) -> Option<Self> {
        Self::ALL.into_iter().find(|order| order.axes() == axes)
    }

    /// The same order with `axis` moved to the slowest-varying position.
    pub fn with_outermost(&self, axis: Axis) -> Self {
        let mut axes: Vec<Axis> = self.axes().into_iter().filter(|a| *a != axis).collect();
        axes.push(axis);
        // Always a permutation of Z/C/T, so the lookup cannot miss.
        Self::from_axes([axes[0], axes[1], axes[2]]).unwrap_or(*self)
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            DimensionOrder::XYZCT => "XYZCT",
            DimensionOrder::XYZTC => "XYZTC",
            DimensionOrder::XYCZT => "XYCZT",
            DimensionOrder::XYCTZ => "XYCTZ",
            DimensionOrder::XYTZC => "XYTZC",
            DimensionOrder::XYTCZ => "XYTCZ",
        }
    }
}

impl fmt::Display for DimensionOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DimensionOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.to_uppercase();
        Self::ALL
            .into_iter()
            .find(|order| order.as_str() == upper)
            .ok_or_else(|| format!("invalid dimension order: {}", s))
    }
}

/// Coordinates of one plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PlaneCoords {
    pub z: usize,
    pub c: usize,
    pub t: usize,
}

impl PlaneCoords {
    pub const fn new(z: usize, c: usize, t: usize) -> Self {
        Self { z, c, t }
    }

    fn get(&self, axis: Axis) -> usize {
        match axis {
            Axis::Z => self.z,
            Axis::C => self.c,
            Axis::T => self.t,
        }
    }

    fn set(&mut self, axis: Axis, value: usize) {
        match axis {
            Axis::Z => self.z = value,
            Axis::C => self.c = value,
            Axis::T => self.t = value,
        }
    }
}

/// Per-axis sizes of a series (`size_c` is the effective channel count).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZctSizes {
    pub size_z: usize,
    pub size_c: usize,
    pub size_t: usize,
}

impl ZctSizes {
    pub const fn new(size_z: usize, size_c: usize, size_t: usize) -> Self {
        Self {
            size_z,
            size_c,
            size_t,
        }
    }

    pub const fn plane_count(&self) -> usize {
        self.size_z * self.size_c * self.size_t
    }

    fn get(&self, axis: Axis) -> usize {
        match axis {
            Axis::Z => self.size_z,
            Axis::C => self.size_c,
            Axis::T => self.size_t,
        }
    }
}

impl From<(usize, usize, usize)> for ZctSizes {
    fn from((size_z, size_c, size_t): (usize, usize, usize)) -> Self {
        Self::new(size_z, size_c, size_t)
    }
}

/// Map `(z, c, t)` to a rasterized plane index.
pub fn raster_index(
    order: DimensionOrder,
    sizes: ZctSizes,
    coords: PlaneCoords,
) -> Result<usize, UsageError> {
    if coords.z >= sizes.size_z || coords.c >= sizes.size_c || coords.t >= sizes.size_t {
        return Err(UsageError::CoordinateOutOfRange {
            z: coords.z,
            c: coords.c,
            t: coords.t,
            size_z: sizes.size_z,
            size_c: sizes.size_c,
            size_t: sizes.size_t,
        });
    }

    let [a0, a1, a2] = order.axes();
    let len0 = sizes.get(a0);
    let len1 = sizes.get(a1);
    Ok(coords.get(a0) + coords.get(a1) * len0 + coords.get(a2) * len0 * len1)
}

/// Map a rasterized plane index back to `(z, c, t)`.
pub fn zct_coords(
    order: DimensionOrder,
    sizes: ZctSizes,
    index: usize,
) -> Result<PlaneCoords, UsageError> {
    let count = sizes.plane_count();
    if index >= count {
        return Err(UsageError::PlaneOutOfRange {
            plane: index,
            count,
        });
    }

    let [a0, a1, a2] = order.axes();
    let len0 = sizes.get(a0);
    let len1 = sizes.get(a1);

    let mut coords = PlaneCoords::default();
    coords.set(a0, index % len0);
    coords.set(a1, (index / len0) % len1);
    coords.set(a2, index / (len0 * len1));
    Ok(coords)
}
