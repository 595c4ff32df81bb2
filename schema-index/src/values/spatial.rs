//! Points, coordinate reference systems and the space-filling curve used to
//! order them.
//!
//! # Design
//!
//! A point key orders first by its coordinate reference system and then by a
//! one-dimensional curve value derived from its coordinates. The curve is a
//! Hilbert curve computed with Skilling's transpose algorithm: every
//! coordinate is normalized into its CRS envelope, quantized onto a grid of
//! `2^level` cells per axis, and the cell is mapped to its distance along the
//! curve. Nearby points tend to get nearby curve values, which is what makes
//! spatial range queries decomposable into a few key ranges.
//!
//! 2D systems use 30 bits per axis and 3D systems 20, so every curve value
//! fits in 60 bits and is non-negative as an `i64`.

/// Supported coordinate reference systems.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CoordinateReferenceSystem {
    Cartesian,
    Cartesian3D,
    Wgs84,
    Wgs84_3D,
}

/// Table holding custom (cartesian) reference systems.
const TABLE_CUSTOM: u8 = 0;

/// Table holding EPSG registered reference systems.
const TABLE_EPSG: u8 = 1;

const CARTESIAN_ENVELOPE: [(f64, f64); 3] = [
    (-1_000_000.0, 1_000_000.0),
    (-1_000_000.0, 1_000_000.0),
    (-1_000_000.0, 1_000_000.0),
];

const GEOGRAPHIC_ENVELOPE: [(f64, f64); 3] = [
    (-180.0, 180.0),
    (-90.0, 90.0),
    (-1_000_000.0, 1_000_000.0),
];

impl CoordinateReferenceSystem {
    pub const ALL: [Self; 4] = [
        Self::Cartesian,
        Self::Cartesian3D,
        Self::Wgs84,
        Self::Wgs84_3D,
    ];

    /// Id of the table the code lives in.
    #[must_use]
    pub const fn table_id(self) -> u8 {
        match self {
            Self::Cartesian | Self::Cartesian3D => TABLE_CUSTOM,
            Self::Wgs84 | Self::Wgs84_3D => TABLE_EPSG,
        }
    }

    /// Code within the table.
    #[must_use]
    pub const fn code(self) -> u32 {
        match self {
            Self::Cartesian => 7203,
            Self::Cartesian3D => 9157,
            Self::Wgs84 => 4326,
            Self::Wgs84_3D => 4979,
        }
    }

    /// Number of coordinates per point.
    #[must_use]
    pub const fn dimension(self) -> usize {
        match self {
            Self::Cartesian | Self::Wgs84 => 2,
            Self::Cartesian3D | Self::Wgs84_3D => 3,
        }
    }

    /// Look up a system by table id and code.
    #[must_use]
    pub fn from_table_and_code(table_id: u8, code: u32) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|crs| crs.table_id() == table_id && crs.code() == code)
    }

    /// Per-axis bounds used to normalize coordinates onto the curve.
    #[must_use]
    pub fn envelope(self) -> &'static [(f64, f64)] {
        let dimension = self.dimension();
        match self {
            Self::Cartesian | Self::Cartesian3D => &CARTESIAN_ENVELOPE[..dimension],
            Self::Wgs84 | Self::Wgs84_3D => &GEOGRAPHIC_ENVELOPE[..dimension],
        }
    }

    /// Curve resolution in bits per axis.
    #[must_use]
    pub const fn curve_level(self) -> u32 {
        match self.dimension() {
            2 => 30,
            _ => 20,
        }
    }
}

/// A point in a coordinate reference system.
#[derive(Debug, Clone, PartialEq)]
#[allow(clippy::disallowed_methods)] // Clone needed by array values
pub struct PointValue {
    pub crs: CoordinateReferenceSystem,
    pub coordinates: Vec<f64>,
}

impl PointValue {
    #[must_use]
    pub const fn new(crs: CoordinateReferenceSystem, coordinates: Vec<f64>) -> Self {
        Self { crs, coordinates }
    }

    /// Whether the coordinate count matches the reference system.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.coordinates.len() == self.crs.dimension()
    }
}

/// Hilbert curve over a reference system's envelope.
#[derive(Debug, Clone, Copy)]
pub struct SpaceFillingCurve {
    crs: CoordinateReferenceSystem,
}

impl SpaceFillingCurve {
    #[must_use]
    pub const fn new(crs: CoordinateReferenceSystem) -> Self {
        Self { crs }
    }

    /// Distance along the curve of the cell containing `coordinates`.
    ///
    /// Coordinates outside the envelope are clamped to its border; NaN maps
    /// to the lowest cell.
    #[must_use]
    pub fn derived_value_for(&self, coordinates: &[f64]) -> i64 {
        let level = self.crs.curve_level();
        let mut axes = [0u64; 3];
        let dimension = self.crs.dimension().min(coordinates.len());
        for (axis, (&coordinate, &(min, max))) in axes
            .iter_mut()
            .zip(coordinates.iter().zip(self.crs.envelope()))
            .take(dimension)
        {
            *axis = quantize(coordinate, min, max, level);
        }
        let index = hilbert_index(&mut axes[..self.crs.dimension()], level);
        i64::try_from(index).unwrap_or(i64::MAX)
    }
}

/// Map a coordinate onto `[0, 2^level)`.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)] // value is clamped into range before the cast
fn quantize(coordinate: f64, min: f64, max: f64, level: u32) -> u64 {
    let cells = 1u64 << level;
    if coordinate.is_nan() || coordinate <= min {
        return 0;
    }
    if coordinate >= max {
        return cells - 1;
    }
    let fraction = (coordinate - min) / (max - min);
    ((fraction * cells as f64) as u64).min(cells - 1)
}

/// Skilling's axes-to-transpose followed by bit interleaving.
fn hilbert_index(axes: &mut [u64], level: u32) -> u64 {
    let n = axes.len();
    let m = 1u64 << (level - 1);

    // Inverse undo
    let mut q = m;
    while q > 1 {
        let p = q - 1;
        for i in 0..n {
            if axes[i] & q == 0 {
                let t = (axes[0] ^ axes[i]) & p;
                axes[0] ^= t;
                axes[i] ^= t;
            } else {
                axes[0] ^= p;
            }
        }
        q >>= 1;
    }

    // Gray encode
    for i in 1..n {
        axes[i] ^= axes[i - 1];
    }
    let mut t = 0;
    q = m;
    while q > 1 {
        if axes[n - 1] & q != 0 {
            t ^= q - 1;
        }
        q >>= 1;
    }
    for axis in axes.iter_mut() {
        *axis ^= t;
    }

    let mut index = 0u64;
    for bit in (0..level).rev() {
        for axis in axes.iter() {
            index = (index << 1) | ((axis >> bit) & 1);
        }
    }
    index
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crs_lookup() {
        for crs in CoordinateReferenceSystem::ALL {
            assert_eq!(
                CoordinateReferenceSystem::from_table_and_code(crs.table_id(), crs.code()),
                Some(crs)
            );
        }
        assert_eq!(CoordinateReferenceSystem::from_table_and_code(1, 7203), None);
    }

    #[test]
    fn test_hilbert_2d_level_1_visits_cells_in_curve_order() {
        // Order 1 Hilbert curve: (0,0) -> (0,1) -> (1,1) -> (1,0)
        let order: Vec<u64> = [[0, 0], [0, 1], [1, 1], [1, 0]]
            .iter()
            .map(|&cell| {
                let mut cell = cell;
                hilbert_index(&mut cell, 1)
            })
            .collect();
        assert_eq!(order, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_hilbert_is_a_bijection_on_small_grid() {
        let level = 3;
        let mut seen = vec![false; 64];
        for x in 0..8 {
            for y in 0..8 {
                let index = hilbert_index(&mut [x, y], level);
                let slot = usize::try_from(index).expect("small index");
                assert!(!seen[slot], "index {index} produced twice");
                seen[slot] = true;
            }
        }
        assert!(seen.iter().all(|&s| s));
    }

    #[test]
    fn test_hilbert_neighbors_are_adjacent_cells() {
        let level = 3;
        let mut cells = vec![(0u64, 0u64); 64];
        for x in 0..8 {
            for y in 0..8 {
                let index = hilbert_index(&mut [x, y], level);
                cells[usize::try_from(index).expect("small index")] = (x, y);
            }
        }
        for pair in cells.windows(2) {
            let dx = pair[0].0.abs_diff(pair[1].0);
            let dy = pair[0].1.abs_diff(pair[1].1);
            assert_eq!(dx + dy, 1, "{:?} -> {:?}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_derived_value_fits_in_60_bits() {
        let curve = SpaceFillingCurve::new(CoordinateReferenceSystem::Wgs84);
        let corner = curve.derived_value_for(&[180.0, 90.0]);
        assert!(corner >= 0);
        assert!(corner < 1 << 60);

        let curve = SpaceFillingCurve::new(CoordinateReferenceSystem::Cartesian3D);
        let value = curve.derived_value_for(&[1.0e9, -1.0e9, f64::NAN]);
        assert!((0..1 << 60).contains(&value));
    }
}
