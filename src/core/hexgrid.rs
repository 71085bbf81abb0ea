//! Hierarchical hexagonal grid over a Web-Mercator plane.
//!
//! Cells are pointy-top hexagons addressed by axial coordinates `(q, r)`.
//! Each resolution step shrinks the edge by √7, so resolution 9 has a
//! nominal edge of ≈0.174 km at the equator; true edge length scales with
//! `cos(latitude)` like every Mercator distance. Point → cell is a pure
//! function, which is what lets the geo index skip range queries entirely.

use std::f64::consts::{FRAC_PI_2, FRAC_PI_4};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::core::distance::EARTH_RADIUS_KM;

pub const MAX_RESOLUTION: u8 = 15;
pub const DEFAULT_RESOLUTION: u8 = 9;

/// Nominal edge length at resolution 9
const RES9_EDGE_KM: f64 = 0.174_375_668;

/// Mercator is undefined at the poles
const MAX_LATITUDE: f64 = 85.051_128_78;

const AXIS_BITS: u32 = 30;
const AXIS_MASK: u64 = (1 << AXIS_BITS) - 1;
const AXIS_OFFSET: i64 = 1 << (AXIS_BITS - 1);

const SQRT_3: f64 = 1.732_050_807_568_877_2;

/// Axial neighbour offsets, walked in order when tracing a ring
const DIRECTIONS: [(i64, i64); 6] = [(1, 0), (1, -1), (0, -1), (-1, 0), (-1, 1), (0, 1)];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GridError {
    #[error("Resolution {0} is outside 0..=15")]
    InvalidResolution(u8),

    #[error("Invalid cell id: {0}")]
    InvalidCellId(String),
}

/// Packed cell address: 4 bits resolution, 30 bits each for q and r
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellId(u64);

impl CellId {
    fn from_axial(resolution: u8, q: i64, r: i64) -> Self {
        let q_bits = ((q + AXIS_OFFSET) as u64) & AXIS_MASK;
        let r_bits = ((r + AXIS_OFFSET) as u64) & AXIS_MASK;
        CellId(((resolution as u64) << (2 * AXIS_BITS)) | (q_bits << AXIS_BITS) | r_bits)
    }

    pub fn resolution(&self) -> u8 {
        (self.0 >> (2 * AXIS_BITS)) as u8
    }

    fn axial(&self) -> (i64, i64) {
        let q = ((self.0 >> AXIS_BITS) & AXIS_MASK) as i64 - AXIS_OFFSET;
        let r = (self.0 & AXIS_MASK) as i64 - AXIS_OFFSET;
        (q, r)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for CellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl FromStr for CellId {
    type Err = GridError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = u64::from_str_radix(s, 16).map_err(|_| GridError::InvalidCellId(s.to_string()))?;
        let cell = CellId(raw);
        if s.len() != 16 || cell.resolution() > MAX_RESOLUTION {
            return Err(GridError::InvalidCellId(s.to_string()));
        }
        Ok(cell)
    }
}

/// Nominal edge length in kilometers for a resolution
pub fn edge_length_km(resolution: u8) -> f64 {
    RES9_EDGE_KM * 7f64.sqrt().powi(DEFAULT_RESOLUTION as i32 - resolution as i32)
}

fn project(lat: f64, lng: f64) -> (f64, f64) {
    let lat = lat.clamp(-MAX_LATITUDE, MAX_LATITUDE).to_radians();
    let x = EARTH_RADIUS_KM * lng.to_radians();
    let y = EARTH_RADIUS_KM * (FRAC_PI_4 + lat / 2.0).tan().ln();
    (x, y)
}

fn unproject(x: f64, y: f64) -> (f64, f64) {
    let lng = (x / EARTH_RADIUS_KM).to_degrees();
    let lat = (2.0 * (y / EARTH_RADIUS_KM).exp().atan() - FRAC_PI_2).to_degrees();
    (lat, lng)
}

fn cube_round(q: f64, r: f64) -> (i64, i64) {
    let s = -q - r;
    let (mut rq, mut rr, rs) = (q.round(), r.round(), s.round());
    let (dq, dr, ds) = ((rq - q).abs(), (rr - r).abs(), (rs - s).abs());

    if dq > dr && dq > ds {
        rq = -rr - rs;
    } else if dr > ds {
        rr = -rq - rs;
    }
    (rq as i64, rr as i64)
}

/// Fixed-resolution view of the grid used by the geo index
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HexGrid {
    resolution: u8,
}

impl HexGrid {
    pub fn new(resolution: u8) -> Result<Self, GridError> {
        if resolution > MAX_RESOLUTION {
            return Err(GridError::InvalidResolution(resolution));
        }
        Ok(Self { resolution })
    }

    pub fn resolution(&self) -> u8 {
        self.resolution
    }

    pub fn edge_km(&self) -> f64 {
        edge_length_km(self.resolution)
    }

    pub fn cell_for(&self, lat: f64, lng: f64) -> CellId {
        Self::cell_at(lat, lng, self.resolution)
    }

    /// Cell containing a point at an arbitrary resolution
    pub fn cell_at(lat: f64, lng: f64, resolution: u8) -> CellId {
        let resolution = resolution.min(MAX_RESOLUTION);
        let size = edge_length_km(resolution);
        let (x, y) = project(lat, lng);

        let q = (SQRT_3 / 3.0 * x - y / 3.0) / size;
        let r = (2.0 / 3.0 * y) / size;
        let (q, r) = cube_round(q, r);
        CellId::from_axial(resolution, q, r)
    }

    /// Latitude/longitude of a cell's centre
    pub fn center(cell: CellId) -> (f64, f64) {
        let size = edge_length_km(cell.resolution());
        let (q, r) = cell.axial();
        let (q, r) = (q as f64, r as f64);
        let x = size * (SQRT_3 * q + SQRT_3 / 2.0 * r);
        let y = size * (1.5 * r);
        unproject(x, y)
    }

    /// Coarser cell containing this cell's centre
    pub fn parent(cell: CellId, resolution: u8) -> CellId {
        if resolution >= cell.resolution() {
            return cell;
        }
        let (lat, lng) = Self::center(cell);
        Self::cell_at(lat, lng, resolution)
    }

    /// Cells at exactly grid distance `k` (k=0 is the cell itself)
    pub fn ring(cell: CellId, k: u32) -> Vec<CellId> {
        let resolution = cell.resolution();
        let (cq, cr) = cell.axial();
        if k == 0 {
            return vec![cell];
        }

        let k = k as i64;
        let (sq, sr) = DIRECTIONS[4];
        let (mut q, mut r) = (cq + sq * k, cr + sr * k);
        let mut cells = Vec::with_capacity(6 * k as usize);
        for (dq, dr) in DIRECTIONS {
            for _ in 0..k {
                cells.push(CellId::from_axial(resolution, q, r));
                q += dq;
                r += dr;
            }
        }
        cells
    }

    /// All cells within `k` concentric rings, innermost first
    pub fn ring_around(cell: CellId, k: u32) -> Vec<CellId> {
        (0..=k).flat_map(|ring| Self::ring(cell, ring)).collect()
    }

    /// Number of steps between two cells of the same resolution
    pub fn grid_distance(a: CellId, b: CellId) -> u64 {
        let (aq, ar) = a.axial();
        let (bq, br) = b.axial();
        let (dq, dr) = (aq - bq, ar - br);
        ((dq.abs() + dr.abs() + (dq + dr).abs()) / 2) as u64
    }

    /// Radius in km guaranteed to be covered by `ring_around(cell_for(p), k)`
    /// around any point `p` near `lat`
    ///
    /// Cells k+1 steps away have centres at least 1.5·(k+1) edges from the
    /// centre cell's centre, so every point within 1.5·k + 0.5 edges of that
    /// centre lies in the disk. `p` may sit up to one edge off centre, which
    /// leaves 1.5·k - 0.5 edges. The centre cell alone guarantees nothing.
    pub fn ring_radius_km(&self, k: u32, lat: f64) -> f64 {
        let true_edge = self.edge_km() * lat.clamp(-MAX_LATITUDE, MAX_LATITUDE).to_radians().cos();
        true_edge * (1.5 * k as f64 - 0.5).max(0.0)
    }

    /// Smallest k whose disk covers `radius_km`, capped at `max_k`
    pub fn k_for_radius(&self, lat: f64, radius_km: f64, max_k: u32) -> u32 {
        (0..=max_k)
            .find(|&k| self.ring_radius_km(k, lat) >= radius_km)
            .unwrap_or(max_k)
    }

    pub fn cells_in_radius(&self, lat: f64, lng: f64, radius_km: f64, max_k: u32) -> Vec<CellId> {
        let k = self.k_for_radius(lat, radius_km, max_k);
        Self::ring_around(self.cell_for(lat, lng), k)
    }
}

impl Default for HexGrid {
    fn default() -> Self {
        Self {
            resolution: DEFAULT_RESOLUTION,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::distance::haversine_distance;
    use std::collections::HashSet;

    const NYC: (f64, f64) = (40.7128, -74.0060);

    #[test]
    fn test_cell_for_is_deterministic() {
        let grid = HexGrid::default();
        let a = grid.cell_for(NYC.0, NYC.1);
        let b = grid.cell_for(NYC.0, NYC.1);
        assert_eq!(a, b);
        assert_eq!(a.resolution(), DEFAULT_RESOLUTION);
    }

    #[test]
    fn test_center_maps_back_to_cell() {
        let grid = HexGrid::default();
        let cell = grid.cell_for(NYC.0, NYC.1);
        let (lat, lng) = HexGrid::center(cell);

        assert_eq!(grid.cell_for(lat, lng), cell);
        assert!(haversine_distance(lat, lng, NYC.0, NYC.1) < grid.edge_km());
    }

    #[test]
    fn test_resolution_nine_edge_is_about_170m() {
        let edge = edge_length_km(9);
        assert!((edge - 0.174).abs() < 0.001);
        assert!(edge_length_km(8) > edge);
    }

    #[test]
    fn test_ring_sizes() {
        let cell = HexGrid::default().cell_for(NYC.0, NYC.1);
        assert_eq!(HexGrid::ring(cell, 0), vec![cell]);
        assert_eq!(HexGrid::ring(cell, 1).len(), 6);
        assert_eq!(HexGrid::ring(cell, 2).len(), 12);
        assert_eq!(HexGrid::ring(cell, 3).len(), 18);

        for neighbour in HexGrid::ring(cell, 2) {
            assert_eq!(HexGrid::grid_distance(cell, neighbour), 2);
        }
    }

    #[test]
    fn test_ring_around_is_disk_without_duplicates() {
        let cell = HexGrid::default().cell_for(NYC.0, NYC.1);
        let disk = HexGrid::ring_around(cell, 3);
        let unique: HashSet<_> = disk.iter().collect();

        assert_eq!(disk.len(), 37);
        assert_eq!(unique.len(), 37);
        assert_eq!(disk[0], cell);
    }

    #[test]
    fn test_cell_id_string_round_trip() {
        let cell = HexGrid::default().cell_for(NYC.0, NYC.1);
        let text = cell.to_string();
        assert_eq!(text.len(), 16);
        assert_eq!(text.parse::<CellId>().unwrap(), cell);
        assert!("not-a-cell".parse::<CellId>().is_err());
    }

    #[test]
    fn test_parent_contains_child_centre() {
        let child = HexGrid::default().cell_for(NYC.0, NYC.1);
        let parent = HexGrid::parent(child, 7);
        assert_eq!(parent.resolution(), 7);

        let (lat, lng) = HexGrid::center(child);
        assert_eq!(HexGrid::cell_at(lat, lng, 7), parent);
        assert_eq!(HexGrid::parent(child, 12), child);
    }

    #[test]
    fn test_k_for_radius_is_minimal_and_capped() {
        let grid = HexGrid::default();
        assert_eq!(grid.k_for_radius(NYC.0, 0.0, 3), 0);
        assert_eq!(grid.k_for_radius(NYC.0, 0.01, 3), 1);

        let k = grid.k_for_radius(NYC.0, 0.5, 10);
        assert!(grid.ring_radius_km(k, NYC.0) >= 0.5);
        assert!(k == 0 || grid.ring_radius_km(k - 1, NYC.0) < 0.5);

        assert_eq!(grid.k_for_radius(NYC.0, 100.0, 3), 3);
        assert_eq!(grid.cells_in_radius(NYC.0, NYC.1, 100.0, 3).len(), 37);
    }

    #[test]
    fn test_points_within_ring_radius_land_in_disk() {
        let grid = HexGrid::default();
        let centre = grid.cell_for(NYC.0, NYC.1);
        let (clat, clng) = HexGrid::center(centre);
        let disk: HashSet<_> = HexGrid::ring_around(centre, 2).into_iter().collect();
        let radius = grid.ring_radius_km(2, clat);

        // Walk a circle just inside the guaranteed radius
        for step in 0..36 {
            let bearing = (step as f64 * 10.0).to_radians();
            let d = radius * 0.95;
            let lat = clat + (d * bearing.cos() / EARTH_RADIUS_KM).to_degrees();
            let lng = clng + (d * bearing.sin() / (EARTH_RADIUS_KM * clat.to_radians().cos())).to_degrees();
            assert!(disk.contains(&grid.cell_for(lat, lng)), "bearing {} escaped the disk", step * 10);
        }
    }

    #[test]
    fn test_ring_radius_holds_for_off_centre_points() {
        let grid = HexGrid::default();
        let centre = grid.cell_for(NYC.0, NYC.1);
        let (clat, clng) = HexGrid::center(centre);
        let true_edge = edge_length_km(DEFAULT_RESOLUTION) * clat.to_radians().cos();

        let offset = |lat: f64, lng: f64, d: f64, bearing_deg: f64| {
            let bearing = bearing_deg.to_radians();
            (
                lat + (d * bearing.cos() / EARTH_RADIUS_KM).to_degrees(),
                lng + (d * bearing.sin() / (EARTH_RADIUS_KM * lat.to_radians().cos())).to_degrees(),
            )
        };

        // Request points near the centre cell's border in every direction
        for origin_step in 0..24 {
            let (olat, olng) = offset(clat, clng, true_edge * 0.8, origin_step as f64 * 15.0);
            assert_eq!(grid.cell_for(olat, olng), centre);

            for k in 1..=3 {
                let disk: HashSet<_> = HexGrid::ring_around(centre, k).into_iter().collect();
                let radius = grid.ring_radius_km(k, olat) * 0.95;
                for step in 0..36 {
                    let (lat, lng) = offset(olat, olng, radius, step as f64 * 10.0);
                    assert!(
                        disk.contains(&grid.cell_for(lat, lng)),
                        "k={} origin {} bearing {} escaped the disk",
                        k,
                        origin_step * 15,
                        step * 10
                    );
                }
            }
        }
    }

    #[test]
    fn test_invalid_resolution_rejected() {
        assert_eq!(HexGrid::new(16), Err(GridError::InvalidResolution(16)));
    }
}
