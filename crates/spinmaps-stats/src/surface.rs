// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Parcellated surface model.

A surface is split into hemispheres. Each hemisphere carries the unit-sphere
coordinate of every parcel (or vertex). A [`SurfaceMap`] holds one scalar per
parcel, left hemisphere block first, with NaN marking the medial wall and any
other undefined entry.
*/

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;
use xxhash_rust::xxh64::xxh64;

use crate::types::{StatsError, StatsResult};

/// Sentinel value for undefined / medial-wall parcels
pub const SENTINEL: f64 = f64::NAN;

/// Whether a value counts as defined (finite)
#[inline]
pub fn is_defined(value: f64) -> bool {
    value.is_finite()
}

/// Cortical hemisphere
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Hemisphere {
    #[serde(rename = "L")]
    Left,
    #[serde(rename = "R")]
    Right,
}

impl Hemisphere {
    pub fn as_str(&self) -> &'static str {
        match self {
            Hemisphere::Left => "L",
            Hemisphere::Right => "R",
        }
    }

    /// Parse `L`/`R` (also `left`/`right`, `lh`/`rh`, case-insensitive)
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "l" | "left" | "lh" => Some(Hemisphere::Left),
            "r" | "right" | "rh" => Some(Hemisphere::Right),
            _ => None,
        }
    }
}

impl fmt::Display for Hemisphere {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parcel centroids of one hemisphere, projected onto the unit sphere
#[derive(Debug, Clone, PartialEq)]
pub struct HemisphereGeometry {
    hemisphere: Hemisphere,
    coords: Vec<[f64; 3]>,
}

impl HemisphereGeometry {
    /// Build from raw coordinates. Each point is normalised onto the unit
    /// sphere; zero-length or non-finite points are rejected.
    pub fn new(hemisphere: Hemisphere, coords: Vec<[f64; 3]>) -> StatsResult<Self> {
        if coords.is_empty() {
            return Err(StatsError::Data(format!(
                "hemisphere {} has no parcel coordinates",
                hemisphere
            )));
        }
        let mut unit = Vec::with_capacity(coords.len());
        for (idx, c) in coords.iter().enumerate() {
            if !c.iter().all(|v| v.is_finite()) {
                return Err(StatsError::Data(format!(
                    "hemisphere {} parcel {} has a non-finite coordinate",
                    hemisphere, idx
                )));
            }
            let norm = (c[0] * c[0] + c[1] * c[1] + c[2] * c[2]).sqrt();
            if norm == 0.0 {
                return Err(StatsError::Data(format!(
                    "hemisphere {} parcel {} sits at the sphere centre",
                    hemisphere, idx
                )));
            }
            unit.push([c[0] / norm, c[1] / norm, c[2] / norm]);
        }
        Ok(Self {
            hemisphere,
            coords: unit,
        })
    }

    pub fn hemisphere(&self) -> Hemisphere {
        self.hemisphere
    }

    pub fn coords(&self) -> &[[f64; 3]] {
        &self.coords
    }

    pub fn len(&self) -> usize {
        self.coords.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coords.is_empty()
    }
}

/// Sphere geometry of a parcellation, one block per hemisphere.
///
/// Shared read-only by every null generation.
#[derive(Debug, Clone, PartialEq)]
pub struct ParcellationGeometry {
    name: String,
    hemispheres: Vec<HemisphereGeometry>,
}

impl ParcellationGeometry {
    /// Build a geometry. Hemispheres are stored left first regardless of the
    /// order given; each hemisphere may appear at most once.
    pub fn new(
        name: impl Into<String>,
        mut hemispheres: Vec<HemisphereGeometry>,
    ) -> StatsResult<Self> {
        let name = name.into();
        if hemispheres.is_empty() {
            return Err(StatsError::Data(format!(
                "parcellation '{}' has no hemispheres",
                name
            )));
        }
        hemispheres.sort_by_key(|h| match h.hemisphere {
            Hemisphere::Left => 0,
            Hemisphere::Right => 1,
        });
        if hemispheres
            .windows(2)
            .any(|w| w[0].hemisphere == w[1].hemisphere)
        {
            return Err(StatsError::Data(format!(
                "parcellation '{}' lists a hemisphere twice",
                name
            )));
        }
        Ok(Self { name, hemispheres })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn hemispheres(&self) -> &[HemisphereGeometry] {
        &self.hemispheres
    }

    pub fn hemisphere(&self, hemisphere: Hemisphere) -> Option<&HemisphereGeometry> {
        self.hemispheres.iter().find(|h| h.hemisphere == hemisphere)
    }

    /// Total parcel count across hemispheres
    pub fn parcel_count(&self) -> usize {
        self.hemispheres.iter().map(|h| h.len()).sum()
    }

    /// Parcel count of one hemisphere (0 when absent)
    pub fn hemisphere_len(&self, hemisphere: Hemisphere) -> usize {
        self.hemisphere(hemisphere).map_or(0, |h| h.len())
    }

    /// Index range each hemisphere occupies in a concatenated map
    pub fn blocks(&self) -> Vec<(Hemisphere, Range<usize>)> {
        let mut start = 0;
        self.hemispheres
            .iter()
            .map(|h| {
                let range = start..start + h.len();
                start = range.end;
                (h.hemisphere, range)
            })
            .collect()
    }
}

/// Scalar map over a parcellation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurfaceMap {
    pub name: String,
    pub parcellation: String,
    pub values: Vec<f64>,
}

impl SurfaceMap {
    /// Build a map, folding any non-finite value into the NaN sentinel
    pub fn new(name: impl Into<String>, parcellation: impl Into<String>, values: Vec<f64>) -> Self {
        let values = values
            .into_iter()
            .map(|v| if is_defined(v) { v } else { SENTINEL })
            .collect();
        Self {
            name: name.into(),
            parcellation: parcellation.into(),
            values,
        }
    }

    /// Concatenate per-hemisphere blocks. A missing hemisphere is filled with
    /// the sentinel, sized from the geometry.
    pub fn from_hemispheres(
        name: impl Into<String>,
        geometry: &ParcellationGeometry,
        left: Option<Vec<f64>>,
        right: Option<Vec<f64>>,
    ) -> StatsResult<Self> {
        let name = name.into();
        let mut values = Vec::with_capacity(geometry.parcel_count());
        for (hemisphere, range) in geometry.blocks() {
            let block = match hemisphere {
                Hemisphere::Left => left.as_ref(),
                Hemisphere::Right => right.as_ref(),
            };
            match block {
                Some(block) if block.len() == range.len() => values.extend_from_slice(block),
                Some(block) => {
                    return Err(StatsError::Data(format!(
                        "map '{}' hemisphere {} has {} values, parcellation '{}' expects {}",
                        name,
                        hemisphere,
                        block.len(),
                        geometry.name(),
                        range.len()
                    )))
                }
                None => values.extend(std::iter::repeat(SENTINEL).take(range.len())),
            }
        }
        Ok(Self::new(name, geometry.name(), values))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Number of defined (non-sentinel) entries
    pub fn defined_count(&self) -> usize {
        self.values.iter().filter(|v| is_defined(**v)).count()
    }

    /// Check length and parcellation tag against a geometry
    pub fn check_geometry(&self, geometry: &ParcellationGeometry) -> StatsResult<()> {
        if self.parcellation != geometry.name() {
            return Err(StatsError::Data(format!(
                "map '{}' is on parcellation '{}' but geometry is '{}'",
                self.name,
                self.parcellation,
                geometry.name()
            )));
        }
        if self.values.len() != geometry.parcel_count() {
            return Err(StatsError::Data(format!(
                "map '{}' has {} values, parcellation '{}' has {} parcels",
                self.name,
                self.values.len(),
                geometry.name(),
                geometry.parcel_count()
            )));
        }
        Ok(())
    }

    /// Content fingerprint over the raw value bits (NaN payloads normalised)
    pub fn fingerprint(&self) -> u64 {
        let mut bytes = Vec::with_capacity(self.values.len() * 8);
        for v in &self.values {
            let bits = if v.is_nan() { SENTINEL.to_bits() } else { v.to_bits() };
            bytes.extend_from_slice(&bits.to_le_bytes());
        }
        xxh64(&bytes, self.values.len() as u64)
    }
}

/// Quasi-uniform points on the unit sphere (Fibonacci lattice).
///
/// Handy for synthetic parcellations in tests and demos.
pub fn fibonacci_sphere(n: usize) -> Vec<[f64; 3]> {
    let golden = std::f64::consts::PI * (3.0 - 5f64.sqrt());
    (0..n)
        .map(|i| {
            let y = if n == 1 {
                0.0
            } else {
                1.0 - 2.0 * (i as f64) / ((n - 1) as f64)
            };
            let radius = (1.0 - y * y).max(0.0).sqrt();
            let theta = golden * i as f64;
            [radius * theta.cos(), y, radius * theta.sin()]
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_hemi(n: usize) -> ParcellationGeometry {
        ParcellationGeometry::new(
            "test",
            vec![
                HemisphereGeometry::new(Hemisphere::Right, fibonacci_sphere(n)).unwrap(),
                HemisphereGeometry::new(Hemisphere::Left, fibonacci_sphere(n)).unwrap(),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_coordinates_are_normalised() {
        let hemi =
            HemisphereGeometry::new(Hemisphere::Left, vec![[2.0, 0.0, 0.0], [0.0, 3.0, 4.0]])
                .unwrap();
        assert_eq!(hemi.coords()[0], [1.0, 0.0, 0.0]);
        assert!((hemi.coords()[1][1] - 0.6).abs() < 1e-12);
        assert!((hemi.coords()[1][2] - 0.8).abs() < 1e-12);
    }

    #[test]
    fn test_degenerate_coordinates_rejected() {
        assert!(HemisphereGeometry::new(Hemisphere::Left, vec![[0.0, 0.0, 0.0]]).is_err());
        assert!(HemisphereGeometry::new(Hemisphere::Left, vec![[f64::NAN, 1.0, 0.0]]).is_err());
        assert!(HemisphereGeometry::new(Hemisphere::Left, vec![]).is_err());
    }

    #[test]
    fn test_hemispheres_sorted_left_first() {
        let geometry = two_hemi(5);
        let blocks = geometry.blocks();
        assert_eq!(blocks[0], (Hemisphere::Left, 0..5));
        assert_eq!(blocks[1], (Hemisphere::Right, 5..10));
        assert_eq!(geometry.parcel_count(), 10);
    }

    #[test]
    fn test_duplicate_hemisphere_rejected() {
        let result = ParcellationGeometry::new(
            "dup",
            vec![
                HemisphereGeometry::new(Hemisphere::Left, fibonacci_sphere(3)).unwrap(),
                HemisphereGeometry::new(Hemisphere::Left, fibonacci_sphere(3)).unwrap(),
            ],
        );
        assert!(matches!(result, Err(StatsError::Data(_))));
    }

    #[test]
    fn test_non_finite_values_become_sentinel() {
        let map = SurfaceMap::new("m", "test", vec![1.0, f64::INFINITY, f64::NAN, 2.0]);
        assert_eq!(map.defined_count(), 2);
        assert!(map.values[1].is_nan());
    }

    #[test]
    fn test_missing_hemisphere_padded() {
        let geometry = two_hemi(3);
        let map =
            SurfaceMap::from_hemispheres("devexp", &geometry, None, Some(vec![1.0, 2.0, 3.0]))
                .unwrap();
        assert_eq!(map.len(), 6);
        assert!(map.values[..3].iter().all(|v| v.is_nan()));
        assert_eq!(&map.values[3..], &[1.0, 2.0, 3.0]);
        map.check_geometry(&geometry).unwrap();
    }

    #[test]
    fn test_geometry_mismatch_is_data_error() {
        let geometry = two_hemi(3);
        let short = SurfaceMap::new("m", "test", vec![1.0; 5]);
        assert!(matches!(short.check_geometry(&geometry), Err(StatsError::Data(_))));
        let wrong_tag = SurfaceMap::new("m", "other", vec![1.0; 6]);
        assert!(matches!(wrong_tag.check_geometry(&geometry), Err(StatsError::Data(_))));
    }

    #[test]
    fn test_fingerprint_tracks_content() {
        let a = SurfaceMap::new("a", "test", vec![1.0, f64::NAN, 3.0]);
        let b = SurfaceMap::new("b", "test", vec![1.0, f64::NAN, 3.0]);
        let c = SurfaceMap::new("a", "test", vec![1.0, f64::NAN, 3.5]);
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), c.fingerprint());
    }

    #[test]
    fn test_fibonacci_points_on_unit_sphere() {
        for p in fibonacci_sphere(50) {
            let norm = (p[0] * p[0] + p[1] * p[1] + p[2] * p[2]).sqrt();
            assert!((norm - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_hemisphere_parse() {
        assert_eq!(Hemisphere::parse("lh"), Some(Hemisphere::Left));
        assert_eq!(Hemisphere::parse(" R "), Some(Hemisphere::Right));
        assert_eq!(Hemisphere::parse("x"), None);
    }
}
