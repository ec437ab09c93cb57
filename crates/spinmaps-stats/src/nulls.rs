// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Spin-null generation.

Each permutation rotates every hemisphere of the sphere independently and
reassigns values by nearest-centroid correspondence, which keeps the spatial
autocorrelation of the map intact:

```text
for each permutation:
    for each hemisphere (left, then right):
        R ← uniform rotation
        for each defined parcel j:
            k ← defined parcel whose rotated centroid R·c_k is nearest to c_j
            null[j] ← value[k]
```

Undefined parcels never act as candidates and stay undefined in every null.
Ties go to the candidate with the smallest parcel index. Since
`|R·c_k - c_j| = |c_k - Rᵀ·c_j|`, the tree is built once over the original
candidate centroids and queried with inversely rotated points.
*/

use ndarray::{Array2, ArrayView1};
use tracing::debug;

use crate::kdtree::KdTree;
use crate::rotation::{random_rotation, rotate_points};
use crate::seed::rng_from_seed;
use crate::surface::{is_defined, ParcellationGeometry, SurfaceMap, SENTINEL};
use crate::types::{StatsError, StatsResult};

/// Rotated copies of one map
#[derive(Debug, Clone, PartialEq)]
pub struct NullEnsemble {
    map_name: String,
    seed: u64,
    /// One row per permutation
    maps: Array2<f64>,
}

impl NullEnsemble {
    /// Wrap an existing `n_perm × n_parcels` matrix (e.g. read from a cache)
    pub fn from_matrix(map_name: impl Into<String>, seed: u64, maps: Array2<f64>) -> StatsResult<Self> {
        if maps.nrows() == 0 {
            return Err(StatsError::InvalidInput(
                "null ensemble needs at least one permutation".to_string(),
            ));
        }
        Ok(Self {
            map_name: map_name.into(),
            seed,
            maps,
        })
    }

    pub fn map_name(&self) -> &str {
        &self.map_name
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn n_perm(&self) -> usize {
        self.maps.nrows()
    }

    /// Parcels per null map
    pub fn n_parcels(&self) -> usize {
        self.maps.ncols()
    }

    pub fn null(&self, index: usize) -> ArrayView1<'_, f64> {
        self.maps.row(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = ArrayView1<'_, f64>> {
        self.maps.rows().into_iter()
    }

    pub fn as_matrix(&self) -> &Array2<f64> {
        &self.maps
    }

    pub fn into_matrix(self) -> Array2<f64> {
        self.maps
    }
}

/// Candidate lookup for one hemisphere
struct HemisphereIndex<'g> {
    /// Centroids of the whole hemisphere (query points)
    coords: &'g [[f64; 3]],
    /// Offset of the hemisphere block in the map
    offset: usize,
    /// Local indices of defined parcels
    defined: Vec<usize>,
    tree: KdTree,
}

/// Generate `n_perm` spin nulls of `target`.
///
/// `seed` is used as-is; derive it per map with
/// [`derive_seed`](crate::seed::derive_seed) when running a catalog.
/// Identical inputs always give a bit-identical ensemble.
///
/// # Errors
///
/// - `InvalidInput` if `n_perm` is 0
/// - `Data` if the map does not fit the geometry or has no defined parcel
pub fn generate_nulls(
    target: &SurfaceMap,
    geometry: &ParcellationGeometry,
    n_perm: usize,
    seed: u64,
) -> StatsResult<NullEnsemble> {
    if n_perm == 0 {
        return Err(StatsError::InvalidInput(
            "n_perm must be at least 1".to_string(),
        ));
    }
    target.check_geometry(geometry)?;
    if target.defined_count() == 0 {
        return Err(StatsError::Data(format!(
            "map '{}' has no defined parcels to rotate",
            target.name
        )));
    }

    let indexes: Vec<HemisphereIndex<'_>> = geometry
        .hemispheres()
        .iter()
        .zip(geometry.blocks())
        .map(|(hemi, (_, range))| {
            let coords = hemi.coords();
            let defined: Vec<usize> = (0..coords.len())
                .filter(|&local| is_defined(target.values[range.start + local]))
                .collect();
            let tree = KdTree::build(defined.iter().map(|&local| (local, coords[local])));
            HemisphereIndex {
                coords,
                offset: range.start,
                defined,
                tree,
            }
        })
        .collect();

    let n_parcels = target.len();
    let mut maps = Array2::from_elem((n_perm, n_parcels), SENTINEL);
    let mut rng = rng_from_seed(seed);

    for perm in 0..n_perm {
        for index in &indexes {
            // Always draw so the stream layout does not depend on the data
            let rotation = random_rotation(&mut rng);
            if index.tree.is_empty() {
                continue;
            }
            let queries: Vec<[f64; 3]> =
                index.defined.iter().map(|&local| index.coords[local]).collect();
            let inverse = rotation.transpose();
            for (&local, query) in index.defined.iter().zip(rotate_points(&inverse, &queries)) {
                if let Some(source) = index.tree.nearest(query) {
                    maps[[perm, index.offset + local]] = target.values[index.offset + source];
                }
            }
        }
    }

    debug!(
        map = %target.name,
        n_perm,
        seed,
        defined = target.defined_count(),
        "generated spin nulls"
    );

    NullEnsemble::from_matrix(target.name.clone(), seed, maps)
}
