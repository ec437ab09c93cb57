// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! KD-tree for nearest-centroid lookups on the sphere
//!
//! Median-split construction over 3-D points. Queries return the nearest
//! point; among equidistant points the one with the smallest index wins.

use std::cmp::Ordering;

#[derive(Clone, Copy, Debug)]
struct Point {
    coords: [f64; 3],
    idx: usize,
}

impl Point {
    #[inline]
    fn distance_sq(&self, query: &[f64; 3]) -> f64 {
        let dx = self.coords[0] - query[0];
        let dy = self.coords[1] - query[1];
        let dz = self.coords[2] - query[2];
        dx * dx + dy * dy + dz * dz
    }
}

#[derive(Debug)]
struct KdNode {
    point: Point,
    split_dim: usize,
    left: Option<Box<KdNode>>,
    right: Option<Box<KdNode>>,
}

/// 3-D KD-tree over indexed points
#[derive(Debug)]
pub struct KdTree {
    root: Option<Box<KdNode>>,
    size: usize,
}

impl KdTree {
    /// Build from `(index, point)` pairs. Indices are returned by queries.
    pub fn build(points: impl IntoIterator<Item = (usize, [f64; 3])>) -> Self {
        let mut points: Vec<Point> = points
            .into_iter()
            .map(|(idx, coords)| Point { coords, idx })
            .collect();
        let size = points.len();
        let root = Self::build_recursive(&mut points, 0);
        KdTree { root, size }
    }

    fn build_recursive(points: &mut [Point], depth: usize) -> Option<Box<KdNode>> {
        if points.is_empty() {
            return None;
        }
        let dim = depth % 3;
        points.sort_by(|a, b| {
            a.coords[dim]
                .partial_cmp(&b.coords[dim])
                .unwrap_or(Ordering::Equal)
                .then(a.idx.cmp(&b.idx))
        });
        let mid = points.len() / 2;
        let (left, rest) = points.split_at_mut(mid);
        let (pivot, right) = rest.split_first_mut()?;

        Some(Box::new(KdNode {
            point: *pivot,
            split_dim: dim,
            left: Self::build_recursive(left, depth + 1),
            right: Self::build_recursive(right, depth + 1),
        }))
    }

    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Index of the nearest point, `None` for an empty tree
    pub fn nearest(&self, query: [f64; 3]) -> Option<usize> {
        let root = self.root.as_ref()?;
        let mut best = (f64::INFINITY, usize::MAX);
        Self::nearest_recursive(root, &query, &mut best);
        (best.1 != usize::MAX).then_some(best.1)
    }

    fn nearest_recursive(node: &KdNode, query: &[f64; 3], best: &mut (f64, usize)) {
        let dist_sq = node.point.distance_sq(query);
        if dist_sq < best.0 || (dist_sq == best.0 && node.point.idx < best.1) {
            *best = (dist_sq, node.point.idx);
        }

        let dim = node.split_dim;
        let diff = query[dim] - node.point.coords[dim];
        let (first, second) = if diff < 0.0 {
            (&node.left, &node.right)
        } else {
            (&node.right, &node.left)
        };

        if let Some(child) = first {
            Self::nearest_recursive(child, query, best);
        }
        // `<=` so equidistant points across the plane are still visited for ties
        if diff * diff <= best.0 {
            if let Some(child) = second {
                Self::nearest_recursive(child, query, best);
            }
        }
    }
}
