// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Uniform random rotations of the unit sphere

use nalgebra::{Matrix3, Vector3};
use rand::Rng;
use rand_distr::StandardNormal;

/// Draw a rotation matrix uniformly over SO(3).
///
/// QR-decomposes a 3×3 standard-normal matrix and fixes the column signs with
/// the diagonal of R so the result is Haar-distributed. A reflection
/// (determinant -1) is turned into a proper rotation by negating the first
/// column.
pub fn random_rotation<R: Rng>(rng: &mut R) -> Matrix3<f64> {
    let gaussian = Matrix3::from_fn(|_, _| rng.sample::<f64, _>(StandardNormal));
    let qr = gaussian.qr();
    let mut q = qr.q();
    let r = qr.r();

    for col in 0..3 {
        if r[(col, col)] < 0.0 {
            negate_column(&mut q, col);
        }
    }
    if q.determinant() < 0.0 {
        negate_column(&mut q, 0);
    }
    q
}

fn negate_column(m: &mut Matrix3<f64>, col: usize) {
    for row in 0..3 {
        m[(row, col)] = -m[(row, col)];
    }
}

/// Rotate every point by `rotation`
pub fn rotate_points(rotation: &Matrix3<f64>, points: &[[f64; 3]]) -> Vec<[f64; 3]> {
    points
        .iter()
        .map(|p| {
            let v = rotation * Vector3::new(p[0], p[1], p[2]);
            [v.x, v.y, v.z]
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_rotation_is_orthonormal_and_proper() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        for _ in 0..200 {
            let rot = random_rotation(&mut rng);
            let identity = rot.transpose() * rot;
            assert!((identity - Matrix3::identity()).abs().max() < 1e-10);
            assert!((rot.determinant() - 1.0).abs() < 1e-10);
        }
    }

    #[test]
    fn test_rotation_is_seed_deterministic() {
        let mut a = ChaCha8Rng::seed_from_u64(11);
        let mut b = ChaCha8Rng::seed_from_u64(11);
        assert_eq!(random_rotation(&mut a), random_rotation(&mut b));
    }

    #[test]
    fn test_rotation_preserves_norm() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let rot = random_rotation(&mut rng);
        let rotated = rotate_points(&rot, &[[1.0, 0.0, 0.0], [0.0, 0.6, 0.8]]);
        for p in rotated {
            let norm = (p[0] * p[0] + p[1] * p[1] + p[2] * p[2]).sqrt();
            assert!((norm - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_rotations_cover_the_sphere() {
        // The image of the north pole should land in both hemispheres of z
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let mut above = 0;
        for _ in 0..400 {
            let rot = random_rotation(&mut rng);
            if (rot * Vector3::z()).z > 0.0 {
                above += 1;
            }
        }
        assert!(above > 150 && above < 250, "above = {}", above);
    }
}
