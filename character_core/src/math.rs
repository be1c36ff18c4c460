//! Zero-safe vector helpers used throughout the solver.
//!
//! Every normalize/divide in the hot path goes through these so degenerate
//! inputs degrade to zero vectors instead of propagating NaN into a pose.

use rapier3d::math::{Real, Vector};

/// Squared-length threshold below which a vector counts as zero.
pub const VECTOR_EPSILON_SQ: Real = 1.0e-12;

pub fn is_finite(v: &Vector<Real>) -> bool {
    v.x.is_finite() && v.y.is_finite() && v.z.is_finite()
}

pub fn normalize_or_zero(v: &Vector<Real>) -> Vector<Real> {
    let len_sq = v.norm_squared();
    if len_sq > VECTOR_EPSILON_SQ && len_sq.is_finite() {
        v / len_sq.sqrt()
    } else {
        Vector::zeros()
    }
}

/// Removes the component of `v` along `normal` (assumed unit length).
/// Degenerate normals leave `v` untouched.
pub fn project_on_plane(v: &Vector<Real>, normal: &Vector<Real>) -> Vector<Real> {
    if normal.norm_squared() <= VECTOR_EPSILON_SQ {
        return *v;
    }
    v - normal * v.dot(normal)
}

/// Redirects `v` onto `direction` (unit length) so that the result's
/// projection back onto `v`'s own direction preserves `v`'s magnitude,
/// clamped to `max_length` so near-perpendicular directions cannot blow up.
/// Degenerate inputs yield the zero vector.
pub fn reverse_project_on_vector(
    v: &Vector<Real>,
    direction: &Vector<Real>,
    max_length: Real,
) -> Vector<Real> {
    let len_sq = v.norm_squared();
    if len_sq <= VECTOR_EPSILON_SQ || !len_sq.is_finite() {
        return Vector::zeros();
    }
    let along = v.dot(direction);
    if along <= VECTOR_EPSILON_SQ {
        return Vector::zeros();
    }
    let length = (len_sq / along).min(max_length.max(0.0));
    direction * length
}

/// Rotates `v` onto the plane of `normal` keeping its magnitude. Falls back
/// to plain plane projection when the tangent direction degenerates.
pub fn reorient_on_plane(v: &Vector<Real>, normal: &Vector<Real>) -> Vector<Real> {
    let projected = project_on_plane(v, normal);
    let len_sq = projected.norm_squared();
    if len_sq <= VECTOR_EPSILON_SQ {
        return Vector::zeros();
    }
    projected * (v.norm() / len_sq.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rapier3d::prelude::vector;

    #[test]
    fn normalize_or_zero_handles_degenerate_inputs() {
        assert_eq!(normalize_or_zero(&Vector::zeros()), Vector::zeros());
        assert_eq!(
            normalize_or_zero(&vector![1.0e-10, 0.0, 0.0]),
            Vector::zeros()
        );
        let n = normalize_or_zero(&vector![3.0, 0.0, 4.0]);
        assert!((n.norm() - 1.0).abs() < 1.0e-6);
    }

    #[test]
    fn project_on_plane_removes_normal_component() {
        let v = vector![1.0, -2.0, 3.0];
        let up = vector![0.0, 1.0, 0.0];
        let p = project_on_plane(&v, &up);
        assert_eq!(p, vector![1.0, 0.0, 3.0]);
        // Idempotent once the constraint is satisfied.
        assert_eq!(project_on_plane(&p, &up), p);
    }

    #[test]
    fn reverse_projection_is_identity_for_parallel_input() {
        let dir = vector![0.0, 0.0, 1.0];
        let v = vector![0.0, 0.0, 2.5];
        let r = reverse_project_on_vector(&v, &dir, 100.0);
        assert!((r - v).norm() < 1.0e-5);
    }

    #[test]
    fn reverse_projection_clamps_near_perpendicular() {
        let dir = vector![0.0, 0.0, 1.0];
        let v = vector![1.0, 0.0, 1.0e-4];
        let r = reverse_project_on_vector(&v, &dir, 5.0);
        assert!(r.norm() <= 5.0 + 1.0e-5);
        assert!(is_finite(&r));
    }

    #[test]
    fn no_nan_for_fuzzed_degenerate_inputs() {
        let tiny = [0.0, 1.0e-9, -1.0e-9, 1.0e-7];
        for &x in &tiny {
            for &y in &tiny {
                for &z in &tiny {
                    let v = vector![x, y, z];
                    assert!(is_finite(&normalize_or_zero(&v)));
                    assert!(is_finite(&project_on_plane(&v, &v)));
                    assert!(is_finite(&reverse_project_on_vector(&v, &v, 10.0)));
                    assert!(is_finite(&reorient_on_plane(&v, &v)));
                }
            }
        }
    }
}
