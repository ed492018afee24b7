//! Value-type vector arithmetic on [`V3`].
//!
//! These are thin free functions over the nalgebra vector so the solver code
//! can be read in terms of the PBF equations. Every function is pure.

use crate::{floating_type_mod::FT, V3};

/// Vectors shorter than this are treated as having no direction.
pub const NORMALIZE_EPS: FT = 1.0e-6;

#[inline(always)]
pub fn create(x: FT, y: FT, z: FT) -> V3 {
    V3::new(x, y, z)
}

#[inline(always)]
pub fn zero() -> V3 {
    V3::zeros()
}

#[inline(always)]
pub fn scale(a: FT, v: V3) -> V3 {
    v * a
}

#[inline(always)]
pub fn add(v: V3, w: V3) -> V3 {
    v + w
}

#[inline(always)]
pub fn subtract(v: V3, w: V3) -> V3 {
    add(v, scale(-1., w))
}

#[inline(always)]
pub fn cross(u: V3, v: V3) -> V3 {
    u.cross(&v)
}

#[inline(always)]
pub fn dot(u: V3, v: V3) -> FT {
    u.dot(&v)
}

#[inline(always)]
pub fn norm(u: V3) -> FT {
    dot(u, u).sqrt()
}

/// Unit vector in the direction of `v`, or the zero vector if `v` is (nearly) zero.
#[inline(always)]
pub fn normalize_or_zero(v: V3) -> V3 {
    let n = norm(v);
    if n < NORMALIZE_EPS || !n.is_finite() {
        return zero();
    }
    scale(1. / n, v)
}

/// Replaces a vector with non-finite components by zero.
#[inline(always)]
pub fn finite_or_zero(v: V3) -> V3 {
    if v.iter().all(|x| x.is_finite()) {
        v
    } else {
        zero()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assert_ft_approx_eq;
    use proptest::prelude::*;

    fn component() -> impl Strategy<Value = FT> {
        -1000.0 as FT..1000.0 as FT
    }

    fn vector() -> impl Strategy<Value = V3> {
        (component(), component(), component()).prop_map(|(x, y, z)| create(x, y, z))
    }

    fn assert_v3_approx_eq(a: V3, b: V3, tolerance: FT) {
        for d in 0..3 {
            assert_ft_approx_eq(a[d], b[d], tolerance, || format!("component {} of {} vs {}", d, a, b));
        }
    }

    proptest! {
        #[test]
        fn create_keeps_components(x in component(), y in component(), z in component()) {
            let v = create(x, y, z);
            prop_assert_eq!(v.x, x);
            prop_assert_eq!(v.y, y);
            prop_assert_eq!(v.z, z);
        }

        #[test]
        fn subtract_undoes_add(v in vector(), w in vector()) {
            assert_v3_approx_eq(subtract(add(v, w), w), v, 1.0e-3);
        }

        #[test]
        fn cross_anticommutes(u in vector(), v in vector()) {
            assert_v3_approx_eq(cross(u, v), scale(-1., cross(v, u)), 1.0e-2);
        }

        #[test]
        fn dot_commutes(u in vector(), v in vector()) {
            prop_assert_eq!(dot(u, v), dot(v, u));
        }

        #[test]
        fn norm_is_absolutely_homogeneous(a in -10.0 as FT..10.0 as FT, v in vector()) {
            let expected = a.abs() * norm(v);
            assert_ft_approx_eq(norm(scale(a, v)), expected, 1.0e-4 * (1. + expected), || "norm(a*v)".to_string());
        }

        #[test]
        fn normalized_vectors_have_unit_length(v in vector()) {
            prop_assume!(norm(v) > 1.0e-3);
            assert_ft_approx_eq(norm(normalize_or_zero(v)), 1., 1.0e-5, || "normalized length".to_string());
        }
    }

    #[test]
    fn zero_vector_has_zero_norm() {
        assert_eq!(norm(zero()), 0.);
    }

    #[test]
    fn normalizing_zero_yields_zero() {
        assert_eq!(normalize_or_zero(zero()), zero());
        assert_eq!(normalize_or_zero(create(1.0e-9, 0., 0.)), zero());
    }

    #[test]
    fn non_finite_vectors_collapse_to_zero() {
        assert_eq!(finite_or_zero(create(FT::NAN, 1., 2.)), zero());
        assert_eq!(finite_or_zero(create(FT::INFINITY, 1., 2.)), zero());
        assert_eq!(finite_or_zero(create(3., 1., 2.)), create(3., 1., 2.));
    }
}
