use crate::{
    floating_type_mod::{FT, PI},
    vector::{norm, scale, zero},
    V3,
};

/**
 * Poly6 kernel used as the density estimator.
 *
 * `r` is the difference between the two particle positions, `h` the support radius.
 */
#[inline(always)]
pub fn poly6(r: V3, h: FT) -> FT {
    poly6_from_distance(norm(r), h)
}

#[inline(always)]
pub fn poly6_from_distance(r_len: FT, h: FT) -> FT {
    if r_len > h {
        return 0.;
    }
    let h2 = h * h;
    let diff = h2 - r_len * r_len;
    let norm_factor = 315. / (64. * PI * h2 * h2 * h2 * h2 * h);
    norm_factor * diff * diff * diff
}

/**
 * Spiky kernel. Only its gradient enters the solver, the scalar value is
 * provided for completeness and for testing the gradient.
 */
#[inline(always)]
pub fn spiky(r: V3, h: FT) -> FT {
    spiky_from_distance(norm(r), h)
}

#[inline(always)]
pub fn spiky_from_distance(r_len: FT, h: FT) -> FT {
    if r_len > h {
        return 0.;
    }
    let h3 = h * h * h;
    let diff = h - r_len;
    let norm_factor = 15. / (PI * h3 * h3);
    norm_factor * diff * diff * diff
}

/**
 * Calculate the derivative dW/dx where W=spiky(|x-y|) and x-y=diff.
 *
 * The gradient is undefined at the origin; it is zero there.
 */
#[inline(always)]
pub fn spiky_gradient(diff: V3, h: FT) -> V3 {
    let r_len = norm(diff);
    if r_len <= 1.0e-6 * h || r_len > h {
        return zero();
    }
    let h3 = h * h * h;
    let v = h - r_len;
    let norm_factor = -45. / (PI * h3 * h3);
    scale(norm_factor * v * v / r_len, diff)
}

#[test]
fn kernels_vanish_outside_support() {
    use crate::vec3f;

    let h = 0.2;
    for r in [vec3f(0.21, 0., 0.), vec3f(0.15, 0.15, 0.), vec3f(1., -1., 3.)] {
        assert_eq!(poly6(r, h), 0.);
        assert_eq!(spiky(r, h), 0.);
        assert_eq!(spiky_gradient(r, h), V3::zeros());
    }
    assert_eq!(poly6(vec3f(0., 0., h), h), 0.);
    assert_eq!(spiky(vec3f(0., h, 0.), h), 0.);
}

#[test]
fn kernels_are_positive_and_strictly_decreasing() {
    let h = 0.2;
    let steps = 200;

    let mut last_poly6 = FT::INFINITY;
    let mut last_spiky = FT::INFINITY;
    for step in 0..steps {
        let r = h * step as FT / steps as FT;
        let w_poly6 = poly6_from_distance(r, h);
        let w_spiky = spiky_from_distance(r, h);

        assert!(w_poly6 > 0., "poly6({}) = {}", r, w_poly6);
        assert!(w_spiky > 0., "spiky({}) = {}", r, w_spiky);
        assert!(w_poly6 < last_poly6, "poly6 not decreasing at r={}", r);
        assert!(w_spiky < last_spiky, "spiky not decreasing at r={}", r);

        last_poly6 = w_poly6;
        last_spiky = w_spiky;
    }
}

#[test]
fn poly6_at_origin() {
    let h: FT = 0.5;
    let expected = 315. / (64. * PI * h.powi(3));
    crate::assert_ft_approx_eq(poly6(V3::zeros(), h), expected, 1.0e-3, || "poly6(0, h)".to_string());
}

#[test]
fn spiky_gradient_derivative_test() {
    use crate::vec3f;

    let h = 1.;
    let test_grid_size = 12;
    let diff = h * 1e-2;
    let diff_half = diff * 0.5;

    let probe_offset = 2. * h / test_grid_size as FT;

    for z in 0..test_grid_size {
        for y in 0..test_grid_size {
            for x in 0..test_grid_size {
                let probe_point = vec3f(
                    (x as FT + 0.5) * probe_offset - h,
                    (y as FT + 0.5) * probe_offset - h,
                    (z as FT + 0.5) * probe_offset - h,
                );

                // the kernel has a kink at the support boundary
                let r = norm(probe_point);
                if (r - h).abs() < diff {
                    continue;
                }

                let analytical_deriv = spiky_gradient(probe_point, h);

                let mut approx_deriv = V3::zeros();
                for d in 0..3 {
                    let mut offset = V3::zeros();
                    offset[d] = diff_half;
                    approx_deriv[d] = (spiky(probe_point + offset, h) - spiky(probe_point - offset, h)) / diff;
                }

                let absolute_error = analytical_deriv - approx_deriv;
                assert!(
                    absolute_error.amax() < 0.02,
                    "at {}: analytical={} approx={}",
                    probe_point,
                    analytical_deriv,
                    approx_deriv
                );
            }
        }
    }
}
