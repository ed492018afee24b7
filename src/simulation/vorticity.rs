//! Vorticity confinement: re-injects the rotational energy the position projection damps out.

use crate::{
    concurrency::par_iter_mut1,
    floating_type_mod::FT,
    neighborhood_search::NeighborhoodCache,
    sph_kernels::spiky_gradient,
    vector::{add, cross, finite_or_zero, norm, normalize_or_zero, scale, zero},
    V3,
};

/// Curl of the velocity field at particle `i`, `sum_j (v_j - v_i) x grad_{p_j} W(p_i - p_j)`.
pub fn calculate_particle_vorticity(i: usize, position: &[V3], velocity: &[V3], neighs: &NeighborhoodCache, h: FT) -> V3 {
    let mut omega = zero();
    for j in neighs.iter(i) {
        if j == i {
            continue;
        }
        // grad_{p_j} W(p_i - p_j) = -grad_{p_i} W(p_i - p_j)
        let grad_j = -spiky_gradient(position[i] - position[j], h);
        omega = add(omega, cross(velocity[j] - velocity[i], grad_j));
    }
    finite_or_zero(omega)
}

pub fn calculate_all_vorticities(
    vorticity: &mut [V3],
    position: &[V3],
    velocity: &[V3],
    neighs: &NeighborhoodCache,
    h: FT,
) {
    par_iter_mut1(vorticity, |i, p_vorticity| {
        *p_vorticity = calculate_particle_vorticity(i, position, velocity, neighs, h);
    });
}

/// `epsilon * (N x omega_i)` where `N` is the normalized gradient of `|omega|`,
/// `eta_i = sum_j (|omega_j| - |omega_i|) grad W(p_i - p_j)`.
///
/// Returns zero where the gradient vanishes.
pub fn calculate_particle_confinement(
    i: usize,
    position: &[V3],
    vorticity: &[V3],
    neighs: &NeighborhoodCache,
    h: FT,
    epsilon: FT,
) -> V3 {
    let omega_i_len = norm(vorticity[i]);
    let mut eta = zero();
    for j in neighs.iter(i) {
        if j == i {
            continue;
        }
        let grad = spiky_gradient(position[i] - position[j], h);
        eta = add(eta, scale(norm(vorticity[j]) - omega_i_len, grad));
    }
    let n = normalize_or_zero(eta);
    finite_or_zero(scale(epsilon, cross(n, vorticity[i])))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        assert_ft_approx_eq, neighborhood_search::build_neighborhood_list,
        simulation_parameters::NeighborhoodSearchAlgorithm, vec3f, vector::dot,
    };

    const H: FT = 0.25;

    // 5x5x5 block with spacing 0.1 centered at (0.5, 0.5, 0.5)
    fn block() -> (Vec<V3>, NeighborhoodCache) {
        let mut position = Vec::new();
        for i in 0..5 {
            for j in 0..5 {
                for k in 0..5 {
                    position.push(vec3f(0.3 + 0.1 * i as FT, 0.3 + 0.1 * j as FT, 0.3 + 0.1 * k as FT));
                }
            }
        }
        let mut neighs = NeighborhoodCache::new(position.len());
        build_neighborhood_list(NeighborhoodSearchAlgorithm::Grid, &position, H, &mut neighs);
        (position, neighs)
    }

    const CENTER: usize = 2 * 25 + 2 * 5 + 2;

    #[test]
    fn translation_has_no_vorticity() {
        let (position, neighs) = block();
        let velocity = vec![vec3f(0.3, -1., 2.); position.len()];
        let mut vorticity = vec![V3::zeros(); position.len()];
        calculate_all_vorticities(&mut vorticity, &position, &velocity, &neighs, H);
        assert!(vorticity.iter().all(|w| *w == V3::zeros()));
        for i in 0..position.len() {
            assert_eq!(
                calculate_particle_confinement(i, &position, &vorticity, &neighs, H, 0.5),
                V3::zeros()
            );
        }
    }

    #[test]
    fn rotation_about_z_gives_vorticity_along_z() {
        let (position, neighs) = block();
        let axis = vec3f(0., 0., 1.);
        let center = vec3f(0.5, 0.5, 0.5);
        let velocity: Vec<V3> = position.iter().map(|p| cross(axis, p - center)).collect();

        let mut vorticity = vec![V3::zeros(); position.len()];
        calculate_all_vorticities(&mut vorticity, &position, &velocity, &neighs, H);

        let w = vorticity[CENTER];
        assert!(w.z > 0., "vorticity {} does not point along the rotation axis", w);
        assert!(w.x.abs() < 1.0e-3 * w.z);
        assert!(w.y.abs() < 1.0e-3 * w.z);

        for i in 0..position.len() {
            let f = calculate_particle_confinement(i, &position, &vorticity, &neighs, H, 0.5);
            assert!(f.iter().all(|x| x.is_finite()));
        }
    }

    #[test]
    fn confinement_follows_the_rotation() {
        let (position, neighs) = block();
        let axis = vec3f(0., 0., 1.);
        let center = vec3f(0.5, 0.5, 0.5);
        let velocity: Vec<V3> = position.iter().map(|p| cross(axis, p - center)).collect();

        let mut vorticity = vec![V3::zeros(); position.len()];
        calculate_all_vorticities(&mut vorticity, &position, &velocity, &neighs, H);

        // |omega| peaks in the core, so N points inward and N x omega points along the flow
        for (i, expected) in [
            (CENTER + 25, vec3f(0., 1., 0.)),
            (CENTER - 25, vec3f(0., -1., 0.)),
            (CENTER + 5, vec3f(-1., 0., 0.)),
            (CENTER - 5, vec3f(1., 0., 0.)),
        ] {
            let f = calculate_particle_confinement(i, &position, &vorticity, &neighs, H, 0.5);
            let along = dot(f, expected);
            assert!(along > 0., "confinement {} of particle {} does not point along {}", f, i, expected);
            assert!((f - expected * along).norm() < 1.0e-2 * along);
            assert!(dot(f, velocity[i]) > 0.);
            // |f| = epsilon * |omega| because N is a unit vector orthogonal to omega
            assert_ft_approx_eq(along, 0.5 * norm(vorticity[i]), 1.0e-3 * along, || {
                format!("confinement magnitude of particle {}", i)
            });
        }
    }
}
