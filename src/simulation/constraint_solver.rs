/*!
Density constraint projection of Position Based Fluids (Macklin & Müller 2013).

One solver iteration consists of three passes over all particles, each reading
only the complete output of the previous pass:

1. density and constraint `C_i = rho_i / rho_0 - 1`
2. Lagrange multiplier `lambda_i`
3. position correction `dp_i`, written to a separate buffer

The corrections are applied after the third pass, so every lambda and every
correction of one iteration sees the same snapshot of predicted positions.
*/

use crate::{
    concurrency::{par_iter_mut1, par_iter_reduce1},
    floating_type_mod::FT,
    neighborhood_search::NeighborhoodCache,
    simulation_parameters::{BoundaryMode, SimulationParams, TensileCorrection},
    sph_kernels::{poly6, poly6_from_distance, spiky_gradient},
    vector::{add, finite_or_zero, scale, zero},
    V3,
};

pub fn calculate_particle_density(
    i: usize,
    position: &[V3],
    neighs: &NeighborhoodCache,
    simulation_params: SimulationParams,
) -> FT {
    let mut density_acc = 0.;
    for j in neighs.iter(i) {
        density_acc += poly6(position[i] - position[j], simulation_params.h);
    }
    simulation_params.particle_mass * density_acc
}

#[inline(always)]
pub fn constraint(density: FT, simulation_params: SimulationParams) -> FT {
    density / simulation_params.rest_density - 1.
}

pub fn calculate_all_particle_densities(
    density: &mut [FT],
    position: &[V3],
    neighs: &NeighborhoodCache,
    simulation_params: SimulationParams,
) {
    par_iter_mut1(density, |i, p_density| {
        *p_density = calculate_particle_density(i, position, neighs, simulation_params);
        debug_assert!(p_density.is_finite());
    });
}

/// Average of `|C_i|` over all particles.
pub fn average_constraint_error(density: &[FT], simulation_params: SimulationParams) -> FT {
    if density.is_empty() {
        return 0.;
    }
    let sum = par_iter_reduce1(
        density,
        || 0.,
        |a, b| a + b,
        |_, &rho| constraint(rho, simulation_params).abs(),
    );
    sum / density.len() as FT
}

pub fn calculate_particle_lambda(
    i: usize,
    position: &[V3],
    density: &[FT],
    neighs: &NeighborhoodCache,
    simulation_params: SimulationParams,
) -> FT {
    let c_i = constraint(density[i], simulation_params);
    let grad_scale = simulation_params.particle_mass / simulation_params.rest_density;

    // gradient of C_i with respect to p_i, and the squared gradients with respect to every neighbor p_j
    let mut grad_i = zero();
    let mut grad_sum_sq = 0.;
    for j in neighs.iter(i) {
        if j == i {
            continue;
        }
        let grad_j = scale(grad_scale, spiky_gradient(position[i] - position[j], simulation_params.h));
        grad_i = add(grad_i, grad_j);
        grad_sum_sq += grad_j.norm_squared();
    }
    grad_sum_sq += grad_i.norm_squared();

    let lambda = -c_i / (grad_sum_sq + simulation_params.relaxation);
    if lambda.is_finite() {
        lambda
    } else {
        0.
    }
}

pub fn calculate_all_particle_lambdas(
    lambda: &mut [FT],
    position: &[V3],
    density: &[FT],
    neighs: &NeighborhoodCache,
    simulation_params: SimulationParams,
) {
    par_iter_mut1(lambda, |i, p_lambda| {
        *p_lambda = calculate_particle_lambda(i, position, density, neighs, simulation_params);
    });
}

/// Artificial pressure `-k (W(r) / W(delta_q h))^n`.
#[inline(always)]
fn tensile_correction_term(r: V3, tensile_correction: TensileCorrection, h: FT) -> FT {
    let w_ref = poly6_from_distance(tensile_correction.delta_q * h, h);
    if w_ref <= 0. {
        return 0.;
    }
    -tensile_correction.k * (poly6(r, h) / w_ref).powi(tensile_correction.n)
}

pub fn calculate_particle_position_delta(
    i: usize,
    position: &[V3],
    lambda: &[FT],
    neighs: &NeighborhoodCache,
    simulation_params: SimulationParams,
) -> V3 {
    let h = simulation_params.h;
    let mut delta = zero();
    for j in neighs.iter(i) {
        if j == i {
            continue;
        }
        let x_ij = position[i] - position[j];
        let s_corr = match simulation_params.tensile_correction {
            Some(tensile_correction) => tensile_correction_term(x_ij, tensile_correction, h),
            None => 0.,
        };
        delta = add(delta, scale(lambda[i] + lambda[j] + s_corr, spiky_gradient(x_ij, h)));
    }
    finite_or_zero(scale(
        simulation_params.particle_mass / simulation_params.rest_density,
        delta,
    ))
}

pub fn calculate_all_position_deltas(
    position_delta: &mut [V3],
    position: &[V3],
    lambda: &[FT],
    neighs: &NeighborhoodCache,
    simulation_params: SimulationParams,
) {
    par_iter_mut1(position_delta, |i, p_delta| {
        *p_delta = calculate_particle_position_delta(i, position, lambda, neighs, simulation_params);
    });
}

/// Keeps a position inside the unit cube.
pub fn enforce_domain_boundary(mut p: V3, boundary_mode: BoundaryMode) -> V3 {
    for d in 0..3 {
        p[d] = match boundary_mode {
            BoundaryMode::Clamp => p[d].clamp(0., 1.),
            BoundaryMode::Reflect => {
                let mut x = p[d];
                if x < 0. {
                    x = -x;
                }
                if x > 1. {
                    x = 2. - x;
                }
                // a displacement larger than the whole domain still ends up inside
                x.clamp(0., 1.)
            }
        };
    }
    p
}

pub fn apply_position_deltas(
    position: &mut [V3],
    position_delta: &[V3],
    simulation_params: SimulationParams,
) {
    par_iter_mut1(position, |i, p| {
        *p = enforce_domain_boundary(*p + position_delta[i], simulation_params.boundary_mode);
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        assert_ft_approx_eq, neighborhood_search::build_neighborhood_list,
        simulation_parameters::NeighborhoodSearchAlgorithm, vec3f,
    };

    fn neighborhoods(position: &[V3], simulation_params: SimulationParams) -> NeighborhoodCache {
        let mut neighs = NeighborhoodCache::new(position.len());
        build_neighborhood_list(
            simulation_params.neighborhood_search_algorithm,
            position,
            simulation_params.h,
            &mut neighs,
        );
        neighs
    }

    #[test]
    fn isolated_particle_density_is_self_contribution() {
        let simulation_params = SimulationParams {
            h: 0.2,
            ..SimulationParams::with_cube_size(2)
        };
        let position = vec![vec3f(0.5, 0.5, 0.5), vec3f(0.9, 0.5, 0.5), vec3f(0.5, 0.1, 0.5)];
        let neighs = neighborhoods(&position, simulation_params);

        let density = calculate_particle_density(0, &position, &neighs, simulation_params);
        assert_eq!(density, poly6(V3::zeros(), simulation_params.h));
    }

    #[test]
    fn isolated_particle_gets_no_correction() {
        let simulation_params = SimulationParams {
            h: 0.1,
            ..SimulationParams::with_cube_size(2)
        };
        let position = vec![vec3f(0.2, 0.2, 0.2), vec3f(0.8, 0.8, 0.8)];
        let neighs = neighborhoods(&position, simulation_params);

        let density: Vec<FT> = (0..2)
            .map(|i| calculate_particle_density(i, &position, &neighs, simulation_params))
            .collect();
        let lambda: Vec<FT> = (0..2)
            .map(|i| calculate_particle_lambda(i, &position, &density, &neighs, simulation_params))
            .collect();
        for i in 0..2 {
            assert!(lambda[i].is_finite());
            assert_eq!(
                calculate_particle_position_delta(i, &position, &lambda, &neighs, simulation_params),
                V3::zeros()
            );
        }
    }

    #[test]
    fn zero_relaxation_with_lonely_particle_stays_finite() {
        // the denominator is exactly zero without neighbors
        let simulation_params = SimulationParams {
            h: 0.1,
            relaxation: 0.,
            ..SimulationParams::with_cube_size(1)
        };
        let position = vec![vec3f(0.5, 0.5, 0.5)];
        let neighs = neighborhoods(&position, simulation_params);
        let density = vec![calculate_particle_density(0, &position, &neighs, simulation_params)];
        assert_eq!(calculate_particle_lambda(0, &position, &density, &neighs, simulation_params), 0.);
    }

    #[test]
    fn compressed_pair_is_pushed_apart() {
        let simulation_params = SimulationParams {
            h: 0.2,
            rest_density: 100.,
            ..SimulationParams::with_cube_size(2)
        };
        let position = vec![vec3f(0.45, 0.5, 0.5), vec3f(0.55, 0.5, 0.5)];
        let neighs = neighborhoods(&position, simulation_params);

        let mut density = vec![0.; 2];
        calculate_all_particle_densities(&mut density, &position, &neighs, simulation_params);
        assert!(density.iter().all(|&rho| rho > simulation_params.rest_density));

        let mut lambda = vec![0.; 2];
        calculate_all_particle_lambdas(&mut lambda, &position, &density, &neighs, simulation_params);
        assert!(lambda.iter().all(|&l| l < 0.));

        let mut delta = vec![V3::zeros(); 2];
        calculate_all_position_deltas(&mut delta, &position, &lambda, &neighs, simulation_params);
        assert!(delta[0].x < 0.);
        assert!(delta[1].x > 0.);
        assert_ft_approx_eq(delta[0].x, -delta[1].x, 1.0e-6, || "symmetric correction".to_string());
        assert_eq!(delta[0].y, 0.);
        assert_eq!(delta[0].z, 0.);
    }

    #[test]
    fn densities_do_not_depend_on_search_algorithm() {
        let mut position = Vec::new();
        for i in 0..6 {
            for j in 0..6 {
                for k in 0..6 {
                    position.push(vec3f(0.07 * i as FT + 0.01 * j as FT, 0.07 * j as FT, 0.07 * k as FT + 0.003 * i as FT));
                }
            }
        }

        let mut results = Vec::new();
        for algorithm in [
            NeighborhoodSearchAlgorithm::BruteForce,
            NeighborhoodSearchAlgorithm::Grid,
            NeighborhoodSearchAlgorithm::RStar,
        ] {
            let simulation_params = SimulationParams {
                h: 0.15,
                neighborhood_search_algorithm: algorithm,
                ..SimulationParams::with_cube_size(6)
            };
            let neighs = neighborhoods(&position, simulation_params);
            let mut density = vec![0.; position.len()];
            calculate_all_particle_densities(&mut density, &position, &neighs, simulation_params);
            results.push(density);
        }

        assert_eq!(results[0], results[1]);
        assert_eq!(results[0], results[2]);
    }

    #[test]
    fn brute_force_density_matches_full_sum() {
        let simulation_params = SimulationParams {
            h: 0.3,
            neighborhood_search_algorithm: NeighborhoodSearchAlgorithm::Grid,
            ..SimulationParams::with_cube_size(3)
        };
        let position: Vec<V3> = (0..27)
            .map(|n| vec3f((n % 3) as FT * 0.2, ((n / 3) % 3) as FT * 0.2, (n / 9) as FT * 0.2))
            .collect();
        let neighs = neighborhoods(&position, simulation_params);

        for i in 0..position.len() {
            // all particles, kernels vanish outside the support radius
            let full_sum: FT = position.iter().map(|&pj| poly6(position[i] - pj, simulation_params.h)).sum();
            assert_eq!(calculate_particle_density(i, &position, &neighs, simulation_params), full_sum);
        }
    }

    #[test]
    fn boundary_clamps_and_reflects() {
        let p = vec3f(-0.25, 0.5, 1.5);
        assert_eq!(enforce_domain_boundary(p, BoundaryMode::Clamp), vec3f(0., 0.5, 1.));
        let reflected = enforce_domain_boundary(p, BoundaryMode::Reflect);
        assert_eq!(reflected, vec3f(0.25, 0.5, 0.5));
        let far = enforce_domain_boundary(vec3f(5., -7., 0.3), BoundaryMode::Reflect);
        assert!(far.iter().all(|&x| (0. ..=1.).contains(&x)));
    }

    #[test]
    fn tensile_correction_is_repulsive() {
        let tc = TensileCorrection::default();
        let h = 0.2;
        let close = tensile_correction_term(vec3f(0.01, 0., 0.), tc, h);
        let far = tensile_correction_term(vec3f(0.15, 0., 0.), tc, h);
        assert!(close < 0.);
        assert!(far <= 0.);
        assert!(close < far);
        assert_eq!(tensile_correction_term(vec3f(0.3, 0., 0.), tc, h), 0.);
    }
}
