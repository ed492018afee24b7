use anyhow::{Context, Result};
use log::{debug, info, warn};
use num_traits::Float;
use std::fmt::Display;
use std::mem;

use crate::simulation::concurrency::{par_iter_mut1, par_iter_mut2};
use crate::simulation::constraint_solver::{
    apply_position_deltas, average_constraint_error, calculate_all_particle_densities, calculate_all_particle_lambdas,
    calculate_all_position_deltas,
};
use crate::simulation::forces::{force_terms_from_params, Force, ForceTerm};
use crate::simulation::neighborhood_search::{build_neighborhood_list, NeighborhoodCache};
use crate::simulation::particles::ParticleVec;
use crate::simulation::simulation_parameters::SimulationParams;
use crate::simulation::sph_kernels::poly6;
use crate::simulation::statistics::{write_statistics, PerformanceCounters, ValueCounters};
use crate::{floating_type_mod::FT, V3};

pub struct FluidSimulation {
    pub particles: ParticleVec,
    pub neighs: NeighborhoodCache,
    pub forces: Vec<Force>,
    pub time: FT,
    pub frame: usize,
    pcounters: PerformanceCounters,
    vcounters: ValueCounters,
}

impl FluidSimulation {
    pub fn new(particles: ParticleVec, simulation_params: SimulationParams, counters_enabled: bool) -> Self {
        particles.assert_consistent();
        let num_particles = particles.len();
        FluidSimulation {
            particles,
            neighs: NeighborhoodCache::new(num_particles),
            forces: force_terms_from_params(simulation_params),
            time: 0.,
            frame: 0,
            pcounters: PerformanceCounters::new(counters_enabled),
            vcounters: ValueCounters::new(counters_enabled),
        }
    }

    pub fn num_fluid_particles(&self) -> usize {
        self.particles.len()
    }

    fn update_neighborhoods(&mut self, use_predicted: bool, simulation_params: SimulationParams) {
        self.pcounters.begin("neighborhood-search");
        let positions = if use_predicted {
            &self.particles.predicted_position
        } else {
            &self.particles.position
        };
        build_neighborhood_list(
            simulation_params.neighborhood_search_algorithm,
            positions,
            simulation_params.h,
            &mut self.neighs,
        );
        self.pcounters.end("neighborhood-search");
    }

    /// `v += dt * a` where `a` is the sum of all force terms.
    pub fn apply_forces(&mut self, simulation_params: SimulationParams) {
        self.pcounters.begin("forces");

        par_iter_mut1(&mut self.particles.acceleration, |_, a| *a = V3::zeros());

        if self.forces.iter().any(|f| f.needs_neighborhood()) {
            self.update_neighborhoods(false, simulation_params);
        }

        for force in &self.forces {
            force.accumulate_accelerations(&mut self.particles, &self.neighs, simulation_params);
        }

        let dt = simulation_params.dt;
        let acceleration = &self.particles.acceleration;
        par_iter_mut1(&mut self.particles.velocity, |i, v| {
            *v += acceleration[i] * dt;
        });

        self.pcounters.end("forces");
    }

    /// `p* = p + dt * v`. Predicted positions are not constrained to the domain.
    pub fn predict_positions(&mut self, simulation_params: SimulationParams) {
        let dt = simulation_params.dt;
        let position = &self.particles.position;
        let velocity = &self.particles.velocity;
        par_iter_mut1(&mut self.particles.predicted_position, |i, p| {
            *p = position[i] + velocity[i] * dt;
        });
    }

    /// One Jacobi projection of the density constraints onto the predicted positions.
    ///
    /// Returns the average absolute constraint error before the correction was applied.
    pub fn solver_iteration(&mut self, simulation_params: SimulationParams) -> FT {
        self.update_neighborhoods(true, simulation_params);

        let particles = &mut self.particles;

        self.pcounters.begin("density");
        calculate_all_particle_densities(
            &mut particles.density,
            &particles.predicted_position,
            &self.neighs,
            simulation_params,
        );
        self.pcounters.end("density");

        let avg_error = average_constraint_error(&particles.density, simulation_params);

        self.pcounters.begin("lambda");
        calculate_all_particle_lambdas(
            &mut particles.lambda,
            &particles.predicted_position,
            &particles.density,
            &self.neighs,
            simulation_params,
        );
        self.pcounters.end("lambda");

        self.pcounters.begin("correction");
        calculate_all_position_deltas(
            &mut particles.position_delta,
            &particles.predicted_position,
            &particles.lambda,
            &self.neighs,
            simulation_params,
        );
        apply_position_deltas(
            &mut particles.predicted_position,
            &particles.position_delta,
            simulation_params,
        );
        self.pcounters.end("correction");

        self.vcounters.add_value("avg-density-error", avg_error);

        avg_error
    }

    /// Derives velocities from the displacement and commits the predicted positions.
    pub fn finalize_positions(&mut self, simulation_params: SimulationParams) {
        let inv_dt = 1. / simulation_params.dt;
        {
            let particles = &mut self.particles;
            let predicted_position = &particles.predicted_position;
            par_iter_mut2(
                &mut particles.velocity,
                &mut particles.position,
                |i, p_velocity, p_position| {
                    *p_velocity = (predicted_position[i] - *p_position) * inv_dt;
                },
            );
        }

        if simulation_params.xsph_viscosity > 0. {
            self.apply_xsph_viscosity(simulation_params);
        }

        let particles = &mut self.particles;
        particles.position.copy_from_slice(&particles.predicted_position);
    }

    /// Smooths the velocity field, `v_i += c * sum_j (v_j - v_i) * m / rho_j * W(p_i - p_j)`.
    fn apply_xsph_viscosity(&mut self, simulation_params: SimulationParams) {
        self.update_neighborhoods(true, simulation_params);

        let particles = &mut self.particles;
        calculate_all_particle_densities(
            &mut particles.density,
            &particles.predicted_position,
            &self.neighs,
            simulation_params,
        );

        let position = &particles.predicted_position;
        let velocity = &particles.velocity;
        let density = &particles.density;
        let neighs = &self.neighs;
        par_iter_mut1(&mut particles.velocity_temp, |i, p_velocity_temp| {
            let mut smoothing = V3::zeros();
            for j in neighs.iter(i) {
                if j == i || density[j] <= 0. {
                    continue;
                }
                let weight = simulation_params.particle_mass / density[j] * poly6(position[i] - position[j], simulation_params.h);
                smoothing += (velocity[j] - velocity[i]) * weight;
            }
            *p_velocity_temp = velocity[i] + smoothing * simulation_params.xsph_viscosity;
        });

        mem::swap(&mut particles.velocity, &mut particles.velocity_temp);
    }

    /// Advances the simulation by one frame of length `dt`.
    ///
    /// Returns the average constraint error seen by the last solver iteration.
    pub fn single_step(&mut self, simulation_params: SimulationParams) -> FT {
        self.pcounters.begin("simulation-step");

        self.apply_forces(simulation_params);
        self.predict_positions(simulation_params);

        let mut avg_error = 0.;
        for iter in 0..simulation_params.solver_iterations {
            avg_error = self.solver_iteration(simulation_params);
            debug!(
                "frame {} iteration {}: avg density error {:.6}",
                self.frame, iter, avg_error
            );
        }

        self.finalize_positions(simulation_params);

        self.time += simulation_params.dt;
        self.frame += 1;

        self.pcounters.end("simulation-step");
        let num_particles = self.num_fluid_particles() as FT;
        self.vcounters.add_value("particle-count", num_particles);

        avg_error
    }

    pub fn write_statistics(&self) -> String {
        write_statistics(&self.pcounters, &self.vcounters)
    }
}

/// Allocates `cube_size^3` particles on the unit cube lattice and sets up the simulation.
pub fn init_fluid_sim(simulation_params: SimulationParams, counters_enabled: bool) -> Result<FluidSimulation> {
    simulation_params.validate()?;

    let mut particles = ParticleVec::allocate(simulation_params.num_elements)?;
    particles
        .lay_out_lattice(simulation_params.cube_size)
        .context("failed to lay out initial particle lattice")?;
    particles.set_uniform_velocity(simulation_params.initial_velocity);

    info!("INIT {} FLUID PARTICLES", particles.len());

    if simulation_params.cube_size > 1 {
        let spacing = 1. / (simulation_params.cube_size - 1) as FT;
        if simulation_params.h < spacing {
            warn!(
                "kernel radius {} is smaller than the lattice spacing {}, particles start without neighbors",
                simulation_params.h, spacing
            );
        }
    }

    Ok(FluidSimulation::new(particles, simulation_params, counters_enabled))
}

pub fn is_ft_approx_eq<FT: Float>(a: FT, b: FT, tolerance: FT) -> bool {
    assert!(!a.is_nan());
    assert!(!b.is_nan());
    b <= a + tolerance && b >= a - tolerance
}

pub fn assert_ft_approx_eq<FT: Float + Display>(a: FT, b: FT, tolerance: FT, s: impl FnOnce() -> String) {
    if !is_ft_approx_eq(a, b, tolerance) {
        panic!(
            "{} value not equal with a tolerance of {}:\n\ta={}\n\tb={}\n",
            s(),
            tolerance,
            a,
            b
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{simulation::constraint_solver::calculate_particle_density, vec3f};

    #[test]
    fn xsph_pulls_neighbor_velocities_together() {
        let simulation_params = SimulationParams {
            h: 0.2,
            xsph_viscosity: 0.1,
            ..SimulationParams::with_cube_size(1)
        };
        let mut particles = ParticleVec::allocate(3).unwrap();
        particles.predicted_position[0] = vec3f(0.5, 0.5, 0.5);
        particles.predicted_position[1] = vec3f(0.55, 0.5, 0.5);
        // far away from the pair
        particles.predicted_position[2] = vec3f(0.1, 0.1, 0.1);
        particles.velocity[0] = vec3f(1., 0., 0.);
        particles.velocity[1] = vec3f(-1., 0., 0.);
        particles.velocity[2] = vec3f(0., 0.3, 0.);
        let velocity_before = particles.velocity.clone();

        let mut sim = FluidSimulation::new(particles, simulation_params, false);
        sim.apply_xsph_viscosity(simulation_params);

        let position = sim.particles.predicted_position.clone();
        let mut neighs = NeighborhoodCache::new(3);
        build_neighborhood_list(
            simulation_params.neighborhood_search_algorithm,
            &position,
            simulation_params.h,
            &mut neighs,
        );
        for (i, j) in [(0, 1), (1, 0)] {
            let rho_j = calculate_particle_density(j, &position, &neighs, simulation_params);
            let weight = simulation_params.particle_mass / rho_j * poly6(position[i] - position[j], simulation_params.h);
            let expected = velocity_before[i]
                + (velocity_before[j] - velocity_before[i]) * weight * simulation_params.xsph_viscosity;
            for d in 0..3 {
                assert_ft_approx_eq(sim.particles.velocity[i][d], expected[d], 1.0e-6, || {
                    format!("velocity of particle {} along axis {}", i, d)
                });
            }
        }

        // both move toward the pair mean by the same amount
        let v0 = sim.particles.velocity[0].x;
        let v1 = sim.particles.velocity[1].x;
        assert!(v0 < 1. && v0 > 0.);
        assert!(v1 > -1. && v1 < 0.);
        assert_ft_approx_eq(v0 + v1, 0., 1.0e-6, || "pair momentum".to_string());

        assert_eq!(sim.particles.velocity[2], velocity_before[2]);
    }
}
