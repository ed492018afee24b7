use enum_dispatch::enum_dispatch;

use crate::{
    concurrency::par_iter_mut1,
    floating_type_mod::FT,
    neighborhood_search::NeighborhoodCache,
    particles::ParticleVec,
    simulation_parameters::SimulationParams,
    vorticity::{calculate_all_vorticities, calculate_particle_confinement},
};

/// A term that contributes to the external acceleration applied before position prediction.
#[enum_dispatch]
pub trait ForceTerm {
    /// Adds this term's acceleration to `particles.acceleration`.
    fn accumulate_accelerations(
        &self,
        particles: &mut ParticleVec,
        neighs: &NeighborhoodCache,
        simulation_params: SimulationParams,
    );

    /// Whether `neighs` has to be valid for `particles.position` when calling `accumulate_accelerations`.
    fn needs_neighborhood(&self) -> bool {
        false
    }

    fn name(&self) -> &'static str;
}

pub struct Gravity;

impl ForceTerm for Gravity {
    fn accumulate_accelerations(
        &self,
        particles: &mut ParticleVec,
        _neighs: &NeighborhoodCache,
        simulation_params: SimulationParams,
    ) {
        let g = simulation_params.gravity_vector();
        par_iter_mut1(&mut particles.acceleration, |_, a| {
            *a += g;
        });
    }

    fn name(&self) -> &'static str {
        "gravity"
    }
}

pub struct VorticityConfinement {
    pub epsilon: FT,
}

impl ForceTerm for VorticityConfinement {
    fn accumulate_accelerations(
        &self,
        particles: &mut ParticleVec,
        neighs: &NeighborhoodCache,
        simulation_params: SimulationParams,
    ) {
        let ParticleVec {
            position,
            velocity,
            vorticity,
            acceleration,
            ..
        } = particles;

        calculate_all_vorticities(vorticity, &position[..], &velocity[..], neighs, simulation_params.h);

        let position: &[_] = position;
        let vorticity: &[_] = vorticity;
        par_iter_mut1(acceleration, |i, a| {
            *a += calculate_particle_confinement(i, position, vorticity, neighs, simulation_params.h, self.epsilon)
                / simulation_params.particle_mass;
        });
    }

    fn needs_neighborhood(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "vorticity-confinement"
    }
}

#[enum_dispatch(ForceTerm)]
pub enum Force {
    Gravity(Gravity),
    VorticityConfinement(VorticityConfinement),
}

/// Gravity always, vorticity confinement only if `vorticity_epsilon` is set.
pub fn force_terms_from_params(simulation_params: SimulationParams) -> Vec<Force> {
    let mut forces: Vec<Force> = vec![Gravity.into()];
    if let Some(epsilon) = simulation_params.vorticity_epsilon {
        forces.push(VorticityConfinement { epsilon }.into());
    }
    forces
}
