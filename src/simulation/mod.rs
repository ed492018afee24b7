pub mod concurrency;
pub mod constraint_solver;
pub mod forces;
pub mod neighborhood_search;
pub mod particles;
pub mod simulation_parameters;
pub mod sph_kernels;
pub mod statistics;
pub mod vector;
pub mod vorticity;
pub mod simulation;

#[cfg(feature = "double-precision")]
pub mod floating_type_mod {
    pub type FT = f64;
    pub use std::f64::consts::{FRAC_1_PI, PI};
}

#[cfg(not(feature = "double-precision"))]
pub mod floating_type_mod {
    pub type FT = f32;
    pub use std::f32::consts::{FRAC_1_PI, PI};
}

use floating_type_mod::FT;

use nalgebra::SVector;

#[allow(dead_code)]
pub type V<FT, const D: usize> = SVector<FT, D>;

pub type V3 = V<FT, 3>;
pub type V3I = V<i32, 3>;

pub fn vec3f(x: FT, y: FT, z: FT) -> V3 {
    [x, y, z].into()
}

pub use simulation::*;
