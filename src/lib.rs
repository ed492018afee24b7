/*!
Position Based Fluids (Macklin & Müller 2013) on a unit-cube particle lattice.

The simulation core lives in [`simulation`]: particles are pushed by external
forces, their predicted positions are projected onto the constant density
constraint for a fixed number of Jacobi iterations and the velocities are
derived from the resulting displacement.
*/

mod platform;
pub mod simulation;

pub use simulation::*;

pub use platform::start;
