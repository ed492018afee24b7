//! Index-aligned particle storage and the lattice initialization.

use anyhow::{ensure, Context, Result};

use crate::{floating_type_mod::FT, vec3f, V3};

macro_rules! decl_particle_vec {
    (pub struct $struct_name:ident { $(pub $field_name:ident: Vec<$field_type:ty> | $default_value:expr),*$(,)?  }) => {
        pub struct $struct_name {
            $(
                pub $field_name : Vec<$field_type>,
            )*
        }

        impl $struct_name {
            /// Zero-initialized storage for `len` particles.
            ///
            /// Every field is reserved up front, an allocation failure is reported instead of aborting.
            pub fn allocate(len: usize) -> Result<Self> {
                Ok(Self {
                    $(
                        $field_name: {
                            let mut v: Vec<$field_type> = Vec::new();
                            v.try_reserve_exact(len).with_context(|| {
                                format!(
                                    "failed to allocate `{}` for {} particles",
                                    stringify!($field_name),
                                    len
                                )
                            })?;
                            v.extend((0..len).map::<$field_type, _>(|_| $default_value));
                            v
                        },
                    )*
                })
            }

            pub fn len(&self) -> usize {
                self.position.len()
            }

            pub fn is_empty(&self) -> bool {
                self.position.is_empty()
            }

            /// Panics if some field has a different length than `position`.
            pub fn assert_consistent(&self) {
                $(
                    assert_eq!(
                        self.$field_name.len(),
                        self.position.len(),
                        "particle field `{}` has wrong length",
                        stringify!($field_name)
                    );
                )*
            }
        }
    }
}

decl_particle_vec! {
    pub struct ParticleVec {
        pub position: Vec<V3> | V3::zeros(),
        pub velocity: Vec<V3> | V3::zeros(),

        // solver state of the current frame
        pub predicted_position: Vec<V3> | V3::zeros(),
        pub position_delta: Vec<V3> | V3::zeros(),
        pub density: Vec<FT> | 0.,
        pub lambda: Vec<FT> | 0.,

        // external accelerations accumulated by the force terms
        pub acceleration: Vec<V3> | V3::zeros(),
        pub vorticity: Vec<V3> | V3::zeros(),
        pub velocity_temp: Vec<V3> | V3::zeros(),
    }
}

impl ParticleVec {
    /// Places `cube_length^3` particles on a regular grid spanning the unit cube.
    ///
    /// `position[i * cube_length^2 + j * cube_length + k] = (s*i, s*j, s*k)` with `s = 1/(cube_length-1)`.
    /// A single particle (`cube_length == 1`) sits at the origin.
    pub fn lay_out_lattice(&mut self, cube_length: usize) -> Result<()> {
        let expected = cube_length
            .checked_pow(3)
            .with_context(|| format!("lattice with cube length {} is too large", cube_length))?;
        ensure!(
            self.len() == expected,
            "lattice with cube length {} needs {} particles, particle set has {}",
            cube_length,
            expected,
            self.len()
        );

        let spacing: FT = if cube_length > 1 {
            1. / (cube_length - 1) as FT
        } else {
            0.
        };

        let mut current_particle = 0;
        for i in 0..cube_length {
            for j in 0..cube_length {
                for k in 0..cube_length {
                    self.position[current_particle] = vec3f(spacing * i as FT, spacing * j as FT, spacing * k as FT);
                    current_particle += 1;
                }
            }
        }

        Ok(())
    }

    pub fn set_uniform_velocity(&mut self, velocity: V3) {
        for v in &mut self.velocity {
            *v = velocity;
        }
    }
}

#[test]
fn allocation_is_zeroed() {
    let particles = ParticleVec::allocate(5).unwrap();
    particles.assert_consistent();
    assert_eq!(particles.len(), 5);
    assert!(particles.position.iter().all(|p| *p == V3::zeros()));
    assert!(particles.velocity.iter().all(|v| *v == V3::zeros()));
    assert!(particles.lambda.iter().all(|&l| l == 0.));
}

#[test]
fn impossible_allocation_is_an_error() {
    assert!(ParticleVec::allocate(usize::MAX / 2).is_err());
}

#[test]
fn lattice_of_cube_size_two() {
    let mut particles = ParticleVec::allocate(8).unwrap();
    particles.lay_out_lattice(2).unwrap();

    for p in &particles.position {
        for d in 0..3 {
            assert!(p[d] == 0. || p[d] == 1., "coordinate {} not in {{0, 1}}", p[d]);
        }
    }
    for i in 0..8 {
        for j in 0..i {
            assert_ne!(particles.position[i], particles.position[j]);
        }
    }
    // index layout: idx = i*4 + j*2 + k
    assert_eq!(particles.position[0], vec3f(0., 0., 0.));
    assert_eq!(particles.position[1], vec3f(0., 0., 1.));
    assert_eq!(particles.position[2], vec3f(0., 1., 0.));
    assert_eq!(particles.position[4], vec3f(1., 0., 0.));
    assert_eq!(particles.position[7], vec3f(1., 1., 1.));
}

#[test]
fn lattice_spans_unit_cube() {
    let mut particles = ParticleVec::allocate(64).unwrap();
    particles.lay_out_lattice(4).unwrap();
    let max = particles.position.iter().fold(0. as FT, |acc, p| acc.max(p.max()));
    let min = particles.position.iter().fold(1. as FT, |acc, p| acc.min(p.min()));
    assert_eq!(min, 0.);
    crate::assert_ft_approx_eq(max, 1., 1.0e-6, || "largest lattice coordinate".to_string());
}

#[test]
fn single_particle_lattice_sits_at_origin() {
    let mut particles = ParticleVec::allocate(1).unwrap();
    particles.lay_out_lattice(1).unwrap();
    assert_eq!(particles.position[0], V3::zeros());
    assert!(particles.position[0].iter().all(|x| x.is_finite()));
}

#[test]
fn lattice_size_mismatch_is_an_error() {
    let mut particles = ParticleVec::allocate(7).unwrap();
    assert!(particles.lay_out_lattice(2).is_err());
}

#[test]
fn uniform_velocity() {
    let mut particles = ParticleVec::allocate(3).unwrap();
    particles.set_uniform_velocity(vec3f(1., -2., 0.5));
    assert!(particles.velocity.iter().all(|v| *v == vec3f(1., -2., 0.5)));
}
