use anyhow::{ensure, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::{floating_type_mod::FT, vec3f, V3};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NeighborhoodSearchAlgorithm {
    // reference implementation, O(N^2)
    BruteForce,
    // uniform grid with cell size h
    Grid,
    RStar,
}

/// What happens to a predicted position that leaves the unit cube.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BoundaryMode {
    Clamp,
    Reflect,
}

/// Artificial pressure term against particle clustering ("s_corr" in the PBF paper).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TensileCorrection {
    pub k: FT,
    pub n: i32,
    // given as a fraction of the kernel radius
    pub delta_q: FT,
}

impl Default for TensileCorrection {
    fn default() -> Self {
        TensileCorrection {
            k: 0.1,
            n: 4,
            delta_q: 0.2,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SimulationParams {
    // particles per edge of the initial lattice
    pub cube_size: usize,
    // always cube_size^3
    pub num_elements: usize,
    pub dt: FT,
    pub solver_iterations: usize,
    pub rest_density: FT,
    // kernel support radius
    pub h: FT,

    pub particle_mass: FT,
    // magnitude, acts along -z
    pub gravity: FT,
    // epsilon in the lambda denominator
    pub relaxation: FT,
    pub initial_velocity: V3,

    pub boundary_mode: BoundaryMode,
    pub neighborhood_search_algorithm: NeighborhoodSearchAlgorithm,

    pub vorticity_epsilon: Option<FT>,
    pub xsph_viscosity: FT,
    pub tensile_correction: Option<TensileCorrection>,
}

impl Default for SimulationParams {
    fn default() -> Self {
        SimulationParams {
            cube_size: 10,
            num_elements: 1000,
            dt: 1. / 60.,
            solver_iterations: 4,
            rest_density: 700.,
            h: 0.2,
            particle_mass: 1.,
            gravity: 9.8,
            relaxation: 100.,
            initial_velocity: V3::zeros(),
            boundary_mode: BoundaryMode::Clamp,
            neighborhood_search_algorithm: NeighborhoodSearchAlgorithm::Grid,
            vorticity_epsilon: None,
            xsph_viscosity: 0.,
            tensile_correction: None,
        }
    }
}

impl SimulationParams {
    /// Parameters for a `cube_size^3` lattice, everything else default.
    pub fn with_cube_size(cube_size: usize) -> Self {
        SimulationParams {
            cube_size,
            num_elements: cube_size * cube_size * cube_size,
            ..Default::default()
        }
    }

    pub fn gravity_vector(&self) -> V3 {
        vec3f(0., 0., -self.gravity)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(self.cube_size >= 1, "cube_size must be at least 1");
        let expected = self
            .cube_size
            .checked_pow(3)
            .with_context(|| format!("cube_size {} overflows the particle count", self.cube_size))?;
        ensure!(
            self.num_elements == expected,
            "num_elements ({}) must equal cube_size^3 ({})",
            self.num_elements,
            expected
        );
        ensure!(self.dt > 0. && self.dt.is_finite(), "dt must be positive, got {}", self.dt);
        ensure!(
            self.rest_density > 0. && self.rest_density.is_finite(),
            "rest_density must be positive, got {}",
            self.rest_density
        );
        ensure!(self.h > 0. && self.h.is_finite(), "kernel radius h must be positive, got {}", self.h);
        ensure!(self.particle_mass > 0., "particle_mass must be positive");
        ensure!(self.relaxation >= 0., "relaxation must not be negative");
        ensure!(self.xsph_viscosity >= 0., "xsph_viscosity must not be negative");
        if let Some(tc) = self.tensile_correction {
            ensure!(
                tc.delta_q > 0. && tc.delta_q < 1.,
                "tensile_correction.delta_q must be in (0, 1), got {}",
                tc.delta_q
            );
        }
        Ok(())
    }
}

/// Reads simulation parameters from a YAML file, then replaces single keys
/// with the values found in the (optional) overwrite file.
pub fn load_simulation_params(path: &Path, overwrite_path: Option<&Path>) -> Result<SimulationParams> {
    let params_yaml =
        std::fs::read_to_string(path).with_context(|| format!("failed reading parameter file {}", path.display()))?;
    let mut simulation_params_serde: serde_yaml::Value = serde_yaml::from_str(&params_yaml)
        .with_context(|| format!("failed parsing simulation config file {}", path.display()))?;

    if let Some(overwrite_path) = overwrite_path {
        let overwrite_config_str = std::fs::read_to_string(overwrite_path)
            .with_context(|| format!("failed reading overwrite file {}", overwrite_path.display()))?;
        let overwrite_config_file: HashMap<String, serde_yaml::Value> = serde_yaml::from_str(&overwrite_config_str)
            .with_context(|| format!("failed parsing overwrite file {}", overwrite_path.display()))?;
        let mapping = simulation_params_serde
            .as_mapping_mut()
            .context("simulation parameters are not a YAML mapping")?;
        for (k, v) in overwrite_config_file.into_iter() {
            let entry = mapping
                .get_mut(&serde_yaml::Value::String(k.clone()))
                .with_context(|| format!("not able to find attribute {}", k))?;
            *entry = v;
        }
    }

    let simulation_params: SimulationParams =
        serde_yaml::from_value(simulation_params_serde).context("failed to unpack SimulationParams")?;
    simulation_params.validate()?;
    Ok(simulation_params)
}

pub fn write_simulation_params(path: &Path, simulation_params: &SimulationParams) -> Result<()> {
    let yaml = serde_yaml::to_string(simulation_params).context("failed serializing SimulationParams")?;
    std::fs::write(path, yaml).with_context(|| format!("failed writing {}", path.display()))
}

#[test]
fn default_params_are_valid() {
    SimulationParams::default().validate().unwrap();
    SimulationParams::with_cube_size(1).validate().unwrap();
    SimulationParams::with_cube_size(2).validate().unwrap();
}

#[test]
fn inconsistent_particle_count_is_rejected() {
    let params = SimulationParams {
        num_elements: 9,
        ..SimulationParams::with_cube_size(2)
    };
    let err = params.validate().unwrap_err();
    assert!(err.to_string().contains("num_elements"));
}

#[test]
fn non_positive_timestep_is_rejected() {
    let params = SimulationParams {
        dt: 0.,
        ..Default::default()
    };
    assert!(params.validate().is_err());
}

#[test]
fn params_yaml_roundtrip() {
    let params = SimulationParams {
        vorticity_epsilon: Some(0.01),
        tensile_correction: Some(TensileCorrection::default()),
        boundary_mode: BoundaryMode::Reflect,
        ..SimulationParams::with_cube_size(3)
    };
    let yaml = serde_yaml::to_string(&params).unwrap();
    let parsed: SimulationParams = serde_yaml::from_str(&yaml).unwrap();
    assert_eq!(parsed.cube_size, 3);
    assert_eq!(parsed.num_elements, 27);
    assert_eq!(parsed.boundary_mode, BoundaryMode::Reflect);
    assert_eq!(parsed.vorticity_epsilon, Some(0.01));
    assert_eq!(parsed.tensile_correction, Some(TensileCorrection::default()));
}

#[test]
fn overwrite_file_replaces_single_keys() {
    let dir = std::env::temp_dir().join(format!("pbf-params-test-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let params_path = dir.join("params.yaml");
    let overwrite_path = dir.join("overwrite.yaml");

    write_simulation_params(&params_path, &SimulationParams::default()).unwrap();
    std::fs::write(&overwrite_path, "solver_iterations: 7\nrest_density: 650.0\n").unwrap();

    let params = load_simulation_params(&params_path, Some(&overwrite_path)).unwrap();
    assert_eq!(params.solver_iterations, 7);
    assert_eq!(params.rest_density, 650.);
    assert_eq!(params.cube_size, 10);

    std::fs::write(&overwrite_path, "no_such_key: 1\n").unwrap();
    assert!(load_simulation_params(&params_path, Some(&overwrite_path)).is_err());

    std::fs::remove_dir_all(&dir).unwrap();
}
