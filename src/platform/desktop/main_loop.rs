use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use clap::{App, AppSettings, Arg, ArgMatches, SubCommand};
use log::{info, LevelFilter};

use crate::{
    init_fluid_sim,
    simulation_parameters::{load_simulation_params, write_simulation_params, SimulationParams},
    FluidSimulation,
};

use super::csv_exporter::CsvExporter;

const CARGO_PKG_AUTHORS: &str = env!("CARGO_PKG_AUTHORS");
const CARGO_PKG_VERSION: &str = env!("CARGO_PKG_VERSION");
const CARGO_PKG_DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

fn init_logger(verbosity: u64) {
    let level = match verbosity {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level.as_str()))
        .format_timestamp_millis()
        .init();
}

pub fn start() -> Result<()> {
    let matches = App::new("Position Based Fluids")
        .version(CARGO_PKG_VERSION)
        .author(CARGO_PKG_AUTHORS)
        .about(CARGO_PKG_DESCRIPTION)
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .arg(
            Arg::with_name("v")
                .short("v")
                .multiple(true)
                .help("Sets the level of verbosity"),
        )
        .subcommand(
            SubCommand::with_name("run")
                .about("Run simulation with given config")
                .arg(
                    Arg::with_name("SIMULATION_CONFIG")
                        .help("Sets the simulation paramaters")
                        .required(true)
                        .index(1),
                )
                .arg(
                    Arg::with_name("FRAMES")
                        .long("frames")
                        .short("n")
                        .takes_value(true)
                        .default_value("100")
                        .help("Number of frames to simulate"),
                )
                .arg(
                    Arg::with_name("OVERWRITE_CONFIG_FILE")
                        .long("overwrite-config-file")
                        .short("c")
                        .required(false)
                        .takes_value(true)
                        .help("Overwrite config"),
                )
                .arg(
                    Arg::with_name("OUTPUT_DIR")
                        .long("output-dir")
                        .short("o")
                        .required(false)
                        .takes_value(true)
                        .help("Write CSV snapshots of positions and velocities into this folder"),
                )
                .arg(
                    Arg::with_name("EXPORT_EVERY")
                        .long("export-every")
                        .short("e")
                        .takes_value(true)
                        .default_value("1")
                        .help("Export a snapshot every N frames"),
                )
                .arg(
                    Arg::with_name("STATISTICS_ENABLED")
                        .help("Track performance of individual steps")
                        .short("p")
                        .long("statistics-enabled")
                        .takes_value(false),
                )
                .arg(
                    Arg::with_name("STATISTICS_PATH")
                        .long("statistics-path")
                        .short("w")
                        .required(false)
                        .takes_value(true)
                        .help("Where to write statistics to"),
                ),
        )
        .subcommand(
            SubCommand::with_name("default-config")
                .about("Write the default simulation parameters to a YAML file")
                .arg(
                    Arg::with_name("OUTPUT_YAML")
                        .help("YAML file where the parameters are written to")
                        .default_value("./simulation-params.yaml")
                        .takes_value(true)
                        .required(true),
                ),
        )
        .get_matches();

    init_logger(matches.occurrences_of("v"));

    if let Some(run_matches) = matches.subcommand_matches("run") {
        run(run_matches)
    } else if let Some(subcmd_matches) = matches.subcommand_matches("default-config") {
        let yaml_path = subcmd_matches
            .value_of("OUTPUT_YAML")
            .context("missing output path")?;
        write_simulation_params(Path::new(yaml_path), &SimulationParams::default())?;
        println!("Wrote default parameters to `{}`", yaml_path);
        Ok(())
    } else {
        unreachable!()
    }
}

fn parse_arg<T: std::str::FromStr>(matches: &ArgMatches, name: &str) -> Result<Option<T>>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    matches
        .value_of(name)
        .map(|x| x.parse::<T>().with_context(|| format!("invalid value `{}` for {}", x, name)))
        .transpose()
}

fn run(run_matches: &ArgMatches) -> Result<()> {
    let parameter_file = run_matches
        .value_of("SIMULATION_CONFIG")
        .context("missing simulation config")?;
    let overwrite_file = run_matches.value_of("OVERWRITE_CONFIG_FILE").map(PathBuf::from);

    let simulation_params = load_simulation_params(Path::new(parameter_file), overwrite_file.as_deref())?;
    info!("{:?}", simulation_params);

    let num_frames: usize = parse_arg(run_matches, "FRAMES")?.unwrap_or(100);
    let export_every: usize = parse_arg(run_matches, "EXPORT_EVERY")?.unwrap_or(1).max(1);
    let counters_enabled = run_matches.is_present("STATISTICS_ENABLED");
    let statistics_path = run_matches.value_of("STATISTICS_PATH").map(PathBuf::from);

    let mut csv_exporter = match run_matches.value_of("OUTPUT_DIR") {
        Some(dir) => Some(CsvExporter::new(dir, "pbf")?),
        None => None,
    };

    let mut fluid_simulation = init_fluid_sim(simulation_params, counters_enabled)?;

    if let Some(exporter) = &mut csv_exporter {
        exporter.add_snapshot(&fluid_simulation.particles)?;
    }

    fluid_main(
        &mut fluid_simulation,
        simulation_params,
        num_frames,
        export_every,
        csv_exporter.as_mut(),
    )?;

    if counters_enabled {
        let s = fluid_simulation.write_statistics();
        print!("{}", s);
        if let Some(statistics_path) = statistics_path {
            std::fs::write(&statistics_path, s)
                .with_context(|| format!("failed writing statistics to {}", statistics_path.display()))?;
        }
    }

    Ok(())
}

fn fluid_main(
    fluid_simulation: &mut FluidSimulation,
    simulation_params: SimulationParams,
    num_frames: usize,
    export_every: usize,
    mut csv_exporter: Option<&mut CsvExporter>,
) -> Result<()> {
    let mut total_duration: Duration = Duration::from_nanos(0);
    let mut total_number_of_frames = 0;

    for frame_number in 0..num_frames {
        let a = std::time::Instant::now();
        let avg_density_error = fluid_simulation.single_step(simulation_params);
        let b = std::time::Instant::now();

        total_duration += b - a;
        total_number_of_frames += 1;

        info!(
            "{:05}: {} fluid particles {}msec ({}msec AVG) avg density error {:.5}",
            frame_number,
            fluid_simulation.num_fluid_particles(),
            (b - a).as_secs_f32() * 1000.,
            (total_duration / total_number_of_frames).as_secs_f32() * 1000.,
            avg_density_error
        );

        if (frame_number + 1) % export_every == 0 {
            if let Some(exporter) = csv_exporter.as_deref_mut() {
                let path = exporter.add_snapshot(&fluid_simulation.particles)?;
                info!("exported snapshot {}", path.display());
            }
        }
    }

    Ok(())
}
