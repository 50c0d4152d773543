//! # beamcheck CLI
//!
//! `beamcheck write` produces the beam file handed to the simulation,
//! `beamcheck check` compares a plotfile with it after the run, and
//! `beamcheck inspect` prints what a plotfile contains.

use anyhow::{Context, Result};
use beamcheck::check::Tolerances;
use beamcheck::inputs::DEFAULT_CHARGE_KEY;
use beamcheck::openpmd::DEFAULT_ITERATION;
use beamcheck::plotfile::{Endianness, Plotfile};
use beamcheck::regression::{self, CheckConfig, FixtureConfig, DEFAULT_OUTPUT_SPECIES};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "beamcheck")]
#[command(version)]
#[command(about = "Check that a PIC simulation reproduces an injected openPMD beam", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write the synthetic beam as an openPMD series
    Write {
        /// Output file; the extension selects the backend (.json, or .h5
        /// when built with the `hdf5` feature)
        #[arg(long, short = 'o', default_value = "electrons_opmd.json")]
        output: PathBuf,

        #[arg(long, default_value_t = beamcheck::beam::DEFAULT_PARTICLE_COUNT)]
        particles: usize,

        #[arg(long, default_value_t = DEFAULT_ITERATION)]
        iteration: u64,

        #[arg(long, default_value = beamcheck::beam::DEFAULT_SPECIES)]
        species: String,
    },

    /// Compare a plotfile with the beam file and the input deck
    Check {
        #[arg(long, default_value = "electrons_opmd.json")]
        beam: PathBuf,

        #[arg(long, default_value_t = DEFAULT_ITERATION)]
        iteration: u64,

        /// Species name inside the beam file
        #[arg(long, default_value = beamcheck::beam::DEFAULT_SPECIES)]
        beam_species: String,

        /// Simulation input deck holding the total beam charge
        #[arg(long, default_value = "input")]
        inputs: PathBuf,

        #[arg(long, default_value = DEFAULT_CHARGE_KEY)]
        charge_key: String,

        #[arg(long, default_value = "./diags/plotfiles/plt00000")]
        plotfile: PathBuf,

        /// Species name inside the plotfile
        #[arg(long, default_value = DEFAULT_OUTPUT_SPECIES)]
        species: String,

        /// Relative error accepted for weight, position and velocity
        #[arg(long, default_value_t = beamcheck::check::DEFAULT_TOLERANCE)]
        tolerance: f64,

        #[arg(long, value_enum, default_value_t = ByteOrder::Little)]
        byte_order: ByteOrder,

        /// Print the report as JSON on stdout
        #[arg(long)]
        json: bool,
    },

    /// Print the header and particle species of a plotfile
    Inspect {
        plotfile: PathBuf,

        /// Also print every particle of this species
        #[arg(long)]
        species: Option<String>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ByteOrder {
    Little,
    Big,
}

impl From<ByteOrder> for Endianness {
    fn from(order: ByteOrder) -> Self {
        match order {
            ByteOrder::Little => Endianness::Little,
            ByteOrder::Big => Endianness::Big,
        }
    }
}

fn main() -> Result<ExitCode> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "beamcheck=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Write {
            output,
            particles,
            iteration,
            species,
        } => {
            let config = FixtureConfig {
                path: output,
                particles,
                iteration,
                species,
            };
            regression::write_fixture(&config)
                .with_context(|| format!("writing {}", config.path.display()))?;
            Ok(ExitCode::SUCCESS)
        }

        Command::Check {
            beam,
            iteration,
            beam_species,
            inputs,
            charge_key,
            plotfile,
            species,
            tolerance,
            byte_order,
            json,
        } => {
            let config = CheckConfig {
                beam,
                iteration,
                beam_species,
                inputs,
                charge_key,
                plotfile,
                output_species: species,
                endianness: byte_order.into(),
                tolerances: Tolerances::uniform(tolerance),
            };
            let report = regression::run(&config).context("beam check could not run")?;

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("Relative error weight: {:e}", report.weight_error);
                for (i, axis) in ["x", "y", "z"].iter().enumerate() {
                    println!(
                        "Relative error position {axis}: {:e}",
                        report.position_errors[i]
                    );
                    println!(
                        "Relative error velocity {axis}: {:e}",
                        report.velocity_errors[i]
                    );
                }
            }

            if report.passed() {
                println!("PASSED ({} particles)", report.particles);
                Ok(ExitCode::SUCCESS)
            } else {
                for failure in report.failures() {
                    eprintln!("FAILED {failure}");
                }
                Ok(ExitCode::FAILURE)
            }
        }

        Command::Inspect { plotfile, species } => {
            inspect(&plotfile, species.as_deref())?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn inspect(dir: &Path, species: Option<&str>) -> Result<()> {
    let start_time = Instant::now();
    let plt = Plotfile::open(dir).with_context(|| format!("opening {}", dir.display()))?;

    println!("Plotfile Information:");
    println!("  Version: {}", plt.version());
    println!("  Dimension: {}", plt.dim());
    println!("  Time: {:e} s", plt.time());
    println!("  Finest level: {}", plt.finest_level());
    println!("  Domain extent: {:?}", plt.extent());
    if !plt.fields().is_empty() {
        println!("  Fields: {}", plt.fields().join(", "));
    }

    for name in plt.species()? {
        let reader = plt.particles(&name).build()?;
        let header = reader.header();
        println!("  Species {name}:");
        println!("    Particles: {}", reader.num_particles());
        println!("    Grids: {}", header.grids.len());
        println!("    Real components: {}", header.real_names.join(", "));
        if !header.int_names.is_empty() {
            println!("    Int components: {}", header.int_names.join(", "));
        }
    }

    if let Some(name) = species {
        let data = plt.particles(name).build()?.read_all()?;
        println!("\nParticles of {name}:");
        for i in 0..data.len() {
            let reals: Vec<String> = data
                .real_names()
                .iter()
                .map(|n| {
                    let v = data.component(n).map(|c| c[i]).unwrap_or(f64::NAN);
                    format!("{n}={v:e}")
                })
                .collect();
            println!(
                "  id {} at {:?} {}",
                data.ids[i],
                data.positions[i].to_array(),
                reals.join(" ")
            );
        }
    }

    println!("\nRead in {:.2?}", start_time.elapsed());
    Ok(())
}
