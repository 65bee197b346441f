use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use mechanism::{MechanismConfig, MechanismErrors, build, presets};
use multibody::{MultibodyErrors, Simulator, SimulatorConfig};
use sim_result::{AssemblyRecorder, ResultErrors, ResultManager, next_run_dir};
use std::{path::PathBuf, time::Instant};
use thiserror::Error;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(version, about = "Build and step parametric rover mechanisms", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Build a mechanism, step it and write every body state to csv
    Simulate(SimulateArgs),
    /// Build a mechanism and print its joint anchor report
    Check {
        #[command(flatten)]
        source: Source,
    },
    /// Write a built-in configuration to a RON file
    ExportPreset { name: String, file: PathBuf },
    /// List the built-in configurations
    Presets,
}

/// Where the mechanism configuration comes from. Defaults to the fibula rover.
#[derive(Debug, Args)]
struct Source {
    /// RON mechanism configuration file
    #[arg(long, conflicts_with = "preset")]
    config: Option<PathBuf>,
    /// Name of a built-in configuration
    #[arg(long)]
    preset: Option<String>,
}

impl Source {
    fn load(&self) -> Result<MechanismConfig, RoverErrors> {
        let config = match (&self.config, &self.preset) {
            (Some(path), _) => MechanismConfig::load(path)?,
            (None, Some(name)) => presets::by_name(name)?,
            (None, None) => presets::fibula_rover(),
        };
        Ok(config)
    }
}

#[derive(Debug, Args)]
struct SimulateArgs {
    #[command(flatten)]
    source: Source,
    /// Step size in seconds
    #[arg(long, default_value_t = 0.001)]
    dt: f64,
    /// Simulated time in seconds
    #[arg(long, default_value_t = 2.0)]
    duration: f64,
    /// Root directory for result runs
    #[arg(long, default_value = "results")]
    output: PathBuf,
    /// Write every n-th committed step
    #[arg(long, default_value_t = 10)]
    record_every: u64,
    /// Pin the chassis in place
    #[arg(long)]
    fix_chassis: bool,
    #[arg(long)]
    torque_left: Option<f64>,
    #[arg(long)]
    torque_right: Option<f64>,
    /// Evaluate spring-damper loads on the rayon thread pool
    #[arg(long)]
    parallel: bool,
}

#[derive(Debug, Error)]
enum RoverErrors {
    #[error("{0}")]
    Mechanism(#[from] MechanismErrors),
    #[error("{0}")]
    Multibody(#[from] MultibodyErrors),
    #[error("{0}")]
    Result(#[from] ResultErrors),
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let outcome = match cli.command {
        Commands::Simulate(args) => simulate(args),
        Commands::Check { source } => check(&source),
        Commands::ExportPreset { name, file } => export_preset(&name, file),
        Commands::Presets => {
            for name in presets::NAMES {
                println!("{name}");
            }
            Ok(())
        }
    };
    if let Err(e) = outcome {
        eprintln!("{} {e}", "error:".red().bold());
        std::process::exit(1);
    }
}

fn check(source: &Source) -> Result<(), RoverErrors> {
    let config = source.load()?;
    let mechanism = build(&config)?;
    print!("{}", mechanism.report);
    let assembly = &mechanism.assembly;
    println!(
        "{} '{}': {} bodies, {} joints, {} spring-dampers",
        "consistent".green().bold(),
        assembly.name,
        assembly.bodies().len(),
        assembly.joints().len(),
        assembly.springs().len()
    );
    for id in assembly.loop_closures() {
        let joint = assembly.joint(*id)?;
        println!("  {} '{}' closes a loop", "note:".yellow(), joint.name);
    }
    Ok(())
}

fn export_preset(name: &str, file: PathBuf) -> Result<(), RoverErrors> {
    let config = presets::by_name(name)?;
    config.save(&file)?;
    println!("wrote '{name}' to {}", file.display());
    Ok(())
}

fn simulate(args: SimulateArgs) -> Result<(), RoverErrors> {
    if !(args.dt > 0.0 && args.dt.is_finite()) {
        return Err(MultibodyErrors::InvalidStepSize(args.dt).into());
    }
    let mut config = args.source.load()?;
    if args.fix_chassis {
        config.chassis.fixed = true;
    }
    if let Some(torque) = args.torque_left {
        config.torque_left = torque;
    }
    if let Some(torque) = args.torque_right {
        config.torque_right = torque;
    }

    let mut mechanism = build(&config)?;
    let mut sim = Simulator::new(
        &mechanism.assembly,
        SimulatorConfig {
            gravity: config.gravity(),
            parallel: args.parallel,
            ..Default::default()
        },
    );

    let run_dir = next_run_dir(&args.output, &config.name);
    let mut results = ResultManager::new(run_dir.clone());
    let recorder = AssemblyRecorder::new(&mechanism.assembly, &mut results)?;
    recorder.record(&sim.snapshot(), &mut results)?;

    let steps = (args.duration.max(0.0) / args.dt).round() as u64;
    let every = args.record_every.max(1);
    tracing::info!(
        "stepping '{}' {steps} times at dt = {} s, results in {}",
        config.name,
        args.dt,
        run_dir.display()
    );
    let bar = ProgressBar::new(steps);
    bar.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} steps ({eta})",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> "),
    );

    let start = Instant::now();
    for _ in 0..steps {
        if let Err(e) = sim.step(&mut mechanism.assembly, args.dt) {
            bar.abandon();
            // the last committed state is still on disk for inspection
            recorder.record(&sim.snapshot(), &mut results)?;
            results.flush()?;
            return Err(e.into());
        }
        if sim.step_count() % every == 0 {
            recorder.record(&sim.snapshot(), &mut results)?;
        }
        bar.inc(1);
    }
    bar.finish();
    results.flush()?;

    let assembly = &mechanism.assembly;
    let chassis = assembly.body_state(mechanism.chassis)?.position;
    let worst = assembly
        .joint_residuals()
        .iter()
        .map(|r| r.position)
        .fold(0.0, f64::max);
    println!("{} {}", "finished".green().bold(), assembly.name.bold());
    println!("  steps               {}", sim.step_count());
    println!("  simulated time      {:.3} s", sim.time());
    println!("  wall time           {:.2?}", start.elapsed());
    println!(
        "  chassis position    ({:.4}, {:.4}, {:.4})",
        chassis.x, chassis.y, chassis.z
    );
    println!("  max joint residual  {worst:.3e}");
    println!("  kinetic energy      {:.4} J", assembly.kinetic_energy());
    println!("  results             {}", run_dir.display().to_string().cyan());
    Ok(())
}
