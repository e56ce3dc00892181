mod config;
mod logging;
mod models;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use color_eyre::eyre::Result;
use uqprop_core::{Data, DistributionFamily, Exploration, Method};

use crate::config::RunFile;
use crate::logging::init_logging;

#[derive(Parser, Debug)]
#[command(name = "uqprop")]
#[command(about = "Uncertainty quantification and sensitivity analysis of built-in models")]
struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    /// Also write logs to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Quantify the uncertainty of the model in a run file
    Quantify {
        run_file: PathBuf,

        /// Override the stochastic method (pc, mc)
        #[arg(short, long)]
        method: Option<Method>,

        /// Override the output folder
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Rerun with every parameter given a distribution family of varying width,
    /// all together and one at a time
    Explore {
        run_file: PathBuf,

        #[arg(short, long, default_value = "uniform")]
        family: DistributionFamily,

        /// Relative interval widths, comma separated
        #[arg(short, long, value_delimiter = ',', required = true)]
        intervals: Vec<f64>,
    },
    /// Compare Monte Carlo runs of increasing size against polynomial chaos
    CompareMc {
        run_file: PathBuf,

        /// Monte Carlo sample counts, comma separated
        #[arg(short, long, value_delimiter = ',', required = true)]
        samples: Vec<usize>,
    },
    /// Print a saved store
    Show {
        store: PathBuf,

        /// Only print this feature
        #[arg(short, long)]
        feature: Option<String>,
    },
}

fn quantify(run_file: PathBuf, method: Option<Method>, output: Option<PathBuf>) -> Result<()> {
    let run = RunFile::load(&run_file)?;
    let mut uq = run.uncertainty_quantification()?;
    if let Some(method) = method {
        uq.config_mut().method = method;
    }
    if let Some(output) = output {
        uq.config_mut().data_folder = output;
    }

    let data = uq.quantify()?;
    println!("{data}");
    if uq.config().save_data {
        println!(
            "Saved to {}",
            uq.config().store_path(&uq.model().name).display()
        );
    }
    Ok(())
}

fn explore(run_file: PathBuf, family: DistributionFamily, intervals: Vec<f64>) -> Result<()> {
    let run = RunFile::load(&run_file)?;
    let exploration = Exploration::new(run.uncertainty_quantification()?);
    let runs = exploration.explore_parameters(&[(family, intervals)])?;

    for run in &runs {
        println!("=== {} {} ===", run.family, run.interval);
        print_variances("all parameters", &run.data);
        for (parameter, data) in &run.single {
            print_variances(parameter, data);
        }
    }
    Ok(())
}

fn print_variances(title: &str, data: &Data) {
    println!("  {title}");
    for feature in data.features() {
        let variance = feature
            .variance
            .as_ref()
            .map(|v| format!("{:?}", summarize(v.data())))
            .unwrap_or_else(|| "unset".to_string());
        println!("    {}: variance {}", feature.name, variance);
    }
}

fn compare_mc(run_file: PathBuf, samples: Vec<usize>) -> Result<()> {
    let run = RunFile::load(&run_file)?;
    let exploration = Exploration::new(run.uncertainty_quantification()?);
    let comparison = exploration.compare_mc(&samples)?;

    println!(
        "polynomial chaos: {:.3}s",
        comparison.pc_elapsed.as_secs_f64()
    );
    for run in &comparison.runs {
        println!(
            "monte carlo, {} samples: {:.3}s",
            run.samples,
            run.elapsed.as_secs_f64()
        );
        for (feature, ratio) in &run.variance_ratio {
            println!(
                "  {}: variance ratio mc/pc {:?}",
                feature,
                summarize(ratio.data())
            );
        }
    }
    Ok(())
}

fn show(store: PathBuf, feature: Option<String>) -> Result<()> {
    let data = Data::load(&store)?;
    match feature {
        Some(name) => println!("{}", data.get(&name)?),
        None => println!("{data}"),
    }
    Ok(())
}

/// (min, mean, max) over the finite cells
fn summarize(values: &[f64]) -> (f64, f64, f64) {
    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.is_empty() {
        return (f64::NAN, f64::NAN, f64::NAN);
    }
    let min = finite.iter().copied().fold(f64::INFINITY, f64::min);
    let max = finite.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let mean = finite.iter().sum::<f64>() / finite.len() as f64;
    (min, mean, max)
}

fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::parse();
    let _guard = init_logging(&args.log_level, args.log_file.as_deref())?;

    match args.command {
        Command::Quantify {
            run_file,
            method,
            output,
        } => quantify(run_file, method, output),
        Command::Explore {
            run_file,
            family,
            intervals,
        } => explore(run_file, family, intervals),
        Command::CompareMc { run_file, samples } => compare_mc(run_file, samples),
        Command::Show { store, feature } => show(store, feature),
    }
}
