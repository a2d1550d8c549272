//! batchmv command-line interface.
//!
//! Evaluates a batch of uniform matrix-vector products and prints one result
//! per line. Exits with 1 when the batched multiply fails and with 2 on
//! usage errors; any other device failure aborts after releasing memory.

mod backend;
mod output;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use batchmv::{BackendChoice, EvalConfig, EvalError, FatalAction, Precision};
use clap::{Parser, ValueEnum};

#[derive(Parser)]
#[command(name = "batchmv")]
#[command(about = "Evaluate a batch of matrix-vector products with one batched GEMM")]
#[command(version)]
struct Cli {
    /// JSON configuration file; flags override its values
    #[arg(long)]
    config: Option<PathBuf>,

    /// Matrix dimension
    #[arg(long)]
    size: Option<usize>,

    /// Number of problems in the batch
    #[arg(long)]
    num: Option<usize>,

    /// Value of every matrix element
    #[arg(short, long, allow_negative_numbers = true)]
    a: Option<f64>,

    /// Value of every vector element
    #[arg(short, long, allow_negative_numbers = true)]
    b: Option<f64>,

    /// Element precision
    #[arg(long, value_enum)]
    precision: Option<PrecisionArg>,

    /// Device backend
    #[arg(long, value_enum)]
    backend: Option<BackendArg>,

    /// Row pitch alignment of the host device, in bytes
    #[arg(long)]
    pitch_alignment: Option<usize>,

    /// Check results against a host reference
    #[arg(long)]
    verify: bool,

    /// Tolerance for --verify
    #[arg(long)]
    tolerance: Option<f64>,

    /// Output results as JSON
    #[arg(long)]
    json: bool,

    /// Make the batched multiply fail (host backend only)
    #[arg(long, hide = true)]
    fail_gemm: bool,

    /// Cap host device memory, in bytes (host backend only)
    #[arg(long, hide = true)]
    memory_limit: Option<usize>,
}

#[derive(Clone, Copy, ValueEnum)]
enum PrecisionArg {
    F32,
    F64,
}

#[derive(Clone, Copy, ValueEnum)]
enum BackendArg {
    Auto,
    Host,
    Cuda,
}

impl Cli {
    /// Merge the config file (if any) with command-line overrides.
    fn resolve_config(&self) -> Result<EvalConfig> {
        let mut config = match &self.config {
            Some(path) => EvalConfig::from_file(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => EvalConfig::default(),
        };

        if let Some(size) = self.size {
            config.size = size;
        }
        if let Some(num) = self.num {
            config.num = num;
        }
        if let Some(a) = self.a {
            config.a = a;
        }
        if let Some(b) = self.b {
            config.b = b;
        }
        if let Some(precision) = self.precision {
            config.precision = match precision {
                PrecisionArg::F32 => Precision::Single,
                PrecisionArg::F64 => Precision::Double,
            };
        }
        if let Some(backend) = self.backend {
            config.backend = match backend {
                BackendArg::Auto => BackendChoice::Auto,
                BackendArg::Host => BackendChoice::Host,
                BackendArg::Cuda => BackendChoice::Cuda,
            };
        }
        if let Some(pitch_alignment) = self.pitch_alignment {
            config.pitch_alignment = pitch_alignment;
        }
        if self.verify {
            config.verify = true;
        }
        if let Some(tolerance) = self.tolerance {
            config.tolerance = tolerance;
        }

        config.validate()?;
        Ok(config)
    }
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    let config = match cli.resolve_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return ExitCode::from(2);
        }
    };

    let device = match backend::open_device(
        &config,
        &backend::HostOverrides {
            fail_gemm: cli.fail_gemm,
            memory_limit: cli.memory_limit,
        },
    ) {
        Ok(device) => device,
        Err(e) => return fatal(e),
    };
    log::debug!("Using device {}", device.name());

    let outcome = batchmv::run(&config, device.as_ref());
    drop(device);

    match outcome {
        Ok(report) => match output::print_report(&report, cli.json) {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("Error writing results: {}", e);
                ExitCode::FAILURE
            }
        },
        Err(e) => fatal(e),
    }
}

/// Single place deciding how a failed evaluation ends the process.
fn fatal(err: EvalError) -> ExitCode {
    match err.fatal_action() {
        FatalAction::Exit(code) => {
            if err.blas_status().is_some() {
                eprintln!("gemm_batched failed: {}", err);
            } else {
                eprintln!("Error: {}", err);
            }
            ExitCode::from(code)
        }
        FatalAction::Abort => {
            eprintln!("Fatal: {}", err);
            std::process::abort()
        }
    }
}
