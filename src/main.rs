use std::path::{Path, PathBuf};
use std::process;

use clap::Parser;
use tracing::debug;

use fpprobe::config::{HarnessConfig, ReportFormat};
use fpprobe::diagnostic::render_diagnostics;
use fpprobe::gpu::WgpuDevice;
use fpprobe::{HarnessError, BUNDLED_KERNELS, CASES};

#[derive(Parser)]
#[command(
    name = "fpprobe",
    version,
    about = "Measure GPU floating-point precision against closed-form references"
)]
struct Cli {
    /// Multiplexed kernel file, or `-` for the bundled kernels
    #[arg(required_unless_present = "list")]
    kernel_file: Option<PathBuf>,
    /// Test to run (1-based; see --list)
    #[arg(required_unless_present = "list")]
    test_index: Option<u32>,
    /// Configuration file (default: fpprobe.toml in the current directory or above)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Kernel delimiter token
    #[arg(long, value_name = "TOKEN")]
    delimiter: Option<String>,
    /// Decimal places in the report (default: per test)
    #[arg(long, value_name = "N")]
    decimals: Option<usize>,
    /// Print the report as JSON
    #[arg(long)]
    json: bool,
    /// List the available tests and exit
    #[arg(long)]
    list: bool,
    /// Log filter when RUST_LOG is unset (e.g. info, debug)
    #[arg(long, value_name = "LEVEL")]
    log_level: Option<String>,
}

fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn print_cases() {
    println!("{:<4} {:<24} {:>10} {:>10}  description", "test", "name", "double", "float");
    for case in &CASES {
        println!(
            "{:<4} {:<24} {:>10} {:>10}  {}",
            case.index, case.name, case.wide.iterations, case.narrow.iterations, case.description
        );
    }
}

fn read_kernels(path: &Path) -> Result<(String, String), HarnessError> {
    if path == Path::new("-") {
        return Ok(("<bundled>".to_string(), BUNDLED_KERNELS.to_string()));
    }
    let text = std::fs::read_to_string(path).map_err(|source| HarnessError::FileAccess {
        path: path.to_path_buf(),
        source,
    })?;
    Ok((path.display().to_string(), text))
}

fn run(cli: &Cli, config: &HarnessConfig, path: &Path, index: u32) -> Result<(), HarnessError> {
    let (filename, text) = read_kernels(path)?;
    let mut format = config.source.clone();
    if let Some(delimiter) = &cli.delimiter {
        format.delimiter = delimiter.clone();
    }
    let decimals = cli.decimals.or(config.report.decimals);

    if let Ok(units) = fpprobe::split(&text, &format) {
        render_diagnostics(&fpprobe::kernel::lint(&units, &format), &filename, &text);
    }

    let device = WgpuDevice::new(&config.device)?;
    debug!(adapter = ?device.adapter_info(), "using adapter");

    let report = match fpprobe::run_source(&device, &text, &format, index, decimals) {
        Ok(report) => report,
        Err(HarnessError::Source(err)) => {
            err.to_diagnostic().render(&filename, &text);
            return Err(HarnessError::Source(err));
        }
        Err(err) => return Err(err),
    };

    let json = cli.json || config.report.format == ReportFormat::Json;
    if json {
        println!("{}", report.to_json()?);
    } else {
        print!("{}", report);
    }
    Ok(())
}

fn main() {
    let cli = Cli::parse();

    if cli.list {
        print_cases();
        return;
    }

    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let config = match HarnessConfig::resolve(cli.config.as_deref(), &cwd) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {}", HarnessError::from(e));
            process::exit(1);
        }
    };
    init_logging(cli.log_level.as_deref().unwrap_or(&config.logging.level));

    let (Some(path), Some(index)) = (cli.kernel_file.as_deref(), cli.test_index) else {
        eprintln!("error: a kernel file and a test index are required");
        process::exit(1);
    };

    match run(&cli, &config, path, index) {
        Ok(()) => {}
        // Already rendered with source context.
        Err(HarnessError::Source(_)) => process::exit(1),
        Err(e) => {
            eprintln!("error: {}", e);
            process::exit(1);
        }
    }
}
