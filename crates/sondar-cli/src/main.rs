//! Sondador: command-line driver for the sondar probe suite
//!
//! ## Usage
//!
//! ```bash
//! sondador devices                     # List DRM nodes and drivers
//! sondador run                         # Run the whole probe suite
//! sondador run -t 'sysfs-*'            # Filter subtests by glob
//! sondador run --hook 'post-test:...'  # Shell command per lifecycle event
//! sondador bench --iterations 5000     # Sample version-ioctl latency
//! ```

use clap::{ArgAction, Parser, Subcommand};
use serde::Serialize;
use sondar::device::{self, DeviceNode, DriverVersion};
use sondar::harness::RunOptions;
use sondar::hook::parse_descriptors;
use std::process::ExitCode;

mod config;
mod error;
mod output;
mod suites;

use config::{CliConfig, ColorChoice, Verbosity};
use error::CliResult;
use output::{OutputFormat, ProgressReporter};
use suites::ProbeCtx;

#[derive(Debug, Parser)]
#[command(name = "sondador", version, about = "DRM kernel-driver probe suite")]
struct Cli {
    /// Increase verbosity (-v, -vv)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Only print failures
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// When to use colored output
    #[arg(long, global = true, value_enum, default_value_t)]
    color: ColorChoice,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// List DRM device nodes with driver name and version
    Devices(DevicesArgs),
    /// Run the built-in probe suite
    Run(RunArgs),
    /// Sample the latency of the DRM version ioctl
    Bench(BenchArgs),
}

#[derive(Debug, clap::Args)]
struct DevicesArgs {
    /// Output format
    #[arg(long, value_enum, default_value_t)]
    format: OutputFormat,
}

#[derive(Debug, clap::Args)]
struct RunArgs {
    /// List all subtests and exit
    #[arg(long)]
    list_subtests: bool,

    /// Run only the named subtest; repeatable
    #[arg(long = "run-subtest", value_name = "NAME")]
    run_subtest: Vec<String>,

    /// Shell-style glob applied to subtest names
    #[arg(short = 't', long, value_name = "GLOB")]
    filter: Option<String>,

    /// Hook descriptor `[<events>:]<cmd>`; repeatable, see --help-hook
    #[arg(long, value_name = "DESC")]
    hook: Vec<String>,

    /// Print detailed documentation for --hook and exit
    #[arg(long)]
    help_hook: bool,

    /// Clear kmemleak before the run, scan after it and append any leak
    /// report to --kmemleak-file
    #[arg(long)]
    kmemleak: bool,

    /// File kmemleak reports are appended to
    #[arg(
        long,
        value_name = "PATH",
        default_value = sondar::kmemleak::RESULT_FILENAME
    )]
    kmemleak_file: std::path::PathBuf,

    /// Output format
    #[arg(long, value_enum, default_value_t)]
    format: OutputFormat,
}

#[derive(Debug, clap::Args)]
struct BenchArgs {
    /// Number of measured iterations
    #[arg(long, default_value_t = 1000)]
    iterations: usize,

    /// Number of unmeasured warmup iterations
    #[arg(long, default_value_t = 100)]
    warmup: usize,

    /// Output format
    #[arg(long, value_enum, default_value_t)]
    format: OutputFormat,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = build_config(&cli);
    init_tracing(config.verbosity);

    match dispatch(cli.command, &config) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err}");
            process_exit_code(err.exit_code())
        }
    }
}

fn dispatch(command: Commands, config: &CliConfig) -> CliResult<ExitCode> {
    match command {
        Commands::Devices(args) => run_devices(&args),
        Commands::Run(args) => run_suite(config, &args),
        Commands::Bench(args) => run_bench(config, &args),
    }
}

fn build_config(cli: &Cli) -> CliConfig {
    let verbosity = if cli.quiet {
        Verbosity::Quiet
    } else {
        match cli.verbose {
            0 => Verbosity::Normal,
            1 => Verbosity::Verbose,
            _ => Verbosity::Debug,
        }
    };
    CliConfig::new()
        .with_verbosity(verbosity)
        .with_color(cli.color)
}

fn init_tracing(verbosity: Verbosity) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(verbosity.tracing_filter()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Clamp a harness exit code into the byte range the OS accepts
fn clamp_exit(code: i32) -> u8 {
    u8::try_from(code).unwrap_or(1)
}

fn process_exit_code(code: i32) -> ExitCode {
    ExitCode::from(clamp_exit(code))
}

#[derive(Debug, Serialize)]
struct DeviceReport {
    #[serde(flatten)]
    node: DeviceNode,
    driver: Option<DriverVersion>,
}

fn run_devices(args: &DevicesArgs) -> CliResult<ExitCode> {
    let reports: Vec<DeviceReport> = device::scan()?
        .into_iter()
        .map(|node| {
            let driver = node.open().and_then(|d| d.version()).ok();
            DeviceReport { node, driver }
        })
        .collect();

    match args.format {
        OutputFormat::Text => {
            if reports.is_empty() {
                println!("no DRM device nodes under {}", device::DRI_DIR);
            }
            for report in &reports {
                match &report.driver {
                    Some(v) => println!(
                        "{:<12} {} {}.{}.{} ({})",
                        report.node.name, v.name, v.major, v.minor, v.patchlevel, v.desc
                    ),
                    None => println!("{:<12} <unidentified>", report.node.name),
                }
            }
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&reports)?),
    }
    Ok(ExitCode::SUCCESS)
}

fn run_suite(config: &CliConfig, args: &RunArgs) -> CliResult<ExitCode> {
    if args.help_hook {
        print!("{}", sondar::hook::help_text("--hook"));
        return Ok(ExitCode::SUCCESS);
    }

    let mut suite = suites::probe_suite();
    if args.list_subtests {
        for name in suite.subtest_names() {
            println!("{name}");
        }
        return Ok(ExitCode::SUCCESS);
    }

    let opts = RunOptions {
        run_subtests: args.run_subtest.clone(),
        filter: args.filter.clone(),
        hooks: parse_descriptors(&args.hook)?,
    };

    let leak = args.kmemleak.then(sondar::kmemleak::Kmemleak::new);
    if let Some(leak) = &leak {
        if let Err(err) = leak.clear() {
            tracing::warn!(%err, "cannot clear kmemleak, leak attribution will be noisy");
        }
    }

    let mut ctx = ProbeCtx::default();
    let summary = suite.run(&mut ctx, &opts)?;

    if let Some(leak) = &leak {
        scan_kmemleak(leak, &summary, &args.kmemleak_file);
    }

    let reporter = ProgressReporter::new(
        config.color.should_color(),
        config.verbosity.is_quiet(),
    );
    output::print_summary(&summary, args.format, &reporter)?;
    Ok(process_exit_code(summary.exit_code()))
}

fn scan_kmemleak(
    leak: &sondar::kmemleak::Kmemleak,
    summary: &sondar::harness::RunSummary,
    file: &std::path::Path,
) {
    if !leak.is_available() {
        tracing::warn!("kmemleak control file not available, skipping scan");
        return;
    }
    let last = summary.records.last().map(|r| r.name.as_str());
    match leak.scan().and_then(|()| leak.append_report(last, file)) {
        Ok(true) => tracing::warn!(file = %file.display(), "kmemleak found leaks"),
        Ok(false) => {}
        Err(err) => tracing::warn!(%err, "kmemleak scan failed"),
    }
}

fn run_bench(config: &CliConfig, args: &BenchArgs) -> CliResult<ExitCode> {
    let mut reporter = ProgressReporter::new(
        config.color.should_color(),
        config.verbosity.is_quiet(),
    );
    reporter.start_progress((args.warmup + args.iterations) as u64, "sampling");

    let summary = suites::bench_version(args.warmup, args.iterations, || reporter.increment(1));
    reporter.finish();

    output::print_bench(&summary?, args.format)?;
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn verbosity_flags_build_the_config() {
        let cli = Cli::parse_from(["sondador", "-vv", "run"]);
        assert_eq!(build_config(&cli).verbosity, Verbosity::Debug);

        let cli = Cli::parse_from(["sondador", "--quiet", "run"]);
        assert!(build_config(&cli).verbosity.is_quiet());
    }

    #[test]
    fn run_args_collect_repeatable_flags() {
        let cli = Cli::parse_from([
            "sondador",
            "run",
            "--run-subtest",
            "version",
            "--run-subtest",
            "debugfs-path",
            "--hook",
            "post-test:echo done",
            "-t",
            "sysfs-*",
        ]);
        let Commands::Run(args) = cli.command else {
            panic!("expected run command");
        };
        assert_eq!(args.run_subtest, vec!["version", "debugfs-path"]);
        assert_eq!(args.hook, vec!["post-test:echo done"]);
        assert_eq!(args.filter.as_deref(), Some("sysfs-*"));
    }

    #[test]
    fn exit_codes_clamp_into_u8() {
        assert_eq!(clamp_exit(0), 0);
        assert_eq!(clamp_exit(98), 98);
        assert_eq!(clamp_exit(-1), 1);
        assert_eq!(clamp_exit(300), 1);
    }
}
