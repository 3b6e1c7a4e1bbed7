use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum, ValueHint};
use shippos::positions::load_position_dirs;
use shippos::{
    merge_ship_positions, parse_duration_token, summarize_position_dir, write_table,
    write_table_file, Alignment, Dataset, MergeParams, MergeReport,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_DATASET: &str = "20241130_20250326_msfridtjofnansen_pamos.nc";
const DEFAULT_OUTPUT_NC: &str = "20241130_20250326_msfridtjofnansen_pamos_shipposition.nc";
const DEFAULT_OUTPUT_CSV: &str = "20241130_20250326_msfridtjofnansen_pamos_shipposition.csv";
const DEFAULT_GPS_DIRS: [&str; 2] = ["nansen_gps_old_format", "nansen_gps_new_format"];

#[derive(Parser, Debug)]
#[command(author, version, about = "Merge ship GPS positions into a PAMOS sensor dataset", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Align position logs onto the dataset time axis and write netCDF + CSV
    Merge(MergeArgs),
    /// Summarize position log directories (schema, records, gaps)
    Inspect(InspectArgs),
}

#[derive(Parser, Debug)]
struct MergeArgs {
    /// Sensor dataset (netCDF) providing the time axis and validity variable
    #[arg(long, default_value = DEFAULT_DATASET, value_hint = ValueHint::FilePath)]
    dataset: PathBuf,

    /// Directories of tab-separated position logs (*.nrt), in load order
    #[arg(long = "gps-dir", default_values = DEFAULT_GPS_DIRS, value_hint = ValueHint::DirPath)]
    gps_dirs: Vec<PathBuf>,

    /// Output netCDF path
    #[arg(long, default_value = DEFAULT_OUTPUT_NC, value_hint = ValueHint::FilePath)]
    output_nc: PathBuf,

    /// Output semicolon table path (`-` for stdout)
    #[arg(long, default_value = DEFAULT_OUTPUT_CSV, value_hint = ValueHint::FilePath)]
    output_csv: PathBuf,

    /// Resample grid frequency (e.g. 60s, 1min)
    #[arg(long, default_value = "1min")]
    freq: String,

    /// Maximum distance to the nearest fix before a position is dropped
    #[arg(long, default_value = "1min")]
    max_gap: String,

    /// Alignment onto the dataset time axis
    #[arg(long, value_enum, default_value_t = AlignOpt::Grid)]
    align: AlignOpt,

    /// Variable whose missing values also blank the ship position
    #[arg(long, default_value = "t_air")]
    validity_var: String,

    /// `instrument` attribute written on lat_ship / lon_ship
    #[arg(long, default_value = "GNSS receiver (MS Fridtjof Nansen)")]
    instrument: String,

    /// Optional JSON file receiving the merge counts
    #[arg(long, value_hint = ValueHint::FilePath)]
    summary_json: Option<PathBuf>,

    /// Verbose logging
    #[arg(long, action = ArgAction::SetTrue)]
    verbose: bool,
}

#[derive(Parser, Debug)]
struct InspectArgs {
    /// Directories of position logs to inspect
    #[arg(long = "gps-dir", default_values = DEFAULT_GPS_DIRS, value_hint = ValueHint::DirPath)]
    gps_dirs: Vec<PathBuf>,

    /// Output report path (`-` for stdout)
    #[arg(short, long, default_value = "position_logs.txt", value_hint = ValueHint::FilePath)]
    output: PathBuf,

    /// Verbose logging
    #[arg(long, action = ArgAction::SetTrue)]
    verbose: bool,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum AlignOpt {
    /// Fixed-frequency grid, then exact selection of the dataset times
    Grid,
    /// Straight onto the dataset times
    Direct,
}

impl From<AlignOpt> for Alignment {
    fn from(value: AlignOpt) -> Self {
        match value {
            AlignOpt::Grid => Alignment::Grid,
            AlignOpt::Direct => Alignment::Direct,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let verbose = match &cli.command {
        Command::Merge(args) => args.verbose,
        Command::Inspect(args) => args.verbose,
    };
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    match cli.command {
        Command::Merge(args) => handle_merge(args),
        Command::Inspect(args) => handle_inspect(args),
    }
}

fn parse_duration_arg(flag: &str, token: &str) -> Result<f64> {
    let seconds = parse_duration_token(token)
        .ok_or_else(|| anyhow!("invalid {} '{}': expected e.g. 60s, 1min, 0.5h", flag, token))?;
    if seconds < 0.0 {
        return Err(anyhow!("{} must not be negative", flag));
    }
    Ok(seconds)
}

fn build_params(args: &MergeArgs) -> Result<MergeParams> {
    let mut params = MergeParams::default();
    params.freq_s = parse_duration_arg("--freq", &args.freq)?;
    if params.freq_s <= 0.0 {
        return Err(anyhow!("--freq must be positive"));
    }
    params.max_gap_s = parse_duration_arg("--max-gap", &args.max_gap)?;
    params.align = args.align.into();
    params.validity_var = args.validity_var.clone();
    params.instrument = args.instrument.clone();
    Ok(params)
}

#[cfg(feature = "netcdf")]
fn read_dataset(path: &Path) -> Result<Dataset> {
    shippos::netcdf_io::read_dataset(path).with_context(|| format!("failed to read {}", path.display()))
}

#[cfg(not(feature = "netcdf"))]
fn read_dataset(path: &Path) -> Result<Dataset> {
    Err(anyhow!(
        "cannot read {}: built without netCDF support (rebuild with --features netcdf)",
        path.display()
    ))
}

#[cfg(feature = "netcdf")]
fn write_dataset(path: &Path, dataset: &Dataset) -> Result<()> {
    shippos::netcdf_io::write_dataset(path, dataset)
        .with_context(|| format!("failed to write {}", path.display()))
}

#[cfg(not(feature = "netcdf"))]
fn write_dataset(path: &Path, _dataset: &Dataset) -> Result<()> {
    Err(anyhow!(
        "cannot write {}: built without netCDF support (rebuild with --features netcdf)",
        path.display()
    ))
}

fn handle_merge(args: MergeArgs) -> Result<()> {
    if args.gps_dirs.is_empty() {
        return Err(anyhow!("no position log directories supplied"));
    }
    let params = build_params(&args)?;

    let t_load = Instant::now();
    let mut dataset = read_dataset(&args.dataset)?;
    info!(
        "Dataset {}: {} time steps, {} variables",
        args.dataset.display(),
        dataset.len(),
        dataset.variables.len()
    );
    let track = load_position_dirs(&args.gps_dirs).context("failed to load position logs")?;
    if args.verbose {
        info!(
            "Load stage: {:.1} ms ({} fixes)",
            t_load.elapsed().as_secs_f64() * 1000.0,
            track.len()
        );
    }

    let t_merge = Instant::now();
    let report = merge_ship_positions(&mut dataset, &track, &params)
        .context("failed to merge ship positions")?;
    if args.verbose {
        info!("Merge stage: {:.1} ms", t_merge.elapsed().as_secs_f64() * 1000.0);
    }
    if report.kept == 0 {
        warn!("No ship position survived the gap and validity masks");
    }

    write_dataset(&args.output_nc, &dataset)?;
    info!("Wrote dataset: {}", args.output_nc.display());

    if args.output_csv.as_os_str() == "-" {
        let stdout = io::stdout();
        write_table(&dataset, stdout.lock())?;
    } else {
        write_table_file(&dataset, &args.output_csv)
            .with_context(|| format!("failed to write {}", args.output_csv.display()))?;
        info!("Wrote table: {}", args.output_csv.display());
    }

    if let Some(path) = args.summary_json.as_ref() {
        write_summary(&report, path)?;
        info!("Wrote merge summary: {}", path.display());
    }
    Ok(())
}

fn write_summary(report: &MergeReport, path: &Path) -> Result<()> {
    let text = serde_json::to_string_pretty(report)?;
    fs::write(path, text).with_context(|| format!("failed to write {}", path.display()))
}

fn inspect_report(dirs: &[PathBuf]) -> Result<String> {
    let mut report = String::new();
    for dir in dirs {
        let summaries = summarize_position_dir(dir)
            .with_context(|| format!("failed to inspect {}", dir.display()))?;
        report.push_str(&format!("DIR: {}\n", dir.display()));
        report.push_str(&format!("  files: {}\n", summaries.len()));
        for s in &summaries {
            let name = s
                .path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| s.path.display().to_string());
            report.push_str(&format!("  - {} [{}]\n", name, s.schema));
            report.push_str(&format!(
                "      records: {} (missing positions: {})\n",
                s.records, s.missing_positions
            ));
            if let (Some(first), Some(last)) = (s.first, s.last) {
                report.push_str(&format!(
                    "      span: {} .. {}\n",
                    first.format("%Y-%m-%d %H:%M:%S"),
                    last.format("%Y-%m-%d %H:%M:%S")
                ));
            }
            if let Some(gap) = s.largest_gap_s {
                report.push_str(&format!("      largest_gap_s: {:.1}\n", gap));
            }
        }
        report.push('\n');
    }
    Ok(report)
}

fn handle_inspect(args: InspectArgs) -> Result<()> {
    let report = inspect_report(&args.gps_dirs)?;
    if args.output.as_os_str() == "-" {
        io::stdout().lock().write_all(report.as_bytes())?;
    } else {
        fs::write(&args.output, report)
            .with_context(|| format!("failed to write {}", args.output.display()))?;
        info!("Position log report written: {}", args.output.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn merge_defaults_follow_batch_file_names() {
        let cli = Cli::parse_from(["shippos", "merge"]);
        let Command::Merge(args) = cli.command else {
            panic!("expected merge subcommand");
        };
        assert_eq!(args.dataset, PathBuf::from(DEFAULT_DATASET));
        assert_eq!(
            args.gps_dirs,
            vec![
                PathBuf::from("nansen_gps_old_format"),
                PathBuf::from("nansen_gps_new_format")
            ]
        );
        let params = build_params(&args).unwrap();
        assert_eq!(params.freq_s, 60.0);
        assert_eq!(params.max_gap_s, 60.0);
        assert_eq!(params.align, Alignment::Grid);
    }

    #[test]
    fn merge_options_map_onto_params() {
        let cli = Cli::parse_from([
            "shippos", "merge", "--max-gap", "90s", "--align", "direct", "--validity-var", "p_air",
        ]);
        let Command::Merge(args) = cli.command else {
            panic!("expected merge subcommand");
        };
        let params = build_params(&args).unwrap();
        assert_eq!(params.max_gap_s, 90.0);
        assert_eq!(params.align, Alignment::Direct);
        assert_eq!(params.validity_var, "p_air");
    }

    #[test]
    fn bad_durations_rejected() {
        assert!(parse_duration_arg("--max-gap", "soon").is_err());
        assert!(parse_duration_arg("--max-gap", "-5s").is_err());
        let cli = Cli::parse_from(["shippos", "merge", "--freq", "0s"]);
        let Command::Merge(args) = cli.command else {
            panic!("expected merge subcommand");
        };
        assert!(build_params(&args).is_err());
    }

    #[test]
    fn inspect_report_lists_files() {
        let scratch = tempfile::tempdir().unwrap();
        fs::write(
            scratch.path().join("a.nrt"),
            "datetime\tlat\tlon\n2024-11-30 12:00:00\t-60.0\t-50.0\n2024-11-30 12:01:00\t-60.1\t-50.1\n",
        )
        .unwrap();
        let report = inspect_report(&[scratch.path().to_path_buf()]).unwrap();
        assert!(report.contains("files: 1"));
        assert!(report.contains("a.nrt [legacy]"));
        assert!(report.contains("records: 2 (missing positions: 0)"));
        assert!(report.contains("span: 2024-11-30 12:00:00 .. 2024-11-30 12:01:00"));
        assert!(report.contains("largest_gap_s: 60.0"));
    }
}
