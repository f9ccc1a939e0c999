//! Sort spikes from raw little-endian `f64` channel files.

use std::path::PathBuf;

use spikesort::report::{SortReport, write_report};
use spikesort::series::decode_f64_le;
use spikesort::{MultichannelSeries, PipelineConfig, SpikeSorter};

fn main() {
    if let Err(err) = run() {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let Some(options) = parse_args(std::env::args().skip(1).collect())? else {
        return Ok(());
    };
    if let Err(err) = spikesort::logging::init(options.log_dir.as_deref()) {
        eprintln!("Logging disabled: {err}");
    }
    let config = PipelineConfig::load_or_default(options.config_path.as_deref())
        .map_err(|err| err.to_string())?;
    let rate = options.sampling_rate.unwrap_or(config.sampling_rate);
    let channels = options
        .channel_files
        .iter()
        .map(|path| {
            let blob = std::fs::read(path)
                .map_err(|err| format!("Read {} failed: {err}", path.display()))?;
            decode_f64_le(&blob).map_err(|err| format!("{}: {err}", path.display()))
        })
        .collect::<Result<Vec<_>, String>>()?;
    let series = MultichannelSeries::from_channels(channels, rate).map_err(|err| err.to_string())?;
    let sorter = SpikeSorter::new(config).map_err(|err| err.to_string())?;
    let output = sorter.run(&series).map_err(|err| err.to_string())?;

    println!(
        "{} detections, {} good events, {} templates",
        output.detections.len(),
        output.good_events.len(),
        output.library.len()
    );
    for round in &output.rounds {
        println!(
            "round {}: {} matched, {} unmatched, residual energy {:.1}",
            round.index,
            round.matched(),
            round.unmatched(),
            round.residual.energy()
        );
    }
    if let Some(path) = &options.report_path {
        let report = SortReport::from_output(&output, options.with_events);
        write_report(path, &report).map_err(|err| err.to_string())?;
        println!("Report written to {}", path.display());
    }
    Ok(())
}

#[derive(Debug, Clone, Default)]
struct Options {
    config_path: Option<PathBuf>,
    sampling_rate: Option<f64>,
    report_path: Option<PathBuf>,
    log_dir: Option<PathBuf>,
    with_events: bool,
    channel_files: Vec<PathBuf>,
}

fn parse_args(args: Vec<String>) -> Result<Option<Options>, String> {
    let mut options = Options::default();
    let mut idx = 0usize;
    while idx < args.len() {
        match args[idx].as_str() {
            "-h" | "--help" => {
                println!("{}", help_text());
                return Ok(None);
            }
            "--config" => {
                idx += 1;
                let value = args.get(idx).ok_or_else(|| "--config requires a value".to_string())?;
                options.config_path = Some(PathBuf::from(value));
            }
            "--rate" => {
                idx += 1;
                let value = args.get(idx).ok_or_else(|| "--rate requires a value".to_string())?;
                options.sampling_rate = Some(
                    value
                        .parse::<f64>()
                        .map_err(|_| format!("Invalid --rate value: {value}"))?,
                );
            }
            "--report" => {
                idx += 1;
                let value = args.get(idx).ok_or_else(|| "--report requires a value".to_string())?;
                options.report_path = Some(PathBuf::from(value));
            }
            "--log-dir" => {
                idx += 1;
                let value =
                    args.get(idx).ok_or_else(|| "--log-dir requires a value".to_string())?;
                options.log_dir = Some(PathBuf::from(value));
            }
            "--with-events" => {
                options.with_events = true;
            }
            flag if flag.starts_with("--") => {
                return Err(format!("Unknown option {flag}. Use --help for usage."));
            }
            path => options.channel_files.push(PathBuf::from(path)),
        }
        idx += 1;
    }
    if options.channel_files.is_empty() {
        return Err(format!("No channel files given.\n\n{}", help_text()));
    }
    Ok(Some(options))
}

fn help_text() -> String {
    [
        "spikesort",
        "",
        "Detect, cluster and classify spikes in a multichannel recording.",
        "",
        "Usage:",
        "  spikesort [options] <channel.f64>...",
        "",
        "Each channel file holds raw little-endian f64 samples; all files must",
        "have the same length.",
        "",
        "Options:",
        "  --config <path>   TOML pipeline configuration (defaults built in).",
        "  --rate <hz>       Sampling rate, overriding the configuration.",
        "  --report <path>   Write a JSON summary of the run.",
        "  --with-events     Include every classification in the report.",
        "  --log-dir <dir>   Also write logs to a timestamped file in <dir>.",
    ]
    .join("\n")
}
