use std::{
    path::{Path, PathBuf},
    sync::{Arc, mpsc},
    time::Duration,
};

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::json;

use mediaflow::io::ffmpeg::{FfmpegMediaSource, FfmpegMediaTarget};
use mediaflow::io::{self, MediaRange, MediaSource};
use mediaflow::{
    GRANULARITY_DEFAULT, MediaCategory, MediaTransformer, TrackTransform, TrackTransformationInfo,
    TransformError, TransformationListener, TransformationOptions, estimate,
};

const CLI_AFTER_HELP: &str = "Examples:\n  mediaflow probe input.mp4 --json\n  mediaflow copy input.mp4 clip.mp4 --start 0:00:10 --end 0:00:20 --progress\n  mediaflow estimate input.mp4\n  mediaflow completions zsh > _mediaflow";

#[derive(Debug, Parser)]
#[command(
    name = "mediaflow",
    version,
    about = "Inspect, trim and copy the tracks of media files",
    after_help = CLI_AFTER_HELP
)]
struct Cli {
    /// Show additional logging output.
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print the tracks of a media file.
    #[command(
        about = "Print track formats",
        visible_alias = "info",
        after_help = "Examples:\n  mediaflow probe input.mp4\n  mediaflow probe input.mp4 --json"
    )]
    Probe {
        /// Input media path.
        input: PathBuf,

        /// Output track formats as machine-readable JSON.
        #[arg(long)]
        json: bool,
    },

    /// Copy tracks into a new container without re-encoding.
    #[command(
        about = "Trim and copy tracks without re-encoding",
        after_help = "Examples:\n  mediaflow copy input.mkv output.mp4\n  mediaflow copy input.mp4 clip.mp4 --start 10 --end 00:00:20.5 --exclude-audio"
    )]
    Copy {
        /// Input media path.
        input: PathBuf,
        /// Output file path.
        output: PathBuf,
        /// Optional start time (seconds, mm:ss or hh:mm:ss).
        #[arg(long)]
        start: Option<String>,
        /// Optional end time (seconds, mm:ss or hh:mm:ss).
        #[arg(long)]
        end: Option<String>,
        #[arg(long)]
        exclude_video: bool,
        #[arg(long)]
        exclude_audio: bool,
        /// Show a progress bar.
        #[arg(long)]
        progress: bool,
        /// Skip the free disk space check.
        #[arg(long)]
        no_disk_check: bool,
    },

    /// Estimate the size of a full copy of a media file.
    #[command(about = "Estimate output size")]
    Estimate {
        /// Input media path.
        input: PathBuf,
    },

    /// Generate shell completion scripts.
    #[command(about = "Generate shell completions")]
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn parse_timecode(value: &str) -> Result<Duration, Box<dyn std::error::Error>> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err("time value cannot be empty".into());
    }

    if let Ok(seconds) = trimmed.parse::<f64>() {
        return Ok(Duration::from_secs_f64(seconds.max(0.0)));
    }

    let parts: Vec<&str> = trimmed.split(':').collect();
    if parts.len() < 2 || parts.len() > 3 {
        return Err(format!("invalid time format: {trimmed}").into());
    }

    let (hours, minutes, seconds_str) = if parts.len() == 3 {
        (parts[0].parse::<u64>()?, parts[1].parse::<u64>()?, parts[2])
    } else {
        (0_u64, parts[0].parse::<u64>()?, parts[1])
    };

    let seconds = seconds_str.parse::<f64>()?;
    let total_seconds = (hours as f64 * 3600.0) + (minutes as f64 * 60.0) + seconds;
    Ok(Duration::from_secs_f64(total_seconds.max(0.0)))
}

fn parse_selection(start: Option<&str>, end: Option<&str>) -> Result<MediaRange, Box<dyn std::error::Error>> {
    let full = MediaRange::default();
    let start_us = match start {
        Some(value) => parse_timecode(value)?.as_micros() as i64,
        None => full.start(),
    };
    let end_us = match end {
        Some(value) => parse_timecode(value)?.as_micros() as i64,
        None => full.end(),
    };
    if start_us >= end_us {
        return Err("--start must be before --end".into());
    }
    Ok(MediaRange::new(start_us, end_us))
}

fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

/// Tracks a copy keeps, by category filter.
fn copied_tracks(
    source: &dyn MediaSource,
    exclude_video: bool,
    exclude_audio: bool,
) -> Result<Vec<usize>, TransformError> {
    let mut tracks = Vec::new();
    for track in 0..source.track_count() {
        let format = source.track_format(track)?;
        let keep = match format.category() {
            MediaCategory::Video => !exclude_video,
            MediaCategory::Audio => !exclude_audio,
            MediaCategory::Other => false,
        };
        if keep && format.mime().is_some() {
            tracks.push(track);
        }
    }
    Ok(tracks)
}

type Outcome = Result<Vec<TrackTransformationInfo>, String>;

/// Drives an optional progress bar and reports the terminal callback.
struct TerminalListener {
    bar: Option<ProgressBar>,
    done: mpsc::Sender<Outcome>,
}

impl TransformationListener for TerminalListener {
    fn on_progress(&self, _id: &str, progress: f32) {
        if let Some(bar) = &self.bar {
            bar.set_position((progress * 100.0).round() as u64);
        }
    }

    fn on_completed(&self, _id: &str, stats: &[TrackTransformationInfo]) {
        if let Some(bar) = &self.bar {
            bar.finish_with_message("done");
        }
        let _ = self.done.send(Ok(stats.to_vec()));
    }

    fn on_cancelled(&self, _id: &str, _stats: &[TrackTransformationInfo]) {
        if let Some(bar) = &self.bar {
            bar.abandon_with_message("cancelled");
        }
        let _ = self.done.send(Err("transformation was cancelled".to_string()));
    }

    fn on_error(&self, _id: &str, error: &TransformError, _stats: &[TrackTransformationInfo]) {
        if let Some(bar) = &self.bar {
            bar.abandon_with_message("failed");
        }
        let _ = self.done.send(Err(error.to_string()));
    }
}

#[allow(clippy::too_many_arguments)]
fn copy(
    input: &Path,
    output: &Path,
    selection: MediaRange,
    exclude_video: bool,
    exclude_audio: bool,
    progress: bool,
    disk_check: bool,
    verbose: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let source = FfmpegMediaSource::open(input)?.with_selection(selection);
    let tracks = copied_tracks(&source, exclude_video, exclude_audio)?;
    if tracks.is_empty() {
        return Err("no tracks left to copy".into());
    }
    let target = FfmpegMediaTarget::create(output, &source, &tracks)?;
    let (source, target) = (io::share_source(source), io::share_target(target));

    let transforms: Vec<TrackTransform> = tracks
        .iter()
        .enumerate()
        .map(|(target_track, &track)| {
            TrackTransform::builder(source.clone(), track, target.clone())
                .with_target_track(target_track)
                .build()
        })
        .collect();

    let bar = if progress {
        let pb = ProgressBar::new(100);
        let style = ProgressStyle::with_template("{spinner:.green} {bar:40.cyan/blue} {pos}% {msg}")?;
        pb.set_style(style.progress_chars("##-"));
        Some(pb)
    } else {
        None
    };

    let (sender, receiver) = mpsc::channel();
    let listener = Arc::new(TerminalListener { bar, done: sender });
    let options = TransformationOptions::new()
        .with_granularity(GRANULARITY_DEFAULT)
        .with_disk_space_check(disk_check);

    let transformer = MediaTransformer::new()?;
    transformer.transform_with_options("copy", transforms, listener, options)?;
    let outcome = receiver.recv()?;
    transformer.release();

    let stats = outcome?;
    if verbose {
        for info in &stats {
            eprintln!(
                "{} {} in {:.2?}",
                "track".cyan().bold(),
                info.source_format,
                info.duration
            );
        }
    }
    println!(
        "{} {} -> {} ({} tracks)",
        "copied".green().bold(),
        input.display(),
        output.display(),
        stats.len()
    );
    Ok(())
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level)).init();

    match cli.command {
        Commands::Probe { input, json } => {
            let source = FfmpegMediaSource::open(&input)?;
            let formats = (0..source.track_count())
                .map(|track| source.track_format(track))
                .collect::<Result<Vec<_>, _>>()?;
            if json {
                let payload = json!({
                    "path": input.display().to_string(),
                    "size_bytes": source.size(),
                    "orientation": source.orientation_hint(),
                    "tracks": formats.iter().enumerate().map(|(index, format)| json!({
                        "index": index,
                        "mime": format.mime(),
                        "width": format.width,
                        "height": format.height,
                        "frame_rate": format.frame_rate,
                        "sample_rate": format.sample_rate,
                        "channels": format.channel_count,
                        "bit_rate": format.bit_rate,
                        "duration_us": format.duration_us,
                    })).collect::<Vec<_>>(),
                });
                println!("{}", serde_json::to_string_pretty(&payload)?);
            } else {
                println!("File: {}", input.display());
                if let Some(size) = source.size() {
                    println!("Size: {}", format_bytes(size));
                }
                if source.orientation_hint() != 0 {
                    println!("Rotation: {} degrees", source.orientation_hint());
                }
                for (index, format) in formats.iter().enumerate() {
                    let duration = format
                        .duration_us
                        .map(|us| format!(" ({:.2}s)", us as f64 / 1_000_000.0))
                        .unwrap_or_default();
                    println!("Track {index}: {format}{duration}");
                }
            }
        }
        Commands::Copy {
            input,
            output,
            start,
            end,
            exclude_video,
            exclude_audio,
            progress,
            no_disk_check,
        } => {
            if exclude_video && exclude_audio {
                return Err("--exclude-video and --exclude-audio leave nothing to copy".into());
            }
            let selection = parse_selection(start.as_deref(), end.as_deref())?;
            copy(
                &input,
                &output,
                selection,
                exclude_video,
                exclude_audio,
                progress,
                !no_disk_check,
                cli.verbose,
            )?;
        }
        Commands::Estimate { input } => {
            let source = FfmpegMediaSource::open(&input)?;
            let size = estimate::estimated_media_size(&source, None, None, estimate::COMMON_AUDIO_BITRATE)?;
            println!("Estimated copy size: {}", format_bytes(size));
            if let Some(actual) = source.size() {
                println!("Source size: {}", format_bytes(actual));
            }
        }
        Commands::Completions { shell } => {
            let mut command = Cli::command();
            clap_complete::generate(shell, &mut command, "mediaflow", &mut std::io::stdout());
        }
    }

    Ok(())
}

fn main() {
    if let Err(error) = run() {
        eprintln!("{} {error}", "error:".red().bold());
        std::process::exit(1);
    }
}
