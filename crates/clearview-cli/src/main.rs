use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use clearview::{
    load_config, AspectRatio, BatchItem, ClearviewError, Config, IntakeFile, ItemEvent,
    ItemEventKind, ProcessingStatus, VideoResolution, Workspace, WorkspaceMode,
};
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "clearview")]
#[command(about = "Batch watermark removal and image-to-video reconstruction")]
#[command(version)]
struct Cli {
    /// Image files to process
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Workspace mode
    #[arg(short, long, value_enum, default_value = "photo")]
    mode: Mode,

    /// Config file (defaults to <config dir>/clearview/config.json)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory for results
    #[arg(short, long, default_value = "clearview-output")]
    output: PathBuf,

    /// Video prompt
    #[arg(long)]
    prompt: Option<String>,

    /// Video resolution (720p, 1080p)
    #[arg(long)]
    resolution: Option<VideoResolution>,

    /// Video aspect ratio (16:9, 9:16)
    #[arg(long)]
    aspect_ratio: Option<AspectRatio>,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum Mode {
    Photo,
    Video,
}

impl From<Mode> for WorkspaceMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Photo => WorkspaceMode::Photo,
            Mode::Video => WorkspaceMode::Video,
        }
    }
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Clearview(#[from] ClearviewError),

    #[error("Failed to write '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to initialize logging: {0}")]
    Logging(String),
}

fn init_logging(json: bool) -> Result<(), CliError> {
    tracing_log::LogTracer::init().map_err(|e| CliError::Logging(e.to_string()))?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    let result = if json {
        tracing::subscriber::set_global_default(registry.with(fmt::layer().json()))
    } else {
        tracing::subscriber::set_global_default(registry.with(fmt::layer().with_target(false)))
    };
    result.map_err(|e| CliError::Logging(e.to_string()))
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("clearview").join("config.json"))
}

fn resolve_config(explicit: Option<&Path>) -> Result<Config, ClearviewError> {
    if let Some(path) = explicit {
        info!("Loading config from {:?}", path);
        return Ok(load_config(path)?);
    }

    match default_config_path() {
        Some(path) if path.exists() => {
            info!("Loading config from {:?}", path);
            Ok(load_config(&path)?)
        }
        _ => {
            info!("No config file found, using defaults");
            Ok(Config::default())
        }
    }
}

fn log_event(event: &ItemEvent) {
    let name = event.filename.as_deref().unwrap_or("-");
    match event.kind {
        ItemEventKind::Status => match event.status {
            Some(ProcessingStatus::Error) => warn!(
                file = name,
                error = event.error.as_deref().unwrap_or(""),
                "{}",
                event.message
            ),
            _ => info!(file = name, "{}", event.message),
        },
        ItemEventKind::Credential if event.flag == Some(true) => {
            error!("{}: check the configured API key", event.message)
        }
        _ => info!("{}", event.message),
    }
}

async fn stream_events(mut rx: broadcast::Receiver<ItemEvent>) {
    loop {
        match rx.recv().await {
            Ok(event) => log_event(&event),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!("Event stream lagged, {} events skipped", skipped)
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// `<stem>-clean.<ext>` or `<stem>-video.<ext>`, with `-2`, `-3`, ... appended
/// when the name is already in `taken`.
fn output_path(
    dir: &Path,
    item: &BatchItem,
    mode: WorkspaceMode,
    extension: &str,
    taken: &mut HashSet<PathBuf>,
) -> PathBuf {
    let stem = Path::new(item.filename())
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| item.id.to_string());
    let suffix = match mode {
        WorkspaceMode::Photo => "clean",
        WorkspaceMode::Video => "video",
    };

    let mut path = dir.join(format!("{}-{}.{}", stem, suffix, extension));
    let mut repeat = 1;
    while taken.contains(&path) {
        repeat += 1;
        path = dir.join(format!("{}-{}-{}.{}", stem, suffix, repeat, extension));
    }
    taken.insert(path.clone());
    path
}

/// Output paths for every completed item, in queue order.
fn plan_outputs<'a>(
    dir: &Path,
    items: &'a [BatchItem],
    mode: WorkspaceMode,
) -> Vec<(&'a BatchItem, PathBuf)> {
    let mut taken = HashSet::new();
    items
        .iter()
        .filter_map(|item| {
            let artifact = item.result.as_ref()?;
            let path = output_path(dir, item, mode, artifact.extension(), &mut taken);
            Some((item, path))
        })
        .collect()
}

async fn write_results(
    dir: &Path,
    items: &[BatchItem],
    mode: WorkspaceMode,
) -> Result<usize, CliError> {
    let mut written = 0;
    for (item, path) in plan_outputs(dir, items, mode) {
        let Some(artifact) = item.result.as_ref() else {
            continue;
        };
        if written == 0 {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|source| CliError::Write {
                    path: dir.to_path_buf(),
                    source,
                })?;
        }

        tokio::fs::write(&path, &artifact.bytes)
            .await
            .map_err(|source| CliError::Write {
                path: path.clone(),
                source,
            })?;
        info!("Wrote {:?}", path);
        written += 1;
    }
    Ok(written)
}

fn print_summary(items: &[BatchItem], rejected: usize) {
    println!();
    for item in items {
        match item.status {
            ProcessingStatus::Completed => {
                let config = item
                    .job_config
                    .map(|c| format!(" ({}, {})", c.resolution, c.aspect_ratio))
                    .unwrap_or_default();
                println!("  done    {}{}", item.filename(), config);
            }
            ProcessingStatus::Error => println!(
                "  failed  {}: {}",
                item.filename(),
                item.error.as_deref().unwrap_or("unknown error")
            ),
            other => println!("  {:<7} {}", other.to_string().to_lowercase(), item.filename()),
        }
    }

    let completed = items
        .iter()
        .filter(|i| i.status == ProcessingStatus::Completed)
        .count();
    let failed = items
        .iter()
        .filter(|i| i.status == ProcessingStatus::Error)
        .count();
    println!(
        "\n{} completed, {} failed, {} rejected at intake",
        completed, failed, rejected
    );
}

async fn run(cli: Cli) -> Result<bool, CliError> {
    let mode = WorkspaceMode::from(cli.mode);
    let config = resolve_config(cli.config.as_deref())?;
    let workspace = Workspace::from_config(mode, &config)?;

    if mode == WorkspaceMode::Video {
        if let Some(prompt) = cli.prompt {
            workspace.set_prompt(prompt).map_err(ClearviewError::from)?;
        }
        if let Some(resolution) = cli.resolution {
            workspace
                .set_resolution(resolution)
                .map_err(ClearviewError::from)?;
        }
        if let Some(aspect_ratio) = cli.aspect_ratio {
            workspace
                .set_aspect_ratio(aspect_ratio)
                .map_err(ClearviewError::from)?;
        }
    } else if cli.prompt.is_some() || cli.resolution.is_some() || cli.aspect_ratio.is_some() {
        warn!("Video options are ignored in photo mode");
    }

    let events = tokio::spawn(stream_events(workspace.subscribe()));

    let mut files = Vec::with_capacity(cli.files.len());
    let mut rejected = 0;
    for path in &cli.files {
        match IntakeFile::from_path(path).await {
            Ok(file) => files.push(file),
            Err(e) => {
                warn!("{}", e);
                rejected += 1;
            }
        }
    }

    let report = workspace.intake(files);
    for rejection in &report.rejected {
        warn!("{}", rejection.error);
    }
    rejected += report.rejected.len();

    if report.accepted.is_empty() {
        warn!("No files accepted");
    } else if workspace.start() {
        tokio::select! {
            _ = workspace.wait_idle() => {}
            _ = tokio::signal::ctrl_c() => {
                workspace.stop();
                info!("Stopping after the current item (Ctrl-C again to abort)");
                tokio::select! {
                    _ = workspace.wait_idle() => {}
                    _ = tokio::signal::ctrl_c() => warn!("Aborted"),
                }
            }
        }
    }

    workspace.shutdown();
    let items = workspace.items();
    let written = write_results(&cli.output, &items, mode).await?;
    if written > 0 {
        info!("{} result(s) written to {:?}", written, cli.output);
    }

    drop(workspace);
    // the stream ends once every sender is gone
    let _ = tokio::time::timeout(Duration::from_secs(1), events).await;

    print_summary(&items, rejected);

    let all_done = rejected == 0
        && items
            .iter()
            .all(|item| item.status == ProcessingStatus::Completed);
    Ok(all_done)
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_logging(cli.json_logs) {
        eprintln!("{}", e);
        return ExitCode::FAILURE;
    }

    info!("Starting ClearView v{}", env!("CARGO_PKG_VERSION"));

    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(2),
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clearview::{Artifact, SourcePayload};

    #[test]
    fn test_cli_parses_video_options() {
        let cli = Cli::try_parse_from([
            "clearview",
            "--mode",
            "video",
            "--resolution",
            "1080p",
            "--aspect-ratio",
            "9:16",
            "frame.png",
        ])
        .unwrap();
        assert!(matches!(cli.mode, Mode::Video));
        assert_eq!(cli.resolution, Some(VideoResolution::FullHd1080));
        assert_eq!(cli.aspect_ratio, Some(AspectRatio::Portrait));
        assert_eq!(cli.files, vec![PathBuf::from("frame.png")]);
    }

    #[test]
    fn test_cli_requires_files() {
        assert!(Cli::try_parse_from(["clearview"]).is_err());
    }

    #[test]
    fn test_output_path() {
        let item = BatchItem::queued(SourcePayload::new("holiday.jpg", "image/jpeg", vec![1]));
        assert_eq!(
            output_path(
                Path::new("/out"),
                &item,
                WorkspaceMode::Photo,
                "png",
                &mut HashSet::new()
            ),
            PathBuf::from("/out/holiday-clean.png")
        );
        assert_eq!(
            output_path(
                Path::new("/out"),
                &item,
                WorkspaceMode::Video,
                "mp4",
                &mut HashSet::new()
            ),
            PathBuf::from("/out/holiday-video.mp4")
        );
    }

    fn completed(filename: &str, media_type: &str) -> BatchItem {
        let mut item = BatchItem::queued(SourcePayload::new(filename, media_type, vec![1]));
        item.status = ProcessingStatus::Completed;
        item.result = Some(Artifact::new("image/png", vec![2]));
        item
    }

    #[test]
    fn test_plan_outputs_keeps_names_unique() {
        let items = vec![
            completed("photo.jpg", "image/jpeg"),
            completed("photo.png", "image/png"),
            completed("photo.webp", "image/webp"),
            BatchItem::queued(SourcePayload::new("photo.gif", "image/gif", vec![1])),
        ];

        let planned: Vec<PathBuf> = plan_outputs(Path::new("/out"), &items, WorkspaceMode::Photo)
            .into_iter()
            .map(|(_, path)| path)
            .collect();
        assert_eq!(
            planned,
            vec![
                PathBuf::from("/out/photo-clean.png"),
                PathBuf::from("/out/photo-clean-2.png"),
                PathBuf::from("/out/photo-clean-3.png"),
            ]
        );
    }

    #[test]
    fn test_plan_outputs_same_name_from_different_directories() {
        // Intake keeps only the file name, so both arrive as "frame.png".
        let mut first = completed("frame.png", "image/png");
        first.result = Some(Artifact::new("video/mp4", vec![3]));
        let mut second = completed("frame.png", "image/png");
        second.result = Some(Artifact::new("video/mp4", vec![4]));
        let items = vec![first, second];

        let planned = plan_outputs(Path::new("/out"), &items, WorkspaceMode::Video);
        assert_eq!(planned[0].0.id, items[0].id);
        assert_eq!(planned[0].1, PathBuf::from("/out/frame-video.mp4"));
        assert_eq!(planned[1].0.id, items[1].id);
        assert_eq!(planned[1].1, PathBuf::from("/out/frame-video-2.mp4"));
    }
}
