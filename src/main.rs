use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use colored::Colorize;
use console::Emoji;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use podstash::{
    Archive, ClientOptions, DownloadScheduler, NoopReporter, ProgressEvent, ProgressReporter,
    ReqwestClient, SchedulerOptions, SharedProgressReporter, SyncMode,
};

// Emoji with fallback for terminals without Unicode support
static MICROPHONE: Emoji<'_, '_> = Emoji("🎙️  ", "");
static SEARCH: Emoji<'_, '_> = Emoji("🔍 ", "[~] ");
static DOWNLOAD: Emoji<'_, '_> = Emoji("📥 ", "[v] ");
static SUCCESS: Emoji<'_, '_> = Emoji("✅ ", "[+] ");
static UNCHANGED: Emoji<'_, '_> = Emoji("💤 ", "[=] ");
static FAILURE: Emoji<'_, '_> = Emoji("❌ ", "[!] ");
static BROOM: Emoji<'_, '_> = Emoji("🧹 ", "[-] ");
static PARTY: Emoji<'_, '_> = Emoji("🎉 ", "[*] ");
static FOLDER: Emoji<'_, '_> = Emoji("📁 ", "");
static CROSS: Emoji<'_, '_> = Emoji("✗ ", "x ");

/// Archive podcast feeds and republish them from your own server
#[derive(Parser, Debug)]
#[command(name = "podstash")]
#[command(about = "Archive podcast feeds and republish them from your own server")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Minimum delay between two downloads from the same host, in seconds
    #[arg(long, global = true, default_value = "10", value_parser = clap::value_parser!(u64).range(0..=86_400))]
    delay_secs: u64,

    /// Give up on a response that sends nothing for this many seconds
    #[arg(long, global = true, default_value = "300")]
    read_timeout_secs: u64,

    /// Timeout for establishing a connection, in seconds
    #[arg(long, global = true, default_value = "30")]
    connect_timeout_secs: u64,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Quiet mode - suppress progress output
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(ClapArgs, Debug)]
struct ArchiveArg {
    /// Path to the archive directory
    #[arg(long)]
    archive: PathBuf,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Initialize a podcast archive directory
    Init {
        #[command(flatten)]
        archive: ArchiveArg,

        /// Base URL under which the archive directory is served
        #[arg(long)]
        base_url: String,
    },

    /// Add a new podcast feed to be tracked
    Add {
        #[command(flatten)]
        archive: ArchiveArg,

        /// Name of the feed, used as its directory name
        #[arg(long)]
        feed_name: String,

        /// URL of the remote RSS feed
        #[arg(long)]
        feed_url: String,
    },

    /// Update tracked podcasts and download new episodes
    Update {
        #[command(flatten)]
        archive: ArchiveArg,

        /// Only fetch missing media from stored snapshots
        #[arg(long)]
        just_mp3: bool,
    },

    /// List the podcasts in the archive
    List {
        #[command(flatten)]
        archive: ArchiveArg,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Progress reporter using indicatif for terminal output
struct IndicatifReporter {
    multi: MultiProgress,
    bars: Mutex<HashMap<usize, ProgressBar>>,
    main_bar: ProgressBar,
}

impl IndicatifReporter {
    fn new() -> Self {
        let multi = MultiProgress::new();

        let main_style = ProgressStyle::default_bar()
            .template("{spinner:.green} {wide_msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());

        let main_bar = multi.add(ProgressBar::new_spinner());
        main_bar.set_style(main_style);
        main_bar.enable_steady_tick(Duration::from_millis(100));

        Self {
            multi,
            bars: Mutex::new(HashMap::new()),
            main_bar,
        }
    }

    fn get_or_create_bar(&self, download_id: usize) -> ProgressBar {
        let mut bars = self.bars.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(bar) = bars.get(&download_id) {
            return bar.clone();
        }

        let style = ProgressStyle::default_bar()
            .template(&format!(
                "  {DOWNLOAD}[{{bar:30.cyan/blue}}] {{bytes}}/{{total_bytes}} {{wide_msg}}"
            ))
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓░");

        let bar = self.multi.add(ProgressBar::new(0));
        bar.set_style(style);
        bars.insert(download_id, bar.clone());
        bar
    }

    fn finish_bar(&self, download_id: usize) {
        let mut bars = self.bars.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(bar) = bars.remove(&download_id) {
            bar.finish_and_clear();
        }
    }

    fn line(&self, message: String) {
        let _ = self.multi.println(message);
    }

    fn finish(&self) {
        self.main_bar.finish_and_clear();
    }
}

impl ProgressReporter for IndicatifReporter {
    fn report(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::FeedStarted { feed } => {
                self.main_bar
                    .set_message(format!("{SEARCH}Updating {}", feed.cyan()));
            }

            ProgressEvent::DownloadQueued {
                download_id,
                label,
                host,
            } => {
                let bar = self.get_or_create_bar(download_id);
                bar.set_message(format!(
                    "{} {}",
                    truncate_title(&label, 40),
                    format!("(waiting for {host})").dimmed()
                ));
            }

            ProgressEvent::DownloadStarting {
                download_id,
                label,
                content_length,
            } => {
                let bar = self.get_or_create_bar(download_id);
                bar.set_length(content_length.unwrap_or(0));
                bar.set_position(0);
                bar.set_message(truncate_title(&label, 40));
            }

            ProgressEvent::DownloadProgress {
                download_id,
                bytes_downloaded,
                total_bytes,
            } => {
                let bar = self.get_or_create_bar(download_id);
                if let Some(total) = total_bytes {
                    bar.set_length(total);
                }
                bar.set_position(bytes_downloaded);
            }

            ProgressEvent::DownloadCompleted {
                download_id,
                label,
                bytes_downloaded,
                committed,
            } => {
                let bar = self.get_or_create_bar(download_id);
                bar.set_position(bytes_downloaded);
                self.finish_bar(download_id);
                if committed {
                    self.line(format!("{SUCCESS}{}", truncate_title(&label, 60).green()));
                } else {
                    self.line(format!(
                        "{UNCHANGED}{} {}",
                        truncate_title(&label, 60),
                        "unchanged".dimmed()
                    ));
                }
            }

            ProgressEvent::DownloadFailed {
                download_id,
                label,
                error,
            } => {
                self.finish_bar(download_id);
                self.line(format!(
                    "{FAILURE}{} - {}",
                    truncate_title(&label, 40).red(),
                    error.red()
                ));
            }

            ProgressEvent::PartialFilesCleanedUp { feed, count } => {
                self.line(format!(
                    "{BROOM}{}: removed {} partial download(s)",
                    feed.cyan(),
                    count.to_string().yellow()
                ));
            }

            ProgressEvent::FeedCompleted {
                feed,
                episodes,
                downloaded,
                failed,
            } => {
                self.line(format!(
                    "{PARTY}{} {} episodes, {} downloaded, {} failed",
                    format!("{feed}:").bold().green(),
                    episodes.to_string().cyan(),
                    downloaded.to_string().green().bold(),
                    if failed > 0 {
                        failed.to_string().red().bold()
                    } else {
                        failed.to_string().green()
                    }
                ));
            }

            ProgressEvent::FeedFailed { feed, error } => {
                self.line(format!(
                    "{FAILURE}{} {}",
                    format!("{feed}:").bold().red(),
                    error.red()
                ));
            }
        }
    }
}

fn truncate_title(title: &str, max_len: usize) -> String {
    if title.chars().count() <= max_len {
        title.to_string()
    } else {
        let kept: String = title.chars().take(max_len.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match &args.command {
        Command::Init { archive, base_url } => {
            let archive = Archive::create(&archive.archive, base_url)
                .context("Failed to initialize archive")?;
            println!(
                "{FOLDER}Initialized podcast archive under {} ({})",
                archive.root().display().to_string().cyan(),
                archive.base_url()
            );
            Ok(ExitCode::SUCCESS)
        }

        Command::Add {
            archive,
            feed_name,
            feed_url,
        } => {
            let archive = Archive::load(&archive.archive).context("Failed to open archive")?;
            let feed = archive
                .new_feed(feed_name, feed_url)
                .context("Unable to add podcast")?;
            println!(
                "{SUCCESS}Added podcast {} to archive; it will be served at {}",
                feed.name.bold(),
                feed.layout.local_feed_url().cyan()
            );
            Ok(ExitCode::SUCCESS)
        }

        Command::Update { archive, just_mp3 } => update(&args, &archive.archive, *just_mp3).await,

        Command::List { archive, json } => {
            let archive = Archive::load(&archive.archive).context("Failed to open archive")?;
            let summaries = archive.summaries().await.context("Failed to list feeds")?;

            if *json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&summaries).context("Failed to encode JSON")?
                );
            } else {
                for summary in &summaries {
                    println!("{}", summary.name.bold());
                    println!("\tTracked RSS: {}", summary.tracked_url);
                    println!("\tLocal RSS: {}", summary.local_url);
                    match (summary.episodes, &summary.error) {
                        (Some(episodes), _) => println!("\tEpisodes: {episodes}"),
                        (None, Some(error)) => println!("\t{}", error.red()),
                        (None, None) => {}
                    }
                }
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn update(args: &Args, archive_path: &Path, just_mp3: bool) -> Result<ExitCode> {
    let archive = Archive::load(archive_path).context("Failed to open archive")?;

    if !args.quiet {
        println!(
            "\n{}{} {}\n",
            MICROPHONE,
            "podstash".bold().magenta(),
            "- Podcast Archiver".dimmed()
        );
    }

    let client = ReqwestClient::new(&ClientOptions {
        read_timeout: Duration::from_secs(args.read_timeout_secs),
        connect_timeout: Duration::from_secs(args.connect_timeout_secs),
    })
    .context("Failed to build HTTP client")?;

    let indicatif = (!args.quiet).then(|| Arc::new(IndicatifReporter::new()));
    let reporter: SharedProgressReporter = match &indicatif {
        Some(reporter) => reporter.clone() as SharedProgressReporter,
        None => NoopReporter::shared(),
    };

    let scheduler = DownloadScheduler::new(
        client,
        SchedulerOptions {
            delay: Duration::from_secs(args.delay_secs),
        },
        reporter,
    );
    let mode = if just_mp3 {
        SyncMode::MediaOnly
    } else {
        SyncMode::Full
    };

    let updates = archive
        .update_all(&scheduler, mode)
        .await
        .context("Failed to update feeds")?;
    if let Some(reporter) = &indicatif {
        reporter.finish();
    }
    info!("Finished updating feeds");

    let mut any_failed = updates.iter().any(|u| u.result.is_err());
    if let Err(e) = archive.update_html().await {
        error!("Error generating HTML: {e}");
        any_failed = true;
    }

    if !args.quiet {
        let failed_media: Vec<_> = updates
            .iter()
            .filter_map(|u| u.result.as_ref().ok().map(|r| (&u.name, r)))
            .flat_map(|(name, r)| r.failed_media.iter().map(move |m| (name, m)))
            .collect();
        if !failed_media.is_empty() {
            println!("\n{}", "Failed downloads:".red().bold());
            for (feed, (label, error)) in failed_media {
                println!(
                    "  {}{} {} - {}",
                    CROSS,
                    format!("[{feed}]").dimmed(),
                    label.yellow(),
                    error.dimmed()
                );
            }
        }
        println!(
            "\n{FOLDER}Archive: {}\n",
            archive.root().display().to_string().cyan()
        );
    }

    if any_failed {
        return Ok(ExitCode::from(2));
    }
    Ok(ExitCode::SUCCESS)
}
