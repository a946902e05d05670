// ManimGen Main Entry Point
// Copyright (c) 2026 ManimGen

use manimgen::agent::data_collector::{preference_pairs, reward, DataCollector};
use manimgen::agent::health;
use manimgen::agent::renderer::{Quality, RenderOptions};
use manimgen::config::Config;
use manimgen::dataset::{self, builder, manual, matcher, report, transcripts, youtube};
use manimgen::server;
use manimgen::state::KernelState;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use dotenv::dotenv;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "manimgen")]
#[command(about = "Natural-language to Manim animation service", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API
    Serve {
        #[arg(short, long, default_value = "8000")]
        port: u16,
    },

    /// Generate one animation in the foreground and print the final task
    Generate {
        #[arg(short, long)]
        prompt: String,

        /// low | medium | high
        #[arg(short, long, default_value = "low")]
        quality: String,
    },

    /// Record, change or remove feedback on a logged attempt
    Feedback {
        #[arg(short, long)]
        task_id: String,

        #[arg(long, conflicts_with = "negative")]
        positive: bool,

        #[arg(long)]
        negative: bool,

        #[arg(long)]
        remove: bool,
    },

    /// Summarise logged attempts as preference pairs
    Pairs,

    /// Report missing external programs
    Check,

    /// Build the video/transcript/code dataset
    Dataset {
        #[command(flatten)]
        paths: DatasetPaths,

        #[command(subcommand)]
        command: DatasetCommand,
    },
}

#[derive(Args)]
struct DatasetPaths {
    /// Directory holding every intermediate and final dataset artifact
    #[arg(long, global = true, default_value = "generate_dataset")]
    work_dir: PathBuf,
}

impl DatasetPaths {
    fn videos(&self) -> PathBuf {
        self.work_dir.join("3b1b_videos.json")
    }
    fn playlist_videos(&self) -> PathBuf {
        self.work_dir.join("playlist_videos.json")
    }
    fn videos_with_code(&self) -> PathBuf {
        matcher::with_code_path(&self.videos())
    }
    fn transcripts(&self) -> PathBuf {
        self.work_dir.join("transcripts")
    }
    fn repo(&self) -> PathBuf {
        self.work_dir.join("3b1b_repo")
    }
    fn output(&self) -> PathBuf {
        self.work_dir.join("3b1b_dataset")
    }
    fn index(&self) -> PathBuf {
        self.output().join("index.json")
    }
}

#[derive(Subcommand)]
enum DatasetCommand {
    /// Fetch metadata for every upload of a channel
    FetchVideos {
        #[arg(long, default_value = youtube::DEFAULT_CHANNEL_ID)]
        channel: String,
    },

    /// Fetch metadata for every video of a playlist
    FetchPlaylist {
        #[arg(long)]
        playlist: String,

        /// Defaults to playlist_videos.json in the work dir
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Download transcripts with yt-dlp
    Transcripts {
        #[arg(long, default_value = "yt-dlp")]
        ytdlp: String,
    },

    /// Clone/pull the code repository and match videos to source
    Match {
        #[arg(long, default_value = matcher::VIDEOS_REPO_URL)]
        repo_url: String,
    },

    /// Assemble the dataset directory and index.json
    Build,

    /// Every step in order
    Run {
        #[arg(long)]
        skip_videos: bool,
        #[arg(long)]
        skip_transcripts: bool,
        #[arg(long)]
        skip_code_matching: bool,
        /// Analyze missing matches afterwards
        #[arg(long)]
        analyze: bool,
    },

    /// Print videos without code, grouped by year
    ListMissing,

    /// Look for patterns among unmatched videos
    Analyze {
        #[arg(long, default_value = "analysis")]
        output: PathBuf,
    },

    /// Confidence and type breakdown of the matches
    Quality {
        #[arg(long, default_value = "42")]
        seed: u64,
    },

    /// Interactively match the remaining videos
    ManualMatch,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info");
    }
    tracing_subscriber::fmt::init();

    // Global panic handler: log panics with their location
    std::panic::set_hook(Box::new(|panic_info| {
        let location = panic_info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
            .unwrap_or_else(|| "unknown".to_string());
        let message = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };
        eprintln!("[MANIMGEN PANIC] at {}: {}", location, message);
    }));

    let args = Cli::parse();
    let config = Config::from_env();

    match args.command {
        Commands::Serve { port } => {
            config.log_summary();
            let state = Arc::new(KernelState::from_config(config)?);
            server::start_server(port, state).await?;
        }
        Commands::Generate { prompt, quality } => {
            let state = KernelState::from_config(config)?;
            let task = state.tasks.create();
            let options = RenderOptions {
                quality: Quality::parse(&quality),
                ..Default::default()
            };
            let done = state
                .pipeline
                .run(&task.task_id, &prompt, &options)
                .await
                .or_else(|| state.tasks.get(&task.task_id))
                .context("task vanished from the store")?;
            println!("{}", serde_json::to_string_pretty(&done)?);
        }
        Commands::Feedback {
            task_id,
            positive,
            negative,
            remove,
        } => {
            if !remove && positive == negative {
                bail!("pass exactly one of --positive / --negative, or --remove");
            }
            let collector = DataCollector::new(&config.training_data_dir)?;
            collector.update_feedback(&task_id, positive, remove).await?;
            info!("Feedback updated for {}", task_id);
        }
        Commands::Pairs => {
            let collector = DataCollector::new(&config.training_data_dir)?;
            let attempts = collector.load_attempts()?;
            let pairs = preference_pairs(&attempts);
            let mean = if attempts.is_empty() {
                0.0
            } else {
                attempts.iter().map(reward).sum::<f64>() / attempts.len() as f64
            };
            println!("Attempts: {}", attempts.len());
            println!("Preference pairs: {}", pairs.len());
            println!("Mean reward: {:.3}", mean);
        }
        Commands::Check => {
            let reports = health::check_dependencies(&config).await;
            for r in &reports {
                let (mark, detail) = match &r.status {
                    health::SubsystemStatus::Healthy(v) => ("ok     ", v),
                    health::SubsystemStatus::Down(why) => ("MISSING", why),
                };
                println!("[{}] {} ({}): {}", mark, r.name, r.required_for, detail);
            }
            if reports.iter().any(|r| !r.status.is_healthy()) {
                warn!("Some features will not work until the missing tools are installed.");
            }
        }
        Commands::Dataset { paths, command } => run_dataset(&config, &paths, command).await?,
    }

    Ok(())
}

async fn fetch_channel(config: &Config, paths: &DatasetPaths, channel: &str) -> anyhow::Result<()> {
    let key = youtube_key(config)?;
    let videos = youtube::YouTubeClient::new(key).channel_videos(channel).await?;
    dataset::save_videos(&paths.videos(), &videos)?;
    info!("[DATASET] Saved {} videos to {}", videos.len(), paths.videos().display());
    Ok(())
}

fn youtube_key(config: &Config) -> anyhow::Result<&str> {
    config
        .youtube_api_key
        .as_deref()
        .context("YOUTUBE_API_KEY is not set")
}

fn load_index(path: &Path) -> anyhow::Result<dataset::DatasetIndex> {
    dataset::read_json(path)
}

async fn run_dataset(config: &Config, paths: &DatasetPaths, command: DatasetCommand) -> anyhow::Result<()> {
    match command {
        DatasetCommand::FetchVideos { channel } => fetch_channel(config, paths, &channel).await?,
        DatasetCommand::FetchPlaylist { playlist, output } => {
            let key = youtube_key(config)?;
            let videos = youtube::YouTubeClient::new(key).playlist_videos(&playlist).await?;
            let out = output.unwrap_or_else(|| paths.playlist_videos());
            dataset::save_videos(&out, &videos)?;
            info!("[DATASET] Saved {} videos to {}", videos.len(), out.display());
        }
        DatasetCommand::Transcripts { ytdlp } => {
            transcripts::download_transcripts(&paths.videos(), &paths.transcripts(), &ytdlp).await?;
        }
        DatasetCommand::Match { repo_url } => {
            matcher::sync_repo(&repo_url, &paths.repo()).await?;
            matcher::match_all(&paths.videos(), &paths.repo())?;
        }
        DatasetCommand::Build => {
            builder::build_dataset(
                &paths.videos_with_code(),
                &paths.transcripts(),
                &paths.repo(),
                &paths.output(),
            )?;
        }
        DatasetCommand::Run {
            skip_videos,
            skip_transcripts,
            skip_code_matching,
            analyze,
        } => {
            if !skip_videos {
                info!("[DATASET] === Step 1: Collecting video metadata ===");
                fetch_channel(config, paths, youtube::DEFAULT_CHANNEL_ID).await?;
            }
            if !skip_transcripts {
                info!("[DATASET] === Step 2: Downloading video transcripts ===");
                transcripts::download_transcripts(&paths.videos(), &paths.transcripts(), "yt-dlp")
                    .await?;
            }
            if !skip_code_matching {
                info!("[DATASET] === Step 3: Matching videos to Manim code ===");
                matcher::sync_repo(matcher::VIDEOS_REPO_URL, &paths.repo()).await?;
                matcher::match_all(&paths.videos(), &paths.repo())?;
            }
            info!("[DATASET] === Step 4: Building the final dataset ===");
            let index = builder::build_dataset(
                &paths.videos_with_code(),
                &paths.transcripts(),
                &paths.repo(),
                &paths.output(),
            )?;
            if analyze {
                info!("[DATASET] === Step 5: Analyzing missing code matches ===");
                let analysis = report::analyze_missing(&index, &paths.work_dir.join("analysis"))?;
                println!("{}", analysis);
            }
        }
        DatasetCommand::ListMissing => {
            print!("{}", report::format_missing(&load_index(&paths.index())?));
        }
        DatasetCommand::Analyze { output } => {
            let analysis = report::analyze_missing(&load_index(&paths.index())?, &output)?;
            println!("{}", analysis);
        }
        DatasetCommand::Quality { seed } => match report::match_quality(&load_index(&paths.index())?, seed) {
            Some(q) => println!("{}", q),
            None => println!("No matched videos found in dataset"),
        },
        DatasetCommand::ManualMatch => {
            let stdin = std::io::stdin();
            let made = manual::ManualMatcher::new(stdin.lock(), std::io::stdout(), &paths.output(), &paths.repo())
                .run()?;
            info!("[DATASET] Manual matching finished with {} new matches", made);
        }
    }
    Ok(())
}
