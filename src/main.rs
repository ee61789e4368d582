use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::io::AsyncWriteExt;
use tracing::{error, info};

use bunny_stream_fs::api::http::BunnyStreamClient;
use bunny_stream_fs::core::config::AppConfig;
use bunny_stream_fs::fs::StreamFilesystem;
use bunny_stream_fs::observability::metrics as obs_metrics;
use bunny_stream_fs::resolve::cdn::Quality;
use bunny_stream_fs::resolve::video_id::resolve_video_id_with_prefix;

/// Browse and manage a Bunny Stream library as a filesystem.
#[derive(Debug, Parser)]
#[command(name = "bunnyfs", version, about)]
struct Cli {
    /// Directory holding default.toml and {BUNNYFS_ENV}.toml.
    #[arg(long, env = "BUNNYFS_CONFIG_DIR", default_value = "config")]
    config_dir: PathBuf,

    /// Print Prometheus metrics to stderr on exit.
    #[arg(long)]
    metrics: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List videos in a directory.
    Ls { dir: Option<String> },
    /// List directories at or beneath a directory.
    Dirs { dir: Option<String> },
    /// Create a directory.
    Mkdir { path: String },
    /// Delete a directory.
    Rmdir { path: String },
    /// Upload a local file.
    Put {
        /// Target directory, optionally ending in a file name used as title.
        path: String,
        file: PathBuf,
        /// Explicit video title.
        #[arg(long)]
        name: Option<String>,
    },
    /// Download a video asset.
    Get {
        path: String,
        /// MP4 quality: low, medium, high or a tier such as 720p.
        #[arg(long, conflicts_with_all = ["hls", "original"])]
        quality: Option<String>,
        /// Fetch the adaptive playlist.
        #[arg(long, conflicts_with = "original")]
        hls: bool,
        /// Fetch the original upload.
        #[arg(long)]
        original: bool,
        /// Write to a file instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Delete videos.
    Rm {
        #[arg(required = true)]
        paths: Vec<String>,
    },
    /// Show a video's record.
    Stat { path: String },
    /// Print the CDN URL of a path.
    Url { path: String },
    /// Show which video a path refers to, without any remote call.
    Resolve { path: String },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let metrics_handle = match obs_metrics::install_prometheus_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            eprintln!("failed to install metrics recorder: {e}");
            None
        }
    };

    // Layered: default.toml -> {env}.toml -> env vars
    let config = match AppConfig::load_from_dir(&cli.config_dir) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("failed to load configuration: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    init_tracing(
        &config.observability.log_level,
        &config.observability.log_format,
    );
    obs_metrics::describe_all_metrics();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        library_id = config.stream.library_id,
        hostname = %config.stream.hostname,
        "bunnyfs starting"
    );

    let print_metrics = cli.metrics;
    let code = tokio::select! {
        result = run(cli.command, config) => match result {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                error!(error = %e, "command failed");
                eprintln!("error: {e:#}");
                ExitCode::FAILURE
            }
        },
        _ = tokio::signal::ctrl_c() => {
            info!("interrupted");
            ExitCode::from(130)
        }
    };

    if print_metrics {
        if let Some(handle) = metrics_handle {
            eprintln!("{}", handle.render());
        }
    }
    code
}

async fn run(command: Command, config: AppConfig) -> anyhow::Result<()> {
    if let Command::Resolve { path } = &command {
        let (video_id, prefix) = resolve_video_id_with_prefix(path);
        println!("video_id: {video_id}");
        println!("collection: {}", prefix.as_deref().unwrap_or(""));
        return Ok(());
    }

    let client = BunnyStreamClient::new(&config.stream, &config.http)
        .context("failed to build stream client")?;
    let fs = StreamFilesystem::new(config, client);

    match command {
        Command::Ls { dir } => {
            for file in fs.all_files(dir.as_deref()).await? {
                println!("{file}");
            }
        }
        Command::Dirs { dir } => {
            for directory in fs.all_directories(dir.as_deref()).await {
                println!("{directory}");
            }
        }
        Command::Mkdir { path } => {
            fs.make_directory(&path).await?;
            println!("{path}");
        }
        Command::Rmdir { path } => {
            if !fs.delete_directory(&path).await? {
                anyhow::bail!("platform refused to delete directory {path}");
            }
        }
        Command::Put { path, file, name } => {
            let uploaded = match name {
                Some(name) => {
                    fs.put_file_as(&path, file.clone().into(), Some(name.as_str()))
                        .await?
                }
                None => fs.put_file(&path, &file).await?,
            };
            match uploaded {
                Some(logical) => println!("{logical}"),
                None => anyhow::bail!("upload of {} was rejected", file.display()),
            }
        }
        Command::Get {
            path,
            quality,
            hls,
            original,
            output,
        } => {
            if quality.is_none() && !hls && !original {
                let mut reader = fs.read_stream(&path).await?;
                match output {
                    Some(target) => {
                        let mut file = tokio::fs::File::create(&target)
                            .await
                            .with_context(|| format!("failed to create {}", target.display()))?;
                        tokio::io::copy(&mut reader, &mut file).await?;
                        file.flush().await?;
                    }
                    None => {
                        let mut stdout = tokio::io::stdout();
                        tokio::io::copy(&mut reader, &mut stdout).await?;
                        stdout.flush().await?;
                    }
                }
                return Ok(());
            }

            let content = if hls {
                fs.get_hls(&path).await?
            } else if original {
                fs.get_original(&path).await?
            } else {
                let quality = Quality::parse(quality.as_deref().unwrap_or("high"));
                fs.get_mp4(&path, &quality).await?
            };
            let Some(content) = content else {
                anyhow::bail!("CDN could not serve {path}");
            };
            match output {
                Some(target) => tokio::fs::write(&target, &content)
                    .await
                    .with_context(|| format!("failed to write {}", target.display()))?,
                None => {
                    let mut stdout = tokio::io::stdout();
                    stdout.write_all(&content).await?;
                    stdout.flush().await?;
                }
            }
        }
        Command::Rm { paths } => {
            if !fs.delete_many(&paths[..]).await? {
                anyhow::bail!("platform refused at least one delete");
            }
        }
        Command::Stat { path } => {
            let video = fs.video(&fs.path(&path)).await?;
            println!("{}", serde_json::to_string_pretty(&video)?);
        }
        Command::Url { path } => {
            println!("{}", fs.url(&path).await?);
        }
        Command::Resolve { .. } => {}
    }
    Ok(())
}

fn init_tracing(log_level: &str, log_format: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    // stdout carries command output
    match log_format {
        "json" => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .json()
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_get_with_quality() {
        let cli = Cli::try_parse_from(["bunnyfs", "get", "trips/abc", "--quality", "720p"]).unwrap();
        match cli.command {
            Command::Get { path, quality, .. } => {
                assert_eq!(path, "trips/abc");
                assert_eq!(quality.as_deref(), Some("720p"));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_cli_rejects_conflicting_get_flags() {
        assert!(Cli::try_parse_from(["bunnyfs", "get", "abc", "--hls", "--original"]).is_err());
    }

    #[test]
    fn test_cli_rm_requires_path() {
        assert!(Cli::try_parse_from(["bunnyfs", "rm"]).is_err());
    }

    #[test]
    fn test_cli_global_flags() {
        let cli =
            Cli::try_parse_from(["bunnyfs", "--metrics", "--config-dir", "/etc/bunnyfs", "ls"])
                .unwrap();
        assert!(cli.metrics);
        assert_eq!(cli.config_dir, PathBuf::from("/etc/bunnyfs"));
        assert!(matches!(cli.command, Command::Ls { dir: None }));
    }
}
