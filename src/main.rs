use clap::Parser;
use log::{error, info, warn};
use miniplay::player::Player;
use miniplay::utils::config::Config;
use std::path::{Path, PathBuf};

/// miniplay - a minimalist FFmpeg + SDL2 media player
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Media file to play
    #[arg(value_name = "FILE")]
    file: PathBuf,

    /// Log level (trace, debug, info, warn, error, critical, off)
    #[arg(long, value_name = "LEVEL", default_value = "info")]
    loglevel: String,

    /// Write logs to a file under this directory instead of stderr
    #[arg(long, value_name = "DIR")]
    logdir: Option<PathBuf>,
}

fn main() {
    let args = Args::parse();

    if let Err(e) = init_logging(&args.loglevel, args.logdir.as_deref()) {
        eprintln!("failed to initialize logging: {}", e);
        std::process::exit(-1);
    }

    info!("starting miniplay v{}", env!("CARGO_PKG_VERSION"));

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            warn!("config load failed, using defaults: {}", e);
            Config::default()
        }
    };

    if !args.file.exists() {
        error!("file not found: {}", args.file.display());
        std::process::exit(-1);
    }

    let result = Player::new(&args.file, config).and_then(|mut player| player.run());
    if let Err(e) = result {
        error!("playback failed: {}", e);
        std::process::exit(-1);
    }

    info!("playback finished");
}

fn init_logging(level: &str, logdir: Option<&Path>) -> std::io::Result<()> {
    // "critical" exists for familiarity with other players' log
    // surfaces; Rust's log crate tops out at error.
    let level = match level {
        "critical" => "error",
        other => other,
    };

    let mut builder = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level));
    builder.format_timestamp_millis();

    if let Some(dir) = logdir {
        std::fs::create_dir_all(dir)?;
        let file = std::fs::File::create(dir.join("miniplay.log"))?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }

    builder.init();
    Ok(())
}
