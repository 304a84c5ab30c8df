//! Game Agent - VLM-driven mini-game automation over ADB
//!
//! Run with: cargo run --bin game-agent -- play --devices emulator-5554

use anyhow::{bail, Context};
use game_agent::adb::AdbConnector;
use game_agent::model::{ModelBackend, ModelClient, ModelConfig};
use game_agent::{AppSettings, GameMode, PerceptionPort, SessionConfig, SessionDriver};
use std::env;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const USAGE: &str = "\
Usage: game-agent <play|collect> [options]

Options:
  --devices ID...         Device ids (host:port ids are adb-connected first).
                          Defaults to every attached device.
  --episodes N            Episodes per device (play: 1, collect: 10)
  --output-dir DIR        Output root (play: game_screenshots, collect: game_data_raw)
  --parallel              Run devices concurrently
  --max-workers N         Concurrent devices in parallel mode (default 4)
  --seed N                Seed for random decisions in collect mode
  --lang cn|en            Prompt language
  --model-type ollama|vllm
  --api-url URL
  --model-name NAME
  --debug                 Verbose logging
  --save-settings         Remember model, language, adb and worker options
";

/// Command line, after parsing. Unset options fall back to env and settings.
#[derive(Debug, Default, PartialEq)]
struct CliArgs {
    mode: Option<GameMode>,
    devices: Vec<String>,
    episodes: Option<u32>,
    output_dir: Option<String>,
    parallel: bool,
    max_workers: Option<usize>,
    seed: Option<u64>,
    lang: Option<String>,
    model_type: Option<String>,
    api_url: Option<String>,
    model_name: Option<String>,
    debug: bool,
    save_settings: bool,
    help: bool,
}

impl CliArgs {
    fn parse(args: &[String]) -> anyhow::Result<Self> {
        let mut parsed = Self::default();
        let mut iter = args.iter().peekable();

        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "-h" | "--help" => parsed.help = true,
                "--devices" => {
                    while let Some(id) = iter.next_if(|next| !next.starts_with("--")) {
                        parsed.devices.push(id.clone());
                    }
                    if parsed.devices.is_empty() {
                        bail!("--devices needs at least one device id");
                    }
                }
                "--episodes" => parsed.episodes = Some(parse_value(arg, iter.next())?),
                "--output-dir" => parsed.output_dir = Some(value(arg, iter.next())?),
                "--parallel" => parsed.parallel = true,
                "--max-workers" => parsed.max_workers = Some(parse_value(arg, iter.next())?),
                "--seed" => parsed.seed = Some(parse_value(arg, iter.next())?),
                "--lang" => parsed.lang = Some(value(arg, iter.next())?),
                "--model-type" => parsed.model_type = Some(value(arg, iter.next())?),
                "--api-url" => parsed.api_url = Some(value(arg, iter.next())?),
                "--model-name" => parsed.model_name = Some(value(arg, iter.next())?),
                "--debug" => parsed.debug = true,
                "--save-settings" => parsed.save_settings = true,
                other if other.starts_with('-') => bail!("unknown option: {}", other),
                other => {
                    if parsed.mode.is_some() {
                        bail!("unexpected argument: {}", other);
                    }
                    parsed.mode = Some(other.parse()?);
                }
            }
        }

        Ok(parsed)
    }
}

fn value(flag: &str, next: Option<&String>) -> anyhow::Result<String> {
    next.cloned().with_context(|| format!("{} needs a value", flag))
}

fn parse_value<T: std::str::FromStr>(flag: &str, next: Option<&String>) -> anyhow::Result<T> {
    let raw = value(flag, next)?;
    raw.parse().map_err(|_| anyhow::anyhow!("invalid value for {}: {}", flag, raw))
}

/// Saved settings, overridden by environment variables.
fn settings_from_env(mut settings: AppSettings) -> AppSettings {
    if let Ok(v) = env::var("MODEL_TYPE") {
        settings.model_type = v;
    }
    if let Ok(v) = env::var("MODEL_API_URL") {
        settings.api_url = v;
    }
    if let Ok(v) = env::var("MODEL_NAME") {
        settings.model_name = v;
    }
    if let Ok(v) = env::var("AGENT_LANG") {
        settings.lang = v;
    }
    if let Ok(v) = env::var("ADB_PATH") {
        settings.adb_path = v;
    }
    if let Some(v) = env::var("MAX_WORKERS").ok().and_then(|s| s.parse().ok()) {
        settings.max_workers = v;
    }
    settings
}

/// Command line options override everything else.
fn apply_args(mut settings: AppSettings, args: &CliArgs) -> AppSettings {
    if let Some(v) = &args.model_type {
        settings.model_type = v.clone();
    }
    if let Some(v) = &args.api_url {
        settings.api_url = v.clone();
    }
    if let Some(v) = &args.model_name {
        settings.model_name = v.clone();
    }
    if let Some(v) = &args.lang {
        settings.lang = v.clone();
    }
    if let Some(v) = args.max_workers {
        settings.max_workers = v;
    }
    settings
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (ignore errors if file doesn't exist)
    let _ = dotenvy::dotenv();

    let raw: Vec<String> = env::args().skip(1).collect();
    let args = CliArgs::parse(&raw)?;

    let default_level = if args.debug { "game_agent=debug,info" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    if args.help {
        print!("{}", USAGE);
        return Ok(());
    }
    let Some(mode) = args.mode else {
        eprint!("{}", USAGE);
        bail!("missing mode: play or collect");
    };

    let settings = apply_args(settings_from_env(AppSettings::load()), &args);
    if args.save_settings {
        match settings.save() {
            Ok(path) => println!("Settings saved to {}", path.display()),
            Err(e) => eprintln!("⚠️ Could not save settings: {}", e),
        }
    }

    let backend: ModelBackend = settings.model_type.parse()?;
    let model_config = ModelConfig::default()
        .with_backend(backend)
        .with_api_url(&settings.api_url)
        .with_model_name(&settings.model_name);

    let connector = AdbConnector::with_path(&settings.adb_path);
    let devices = if args.devices.is_empty() {
        let attached: Vec<String> = connector
            .list_devices()
            .await?
            .into_iter()
            .filter(|d| d.status == "device")
            .map(|d| d.device_id)
            .collect();
        if attached.is_empty() {
            bail!("no devices attached; pass --devices");
        }
        attached
    } else {
        args.devices.clone()
    };

    let mut config = SessionConfig::for_mode(mode)
        .with_parallel(args.parallel)
        .with_max_workers(settings.max_workers)
        .with_seed(args.seed)
        .with_lang(&settings.lang);
    if let Some(episodes) = args.episodes {
        config = config.with_episodes(episodes);
    }
    if let Some(dir) = &args.output_dir {
        config = config.with_output_dir(dir);
    }

    let perception: Option<Arc<dyn PerceptionPort>> = match mode {
        GameMode::Play => Some(Arc::new(ModelClient::new(model_config)?)),
        GameMode::Collect => None,
    };

    println!("🎮 Game Agent - {} mode", mode);
    println!("================================================");
    println!("Devices: {}", devices.join(", "));
    println!("Episodes per device: {}", config.episodes_per_device);
    println!("Output: {}", config.output_dir.display());
    if let Some(p) = &perception {
        println!("Model: {} @ {}", p.describe(), settings.api_url);
        println!("Language: {}", settings.lang);
    }
    if config.parallel {
        println!("Parallel: up to {} devices", config.max_workers);
    }
    if let Some(seed) = config.seed {
        println!("Seed: {}", seed);
    }
    println!("================================================\n");

    let driver = SessionDriver::new(config, connector, perception)?;
    let summary = driver.run(&devices).await?;

    println!("\n================================================");
    println!(
        "✅ {}/{} episodes successful, {} rounds in {:.1}s",
        summary.successful_episodes,
        summary.total_episodes_collected,
        summary.total_rounds_collected,
        summary.elapsed_seconds
    );
    for device in &summary.device_summaries {
        match &device.error {
            Some(e) => println!("❌ {}: {}", device.device_id, e),
            None => println!(
                "   {}: {}/{} episodes, {} rounds",
                device.device_id,
                device.successful_episodes,
                device.total_episodes,
                device.total_rounds_collected
            ),
        }
    }
    println!("Data saved to {}", summary.output_dir);

    Ok(())
}
