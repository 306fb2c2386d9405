use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand, ValueEnum};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use viltrum_offline::app::{PreloadOptions, Preloader};
use viltrum_offline::config::ConfigLoader;
use viltrum_offline::domain::{Lang, UserProfile};
use viltrum_offline::error::PreloadError;
use viltrum_offline::media::{MediaClient, MediaHttpClient};
use viltrum_offline::output::{ConsoleProgress, JsonOutput, OutputMode, PlainProgress};
use viltrum_offline::progress::ProgressSink;
use viltrum_offline::speech::{SpeechClient, SpeechHttpClient};
use viltrum_offline::store::Store;

#[derive(Parser)]
#[command(name = "viltrum-offline")]
#[command(about = "Preload workout media for fully offline use")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true)]
    non_interactive: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Download everything the user's workouts need offline")]
    Preload(PreloadArgs),
    #[command(about = "Report whether a preload is needed for a user")]
    Check(CheckArgs),
    #[command(about = "Summarize what the cache currently holds")]
    Status,
    #[command(about = "Print the path of one cached resource")]
    Show(ShowArgs),
    #[command(about = "Empty the offline cache")]
    Clear,
}

#[derive(Args)]
struct PreloadArgs {
    /// Path to the user profile JSON.
    profile: String,

    #[arg(long)]
    config: Option<String>,

    #[arg(long)]
    skip_images: bool,

    #[arg(long)]
    skip_audio: bool,

    #[arg(long)]
    skip_clips: bool,

    #[arg(long)]
    skip_nutrition: bool,

    /// Preload even when the cache is fresh.
    #[arg(long)]
    force: bool,
}

#[derive(Args)]
struct CheckArgs {
    /// Path to the user profile JSON.
    profile: String,

    #[arg(long)]
    config: Option<String>,
}

#[derive(Args)]
struct ShowArgs {
    kind: ShowKind,

    /// Image URL, spoken text, clip name or user email, depending on kind.
    key: String,
}

#[derive(Clone, Copy, ValueEnum)]
enum ShowKind {
    Image,
    Audio,
    Nutrition,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(preload) = report.downcast_ref::<PreloadError>() {
            return ExitCode::from(map_exit_code(preload));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &PreloadError) -> u8 {
    match error {
        PreloadError::NotCached(_)
        | PreloadError::ConfigRead(_)
        | PreloadError::ProfileRead(_) => 2,
        PreloadError::SpeechHttp(_)
        | PreloadError::SpeechStatus { .. }
        | PreloadError::MediaHttp(_)
        | PreloadError::MediaStatus { .. } => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.non_interactive {
        OutputMode::NonInteractive
    } else {
        OutputMode::Interactive
    };

    let store = Store::open().into_diagnostic()?;

    match cli.command {
        Commands::Preload(args) => run_preload(args, store, output_mode),
        Commands::Check(args) => run_check(args, store),
        Commands::Status => run_status(store),
        Commands::Show(args) => run_show(args, store),
        Commands::Clear => run_clear(store),
    }
}

fn run_preload(args: PreloadArgs, store: Store, output_mode: OutputMode) -> miette::Result<()> {
    let config = ConfigLoader::resolve(args.config.as_deref()).into_diagnostic()?;
    let profile = load_profile(&args.profile).into_diagnostic()?;

    let speech = SpeechHttpClient::new(&config.speech_endpoint).into_diagnostic()?;
    let media = MediaHttpClient::new().into_diagnostic()?;
    let preloader = Preloader::new(store, speech, media, config);

    let options = PreloadOptions {
        skip_images: args.skip_images,
        skip_audio: args.skip_audio,
        skip_fixed_clips: args.skip_clips,
        skip_nutrition: args.skip_nutrition,
        force_update: args.force,
    };

    let sink: Box<dyn ProgressSink> = match output_mode {
        OutputMode::Interactive => Box::new(ConsoleProgress::new()),
        OutputMode::NonInteractive => Box::new(PlainProgress),
    };
    let outcome = preloader
        .preload_all(&profile, options, sink.as_ref())
        .into_diagnostic()?;
    JsonOutput::print_preload(&outcome).into_diagnostic()?;
    Ok(())
}

fn run_check(args: CheckArgs, store: Store) -> miette::Result<()> {
    let config = ConfigLoader::resolve(args.config.as_deref()).into_diagnostic()?;
    let profile = load_profile(&args.profile).into_diagnostic()?;
    let preloader = Preloader::new(store, NopSpeech, NopMedia, config);
    let check = preloader.check(&profile.email).into_diagnostic()?;
    JsonOutput::print_check(&check).into_diagnostic()?;
    Ok(())
}

fn run_status(store: Store) -> miette::Result<()> {
    let preloader = Preloader::new(store, NopSpeech, NopMedia, Default::default());
    let status = preloader.cache_status().into_diagnostic()?;
    JsonOutput::print_status(&status).into_diagnostic()?;
    Ok(())
}

fn run_show(args: ShowArgs, store: Store) -> miette::Result<()> {
    let preloader = Preloader::new(store, NopSpeech, NopMedia, Default::default());
    let path = match args.kind {
        ShowKind::Image => preloader.cached_image(&args.key),
        ShowKind::Audio => preloader.cached_audio(&args.key),
        ShowKind::Nutrition => preloader.cached_nutrition(&args.key),
    };
    let path = path.ok_or_else(|| PreloadError::NotCached(args.key.clone()))?;
    println!("{path}");
    Ok(())
}

fn run_clear(store: Store) -> miette::Result<()> {
    let preloader = Preloader::new(store, NopSpeech, NopMedia, Default::default());
    preloader.clear_cache().into_diagnostic()?;
    println!("offline cache cleared");
    Ok(())
}

fn load_profile(path: &str) -> Result<UserProfile, PreloadError> {
    let path = PathBuf::from(path);
    let content =
        fs::read_to_string(&path).map_err(|_| PreloadError::ProfileRead(path.clone()))?;
    serde_json::from_str(&content).map_err(|err| PreloadError::ProfileParse(err.to_string()))
}

#[derive(Clone, Copy)]
struct NopSpeech;
struct NopMedia;

impl SpeechClient for NopSpeech {
    fn synthesize(&self, _text: &str, _lang: Lang) -> Result<Vec<u8>, PreloadError> {
        Err(PreloadError::SpeechHttp(
            "speech client not configured".to_string(),
        ))
    }
}

impl MediaClient for NopMedia {
    fn download(&self, _url: &str) -> Result<Vec<u8>, PreloadError> {
        Err(PreloadError::MediaHttp(
            "media client not configured".to_string(),
        ))
    }
}
