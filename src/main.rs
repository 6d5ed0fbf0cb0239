use anyhow::{bail, Context, Result};
use book_cover_generator::input::{self, GenerationOptions};
use book_cover_generator::models::{Config, ImageSize, Quality};
use book_cover_generator::pipeline::{Pipeline, PipelineSettings};
use book_cover_generator::report::render_reports;
use book_cover_generator::share::ShareConfig;
use book_cover_generator::storage::{self, FsCoverStore};
use book_cover_generator::Error;
use clap::{Args, Parser, Subcommand};
use std::io::{IsTerminal, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "book-cover-generator")]
#[command(about = "Generate book cover designs with AI")]
struct CliArgs {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Generate cover descriptions and images for one or more titles.
    Generate(GenerateArgs),
    /// Print a shareable link for the given settings.
    Share(ShareArgs),
}

#[derive(Debug, Args)]
struct SettingsArgs {
    /// Book titles, one per argument.
    #[arg(value_name = "TITLE")]
    titles: Vec<String>,

    /// File with one title per line (`-` reads stdin).
    #[arg(long, value_name = "PATH")]
    titles_file: Option<PathBuf>,

    /// Variations per title, clamped to 1-5.
    #[arg(long, allow_negative_numbers = true)]
    variations: Option<i64>,

    /// standard or hd.
    #[arg(long, value_parser = parse_quality_arg)]
    quality: Option<Quality>,

    /// square, landscape or portrait.
    #[arg(long, value_parser = parse_size_arg)]
    size: Option<ImageSize>,

    /// Replace the default description style prompt.
    #[arg(long, value_name = "PATH")]
    system_prompt_file: Option<PathBuf>,

    /// Seed settings from a shared link; explicit flags win.
    #[arg(long, value_name = "URL")]
    from_share: Option<String>,
}

#[derive(Debug, Args)]
struct GenerateArgs {
    #[command(flatten)]
    settings: SettingsArgs,

    /// Root directory for generated covers (overrides OUTPUT_DIR).
    #[arg(long, value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// Also write a PNG download of every cover into this directory.
    #[arg(long, value_name = "DIR")]
    export_dir: Option<PathBuf>,

    /// OpenAI API key (overrides OPENAI_API_KEY).
    #[arg(long, value_name = "KEY")]
    api_key: Option<String>,

    /// Print results as JSON instead of text.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Args)]
struct ShareArgs {
    #[command(flatten)]
    settings: SettingsArgs,

    /// Base URL for the link (overrides SHARE_BASE_URL).
    #[arg(long, value_name = "URL")]
    base_url: Option<String>,
}

fn parse_quality_arg(input: &str) -> std::result::Result<Quality, String> {
    input.parse()
}

fn parse_size_arg(input: &str) -> std::result::Result<ImageSize, String> {
    input.parse()
}

/// Settings for one session after merging flags with a shared link.
#[derive(Debug)]
struct Session {
    titles: Vec<String>,
    options: GenerationOptions,
    system_prompt: Option<String>,
}

fn resolve_session(args: &SettingsArgs) -> Result<Session> {
    let shared = args
        .from_share
        .as_deref()
        .map(ShareConfig::decode)
        .unwrap_or_default();

    let mut text = args.titles.join("\n");
    if let Some(path) = &args.titles_file {
        text.push('\n');
        text.push_str(&read_titles_file(path)?);
    }
    let mut titles = input::parse_titles(&text);
    if titles.is_empty() {
        titles = shared.titles;
    }

    let system_prompt = match &args.system_prompt_file {
        Some(path) => Some(
            std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read prompt file {}", path.display()))?,
        ),
        None => shared.system_prompt,
    };

    Ok(Session {
        titles,
        options: GenerationOptions::new(
            args.variations
                .or(shared.variations)
                .unwrap_or(input::MIN_VARIATIONS as i64),
            args.quality.or(shared.quality).unwrap_or_default(),
            args.size.or(shared.size).unwrap_or_default(),
        ),
        system_prompt,
    })
}

fn read_titles_file(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .context("Failed to read titles from stdin")?;
        return Ok(text);
    }
    std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read titles file {}", path.display()))
}

/// Flag, then environment, then a one-time prompt when attached to a terminal.
fn resolve_api_key(flag: Option<String>, config: &Config) -> std::result::Result<String, Error> {
    if let Some(key) = flag
        .or_else(|| config.openai_api_key.clone())
        .filter(|key| !key.trim().is_empty())
    {
        return Ok(key.trim().to_string());
    }

    if std::io::stdin().is_terminal() {
        eprint!("Enter your OpenAI API key: ");
        std::io::stderr().flush()?;
        let mut key = String::new();
        std::io::stdin().read_line(&mut key)?;
        let key = key.trim();
        if !key.is_empty() {
            return Ok(key.to_string());
        }
    }

    Err(Error::MissingCredential(
        "OpenAI API key is required (set OPENAI_API_KEY or pass --api-key)".to_string(),
    ))
}

async fn generate(args: GenerateArgs) -> Result<()> {
    let mut config = Config::from_env()?;
    if let Some(dir) = args.output_dir {
        config.output_dir = dir;
    }

    let session = resolve_session(&args.settings)?;
    if session.titles.is_empty() {
        bail!("Please enter at least one book title.");
    }

    let api_key = resolve_api_key(args.api_key, &config)?;

    let requests = input::build_requests(&session.titles, &session.options);
    info!(
        "Generating covers for {} book(s): {} variation(s), {} quality, {} size",
        requests.len(),
        session.options.variations,
        session.options.quality,
        session.options.size
    );
    for request in &requests {
        info!("- {}", request.title);
    }
    if session.system_prompt.is_some() {
        info!("Using custom description generation prompt.");
    }

    let store = FsCoverStore::new(&config.output_dir, storage::new_run_id());
    let settings = PipelineSettings::from_config(&config, session.system_prompt);
    let pipeline = Pipeline::from_config(&config, api_key, store, settings);

    // An aborted batch still shows and exports what was saved before it stopped.
    let outcome = pipeline.execute(&requests).await;
    let reports = &outcome.reports;

    if args.json {
        println!("{}", serde_json::to_string_pretty(reports)?);
    } else {
        print!("{}", render_reports(reports));
        println!("All images saved to '{}'", config.output_dir.display());
    }

    if let Some(export_dir) = &args.export_dir {
        let written = storage::export_downloads(pipeline.store(), reports, export_dir).await?;
        info!(
            "Exported {} download(s) to {}",
            written.len(),
            export_dir.display()
        );
    }

    match outcome.aborted {
        Some(e) => Err(anyhow::Error::new(e).context("Generation stopped early")),
        None => Ok(()),
    }
}

fn share(args: ShareArgs) -> Result<()> {
    let config = Config::from_env()?;
    let session = resolve_session(&args.settings)?;
    let base_url = args.base_url.unwrap_or(config.share_base_url);

    let link = ShareConfig {
        system_prompt: session.system_prompt,
        variations: Some(session.options.variations as i64),
        quality: Some(session.options.quality),
        size: Some(session.options.size),
        titles: session.titles,
    }
    .encode(&base_url)?;

    println!("{}", link);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "book_cover_generator=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = CliArgs::parse();

    let outcome = match args.command {
        Command::Generate(generate_args) => generate(generate_args).await,
        Command::Share(share_args) => share(share_args),
    };

    if let Err(e) = outcome {
        error!("{:#}", e);
        std::process::exit(1);
    }
    Ok(())
}
