//! Terminal front-end for DreamGen.

use async_trait::async_trait;
use clap::{Parser, ValueEnum};
use dreamgen::session::PRO_KEY_REQUIRED_MESSAGE;
use dreamgen::{
    ActivationPolicy, AspectRatio, CredentialGate, CredentialSelector, CredentialSlot,
    GalleryEntry, GeminiProvider, GenerationSettings, ImageProvider, PremiumToggle, QualityTier, ResolutionTier, Session,
    Studio, Submission,
};
use std::io::{self, Write};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "dreamgen")]
#[command(about = "Turn prompts into images with Gemini (Flash or Pro engine)")]
#[command(version)]
struct Cli {
    /// Generate a single image from this prompt and exit
    #[arg(short, long)]
    prompt: Option<String>,

    /// Aspect ratio
    #[arg(long, value_enum, default_value = "1:1")]
    aspect_ratio: AspectRatioArg,

    /// Start with the Pro engine enabled
    #[arg(long)]
    pro: bool,

    /// Output resolution (Pro engine only)
    #[arg(long, value_enum, default_value = "1K")]
    resolution: ResolutionArg,

    /// Directory images are saved into
    #[arg(short, long, default_value = ".")]
    output_dir: PathBuf,

    /// Treat a finished key prompt as success without re-checking
    #[arg(long)]
    trust_key_prompt: bool,

    /// Output as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum AspectRatioArg {
    #[value(name = "1:1")]
    Square,
    #[value(name = "3:4")]
    Portrait,
    #[value(name = "4:3")]
    Landscape,
    #[value(name = "9:16")]
    Story,
    #[value(name = "16:9")]
    Cinematic,
}

impl From<AspectRatioArg> for AspectRatio {
    fn from(arg: AspectRatioArg) -> Self {
        match arg {
            AspectRatioArg::Square => AspectRatio::Square,
            AspectRatioArg::Portrait => AspectRatio::Portrait,
            AspectRatioArg::Landscape => AspectRatio::Landscape,
            AspectRatioArg::Story => AspectRatio::Story,
            AspectRatioArg::Cinematic => AspectRatio::Cinematic,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ResolutionArg {
    #[value(name = "1K")]
    OneK,
    #[value(name = "2K")]
    TwoK,
    #[value(name = "4K")]
    FourK,
}

impl From<ResolutionArg> for ResolutionTier {
    fn from(arg: ResolutionArg) -> Self {
        match arg {
            ResolutionArg::OneK => ResolutionTier::OneK,
            ResolutionArg::TwoK => ResolutionTier::TwoK,
            ResolutionArg::FourK => ResolutionTier::FourK,
        }
    }
}

/// Asks for an API key on the terminal and stores it in the shared slot.
struct TerminalKeySelector {
    slot: CredentialSlot,
}

#[async_trait]
impl CredentialSelector for TerminalKeySelector {
    async fn has_active_credential(&self) -> dreamgen::Result<bool> {
        Ok(self.slot.is_set())
    }

    async fn request_credential_selection(&self) -> dreamgen::Result<()> {
        eprint!("Paste a paid Gemini API key (empty to cancel): ");
        io::stderr().flush()?;
        match read_line().await? {
            Some(key) if !key.trim().is_empty() => self.slot.set(key),
            _ => eprintln!("Key selection cancelled."),
        }
        Ok(())
    }
}

async fn read_line() -> io::Result<Option<String>> {
    tokio::task::spawn_blocking(|| {
        let mut line = String::new();
        match io::stdin().read_line(&mut line)? {
            0 => Ok(None),
            _ => Ok(Some(line.trim_end_matches(['\r', '\n']).to_string())),
        }
    })
    .await
    .map_err(io::Error::other)?
}

fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(io::stderr)
        .init();
}

type TerminalStudio = Studio<GeminiProvider, TerminalKeySelector>;

/// A line typed at the interactive prompt.
#[derive(Debug, PartialEq, Eq)]
enum Input<'a> {
    Prompt(&'a str),
    Command { name: &'a str, arg: Option<&'a str> },
}

/// Lines starting with `:` are commands; `::` escapes a literal leading colon.
fn parse_line(line: &str) -> Input<'_> {
    let line = line.trim();
    if line.starts_with("::") {
        return Input::Prompt(&line[1..]);
    }
    match line.strip_prefix(':') {
        Some(command) => {
            let mut words = command.split_whitespace();
            Input::Command {
                name: words.next().unwrap_or_default(),
                arg: words.next(),
            }
        }
        None => Input::Prompt(line),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let slot = CredentialSlot::from_env();
    let provider = GeminiProvider::builder().credentials(slot.clone()).build()?;
    let policy = if cli.trust_key_prompt {
        ActivationPolicy::Optimistic
    } else {
        ActivationPolicy::Verified
    };
    let gate = CredentialGate::new(TerminalKeySelector { slot }).with_policy(policy);

    let settings = GenerationSettings::default()
        .with_aspect_ratio(cli.aspect_ratio.into())
        .with_resolution_tier(cli.resolution.into());
    let mut studio = Studio::with_session(Session::with_settings(settings), provider, gate);

    if cli.pro {
        report_toggle(studio.set_premium(true).await);
    }

    match cli.prompt.clone() {
        Some(prompt) => run_once(&mut studio, prompt, &cli).await,
        None => run_interactive(&mut studio, &cli).await,
    }
}

async fn run_once(studio: &mut TerminalStudio, prompt: String, cli: &Cli) -> anyhow::Result<()> {
    match studio.generate(prompt).await {
        Submission::Generated(_) => save_entry(studio, 0, cli),
        Submission::Skipped => anyhow::bail!("prompt is empty"),
        Submission::Failed(_) => {
            let message = studio.session().error().unwrap_or_default().to_string();
            anyhow::bail!(message)
        }
    }
}

async fn run_interactive(studio: &mut TerminalStudio, cli: &Cli) -> anyhow::Result<()> {
    println!("DreamGen - describe what you want to create (:help for commands)");
    print_status(studio.session());

    loop {
        print!("> ");
        io::stdout().flush()?;
        let Some(line) = read_line().await? else {
            break;
        };
        let prompt = match parse_line(&line) {
            Input::Prompt(prompt) => prompt,
            Input::Command { name, arg } => {
                match (name, arg) {
                    ("q" | "quit", _) => break,
                    ("help", _) => print_help(),
                    ("ratio", Some(value)) => match value.parse::<AspectRatio>() {
                        Ok(ratio) => studio.select_aspect_ratio(ratio),
                        Err(e) => eprintln!("{e}"),
                    },
                    ("res", Some(value)) => match value.parse::<ResolutionTier>() {
                        Ok(tier) => studio.select_resolution(tier),
                        Err(e) => eprintln!("{e}"),
                    },
                    ("pro", Some("on")) => report_toggle(studio.set_premium(true).await),
                    ("pro", Some("off")) => report_toggle(studio.set_premium(false).await),
                    ("pro", None) => report_toggle(studio.toggle_premium().await),
                    ("gallery", _) => print_gallery(studio.session(), cli.json)?,
                    ("save", Some(value)) => match value.parse::<usize>() {
                        Ok(n) if n >= 1 => {
                            if let Err(e) = save_entry(studio, n - 1, cli) {
                                eprintln!("{e}");
                            }
                        }
                        _ => eprintln!("usage: :save N (1 = newest)"),
                    },
                    _ => eprintln!("unknown command, try :help"),
                }
                print_status(studio.session());
                continue;
            }
        };

        studio.set_prompt(prompt);
        if !studio.session().can_submit() {
            continue;
        }
        println!("Brewing your masterpiece...");
        match studio.submit().await {
            Submission::Generated(_) => {
                let gallery = studio.session().gallery();
                if let Some(entry) = gallery.latest() {
                    println!(
                        "Done in {} via {}. {} images generated. Use :save 1 to download it.",
                        format_duration(entry),
                        studio.provider().name(),
                        gallery.len()
                    );
                }
            }
            Submission::Failed(_) => {
                if let Some(error) = studio.session().error() {
                    eprintln!("{error}");
                }
            }
            Submission::Skipped => {}
        }
    }

    Ok(())
}

fn report_toggle(outcome: PremiumToggle) {
    match outcome {
        PremiumToggle::Enabled => println!("{}", QualityTier::Premium.engine_label()),
        PremiumToggle::Disabled => println!("{}", QualityTier::Standard.engine_label()),
        PremiumToggle::Declined => eprintln!("{PRO_KEY_REQUIRED_MESSAGE}"),
        PremiumToggle::Failed => eprintln!("Key selection failed; keeping the current engine."),
    }
}

fn print_status(session: &Session) {
    let settings = session.settings();
    let resolution = settings
        .effective_resolution()
        .map(|r| format!(", {r} Res"))
        .unwrap_or_default();
    println!(
        "[{} | {}{}]",
        settings.aspect_ratio.label(),
        settings.quality_tier.engine_label(),
        resolution
    );
}

fn print_help() {
    println!("  <text>          generate an image from the prompt");
    println!("  ::text          prompt that starts with a colon");
    println!("  :ratio R        aspect ratio, one of 1:1 3:4 4:3 9:16 16:9");
    println!("  :pro [on|off]   toggle the Pro engine");
    println!("  :res 1K|2K|4K   resolution (Pro engine only)");
    println!("  :gallery        list generated images");
    println!("  :save N         save image N (1 = newest)");
    println!("  :quit           exit");
}

fn print_gallery(session: &Session, json_output: bool) -> anyhow::Result<()> {
    let gallery = session.gallery();
    if json_output {
        let entries: Vec<_> = gallery
            .iter()
            .map(|e| {
                serde_json::json!({
                    "id": e.id(),
                    "prompt": e.prompt(),
                    "created_at": e.created_at(),
                    "aspect_ratio": e.aspect_ratio(),
                    "model": e.model_label(),
                    "model_id": e.metadata().model,
                    "duration_ms": e.metadata().duration_ms,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if gallery.is_empty() {
        println!("Start prompting to see your creations here");
        return Ok(());
    }
    println!("Your Creations ({} images generated)", gallery.len());
    for (i, entry) in gallery.iter().enumerate() {
        println!(
            "  {:>2}. [{} | {}] {} - {}",
            i + 1,
            entry.aspect_ratio(),
            entry.model_label(),
            entry.created_at().format("%H:%M:%S"),
            entry.prompt()
        );
    }
    Ok(())
}

fn save_entry(studio: &TerminalStudio, index: usize, cli: &Cli) -> anyhow::Result<()> {
    let Some(entry) = studio.session().gallery().get(index) else {
        anyhow::bail!("no image #{}", index + 1);
    };
    std::fs::create_dir_all(&cli.output_dir)?;
    let path = entry.save(&cli.output_dir)?;

    if cli.json {
        let result = serde_json::json!({
            "type": "image",
            "success": true,
            "id": entry.id(),
            "output": path.display().to_string(),
            "prompt": entry.prompt(),
            "aspect_ratio": entry.aspect_ratio(),
            "model": entry.model_label(),
            "model_id": entry.metadata().model,
            "duration_ms": entry.metadata().duration_ms,
            "provider": studio.provider().name(),
        });
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!(
            "Saved image: {} via {} ({}, {})",
            path.display(),
            entry.model_label(),
            studio.provider().name(),
            format_duration(entry)
        );
    }
    Ok(())
}

fn format_duration(entry: &GalleryEntry) -> String {
    match entry.metadata().duration_ms {
        Some(ms) => format!("{:.1}s", ms as f64 / 1000.0),
        None => "unknown time".to_string(),
    }
}
