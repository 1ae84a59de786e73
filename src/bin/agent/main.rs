use anyhow::{Context, Result, anyhow};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use browser_pilot::{
    Action, ActionExecutor, Agent, BrowserConfig, ChatCompletionsClient, ChromeBrowser, Config,
    DecisionClient, DecisionRequest, RunOutcome,
};
use clap::{Args, Parser, Subcommand};
use dotenvy::dotenv;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "agent", version, about = "Let a language model drive Chrome through a web task")]
struct Cli {
    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a task to completion
    Run(RunArgs),
    /// Ask the model for a single decision, without a browser
    Decide(DecideArgs),
    /// Open a page in Chrome and keep it up for a few seconds
    Open(OpenArgs),
}

#[derive(Args)]
struct RunArgs {
    /// What the agent should accomplish
    #[arg(short, long)]
    task: String,
    /// Page to start from
    #[arg(short, long)]
    url: Option<String>,
    #[arg(long)]
    max_steps: Option<usize>,
    #[arg(long)]
    model: Option<String>,
    #[arg(long)]
    temperature: Option<f32>,
    #[arg(long)]
    headless: bool,
    #[arg(long)]
    screenshot_dir: Option<PathBuf>,
    /// Print the whole outcome, history included, as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct DecideArgs {
    #[arg(short, long)]
    prompt: String,
    /// HTML to include as page context
    #[arg(long)]
    html_file: Option<PathBuf>,
    /// PNG to include as the screenshot
    #[arg(long)]
    image: Option<PathBuf>,
}

#[derive(Args)]
struct OpenArgs {
    #[arg(short, long)]
    url: String,
    #[arg(long, default_value_t = 5)]
    hold_secs: u64,
    #[arg(long)]
    headless: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.quiet);

    match cli.command {
        Command::Run(args) => run(args, cli.quiet).await,
        Command::Decide(args) => decide(args).await,
        Command::Open(args) => open(args).await,
    }
}

fn init_tracing(quiet: bool) {
    let default = if quiet { "warn" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(args: RunArgs, quiet: bool) -> Result<ExitCode> {
    let mut config = Config::from_env()?;
    if let Some(max_steps) = args.max_steps {
        config.agent.max_steps = max_steps;
    }
    if let Some(model) = args.model {
        config.model.model = model;
    }
    if let Some(temperature) = args.temperature {
        config.model.temperature = temperature;
    }
    if let Some(dir) = args.screenshot_dir {
        config.agent.screenshot_dir = Some(dir);
    }
    config.browser.headless |= args.headless;
    config.agent.verbose &= !quiet;
    config.validate()?;

    let mut agent = Agent::launch(&config).await?;
    let outcome = agent.run(&args.task, args.url.as_deref()).await;
    agent.close();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        print_outcome(&args.task, &outcome);
    }

    Ok(if outcome.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn print_outcome(task: &str, outcome: &RunOutcome) {
    println!("Task: {task}");
    println!("Success: {}", outcome.success);
    println!("Message: {}", outcome.message);
    println!("Steps taken: {}", outcome.steps);
    for entry in outcome.history.iter() {
        let mark = if entry.result.success { "ok" } else { "FAILED" };
        println!(
            "  [{}] {} -> {mark}: {}",
            entry.step, entry.action, entry.result.message
        );
    }
}

async fn decide(args: DecideArgs) -> Result<ExitCode> {
    let config = Config::from_env()?;
    let mut client = ChatCompletionsClient::new(config.model)?;

    let html = match &args.html_file {
        Some(path) => Some(
            tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("could not read {}", path.display()))?,
        ),
        None => None,
    };
    let screenshot = match &args.image {
        Some(path) => Some(STANDARD.encode(
            tokio::fs::read(path)
                .await
                .with_context(|| format!("could not read {}", path.display()))?,
        )),
        None => None,
    };

    let decision = client
        .decide(&DecisionRequest {
            prompt: args.prompt,
            html,
            screenshot,
        })
        .await;
    println!("{}", serde_json::to_string_pretty(&decision.to_value())?);

    Ok(match decision.fault() {
        Some(_) => ExitCode::FAILURE,
        None => ExitCode::SUCCESS,
    })
}

async fn open(args: OpenArgs) -> Result<ExitCode> {
    let browser_config = BrowserConfig {
        headless: args.headless,
        ..Default::default()
    };

    let mut browser = tokio::task::spawn_blocking(move || ChromeBrowser::launch(&browser_config))
        .await
        .map_err(|e| anyhow!("Browser launch panicked: {e}"))??;

    let result = browser.execute(&Action::Navigate { url: args.url }).await;
    println!("{}", result.message);
    if !result.success {
        return Ok(ExitCode::FAILURE);
    }

    info!("Browser will close in {} seconds", args.hold_secs);
    tokio::time::sleep(Duration::from_secs(args.hold_secs)).await;
    Ok(ExitCode::SUCCESS)
}
