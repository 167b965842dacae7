use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};
use colored::Colorize;
use std::fs::File;
use std::io::{BufWriter, Write, stdout};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use playtest::browser::{BrowserConfig, BrowserKind, WebDriverProvider};
use playtest::generation::{HttpGenerationClient, NullGenerationClient};
use playtest::orchestrator::{Orchestrator, RunConfig};
use playtest::planner::{GenerationCapability, Planner, default_templates};
use playtest::report;

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum HeadlessMode {
    /// Run browsers in headless mode
    Headless,
    /// Run browsers with visible windows
    Windowed,
}

impl HeadlessMode {
    const fn is_headless(self) -> bool {
        matches!(self, Self::Headless)
    }
}

#[derive(Debug, Parser)]
#[command(name = "playtest", version)]
#[command(about = "Multi-agent functional testing for web games - plan, rank, execute, report")]
struct Args {
    /// Natural-language description of the game under test
    #[arg(long, required_unless_present_any = ["description_file", "list_templates"])]
    description: Option<String>,

    /// Read the game description from a file instead
    #[arg(long, conflicts_with = "description")]
    description_file: Option<PathBuf>,

    /// List the built-in fallback test-case templates and exit
    #[arg(long)]
    list_templates: bool,

    /// Maximum number of candidate cases to generate
    #[arg(long, default_value_t = 10)]
    max_cases: usize,

    /// Execute only the top N ranked cases (default: all)
    #[arg(long)]
    execute: Option<usize>,

    /// Concurrent browser sessions during execution
    #[arg(long, default_value_t = 3)]
    concurrency: usize,

    /// Run-level deadline in seconds for the execution phase
    #[arg(long, default_value_t = 300)]
    timeout_secs: u64,

    /// Cut in-flight executions off at the deadline instead of letting them finish
    #[arg(long)]
    force_terminate: bool,

    /// Output report format
    #[arg(long, default_value = "console")]
    #[arg(value_parser = ["console", "json", "markdown"])]
    report: String,

    /// Optional path to write the report output instead of stdout
    #[arg(long)]
    output: Option<PathBuf>,

    /// Browser to execute against
    #[arg(long, value_enum, default_value_t = BrowserKind::Chrome)]
    browser: BrowserKind,

    /// Run headless where supported
    #[arg(long, value_enum, default_value_t = HeadlessMode::Headless)]
    headless: HeadlessMode,

    /// Connect to a Selenium Grid/Appium hub instead of local drivers
    #[arg(long)]
    hub: Option<String>,

    /// Base URL of the game under test
    #[arg(long, default_value = "http://localhost:5173")]
    base_url: String,

    /// Artifacts directory for screenshots
    #[arg(long, default_value = "target/test-artifacts")]
    artifacts_dir: String,

    /// Scenario-generation endpoint; omitted = fallback templates only.
    /// Bearer token read from PLAYTEST_GENERATION_KEY.
    #[arg(long)]
    generation_url: Option<String>,

    /// Per-request timeout for the generation endpoint
    #[arg(long, default_value_t = 60)]
    generation_timeout_secs: u64,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    if args.list_templates {
        return list_templates(&args);
    }

    println!("{}", "🎮 Playtest Multi-Agent Game Tester".bright_cyan().bold());
    println!("{}", "===================================".cyan());

    let description = load_description(&args)?;
    let capability = build_capability(&args)?;
    let planner = Planner::new(capability);
    let run_config = build_run_config(&args);

    let run_id_seed = chrono::Utc::now().format("%Y%m%dT%H%M%S").to_string();
    let provider = Arc::new(WebDriverProvider::new(
        args.browser,
        BrowserConfig {
            headless: args.headless.is_headless(),
            implicit_wait_secs: 3,
            remote_hub: args.hub.clone(),
        },
        args.base_url.clone(),
        args.artifacts_dir.clone(),
        &run_id_seed,
    ));

    println!(
        "🧭 Target: {} via {} ({} cases max, budget {})",
        args.base_url.bold(),
        args.browser.label(),
        args.max_cases,
        args.execute
            .map_or_else(|| "all".to_string(), |n| n.to_string())
    );

    let orchestrator = Orchestrator::new(planner, provider, run_config);
    let report_doc = orchestrator
        .run(&description)
        .await
        .context("test run aborted")?;

    let mut output_target = OutputTarget::new(args.output.clone())?;
    match args.report.as_str() {
        "json" => report::render_json(output_target.writer(), &report_doc)?,
        "markdown" => report::render_markdown(output_target.writer(), &report_doc)?,
        _ => report::render_console(output_target.writer(), &report_doc)?,
    }
    output_target.flush_inner()?;

    if args.verbose {
        println!("🗂  Artifacts under {}/{run_id_seed}", args.artifacts_dir);
    }

    if report::has_findings(&report_doc) {
        std::process::exit(1);
    }
    Ok(())
}

fn load_description(args: &Args) -> Result<String> {
    if let Some(description) = &args.description {
        return Ok(description.clone());
    }
    if let Some(path) = &args.description_file {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        if text.trim().is_empty() {
            bail!("description file {} is empty", path.display());
        }
        return Ok(text);
    }
    bail!("either --description or --description-file is required");
}

fn build_capability(args: &Args) -> Result<Box<dyn GenerationCapability>> {
    match &args.generation_url {
        Some(url) => {
            let api_key = std::env::var("PLAYTEST_GENERATION_KEY").ok();
            let client = HttpGenerationClient::new(
                url.clone(),
                api_key,
                Duration::from_secs(args.generation_timeout_secs),
            )?;
            Ok(Box::new(client))
        }
        None => {
            log::info!("no generation endpoint configured, running on fallback templates");
            Ok(Box::new(NullGenerationClient))
        }
    }
}

fn build_run_config(args: &Args) -> RunConfig {
    RunConfig {
        max_cases: args.max_cases,
        execution_budget: args.execute,
        concurrency: args.concurrency,
        run_timeout: Duration::from_secs(args.timeout_secs),
        force_terminate: args.force_terminate,
    }
}

fn list_templates(args: &Args) -> Result<()> {
    let mut output_target = OutputTarget::new(args.output.clone())?;
    writeln!(output_target.writer(), "Built-in fallback templates:")?;
    for template in default_templates() {
        writeln!(
            output_target.writer(),
            "  {:15} - {} ({} steps)",
            format!("{:?}", template.kind).to_lowercase(),
            template.title,
            template.steps.len()
        )?;
    }
    output_target.flush_inner()?;
    Ok(())
}

enum OutputTarget {
    Stdout(BufWriter<std::io::Stdout>),
    File(BufWriter<File>),
}

impl OutputTarget {
    fn new(path: Option<PathBuf>) -> Result<Self> {
        if let Some(path) = path {
            let file = File::create(&path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            Ok(Self::File(BufWriter::new(file)))
        } else {
            Ok(Self::Stdout(BufWriter::new(stdout())))
        }
    }

    fn writer(&mut self) -> &mut dyn Write {
        match self {
            Self::Stdout(w) => w,
            Self::File(w) => w,
        }
    }

    fn flush_inner(&mut self) -> std::io::Result<()> {
        match self {
            Self::Stdout(w) => w.flush(),
            Self::File(w) => w.flush(),
        }
    }
}
