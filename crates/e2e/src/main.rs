//! translit-e2e - runs the vector suite against a transliteration widget
//!
//! Exit status: 0 when no case failed, 1 when any case failed (including every
//! case of a run whose browser never launched), 2 when the run itself could
//! not proceed (configuration, vector source, or report errors).

use std::path::PathBuf;

use clap::Parser;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use regex::Regex;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use translit_e2e::config::DriverKind;
use translit_e2e::driver::playwright::{Browser, PlaywrightDriver};
use translit_e2e::driver::simulated::SimulatedDriver;
use translit_e2e::driver::AutomationDriver;
use translit_e2e::{run_suite, vectors, HarnessConfig, HarnessResult, Selection, TestVector};

#[derive(Parser, Debug)]
#[command(name = "translit-e2e")]
#[command(author, version, about = "E2E harness for transliteration widgets", long_about = None)]
struct Args {
    /// Configuration file (TOML); defaults apply when absent
    #[arg(short, long, default_value = "translit-e2e.toml")]
    config: PathBuf,

    /// Page hosting the widget
    #[arg(long)]
    url: Option<String>,

    /// CSS selector of the input field
    #[arg(long)]
    selector: Option<String>,

    /// YAML vector file or directory; the built-in suite when omitted
    #[arg(long)]
    vectors: Option<PathBuf>,

    /// CSV report path
    #[arg(short, long)]
    report: Option<PathBuf>,

    /// JSON summary path
    #[arg(long)]
    summary: Option<PathBuf>,

    /// Automation backend
    #[arg(long, value_enum)]
    driver: Option<DriverKind>,

    /// Browser to launch
    #[arg(long, value_enum)]
    browser: Option<Browser>,

    /// Show the browser window
    #[arg(long)]
    headed: bool,

    /// Run only vectors carrying this tag
    #[arg(short, long)]
    tag: Option<String>,

    /// Run only vectors whose id or name matches this pattern
    #[arg(short, long)]
    grep: Option<String>,

    /// Run a single vector by id
    #[arg(long)]
    id: Option<String>,

    /// List the selected vectors and exit
    #[arg(long)]
    list: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)))
        .with_target(false)
        .init();

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error: cannot start runtime: {}", e);
            std::process::exit(2);
        }
    };

    match rt.block_on(async_main(args)) {
        Ok(true) => std::process::exit(0),
        Ok(false) => std::process::exit(1),
        Err(e) => {
            error!("{}", e);
            eprintln!("Error: {}", e);
            std::process::exit(2);
        }
    }
}

async fn async_main(args: Args) -> HarnessResult<bool> {
    let config = apply_overrides(HarnessConfig::load(&args.config)?, &args);
    config.validate()?;

    let selection = Selection {
        tag: args.tag.clone(),
        pattern: args.grep.as_deref().map(Regex::new).transpose()?,
        id: args.id.clone(),
    };
    let all = match &args.vectors {
        Some(path) => TestVector::load_path(path)?,
        None => vectors::builtin(),
    };
    let selected = selection.apply(all);

    if args.list {
        print_vectors(&selected);
        return Ok(true);
    }

    let summary = run_suite(&config, &selected, || launch_driver(&config)).await?;
    Ok(summary.success())
}

async fn launch_driver(config: &HarnessConfig) -> HarnessResult<Box<dyn AutomationDriver>> {
    match config.driver.kind {
        DriverKind::Playwright => {
            info!("Launching {:?} via Playwright", config.driver.playwright.browser);
            Ok(Box::new(PlaywrightDriver::launch(config.driver.playwright.clone()).await?))
        }
        DriverKind::Simulated => {
            info!("Using the simulated widget");
            Ok(Box::new(SimulatedDriver::new(config.driver.simulated.clone())))
        }
    }
}

fn apply_overrides(mut config: HarnessConfig, args: &Args) -> HarnessConfig {
    if let Some(url) = &args.url {
        config.target.url = url.clone();
    }
    if let Some(selector) = &args.selector {
        config.target.field_selector = selector.clone();
        config.driver.simulated.selector = selector.clone();
    }
    if let Some(report) = &args.report {
        config.report.path = report.clone();
    }
    if let Some(summary) = &args.summary {
        config.report.summary_path = summary.clone();
    }
    if let Some(kind) = args.driver {
        config.driver.kind = kind;
    }
    if let Some(browser) = args.browser {
        config.driver.playwright.browser = browser;
    }
    if args.headed {
        config.driver.playwright.headless = false;
    }
    config
}

fn print_vectors(selected: &[TestVector]) {
    if selected.is_empty() {
        println!("No vectors found.");
        return;
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["ID", "Name", "Size", "Chars", "Expect", "Tags"]);

    for v in selected {
        let expect = if v.known_broken {
            "skip"
        } else if v.expected_has_converted_output {
            "converted"
        } else {
            "unchanged"
        };
        table.add_row(vec![
            v.id.clone(),
            v.name.clone(),
            v.size_class.to_string(),
            v.input_len().to_string(),
            expect.to_string(),
            v.tags.iter().cloned().collect::<Vec<_>>().join(", "),
        ]);
    }

    println!("{table}");
    println!("{} vector(s)", selected.len());
}
