use std::process::ExitCode;

use clap::Parser;
use console::style;
use panelmail::batch::fetch_all;
use panelmail::dashboard::resolve_requests;
use panelmail::error::Error;
use panelmail::mailer::send_report;
use panelmail::network;
use panelmail::options::{Cli, ConfigFile};
use panelmail::report::{InlineImage, Report, RunContext};
use panelmail::storage::TempImages;
use tokio::time::Instant;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    // Parse terminal arguments.
    let mut options = Cli::parse();
    init_logging(options.verbose);

    // Load config file and apply values (CLI args take priority).
    let config = match ConfigFile::load(options.config.as_ref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{} {}", style("[ERROR]").red(), e);
            return ExitCode::FAILURE;
        }
    };

    let result = match options.apply_config(&config) {
        Ok(()) => run(&options).await,
        Err(e) => Err(e),
    };

    result.unwrap_or_else(|e| {
        eprintln!("{} {}", style("[ERROR]").red(), e);
        ExitCode::FAILURE
    })
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(options: &Cli) -> Result<ExitCode, Error> {
    // Validate everything before touching the network.
    let selection = options.selection()?;
    let window = options.window(chrono::Local::now().date_naive())?;
    let smtp = options.smtp()?;
    let recipients = options.recipients()?;
    let mut context = RunContext::new(options.sender()?, options.subject(), options.intro());
    let fetch_options = options.fetch_options();
    let work_dir = options.work_dir()?;
    let endpoint = options.endpoint(work_dir.path())?;
    let quiet = options.json;

    let client = network::build_client(&options.client_options())
        .map_err(|e| Error::invalid(format!("could not set up the HTTP client: {e}")))?;

    // Resolve dashboard slugs and panel lists.
    let requests = resolve_requests(selection, &client, &endpoint, quiet).await?;

    // Render all panels concurrently. Images are removed again on every way
    // out of this function, a missed deadline included.
    let _images = TempImages::reserve(work_dir.path(), &requests);
    let start_time = Instant::now();
    let results = fetch_all(&requests, &window, &endpoint, &client, &fetch_options).await?;

    let report = Report::new(
        &results,
        window,
        fetch_options.concurrency_limit,
        start_time.elapsed(),
    );
    if options.json {
        // Print clean JSON to stdout for piping.
        let json = report
            .to_json_string()
            .map_err(|e| Error::invalid(format!("could not serialize the report: {e}")))?;
        println!("{}", json);
    } else {
        report.show_text_report();
    }
    report.ensure_deliverable(options.strict)?;

    if !quiet {
        eprintln!("{} 🧩 Build report mail...", style("[3/4]").dim());
    }
    context.add_results(&results);
    let inline_images = InlineImage::load_all(&results)?;

    if !quiet {
        eprintln!(
            "{} ✉️  Send report to {} recipient(s)...",
            style("[4/4]").dim(),
            recipients.len()
        );
    }
    send_report(&smtp, &context, &recipients, &inline_images).await?;

    Ok(report.exit_code())
}
