use std::io::{self, BufRead, Write};
use std::process::ExitCode;

use camino::Utf8PathBuf;
use chrono::TimeDelta;
use clap::{Args, Parser, Subcommand, ValueEnum};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use arxiv_watch::app::{
    self, App, CycleSummary, ProgressEvent, ProgressSink, QueryListing, Stats,
};
use arxiv_watch::asset::AssetHttpClient;
use arxiv_watch::cancel::CancelFlag;
use arxiv_watch::config::{DEFAULT_STATE_FILE, suggested_queries};
use arxiv_watch::discovery::{DEFAULT_BOOTSTRAP_DAYS, DiscoveryOptions, WatermarkPolicy};
use arxiv_watch::domain::author_line;
use arxiv_watch::error::WatchError;
use arxiv_watch::feed::ArxivHttpClient;
use arxiv_watch::notify::{DesktopNotifier, LogNotifier, Notifier};
use arxiv_watch::output::{JsonOutput, OutputMode};
use arxiv_watch::scheduler::Scheduler;
use arxiv_watch::store::{LoadOutcome, WatermarkStore};

const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";
const RED: &str = "\x1b[31m";
const RESET: &str = "\x1b[0m";

#[derive(Parser)]
#[command(name = "arxiv-watch")]
#[command(about = "Watch arXiv queries and download new papers into per-query folders")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true)]
    non_interactive: bool,

    #[arg(long, global = true, default_value = DEFAULT_STATE_FILE)]
    state: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Check now, then keep checking every interval until Ctrl-C")]
    Watch(CycleArgs),
    #[command(about = "Run a single check")]
    Check(CycleArgs),
    #[command(about = "Manage search queries")]
    Queries(QueriesArgs),
    #[command(about = "Show example queries")]
    Suggest,
    #[command(about = "Set the check interval in hours")]
    Interval { hours: u64 },
    #[command(about = "Set the maximum number of results per query")]
    MaxResults { count: u32 },
    #[command(about = "Toggle one sub-folder per query")]
    Organize { mode: Toggle },
    #[command(about = "Set the download directory")]
    DownloadPath { path: String },
    #[command(about = "Show statistics")]
    Stats,
    #[command(about = "Test the connection to arXiv")]
    Test,
    #[command(about = "Forget download history and watermarks")]
    Reset {
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Args, Clone)]
struct CycleArgs {
    #[arg(long, default_value_t = DEFAULT_BOOTSTRAP_DAYS)]
    bootstrap_days: i64,

    #[arg(long)]
    hold_watermark_on_error: bool,
}

impl Default for CycleArgs {
    fn default() -> Self {
        Self {
            bootstrap_days: DEFAULT_BOOTSTRAP_DAYS,
            hold_watermark_on_error: false,
        }
    }
}

#[derive(Args)]
struct QueriesArgs {
    #[command(subcommand)]
    command: Option<QueriesCommand>,
}

#[derive(Subcommand)]
enum QueriesCommand {
    #[command(about = "List search queries")]
    List,
    #[command(about = "Add a search query")]
    Add { query: String },
    #[command(about = "Remove a search query by text or by --index (1-based)")]
    Remove {
        query: Option<String>,
        #[arg(long)]
        index: Option<usize>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Toggle {
    On,
    Off,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<WatchError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &WatchError) -> u8 {
    match error {
        WatchError::InvalidQuery(_)
        | WatchError::QueryNotFound(_)
        | WatchError::QueryIndexOutOfRange(_)
        | WatchError::InvalidSetting(_)
        | WatchError::InvalidPaperId(_) => 2,
        WatchError::FeedHttp(_)
        | WatchError::FeedStatus { .. }
        | WatchError::FeedParse(_)
        | WatchError::AssetHttp(_)
        | WatchError::AssetStatus { .. } => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.non_interactive {
        OutputMode::NonInteractive
    } else {
        OutputMode::Interactive
    };

    let (mut store, outcome) = WatermarkStore::open(Utf8PathBuf::from(&cli.state))?;
    match outcome {
        LoadOutcome::Loaded => {}
        LoadOutcome::Created => eprintln!("{CYAN}created {}{RESET}", store.path()),
        LoadOutcome::Recovered { reason } => eprintln!(
            "{YELLOW}could not load {} ({reason}); using defaults{RESET}",
            store.path()
        ),
    }

    let command = match cli.command {
        Some(command) => command,
        None if matches!(output_mode, OutputMode::Interactive) => {
            Commands::Check(CycleArgs::default())
        }
        None => {
            return Err(miette::Report::msg(
                "command required (try `arxiv-watch --help`)",
            ));
        }
    };

    match command {
        Commands::Watch(args) => match output_mode {
            OutputMode::Interactive => {
                run_watch(&mut store, &args, DesktopNotifier::new(), output_mode)
            }
            OutputMode::NonInteractive => run_watch(&mut store, &args, LogNotifier, output_mode),
        },
        Commands::Check(args) => match output_mode {
            OutputMode::Interactive => {
                run_check(&mut store, &args, DesktopNotifier::new(), output_mode)
            }
            OutputMode::NonInteractive => run_check(&mut store, &args, LogNotifier, output_mode),
        },
        Commands::Queries(args) => run_queries(&mut store, args, output_mode),
        Commands::Suggest => {
            for (query, description) in suggested_queries() {
                println!("  {query:<25} {description}");
            }
            Ok(())
        }
        Commands::Interval { hours } => {
            store.set_check_interval_hours(hours)?;
            store.save()?;
            println!("{GREEN}check interval set to {hours} hours{RESET}");
            Ok(())
        }
        Commands::MaxResults { count } => {
            store.set_max_results(count)?;
            store.save()?;
            println!("{GREEN}max results set to {count}{RESET}");
            Ok(())
        }
        Commands::Organize { mode } => {
            let organize = matches!(mode, Toggle::On);
            store.set_organize_by_query(organize);
            store.save()?;
            let state = if organize { "on" } else { "off" };
            println!("{GREEN}organize by query: {state}{RESET}");
            Ok(())
        }
        Commands::DownloadPath { path } => {
            store.set_download_path(path);
            store.save()?;
            println!("{GREEN}download path set to {}{RESET}", store.download_path());
            Ok(())
        }
        Commands::Stats => {
            let stats = app::collect_stats(&store)?;
            match output_mode {
                OutputMode::NonInteractive => JsonOutput::print_stats(&stats).into_diagnostic(),
                OutputMode::Interactive => {
                    print_stats(&stats);
                    Ok(())
                }
            }
        }
        Commands::Test => run_test(),
        Commands::Reset { yes } => {
            let confirmed = yes
                || (matches!(output_mode, OutputMode::Interactive)
                    && confirm("Reset download history? Papers will be downloaded again")?);
            if !confirmed {
                println!("{YELLOW}reset cancelled{RESET}");
                return Ok(());
            }
            store.reset();
            store.save()?;
            println!("{GREEN}download history reset{RESET}");
            Ok(())
        }
    }
}

fn build_app<N: Notifier>(
    args: &CycleArgs,
    notifier: N,
) -> miette::Result<App<ArxivHttpClient, AssetHttpClient, N>> {
    if args.bootstrap_days <= 0 {
        return Err(
            WatchError::InvalidSetting("--bootstrap-days must be positive".to_string()).into(),
        );
    }
    let options = DiscoveryOptions {
        bootstrap_window: TimeDelta::try_days(args.bootstrap_days).ok_or_else(|| {
            WatchError::InvalidSetting("--bootstrap-days is too large".to_string())
        })?,
        watermark_policy: if args.hold_watermark_on_error {
            WatermarkPolicy::OnSuccess
        } else {
            WatermarkPolicy::Always
        },
    };
    let feed = ArxivHttpClient::new()?;
    let assets = AssetHttpClient::new()?;
    Ok(App::new(feed, assets, notifier).with_options(options))
}

fn run_check<N: Notifier>(
    store: &mut WatermarkStore,
    args: &CycleArgs,
    notifier: N,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let app = build_app(args, notifier)?;
    let cancel = CancelFlag::new();
    cancel.install_ctrlc_handler()?;
    let summary = match output_mode {
        OutputMode::NonInteractive => app.run_cycle(store, &cancel, &JsonOutput)?,
        OutputMode::Interactive => app.run_cycle(store, &cancel, &ConsoleProgress)?,
    };
    report_cycle(&summary, output_mode)
}

fn run_watch<N: Notifier>(
    store: &mut WatermarkStore,
    args: &CycleArgs,
    notifier: N,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let app = build_app(args, notifier)?;
    let cancel = CancelFlag::new();
    cancel.install_ctrlc_handler()?;
    let scheduler = Scheduler::every_hours(store.check_interval_hours())?;
    eprintln!(
        "{CYAN}watching {} queries every {} hours, Ctrl-C to stop{RESET}",
        store.search_queries().len(),
        store.check_interval_hours()
    );

    scheduler.run(&cancel, || {
        let summary = match output_mode {
            OutputMode::NonInteractive => app.run_cycle(store, &cancel, &JsonOutput)?,
            OutputMode::Interactive => app.run_cycle(store, &cancel, &ConsoleProgress)?,
        };
        if let Err(err) = report_cycle(&summary, output_mode) {
            eprintln!("{RED}{err:?}{RESET}");
        }
        Ok(summary)
    });
    Ok(())
}

fn run_test() -> miette::Result<()> {
    let app = build_app(&CycleArgs::default(), LogNotifier)?;
    println!("{CYAN}testing connection to arXiv...{RESET}");
    match app.test_connection()? {
        Some(item) => {
            println!("{GREEN}connection ok{RESET}");
            println!("  title:     {}", truncate(&item.title, 80));
            println!("  authors:   {}", item.author_line());
            println!("  published: {}", item.published.format("%Y-%m-%d"));
        }
        None => println!("{YELLOW}connection ok, but the feed returned no papers{RESET}"),
    }
    Ok(())
}

fn run_queries(
    store: &mut WatermarkStore,
    args: QueriesArgs,
    output_mode: OutputMode,
) -> miette::Result<()> {
    match args.command.unwrap_or(QueriesCommand::List) {
        QueriesCommand::List => {
            let listing = app::list_queries(store);
            match output_mode {
                OutputMode::NonInteractive => JsonOutput::print_queries(&listing).into_diagnostic(),
                OutputMode::Interactive => {
                    print_queries(&listing);
                    Ok(())
                }
            }
        }
        QueriesCommand::Add { query } => {
            if store.add_query(&query)? {
                store.save()?;
                println!("{GREEN}added: {}{RESET}", query.trim());
            } else {
                println!("{YELLOW}already watching: {}{RESET}", query.trim());
            }
            Ok(())
        }
        QueriesCommand::Remove { query, index } => {
            let removed = match (query, index) {
                (Some(query), None) => {
                    store.remove_query(&query)?;
                    query
                }
                (None, Some(index)) => store.remove_query_at(
                    index
                        .checked_sub(1)
                        .ok_or(WatchError::QueryIndexOutOfRange(index))?,
                )?,
                _ => {
                    return Err(miette::Report::msg(
                        "pass either a query or --index, not both",
                    ));
                }
            };
            store.save()?;
            println!("{GREEN}removed: {removed}{RESET}");
            Ok(())
        }
    }
}

struct ConsoleProgress;

impl ProgressSink for ConsoleProgress {
    fn event(&self, event: ProgressEvent) {
        match event.elapsed {
            Some(elapsed) => eprintln!(
                "{CYAN}{} ({} ms){RESET}",
                event.message,
                elapsed.as_millis()
            ),
            None => eprintln!("{CYAN}{}{RESET}", event.message),
        }
    }
}

fn report_cycle(summary: &CycleSummary, output_mode: OutputMode) -> miette::Result<()> {
    match output_mode {
        OutputMode::NonInteractive => JsonOutput::print_cycle(summary).into_diagnostic(),
        OutputMode::Interactive => {
            print_cycle_summary(summary);
            Ok(())
        }
    }
}

fn print_cycle_summary(summary: &CycleSummary) {
    println!("{CYAN}arxiv-watch summary ({}){RESET}", summary.checked_at);
    if summary.first_run {
        println!("{CYAN}first run: backfilled the bootstrap window{RESET}");
    }
    let failed_queries = summary
        .queries
        .iter()
        .filter(|query| query.error.is_some())
        .count();
    println!(
        "  queries: {} ({} failed)",
        summary.queries.len(),
        failed_queries
    );
    println!(
        "  discovered: {}  new: {}  downloaded: {}  already on disk: {}",
        summary.discovered, summary.new, summary.downloaded, summary.reused
    );
    let color = if summary.failed > 0 { RED } else { GREEN };
    println!("{color}  failed: {}{RESET}", summary.failed);
    if summary.cancelled {
        println!("{YELLOW}  stopped early; remaining papers will be picked up next cycle{RESET}");
    }

    for paper in &summary.papers {
        println!("{GREEN}{}{RESET}", "-".repeat(60));
        println!("  title:      {}", paper.title);
        println!("  id:         {}", paper.id);
        println!("  authors:    {}", author_line(&paper.authors));
        let categories = if paper.categories.is_empty() {
            "unknown".to_string()
        } else {
            paper.categories.join(", ")
        };
        println!("  categories: {categories}");
        println!(
            "  published:  {}",
            paper.published.format("%Y-%m-%d %H:%M")
        );
        println!("  summary:    {}...", truncate(&paper.summary, 200));
        println!("  link:       {}", paper.asset_url);
        println!("  file:       {}", paper.path);
    }

    for failure in &summary.failures {
        println!(
            "{RED}  failed {} ({}): {}{RESET}",
            failure.id, failure.query, failure.reason
        );
    }
}

fn print_queries(listing: &QueryListing) {
    println!("{CYAN}search queries ({}){RESET}", listing.queries.len());
    for (position, entry) in listing.queries.iter().enumerate() {
        let checked = entry.last_checked_at.as_deref().unwrap_or("never checked");
        println!(
            "  {}. {}  -> {}/  [{}]",
            position + 1,
            entry.query,
            entry.folder,
            checked
        );
    }
}

fn print_stats(stats: &Stats) {
    println!("{CYAN}statistics{RESET}");
    println!("  state file:        {}", stats.state_file);
    println!("  search queries:    {}", stats.query_count);
    println!("  downloaded papers: {}", stats.downloaded_count);
    println!("  download path:     {}", stats.download_path);
    println!("  check interval:    {} hours", stats.check_interval_hours);
    println!("  max results:       {}", stats.max_results);
    println!("  organize by query: {}", stats.organize_by_query);
    println!("  first run:         {}", stats.first_run);
    match &stats.last_check {
        Some(last) => println!("  last check:        {last}"),
        None => println!("  last check:        never"),
    }
    println!("  PDF files:         {}", stats.pdf_files);
    println!(
        "  total size:        {:.1} MB",
        stats.total_bytes as f64 / 1024.0 / 1024.0
    );
}

fn truncate(value: &str, max_chars: usize) -> String {
    value.chars().take(max_chars).collect()
}

fn confirm(prompt: &str) -> miette::Result<bool> {
    print!("{YELLOW}{prompt} (y/N): {RESET}");
    io::stdout().flush().into_diagnostic()?;
    let mut answer = String::new();
    io::stdin()
        .lock()
        .read_line(&mut answer)
        .into_diagnostic()?;
    Ok(matches!(
        answer.trim().to_lowercase().as_str(),
        "y" | "yes"
    ))
}
