use anyhow::Result;
use clap::Parser;
use jasmine_runner::config::{resolve_options, Cli, OutputFormat};
use jasmine_runner::discovery::discover_with_suffixes;
use jasmine_runner::junit::JunitReporter;
use jasmine_runner::reporter::{ConsoleReporter, JsonReporter, MultiReporter, ResultListener};
use jasmine_runner::runner::{self, exit_code, RunOptions, SharedListener, EXIT_ABORTED};
use jasmine_runner::{signals, watch};
use std::cell::RefCell;
use std::io::IsTerminal;
use std::rc::Rc;
use tracing_subscriber::EnvFilter;

/// Env var holding the log filter (`debug`, `jasmine_runner=trace`, ...)
const LOG_ENV: &str = "JASMINE_RUNNER_LOG";

fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn main() {
    let cli = Cli::parse();
    init_logging();

    let options = match resolve_options(&cli) {
        Ok(options) => options,
        Err(e) => {
            eprintln!("[jasmine-runner] error: {:#}", e);
            std::process::exit(EXIT_ABORTED);
        }
    };

    if cli.list {
        list_files(&options);
        return;
    }

    if cli.watch {
        let code = match run_watch(&cli, &options) {
            Ok(()) => 0,
            Err(e) => {
                eprintln!("[jasmine-runner] error: {:#}", e);
                EXIT_ABORTED
            }
        };
        std::process::exit(code);
    }

    std::process::exit(run_once(&cli, &options));
}

/// Print discovered test files, one root-relative path per line
fn list_files(options: &RunOptions) {
    let discovered = discover_with_suffixes(&options.test_root, &options.suffixes);
    for file in &discovered.files {
        println!("{}", file.label);
    }
    eprintln!("[jasmine-runner] {} test file(s)", discovered.file_count());
}

/// Build the listener stack for one run
fn build_listener(cli: &Cli) -> SharedListener {
    let color = !cli.no_color && std::io::stdout().is_terminal();
    let primary: Box<dyn ResultListener> = match cli.format {
        OutputFormat::Human => Box::new(ConsoleReporter::stdout(color)),
        OutputFormat::Json => Box::new(JsonReporter::stdout()),
    };

    match &cli.junit_xml {
        Some(path) => {
            let junit = JunitReporter::new(path.clone());
            Rc::new(RefCell::new(MultiReporter::new(vec![primary, Box::new(junit)])))
        }
        None => Rc::new(RefCell::new(MultiReporter::new(vec![primary]))),
    }
}

/// Execute one run and map its outcome to an exit code
fn run_once(cli: &Cli, options: &RunOptions) -> i32 {
    let listener = build_listener(cli);
    let outcome = runner::run(options, Rc::clone(&listener));

    if let Err(e) = &outcome {
        tracing::debug!(stage = %e.stage(), "run aborted");
        listener.borrow_mut().on_error(&e.to_string());
    }
    exit_code(&outcome)
}

fn run_watch(cli: &Cli, options: &RunOptions) -> Result<()> {
    signals::install_signal_handlers()?;

    let mut roots = vec![options.test_root.clone()];
    roots.extend(options.source_roots.iter().cloned());

    watch::start_watch_loop(&roots, || {
        run_once(cli, options);
        Ok(())
    })
}
