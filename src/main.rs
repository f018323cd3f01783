#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::io::{self, IsTerminal};
use std::process::ExitCode;

use clap::Parser;
use netfuzz::cli::Cli;
use netfuzz::console::{ConsoleRenderer, KeypressInterrupt, PlainRenderer};
use netfuzz::interrupt::{Interrupt, NoInterrupt};
use netfuzz::runner::{RunReport, Swarm};
use netfuzz::transport::select_transport;
use netfuzz::FuzzError;
use tracing_subscriber::FmtSubscriber;

fn main() -> ExitCode {
    let cli = Cli::parse();

    // logs go to stderr so they never interleave with the phase display
    let subscriber = FmtSubscriber::builder()
        .with_max_level(cli.log_level())
        .with_writer(io::stderr)
        .finish();
    if let Err(err) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("setting up tracing subscriber failed: {err}");
    }

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) if err.is_fatal() => {
            eprintln!("Fatal error: {err}");
            std::process::abort();
        },
        Err(err) => {
            eprintln!("{err}");
            ExitCode::FAILURE
        },
    }
}

fn run(cli: &Cli) -> Result<(), FuzzError> {
    let config = cli.to_config()?;
    println!("Networking library: {}", config.library.name());
    println!("Number of clients: {}", config.clients);

    println!("Initialization...");
    let transport = select_transport(&config)?;

    println!("Fuzzing...");
    let swarm = Swarm::new(&config);
    let report = if io::stdout().is_terminal() {
        // reserve the display rows before raw mode disables carriage returns
        let renderer = ConsoleRenderer::new()?;
        let interrupt: Box<dyn Interrupt> = if io::stdin().is_terminal() {
            Box::new(KeypressInterrupt::new()?)
        } else {
            Box::new(NoInterrupt)
        };
        swarm.run(transport, renderer, interrupt)?
    } else {
        swarm.run(transport, PlainRenderer::new(io::stdout()), NoInterrupt)?
    };

    println!("Deinitialization...");
    if cli.json {
        print_report(&report)?;
    }
    Ok(())
}

fn print_report(report: &RunReport) -> Result<(), FuzzError> {
    let json = serde_json::to_string_pretty(report).map_err(|err| FuzzError::Console {
        context: format!("failed to encode the run report: {err}"),
    })?;
    println!("{json}");
    Ok(())
}
