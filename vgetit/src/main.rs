use clap::ArgMatches;
use colored::Colorize;
use commands::command_argument_builder;
use tracing_subscriber::EnvFilter;
use vgetit::handlers::{
    handle_init, handle_jobs, handle_rate, handle_retry, handle_scrape, handle_show,
    handle_status, print_banner,
};

mod commands;

#[tokio::main]
async fn main() {
    let cmd = command_argument_builder();
    let chosen_command = cmd.get_matches();
    let quiet = chosen_command.get_flag("quiet");

    init_tracing(quiet);

    if !quiet {
        print_banner();
    }

    if chosen_command.subcommand().is_none() {
        return;
    }

    if let Err(e) = dispatch(&chosen_command).await {
        eprintln!("{} {:#}", "✗".red().bold(), e);
        std::process::exit(1);
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

async fn dispatch(chosen_command: &ArgMatches) -> anyhow::Result<()> {
    match chosen_command.subcommand() {
        Some(("init", primary_command)) => handle_init(primary_command),
        Some(("scrape", primary_command)) => handle_scrape(primary_command).await,
        Some(("retry", primary_command)) => handle_retry(primary_command).await,
        Some(("status", primary_command)) => handle_status(primary_command),
        Some(("show", primary_command)) => handle_show(primary_command),
        Some(("rate", primary_command)) => handle_rate(primary_command),
        Some(("jobs", primary_command)) => handle_jobs(primary_command),
        _ => unreachable!("clap should ensure we don't get here"),
    }
}

pub const CLAP_STYLING: clap::builder::styling::Styles = clap::builder::styling::Styles::styled()
    .header(clap_cargo::style::HEADER)
    .usage(clap_cargo::style::USAGE)
    .literal(clap_cargo::style::LITERAL)
    .placeholder(clap_cargo::style::PLACEHOLDER)
    .error(clap_cargo::style::ERROR)
    .valid(clap_cargo::style::VALID)
    .invalid(clap_cargo::style::INVALID);
