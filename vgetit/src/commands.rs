use crate::CLAP_STYLING;
use clap::{arg, command};
use url::Url;

fn extractor_args(cmd: clap::Command) -> clap::Command {
    cmd.arg(
        arg!(--"extractor-url" <URL>)
            .required(true)
            .env("VGETIT_EXTRACTOR_URL")
            .help("Base URL of the full extraction service, queried as {URL}/{KEY}")
            .value_parser(clap::value_parser!(Url)),
    )
    .arg(
        arg!(--"light-url" <URL>)
            .required(false)
            .env("VGETIT_LIGHT_URL")
            .help("Base URL of the light extraction service, used when the full one fails")
            .value_parser(clap::value_parser!(Url)),
    )
    .arg(
        arg!(--"timeout" <SECONDS>)
            .required(false)
            .help("Extraction request timeout in seconds")
            .value_parser(clap::value_parser!(u64))
            .default_value("30"),
    )
    .arg(
        arg!(--"interval" <SECONDS>)
            .required(false)
            .help("Minimum spacing between two extractions (default: $VGETIT_SCRAPE_RATE_LIMIT or 5)")
            .value_parser(clap::value_parser!(u64)),
    )
    .arg(
        arg!(--"sweep-every" <SECONDS>)
            .required(false)
            .help("How often deferred jobs are checked (default: $VGETIT_SWEEP_INTERVAL or 10)")
            .value_parser(clap::value_parser!(u64).range(1..)),
    )
}

pub(crate) fn command_argument_builder() -> clap::Command {
    clap::Command::new("vgetit")
        .version(env!("CARGO_PKG_VERSION"))
        .bin_name("vgetit")
        .styles(CLAP_STYLING)
        .arg(arg!(-q --"quiet" "Suppress banner and non-essential output").required(false))
        .arg(
            arg!(--"db" <PATH>)
                .required(false)
                .global(true)
                .env("VGETIT_DB")
                .help("Location of the vgetit database")
                .default_value("~/.config/vgetit/vgetit.db"),
        )
        .subcommand_required(false)
        .subcommand(
            command!("init")
                .about("Initializes the vgetit database on your filesystem")
                .arg(
                    arg!([PATH])
                        .required(false)
                        .help("Directory to store the vgetit database in")
                        .default_value("~/.config/vgetit/"),
                )
                .arg(
                    arg!(-f - -"force")
                        .help("Overwrite any existing database at the specified location without asking")
                        .required(false),
                ),
        )
        .subcommand(extractor_args(
            command!("scrape")
                .about(
                    "Request scrapes for one or more companies. Known companies are reported, \
                new ones are queued and run under the global rate limit.",
                )
                .arg(
                    arg!([KEY] ...)
                        .required(false)
                        .help("Company hosts or URLs, e.g. acme.com")
                        .conflicts_with("hosts-file"),
                )
                .arg(
                    arg!(-H --"hosts-file" <PATH>)
                        .required(false)
                        .help("Path to a newline-delimited file of company hosts")
                        .value_parser(clap::value_parser!(std::path::PathBuf))
                        .conflicts_with("KEY"),
                )
                .arg(
                    arg!(-w --"wait")
                        .required(false)
                        .help("Stay until every requested job has completed or failed")
                        .action(clap::ArgAction::SetTrue),
                ),
        ))
        .subcommand(extractor_args(
            command!("retry")
                .about("Reset a failed job, clearing its retry count, and run it again")
                .arg(arg!(<KEY>).help("Company host")),
        ))
        .subcommand(
            command!("status")
                .about("Show the scrape job of a company")
                .arg(arg!(<KEY>).help("Company host")),
        )
        .subcommand(
            command!("show")
                .about("Show everything known about a company and its verification score")
                .arg(arg!(<KEY>).help("Company host or slug")),
        )
        .subcommand(
            command!("rate")
                .about("Rate a company from 1 to 5. Rating it again replaces your rating.")
                .arg(arg!(<KEY>).help("Company host"))
                .arg(
                    arg!(-r --"rater" <NAME>)
                        .required(true)
                        .help("Who is rating"),
                )
                .arg(
                    arg!(-v --"value" <STARS>)
                        .required(true)
                        .help("Rating from 1 to 5")
                        .value_parser(clap::value_parser!(i64).range(1..=5)),
                )
                .arg(
                    arg!(-n --"note" <TEXT>)
                        .required(false)
                        .help("Optional comment"),
                ),
        )
        .subcommand(command!("jobs").about("List all scrape jobs, oldest first"))
}
