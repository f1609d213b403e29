use clap::{arg, command};
use std::net::SocketAddr;
use url::Url;

pub const CLAP_STYLING: clap::builder::styling::Styles = clap::builder::styling::Styles::styled()
    .header(clap_cargo::style::HEADER)
    .usage(clap_cargo::style::USAGE)
    .literal(clap_cargo::style::LITERAL)
    .placeholder(clap_cargo::style::PLACEHOLDER)
    .error(clap_cargo::style::ERROR)
    .valid(clap_cargo::style::VALID)
    .invalid(clap_cargo::style::INVALID);

/// Resolver tuning flags shared by `resolve` and `serve`.
fn resolver_args(cmd: clap::Command) -> clap::Command {
    cmd.arg(
        arg!(-c --"concurrency" <NUM_FETCHES>)
            .required(false)
            .help("Maximum number of sitemap fetches in flight at once")
            .value_parser(clap::value_parser!(usize))
            .default_value("32"),
    )
    .arg(
        arg!(--"timeout" <SECONDS>)
            .required(false)
            .help("Per-request timeout in seconds")
            .value_parser(clap::value_parser!(u64))
            .default_value("10"),
    )
    .arg(
        arg!(--"max-depth" <DEPTH>)
            .required(false)
            .help("Deepest sitemap index nesting to follow")
            .value_parser(clap::value_parser!(usize))
            .default_value("16"),
    )
    .arg(
        arg!(--"deadline" <SECONDS>)
            .required(false)
            .help("Abandon a whole resolution after this many seconds")
            .value_parser(clap::value_parser!(u64)),
    )
}

pub fn command_argument_builder() -> clap::Command {
    clap::Command::new("sitewalk")
        .version(env!("CARGO_PKG_VERSION"))
        .bin_name("sitewalk")
        .styles(CLAP_STYLING)
        .arg(arg!(-q --"quiet" "Suppress banner and non-essential output").required(false))
        .subcommand_required(false)
        .subcommand(resolver_args(
            command!("resolve")
                .about(
                    "Resolve sitemap URLs into the urlset sitemaps they reach, expanding \
                sitemap indexes recursively.",
                )
                .arg(
                    arg!(-u --"url" <URL>)
                        .required(false)
                        .help("A sitemap URL to resolve (repeatable)")
                        .value_parser(clap::value_parser!(Url))
                        .action(clap::ArgAction::Append)
                        .conflicts_with("hosts-file"),
                )
                .arg(
                    arg!(-H --"hosts-file" <PATH>)
                        .required(false)
                        .help("Path to a newline-delimited file of sitemap URLs")
                        .value_parser(clap::value_parser!(std::path::PathBuf))
                        .conflicts_with("url"),
                )
                .arg(
                    arg!(-o --"output" <PATH>)
                        .required(false)
                        .help("Save report to file (default: display to screen)")
                        .value_parser(clap::value_parser!(std::path::PathBuf)),
                )
                .arg(
                    arg!(-f --"format" <FORMAT>)
                        .required(false)
                        .help("Report format: text, json, csv, markdown")
                        .value_parser(["text", "json", "csv", "markdown"])
                        .default_value("text"),
                )
                .arg(
                    arg!(--"no-progress")
                        .required(false)
                        .help("Hide the progress spinner")
                        .action(clap::ArgAction::SetTrue),
                ),
        ))
        .subcommand(resolver_args(
            command!("serve")
                .about("Serve the resolver over HTTP (POST /process_sitemaps)")
                .arg(
                    arg!(-b --"bind" <ADDR>)
                        .required(false)
                        .help("Address to listen on")
                        .value_parser(clap::value_parser!(SocketAddr))
                        .default_value("0.0.0.0:5000"),
                ),
        ))
}
