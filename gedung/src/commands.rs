use crate::CLAP_STYLING;
use clap::{arg, command};
use gedung_core::report::ARCHIVE_FILE_NAME;
use std::path::PathBuf;

pub(crate) fn command_argument_builder() -> clap::Command {
    clap::Command::new("gedung")
        .version(env!("CARGO_PKG_VERSION"))
        .bin_name("gedung")
        .styles(CLAP_STYLING)
        .arg(arg!(-q --"quiet" "Suppress banner and non-essential output").required(false))
        .arg(
            arg!(-c --"config" <PATH>)
                .required(false)
                .global(true)
                .help("Config file to use (default: ~/.config/gedung/config.toml)")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .subcommand_required(false)
        .subcommand(
            command!("init")
                .about("Writes a default config file and a models directory")
                .arg(
                    arg!([PATH])
                        .required(false)
                        .help("Directory to hold config.toml and models/")
                        .default_value("~/.config/gedung/"),
                )
                .arg(
                    arg!(-f - -"force")
                        .help("Overwrite an existing config without asking")
                        .required(false),
                ),
        )
        .subcommand(
            command!("classify")
                .about(
                    "Download every image listed in a spreadsheet's URL column, sort it into \
                building / not building, and write the report archive.",
                )
                .arg(
                    arg!(-i --"input" <PATH>)
                        .required(true)
                        .help("Spreadsheet (.xlsx, .xls, .ods) with a 'URL' column")
                        .value_parser(clap::value_parser!(PathBuf)),
                )
                .arg(
                    arg!(-o --"output" <PATH>)
                        .required(false)
                        .help("Where to write the zip archive")
                        .value_parser(clap::value_parser!(PathBuf))
                        .default_value(ARCHIVE_FILE_NAME),
                )
                .arg(
                    arg!(-m --"model" <PATH>)
                        .required(false)
                        .help("ONNX model to use instead of the configured one")
                        .value_parser(clap::value_parser!(PathBuf)),
                )
                .arg(
                    arg!(--"output-dir" <PATH>)
                        .required(false)
                        .help("Scratch directory, wiped at the start of the run")
                        .value_parser(clap::value_parser!(PathBuf)),
                )
                .arg(
                    arg!(-u --"user" <USERNAME>)
                        .required(false)
                        .help("Username (prompted for when missing)"),
                )
                .arg(
                    arg!(-p --"password" <PASSWORD>)
                        .required(false)
                        .help("Password; visible in the process list, prefer GEDUNG_PASSWORD or the prompt"),
                )
                .arg(
                    arg!(--"timeout" <SECONDS>)
                        .required(false)
                        .help("Per-image download timeout in seconds")
                        .value_parser(clap::value_parser!(u64)),
                )
                .arg(
                    arg!(-t --"concurrency" <NUM>)
                        .required(false)
                        .help("Downloads kept in flight at once; results stay in input order")
                        .value_parser(clap::value_parser!(usize)),
                )
                .arg(
                    arg!(-f --"format" <FORMAT>)
                        .required(false)
                        .help("Summary format: text, json")
                        .value_parser(["text", "json"])
                        .default_value("text"),
                ),
        )
        .subcommand(
            command!("normalize")
                .about("Print the download-API form of one or more storage URLs")
                .arg(
                    arg!(<URL>)
                        .required(true)
                        .num_args(1..)
                        .help("URLs to normalize"),
                ),
        )
        .subcommand(command!("users").about("List the usernames that can log in"))
        .subcommand(command!("ui").about("Start the interactive terminal UI"))
}
