use commands::command_argument_builder;
use gedung::handlers::{
    handle_classify, handle_init, handle_normalize, handle_users, load_config, wants_json_output,
};
use gedung_core::print_banner;
use std::path::PathBuf;

mod commands;

#[tokio::main]
async fn main() {
    let cmd = command_argument_builder();
    let chosen_command = cmd.get_matches();
    let quiet = chosen_command.get_flag("quiet");

    // JSON on stdout must stay parseable
    if !quiet && !wants_json_output(&chosen_command) {
        print_banner();
    }

    let Some((name, sub_matches)) = chosen_command.subcommand() else {
        // No subcommand provided, just show the banner
        return;
    };
    let config_path = chosen_command.get_one::<PathBuf>("config");

    let result = match name {
        "init" => handle_init(sub_matches),
        "ui" => match load_config(config_path) {
            Ok(config) => tokio::task::spawn_blocking(move || gedung_tui::run(config))
                .await
                .map_err(anyhow::Error::from)
                .and_then(|r| r),
            Err(e) => Err(e),
        },
        "classify" => match load_config(config_path) {
            Ok(config) => handle_classify(sub_matches, config).await,
            Err(e) => Err(e),
        },
        "normalize" => load_config(config_path).map(|config| handle_normalize(sub_matches, &config)),
        "users" => load_config(config_path).map(|config| handle_users(&config)),
        _ => unreachable!("clap should ensure we don't get here"),
    };

    if let Err(e) = result {
        eprintln!("✗ {:#}", e);
        std::process::exit(1);
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
