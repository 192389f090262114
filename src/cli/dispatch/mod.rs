use crate::{
    api::Environment,
    cli::{
        actions::{Action, certificates, server},
        commands::{self, email, otp, storage},
    },
};
use anyhow::{Context, Result};
use std::path::PathBuf;

/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    if let Some(sub) = matches.subcommand_matches(commands::certificates::COMMAND) {
        return Ok(Action::Certificates(certificates::Args {
            dsn: dsn(sub)?,
            email_domain: otp::Options::parse(matches)?.email_domain,
            storage: storage::Options::parse(sub)?,
            operation: commands::certificates::parse(sub)?,
        }));
    }

    let environment = matches
        .get_one::<String>(commands::ARG_ENVIRONMENT)
        .map_or(Some(Environment::Dev), |value| Environment::parse(value))
        .context("invalid --environment, expected dev or prod")?;

    Ok(Action::Server(server::Args {
        port: matches
            .get_one::<u16>(commands::ARG_PORT)
            .copied()
            .unwrap_or(8080),
        dsn: dsn(matches)?,
        environment,
        otp: otp::Options::parse(matches)?,
        storage: storage::Options::parse(matches)?,
        email: email::Options::parse(matches)?,
        static_dir: PathBuf::from(
            matches
                .get_one::<String>(commands::ARG_STATIC_DIR)
                .map_or("static", String::as_str),
        ),
    }))
}

fn dsn(matches: &clap::ArgMatches) -> Result<String> {
    matches
        .get_one::<String>(commands::ARG_DSN)
        .cloned()
        .filter(|dsn| !dsn.trim().is_empty())
        .context("missing required argument: --dsn")
}
