use anyhow::{Context, Result};
use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;
use url::Url;

pub const ARG_EMAIL_RELAY_URL: &str = "email-relay-url";
pub const ARG_EMAIL_RELAY_TOKEN: &str = "email-relay-token";
pub const ARG_EMAIL_FROM_NAME: &str = "email-from-name";
pub const ARG_EMAIL_FROM_ADDRESS: &str = "email-from-address";

#[derive(Debug, Clone)]
pub struct Options {
    /// `None` selects the log-only sender.
    pub relay_url: Option<Url>,
    pub relay_token: Option<SecretString>,
    pub from_name: String,
    pub from_address: String,
}

impl Options {
    /// Parse email delivery arguments from matches.
    ///
    /// # Errors
    /// Returns an error if the relay URL is invalid.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let get_non_empty = |id: &str| {
            matches
                .get_one::<String>(id)
                .cloned()
                .filter(|v| !v.trim().is_empty())
        };

        let relay_url = get_non_empty(ARG_EMAIL_RELAY_URL)
            .map(|raw| {
                Url::parse(raw.trim())
                    .with_context(|| format!("invalid --{ARG_EMAIL_RELAY_URL}: {raw}"))
            })
            .transpose()?;

        Ok(Self {
            relay_url,
            relay_token: get_non_empty(ARG_EMAIL_RELAY_TOKEN).map(SecretString::from),
            from_name: matches
                .get_one::<String>(ARG_EMAIL_FROM_NAME)
                .cloned()
                .unwrap_or_default(),
            from_address: get_non_empty(ARG_EMAIL_FROM_ADDRESS)
                .unwrap_or_else(|| "noreply@zenithclub.in".to_string()),
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_EMAIL_RELAY_URL)
                .long(ARG_EMAIL_RELAY_URL)
                .help("HTTP mail relay receiving {from, to, subject, html}; omit to only log emails")
                .env("CERTPORTAL_EMAIL_RELAY_URL"),
        )
        .arg(
            Arg::new(ARG_EMAIL_RELAY_TOKEN)
                .long(ARG_EMAIL_RELAY_TOKEN)
                .help("Bearer token for the mail relay")
                .env("CERTPORTAL_EMAIL_RELAY_TOKEN")
                .hide_env_values(true),
        )
        .arg(
            Arg::new(ARG_EMAIL_FROM_NAME)
                .long(ARG_EMAIL_FROM_NAME)
                .help("Sender display name")
                .env("CERTPORTAL_EMAIL_FROM_NAME")
                .default_value("Zenith Club"),
        )
        .arg(
            Arg::new(ARG_EMAIL_FROM_ADDRESS)
                .long(ARG_EMAIL_FROM_ADDRESS)
                .help("Sender address")
                .env("CERTPORTAL_EMAIL_FROM_ADDRESS")
                .default_value("noreply@zenithclub.in"),
        )
}
