use anyhow::Result;
use clap::{Arg, ArgMatches, Command};

use crate::portal::{identity::DEFAULT_EMAIL_DOMAIN, otp::DEFAULT_OTP_TTL_SECONDS};

pub const ARG_EMAIL_DOMAIN: &str = "email-domain";
pub const ARG_OTP_TTL_SECONDS: &str = "otp-ttl-seconds";
pub const ARG_DEMO_EMAIL: &str = "demo-email";

#[derive(Debug, Clone)]
pub struct Options {
    pub email_domain: String,
    pub ttl_seconds: i64,
    pub demo_email: Option<String>,
}

impl Options {
    /// Parse identity and OTP arguments from matches.
    ///
    /// # Errors
    /// Returns an error if the email domain is empty.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let email_domain = matches
            .get_one::<String>(ARG_EMAIL_DOMAIN)
            .map(|domain| domain.trim().trim_start_matches('@').to_string())
            .unwrap_or_else(|| DEFAULT_EMAIL_DOMAIN.to_string());
        if email_domain.is_empty() {
            anyhow::bail!("--{ARG_EMAIL_DOMAIN} must not be empty");
        }

        Ok(Self {
            email_domain,
            ttl_seconds: matches
                .get_one::<i64>(ARG_OTP_TTL_SECONDS)
                .copied()
                .unwrap_or(DEFAULT_OTP_TTL_SECONDS),
            demo_email: matches
                .get_one::<String>(ARG_DEMO_EMAIL)
                .cloned()
                .filter(|v| !v.trim().is_empty()),
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_EMAIL_DOMAIN)
                .long(ARG_EMAIL_DOMAIN)
                .help("Institutional email domain accepted for OTP requests")
                .env("CERTPORTAL_EMAIL_DOMAIN")
                .default_value(DEFAULT_EMAIL_DOMAIN),
        )
        .arg(
            Arg::new(ARG_OTP_TTL_SECONDS)
                .long(ARG_OTP_TTL_SECONDS)
                .help("OTP lifetime in seconds, also the verified session lifetime")
                .env("CERTPORTAL_OTP_TTL_SECONDS")
                .default_value("600")
                .value_parser(clap::value_parser!(i64).range(1..=86_400)),
        )
        .arg(
            Arg::new(ARG_DEMO_EMAIL)
                .long(ARG_DEMO_EMAIL)
                .help("Demo account that always receives code 123456 and never gets an email")
                .env("CERTPORTAL_DEMO_EMAIL"),
        )
}
