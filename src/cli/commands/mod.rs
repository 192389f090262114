pub mod certificates;
pub mod email;
pub mod logging;
pub mod otp;
pub mod storage;

use clap::{
    Arg, ColorChoice, Command,
    builder::{
        PossibleValuesParser,
        styling::{AnsiColor, Effects, Styles},
    },
};

pub const ARG_PORT: &str = "port";
pub const ARG_DSN: &str = "dsn";
pub const ARG_ENVIRONMENT: &str = "environment";
pub const ARG_STATIC_DIR: &str = "static-dir";

#[must_use]
pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    let long_version: &'static str = Box::leak(
        format!("{} - {}", env!("CARGO_PKG_VERSION"), crate::GIT_COMMIT_HASH).into_boxed_str(),
    );

    let command = Command::new("certportal")
        .about("Certificate download portal with OTP verification")
        .version(env!("CARGO_PKG_VERSION"))
        .long_version(long_version)
        .color(ColorChoice::Auto)
        .styles(styles)
        .arg(
            Arg::new(ARG_PORT)
                .short('p')
                .long(ARG_PORT)
                .help("Port to listen on")
                .default_value("8080")
                .env("CERTPORTAL_PORT")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new(ARG_DSN)
                .short('d')
                .long(ARG_DSN)
                .help("Database connection string")
                .long_help(
                    "PostgreSQL connection string, e.g. postgres://certportal@localhost:5432/certportal. Required by the server and every certificates command.",
                )
                .env("CERTPORTAL_DSN")
                .global(true),
        )
        .arg(
            Arg::new(ARG_ENVIRONMENT)
                .short('e')
                .long(ARG_ENVIRONMENT)
                .help("Deployment environment; dev exposes debug routes, Swagger UI and logs OTP codes")
                .env("CERTPORTAL_ENVIRONMENT")
                .default_value("dev")
                .value_parser(PossibleValuesParser::new(["dev", "prod"])),
        )
        .arg(
            Arg::new(ARG_STATIC_DIR)
                .long(ARG_STATIC_DIR)
                .help("Directory served under /static; its index.html replaces the bundled page")
                .env("CERTPORTAL_STATIC_DIR")
                .default_value("static"),
        )
        .subcommand(certificates::subcommand());

    let command = otp::with_args(command);
    let command = email::with_args(command);
    let command = storage::with_args(command);
    logging::with_args(command)
}
