//! `certportal certificates ...`: registry administration.

use anyhow::{Context, Result, bail};
use clap::{Arg, ArgAction, ArgMatches, Command};

use crate::cli::actions::certificates::Operation;
use crate::portal::RollNumber;

pub const COMMAND: &str = "certificates";
const ARG_ROLL_NUMBER: &str = "roll-number";
const ARG_UNAVAILABLE: &str = "unavailable";

fn roll_number_arg() -> Arg {
    Arg::new(ARG_ROLL_NUMBER)
        .help("Roll number, e.g. 220BTCCSE004 (case-insensitive)")
        .required(true)
}

fn roll_number(matches: &ArgMatches) -> Result<RollNumber> {
    let raw = matches
        .get_one::<String>(ARG_ROLL_NUMBER)
        .context("missing roll number")?;
    RollNumber::parse(raw).with_context(|| format!("invalid roll number: {raw}"))
}

#[must_use]
pub fn subcommand() -> Command {
    Command::new(COMMAND)
        .about("Manage the certificate registry")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(Command::new("init").about("Create the registry tables if they do not exist"))
        .subcommand(
            Command::new("add")
                .about("Add a roll number or update its availability")
                .arg(roll_number_arg())
                .arg(
                    Arg::new(ARG_UNAVAILABLE)
                        .long(ARG_UNAVAILABLE)
                        .help("Record the roll number without an issued certificate")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(Command::new("list").about("List registry entries with download statistics"))
        .subcommand(
            Command::new("show")
                .about("Show one registry entry")
                .arg(roll_number_arg()),
        )
        .subcommand(
            Command::new("remove")
                .about("Delete a registry entry")
                .arg(roll_number_arg()),
        )
        .subcommand(
            Command::new("sync")
                .about("Look the certificate up in storage and record whether it exists")
                .arg(roll_number_arg()),
        )
        .subcommand(Command::new("demo").about("Register the demo roll number 220btccse000"))
}

/// Map `certificates` subcommand matches to an operation.
///
/// # Errors
/// Returns an error if the roll number is invalid or the subcommand is unknown.
pub fn parse(matches: &ArgMatches) -> Result<Operation> {
    let operation = match matches.subcommand() {
        Some(("init", _)) => Operation::Init,
        Some(("add", sub)) => Operation::Add {
            roll_number: roll_number(sub)?,
            has_certificate: !sub.get_flag(ARG_UNAVAILABLE),
        },
        Some(("list", _)) => Operation::List,
        Some(("show", sub)) => Operation::Show(roll_number(sub)?),
        Some(("remove", sub)) => Operation::Remove(roll_number(sub)?),
        Some(("sync", sub)) => Operation::Sync(roll_number(sub)?),
        Some(("demo", _)) => Operation::Demo,
        Some((other, _)) => bail!("unknown certificates command: {other}"),
        None => bail!("missing certificates command"),
    };
    Ok(operation)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_args(args: &[&str]) -> Result<Operation> {
        let mut argv = vec![COMMAND];
        argv.extend_from_slice(args);
        let matches = subcommand().try_get_matches_from(argv)?;
        parse(&matches)
    }

    #[test]
    fn add_defaults_to_available() {
        let operation = parse_args(&["add", "220BTCCSE004"]).expect("operation");
        assert_eq!(
            operation,
            Operation::Add {
                roll_number: RollNumber::parse("220btccse004").expect("roll"),
                has_certificate: true,
            }
        );

        let operation = parse_args(&["add", "220btccse004", "--unavailable"]).expect("operation");
        assert!(matches!(
            operation,
            Operation::Add {
                has_certificate: false,
                ..
            }
        ));
    }

    #[test]
    fn invalid_roll_number_is_rejected() {
        let result = parse_args(&["show", "BTCCSE"]);
        assert!(result.is_err());
    }

    #[test]
    fn simple_commands() {
        assert_eq!(parse_args(&["list"]).expect("list"), Operation::List);
        assert_eq!(parse_args(&["demo"]).expect("demo"), Operation::Demo);
        assert_eq!(parse_args(&["init"]).expect("init"), Operation::Init);
        assert!(parse_args(&[]).is_err());
    }
}
