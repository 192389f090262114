use crate::{
    cli::{
        actions::server::{connect, locator, object_store},
        commands::storage,
    },
    portal::{CertificateRecord, CertificateRegistry, PgRegistry, RollNumber, SystemClock},
};
use anyhow::{Context, Result};
use std::{fmt::Write as _, sync::Arc};
use tracing::info;

pub const DEMO_ROLL_NUMBER: &str = "220btccse000";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Init,
    Add {
        roll_number: RollNumber,
        has_certificate: bool,
    },
    List,
    Show(RollNumber),
    Remove(RollNumber),
    Sync(RollNumber),
    Demo,
}

#[derive(Debug)]
pub struct Args {
    pub dsn: String,
    pub email_domain: String,
    pub storage: storage::Options,
    pub operation: Operation,
}

/// Execute a registry administration command.
/// # Errors
/// Returns an error if the database is unreachable or the statement fails.
pub async fn execute(args: Args) -> Result<()> {
    let registry = PgRegistry::new(connect(&args.dsn).await?);

    match args.operation {
        Operation::Init => {
            registry.apply_schema().await?;
            println!("schema applied");
        }
        Operation::Add {
            roll_number,
            has_certificate,
        } => {
            registry
                .upsert_certificate(&roll_number, has_certificate)
                .await?;
            println!(
                "{} recorded (has_certificate: {has_certificate})",
                roll_number.to_upper()
            );
        }
        Operation::List => {
            let records = registry.list_certificates().await?;
            print!("{}", render_table(&records));
        }
        Operation::Show(roll_number) => {
            match registry.get_certificate_record(&roll_number).await? {
                Some(record) => print!("{}", render_table(std::slice::from_ref(&record))),
                None => println!("{} is not in the registry", roll_number.to_upper()),
            }
        }
        Operation::Remove(roll_number) => {
            if registry.remove_certificate(&roll_number).await? {
                println!("{} removed", roll_number.to_upper());
            } else {
                println!("{} is not in the registry", roll_number.to_upper());
            }
        }
        Operation::Sync(roll_number) => {
            let store = object_store(&args.storage, Arc::new(SystemClock))?;
            let locator = locator(&args.storage, store);
            let found = locator.resolve(&roll_number).await.is_some();
            info!(resolvers = ?locator.resolver_names(), found, "synced {roll_number}");
            registry
                .upsert_certificate(&roll_number, found)
                .await
                .with_context(|| format!("failed to record {roll_number}"))?;
            println!(
                "{} recorded (has_certificate: {found})",
                roll_number.to_upper()
            );
        }
        Operation::Demo => {
            let roll_number =
                RollNumber::parse(DEMO_ROLL_NUMBER).context("invalid demo roll number")?;
            registry.upsert_certificate(&roll_number, true).await?;
            println!(
                "demo roll number {} recorded; sign in with dummy.{DEMO_ROLL_NUMBER}@{}",
                roll_number.to_upper(),
                args.email_domain
            );
        }
    }

    Ok(())
}

fn render_table(records: &[CertificateRecord]) -> String {
    let mut out = format!(
        "{:<16} {:<12} {:>9}  {:<25} {:<25}\n",
        "ROLL NUMBER", "AVAILABLE", "DOWNLOADS", "LAST DOWNLOADED", "CREATED"
    );
    for record in records {
        let last = record
            .last_downloaded
            .map_or_else(|| "-".to_string(), |at| at.to_rfc3339());
        let _ = writeln!(
            out,
            "{:<16} {:<12} {:>9}  {:<25} {:<25}",
            record.roll_number.to_upper(),
            if record.has_certificate { "yes" } else { "no" },
            record.download_count,
            last,
            record.created_at.to_rfc3339()
        );
    }
    out
}
