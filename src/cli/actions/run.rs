use crate::cli::actions::{Action, certificates, server};
use anyhow::Result;

/// Execute the provided action.
/// # Errors
/// Returns an error if the action fails.
pub async fn execute(action: Action) -> Result<()> {
    match action {
        Action::Server(args) => server::execute(args).await,
        Action::Certificates(args) => certificates::execute(args).await,
    }
}
