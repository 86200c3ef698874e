//! Profile command handler.

use anyhow::{Context, Result};
use kheyma_session::api::ProfileUpdate;
use kheyma_session::config::Config;

use super::HostSession;

/// Prints the profile, after applying `update` when it carries any field.
pub async fn run(config: &Config, update: &ProfileUpdate) -> Result<()> {
    let mut session = HostSession::open(config).await?;

    if !session.store.is_authenticated() {
        session.finish();
        anyhow::bail!("Not logged in. Run `kheyma login` first.");
    }

    if !update.is_empty()
        && let Err(err) = session.store.update_profile(update).await
    {
        session.finish();
        return Err(err.into());
    }

    if let Some(identity) = session.store.identity() {
        let json = serde_json::to_string_pretty(identity).context("render profile")?;
        println!("{json}");
    }

    session.finish();
    Ok(())
}
