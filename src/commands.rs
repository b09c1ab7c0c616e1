//! One-shot command-line operations.
//!
//! `product-info` and `parse-vdf` run against the same [`GatewayContext`]
//! the server uses and write pretty JSON to the given writer.

use crate::backend::{CatalogBackend, FixtureBackend, LoginRequest};
use crate::catalog::{ItemId, ProductQuery};
use crate::config::GatewayConfig;
use crate::gateway::GatewayContext;
use crate::vdf;
use anyhow::{bail, Context, Result};
use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use serde_json::Value;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};

/// Whether a command did what it was asked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandStatus {
    Success,
    Failure,
}

impl From<CommandStatus> for ExitCode {
    fn from(status: CommandStatus) -> Self {
        match status {
            CommandStatus::Success => ExitCode::SUCCESS,
            CommandStatus::Failure => ExitCode::FAILURE,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProductInfoArgs {
    pub app_ids: Vec<ItemId>,
    /// Query without checking the account's licenses first.
    pub skip_licenses: bool,
    pub user: Option<String>,
    /// With `user`, log in with a password instead of the saved session.
    pub password: Option<String>,
}

/// Builds the backend named by `backend.fixture`.
pub fn build_backend(config: &GatewayConfig) -> Result<Arc<dyn CatalogBackend>> {
    let Some(path) = config.backend.fixture.as_deref() else {
        bail!("No catalog backend configured; set backend.fixture or pass --fixture");
    };
    let backend = FixtureBackend::load(path)?;
    info!(fixture = %path.display(), "Using fixture catalog backend");
    Ok(Arc::new(backend))
}

/// Logs in, checks licenses and prints the raw app documents.
///
/// The session is always logged out before returning.
pub async fn product_info<W: Write>(
    context: &GatewayContext,
    args: &ProductInfoArgs,
    out: &mut W,
) -> Result<CommandStatus> {
    let status = query_product_info(context, args, out).await;
    context.logout().await;
    status
}

async fn query_product_info<W: Write>(
    context: &GatewayContext,
    args: &ProductInfoArgs,
    out: &mut W,
) -> Result<CommandStatus> {
    let outcome = match (&args.user, &args.password) {
        (Some(user), Some(password)) => {
            context
                .login(LoginRequest::with_password(user, password))
                .await?
        }
        (user, _) => context.relogin(user.as_deref()).await?,
    };
    match outcome.into_result() {
        Ok(account) => info!(%account, "Logged in"),
        Err(err) => {
            error!("Login failed: {}", err);
            return Ok(CommandStatus::Failure);
        }
    }

    // Anonymous sessions hold no licenses to check against.
    let anonymous = context.session().require_session()?.is_anonymous();
    if !args.skip_licenses && !anonymous {
        context.licenses().ensure_fresh().await?;
        for &app in &args.app_ids {
            if !context.licenses().is_entitled(app)? {
                error!("No license available for App ID: {} (AccessDenied)", app);
                return Ok(CommandStatus::Failure);
            }
        }
    }

    let query = ProductQuery::apps(args.app_ids.iter().copied());
    let info = context.cache().get_metadata(&query, None).await?;
    if info.apps.is_empty() {
        error!("No results for App IDs: {:?}", args.app_ids);
        return Ok(CommandStatus::Failure);
    }

    // Keys sort as strings, so "228980" prints before "440".
    let apps: BTreeMap<String, &Value> = info
        .apps
        .iter()
        .map(|(id, document)| (id.to_string(), document))
        .collect();
    write_pretty(out, &apps)?;
    Ok(CommandStatus::Success)
}

/// Parses a KeyValues file and prints it as JSON.
pub fn parse_vdf<W: Write>(path: &Path, out: &mut W) -> Result<CommandStatus> {
    let document = vdf::load(path)?;
    write_pretty(out, &document)?;
    Ok(CommandStatus::Success)
}

fn write_pretty<W: Write, T: Serialize>(out: &mut W, value: &T) -> Result<()> {
    let mut serializer =
        serde_json::Serializer::with_formatter(&mut *out, PrettyFormatter::with_indent(b"    "));
    value
        .serialize(&mut serializer)
        .context("Failed to write JSON output")?;
    writeln!(out).context("Failed to write JSON output")?;
    Ok(())
}

#[cfg(test)]
#[path = "tests/commands_tests.rs"]
mod tests;
