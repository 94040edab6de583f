//! Shared Vault secrets management.

use std::collections::BTreeMap;

use tracing::info;

use super::{CheckContext, CheckOutcome};
use crate::error::{require, Result, VerifyError};

/// Rendered env file inside the allocation.
const CREDENTIALS_FILE: &str = "secrets/credentials.env";

/// Env variable each secret field is rendered as.
fn rendered_var(field: &str) -> String {
    format!("EXAMPLE_{}", field.to_uppercase())
}

pub(super) async fn run(ctx: &CheckContext) -> Result<CheckOutcome> {
    let expect = ctx.expect();

    let health = ctx.vault.health().await?;
    require(health.initialized, "Vault is not initialized")?;

    let secret = ctx
        .vault
        .read_secret(&expect.kv_mount, &expect.secret_path)
        .await?;
    for (field, value) in &expect.secret_values {
        require(
            secret.field(field) == Some(value.as_str()),
            format!("{field} secret is incorrect"),
        )?;
    }

    let policies = ctx.vault.list_policies().await?;
    require(
        policies.contains(&expect.nomad_policy),
        "Nomad server policy not found in Vault",
    )?;

    let allocation = ctx.first_allocation().await?;
    let content = ctx
        .nomad
        .read_alloc_file(&allocation.id, CREDENTIALS_FILE)
        .await
        .map_err(|e| VerifyError::Assertion(format!("Failed to verify template contents: {e}")))?;
    for (field, value) in &expect.secret_values {
        let line = format!("{}={value}", rendered_var(field));
        require(
            content.contains(&line),
            format!("{} not found in rendered template", rendered_var(field)),
        )?;
    }

    let probe = BTreeMap::from([(
        expect.write_probe_key.clone(),
        expect.write_probe_value.clone(),
    )]);
    let version = ctx
        .vault
        .write_secret(&expect.kv_mount, &expect.write_probe_path, &probe)
        .await
        .map_err(|e| VerifyError::Assertion(format!("Failed to create secret in Vault: {e}")))?;
    let written = ctx
        .vault
        .read_secret(&expect.kv_mount, &expect.write_probe_path)
        .await
        .map_err(|e| VerifyError::Assertion(format!("Failed to create secret in Vault: {e}")))?;
    require(
        written.field(&expect.write_probe_key) == Some(expect.write_probe_value.as_str()),
        "Failed to create test secret",
    )?;

    info!(
        path = %expect.write_probe_path,
        version = ?version,
        "Vault secrets readable, rendered and writable"
    );
    Ok(CheckOutcome::Passed)
}
