use std::io::{self, BufRead};

use color_eyre::Result;
use keyjar_core::{
    manager::{KeyManager, ManagerError},
    storage::RecordStore,
};
use tracing::warn;

use crate::cli::Command;

/// Execute a key subcommand, writing user-facing output to `out`.
pub async fn handle<S: RecordStore>(
    cmd: Command,
    keys: &KeyManager<S>,
    out: &mut impl io::Write,
) -> Result<()> {
    match cmd {
        Command::Add { service, key } => {
            let key = match key {
                Some(key) => key,
                None => read_key_line(io::stdin().lock())?,
            };
            match keys.add(&service, &key).await {
                Ok(()) => writeln!(out, "Stored key for {service}.")?,
                Err(err @ ManagerError::DuplicateService { .. }) => {
                    warn!("{err}");
                    writeln!(out, "Warning: {err}. Delete it first to replace the key.")?;
                }
                Err(err) => return Err(color_eyre::eyre::eyre!(err.to_string())),
            }
        }
        Command::List { search } => {
            let records = keys
                .list(search.as_deref())
                .await
                .map_err(|e| color_eyre::eyre::eyre!(e.to_string()))?;
            if records.is_empty() {
                if search.is_some() {
                    writeln!(out, "No matching keys found.")?;
                } else {
                    writeln!(out, "No API keys stored. Add one with `keyjar add <service>`.")?;
                }
                return Ok(());
            }
            for record in records {
                writeln!(out, "{}", record.service)?;
            }
        }
        Command::Show { service } => {
            let plaintext = keys
                .reveal(&service)
                .await
                .map_err(|e| color_eyre::eyre::eyre!(e.to_string()))?;
            writeln!(out, "{plaintext}")?;
        }
        Command::Delete { service } => {
            keys.delete(&service)
                .await
                .map_err(|e| color_eyre::eyre::eyre!(e.to_string()))?;
            writeln!(out, "Deleted {service}.")?;
        }
        other => color_eyre::eyre::bail!("not a key command: {other:?}"),
    }

    Ok(())
}

/// Decrypt everything and report what failed.
pub async fn health<S: RecordStore>(
    keys: &KeyManager<S>,
    out: &mut impl io::Write,
) -> Result<()> {
    let report = keys
        .audit()
        .await
        .map_err(|e| color_eyre::eyre::eyre!(e.to_string()))?;
    writeln!(out, "Key file: ok")?;
    writeln!(out, "Stored keys: {}", report.total)?;
    if report.is_healthy() {
        writeln!(out, "Storage: ok")?;
        return Ok(());
    }
    for service in &report.undecryptable {
        writeln!(out, "  cannot decrypt: {service}")?;
    }
    color_eyre::eyre::bail!(
        "{} stored key(s) failed to decrypt",
        report.undecryptable.len()
    )
}

fn read_key_line(mut input: impl BufRead) -> Result<String> {
    let mut line = String::new();
    input.read_line(&mut line)?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}
