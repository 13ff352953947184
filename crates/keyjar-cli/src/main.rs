mod cli;
mod config;
mod keys;
mod storage;
mod tui;

use crate::cli::ConfigCommand;
use clap::Parser;
use color_eyre::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Entry point wiring the CLI to the encrypted key store.
#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    init_tracing();

    let cli = cli::Cli::parse();
    let config = config::load()?;
    match cli.command.unwrap_or(cli::Command::Tui) {
        cli::Command::Version => print_version(),
        cli::Command::Config(ConfigCommand::Init) => init_config(&config)?,
        cli::Command::Tui => {
            let manager = storage::manager_from_config(&config).await?;
            tui::launch(&manager).await?
        }
        cli::Command::Health => {
            let manager = storage::manager_from_config(&config).await?;
            keys::health(&manager, &mut std::io::stdout()).await?
        }
        cmd => {
            // Key material is loaded before any command runs; an unreadable
            // or corrupt key file aborts the process.
            let manager = storage::manager_from_config(&config).await?;
            keys::handle(cmd, &manager, &mut std::io::stdout()).await?
        }
    }

    Ok(())
}

fn init_tracing() {
    // Respect user-provided filters, default to info; logs go to stderr so
    // `keyjar show` output stays pipeable.
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

fn print_version() {
    println!("keyjar {}", env!("CARGO_PKG_VERSION"));
}

fn init_config(config: &config::Config) -> Result<()> {
    let path = config::write_default_if_missing(config)?;
    println!("Config initialized at {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{cli::Command, storage};
    use keyjar_core::manager::KeyManager;

    #[tokio::test]
    async fn commands_share_one_store_across_restarts() {
        let dir = tempfile::tempdir().expect("tempdir");
        let paths = storage::test_paths(dir.path());

        let first = KeyManager::new(storage::open_store(&paths).await.expect("open"));
        let mut out = Vec::new();
        keys::handle(
            Command::Add {
                service: "OpenAI".into(),
                key: Some("sk-test-123".into()),
            },
            &first,
            &mut out,
        )
        .await
        .expect("add");
        drop(first);

        let second = KeyManager::new(storage::open_store(&paths).await.expect("reopen"));
        let mut out = Vec::new();
        keys::handle(
            Command::Show {
                service: "OpenAI".into(),
            },
            &second,
            &mut out,
        )
        .await
        .expect("show");
        assert_eq!(String::from_utf8(out).expect("utf8"), "sk-test-123\n");

        let mut out = Vec::new();
        keys::health(&second, &mut out).await.expect("health");
        assert!(String::from_utf8(out).expect("utf8").contains("Storage: ok"));
    }
}
