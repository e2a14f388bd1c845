//! Command implementations for the `tandem` binary.

use anyhow::{bail, Context, Result};
use serde_json::Value;
use std::path::Path;
use tandem_core::{ChangeEvent, Node, PathSyncSource, TandemConfig};
use tandem_fs::FsEndpoint;
use tokio::io::AsyncWriteExt;
use tracing::info;

/// Stream change events as JSON lines until Ctrl-C, then drain and exit.
pub async fn watch(root: &Path, sub_path: &str, config: &TandemConfig) -> Result<()> {
    let endpoint = FsEndpoint::open(root, &config.watch).await?;
    let mut session = endpoint
        .watch(sub_path)
        .await
        .with_context(|| format!("Failed to watch {} under {}", sub_path, root.display()))?;

    info!("Watching {} (Ctrl-C to stop)", endpoint.root().display());

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c, if !session.is_closing() => {
                info!("Stopping watch");
                session.close();
            }
            next = session.next() => match next {
                Some(Ok(event)) => println!("{}", event_line(&event)?),
                Some(Err(err)) => eprintln!("error: {}", err),
                None => break,
            },
        }
    }

    session.closed().await;
    Ok(())
}

/// JSON rendering of an event, with the millisecond timestamp format.
fn event_line(event: &ChangeEvent) -> Result<String> {
    let mut value = serde_json::to_value(event)?;
    if let Value::Object(map) = &mut value {
        map.insert("time".to_string(), Value::String(event.timestamp()));
    }
    Ok(serde_json::to_string(&value)?)
}

/// Print one JSON node per walked path; failures go to stderr.
pub async fn walk(root: &Path, paths: &[String], config: &TandemConfig) -> Result<()> {
    let endpoint = FsEndpoint::open(root, &config.watch).await?;
    let roots: Vec<&str> = paths.iter().map(String::as_str).collect();

    let mut lines: Vec<String> = Vec::new();
    let mut failures = 0usize;
    endpoint
        .walk(
            &mut |path: &str, node: tandem_core::Result<Node>| match node {
                Ok(node) => match serde_json::to_string(&node) {
                    Ok(line) => lines.push(line),
                    Err(e) => {
                        failures += 1;
                        eprintln!("{}: {}", path, e);
                    }
                },
                Err(e) => {
                    failures += 1;
                    eprintln!("{}: {}", path, e);
                }
            },
            &roots,
        )
        .await?;

    for line in &lines {
        println!("{}", line);
    }
    info!("Walked {} nodes, {} failures", lines.len(), failures);
    Ok(())
}

pub async fn cat(root: &Path, path: &str, config: &TandemConfig) -> Result<()> {
    let endpoint = FsEndpoint::open(root, &config.watch).await?;
    let content = endpoint.read_all(path).await?;

    let mut stdout = tokio::io::stdout();
    stdout.write_all(&content).await?;
    stdout.flush().await?;
    Ok(())
}

pub async fn info(root: &Path, config: &TandemConfig) -> Result<()> {
    let endpoint = FsEndpoint::open(root, &config.watch).await?;
    let info = endpoint.endpoint_info();
    println!("{}", serde_json::to_string_pretty(&info)?);
    Ok(())
}

pub fn config_show(config: &TandemConfig) -> Result<()> {
    print!("{}", config.export_toml()?);
    Ok(())
}

/// Write the default configuration to `path`.
pub async fn config_init(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!(
            "Configuration already exists at {} (use --force to overwrite)",
            path.display()
        );
    }
    TandemConfig::default().save_to_path(path).await?;
    println!("Configuration written to {}", path.display());
    Ok(())
}
