#![warn(missing_docs)]

//! devrelay: hosts a demo counter store and relays it over stdio.
//!
//! Stdout carries outbound envelopes as JSON lines. Stdin accepts either
//! transport events (`{"method": ..., "content": ...}`) or local dispatches
//! (`{"dispatch": <action>}`).

mod cli;
mod counter;

use anyhow::Result;
use clap::Parser;
use cli::Cli;
use devrelay_core::{channel_pair, EnhancerOptions, InboundEvent, Relay, StoreHandle};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = cli.relay_config()?;

    let (transport, inbound, observer) = channel_pair();
    let (mut outbound, events) = observer.split();
    let relay = Relay::new(transport);

    let options = EnhancerOptions::new(config).with_action_creators(counter::creators());
    let handle = relay.enhance(options, counter::reducer(), Value::from(0))?;
    tracing::info!("devrelay hosting instance {}", handle.id());

    let writer = tokio::spawn(async move {
        while let Some(envelope) = outbound.recv().await {
            match serde_json::to_string(&envelope) {
                Ok(line) => println!("{line}"),
                Err(e) => tracing::error!("Failed to encode envelope: {}", e),
            }
        }
    });

    let listener = {
        let relay = relay.clone();
        tokio::spawn(async move { relay.listen(inbound).await })
    };

    read_stdin(&handle, events).await?;

    listener.await?;
    drop(relay);
    drop(handle);
    writer.await?;
    Ok(())
}

async fn read_stdin(
    handle: &StoreHandle,
    events: mpsc::UnboundedSender<InboundEvent>,
) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let value: Value = match serde_json::from_str(line) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!("Skipping malformed input line: {}", e);
                continue;
            }
        };

        if let Some(action) = value.get("dispatch") {
            if let Err(e) = handle.dispatch(action.clone()) {
                tracing::warn!("Local dispatch failed: {}", e);
            }
            continue;
        }
        match serde_json::from_value::<InboundEvent>(value) {
            Ok(event) => {
                if events.send(event).is_err() {
                    break;
                }
            }
            Err(e) => tracing::warn!("Skipping unrecognised input line: {}", e),
        }
    }
    tracing::info!("stdin closed, shutting down");
    Ok(())
}
