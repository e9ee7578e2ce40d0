//! Command handlers for the xrpl-ws CLI

use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::cli::{Cli, Commands};
use crate::config::CliConfig;
use crate::error::{CliError, Result};
use xrpl_ws_core::{CallbackTable, ClientEvent};
use xrpl_ws_runtime::{Client, ClientBuilder};
use xrpl_ws_tungstenite::WebSocketConnector;

/// Command dispatcher for handling CLI commands
pub struct CommandDispatcher;

impl CommandDispatcher {
    /// Execute a CLI command
    pub async fn execute(cli: Cli, config: CliConfig) -> Result<()> {
        match cli.command {
            Commands::ServerInfo => Self::handle_server_info_command(config).await,
            Commands::Send { json } => Self::handle_send_command(config, json).await,
            Commands::Watch { streams, accounts } => {
                let streams = streams.unwrap_or_else(|| config.streams.clone());
                Self::handle_watch_command(config, streams, accounts).await
            }
        }
    }

    /// Handle the server-info command
    async fn handle_server_info_command(config: CliConfig) -> Result<()> {
        let client = connect(config, CallbackTable::new()).await?;
        let result = client.server_info().await;
        client.disconnect().await;

        print_json(&result?)
    }

    /// Handle the send command
    async fn handle_send_command(config: CliConfig, json: String) -> Result<()> {
        let request = parse_request(&json)?;
        let client = connect(config, CallbackTable::new()).await?;
        let result = client.send(request).await;
        client.disconnect().await;

        print_json(&result?)
    }

    /// Handle the watch command
    ///
    /// Stream messages are printed as they arrive. Subscriptions are renewed
    /// after every reconnect until ctrl-c.
    async fn handle_watch_command(config: CliConfig, streams: Vec<String>, accounts: Vec<String>) -> Result<()> {
        let (reopened_tx, mut reopened_rx) = mpsc::unbounded_channel();
        let callbacks = CallbackTable::new()
            .on_ledger(print_event)
            .on_transaction(print_event)
            .on_validation(print_event)
            .on_manifest(print_event)
            .on_error(|event| {
                if let ClientEvent::Error(message) = event {
                    warn!("Client error: {}", message);
                }
            })
            .on_close(|_| info!("Connection closed"))
            .on_reconnect(move |_| {
                let _ = reopened_tx.send(());
            });

        let client = connect(config, callbacks).await?;
        subscribe(&client, &streams, &accounts).await?;
        info!("Watching {:?}, press ctrl-c to stop", streams);

        loop {
            tokio::select! {
                signal = tokio::signal::ctrl_c() => {
                    signal?;
                    break;
                }
                Some(()) = reopened_rx.recv() => {
                    info!("Reconnected, renewing subscriptions");
                    if let Err(e) = subscribe(&client, &streams, &accounts).await {
                        warn!("Failed to renew subscriptions: {}", e);
                    }
                }
            }
        }

        client.disconnect().await;
        Ok(())
    }
}

async fn connect(config: CliConfig, callbacks: CallbackTable) -> Result<Client> {
    info!(server = %config.client.server, "Connecting");
    let client = ClientBuilder::new(config.client)
        .with_connector(WebSocketConnector::new())
        .with_callbacks(callbacks)
        .build()?;
    client.connect(true).await?;
    Ok(client)
}

async fn subscribe(client: &Client, streams: &[String], accounts: &[String]) -> Result<()> {
    if !streams.is_empty() {
        debug!(?streams, "Subscribing to streams");
        client.subscribe(streams).await?;
    }
    if !accounts.is_empty() {
        debug!(?accounts, "Subscribing to accounts");
        client.subscribe_accounts(accounts).await?;
    }
    Ok(())
}

/// Parse the request argument of `send`
fn parse_request(json: &str) -> Result<Value> {
    let request: Value = serde_json::from_str(json)?;
    if !request.is_object() {
        return Err(CliError::Config(format!("Request must be a JSON object, got {}", json)));
    }
    Ok(request)
}

fn print_event(event: ClientEvent) {
    if let Some(payload) = event.payload() {
        println!("{}", payload);
    }
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
