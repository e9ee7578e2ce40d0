//! Convenience wrappers for common rippled commands
//!
//! Each wrapper only builds the request object; correlation, timeouts and
//! error reporting are those of [`Client::send`].

use serde_json::Value;

use crate::client::Client;
use xrpl_ws_core::{message::command, ClientResult, Payload};

impl Client {
    /// Send a request built with [`xrpl_ws_core::message::command`]
    pub async fn send_command(&self, payload: Payload) -> ClientResult<Value> {
        self.send(Value::Object(payload)).await
    }

    /// `server_info`: status of the connected server
    pub async fn server_info(&self) -> ClientResult<Value> {
        self.send_command(command("server_info")).await
    }

    /// `ping` as an ordinary request, answered with a fresh id
    pub async fn ping(&self) -> ClientResult<Value> {
        self.send_command(command("ping")).await
    }

    /// `fee`: current transaction cost
    pub async fn fee(&self) -> ClientResult<Value> {
        self.send_command(command("fee")).await
    }

    /// `ledger_closed`: most recently closed ledger
    pub async fn ledger_closed(&self) -> ClientResult<Value> {
        self.send_command(command("ledger_closed")).await
    }

    /// Subscribe to named streams such as `ledger` or `transactions`
    pub async fn subscribe<S: AsRef<str>>(&self, streams: &[S]) -> ClientResult<Value> {
        self.send_command(with_list(command("subscribe"), "streams", streams)).await
    }

    pub async fn unsubscribe<S: AsRef<str>>(&self, streams: &[S]) -> ClientResult<Value> {
        self.send_command(with_list(command("unsubscribe"), "streams", streams)).await
    }

    /// Subscribe to transactions affecting the given accounts
    pub async fn subscribe_accounts<S: AsRef<str>>(&self, accounts: &[S]) -> ClientResult<Value> {
        self.send_command(with_list(command("subscribe"), "accounts", accounts)).await
    }
}

fn with_list<S: AsRef<str>>(mut payload: Payload, key: &str, items: &[S]) -> Payload {
    let values = items
        .iter()
        .map(|item| Value::String(item.as_ref().to_string()))
        .collect();
    payload.insert(key.to_string(), Value::Array(values));
    payload
}
