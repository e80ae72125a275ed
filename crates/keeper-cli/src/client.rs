//! RPC client for the Keeper server.
//!
//! Every call is a JSON `POST /keeper.KeeperService/{Method}`. Item payloads
//! are sealed with [`envelope::seal`] before they are sent and opened after
//! they come back, so the server only ever sees ciphertext.
//!
//! The wire types here mirror `keeper_core::Metadata` and its base64 field
//! codec on purpose: the client builds without any server crate.

use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::envelope;

const SERVICE: &str = "keeper.KeeperService";
const TOKEN_HEADER: &str = "token";
const TIMEOUT_HEADER: &str = "x-keeper-timeout-ms";

/// One cleartext key/value tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub key: String,
    pub value: String,
}

/// An item as the server carries it. `data` is ciphertext on the wire and
/// plaintext everywhere else in this crate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
    #[serde(default)]
    pub metadata: Vec<Metadata>,
}

mod base64_bytes {
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        STANDARD.decode(s).map_err(serde::de::Error::custom)
    }
}

#[derive(Deserialize)]
struct TokenReply {
    token: String,
}

#[derive(Deserialize)]
struct ItemReply {
    item: Item,
}

#[derive(Deserialize)]
struct NamesReply {
    names: Vec<String>,
}

#[derive(Deserialize)]
struct StatusReply {
    code: String,
    message: String,
    #[serde(default)]
    details: Vec<FieldDetail>,
}

#[derive(Deserialize)]
struct FieldDetail {
    field: String,
    description: String,
}

pub struct KeeperClient {
    http: reqwest::Client,
    addr: String,
    timeout: Option<Duration>,
}

impl KeeperClient {
    pub fn new(addr: &str, timeout: Option<Duration>) -> Self {
        Self {
            http: reqwest::Client::new(),
            addr: addr.trim_end_matches('/').to_owned(),
            timeout,
        }
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        token: Option<&str>,
        body: &Value,
    ) -> Result<T> {
        let mut request = self
            .http
            .post(format!("{}/{SERVICE}/{method}", self.addr))
            .json(body);
        if let Some(token) = token {
            request = request.header(TOKEN_HEADER, token);
        }
        if let Some(timeout) = self.timeout {
            request = request
                .header(TIMEOUT_HEADER, timeout.as_millis().to_string())
                .timeout(timeout);
        }

        let resp = request
            .send()
            .await
            .with_context(|| format!("request to {} failed", self.addr))?;
        let status = resp.status();
        let text = resp.text().await.context("failed to read response body")?;

        if !status.is_success() {
            match serde_json::from_str::<StatusReply>(&text) {
                Ok(s) if s.details.is_empty() => bail!("{}: {}", s.code, s.message),
                Ok(s) => {
                    let fields: Vec<String> = s
                        .details
                        .iter()
                        .map(|d| format!("{}: {}", d.field, d.description))
                        .collect();
                    bail!("{}: {} ({})", s.code, s.message, fields.join(", "));
                }
                Err(_) => bail!("server returned {status}: {text}"),
            }
        }
        serde_json::from_str(&text).context("failed to parse response JSON")
    }

    /// Create an account and return its first token.
    pub async fn register(&self, login: &str, password: &str) -> Result<String> {
        let reply: TokenReply = self
            .call("Register", None, &json!({"login": login, "password": password}))
            .await?;
        Ok(reply.token)
    }

    pub async fn login(&self, login: &str, password: &str) -> Result<String> {
        let reply: TokenReply = self
            .call("Login", None, &json!({"login": login, "password": password}))
            .await?;
        Ok(reply.token)
    }

    /// Names of the caller's items, sorted by the server.
    pub async fn list(&self, token: &str) -> Result<Vec<String>> {
        let reply: NamesReply = self.call("ListItems", Some(token), &json!({})).await?;
        Ok(reply.names)
    }

    /// Fetch an item and decrypt its payload.
    pub async fn get(&self, token: &str, secret: &str, name: &str) -> Result<Item> {
        let reply: ItemReply = self
            .call("GetItem", Some(token), &json!({"name": name}))
            .await?;
        let mut item = reply.item;
        item.data = envelope::open(secret, &item.data)
            .with_context(|| format!("cannot decrypt item '{name}'"))?;
        Ok(item)
    }

    pub async fn create(&self, token: &str, secret: &str, item: &Item) -> Result<()> {
        self.send_item("CreateItem", token, secret, item).await
    }

    /// Replace the payload, type and metadata of an existing item.
    pub async fn update(&self, token: &str, secret: &str, item: &Item) -> Result<()> {
        self.send_item("UpdateItem", token, secret, item).await
    }

    pub async fn delete(&self, token: &str, name: &str) -> Result<()> {
        let _: IgnoredAny = self
            .call("DeleteItem", Some(token), &json!({"name": name}))
            .await?;
        Ok(())
    }

    async fn send_item(&self, method: &str, token: &str, secret: &str, item: &Item) -> Result<()> {
        let sealed = Item {
            data: envelope::seal(secret, &item.data)?,
            ..item.clone()
        };
        let _: IgnoredAny = self
            .call(method, Some(token), &json!({"item": sealed}))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn item_wire_shape() {
        let item = Item {
            name: "mail".into(),
            kind: "password".into(),
            data: vec![0, 1, 2],
            metadata: vec![],
        };
        let v = serde_json::to_value(&item).unwrap();
        assert_eq!(
            v,
            json!({"name": "mail", "type": "password", "data": "AAEC", "metadata": []})
        );

        let back: Item =
            serde_json::from_value(json!({"name": "n", "type": "text", "data": "AA=="})).unwrap();
        assert_eq!(back.data, vec![0]);
        assert!(back.metadata.is_empty());
    }

    #[tokio::test]
    async fn unreachable_server_is_an_error() {
        let client = KeeperClient::new("http://127.0.0.1:9/", Some(Duration::from_millis(500)));
        let err = client.list("kpr_x").await.unwrap_err();
        assert!(format!("{err:#}").contains("request to http://127.0.0.1:9 failed"));
    }
}
