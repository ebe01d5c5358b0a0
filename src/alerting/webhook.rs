//! Chat-webhook sinks. Slack-style sinks take `{"text": ...}`, Discord-style
//! sinks take `{"content": ...}`; any 2xx (204 included) counts as delivered.

use anyhow::{anyhow, Result};
use serde_json::json;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkKind {
    Slack,
    Discord,
}

#[derive(Clone)]
pub struct WebhookSink {
    kind: SinkKind,
    url: String,
    client: reqwest::Client,
}

impl WebhookSink {
    pub fn slack(url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            kind: SinkKind::Slack,
            url: url.into(),
            client,
        }
    }

    pub fn discord(url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            kind: SinkKind::Discord,
            url: url.into(),
            client,
        }
    }

    pub fn kind(&self) -> SinkKind {
        self.kind
    }

    pub fn payload(&self, message: &str) -> serde_json::Value {
        match self.kind {
            SinkKind::Slack => json!({ "text": message }),
            SinkKind::Discord => json!({ "content": message }),
        }
    }

    /// One POST, no retries. The next threshold crossing produces a new
    /// attempt anyway.
    pub async fn send(&self, message: &str) -> Result<()> {
        let resp = self
            .client
            .post(&self.url)
            .json(&self.payload(message))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(anyhow!("webhook returned status {status}"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slack_wraps_text_discord_wraps_content() {
        let client = reqwest::Client::new();
        let slack = WebhookSink::slack("http://example/hook", client.clone());
        let discord = WebhookSink::discord("http://example/hook", client);

        assert_eq!(slack.payload("hi"), json!({ "text": "hi" }));
        assert_eq!(discord.payload("hi"), json!({ "content": "hi" }));
    }
}
