use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::{DeliveryReceipt, Notifier};

/// Sends mail through an HTTP relay that accepts a JSON message and answers
/// with an optional message id.
pub struct MailApiNotifier {
    url: String,
    api_key: String,
    from: String,
    client: reqwest::Client,
}

impl MailApiNotifier {
    pub fn new(url: String, api_key: String, from: String) -> Self {
        Self {
            url,
            api_key,
            from,
            client: reqwest::Client::new(),
        }
    }
}

#[derive(Serialize)]
struct OutgoingMail<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    text: &'a str,
}

#[derive(Deserialize, Default)]
struct RelayResponse {
    #[serde(default, alias = "messageId")]
    id: Option<String>,
}

#[async_trait]
impl Notifier for MailApiNotifier {
    async fn send(&self, to: &str, subject: &str, body: &str) -> anyhow::Result<DeliveryReceipt> {
        let mut request = self.client.post(&self.url).json(&OutgoingMail {
            from: &self.from,
            to,
            subject,
            text: body,
        });
        if !self.api_key.is_empty() {
            request = request.bearer_auth(&self.api_key);
        }

        let response = request
            .send()
            .await
            .context("failed to reach mail relay")?
            .error_for_status()
            .context("mail relay returned error")?;

        // Relays that answer with an empty or non-JSON body still count as accepted.
        let relay: RelayResponse = response.json().await.unwrap_or_default();

        Ok(DeliveryReceipt {
            provider: "mail_api",
            message_id: relay.id,
            accepted_at: Utc::now(),
        })
    }
}
