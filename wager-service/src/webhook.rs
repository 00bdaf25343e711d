// Copyright (C) 2026 StarHuntingGames
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

use anyhow::Context;
use async_trait::async_trait;
use tracing::debug;
use wager_common::SlackMessage;

#[async_trait]
pub trait WebhookPoster: Send + Sync {
    async fn post(&self, url: &str, message: &SlackMessage) -> anyhow::Result<()>;
}

#[derive(Clone, Default)]
pub struct HttpWebhookPoster {
    client: reqwest::Client,
}

impl HttpWebhookPoster {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl WebhookPoster for HttpWebhookPoster {
    async fn post(&self, url: &str, message: &SlackMessage) -> anyhow::Result<()> {
        let response = self
            .client
            .post(url)
            .json(message)
            .send()
            .await
            .with_context(|| format!("failed to post webhook to {url}"))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_else(|_| "".to_string());
            anyhow::bail!("webhook {} returned {}: {}", url, status, body);
        }

        debug!(url = %url, in_channel = message.is_in_channel(), "webhook delivered");
        Ok(())
    }
}
