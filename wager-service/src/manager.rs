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

use std::{sync::Arc, time::Duration};

use anyhow::Context;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;
use wager_common::{SlackMessage, Wager, WagerError, parse_start, rolled_message, started_message};

use crate::webhook::WebhookPoster;

/// Owns the single active wager. Every state transition goes through
/// `active`, so start, roll and finalize never interleave.
#[derive(Clone)]
pub struct WagerManager {
    active: Arc<Mutex<Option<Wager>>>,
    poster: Arc<dyn WebhookPoster>,
    finalize_after: Duration,
}

impl WagerManager {
    pub fn new(poster: Arc<dyn WebhookPoster>, finalize_after: Duration) -> Self {
        Self {
            active: Arc::new(Mutex::new(None)),
            poster,
            finalize_after,
        }
    }

    pub async fn snapshot(&self) -> Option<Wager> {
        self.active.lock().await.clone()
    }

    pub async fn start_wager(
        &self,
        text: &str,
        callback_url: &str,
        user_id: &str,
    ) -> Result<SlackMessage, WagerError> {
        let mut active = self.active.lock().await;
        if active.is_some() {
            return Err(WagerError::AlreadyActive);
        }

        let wager = Wager::new(parse_start(text)?, user_id, callback_url)?;
        let message = started_message(&wager);
        info!(
            wager_id = %wager.wager_id(),
            user_id = %user_id,
            quantity = wager.quantity(),
            unit = %wager.unit(),
            finalize_after_seconds = self.finalize_after.as_secs(),
            "wager started"
        );

        self.schedule_finalize(wager.wager_id());
        *active = Some(wager);
        Ok(message)
    }

    pub async fn add_roll(&self, user_id: &str) -> Result<SlackMessage, WagerError> {
        let mut active = self.active.lock().await;
        let wager = active.as_mut().ok_or(WagerError::NoActiveWager)?;
        let wager_id = wager.wager_id();
        let roll = wager.add_roll(user_id, &mut rand::rng())?;

        info!(
            wager_id = %wager_id,
            user_id = %roll.user_id,
            value = roll.value,
            "wager roll recorded"
        );
        Ok(rolled_message(roll))
    }

    /// Settle the wager the timer was armed for and post the result to its
    /// callback URL.
    ///
    /// The slot is cleared under the lock before delivery starts, so the
    /// wager is gone whether or not the post succeeds. Returns `None` when
    /// `wager_id` is no longer the active wager.
    pub async fn finalize(&self, wager_id: Uuid) -> anyhow::Result<Option<SlackMessage>> {
        let (callback_url, message) = {
            let mut active = self.active.lock().await;
            let Some(wager) = active.take_if(|wager| wager.wager_id() == wager_id) else {
                warn!(wager_id = %wager_id, "finalize timer fired for inactive wager");
                return Ok(None);
            };

            let settlement = wager.settle();
            info!(
                wager_id = %wager_id,
                rolls = wager.rolls().len(),
                winner = %settlement.winner.user_id,
                loser = %settlement.loser.user_id,
                delta = settlement.delta,
                "wager finalized"
            );
            (wager.callback_url().to_string(), settlement.message())
        };

        self.poster
            .post(&callback_url, &message)
            .await
            .context("failed to post wager result")?;
        Ok(Some(message))
    }

    fn schedule_finalize(&self, wager_id: Uuid) {
        let runner = self.clone();
        let delay = self.finalize_after;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(error) = runner.finalize(wager_id).await {
                warn!(wager_id = %wager_id, error = %error, "wager result was not delivered");
            }
        });
    }
}
