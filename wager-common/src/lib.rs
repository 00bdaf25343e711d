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

use std::num::ParseIntError;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub const DEFAULT_FINALIZE_SECONDS: u64 = 30;
pub const SLASH_COMMAND: &str = "/cg";

pub type UserId = String;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ResponseType {
    InChannel,
}

/// Payload posted to a slash-command `response_url`.
///
/// Private replies leave `response_type` unset so the field is omitted from
/// the JSON body entirely.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SlackMessage {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_type: Option<ResponseType>,
}

impl SlackMessage {
    pub fn in_channel(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            response_type: Some(ResponseType::InChannel),
        }
    }

    pub fn private(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            response_type: None,
        }
    }

    pub fn is_in_channel(&self) -> bool {
        self.response_type == Some(ResponseType::InChannel)
    }
}

/// Form fields sent by the chat platform with every slash-command invocation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SlashCommandForm {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub user_id: UserId,
    #[serde(default)]
    pub response_url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Roll,
    Help,
}

/// Errors from wager commands. Game-rule violations are reported back to the
/// user as chat messages; malformed `start` arguments fail the request.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WagerError {
    #[error("there's another active wager. it must finish before another can be created")]
    AlreadyActive,

    #[error("there is not an active wager. use `/cg start` to create one")]
    NoActiveWager,

    #[error("cannot reroll")]
    Reroll,

    #[error("wager quantity must be greater than zero")]
    NonPositiveQuantity,

    #[error("quantity must be set: /cg start 100 chicken nuggets")]
    MissingQuantity,

    #[error("quantity could not be parsed: {0}")]
    InvalidQuantity(#[from] ParseIntError),
}

impl WagerError {
    pub fn is_malformed_input(&self) -> bool {
        matches!(
            self,
            WagerError::MissingQuantity | WagerError::InvalidQuantity(_)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartArgs {
    pub quantity: i64,
    pub unit: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Roll {
    pub user_id: UserId,
    pub value: i64,
}

#[derive(Debug, Clone)]
pub struct Wager {
    wager_id: Uuid,
    quantity: i64,
    unit: String,
    rolls: Vec<Roll>,
    started_by: UserId,
    callback_url: String,
    created_at: DateTime<Utc>,
}

impl Wager {
    pub fn new(
        args: StartArgs,
        started_by: impl Into<UserId>,
        callback_url: impl Into<String>,
    ) -> Result<Self, WagerError> {
        if args.quantity <= 0 {
            return Err(WagerError::NonPositiveQuantity);
        }

        Ok(Self {
            wager_id: Uuid::new_v4(),
            quantity: args.quantity,
            unit: args.unit,
            rolls: Vec::new(),
            started_by: started_by.into(),
            callback_url: callback_url.into(),
            created_at: Utc::now(),
        })
    }

    pub fn wager_id(&self) -> Uuid {
        self.wager_id
    }

    pub fn quantity(&self) -> i64 {
        self.quantity
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    pub fn rolls(&self) -> &[Roll] {
        &self.rolls
    }

    pub fn started_by(&self) -> &str {
        &self.started_by
    }

    pub fn callback_url(&self) -> &str {
        &self.callback_url
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Draw a value in `[0, quantity)` for `user_id`. Each user rolls once.
    pub fn add_roll<R: Rng>(
        &mut self,
        user_id: impl Into<UserId>,
        rng: &mut R,
    ) -> Result<&Roll, WagerError> {
        let user_id = user_id.into();
        if self.rolls.iter().any(|roll| roll.user_id == user_id) {
            return Err(WagerError::Reroll);
        }

        let value = rng.random_range(0..self.quantity);
        self.rolls.push(Roll { user_id, value });
        Ok(&self.rolls[self.rolls.len() - 1])
    }

    /// Pick the lowest roll as winner and the highest as loser.
    ///
    /// The first roll seeds both sides and later rolls only replace a side on
    /// a strict improvement, so ties always go to the earlier roll. With fewer
    /// than two rolls the winner and loser are the same and nobody owes
    /// anything.
    pub fn settle(&self) -> Settlement {
        let mut rolls = self.rolls.iter();
        let Some(first) = rolls.next() else {
            return Settlement {
                winner: Roll::default(),
                loser: Roll::default(),
                delta: 0,
                unit: self.unit.clone(),
            };
        };

        let mut winner = first;
        let mut loser = first;
        for roll in rolls {
            if roll.value > loser.value {
                loser = roll;
            }
            if roll.value < winner.value {
                winner = roll;
            }
        }

        Settlement {
            winner: winner.clone(),
            loser: loser.clone(),
            delta: loser.value - winner.value,
            unit: self.unit.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settlement {
    pub winner: Roll,
    pub loser: Roll,
    pub delta: i64,
    pub unit: String,
}

impl Settlement {
    pub fn message(&self) -> SlackMessage {
        SlackMessage::in_channel(format!(
            "<@{}> owes <@{}> {}",
            self.loser.user_id,
            self.winner.user_id,
            amount_with_unit(self.delta, &self.unit)
        ))
    }
}

pub fn parse_command(text: &str) -> Command {
    match text.split_whitespace().next() {
        Some("start") => Command::Start,
        Some("roll") => Command::Roll,
        _ => Command::Help,
    }
}

/// Parse `start <quantity> [unit...]`. The unit keeps its inner spacing.
pub fn parse_start(text: &str) -> Result<StartArgs, WagerError> {
    let rest = text
        .trim()
        .split_once(char::is_whitespace)
        .map(|(_, rest)| rest.trim_start())
        .unwrap_or_default();
    if rest.is_empty() {
        return Err(WagerError::MissingQuantity);
    }

    let (quantity_text, unit) = rest
        .split_once(char::is_whitespace)
        .map(|(quantity, unit)| (quantity, unit.trim()))
        .unwrap_or((rest, ""));

    Ok(StartArgs {
        quantity: quantity_text.parse::<i64>()?,
        unit: unit.to_string(),
    })
}

pub fn started_message(wager: &Wager) -> SlackMessage {
    SlackMessage::in_channel(format!(
        "<@{}> started a game: {}\nUse `{SLASH_COMMAND} roll` to join",
        wager.started_by(),
        amount_with_unit(wager.quantity(), wager.unit())
    ))
}

pub fn rolled_message(roll: &Roll) -> SlackMessage {
    SlackMessage::in_channel(format!("<@{}> rolled {}", roll.user_id, roll.value))
}

pub fn help_message() -> SlackMessage {
    SlackMessage::private(format!(
        "usage:\n`{SLASH_COMMAND} start <quantity> [unit]` starts a wager\n`{SLASH_COMMAND} roll` joins the active wager"
    ))
}

fn amount_with_unit(amount: i64, unit: &str) -> String {
    if unit.is_empty() {
        amount.to_string()
    } else {
        format!("{amount} {unit}")
    }
}
