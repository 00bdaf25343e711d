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

mod manager;
mod webhook;

use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use axum::{
    Form, Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{any, get},
};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use wager_common::{
    Command, DEFAULT_FINALIZE_SECONDS, SlackMessage, SlashCommandForm, WagerError, help_message,
    parse_command,
};

use crate::{
    manager::WagerManager,
    webhook::{HttpWebhookPoster, WebhookPoster},
};

#[derive(Clone)]
struct AppState {
    manager: WagerManager,
    poster: Arc<dyn WebhookPoster>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ServiceConfig {
    bind_addr: SocketAddr,
    finalize_after: Duration,
}

impl ServiceConfig {
    fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let port = lookup("PORT")
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| "8080".to_string());
        let bind_addr: SocketAddr = format!("0.0.0.0:{port}")
            .parse()
            .context(format!("invalid PORT {port}"))?;

        let finalize_seconds = lookup("WAGER_FINALIZE_SECONDS")
            .and_then(|value| value.trim().parse::<u64>().ok())
            .unwrap_or(DEFAULT_FINALIZE_SECONDS)
            .max(1);

        Ok(Self {
            bind_addr,
            finalize_after: Duration::from_secs(finalize_seconds),
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "wager_service=debug,tower_http=info".to_string()),
        )
        .init();

    let config = ServiceConfig::from_env()?;
    let poster: Arc<dyn WebhookPoster> = Arc::new(HttpWebhookPoster::new());
    let state = AppState {
        manager: WagerManager::new(poster.clone(), config.finalize_after),
        poster,
    };

    let app = build_router(state);

    info!(
        bind_addr = %config.bind_addr,
        finalize_after_seconds = config.finalize_after.as_secs(),
        "wager-service listening"
    );
    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", any(slash_command_handler))
        .route("/health", get(health))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let active_wager = state.manager.snapshot().await.map(|wager| {
        serde_json::json!({
            "wager_id": wager.wager_id(),
            "quantity": wager.quantity(),
            "unit": wager.unit(),
            "rolls": wager.rolls().len(),
            "created_at": wager.created_at(),
        })
    });
    Json(serde_json::json!({
        "ok": true,
        "service": "wager-service",
        "active_wager": active_wager,
    }))
}

async fn slash_command_handler(
    State(state): State<AppState>,
    Form(form): Form<SlashCommandForm>,
) -> Result<StatusCode, ApiError> {
    if form.response_url.trim().is_empty() {
        return Err(ApiError::bad_request("response_url is required"));
    }

    let message = dispatch(&state.manager, &form)
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?;

    state
        .poster
        .post(&form.response_url, &message)
        .await
        .map_err(|e| ApiError::internal(format!("failed to send response: {e}")))?;

    Ok(StatusCode::OK)
}

/// Route a slash command to the wager manager. Game-rule violations come
/// back as private replies to the caller; malformed arguments are returned
/// as errors and nothing is replied.
async fn dispatch(
    manager: &WagerManager,
    form: &SlashCommandForm,
) -> Result<SlackMessage, WagerError> {
    let command = parse_command(&form.text);
    let outcome = match command {
        Command::Start => {
            manager
                .start_wager(&form.text, &form.response_url, &form.user_id)
                .await
        }
        Command::Roll => manager.add_roll(&form.user_id).await,
        Command::Help => Ok(help_message()),
    };

    match outcome {
        Ok(message) => Ok(message),
        Err(error) if error.is_malformed_input() => Err(error),
        Err(error) => {
            info!(
                user_id = %form.user_id,
                command = ?command,
                reason = %error,
                "command rejected"
            );
            Ok(SlackMessage::private(error.to_string()))
        }
    }
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        warn!(status = %self.status, message = %self.message, "request failed");
        (
            self.status,
            Json(serde_json::json!({"error": self.message})),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::webhook::testing::RecordingPoster;
    use std::collections::HashMap;

    const RESPONSE_URL: &str = "http://hooks.test/response";

    fn app_state(poster: Arc<RecordingPoster>) -> AppState {
        AppState {
            manager: WagerManager::new(poster.clone(), Duration::from_secs(30)),
            poster,
        }
    }

    fn form(text: &str, user_id: &str) -> SlashCommandForm {
        SlashCommandForm {
            text: text.to_string(),
            user_id: user_id.to_string(),
            response_url: RESPONSE_URL.to_string(),
        }
    }

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| vars.get(name).cloned()
    }

    #[test]
    fn config_defaults_to_port_8080_and_thirty_seconds() {
        let config = ServiceConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.bind_addr, "0.0.0.0:8080".parse().unwrap());
        assert_eq!(config.finalize_after, Duration::from_secs(30));
    }

    #[test]
    fn config_reads_port_and_finalize_delay() {
        let config = ServiceConfig::from_lookup(lookup(&[
            ("PORT", "9090"),
            ("WAGER_FINALIZE_SECONDS", "5"),
        ]))
        .unwrap();
        assert_eq!(config.bind_addr, "0.0.0.0:9090".parse().unwrap());
        assert_eq!(config.finalize_after, Duration::from_secs(5));
    }

    #[test]
    fn config_clamps_finalize_delay_and_ignores_garbage() {
        let zero = ServiceConfig::from_lookup(lookup(&[("WAGER_FINALIZE_SECONDS", "0")])).unwrap();
        assert_eq!(zero.finalize_after, Duration::from_secs(1));

        let garbage =
            ServiceConfig::from_lookup(lookup(&[("WAGER_FINALIZE_SECONDS", "soon")])).unwrap();
        assert_eq!(garbage.finalize_after, Duration::from_secs(30));
    }

    #[test]
    fn config_rejects_invalid_port() {
        assert!(ServiceConfig::from_lookup(lookup(&[("PORT", "eighty")])).is_err());
    }

    #[tokio::test]
    async fn dispatch_routes_unknown_commands_to_help() {
        let state = app_state(Arc::new(RecordingPoster::default()));

        let message = dispatch(&state.manager, &form("dance", "ty"))
            .await
            .unwrap();

        assert_eq!(message, help_message());
        assert!(state.manager.snapshot().await.is_none());
    }

    #[tokio::test]
    async fn dispatch_turns_game_errors_into_private_replies() {
        let state = app_state(Arc::new(RecordingPoster::default()));

        let message = dispatch(&state.manager, &form("roll", "ty"))
            .await
            .unwrap();

        assert!(!message.is_in_channel());
        assert_eq!(
            message.text,
            "there is not an active wager. use `/cg start` to create one"
        );
    }

    #[tokio::test]
    async fn dispatch_stores_response_url_as_wager_callback() {
        let state = app_state(Arc::new(RecordingPoster::default()));

        dispatch(&state.manager, &form("start 3 pushups", "jonah"))
            .await
            .unwrap();

        let wager = state.manager.snapshot().await.unwrap();
        assert_eq!(wager.callback_url(), RESPONSE_URL);
        assert_eq!(wager.started_by(), "jonah");
    }

    #[tokio::test]
    async fn handler_posts_reply_to_response_url() {
        let poster = Arc::new(RecordingPoster::default());
        let state = app_state(poster.clone());

        let status = slash_command_handler(
            State(state.clone()),
            Form(form("start 100 chicken nuggets", "jonah")),
        )
        .await
        .unwrap();
        assert_eq!(status, StatusCode::OK);

        slash_command_handler(State(state.clone()), Form(form("roll", "ty")))
            .await
            .unwrap();
        slash_command_handler(State(state), Form(form("roll", "ty")))
            .await
            .unwrap();

        let posted = poster.posted();
        assert_eq!(posted.len(), 3);
        assert!(posted.iter().all(|(url, _)| url == RESPONSE_URL));
        assert!(posted[0].1.is_in_channel());
        assert!(posted[0].1.text.starts_with("<@jonah> started a game: 100"));
        assert!(posted[1].1.is_in_channel());
        assert!(posted[1].1.text.starts_with("<@ty> rolled "));
        assert_eq!(posted[2].1, SlackMessage::private("cannot reroll"));
    }

    #[tokio::test]
    async fn dispatch_returns_malformed_start_as_error() {
        let state = app_state(Arc::new(RecordingPoster::default()));

        let err = dispatch(&state.manager, &form("start", "jonah"))
            .await
            .unwrap_err();
        assert_eq!(err, WagerError::MissingQuantity);

        let message = dispatch(&state.manager, &form("start 0 foo", "jonah"))
            .await
            .unwrap();
        assert_eq!(
            message,
            SlackMessage::private("wager quantity must be greater than zero")
        );
        assert!(state.manager.snapshot().await.is_none());
    }

    #[tokio::test]
    async fn handler_fails_unparseable_quantity_without_replying() {
        let poster = Arc::new(RecordingPoster::default());
        let state = app_state(poster.clone());

        let err = slash_command_handler(
            State(state.clone()),
            Form(form("start abc foo", "jonah")),
        )
        .await
        .unwrap_err();

        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(err.message.starts_with("quantity could not be parsed"));
        assert!(poster.posted().is_empty());
        assert!(state.manager.snapshot().await.is_none());
    }

    #[tokio::test]
    async fn handler_requires_response_url() {
        let poster = Arc::new(RecordingPoster::default());
        let state = app_state(poster.clone());
        let mut request = form("start 10 tacos", "jonah");
        request.response_url = String::new();

        let err = slash_command_handler(State(state.clone()), Form(request))
            .await
            .unwrap_err();

        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert!(state.manager.snapshot().await.is_none());
        assert!(poster.posted().is_empty());
    }

    #[tokio::test]
    async fn handler_returns_internal_error_when_reply_is_not_delivered() {
        let state = app_state(Arc::new(RecordingPoster::failing()));

        let err = slash_command_handler(State(state), Form(form("help", "ty")))
            .await
            .unwrap_err();

        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(err.message.contains("failed to send response"));
    }

    #[tokio::test]
    async fn health_reports_active_wager() {
        let state = app_state(Arc::new(RecordingPoster::default()));

        let idle = health(State(state.clone())).await.0;
        assert_eq!(idle["ok"], true);
        assert!(idle["active_wager"].is_null());

        dispatch(&state.manager, &form("start 12 donuts", "jonah"))
            .await
            .unwrap();
        dispatch(&state.manager, &form("roll", "ty")).await.unwrap();

        let busy = health(State(state)).await.0;
        assert_eq!(busy["active_wager"]["quantity"], 12);
        assert_eq!(busy["active_wager"]["unit"], "donuts");
        assert_eq!(busy["active_wager"]["rolls"], 1);
    }
}
