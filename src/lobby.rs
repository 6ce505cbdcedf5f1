//! HTTP Bootstrap
//!
//! The lobby's request/response surface: a single action-dispatched
//! endpoint that forwards parameters to the registry and the score store.
//! Every action answers with an explicitly tagged payload, so callers never
//! cast an untyped blob. Gameplay traffic never touches this layer; once a
//! client has its two join ports it talks to the session directly.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::network::registry::SessionRegistry;
use crate::store::ScoreStore;

/// Shared handles the lobby handlers work through.
#[derive(Clone)]
pub struct LobbyState {
    /// The instance registry behind `create`, `join`, and `instances`.
    pub registry: Arc<SessionRegistry>,
    /// The account and score records behind `account` and `stats`.
    pub store: Arc<ScoreStore>,
}

/// Tagged response payload, one variant per action's promise.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LobbyResponse {
    /// The two join ports of an instance.
    Ports {
        /// Port of the game-state channel.
        primary: u16,
        /// Port of the heartbeat/roster channel.
        secondary: u16,
    },
    /// Names of instances with at least one connected player.
    Instances {
        /// Order is incidental.
        names: Vec<String>,
    },
    /// Win totals keyed by player name.
    Scores {
        /// Players unknown to the store resolve to 0.
        totals: HashMap<String, i64>,
    },
    /// A human-readable status line.
    Message {
        /// What happened.
        detail: String,
    },
}

#[derive(Debug, Deserialize)]
struct LobbyParams {
    action: Option<String>,
    name: Option<String>,
    username: Option<String>,
    password: Option<String>,
}

/// The lobby router: one endpoint, dispatched on the `action` parameter.
pub fn router(state: LobbyState) -> Router {
    Router::new()
        .route("/lobby", get(lobby_get).post(lobby_post))
        .with_state(state)
}

fn message(status: StatusCode, detail: &str) -> (StatusCode, Json<LobbyResponse>) {
    (
        status,
        Json(LobbyResponse::Message {
            detail: detail.to_string(),
        }),
    )
}

async fn lobby_get(
    State(state): State<LobbyState>,
    Query(params): Query<LobbyParams>,
) -> (StatusCode, Json<LobbyResponse>) {
    match params.action.as_deref() {
        Some("join") => {
            let Some(name) = params.name else {
                return message(StatusCode::BAD_REQUEST, "join requires a name");
            };
            match state.registry.join_ports(&name).await {
                Ok((primary, secondary)) => {
                    (StatusCode::OK, Json(LobbyResponse::Ports { primary, secondary }))
                }
                Err(e) => message(StatusCode::NOT_FOUND, &e.to_string()),
            }
        }
        Some("instances") => {
            let names = state.registry.joinable_instances().await;
            (StatusCode::OK, Json(LobbyResponse::Instances { names }))
        }
        Some("stats") => {
            let totals = state.registry.aggregate_scores().await;
            (StatusCode::OK, Json(LobbyResponse::Scores { totals }))
        }
        _ => message(StatusCode::BAD_REQUEST, "unknown action"),
    }
}

async fn lobby_post(
    State(state): State<LobbyState>,
    Query(params): Query<LobbyParams>,
) -> (StatusCode, Json<LobbyResponse>) {
    match params.action.as_deref() {
        Some("create") => {
            let Some(name) = params.name else {
                return message(StatusCode::BAD_REQUEST, "create requires a name");
            };
            match state.registry.create_instance(&name).await {
                Ok(true) => message(StatusCode::CREATED, "instance created"),
                Ok(false) => message(StatusCode::BAD_REQUEST, "name already taken"),
                Err(e) => {
                    warn!("instance creation failed: {e}");
                    message(StatusCode::INTERNAL_SERVER_ERROR, "could not create instance")
                }
            }
        }
        Some("account") => {
            let (Some(username), Some(password)) = (params.username, params.password) else {
                return message(StatusCode::BAD_REQUEST, "account requires username and password");
            };
            // Unknown names register; known names must present the stored
            // credential. `register` is atomic, so a racing duplicate falls
            // through to the login check.
            let created =
                !state.store.exists(&username).await && state.store.register(&username, &password).await;
            if created {
                message(StatusCode::CREATED, "account created")
            } else if state.store.validate(&username, &password).await {
                message(StatusCode::OK, "login ok")
            } else {
                message(StatusCode::UNAUTHORIZED, "invalid password")
            }
        }
        _ => message(StatusCode::BAD_REQUEST, "unknown action"),
    }
}
