//! HTTP endpoint the game mod posts drop events and mod configs to.

use crate::app::AppContext;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use dropkeeper_core::ingest::failed_insert_notice;
use dropkeeper_core::models::CheckEvent;
use dropkeeper_core::{DropEvent, DropkeeperError, ingest_drop};
use serde_json::{Value, json};
use std::sync::Arc;

pub fn router(ctx: Arc<AppContext>) -> Router {
    Router::new()
        .route("/item-drop-events/", post(create_item_drop_event))
        .route("/check/", post(check))
        .route(
            "/mod-config/{mod_name}",
            post(save_mod_config).get(load_mod_config),
        )
        .with_state(ctx)
}

pub async fn serve(ctx: Arc<AppContext>) -> anyhow::Result<()> {
    let addr = ctx.config.bind_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "Webhook listening");
    axum::serve(listener, router(ctx)).await?;
    Ok(())
}

/// * `200` when the event was stored.
/// * `400` when a field is empty; nothing is stored and a notice is queued.
/// * `500` when the insert failed.
async fn create_item_drop_event(
    State(ctx): State<Arc<AppContext>>,
    Json(event): Json<DropEvent>,
) -> (StatusCode, Json<Value>) {
    let stored = {
        let event = event.clone();
        ctx.blocking(move |app| ingest_drop(&app.drops, &event)).await.and_then(|r| r)
    };
    match stored {
        Ok(()) => (StatusCode::OK, Json(json!({ "status": "stored" }))),
        Err(DropkeeperError::Validation(reason)) => {
            ctx.notify(failed_insert_notice(&event));
            (StatusCode::BAD_REQUEST, Json(json!({ "error": reason })))
        }
        Err(e) => {
            tracing::error!(error = %e, suid = %event.suid, "Failed to store drop event");
            ctx.notify(failed_insert_notice(&event));
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            )
        }
    }
}

async fn check(Json(event): Json<CheckEvent>) -> (StatusCode, Json<Value>) {
    tracing::info!(success = %event.success, "Mod check-in");
    (StatusCode::OK, Json(json!({ "success": event.success })))
}

async fn save_mod_config(
    State(ctx): State<Arc<AppContext>>,
    Path(mod_name): Path<String>,
    Json(config): Json<Value>,
) -> (StatusCode, Json<Value>) {
    match ctx.mod_configs.save(&mod_name, config) {
        Ok(()) => (StatusCode::OK, Json(json!({ "status": "saved" }))),
        Err(DropkeeperError::Validation(reason)) => {
            (StatusCode::BAD_REQUEST, Json(json!({ "error": reason })))
        }
        Err(e) => {
            tracing::error!(mod_name = %mod_name, error = %e, "Failed to save mod config");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            )
        }
    }
}

async fn load_mod_config(
    State(ctx): State<Arc<AppContext>>,
    Path(mod_name): Path<String>,
) -> (StatusCode, Json<Value>) {
    match ctx.mod_configs.load(&mod_name) {
        Ok(Some(config)) => (StatusCode::OK, Json(config)),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("No config saved for {}", mod_name) })),
        ),
        Err(e) => {
            tracing::error!(mod_name = %mod_name, error = %e, "Failed to load mod config");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::tests::test_context;
    use axum::body::Body;
    use axum::http::{Request, header};
    use dropkeeper_core::QueryOutcome;
    use tower::ServiceExt;

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn event(suid: &str) -> Value {
        json!({
            "server_name": "Island",
            "user_id": "1001",
            "character_name": "Rex",
            "item_dropped": "Ascended Ring",
            "chance": "0.5",
            "dropped_by_dino": "Giga",
            "server_max_level": "180",
            "had_4_leaf_clover": "False",
            "server_drop_chance": "1 in 200",
            "suid": suid,
        })
    }

    #[tokio::test]
    async fn test_complete_event_is_stored() {
        let dir = tempfile::tempdir().unwrap();
        let (ctx, _rx) = test_context(dir.path());

        let response = router(ctx.clone())
            .oneshot(post_json("/item-drop-events/", event("s-1")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let rows = ctx.drops.select("*", None).rows().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].text("suid").as_deref(), Some("s-1"));
    }

    #[tokio::test]
    async fn test_partial_event_rejected_with_notice() {
        let dir = tempfile::tempdir().unwrap();
        let (ctx, mut rx) = test_context(dir.path());

        let mut partial = event("s-2");
        partial["item_dropped"] = json!("");
        let response = router(ctx.clone())
            .oneshot(post_json("/item-drop-events/", partial))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(ctx.drops.select("*", None), QueryOutcome::Empty);
        assert!(rx.try_recv().unwrap().starts_with("Failed Insert: {server_name: 'Island'"));
    }

    #[tokio::test]
    async fn test_duplicate_event_fails_with_notice() {
        let dir = tempfile::tempdir().unwrap();
        let (ctx, mut rx) = test_context(dir.path());

        let first = router(ctx.clone())
            .oneshot(post_json("/item-drop-events/", event("s-3")))
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::OK);

        let replay = router(ctx.clone())
            .oneshot(post_json("/item-drop-events/", event("s-3")))
            .await
            .unwrap();
        assert_eq!(replay.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(ctx.drops.select("*", None).rows().unwrap().len(), 1);
        assert!(rx.try_recv().unwrap().starts_with("Failed Insert: {server_name: 'Island'"));
    }

    #[tokio::test]
    async fn test_check_acknowledges() {
        let dir = tempfile::tempdir().unwrap();
        let (ctx, _rx) = test_context(dir.path());

        let response = router(ctx)
            .oneshot(post_json("/check/", json!({ "success": "true" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({ "success": "true" }));
    }

    #[tokio::test]
    async fn test_mod_config_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let (ctx, _rx) = test_context(dir.path());

        let saved = router(ctx.clone())
            .oneshot(post_json("/mod-config/Ascended", json!({ "rate": 2 })))
            .await
            .unwrap();
        assert_eq!(saved.status(), StatusCode::OK);

        let loaded = router(ctx.clone())
            .oneshot(Request::get("/mod-config/Ascended").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(loaded.status(), StatusCode::OK);
        assert_eq!(body_json(loaded).await, json!({ "rate": 2 }));

        let missing = router(ctx)
            .oneshot(Request::get("/mod-config/Other").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    }
}
