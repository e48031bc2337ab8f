//! Local REST API for the tray and other collaborators.
//!
//! Loopback only. Reads come straight from the published snapshots; commands
//! go through the app loop so the recording controller stays the single
//! writer.

pub mod error;
pub mod routes;

use anyhow::{Context, Result};
use axum::{response::Json, routing::get, Router};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tracing::info;

pub use routes::{ApiCommand, ApiState};

pub struct ApiServer {
    port: u16,
    state: ApiState,
}

impl ApiServer {
    pub fn new(port: u16, state: ApiState) -> Self {
        Self { port, state }
    }

    pub fn router(state: ApiState) -> Router {
        Router::new()
            .route("/", get(service_info))
            .merge(routes::recording::router(state.clone()))
            .merge(routes::meeting::router(state))
            .layer(ServiceBuilder::new())
    }

    pub async fn start(self, shutdown: CancellationToken) -> Result<()> {
        let app = Self::router(self.state);

        let listener = tokio::net::TcpListener::bind(("127.0.0.1", self.port))
            .await
            .with_context(|| format!("Failed to bind API port {}", self.port))?;

        info!("API server listening on http://127.0.0.1:{}", self.port);
        info!("Endpoints:");
        info!("  GET  /                 - Service info");
        info!("  GET  /status           - Recording status");
        info!("  GET  /meeting          - Meeting state and permissions");
        info!("  POST /recording/start  - Start recording the current meeting");
        info!("  POST /recording/stop   - Stop recording");
        info!("  PUT  /auto-record      - Toggle recording of all meetings");
        info!("  POST /open-folder      - Open the recording folder");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await
            .context("API server failed")?;

        Ok(())
    }
}

async fn service_info() -> Json<Value> {
    Json(json!({
        "service": "teams-helper",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running"
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConnectionSettings, ReconnectConfig};
    use crate::meeting::MeetingSnapshot;
    use crate::protocol::{ProtocolClient, TokenState, TokenStore};
    use crate::recording::{
        CommandError, CommandOutcome, ControllerCommand, RecordingSnapshot, RecordingStatusHandle,
    };
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use tokio::sync::{mpsc, watch};
    use tower::ServiceExt;

    /// Router whose commands are answered by a stand-in controller.
    fn test_router() -> Router {
        let (tx, mut rx) = mpsc::channel::<ApiCommand>(4);
        tokio::spawn(async move {
            while let Some(command) = rx.recv().await {
                let outcome = match command.command {
                    ControllerCommand::Start => Err(CommandError::NotInMeeting),
                    ControllerCommand::Stop => Ok(CommandOutcome::NotRecording),
                    ControllerCommand::SetAutoRecord(enabled) => {
                        Ok(CommandOutcome::AutoRecord(enabled))
                    }
                    ControllerCommand::OpenFolder => {
                        Ok(CommandOutcome::FolderOpened("/tmp/recordings".into()))
                    }
                };
                let _ = command.reply.send(outcome);
            }
        });

        let (_recording_tx, recording_rx) = watch::channel(RecordingSnapshot {
            auto_record: true,
            ..Default::default()
        });
        let (_meeting_tx, meeting_rx) = watch::channel(MeetingSnapshot::default());
        let (_client, client) = ProtocolClient::new(
            ConnectionSettings::default(),
            ReconnectConfig::default(),
            TokenStore::in_memory(TokenState::default()),
        );

        ApiServer::router(ApiState {
            tx,
            recording: RecordingStatusHandle::new(recording_rx),
            meeting: meeting_rx,
            client,
        })
    }

    async fn call(router: Router, method: &str, uri: &str, body: Body) -> (StatusCode, Value) {
        let response = router
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .header("content-type", "application/json")
                    .body(body)
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_status_reports_idle_service() {
        let (status, json) = call(test_router(), "GET", "/status", Body::empty()).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["recording"], false);
        assert_eq!(json["auto_record"], true);
        assert_eq!(json["connected"], false);
        assert!(json["output_path"].is_null());
    }

    #[tokio::test]
    async fn test_start_outside_meeting_is_conflict() {
        let (status, json) = call(test_router(), "POST", "/recording/start", Body::empty()).await;

        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(json["error"], true);
        assert!(json["message"].as_str().unwrap().contains("meeting"));
    }

    #[tokio::test]
    async fn test_stop_when_idle_succeeds() {
        let (status, json) = call(test_router(), "POST", "/recording/stop", Body::empty()).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["message"], "Not recording");
    }

    #[tokio::test]
    async fn test_auto_record_switch() {
        let (status, json) = call(
            test_router(),
            "PUT",
            "/auto-record",
            Body::from(r#"{"enabled":false}"#),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["auto_record"], false);
    }

    #[tokio::test]
    async fn test_meeting_snapshot_before_first_update() {
        let (status, json) = call(test_router(), "GET", "/meeting", Body::empty()).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["known"], false);
        assert_eq!(json["meetingState"]["isInMeeting"], false);
    }
}
