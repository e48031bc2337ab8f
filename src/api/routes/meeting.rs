//! Meeting state as last reported by the meeting client.

use axum::{extract::State, response::Json, routing::get, Router};
use serde_json::{json, Value};

use super::ApiState;

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/meeting", get(meeting_state))
        .with_state(state)
}

async fn meeting_state(State(state): State<ApiState>) -> Json<Value> {
    let snapshot = state.meeting.borrow().clone();
    Json(json!({
        "connected": state.client.is_connected(),
        "known": snapshot.in_meeting_known,
        "meetingState": snapshot.meeting_state,
        "meetingPermissions": snapshot.meeting_permissions,
    }))
}
