//! JSON bodies exchanged over the HTTP surface

use serde::{Deserialize, Serialize};

/// Link state inside the session; reported over HTTP only as `isConnected`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Whether commands actually reach the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Real,
    Mock,
}

/// Result of `POST /connect`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionStatus {
    pub connected: bool,
    pub message: String,
}

/// Result of `POST /clock/update`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClockUpdateResult {
    pub success: bool,
    pub time: String,
}

/// Short view served by `GET /state`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClockState {
    pub is_connected: bool,
    pub current_time: Option<String>,
    pub is_visible: bool,
}

/// Full view served by `GET /status`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStatusDetails {
    pub is_connected: bool,
    pub current_time: Option<String>,
    pub is_visible: bool,
    pub auto_update_enabled: bool,
    pub last_command: Option<String>,
    pub next_update_time: Option<String>,
    pub mode: Mode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToggleRequest {
    pub visible: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToggleResponse {
    pub success: bool,
    pub visible: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoUpdateRequest {
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoUpdateResponse {
    pub success: bool,
    pub auto_update_enabled: bool,
}

/// Body of every non-2xx response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}
