//! Contains the data models for API requests and responses.

use crate::motion::OperationResult;
use crate::status::Status;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// The fixed set of actions reachable over HTTP.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DoorAction {
    Open,
    Close,
    Status,
    Resume,
}

impl DoorAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            DoorAction::Open => "open",
            DoorAction::Close => "close",
            DoorAction::Status => "status",
            DoorAction::Resume => "resume",
        }
    }
}

impl fmt::Display for DoorAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DoorAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(DoorAction::Open),
            "close" => Ok(DoorAction::Close),
            "status" => Ok(DoorAction::Status),
            "resume" => Ok(DoorAction::Resume),
            other => Err(other.to_string()),
        }
    }
}

/// Response to `/door/action/{name}`.
#[derive(Debug, Serialize)]
pub struct ActionResponse {
    pub action: DoorAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<OperationResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resumed: Option<bool>,
    pub status: Status,
}

/// Response to `/door/status`.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: Status,
    pub busy: bool,
}

/// Body of every error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl Serialize for DoorAction {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_names() {
        for action in [DoorAction::Open, DoorAction::Close, DoorAction::Status, DoorAction::Resume] {
            assert_eq!(action.as_str().parse::<DoorAction>(), Ok(action));
        }
        assert_eq!("stop_and_settle".parse::<DoorAction>(), Err("stop_and_settle".to_string()));
        assert!("Open".parse::<DoorAction>().is_err());
    }

    #[test]
    fn test_action_response_json() {
        let response = ActionResponse {
            action: DoorAction::Open,
            result: Some(OperationResult::MotorBusy),
            resumed: None,
            status: Status::Opening(4),
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"action": "open", "result": "motor_busy", "status": "opening 4"})
        );
    }
}
