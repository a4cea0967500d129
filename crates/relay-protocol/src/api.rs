//! Administrative API response bodies.

use serde::{Deserialize, Serialize};

/// Point-in-time registry counters reported by the health endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    /// Distinct user ids with at least one live connection
    pub total_users: usize,
    /// Live connections across all users
    pub total_connections: usize,
    /// Session ids currently indexed
    pub total_sessions: usize,
    /// Messages dropped because a target queue was full
    pub messages_dropped: u64,
}

/// Body returned by `POST /api/send`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendResponse {
    pub status: String,
    pub message: String,
    /// True if at least one connection accepted the message
    pub sent: bool,
}

impl SendResponse {
    pub fn new(sent: bool) -> Self {
        let message = if sent {
            "Message sent successfully"
        } else {
            "No live target accepted the message"
        };
        Self {
            status: "success".to_string(),
            message: message.to_string(),
            sent,
        }
    }
}

/// Body returned by `POST /api/broadcast`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastResponse {
    pub status: String,
    pub message: String,
    /// Number of connections that accepted the message
    pub delivered: usize,
}

impl BroadcastResponse {
    pub fn new(delivered: usize) -> Self {
        Self {
            status: "success".to_string(),
            message: "Broadcast sent successfully".to_string(),
            delivered,
        }
    }
}

/// Body returned by `GET /health`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub stats: StatsSnapshot,
}

impl HealthResponse {
    pub fn healthy(stats: StatsSnapshot) -> Self {
        Self {
            status: "healthy".to_string(),
            stats,
        }
    }
}

/// Body returned for rejected API requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub status: String,
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            error: error.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_response_shape() {
        let stats = StatsSnapshot {
            total_users: 2,
            total_connections: 3,
            total_sessions: 1,
            messages_dropped: 0,
        };
        let value = serde_json::to_value(HealthResponse::healthy(stats)).unwrap();
        assert_eq!(value["status"], "healthy");
        assert_eq!(value["stats"]["total_users"], 2);
        assert_eq!(value["stats"]["total_connections"], 3);
        assert_eq!(value["stats"]["total_sessions"], 1);
    }

    #[test]
    fn test_send_response_reflects_outcome() {
        assert_eq!(SendResponse::new(true).message, "Message sent successfully");
        let miss = SendResponse::new(false);
        assert_eq!(miss.status, "success");
        assert!(!miss.sent);
    }
}
