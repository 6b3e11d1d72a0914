use std::net::IpAddr;

use serde::{Deserialize, Serialize};

pub type RunId = u32;
pub type TargetId = u32;
/// Absolute instant as nanoseconds since the Unix epoch.
pub type UnixNanos = i64;

/// Metadata of one pinger run as reported by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunInfo {
    pub id: RunId,
    pub description: String,
    pub targets: Vec<TargetInfo>,
    pub interval_millisec: u64,
    pub timeout_millisec: u64,
    pub statistics_counts_num: u64,
    pub statistics_interval_sec: u64,
    pub start_unix_nanosec: UnixNanos,
    pub expire_unix_nanosec: UnixNanos,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetInfo {
    pub id: TargetId,
    /// Address as the operator typed it, possibly a hostname.
    pub requested: String,
    /// Concrete address the server pings.
    pub resolved: String,
    pub comment: String,
}

/// A target as submitted when creating a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTarget {
    pub address: String,
    pub comment: String,
}

impl NewTarget {
    pub fn new(address: impl Into<String>, comment: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            comment: comment.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateRunRequest {
    pub description: String,
    pub targets: Vec<NewTarget>,
    pub stop_pinger_sec: u64,
    pub interval_millisec: u64,
    pub timeout_millisec: u64,
    pub statistics_counts_num: u64,
    pub statistics_interval_sec: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResultEvent {
    Received {
        target_id: TargetId,
        sequence: u32,
        send_unix_nanosec: UnixNanos,
        receive_unix_nanosec: UnixNanos,
    },
    ReceivedAfterTimeout {
        target_id: TargetId,
        sequence: u32,
        send_unix_nanosec: UnixNanos,
        receive_unix_nanosec: UnixNanos,
    },
    TtlExceeded {
        target_id: TargetId,
        sequence: u32,
        receive_unix_nanosec: UnixNanos,
        peer: IpAddr,
    },
    Timeout {
        target_id: TargetId,
        sequence: u32,
        receive_unix_nanosec: UnixNanos,
    },
}

impl ResultEvent {
    pub fn target_id(&self) -> TargetId {
        match self {
            ResultEvent::Received { target_id, .. }
            | ResultEvent::ReceivedAfterTimeout { target_id, .. }
            | ResultEvent::TtlExceeded { target_id, .. }
            | ResultEvent::Timeout { target_id, .. } => *target_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatisticsSnapshot {
    pub counts: Vec<TargetCount>,
}

/// Successful replies for one target within the last window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetCount {
    pub target_id: TargetId,
    pub count: u64,
}
