//! Broker wire format.

use crate::{QueryLogEntry, RecordError, RecordResult, ResponseType};
use serde::{Deserialize, Serialize};

/// Placeholder published instead of the records of a zone transfer.
pub const ZONE_TRANSFER_ANSWER: &str = "[ZONE TRANSFER]";

/// Flattened view of a [`QueryLogEntry`], serialized as the message body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryLogMessage {
    /// Unix time in milliseconds, as a string.
    pub timestamp: String,
    pub client_ip: String,
    pub protocol: String,
    pub response_type: i32,
    pub r_code: i32,
    pub q_name: Option<String>,
    pub q_type: i32,
    pub q_class: i32,
    pub answer: Option<String>,
}

impl From<&QueryLogEntry> for QueryLogMessage {
    fn from(entry: &QueryLogEntry) -> Self {
        let response_type = entry
            .response
            .response_type
            .unwrap_or(ResponseType::Recursive)
            .code();

        let (q_name, q_type, q_class) = match entry.first_question() {
            Some(q) => (
                Some(q.name.to_lowercase()),
                i32::from(q.qtype),
                i32::from(q.qclass),
            ),
            None => (None, -1, -1),
        };

        let answers = &entry.response.answers;
        let answer = if answers.is_empty() {
            None
        } else if answers.len() > 2 && entry.response.is_zone_transfer {
            Some(ZONE_TRANSFER_ANSWER.to_string())
        } else {
            Some(answers.join(", "))
        };

        Self {
            timestamp: entry.timestamp.timestamp_millis().to_string(),
            client_ip: entry.remote_ep.ip().to_string(),
            protocol: entry.protocol.as_str().to_string(),
            response_type,
            r_code: i32::from(entry.response.rcode),
            q_name,
            q_type,
            q_class,
            answer,
        }
    }
}

impl QueryLogMessage {
    /// JSON body bytes.
    pub fn encode(&self) -> RecordResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(RecordError::Encode)
    }
}
