//! Query log entries as produced by the DNS host.

use crate::{RecordError, RecordResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// Transport the query arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransportProtocol {
    Udp,
    Tcp,
    Tls,
    Https,
    Quic,
}

impl TransportProtocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportProtocol::Udp => "Udp",
            TransportProtocol::Tcp => "Tcp",
            TransportProtocol::Tls => "Tls",
            TransportProtocol::Https => "Https",
            TransportProtocol::Quic => "Quic",
        }
    }
}

/// How the DNS server produced the response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseType {
    Authoritative,
    Recursive,
    Cached,
    Blocked,
    UpstreamBlocked,
    CacheBlocked,
}

impl ResponseType {
    /// Numeric code carried on the wire.
    pub fn code(&self) -> i32 {
        match self {
            ResponseType::Authoritative => 1,
            ResponseType::Recursive => 2,
            ResponseType::Cached => 3,
            ResponseType::Blocked => 4,
            ResponseType::UpstreamBlocked => 5,
            ResponseType::CacheBlocked => 6,
        }
    }
}

/// One entry of the question section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub name: String,
    pub qtype: u16,
    pub qclass: u16,
}

/// The parts of the response that end up in the published message.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseSummary {
    /// Unset when the server did not tag the response.
    #[serde(default)]
    pub response_type: Option<ResponseType>,
    pub rcode: u8,
    /// RDATA of each answer record, rendered as text.
    #[serde(default)]
    pub answers: Vec<String>,
    #[serde(default)]
    pub is_zone_transfer: bool,
}

/// A single answered DNS query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryLogEntry {
    pub timestamp: DateTime<Utc>,
    pub remote_ep: SocketAddr,
    pub protocol: TransportProtocol,
    #[serde(default)]
    pub questions: Vec<Question>,
    pub response: ResponseSummary,
}

impl QueryLogEntry {
    /// Decode one newline-delimited JSON entry.
    pub fn from_json_line(line: &str) -> RecordResult<Self> {
        serde_json::from_str(line.trim()).map_err(RecordError::Decode)
    }

    /// First question, if the request carried one.
    pub fn first_question(&self) -> Option<&Question> {
        self.questions.first()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LINE: &str = r#"{"timestamp":"2024-03-01T12:00:00Z","remoteEp":"192.0.2.10:53211","protocol":"Udp","questions":[{"name":"Example.COM","qtype":1,"qclass":1}],"response":{"responseType":"Cached","rcode":0,"answers":["93.184.216.34"]}}"#;

    #[test]
    fn decodes_host_entry() {
        let entry = QueryLogEntry::from_json_line(LINE).unwrap();
        assert_eq!(entry.remote_ep.port(), 53211);
        assert_eq!(entry.protocol, TransportProtocol::Udp);
        assert_eq!(entry.first_question().unwrap().name, "Example.COM");
        assert_eq!(entry.response.response_type, Some(ResponseType::Cached));
        assert!(!entry.response.is_zone_transfer);
    }

    #[test]
    fn missing_optional_sections_default() {
        let line = r#"{"timestamp":"2024-03-01T12:00:00Z","remoteEp":"[2001:db8::1]:443","protocol":"Https","response":{"rcode":3}}"#;
        let entry = QueryLogEntry::from_json_line(line).unwrap();
        assert!(entry.questions.is_empty());
        assert!(entry.response.answers.is_empty());
        assert_eq!(entry.response.response_type, None);
        assert_eq!(entry.response.rcode, 3);
    }

    #[test]
    fn rejects_malformed_line() {
        let err = QueryLogEntry::from_json_line("{\"timestamp\":").unwrap_err();
        assert!(matches!(err, RecordError::Decode(_)));

        let err = QueryLogEntry::from_json_line(
            r#"{"timestamp":"2024-03-01T12:00:00Z","remoteEp":"nope","protocol":"Udp","response":{"rcode":0}}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("invalid query log entry"));
    }

    #[test]
    fn response_type_codes() {
        assert_eq!(ResponseType::Authoritative.code(), 1);
        assert_eq!(ResponseType::Recursive.code(), 2);
        assert_eq!(ResponseType::CacheBlocked.code(), 6);
    }
}
