//! Conversion of queued payloads into broker bytes.

use broker_publisher::{PublishError, PublishResult};
use query_log_record::{QueryLogEntry, QueryLogMessage};

/// A payload the drain loop can publish.
///
/// Encoding happens right before publishing, once per attempt. An encoding
/// failure is charged to the record like any other record-level failure.
pub trait WirePayload: Send + Sync + 'static {
    fn to_wire(&self) -> PublishResult<Vec<u8>>;
}

impl WirePayload for QueryLogEntry {
    fn to_wire(&self) -> PublishResult<Vec<u8>> {
        QueryLogMessage::from(self)
            .encode()
            .map_err(|e| PublishError::Encode(e.to_string()))
    }
}

impl WirePayload for Vec<u8> {
    fn to_wire(&self) -> PublishResult<Vec<u8>> {
        Ok(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_log_entry_encodes_to_message_json() {
        let entry = QueryLogEntry::from_json_line(
            r#"{"timestamp":"2024-03-01T12:00:00Z","remoteEp":"192.0.2.10:53211","protocol":"Udp","questions":[{"name":"Example.com","qtype":1,"qclass":1}],"response":{"rcode":0,"answers":["93.184.216.34"]}}"#,
        )
        .unwrap();

        let bytes = entry.to_wire().unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["qName"], "example.com");
        assert_eq!(value["clientIp"], "192.0.2.10");
        assert_eq!(value["responseType"], 2);
    }

    #[test]
    fn raw_bytes_pass_through() {
        let payload = vec![1u8, 2, 3];
        assert_eq!(payload.to_wire().unwrap(), vec![1, 2, 3]);
    }
}
