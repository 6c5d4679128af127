//! Stdout publisher for dry runs.
//!
//! Writes every payload as one line. Useful to check the wire format without
//! a broker.

use crate::{PublishResult, Publisher, PublisherSession};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

type Sink = Arc<Mutex<Box<dyn Write + Send>>>;

/// Stdout publisher - prints payloads instead of publishing them.
pub struct StdoutPublisher {
    sink: Sink,
    published: Arc<AtomicU64>,
}

impl StdoutPublisher {
    /// Create a publisher writing to stdout.
    pub fn new() -> Self {
        Self::with_sink(Box::new(std::io::stdout()))
    }

    /// Create a publisher writing to an arbitrary sink.
    pub fn with_sink(sink: Box<dyn Write + Send>) -> Self {
        Self {
            sink: Arc::new(Mutex::new(sink)),
            published: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Get total payloads written.
    pub fn published_count(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }
}

impl Default for StdoutPublisher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Publisher for StdoutPublisher {
    fn name(&self) -> &'static str {
        "stdout"
    }

    async fn open(&self) -> PublishResult<Box<dyn PublisherSession>> {
        Ok(Box::new(StdoutSession {
            sink: Arc::clone(&self.sink),
            published: Arc::clone(&self.published),
        }))
    }
}

struct StdoutSession {
    sink: Sink,
    published: Arc<AtomicU64>,
}

#[async_trait]
impl PublisherSession for StdoutSession {
    async fn publish_one(&mut self, payload: &[u8]) -> PublishResult<()> {
        // Blocking write, held only for one line. Sinks are a terminal or an
        // in-memory buffer; nothing here waits on the network.
        {
            let mut sink = self.sink.lock();
            sink.write_all(payload)?;
            sink.write_all(b"\n")?;
        }
        self.published.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn close(&mut self) -> PublishResult<()> {
        self.sink.lock().flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    struct Broken;

    impl Write for Broken {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "closed"))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn writes_one_line_per_payload() {
        let captured = Captured::default();
        let publisher = StdoutPublisher::with_sink(Box::new(captured.clone()));

        let mut session = publisher.open().await.unwrap();
        session.publish_one(br#"{"a":1}"#).await.unwrap();
        session.publish_one(br#"{"a":2}"#).await.unwrap();
        session.close().await.unwrap();

        let text = String::from_utf8(captured.0.lock().clone()).unwrap();
        assert_eq!(text, "{\"a\":1}\n{\"a\":2}\n");
        assert_eq!(publisher.published_count(), 2);
    }

    #[tokio::test]
    async fn broken_sink_is_session_level() {
        let publisher = StdoutPublisher::with_sink(Box::new(Broken));
        let mut session = publisher.open().await.unwrap();

        let err = session.publish_one(b"x").await.unwrap_err();
        assert!(err.is_session_level());
        assert_eq!(publisher.published_count(), 0);
    }
}
