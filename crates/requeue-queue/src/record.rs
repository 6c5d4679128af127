//! Queue records.

/// A payload together with its failed-attempt counter.
///
/// The counter only moves through [`Record::into_retry`], which consumes the
/// record and hands back a new one. Whoever holds a record owns it outright.
///
/// A record also remembers the last drain pass that pulled it, so a drain
/// cycle can tell records it already tried from ones it has not seen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record<P> {
    attempt_count: u32,
    last_pass: u64,
    payload: P,
}

impl<P> Record<P> {
    /// Fresh record with no failed attempts.
    pub fn new(payload: P) -> Self {
        Self::with_attempts(payload, 0)
    }

    pub fn with_attempts(payload: P, attempt_count: u32) -> Self {
        Self {
            attempt_count,
            last_pass: 0,
            payload,
        }
    }

    /// Number of prior failed publish attempts.
    pub fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    /// Drain pass that last pulled this record, `0` if none has.
    pub fn last_pass(&self) -> u64 {
        self.last_pass
    }

    /// Stamp the record as pulled by drain pass `pass`.
    ///
    /// Does not touch the attempt counter.
    pub fn pulled_in(mut self, pass: u64) -> Self {
        self.last_pass = pass;
        self
    }

    pub fn payload(&self) -> &P {
        &self.payload
    }

    pub fn into_payload(self) -> P {
        self.payload
    }

    /// The same payload with one more failed attempt recorded.
    pub fn into_retry(self) -> Self {
        Self {
            attempt_count: self.attempt_count.saturating_add(1),
            last_pass: self.last_pass,
            payload: self.payload,
        }
    }
}
