//! Session state preserved across a resumed connection.

/// Gateway session, used to resume a dropped connection.
///
/// A session is created from a `READY` dispatch and preserved across
/// reconnections that resume; it is destroyed on a fresh identify.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Session {
    /// ID of the session.
    id: Box<str>,
    /// Last received sequence number.
    sequence: u64,
    /// Ordered server trace, supplied in HELLO and refreshed on READY.
    trace: Vec<String>,
}

impl Session {
    /// Create a new session with the given ID and sequence.
    pub fn new(id: impl Into<Box<str>>, sequence: u64) -> Self {
        Self {
            id: id.into(),
            sequence,
            trace: Vec::new(),
        }
    }

    /// ID of the session.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Last received sequence number.
    pub const fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Ordered server trace last supplied by the gateway.
    pub fn trace(&self) -> &[String] {
        &self.trace
    }

    /// Set the last received sequence number.
    ///
    /// Sequence numbers are expected to be monotonic within a session; a
    /// server sending a lower sequence than already observed is a protocol
    /// oddity, not a local bug, so it is logged rather than trusted to crash
    /// the shard.
    pub fn set_sequence(&mut self, sequence: u64) {
        if sequence < self.sequence {
            tracing::warn!(
                previous = self.sequence,
                received = sequence,
                "sequence decreased within session"
            );

            return;
        }

        self.sequence = sequence;
    }

    /// Replace the stored server trace.
    pub(crate) fn set_trace(&mut self, trace: Vec<String>) {
        self.trace = trace;
    }
}

#[cfg(test)]
mod tests {
    use super::Session;
    use static_assertions::assert_impl_all;
    use std::fmt::Debug;

    assert_impl_all!(Session: Clone, Debug, Eq, PartialEq, Send, Sync);

    #[test]
    fn sequence_updates_monotonically() {
        let mut session = Session::new("abc", 1);
        session.set_sequence(2);

        assert_eq!(2, session.sequence());
    }

    #[test]
    fn sequence_decrease_is_ignored_not_fatal() {
        let mut session = Session::new("abc", 5);
        session.set_sequence(1);

        assert_eq!(5, session.sequence());
    }

    #[test]
    fn trace_round_trips() {
        let mut session = Session::new("abc", 1);
        session.set_trace(vec!["node-a".to_owned()]);

        assert_eq!(["node-a"], session.trace());
    }
}
