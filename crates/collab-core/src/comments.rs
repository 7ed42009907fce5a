//! The comment side channel.
//!
//! Comments travel next to the step stream with their own version counter.
//! Only the queueing contract lives here: payloads are opaque JSON.

use serde_json::Value;

/// A comment update carried by a transaction.
#[derive(Debug, Clone, PartialEq)]
pub enum CommentMeta {
    /// A local event to queue for the next send.
    Local(Value),
    /// Events from the server. `sent` is the number of queued local events
    /// the server acknowledged.
    Receive {
        version: u64,
        events: Vec<Value>,
        sent: usize,
    },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommentLog {
    version: u64,
    events: Vec<Value>,
    unsent: Vec<Value>,
}

impl CommentLog {
    pub fn new(version: u64, events: Vec<Value>) -> Self {
        Self {
            version,
            events,
            unsent: Vec::new(),
        }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn events(&self) -> &[Value] {
        &self.events
    }

    /// Local events waiting to be sent.
    pub fn unsent(&self) -> &[Value] {
        &self.unsent
    }

    pub fn apply(&mut self, meta: Option<&CommentMeta>) {
        match meta {
            None => {}
            Some(CommentMeta::Local(event)) => {
                self.events.push(event.clone());
                self.unsent.push(event.clone());
            }
            Some(CommentMeta::Receive {
                version,
                events,
                sent,
            }) => {
                self.version = *version;
                self.unsent.drain(..(*sent).min(self.unsent.len()));
                self.events.extend(events.iter().cloned());
            }
        }
    }
}
