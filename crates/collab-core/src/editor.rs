//! The local editor state: a document plus every component that derives
//! state from the transactions applied to it.

use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use crate::client_id::ClientId;
use crate::collab::{self, CollabState};
use crate::comments::{CommentLog, CommentMeta};
use crate::highlight::{Highlight, HighlightMeta};
use crate::step::{self, Step};
use crate::track::{self, Attribution, CommitId, Tracker};
use crate::transaction::Transaction;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EditorError {
    #[error("transaction was built on a different document")]
    StaleTransaction,
}

/// What a send request should carry.
#[derive(Debug, Clone, PartialEq)]
pub struct Sendable<S> {
    pub version: u64,
    pub steps: Vec<S>,
    pub client_id: ClientId,
    pub comments: Vec<Value>,
}

#[derive(Debug, Clone)]
pub struct EditorState<S: Step> {
    doc: S::Doc,
    client_id: ClientId,
    collab: CollabState<S>,
    tracker: Tracker<S>,
    comments: CommentLog,
    highlight: Highlight,
    /// Bumped by every applied transaction that changes the document.
    generation: u64,
}

impl<S: Step> EditorState<S> {
    pub fn new(doc: S::Doc, version: u64, comments: CommentLog, client_id: ClientId) -> Self {
        Self {
            tracker: Tracker::new(&doc),
            doc,
            client_id,
            collab: CollabState::new(version),
            comments,
            highlight: Highlight::default(),
            generation: 0,
        }
    }

    pub fn doc(&self) -> &S::Doc {
        &self.doc
    }

    pub fn client_id(&self) -> ClientId {
        self.client_id
    }

    pub fn version(&self) -> u64 {
        self.collab.version()
    }

    pub fn collab(&self) -> &CollabState<S> {
        &self.collab
    }

    pub fn tracker(&self) -> &Tracker<S> {
        &self.tracker
    }

    pub fn comments(&self) -> &CommentLog {
        &self.comments
    }

    pub fn highlight(&self) -> &Highlight {
        &self.highlight
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// A new empty transaction on the current document.
    pub fn tr(&self) -> Transaction<S> {
        let mut tr = Transaction::new(self.doc.clone());
        tr.set_generation(self.generation);
        tr
    }

    /// The state after `tr`.
    pub fn apply(mut self, tr: &Transaction<S>) -> Result<Self, EditorError> {
        self.apply_in_place(tr)?;
        Ok(self)
    }

    /// Applies `tr` to every component. A stale transaction leaves the
    /// state untouched.
    pub fn apply_in_place(&mut self, tr: &Transaction<S>) -> Result<(), EditorError> {
        let stale = match tr.generation() {
            Some(generation) => generation != self.generation,
            None => tr.before() != &self.doc,
        };
        if stale {
            warn!(steps = tr.steps().len(), "dropping stale transaction");
            return Err(EditorError::StaleTransaction);
        }

        self.tracker.record(tr);
        self.highlight = self.highlight.apply(tr, self.tracker.blame());
        self.collab.apply(tr);
        self.comments.apply(tr.comments());
        if tr.doc_changed() {
            self.doc = tr.doc().clone();
            self.generation += 1;
        }
        Ok(())
    }

    /// Local steps and comment events the server has not confirmed yet, or
    /// `None` when there is nothing to send.
    pub fn sendable(&self) -> Option<Sendable<S>> {
        let steps = self.collab.sendable_steps();
        let comments = self.comments.unsent().to_vec();
        if steps.is_empty() && comments.is_empty() {
            return None;
        }
        Some(Sendable {
            version: self.collab.version(),
            steps,
            client_id: self.client_id,
            comments,
        })
    }

    /// Merges steps received from the server.
    pub fn receive(&self, steps: Vec<S>, client_ids: &[ClientId]) -> step::Result<Transaction<S>> {
        let mut tr =
            collab::receive_transaction(&self.doc, &self.collab, steps, client_ids, self.client_id)?;
        tr.set_generation(self.generation);
        Ok(tr)
    }

    /// A transaction sealing every uncommitted step under `message`.
    pub fn commit(&self, message: impl Into<String>) -> Transaction<S> {
        let mut tr = self.tr();
        tr.set_commit(message);
        tr
    }

    pub fn revert(&self, id: CommitId) -> track::Result<Option<Transaction<S>>> {
        let tr = self.tracker.revert(&self.doc, id)?;
        Ok(tr.map(|mut tr| {
            tr.set_generation(self.generation);
            tr
        }))
    }

    pub fn highlight_commit(&self, meta: HighlightMeta) -> Transaction<S> {
        let mut tr = self.tr();
        tr.set_highlight(meta);
        tr
    }

    pub fn add_comment(&self, event: Value) -> Transaction<S> {
        let mut tr = self.tr();
        tr.set_comments(CommentMeta::Local(event));
        tr
    }

    /// Who owns the content at `pos`.
    pub fn blame_at(&self, pos: usize) -> Option<Attribution> {
        self.tracker.query(pos)
    }
}
