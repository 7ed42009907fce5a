//! Transactions: a batch of steps applied on top of a document, plus the
//! metadata the editor state's components read when the batch is applied.

use chrono::{DateTime, Utc};

use crate::collab::CollabState;
use crate::comments::CommentMeta;
use crate::highlight::HighlightMeta;
use crate::mapping::Mapping;
use crate::step::{self, Step};
use crate::track::CommitId;

/// Where a step in a transaction came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOrigin {
    /// Produced by this client.
    Local,
    /// Produced by another client and delivered by the server.
    Remote,
    /// Undo or redo of an unconfirmed local step while rebasing over
    /// remote steps.
    Rebase,
}

#[derive(Debug, Clone)]
pub struct Transaction<S: Step> {
    before: S::Doc,
    generation: Option<u64>,
    doc: S::Doc,
    steps: Vec<S>,
    docs: Vec<S::Doc>,
    origins: Vec<StepOrigin>,
    mapping: Mapping,
    time: DateTime<Utc>,
    commit: Option<String>,
    reverts: Option<CommitId>,
    highlight: Option<HighlightMeta>,
    collab: Option<CollabState<S>>,
    comments: Option<CommentMeta>,
}

impl<S: Step> Transaction<S> {
    pub fn new(doc: S::Doc) -> Self {
        Self {
            before: doc.clone(),
            generation: None,
            doc,
            steps: Vec::new(),
            docs: Vec::new(),
            origins: Vec::new(),
            mapping: Mapping::new(),
            time: Utc::now(),
            commit: None,
            reverts: None,
            highlight: None,
            collab: None,
            comments: None,
        }
    }

    /// Applies a local step. On failure the transaction is left unchanged.
    pub fn step(&mut self, step: S) -> step::Result<()> {
        self.step_with_origin(step, StepOrigin::Local)
    }

    pub fn step_with_origin(&mut self, step: S, origin: StepOrigin) -> step::Result<()> {
        let next = step.apply(&self.doc)?;
        self.docs.push(std::mem::replace(&mut self.doc, next));
        self.mapping.append_map(step.get_map(), None);
        self.steps.push(step);
        self.origins.push(origin);
        Ok(())
    }

    /// The document this transaction started from.
    pub fn before(&self) -> &S::Doc {
        &self.before
    }

    /// The editor generation this transaction was built on, when it came
    /// from an editor state.
    pub fn generation(&self) -> Option<u64> {
        self.generation
    }

    pub(crate) fn set_generation(&mut self, generation: u64) -> &mut Self {
        self.generation = Some(generation);
        self
    }

    /// The document after every step so far.
    pub fn doc(&self) -> &S::Doc {
        &self.doc
    }

    pub fn steps(&self) -> &[S] {
        &self.steps
    }

    /// The document each step was applied to.
    pub fn docs(&self) -> &[S::Doc] {
        &self.docs
    }

    /// The document right after step `index`.
    pub fn doc_after(&self, index: usize) -> &S::Doc {
        self.docs.get(index + 1).unwrap_or(&self.doc)
    }

    pub fn origins(&self) -> &[StepOrigin] {
        &self.origins
    }

    pub fn mapping(&self) -> &Mapping {
        &self.mapping
    }

    pub(crate) fn mapping_mut(&mut self) -> &mut Mapping {
        &mut self.mapping
    }

    pub fn doc_changed(&self) -> bool {
        !self.steps.is_empty()
    }

    pub fn time(&self) -> DateTime<Utc> {
        self.time
    }

    /// Seal everything uncommitted (including this batch) under `message`.
    pub fn set_commit(&mut self, message: impl Into<String>) -> &mut Self {
        self.commit = Some(message.into());
        self
    }

    pub fn commit_message(&self) -> Option<&str> {
        self.commit.as_deref()
    }

    pub(crate) fn set_reverts(&mut self, id: CommitId) -> &mut Self {
        self.reverts = Some(id);
        self
    }

    /// The commit this transaction undoes, when it was built by a revert.
    pub fn reverts(&self) -> Option<CommitId> {
        self.reverts
    }

    pub fn set_highlight(&mut self, meta: HighlightMeta) -> &mut Self {
        self.highlight = Some(meta);
        self
    }

    pub fn highlight(&self) -> Option<&HighlightMeta> {
        self.highlight.as_ref()
    }

    pub(crate) fn set_collab(&mut self, state: CollabState<S>) -> &mut Self {
        self.collab = Some(state);
        self
    }

    pub fn collab(&self) -> Option<&CollabState<S>> {
        self.collab.as_ref()
    }

    pub fn set_comments(&mut self, meta: CommentMeta) -> &mut Self {
        self.comments = Some(meta);
        self
    }

    pub fn comments(&self) -> Option<&CommentMeta> {
        self.comments.as_ref()
    }
}
