//! The sync reducer.
//!
//! `SyncState::dispatch` is the single entry point for every change to the
//! client's state. It never performs I/O: requests, cancellations, timers and
//! status reports come back as [`Effect`]s for the driver to execute, and
//! their outcomes are fed back in as [`Action`]s.
//!
//! Each request carries a [`RequestId`]. Only the response to the request
//! currently in flight is accepted; anything else is a leftover from a
//! request that was superseded and is dropped.

use std::fmt;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::client_id::ClientId;
use crate::comments::{CommentLog, CommentMeta};
use crate::config::{SyncConfig, calculate_backoff, crosses_delay_notice};
use crate::editor::{EditorState, Sendable};
use crate::events::StatusEvent;
use crate::protocol::{EventsResponse, RequestError, SendAck, SendRequest, Snapshot};
use crate::step::{Document, Step};
use crate::transaction::Transaction;

/// What the connection is doing right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommMode {
    /// Waiting for the document snapshot.
    Start,
    /// Long-polling for remote steps.
    Poll,
    /// Waiting for the server to accept our steps.
    Send,
    /// Waiting to retry after a transient failure.
    Recover,
    /// The document grew too large to sync. Local editing continues.
    Detached,
    /// An unrecoverable error ended the session.
    Dead,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req-{}", self.0)
    }
}

#[derive(Debug, Clone)]
pub enum Action<S: Step> {
    /// The snapshot request finished.
    Loaded {
        id: RequestId,
        snapshot: Snapshot<S::Doc>,
    },
    /// A locally produced transaction (typing, commit, revert, highlight,
    /// comment).
    Transaction(Transaction<S>),
    /// A long poll finished.
    Polled {
        id: RequestId,
        response: EventsResponse<S>,
    },
    /// The server accepted our steps.
    Sent { id: RequestId, ack: SendAck },
    /// A request failed.
    Failed { id: RequestId, error: RequestError },
    /// The retry timer fired.
    Retry,
    /// Drop the local document and reload from the server.
    Restart,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Effect<S: Step> {
    FetchSnapshot {
        id: RequestId,
    },
    Poll {
        id: RequestId,
        version: u64,
        comment_version: u64,
    },
    Send {
        id: RequestId,
        request: SendRequest<S>,
    },
    /// Cancel a request that is still in flight.
    Abort(RequestId),
    /// Dispatch [`Action::Retry`] after `delay`.
    ScheduleRetry {
        delay: Duration,
    },
    Report(StatusEvent),
}

#[derive(Debug, Clone)]
enum Request<S> {
    Snapshot,
    Poll,
    Send { steps: Vec<S>, comments: usize },
}

#[derive(Debug, Clone)]
struct InFlight<S> {
    id: RequestId,
    request: Request<S>,
}

#[derive(Debug, Clone)]
pub struct SyncState<S: Step> {
    edit: Option<EditorState<S>>,
    comm: CommMode,
    client_id: ClientId,
    config: SyncConfig,
    backoff: Duration,
    in_flight: Option<InFlight<S>>,
    next_request: u64,
}

impl<S: Step> SyncState<S> {
    /// A fresh connection. The returned effects fetch the snapshot.
    pub fn start(client_id: ClientId, config: SyncConfig) -> (Self, Vec<Effect<S>>) {
        let mut state = Self {
            edit: None,
            comm: CommMode::Start,
            client_id,
            config,
            backoff: Duration::ZERO,
            in_flight: None,
            next_request: 0,
        };
        let mut effects = Vec::new();
        state.fetch_snapshot(&mut effects);
        (state, effects)
    }

    pub fn edit(&self) -> Option<&EditorState<S>> {
        self.edit.as_ref()
    }

    pub fn comm(&self) -> CommMode {
        self.comm
    }

    pub fn client_id(&self) -> ClientId {
        self.client_id
    }

    /// Current retry delay. Zero after a success.
    pub fn backoff(&self) -> Duration {
        self.backoff
    }

    pub fn in_flight(&self) -> Option<RequestId> {
        self.in_flight.as_ref().map(|f| f.id)
    }

    pub fn dispatch(mut self, action: Action<S>) -> (Self, Vec<Effect<S>>) {
        let mut effects = Vec::new();
        match action {
            Action::Loaded { id, snapshot } => self.loaded(id, snapshot, &mut effects),
            Action::Transaction(tr) => self.transaction(tr, false, &mut effects),
            Action::Polled { id, response } => self.polled(id, response, &mut effects),
            Action::Sent { id, ack } => self.sent(id, ack, &mut effects),
            Action::Failed { id, error } => self.failed(id, error, &mut effects),
            Action::Retry => self.retry(&mut effects),
            Action::Restart => self.restart(&mut effects),
        }
        (self, effects)
    }

    fn loaded(&mut self, id: RequestId, snapshot: Snapshot<S::Doc>, effects: &mut Vec<Effect<S>>) {
        if self.accept(id).is_none() {
            return;
        }
        if self.comm != CommMode::Start {
            warn!(comm = ?self.comm, "snapshot arrived outside of start, ignoring");
            return;
        }
        self.succeeded(effects);
        report_users(snapshot.users, effects);

        info!(
            version = snapshot.version,
            size = snapshot.doc.size(),
            "document loaded"
        );
        let comments = CommentLog::new(snapshot.comment_version, snapshot.comments);
        self.edit = Some(EditorState::new(
            snapshot.doc,
            snapshot.version,
            comments,
            self.client_id,
        ));
        self.comm = CommMode::Poll;
        self.poll(effects);
    }

    fn polled(&mut self, id: RequestId, response: EventsResponse<S>, effects: &mut Vec<Effect<S>>) {
        if self.accept(id).is_none() {
            return;
        }
        self.succeeded(effects);
        report_users(response.users, effects);

        if response.is_empty() {
            self.poll(effects);
            return;
        }
        let Some(edit) = &self.edit else {
            return;
        };
        match edit.receive(response.steps, &response.client_ids) {
            Ok(mut tr) => {
                tr.set_comments(CommentMeta::Receive {
                    version: response.comment_version,
                    events: response.comment,
                    sent: 0,
                });
                self.transaction(tr, true, effects);
            }
            Err(e) => {
                warn!(error = %e, "remote steps do not apply, reloading");
                effects.push(Effect::Report(StatusEvent::Failure {
                    error: e.to_string(),
                }));
                self.restart(effects);
            }
        }
    }

    fn sent(&mut self, id: RequestId, ack: SendAck, effects: &mut Vec<Effect<S>>) {
        let Some(Request::Send { steps, comments }) = self.accept(id) else {
            return;
        };
        self.succeeded(effects);
        let Some(edit) = &self.edit else {
            return;
        };

        let client_ids = vec![self.client_id; steps.len()];
        let mut tr = match edit.receive(steps, &client_ids) {
            Ok(tr) => tr,
            Err(e) => {
                warn!(error = %e, "could not confirm sent steps, reloading");
                effects.push(Effect::Report(StatusEvent::Failure {
                    error: e.to_string(),
                }));
                self.restart(effects);
                return;
            }
        };
        tr.set_comments(CommentMeta::Receive {
            version: ack.comment_version,
            events: Vec::new(),
            sent: comments,
        });
        self.transaction(tr, true, effects);
    }

    fn failed(&mut self, id: RequestId, error: RequestError, effects: &mut Vec<Effect<S>>) {
        let Some(request) = self.accept(id) else {
            return;
        };
        match request {
            Request::Send { .. } if error.is_conflict() => {
                debug!("send conflicted, polling first");
                self.backoff = Duration::ZERO;
                self.comm = CommMode::Poll;
                self.poll(effects);
            }
            Request::Send { .. } | Request::Poll if error.is_stale() => {
                warn!(error = %error, "version no longer valid, reloading");
                effects.push(Effect::Report(StatusEvent::Failure {
                    error: error.to_string(),
                }));
                self.restart(effects);
            }
            _ => self.recover(error, effects),
        }
    }

    fn recover(&mut self, error: RequestError, effects: &mut Vec<Effect<S>>) {
        if error.is_fatal() {
            warn!(error = %error, "unrecoverable request error");
            effects.push(Effect::Report(StatusEvent::Failure {
                error: error.to_string(),
            }));
            self.edit = None;
            self.comm = CommMode::Dead;
            return;
        }

        let next = calculate_backoff(self.backoff, &self.config);
        if crosses_delay_notice(self.backoff, next, &self.config) {
            effects.push(Effect::Report(StatusEvent::Delay {
                error: error.to_string(),
            }));
        }
        debug!(error = %error, delay_ms = next.as_millis() as u64, "retrying later");
        self.backoff = next;
        self.comm = CommMode::Recover;
        effects.push(Effect::ScheduleRetry { delay: next });
    }

    fn retry(&mut self, effects: &mut Vec<Effect<S>>) {
        if self.comm != CommMode::Recover {
            return;
        }
        let sendable = self.edit.as_ref().map(EditorState::sendable);
        match sendable {
            None => {
                self.comm = CommMode::Start;
                self.fetch_snapshot(effects);
            }
            Some(Some(sendable)) => {
                self.comm = CommMode::Send;
                self.send(sendable, effects);
            }
            Some(None) => {
                self.comm = CommMode::Poll;
                self.poll(effects);
            }
        }
    }

    fn restart(&mut self, effects: &mut Vec<Effect<S>>) {
        info!("restarting from a fresh snapshot");
        self.edit = None;
        self.comm = CommMode::Start;
        self.fetch_snapshot(effects);
    }

    /// Applies `tr` and decides what the connection does next.
    /// `request_done` is set when `tr` results from a finished request.
    fn transaction(&mut self, tr: Transaction<S>, request_done: bool, effects: &mut Vec<Effect<S>>) {
        let Some(edit) = self.edit.as_mut() else {
            debug!("no document loaded, dropping transaction");
            return;
        };
        if edit.apply_in_place(&tr).is_err() {
            return;
        }

        let size = edit.doc().size();
        let sendable = edit.sendable();

        if size > self.config.max_doc_size {
            if self.comm != CommMode::Detached {
                warn!(size, max = self.config.max_doc_size, "document too big, detaching");
                effects.push(Effect::Report(StatusEvent::Failure {
                    error: "Document too big. Detached.".to_string(),
                }));
            }
            self.abort(effects);
            self.comm = CommMode::Detached;
        } else if let Some(sendable) =
            sendable.filter(|_| self.comm == CommMode::Poll || request_done)
        {
            self.comm = CommMode::Send;
            self.send(sendable, effects);
        } else if request_done {
            self.comm = CommMode::Poll;
            self.poll(effects);
        }
    }

    fn succeeded(&mut self, effects: &mut Vec<Effect<S>>) {
        self.backoff = Duration::ZERO;
        effects.push(Effect::Report(StatusEvent::Success));
    }

    fn fetch_snapshot(&mut self, effects: &mut Vec<Effect<S>>) {
        let id = self.issue(Request::Snapshot, effects);
        effects.push(Effect::FetchSnapshot { id });
    }

    fn poll(&mut self, effects: &mut Vec<Effect<S>>) {
        let Some(edit) = &self.edit else {
            return;
        };
        let version = edit.version();
        let comment_version = edit.comments().version();
        let id = self.issue(Request::Poll, effects);
        effects.push(Effect::Poll {
            id,
            version,
            comment_version,
        });
    }

    fn send(&mut self, sendable: Sendable<S>, effects: &mut Vec<Effect<S>>) {
        let request = Request::Send {
            steps: sendable.steps.clone(),
            comments: sendable.comments.len(),
        };
        let id = self.issue(request, effects);
        debug!(%id, version = sendable.version, steps = sendable.steps.len(), "sending");
        effects.push(Effect::Send {
            id,
            request: SendRequest {
                version: sendable.version,
                steps: sendable.steps,
                client_id: sendable.client_id,
                comment: sendable.comments,
            },
        });
    }

    /// Registers a new in-flight request, cancelling the previous one.
    fn issue(&mut self, request: Request<S>, effects: &mut Vec<Effect<S>>) -> RequestId {
        self.abort(effects);
        let id = RequestId(self.next_request);
        self.next_request += 1;
        self.in_flight = Some(InFlight { id, request });
        id
    }

    fn abort(&mut self, effects: &mut Vec<Effect<S>>) {
        if let Some(previous) = self.in_flight.take() {
            effects.push(Effect::Abort(previous.id));
        }
    }

    /// Takes the in-flight request if `id` belongs to it.
    fn accept(&mut self, id: RequestId) -> Option<Request<S>> {
        match &self.in_flight {
            Some(f) if f.id == id => self.in_flight.take().map(|f| f.request),
            _ => {
                debug!(%id, "ignoring response to a superseded request");
                None
            }
        }
    }
}

fn report_users<S: Step>(users: Option<u32>, effects: &mut Vec<Effect<S>>) {
    if let Some(count) = users {
        effects.push(Effect::Report(StatusEvent::Users { count }));
    }
}
