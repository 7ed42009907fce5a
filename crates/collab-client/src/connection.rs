//! The tokio driver around the sync state.
//!
//! `Connection` owns the `SyncState` and is the only place actions are
//! dispatched. Requests run in spawned tasks that post their outcome back
//! over an unbounded channel; the owner feeds those into
//! [`Connection::dispatch`] from its event loop, so dispatch is never
//! re-entered.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use collab_core::{
    Action, ClientId, CommMode, CommitId, Effect, EditorState, EventBus, HighlightMeta,
    RequestId, Step, StepError, SyncConfig, SyncState, TrackError, Transaction,
};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::transport::Transport;

/// Message of the commit sealing the seed text.
pub const INITIAL_COMMIT: &str = "Initial commit";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConnectionError {
    #[error("no document loaded")]
    NotLoaded,

    #[error("nothing to commit")]
    NothingToCommit,

    #[error(transparent)]
    Step(#[from] StepError),

    #[error(transparent)]
    Track(#[from] TrackError),
}

pub type Result<T> = std::result::Result<T, ConnectionError>;

pub struct Connection<S: Step, T: Transport<S>> {
    /// Always `Some` outside of `dispatch`.
    state: Option<SyncState<S>>,
    transport: Arc<T>,
    events: Arc<EventBus>,
    action_tx: mpsc::UnboundedSender<Action<S>>,
    action_rx: mpsc::UnboundedReceiver<Action<S>>,
    requests: HashMap<RequestId, JoinHandle<()>>,
    retry: Option<JoinHandle<()>>,
    /// Steps inserted and committed after the first load.
    seed: Option<Vec<S>>,
}

impl<S: Step, T: Transport<S>> Connection<S, T> {
    /// Create the connection and issue the snapshot request.
    ///
    /// Must be called inside a tokio runtime.
    pub fn start(
        client_id: ClientId,
        config: SyncConfig,
        transport: T,
        events: Arc<EventBus>,
    ) -> Self {
        let (action_tx, action_rx) = mpsc::unbounded_channel();
        let (state, effects) = SyncState::start(client_id, config);
        info!("Connecting as client {}", client_id);

        let mut connection = Self {
            state: Some(state),
            transport: Arc::new(transport),
            events,
            action_tx,
            action_rx,
            requests: HashMap::new(),
            retry: None,
            seed: None,
        };
        connection.run(effects);
        connection
    }

    /// Insert `steps` and commit them as [`INITIAL_COMMIT`] once the
    /// document has loaded.
    pub fn with_seed(mut self, steps: Vec<S>) -> Self {
        self.seed = Some(steps);
        self
    }

    pub fn sync_state(&self) -> Option<&SyncState<S>> {
        self.state.as_ref()
    }

    pub fn edit(&self) -> Option<&EditorState<S>> {
        self.state.as_ref().and_then(SyncState::edit)
    }

    pub fn comm(&self) -> Option<CommMode> {
        self.state.as_ref().map(SyncState::comm)
    }

    /// Wait for the next finished request or timer.
    pub async fn next_action(&mut self) -> Option<Action<S>> {
        self.action_rx.recv().await
    }

    pub fn dispatch(&mut self, action: Action<S>) {
        let Some(state) = self.state.take() else {
            return;
        };
        let loaded = matches!(action, Action::Loaded { .. });
        let (state, effects) = state.dispatch(action);
        self.state = Some(state);
        self.run(effects);

        if loaded && self.edit().is_some() {
            self.plant_seed();
        }
    }

    /// Apply a transaction built on the current document.
    pub fn apply(&mut self, tr: Transaction<S>) {
        self.dispatch(Action::Transaction(tr));
    }

    /// Apply `steps` as one local edit.
    pub fn edit_steps(&mut self, steps: impl IntoIterator<Item = S>) -> Result<()> {
        let edit = self.edit().ok_or(ConnectionError::NotLoaded)?;
        let mut tr = edit.tr();
        for step in steps {
            tr.step(step)?;
        }
        self.apply(tr);
        Ok(())
    }

    /// Seal every uncommitted step under `message`.
    pub fn commit(&mut self, message: &str) -> Result<CommitId> {
        let edit = self.edit().ok_or(ConnectionError::NotLoaded)?;
        if !edit.tracker().is_dirty() {
            return Err(ConnectionError::NothingToCommit);
        }
        let id = CommitId::new(edit.tracker().commits().len() as u32);
        let tr = edit.commit(message);
        self.apply(tr);
        Ok(id)
    }

    /// Undo commit `id` on top of the current document. Returns whether
    /// anything was reverted.
    pub fn revert(&mut self, id: CommitId) -> Result<bool> {
        let edit = self.edit().ok_or(ConnectionError::NotLoaded)?;
        match edit.revert(id)? {
            Some(tr) => {
                self.apply(tr);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn highlight(&mut self, meta: HighlightMeta) -> Result<()> {
        let edit = self.edit().ok_or(ConnectionError::NotLoaded)?;
        let tr = edit.highlight_commit(meta);
        self.apply(tr);
        Ok(())
    }

    pub fn comment(&mut self, event: Value) -> Result<()> {
        let edit = self.edit().ok_or(ConnectionError::NotLoaded)?;
        let tr = edit.add_comment(event);
        self.apply(tr);
        Ok(())
    }

    /// Drop the local document and reload it from the server.
    pub fn restart(&mut self) {
        self.dispatch(Action::Restart);
    }

    /// Cancel every outstanding request and timer.
    pub fn close(&mut self) {
        for (id, handle) in self.requests.drain() {
            debug!("Aborting {} on close", id);
            handle.abort();
        }
        if let Some(retry) = self.retry.take() {
            retry.abort();
        }
    }

    fn plant_seed(&mut self) {
        let Some(steps) = self.seed.take() else {
            return;
        };
        if let Err(e) = self.edit_steps(steps) {
            warn!("Could not insert seed text: {}", e);
            return;
        }
        if let Err(e) = self.commit(INITIAL_COMMIT) {
            warn!("Could not commit seed text: {}", e);
        }
    }

    fn run(&mut self, effects: Vec<Effect<S>>) {
        self.requests.retain(|_, handle| !handle.is_finished());
        for effect in effects {
            match effect {
                Effect::FetchSnapshot { id } => {
                    let transport = Arc::clone(&self.transport);
                    self.spawn_request(id, async move {
                        match transport.fetch_snapshot().await {
                            Ok(snapshot) => Action::Loaded { id, snapshot },
                            Err(error) => Action::Failed { id, error },
                        }
                    });
                }
                Effect::Poll {
                    id,
                    version,
                    comment_version,
                } => {
                    let transport = Arc::clone(&self.transport);
                    self.spawn_request(id, async move {
                        match transport.poll(version, comment_version).await {
                            Ok(response) => Action::Polled { id, response },
                            Err(error) => Action::Failed { id, error },
                        }
                    });
                }
                Effect::Send { id, request } => {
                    let transport = Arc::clone(&self.transport);
                    self.spawn_request(id, async move {
                        match transport.send(request).await {
                            Ok(ack) => Action::Sent { id, ack },
                            Err(error) => Action::Failed { id, error },
                        }
                    });
                }
                Effect::Abort(id) => {
                    if let Some(handle) = self.requests.remove(&id) {
                        debug!("Aborting {}", id);
                        handle.abort();
                    }
                }
                Effect::ScheduleRetry { delay } => self.schedule_retry(delay),
                Effect::Report(event) => self.events.emit(event),
            }
        }
    }

    fn spawn_request(
        &mut self,
        id: RequestId,
        request: impl Future<Output = Action<S>> + Send + 'static,
    ) {
        let tx = self.action_tx.clone();
        let handle = tokio::spawn(async move {
            let action = request.await;
            // The receiver lives as long as the connection.
            let _ = tx.send(action);
        });
        self.requests.insert(id, handle);
    }

    fn schedule_retry(&mut self, delay: Duration) {
        if let Some(previous) = self.retry.take() {
            previous.abort();
        }
        debug!("Retrying in {:?}", delay);
        let tx = self.action_tx.clone();
        self.retry = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(Action::Retry);
        }));
    }
}

impl<S: Step, T: Transport<S>> Drop for Connection<S, T> {
    fn drop(&mut self) {
        self.close();
    }
}
