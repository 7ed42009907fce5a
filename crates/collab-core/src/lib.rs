//! collab-core: client side of a collaborative editing protocol with change
//! tracking.
//!
//! This crate provides:
//! - An edit primitive seam (`Step`, `Document`) with a plain-text implementation
//! - Position mapping with mirror pairs
//! - A change tracker: commits, blame partition and selective revert
//! - Confirmation and rebasing of local steps against the server's step stream
//! - The sync reducer that drives the connection, as a pure state machine

pub mod client_id;
pub mod collab;
pub mod comments;
pub mod config;
pub mod editor;
pub mod events;
pub mod highlight;
pub mod mapping;
pub mod protocol;
pub mod step;
pub mod sync;
pub mod text;
pub mod track;
pub mod transaction;

pub use client_id::{ClientId, ClientIdError};
pub use collab::{CollabState, Rebaseable, receive_transaction};
pub use comments::{CommentLog, CommentMeta};
pub use config::SyncConfig;
pub use editor::{EditorError, EditorState, Sendable};
pub use events::{EventBus, StatusEvent, Subscription};
pub use highlight::{Highlight, HighlightMeta};
pub use mapping::{Assoc, Mappable, Mapping, StepMap};
pub use protocol::{EventsResponse, RequestError, SendAck, SendRequest, Snapshot};
pub use step::{Document, Step, StepError};
pub use sync::{Action, CommMode, Effect, RequestId, SyncState};
pub use text::{ReplaceStep, TextDoc};
pub use track::{Attribution, BlamePartition, Commit, CommitId, TrackError, Tracker};
pub use transaction::{StepOrigin, Transaction};
