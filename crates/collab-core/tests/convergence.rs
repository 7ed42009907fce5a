//! Clients driven against an in-process server must converge.

use collab_core::{
    Action, ClientId, CommMode, Document, Effect, EventsResponse, ReplaceStep, RequestError,
    SendAck, SendRequest, Snapshot, Step, SyncConfig, SyncState, TextDoc,
};
use proptest::prelude::*;

type State = SyncState<ReplaceStep>;

// =============================================================================
// Test harness
// =============================================================================

/// The server side of the protocol, kept in memory.
struct Server {
    doc: TextDoc,
    steps: Vec<ReplaceStep>,
    client_ids: Vec<ClientId>,
}

impl Server {
    fn new(text: &str) -> Self {
        Self {
            doc: TextDoc::new(text),
            steps: Vec::new(),
            client_ids: Vec::new(),
        }
    }

    fn version(&self) -> u64 {
        self.steps.len() as u64
    }

    fn snapshot(&self) -> Snapshot<TextDoc> {
        Snapshot {
            doc: self.doc.clone(),
            version: self.version(),
            users: Some(2),
            comments: Vec::new(),
            comment_version: 0,
        }
    }

    fn events(&self, version: u64) -> Result<EventsResponse<ReplaceStep>, RequestError> {
        if version > self.version() {
            return Err(RequestError::Status {
                status: 400,
                message: "Invalid version".into(),
            });
        }
        let from = version as usize;
        Ok(EventsResponse {
            steps: self.steps[from..].to_vec(),
            client_ids: self.client_ids[from..].to_vec(),
            comment: Vec::new(),
            comment_version: 0,
            users: None,
        })
    }

    fn submit(&mut self, request: SendRequest<ReplaceStep>) -> Result<SendAck, RequestError> {
        if request.version != self.version() {
            return Err(RequestError::Status {
                status: 409,
                message: "Version not current".into(),
            });
        }
        let mut doc = self.doc.clone();
        for step in &request.steps {
            doc = step.apply(&doc).map_err(|e| RequestError::Status {
                status: 400,
                message: e.to_string(),
            })?;
        }
        self.doc = doc;
        for step in request.steps {
            self.steps.push(step);
            self.client_ids.push(request.client_id);
        }
        Ok(SendAck::default())
    }
}

/// A client whose effects are executed by hand against a [`Server`].
struct Client {
    state: Option<State>,
    request: Option<Effect<ReplaceStep>>,
}

impl Client {
    fn connect(id: u32) -> Self {
        let (state, effects) = State::start(ClientId::from_raw(id), SyncConfig::default());
        let mut client = Self {
            state: Some(state),
            request: None,
        };
        client.run(effects);
        client
    }

    fn state(&self) -> &State {
        self.state.as_ref().unwrap()
    }

    fn doc(&self) -> &TextDoc {
        self.state().edit().unwrap().doc()
    }

    fn dispatch(&mut self, action: Action<ReplaceStep>) {
        let (state, effects) = self.state.take().unwrap().dispatch(action);
        self.state = Some(state);
        self.run(effects);
    }

    fn run(&mut self, effects: Vec<Effect<ReplaceStep>>) {
        for effect in effects {
            match effect {
                Effect::FetchSnapshot { .. } | Effect::Poll { .. } | Effect::Send { .. } => {
                    self.request = Some(effect)
                }
                Effect::Abort(_) => self.request = None,
                Effect::ScheduleRetry { .. } | Effect::Report(_) => {}
            }
        }
    }

    fn edit(&mut self, step: ReplaceStep) {
        let mut tr = self.state().edit().unwrap().tr();
        if tr.step(step).is_ok() {
            self.dispatch(Action::Transaction(tr));
        }
    }

    /// Answers the outstanding request if the server can. Returns whether
    /// anything happened.
    fn deliver(&mut self, server: &mut Server) -> bool {
        let Some(request) = self.request.take() else {
            return false;
        };
        let action = match request {
            Effect::FetchSnapshot { id } => Action::Loaded {
                id,
                snapshot: server.snapshot(),
            },
            Effect::Poll { id, version, .. } => {
                if version == server.version() {
                    self.request = Some(request);
                    return false;
                }
                match server.events(version) {
                    Ok(response) => Action::Polled { id, response },
                    Err(error) => Action::Failed { id, error },
                }
            }
            Effect::Send { id, request } => match server.submit(request) {
                Ok(ack) => Action::Sent { id, ack },
                Err(error) => Action::Failed { id, error },
            },
            _ => return false,
        };
        self.dispatch(action);
        true
    }
}

fn settle(server: &mut Server, clients: &mut [Client]) {
    for _ in 0..1000 {
        let mut progressed = false;
        for client in clients.iter_mut() {
            progressed |= client.deliver(server);
        }
        if !progressed {
            return;
        }
    }
    panic!("clients did not settle");
}

// =============================================================================
// Scenarios
// =============================================================================

#[test]
fn concurrent_edits_converge() {
    let mut server = Server::new("hello world");
    let mut clients = vec![Client::connect(1), Client::connect(2)];
    settle(&mut server, &mut clients);

    clients[0].edit(ReplaceStep::insert(0, "A: "));
    clients[1].edit(ReplaceStep::insert(11, "!"));
    clients[1].edit(ReplaceStep::delete(0, 5));
    settle(&mut server, &mut clients);

    assert_eq!(server.doc.as_str(), "A:  world!");
    for client in &clients {
        assert_eq!(client.doc(), &server.doc);
        assert_eq!(client.state().comm(), CommMode::Poll);
        assert_eq!(client.state().edit().unwrap().version(), server.version());
        assert!(client.state().edit().unwrap().sendable().is_none());
    }
}

#[test]
fn remote_steps_arrive_in_order() {
    let mut server = Server::new("");
    let mut clients = vec![Client::connect(1), Client::connect(2)];
    settle(&mut server, &mut clients);

    clients[0].edit(ReplaceStep::insert(0, "one"));
    settle(&mut server, &mut clients);
    clients[0].edit(ReplaceStep::insert(3, " two"));
    settle(&mut server, &mut clients);

    assert_eq!(clients[1].doc().as_str(), "one two");
    let tracker = clients[1].state().edit().unwrap().tracker();
    assert!(!tracker.is_dirty());
    assert_eq!(tracker.blame().segments().len(), 1);
}

#[test]
fn conflicting_send_rebases_and_retries() {
    let mut server = Server::new("abc");
    let mut clients = vec![Client::connect(1), Client::connect(2)];
    settle(&mut server, &mut clients);

    // Both clients send against version 0; whoever goes second gets a 409.
    clients[0].edit(ReplaceStep::insert(3, "X"));
    clients[1].edit(ReplaceStep::insert(0, "Y"));
    assert!(clients[0].deliver(&mut server));
    assert!(clients[1].deliver(&mut server));
    assert_eq!(clients[1].state().comm(), CommMode::Poll);
    assert_eq!(
        clients[1].state().edit().unwrap().collab().unconfirmed().len(),
        1
    );

    settle(&mut server, &mut clients);
    assert_eq!(server.doc.as_str(), "YabcX");
    assert_eq!(clients[0].doc(), clients[1].doc());
}

// =============================================================================
// Convergence properties
// =============================================================================

#[derive(Clone, Debug)]
enum Op {
    Insert {
        client: usize,
        pos_pct: f64,
        text: String,
    },
    Delete {
        client: usize,
        pos_pct: f64,
        len_pct: f64,
    },
    Deliver {
        client: usize,
    },
}

fn arbitrary_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..3usize, 0.0..=1.0f64, "[a-z]{1,5}").prop_map(|(client, pos_pct, text)| Op::Insert {
            client,
            pos_pct,
            text
        }),
        (0..3usize, 0.0..=1.0f64, 0.0..=0.5f64).prop_map(|(client, pos_pct, len_pct)| {
            Op::Delete {
                client,
                pos_pct,
                len_pct,
            }
        }),
        (0..3usize).prop_map(|client| Op::Deliver { client }),
    ]
}

fn apply_op(server: &mut Server, clients: &mut [Client], op: &Op) {
    match op {
        Op::Insert {
            client,
            pos_pct,
            text,
        } => {
            let len = clients[*client].doc().size();
            let pos = ((pos_pct * len as f64) as usize).min(len);
            clients[*client].edit(ReplaceStep::insert(pos, text.clone()));
        }
        Op::Delete {
            client,
            pos_pct,
            len_pct,
        } => {
            let len = clients[*client].doc().size();
            if len == 0 {
                return;
            }
            let start = ((pos_pct * len as f64) as usize).min(len - 1);
            let count = ((len_pct * (len - start) as f64) as usize).max(1);
            clients[*client].edit(ReplaceStep::delete(start, start + count));
        }
        Op::Deliver { client } => {
            clients[*client].deliver(server);
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// After the network goes quiet every client holds the server's document.
    #[test]
    fn clients_converge(ops in prop::collection::vec(arbitrary_op(), 1..60)) {
        let mut server = Server::new("the quick brown fox");
        let mut clients = vec![Client::connect(1), Client::connect(2), Client::connect(3)];
        settle(&mut server, &mut clients);

        for op in &ops {
            apply_op(&mut server, &mut clients, op);
        }
        settle(&mut server, &mut clients);

        for client in &clients {
            prop_assert_eq!(client.doc(), &server.doc);
            prop_assert_eq!(client.state().edit().unwrap().version(), server.version());
        }
    }

    /// The blame partition tiles the document exactly after every action.
    #[test]
    fn blame_partition_stays_valid(ops in prop::collection::vec(arbitrary_op(), 1..60)) {
        let mut server = Server::new("the quick brown fox");
        let mut clients = vec![Client::connect(1), Client::connect(2), Client::connect(3)];
        settle(&mut server, &mut clients);

        for op in &ops {
            apply_op(&mut server, &mut clients, op);
            for client in &clients {
                let edit = client.state().edit().unwrap();
                prop_assert_eq!(edit.tracker().blame().validate(edit.doc().size()), Ok(()));
            }
        }
    }
}
