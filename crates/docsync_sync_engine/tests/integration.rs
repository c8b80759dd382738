//! Integration tests for the pair synchronizer against the reference server.

use std::sync::Arc;
use std::time::Duration;

use docsync_codec::{from_json_str, Value};
use docsync_core::{LocalEvent, MutationOperation, PatchPayload, RetryConfig};
use docsync_sync_engine::{
    CommitProgress, Connection, Connector, HttpMethod, HttpResponse, HttpTransport,
    LoopbackClient, LoopbackServer, PairEvent, PairSynchronizer, SyncConfig, SyncResult, Worker,
};
use docsync_sync_protocol::{
    ClientConfig, ConstructPayload, DocumentEventPayload, DocumentVariant, IdPair, ListenerEvent,
    MutateRequest, PendingPhase, WorkerCommand, WorkerEvent,
};
use docsync_sync_server::{DocumentServer, ServerConfig};
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};

const DATASET: &str = "test";

/// Routes loopback requests to an in-memory server.
#[derive(Clone)]
struct Endpoint {
    server: Arc<DocumentServer>,
    paths: Arc<Mutex<Vec<String>>>,
    failures: Arc<Mutex<Vec<u16>>>,
}

impl Endpoint {
    fn new(server: Arc<DocumentServer>) -> Self {
        Self {
            server,
            paths: Arc::new(Mutex::new(Vec::new())),
            failures: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn fail_next(&self, status: u16) {
        self.failures.lock().push(status);
    }

    fn posted(&self, endpoint: &str) -> usize {
        let prefix = format!("/data/{endpoint}/");
        self.paths
            .lock()
            .iter()
            .filter(|path| path.starts_with(&prefix))
            .count()
    }
}

impl LoopbackServer for Endpoint {
    fn handle(&self, method: HttpMethod, path: &str, body: Option<&[u8]>) -> HttpResponse {
        self.paths.lock().push(path.to_string());
        if method == HttpMethod::Post {
            if let Some(status) = self.failures.lock().pop() {
                return HttpResponse {
                    status,
                    body: b"unavailable".to_vec(),
                };
            }
        }
        let method = match method {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
        };
        let response = self.server.handle_http(method, path, body);
        HttpResponse {
            status: response.status,
            body: response.body,
        }
    }
}

type LoopbackTransport = HttpTransport<LoopbackClient<Endpoint>>;

fn json(text: &str) -> Value {
    from_json_str(text).unwrap()
}

fn client_config() -> ClientConfig {
    ClientConfig::new("http://store.local", DATASET).with_token("test-token")
}

fn server() -> Arc<DocumentServer> {
    let server = Arc::new(DocumentServer::new(ServerConfig::new(DATASET)));
    server
        .seed(json(r#"{"_id": "post", "_rev": "r0", "title": "hello", "views": 1}"#))
        .unwrap();
    server
}

struct Client {
    sync: PairSynchronizer<LoopbackTransport>,
    listener: broadcast::Receiver<ListenerEvent>,
    endpoint: Endpoint,
}

impl Client {
    fn connect(server: &Arc<DocumentServer>, actions: bool) -> Self {
        let pair = IdPair::from_published_id("post");
        let endpoint = Endpoint::new(Arc::clone(server));
        let config = SyncConfig::new(client_config(), pair.clone())
            .with_server_actions(actions)
            .with_timeout(Duration::from_secs(5))
            .with_retry(RetryConfig::new(5).with_initial_delay(Duration::from_millis(1)));
        let transport = Arc::new(HttpTransport::from_sync_config(
            &config,
            LoopbackClient::new(endpoint.clone()),
        ));
        let mut client = Self {
            sync: PairSynchronizer::new(config, transport),
            listener: server.listen(&pair),
            endpoint,
        };
        client.pump();
        client
    }

    /// Delivers every pending listener event.
    fn pump(&mut self) {
        while let Ok(event) = self.listener.try_recv() {
            self.sync.handle_listener_event(event).unwrap();
        }
    }

    fn edit(&mut self, variant: DocumentVariant, ops: Vec<MutationOperation>) -> CommitProgress {
        self.sync.mutate(variant, ops).unwrap();
        self.sync.commit(variant).unwrap();
        self.sync.process_commits().unwrap()
    }

    fn title(&self, variant: DocumentVariant) -> Option<Value> {
        self.sync
            .local(variant)
            .and_then(|doc| doc.get("title"))
            .cloned()
    }
}

fn set_title(id: &str, title: &str) -> Vec<MutationOperation> {
    vec![MutationOperation::patch(
        PatchPayload::new(id).with_set("title", title),
    )]
}

#[test]
fn commit_reaches_server_and_echo_settles() {
    let server = server();
    let mut client = Client::connect(&server, false);
    assert!(client.sync.is_consistent(DocumentVariant::Published));

    let progress = client.edit(DocumentVariant::Published, set_title("post", "hi"));
    assert_eq!(progress, CommitProgress::Idle);
    assert!(!client.sync.is_consistent(DocumentVariant::Published));

    let stored = server.document("post").unwrap();
    assert_eq!(stored.get("title"), Some(&Value::from("hi")));

    client.pump();
    assert!(client.sync.is_consistent(DocumentVariant::Published));
    let local = client.sync.local(DocumentVariant::Published).unwrap();
    assert_eq!(local.revision(), stored.revision());
    assert_eq!(local.get("title"), stored.get("title"));
    assert_eq!(client.endpoint.posted("mutate"), 1);
}

#[test]
fn concurrent_clients_converge() {
    let server = server();
    let mut alice = Client::connect(&server, false);
    let mut bob = Client::connect(&server, false);

    alice.edit(DocumentVariant::Published, set_title("post", "alice"));
    bob.edit(
        DocumentVariant::Published,
        vec![MutationOperation::patch(
            PatchPayload::new("post").with_inc("views", 10),
        )],
    );
    alice.pump();
    bob.pump();

    let stored = server.document("post").unwrap();
    for client in [&alice, &bob] {
        let local = client.sync.local(DocumentVariant::Published).unwrap();
        assert_eq!(local.get("title"), Some(&Value::from("alice")));
        assert_eq!(local.get("views"), stored.get("views"));
        assert!(client.sync.is_consistent(DocumentVariant::Published));
    }
    assert_eq!(stored.get("views"), Some(&Value::from(11)));
}

#[test]
fn conflict_cancels_queue_and_resets_to_head() {
    let server = server();
    let mut alice = Client::connect(&server, false);
    let mut bob = Client::connect(&server, false);

    alice.edit(
        DocumentVariant::Published,
        vec![MutationOperation::delete("post")],
    );
    assert!(server.document("post").is_none());

    let progress = bob.edit(DocumentVariant::Published, set_title("post", "too late"));
    assert_eq!(progress, CommitProgress::Idle);

    let published = bob.sync.document(DocumentVariant::Published).unwrap();
    assert_eq!(published.queued_commits(), 0);
    assert!(!published.has_local_changes());
    assert_eq!(bob.title(DocumentVariant::Published), Some(Value::from("hello")));
    assert!(bob.sync.drain_events().iter().any(|event| matches!(
        event,
        PairEvent::Document {
            variant: DocumentVariant::Published,
            event: LocalEvent::CommitRejected { .. },
        }
    )));

    bob.pump();
    assert!(bob.sync.local(DocumentVariant::Published).is_none());
    assert_eq!(server.transaction_count(), 1);
}

#[test]
fn unavailable_server_is_retried() {
    let server = server();
    let mut client = Client::connect(&server, false);
    client.endpoint.fail_next(503);

    let progress = client.edit(DocumentVariant::Published, set_title("post", "retry"));
    assert!(matches!(progress, CommitProgress::RetryAfter(_)));
    assert_eq!(server.transaction_count(), 0);

    assert_eq!(client.sync.process_commits().unwrap(), CommitProgress::Idle);
    assert_eq!(
        server.document("post").unwrap().get("title"),
        Some(&Value::from("retry"))
    );
    client.pump();
    assert!(client.sync.is_consistent(DocumentVariant::Published));
}

#[test]
fn draft_edits_go_through_actions() {
    let server = server();
    let mut client = Client::connect(&server, true);
    assert!(client.sync.local(DocumentVariant::Draft).is_none());

    let published = server.document("post").unwrap();
    let mut ops = vec![MutationOperation::create_if_not_exists(
        published.with_attribute("_id", Value::from("drafts.post")),
    )];
    ops.extend(set_title("drafts.post", "draft"));
    client.edit(DocumentVariant::Draft, ops);

    assert_eq!(client.endpoint.posted("actions"), 1);
    assert_eq!(client.endpoint.posted("mutate"), 0);
    let draft = server.document("drafts.post").unwrap();
    assert_eq!(draft.get("title"), Some(&Value::from("draft")));
    assert_eq!(draft.get("views"), Some(&Value::from(1)));

    client.pump();
    assert!(client.sync.is_consistent(DocumentVariant::Draft));
    assert_eq!(client.title(DocumentVariant::Draft), Some(Value::from("draft")));

    client.edit(DocumentVariant::Published, set_title("post", "live"));
    assert_eq!(client.endpoint.posted("mutate"), 1);
}

#[test]
fn multi_document_transaction_arrives_bracketed() {
    let server = server();
    let mut client = Client::connect(&server, false);
    client.sync.drain_events();

    server
        .handle_mutate(MutateRequest {
            mutations: vec![
                MutationOperation::create(json(r#"{"_id": "drafts.post", "title": "d"}"#)),
                MutationOperation::patch(PatchPayload::new("post").with_set("title", "p")),
            ],
            transaction_id: Some("other-client".into()),
        })
        .unwrap();
    client.pump();

    let events = client.sync.drain_events();
    let begin = events
        .iter()
        .position(|event| *event == PairEvent::Pending(PendingPhase::Begin))
        .unwrap();
    let end = events
        .iter()
        .position(|event| *event == PairEvent::Pending(PendingPhase::End))
        .unwrap();
    assert!(begin < end);
    assert_eq!(client.title(DocumentVariant::Draft), Some(Value::from("d")));
    assert_eq!(client.title(DocumentVariant::Published), Some(Value::from("p")));
}

/// Opens loopback connections with the listener bridged onto a channel.
struct LoopbackConnector {
    server: Arc<DocumentServer>,
}

impl Connector for LoopbackConnector {
    type Transport = LoopbackTransport;

    fn connect(&self, payload: &ConstructPayload) -> SyncResult<Connection<LoopbackTransport>> {
        let transport = HttpTransport::new(
            payload.client_config.clone(),
            LoopbackClient::new(Endpoint::new(Arc::clone(&self.server))),
        );
        let mut events = self.server.listen(&payload.id_pair);
        let (sender, listener) = mpsc::channel(64);
        tokio::spawn(async move {
            while let Ok(event) = events.recv().await {
                if sender.send(event).await.is_err() {
                    break;
                }
            }
        });
        Ok(Connection {
            transport: Arc::new(transport),
            listener,
        })
    }
}

async fn next_matching(
    events: &mut mpsc::Receiver<WorkerEvent>,
    f: impl Fn(&WorkerEvent) -> bool,
) -> WorkerEvent {
    loop {
        let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .unwrap()
            .unwrap();
        if f(&event) {
            return event;
        }
    }
}

#[tokio::test]
async fn worker_round_trip() {
    let server = server();
    let (command_tx, command_rx) = mpsc::channel(16);
    let (event_tx, mut events) = mpsc::channel(256);
    let worker = Worker::new(
        LoopbackConnector {
            server: Arc::clone(&server),
        },
        event_tx,
    );
    let handle = tokio::spawn(worker.run(command_rx));

    command_tx
        .send(WorkerCommand::Construct(ConstructPayload {
            client_config: client_config(),
            id_pair: IdPair::from_published_id("post"),
            server_actions_enabled: false,
        }))
        .await
        .unwrap();
    next_matching(&mut events, |event| {
        matches!(
            event,
            WorkerEvent::PublishedEvents(DocumentEventPayload::Snapshot { document: Some(_) })
        )
    })
    .await;

    command_tx
        .send(WorkerCommand::mutate(
            DocumentVariant::Published,
            set_title("post", "from worker"),
        ))
        .await
        .unwrap();
    next_matching(&mut events, |event| {
        *event == WorkerEvent::PublishedConsistency(false)
    })
    .await;

    command_tx
        .send(WorkerCommand::commit(DocumentVariant::Published))
        .await
        .unwrap();
    next_matching(&mut events, |event| {
        matches!(
            event,
            WorkerEvent::PublishedEvents(DocumentEventPayload::Committed { .. })
        )
    })
    .await;
    next_matching(&mut events, |event| {
        *event == WorkerEvent::PublishedConsistency(true)
    })
    .await;

    assert_eq!(
        server.document("post").unwrap().get("title"),
        Some(&Value::from("from worker"))
    );

    command_tx.send(WorkerCommand::Dispose).await.unwrap();
    drop(command_tx);
    handle.await.unwrap();
}
