//! Message-dispatch loop hosting one pair synchronizer.
//!
//! The host talks to a [`Worker`] through two channels: [`WorkerCommand`]s in,
//! [`WorkerEvent`]s out. `construct` opens a [`Connection`] through the
//! [`Connector`] and `dispose` closes it again.

use std::future::pending;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use docsync_core::{LocalEvent, MutationOperation};
use docsync_sync_protocol::{
    ConstructPayload, DocumentEventPayload, DocumentVariant, ListenerEvent, WorkerCommand,
    WorkerEvent,
};
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::pair::{CommitProgress, PairEvent, PairSynchronizer};
use crate::transport::DocumentTransport;

/// An open link to the store.
pub struct Connection<T> {
    /// Request transport.
    pub transport: Arc<T>,
    /// Listener stream of the pair.
    pub listener: mpsc::Receiver<ListenerEvent>,
}

/// Opens connections for `construct` commands.
pub trait Connector: Send + Sync {
    /// The transport of opened connections.
    type Transport: DocumentTransport + 'static;

    /// Opens a connection for the pair described by `payload`.
    fn connect(&self, payload: &ConstructPayload) -> SyncResult<Connection<Self::Transport>>;
}

struct Instance<T: DocumentTransport> {
    sync: PairSynchronizer<T>,
    listener: Option<mpsc::Receiver<ListenerEvent>>,
    retry_at: Option<Instant>,
    stall_check_at: Instant,
}

impl<T: DocumentTransport> Instance<T> {
    fn next_stall_check(&self) -> Instant {
        Instant::now() + self.sync.stall_check_interval().max(MIN_STALL_CHECK)
    }
}

const MIN_STALL_CHECK: Duration = Duration::from_secs(1);

enum Step {
    Command(Option<WorkerCommand>),
    Listener(Option<ListenerEvent>),
    Retry,
    StallCheck,
}

/// Runs commands against a pair synchronizer and reports what happened.
pub struct Worker<C: Connector> {
    connector: C,
    events: mpsc::Sender<WorkerEvent>,
    instance: Option<Instance<C::Transport>>,
}

impl<C: Connector> Worker<C> {
    /// Creates a worker sending its events to `events`.
    pub fn new(connector: C, events: mpsc::Sender<WorkerEvent>) -> Self {
        Self {
            connector,
            events,
            instance: None,
        }
    }

    /// True while an instance is constructed.
    pub fn is_constructed(&self) -> bool {
        self.instance.is_some()
    }

    /// Processes commands until the command channel closes.
    pub async fn run(mut self, mut commands: mpsc::Receiver<WorkerCommand>) {
        loop {
            let retry_at = self.instance.as_ref().and_then(|instance| instance.retry_at);
            let stall_check_at = self.instance.as_ref().map(|instance| instance.stall_check_at);
            let listener = self
                .instance
                .as_mut()
                .and_then(|instance| instance.listener.as_mut());

            let step = tokio::select! {
                command = commands.recv() => Step::Command(command),
                event = next_listener_event(listener) => Step::Listener(event),
                () = wait_until(retry_at) => Step::Retry,
                () = wait_until(stall_check_at) => Step::StallCheck,
            };

            match step {
                Step::Command(Some(command)) => self.handle_command(command).await,
                Step::Command(None) => break,
                Step::Listener(Some(event)) => self.handle_listener_event(event).await,
                Step::Listener(None) => {
                    warn!("listener stream ended");
                    if let Some(instance) = self.instance.as_mut() {
                        instance.listener = None;
                    }
                    self.emit(WorkerEvent::error("listener stream ended")).await;
                }
                Step::Retry => {
                    if let Some(instance) = self.instance.as_mut() {
                        instance.retry_at = None;
                    }
                    self.process_commits().await;
                }
                Step::StallCheck => self.recover_stalled().await,
            }
        }
        self.dispose();
        debug!("worker stopped");
    }

    async fn handle_command(&mut self, command: WorkerCommand) {
        debug!(command = command.kind(), "worker command");
        let result = match command {
            WorkerCommand::Construct(payload) => self.construct(&payload),
            WorkerCommand::DraftMutate { payload } => self.mutate(DocumentVariant::Draft, payload),
            WorkerCommand::PublishedMutate { payload } => {
                self.mutate(DocumentVariant::Published, payload)
            }
            WorkerCommand::DraftCommit => self.commit(DocumentVariant::Draft),
            WorkerCommand::PublishedCommit => self.commit(DocumentVariant::Published),
            WorkerCommand::Dispose => {
                self.dispose();
                Ok(())
            }
        };
        if let Err(err) = result {
            warn!(error = %err, "worker command failed");
            self.emit(WorkerEvent::error(err.to_string())).await;
        }
        self.flush().await;
        self.process_commits().await;
    }

    fn construct(&mut self, payload: &ConstructPayload) -> SyncResult<()> {
        if self.instance.is_some() {
            return Err(SyncError::AlreadyConstructed);
        }
        let connection = self.connector.connect(payload)?;
        info!(
            draft = %payload.id_pair.draft_id,
            published = %payload.id_pair.published_id,
            "pair constructed"
        );
        let sync = PairSynchronizer::new(SyncConfig::from_construct(payload), connection.transport);
        let mut instance = Instance {
            sync,
            listener: Some(connection.listener),
            retry_at: None,
            stall_check_at: Instant::now(),
        };
        instance.stall_check_at = instance.next_stall_check();
        self.instance = Some(instance);
        Ok(())
    }

    fn mutate(
        &mut self,
        variant: DocumentVariant,
        operations: Vec<MutationOperation>,
    ) -> SyncResult<()> {
        self.sync_mut()?.mutate(variant, operations)
    }

    fn commit(&mut self, variant: DocumentVariant) -> SyncResult<()> {
        self.sync_mut()?.commit(variant).map(|_| ())
    }

    fn dispose(&mut self) {
        if let Some(instance) = self.instance.take() {
            info!("pair disposed");
            if let Err(err) = instance.sync.transport().close() {
                warn!(error = %err, "closing transport failed");
            }
        }
    }

    async fn handle_listener_event(&mut self, event: ListenerEvent) {
        let result = match self.instance.as_mut() {
            Some(instance) => instance.sync.handle_listener_event(event),
            None => Ok(()),
        };
        if let Err(err) = result {
            warn!(error = %err, "listener event failed");
            self.emit(WorkerEvent::error(err.to_string())).await;
        }
        self.flush().await;
        self.process_commits().await;
    }

    async fn recover_stalled(&mut self) {
        let Some(instance) = self.instance.as_mut() else {
            return;
        };
        instance.stall_check_at = instance.next_stall_check();
        if !instance.sync.is_ready() {
            return;
        }
        match instance.sync.recover_stalled(Utc::now()) {
            Ok(reloaded) if !reloaded.is_empty() => info!(?reloaded, "reloaded stalled documents"),
            Ok(_) => {}
            Err(err) => {
                warn!(error = %err, "reloading stalled documents failed");
                self.emit(WorkerEvent::error(err.to_string())).await;
            }
        }
        self.flush().await;
        self.process_commits().await;
    }

    async fn process_commits(&mut self) {
        let Some(instance) = self.instance.as_mut() else {
            return;
        };
        if instance.retry_at.is_some() || !instance.sync.is_ready() {
            return;
        }
        match instance.sync.process_commits() {
            Ok(CommitProgress::Idle) => {}
            Ok(CommitProgress::RetryAfter(delay)) => {
                debug!(?delay, "commit retry scheduled");
                instance.retry_at = Some(Instant::now() + delay);
            }
            Err(err) => {
                warn!(error = %err, "processing commits failed");
                self.emit(WorkerEvent::error(err.to_string())).await;
            }
        }
        self.flush().await;
    }

    async fn flush(&mut self) {
        let Some(instance) = self.instance.as_mut() else {
            return;
        };
        let events: Vec<WorkerEvent> = instance
            .sync
            .drain_events()
            .into_iter()
            .flat_map(to_worker_events)
            .collect();
        for event in events {
            self.emit(event).await;
        }
    }

    async fn emit(&self, event: WorkerEvent) {
        if self.events.send(event).await.is_err() {
            debug!("event receiver dropped");
        }
    }

    fn sync_mut(&mut self) -> SyncResult<&mut PairSynchronizer<C::Transport>> {
        self.instance
            .as_mut()
            .map(|instance| &mut instance.sync)
            .ok_or(SyncError::NotConstructed)
    }
}

fn to_worker_events(event: PairEvent) -> Vec<WorkerEvent> {
    match event {
        PairEvent::Document {
            variant,
            event: LocalEvent::ConsistencyChanged(consistent),
        } => vec![WorkerEvent::consistency(variant, consistent)],
        PairEvent::Document { variant, event } => DocumentEventPayload::from_local(event)
            .map(|payload| WorkerEvent::document(variant, payload))
            .into_iter()
            .collect(),
        PairEvent::Pending(phase) => DocumentVariant::ALL
            .into_iter()
            .map(|variant| WorkerEvent::document(variant, DocumentEventPayload::Pending { phase }))
            .collect(),
        PairEvent::Reconnect => DocumentVariant::ALL
            .into_iter()
            .map(|variant| WorkerEvent::document(variant, DocumentEventPayload::Reconnect))
            .collect(),
        PairEvent::Disconnected { reason } => vec![WorkerEvent::error(format!(
            "listener disconnected: {}",
            reason.as_deref().unwrap_or("no reason given")
        ))],
        PairEvent::Latency(report) => {
            debug!(txn = %report.transaction_id, latency = ?report.latency, "commit latency");
            Vec::new()
        }
    }
}

async fn next_listener_event(
    listener: Option<&mut mpsc::Receiver<ListenerEvent>>,
) -> Option<ListenerEvent> {
    match listener {
        Some(listener) => listener.recv().await,
        None => pending().await,
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;
    use docsync_codec::from_json_str;
    use docsync_core::PatchPayload;
    use docsync_sync_protocol::{ClientConfig, IdPair, Origin, WelcomeEvent};
    use parking_lot::Mutex;

    struct MockConnector {
        transport: Arc<MockTransport>,
        listener: Mutex<Option<mpsc::Receiver<ListenerEvent>>>,
    }

    impl Connector for MockConnector {
        type Transport = MockTransport;

        fn connect(&self, _payload: &ConstructPayload) -> SyncResult<Connection<MockTransport>> {
            let listener = self
                .listener
                .lock()
                .take()
                .ok_or_else(|| SyncError::transport_fatal("already connected"))?;
            Ok(Connection {
                transport: Arc::clone(&self.transport),
                listener,
            })
        }
    }

    struct Harness {
        commands: mpsc::Sender<WorkerCommand>,
        events: mpsc::Receiver<WorkerEvent>,
        listener: mpsc::Sender<ListenerEvent>,
        transport: Arc<MockTransport>,
    }

    impl Harness {
        fn start() -> Self {
            let transport = Arc::new(MockTransport::new());
            transport.set_document(
                from_json_str(r#"{"_id": "post", "_rev": "r0", "title": "hello"}"#).unwrap(),
            );
            let (listener_tx, listener_rx) = mpsc::channel(16);
            let (command_tx, command_rx) = mpsc::channel(16);
            let (event_tx, event_rx) = mpsc::channel(64);
            let connector = MockConnector {
                transport: Arc::clone(&transport),
                listener: Mutex::new(Some(listener_rx)),
            };
            tokio::spawn(Worker::new(connector, event_tx).run(command_rx));
            Self {
                commands: command_tx,
                events: event_rx,
                listener: listener_tx,
                transport,
            }
        }

        async fn send(&self, command: WorkerCommand) {
            self.commands.send(command).await.unwrap();
        }

        async fn next(&mut self) -> WorkerEvent {
            self.events.recv().await.unwrap()
        }

        async fn next_matching(&mut self, f: impl Fn(&WorkerEvent) -> bool) -> WorkerEvent {
            loop {
                let event = self.next().await;
                if f(&event) {
                    return event;
                }
            }
        }
    }

    fn construct() -> WorkerCommand {
        WorkerCommand::Construct(ConstructPayload {
            client_config: ClientConfig::new("mock://", "test"),
            id_pair: IdPair::from_published_id("post"),
            server_actions_enabled: false,
        })
    }

    #[tokio::test]
    async fn commands_before_construct_fail() {
        let mut harness = Harness::start();
        harness.send(WorkerCommand::DraftCommit).await;
        assert_eq!(
            harness.next().await,
            WorkerEvent::error(SyncError::NotConstructed.to_string())
        );
    }

    #[tokio::test]
    async fn construct_twice_fails() {
        let mut harness = Harness::start();
        harness.send(construct()).await;
        harness.send(construct()).await;
        assert_eq!(
            harness.next().await,
            WorkerEvent::error(SyncError::AlreadyConstructed.to_string())
        );
    }

    #[tokio::test]
    async fn welcome_then_edit_then_commit() {
        let mut harness = Harness::start();
        harness.send(construct()).await;
        harness
            .listener
            .send(ListenerEvent::Welcome(WelcomeEvent::default()))
            .await
            .unwrap();

        let snapshot = harness
            .next_matching(|event| matches!(event, WorkerEvent::PublishedEvents(_)))
            .await;
        assert!(matches!(
            snapshot,
            WorkerEvent::PublishedEvents(DocumentEventPayload::Snapshot { document: Some(_) })
        ));

        harness
            .send(WorkerCommand::mutate(
                DocumentVariant::Published,
                vec![MutationOperation::patch(
                    PatchPayload::new("post").with_set("title", "bye"),
                )],
            ))
            .await;
        let mutation = harness
            .next_matching(|event| {
                matches!(
                    event,
                    WorkerEvent::PublishedEvents(DocumentEventPayload::Mutation { .. })
                )
            })
            .await;
        assert!(matches!(
            mutation,
            WorkerEvent::PublishedEvents(DocumentEventPayload::Mutation {
                origin: Origin::Local,
                ..
            })
        ));

        harness.send(WorkerCommand::PublishedCommit).await;
        harness
            .next_matching(|event| {
                matches!(
                    event,
                    WorkerEvent::PublishedEvents(DocumentEventPayload::Committed { .. })
                )
            })
            .await;
        assert_eq!(harness.transport.mutate_requests().len(), 1);
    }

    #[tokio::test]
    async fn mutate_before_welcome_reports_error() {
        let mut harness = Harness::start();
        harness.send(construct()).await;
        harness.send(WorkerCommand::mutate(DocumentVariant::Draft, Vec::new())).await;
        assert_eq!(
            harness.next().await,
            WorkerEvent::error(SyncError::NotReady.to_string())
        );
    }

    #[tokio::test]
    async fn dispose_closes_transport() {
        let mut harness = Harness::start();
        harness.send(construct()).await;
        harness.send(WorkerCommand::Dispose).await;
        harness.send(WorkerCommand::DraftCommit).await;
        assert_eq!(
            harness.next().await,
            WorkerEvent::error(SyncError::NotConstructed.to_string())
        );
        assert!(!harness.transport.is_connected());
    }

    #[tokio::test]
    async fn reconnect_reaches_both_documents() {
        let mut harness = Harness::start();
        harness.send(construct()).await;
        harness.listener.send(ListenerEvent::Reconnect).await.unwrap();
        assert_eq!(
            harness.next().await,
            WorkerEvent::DraftEvents(DocumentEventPayload::Reconnect)
        );
        assert_eq!(
            harness.next().await,
            WorkerEvent::PublishedEvents(DocumentEventPayload::Reconnect)
        );
    }
}
