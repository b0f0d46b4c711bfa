//! AgentX session lifecycle and dispatch loop.
//!
//! A [`Session`] owns the connection to the master, the registered
//! regions, and the two-phase SET transactions. The driver task moves
//! through the lifecycle
//!
//! ```text
//! Disconnected -> Connecting -> Open -> Registering -> Active -> Closing
//! ```
//!
//! reconnecting with exponential backoff on transport failure and
//! re-registering every region under the new session id.
//!
//! The driver is a single cooperative loop: it alone touches the
//! transport writer, the pending-request table, the region table and the
//! transaction map. Updaters run as separate tasks and communicate only
//! through each region's atomically published snapshot, so request
//! handling never blocks on a refresh.
//!
//! # Example
//!
//! ```no_run
//! use async_agentx::{BoxFuture, Endpoint, Result, Session, SnapshotBuilder, Updater, oid};
//! use std::time::Duration;
//!
//! struct Uptime;
//!
//! impl Updater for Uptime {
//!     fn update<'a>(&'a self, builder: &'a mut SnapshotBuilder) -> BoxFuture<'a, Result<()>> {
//!         Box::pin(async move { builder.set_counter32(&oid!(1, 0), 42) })
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let endpoint: Endpoint = "127.0.0.1:705".parse()?;
//!     let session = Session::open(
//!         endpoint,
//!         oid!(1, 3, 6, 1, 4, 1, 12345),
//!         "example subagent",
//!     );
//!     session
//!         .register(oid!(1, 3, 6, 1, 4, 1, 12345), Uptime, Duration::from_secs(30))
//!         .await?;
//!     session.start_blocking().await
//! }
//! ```

mod dispatch;
mod set;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backoff::Backoff;
use crate::error::{Error, ProtocolErrorKind, Result};
use crate::handler::{SetHandler, Updater};
use crate::oid::Oid;
use crate::pdu::{
    ByteOrder, ClosePdu, CloseReason, NotifyPdu, OpenPdu, Pdu, PduPayload, RegisterPdu,
    ResponseError, ResponsePdu, UnregisterPdu,
};
use crate::snapshot::{SnapshotBuilder, SnapshotCell};
use crate::transport::{Connection, Endpoint, PduReader, PduWriter};
use crate::varbind::VarBind;

use set::TransactionTable;

const TARGET: &str = "async_agentx::session";

/// How long updaters get to finish their current refresh during teardown
/// before they are aborted.
const UPDATER_DRAIN_GRACE: Duration = Duration::from_secs(5);

/// Bound on the wait for the master's Response to our Close.
const CLOSE_GRACE: Duration = Duration::from_secs(2);

/// Handle identifying a registered region, used to unregister it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegionHandle(u64);

/// Options for registering a region beyond the defaults.
#[derive(Clone)]
pub struct RegisterOptions {
    /// Registration priority; lower wins on overlap at the master.
    pub priority: u8,
    /// When nonzero, the subidentifier at this position in the subtree
    /// ranges up to `upper_bound` (table row registration).
    pub range_subid: u8,
    pub upper_bound: Option<u32>,
    /// Non-default SNMPv3 context this region lives in.
    pub context: Option<String>,
    /// Handler for write transactions; absent means the region is
    /// read-only and SETs answer notWritable.
    pub set_handler: Option<Arc<dyn SetHandler>>,
    /// Register a single instance rather than a subtree.
    pub instance: bool,
}

impl Default for RegisterOptions {
    fn default() -> Self {
        Self {
            priority: 127,
            range_subid: 0,
            upper_bound: None,
            context: None,
            set_handler: None,
            instance: false,
        }
    }
}

impl std::fmt::Debug for RegisterOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisterOptions")
            .field("priority", &self.priority)
            .field("range_subid", &self.range_subid)
            .field("upper_bound", &self.upper_bound)
            .field("context", &self.context)
            .field("set_handler", &self.set_handler.is_some())
            .field("instance", &self.instance)
            .finish()
    }
}

/// A region declaration: what to claim and how to serve it.
pub(crate) struct RegionSpec {
    pub(crate) id: u64,
    pub(crate) subtree: Oid,
    pub(crate) refresh: Duration,
    pub(crate) updater: Arc<dyn Updater>,
    pub(crate) options: RegisterOptions,
}

/// A region inside the driver: the spec plus its live serving state.
pub(crate) struct Region {
    pub(crate) spec: RegionSpec,
    pub(crate) snapshot: Arc<SnapshotCell>,
    /// Whether the master accepted the Register for the current session.
    pub(crate) registered: bool,
    updater: Option<UpdaterTask>,
}

impl Region {
    fn new(spec: RegionSpec) -> Self {
        let snapshot = Arc::new(SnapshotCell::new(spec.subtree.clone()));
        Self {
            spec,
            snapshot,
            registered: false,
            updater: None,
        }
    }

    pub(crate) fn context_matches(&self, request: Option<&[u8]>) -> bool {
        match (&self.spec.options.context, request) {
            (None, None) => true,
            (Some(own), Some(req)) => own.as_bytes() == req,
            _ => false,
        }
    }
}

struct UpdaterTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

fn regions_overlap(a: &Oid, b: &Oid) -> bool {
    a.is_prefix_of(b) || b.is_prefix_of(a)
}

enum Command {
    Register {
        spec: RegionSpec,
        reply: oneshot::Sender<Result<RegionHandle>>,
    },
    Unregister {
        id: u64,
        reply: oneshot::Sender<Result<()>>,
    },
    Notify {
        varbinds: Vec<VarBind>,
        context: Option<Bytes>,
        reply: oneshot::Sender<Result<()>>,
    },
}

/// What a Response we are waiting for will resolve.
enum Pending {
    Register {
        spec: RegionSpec,
        reply: oneshot::Sender<Result<RegionHandle>>,
    },
    Unregister {
        id: u64,
        reply: oneshot::Sender<Result<()>>,
    },
    Notify {
        reply: oneshot::Sender<Result<()>>,
    },
    Ping,
}

#[derive(Clone)]
struct SessionConfig {
    endpoint: Endpoint,
    agent_id: Oid,
    description: String,
    timeout: Duration,
    ping_interval: Option<Duration>,
    auto_reconnect: bool,
    backoff: Backoff,
    byte_order: ByteOrder,
}

impl SessionConfig {
    fn timeout_secs(&self) -> u8 {
        self.timeout.as_secs().clamp(1, u8::MAX as u64) as u8
    }
}

/// Builder for [`Session`].
pub struct SessionBuilder {
    config: SessionConfig,
}

impl SessionBuilder {
    fn new(endpoint: Endpoint) -> Self {
        Self {
            config: SessionConfig {
                endpoint,
                agent_id: Oid::empty(),
                description: String::new(),
                timeout: Duration::from_secs(5),
                ping_interval: None,
                auto_reconnect: true,
                backoff: Backoff::default(),
                byte_order: ByteOrder::native(),
            },
        }
    }

    /// OID identifying this subagent in the Open PDU.
    pub fn agent_id(mut self, id: Oid) -> Self {
        self.config.agent_id = id;
        self
    }

    /// Human-readable description sent in the Open PDU.
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.config.description = description.into();
        self
    }

    /// Session timeout (Open PDU timeout field, whole seconds, clamped to
    /// 1..=255). Also bounds handshake waits and SET transaction garbage
    /// collection. Default 5 seconds.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Send a Ping at this interval while Active; a Ping that sees no
    /// Response within one interval counts as a transport failure.
    /// Default off.
    pub fn ping_interval(mut self, interval: Duration) -> Self {
        self.config.ping_interval = Some(interval);
        self
    }

    /// Whether to reconnect (with backoff) after a transport failure.
    /// Default true.
    pub fn auto_reconnect(mut self, reconnect: bool) -> Self {
        self.config.auto_reconnect = reconnect;
        self
    }

    /// Reconnect backoff schedule. Default: 1 s base, 60 s cap, 25% jitter.
    pub fn backoff(mut self, backoff: Backoff) -> Self {
        self.config.backoff = backoff;
        self
    }

    /// Byte order for PDUs this subagent originates. Default: native.
    pub fn byte_order(mut self, order: ByteOrder) -> Self {
        self.config.byte_order = order;
        self
    }

    pub fn build(self) -> Session {
        Session {
            shared: Arc::new(Shared {
                config: self.config,
                cancel: CancellationToken::new(),
                state: Mutex::new(State::Idle {
                    regions: Vec::new(),
                }),
                next_region_id: AtomicU64::new(1),
            }),
        }
    }
}

enum State {
    /// Declared but not started; regions accumulate locally.
    Idle { regions: Vec<RegionSpec> },
    /// Driver task running (or about to).
    Running {
        cmd_tx: mpsc::UnboundedSender<Command>,
        driver: Option<JoinHandle<()>>,
    },
    /// Stopped for good.
    Stopped,
}

struct Shared {
    config: SessionConfig,
    cancel: CancellationToken,
    state: Mutex<State>,
    next_region_id: AtomicU64,
}

/// An AgentX subagent session.
///
/// Cheap to clone; all clones drive the same underlying session.
#[derive(Clone)]
pub struct Session {
    shared: Arc<Shared>,
}

impl Session {
    /// Start building a session against the given master endpoint.
    pub fn builder(endpoint: Endpoint) -> SessionBuilder {
        SessionBuilder::new(endpoint)
    }

    /// Create a session with the common parameters in one call.
    pub fn open(
        endpoint: impl Into<Endpoint>,
        agent_id: Oid,
        description: impl Into<String>,
    ) -> Session {
        Self::builder(endpoint.into())
            .agent_id(agent_id)
            .description(description)
            .build()
    }

    /// Register a region served by `updater`, refreshed every `refresh`.
    ///
    /// Before [`start`](Self::start) this only records the declaration;
    /// the Register PDU goes out during the handshake. On a running
    /// session the registration happens immediately and the result
    /// reflects the master's answer.
    pub async fn register(
        &self,
        subtree: Oid,
        updater: impl Updater,
        refresh: Duration,
    ) -> Result<RegionHandle> {
        self.register_with(subtree, updater, refresh, RegisterOptions::default())
            .await
    }

    /// [`register`](Self::register) with explicit options.
    pub async fn register_with(
        &self,
        subtree: Oid,
        updater: impl Updater,
        refresh: Duration,
        options: RegisterOptions,
    ) -> Result<RegionHandle> {
        let id = self.shared.next_region_id.fetch_add(1, Ordering::Relaxed);
        let spec = RegionSpec {
            id,
            subtree,
            refresh,
            updater: Arc::new(updater),
            options,
        };

        enum Route {
            Done(Result<RegionHandle>),
            Live(mpsc::UnboundedSender<Command>, RegionSpec),
        }

        let route = {
            let mut state = self.shared.state.lock().expect("session state poisoned");
            match &mut *state {
                State::Idle { regions } => {
                    if let Some(existing) = regions
                        .iter()
                        .find(|r| regions_overlap(&r.subtree, &spec.subtree))
                    {
                        Route::Done(Err(Error::Registration {
                            subtree: existing.subtree.clone(),
                            code: ResponseError::DuplicateRegistration,
                        }))
                    } else {
                        regions.push(spec);
                        Route::Done(Ok(RegionHandle(id)))
                    }
                }
                State::Running { cmd_tx, .. } => Route::Live(cmd_tx.clone(), spec),
                State::Stopped => Route::Done(Err(Error::SessionClosed)),
            }
        };

        match route {
            Route::Done(result) => result,
            Route::Live(cmd_tx, spec) => {
                let (reply_tx, reply_rx) = oneshot::channel();
                cmd_tx
                    .send(Command::Register {
                        spec,
                        reply: reply_tx,
                    })
                    .map_err(|_| Error::SessionClosed)?;
                reply_rx.await.map_err(|_| Error::SessionClosed)?
            }
        }
    }

    /// Remove a region. On a running session this sends an Unregister PDU
    /// and awaits the master's answer.
    pub async fn unregister(&self, handle: RegionHandle) -> Result<()> {
        enum Route {
            Done(Result<()>),
            Live(mpsc::UnboundedSender<Command>),
        }

        let route = {
            let mut state = self.shared.state.lock().expect("session state poisoned");
            match &mut *state {
                State::Idle { regions } => {
                    let before = regions.len();
                    regions.retain(|r| r.id != handle.0);
                    if regions.len() == before {
                        Route::Done(Err(Error::Registration {
                            subtree: Oid::empty(),
                            code: ResponseError::UnknownRegistration,
                        }))
                    } else {
                        Route::Done(Ok(()))
                    }
                }
                State::Running { cmd_tx, .. } => Route::Live(cmd_tx.clone()),
                State::Stopped => Route::Done(Err(Error::SessionClosed)),
            }
        };

        match route {
            Route::Done(result) => result,
            Route::Live(cmd_tx) => {
                let (reply_tx, reply_rx) = oneshot::channel();
                cmd_tx
                    .send(Command::Unregister {
                        id: handle.0,
                        reply: reply_tx,
                    })
                    .map_err(|_| Error::SessionClosed)?;
                reply_rx.await.map_err(|_| Error::SessionClosed)?
            }
        }
    }

    /// Send a Notify PDU to the master and await its Response.
    pub async fn notify(&self, varbinds: Vec<VarBind>) -> Result<()> {
        self.notify_inner(varbinds, None).await
    }

    /// [`notify`](Self::notify) tagged with a non-default context.
    pub async fn notify_with_context(
        &self,
        varbinds: Vec<VarBind>,
        context: impl Into<Bytes>,
    ) -> Result<()> {
        self.notify_inner(varbinds, Some(context.into())).await
    }

    async fn notify_inner(&self, varbinds: Vec<VarBind>, context: Option<Bytes>) -> Result<()> {
        let cmd_tx = {
            let state = self.shared.state.lock().expect("session state poisoned");
            match &*state {
                State::Running { cmd_tx, .. } => cmd_tx.clone(),
                _ => return Err(Error::SessionClosed),
            }
        };
        let (reply_tx, reply_rx) = oneshot::channel();
        cmd_tx
            .send(Command::Notify {
                varbinds,
                context,
                reply: reply_tx,
            })
            .map_err(|_| Error::SessionClosed)?;
        reply_rx.await.map_err(|_| Error::SessionClosed)?
    }

    /// Start the session on the current Tokio runtime and return.
    pub fn start(&self) -> Result<()> {
        let driver = self.prepare_driver()?;
        let handle = tokio::spawn(driver.run());
        let mut state = self.shared.state.lock().expect("session state poisoned");
        if let State::Running { driver, .. } = &mut *state {
            *driver = Some(handle);
        }
        Ok(())
    }

    /// Run the session on the calling task until [`stop`](Self::stop) or a
    /// fatal error.
    pub async fn start_blocking(&self) -> Result<()> {
        let driver = self.prepare_driver()?;
        driver.run().await;
        *self.shared.state.lock().expect("session state poisoned") = State::Stopped;
        Ok(())
    }

    /// Stop the session: cancel updaters, send Close, tear the transport
    /// down. Terminal; a stopped session cannot be restarted.
    pub async fn stop(&self) {
        self.shared.cancel.cancel();
        let handle = {
            let mut state = self.shared.state.lock().expect("session state poisoned");
            match &mut *state {
                State::Running { driver, .. } => driver.take(),
                _ => None,
            }
        };
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        *self.shared.state.lock().expect("session state poisoned") = State::Stopped;
    }

    fn prepare_driver(&self) -> Result<Driver> {
        let mut state = self.shared.state.lock().expect("session state poisoned");
        let State::Idle { regions } = &mut *state else {
            return Err(Error::SessionClosed);
        };
        let specs = std::mem::take(regions);
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let driver = Driver::new(self.shared.config.clone(), self.shared.cancel.clone(), cmd_rx, specs);
        *state = State::Running {
            cmd_tx,
            driver: None,
        };
        Ok(driver)
    }
}

enum Flow {
    Continue,
    /// The master closed the session; reconnect per policy.
    Reopen,
}

enum Outcome {
    Stopped,
    ConnectionLost,
}

struct Driver {
    config: SessionConfig,
    cancel: CancellationToken,
    cmd_rx: mpsc::UnboundedReceiver<Command>,
    cmd_closed: bool,
    regions: Vec<Region>,
    transactions: TransactionTable,
    pending: HashMap<u32, Pending>,
    packet_id_counter: u32,
    session_id: u32,
    started_at: Instant,
    backoff: Backoff,
    outstanding_ping: Option<u32>,
}

impl Driver {
    fn new(
        config: SessionConfig,
        cancel: CancellationToken,
        cmd_rx: mpsc::UnboundedReceiver<Command>,
        specs: Vec<RegionSpec>,
    ) -> Self {
        let gc_timeout = config.timeout.max(Duration::from_secs(1));
        let backoff = config.backoff.clone();
        Self {
            config,
            cancel,
            cmd_rx,
            cmd_closed: false,
            regions: specs.into_iter().map(Region::new).collect(),
            transactions: TransactionTable::new(gc_timeout),
            pending: HashMap::new(),
            packet_id_counter: 1,
            session_id: 0,
            started_at: Instant::now(),
            backoff,
            outstanding_ping: None,
        }
    }

    fn next_packet_id(&mut self) -> u32 {
        let id = self.packet_id_counter;
        self.packet_id_counter = self.packet_id_counter.wrapping_add(1);
        if self.packet_id_counter == 0 {
            self.packet_id_counter = 1;
        }
        id
    }

    fn uptime_ticks(&self) -> u32 {
        (self.started_at.elapsed().as_millis() / 10) as u32
    }

    fn make_pdu(&mut self, transaction_id: u32, payload: PduPayload) -> Pdu {
        let packet_id = self.next_packet_id();
        Pdu::new(
            self.session_id,
            transaction_id,
            packet_id,
            self.config.byte_order,
            payload,
        )
    }

    async fn run(mut self) {
        info!(target: TARGET, endpoint = %self.config.endpoint, "session starting");

        loop {
            // Connecting, with backoff
            let Some(conn) = self.connect_with_backoff().await else {
                break;
            };
            let (mut reader, mut writer) = conn.split();

            // Open and Registering
            if let Err(e) = self.establish(&mut reader, &mut writer).await {
                warn!(target: TARGET, error = %e, "handshake failed");
                writer.close().await;
                self.session_id = 0;
                if self.cancel.is_cancelled() || !self.config.auto_reconnect {
                    break;
                }
                if !self.sleep_backoff().await {
                    break;
                }
                continue;
            }
            self.backoff.reset();
            info!(target: TARGET, session_id = self.session_id, "session active");

            // Active
            let outcome = self.serve(reader, &mut writer).await;

            // Teardown
            self.teardown_updaters().await;
            self.transactions.teardown().await;
            self.fail_pending();
            writer.close().await;
            self.session_id = 0;

            match outcome {
                Outcome::Stopped => break,
                Outcome::ConnectionLost => {
                    if !self.config.auto_reconnect {
                        warn!(target: TARGET, "connection lost, auto-reconnect disabled");
                        break;
                    }
                    warn!(target: TARGET, "connection lost, reconnecting");
                    if !self.sleep_backoff().await {
                        break;
                    }
                }
            }
        }

        info!(target: TARGET, "session stopped");
    }

    /// Sleep the next backoff delay; false means stop was requested.
    async fn sleep_backoff(&mut self) -> bool {
        let delay = self.backoff.next_delay();
        debug!(target: TARGET, delay_ms = delay.as_millis() as u64, "backing off");
        tokio::select! {
            _ = tokio::time::sleep(delay) => true,
            _ = self.cancel.cancelled() => false,
        }
    }

    async fn connect_with_backoff(&mut self) -> Option<Connection> {
        loop {
            if self.cancel.is_cancelled() {
                return None;
            }
            match Connection::connect(&self.config.endpoint).await {
                Ok(conn) => return Some(conn),
                Err(e) => {
                    warn!(target: TARGET, error = %e, "connect failed");
                    if !self.config.auto_reconnect {
                        return None;
                    }
                    if !self.sleep_backoff().await {
                        return None;
                    }
                }
            }
        }
    }

    /// Open the session and register every region.
    async fn establish(&mut self, reader: &mut PduReader, writer: &mut PduWriter) -> Result<()> {
        // Open
        let open = OpenPdu::new(
            self.config.timeout_secs(),
            self.config.agent_id.clone(),
            Bytes::copy_from_slice(self.config.description.as_bytes()),
        );
        self.session_id = 0;
        let pdu = self.make_pdu(0, PduPayload::Open(open));
        let packet_id = pdu.packet_id;
        let (session_id, body) = self.transact(reader, writer, pdu).await?;
        if body.error.is_error() || session_id == 0 {
            return Err(Error::protocol(ProtocolErrorKind::ErrorResponse {
                code: body.error,
            }));
        }
        self.session_id = session_id;
        debug!(
            target: TARGET,
            session_id,
            packet_id,
            "master accepted session open"
        );

        // Register; a rejected region is parked, a transport failure
        // restarts the whole session.
        for idx in 0..self.regions.len() {
            let spec = &self.regions[idx].spec;
            let body = register_payload(spec, self.config.timeout_secs());
            let pdu = self.make_pdu(0, PduPayload::Register(body));
            let subtree = self.regions[idx].spec.subtree.clone();
            let (_, response) = self.transact(reader, writer, pdu).await?;
            if response.error.is_error() {
                warn!(
                    target: TARGET,
                    subtree = %subtree,
                    code = %response.error,
                    "master rejected registration"
                );
                self.regions[idx].registered = false;
            } else {
                debug!(target: TARGET, subtree = %subtree, "region registered");
                self.regions[idx].registered = true;
            }
        }

        // Spawn updaters for the regions the master accepted
        for idx in 0..self.regions.len() {
            if self.regions[idx].registered && self.regions[idx].updater.is_none() {
                let task = self.spawn_updater(&self.regions[idx]);
                self.regions[idx].updater = Some(task);
            }
        }

        Ok(())
    }

    /// Send a request PDU and wait for its Response during the handshake,
    /// when no other traffic is in flight.
    async fn transact(
        &mut self,
        reader: &mut PduReader,
        writer: &mut PduWriter,
        pdu: Pdu,
    ) -> Result<(u32, ResponsePdu)> {
        let packet_id = pdu.packet_id;
        writer.write_pdu(&pdu).await?;

        let deadline = Instant::now() + self.config.timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(Error::Timeout {
                    elapsed: self.config.timeout,
                    packet_id,
                });
            }
            match tokio::time::timeout(remaining, reader.read_pdu()).await {
                Err(_) => {
                    return Err(Error::Timeout {
                        elapsed: self.config.timeout,
                        packet_id,
                    });
                }
                Ok(Ok(response)) => {
                    if response.packet_id != packet_id {
                        debug!(target: TARGET, packet_id = response.packet_id, "ignoring unrelated PDU during handshake");
                        continue;
                    }
                    let session_id = response.session_id;
                    match response.payload {
                        PduPayload::Response(body) => return Ok((session_id, body)),
                        other => {
                            return Err(Error::protocol(ProtocolErrorKind::UnexpectedPdu {
                                expected: "agentx-Response-PDU",
                                got: other.pdu_type().name(),
                            }));
                        }
                    }
                }
                Ok(Err(e)) if e.is_fatal() => return Err(e),
                Ok(Err(e)) => {
                    warn!(target: TARGET, error = %e, "dropping malformed PDU during handshake");
                }
            }
        }
    }

    /// The Active dispatch loop.
    async fn serve(&mut self, reader: PduReader, writer: &mut PduWriter) -> Outcome {
        let (pdu_tx, mut pdu_rx) = mpsc::channel::<Result<Pdu>>(1);
        let reader_task = tokio::spawn(read_loop(reader, pdu_tx));

        let mut gc = tokio::time::interval(self.config.timeout.max(Duration::from_secs(1)));
        gc.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut ping_timer = self.config.ping_interval.map(|interval| {
            let mut timer = tokio::time::interval(interval);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            timer
        });

        let outcome = loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break Outcome::Stopped,

                received = pdu_rx.recv() => match received {
                    Some(Ok(pdu)) => match self.handle_pdu(writer, pdu).await {
                        Ok(Flow::Continue) => {}
                        Ok(Flow::Reopen) => break Outcome::ConnectionLost,
                        Err(e) => {
                            warn!(target: TARGET, error = %e, "write failed");
                            break Outcome::ConnectionLost;
                        }
                    },
                    Some(Err(e)) if e.is_fatal() => {
                        warn!(target: TARGET, error = %e, "read failed");
                        break Outcome::ConnectionLost;
                    }
                    Some(Err(e)) => {
                        warn!(target: TARGET, error = %e, "dropping malformed PDU");
                    }
                    None => break Outcome::ConnectionLost,
                },

                command = self.cmd_rx.recv(), if !self.cmd_closed => match command {
                    Some(command) => {
                        if let Err(e) = self.handle_command(writer, command).await {
                            warn!(target: TARGET, error = %e, "write failed");
                            break Outcome::ConnectionLost;
                        }
                    }
                    None => self.cmd_closed = true,
                },

                _ = gc.tick() => {
                    if !self.transactions.is_empty() {
                        self.transactions.sweep().await;
                    }
                }

                _ = tick_opt(&mut ping_timer) => {
                    if self.outstanding_ping.is_some() {
                        warn!(target: TARGET, "ping unanswered, treating connection as dead");
                        break Outcome::ConnectionLost;
                    }
                    let pdu = self.make_pdu(0, PduPayload::Ping(crate::pdu::PingPdu::new()));
                    self.pending.insert(pdu.packet_id, Pending::Ping);
                    self.outstanding_ping = Some(pdu.packet_id);
                    if let Err(e) = writer.write_pdu(&pdu).await {
                        warn!(target: TARGET, error = %e, "ping write failed");
                        break Outcome::ConnectionLost;
                    }
                }
            }
        };

        if matches!(outcome, Outcome::Stopped) {
            // Updaters drain before the Close goes out
            self.teardown_updaters().await;
            self.graceful_close(&mut pdu_rx, writer).await;
        }
        reader_task.abort();
        outcome
    }

    /// Send Close and wait briefly for the master's acknowledgment.
    async fn graceful_close(
        &mut self,
        pdu_rx: &mut mpsc::Receiver<Result<Pdu>>,
        writer: &mut PduWriter,
    ) {
        let pdu = self.make_pdu(
            0,
            PduPayload::Close(ClosePdu::new(CloseReason::Shutdown)),
        );
        let packet_id = pdu.packet_id;
        if writer.write_pdu(&pdu).await.is_err() {
            return;
        }
        let deadline = Instant::now() + CLOSE_GRACE;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return;
            }
            match tokio::time::timeout(remaining, pdu_rx.recv()).await {
                Ok(Some(Ok(pdu)))
                    if pdu.packet_id == packet_id
                        && matches!(pdu.payload, PduPayload::Response(_)) =>
                {
                    debug!(target: TARGET, "master acknowledged close");
                    return;
                }
                Ok(Some(Err(e))) if e.is_fatal() => return,
                Ok(Some(_)) => continue,
                _ => return,
            }
        }
    }

    async fn handle_pdu(&mut self, writer: &mut PduWriter, pdu: Pdu) -> Result<Flow> {
        let uptime = self.uptime_ticks();
        match &pdu.payload {
            PduPayload::Get(body) => {
                let response = dispatch::get(&self.regions, body, uptime);
                writer.write_pdu(&pdu.response_to(response)).await?;
            }
            PduPayload::GetNext(body) => {
                let response = dispatch::get_next(&self.regions, body, uptime);
                writer.write_pdu(&pdu.response_to(response)).await?;
            }
            PduPayload::GetBulk(body) => {
                let response = dispatch::get_bulk(&self.regions, body, uptime);
                writer.write_pdu(&pdu.response_to(response)).await?;
            }
            PduPayload::TestSet(body) => {
                let response = self
                    .transactions
                    .test_set(pdu.transaction_id, body, &self.regions, uptime)
                    .await;
                writer.write_pdu(&pdu.response_to(response)).await?;
            }
            PduPayload::CommitSet => {
                let response = self.transactions.commit_set(pdu.transaction_id, uptime).await;
                writer.write_pdu(&pdu.response_to(response)).await?;
            }
            PduPayload::UndoSet => {
                let response = self.transactions.undo_set(pdu.transaction_id, uptime).await;
                writer.write_pdu(&pdu.response_to(response)).await?;
            }
            PduPayload::CleanupSet => {
                self.transactions.cleanup_set(pdu.transaction_id).await;
            }
            PduPayload::Ping(_)
            | PduPayload::IndexAllocate(_)
            | PduPayload::IndexDeallocate(_)
            | PduPayload::AddAgentCaps(_)
            | PduPayload::RemoveAgentCaps(_) => {
                // Administrative PDUs are acknowledged with a clean Response.
                writer
                    .write_pdu(&pdu.response_to(ResponsePdu::success(uptime, Vec::new())))
                    .await?;
            }
            PduPayload::Close(body) => {
                info!(target: TARGET, reason = %body.reason, "master closed the session");
                let _ = writer
                    .write_pdu(&pdu.response_to(ResponsePdu::success(uptime, Vec::new())))
                    .await;
                return Ok(Flow::Reopen);
            }
            PduPayload::Response(body) => {
                self.handle_response(pdu.packet_id, body.clone());
            }
            other => {
                warn!(
                    target: TARGET,
                    pdu_type = other.pdu_type().name(),
                    "unexpected PDU from master, dropping"
                );
            }
        }
        Ok(Flow::Continue)
    }

    fn handle_response(&mut self, packet_id: u32, body: ResponsePdu) {
        let Some(pending) = self.pending.remove(&packet_id) else {
            debug!(target: TARGET, packet_id, "unmatched Response, dropping");
            return;
        };
        match pending {
            Pending::Register { spec, reply } => {
                if body.error.is_error() {
                    warn!(
                        target: TARGET,
                        subtree = %spec.subtree,
                        code = %body.error,
                        "master rejected registration"
                    );
                    let _ = reply.send(Err(Error::Registration {
                        subtree: spec.subtree,
                        code: body.error,
                    }));
                } else {
                    let id = spec.id;
                    let mut region = Region::new(spec);
                    region.registered = true;
                    region.updater = Some(self.spawn_updater(&region));
                    debug!(target: TARGET, subtree = %region.spec.subtree, "region registered");
                    self.regions.push(region);
                    let _ = reply.send(Ok(RegionHandle(id)));
                }
            }
            Pending::Unregister { id, reply } => {
                if body.error.is_error() {
                    let subtree = self
                        .regions
                        .iter()
                        .find(|r| r.spec.id == id)
                        .map(|r| r.spec.subtree.clone())
                        .unwrap_or_else(Oid::empty);
                    let _ = reply.send(Err(Error::Registration {
                        subtree,
                        code: body.error,
                    }));
                } else {
                    if let Some(idx) = self.regions.iter().position(|r| r.spec.id == id) {
                        self.remove_region(idx);
                    }
                    let _ = reply.send(Ok(()));
                }
            }
            Pending::Notify { reply } => {
                if body.error.is_error() {
                    let _ = reply.send(Err(Error::protocol(ProtocolErrorKind::ErrorResponse {
                        code: body.error,
                    })));
                } else {
                    let _ = reply.send(Ok(()));
                }
            }
            Pending::Ping => {
                self.outstanding_ping = None;
            }
        }
    }

    async fn handle_command(&mut self, writer: &mut PduWriter, command: Command) -> Result<()> {
        match command {
            Command::Register { spec, reply } => {
                if let Some(existing) = self
                    .regions
                    .iter()
                    .find(|r| regions_overlap(&r.spec.subtree, &spec.subtree))
                {
                    let _ = reply.send(Err(Error::Registration {
                        subtree: existing.spec.subtree.clone(),
                        code: ResponseError::DuplicateRegistration,
                    }));
                    return Ok(());
                }
                let body = register_payload(&spec, self.config.timeout_secs());
                let pdu = self.make_pdu(0, PduPayload::Register(body));
                self.pending
                    .insert(pdu.packet_id, Pending::Register { spec, reply });
                writer.write_pdu(&pdu).await?;
            }
            Command::Unregister { id, reply } => {
                let Some(idx) = self.regions.iter().position(|r| r.spec.id == id) else {
                    let _ = reply.send(Err(Error::Registration {
                        subtree: Oid::empty(),
                        code: ResponseError::UnknownRegistration,
                    }));
                    return Ok(());
                };
                if !self.regions[idx].registered {
                    // The master never accepted it; drop locally.
                    self.remove_region(idx);
                    let _ = reply.send(Ok(()));
                    return Ok(());
                }
                let spec = &self.regions[idx].spec;
                let mut body = UnregisterPdu::new(spec.subtree.clone(), spec.options.priority);
                body.range_subid = spec.options.range_subid;
                body.upper_bound = if spec.options.range_subid != 0 {
                    Some(spec.options.upper_bound.unwrap_or(0))
                } else {
                    None
                };
                body.context = spec
                    .options
                    .context
                    .as_ref()
                    .map(|c| Bytes::copy_from_slice(c.as_bytes()));
                let pdu = self.make_pdu(0, PduPayload::Unregister(body));
                self.pending
                    .insert(pdu.packet_id, Pending::Unregister { id, reply });
                writer.write_pdu(&pdu).await?;
            }
            Command::Notify {
                varbinds,
                context,
                reply,
            } => {
                let mut body = NotifyPdu::new(varbinds);
                body.context = context;
                let pdu = self.make_pdu(0, PduPayload::Notify(body));
                self.pending.insert(pdu.packet_id, Pending::Notify { reply });
                writer.write_pdu(&pdu).await?;
            }
        }
        Ok(())
    }

    fn spawn_updater(&self, region: &Region) -> UpdaterTask {
        let cancel = self.cancel.child_token();
        let handle = tokio::spawn(updater_loop(
            region.spec.subtree.clone(),
            region.spec.refresh,
            region.spec.updater.clone(),
            region.snapshot.clone(),
            cancel.clone(),
        ));
        UpdaterTask { cancel, handle }
    }

    fn remove_region(&mut self, idx: usize) {
        let mut region = self.regions.remove(idx);
        if let Some(task) = region.updater.take() {
            task.cancel.cancel();
            task.handle.abort();
        }
        debug!(target: TARGET, subtree = %region.spec.subtree, "region removed");
    }

    /// Cancel updaters cooperatively, then abort stragglers after the
    /// drain grace.
    async fn teardown_updaters(&mut self) {
        let mut handles = Vec::new();
        for region in &mut self.regions {
            region.registered = false;
            if let Some(task) = region.updater.take() {
                task.cancel.cancel();
                handles.push(task.handle);
            }
        }
        if handles.is_empty() {
            return;
        }

        let deadline = Instant::now() + UPDATER_DRAIN_GRACE;
        for mut handle in handles {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match tokio::time::timeout(remaining, &mut handle).await {
                Ok(_) => {}
                Err(_) => {
                    warn!(target: TARGET, "updater unresponsive, aborting");
                    handle.abort();
                }
            }
        }
    }

    /// Fail callers waiting on in-flight requests when the connection dies.
    fn fail_pending(&mut self) {
        self.outstanding_ping = None;
        for (_, pending) in self.pending.drain() {
            let error = || {
                Error::connection(
                    None,
                    std::io::Error::new(
                        std::io::ErrorKind::ConnectionReset,
                        "connection to master lost",
                    ),
                )
            };
            match pending {
                Pending::Register { reply, .. } => {
                    let _ = reply.send(Err(error()));
                }
                Pending::Unregister { reply, .. } => {
                    let _ = reply.send(Err(error()));
                }
                Pending::Notify { reply } => {
                    let _ = reply.send(Err(error()));
                }
                Pending::Ping => {}
            }
        }
    }
}

fn register_payload(spec: &RegionSpec, timeout_secs: u8) -> RegisterPdu {
    let mut body = RegisterPdu::new(spec.subtree.clone(), spec.options.priority, timeout_secs);
    body.range_subid = spec.options.range_subid;
    body.upper_bound = if spec.options.range_subid != 0 {
        Some(spec.options.upper_bound.unwrap_or(0))
    } else {
        None
    };
    body.context = spec
        .options
        .context
        .as_ref()
        .map(|c| Bytes::copy_from_slice(c.as_bytes()));
    body.instance = spec.options.instance;
    body
}

/// Poll the optional ping interval, or never when pings are off.
async fn tick_opt(timer: &mut Option<tokio::time::Interval>) {
    match timer.as_mut() {
        Some(timer) => {
            timer.tick().await;
        }
        None => std::future::pending().await,
    }
}

/// Reader-half task: forwards frames (and errors) to the dispatch loop.
/// Exits after a fatal transport error or when the loop goes away.
async fn read_loop(mut reader: PduReader, tx: mpsc::Sender<Result<Pdu>>) {
    loop {
        let item = reader.read_pdu().await;
        let fatal = item.as_ref().err().is_some_and(|e| e.is_fatal());
        if tx.send(item).await.is_err() {
            return;
        }
        if fatal {
            return;
        }
    }
}

/// One region's refresh schedule: an immediate first refresh, then one per
/// interval. A failed refresh keeps the previous snapshot published.
async fn updater_loop(
    subtree: Oid,
    refresh: Duration,
    updater: Arc<dyn Updater>,
    cell: Arc<SnapshotCell>,
    cancel: CancellationToken,
) {
    let mut tick = tokio::time::interval(refresh.max(Duration::from_millis(10)));
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tick.tick() => {}
        }

        let mut builder = SnapshotBuilder::new(subtree.clone());
        let result = tokio::select! {
            _ = cancel.cancelled() => break,
            result = updater.update(&mut builder) => result,
        };

        match result {
            Ok(()) => {
                let bindings = builder.len();
                cell.store(Arc::new(builder.build()));
                debug!(
                    target: "async_agentx::updater",
                    subtree = %subtree,
                    bindings,
                    "snapshot published"
                );
            }
            Err(e) => {
                warn!(
                    target: "async_agentx::updater",
                    error = %Error::updater(subtree.clone(), e),
                    "refresh failed, retaining previous snapshot"
                );
            }
        }
    }
}
