//! Polling scheduler for one PLC connection
//!
//! A single task owns the socket, the schedule and the batch buffer. It runs
//! an explicit state machine:
//!
//! ```text
//! Disconnected ──connect──► ConnectedIdle ──tick──► Polling
//!                               ▲                     │ ok
//!                               └─────────────────────┤
//!                                                     │ protocol / io error
//! Reconnecting ◄──────────────────────────────────────┘
//!      └──connect──► ConnectedIdle (next tick immediately)
//!
//! any state ──cancel──► ShuttingDown (flush batch, close socket)
//! ```
//!
//! Cancellation is observed between steps only, so an in-flight read always
//! completes (bounded by the read timeout) before shutdown proceeds.

use std::fmt;
use std::io;
use std::time::Duration;

use chrono::Utc;
use tokio::io::AsyncWriteExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::batch::{Batch, BatchAccumulator};
use super::connector::Connector;
use super::reconnect::{ReconnectError, ReconnectHelper, ReconnectPolicy};
use crate::error::{MelsrvError, Result};
use crate::protocols::melsec::{validate_blocks, DataBlock, DataCode, MelsecClient};
use crate::records::{RecordBuilder, RecordSettings};
use crate::storage::BatchWriter;

/// Everything one poller needs besides its transport and sink
#[derive(Debug, Clone)]
pub struct PollerSettings {
    /// Source name stamped on records and output files
    pub source: String,
    pub poll_interval: Duration,
    /// Batch window length
    pub aggregation: Duration,
    pub data_code: DataCode,
    pub read_timeout: Duration,
    pub reconnect: ReconnectPolicy,
    pub blocks: Vec<DataBlock>,
    pub records: RecordSettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PollerState {
    #[default]
    Disconnected,
    ConnectedIdle,
    Polling,
    Reconnecting,
    ShuttingDown,
}

impl fmt::Display for PollerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PollerState::Disconnected => "DISCONNECTED",
            PollerState::ConnectedIdle => "CONNECTED_IDLE",
            PollerState::Polling => "POLLING",
            PollerState::Reconnecting => "RECONNECTING",
            PollerState::ShuttingDown => "SHUTTING_DOWN",
        };
        f.write_str(name)
    }
}

/// Read-only view of a poller, published after every change
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PollerStatus {
    pub state: PollerState,
    pub connected: bool,
    /// Connect attempts since start
    pub connect_attempts: u64,
    /// Connections lost while polling
    pub disconnect_count: u64,
    /// Successful polls
    pub polls: u64,
    /// Output files written
    pub files_written: u64,
    pub last_error: Option<String>,
}

pub struct Poller<C: Connector> {
    settings: PollerSettings,
    connector: C,
    client: MelsecClient,
    builder: RecordBuilder,
    batch: BatchAccumulator,
    writer: BatchWriter,
    reconnect: ReconnectHelper,
    stream: Option<C::Stream>,
    next_tick: Instant,
    status_tx: watch::Sender<PollerStatus>,
}

impl<C: Connector> Poller<C> {
    /// Create a poller; blocks are validated here so bad layouts never poll
    pub fn new(settings: PollerSettings, connector: C, writer: BatchWriter) -> Result<Self> {
        if settings.poll_interval.is_zero() {
            return Err(MelsrvError::config(format!(
                "{}: poll interval must be positive",
                settings.source
            )));
        }
        if settings.aggregation.is_zero() {
            return Err(MelsrvError::config(format!(
                "{}: aggregation time must be positive",
                settings.source
            )));
        }
        validate_blocks(&settings.blocks)?;

        let (status_tx, _) = watch::channel(PollerStatus::default());
        Ok(Self {
            client: MelsecClient::new(settings.read_timeout),
            builder: RecordBuilder::new(settings.records.clone()),
            batch: BatchAccumulator::new(settings.aggregation),
            reconnect: ReconnectHelper::new(settings.reconnect.clone()),
            settings,
            connector,
            writer,
            stream: None,
            next_tick: Instant::now(),
            status_tx,
        })
    }

    pub fn source(&self) -> &str {
        &self.settings.source
    }

    pub fn subscribe(&self) -> watch::Receiver<PollerStatus> {
        self.status_tx.subscribe()
    }

    /// Run until cancelled or a fatal error occurs
    ///
    /// Pending records are flushed on every exit path.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<()> {
        info!(
            "{}: poller started for {} ({}, every {:?}, batches of {:?})",
            self.settings.source,
            self.connector.endpoint(),
            self.settings.data_code,
            self.settings.poll_interval,
            self.settings.aggregation
        );

        let mut state = PollerState::Disconnected;
        let outcome = loop {
            self.set_state(state);
            state = match state {
                PollerState::Disconnected | PollerState::Reconnecting => {
                    match self.open_socket(&cancel).await {
                        Ok(()) => PollerState::ConnectedIdle,
                        Err(ReconnectError::Cancelled) => PollerState::ShuttingDown,
                        Err(e) => {
                            error!(
                                "{}: giving up on {}: {}",
                                self.settings.source,
                                self.connector.endpoint(),
                                e
                            );
                            break Err(MelsrvError::connection(format!(
                                "{}: {}",
                                self.connector.endpoint(),
                                e
                            )));
                        },
                    }
                },
                PollerState::ConnectedIdle => {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => PollerState::ShuttingDown,
                        _ = sleep_until(self.next_tick) => PollerState::Polling,
                    }
                },
                PollerState::Polling => match self.poll_once().await {
                    Ok(()) => {
                        self.advance_schedule();
                        PollerState::ConnectedIdle
                    },
                    Err(e) if e.is_connection_fault() => {
                        self.drop_connection(&e).await;
                        PollerState::Reconnecting
                    },
                    Err(e) => {
                        error!("{}: stopping poller: {}", self.settings.source, e);
                        break Err(e);
                    },
                },
                PollerState::ShuttingDown => break Ok(()),
            };
        };

        self.set_state(PollerState::ShuttingDown);
        let flushed = self.flush_pending().await;
        self.close_socket().await;
        info!("{}: poller stopped", self.settings.source);
        outcome.and(flushed)
    }

    fn set_state(&self, state: PollerState) {
        self.status_tx.send_if_modified(|status| {
            if status.state == state {
                return false;
            }
            debug!("{}: {} -> {}", self.settings.source, status.state, state);
            status.state = state;
            true
        });
    }

    async fn open_socket(
        &mut self,
        cancel: &CancellationToken,
    ) -> std::result::Result<(), ReconnectError> {
        let connector = &self.connector;
        let status_tx = &self.status_tx;
        let stream = self
            .reconnect
            .reconnect_until_connected(cancel, || {
                status_tx.send_modify(|s| s.connect_attempts += 1);
                connector.connect()
            })
            .await?;

        self.stream = Some(stream);
        // first tick right away, also after a reconnect
        self.next_tick = Instant::now();
        self.status_tx.send_modify(|s| s.connected = true);
        info!(
            "{}: connected to {}",
            self.settings.source,
            self.connector.endpoint()
        );
        Ok(())
    }

    async fn poll_once(&mut self) -> Result<()> {
        let stream = self.stream.as_mut().ok_or_else(|| {
            MelsrvError::Io(io::Error::new(io::ErrorKind::NotConnected, "No open connection"))
        })?;

        let polled_at = Utc::now();
        let fields = self
            .client
            .read_blocks(stream, &self.settings.blocks, self.settings.data_code)
            .await?;
        let records = self.builder.build(&self.settings.source, polled_at, fields);
        debug!(
            "{}: poll produced {} record(s)",
            self.settings.source,
            records.len()
        );
        self.status_tx.send_modify(|s| s.polls += 1);

        if let Some(batch) = self.batch.push(polled_at, records) {
            self.write_batch(batch).await?;
        }
        Ok(())
    }

    /// Next tick is one interval after the previous one, unless that has
    /// fallen more than one interval behind
    fn advance_schedule(&mut self) {
        let interval = self.settings.poll_interval;
        self.next_tick += interval;
        let now = Instant::now();
        if now > self.next_tick + interval {
            warn!(
                "{}: polling fell behind by {:?}, re-anchoring schedule",
                self.settings.source,
                now - self.next_tick
            );
            self.next_tick = now;
        }
    }

    async fn drop_connection(&mut self, err: &MelsrvError) {
        warn!(
            "{}: connection to {} lost: {}",
            self.settings.source,
            self.connector.endpoint(),
            err
        );
        self.close_socket().await;
        let message = err.to_string();
        self.status_tx.send_modify(|s| {
            s.disconnect_count += 1;
            s.last_error = Some(message);
        });
    }

    async fn write_batch(&mut self, batch: Batch) -> Result<()> {
        let records = batch.records.len();
        let paths = self.writer.write(&batch).await.inspect_err(|e| {
            let message = e.to_string();
            self.status_tx.send_modify(|s| s.last_error = Some(message));
        })?;
        info!(
            "{}: flushed {} record(s) into {} file(s)",
            self.settings.source,
            records,
            paths.len()
        );
        self.status_tx.send_modify(|s| s.files_written += paths.len() as u64);
        Ok(())
    }

    async fn flush_pending(&mut self) -> Result<()> {
        match self.batch.take() {
            Some(batch) => self.write_batch(batch).await,
            None => Ok(()),
        }
    }

    async fn close_socket(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.shutdown().await {
                warn!("{}: error closing socket: {}", self.settings.source, e);
            }
            self.status_tx.send_modify(|s| s.connected = false);
        }
    }
}

/// Handle to a spawned poller task
pub struct PollerHandle {
    source: String,
    cancel: CancellationToken,
    status: watch::Receiver<PollerStatus>,
    task: JoinHandle<Result<()>>,
}

/// Spawn `poller` on the runtime; `cancel` stops it
pub fn spawn_poller<C>(poller: Poller<C>, cancel: CancellationToken) -> PollerHandle
where
    C: Connector + 'static,
{
    let source = poller.source().to_string();
    let status = poller.subscribe();
    let task = tokio::spawn(poller.run(cancel.clone()));
    PollerHandle {
        source,
        cancel,
        status,
        task,
    }
}

impl PollerHandle {
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Latest published status
    pub fn status(&self) -> PollerStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<PollerStatus> {
        self.status.clone()
    }

    /// Request shutdown and wait for the task to finish
    pub async fn shutdown(self) -> Result<()> {
        self.cancel.cancel();
        self.join().await
    }

    /// Wait for the task to finish on its own
    pub async fn join(self) -> Result<()> {
        let PollerHandle { source, task, .. } = self;
        task.await
            .map_err(|e| MelsrvError::internal(format!("{} poller task failed: {}", source, e)))?
    }
}
