#![cfg(feature = "std")]

//! Async driver for a [`TransferEngine`].
//!
//! A [`Session`] owns the engine and the link and is the only place where
//! either is touched. Application requests, link events and timer expiries
//! are all funnelled into one task and handled one at a time.

use std::pin::Pin;

use log::{debug, info, warn};
use serde::Serialize;
use tokio::sync::mpsc::{self, Receiver, Sender, UnboundedReceiver, UnboundedSender};
use tokio::sync::oneshot;
use tokio::time::{sleep, Duration, Instant, Sleep};

use crate::config::EngineConfig;
use crate::core::engine::{Action, SendTicket, TransferEngine};
use crate::core::events::TransferEvent;
use crate::core::framing::{DelimiterFramer, Framer};
use crate::core::source::{ByteSource, MemorySource, SourceKind};
use crate::core::state::{ControlOutcome, TransferState};
use crate::transport::{LinkEvent, VspLink};

const COMMAND_QUEUE: usize = 16;

/// Point-in-time view of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub state: TransferState,
    pub connected: bool,
    pub channel_ready: bool,
    pub bytes_sent: u64,
    pub credit_available: bool,
    pub halted: bool,
    pub queued_chunks: usize,
    pub source: Option<SourceKind>,
}

enum Command {
    ChooseSource(Box<dyn ByteSource>, oneshot::Sender<ControlOutcome>),
    SendData(Vec<u8>, oneshot::Sender<ControlOutcome>),
    BeginTransfer(oneshot::Sender<ControlOutcome>),
    Reset(oneshot::Sender<ControlOutcome>),
    Snapshot(oneshot::Sender<SessionSnapshot>),
}

pub struct Session<L: VspLink, F: Framer = DelimiterFramer> {
    engine: TransferEngine<F>,
    link: L,
    link_events: UnboundedReceiver<LinkEvent>,
    commands: Receiver<Command>,
    /// Single pacing timer, armed for the epoch it was requested in.
    pacing: Pin<Box<Sleep>>,
    pacing_epoch: Option<u64>,
    /// Single acknowledgement timer for the write in flight.
    send_timer: Pin<Box<Sleep>>,
    send_ticket: Option<SendTicket>,
    app_events: UnboundedSender<TransferEvent>,
}

impl<L: VspLink> Session<L> {
    /// Build a session with a newline-framed engine.
    ///
    /// Returns the session, a handle for control requests and the stream of
    /// application events.
    pub fn new(
        config: EngineConfig,
        link: L,
        link_events: UnboundedReceiver<LinkEvent>,
    ) -> anyhow::Result<(Self, SessionHandle, UnboundedReceiver<TransferEvent>)> {
        config.validate()?;
        Ok(Self::with_engine(TransferEngine::new(config), link, link_events))
    }
}

impl<L: VspLink, F: Framer> Session<L, F> {
    pub fn with_engine(
        engine: TransferEngine<F>,
        link: L,
        link_events: UnboundedReceiver<LinkEvent>,
    ) -> (Self, SessionHandle, UnboundedReceiver<TransferEvent>) {
        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_QUEUE);
        let (app_tx, app_rx) = mpsc::unbounded_channel();
        let session = Self {
            engine,
            link,
            link_events,
            commands: cmd_rx,
            pacing: Box::pin(sleep(Duration::ZERO)),
            pacing_epoch: None,
            send_timer: Box::pin(sleep(Duration::ZERO)),
            send_ticket: None,
            app_events: app_tx,
        };
        (session, SessionHandle { commands: cmd_tx }, app_rx)
    }

    /// Process events until every [`SessionHandle`] is dropped or the link
    /// closes its event channel. Returns the final snapshot.
    pub async fn run(mut self) -> anyhow::Result<SessionSnapshot> {
        loop {
            tokio::select! {
                cmd = self.commands.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd),
                    None => {
                        debug!("all session handles dropped");
                        break;
                    }
                },
                event = self.link_events.recv() => match event {
                    Some(event) => self.handle_link_event(event),
                    None => {
                        info!("link closed");
                        break;
                    }
                },
                () = &mut self.pacing, if self.pacing_epoch.is_some() => {
                    if let Some(epoch) = self.pacing_epoch.take() {
                        self.engine.on_pacing_elapsed(epoch);
                    }
                }
                () = &mut self.send_timer, if self.send_ticket.is_some() => {
                    if let Some(ticket) = self.send_ticket.take() {
                        self.engine.on_send_timeout(ticket);
                    }
                }
            }
            self.flush().await;
        }
        Ok(self.snapshot())
    }

    fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::ChooseSource(source, reply) => {
                let _ = reply.send(self.engine.choose_source(source));
            }
            Command::SendData(data, reply) => {
                let _ = reply.send(self.engine.send_data(data));
            }
            Command::BeginTransfer(reply) => {
                let _ = reply.send(self.engine.begin_transfer());
            }
            Command::Reset(reply) => {
                let _ = reply.send(self.engine.reset());
            }
            Command::Snapshot(reply) => {
                let _ = reply.send(self.snapshot());
            }
        }
    }

    fn handle_link_event(&mut self, event: LinkEvent) {
        match event {
            LinkEvent::Connected => self.engine.on_connected(),
            LinkEvent::Disconnected => self.engine.on_disconnected(),
            LinkEvent::ChannelReady => self.engine.on_channel_ready(),
            LinkEvent::ChunkSent { ticket, ok } => self.engine.on_chunk_sent(ticket, ok),
            LinkEvent::ChunkReceived(bytes) => self.engine.on_chunk_received(&bytes),
            LinkEvent::CreditChanged { old, new } => self.engine.on_credit_changed(old, new),
        }
    }

    /// Carry out everything the engine asked for.
    async fn flush(&mut self) {
        while let Some(action) = self.engine.poll_action() {
            match action {
                Action::Send { ticket, chunk } => {
                    if let Err(e) = self.link.write_chunk(ticket, chunk).await {
                        warn!("link write failed: {:#}", e);
                        self.engine.on_chunk_sent(ticket, false);
                    }
                }
                Action::SchedulePacing { epoch, delay } => {
                    self.pacing.as_mut().reset(Instant::now() + delay);
                    self.pacing_epoch = Some(epoch);
                }
                Action::ArmSendTimer { ticket, timeout } => {
                    self.send_timer.as_mut().reset(Instant::now() + timeout);
                    self.send_ticket = Some(ticket);
                }
                Action::Notify(event) => {
                    if self.app_events.send(event).is_err() {
                        debug!("event dropped: no listener");
                    }
                }
            }
        }
        if !self.engine.has_send_in_flight() {
            self.send_ticket = None;
        }
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.engine.state(),
            connected: self.engine.is_connected(),
            channel_ready: self.engine.is_channel_ready(),
            bytes_sent: self.engine.bytes_sent(),
            credit_available: self.engine.credit_available(),
            halted: self.engine.is_halted(),
            queued_chunks: self.engine.queued_chunks(),
            source: self.engine.source_kind(),
        }
    }
}

/// Cloneable handle for issuing control requests to a running [`Session`].
#[derive(Clone)]
pub struct SessionHandle {
    commands: Sender<Command>,
}

impl SessionHandle {
    pub async fn choose_source(
        &self,
        source: impl ByteSource + 'static,
    ) -> anyhow::Result<ControlOutcome> {
        let source: Box<dyn ByteSource> = Box::new(source);
        self.request(|reply| Command::ChooseSource(source, reply)).await
    }

    pub async fn attach_payload(&self, data: impl Into<Vec<u8>>) -> anyhow::Result<ControlOutcome> {
        self.choose_source(MemorySource::new(data)).await
    }

    /// Arm `data` and start uploading it in one step.
    pub async fn send_data(&self, data: impl Into<Vec<u8>>) -> anyhow::Result<ControlOutcome> {
        let data = data.into();
        self.request(|reply| Command::SendData(data, reply)).await
    }

    pub async fn begin_transfer(&self) -> anyhow::Result<ControlOutcome> {
        self.request(Command::BeginTransfer).await
    }

    pub async fn reset(&self) -> anyhow::Result<ControlOutcome> {
        self.request(Command::Reset).await
    }

    pub async fn snapshot(&self) -> anyhow::Result<SessionSnapshot> {
        self.request(Command::Snapshot).await
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> anyhow::Result<T> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(make(tx))
            .await
            .map_err(|_| anyhow::anyhow!("session has stopped"))?;
        rx.await
            .map_err(|_| anyhow::anyhow!("session dropped the request"))
    }
}
