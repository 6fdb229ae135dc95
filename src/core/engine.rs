//! Host-driven transfer engine.
//!
//! `TransferEngine` performs no I/O and owns no timers. The host feeds it link
//! events and control requests, then drains the resulting [`Action`]s: chunks
//! to write, timers to arm, and events for the application. Everything for
//! one connection goes through a single engine, one call at a time.

use alloc::boxed::Box;
use alloc::collections::VecDeque;
use alloc::vec::Vec;
use core::time::Duration;

use log::{debug, info, trace, warn};

use crate::config::EngineConfig;
use crate::core::credit::{CreditEdge, CreditTracker};
use crate::core::events::TransferEvent;
use crate::core::fifo::OutboundQueue;
use crate::core::framing::{DelimiterFramer, Framer, FramingBuffer};
use crate::core::source::{ByteSource, MemorySource, SourceAdapter, SourceKind};
use crate::core::state::{ControlOutcome, TransferState};
use crate::error::TransferError;

/// Identifies one chunk write.
///
/// `epoch` changes whenever the session is reset or re-armed, so a completion
/// that belongs to an abandoned upload can be recognised and dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SendTicket {
    pub epoch: u64,
    pub seq: u64,
}

/// Work for the host to carry out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Write `chunk` to the link and report back with `on_chunk_sent(ticket, ..)`.
    Send { ticket: SendTicket, chunk: Vec<u8> },
    /// Call `on_pacing_elapsed(epoch)` once `delay` has passed.
    SchedulePacing { epoch: u64, delay: Duration },
    /// Call `on_send_timeout(ticket)` if the write is still pending after `timeout`.
    ArmSendTimer { ticket: SendTicket, timeout: Duration },
    /// Deliver an event to the application.
    Notify(TransferEvent),
}

#[derive(Debug, Clone, Copy)]
struct InFlight {
    ticket: SendTicket,
    len: usize,
}

pub struct TransferEngine<F: Framer = DelimiterFramer> {
    config: EngineConfig,
    state: TransferState,
    connected: bool,
    channel_valid: bool,
    credit: CreditTracker,
    outbound: OutboundQueue,
    inbound: FramingBuffer<F>,
    source: Option<SourceAdapter>,
    epoch: u64,
    next_seq: u64,
    in_flight: Option<InFlight>,
    pacing_pending: bool,
    halted: bool,
    bytes_sent: u64,
    actions: VecDeque<Action>,
}

impl TransferEngine<DelimiterFramer> {
    /// Engine that frames inbound text on `config.delimiter`.
    pub fn new(config: EngineConfig) -> Self {
        let framer = DelimiterFramer::new(config.delimiter);
        Self::with_framer(config, framer)
    }
}

impl<F: Framer> TransferEngine<F> {
    pub fn with_framer(config: EngineConfig, framer: F) -> Self {
        Self {
            credit: CreditTracker::new(config.initial_credit),
            outbound: OutboundQueue::new(config.fifo_depth),
            inbound: FramingBuffer::new(framer, config.max_inbound_buffer),
            config,
            state: TransferState::Idle,
            connected: false,
            channel_valid: false,
            source: None,
            epoch: 0,
            next_seq: 0,
            in_flight: None,
            pacing_pending: false,
            halted: false,
            bytes_sent: 0,
            actions: VecDeque::new(),
        }
    }

    pub fn state(&self) -> TransferState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn is_channel_ready(&self) -> bool {
        self.channel_valid
    }

    pub fn credit_available(&self) -> bool {
        self.credit.is_available()
    }

    /// True after a failure until the source is re-armed or the session reset.
    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Acknowledged bytes for the current upload.
    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }

    pub fn queued_chunks(&self) -> usize {
        self.outbound.len()
    }

    pub fn inbound_pending(&self) -> usize {
        self.inbound.pending()
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn source_kind(&self) -> Option<SourceKind> {
        self.source.as_ref().map(SourceAdapter::kind)
    }

    pub fn has_send_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Next action for the host, oldest first.
    pub fn poll_action(&mut self) -> Option<Action> {
        self.actions.pop_front()
    }

    pub fn drain_actions(&mut self) -> Vec<Action> {
        self.actions.drain(..).collect()
    }

    pub fn on_connected(&mut self) {
        debug!("link connected");
        self.connected = true;
    }

    /// The link dropped. Outbound and inbound state is discarded; the armed
    /// source is kept so the session can become ready again after reconnecting.
    pub fn on_disconnected(&mut self) {
        if self.state.is_uploading() && !self.halted {
            self.notify(TransferEvent::TransferFailed {
                reason: TransferError::Disconnected,
            });
        }
        self.connected = false;
        self.channel_valid = false;
        self.cancel_upload();
        self.inbound.clear();
        self.credit.reset();
        self.set_state(TransferState::Idle);
    }

    /// The VSP characteristics were found and validated.
    pub fn on_channel_ready(&mut self) {
        self.channel_valid = true;
        if self.state == TransferState::Idle {
            self.credit.reset();
            if self.source.is_some() {
                self.set_state(TransferState::Ready);
            }
        }
    }

    /// Completion of a write previously requested with [`Action::Send`].
    pub fn on_chunk_sent(&mut self, ticket: SendTicket, ok: bool) {
        let flight = match self.in_flight.take() {
            Some(flight) if flight.ticket == ticket => flight,
            other => {
                debug!("ignoring completion for stale write {:?}", ticket);
                self.in_flight = other;
                return;
            }
        };
        if !ok {
            self.fail(TransferError::SendFailed);
            return;
        }
        self.bytes_sent += flight.len as u64;
        trace!("write {} acknowledged, {} bytes sent", ticket.seq, self.bytes_sent);
        self.notify(TransferEvent::TransferProgress {
            bytes_sent: self.bytes_sent,
        });
        if self.state.is_uploading() && !self.halted {
            self.pacing_pending = true;
            self.actions.push_back(Action::SchedulePacing {
                epoch: self.epoch,
                delay: self.config.pacing_delay,
            });
        }
    }

    /// The pacing delay requested with [`Action::SchedulePacing`] elapsed.
    pub fn on_pacing_elapsed(&mut self, epoch: u64) {
        if epoch != self.epoch || !self.pacing_pending {
            return;
        }
        self.pacing_pending = false;
        self.drain();
    }

    /// A write stayed unacknowledged past the configured timeout.
    pub fn on_send_timeout(&mut self, ticket: SendTicket) {
        match self.in_flight {
            Some(flight) if flight.ticket == ticket => {
                self.in_flight = None;
                self.fail(TransferError::SendTimeout);
            }
            _ => {}
        }
    }

    /// The remote's buffer-space flag changed.
    pub fn on_credit_changed(&mut self, old: bool, new: bool) {
        let edge = self.credit.on_change(old, new);
        trace!("credit {} -> {} ({:?})", old, new, edge);
        if edge == CreditEdge::Rising && self.state.is_uploading() {
            self.drain();
        }
    }

    /// Raw bytes from a notification on the VSP RX characteristic.
    pub fn on_chunk_received(&mut self, bytes: &[u8]) {
        self.inbound.append(bytes);
        let actions = &mut self.actions;
        let result = self.inbound.extract_all(|message| {
            actions.push_back(Action::Notify(TransferEvent::MessageReceived(message)));
        });
        if let Err(reason) = result {
            warn!("discarding inbound bytes: {}", reason);
            self.notify(TransferEvent::ReceiveError { reason });
        }
    }

    /// Arm a new source, replacing any previous one.
    ///
    /// Anything queued from the old source is dropped and in-flight writes
    /// are orphaned. The session becomes `Ready` if the channel is valid.
    pub fn choose_source(&mut self, source: Box<dyn ByteSource>) -> ControlOutcome {
        if self.state.is_uploading() && !self.halted {
            warn!("source replaced during an active upload");
        }
        self.cancel_upload();
        self.source = Some(SourceAdapter::new(source));
        let next = if self.channel_valid {
            TransferState::Ready
        } else {
            TransferState::Idle
        };
        self.set_state(next);
        ControlOutcome::Applied
    }

    /// Arm an in-memory payload.
    pub fn attach_payload(&mut self, payload: impl Into<Vec<u8>>) -> ControlOutcome {
        self.choose_source(Box::new(MemorySource::new(payload)))
    }

    /// Arm `payload` and start sending it right away.
    pub fn send_data(&mut self, payload: impl Into<Vec<u8>>) -> ControlOutcome {
        if self.state.is_uploading() && !self.halted {
            debug!("send_data rejected: upload in progress");
            return ControlOutcome::Rejected;
        }
        self.attach_payload(payload);
        self.begin_transfer()
    }

    /// `Ready -> Uploading`. Requires a connected link.
    pub fn begin_transfer(&mut self) -> ControlOutcome {
        match self.state {
            TransferState::Uploading if !self.halted => return ControlOutcome::AlreadyInState,
            TransferState::Ready if self.connected => {}
            TransferState::Ready => {
                debug!("begin_transfer rejected: no connection");
                return ControlOutcome::Rejected;
            }
            _ => return ControlOutcome::Rejected,
        }
        let Some(source) = self.source.as_mut() else {
            return ControlOutcome::Rejected;
        };
        source.reset_to_start();
        let started = TransferEvent::TransferStarted {
            source: source.kind(),
            total_bytes: source.total_len(),
        };
        self.bytes_sent = 0;
        self.halted = false;
        self.set_state(TransferState::Uploading);
        self.notify(started);
        self.drain();
        ControlOutcome::Applied
    }

    /// Any state -> `Idle`, discarding the source, queues and credit state.
    pub fn reset(&mut self) -> ControlOutcome {
        if self.state == TransferState::Idle
            && self.source.is_none()
            && self.outbound.is_empty()
            && self.inbound.is_empty()
        {
            return ControlOutcome::AlreadyInState;
        }
        self.cancel_upload();
        self.inbound.clear();
        self.credit.reset();
        self.source = None;
        self.set_state(TransferState::Idle);
        ControlOutcome::Applied
    }

    /// Send the next chunk if nothing blocks it, or finish the upload.
    fn drain(&mut self) {
        if !self.state.is_uploading()
            || self.halted
            || self.in_flight.is_some()
            || self.pacing_pending
        {
            return;
        }
        if let Err(reason) = self.refill() {
            self.fail(reason);
            return;
        }
        // Refill leaves the queue empty only once the source is used up.
        if self.outbound.is_empty() {
            self.complete();
            return;
        }
        if !self.credit.is_available() {
            trace!("drain stalled waiting for credit");
            return;
        }
        if let Some(chunk) = self.outbound.pop() {
            self.transmit(chunk);
        }
    }

    fn refill(&mut self) -> Result<(), TransferError> {
        let Some(source) = self.source.as_mut() else {
            return Ok(());
        };
        while self.outbound.has_room() && !source.is_exhausted() {
            let slice = source.next_slice(self.config.chunk_size)?;
            if slice.is_empty() || self.outbound.push(slice).is_err() {
                break;
            }
        }
        Ok(())
    }

    fn transmit(&mut self, chunk: Vec<u8>) {
        let ticket = SendTicket {
            epoch: self.epoch,
            seq: self.next_seq,
        };
        self.next_seq += 1;
        trace!("writing chunk {} ({} bytes)", ticket.seq, chunk.len());
        self.in_flight = Some(InFlight {
            ticket,
            len: chunk.len(),
        });
        self.actions.push_back(Action::Send { ticket, chunk });
        if let Some(timeout) = self.config.send_timeout {
            self.actions
                .push_back(Action::ArmSendTimer { ticket, timeout });
        }
    }

    fn complete(&mut self) {
        self.set_state(TransferState::Uploaded);
        self.notify(TransferEvent::TransferCompleted {
            bytes_sent: self.bytes_sent,
        });
    }

    fn fail(&mut self, reason: TransferError) {
        if self.halted {
            return;
        }
        warn!("transfer halted: {}", reason);
        self.halted = true;
        self.in_flight = None;
        self.pacing_pending = false;
        self.notify(TransferEvent::TransferFailed { reason });
    }

    /// Abandon the current upload: later completions and timers are ignored.
    fn cancel_upload(&mut self) {
        self.epoch += 1;
        self.outbound.clear();
        self.in_flight = None;
        self.pacing_pending = false;
        self.halted = false;
    }

    fn set_state(&mut self, next: TransferState) {
        if self.state != next {
            info!("transfer state {} -> {}", self.state, next);
            self.state = next;
        }
    }

    fn notify(&mut self, event: TransferEvent) {
        self.actions.push_back(Action::Notify(event));
    }
}
