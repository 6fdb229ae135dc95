#![cfg(feature = "std")]

//! Simulated VSP peer for running sessions without a radio.
//!
//! The remote end keeps a receive buffer of fixed size. When a write fills it
//! the link reports buffer space as gone, then reports it back after a drain
//! delay. Received lines can be echoed back as RX notifications of random size.

use std::sync::{Arc, Mutex};

use log::{debug, trace};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::time::{sleep, Duration};

use crate::core::engine::SendTicket;
use crate::transport::{LinkEvent, VspLink};

/// Behaviour of the simulated remote.
#[derive(Debug, Clone)]
pub struct LoopbackConfig {
    /// Bytes the remote accepts before reporting its buffer full. 0 means unlimited.
    pub remote_buffer: usize,
    /// Time the remote needs to empty a full buffer.
    pub drain_delay: Duration,
    /// Delay before a write is acknowledged.
    pub ack_delay: Duration,
    /// Echo every complete line back to the host.
    pub echo: bool,
    pub echo_delimiter: u8,
    /// Largest RX notification the remote sends.
    pub max_notify_len: usize,
    /// Fail every write after this many have succeeded.
    pub fail_after: Option<usize>,
    pub seed: u64,
}

impl Default for LoopbackConfig {
    fn default() -> Self {
        Self {
            remote_buffer: 0,
            drain_delay: Duration::from_millis(10),
            ack_delay: Duration::ZERO,
            echo: false,
            echo_delimiter: b'\n',
            max_notify_len: 20,
            fail_after: None,
            seed: 0,
        }
    }
}

struct Remote {
    buffered: usize,
    full: bool,
    received: Vec<u8>,
    echo_pending: Vec<u8>,
    writes: usize,
    rng: SmallRng,
}

/// In-process [`VspLink`] backed by a simulated peer.
#[derive(Clone)]
pub struct LoopbackLink {
    config: LoopbackConfig,
    remote: Arc<Mutex<Remote>>,
    events: UnboundedSender<LinkEvent>,
}

impl LoopbackLink {
    /// Create the link together with the receiver its events arrive on.
    pub fn new(config: LoopbackConfig) -> (Self, UnboundedReceiver<LinkEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let remote = Remote {
            buffered: 0,
            full: false,
            received: Vec::new(),
            echo_pending: Vec::new(),
            writes: 0,
            rng: SmallRng::seed_from_u64(config.seed),
        };
        (
            Self {
                config,
                remote: Arc::new(Mutex::new(remote)),
                events,
            },
            rx,
        )
    }

    /// Report a connection with a validated VSP channel.
    pub fn connect(&self) {
        self.post(LinkEvent::Connected);
        self.post(LinkEvent::ChannelReady);
    }

    pub fn disconnect(&self) {
        self.post(LinkEvent::Disconnected);
    }

    /// Every byte the remote has accepted so far.
    pub fn received(&self) -> Vec<u8> {
        self.remote
            .lock()
            .map(|remote| remote.received.clone())
            .unwrap_or_default()
    }

    /// Send `bytes` from the remote to the host, split into random notifications.
    pub fn deliver(&self, bytes: &[u8]) -> anyhow::Result<()> {
        let mut remote = self
            .remote
            .lock()
            .map_err(|_| anyhow::anyhow!("loopback state poisoned"))?;
        self.notify_split(&mut remote.rng, bytes);
        Ok(())
    }

    fn post(&self, event: LinkEvent) {
        if self.events.send(event).is_err() {
            debug!("loopback event dropped: session has stopped");
        }
    }

    fn post_after(&self, delay: Duration, event: LinkEvent) {
        if delay.is_zero() {
            self.post(event);
            return;
        }
        let events = self.events.clone();
        tokio::spawn(async move {
            sleep(delay).await;
            let _ = events.send(event);
        });
    }

    fn notify_split(&self, rng: &mut SmallRng, mut bytes: &[u8]) {
        let max = self.config.max_notify_len.max(1);
        while !bytes.is_empty() {
            let n = rng.random_range(1..=max).min(bytes.len());
            let (head, rest) = bytes.split_at(n);
            self.post(LinkEvent::ChunkReceived(head.to_vec()));
            bytes = rest;
        }
    }

    fn schedule_drain(&self) {
        let remote = Arc::clone(&self.remote);
        let events = self.events.clone();
        let delay = self.config.drain_delay;
        tokio::spawn(async move {
            sleep(delay).await;
            if let Ok(mut remote) = remote.lock() {
                remote.buffered = 0;
                remote.full = false;
            }
            trace!("loopback remote drained");
            let _ = events.send(LinkEvent::CreditChanged {
                old: false,
                new: true,
            });
        });
    }
}

#[async_trait::async_trait]
impl VspLink for LoopbackLink {
    async fn write_chunk(&mut self, ticket: SendTicket, chunk: Vec<u8>) -> anyhow::Result<()> {
        let mut remote = self
            .remote
            .lock()
            .map_err(|_| anyhow::anyhow!("loopback state poisoned"))?;

        if let Some(limit) = self.config.fail_after {
            if remote.writes >= limit {
                debug!("loopback rejecting write {}", ticket.seq);
                self.post(LinkEvent::ChunkSent { ticket, ok: false });
                return Ok(());
            }
        }
        remote.writes += 1;
        remote.received.extend_from_slice(&chunk);
        remote.buffered += chunk.len();

        let capacity = self.config.remote_buffer;
        if capacity > 0 && !remote.full && remote.buffered >= capacity {
            remote.full = true;
            self.post(LinkEvent::CreditChanged {
                old: true,
                new: false,
            });
            self.schedule_drain();
        }
        self.post_after(self.config.ack_delay, LinkEvent::ChunkSent { ticket, ok: true });

        if self.config.echo {
            remote.echo_pending.extend_from_slice(&chunk);
            let delimiter = self.config.echo_delimiter;
            while let Some(pos) = remote.echo_pending.iter().position(|&b| b == delimiter) {
                let line: Vec<u8> = remote.echo_pending.drain(..=pos).collect();
                self.notify_split(&mut remote.rng, &line);
            }
        }
        Ok(())
    }
}
