use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Duration, Instant};
use vsp_transfer::{
    ControlOutcome, EngineConfig, LinkEvent, SendTicket, Session, SessionHandle, SessionSnapshot,
    SourceKind, TransferError, TransferEvent, TransferState, VspLink,
};

#[derive(Clone, Copy, PartialEq)]
enum Ack {
    /// Acknowledge every write right away.
    Immediate,
    /// Never acknowledge; the test posts completions itself.
    Manual,
    /// Report failure for every write after the first `n`.
    FailAfter(usize),
    /// Refuse to issue writes after the first `n`.
    ErrorAfter(usize),
}

#[derive(Clone)]
struct Write {
    at: Instant,
    ticket: SendTicket,
    chunk: Vec<u8>,
}

#[derive(Clone)]
struct MockLink {
    writes: Arc<Mutex<Vec<Write>>>,
    events: UnboundedSender<LinkEvent>,
    ack: Ack,
    stall_after: Option<usize>,
}

impl MockLink {
    fn new(ack: Ack, stall_after: Option<usize>) -> (Self, UnboundedReceiver<LinkEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        (
            Self {
                writes: Arc::new(Mutex::new(Vec::new())),
                events,
                ack,
                stall_after,
            },
            rx,
        )
    }

    fn post(&self, event: LinkEvent) {
        self.events.send(event).unwrap();
    }

    fn writes(&self) -> Vec<Write> {
        self.writes.lock().unwrap().clone()
    }
}

#[async_trait]
impl VspLink for MockLink {
    async fn write_chunk(&mut self, ticket: SendTicket, chunk: Vec<u8>) -> anyhow::Result<()> {
        let mut writes = self.writes.lock().unwrap();
        let n = writes.len();
        if let Ack::ErrorAfter(limit) = self.ack {
            if n >= limit {
                return Err(anyhow::anyhow!("radio off"));
            }
        }
        writes.push(Write {
            at: Instant::now(),
            ticket,
            chunk,
        });
        if self.stall_after == Some(n + 1) {
            self.post(LinkEvent::CreditChanged {
                old: true,
                new: false,
            });
        }
        match self.ack {
            Ack::Immediate | Ack::ErrorAfter(_) => self.post(LinkEvent::ChunkSent { ticket, ok: true }),
            Ack::FailAfter(limit) => self.post(LinkEvent::ChunkSent {
                ticket,
                ok: n < limit,
            }),
            Ack::Manual => {}
        }
        Ok(())
    }
}

fn start(
    config: EngineConfig,
    link: MockLink,
    link_events: UnboundedReceiver<LinkEvent>,
) -> (
    SessionHandle,
    UnboundedReceiver<TransferEvent>,
    JoinHandle<anyhow::Result<SessionSnapshot>>,
) {
    let (session, handle, events) = Session::new(config, link, link_events).unwrap();
    let task = tokio::spawn(session.run());
    (handle, events, task)
}

async fn wait_for(handle: &SessionHandle, check: impl Fn(&SessionSnapshot) -> bool) -> SessionSnapshot {
    for _ in 0..1000 {
        let snapshot = handle.snapshot().await.unwrap();
        if check(&snapshot) {
            return snapshot;
        }
        tokio::task::yield_now().await;
    }
    panic!("session never reached the expected state");
}

async fn connect(link: &MockLink, handle: &SessionHandle) {
    link.post(LinkEvent::Connected);
    link.post(LinkEvent::ChannelReady);
    wait_for(handle, |s| s.connected && s.channel_ready).await;
}

/// Collect events up to and including the first completion or failure.
async fn until_finished(events: &mut UnboundedReceiver<TransferEvent>) -> Vec<TransferEvent> {
    let mut seen = Vec::new();
    let collect = async {
        while let Some(event) = events.recv().await {
            let done = matches!(
                event,
                TransferEvent::TransferCompleted { .. } | TransferEvent::TransferFailed { .. }
            );
            seen.push(event);
            if done {
                break;
            }
        }
    };
    timeout(Duration::from_secs(10), collect)
        .await
        .expect("transfer never finished");
    seen
}

fn drain(events: &mut UnboundedReceiver<TransferEvent>) -> Vec<TransferEvent> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}

#[tokio::test(start_paused = true)]
async fn test_hundred_bytes_in_five_writes() {
    let (link, rx) = MockLink::new(Ack::Immediate, None);
    let (handle, mut events, _task) = start(EngineConfig::default().with_chunk_size(20), link.clone(), rx);
    connect(&link, &handle).await;

    let data: Vec<u8> = (0..100).collect();
    assert_eq!(handle.send_data(data.clone()).await.unwrap(), ControlOutcome::Applied);
    let seen = until_finished(&mut events).await;

    assert_eq!(seen.last(), Some(&TransferEvent::TransferCompleted { bytes_sent: 100 }));
    let writes = link.writes();
    assert_eq!(writes.len(), 5);
    let sent: Vec<u8> = writes.iter().flat_map(|w| w.chunk.clone()).collect();
    assert_eq!(sent, data);

    sleep(Duration::from_millis(50)).await;
    assert!(drain(&mut events).is_empty());
    let snapshot = handle.snapshot().await.unwrap();
    assert_eq!(snapshot.state, TransferState::Uploaded);
    assert_eq!(snapshot.bytes_sent, 100);
    assert_eq!(snapshot.source, Some(SourceKind::Memory));
}

#[tokio::test(start_paused = true)]
async fn test_long_upload_keeps_task_count_flat() {
    let (link, rx) = MockLink::new(Ack::Immediate, None);
    let (handle, mut events, _task) = start(EngineConfig::default().with_chunk_size(4), link.clone(), rx);
    connect(&link, &handle).await;

    let metrics = tokio::runtime::Handle::current().metrics();
    handle.send_data(vec![0x55; 2000]).await.unwrap();
    let mut peak = 0;
    let mut done = false;
    while !done {
        let event = timeout(Duration::from_secs(10), events.recv())
            .await
            .unwrap()
            .unwrap();
        peak = peak.max(metrics.num_alive_tasks());
        done = matches!(event, TransferEvent::TransferCompleted { .. });
    }

    assert_eq!(link.writes().len(), 500);
    // Only the session task itself; timers are not spawned per write.
    assert!(peak <= 1, "peak alive tasks {}", peak);
}

#[tokio::test(start_paused = true)]
async fn test_writes_are_paced() {
    let pacing = Duration::from_millis(5);
    let config = EngineConfig::default()
        .with_chunk_size(8)
        .with_pacing_delay(pacing);
    let (link, rx) = MockLink::new(Ack::Immediate, None);
    let (handle, mut events, _task) = start(config, link.clone(), rx);
    connect(&link, &handle).await;

    handle.send_data(vec![0xA5; 64]).await.unwrap();
    until_finished(&mut events).await;

    let writes = link.writes();
    assert_eq!(writes.len(), 8);
    for pair in writes.windows(2) {
        assert!(pair[1].at - pair[0].at >= pacing);
    }
}

#[tokio::test(start_paused = true)]
async fn test_begin_without_connection_stays_ready() {
    let (link, rx) = MockLink::new(Ack::Immediate, None);
    let (handle, _events, _task) = start(EngineConfig::default(), link.clone(), rx);
    link.post(LinkEvent::ChannelReady);
    wait_for(&handle, |s| s.channel_ready).await;

    assert_eq!(handle.attach_payload(vec![1u8; 30]).await.unwrap(), ControlOutcome::Applied);
    assert_eq!(handle.begin_transfer().await.unwrap(), ControlOutcome::Rejected);

    sleep(Duration::from_millis(20)).await;
    assert!(link.writes().is_empty());
    assert_eq!(handle.snapshot().await.unwrap().state, TransferState::Ready);
}

#[tokio::test(start_paused = true)]
async fn test_failed_write_halts_once() {
    let (link, rx) = MockLink::new(Ack::FailAfter(1), None);
    let (handle, mut events, _task) = start(EngineConfig::default().with_chunk_size(10), link.clone(), rx);
    connect(&link, &handle).await;

    handle.send_data(vec![7u8; 50]).await.unwrap();
    let seen = until_finished(&mut events).await;
    assert_eq!(
        seen.last(),
        Some(&TransferEvent::TransferFailed {
            reason: TransferError::SendFailed
        })
    );

    sleep(Duration::from_millis(50)).await;
    assert_eq!(link.writes().len(), 2);
    assert!(drain(&mut events).is_empty());
    let snapshot = handle.snapshot().await.unwrap();
    assert_eq!(snapshot.state, TransferState::Uploading);
    assert!(snapshot.halted);
    assert_eq!(snapshot.bytes_sent, 10);
}

#[tokio::test(start_paused = true)]
async fn test_refused_write_is_a_send_failure() {
    let (link, rx) = MockLink::new(Ack::ErrorAfter(2), None);
    let (handle, mut events, _task) = start(EngineConfig::default().with_chunk_size(10), link.clone(), rx);
    connect(&link, &handle).await;

    handle.send_data(vec![7u8; 50]).await.unwrap();
    let seen = until_finished(&mut events).await;
    let failures = seen
        .iter()
        .filter(|e| matches!(e, TransferEvent::TransferFailed { .. }))
        .count();
    assert_eq!(failures, 1);
    assert_eq!(link.writes().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_credit_stall_and_resume() {
    let (link, rx) = MockLink::new(Ack::Immediate, Some(2));
    let (handle, mut events, _task) = start(EngineConfig::default().with_chunk_size(20), link.clone(), rx);
    connect(&link, &handle).await;

    handle.send_data(vec![3u8; 100]).await.unwrap();
    wait_for(&handle, |s| !s.credit_available).await;
    sleep(Duration::from_millis(50)).await;
    assert_eq!(link.writes().len(), 2);

    // A repeated "no space" report is not an edge.
    link.post(LinkEvent::CreditChanged {
        old: false,
        new: false,
    });
    sleep(Duration::from_millis(10)).await;
    assert_eq!(link.writes().len(), 2);

    link.post(LinkEvent::CreditChanged {
        old: false,
        new: true,
    });
    let seen = until_finished(&mut events).await;
    assert_eq!(seen.last(), Some(&TransferEvent::TransferCompleted { bytes_sent: 100 }));
    assert_eq!(link.writes().len(), 5);
}

#[tokio::test(start_paused = true)]
async fn test_completion_after_reset_is_ignored() {
    let (link, rx) = MockLink::new(Ack::Manual, None);
    let (handle, mut events, _task) = start(EngineConfig::default(), link.clone(), rx);
    connect(&link, &handle).await;

    handle.send_data(vec![1u8; 60]).await.unwrap();
    wait_for(&handle, |_| !link.writes().is_empty()).await;
    assert_eq!(handle.reset().await.unwrap(), ControlOutcome::Applied);

    let ticket = link.writes()[0].ticket;
    link.post(LinkEvent::ChunkSent { ticket, ok: true });
    sleep(Duration::from_millis(20)).await;

    let snapshot = handle.snapshot().await.unwrap();
    assert_eq!(snapshot.state, TransferState::Idle);
    assert_eq!(snapshot.bytes_sent, 0);
    assert_eq!(link.writes().len(), 1);
    assert!(!drain(&mut events)
        .iter()
        .any(|e| matches!(e, TransferEvent::TransferProgress { .. })));
}

#[tokio::test(start_paused = true)]
async fn test_unacknowledged_write_times_out() {
    let config = EngineConfig::default().with_send_timeout(Some(Duration::from_millis(100)));
    let (link, rx) = MockLink::new(Ack::Manual, None);
    let (handle, mut events, _task) = start(config, link.clone(), rx);
    connect(&link, &handle).await;

    handle.send_data(vec![1u8; 60]).await.unwrap();
    let seen = until_finished(&mut events).await;
    assert_eq!(
        seen.last(),
        Some(&TransferEvent::TransferFailed {
            reason: TransferError::SendTimeout
        })
    );
    assert_eq!(link.writes().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_inbound_notifications_are_reassembled() {
    let (link, rx) = MockLink::new(Ack::Immediate, None);
    let (handle, mut events, _task) = start(EngineConfig::default(), link.clone(), rx);
    connect(&link, &handle).await;

    link.post(LinkEvent::ChunkReceived(b"AB".to_vec()));
    link.post(LinkEvent::ChunkReceived(b"CD\nEF\n".to_vec()));

    let first = timeout(Duration::from_secs(1), events.recv()).await.unwrap();
    let second = timeout(Duration::from_secs(1), events.recv()).await.unwrap();
    assert_eq!(first, Some(TransferEvent::MessageReceived(b"ABCD".to_vec())));
    assert_eq!(second, Some(TransferEvent::MessageReceived(b"EF".to_vec())));
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_mid_upload_then_reconnect() {
    let (link, rx) = MockLink::new(Ack::Manual, None);
    let (handle, mut events, _task) = start(EngineConfig::default(), link.clone(), rx);
    connect(&link, &handle).await;

    handle.send_data(vec![1u8; 60]).await.unwrap();
    wait_for(&handle, |_| !link.writes().is_empty()).await;
    link.post(LinkEvent::Disconnected);

    let seen = until_finished(&mut events).await;
    assert_eq!(
        seen.last(),
        Some(&TransferEvent::TransferFailed {
            reason: TransferError::Disconnected
        })
    );
    let snapshot = wait_for(&handle, |s| !s.connected).await;
    assert_eq!(snapshot.state, TransferState::Idle);
    assert_eq!(snapshot.queued_chunks, 0);

    connect(&link, &handle).await;
    let snapshot = handle.snapshot().await.unwrap();
    assert_eq!(snapshot.state, TransferState::Ready);
}

#[tokio::test(start_paused = true)]
async fn test_session_stops_when_handles_drop() {
    let (link, rx) = MockLink::new(Ack::Immediate, None);
    let (handle, _events, task) = start(EngineConfig::default(), link.clone(), rx);
    connect(&link, &handle).await;
    drop(handle);

    let snapshot = task.await.unwrap().unwrap();
    assert!(snapshot.connected);
    assert_eq!(snapshot.state, TransferState::Idle);
}

#[tokio::test]
async fn test_invalid_config_is_rejected() {
    let (link, rx) = MockLink::new(Ack::Immediate, None);
    let result = Session::new(EngineConfig::default().with_chunk_size(0), link, rx);
    assert!(result.is_err());
}
