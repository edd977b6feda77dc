//! Request/response over the LPD8 SysEx channel
//!
//! The device answers requests on its own schedule and interleaves the
//! replies with whatever else it sends. Inbound frames are pushed by the
//! transport's listener into a bounded queue ([`FrameSink`] -> [`FrameQueue`]),
//! and [`Connection::request_response`] drains that queue until a frame is
//! accepted, the response timeout fires or the connection is closed.
//!
//! The protocol has no message id, so only one request may be in flight per
//! connection. The queue receiver is held for the whole call to enforce that.

use std::ops::ControlFlow;
use std::time::Duration;

use tokio::sync::{mpsc, watch, Mutex};
use tokio::time::{sleep_until, timeout_at, Instant};
use tracing::{debug, info, trace, warn};

use crate::error::{Error, Result, TransportError};
use crate::frame::{format_hex, is_sysex};
use crate::message::{self, ProgramIndex};
use crate::program::Program;

/// Total time a request waits for its reply
pub const RESPONSE_TIMEOUT: Duration = Duration::from_secs(3);

/// Default capacity of the inbound frame queue
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Outbound side of a MIDI connection.
///
/// Inbound messages are delivered by the transport to a [`FrameSink`].
pub trait Transport: Send + Sync {
    /// Send one complete MIDI message
    fn send(&self, msg: &[u8]) -> std::result::Result<(), TransportError>;

    /// Release the underlying ports. Later sends may fail.
    fn close(&self) {}
}

/// Create the inbound frame queue shared by a transport listener and a [`Connection`]
pub fn inbound_queue(capacity: usize) -> (FrameSink, FrameQueue) {
    let (tx, rx) = mpsc::channel(capacity);
    let (closed_tx, closed_rx) = watch::channel(false);
    (
        FrameSink {
            tx,
            closed: closed_rx,
        },
        FrameQueue {
            rx: Mutex::new(rx),
            closed: closed_tx,
        },
    )
}

/// Producer half of the inbound queue, called from the transport's listener thread.
///
/// Never blocks: non-SysEx traffic is filtered out, frames arriving after
/// close are discarded and a full queue drops the frame.
#[derive(Clone)]
pub struct FrameSink {
    tx: mpsc::Sender<Vec<u8>>,
    closed: watch::Receiver<bool>,
}

impl FrameSink {
    pub fn push(&self, msg: &[u8]) {
        if !is_sysex(msg) {
            trace!("Ignoring non-SysEx message: {}", format_hex(msg));
            return;
        }
        if *self.closed.borrow() {
            return;
        }
        match self.tx.try_send(msg.to_vec()) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(frame)) => {
                warn!("Inbound queue full, dropping {} byte frame", frame.len());
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
    }
}

/// Consumer half of the inbound queue, owned by a [`Connection`]
pub struct FrameQueue {
    rx: Mutex<mpsc::Receiver<Vec<u8>>>,
    closed: watch::Sender<bool>,
}

impl FrameQueue {
    fn close(&self) {
        self.closed.send_replace(true);
    }

    fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }
}

/// A connection to one LPD8
pub struct Connection<T: Transport> {
    transport: T,
    queue: FrameQueue,
    timeout: Duration,
}

impl<T: Transport> Connection<T> {
    /// Create a connection with the default response timeout
    pub fn new(transport: T, queue: FrameQueue) -> Self {
        Self {
            transport,
            queue,
            timeout: RESPONSE_TIMEOUT,
        }
    }

    /// Replace the response timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Close the connection.
    ///
    /// A pending [`request_response`](Self::request_response) returns
    /// [`Error::Closed`] right away, and frames still arriving are discarded.
    pub fn close(&self) {
        if self.queue.is_closed() {
            return;
        }
        self.queue.close();
        self.transport.close();
        info!("LPD8 connection closed");
    }

    pub fn is_closed(&self) -> bool {
        self.queue.is_closed()
    }

    fn send(&self, msg: &[u8]) -> Result<()> {
        if self.queue.is_closed() {
            return Err(Error::Closed);
        }
        trace!("TX {}", format_hex(msg));
        self.transport.send(msg)?;
        Ok(())
    }

    /// Send `request` and wait for an inbound frame that `accept` breaks on.
    ///
    /// Frames for which `accept` returns `Continue` are skipped. The timeout
    /// covers the whole call and is not extended by skipped frames.
    pub async fn request_response<R, F>(&self, request: &[u8], mut accept: F) -> Result<R>
    where
        F: FnMut(&[u8]) -> ControlFlow<R>,
    {
        let deadline = Instant::now() + self.timeout;
        let mut closed = self.queue.closed.subscribe();

        // Waiting for an earlier request counts against this one's timeout.
        let Ok(mut inbound) = timeout_at(deadline, self.queue.rx.lock()).await else {
            debug!("Previous request still pending after {:?}", self.timeout);
            return Err(Error::ResponseTimeout(self.timeout));
        };

        self.send(request)?;

        let timeout = sleep_until(deadline);
        tokio::pin!(timeout);

        loop {
            tokio::select! {
                biased;

                _ = closed.wait_for(|&closed| closed) => return Err(Error::Closed),

                _ = &mut timeout => {
                    debug!("No valid response within {:?}", self.timeout);
                    return Err(Error::ResponseTimeout(self.timeout));
                }

                frame = inbound.recv() => {
                    let Some(frame) = frame else {
                        // Listener went away together with the transport.
                        return Err(Error::Closed);
                    };
                    trace!("RX {}", format_hex(&frame));
                    if let ControlFlow::Break(result) = accept(&frame) {
                        return Ok(result);
                    }
                }
            }
        }
    }

    /// Read the program stored in slot `index`
    pub async fn read_program(&self, index: ProgramIndex) -> Result<Program> {
        let request = message::encode_read_program(index);

        debug!("Requesting program {}", index);
        self.request_response(&request, |msg| {
            match message::decode_read_program_response(msg) {
                Ok(resp) if resp.is_for(index) => {
                    debug!("Got program {}", index);
                    ControlFlow::Break(resp.program)
                }
                Ok(resp) => {
                    debug!(
                        "Ignoring response for program {} (requested {})",
                        resp.index, index
                    );
                    ControlFlow::Continue(())
                }
                Err(e) => {
                    debug!("Ignoring message: {}", e);
                    ControlFlow::Continue(())
                }
            }
        })
        .await
    }

    /// Write `program` into slot `index`. The device does not confirm writes.
    pub fn write_program(&self, index: ProgramIndex, program: &Program) -> Result<()> {
        let msg = message::encode_write_program(index, program)?;
        debug!("Writing program {}", index);
        self.send(&msg)
    }

    /// Ask the device which slot is active
    pub async fn active_program(&self) -> Result<ProgramIndex> {
        let request = message::encode_get_active_program();

        debug!("Requesting active program");
        self.request_response(&request, |msg| {
            match message::decode_active_program_response(msg) {
                Ok(index) => ControlFlow::Break(index),
                Err(e) => {
                    debug!("Ignoring message: {}", e);
                    ControlFlow::Continue(())
                }
            }
        })
        .await
    }

    /// Select the active slot. The device does not confirm this.
    pub fn set_active_program(&self, index: ProgramIndex) -> Result<()> {
        let msg = message::encode_set_active_program(index);
        debug!("Setting active program {}", index);
        self.send(&msg)
    }
}

impl<T: Transport> Drop for Connection<T> {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::frame::encode_frame;
    use crate::message::tests::{captured_program, from_hex, READ_REPLY_HEX};
    use crate::message::MessageType;
    use parking_lot::Mutex as SyncMutex;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    type Responder = Box<dyn Fn(&[u8], &FrameSink) + Send + Sync>;

    /// In-memory transport that records what was sent and can script replies
    #[derive(Clone)]
    pub(crate) struct MockTransport {
        pub sent: Arc<SyncMutex<Vec<Vec<u8>>>>,
        pub closed: Arc<AtomicBool>,
        fail_send: bool,
        sink: FrameSink,
        responder: Arc<Option<Responder>>,
    }

    impl MockTransport {
        pub(crate) fn new(sink: FrameSink) -> Self {
            Self {
                sent: Arc::new(SyncMutex::new(Vec::new())),
                closed: Arc::new(AtomicBool::new(false)),
                fail_send: false,
                sink,
                responder: Arc::new(None),
            }
        }

        /// Call `responder` with every sent message, from the send path
        pub(crate) fn with_responder(
            mut self,
            responder: impl Fn(&[u8], &FrameSink) + Send + Sync + 'static,
        ) -> Self {
            self.responder = Arc::new(Some(Box::new(responder)));
            self
        }

        fn failing(mut self) -> Self {
            self.fail_send = true;
            self
        }
    }

    impl Transport for MockTransport {
        fn send(&self, msg: &[u8]) -> std::result::Result<(), TransportError> {
            if self.fail_send {
                return Err(TransportError::new("port unplugged"));
            }
            self.sent.lock().push(msg.to_vec());
            if let Some(responder) = &*self.responder {
                responder(msg, &self.sink);
            }
            Ok(())
        }

        fn close(&self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    pub(crate) fn mock_connection(
        configure: impl FnOnce(MockTransport) -> MockTransport,
    ) -> (Connection<MockTransport>, FrameSink) {
        let (sink, queue) = inbound_queue(DEFAULT_QUEUE_CAPACITY);
        let transport = configure(MockTransport::new(sink.clone()));
        (Connection::new(transport, queue), sink)
    }

    fn index(i: u8) -> ProgramIndex {
        ProgramIndex::new(i).unwrap()
    }

    /// Read reply for slot `slot` carrying the captured program
    fn read_reply(slot: u8) -> Vec<u8> {
        let mut reply = from_hex(READ_REPLY_HEX);
        reply[7] = slot;
        reply
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_without_reply() {
        let (conn, _sink) = mock_connection(|t| t);

        let start = Instant::now();
        let res = conn.read_program(index(1)).await;
        let elapsed = start.elapsed();

        assert!(matches!(res, Err(Error::ResponseTimeout(t)) if t == RESPONSE_TIMEOUT));
        assert!(elapsed >= RESPONSE_TIMEOUT - Duration::from_millis(50));
        assert!(elapsed <= RESPONSE_TIMEOUT + Duration::from_millis(50));
        assert_eq!(conn.transport().sent.lock().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ignored_frames_do_not_extend_timeout() {
        let (conn, sink) = mock_connection(|t| t);

        let feeder = tokio::spawn(async move {
            for _ in 0..10 {
                tokio::time::sleep(Duration::from_millis(500)).await;
                sink.push(&read_reply(2));
            }
        });

        let start = Instant::now();
        let res = conn.read_program(index(1)).await;
        assert!(matches!(res, Err(Error::ResponseTimeout(_))));
        assert!(start.elapsed() <= RESPONSE_TIMEOUT + Duration::from_millis(50));
        feeder.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_queued_request_shares_timeout() {
        let (conn, _sink) = mock_connection(|t| t);
        let conn = Arc::new(conn);

        let first = {
            let conn = conn.clone();
            tokio::spawn(async move { conn.read_program(index(1)).await })
        };
        tokio::time::sleep(Duration::from_secs(1)).await;

        // The first call holds the queue until t=3s; the second must give up at t=4s.
        let start = Instant::now();
        let res = conn.read_program(index(2)).await;
        assert!(matches!(res, Err(Error::ResponseTimeout(_))));
        assert!(start.elapsed() <= RESPONSE_TIMEOUT + Duration::from_millis(50));

        assert!(matches!(first.await.unwrap(), Err(Error::ResponseTimeout(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_while_queue_is_held() {
        let (conn, _sink) = mock_connection(|t| t);
        let _held = conn.queue.rx.lock().await;

        let start = Instant::now();
        let res = conn.read_program(index(1)).await;
        assert!(matches!(res, Err(Error::ResponseTimeout(t)) if t == RESPONSE_TIMEOUT));
        let elapsed = start.elapsed();
        assert!(elapsed >= RESPONSE_TIMEOUT - Duration::from_millis(50));
        assert!(elapsed <= RESPONSE_TIMEOUT + Duration::from_millis(50));
        assert!(conn.transport().sent.lock().is_empty());
    }

    #[tokio::test]
    async fn test_skips_reply_for_other_slot() {
        let (conn, _sink) = mock_connection(|t| {
            t.with_responder(|_, sink| {
                sink.push(&read_reply(2));
                sink.push(&read_reply(1));
            })
        });

        let prog = conn.read_program(index(1)).await.unwrap();
        assert_eq!(prog, captured_program());
    }

    #[tokio::test]
    async fn test_skips_unrelated_traffic() {
        let (conn, _sink) = mock_connection(|t| {
            t.with_responder(|_, sink| {
                sink.push(&[0x90, 36, 100]);
                sink.push(&[0xF0, 0x7E, 0x00, 0x06, 0x01, 0xF7]);
                sink.push(&encode_frame(MessageType::GetActiveProgram.as_byte(), &[1]));
                let mut garbled = read_reply(3);
                garbled[8] = 0x55;
                sink.push(&garbled);
                sink.push(&read_reply(3));
            })
        });

        let prog = conn.read_program(index(3)).await.unwrap();
        assert_eq!(prog.channel, 7);
    }

    #[tokio::test]
    async fn test_read_program_sends_request() {
        let (conn, _sink) = mock_connection(|t| t.with_responder(|_, sink| sink.push(&read_reply(4))));

        conn.read_program(index(4)).await.unwrap();
        let sent = conn.transport().sent.lock().clone();
        assert_eq!(sent, vec![message::encode_read_program(index(4))]);
    }

    #[tokio::test]
    async fn test_active_program() {
        let (conn, _sink) = mock_connection(|t| {
            t.with_responder(|msg, sink| {
                if msg[4] == MessageType::GetActiveProgram.as_byte() {
                    sink.push(&read_reply(1));
                    sink.push(&encode_frame(MessageType::GetActiveProgram.as_byte(), &[3]));
                }
            })
        });

        assert_eq!(conn.active_program().await.unwrap(), index(3));
    }

    #[tokio::test]
    async fn test_send_only_operations() {
        let (conn, _sink) = mock_connection(|t| t);

        conn.write_program(index(2), &captured_program()).unwrap();
        conn.set_active_program(index(2)).unwrap();

        let sent = conn.transport().sent.lock().clone();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0][4], MessageType::WriteProgram.as_byte());
        assert_eq!(sent[0].len(), 66);
        assert_eq!(sent[1], message::encode_set_active_program(index(2)));
    }

    #[tokio::test]
    async fn test_invalid_program_is_not_sent() {
        let (conn, _sink) = mock_connection(|t| t);
        let prog = Program { channel: 17, ..Default::default() };

        assert!(matches!(
            conn.write_program(index(1), &prog),
            Err(Error::InvalidProgram(_))
        ));
        assert!(conn.transport().sent.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_failure_returns_immediately() {
        let (conn, _sink) = mock_connection(|t| t.failing());

        let start = Instant::now();
        let res = conn.read_program(index(1)).await;
        assert!(matches!(res, Err(Error::Transport(_))));
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_close_wakes_pending_request() {
        let (conn, _sink) = mock_connection(|t| t);
        let conn = Arc::new(conn);

        let pending = {
            let conn = conn.clone();
            tokio::spawn(async move { conn.read_program(index(1)).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        let start = std::time::Instant::now();
        conn.close();

        let res = pending.await.unwrap();
        assert!(matches!(res, Err(Error::Closed)));
        assert!(start.elapsed() < Duration::from_secs(1));
        assert!(conn.transport().closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_requests_after_close_fail() {
        let (conn, sink) = mock_connection(|t| t);
        conn.close();

        // Late frames from the listener are discarded without error.
        sink.push(&read_reply(1));

        assert!(matches!(conn.read_program(index(1)).await, Err(Error::Closed)));
        assert!(matches!(conn.set_active_program(index(1)), Err(Error::Closed)));
        assert!(conn.transport().sent.lock().is_empty());
    }

    #[tokio::test]
    async fn test_dropped_listener_closes_request() {
        let (sink, queue) = inbound_queue(4);
        // The transport feeds an unrelated queue, so dropping `sink` drops the last producer.
        let (other_sink, _other_queue) = inbound_queue(1);
        let conn = Connection::new(MockTransport::new(other_sink), queue);
        drop(sink);

        assert!(matches!(conn.read_program(index(1)).await, Err(Error::Closed)));
    }

    #[test]
    fn test_sink_filters_and_drops_when_full() {
        let (sink, queue) = inbound_queue(2);

        sink.push(&[0x90, 60, 100]);
        sink.push(&[0xF0]);
        sink.push(&[0xF0, 0x01, 0xF7]);
        sink.push(&[0xF0, 0x02, 0xF7]);
        sink.push(&[0xF0, 0x03, 0xF7]);

        let mut rx = queue.rx.try_lock().unwrap();
        assert_eq!(rx.try_recv().unwrap(), vec![0xF0, 0x01, 0xF7]);
        assert_eq!(rx.try_recv().unwrap(), vec![0xF0, 0x02, 0xF7]);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_custom_timeout() {
        let (conn, _sink) = mock_connection(|t| t);
        let conn = conn.with_timeout(Duration::from_millis(250));

        let start = Instant::now();
        let res = conn.active_program().await;
        assert!(matches!(res, Err(Error::ResponseTimeout(t)) if t == Duration::from_millis(250)));
        assert_eq!(start.elapsed(), Duration::from_millis(250));
    }
}
