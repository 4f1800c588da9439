use std::sync::Arc;

use comlink_frame::Message;
use comlink_transport::{Endpoint, Poller, WakeHandle};
use crossbeam_channel::{bounded, Sender, TrySendError};
use tracing::debug;

use crate::config::ChannelConfig;
use crate::decoder::Decoder;
use crate::dispatcher::Dispatcher;
use crate::encoder::Encoder;
use crate::error::{ChannelError, Result};
use crate::flow::{Flow, FlowLedger};
use crate::io_pump::IoPump;
use crate::pool::WorkerPool;
use crate::stage::{self, ShutdownToken};

/// Channel-level application callbacks.
///
/// All methods run on the channel's dispatch worker, serialized with each
/// other: a handler never runs concurrently with another handler of the
/// same channel.
pub trait ChannelEvents: Send + 'static {
    /// The pipeline is running. Delivered before any `received`.
    fn initialized(&mut self) {}

    /// One decoded inbound message, in wire order.
    fn received(&mut self, message: Message);

    /// One flow has become unusable. Delivered exactly once per flow.
    fn closed(&mut self, flow: Flow) {
        let _ = flow;
    }

    /// Both flows are closed; no further callbacks will follow.
    fn terminated(&mut self) {}
}

/// The channel facade: owns the pipeline and its start/stop lifecycle.
///
/// A channel serves exactly one peer. Sending is asynchronous with bounded
/// backpressure: a full outbound queue surfaces as an immediate
/// [`ChannelError::QueueFull`], never as blocking.
pub struct Channel {
    outbound_messages: Sender<Message>,
    ledger: Arc<FlowLedger>,
    shutdown: ShutdownToken,
    wake: WakeHandle,
    pool: WorkerPool,
    queue_capacity: usize,
}

impl Channel {
    /// Start the pipeline over an endpoint pair.
    ///
    /// `reader` and `writer` may be two clones of one socket or the two
    /// ends of a pipe pair. All four stage workers are running when this
    /// returns.
    pub fn start(
        reader: Endpoint,
        writer: Endpoint,
        events: Box<dyn ChannelEvents>,
        config: ChannelConfig,
    ) -> Result<Self> {
        reader.set_nonblocking(true)?;
        writer.set_nonblocking(true)?;

        let poller = Poller::new()?;
        let wake = poller.wake_handle();
        let ledger = Arc::new(FlowLedger::default());
        let shutdown = ShutdownToken::default();

        let (outbound_messages_tx, outbound_messages_rx) = bounded(config.queue_capacity);
        let (outbound_packets_tx, outbound_packets_rx) = bounded(config.queue_capacity);
        let (inbound_packets_tx, inbound_packets_rx) = bounded(config.queue_capacity);
        let (inbound_messages_tx, inbound_messages_rx) = bounded(config.queue_capacity);

        let io_pump = IoPump::new(
            reader,
            writer,
            poller,
            inbound_packets_tx,
            outbound_packets_rx,
            Arc::clone(&ledger),
            shutdown.clone(),
            &config,
        );
        let decoder = Decoder::new(
            inbound_packets_rx,
            inbound_messages_tx,
            Arc::clone(&ledger),
            shutdown.clone(),
            wake.clone(),
            config.poll_interval,
        );
        let encoder = Encoder::new(
            outbound_messages_rx,
            outbound_packets_tx,
            wake.clone(),
            Arc::clone(&ledger),
            shutdown.clone(),
            &config,
        );
        let dispatcher = Dispatcher::new(
            inbound_messages_rx,
            events,
            Arc::clone(&ledger),
            shutdown.clone(),
            wake.clone(),
            config.poll_interval,
        );

        let mut pool = WorkerPool::default();
        let spawned = (|| -> Result<()> {
            let token = shutdown.clone();
            pool.spawn("io-pump", move || stage::run(io_pump, token))?;
            let token = shutdown.clone();
            pool.spawn("decoder", move || stage::run(decoder, token))?;
            let token = shutdown.clone();
            pool.spawn("encoder", move || stage::run(encoder, token))?;
            let token = shutdown.clone();
            pool.spawn("dispatcher", move || stage::run(dispatcher, token))?;
            Ok(())
        })();
        if let Err(err) = spawned {
            shutdown.request();
            wake.wake();
            pool.join_all();
            return Err(err);
        }

        debug!("channel running");
        Ok(Self {
            outbound_messages: outbound_messages_tx,
            ledger,
            shutdown,
            wake,
            pool,
            queue_capacity: config.queue_capacity,
        })
    }

    /// Queue one message for the peer.
    ///
    /// Fails immediately if the pipeline is stopped, the outbound flow is
    /// closed, or the bounded outbound queue is full.
    pub fn send(&self, message: Message) -> Result<()> {
        if self.shutdown.is_requested() {
            return Err(ChannelError::NotRunning);
        }
        if self.ledger.is_closed(Flow::Outbound) || self.ledger.close_requested(Flow::Outbound) {
            return Err(ChannelError::FlowClosed(Flow::Outbound));
        }
        self.outbound_messages
            .try_send(message)
            .map_err(|err| match err {
                TrySendError::Full(_) => ChannelError::QueueFull {
                    capacity: self.queue_capacity,
                },
                TrySendError::Disconnected(_) => ChannelError::NotRunning,
            })
    }

    /// Request the close of one flow. Asynchronous; completion surfaces as
    /// the `closed(flow)` callback.
    pub fn close(&self, flow: Flow) {
        debug!(%flow, "flow close requested");
        self.ledger.request_close(flow);
        self.wake.wake();
    }

    /// Request the close of both flows. Idempotent: repeated calls after
    /// the first change nothing, and the `terminated` callback fires once.
    pub fn terminate(&self) {
        self.close(Flow::Inbound);
        self.close(Flow::Outbound);
    }

    /// Both flows have closed and the `terminated` callback has been (or is
    /// about to be) delivered.
    pub fn is_terminated(&self) -> bool {
        self.ledger.both_closed()
    }

    /// The pipeline workers are alive and no shutdown has been requested.
    pub fn is_running(&self) -> bool {
        !self.shutdown.is_requested() && !self.pool.is_empty()
    }

    /// Stop the pipeline and join every worker.
    ///
    /// Teardown order: dispatcher, io pump, encoder, decoder. Idempotent.
    pub fn stop(&mut self) {
        if self.pool.is_empty() {
            return;
        }
        debug!("stopping channel");
        self.shutdown.request();
        self.wake.wake();
        for name in ["dispatcher", "io-pump", "encoder", "decoder"] {
            self.pool.join(name);
        }
        self.pool.join_all();
        debug!("channel stopped");
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::time::Duration;

    use bytes::{Bytes, BytesMut};
    use comlink_frame::{
        decode_frame, decode_message, encode_frame, encode_message, Message, Metadata,
        DEFAULT_MAX_FRAME,
    };
    use crossbeam_channel::{unbounded, Receiver};
    use serde_json::json;

    use super::*;

    const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

    #[derive(Debug)]
    enum Event {
        Initialized,
        Received(Message),
        Closed(Flow),
        Terminated,
    }

    struct Capture {
        tx: crossbeam_channel::Sender<Event>,
    }

    impl ChannelEvents for Capture {
        fn initialized(&mut self) {
            let _ = self.tx.send(Event::Initialized);
        }

        fn received(&mut self, message: Message) {
            let _ = self.tx.send(Event::Received(message));
        }

        fn closed(&mut self, flow: Flow) {
            let _ = self.tx.send(Event::Closed(flow));
        }

        fn terminated(&mut self) {
            let _ = self.tx.send(Event::Terminated);
        }
    }

    fn start_with_config(config: ChannelConfig) -> (Channel, Receiver<Event>, Endpoint) {
        let (local, peer) = Endpoint::pair().unwrap();
        let reader = local.try_clone().unwrap();
        let (tx, rx) = unbounded();
        let channel = Channel::start(reader, local, Box::new(Capture { tx }), config).unwrap();
        (channel, rx, peer)
    }

    fn start_default() -> (Channel, Receiver<Event>, Endpoint) {
        start_with_config(ChannelConfig::default())
    }

    fn test_message(tag: &str) -> Message {
        let mut metadata = Metadata::new();
        metadata.insert("action".into(), json!("cast"));
        metadata.insert("operation".into(), json!(tag));
        Message::exchange(metadata, Bytes::from(tag.as_bytes().to_vec()))
    }

    fn wire_bytes(message: &Message) -> Bytes {
        let body = encode_message(message).unwrap();
        let mut buf = BytesMut::new();
        encode_frame(&body, &mut buf).unwrap();
        buf.freeze()
    }

    fn read_wire_message(peer: &mut Endpoint) -> Message {
        let mut buf = BytesMut::new();
        let mut chunk = [0u8; 4096];
        loop {
            if let Some(body) = decode_frame(&mut buf, DEFAULT_MAX_FRAME).unwrap() {
                return decode_message(&body).unwrap();
            }
            let n = peer.read(&mut chunk).unwrap();
            assert!(n > 0, "peer stream ended early");
            buf.extend_from_slice(&chunk[..n]);
        }
    }

    fn expect_event(rx: &Receiver<Event>) -> Event {
        rx.recv_timeout(EVENT_TIMEOUT).expect("expected an event")
    }

    fn drain_until_terminated(rx: &Receiver<Event>) -> Vec<Event> {
        let mut events = Vec::new();
        loop {
            let event = expect_event(rx);
            let done = matches!(event, Event::Terminated);
            events.push(event);
            if done {
                return events;
            }
        }
    }

    #[test]
    fn delivers_inbound_messages_in_wire_order() {
        let (mut channel, rx, mut peer) = start_default();

        assert!(matches!(expect_event(&rx), Event::Initialized));

        for tag in ["one", "two", "three"] {
            peer.write_all(&wire_bytes(&test_message(tag))).unwrap();
        }

        for tag in ["one", "two", "three"] {
            match expect_event(&rx) {
                Event::Received(message) => {
                    assert_eq!(message.payload.as_ref(), tag.as_bytes());
                }
                other => panic!("expected Received, got {other:?}"),
            }
        }

        channel.stop();
    }

    #[test]
    fn sends_reach_the_peer_in_order() {
        let (mut channel, _rx, mut peer) = start_default();

        channel.send(test_message("first")).unwrap();
        channel.send(test_message("second")).unwrap();

        let first = read_wire_message(&mut peer);
        let second = read_wire_message(&mut peer);
        assert_eq!(first.payload.as_ref(), b"first");
        assert_eq!(second.payload.as_ref(), b"second");

        channel.stop();
    }

    #[test]
    fn reassembles_messages_written_byte_by_byte() {
        let (mut channel, rx, mut peer) = start_default();
        assert!(matches!(expect_event(&rx), Event::Initialized));

        let wire = wire_bytes(&test_message("slow"));
        for byte in wire.iter() {
            peer.write_all(&[*byte]).unwrap();
            peer.flush().unwrap();
        }

        match expect_event(&rx) {
            Event::Received(message) => assert_eq!(message.payload.as_ref(), b"slow"),
            other => panic!("expected Received, got {other:?}"),
        }

        channel.stop();
    }

    #[test]
    fn peer_eof_closes_only_inbound() {
        let (mut channel, rx, mut peer) = start_default();
        assert!(matches!(expect_event(&rx), Event::Initialized));

        peer.shutdown(std::net::Shutdown::Write).unwrap();

        match expect_event(&rx) {
            Event::Closed(Flow::Inbound) => {}
            other => panic!("expected Closed(Inbound), got {other:?}"),
        }

        // The outbound flow stays usable.
        assert!(rx.recv_timeout(Duration::from_millis(300)).is_err());
        channel.send(test_message("still-open")).unwrap();
        let message = read_wire_message(&mut peer);
        assert_eq!(message.payload.as_ref(), b"still-open");

        channel.terminate();
        match expect_event(&rx) {
            Event::Closed(Flow::Outbound) => {}
            other => panic!("expected Closed(Outbound), got {other:?}"),
        }
        assert!(matches!(expect_event(&rx), Event::Terminated));

        channel.stop();
    }

    #[test]
    fn close_outbound_rejects_further_sends() {
        let (mut channel, rx, _peer) = start_default();
        assert!(matches!(expect_event(&rx), Event::Initialized));

        channel.close(Flow::Outbound);
        match expect_event(&rx) {
            Event::Closed(Flow::Outbound) => {}
            other => panic!("expected Closed(Outbound), got {other:?}"),
        }

        let err = channel.send(test_message("late")).unwrap_err();
        assert!(matches!(err, ChannelError::FlowClosed(Flow::Outbound)));

        channel.stop();
    }

    #[test]
    fn terminate_twice_terminates_once() {
        let (mut channel, rx, _peer) = start_default();
        assert!(matches!(expect_event(&rx), Event::Initialized));

        channel.terminate();
        channel.terminate();

        let events = drain_until_terminated(&rx);
        let closed = events
            .iter()
            .filter(|event| matches!(event, Event::Closed(_)))
            .count();
        let terminated = events
            .iter()
            .filter(|event| matches!(event, Event::Terminated))
            .count();
        assert_eq!(closed, 2);
        assert_eq!(terminated, 1);
        assert!(channel.is_terminated());

        // Nothing further arrives, and a late terminate is harmless.
        assert!(rx.recv_timeout(Duration::from_millis(300)).is_err());
        channel.terminate();
        channel.stop();
    }

    #[test]
    fn full_outbound_queue_fails_send_immediately() {
        let config = ChannelConfig {
            poll_interval: Duration::from_millis(5),
            queue_capacity: 1,
            ..ChannelConfig::default()
        };
        let (mut channel, _rx, peer) = start_with_config(config);

        // The peer never reads, so the socket buffer, the in-flight frame,
        // and both bounded queues fill up in turn.
        let payload = vec![0xA5u8; 512 * 1024];
        let mut overflowed = false;
        for _ in 0..64 {
            let mut metadata = Metadata::new();
            metadata.insert("action".into(), json!("cast"));
            let message = Message::exchange(metadata, payload.clone());
            match channel.send(message) {
                Ok(()) => {}
                Err(ChannelError::QueueFull { capacity }) => {
                    assert_eq!(capacity, 1);
                    overflowed = true;
                    break;
                }
                Err(other) => panic!("expected QueueFull, got {other}"),
            }
        }
        assert!(overflowed, "send never reported overflow");

        drop(peer);
        channel.stop();
    }

    #[test]
    fn oversized_inbound_frame_fails_the_channel() {
        let (mut channel, rx, mut peer) = start_default();
        assert!(matches!(expect_event(&rx), Event::Initialized));

        // Declared length far beyond the 1 MiB default.
        peer.write_all(&0x7FFF_FFFFu32.to_be_bytes()).unwrap();

        let events = drain_until_terminated(&rx);
        assert!(events
            .iter()
            .any(|event| matches!(event, Event::Closed(Flow::Inbound))));
        assert!(events
            .iter()
            .any(|event| matches!(event, Event::Closed(Flow::Outbound))));

        channel.stop();
    }

    #[test]
    fn corrupt_envelope_fails_the_channel() {
        let (mut channel, rx, mut peer) = start_default();
        assert!(matches!(expect_event(&rx), Event::Initialized));

        let mut buf = BytesMut::new();
        encode_frame(b"definitely not json", &mut buf).unwrap();
        peer.write_all(&buf).unwrap();

        let events = drain_until_terminated(&rx);
        assert_eq!(
            events
                .iter()
                .filter(|event| matches!(event, Event::Terminated))
                .count(),
            1
        );

        channel.stop();
    }

    struct PanicsOnFirst {
        tx: crossbeam_channel::Sender<Event>,
        panicked: bool,
    }

    impl ChannelEvents for PanicsOnFirst {
        fn received(&mut self, message: Message) {
            if !self.panicked {
                self.panicked = true;
                panic!("handler failure");
            }
            let _ = self.tx.send(Event::Received(message));
        }
    }

    #[test]
    fn callback_panic_does_not_stop_the_pipeline() {
        let (local, mut peer) = Endpoint::pair().unwrap();
        let reader = local.try_clone().unwrap();
        let (tx, rx) = unbounded();
        let mut channel = Channel::start(
            reader,
            local,
            Box::new(PanicsOnFirst {
                tx,
                panicked: false,
            }),
            ChannelConfig::default(),
        )
        .unwrap();

        peer.write_all(&wire_bytes(&test_message("dropped"))).unwrap();
        peer.write_all(&wire_bytes(&test_message("delivered")))
            .unwrap();

        match expect_event(&rx) {
            Event::Received(message) => assert_eq!(message.payload.as_ref(), b"delivered"),
            other => panic!("expected Received, got {other:?}"),
        }

        channel.stop();
    }
}
