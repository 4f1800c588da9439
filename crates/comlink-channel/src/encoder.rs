use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use comlink_frame::{encode_frame, encode_message, Message, LENGTH_PREFIX_SIZE};
use comlink_transport::WakeHandle;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use tracing::error;

use crate::config::ChannelConfig;
use crate::flow::{Flow, FlowLedger};
use crate::queue::{hand_off, HandOffError};
use crate::stage::{ShutdownToken, Stage, Step};

/// The encode stage: one outbound message in, one wire-ready frame out.
///
/// After queueing a frame it wakes the poller — the io stage may be parked
/// with no write interest registered yet.
pub(crate) struct Encoder {
    outbound_messages: Receiver<Message>,
    outbound_packets: Sender<Bytes>,
    wake: WakeHandle,
    ledger: Arc<FlowLedger>,
    shutdown: ShutdownToken,
    poll_interval: Duration,
    max_frame_size: usize,
}

impl Encoder {
    pub(crate) fn new(
        outbound_messages: Receiver<Message>,
        outbound_packets: Sender<Bytes>,
        wake: WakeHandle,
        ledger: Arc<FlowLedger>,
        shutdown: ShutdownToken,
        config: &ChannelConfig,
    ) -> Self {
        Self {
            outbound_messages,
            outbound_packets,
            wake,
            ledger,
            shutdown,
            poll_interval: config.poll_interval,
            max_frame_size: config.max_frame_size,
        }
    }

    fn encode_and_forward(&mut self, message: Message) -> Step {
        let body = match encode_message(&message) {
            Ok(body) => body,
            Err(err) => {
                error!(%err, "encode failure");
                return self.fail("encode failure");
            }
        };

        let total = LENGTH_PREFIX_SIZE + body.len();
        if total > self.max_frame_size {
            error!(
                size = total,
                max = self.max_frame_size,
                "outbound frame too large"
            );
            return self.fail("oversized frame");
        }

        let mut frame = BytesMut::with_capacity(total);
        if let Err(err) = encode_frame(&body, &mut frame) {
            error!(%err, "framing failure");
            return self.fail("framing failure");
        }

        match hand_off(
            &self.outbound_packets,
            frame.freeze(),
            self.poll_interval,
            &self.shutdown,
        ) {
            Ok(()) => {
                self.wake.wake();
                Step::Continue
            }
            Err(HandOffError::Overflow) => self.fail("queue overflow"),
            Err(HandOffError::Stopped) => Step::Stop,
        }
    }

    fn fail(&mut self, reason: &'static str) -> Step {
        error!(reason, "encoder failing channel");
        self.ledger.request_close(Flow::Inbound);
        self.ledger.request_close(Flow::Outbound);
        self.wake.wake();
        Step::Stop
    }
}

impl Stage for Encoder {
    fn name(&self) -> &'static str {
        "encoder"
    }

    fn step(&mut self) -> Step {
        if self.ledger.is_closed(Flow::Outbound) {
            return Step::Stop;
        }
        match self.outbound_messages.recv_timeout(self.poll_interval) {
            Ok(message) => self.encode_and_forward(message),
            Err(RecvTimeoutError::Timeout) => Step::Continue,
            Err(RecvTimeoutError::Disconnected) => Step::Stop,
        }
    }
}
