use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use comlink_frame::{decode_message, Message};
use comlink_transport::WakeHandle;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use tracing::error;

use crate::flow::{Flow, FlowLedger};
use crate::queue::{hand_off, HandOffError};
use crate::stage::{ShutdownToken, Stage, Step};

/// The decode stage: one frame body in, one message out.
///
/// A codec failure is fatal to the channel — the stream is assumed corrupt
/// and is never retried.
pub(crate) struct Decoder {
    inbound_packets: Receiver<Bytes>,
    inbound_messages: Sender<Message>,
    ledger: Arc<FlowLedger>,
    shutdown: ShutdownToken,
    wake: WakeHandle,
    poll_interval: Duration,
}

impl Decoder {
    pub(crate) fn new(
        inbound_packets: Receiver<Bytes>,
        inbound_messages: Sender<Message>,
        ledger: Arc<FlowLedger>,
        shutdown: ShutdownToken,
        wake: WakeHandle,
        poll_interval: Duration,
    ) -> Self {
        Self {
            inbound_packets,
            inbound_messages,
            ledger,
            shutdown,
            wake,
            poll_interval,
        }
    }

    fn fail(&mut self, reason: &'static str) -> Step {
        error!(reason, "decoder failing channel");
        self.ledger.request_close(Flow::Inbound);
        self.ledger.request_close(Flow::Outbound);
        // Whatever frames remain behind the corruption are discarded.
        self.ledger.mark_inbound_drained();
        self.wake.wake();
        Step::Stop
    }
}

impl Stage for Decoder {
    fn name(&self) -> &'static str {
        "decoder"
    }

    fn step(&mut self) -> Step {
        match self.inbound_packets.recv_timeout(self.poll_interval) {
            Ok(body) => match decode_message(&body) {
                Ok(message) => {
                    match hand_off(
                        &self.inbound_messages,
                        message,
                        self.poll_interval,
                        &self.shutdown,
                    ) {
                        Ok(()) => {}
                        Err(HandOffError::Overflow) => return self.fail("queue overflow"),
                        Err(HandOffError::Stopped) => return Step::Stop,
                    }
                }
                Err(err) => {
                    error!(%err, "codec failure");
                    return self.fail("codec failure");
                }
            },
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                // The io stage is gone and the queue is fully drained.
                self.ledger.mark_inbound_drained();
                return Step::Stop;
            }
        }

        // Once the inbound flow is closed and every frame read before the
        // close has been decoded, this stage's work is complete.
        if self.ledger.is_closed(Flow::Inbound) && self.inbound_packets.is_empty() {
            self.ledger.mark_inbound_drained();
            return Step::Stop;
        }
        Step::Continue
    }
}
