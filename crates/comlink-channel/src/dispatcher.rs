use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use comlink_frame::Message;
use comlink_transport::WakeHandle;
use crossbeam_channel::{Receiver, RecvTimeoutError};
use tracing::{debug, error};

use crate::channel::ChannelEvents;
use crate::flow::{Flow, FlowLedger};
use crate::stage::{ShutdownToken, Stage, Step};

/// The dispatch stage: delivers inbound messages to the application and
/// sequences the closed/terminated callbacks.
///
/// A panic inside an application callback is caught and logged here; the
/// pipeline keeps running.
pub(crate) struct Dispatcher {
    inbound_messages: Receiver<Message>,
    events: Box<dyn ChannelEvents>,
    ledger: Arc<FlowLedger>,
    shutdown: ShutdownToken,
    wake: WakeHandle,
    poll_interval: Duration,
    delivered_inbound_closed: bool,
    delivered_outbound_closed: bool,
    decoder_gone: bool,
}

impl Dispatcher {
    pub(crate) fn new(
        inbound_messages: Receiver<Message>,
        events: Box<dyn ChannelEvents>,
        ledger: Arc<FlowLedger>,
        shutdown: ShutdownToken,
        wake: WakeHandle,
        poll_interval: Duration,
    ) -> Self {
        Self {
            inbound_messages,
            events,
            ledger,
            shutdown,
            wake,
            poll_interval,
            delivered_inbound_closed: false,
            delivered_outbound_closed: false,
            decoder_gone: false,
        }
    }

    fn deliver<F>(&mut self, callback: &'static str, f: F)
    where
        F: FnOnce(&mut dyn ChannelEvents),
    {
        let events = self.events.as_mut();
        if std::panic::catch_unwind(AssertUnwindSafe(|| f(events))).is_err() {
            error!(callback, "application callback panicked");
        }
    }

    /// Deliver at most one `closed` per flow, then `terminated` once both
    /// flows are down, then request pipeline shutdown.
    ///
    /// `closed(Inbound)` waits until every message read before the close has
    /// been delivered, so the callback ordering matches the wire ordering.
    fn observe_flows(&mut self) -> Step {
        if !self.delivered_inbound_closed
            && self.ledger.is_closed(Flow::Inbound)
            && self.ledger.inbound_drained()
            && self.inbound_messages.is_empty()
        {
            self.delivered_inbound_closed = true;
            self.deliver("closed", |events| events.closed(Flow::Inbound));
        }
        if !self.delivered_outbound_closed && self.ledger.is_closed(Flow::Outbound) {
            self.delivered_outbound_closed = true;
            self.deliver("closed", |events| events.closed(Flow::Outbound));
        }

        if self.delivered_inbound_closed && self.delivered_outbound_closed {
            self.deliver("terminated", |events| events.terminated());
            debug!("both flows closed, requesting pipeline shutdown");
            self.shutdown.request();
            self.wake.wake();
            return Step::Stop;
        }
        Step::Continue
    }
}

impl Stage for Dispatcher {
    fn name(&self) -> &'static str {
        "dispatcher"
    }

    fn on_start(&mut self) {
        self.deliver("initialized", |events| events.initialized());
    }

    fn step(&mut self) -> Step {
        if self.decoder_gone {
            // Nothing will ever arrive on the queue again; keep pacing the
            // flow observation at the poll interval.
            std::thread::sleep(self.poll_interval);
        } else {
            match self.inbound_messages.recv_timeout(self.poll_interval) {
                Ok(message) => self.deliver("received", move |events| events.received(message)),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => self.decoder_gone = true,
            }
        }
        self.observe_flows()
    }
}
