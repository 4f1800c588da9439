use std::sync::atomic::{AtomicBool, Ordering};

/// One direction of a bidirectional channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Flow {
    Inbound,
    Outbound,
}

impl std::fmt::Display for Flow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Flow::Inbound => f.write_str("inbound"),
            Flow::Outbound => f.write_str("outbound"),
        }
    }
}

/// Shared flow state between the pipeline stages.
///
/// Close *requests* come from the facade (or from a fatally-failing codec
/// stage); only the io stage, which owns the endpoints, turns a request
/// into an actual close and marks the flow closed. The dispatcher reads the
/// closed flags to drive `closed`/`terminated` callbacks.
#[derive(Debug, Default)]
pub(crate) struct FlowLedger {
    close_inbound_requested: AtomicBool,
    close_outbound_requested: AtomicBool,
    inbound_closed: AtomicBool,
    outbound_closed: AtomicBool,
    /// Set by the decoder once the inbound flow is closed and every frame
    /// read before the close has been decoded and handed off.
    inbound_drained: AtomicBool,
}

impl FlowLedger {
    pub fn request_close(&self, flow: Flow) {
        self.close_flag(flow).store(true, Ordering::SeqCst);
    }

    pub fn close_requested(&self, flow: Flow) -> bool {
        self.close_flag(flow).load(Ordering::SeqCst)
    }

    pub fn mark_closed(&self, flow: Flow) {
        self.closed_flag(flow).store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self, flow: Flow) -> bool {
        self.closed_flag(flow).load(Ordering::SeqCst)
    }

    pub fn both_closed(&self) -> bool {
        self.is_closed(Flow::Inbound) && self.is_closed(Flow::Outbound)
    }

    pub fn mark_inbound_drained(&self) {
        self.inbound_drained.store(true, Ordering::SeqCst);
    }

    pub fn inbound_drained(&self) -> bool {
        self.inbound_drained.load(Ordering::SeqCst)
    }

    fn close_flag(&self, flow: Flow) -> &AtomicBool {
        match flow {
            Flow::Inbound => &self.close_inbound_requested,
            Flow::Outbound => &self.close_outbound_requested,
        }
    }

    fn closed_flag(&self, flow: Flow) -> &AtomicBool {
        match flow {
            Flow::Inbound => &self.inbound_closed,
            Flow::Outbound => &self.outbound_closed,
        }
    }
}
