use std::io::{ErrorKind, Read, Write};
use std::net::Shutdown;
use std::os::fd::AsRawFd;
use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use comlink_frame::decode_frame;
use comlink_transport::{Endpoint, Interest, Poller};
use crossbeam_channel::{Receiver, Sender, TryRecvError};
use tracing::{debug, error, warn};

use crate::config::ChannelConfig;
use crate::flow::{Flow, FlowLedger};
use crate::queue::{hand_off, HandOffError};
use crate::stage::{ShutdownToken, Stage, Step};

const READ_CHUNK_SIZE: usize = 8 * 1024;
const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;

struct InFlight {
    frame: Bytes,
    offset: usize,
}

/// The io stage: sole owner of the two raw byte endpoints and the poller.
///
/// Each iteration pulls at most one outbound frame into flight, registers
/// read/write interest, parks on the poller for up to one poll interval,
/// then performs at most one non-blocking read and one non-blocking write.
/// Complete inbound frames are reassembled incrementally — a frame may span
/// many reads, and one read may hold several frames or a fragment.
pub(crate) struct IoPump {
    reader: Endpoint,
    writer: Endpoint,
    poller: Poller,
    read_buf: BytesMut,
    in_flight: Option<InFlight>,
    inbound_packets: Sender<Bytes>,
    outbound_packets: Receiver<Bytes>,
    ledger: Arc<FlowLedger>,
    shutdown: ShutdownToken,
    poll_interval: Duration,
    max_frame_size: usize,
    read_open: bool,
    write_open: bool,
}

impl IoPump {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        reader: Endpoint,
        writer: Endpoint,
        poller: Poller,
        inbound_packets: Sender<Bytes>,
        outbound_packets: Receiver<Bytes>,
        ledger: Arc<FlowLedger>,
        shutdown: ShutdownToken,
        config: &ChannelConfig,
    ) -> Self {
        Self {
            reader,
            writer,
            poller,
            read_buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            in_flight: None,
            inbound_packets,
            outbound_packets,
            ledger,
            shutdown,
            poll_interval: config.poll_interval,
            max_frame_size: config.max_frame_size,
            read_open: true,
            write_open: true,
        }
    }

    fn honor_close_requests(&mut self) {
        if self.read_open && self.ledger.close_requested(Flow::Inbound) {
            self.close_read("close requested");
        }
        if self.write_open
            && self.ledger.close_requested(Flow::Outbound)
            && self.in_flight.is_none()
        {
            // A frame already on the wire is flushed before the close.
            self.close_write("close requested");
        }
    }

    fn pull_next_outbound(&mut self) {
        if !self.write_open
            || self.in_flight.is_some()
            || self.ledger.close_requested(Flow::Outbound)
        {
            return;
        }
        match self.outbound_packets.try_recv() {
            Ok(frame) => self.in_flight = Some(InFlight { frame, offset: 0 }),
            Err(TryRecvError::Empty) => {}
            Err(TryRecvError::Disconnected) => {
                // The encoder is gone; nothing further will ever arrive.
                self.close_write("encoder stopped");
            }
        }
    }

    /// One non-blocking read, then reassembly of every complete frame the
    /// buffer now holds.
    fn do_read(&mut self) -> Step {
        let mut chunk = [0u8; READ_CHUNK_SIZE];
        match self.reader.read(&mut chunk) {
            Ok(0) => {
                self.close_read("end of stream");
                Step::Continue
            }
            Ok(n) => {
                self.read_buf.extend_from_slice(&chunk[..n]);
                self.drain_frames()
            }
            Err(err)
                if err.kind() == ErrorKind::WouldBlock
                    || err.kind() == ErrorKind::Interrupted =>
            {
                Step::Continue
            }
            Err(err) => {
                warn!(%err, "read failed, closing inbound flow");
                self.close_read("read error");
                Step::Continue
            }
        }
    }

    fn drain_frames(&mut self) -> Step {
        loop {
            match decode_frame(&mut self.read_buf, self.max_frame_size) {
                Ok(Some(body)) => {
                    match hand_off(&self.inbound_packets, body, self.poll_interval, &self.shutdown)
                    {
                        Ok(()) => {}
                        Err(HandOffError::Overflow) => {
                            error!("inbound hand-off overflowed, failing channel");
                            self.fail_channel("queue overflow");
                            return Step::Stop;
                        }
                        Err(HandOffError::Stopped) => return Step::Stop,
                    }
                }
                Ok(None) => return Step::Continue,
                Err(err) => {
                    error!(%err, "framing error, failing channel");
                    self.fail_channel("framing error");
                    return Step::Stop;
                }
            }
        }
    }

    /// One non-blocking write of the in-flight frame's remainder.
    fn do_write(&mut self) {
        let Some(in_flight) = &mut self.in_flight else {
            return;
        };
        match self.writer.write(&in_flight.frame[in_flight.offset..]) {
            Ok(0) => {
                warn!("write returned zero, closing outbound flow");
                self.close_write("connection closed");
            }
            Ok(n) => {
                in_flight.offset += n;
                if in_flight.offset == in_flight.frame.len() {
                    self.in_flight = None;
                    if let Err(err) = self.writer.flush() {
                        warn!(%err, "flush failed, closing outbound flow");
                        self.close_write("flush error");
                    }
                }
            }
            Err(err)
                if err.kind() == ErrorKind::WouldBlock
                    || err.kind() == ErrorKind::Interrupted => {}
            Err(err) => {
                warn!(%err, "write failed, closing outbound flow");
                self.close_write("write error");
            }
        }
    }

    fn close_read(&mut self, reason: &'static str) {
        debug!(reason, "closing inbound flow");
        let _ = self.reader.shutdown(Shutdown::Read);
        self.read_open = false;
        self.read_buf.clear();
        self.ledger.mark_closed(Flow::Inbound);
    }

    fn close_write(&mut self, reason: &'static str) {
        debug!(reason, "closing outbound flow");
        let _ = self.writer.shutdown(Shutdown::Write);
        self.write_open = false;
        self.in_flight = None;
        self.ledger.mark_closed(Flow::Outbound);
    }

    /// Fatal path: the stream is corrupt or the pipeline is wedged; both
    /// flows become unusable at once.
    fn fail_channel(&mut self, reason: &'static str) {
        if self.read_open {
            self.close_read(reason);
        }
        if self.write_open {
            self.close_write(reason);
        }
    }
}

impl Stage for IoPump {
    fn name(&self) -> &'static str {
        "io-pump"
    }

    fn step(&mut self) -> Step {
        self.honor_close_requests();
        self.pull_next_outbound();

        if !self.read_open && !self.write_open {
            return Step::Stop;
        }

        let interest = Interest {
            read: self.read_open.then(|| self.reader.as_raw_fd()),
            write: (self.write_open && self.in_flight.is_some())
                .then(|| self.writer.as_raw_fd()),
        };

        let readiness = match self.poller.wait(interest, self.poll_interval) {
            Ok(readiness) => readiness,
            Err(err) => {
                error!(%err, "poll failed, failing channel");
                self.fail_channel("poll failure");
                return Step::Stop;
            }
        };

        if readiness.readable && self.read_open {
            if self.do_read() == Step::Stop {
                return Step::Stop;
            }
        }
        if readiness.writable && self.write_open {
            self.do_write();
        }

        if !self.read_open && !self.write_open {
            Step::Stop
        } else {
            Step::Continue
        }
    }
}
