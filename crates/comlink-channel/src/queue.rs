use std::time::Duration;

use crossbeam_channel::{Sender, SendTimeoutError};

use crate::stage::ShutdownToken;

/// How many poll intervals a stage tolerates a full downstream queue before
/// declaring queue-overflow. Short stalls are ordinary backpressure; a
/// hand-off stalled this long means the pipeline is wedged.
pub(crate) const OVERFLOW_PATIENCE_INTERVALS: u32 = 100;

/// Outcome of a bounded hand-off to the next stage.
#[derive(Debug)]
pub(crate) enum HandOffError {
    /// The downstream queue stayed full past the patience bound.
    Overflow,
    /// Shutdown was requested, or the downstream stage is gone.
    Stopped,
}

/// Hand one item to the next stage with bounded backpressure.
///
/// Retries at the poll interval so a shutdown request is still observed
/// promptly while the queue is full.
pub(crate) fn hand_off<T>(
    tx: &Sender<T>,
    item: T,
    poll_interval: Duration,
    shutdown: &ShutdownToken,
) -> Result<(), HandOffError> {
    let mut item = item;
    for _ in 0..OVERFLOW_PATIENCE_INTERVALS {
        if shutdown.is_requested() {
            return Err(HandOffError::Stopped);
        }
        match tx.send_timeout(item, poll_interval) {
            Ok(()) => return Ok(()),
            Err(SendTimeoutError::Timeout(back)) => item = back,
            Err(SendTimeoutError::Disconnected(_)) => return Err(HandOffError::Stopped),
        }
    }
    Err(HandOffError::Overflow)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::bounded;

    const TICK: Duration = Duration::from_millis(1);

    #[test]
    fn hand_off_delivers_when_room() {
        let (tx, rx) = bounded(1);
        let shutdown = ShutdownToken::default();
        hand_off(&tx, 7u32, TICK, &shutdown).unwrap();
        assert_eq!(rx.recv().unwrap(), 7);
    }

    #[test]
    fn hand_off_waits_for_consumer() {
        let (tx, rx) = bounded(1);
        let shutdown = ShutdownToken::default();
        tx.send(1u32).unwrap();

        let consumer = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            (rx.recv().unwrap(), rx.recv().unwrap())
        });

        hand_off(&tx, 2u32, TICK, &shutdown).unwrap();
        assert_eq!(consumer.join().unwrap(), (1, 2));
    }

    #[test]
    fn hand_off_reports_overflow() {
        let (tx, _rx) = bounded(1);
        let shutdown = ShutdownToken::default();
        tx.send(1u32).unwrap();

        let result = hand_off(&tx, 2u32, TICK, &shutdown);
        assert!(matches!(result, Err(HandOffError::Overflow)));
    }

    #[test]
    fn hand_off_observes_shutdown() {
        let (tx, _rx) = bounded(1);
        let shutdown = ShutdownToken::default();
        tx.send(1u32).unwrap();
        shutdown.request();

        let result = hand_off(&tx, 2u32, TICK, &shutdown);
        assert!(matches!(result, Err(HandOffError::Stopped)));
    }

    #[test]
    fn hand_off_reports_gone_consumer() {
        let (tx, rx) = bounded(1);
        let shutdown = ShutdownToken::default();
        drop(rx);

        let result = hand_off(&tx, 1u32, TICK, &shutdown);
        assert!(matches!(result, Err(HandOffError::Stopped)));
    }
}
