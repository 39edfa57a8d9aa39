//! Periodic housekeeping events for a live session.

use std::io::Write;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::protocol::{Event, HeartbeatEventBody};
use crate::server::ServerOutput;

/// Periodic `heartbeat` event emitter.
///
/// Dropping the handle signals the thread and joins it, so no event can be
/// emitted after session teardown, whichever way the session ends.
pub struct Heartbeat {
    stop: Option<mpsc::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl Heartbeat {
    pub fn start<W: Write + Send + 'static>(
        output: Arc<Mutex<ServerOutput<W>>>,
        period: Duration,
    ) -> Heartbeat {
        let (stop, ticks) = mpsc::channel::<()>();

        let thread = std::thread::spawn(move || {
            let mut tick = 0u64;
            loop {
                match ticks.recv_timeout(period) {
                    Err(RecvTimeoutError::Timeout) => {
                        tick += 1;
                        let Ok(mut output) = output.lock() else {
                            break;
                        };
                        let event = Event::Heartbeat(HeartbeatEventBody { tick });
                        if output.send_event(event).is_err() {
                            break;
                        }
                    }
                    // explicit stop or the session handle went away
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            }
        });

        Heartbeat {
            stop: Some(stop),
            thread: Some(thread),
        }
    }
}

impl Drop for Heartbeat {
    fn drop(&mut self) {
        drop(self.stop.take());
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}
