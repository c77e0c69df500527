/*!
 * Background Monitor
 * Single periodic thread driving health and resource-limit sweeps
 *
 * The monitor is the only concurrent actor besides caller threads; each
 * sweep takes the manager's coarse lock, so monitor reads never interleave
 * with caller mutations.
 */

use log::{debug, warn};
use std::io;
use std::thread::JoinHandle;
use std::time::Duration;

/// Violation/health sweep cadence
pub const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Resource-limit sweep runs every this many ticks (~5s)
pub const RESOURCE_SWEEP_TICKS: u64 = 5;

/// Handle for the monitor thread; stopping joins the thread
#[derive(Debug)]
pub struct MonitorHandle {
    stop_tx: flume::Sender<()>,
    thread: Option<JoinHandle<()>>,
}

impl MonitorHandle {
    /// Spawn the monitor loop, invoking `sweep` with a 1-based tick counter
    pub fn spawn<F>(interval: Duration, mut sweep: F) -> io::Result<Self>
    where
        F: FnMut(u64) + Send + 'static,
    {
        let (stop_tx, stop_rx) = flume::bounded::<()>(1);
        let thread = std::thread::Builder::new()
            .name("sandbox-monitor".to_string())
            .spawn(move || {
                debug!("monitor thread started");
                let mut tick: u64 = 0;
                loop {
                    match stop_rx.recv_timeout(interval) {
                        Err(flume::RecvTimeoutError::Timeout) => {
                            tick += 1;
                            sweep(tick);
                        }
                        // Stop signal or manager dropped the sender side
                        _ => break,
                    }
                }
                debug!("monitor thread stopped");
            })?;
        Ok(Self {
            stop_tx,
            thread: Some(thread),
        })
    }

    /// Signal the thread and wait for it to finish
    ///
    /// Must be called without holding the manager lock: an in-flight sweep
    /// may be waiting for it.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        let _ = self.stop_tx.send(());
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("monitor thread panicked");
            }
        }
    }
}

impl Drop for MonitorHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}
