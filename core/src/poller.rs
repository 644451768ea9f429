// src/poller.rs
//
// Periodic status refresh. `wg` offers no change notifications, so the shell
// pulls state on a timer and reports transitions.

use log::{debug, error, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::status::TunnelStatus;
use crate::tunnel::{StatusReport, TunnelController};

const TICK: Duration = Duration::from_millis(100);

/// Called with each report whose state differs from the previous one.
pub type ChangeHandler = Box<dyn Fn(&StatusReport) + Send + 'static>;

/// Refreshes the controller's status in a background thread.
pub struct StatusPoller {
    controller: Arc<TunnelController>,
    interval: Duration,
    running: Arc<AtomicBool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl StatusPoller {
    pub fn new(controller: Arc<TunnelController>, interval: Duration) -> Self {
        Self {
            controller,
            interval,
            running: Arc::new(AtomicBool::new(false)),
            handle: Mutex::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Start the poller background thread
    pub fn start(&self, on_change: ChangeHandler) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Status poller is already running");
            return;
        }

        let controller = Arc::clone(&self.controller);
        let running = Arc::clone(&self.running);
        let interval = self.interval;

        let handle = thread::spawn(move || {
            info!("Status poller started ({:?} interval)", interval);
            let mut last_state = controller.state();

            while running.load(Ordering::SeqCst) {
                // Sleep in small steps so stop() is honoured promptly.
                let wake = Instant::now() + interval;
                while running.load(Ordering::SeqCst) && Instant::now() < wake {
                    thread::sleep(TICK.min(interval));
                }
                if !running.load(Ordering::SeqCst) {
                    break;
                }

                match controller.refresh_status() {
                    Ok(report) => {
                        debug!("Polled state: {}", report.state);
                        if report.state != last_state && last_state != TunnelStatus::Unknown {
                            on_change(&report);
                        }
                        last_state = report.state;
                    }
                    Err(e) => error!("Status poll failed: {}", e),
                }
            }

            info!("Status poller stopped");
        });

        *self.handle.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);
    }

    /// Stop the poller and wait for its thread to finish.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        info!("Stopping status poller");
        let handle = self.handle.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(handle) = handle
            && handle.join().is_err()
        {
            error!("Status poller thread panicked");
        }
    }
}

impl Drop for StatusPoller {
    fn drop(&mut self) {
        self.stop();
    }
}
