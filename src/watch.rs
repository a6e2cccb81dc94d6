//! Change detection for writes made by other execution contexts
//!
//! Another process (or another store handle in this process) writing the
//! same backing file bumps SQLite's data version as seen from this
//! connection. The watcher polls that counter and republishes every entity
//! topic, payload-free, so subscribers re-read — the same path a same-context
//! publish takes.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use rusqlite::Connection;
use tracing::{debug, warn};

use crate::bus::{EventBus, entity_topics};
use crate::error::Result;

/// Background poller over one store file. Stops when dropped.
pub struct StoreWatcher {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl StoreWatcher {
    /// Watch the store file at `path`, publishing on `bus` when another
    /// connection writes it. `poll_interval` bounds detection latency.
    pub fn spawn<P: AsRef<Path>>(
        path: P,
        bus: Arc<EventBus>,
        poll_interval: Duration,
    ) -> Result<Self> {
        let conn = Connection::open(path.as_ref())?;
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);
        let handle = thread::spawn(move || poll_loop(conn, bus, thread_stop, poll_interval));
        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }
}

impl Drop for StoreWatcher {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn poll_loop(conn: Connection, bus: Arc<EventBus>, stop: Arc<AtomicBool>, interval: Duration) {
    let mut last = data_version(&conn).ok();

    while !stop.load(Ordering::SeqCst) {
        thread::sleep(interval);
        if stop.load(Ordering::SeqCst) {
            break;
        }

        match data_version(&conn) {
            Ok(version) => {
                if last != Some(version) {
                    debug!("External store change detected (data_version {})", version);
                    last = Some(version);
                    for topic in entity_topics() {
                        bus.publish(&topic);
                    }
                }
            }
            Err(err) => warn!("Store watcher poll failed: {}", err),
        }
    }
}

fn data_version(conn: &Connection) -> rusqlite::Result<i64> {
    conn.query_row("PRAGMA data_version", [], |row| row.get(0))
}
