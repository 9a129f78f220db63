//! Output drain and timed capture.
//!
//! One background thread per session moves child output lines into an
//! unbounded channel; the controller collects whatever arrives within a
//! bounded window each turn.

use std::io::{BufRead, BufReader, Read};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tracing::{debug, warn};

/// Spawn the drain thread for `reader`, returning the receiving end of the queue.
///
/// The thread ends at end-of-stream (or on a read error) and pushes nothing after.
pub fn spawn_drain<R: Read + Send + 'static>(
    reader: R,
) -> Result<(Receiver<String>, JoinHandle<()>)> {
    let (tx, rx) = mpsc::channel();
    let handle = thread::Builder::new()
        .name("output-drain".to_string())
        .spawn(move || drain_lines(reader, &tx))
        .context("spawn output drain")?;
    Ok((rx, handle))
}

fn drain_lines<R: Read>(reader: R, tx: &Sender<String>) {
    let mut reader = BufReader::new(reader);
    let mut pushed = 0usize;
    loop {
        let mut line = Vec::new();
        match reader.read_until(b'\n', &mut line) {
            Ok(0) => break,
            Ok(_) => {
                if tx.send(decode_line(&line)).is_err() {
                    // Receiver dropped: the session is gone.
                    break;
                }
                pushed += 1;
            }
            Err(e) => {
                warn!(err = %e, "read child output");
                break;
            }
        }
    }
    debug!(pushed, "output drain finished");
}

fn decode_line(raw: &[u8]) -> String {
    let mut line = String::from_utf8_lossy(raw).into_owned();
    if line.ends_with('\n') {
        line.pop();
        if line.ends_with('\r') {
            line.pop();
        }
    }
    line
}

/// Collect every line available now or arriving before `window` elapses.
///
/// Returns early only if the producer is gone and the queue is empty.
pub fn collect_window(rx: &Receiver<String>, window: Duration) -> Vec<String> {
    let deadline = Instant::now() + window;
    let mut lines = Vec::new();
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            // Lines that were already queued still belong to this window.
            lines.extend(rx.try_iter());
            break;
        }
        match rx.recv_timeout(remaining) {
            Ok(line) => lines.push(line),
            Err(RecvTimeoutError::Timeout) => break,
            Err(RecvTimeoutError::Disconnected) => {
                debug!("output drain disconnected");
                break;
            }
        }
    }
    lines
}
