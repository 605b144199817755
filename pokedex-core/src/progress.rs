//! Progress reporting for pipeline runs.

use std::io::{self, Write};
use std::sync::Mutex;
use std::time::Instant;

use crate::dataset::pad_number;

/// What happened to one finished ID.
#[derive(Debug, Clone, Copy)]
pub enum Tick<'a> {
    Completed { name: &'a str },
    Skipped { reason: &'a str },
}

/// Receives one tick per finished ID.
///
/// The pipeline driver calls this from a single task, but implementations
/// must still be shareable across threads.
pub trait ProgressReporter: Send + Sync {
    fn set_total(&self, total: usize);

    fn tick(&self, id: u32, tick: Tick<'_>);

    fn finish(&self) {}
}

/// Discards all progress.
#[derive(Debug, Default)]
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn set_total(&self, _total: usize) {}

    fn tick(&self, _id: u32, _tick: Tick<'_>) {}
}

struct ConsoleState {
    total: usize,
    done: usize,
    started: Instant,
}

/// Prints one line per finished ID to stderr:
/// `[  3/151]   2% eta 41s  #003 venusaur`
pub struct ConsoleProgress {
    pad: usize,
    state: Mutex<ConsoleState>,
}

impl ConsoleProgress {
    pub fn new(pad: usize) -> Self {
        Self {
            pad,
            state: Mutex::new(ConsoleState {
                total: 0,
                done: 0,
                started: Instant::now(),
            }),
        }
    }
}

impl ProgressReporter for ConsoleProgress {
    fn set_total(&self, total: usize) {
        if let Ok(mut state) = self.state.lock() {
            state.total = total;
            state.done = 0;
            state.started = Instant::now();
        }
    }

    fn tick(&self, id: u32, tick: Tick<'_>) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        state.done += 1;

        let line = format_line(
            state.done,
            state.total,
            state.started.elapsed().as_secs_f64(),
            &pad_number(id, self.pad),
            tick,
        );
        let _ = writeln!(io::stderr(), "{}", line);
    }

    fn finish(&self) {
        if let Ok(state) = self.state.lock() {
            let _ = writeln!(
                io::stderr(),
                "Processed {}/{} in {:.1}s",
                state.done,
                state.total,
                state.started.elapsed().as_secs_f64()
            );
        }
    }
}

fn format_line(done: usize, total: usize, elapsed_secs: f64, key: &str, tick: Tick<'_>) -> String {
    let width = total.to_string().len();
    let percent = if total > 0 {
        done as f64 / total as f64 * 100.0
    } else {
        100.0
    };
    let eta = if done > 0 && total > done {
        elapsed_secs / done as f64 * (total - done) as f64
    } else {
        0.0
    };
    let detail = match tick {
        Tick::Completed { name } => name.to_string(),
        Tick::Skipped { reason } => format!("skipped: {}", reason),
    };

    format!(
        "[{:>width$}/{}] {:>3.0}% eta {:.0}s  #{} {}",
        done,
        total,
        percent,
        eta,
        key,
        detail,
        width = width
    )
}
