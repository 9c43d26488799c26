//! Terminal rendering of executor progress.
//!
//! [`LogTty`] consumes the executor's [`LogEntry`] stream and pretty
//! prints execution progress: one block per file, one arrow line per
//! statement, and a closing summary with counters and timing.

use std::io::Write;
use std::sync::Mutex;
use std::time::Instant;

use drift_migrate::executor::{LogEntry, Logger};

const INDENT2: &str = "  ";
const INDENT4: &str = "    ";

struct TtyState<W: Write + Send> {
    out: W,
    start: Option<Instant>,
    file_start: Option<Instant>,
    file_counter: usize,
    stmt_counter: usize,
}

/// A [`Logger`] that pretty prints execution progress.
pub struct LogTty<W: Write + Send> {
    state: Mutex<TtyState<W>>,
}

impl<W: Write + Send> LogTty<W> {
    /// Wraps the output writer.
    pub fn new(out: W) -> Self {
        Self {
            state: Mutex::new(TtyState {
                out,
                start: None,
                file_start: None,
                file_counter: 0,
                stmt_counter: 0,
            }),
        }
    }

    /// Returns the inner writer.
    pub fn into_inner(self) -> W {
        self.state.into_inner().unwrap().out
    }
}

impl<W: Write + Send> TtyState<W> {
    fn report_file_end(&mut self) {
        if let Some(started) = self.file_start.take() {
            let _ = writeln!(self.out, "{INDENT2}-- ok ({:?})", started.elapsed());
        }
    }
}

impl<W: Write + Send> Logger for LogTty<W> {
    fn log(&self, entry: LogEntry) {
        let mut s = self.state.lock().unwrap();
        match entry {
            LogEntry::Execution { from, to, versions } => {
                s.start = Some(Instant::now());
                match from {
                    Some(from) => {
                        let _ = writeln!(
                            s.out,
                            "Migrating to version {to} from {from} ({} migrations in total):",
                            versions.len()
                        );
                    }
                    None => {
                        let _ = writeln!(
                            s.out,
                            "Migrating to version {to} ({} migrations in total):",
                            versions.len()
                        );
                    }
                }
            }
            LogEntry::File { version, .. } => {
                s.file_counter += 1;
                s.report_file_end();
                s.file_start = Some(Instant::now());
                let _ = writeln!(s.out, "\n{INDENT2}-- migrating version {version}");
            }
            LogEntry::Stmt { sql } => {
                s.stmt_counter += 1;
                let _ = writeln!(s.out, "{INDENT4}-> {sql}");
            }
            LogEntry::Done => {
                s.report_file_end();
                let elapsed = s.start.map(|t| t.elapsed()).unwrap_or_default();
                let _ = writeln!(s.out, "\n{INDENT2}{}", "-".repeat(25));
                let _ = writeln!(s.out, "{INDENT2}-- {elapsed:?}");
                let file_counter = s.file_counter;
                let stmt_counter = s.stmt_counter;
                let _ = writeln!(s.out, "{INDENT2}-- {file_counter} migrations");
                let _ = writeln!(s.out, "{INDENT2}-- {stmt_counter} sql statements");
            }
        }
    }
}
