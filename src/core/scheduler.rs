//! Bounded process pool running command units as `sh -c` children

use crate::config::OutputMode;
use crate::core::command::CommandUnit;
use crate::types::{TilingError, TilingResult};
use rayon::prelude::*;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Child stdout is appended here in logging mode
pub const STDOUT_LOG: &str = "S1TilingOut.log";
/// Child stderr is appended here unless in debug mode
pub const STDERR_LOG: &str = "S1TilingErr.log";

/// Why a command did not succeed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandFailure {
    /// The shell could not be started
    Spawn(String),
    /// The command ran and returned a non-zero status (`None` if killed by a signal)
    Exit(Option<i32>),
}

#[derive(Debug, Clone)]
pub struct FailedCommand {
    pub unit: CommandUnit,
    pub failure: CommandFailure,
}

/// Outcome of one batch
#[derive(Debug, Clone, Default)]
pub struct PoolReport {
    pub launched: usize,
    pub succeeded: usize,
    pub failed: Vec<FailedCommand>,
    pub peak_in_flight: usize,
}

impl PoolReport {
    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty()
    }
}

struct Counters {
    total: usize,
    completed: AtomicUsize,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

/// Runs batches of command units with at most `max_parallel` children alive.
///
/// Each worker thread blocks on its child, so the pool size is the
/// concurrency bound. A batch returns once every unit has terminated; failed
/// units are logged and reported, never retried.
#[derive(Debug, Clone)]
pub struct ProcessPool {
    max_parallel: usize,
    mode: OutputMode,
    log_dir: PathBuf,
    shell: PathBuf,
}

impl ProcessPool {
    pub fn new(max_parallel: usize, mode: OutputMode, log_dir: &Path) -> Self {
        Self {
            max_parallel: max_parallel.max(1),
            mode,
            log_dir: log_dir.to_path_buf(),
            shell: PathBuf::from("sh"),
        }
    }

    /// Use another POSIX shell to interpret command lines
    pub fn with_shell(mut self, shell: &Path) -> Self {
        self.shell = shell.to_path_buf();
        self
    }

    pub fn max_parallel(&self) -> usize {
        self.max_parallel
    }

    /// Run every unit and wait for all of them
    pub fn run(&self, units: &[CommandUnit]) -> TilingResult<PoolReport> {
        if units.is_empty() {
            return Ok(PoolReport::default());
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.max_parallel)
            .thread_name(|i| format!("s1tiling-worker-{}", i))
            .build()
            .map_err(|e| TilingError::Processing(format!("Failed to build process pool: {}", e)))?;

        let counters = Counters {
            total: units.len(),
            completed: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        };

        log::debug!("Running {} commands, {} at a time", units.len(), self.max_parallel);
        let outcomes: Vec<Result<(), CommandFailure>> =
            pool.install(|| units.par_iter().map(|unit| self.execute(unit, &counters)).collect());

        let mut report = PoolReport {
            launched: units.len(),
            peak_in_flight: counters.peak.load(Ordering::SeqCst),
            ..PoolReport::default()
        };
        for (unit, outcome) in units.iter().zip(outcomes) {
            match outcome {
                Ok(()) => report.succeeded += 1,
                Err(failure) => report.failed.push(FailedCommand {
                    unit: unit.clone(),
                    failure,
                }),
            }
        }
        if !report.all_succeeded() {
            log::warn!("{} of {} commands failed", report.failed.len(), report.launched);
        }
        Ok(report)
    }

    fn execute(&self, unit: &CommandUnit, counters: &Counters) -> Result<(), CommandFailure> {
        let running = counters.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        counters.peak.fetch_max(running, Ordering::SeqCst);

        let (stdout, stderr) = self.child_streams();
        let status = Command::new(&self.shell)
            .arg("-c")
            .arg(&unit.command_line)
            .stdout(stdout)
            .stderr(stderr)
            .status();

        counters.in_flight.fetch_sub(1, Ordering::SeqCst);
        let completed = counters.completed.fetch_add(1, Ordering::SeqCst) + 1;

        match status {
            Ok(status) if status.success() => {
                let progress = completed * 100 / counters.total;
                log::info!("{}... {}%", unit.title, progress);
                Ok(())
            }
            Ok(status) => {
                log::error!("Command failed ({}): {} [{}]", status, unit.command_line, unit.title);
                Err(CommandFailure::Exit(status.code()))
            }
            Err(e) => {
                log::error!("Could not launch: {} [{}]: {}", unit.command_line, unit.title, e);
                Err(CommandFailure::Spawn(e.to_string()))
            }
        }
    }

    fn child_streams(&self) -> (Stdio, Stdio) {
        match self.mode {
            OutputMode::Debug => (Stdio::inherit(), Stdio::inherit()),
            OutputMode::Logging => (self.append_log(STDOUT_LOG), self.append_log(STDERR_LOG)),
            OutputMode::Quiet => (Stdio::null(), self.append_log(STDERR_LOG)),
        }
    }

    fn append_log(&self, name: &str) -> Stdio {
        let path = self.log_dir.join(name);
        match open_append(&path) {
            Ok(file) => Stdio::from(file),
            Err(e) => {
                log::warn!("Cannot open {}: {}", path.display(), e);
                Stdio::null()
            }
        }
    }
}

fn open_append(path: &Path) -> std::io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}
