use crate::background::tasks::TaskCoordinator;
use crate::tiles::source::HTTP_CLIENT;
use crate::{MapError, Result};
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Lifecycle of a background task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Pending,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

/// Event delivered to the task's consumer.
///
/// Progress fractions are monotonically non-decreasing in [0, 1];
/// exactly one terminal event follows them.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskEvent {
    Progress(f64),
    Succeeded(PathBuf),
    Failed(String),
    Cancelled,
}

impl TaskEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TaskEvent::Progress(_))
    }
}

/// Handle to a background download.
///
/// Events arrive on the channel fixed at creation; the consumer drains
/// them on its own context, so completion never races a render read.
pub struct TaskHandle {
    state: Arc<Mutex<TaskState>>,
    cancelled: Arc<AtomicBool>,
    events: Receiver<TaskEvent>,
}

impl TaskHandle {
    pub fn state(&self) -> TaskState {
        *self.state.lock().unwrap()
    }

    /// Requests cooperative cancellation; the transfer checks between
    /// chunks and removes its partial file.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// The event channel fixed at task creation.
    pub fn events(&self) -> &Receiver<TaskEvent> {
        &self.events
    }

    /// Blocks until the terminal event, returning it. Progress events
    /// encountered on the way are discarded.
    pub fn wait(&self) -> TaskEvent {
        while let Ok(event) = self.events.recv() {
            if event.is_terminal() {
                return event;
            }
        }
        // Channel closed without a terminal event: the worker panicked.
        TaskEvent::Failed("task dropped without completing".to_string())
    }
}

/// Outcome of the transfer loop, mapped to exactly one terminal event.
enum Transfer {
    Completed,
    Cancelled,
}

/// Starts a background download of `url` into `destination`.
///
/// The body streams into `<destination>.part`; only after it is fully
/// written and synced does a rename install it, so an existing file at
/// the destination is never partially overwritten.
pub fn start_download(
    coordinator: &TaskCoordinator,
    url: impl Into<String>,
    destination: impl Into<PathBuf>,
) -> Result<TaskHandle> {
    let url = url.into();
    let destination = destination.into();
    let state = Arc::new(Mutex::new(TaskState::Pending));
    let cancelled = Arc::new(AtomicBool::new(false));
    let (event_tx, event_rx) = unbounded();

    let worker_state = state.clone();
    let worker_cancelled = cancelled.clone();
    coordinator.submit(move || {
        run_download(url, destination, worker_state, worker_cancelled, event_tx);
    })?;

    Ok(TaskHandle {
        state,
        cancelled,
        events: event_rx,
    })
}

fn run_download(
    url: String,
    destination: PathBuf,
    state: Arc<Mutex<TaskState>>,
    cancelled: Arc<AtomicBool>,
    events: Sender<TaskEvent>,
) {
    *state.lock().unwrap() = TaskState::Running;
    log::info!("download {url} -> {}", destination.display());

    let result = HTTP_CLIENT
        .get(&url)
        .send()
        .map_err(|e| MapError::Fetch(e.to_string()))
        .and_then(|resp| {
            if !resp.status().is_success() {
                return Err(MapError::Fetch(format!("HTTP {}", resp.status())));
            }
            let total = resp.content_length();
            transfer(resp, total, &destination, &cancelled, |event| {
                let _ = events.send(event);
            })
        });

    let (next_state, terminal) = match result {
        Ok(Transfer::Completed) => (
            TaskState::Succeeded,
            TaskEvent::Succeeded(destination.clone()),
        ),
        Ok(Transfer::Cancelled) => (TaskState::Cancelled, TaskEvent::Cancelled),
        Err(e) => {
            log::warn!("download {url} failed: {e}");
            (TaskState::Failed, TaskEvent::Failed(e.to_string()))
        }
    };
    *state.lock().unwrap() = next_state;
    let _ = events.send(terminal);
}

/// Streams `body` into `<destination>.part`, emitting progress, then
/// atomically installs the destination.
fn transfer(
    mut body: impl Read,
    total: Option<u64>,
    destination: &Path,
    cancelled: &AtomicBool,
    emit: impl Fn(TaskEvent),
) -> Result<Transfer> {
    let part = part_path(destination);
    if let Some(parent) = part.parent() {
        fs::create_dir_all(parent)?;
    }

    let result = copy_body(&mut body, total, &part, cancelled, &emit);
    match result {
        Ok(Transfer::Completed) => {
            fs::rename(&part, destination)?;
            Ok(Transfer::Completed)
        }
        other => {
            let _ = fs::remove_file(&part);
            other
        }
    }
}

fn copy_body(
    body: &mut impl Read,
    total: Option<u64>,
    part: &Path,
    cancelled: &AtomicBool,
    emit: &impl Fn(TaskEvent),
) -> Result<Transfer> {
    let mut file = fs::File::create(part)?;
    let mut buffer = [0u8; 8192];
    let mut written: u64 = 0;
    let mut last_fraction = 0.0_f64;

    loop {
        if cancelled.load(Ordering::SeqCst) {
            return Ok(Transfer::Cancelled);
        }
        let n = body
            .read(&mut buffer)
            .map_err(|e| MapError::Fetch(e.to_string()))?;
        if n == 0 {
            break;
        }
        file.write_all(&buffer[..n])?;
        written += n as u64;

        if let Some(total) = total.filter(|t| *t > 0) {
            let fraction = (written as f64 / total as f64).min(1.0);
            if fraction > last_fraction {
                last_fraction = fraction;
                emit(TaskEvent::Progress(fraction));
            }
        }
    }

    file.sync_all()?;
    Ok(Transfer::Completed)
}

fn part_path(destination: &Path) -> PathBuf {
    let mut name = destination.as_os_str().to_os_string();
    name.push(".part");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn collect_events(emit_into: &mut Vec<TaskEvent>) -> impl Fn(TaskEvent) + '_ {
        let cell = std::cell::RefCell::new(emit_into);
        move |event| cell.borrow_mut().push(event)
    }

    #[test]
    fn test_transfer_installs_atomically_and_reports_progress() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("package.zip");
        let body: Vec<u8> = (0..100_000u32).map(|i| i as u8).collect();
        let cancelled = AtomicBool::new(false);
        let mut events = Vec::new();

        let outcome = transfer(
            body.as_slice(),
            Some(body.len() as u64),
            &dest,
            &cancelled,
            collect_events(&mut events),
        )
        .unwrap();

        assert!(matches!(outcome, Transfer::Completed));
        assert_eq!(fs::read(&dest).unwrap(), body);
        assert!(!part_path(&dest).exists());

        assert!(!events.is_empty());
        let fractions: Vec<f64> = events
            .iter()
            .map(|e| match e {
                TaskEvent::Progress(f) => *f,
                other => panic!("unexpected event {other:?}"),
            })
            .collect();
        assert!(fractions.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(*fractions.last().unwrap(), 1.0);
    }

    #[test]
    fn test_transfer_without_length_emits_no_progress() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("package.zip");
        let cancelled = AtomicBool::new(false);
        let mut events = Vec::new();

        transfer(
            &b"abc"[..],
            None,
            &dest,
            &cancelled,
            collect_events(&mut events),
        )
        .unwrap();

        assert!(events.is_empty());
        assert_eq!(fs::read(&dest).unwrap(), b"abc");
    }

    #[test]
    fn test_cancelled_transfer_removes_partial_file() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("package.zip");
        let cancelled = AtomicBool::new(true);
        let mut events = Vec::new();

        let outcome = transfer(
            &b"abcdef"[..],
            Some(6),
            &dest,
            &cancelled,
            collect_events(&mut events),
        )
        .unwrap();

        assert!(matches!(outcome, Transfer::Cancelled));
        assert!(!dest.exists());
        assert!(!part_path(&dest).exists());
    }

    #[test]
    fn test_failed_transfer_keeps_existing_destination() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("package.zip");
        fs::write(&dest, b"previous contents").unwrap();

        struct FailingReader;
        impl Read for FailingReader {
            fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
                Err(std::io::Error::new(
                    std::io::ErrorKind::ConnectionReset,
                    "reset",
                ))
            }
        }

        let cancelled = AtomicBool::new(false);
        let result = transfer(FailingReader, Some(100), &dest, &cancelled, |_| {});

        assert!(result.is_err());
        assert_eq!(fs::read(&dest).unwrap(), b"previous contents");
        assert!(!part_path(&dest).exists());
    }

    #[test]
    fn test_handle_wait_returns_terminal_event() {
        let (tx, rx) = unbounded();
        let handle = TaskHandle {
            state: Arc::new(Mutex::new(TaskState::Running)),
            cancelled: Arc::new(AtomicBool::new(false)),
            events: rx,
        };

        tx.send(TaskEvent::Progress(0.5)).unwrap();
        tx.send(TaskEvent::Succeeded(PathBuf::from("/tmp/x"))).unwrap();
        assert_eq!(handle.wait(), TaskEvent::Succeeded(PathBuf::from("/tmp/x")));
    }
}
