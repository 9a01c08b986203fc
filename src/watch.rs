//! Watches the source folder and feeds newly arrived daily logs to the pipeline.

use crate::config::WatchConfig;
use crate::error::DrillLedgerError;
use crate::pipeline::is_candidate;
use crate::pipeline::FileOutcome;
use crate::pipeline::Pipeline;
use notify::event::ModifyKind;
use notify::event::RenameMode;
use notify::Event;
use notify::EventKind;
use notify::RecommendedWatcher;
use notify::RecursiveMode;
use notify::Watcher;
use std::io::ErrorKind;
use std::path::Path;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::mpsc;
use std::sync::mpsc::RecvTimeoutError;
use std::thread;
use std::time::Instant;
use std::time::SystemTime;
use tracing::debug;
use tracing::info;
use tracing::warn;

pub struct FolderWatcher<'a> {
    pipeline: &'a Pipeline,
    config: WatchConfig,
}

impl<'a> FolderWatcher<'a> {
    pub fn new(pipeline: &'a Pipeline, config: &WatchConfig) -> Self {
        Self {
            pipeline,
            config: config.clone(),
        }
    }

    /// Blocks until `shutdown` is set or the watcher goes away.
    ///
    /// Only files created in, or renamed into, the source folder trigger the pipeline.
    /// Each one is processed after it stops changing.
    pub fn run(&self, shutdown: &AtomicBool) -> Result<(), DrillLedgerError> {
        let folder = self.pipeline.source_folder();
        let (watch_tx, watch_rx) = mpsc::channel();
        let mut watcher = RecommendedWatcher::new(watch_tx, notify::Config::default())?;
        watcher.watch(folder, RecursiveMode::NonRecursive)?;
        info!(folder = %folder.display(), "Watching");

        loop {
            if shutdown.load(Ordering::Relaxed) {
                break;
            }
            match watch_rx.recv_timeout(self.config.poll_interval()) {
                Ok(Ok(event)) => {
                    for path in arrivals(&event) {
                        self.handle(&path);
                    }
                }
                Ok(Err(e)) => warn!(error = %e, "Watcher error"),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        info!(folder = %folder.display(), "Stopped watching");
        Ok(())
    }

    fn handle(&self, path: &Path) -> Option<FileOutcome> {
        match wait_until_stable(path, &self.config) {
            Ok(true) => Some(self.pipeline.process(path)),
            Ok(false) => {
                warn!(file = %path.display(), "File vanished or never settled, skipped");
                None
            }
            Err(e) => {
                warn!(file = %path.display(), "Cannot inspect file: {}", e);
                None
            }
        }
    }
}

/// Candidate paths that just appeared according to `event`.
fn arrivals(event: &Event) -> Vec<PathBuf> {
    let paths: &[PathBuf] = match event.kind {
        EventKind::Create(_) => &event.paths,
        // inotify follows each `To` with a `Both` for the same rename; only `To` counts
        EventKind::Modify(ModifyKind::Name(RenameMode::To | RenameMode::Any)) => &event.paths,
        _ => &[],
    };
    let arrivals: Vec<PathBuf> = paths.iter().filter(|path| is_candidate(path)).cloned().collect();
    if !arrivals.is_empty() {
        debug!(kind = ?event.kind, paths = ?arrivals, "Filesystem event");
    }
    arrivals
}

/// Waits until the size and modification time of `path` stay the same for
/// `stable_polls` consecutive polls. Returns `false` when the file disappears
/// or keeps changing past the settle timeout.
pub fn wait_until_stable(path: &Path, config: &WatchConfig) -> Result<bool, DrillLedgerError> {
    let started = Instant::now();
    let mut previous: Option<(u64, Option<SystemTime>)> = None;
    let mut unchanged = 0;
    loop {
        let current = match std::fs::metadata(path) {
            Ok(metadata) => (metadata.len(), metadata.modified().ok()),
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
            Err(e) => Err(e)?,
        };
        match previous {
            Some(previous) if previous == current => unchanged += 1,
            _ => unchanged = 0,
        }
        if unchanged >= config.stable_polls {
            return Ok(true);
        }
        if started.elapsed() >= config.settle_timeout() {
            return Ok(false);
        }
        previous = Some(current);
        thread::sleep(config.poll_interval());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use notify::event::CreateKind;
    use notify::event::DataChange;
    use std::io::Write;
    use std::time::Duration;

    fn fast() -> WatchConfig {
        WatchConfig {
            poll_interval_ms: 10,
            stable_polls: 2,
            settle_timeout_secs: 5,
        }
    }

    #[test]
    fn settled_file_is_stable() {
        let directory = tempfile::tempdir().unwrap();
        let path = directory.path().join("C06-090.xlsx");
        std::fs::write(&path, b"done").unwrap();
        assert!(wait_until_stable(&path, &fast()).unwrap());
    }

    #[test]
    fn missing_file_is_not_stable() {
        let directory = tempfile::tempdir().unwrap();
        assert!(!wait_until_stable(&directory.path().join("gone.xlsx"), &fast()).unwrap());
    }

    #[test]
    fn growing_file_times_out() {
        let directory = tempfile::tempdir().unwrap();
        let path = directory.path().join("C06-091.xlsx");
        std::fs::write(&path, b"").unwrap();
        let writer_path = path.clone();
        let writer = thread::spawn(move || {
            let mut file = std::fs::OpenOptions::new().append(true).open(writer_path).unwrap();
            for _ in 0..300 {
                file.write_all(b"x").unwrap();
                file.flush().unwrap();
                thread::sleep(Duration::from_millis(5));
            }
        });
        let config = WatchConfig {
            poll_interval_ms: 20,
            stable_polls: 3,
            settle_timeout_secs: 1,
        };
        assert!(!wait_until_stable(&path, &config).unwrap());
        writer.join().unwrap();
    }

    #[test]
    fn only_arrivals_of_candidates_count() {
        let created = Event::new(EventKind::Create(CreateKind::File))
            .add_path(PathBuf::from("Daily_Data/C06-090.xlsx"))
            .add_path(PathBuf::from("Daily_Data/~$C06-090.xlsx"));
        assert_eq!(arrivals(&created), vec![PathBuf::from("Daily_Data/C06-090.xlsx")]);

        let renamed = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::To)))
            .add_path(PathBuf::from("Daily_Data/C06-091.xlsx"));
        assert_eq!(arrivals(&renamed), vec![PathBuf::from("Daily_Data/C06-091.xlsx")]);

        let paired = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Both)))
            .add_path(PathBuf::from("Daily_Data/tmp1234.tmp.xlsx"))
            .add_path(PathBuf::from("Daily_Data/C06-091.xlsx"));
        assert!(arrivals(&paired).is_empty());

        let written = Event::new(EventKind::Modify(ModifyKind::Data(DataChange::Content)))
            .add_path(PathBuf::from("Daily_Data/C06-090.xlsx"));
        assert!(arrivals(&written).is_empty());
    }

    #[test]
    fn rename_into_folder_arrives_once() {
        let directory = tempfile::tempdir().unwrap();
        let root = directory.path().canonicalize().unwrap();
        let (watch_tx, watch_rx) = mpsc::channel();
        let mut watcher = RecommendedWatcher::new(watch_tx, notify::Config::default()).unwrap();
        watcher.watch(&root, RecursiveMode::NonRecursive).unwrap();

        let staging = root.join("A1B2C3D4");
        std::fs::write(&staging, b"workbook").unwrap();
        std::fs::rename(&staging, root.join("C06-090.xlsx")).unwrap();

        let mut arrived = Vec::new();
        while let Ok(event) = watch_rx.recv_timeout(Duration::from_millis(500)) {
            arrived.extend(arrivals(&event.unwrap()));
        }
        assert_eq!(arrived, vec![root.join("C06-090.xlsx")]);
    }

    #[test]
    fn stops_when_asked() {
        let directory = tempfile::tempdir().unwrap();
        let config = Config {
            source_folder: directory.path().to_path_buf(),
            database_file: directory.path().join("drilling_database.xlsx"),
            ..Config::default()
        };
        let pipeline = Pipeline::new(&config).unwrap();
        let shutdown = AtomicBool::new(true);
        FolderWatcher::new(&pipeline, &fast()).run(&shutdown).unwrap();
    }
}
