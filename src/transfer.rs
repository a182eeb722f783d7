// Copyright 2021 Joyent, Inc.

//! Bulk transfers: a fixed-size worker pool that fans independent file-level
//! uploads and downloads across the composite client, with per-file results
//! and optional progress listeners.

use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crossbeam_channel::{unbounded, Receiver, Sender};
use slog::{debug, o, Drain, Logger};

use crate::client::DfsClient;
use crate::error::{DfsError, Result};
use crate::paths;

/// Receives lifecycle and progress events for one transfer. Byte counts are
/// cumulative and reported as data flows through the transfer's stream.
pub trait TransferListener: Send + Sync {
    fn started(&self, _source: &str, _destination: &str) {}
    fn bytes(&self, _transferred: u64) {}
    fn completed(&self, _total_bytes: u64, _elapsed_ms: u64) {}
    fn failed(&self, _error: &DfsError) {}
}

/// A request to copy one local file into the DFS.
pub struct UploadRequest {
    pub local_path: PathBuf,
    pub dfs_path: String,
    pub listener: Option<Arc<dyn TransferListener>>,
}

/// A request to copy one DFS file onto the local file system.
pub struct DownloadRequest {
    pub dfs_path: String,
    pub local_path: PathBuf,
    pub listener: Option<Arc<dyn TransferListener>>,
}

/// The outcome of one file-level transfer.
#[derive(Debug)]
pub struct FileTransferResult {
    pub source: String,
    pub destination: String,
    pub success: bool,
    pub error: Option<DfsError>,
    pub bytes: u64,
    pub elapsed_ms: u64,
}

/// Aggregated outcome of a batch of transfers.
#[derive(Debug)]
pub struct TransferSummary {
    pub results: Vec<FileTransferResult>,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// Tracks a batch of dispatched transfers. Results arrive as workers finish;
/// `wait` blocks until every task has reported.
pub struct TransferHandle {
    total: usize,
    results: Receiver<FileTransferResult>,
}

impl TransferHandle {
    /// Number of file-level tasks in this batch.
    pub fn total(&self) -> usize {
        self.total
    }

    /// Blocks until every task has completed and returns the summary.
    pub fn wait(self) -> TransferSummary {
        let mut results = Vec::with_capacity(self.total);
        for _ in 0..self.total {
            match self.results.recv() {
                Ok(result) => results.push(result),
                Err(_) => break,
            }
        }

        let succeeded = results.iter().filter(|r| r.success).count();
        let failed = results.len() - succeeded;
        TransferSummary {
            total: self.total,
            succeeded,
            failed,
            results,
        }
    }
}

type Job = Box<dyn FnOnce() + Send>;

/// A bounded worker pool mapping many independent file transfers onto one
/// shared [`DfsClient`]. Each worker performs whole file-level transfers; no
/// mutable state is shared across files.
pub struct TransferManager {
    client: Arc<DfsClient>,
    jobs: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
    log: Logger,
}

impl std::fmt::Debug for TransferManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferManager")
            .field("workers", &self.workers.len())
            .finish()
    }
}

impl TransferManager {
    /// Creates a manager with `pool_size` worker threads (at least one).
    pub fn new(
        client: Arc<DfsClient>,
        pool_size: usize,
        log: Option<Logger>,
    ) -> Result<TransferManager> {
        if pool_size < 1 {
            return Err(DfsError::InvalidArgument(format!(
                "worker pool size must be at least 1: {}",
                pool_size
            )));
        }

        let log = log.unwrap_or_else(|| Logger::root(slog_stdlog::StdLog.fuse(), o!()));
        let (jobs, job_rx) = unbounded::<Job>();

        let mut workers = Vec::with_capacity(pool_size);
        for n in 0..pool_size {
            let rx = job_rx.clone();
            let worker = thread::Builder::new()
                .name(format!("dfs-transfer-{}", n))
                .spawn(move || {
                    while let Ok(job) = rx.recv() {
                        job();
                    }
                })
                .map_err(|e| DfsError::infrastructure_with("failed to spawn worker thread", e))?;
            workers.push(worker);
        }

        debug!(log, "transfer worker pool started"; "workers" => pool_size);
        Ok(TransferManager {
            client,
            jobs: Some(jobs),
            workers,
            log,
        })
    }

    /// Dispatches one upload.
    pub fn upload(&self, request: UploadRequest) -> TransferHandle {
        let (tx, rx) = unbounded();
        self.submit_upload(request, tx);
        TransferHandle { total: 1, results: rx }
    }

    /// Dispatches one download.
    pub fn download(&self, request: DownloadRequest) -> TransferHandle {
        let (tx, rx) = unbounded();
        self.submit_download(request, tx);
        TransferHandle { total: 1, results: rx }
    }

    /// Uploads every regular file directly inside `local_dir` into
    /// `dfs_dir`, one task per file. Subdirectories are not recursed into.
    /// The destination directory is created first.
    pub fn upload_directory(&self, local_dir: &Path, dfs_dir: &str) -> Result<TransferHandle> {
        self.client.create_directories(dfs_dir)?;

        let mut files = Vec::new();
        let entries = fs::read_dir(local_dir).map_err(DfsError::CallerStream)?;
        for entry in entries {
            let entry = entry.map_err(DfsError::CallerStream)?;
            let file_type = entry.file_type().map_err(DfsError::CallerStream)?;
            if file_type.is_file() {
                files.push(entry.path());
            }
        }

        debug!(self.log, "dispatching directory upload";
               "dir" => %local_dir.display(), "files" => files.len());

        let (tx, rx) = unbounded();
        let total = files.len();
        for local_path in files {
            let name = local_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let dfs_path = paths::join(dfs_dir, &[name.as_str()])?;
            self.submit_upload(
                UploadRequest {
                    local_path,
                    dfs_path,
                    listener: None,
                },
                tx.clone(),
            );
        }

        Ok(TransferHandle { total, results: rx })
    }

    /// Downloads every regular file directly inside `dfs_dir` into
    /// `local_dir`, one task per file. Subdirectories are not recursed into.
    pub fn download_directory(&self, dfs_dir: &str, local_dir: &Path) -> Result<TransferHandle> {
        fs::create_dir_all(local_dir).map_err(DfsError::CallerStream)?;

        let files: Vec<_> = self
            .client
            .list(dfs_dir)?
            .into_iter()
            .filter(|summary| summary.is_file())
            .collect();

        debug!(self.log, "dispatching directory download";
               "dir" => dfs_dir, "files" => files.len());

        let (tx, rx) = unbounded();
        let total = files.len();
        for summary in files {
            self.submit_download(
                DownloadRequest {
                    dfs_path: summary.path,
                    local_path: local_dir.join(&summary.name),
                    listener: None,
                },
                tx.clone(),
            );
        }

        Ok(TransferHandle { total, results: rx })
    }

    fn submit_upload(&self, request: UploadRequest, tx: Sender<FileTransferResult>) {
        let client = Arc::clone(&self.client);
        self.submit(Box::new(move || {
            let result = run_upload(&client, request);
            let _ = tx.send(result);
        }));
    }

    fn submit_download(&self, request: DownloadRequest, tx: Sender<FileTransferResult>) {
        let client = Arc::clone(&self.client);
        self.submit(Box::new(move || {
            let result = run_download(&client, request);
            let _ = tx.send(result);
        }));
    }

    fn submit(&self, job: Job) {
        if let Some(jobs) = &self.jobs {
            // Send fails only once the pool is shutting down.
            let _ = jobs.send(job);
        }
    }
}

impl Drop for TransferManager {
    fn drop(&mut self) {
        // Closing the job channel lets the workers drain and exit.
        self.jobs = None;
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

fn run_upload(client: &DfsClient, request: UploadRequest) -> FileTransferResult {
    let start = Instant::now();
    let source = request.local_path.display().to_string();
    if let Some(listener) = &request.listener {
        listener.started(&source, &request.dfs_path);
    }

    let outcome = (|| -> Result<u64> {
        let file = fs::File::open(&request.local_path).map_err(DfsError::CallerStream)?;
        let mut reader = CountingReader {
            inner: file,
            listener: request.listener.clone(),
            total: 0,
        };
        client.copy_from_source(&request.dfs_path, &mut reader)?;
        Ok(reader.total)
    })();

    finish(
        outcome,
        source,
        request.dfs_path,
        request.listener,
        start,
    )
}

fn run_download(client: &DfsClient, request: DownloadRequest) -> FileTransferResult {
    let start = Instant::now();
    let destination = request.local_path.display().to_string();
    if let Some(listener) = &request.listener {
        listener.started(&request.dfs_path, &destination);
    }

    let outcome = (|| -> Result<u64> {
        if let Some(parent) = request.local_path.parent() {
            fs::create_dir_all(parent).map_err(DfsError::CallerStream)?;
        }
        let file = fs::File::create(&request.local_path).map_err(DfsError::CallerStream)?;
        let mut writer = CountingWriter {
            inner: file,
            listener: request.listener.clone(),
            total: 0,
        };
        client.copy_to_sink(&request.dfs_path, &mut writer)?;
        writer.inner.flush().map_err(DfsError::CallerStream)?;
        Ok(writer.total)
    })();

    finish(
        outcome,
        request.dfs_path,
        destination,
        request.listener,
        start,
    )
}

fn finish(
    outcome: Result<u64>,
    source: String,
    destination: String,
    listener: Option<Arc<dyn TransferListener>>,
    start: Instant,
) -> FileTransferResult {
    let elapsed_ms = start.elapsed().as_millis() as u64;
    match outcome {
        Ok(bytes) => {
            if let Some(listener) = &listener {
                listener.completed(bytes, elapsed_ms);
            }
            FileTransferResult {
                source,
                destination,
                success: true,
                error: None,
                bytes,
                elapsed_ms,
            }
        }
        Err(error) => {
            if let Some(listener) = &listener {
                listener.failed(&error);
            }
            FileTransferResult {
                source,
                destination,
                success: false,
                error: Some(error),
                bytes: 0,
                elapsed_ms,
            }
        }
    }
}

/// Counts bytes as the client pulls them from a source, reporting cumulative
/// progress to the listener.
struct CountingReader<R> {
    inner: R,
    listener: Option<Arc<dyn TransferListener>>,
    total: u64,
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let read = self.inner.read(buf)?;
        if read > 0 {
            self.total += read as u64;
            if let Some(listener) = &self.listener {
                listener.bytes(self.total);
            }
        }
        Ok(read)
    }
}

/// Counts bytes as the client pushes them into a sink, reporting cumulative
/// progress to the listener.
struct CountingWriter<W> {
    inner: W,
    listener: Option<Arc<dyn TransferListener>>,
    total: u64,
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let written = self.inner.write(buf)?;
        if written > 0 {
            self.total += written as u64;
            if let Some(listener) = &self.listener {
                listener.bytes(self.total);
            }
        }
        Ok(written)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}
