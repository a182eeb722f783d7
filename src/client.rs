// Copyright 2021 Joyent, Inc.

//! The composite file client: stitches coordinator metadata and block-level
//! I/O into a file-system-like surface.

use std::io::{BufRead, BufReader, Read, Write};

use encoding_rs::Encoding;
use slog::{debug, o, Drain, Logger};

use crate::datanode::{DataNodeClientProvider, DataNodeConfig, DefaultDataNodeClientProvider};
use crate::error::{DfsError, Result};
use crate::namenode::{
    BlockLocation, FileSummary, NameNodeClient, DEFAULT_BLOCK_SIZE, DEFAULT_REPLICATION,
};
use crate::paths;

/// Tuning knobs for a [`DfsClient`].
#[derive(Clone, Debug)]
pub struct DfsClientOptions {
    /// Rewrites every replica hostname from coordinator metadata to
    /// `localhost`. Coordinator-reported hostnames are internal to the
    /// cluster; with port-forwarded storage nodes this is the only way to
    /// reach them from outside.
    pub local_mode: bool,
    /// Replication factor for new files.
    pub replication: u32,
    /// Block size for new files.
    pub block_size: u64,
    /// Configuration for the storage-node clients this client creates.
    pub datanode_config: DataNodeConfig,
}

impl Default for DfsClientOptions {
    fn default() -> DfsClientOptions {
        DfsClientOptions {
            local_mode: false,
            replication: DEFAULT_REPLICATION,
            block_size: DEFAULT_BLOCK_SIZE,
            datanode_config: DataNodeConfig::default(),
        }
    }
}

/// A file-system-like client for one DFS cluster.
///
/// Reads stat the file, then stream each block from the first replica that
/// answers. Writes drive the create / add-block / stream / complete
/// lifecycle, one block at a time through the head replica. All paths are
/// absolute. Safe to share across threads: every operation opens its own
/// connections.
pub struct DfsClient {
    namenode: NameNodeClient,
    datanodes: Box<dyn DataNodeClientProvider>,
    local_mode: bool,
    replication: u32,
    block_size: u64,
    log: Logger,
}

impl DfsClient {
    /// Creates a client over the given coordinator client with the default
    /// storage-node provider.
    pub fn new(
        namenode: NameNodeClient,
        options: DfsClientOptions,
        log: Option<Logger>,
    ) -> DfsClient {
        let log = log.unwrap_or_else(|| Logger::root(slog_stdlog::StdLog.fuse(), o!()));
        let provider =
            DefaultDataNodeClientProvider::new(options.datanode_config.clone(), Some(log.clone()));
        DfsClient::with_provider(namenode, Box::new(provider), options, log)
    }

    /// Creates a client with a caller-supplied storage-node provider.
    pub fn with_provider(
        namenode: NameNodeClient,
        datanodes: Box<dyn DataNodeClientProvider>,
        options: DfsClientOptions,
        log: Logger,
    ) -> DfsClient {
        DfsClient {
            namenode,
            datanodes,
            local_mode: options.local_mode,
            replication: options.replication,
            block_size: options.block_size,
            log,
        }
    }

    /// Lists a directory (first server page only).
    pub fn list(&self, path: &str) -> Result<Vec<FileSummary>> {
        self.namenode.list(path)
    }

    /// Creates a directory; the parent must exist.
    pub fn create_directory(&self, path: &str) -> Result<FileSummary> {
        self.namenode.create_directory(path)
    }

    /// Creates a directory and any missing parents.
    pub fn create_directories(&self, path: &str) -> Result<FileSummary> {
        self.namenode.create_directories(path)
    }

    /// Returns a path's metadata; `NotFound` when it does not exist.
    pub fn read_attributes(&self, path: &str) -> Result<FileSummary> {
        self.namenode.read_attributes(path)
    }

    /// Reads a whole file into memory. Refuses directories.
    pub fn read_all_bytes(&self, path: &str) -> Result<Vec<u8>> {
        paths::require_absolute(path)?;

        let summary = self.namenode.read_attributes(path)?;
        if summary.is_directory() {
            return Err(DfsError::InvalidArgument(format!(
                "path is a directory, not a file: {}",
                path
            )));
        }

        let mut bytes = Vec::with_capacity(usize::try_from(summary.length).unwrap_or(0));
        self.copy_to_sink(path, &mut bytes)?;
        Ok(bytes)
    }

    /// Reads a whole file and decodes it into lines using the given
    /// character encoding. Lines split on `\r?\n`; a trailing terminator
    /// yields no empty final line.
    pub fn read_all_lines(&self, path: &str, encoding: &'static Encoding) -> Result<Vec<String>> {
        let bytes = self.read_all_bytes(path)?;
        if bytes.is_empty() {
            return Ok(Vec::new());
        }

        let (text, _, _) = encoding.decode(&bytes);
        let mut lines: Vec<String> = text
            .split('\n')
            .map(|line| String::from(line.strip_suffix('\r').unwrap_or(line)))
            .collect();
        if lines.last().map(String::is_empty).unwrap_or(false) {
            lines.pop();
        }
        Ok(lines)
    }

    /// Streams a file's contents into `sink`, block by block. Replicas are
    /// tried in the coordinator's order; a block that every replica fails to
    /// serve is an infrastructure failure. Sink failures abort immediately
    /// as `CallerStream`.
    pub fn copy_to_sink(&self, path: &str, sink: &mut dyn Write) -> Result<()> {
        paths::require_absolute(path)?;

        let summary = match self.namenode.stat(path)? {
            Some(summary) => summary,
            None => return Err(DfsError::NotFound(String::from(path))),
        };
        if summary.is_directory() {
            return Err(DfsError::InvalidArgument(format!(
                "path is a directory, not a file: {}",
                path
            )));
        }

        let blocks = summary.block_locations.unwrap_or_default();
        if blocks.is_empty() {
            if summary.length == 0 {
                return Ok(());
            }
            return Err(DfsError::infrastructure(format!(
                "no block locations reported for non-empty file: {}",
                path
            )));
        }

        for block in blocks {
            let block = self.rewrite_hosts(block);
            self.copy_block_to_sink(&block, sink)?;
        }
        Ok(())
    }

    fn copy_block_to_sink(&self, block: &BlockLocation, sink: &mut dyn Write) -> Result<()> {
        for replica in &block.replicas {
            let mut node = self.datanodes.client(&replica.host, replica.xfer_port);
            match node.read_block(block, sink) {
                Ok(()) => return Ok(()),
                // A sink failure is the caller's problem, not this
                // replica's; do not fail over on it.
                Err(e @ DfsError::CallerStream(_)) => return Err(e),
                Err(e) => {
                    debug!(self.log, "replica failed, trying next";
                           "block" => block.block_id,
                           "host" => %replica.host,
                           "err" => %e);
                }
            }
        }
        Err(DfsError::infrastructure(format!(
            "failed to read block {} from any replica",
            block.block_id
        )))
    }

    /// Creates `path` and streams `source` into it. The path must not
    /// already exist. Bytes flow one block at a time through the head
    /// replica of each block; every block's actual byte count is reported
    /// back to the coordinator when the next block is requested, and the
    /// final block's when the file is completed.
    pub fn copy_from_source(&self, path: &str, source: &mut dyn Read) -> Result<()> {
        paths::require_absolute(path)?;

        if self.namenode.stat(path)?.is_some() {
            return Err(DfsError::infrastructure(format!(
                "file already exists: {}",
                path
            )));
        }

        let summary = self
            .namenode
            .create(path, true, self.replication, self.block_size)?;
        let mut summary = self.namenode.add_block(&summary)?;

        // Buffer the caller's source so end-of-input can be detected
        // precisely with a look-ahead before each block is opened.
        let mut reader = BufReader::new(source);
        let mut total: u64 = 0;
        let mut first = true;

        loop {
            let at_eof = reader
                .fill_buf()
                .map_err(DfsError::CallerStream)?
                .is_empty();
            // The very first block is streamed even for an empty source so
            // the storage node sees the canonical empty final packet.
            if at_eof && !first {
                break;
            }
            if !first && total % self.block_size == 0 {
                summary = self.namenode.add_block(&summary)?;
            }

            let block = match summary.last_block() {
                Some(block) => self.rewrite_hosts(block.clone()),
                None => {
                    return Err(DfsError::infrastructure(format!(
                        "coordinator reported no block to write for: {}",
                        path
                    )))
                }
            };
            let replica = block.replicas.first().ok_or_else(|| {
                DfsError::infrastructure(format!(
                    "no replicas reported for block {}",
                    block.block_id
                ))
            })?;

            let limit = self.block_size - (total % self.block_size);
            let mut limited = (&mut reader).take(limit);
            let mut node = self.datanodes.client(&replica.host, replica.xfer_port);
            let written = node.write_block(&block, &mut limited)?;

            if let Some(last) = summary
                .block_locations
                .as_mut()
                .and_then(|blocks| blocks.last_mut())
            {
                last.length = written;
            }
            total += written;
            first = false;

            if at_eof {
                break;
            }
        }

        if !self.namenode.complete(&summary)? {
            return Err(DfsError::infrastructure(format!(
                "failed to complete file: {}",
                path
            )));
        }

        debug!(self.log, "file written"; "path" => path, "bytes" => total);
        Ok(())
    }

    /// Deletes a file or empty directory; failure to delete is an error.
    pub fn delete(&self, path: &str) -> Result<()> {
        self.namenode.delete(path)
    }

    /// Deletes a path, returning whether it existed. A delete failure is
    /// only `false` when a follow-up stat confirms the path is absent; any
    /// other outcome propagates as an infrastructure failure carrying the
    /// original error.
    pub fn delete_if_exists(&self, path: &str) -> Result<bool> {
        paths::require_absolute(path)?;

        let delete_err = match self.namenode.delete(path) {
            Ok(()) => return Ok(true),
            Err(e) => e,
        };

        match self.namenode.stat(path) {
            Ok(None) => Ok(false),
            Ok(Some(_)) => Err(DfsError::infrastructure_with(
                format!("failed to delete existing path: {}", path),
                delete_err,
            )),
            Err(stat_err) => Err(DfsError::infrastructure_with(
                format!("failed to verify existence after delete failure: {}", path),
                stat_err,
            )),
        }
    }

    fn rewrite_hosts(&self, mut block: BlockLocation) -> BlockLocation {
        if self.local_mode {
            for replica in &mut block.replicas {
                replica.host = String::from("localhost");
            }
        }
        block
    }
}
