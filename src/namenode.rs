// Copyright 2021 Joyent, Inc.

//! The coordinator (NameNode) client: metadata operations over the framed
//! RPC protocol, plus the record types those operations return.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use slog::{debug, o, warn, Drain, Logger};

use crate::connection::{ConnectionConfig, NameNodeConnection, NameNodeEndpoint};
use crate::error::{DfsError, Result};
use crate::paths;
use crate::proto::hdfs::{
    hdfs_file_status_proto::FileType as FileTypeProto, AddBlockRequestProto,
    AddBlockResponseProto, CompleteRequestProto, CompleteResponseProto, CreateFlagProto,
    CreateRequestProto, CreateResponseProto, DeleteRequestProto, DeleteResponseProto,
    ExtendedBlockProto, FsPermissionProto, GetFileInfoRequestProto, GetFileInfoResponseProto,
    GetListingRequestProto, GetListingResponseProto, GetLocatedFileInfoRequestProto,
    GetLocatedFileInfoResponseProto, HdfsFileStatusProto, LocatedBlockProto, MkdirsRequestProto,
    MkdirsResponseProto, VersionRequestProto, VersionResponseProto,
};
use crate::rpc::{RpcEngine, CLIENT_PROTOCOL, NAMENODE_PROTOCOL};

/// Default replication factor for new files.
pub const DEFAULT_REPLICATION: u32 = 3;

/// Default block size for new files (128 MiB).
pub const DEFAULT_BLOCK_SIZE: u64 = 128 * 1024 * 1024;

const DIRECTORY_PERMISSIONS: u32 = 0o755;
const FILE_PERMISSIONS: u32 = 0o644;

/// The kind of a file-system entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileType {
    File,
    Directory,
    Symlink,
}

/// One replica of a block on a specific storage node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReplicaLocation {
    pub host: String,
    /// Data-transfer port of the node; 0 means the default port.
    pub xfer_port: u16,
    pub uuid: String,
    pub topology: Option<String>,
}

/// A block's position in its file and the replicas that hold it.
///
/// `length` is authoritative only once the block has been closed via a
/// subsequent `add_block` or `complete`; for the tail block of a file being
/// written it is the client's running byte count.
#[derive(Clone, Debug)]
pub struct BlockLocation {
    pub offset: u64,
    pub length: u64,
    pub pool_id: String,
    pub block_id: u64,
    pub generation_stamp: u64,
    pub replicas: Vec<ReplicaLocation>,
}

/// Metadata for one file-system entry, as reported by the coordinator.
#[derive(Clone, Debug)]
pub struct FileSummary {
    pub file_type: FileType,
    pub name: String,
    pub path: String,
    pub length: u64,
    /// Low 9 bits of the permission word.
    pub permissions: u32,
    pub owner: String,
    pub group: String,
    pub modification_time: SystemTime,
    pub access_time: SystemTime,
    pub symlink_target: Option<String>,
    pub block_replication: u32,
    pub block_size: u64,
    pub file_id: u64,
    pub children_count: i32,
    pub storage_policy: u32,
    pub flags: u32,
    pub namespace: Option<String>,
    pub block_locations: Option<Vec<BlockLocation>>,
}

impl FileSummary {
    pub fn is_file(&self) -> bool {
        self.file_type == FileType::File
    }

    pub fn is_directory(&self) -> bool {
        self.file_type == FileType::Directory
    }

    /// The tail block, if the summary carries any locations.
    pub fn last_block(&self) -> Option<&BlockLocation> {
        self.block_locations.as_ref().and_then(|blocks| blocks.last())
    }
}

/// Build and version information reported by the coordinator.
#[derive(Clone, Debug)]
pub struct ServerInfo {
    pub build_version: String,
    pub block_pool_id: String,
    pub software_version: String,
    pub capabilities: u64,
}

/// A client for coordinator metadata operations.
///
/// Each operation opens a fresh connection, so the client is safe to share
/// across threads; the only mutable state is the atomic call-id counter.
/// When several endpoints are configured, operations try them in order;
/// `NotFound` propagates immediately and every other failure advances to the
/// next endpoint.
pub struct NameNodeClient {
    endpoints: Vec<NameNodeEndpoint>,
    config: ConnectionConfig,
    client_id: [u8; 16],
    client_name: String,
    client_engine: RpcEngine,
    internal_engine: RpcEngine,
    log: Logger,
}

impl std::fmt::Debug for NameNodeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NameNodeClient")
            .field("endpoints", &self.endpoints)
            .field("client_name", &self.client_name)
            .finish()
    }
}

impl NameNodeClient {
    /// Creates a client for the given coordinator endpoints. The client
    /// identity (16 opaque bytes and a readable name) is generated once here
    /// and used for every request the client ever sends.
    pub fn new(
        endpoints: Vec<NameNodeEndpoint>,
        config: ConnectionConfig,
        log: Option<Logger>,
    ) -> Result<NameNodeClient> {
        if endpoints.is_empty() {
            return Err(DfsError::InvalidArgument(String::from(
                "at least one coordinator endpoint is required",
            )));
        }

        let client_id: [u8; 16] = rand::random();
        let client_name = format!("dfs-client-{}", rand::random::<u32>());
        let log = log
            .unwrap_or_else(|| Logger::root(slog_stdlog::StdLog.fuse(), o!()));

        Ok(NameNodeClient {
            endpoints,
            config,
            client_id,
            client_name,
            client_engine: RpcEngine::new(CLIENT_PROTOCOL, client_id),
            internal_engine: RpcEngine::new(NAMENODE_PROTOCOL, client_id),
            log,
        })
    }

    /// The client name sent in write-lifecycle requests.
    pub fn client_name(&self) -> &str {
        &self.client_name
    }

    /// Fetches the coordinator's build and version information over the
    /// internal protocol.
    pub fn get_version(&self) -> Result<ServerInfo> {
        self.with_endpoints("versionRequest", |conn| {
            let response: VersionResponseProto = self.internal_engine.call(
                conn,
                Some("versionRequest"),
                &VersionRequestProto {},
            )?;
            let info = response.info;
            Ok(ServerInfo {
                build_version: info.build_version,
                block_pool_id: info.block_pool_id,
                software_version: info.software_version,
                capabilities: info.capabilities.unwrap_or(0),
            })
        })
    }

    /// Lists the entries of a directory. Only the first server page is
    /// returned; directories larger than the page size are silently
    /// truncated. Listing a non-existent path is `NotFound`.
    pub fn list(&self, path: &str) -> Result<Vec<FileSummary>> {
        paths::require_absolute(path)?;

        self.with_endpoints("getListing", |conn| {
            let request = GetListingRequestProto {
                src: String::from(path),
                start_after: Vec::new(),
                need_location: true,
            };
            let response: GetListingResponseProto =
                self.client_engine.call(conn, None, &request)?;

            let dir_list = match response.dir_list {
                Some(dir_list) => dir_list,
                None => return Err(DfsError::NotFound(String::from(path))),
            };

            if dir_list.remaining_entries > 0 {
                debug!(
                    self.log,
                    "listing truncated at server page size";
                    "path" => path,
                    "remaining" => dir_list.remaining_entries
                );
            }

            dir_list
                .partial_listing
                .into_iter()
                .map(|status| {
                    let name = String::from_utf8_lossy(&status.path).into_owned();
                    let full = paths::join(path, &[name.as_str()])?;
                    Ok(file_summary_from_proto(status, &full))
                })
                .collect()
        })
    }

    /// Returns the summary for a path, or `None` when the path does not
    /// exist. This is the one operation that distinguishes absence from
    /// failure.
    pub fn stat(&self, path: &str) -> Result<Option<FileSummary>> {
        paths::require_absolute(path)?;

        self.with_endpoints("getLocatedFileInfo", |conn| {
            let request = GetLocatedFileInfoRequestProto {
                src: Some(String::from(path)),
                need_block_token: Some(false),
            };
            let response: GetLocatedFileInfoResponseProto =
                self.client_engine.call(conn, None, &request)?;
            Ok(response.fs.map(|fs| file_summary_from_proto(fs, path)))
        })
    }

    /// Like `stat`, but absence is a `NotFound` error.
    pub fn read_attributes(&self, path: &str) -> Result<FileSummary> {
        self.stat(path)?
            .ok_or_else(|| DfsError::NotFound(String::from(path)))
    }

    /// Creates a directory. The parent must already exist.
    pub fn create_directory(&self, path: &str) -> Result<FileSummary> {
        self.mkdir(path, false)
    }

    /// Creates a directory and any missing parents.
    pub fn create_directories(&self, path: &str) -> Result<FileSummary> {
        self.mkdir(path, true)
    }

    fn mkdir(&self, path: &str, create_parent: bool) -> Result<FileSummary> {
        paths::require_absolute(path)?;

        self.with_endpoints("mkdirs", |conn| {
            let request = MkdirsRequestProto {
                src: String::from(path),
                masked: FsPermissionProto {
                    perm: DIRECTORY_PERMISSIONS,
                },
                create_parent,
            };
            let response: MkdirsResponseProto = self.client_engine.call(conn, None, &request)?;
            if !response.result {
                return Err(DfsError::infrastructure(format!(
                    "directory creation failed for path: {}",
                    path
                )));
            }

            // Fetch the created directory's metadata on the same connection.
            let info_request = GetFileInfoRequestProto {
                src: String::from(path),
            };
            let info: GetFileInfoResponseProto =
                self.client_engine.call(conn, None, &info_request)?;
            match info.fs {
                Some(fs) => Ok(file_summary_from_proto(fs, path)),
                None => Err(DfsError::infrastructure(format!(
                    "created directory not found: {}",
                    path
                ))),
            }
        })
    }

    /// Allocates a new file entry. No blocks are assigned until `add_block`.
    pub fn create(
        &self,
        path: &str,
        create_parent: bool,
        replication: u32,
        block_size: u64,
    ) -> Result<FileSummary> {
        paths::require_absolute(path)?;

        self.with_endpoints("create", |conn| {
            let request = CreateRequestProto {
                src: String::from(path),
                masked: FsPermissionProto {
                    perm: FILE_PERMISSIONS,
                },
                client_name: self.client_name.clone(),
                create_flag: CreateFlagProto::Create as u32,
                create_parent,
                replication,
                block_size,
            };
            let response: CreateResponseProto = self.client_engine.call(conn, None, &request)?;
            match response.fs {
                Some(fs) => Ok(file_summary_from_proto(fs, path)),
                None => Err(DfsError::infrastructure(format!(
                    "create returned no file status for path: {}",
                    path
                ))),
            }
        })
    }

    /// Asks the coordinator for the file's next block and returns the
    /// updated summary with the new block appended. When the file already
    /// has blocks, the tail block's descriptor (with the client's running
    /// byte count) is sent as `previous`, which closes it at that length.
    pub fn add_block(&self, target: &FileSummary) -> Result<FileSummary> {
        self.with_endpoints("addBlock", |conn| {
            let request = AddBlockRequestProto {
                src: target.path.clone(),
                client_name: self.client_name.clone(),
                previous: target.last_block().map(extended_block_from_location),
                file_id: Some(target.file_id),
            };
            let response: AddBlockResponseProto = self.client_engine.call(conn, None, &request)?;

            let mut updated = target.clone();
            updated
                .block_locations
                .get_or_insert_with(Vec::new)
                .push(block_location_from_proto(response.block));
            Ok(updated)
        })
    }

    /// Marks the file complete. The tail block's length in `target` is taken
    /// as authoritative and reported to the coordinator.
    pub fn complete(&self, target: &FileSummary) -> Result<bool> {
        self.with_endpoints("complete", |conn| {
            let request = CompleteRequestProto {
                src: target.path.clone(),
                client_name: self.client_name.clone(),
                last: target.last_block().map(extended_block_from_location),
                file_id: Some(target.file_id),
            };
            let response: CompleteResponseProto =
                self.client_engine.call(conn, None, &request)?;
            Ok(response.result)
        })
    }

    /// Deletes a file or an empty directory. Non-recursive: a non-empty
    /// directory is a failure.
    pub fn delete(&self, path: &str) -> Result<()> {
        paths::require_absolute(path)?;

        self.with_endpoints("delete", |conn| {
            let request = DeleteRequestProto {
                src: String::from(path),
                recursive: false,
            };
            let response: DeleteResponseProto = self.client_engine.call(conn, None, &request)?;
            if !response.result {
                return Err(DfsError::infrastructure(format!(
                    "delete failed for path: {}",
                    path
                )));
            }
            Ok(())
        })
    }

    /// Runs an operation against each configured endpoint in order until one
    /// succeeds. `NotFound` is a definitive answer and is never retried; any
    /// other failure moves on, and the final failure wraps the last error.
    fn with_endpoints<T>(
        &self,
        context: &str,
        f: impl Fn(&NameNodeConnection) -> Result<T>,
    ) -> Result<T> {
        let mut last_err = None;
        for endpoint in &self.endpoints {
            let attempt = NameNodeConnection::connect(endpoint, &self.config, &self.client_id)
                .and_then(|conn| f(&conn));
            match attempt {
                Ok(value) => return Ok(value),
                Err(e @ DfsError::NotFound(_)) => return Err(e),
                Err(e) => {
                    warn!(
                        self.log,
                        "coordinator operation failed, trying next endpoint";
                        "op" => context,
                        "endpoint" => %endpoint,
                        "err" => %e
                    );
                    last_err = Some(e);
                }
            }
        }

        Err(match last_err {
            Some(cause) => DfsError::infrastructure_with(
                format!("{} failed on every configured coordinator", context),
                cause,
            ),
            None => DfsError::infrastructure(format!(
                "{} failed: no coordinator endpoints configured",
                context
            )),
        })
    }
}

fn epoch_millis(millis: u64) -> SystemTime {
    UNIX_EPOCH + Duration::from_millis(millis)
}

fn file_summary_from_proto(status: HdfsFileStatusProto, requested_path: &str) -> FileSummary {
    let file_type = match FileTypeProto::try_from(status.file_type) {
        Ok(FileTypeProto::IsDir) => FileType::Directory,
        Ok(FileTypeProto::IsSymlink) => FileType::Symlink,
        _ => FileType::File,
    };

    FileSummary {
        file_type,
        name: String::from(paths::basename(requested_path)),
        path: String::from(requested_path),
        length: status.length,
        permissions: status.permission.perm & 0o777,
        owner: status.owner,
        group: status.group,
        modification_time: epoch_millis(status.modification_time),
        access_time: epoch_millis(status.access_time),
        symlink_target: status
            .symlink
            .map(|s| String::from_utf8_lossy(&s).into_owned()),
        block_replication: status.block_replication.unwrap_or(0),
        block_size: status.blocksize.unwrap_or(0),
        file_id: status.file_id.unwrap_or(0),
        children_count: status.children_num.unwrap_or(-1),
        storage_policy: status.storage_policy.unwrap_or(0),
        flags: status.flags.unwrap_or(0),
        namespace: status.namespace,
        block_locations: status
            .locations
            .map(|locs| locs.blocks.into_iter().map(block_location_from_proto).collect()),
    }
}

fn block_location_from_proto(located: LocatedBlockProto) -> BlockLocation {
    let replicas = located
        .locs
        .into_iter()
        .map(|node| ReplicaLocation {
            host: node.id.host_name,
            xfer_port: node.id.xfer_port as u16,
            uuid: node.id.datanode_uuid,
            topology: node.location,
        })
        .collect();

    BlockLocation {
        offset: located.offset,
        length: located.b.num_bytes.unwrap_or(0),
        pool_id: located.b.pool_id,
        block_id: located.b.block_id,
        generation_stamp: located.b.generation_stamp,
        replicas,
    }
}

fn extended_block_from_location(block: &BlockLocation) -> ExtendedBlockProto {
    ExtendedBlockProto {
        pool_id: block.pool_id.clone(),
        block_id: block.block_id,
        generation_stamp: block.generation_stamp,
        num_bytes: Some(block.length),
    }
}
