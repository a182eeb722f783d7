// Copyright 2021 Joyent, Inc.

//! dfs-client: a minimal client for HDFS-lineage distributed file systems
//!
//! This crate speaks a distributed block-oriented file system's two native
//! wire protocols directly, without the reference implementation's runtime
//! libraries: a metadata RPC to the coordinator node (NameNode) and a
//! binary data-transfer protocol to the storage nodes (DataNodes).
//! It can list, create, read, write, and delete files, and fan bulk
//! transfers across a worker pool.
//!
//! Protocol overview
//!
//! ## Coordinator RPC
//!
//! A coordinator connection is established against a `dfs://host:port`
//! endpoint and opens with a fixed preamble followed by a synthetic
//! connection-context call:
//!
//! ```text
//!   "hrpc" | 0x09 | 0x00 | 0x00 | LEN (u32 BE) | ctx-header ‖ ctx
//! ```
//!
//! * `"hrpc"`    4 ASCII magic bytes.
//!
//! * `0x09`      protocol version.
//!
//! * `0x00`      service class: protocol-buffer framing.
//!
//! * `0x00`      auth selector: simple authentication.
//!
//! * `ctx-header` a request header carrying the reserved call id `-3` and
//!   retry count `-1`; `ctx` names the user identity and target protocol.
//!   Both are varint-length-delimited protocol buffers and `LEN` counts
//!   their concatenation.
//!
//! Every subsequent call is one frame in each direction on that socket:
//!
//! ```text
//!   request:  LEN (u32 BE) | rpc-header ‖ request-header ‖ body
//!   response: LEN (u32 BE) | response-header ‖ body
//! ```
//!
//! The rpc-header carries a strictly increasing call id and the client's
//! 16-byte identifier; the request-header names the method and its
//! declaring protocol; the body is the typed request. Responses are matched
//! by position (the protocol is strictly request/response) and a
//! non-success response status surfaces the server's exception class and
//! message. This crate opens one connection per logical operation.
//!
//! ## Storage-node data transfer
//!
//! The data path uses a different framing with no handshake. A request is
//!
//! ```text
//!   VERSION (u16 BE, 28) | OP (u8) | op-header (delimited protobuf)
//! ```
//!
//! with `OP` 0x51 for a block read and 0x50 for a block write, answered by
//! one delimited response message. Block contents then travel as packets:
//!
//! ```text
//!   PLEN (u32 BE) | HLEN (u16 BE) | HEADER | CHECKSUMS | DATA
//! ```
//!
//! `PLEN` counts its own four bytes plus CHECKSUMS plus DATA but *not* the
//! header fields. That is an inherited quirk of the protocol, and the
//! single largest source of interop bugs. On a write, each packet is acknowledged
//! before the next is sent, and a block always ends with an empty packet
//! flagged last. See [`datatransfer`] for the details.
//!
//! ## Putting it together
//!
//! [`namenode::NameNodeClient`] exposes the metadata operations,
//! [`datanode::DataNodeClient`] the block operations, and
//! [`client::DfsClient`] stitches them into a file-system-like surface
//! (`read_all_bytes`, `copy_from_source`, `delete_if_exists`, …).
//! [`transfer::TransferManager`] maps many file transfers onto a fixed
//! worker pool.

#![allow(missing_docs)]

pub mod client;
pub mod connection;
pub mod datanode;
pub mod datatransfer;
pub mod error;
pub mod namenode;
pub mod paths;
pub mod proto;
pub mod rpc;
pub mod transfer;

pub use client::{DfsClient, DfsClientOptions};
pub use connection::{ConnectionConfig, NameNodeEndpoint, UserInformation};
pub use datanode::{DataNodeClient, DataNodeClientProvider, DataNodeConfig};
pub use error::{DfsError, Result};
pub use namenode::{
    BlockLocation, FileSummary, FileType, NameNodeClient, ReplicaLocation, ServerInfo,
};
pub use transfer::{
    DownloadRequest, FileTransferResult, TransferHandle, TransferListener, TransferManager,
    TransferSummary, UploadRequest,
};
