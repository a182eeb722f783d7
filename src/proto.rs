// Copyright 2021 Joyent, Inc.

//! Hand-maintained protocol buffer definitions for the subset of the wire
//! protocol this crate speaks. Message names, field tags, and
//! required/optional markers mirror the reference server's .proto files and
//! must not change; fields the client neither sends nor reads are omitted,
//! which is wire-compatible because unknown fields are skipped on decode.

/// Messages shared by every RPC connection: the per-call headers and the
/// connection context exchanged during the handshake.
pub mod common {
    /// Kind of RPC traffic carried on a connection.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum RpcKindProto {
        RpcBuiltin = 0,
        RpcWritable = 1,
        RpcProtocolBuffer = 2,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct RpcRequestHeaderProto {
        #[prost(enumeration = "RpcKindProto", optional, tag = "1")]
        pub rpc_kind: ::core::option::Option<i32>,
        #[prost(enumeration = "rpc_request_header_proto::OperationProto", optional, tag = "2")]
        pub rpc_op: ::core::option::Option<i32>,
        /// Sequentially allocated; the connection context uses -3.
        #[prost(sint32, required, tag = "3")]
        pub call_id: i32,
        /// 16-byte client identifier, stable for the client's lifetime.
        #[prost(bytes = "vec", required, tag = "4")]
        pub client_id: ::prost::alloc::vec::Vec<u8>,
        #[prost(sint32, optional, tag = "5", default = "-1")]
        pub retry_count: ::core::option::Option<i32>,
    }

    pub mod rpc_request_header_proto {
        #[derive(
            Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration,
        )]
        #[repr(i32)]
        pub enum OperationProto {
            /// The final RPC packet of a call.
            RpcFinalPacket = 0,
            RpcContinuationPacket = 1,
            RpcCloseConnection = 2,
        }
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct RpcResponseHeaderProto {
        #[prost(uint32, required, tag = "1")]
        pub call_id: u32,
        #[prost(enumeration = "rpc_response_header_proto::RpcStatusProto", required, tag = "2")]
        pub status: i32,
        #[prost(uint32, optional, tag = "3")]
        pub server_ipc_version_num: ::core::option::Option<u32>,
        /// Exception class name on the server, present on failure.
        #[prost(string, optional, tag = "4")]
        pub exception_class_name: ::core::option::Option<::prost::alloc::string::String>,
        #[prost(string, optional, tag = "5")]
        pub error_msg: ::core::option::Option<::prost::alloc::string::String>,
        #[prost(bytes = "vec", optional, tag = "7")]
        pub client_id: ::core::option::Option<::prost::alloc::vec::Vec<u8>>,
        #[prost(sint32, optional, tag = "8", default = "-1")]
        pub retry_count: ::core::option::Option<i32>,
    }

    pub mod rpc_response_header_proto {
        #[derive(
            Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration,
        )]
        #[repr(i32)]
        pub enum RpcStatusProto {
            Success = 0,
            Error = 1,
            Fatal = 2,
        }
    }

    /// Second header of every call: names the method and declaring protocol.
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct RequestHeaderProto {
        #[prost(string, required, tag = "1")]
        pub method_name: ::prost::alloc::string::String,
        #[prost(string, required, tag = "2")]
        pub declaring_class_protocol_name: ::prost::alloc::string::String,
        #[prost(uint64, required, tag = "3")]
        pub client_protocol_version: u64,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct UserInformationProto {
        #[prost(string, optional, tag = "1")]
        pub effective_user: ::core::option::Option<::prost::alloc::string::String>,
        #[prost(string, optional, tag = "2")]
        pub real_user: ::core::option::Option<::prost::alloc::string::String>,
    }

    /// Sent once after the handshake bytes, framed like a call with the
    /// reserved context call id.
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct IpcConnectionContextProto {
        #[prost(message, optional, tag = "2")]
        pub user_info: ::core::option::Option<UserInformationProto>,
        #[prost(string, optional, tag = "3")]
        pub protocol: ::core::option::Option<::prost::alloc::string::String>,
    }

    /// Block access token. Always empty under simple authentication, but the
    /// located-block message requires its presence.
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct TokenProto {
        #[prost(bytes = "vec", required, tag = "1")]
        pub identifier: ::prost::alloc::vec::Vec<u8>,
        #[prost(bytes = "vec", required, tag = "2")]
        pub password: ::prost::alloc::vec::Vec<u8>,
        #[prost(string, required, tag = "3")]
        pub kind: ::prost::alloc::string::String,
        #[prost(string, required, tag = "4")]
        pub service: ::prost::alloc::string::String,
    }
}

/// File-system metadata messages and the coordinator protocol's
/// request/response pairs.
pub mod hdfs {
    /// Identifies a block uniquely across the cluster.
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct ExtendedBlockProto {
        #[prost(string, required, tag = "1")]
        pub pool_id: ::prost::alloc::string::String,
        #[prost(uint64, required, tag = "2")]
        pub block_id: u64,
        #[prost(uint64, required, tag = "3")]
        pub generation_stamp: u64,
        #[prost(uint64, optional, tag = "4", default = "0")]
        pub num_bytes: ::core::option::Option<u64>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct DatanodeIdProto {
        #[prost(string, required, tag = "1")]
        pub ip_addr: ::prost::alloc::string::String,
        #[prost(string, required, tag = "2")]
        pub host_name: ::prost::alloc::string::String,
        #[prost(string, required, tag = "3")]
        pub datanode_uuid: ::prost::alloc::string::String,
        /// Data streaming port.
        #[prost(uint32, required, tag = "4")]
        pub xfer_port: u32,
        #[prost(uint32, required, tag = "5")]
        pub info_port: u32,
        #[prost(uint32, required, tag = "6")]
        pub ipc_port: u32,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct DatanodeInfoProto {
        #[prost(message, required, tag = "1")]
        pub id: DatanodeIdProto,
        /// Network topology path.
        #[prost(string, optional, tag = "8")]
        pub location: ::core::option::Option<::prost::alloc::string::String>,
    }

    /// Only the 9 low permission bits are meaningful.
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct FsPermissionProto {
        #[prost(uint32, required, tag = "1")]
        pub perm: u32,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct LocatedBlockProto {
        #[prost(message, required, tag = "1")]
        pub b: ExtendedBlockProto,
        /// Offset of the first byte of the block within the file.
        #[prost(uint64, required, tag = "2")]
        pub offset: u64,
        /// Replica locations ordered by proximity to the client.
        #[prost(message, repeated, tag = "3")]
        pub locs: ::prost::alloc::vec::Vec<DatanodeInfoProto>,
        #[prost(bool, required, tag = "4")]
        pub corrupt: bool,
        #[prost(message, required, tag = "5")]
        pub block_token: super::common::TokenProto,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct LocatedBlocksProto {
        #[prost(uint64, required, tag = "1")]
        pub file_length: u64,
        #[prost(message, repeated, tag = "2")]
        pub blocks: ::prost::alloc::vec::Vec<LocatedBlockProto>,
        #[prost(bool, required, tag = "3")]
        pub under_construction: bool,
        #[prost(message, optional, tag = "4")]
        pub last_block: ::core::option::Option<LocatedBlockProto>,
        #[prost(bool, required, tag = "5")]
        pub is_last_block_complete: bool,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct HdfsFileStatusProto {
        #[prost(enumeration = "hdfs_file_status_proto::FileType", required, tag = "1")]
        pub file_type: i32,
        /// Local name of the inode; empty when the status describes the
        /// requested path itself.
        #[prost(bytes = "vec", required, tag = "2")]
        pub path: ::prost::alloc::vec::Vec<u8>,
        #[prost(uint64, required, tag = "3")]
        pub length: u64,
        #[prost(message, required, tag = "4")]
        pub permission: FsPermissionProto,
        #[prost(string, required, tag = "5")]
        pub owner: ::prost::alloc::string::String,
        #[prost(string, required, tag = "6")]
        pub group: ::prost::alloc::string::String,
        #[prost(uint64, required, tag = "7")]
        pub modification_time: u64,
        #[prost(uint64, required, tag = "8")]
        pub access_time: u64,
        #[prost(bytes = "vec", optional, tag = "9")]
        pub symlink: ::core::option::Option<::prost::alloc::vec::Vec<u8>>,
        #[prost(uint32, optional, tag = "10", default = "0")]
        pub block_replication: ::core::option::Option<u32>,
        #[prost(uint64, optional, tag = "11", default = "0")]
        pub blocksize: ::core::option::Option<u64>,
        /// Supplied only when the client asked for locations.
        #[prost(message, optional, tag = "12")]
        pub locations: ::core::option::Option<LocatedBlocksProto>,
        #[prost(uint64, optional, tag = "13", default = "0")]
        pub file_id: ::core::option::Option<u64>,
        #[prost(int32, optional, tag = "14", default = "-1")]
        pub children_num: ::core::option::Option<i32>,
        #[prost(uint32, optional, tag = "16", default = "0")]
        pub storage_policy: ::core::option::Option<u32>,
        #[prost(uint32, optional, tag = "18", default = "0")]
        pub flags: ::core::option::Option<u32>,
        #[prost(string, optional, tag = "19")]
        pub namespace: ::core::option::Option<::prost::alloc::string::String>,
    }

    pub mod hdfs_file_status_proto {
        #[derive(
            Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration,
        )]
        #[repr(i32)]
        pub enum FileType {
            IsDir = 1,
            IsFile = 2,
            IsSymlink = 3,
        }
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct DirectoryListingProto {
        #[prost(message, repeated, tag = "1")]
        pub partial_listing: ::prost::alloc::vec::Vec<HdfsFileStatusProto>,
        #[prost(uint32, required, tag = "2")]
        pub remaining_entries: u32,
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum CreateFlagProto {
        Create = 1,
        Overwrite = 2,
        Append = 4,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct StorageInfoProto {
        #[prost(uint32, required, tag = "1")]
        pub layout_version: u32,
        #[prost(uint32, required, tag = "2")]
        pub namespace_id: u32,
        #[prost(string, required, tag = "3")]
        pub cluster_id: ::prost::alloc::string::String,
        #[prost(uint64, required, tag = "4")]
        pub c_time: u64,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct NamespaceInfoProto {
        #[prost(string, required, tag = "1")]
        pub build_version: ::prost::alloc::string::String,
        #[prost(uint32, required, tag = "2")]
        pub unused: u32,
        #[prost(string, required, tag = "3")]
        pub block_pool_id: ::prost::alloc::string::String,
        #[prost(message, required, tag = "4")]
        pub storage_info: StorageInfoProto,
        #[prost(string, required, tag = "5")]
        pub software_version: ::prost::alloc::string::String,
        #[prost(uint64, optional, tag = "6", default = "0")]
        pub capabilities: ::core::option::Option<u64>,
    }

    // Coordinator protocol request/response pairs. The method name on the
    // wire derives from the request type name.

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct GetListingRequestProto {
        #[prost(string, required, tag = "1")]
        pub src: ::prost::alloc::string::String,
        /// Name to resume after; empty for the first page.
        #[prost(bytes = "vec", required, tag = "2")]
        pub start_after: ::prost::alloc::vec::Vec<u8>,
        #[prost(bool, required, tag = "3")]
        pub need_location: bool,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct GetListingResponseProto {
        /// Absent when the requested path does not exist.
        #[prost(message, optional, tag = "1")]
        pub dir_list: ::core::option::Option<DirectoryListingProto>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct GetFileInfoRequestProto {
        #[prost(string, required, tag = "1")]
        pub src: ::prost::alloc::string::String,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct GetFileInfoResponseProto {
        #[prost(message, optional, tag = "1")]
        pub fs: ::core::option::Option<HdfsFileStatusProto>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct GetLocatedFileInfoRequestProto {
        #[prost(string, optional, tag = "1")]
        pub src: ::core::option::Option<::prost::alloc::string::String>,
        #[prost(bool, optional, tag = "2", default = "false")]
        pub need_block_token: ::core::option::Option<bool>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct GetLocatedFileInfoResponseProto {
        #[prost(message, optional, tag = "1")]
        pub fs: ::core::option::Option<HdfsFileStatusProto>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct MkdirsRequestProto {
        #[prost(string, required, tag = "1")]
        pub src: ::prost::alloc::string::String,
        #[prost(message, required, tag = "2")]
        pub masked: FsPermissionProto,
        #[prost(bool, required, tag = "3")]
        pub create_parent: bool,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct MkdirsResponseProto {
        #[prost(bool, required, tag = "1")]
        pub result: bool,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct CreateRequestProto {
        #[prost(string, required, tag = "1")]
        pub src: ::prost::alloc::string::String,
        #[prost(message, required, tag = "2")]
        pub masked: FsPermissionProto,
        #[prost(string, required, tag = "3")]
        pub client_name: ::prost::alloc::string::String,
        /// Bitwise union of `CreateFlagProto` values.
        #[prost(uint32, required, tag = "4")]
        pub create_flag: u32,
        #[prost(bool, required, tag = "5")]
        pub create_parent: bool,
        #[prost(uint32, required, tag = "6")]
        pub replication: u32,
        #[prost(uint64, required, tag = "7")]
        pub block_size: u64,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct CreateResponseProto {
        #[prost(message, optional, tag = "1")]
        pub fs: ::core::option::Option<HdfsFileStatusProto>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct AddBlockRequestProto {
        #[prost(string, required, tag = "1")]
        pub src: ::prost::alloc::string::String,
        #[prost(string, required, tag = "2")]
        pub client_name: ::prost::alloc::string::String,
        /// The tail block being closed, with its actual byte count. Absent
        /// when allocating the file's first block.
        #[prost(message, optional, tag = "3")]
        pub previous: ::core::option::Option<ExtendedBlockProto>,
        #[prost(uint64, optional, tag = "5", default = "0")]
        pub file_id: ::core::option::Option<u64>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct AddBlockResponseProto {
        #[prost(message, required, tag = "1")]
        pub block: LocatedBlockProto,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct CompleteRequestProto {
        #[prost(string, required, tag = "1")]
        pub src: ::prost::alloc::string::String,
        #[prost(string, required, tag = "2")]
        pub client_name: ::prost::alloc::string::String,
        /// The final block with its authoritative length.
        #[prost(message, optional, tag = "3")]
        pub last: ::core::option::Option<ExtendedBlockProto>,
        #[prost(uint64, optional, tag = "4", default = "0")]
        pub file_id: ::core::option::Option<u64>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct CompleteResponseProto {
        #[prost(bool, required, tag = "1")]
        pub result: bool,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct DeleteRequestProto {
        #[prost(string, required, tag = "1")]
        pub src: ::prost::alloc::string::String,
        #[prost(bool, required, tag = "2")]
        pub recursive: bool,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct DeleteResponseProto {
        #[prost(bool, required, tag = "1")]
        pub result: bool,
    }

    /// The one internal-protocol call. The method name on the wire is the
    /// literal `versionRequest`.
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct VersionRequestProto {}

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct VersionResponseProto {
        #[prost(message, required, tag = "1")]
        pub info: NamespaceInfoProto,
    }
}

/// Messages for the storage-node data-transfer protocol.
pub mod datatransfer {
    /// Result of a data-transfer operation or of one pipeline hop's ack.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum Status {
        Success = 0,
        Error = 1,
        ErrorChecksum = 2,
        ErrorInvalid = 3,
        ErrorExists = 4,
        ErrorAccessToken = 5,
        ChecksumOk = 6,
        ErrorUnsupported = 7,
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum ChecksumTypeProto {
        ChecksumNull = 0,
        ChecksumCrc32 = 1,
        ChecksumCrc32c = 2,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct BaseHeaderProto {
        #[prost(message, required, tag = "1")]
        pub block: super::hdfs::ExtendedBlockProto,
        /// Omitted under simple authentication.
        #[prost(message, optional, tag = "2")]
        pub token: ::core::option::Option<super::common::TokenProto>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct ClientOperationHeaderProto {
        #[prost(message, required, tag = "1")]
        pub base_header: BaseHeaderProto,
        #[prost(string, required, tag = "2")]
        pub client_name: ::prost::alloc::string::String,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct CachingStrategyProto {
        #[prost(bool, optional, tag = "1")]
        pub drop_behind: ::core::option::Option<bool>,
        #[prost(int64, optional, tag = "2")]
        pub readahead: ::core::option::Option<i64>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct ChecksumProto {
        #[prost(enumeration = "ChecksumTypeProto", required, tag = "1")]
        pub r#type: i32,
        #[prost(uint32, required, tag = "2")]
        pub bytes_per_checksum: u32,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct OpReadBlockProto {
        #[prost(message, required, tag = "1")]
        pub header: ClientOperationHeaderProto,
        #[prost(uint64, required, tag = "2")]
        pub offset: u64,
        #[prost(uint64, required, tag = "3")]
        pub len: u64,
        #[prost(bool, optional, tag = "4", default = "true")]
        pub send_checksums: ::core::option::Option<bool>,
        #[prost(message, optional, tag = "5")]
        pub caching_strategy: ::core::option::Option<CachingStrategyProto>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct OpWriteBlockProto {
        #[prost(message, required, tag = "1")]
        pub header: ClientOperationHeaderProto,
        /// Downstream pipeline targets; empty when the client talks only to
        /// the head replica.
        #[prost(message, repeated, tag = "2")]
        pub targets: ::prost::alloc::vec::Vec<super::hdfs::DatanodeInfoProto>,
        #[prost(
            enumeration = "op_write_block_proto::BlockConstructionStage",
            required,
            tag = "4"
        )]
        pub stage: i32,
        #[prost(uint32, required, tag = "5")]
        pub pipeline_size: u32,
        #[prost(uint64, required, tag = "6")]
        pub min_bytes_rcvd: u64,
        #[prost(uint64, required, tag = "7")]
        pub max_bytes_rcvd: u64,
        #[prost(uint64, required, tag = "8")]
        pub latest_generation_stamp: u64,
        #[prost(message, required, tag = "9")]
        pub requested_checksum: ChecksumProto,
        #[prost(message, optional, tag = "10")]
        pub caching_strategy: ::core::option::Option<CachingStrategyProto>,
    }

    pub mod op_write_block_proto {
        #[derive(
            Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration,
        )]
        #[repr(i32)]
        pub enum BlockConstructionStage {
            PipelineSetupAppend = 0,
            PipelineSetupAppendRecovery = 1,
            DataStreaming = 2,
            PipelineSetupStreamingRecovery = 3,
            PipelineClose = 4,
            PipelineCloseRecovery = 5,
            /// A new block being written for the first time.
            PipelineSetupCreate = 6,
            TransferRbw = 7,
            TransferFinalized = 8,
        }
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct BlockOpResponseProto {
        #[prost(enumeration = "Status", required, tag = "1")]
        pub status: i32,
        #[prost(string, optional, tag = "2")]
        pub first_bad_link: ::core::option::Option<::prost::alloc::string::String>,
        #[prost(string, optional, tag = "5")]
        pub message: ::core::option::Option<::prost::alloc::string::String>,
    }

    /// Per-packet header. Fixed-width encodings are deliberate: the
    /// reference implementation sizes packet buffers from this header's
    /// serialized length.
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct PacketHeaderProto {
        #[prost(sfixed64, required, tag = "1")]
        pub offset_in_block: i64,
        #[prost(sfixed64, required, tag = "2")]
        pub seqno: i64,
        #[prost(bool, required, tag = "3")]
        pub last_packet_in_block: bool,
        #[prost(sfixed32, required, tag = "4")]
        pub data_len: i32,
        #[prost(bool, optional, tag = "5", default = "false")]
        pub sync_block: ::core::option::Option<bool>,
    }

    /// One acknowledgement per data packet; `reply` holds one status per
    /// pipeline hop.
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct PipelineAckProto {
        #[prost(sint64, required, tag = "1")]
        pub seqno: i64,
        #[prost(enumeration = "Status", repeated, packed = "false", tag = "2")]
        pub reply: ::prost::alloc::vec::Vec<i32>,
        #[prost(uint64, optional, tag = "3", default = "0")]
        pub downstream_ack_time_nanos: ::core::option::Option<u64>,
    }
}
