// Copyright 2021 Joyent, Inc.

//! An in-process mock cluster for integration tests: one coordinator and a
//! handful of storage nodes speaking the real wire protocols over loopback
//! TCP. The storage node re-parses data packets with its own decoder and
//! verifies checksums, sequence numbers, and the packet-length arithmetic
//! independently of the crate's encoder.

use std::collections::{BTreeMap, HashMap};
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;

use byteorder::{BigEndian, ReadBytesExt};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use num_traits::FromPrimitive;
use prost::Message;

use dfs_client::datatransfer::{read_delimited, Op, DATA_TRANSFER_VERSION};
use dfs_client::proto::common::{
    rpc_response_header_proto::RpcStatusProto, RequestHeaderProto, RpcRequestHeaderProto,
    RpcResponseHeaderProto, TokenProto,
};
use dfs_client::proto::datatransfer::{
    BlockOpResponseProto, OpReadBlockProto, OpWriteBlockProto, PacketHeaderProto,
    PipelineAckProto, Status,
};
use dfs_client::proto::hdfs::{
    hdfs_file_status_proto::FileType as FileTypeProto, AddBlockRequestProto,
    AddBlockResponseProto, CompleteRequestProto, CompleteResponseProto, CreateRequestProto,
    CreateResponseProto, DatanodeIdProto, DatanodeInfoProto, DeleteRequestProto,
    DeleteResponseProto, DirectoryListingProto, ExtendedBlockProto, FsPermissionProto,
    GetFileInfoRequestProto, GetFileInfoResponseProto, GetListingRequestProto,
    GetListingResponseProto, GetLocatedFileInfoRequestProto, GetLocatedFileInfoResponseProto,
    HdfsFileStatusProto, LocatedBlockProto, LocatedBlocksProto, MkdirsRequestProto,
    MkdirsResponseProto, NamespaceInfoProto, StorageInfoProto, VersionResponseProto,
};

const LISTING_PAGE_SIZE: usize = 1000;
const BLOCK_POOL_ID: &str = "BP-mock-127.0.0.1-1700000000000";
const MOCK_TIME_MILLIS: u64 = 1_700_000_000_000;
const GENERATION_STAMP: u64 = 1001;

#[derive(Clone)]
struct BlockMeta {
    id: u64,
    gen: u64,
    len: u64,
}

#[derive(Clone)]
struct FileEntry {
    file_id: u64,
    blocks: Vec<BlockMeta>,
    complete: bool,
}

#[derive(Clone)]
enum Entry {
    Directory,
    File(FileEntry),
}

#[derive(Clone)]
struct DataNodeEntry {
    host: String,
    port: u16,
    uuid: String,
}

struct Namespace {
    entries: BTreeMap<String, Entry>,
    datanodes: Vec<DataNodeEntry>,
    next_block_id: u64,
    next_file_id: u64,
}

impl Namespace {
    fn new() -> Namespace {
        let mut entries = BTreeMap::new();
        entries.insert(String::from("/"), Entry::Directory);
        Namespace {
            entries,
            datanodes: Vec::new(),
            next_block_id: 1073741825,
            next_file_id: 16385,
        }
    }

    fn children_of<'a>(&'a self, dir: &'a str) -> impl Iterator<Item = (&'a String, &'a Entry)> {
        self.entries
            .iter()
            .filter(move |(path, _)| path.as_str() != "/" && parent_of(path) == dir)
    }
}

#[derive(Default)]
struct BlockStore {
    data: Mutex<HashMap<u64, Vec<u8>>>,
    packet_counts: Mutex<HashMap<u64, u64>>,
}

/// One coordinator plus `datanode_count` storage nodes on loopback ports.
pub struct MockCluster {
    namespace: Arc<Mutex<Namespace>>,
    store: Arc<BlockStore>,
    nn_port: u16,
}

impl MockCluster {
    pub fn start(datanode_count: usize) -> MockCluster {
        MockCluster::start_with_hostname(datanode_count, "127.0.0.1")
    }

    /// Starts a cluster whose metadata reports the given hostname for every
    /// storage node. The nodes still listen on loopback, so an unresolvable
    /// hostname here exercises the client's local-mode rewriting.
    pub fn start_with_hostname(datanode_count: usize, hostname: &str) -> MockCluster {
        let namespace = Arc::new(Mutex::new(Namespace::new()));
        let store = Arc::new(BlockStore::default());

        for n in 0..datanode_count {
            let listener = TcpListener::bind("127.0.0.1:0").expect("bind datanode listener");
            let port = listener.local_addr().expect("datanode addr").port();
            namespace.lock().unwrap().datanodes.push(DataNodeEntry {
                host: String::from(hostname),
                port,
                uuid: format!("mock-dn-uuid-{}", n),
            });

            let store = Arc::clone(&store);
            thread::spawn(move || {
                for stream in listener.incoming() {
                    match stream {
                        Ok(stream) => {
                            let store = Arc::clone(&store);
                            thread::spawn(move || {
                                if let Err(e) = handle_datanode_conn(stream, &store) {
                                    eprintln!("mock datanode connection failed: {}", e);
                                }
                            });
                        }
                        Err(_) => break,
                    }
                }
            });
        }

        let listener = TcpListener::bind("127.0.0.1:0").expect("bind namenode listener");
        let nn_port = listener.local_addr().expect("namenode addr").port();
        {
            let namespace = Arc::clone(&namespace);
            thread::spawn(move || {
                for stream in listener.incoming() {
                    match stream {
                        Ok(stream) => {
                            let namespace = Arc::clone(&namespace);
                            thread::spawn(move || {
                                if let Err(e) = handle_namenode_conn(stream, &namespace) {
                                    eprintln!("mock namenode connection failed: {}", e);
                                }
                            });
                        }
                        Err(_) => break,
                    }
                }
            });
        }

        MockCluster {
            namespace,
            store,
            nn_port,
        }
    }

    pub fn endpoint(&self) -> String {
        format!("dfs://127.0.0.1:{}", self.nn_port)
    }

    /// Inserts a complete file directly into the namespace (and its bytes
    /// into the block store), bypassing the wire protocols. Parents are
    /// created as needed.
    pub fn seed_file(&self, path: &str, contents: &[u8]) {
        let mut ns = self.namespace.lock().unwrap();
        ensure_parents(&mut ns, path);

        let mut blocks = Vec::new();
        if !contents.is_empty() {
            let id = ns.next_block_id;
            ns.next_block_id += 1;
            blocks.push(BlockMeta {
                id,
                gen: GENERATION_STAMP,
                len: contents.len() as u64,
            });
            self.store
                .data
                .lock()
                .unwrap()
                .insert(id, contents.to_vec());
        }

        let file_id = ns.next_file_id;
        ns.next_file_id += 1;
        ns.entries.insert(
            String::from(path),
            Entry::File(FileEntry {
                file_id,
                blocks,
                complete: true,
            }),
        );
    }

    /// Registers a storage node that accepts no connections as the first
    /// replica of every block, for exercising replica failover.
    pub fn prepend_dead_datanode(&self) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind dead datanode");
        let port = listener.local_addr().expect("dead datanode addr").port();
        drop(listener);
        self.namespace.lock().unwrap().datanodes.insert(
            0,
            DataNodeEntry {
                host: String::from("127.0.0.1"),
                port,
                uuid: String::from("mock-dn-dead"),
            },
        );
    }

    /// The per-block lengths the coordinator holds for a file.
    pub fn block_lengths(&self, path: &str) -> Vec<u64> {
        let ns = self.namespace.lock().unwrap();
        match ns.entries.get(path) {
            Some(Entry::File(file)) => file.blocks.iter().map(|b| b.len).collect(),
            _ => Vec::new(),
        }
    }

    /// Data packets the storage nodes received for each of a file's blocks.
    pub fn packet_counts(&self, path: &str) -> Vec<u64> {
        let ns = self.namespace.lock().unwrap();
        let counts = self.store.packet_counts.lock().unwrap();
        match ns.entries.get(path) {
            Some(Entry::File(file)) => file
                .blocks
                .iter()
                .map(|b| counts.get(&b.id).copied().unwrap_or(0))
                .collect(),
            _ => Vec::new(),
        }
    }
}

fn parent_of(path: &str) -> &str {
    match path.trim_end_matches('/').rfind('/') {
        Some(0) => "/",
        Some(idx) => &path[..idx],
        None => "/",
    }
}

fn ensure_parents(ns: &mut Namespace, path: &str) {
    let mut ancestors = Vec::new();
    let mut current = parent_of(path);
    while current != "/" && !ns.entries.contains_key(current) {
        ancestors.push(String::from(current));
        current = parent_of(current);
    }
    for dir in ancestors.into_iter().rev() {
        ns.entries.insert(dir, Entry::Directory);
    }
}

// ---------------------------------------------------------------------------
// Coordinator side
// ---------------------------------------------------------------------------

fn handle_namenode_conn(
    mut stream: TcpStream,
    namespace: &Mutex<Namespace>,
) -> std::io::Result<()> {
    // Consume and validate the handshake preamble.
    let mut preamble = [0u8; 7];
    stream.read_exact(&mut preamble)?;
    assert_eq!(&preamble[0..4], b"hrpc", "bad connection magic");
    assert_eq!(preamble[4], 9, "bad protocol version");
    assert_eq!(preamble[5], 0, "bad service class");
    assert_eq!(preamble[6], 0, "bad auth selector");

    // Consume the connection-context frame.
    let context_len = stream.read_u32::<BigEndian>()? as usize;
    let mut context = vec![0u8; context_len];
    stream.read_exact(&mut context)?;
    let mut context = Bytes::from(context);
    let context_header = RpcRequestHeaderProto::decode_length_delimited(&mut context)
        .expect("decode context header");
    assert_eq!(context_header.call_id, -3, "bad context call id");

    loop {
        let frame_len = match stream.read_u32::<BigEndian>() {
            Ok(len) => len as usize,
            // Client closed the connection.
            Err(_) => return Ok(()),
        };
        let mut frame = vec![0u8; frame_len];
        stream.read_exact(&mut frame)?;
        let mut frame = Bytes::from(frame);

        let rpc_header = RpcRequestHeaderProto::decode_length_delimited(&mut frame)
            .expect("decode rpc header");
        let request_header = RequestHeaderProto::decode_length_delimited(&mut frame)
            .expect("decode request header");

        let call_id = rpc_header.call_id as u32;
        let reply = dispatch(&request_header.method_name, &mut frame, namespace);
        match reply {
            Ok(body) => send_success(&mut stream, call_id, &body)?,
            Err((class, message)) => send_error(&mut stream, call_id, &class, &message)?,
        }
    }
}

type RpcReply = std::result::Result<Vec<u8>, (String, String)>;

fn dispatch(method: &str, body: &mut Bytes, namespace: &Mutex<Namespace>) -> RpcReply {
    let mut ns = namespace.lock().unwrap();
    match method {
        "getListing" => {
            let request = GetListingRequestProto::decode_length_delimited(body)
                .expect("decode getListing");
            Ok(encode(&get_listing(&ns, &request)))
        }
        "getFileInfo" => {
            let request = GetFileInfoRequestProto::decode_length_delimited(body)
                .expect("decode getFileInfo");
            let fs = ns
                .entries
                .get(&request.src)
                .map(|entry| status_for(&ns, &request.src, entry, false));
            Ok(encode(&GetFileInfoResponseProto { fs }))
        }
        "getLocatedFileInfo" => {
            let request = GetLocatedFileInfoRequestProto::decode_length_delimited(body)
                .expect("decode getLocatedFileInfo");
            let src = request.src.unwrap_or_default();
            let fs = ns
                .entries
                .get(&src)
                .map(|entry| status_for(&ns, &src, entry, true));
            Ok(encode(&GetLocatedFileInfoResponseProto { fs }))
        }
        "mkdirs" => {
            let request =
                MkdirsRequestProto::decode_length_delimited(body).expect("decode mkdirs");
            mkdirs(&mut ns, &request).map(|r| encode(&r))
        }
        "create" => {
            let request =
                CreateRequestProto::decode_length_delimited(body).expect("decode create");
            create(&mut ns, &request).map(|r| encode(&r))
        }
        "addBlock" => {
            let request =
                AddBlockRequestProto::decode_length_delimited(body).expect("decode addBlock");
            add_block(&mut ns, &request).map(|r| encode(&r))
        }
        "complete" => {
            let request =
                CompleteRequestProto::decode_length_delimited(body).expect("decode complete");
            complete(&mut ns, &request).map(|r| encode(&r))
        }
        "delete" => {
            let request =
                DeleteRequestProto::decode_length_delimited(body).expect("decode delete");
            delete(&mut ns, &request).map(|r| encode(&r))
        }
        "versionRequest" => Ok(encode(&VersionResponseProto {
            info: NamespaceInfoProto {
                build_version: String::from("mock-build-3.3.6"),
                unused: 0,
                block_pool_id: String::from(BLOCK_POOL_ID),
                storage_info: StorageInfoProto {
                    layout_version: 66,
                    namespace_id: 42,
                    cluster_id: String::from("CID-mock"),
                    c_time: MOCK_TIME_MILLIS,
                },
                software_version: String::from("3.3.6"),
                capabilities: Some(1),
            },
        })),
        other => Err((
            String::from("java.lang.UnsupportedOperationException"),
            format!("unsupported method: {}", other),
        )),
    }
}

fn get_listing(ns: &Namespace, request: &GetListingRequestProto) -> GetListingResponseProto {
    let entry = match ns.entries.get(&request.src) {
        Some(entry) => entry,
        None => return GetListingResponseProto { dir_list: None },
    };

    match entry {
        // Listing a file yields the file itself with an empty local name.
        Entry::File(_) => GetListingResponseProto {
            dir_list: Some(DirectoryListingProto {
                partial_listing: vec![named_status(ns, "", &request.src, entry, request.need_location)],
                remaining_entries: 0,
            }),
        },
        Entry::Directory => {
            let children: Vec<(&String, &Entry)> = ns.children_of(&request.src).collect();
            let remaining = children.len().saturating_sub(LISTING_PAGE_SIZE);
            let partial_listing = children
                .into_iter()
                .take(LISTING_PAGE_SIZE)
                .map(|(path, child)| {
                    let name = path.rsplit('/').next().unwrap_or("");
                    named_status(ns, name, path, child, request.need_location)
                })
                .collect();
            GetListingResponseProto {
                dir_list: Some(DirectoryListingProto {
                    partial_listing,
                    remaining_entries: remaining as u32,
                }),
            }
        }
    }
}

fn mkdirs(
    ns: &mut Namespace,
    request: &MkdirsRequestProto,
) -> std::result::Result<MkdirsResponseProto, (String, String)> {
    match ns.entries.get(&request.src) {
        Some(Entry::Directory) => return Ok(MkdirsResponseProto { result: true }),
        Some(Entry::File(_)) => {
            return Err((
                String::from("org.apache.hadoop.fs.FileAlreadyExistsException"),
                format!("Path is a file: {}", request.src),
            ))
        }
        None => {}
    }

    let parent = parent_of(&request.src);
    if !ns.entries.contains_key(parent) {
        if !request.create_parent {
            return Err((
                String::from("java.io.FileNotFoundException"),
                format!("Parent directory doesn't exist: {}", parent),
            ));
        }
        ensure_parents(ns, &request.src);
    }

    ns.entries
        .insert(request.src.clone(), Entry::Directory);
    Ok(MkdirsResponseProto { result: true })
}

fn create(
    ns: &mut Namespace,
    request: &CreateRequestProto,
) -> std::result::Result<CreateResponseProto, (String, String)> {
    if ns.entries.contains_key(&request.src) {
        return Err((
            String::from("org.apache.hadoop.fs.FileAlreadyExistsException"),
            format!("{} already exists", request.src),
        ));
    }

    let parent = parent_of(&request.src);
    if !ns.entries.contains_key(parent) {
        if !request.create_parent {
            return Err((
                String::from("java.io.FileNotFoundException"),
                format!("Parent directory doesn't exist: {}", parent),
            ));
        }
        ensure_parents(ns, &request.src);
    }

    let file_id = ns.next_file_id;
    ns.next_file_id += 1;
    let entry = Entry::File(FileEntry {
        file_id,
        blocks: Vec::new(),
        complete: false,
    });
    ns.entries.insert(request.src.clone(), entry.clone());
    Ok(CreateResponseProto {
        fs: Some(status_for(ns, &request.src, &entry, false)),
    })
}

fn add_block(
    ns: &mut Namespace,
    request: &AddBlockRequestProto,
) -> std::result::Result<AddBlockResponseProto, (String, String)> {
    let datanodes = ns.datanodes.clone();
    let next_id = ns.next_block_id;

    let file = match ns.entries.get_mut(&request.src) {
        Some(Entry::File(file)) => file,
        _ => {
            return Err((
                String::from("java.io.FileNotFoundException"),
                format!("No such file: {}", request.src),
            ))
        }
    };

    // Closing the previous block records its authoritative length.
    if let Some(previous) = &request.previous {
        match file.blocks.iter_mut().find(|b| b.id == previous.block_id) {
            Some(block) => block.len = previous.num_bytes.unwrap_or(0),
            None => {
                return Err((
                    String::from("java.io.IOException"),
                    format!("Unknown previous block {}", previous.block_id),
                ))
            }
        }
    }

    let offset: u64 = file.blocks.iter().map(|b| b.len).sum();
    file.blocks.push(BlockMeta {
        id: next_id,
        gen: GENERATION_STAMP,
        len: 0,
    });
    ns.next_block_id += 1;

    Ok(AddBlockResponseProto {
        block: located_block(next_id, GENERATION_STAMP, 0, offset, &datanodes),
    })
}

fn complete(
    ns: &mut Namespace,
    request: &CompleteRequestProto,
) -> std::result::Result<CompleteResponseProto, (String, String)> {
    let file = match ns.entries.get_mut(&request.src) {
        Some(Entry::File(file)) => file,
        _ => {
            return Err((
                String::from("java.io.FileNotFoundException"),
                format!("No such file: {}", request.src),
            ))
        }
    };

    if let Some(last) = &request.last {
        if let Some(block) = file.blocks.iter_mut().find(|b| b.id == last.block_id) {
            block.len = last.num_bytes.unwrap_or(0);
        }
    }
    file.complete = true;
    Ok(CompleteResponseProto { result: true })
}

fn delete(
    ns: &mut Namespace,
    request: &DeleteRequestProto,
) -> std::result::Result<DeleteResponseProto, (String, String)> {
    match ns.entries.get(&request.src) {
        None => Ok(DeleteResponseProto { result: false }),
        Some(Entry::Directory) => {
            if !request.recursive && ns.children_of(&request.src).next().is_some() {
                return Err((
                    String::from("org.apache.hadoop.fs.PathIsNotEmptyDirectoryException"),
                    format!("`{}' is non empty", request.src),
                ));
            }
            ns.entries.remove(&request.src);
            Ok(DeleteResponseProto { result: true })
        }
        Some(Entry::File(_)) => {
            ns.entries.remove(&request.src);
            Ok(DeleteResponseProto { result: true })
        }
    }
}

fn named_status(
    ns: &Namespace,
    name: &str,
    full_path: &str,
    entry: &Entry,
    with_locations: bool,
) -> HdfsFileStatusProto {
    let mut status = status_for(ns, full_path, entry, with_locations);
    status.path = name.as_bytes().to_vec();
    status
}

fn status_for(
    ns: &Namespace,
    path: &str,
    entry: &Entry,
    with_locations: bool,
) -> HdfsFileStatusProto {
    let (file_type, length, perm, replication, blocksize, file_id, children, locations) =
        match entry {
            Entry::Directory => (
                FileTypeProto::IsDir,
                0,
                0o755,
                0,
                0,
                0,
                ns.children_of(path).count() as i32,
                None,
            ),
            Entry::File(file) => {
                let length: u64 = file.blocks.iter().map(|b| b.len).sum();
                let locations = with_locations.then(|| {
                    let mut offset = 0;
                    let blocks = file
                        .blocks
                        .iter()
                        .map(|b| {
                            let located =
                                located_block(b.id, b.gen, b.len, offset, &ns.datanodes);
                            offset += b.len;
                            located
                        })
                        .collect();
                    LocatedBlocksProto {
                        file_length: length,
                        blocks,
                        under_construction: !file.complete,
                        last_block: None,
                        is_last_block_complete: file.complete,
                    }
                });
                (
                    FileTypeProto::IsFile,
                    length,
                    0o644,
                    3,
                    128 * 1024 * 1024,
                    file.file_id,
                    -1,
                    locations,
                )
            }
        };

    HdfsFileStatusProto {
        file_type: file_type as i32,
        path: path.as_bytes().to_vec(),
        length,
        permission: FsPermissionProto { perm },
        owner: String::from("mockuser"),
        group: String::from("supergroup"),
        modification_time: MOCK_TIME_MILLIS,
        access_time: MOCK_TIME_MILLIS,
        symlink: None,
        block_replication: Some(replication),
        blocksize: Some(blocksize),
        locations,
        file_id: Some(file_id),
        children_num: Some(children),
        storage_policy: Some(0),
        flags: Some(0),
        namespace: None,
    }
}

fn located_block(
    id: u64,
    gen: u64,
    len: u64,
    offset: u64,
    datanodes: &[DataNodeEntry],
) -> LocatedBlockProto {
    LocatedBlockProto {
        b: ExtendedBlockProto {
            pool_id: String::from(BLOCK_POOL_ID),
            block_id: id,
            generation_stamp: gen,
            num_bytes: Some(len),
        },
        offset,
        locs: datanodes
            .iter()
            .map(|dn| DatanodeInfoProto {
                id: DatanodeIdProto {
                    ip_addr: String::from("127.0.0.1"),
                    host_name: dn.host.clone(),
                    datanode_uuid: dn.uuid.clone(),
                    xfer_port: u32::from(dn.port),
                    info_port: 9864,
                    ipc_port: 9867,
                },
                location: Some(String::from("/default-rack")),
            })
            .collect(),
        corrupt: false,
        block_token: TokenProto {
            identifier: Vec::new(),
            password: Vec::new(),
            kind: String::new(),
            service: String::new(),
        },
    }
}

fn encode<M: Message>(message: &M) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(message.encoded_len() + 4);
    message
        .encode_length_delimited(&mut buf)
        .expect("encode response body");
    buf.to_vec()
}

fn send_success(stream: &mut TcpStream, call_id: u32, body: &[u8]) -> std::io::Result<()> {
    let header = RpcResponseHeaderProto {
        call_id,
        status: RpcStatusProto::Success as i32,
        server_ipc_version_num: Some(9),
        exception_class_name: None,
        error_msg: None,
        client_id: None,
        retry_count: None,
    };
    let mut frame = BytesMut::new();
    header
        .encode_length_delimited(&mut frame)
        .expect("encode response header");
    frame.put_slice(body);
    send_frame(stream, &frame)
}

fn send_error(
    stream: &mut TcpStream,
    call_id: u32,
    class: &str,
    message: &str,
) -> std::io::Result<()> {
    let header = RpcResponseHeaderProto {
        call_id,
        status: RpcStatusProto::Error as i32,
        server_ipc_version_num: Some(9),
        exception_class_name: Some(String::from(class)),
        error_msg: Some(String::from(message)),
        client_id: None,
        retry_count: None,
    };
    let mut frame = BytesMut::new();
    header
        .encode_length_delimited(&mut frame)
        .expect("encode error header");
    send_frame(stream, &frame)
}

fn send_frame(stream: &mut TcpStream, frame: &[u8]) -> std::io::Result<()> {
    let mut buf = BytesMut::with_capacity(4 + frame.len());
    buf.put_u32(frame.len() as u32);
    buf.put_slice(frame);
    stream.write_all(&buf)?;
    stream.flush()
}

// ---------------------------------------------------------------------------
// Storage-node side
// ---------------------------------------------------------------------------

fn handle_datanode_conn(mut stream: TcpStream, store: &BlockStore) -> std::io::Result<()> {
    let version = stream.read_u16::<BigEndian>()?;
    assert_eq!(version, DATA_TRANSFER_VERSION, "bad data transfer version");

    let op_byte = stream.read_u8()?;
    match Op::from_u8(op_byte) {
        Some(Op::WriteBlock) => handle_write_block(stream, store),
        Some(Op::ReadBlock) => handle_read_block(stream, store),
        None => panic!("unknown data transfer op: {:#x}", op_byte),
    }
}

fn handle_write_block(mut stream: TcpStream, store: &BlockStore) -> std::io::Result<()> {
    let request: OpWriteBlockProto = read_delimited(&mut stream)?;
    let block_id = request.header.base_header.block.block_id;

    send_delimited(
        &mut stream,
        &BlockOpResponseProto {
            status: Status::Success as i32,
            first_bad_link: None,
            message: None,
        },
    )?;

    let mut received = Vec::new();
    let mut expected_seqno: i64 = 0;
    let mut packets: u64 = 0;

    loop {
        let packet = parse_packet(&mut stream)?;
        assert_eq!(packet.header.seqno, expected_seqno, "sequence gap in write");
        assert_eq!(
            packet.header.offset_in_block,
            received.len() as i64,
            "offset does not match bytes received"
        );
        if packet.header.last_packet_in_block {
            assert!(
                packet.payload.is_empty(),
                "final packet must carry no payload"
            );
        }

        received.extend_from_slice(&packet.payload);
        packets += 1;

        send_delimited(
            &mut stream,
            &PipelineAckProto {
                seqno: packet.header.seqno,
                reply: vec![Status::Success as i32],
                downstream_ack_time_nanos: Some(0),
            },
        )?;

        if packet.header.last_packet_in_block {
            break;
        }
        expected_seqno += 1;
    }

    store.data.lock().unwrap().insert(block_id, received);
    store.packet_counts.lock().unwrap().insert(block_id, packets);
    Ok(())
}

fn handle_read_block(mut stream: TcpStream, store: &BlockStore) -> std::io::Result<()> {
    let request: OpReadBlockProto = read_delimited(&mut stream)?;
    let block_id = request.header.base_header.block.block_id;

    let bytes = match store.data.lock().unwrap().get(&block_id) {
        Some(bytes) => bytes.clone(),
        None => {
            return send_delimited(
                &mut stream,
                &BlockOpResponseProto {
                    status: Status::Error as i32,
                    first_bad_link: None,
                    message: Some(format!("block {} not found", block_id)),
                },
            );
        }
    };

    send_delimited(
        &mut stream,
        &BlockOpResponseProto {
            status: Status::Success as i32,
            first_bad_link: None,
            message: None,
        },
    )?;

    // Stream the block in 64 KiB packets, then an empty final packet. The
    // client asked for no checksums, so PLEN covers only itself and DATA.
    let mut seqno: i64 = 0;
    let mut offset: usize = 0;
    for chunk in bytes.chunks(64 * 1024) {
        send_data_packet(&mut stream, offset as i64, seqno, false, chunk)?;
        offset += chunk.len();
        seqno += 1;
    }
    send_data_packet(&mut stream, offset as i64, seqno, true, &[])?;
    Ok(())
}

struct ParsedPacket {
    header: PacketHeaderProto,
    payload: Vec<u8>,
}

/// Independent packet decoder: verifies the self-inclusive PLEN arithmetic,
/// the checksum count, and every CRC32 value.
fn parse_packet(stream: &mut TcpStream) -> std::io::Result<ParsedPacket> {
    let plen = stream.read_u32::<BigEndian>()? as usize;
    let hlen = stream.read_u16::<BigEndian>()? as usize;

    let mut header_bytes = vec![0u8; hlen];
    stream.read_exact(&mut header_bytes)?;
    let header =
        PacketHeaderProto::decode(&header_bytes[..]).expect("decode packet header");

    let data_len = header.data_len as usize;
    assert!(
        plen >= 4 + data_len,
        "PLEN {} cannot cover its own length plus {} data bytes",
        plen,
        data_len
    );
    let checksum_len = plen - 4 - data_len;

    // Data packets on a write always carry checksums; only the empty final
    // packet may omit them.
    let expected_checksums = if data_len > 0 { (data_len + 511) / 512 } else { 0 };
    assert_eq!(
        checksum_len,
        expected_checksums * 4,
        "checksum bytes disagree with data length"
    );

    let mut checksums = vec![0u8; checksum_len];
    stream.read_exact(&mut checksums)?;
    let mut payload = vec![0u8; data_len];
    stream.read_exact(&mut payload)?;

    let mut checksums = Bytes::from(checksums);
    if checksum_len > 0 {
        for chunk in payload.chunks(512) {
            let mut hasher = crc32fast::Hasher::new();
            hasher.update(chunk);
            assert_eq!(
                checksums.get_u32(),
                hasher.finalize(),
                "CRC32 mismatch in received packet"
            );
        }
    }

    Ok(ParsedPacket { header, payload })
}

fn send_data_packet(
    stream: &mut TcpStream,
    offset_in_block: i64,
    seqno: i64,
    last: bool,
    payload: &[u8],
) -> std::io::Result<()> {
    let header = PacketHeaderProto {
        offset_in_block,
        seqno,
        last_packet_in_block: last,
        data_len: payload.len() as i32,
        sync_block: Some(false),
    };
    let header_bytes = header.encode_to_vec();

    let mut buf = BytesMut::with_capacity(4 + 2 + header_bytes.len() + payload.len());
    buf.put_u32((4 + payload.len()) as u32);
    buf.put_u16(header_bytes.len() as u16);
    buf.put_slice(&header_bytes);
    buf.put_slice(payload);
    stream.write_all(&buf)?;
    stream.flush()
}

fn send_delimited<M: Message>(stream: &mut TcpStream, message: &M) -> std::io::Result<()> {
    let mut buf = BytesMut::with_capacity(message.encoded_len() + 4);
    message
        .encode_length_delimited(&mut buf)
        .expect("encode delimited message");
    stream.write_all(&buf)?;
    stream.flush()
}
