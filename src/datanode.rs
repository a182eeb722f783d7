// Copyright 2021 Joyent, Inc.

//! The storage-node (DataNode) client: block-level reads and the write
//! pipeline, built on the data-transfer framing.

use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use slog::{debug, o, Drain, Logger};

use crate::datatransfer::{
    self, DataPacket, Op, BYTES_PER_CHECKSUM, MAX_PACKET_DATA,
};
use crate::error::{DfsError, Result};
use crate::namenode::BlockLocation;
use crate::proto::common::TokenProto;
use crate::proto::datatransfer::{
    op_write_block_proto::BlockConstructionStage, BaseHeaderProto, BlockOpResponseProto,
    CachingStrategyProto, ChecksumProto, ChecksumTypeProto, ClientOperationHeaderProto,
    OpReadBlockProto, OpWriteBlockProto, PipelineAckProto, Status,
};

/// Default storage-node data-transfer port.
pub const DEFAULT_DATA_PORT: u16 = 9866;

/// Default storage-node connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default storage-node read timeout.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(3);

/// Configuration shared by the storage-node clients a file client creates.
#[derive(Clone, Debug)]
pub struct DataNodeConfig {
    /// Port used when block metadata does not carry one.
    pub port: u16,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    /// Client name sent in operation headers; identifies this client in the
    /// storage node's logs.
    pub client_name: String,
}

impl Default for DataNodeConfig {
    fn default() -> DataNodeConfig {
        DataNodeConfig {
            port: DEFAULT_DATA_PORT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            client_name: format!("dfs-dn-client-{}", rand::random::<u32>()),
        }
    }
}

/// Creates storage-node clients on demand. The composite file client holds
/// one of these and asks it for a client per block and direction.
pub trait DataNodeClientProvider: Send + Sync {
    fn client(&self, host: &str, port: u16) -> DataNodeClient;
}

/// Provider that stamps every client out of one shared configuration.
pub struct DefaultDataNodeClientProvider {
    config: DataNodeConfig,
    log: Logger,
}

impl DefaultDataNodeClientProvider {
    pub fn new(config: DataNodeConfig, log: Option<Logger>) -> DefaultDataNodeClientProvider {
        DefaultDataNodeClientProvider {
            config,
            log: log.unwrap_or_else(|| Logger::root(slog_stdlog::StdLog.fuse(), o!())),
        }
    }
}

impl DataNodeClientProvider for DefaultDataNodeClientProvider {
    fn client(&self, host: &str, port: u16) -> DataNodeClient {
        DataNodeClient::new(host, port, &self.config, self.log.clone())
    }
}

/// A client for one storage node. The connection is created lazily on the
/// first block operation and owned by that operation end to end; a fresh
/// client (and so a fresh connection) is used per block and per direction.
pub struct DataNodeClient {
    host: String,
    port: u16,
    connect_timeout: Duration,
    read_timeout: Duration,
    client_name: String,
    stream: Option<TcpStream>,
    log: Logger,
}

impl DataNodeClient {
    /// Creates a client for `host`. A `port` of zero falls back to the
    /// configured default data port.
    pub fn new(host: &str, port: u16, config: &DataNodeConfig, log: Logger) -> DataNodeClient {
        DataNodeClient {
            host: String::from(host),
            port: if port == 0 { config.port } else { port },
            connect_timeout: config.connect_timeout,
            read_timeout: config.read_timeout,
            client_name: config.client_name.clone(),
            stream: None,
            log,
        }
    }

    /// Streams a block's contents into `sink`. The block must list this
    /// node among its replicas. Packets are consumed until the final-packet
    /// flag; a zero-length final packet is a legal end-of-block marker. The
    /// byte total must match the block's declared length.
    ///
    /// Failures writing to `sink` surface as `CallerStream`; everything else
    /// is an infrastructure failure of this node.
    pub fn read_block(&mut self, block: &BlockLocation, sink: &mut dyn Write) -> Result<()> {
        self.require_replica(block)?;
        self.ensure_connected()?;
        let mut stream = match &self.stream {
            Some(stream) => stream,
            None => return Err(DfsError::infrastructure("storage node connection unavailable")),
        };

        let request = OpReadBlockProto {
            header: operation_header(block, block.length, &self.client_name),
            offset: 0,
            len: block.length,
            send_checksums: Some(false),
            caching_strategy: Some(CachingStrategyProto::default()),
        };
        datatransfer::write_op_request(&mut stream, Op::ReadBlock, &request)
            .map_err(|e| self.infra(block, "failed to send read-block request", e))?;
        self.check_op_response(&mut stream, block)?;

        let mut total: u64 = 0;
        loop {
            let (header, payload) = datatransfer::read_packet(&mut stream)
                .map_err(|e| self.infra(block, "failed to read data packet", e))?;

            if !payload.is_empty() {
                // Tag sink failures where they happen so they are never
                // mistaken for a node failure.
                sink.write_all(&payload).map_err(DfsError::CallerStream)?;
                total += payload.len() as u64;
            }

            if header.last_packet_in_block {
                break;
            }
        }

        if total != block.length {
            return Err(DfsError::infrastructure(format!(
                "block {} ended after {} bytes, expected {}",
                block.block_id, total, block.length
            )));
        }

        debug!(self.log, "block read complete";
               "block" => block.block_id, "bytes" => total);
        Ok(())
    }

    /// Streams `source` into a block on this node, returning the payload
    /// bytes written. Each data packet is acknowledged before the next is
    /// sent; sequence numbers are contiguous from zero. After the source is
    /// exhausted one empty final packet is always sent and acknowledged.
    ///
    /// Failures reading `source` surface as `CallerStream`.
    pub fn write_block(&mut self, block: &BlockLocation, source: &mut dyn Read) -> Result<u64> {
        self.require_replica(block)?;
        self.ensure_connected()?;
        let mut stream = match &self.stream {
            Some(stream) => stream,
            None => return Err(DfsError::infrastructure("storage node connection unavailable")),
        };

        let request = OpWriteBlockProto {
            header: operation_header(block, 0, &self.client_name),
            targets: Vec::new(),
            stage: BlockConstructionStage::PipelineSetupCreate as i32,
            pipeline_size: block.replicas.len() as u32,
            min_bytes_rcvd: 0,
            max_bytes_rcvd: 0,
            latest_generation_stamp: block.generation_stamp,
            requested_checksum: ChecksumProto {
                r#type: ChecksumTypeProto::ChecksumCrc32 as i32,
                bytes_per_checksum: BYTES_PER_CHECKSUM as u32,
            },
            caching_strategy: Some(CachingStrategyProto::default()),
        };
        datatransfer::write_op_request(&mut stream, Op::WriteBlock, &request)
            .map_err(|e| self.infra(block, "failed to send write-block request", e))?;
        self.check_op_response(&mut stream, block)?;

        let mut buffer = vec![0u8; MAX_PACKET_DATA];
        let mut total: u64 = 0;
        let mut seqno: i64 = 0;

        loop {
            let read = source.read(&mut buffer).map_err(DfsError::CallerStream)?;
            if read == 0 {
                break;
            }

            self.send_packet(
                &mut stream,
                block,
                DataPacket {
                    offset_in_block: total,
                    seqno,
                    last_packet: false,
                    sync_block: false,
                    checksummed: true,
                    payload: &buffer[..read],
                },
            )?;
            self.await_ack(&mut stream, block, seqno)?;
            seqno += 1;
            total += read as u64;
        }

        // The block always ends with an empty, unchecksummed final packet.
        self.send_packet(
            &mut stream,
            block,
            DataPacket {
                offset_in_block: total,
                seqno,
                last_packet: true,
                sync_block: false,
                checksummed: false,
                payload: &[],
            },
        )?;
        self.await_ack(&mut stream, block, seqno)?;

        debug!(self.log, "block write complete";
               "block" => block.block_id, "bytes" => total, "packets" => seqno + 1);
        Ok(total)
    }

    /// Drops the connection if one is open. Also happens implicitly when the
    /// client is dropped.
    pub fn close(&mut self) {
        self.stream = None;
    }

    fn require_replica(&self, block: &BlockLocation) -> Result<()> {
        let hosted = block.replicas.iter().any(|r| r.host == self.host);
        if !hosted {
            return Err(DfsError::infrastructure(format!(
                "block {} is not hosted on storage node {}:{}",
                block.block_id, self.host, self.port
            )));
        }
        Ok(())
    }

    fn ensure_connected(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let addr = (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|e| {
                DfsError::infrastructure_with(
                    format!("failed to resolve storage node {}:{}", self.host, self.port),
                    e,
                )
            })?
            .next()
            .ok_or_else(|| {
                DfsError::infrastructure(format!(
                    "no addresses resolved for storage node {}:{}",
                    self.host, self.port
                ))
            })?;

        let stream = TcpStream::connect_timeout(&addr, self.connect_timeout).map_err(|e| {
            DfsError::infrastructure_with(
                format!("failed to connect to storage node {}:{}", self.host, self.port),
                e,
            )
        })?;
        stream
            .set_read_timeout(Some(self.read_timeout))
            .map_err(|e| DfsError::infrastructure_with("failed to set read timeout", e))?;

        debug!(self.log, "connected to storage node";
               "host" => %self.host, "port" => self.port);
        self.stream = Some(stream);
        Ok(())
    }

    fn send_packet(
        &self,
        stream: &mut &TcpStream,
        block: &BlockLocation,
        packet: DataPacket<'_>,
    ) -> Result<()> {
        let mut buf = bytes::BytesMut::new();
        packet.encode(&mut buf);
        stream
            .write_all(&buf)
            .and_then(|_| stream.flush())
            .map_err(|e| self.infra(block, "failed to send data packet", e))
    }

    fn await_ack(&self, stream: &mut &TcpStream, block: &BlockLocation, seqno: i64) -> Result<()> {
        let ack: PipelineAckProto = datatransfer::read_delimited(stream)
            .map_err(|e| self.infra(block, "failed to read packet acknowledgement", e))?;

        if ack.seqno != seqno {
            return Err(DfsError::infrastructure(format!(
                "expected acknowledgement for packet {} but got {}",
                seqno, ack.seqno
            )));
        }
        for reply in &ack.reply {
            if *reply != Status::Success as i32 {
                return Err(DfsError::infrastructure(format!(
                    "storage node reported status {} in acknowledgement for packet {}",
                    reply, seqno
                )));
            }
        }
        Ok(())
    }

    fn check_op_response(&self, stream: &mut &TcpStream, block: &BlockLocation) -> Result<()> {
        let response: BlockOpResponseProto = datatransfer::read_delimited(stream)
            .map_err(|e| self.infra(block, "failed to read operation response", e))?;

        if response.status != Status::Success as i32 {
            return Err(DfsError::infrastructure(format!(
                "storage node {}:{} rejected block {} with status {}: {}",
                self.host,
                self.port,
                block.block_id,
                response.status,
                response.message.unwrap_or_default()
            )));
        }
        Ok(())
    }

    fn infra(&self, block: &BlockLocation, what: &str, cause: std::io::Error) -> DfsError {
        DfsError::infrastructure_with(
            format!(
                "{} for block {} on storage node {}:{}",
                what, block.block_id, self.host, self.port
            ),
            cause,
        )
    }
}

fn operation_header(
    block: &BlockLocation,
    num_bytes: u64,
    client_name: &str,
) -> ClientOperationHeaderProto {
    ClientOperationHeaderProto {
        base_header: BaseHeaderProto {
            block: crate::proto::hdfs::ExtendedBlockProto {
                pool_id: block.pool_id.clone(),
                block_id: block.block_id,
                generation_stamp: block.generation_stamp,
                num_bytes: Some(num_bytes),
            },
            // Tokens are omitted under simple authentication.
            token: None::<TokenProto>,
        },
        client_name: String::from(client_name),
    }
}
