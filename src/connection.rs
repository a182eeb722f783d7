// Copyright 2021 Joyent, Inc.

//! Coordinator connections: endpoint parsing, the connection handshake, and
//! length-prefixed frame I/O on the underlying socket.
//!
//! A connection is a single-request-at-a-time resource. The client opens a
//! fresh connection per logical operation, so no per-connection locking is
//! needed; the socket is released when the connection is dropped.

use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use byteorder::{BigEndian, ReadBytesExt};
use bytes::{BufMut, BytesMut};
use prost::Message;

use crate::error::{DfsError, Result};
use crate::proto::common::{
    rpc_request_header_proto::OperationProto, IpcConnectionContextProto, RpcKindProto,
    RpcRequestHeaderProto, UserInformationProto,
};
use crate::rpc;

/// Magic bytes opening every coordinator connection.
const RPC_HEADER_MAGIC: &[u8; 4] = b"hrpc";

/// Wire version of the coordinator RPC protocol.
const RPC_VERSION: u8 = 9;

/// Service class byte; 0 selects protocol-buffer framing.
const RPC_SERVICE_CLASS: u8 = 0;

/// Auth selector byte; 0 selects simple authentication.
const RPC_AUTH_SIMPLE: u8 = 0;

/// Reserved call id used by the synthetic connection-context call.
const CONNECTION_CONTEXT_CALL_ID: i32 = -3;

/// Default coordinator connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default coordinator read timeout.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// A parsed `dfs://host:port` coordinator endpoint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NameNodeEndpoint {
    pub host: String,
    pub port: u16,
}

impl NameNodeEndpoint {
    /// Parses an endpoint URI of the form `dfs://host:port`. Anything else
    /// is an invalid argument.
    pub fn parse(uri: &str) -> Result<NameNodeEndpoint> {
        let rest = uri.strip_prefix("dfs://").ok_or_else(|| {
            DfsError::InvalidArgument(format!(
                "endpoint must have the form 'dfs://host:port', got: {}",
                uri
            ))
        })?;

        let (host, port_str) = rest.rsplit_once(':').ok_or_else(|| {
            DfsError::InvalidArgument(format!("endpoint is missing a port: {}", uri))
        })?;

        if host.is_empty() {
            return Err(DfsError::InvalidArgument(format!(
                "endpoint is missing a host: {}",
                uri
            )));
        }

        let port: u16 = port_str.parse().map_err(|_| {
            DfsError::InvalidArgument(format!("endpoint has an invalid port: {}", uri))
        })?;
        if port == 0 {
            return Err(DfsError::InvalidArgument(format!(
                "endpoint port must be positive: {}",
                uri
            )));
        }

        Ok(NameNodeEndpoint {
            host: host.to_string(),
            port,
        })
    }
}

impl std::fmt::Display for NameNodeEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "dfs://{}:{}", self.host, self.port)
    }
}

/// The identity sent in the connection context. A config input rather than a
/// hidden system lookup; `current_user` consults the environment.
#[derive(Clone, Debug)]
pub struct UserInformation {
    pub effective_user: String,
    pub real_user: String,
}

impl UserInformation {
    /// Builds an identity from the invoking user's environment, falling back
    /// to a fixed name when none is set.
    pub fn current_user() -> UserInformation {
        let user = std::env::var("USER")
            .or_else(|_| std::env::var("USERNAME"))
            .unwrap_or_else(|_| String::from("dfs"));
        UserInformation {
            effective_user: user.clone(),
            real_user: user,
        }
    }
}

/// Socket-level configuration for coordinator connections.
#[derive(Clone, Debug)]
pub struct ConnectionConfig {
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub user: UserInformation,
}

impl Default for ConnectionConfig {
    fn default() -> ConnectionConfig {
        ConnectionConfig {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            user: UserInformation::current_user(),
        }
    }
}

/// An established, handshaken coordinator connection.
pub struct NameNodeConnection {
    stream: TcpStream,
}

impl NameNodeConnection {
    /// Dials the endpoint, applies the timeouts, and performs the handshake:
    /// the magic/version/service/auth preamble followed by one u32-framed
    /// pair of length-delimited messages: a request header with the
    /// reserved context call id and the connection context itself.
    pub fn connect(
        endpoint: &NameNodeEndpoint,
        config: &ConnectionConfig,
        client_id: &[u8; 16],
    ) -> Result<NameNodeConnection> {
        let addr = (endpoint.host.as_str(), endpoint.port)
            .to_socket_addrs()
            .map_err(|e| {
                DfsError::infrastructure_with(
                    format!("failed to resolve coordinator at {}", endpoint),
                    e,
                )
            })?
            .next()
            .ok_or_else(|| {
                DfsError::infrastructure(format!("no addresses resolved for {}", endpoint))
            })?;

        let stream = TcpStream::connect_timeout(&addr, config.connect_timeout).map_err(|e| {
            DfsError::infrastructure_with(
                format!("failed to connect to coordinator at {}", endpoint),
                e,
            )
        })?;
        stream
            .set_read_timeout(Some(config.read_timeout))
            .map_err(|e| DfsError::infrastructure_with("failed to set read timeout", e))?;

        let conn = NameNodeConnection { stream };
        conn.send_handshake(&config.user, client_id).map_err(|e| {
            DfsError::infrastructure_with(
                format!("handshake with coordinator at {} failed", endpoint),
                e,
            )
        })?;
        Ok(conn)
    }

    fn send_handshake(&self, user: &UserInformation, client_id: &[u8; 16]) -> std::io::Result<()> {
        let context_header = RpcRequestHeaderProto {
            rpc_kind: Some(RpcKindProto::RpcProtocolBuffer as i32),
            rpc_op: Some(OperationProto::RpcFinalPacket as i32),
            call_id: CONNECTION_CONTEXT_CALL_ID,
            client_id: client_id.to_vec(),
            retry_count: Some(-1),
        };
        let context = IpcConnectionContextProto {
            user_info: Some(UserInformationProto {
                effective_user: Some(user.effective_user.clone()),
                real_user: Some(user.real_user.clone()),
            }),
            protocol: Some(String::from(rpc::CLIENT_PROTOCOL.name)),
        };

        let mut payload = BytesMut::with_capacity(
            context_header.encoded_len() + context.encoded_len() + 16,
        );
        context_header
            .encode_length_delimited(&mut payload)
            .expect("BytesMut grows on demand");
        context
            .encode_length_delimited(&mut payload)
            .expect("BytesMut grows on demand");

        let mut buf = BytesMut::with_capacity(7 + 4 + payload.len());
        buf.put_slice(RPC_HEADER_MAGIC);
        buf.put_u8(RPC_VERSION);
        buf.put_u8(RPC_SERVICE_CLASS);
        buf.put_u8(RPC_AUTH_SIMPLE);
        buf.put_u32(payload.len() as u32);
        buf.put_slice(&payload);

        let mut stream = &self.stream;
        stream.write_all(&buf)?;
        stream.flush()
    }

    /// Sends one u32-length-prefixed frame.
    pub fn send_frame(&self, payload: &[u8]) -> Result<()> {
        let mut buf = BytesMut::with_capacity(4 + payload.len());
        buf.put_u32(payload.len() as u32);
        buf.put_slice(payload);

        let mut stream = &self.stream;
        stream
            .write_all(&buf)
            .and_then(|_| stream.flush())
            .map_err(|e| DfsError::infrastructure_with("failed to send request frame", e))
    }

    /// Reads one u32-length-prefixed frame. Zero-length and negative frames
    /// are protocol violations.
    pub fn read_frame(&self) -> Result<Vec<u8>> {
        let mut stream = &self.stream;
        let len = stream
            .read_i32::<BigEndian>()
            .map_err(|e| DfsError::infrastructure_with("failed to read response length", e))?;
        if len <= 0 {
            return Err(DfsError::infrastructure(format!(
                "invalid response length: {}",
                len
            )));
        }

        let mut frame = vec![0u8; len as usize];
        stream
            .read_exact(&mut frame)
            .map_err(|e| DfsError::infrastructure_with("failed to read response frame", e))?;
        Ok(frame)
    }
}
