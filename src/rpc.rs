// Copyright 2021 Joyent, Inc.

//! Request/response framing for the coordinator RPC protocol.
//!
//! Every call is one frame in each direction on a dedicated connection:
//!
//! ```text
//!   request:  LEN (u32 BE) | rpc-header | request-header | body
//!   response: LEN (u32 BE) | response-header | body
//! ```
//!
//! where each inner message is a varint-length-delimited protocol buffer and
//! the outer LEN counts the concatenated delimited messages. The framer
//! hands back the decoded typed response; the expected response type is
//! supplied by the caller rather than discovered dynamically.

use std::sync::atomic::{AtomicI32, Ordering};

use bytes::{Bytes, BytesMut};
use prost::Message;

use crate::connection::NameNodeConnection;
use crate::error::{DfsError, Result};
use crate::proto::common::{
    rpc_request_header_proto::OperationProto, rpc_response_header_proto::RpcStatusProto,
    RequestHeaderProto, RpcKindProto, RpcRequestHeaderProto, RpcResponseHeaderProto,
};

/// A named, versioned coordinator protocol.
#[derive(Clone, Copy, Debug)]
pub struct Protocol {
    pub name: &'static str,
    pub version: u64,
}

/// The protocol carrying every metadata operation.
pub const CLIENT_PROTOCOL: Protocol = Protocol {
    name: "org.apache.hadoop.hdfs.protocol.ClientProtocol",
    version: 1,
};

/// The coordinator-internal protocol; used only to discover server build and
/// version information.
pub const NAMENODE_PROTOCOL: Protocol = Protocol {
    name: "org.apache.hadoop.hdfs.server.protocol.NamenodeProtocol",
    version: 1,
};

/// Encodes requests and decodes responses for one protocol on behalf of one
/// client identity. Call ids are allocated from an atomic counter starting
/// at zero, so every connection observes a strictly increasing sequence.
pub struct RpcEngine {
    protocol: Protocol,
    client_id: [u8; 16],
    call_id: AtomicI32,
}

impl RpcEngine {
    pub fn new(protocol: Protocol, client_id: [u8; 16]) -> RpcEngine {
        RpcEngine {
            protocol,
            client_id,
            call_id: AtomicI32::new(0),
        }
    }

    /// Sends one request and decodes its response. The method name derives
    /// from the request type's short name unless supplied explicitly (the
    /// version call needs the literal `versionRequest`).
    pub fn call<Req, Resp>(
        &self,
        conn: &NameNodeConnection,
        method: Option<&str>,
        request: &Req,
    ) -> Result<Resp>
    where
        Req: Message,
        Resp: Message + Default,
    {
        let derived;
        let method = match method {
            Some(name) => name,
            None => {
                derived = derive_method_name(std::any::type_name::<Req>());
                &derived
            }
        };

        conn.send_frame(&self.encode_request(method, request))?;
        self.decode_response(conn.read_frame()?, method)
    }

    fn encode_request<Req: Message>(&self, method: &str, request: &Req) -> BytesMut {
        let rpc_header = RpcRequestHeaderProto {
            rpc_kind: Some(RpcKindProto::RpcProtocolBuffer as i32),
            rpc_op: Some(OperationProto::RpcFinalPacket as i32),
            call_id: self.call_id.fetch_add(1, Ordering::SeqCst),
            client_id: self.client_id.to_vec(),
            retry_count: Some(0),
        };
        let request_header = RequestHeaderProto {
            method_name: String::from(method),
            declaring_class_protocol_name: String::from(self.protocol.name),
            client_protocol_version: self.protocol.version,
        };

        let mut payload = BytesMut::with_capacity(
            rpc_header.encoded_len() + request_header.encoded_len() + request.encoded_len() + 16,
        );
        rpc_header
            .encode_length_delimited(&mut payload)
            .expect("BytesMut grows on demand");
        request_header
            .encode_length_delimited(&mut payload)
            .expect("BytesMut grows on demand");
        request
            .encode_length_delimited(&mut payload)
            .expect("BytesMut grows on demand");
        payload
    }

    fn decode_response<Resp: Message + Default>(
        &self,
        frame: Vec<u8>,
        method: &str,
    ) -> Result<Resp> {
        let mut buf = Bytes::from(frame);

        let header = RpcResponseHeaderProto::decode_length_delimited(&mut buf)
            .map_err(|e| DfsError::infrastructure_with("failed to parse response header", e))?;

        if header.status != RpcStatusProto::Success as i32 {
            let message = match header.exception_class_name {
                Some(class) => format!(
                    "{}: {}",
                    class,
                    header.error_msg.unwrap_or_default()
                ),
                None => format!("call {} failed with status {}", method, header.status),
            };
            return Err(DfsError::infrastructure(message));
        }

        if buf.is_empty() {
            return Err(DfsError::infrastructure(format!(
                "no response data after header for call {}",
                method
            )));
        }

        Resp::decode_length_delimited(&mut buf).map_err(|e| {
            DfsError::infrastructure_with(
                format!("failed to parse response body for call {}", method),
                e,
            )
        })
    }
}

/// Derives the wire method name from a request type's short name: the module
/// path, a trailing `Proto`, and a trailing `Request` are stripped and the
/// first letter is lowered, e.g. `GetListingRequestProto` → `getListing`.
fn derive_method_name(type_name: &str) -> String {
    let short = type_name.rsplit("::").next().unwrap_or(type_name);
    let short = short.strip_suffix("Proto").unwrap_or(short);
    let short = short.strip_suffix("Request").unwrap_or(short);

    let mut chars = short.chars();
    match chars.next() {
        Some(first) => first.to_ascii_lowercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}
