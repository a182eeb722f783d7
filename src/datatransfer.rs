// Copyright 2021 Joyent, Inc.

//! Framing for the storage-node data-transfer protocol.
//!
//! This protocol shares nothing with the coordinator RPC framing. A request
//! opens with a two-byte version and a one-byte operation code followed by
//! one length-delimited operation message; responses and acknowledgements
//! are bare length-delimited messages; block contents travel as packets:
//!
//! ```text
//!   PLEN (u32 BE) | HLEN (u16 BE) | HEADER | CHECKSUMS | DATA
//! ```
//!
//! PLEN counts its own four bytes plus CHECKSUMS plus DATA. It does *not*
//! include HLEN or HEADER; the asymmetry is inherited from the reference
//! implementation and is load-bearing, since both sides size their reads
//! from it.
//! HLEN is the length of HEADER alone. CHECKSUMS, when present, are one
//! big-endian CRC32 per 512-byte chunk of DATA (short final chunk allowed).
//!
//! The contents of this module are not needed by normal consumers of this
//! crate, but they are exposed for the special case of someone needing to
//! implement custom storage-node tooling.

use std::io::{self, Read, Write};

use byteorder::{BigEndian, ReadBytesExt};
use bytes::{BufMut, BytesMut};
use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::ToPrimitive;
use prost::Message;

use crate::proto::datatransfer::PacketHeaderProto;

/// Version of the data-transfer protocol spoken by this crate.
pub const DATA_TRANSFER_VERSION: u16 = 28;

/// Largest data payload carried by a single packet (64 KiB).
pub const MAX_PACKET_DATA: usize = 65536;

/// Bytes covered by each CRC32 checksum value.
pub const BYTES_PER_CHECKSUM: usize = 512;

/// Size in bytes of one encoded checksum value.
const CHECKSUM_SIZE: usize = 4;

/// Data-transfer operation codes.
#[derive(Clone, Copy, Debug, FromPrimitive, ToPrimitive, PartialEq, Eq)]
pub enum Op {
    WriteBlock = 0x50,
    ReadBlock = 0x51,
}

/// Writes an operation request: version, op code, then the delimited
/// operation message.
pub fn write_op_request<M: Message>(w: &mut impl Write, op: Op, message: &M) -> io::Result<()> {
    let mut buf = BytesMut::with_capacity(3 + message.encoded_len() + 2);
    buf.put_u16(DATA_TRANSFER_VERSION);
    // The op codes are defined to fit a byte.
    buf.put_u8(op.to_u8().expect("op codes fit in a byte"));
    message
        .encode_length_delimited(&mut buf)
        .expect("BytesMut grows on demand");
    w.write_all(&buf)?;
    w.flush()
}

/// Reads one varint-length-delimited message straight off a stream.
pub fn read_delimited<M: Message + Default>(r: &mut impl Read) -> io::Result<M> {
    let len = read_varint(r)?;
    let mut body = vec![0u8; len];
    r.read_exact(&mut body)?;
    M::decode(&body[..])
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

fn read_varint(r: &mut impl Read) -> io::Result<usize> {
    let mut value: u64 = 0;
    for shift in (0..64).step_by(7) {
        let mut byte = [0u8; 1];
        r.read_exact(&mut byte)?;
        value |= u64::from(byte[0] & 0x7f) << shift;
        if byte[0] & 0x80 == 0 {
            return Ok(value as usize);
        }
    }
    Err(io::Error::new(
        io::ErrorKind::InvalidData,
        "malformed varint length delimiter",
    ))
}

/// One packet on the data path.
#[derive(Clone, Debug)]
pub struct DataPacket<'a> {
    /// Byte offset of this packet's payload within the block.
    pub offset_in_block: u64,
    /// Sequence number; contiguous from zero within one write.
    pub seqno: i64,
    /// Marks the final packet of the block. The final packet carries no
    /// payload and no checksums.
    pub last_packet: bool,
    pub sync_block: bool,
    /// Whether to emit CRC32 values for the payload.
    pub checksummed: bool,
    pub payload: &'a [u8],
}

impl DataPacket<'_> {
    /// Encodes the packet. PLEN is computed as `4 + |checksums| + |data|`
    /// (self-inclusive, header excluded) and HLEN as the header bytes only;
    /// getting either wrong breaks interop with every reference peer.
    pub fn encode(&self, buf: &mut BytesMut) {
        let header = PacketHeaderProto {
            offset_in_block: self.offset_in_block as i64,
            seqno: self.seqno,
            last_packet_in_block: self.last_packet,
            data_len: self.payload.len() as i32,
            sync_block: Some(self.sync_block),
        };
        let header_bytes = header.encode_to_vec();

        let checksums = if self.checksummed && !self.payload.is_empty() {
            checksums_for(self.payload)
        } else {
            Vec::new()
        };

        let plen = 4 + checksums.len() + self.payload.len();
        buf.reserve(4 + 2 + header_bytes.len() + checksums.len() + self.payload.len());
        buf.put_u32(plen as u32);
        buf.put_u16(header_bytes.len() as u16);
        buf.put_slice(&header_bytes);
        buf.put_slice(&checksums);
        buf.put_slice(self.payload);
    }
}

/// Big-endian CRC32 values, one per 512-byte chunk of `data`.
fn checksums_for(data: &[u8]) -> Vec<u8> {
    let count = (data.len() + BYTES_PER_CHECKSUM - 1) / BYTES_PER_CHECKSUM;
    let mut checksums = Vec::with_capacity(count * CHECKSUM_SIZE);
    for chunk in data.chunks(BYTES_PER_CHECKSUM) {
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(chunk);
        checksums.extend_from_slice(&hasher.finalize().to_be_bytes());
    }
    checksums
}

/// Reads one packet from the stream, returning its header and payload.
/// Checksum bytes, if the sender included any, are skipped without
/// verification; their length is recovered from the PLEN arithmetic.
pub fn read_packet(r: &mut impl Read) -> io::Result<(PacketHeaderProto, Vec<u8>)> {
    let plen = r.read_u32::<BigEndian>()? as usize;
    let hlen = r.read_u16::<BigEndian>()? as usize;

    let mut header_bytes = vec![0u8; hlen];
    r.read_exact(&mut header_bytes)?;
    let header = PacketHeaderProto::decode(&header_bytes[..])
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

    let data_len = header.data_len.max(0) as usize;
    let checksums_len = plen.checked_sub(4 + data_len).ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("packet length {} too small for data length {}", plen, data_len),
        )
    })?;

    if checksums_len > 0 {
        io::copy(&mut (&mut *r).take(checksums_len as u64), &mut io::sink())?;
    }

    let mut payload = vec![0u8; data_len];
    r.read_exact(&mut payload)?;
    Ok((header, payload))
}
