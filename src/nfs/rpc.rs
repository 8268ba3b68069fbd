//! ONC RPC message codec
//!
//! Just enough of RFC 5531 (RPC) and RFC 1833 (portmapper v2) to ask a
//! portmapper for the NFS port and to send an NFS NULL call:
//!
//! ```text
//! CALL:   xid | 0 | rpcvers=2 | prog | vers | proc | cred | verf | args
//! REPLY:  xid | 1 | MSG_ACCEPTED | verf | accept_stat | results
//!         xid | 1 | MSG_DENIED   | reject_stat | ...
//! ```
//!
//! Stream transports wrap each message in record marking: a 4-byte header
//! whose top bit flags the last fragment and whose low 31 bits hold the
//! fragment length.

use crate::error::RpcFailure;
use std::io::{self, Read};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Portmapper program number
pub const PMAP_PROGRAM: u32 = 100_000;

/// Portmapper protocol version
pub const PMAP_VERSION: u32 = 2;

/// Portmapper GETPORT procedure
pub const PMAPPROC_GETPORT: u32 = 3;

/// Well-known portmapper port
pub const PMAP_PORT: u16 = 111;

/// NFS program number
pub const NFS_PROGRAM: u32 = 100_003;

/// Fixed port for NFS version 4 (no portmapper registration required)
pub const NFS_PORT: u16 = 2049;

/// The no-op procedure every RPC program implements
pub const NULLPROC: u32 = 0;

const RPC_VERSION: u32 = 2;
const MSG_CALL: u32 = 0;
const MSG_REPLY: u32 = 1;
const MSG_ACCEPTED: u32 = 0;
const MSG_DENIED: u32 = 1;
const AUTH_NONE: u32 = 0;

/// Accepted reply status codes
pub mod accept_stat {
    pub const SUCCESS: u32 = 0;
    pub const PROG_UNAVAIL: u32 = 1;
    pub const PROG_MISMATCH: u32 = 2;
    pub const PROC_UNAVAIL: u32 = 3;
    pub const GARBAGE_ARGS: u32 = 4;
    pub const SYSTEM_ERR: u32 = 5;
}

const RPC_MISMATCH: u32 = 0;
const AUTH_ERROR: u32 = 1;

const LAST_FRAGMENT: u32 = 0x8000_0000;

/// Largest record accepted from a stream transport
pub const MAX_RECORD_SIZE: usize = 1 << 20;

/// Allocate a transaction id
///
/// Seeded from the clock and pid so concurrent runs against one server do
/// not collide.
pub fn next_xid() -> u32 {
    static COUNTER: AtomicU32 = AtomicU32::new(0);
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    let seed = std::process::id().rotate_left(16) ^ nanos;
    seed.wrapping_add(COUNTER.fetch_add(1, Ordering::Relaxed))
}

/// Header fields of a CALL message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallHeader {
    pub xid: u32,
    pub program: u32,
    pub version: u32,
    pub procedure: u32,
}

fn put_u32(buf: &mut Vec<u8>, value: u32) {
    buf.extend_from_slice(&value.to_be_bytes());
}

/// Encode a CALL message with AUTH_NONE credentials
pub fn encode_call(header: &CallHeader, args: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(40 + args.len());
    put_u32(&mut buf, header.xid);
    put_u32(&mut buf, MSG_CALL);
    put_u32(&mut buf, RPC_VERSION);
    put_u32(&mut buf, header.program);
    put_u32(&mut buf, header.version);
    put_u32(&mut buf, header.procedure);
    // credentials, then verifier
    for _ in 0..2 {
        put_u32(&mut buf, AUTH_NONE);
        put_u32(&mut buf, 0);
    }
    buf.extend_from_slice(args);
    buf
}

/// Encode GETPORT arguments: program, version, protocol, port (ignored)
pub fn encode_getport_args(program: u32, version: u32, ipproto: u32) -> Vec<u8> {
    let mut buf = Vec::with_capacity(16);
    put_u32(&mut buf, program);
    put_u32(&mut buf, version);
    put_u32(&mut buf, ipproto);
    put_u32(&mut buf, 0);
    buf
}

/// Encode an accepted REPLY with the given status and results
pub fn encode_reply(xid: u32, status: u32, results: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(24 + results.len());
    put_u32(&mut buf, xid);
    put_u32(&mut buf, MSG_REPLY);
    put_u32(&mut buf, MSG_ACCEPTED);
    put_u32(&mut buf, AUTH_NONE);
    put_u32(&mut buf, 0);
    put_u32(&mut buf, status);
    buf.extend_from_slice(results);
    buf
}

/// Sequential XDR reader over a message
struct XdrReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> XdrReader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn u32(&mut self) -> Result<u32, RpcFailure> {
        let end = self.pos + 4;
        let bytes = self
            .buf
            .get(self.pos..end)
            .ok_or_else(|| RpcFailure::Malformed(format!("truncated at byte {}", self.pos)))?;
        self.pos = end;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Skip a variable-length opaque (length word + padded body)
    fn skip_opaque(&mut self) -> Result<(), RpcFailure> {
        let len = self.u32()? as usize;
        let padded = (len + 3) & !3;
        if self.pos + padded > self.buf.len() {
            return Err(RpcFailure::Malformed(format!(
                "opaque of {len} bytes runs past end of message"
            )));
        }
        self.pos += padded;
        Ok(())
    }

    fn rest(&self) -> &'a [u8] {
        &self.buf[self.pos..]
    }
}

/// Decode a REPLY for `expected_xid`, returning the procedure results
pub fn decode_reply(expected_xid: u32, msg: &[u8]) -> Result<&[u8], RpcFailure> {
    let mut r = XdrReader::new(msg);
    let xid = r.u32()?;
    if xid != expected_xid {
        return Err(RpcFailure::XidMismatch {
            expected: expected_xid,
            got: xid,
        });
    }
    let msg_type = r.u32()?;
    if msg_type != MSG_REPLY {
        return Err(RpcFailure::Malformed(format!(
            "expected REPLY, got message type {msg_type}"
        )));
    }

    match r.u32()? {
        MSG_ACCEPTED => {
            // verifier flavor + body
            r.u32()?;
            r.skip_opaque()?;
            match r.u32()? {
                accept_stat::SUCCESS => Ok(r.rest()),
                accept_stat::PROG_UNAVAIL => Err(RpcFailure::ProgramUnavailable),
                accept_stat::PROG_MISMATCH => {
                    let low = r.u32()?;
                    let high = r.u32()?;
                    Err(RpcFailure::ProgramMismatch { low, high })
                }
                accept_stat::PROC_UNAVAIL => Err(RpcFailure::ProcedureUnavailable),
                accept_stat::GARBAGE_ARGS => Err(RpcFailure::GarbageArgs),
                accept_stat::SYSTEM_ERR => Err(RpcFailure::SystemError),
                other => Err(RpcFailure::Malformed(format!("unknown accept status {other}"))),
            }
        }
        MSG_DENIED => match r.u32()? {
            RPC_MISMATCH => {
                let low = r.u32()?;
                let high = r.u32()?;
                Err(RpcFailure::RpcMismatch { low, high })
            }
            AUTH_ERROR => Err(RpcFailure::AuthError(r.u32()?)),
            other => Err(RpcFailure::Malformed(format!("unknown reject status {other}"))),
        },
        other => Err(RpcFailure::Malformed(format!("unknown reply status {other}"))),
    }
}

/// Decode a CALL message, returning its header and arguments
pub fn decode_call(msg: &[u8]) -> Result<(CallHeader, &[u8]), RpcFailure> {
    let mut r = XdrReader::new(msg);
    let xid = r.u32()?;
    let msg_type = r.u32()?;
    if msg_type != MSG_CALL {
        return Err(RpcFailure::Malformed(format!(
            "expected CALL, got message type {msg_type}"
        )));
    }
    let rpcvers = r.u32()?;
    if rpcvers != RPC_VERSION {
        return Err(RpcFailure::RpcMismatch {
            low: RPC_VERSION,
            high: RPC_VERSION,
        });
    }
    let header = CallHeader {
        xid,
        program: r.u32()?,
        version: r.u32()?,
        procedure: r.u32()?,
    };
    for _ in 0..2 {
        r.u32()?;
        r.skip_opaque()?;
    }
    Ok((header, r.rest()))
}

/// Decode GETPORT results (0 means not registered)
pub fn decode_getport(results: &[u8]) -> Result<u16, RpcFailure> {
    let port = XdrReader::new(results).u32()?;
    u16::try_from(port).map_err(|_| RpcFailure::Malformed(format!("port {port} out of range")))
}

/// Wrap a message in a single last-fragment record
pub fn frame_record(msg: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(4 + msg.len());
    put_u32(&mut buf, LAST_FRAGMENT | msg.len() as u32);
    buf.extend_from_slice(msg);
    buf
}

/// Read one complete record, reassembling fragments
pub fn read_record<R: Read>(reader: &mut R) -> io::Result<Vec<u8>> {
    let mut record = Vec::new();
    loop {
        let mut header = [0u8; 4];
        reader.read_exact(&mut header)?;
        let header = u32::from_be_bytes(header);
        let len = (header & !LAST_FRAGMENT) as usize;

        if record.len() + len > MAX_RECORD_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("RPC record exceeds {MAX_RECORD_SIZE} bytes"),
            ));
        }

        let start = record.len();
        record.resize(start + len, 0);
        reader.read_exact(&mut record[start..])?;

        if header & LAST_FRAGMENT != 0 {
            return Ok(record);
        }
    }
}
