//! Minimal RPC client over TCP and UDP
//!
//! Each call is one request/response exchange bounded by a [`Deadline`].
//! TCP calls use record marking; UDP calls retransmit the request every
//! retry interval until a reply with the matching xid arrives.

use crate::error::RpcFailure;
use crate::nfs::net::{self, Deadline, DeadlineReader};
use crate::nfs::rpc::{self, CallHeader};
use crate::nfs::types::Protocol;
use std::io::{self, Write};
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};
use std::time::Duration;
use tracing::trace;

/// Largest datagram accepted as a UDP reply
const MAX_DATAGRAM: usize = 65_536;

/// A single RPC request
#[derive(Debug, Clone)]
pub struct RpcCall {
    pub program: u32,
    pub version: u32,
    pub procedure: u32,
    pub args: Vec<u8>,
}

impl RpcCall {
    /// A call to the NULL procedure of `program`/`version`
    pub fn null(program: u32, version: u32) -> Self {
        Self {
            program,
            version,
            procedure: rpc::NULLPROC,
            args: Vec::new(),
        }
    }

    /// A portmapper GETPORT query
    pub fn getport(program: u32, version: u32, protocol: Protocol) -> Self {
        Self {
            program: rpc::PMAP_PROGRAM,
            version: rpc::PMAP_VERSION,
            procedure: rpc::PMAPPROC_GETPORT,
            args: rpc::encode_getport_args(program, version, protocol.ipproto()),
        }
    }

    fn encode(&self, xid: u32) -> Vec<u8> {
        let header = CallHeader {
            xid,
            program: self.program,
            version: self.version,
            procedure: self.procedure,
        };
        rpc::encode_call(&header, &self.args)
    }
}

/// Why a call did not produce results
#[derive(Debug)]
pub enum CallError {
    /// The connection could not be established
    Connect(io::Error),
    /// The exchange failed after connecting
    Rpc(RpcFailure),
}

impl From<RpcFailure> for CallError {
    fn from(failure: RpcFailure) -> Self {
        CallError::Rpc(failure)
    }
}

/// Perform `call` against `addr` over the given transport
pub fn call(
    protocol: Protocol,
    addr: SocketAddr,
    call: &RpcCall,
    deadline: &Deadline,
    retry: Duration,
) -> Result<Vec<u8>, CallError> {
    match protocol {
        Protocol::Udp => call_udp(addr, call, deadline, retry),
        Protocol::Tcp | Protocol::Unspecified => call_tcp(addr, call, deadline),
    }
}

/// Perform `call` over a fresh TCP connection
pub fn call_tcp(
    addr: SocketAddr,
    call: &RpcCall,
    deadline: &Deadline,
) -> Result<Vec<u8>, CallError> {
    let mut stream = net::connect_tcp(&addr, deadline).map_err(CallError::Connect)?;

    let xid = rpc::next_xid();
    let record = rpc::frame_record(&call.encode(xid));
    trace!(%addr, xid, program = call.program, "TCP call");

    let remaining = deadline.remaining().ok_or(RpcFailure::TimedOut)?;
    stream
        .set_write_timeout(Some(remaining))
        .map_err(|e| RpcFailure::from_io(&e))?;
    stream
        .write_all(&record)
        .map_err(|e| RpcFailure::from_io(&e))?;

    let reply = rpc::read_record(&mut DeadlineReader::new(&stream, *deadline))
        .map_err(|e| RpcFailure::from_io(&e))?;
    let results = rpc::decode_reply(xid, &reply)?;
    Ok(results.to_vec())
}

/// Perform `call` over UDP, retransmitting every `retry` until the deadline
pub fn call_udp(
    addr: SocketAddr,
    call: &RpcCall,
    deadline: &Deadline,
    retry: Duration,
) -> Result<Vec<u8>, CallError> {
    let local: SocketAddr = if addr.is_ipv4() {
        (Ipv4Addr::UNSPECIFIED, 0).into()
    } else {
        (Ipv6Addr::UNSPECIFIED, 0).into()
    };
    let socket = UdpSocket::bind(local).map_err(CallError::Connect)?;
    socket.connect(addr).map_err(CallError::Connect)?;

    let xid = rpc::next_xid();
    let request = call.encode(xid);
    let mut buf = vec![0u8; MAX_DATAGRAM];
    let retry = retry.max(Duration::from_millis(10));

    loop {
        if deadline.is_expired() {
            return Err(RpcFailure::TimedOut.into());
        }
        trace!(%addr, xid, program = call.program, "UDP call");
        socket
            .send(&request)
            .map_err(|e| RpcFailure::from_io(&e))?;

        let window = deadline.min_after(retry);
        while let Some(wait) = window.remaining() {
            socket
                .set_read_timeout(Some(wait))
                .map_err(|e| RpcFailure::from_io(&e))?;
            match socket.recv(&mut buf) {
                Ok(n) => match rpc::decode_reply(xid, &buf[..n]) {
                    Ok(results) => return Ok(results.to_vec()),
                    // stale reply to an earlier request
                    Err(RpcFailure::XidMismatch { .. }) => continue,
                    Err(failure) => return Err(failure.into()),
                },
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
                    ) =>
                {
                    break
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(RpcFailure::from_io(&e).into()),
            }
        }
    }
}
