//! Bounded-time NFS server liveness probe
//!
//! A probe for one server:
//! 1. resolves the host (or takes the `addr=` hint),
//! 2. asks the portmapper over TCP which port serves NFS at the wanted
//!    version and transport (skipped for NFSv4 and for `port=` mounts),
//! 3. sends an NFS NULL call to that port.
//!
//! Every step draws from one deadline, so a probe never outlives its
//! timeout no matter how many addresses or transports are tried.
//! Candidate addresses are tried in order and the first live one wins.

use crate::error::{ProbeError, ProbeResult, RpcFailure};
use crate::nfs::client::{self, CallError, RpcCall};
use crate::nfs::local;
use crate::nfs::net::Deadline;
use crate::nfs::resolver::resolve_host;
use crate::nfs::rpc;
use crate::nfs::types::{ProbeTarget, Protocol};
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tracing::{debug, info};

/// Default probe timeout (seconds)
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Default UDP retransmit interval
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(2);

/// NFS version asked for when the mount does not say
pub const DEFAULT_NFS_VERSION: u32 = 3;

/// Something that can decide whether a server is alive
///
/// `Ok(())` means alive; any error means dead, with the reason.
pub trait Prober {
    fn probe(&self, target: &ProbeTarget) -> ProbeResult<()>;
}

impl<P: Prober + ?Sized> Prober for &P {
    fn probe(&self, target: &ProbeTarget) -> ProbeResult<()> {
        (**self).probe(target)
    }
}

/// Probe settings
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// Overall budget for one probe
    pub timeout: Duration,

    /// UDP retransmit interval
    pub retry_interval: Duration,

    /// Port the portmapper listens on
    pub portmap_port: u16,

    /// Version used when the mount has no hint
    pub default_version: u32,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            retry_interval: DEFAULT_RETRY_INTERVAL,
            portmap_port: rpc::PMAP_PORT,
            default_version: DEFAULT_NFS_VERSION,
        }
    }
}

impl ProbeConfig {
    /// Defaults with the given overall timeout
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            ..Self::default()
        }
    }

    /// Set UDP retransmit interval
    pub fn retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    /// Set portmapper port
    pub fn portmap_port(mut self, port: u16) -> Self {
        self.portmap_port = port;
        self
    }

    /// Set NFS version used when the mount does not specify one
    pub fn default_version(mut self, version: u32) -> Self {
        self.default_version = version;
        self
    }
}

/// Prober speaking ONC RPC to the portmapper and NFS server
#[derive(Debug, Clone, Default)]
pub struct RpcProber {
    config: ProbeConfig,
}

impl RpcProber {
    pub fn new(config: ProbeConfig) -> Self {
        Self { config }
    }

    fn candidates(&self, target: &ProbeTarget, deadline: &Deadline) -> ProbeResult<Vec<IpAddr>> {
        if let Some(addr) = target.addr {
            return Ok(vec![addr]);
        }
        let budget = deadline.remaining().ok_or_else(|| ProbeError::AddressResolution {
            host: target.host.clone(),
        })?;
        resolve_host(&target.host, budget)
    }

    /// Try each address in turn; the first that answers wins
    ///
    /// Every address gets an equal share of what is left of `deadline`,
    /// so a silent first address cannot starve the rest.
    fn check_addrs(
        &self,
        target: &ProbeTarget,
        addrs: &[IpAddr],
        deadline: &Deadline,
    ) -> ProbeResult<()> {
        let mut last_err = None;
        for (idx, &ip) in addrs.iter().enumerate() {
            let Some(remaining) = deadline.remaining() else {
                break;
            };
            let left = u32::try_from(addrs.len() - idx).unwrap_or(u32::MAX);
            let share = deadline.min_after(remaining / left);

            match self.probe_addr(target, ip, &share) {
                Ok(()) => {
                    info!(host = %target.host, %ip, "{} ok", target.host);
                    return Ok(());
                }
                Err(e) => {
                    debug!(host = %target.host, %ip, error = %e, "Address failed");
                    last_err = Some(e);
                }
            }
        }

        Err(last_err.unwrap_or_else(|| ProbeError::Rpc {
            host: target.host.clone(),
            reason: RpcFailure::TimedOut,
        }))
    }

    fn probe_addr(&self, target: &ProbeTarget, ip: IpAddr, deadline: &Deadline) -> ProbeResult<()> {
        let version = match target.version {
            0 => self.config.default_version,
            v => v,
        };
        // NFSv4 is stream-only
        let protocols: &[Protocol] = if version >= 4 {
            &[Protocol::Tcp]
        } else {
            target.protocol.candidates()
        };

        let mut last_err = None;
        for &protocol in protocols {
            match self.probe_transport(target, ip, version, protocol, deadline) {
                Ok(()) => return Ok(()),
                Err(e) if e.is_unreachable() => return Err(e),
                Err(e) => {
                    debug!(host = %target.host, %ip, %protocol, error = %e, "Transport failed");
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| ProbeError::Rpc {
            host: target.host.clone(),
            reason: RpcFailure::TimedOut,
        }))
    }

    fn probe_transport(
        &self,
        target: &ProbeTarget,
        ip: IpAddr,
        version: u32,
        protocol: Protocol,
        deadline: &Deadline,
    ) -> ProbeResult<()> {
        let port = match target.port {
            Some(port) if port != 0 => port,
            _ if version >= 4 => rpc::NFS_PORT,
            _ => self.lookup_port(target, ip, version, protocol, deadline)?,
        };

        let addr = SocketAddr::new(ip, port);
        debug!(host = %target.host, %addr, version, %protocol, "NULL call");
        client::call(
            protocol,
            addr,
            &RpcCall::null(rpc::NFS_PROGRAM, version),
            deadline,
            self.config.retry_interval,
        )
        .map(|_| ())
        .map_err(|e| call_error(&target.host, addr, e))
    }

    fn lookup_port(
        &self,
        target: &ProbeTarget,
        ip: IpAddr,
        version: u32,
        protocol: Protocol,
        deadline: &Deadline,
    ) -> ProbeResult<u16> {
        let pmap = SocketAddr::new(ip, self.config.portmap_port);
        let results = client::call_tcp(
            pmap,
            &RpcCall::getport(rpc::NFS_PROGRAM, version, protocol),
            deadline,
        )
        .map_err(|e| call_error(&target.host, pmap, e))?;

        let port = rpc::decode_getport(&results).map_err(|reason| ProbeError::Rpc {
            host: target.host.clone(),
            reason,
        })?;
        if port == 0 {
            return Err(ProbeError::ServiceNotRegistered {
                host: target.host.clone(),
                version,
            });
        }
        debug!(host = %target.host, port, version, %protocol, "Portmapper answered");
        Ok(port)
    }
}

fn call_error(host: &str, addr: SocketAddr, err: CallError) -> ProbeError {
    match err {
        CallError::Connect(e) if e.kind() == std::io::ErrorKind::TimedOut => {
            ProbeError::ConnectTimeout {
                host: host.to_string(),
                addr,
            }
        }
        CallError::Connect(e) => ProbeError::ConnectFailed {
            host: host.to_string(),
            addr,
            reason: e.to_string(),
        },
        CallError::Rpc(reason) => ProbeError::Rpc {
            host: host.to_string(),
            reason,
        },
    }
}

impl Prober for RpcProber {
    fn probe(&self, target: &ProbeTarget) -> ProbeResult<()> {
        if let Some(pid) = target.daemon_pid {
            return local::check_daemon(pid);
        }

        info!(host = %target.host, "Checking {}..", target.host);
        let deadline = Deadline::after(self.config.timeout);
        let addrs = self.candidates(target, &deadline)?;

        self.check_addrs(target, &addrs, &deadline).inspect_err(|err| {
            info!(host = %target.host, error = %err, "Server not responding");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nfs::rpc::accept_stat;
    use std::io::Write;
    use std::net::{Ipv4Addr, TcpListener};
    use std::thread;
    use std::time::Instant;

    fn loopback_target() -> ProbeTarget {
        ProbeTarget {
            addr: Some(IpAddr::V4(Ipv4Addr::LOCALHOST)),
            protocol: Protocol::Tcp,
            version: 3,
            ..ProbeTarget::host("localhost")
        }
    }

    /// Portmapper that answers every GETPORT with `port`
    fn fake_portmapper(port: u32) -> (u16, thread::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let pm_port = listener.local_addr().unwrap().port();
        let handle = thread::spawn(move || {
            let (mut conn, _) = listener.accept().unwrap();
            let msg = rpc::read_record(&mut conn).unwrap();
            let (header, _) = rpc::decode_call(&msg).unwrap();
            assert_eq!(header.program, rpc::PMAP_PROGRAM);
            let reply = rpc::encode_reply(header.xid, accept_stat::SUCCESS, &port.to_be_bytes());
            conn.write_all(&rpc::frame_record(&reply)).unwrap();
        });
        (pm_port, handle)
    }

    #[test]
    fn test_unregistered_service() {
        let (pm_port, handle) = fake_portmapper(0);
        let prober = RpcProber::new(ProbeConfig::new(Duration::from_secs(5)).portmap_port(pm_port));

        let err = prober.probe(&loopback_target()).unwrap_err();
        assert!(matches!(err, ProbeError::ServiceNotRegistered { version: 3, .. }));
        handle.join().unwrap();
    }

    #[test]
    fn test_fixed_port_skips_portmapper() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let handle = thread::spawn(move || {
            let (mut conn, _) = listener.accept().unwrap();
            let msg = rpc::read_record(&mut conn).unwrap();
            let (header, _) = rpc::decode_call(&msg).unwrap();
            assert_eq!(header.program, rpc::NFS_PROGRAM);
            assert_eq!(header.version, 3);
            let reply = rpc::encode_reply(header.xid, accept_stat::SUCCESS, &[]);
            conn.write_all(&rpc::frame_record(&reply)).unwrap();
        });

        // portmapper port points nowhere useful; it must not be used
        let prober = RpcProber::new(ProbeConfig::new(Duration::from_secs(5)).portmap_port(1));
        let target = ProbeTarget {
            port: Some(port),
            ..loopback_target()
        };
        assert!(prober.probe(&target).is_ok());
        handle.join().unwrap();
    }

    #[test]
    fn test_silent_portmapper_bounded() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let pm_port = listener.local_addr().unwrap().port();
        let timeout = Duration::from_millis(300);
        let prober = RpcProber::new(ProbeConfig::new(timeout).portmap_port(pm_port));

        let started = Instant::now();
        let err = prober.probe(&loopback_target()).unwrap_err();
        assert!(started.elapsed() < timeout + Duration::from_secs(1));
        assert!(matches!(
            err,
            ProbeError::Rpc {
                reason: RpcFailure::TimedOut,
                ..
            }
        ));
        drop(listener);
    }

    #[test]
    fn test_refused_portmapper() {
        let port = TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port();
        let prober = RpcProber::new(ProbeConfig::new(Duration::from_secs(2)).portmap_port(port));
        let err = prober.probe(&loopback_target()).unwrap_err();
        assert!(matches!(err, ProbeError::ConnectFailed { .. }));
    }

    #[test]
    fn test_silent_first_address_leaves_time_for_next() {
        // same port on two loopback addresses: the first never answers
        let silent = TcpListener::bind("127.0.0.2:0").unwrap();
        let port = silent.local_addr().unwrap().port();
        let listener = TcpListener::bind(("127.0.0.1", port)).unwrap();
        let handle = thread::spawn(move || {
            let (mut conn, _) = listener.accept().unwrap();
            let msg = rpc::read_record(&mut conn).unwrap();
            let (header, _) = rpc::decode_call(&msg).unwrap();
            let reply = rpc::encode_reply(header.xid, accept_stat::SUCCESS, &[]);
            conn.write_all(&rpc::frame_record(&reply)).unwrap();
        });

        let timeout = Duration::from_secs(2);
        let prober = RpcProber::new(ProbeConfig::new(timeout));
        let target = ProbeTarget {
            port: Some(port),
            ..loopback_target()
        };
        let addrs = [
            IpAddr::V4(Ipv4Addr::new(127, 0, 0, 2)),
            IpAddr::V4(Ipv4Addr::LOCALHOST),
        ];

        let started = Instant::now();
        let deadline = Deadline::after(timeout);
        prober.check_addrs(&target, &addrs, &deadline).unwrap();
        assert!(started.elapsed() < timeout);
        handle.join().unwrap();
        drop(silent);
    }

    #[test]
    fn test_daemon_hint_is_local() {
        let prober = RpcProber::default();
        let target = ProbeTarget::daemon(std::process::id());
        assert!(prober.probe(&target).is_ok());
    }
}
