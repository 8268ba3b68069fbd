//! Integration tests for nfs-pathcheck
//!
//! Directory trees live in temp dirs; network mounts are described with
//! in-memory or on-disk mount tables pointing into them. Liveness comes
//! either from a scripted prober or from fake RPC endpoints on loopback.

use nfs_pathcheck::driver::{Driver, DriverOptions, PathStatus};
use nfs_pathcheck::error::{CheckError, ProbeError, ProbeResult, WalkError};
use nfs_pathcheck::mount::{MountEntry, MountTableFile, StaticMounts};
use nfs_pathcheck::nfs::rpc::{self, accept_stat};
use nfs_pathcheck::nfs::{ProbeConfig, ProbeTarget, Prober, RpcProber};
use nfs_pathcheck::walker::WalkOptions;
use std::cell::RefCell;
use std::fs;
use std::io::Write;
use std::net::TcpListener;
use std::os::unix::fs::symlink;
use std::thread;
use std::time::{Duration, Instant};
use tempfile::{tempdir, TempDir};

/// Scripted prober: hosts listed in `dead` fail, every call is recorded
struct ScriptedProber {
    dead: Vec<&'static str>,
    calls: RefCell<Vec<String>>,
}

impl ScriptedProber {
    fn new(dead: &[&'static str]) -> Self {
        Self {
            dead: dead.to_vec(),
            calls: RefCell::new(Vec::new()),
        }
    }

    fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }
}

impl Prober for ScriptedProber {
    fn probe(&self, target: &ProbeTarget) -> ProbeResult<()> {
        self.calls.borrow_mut().push(target.identity.clone());
        if self.dead.contains(&target.identity.as_str()) {
            Err(ProbeError::AddressResolution {
                host: target.host.clone(),
            })
        } else {
            Ok(())
        }
    }
}

/// Temp tree with its canonical root
fn tree() -> (TempDir, String) {
    let dir = tempdir().unwrap();
    let base = dir.path().canonicalize().unwrap().to_str().unwrap().to_string();
    (dir, base)
}

fn nfs_mount(server: &str, dir: &str) -> MountEntry {
    MountEntry::new(&format!("{server}:/export"), dir, "nfs", "rw,vers=3")
}

fn driver<'a>(
    mounts: Vec<MountEntry>,
    prober: &'a ScriptedProber,
    options: DriverOptions,
) -> Driver<&'a ScriptedProber> {
    Driver::new(Box::new(StaticMounts(mounts)), prober, options).with_working_dir("/")
}

#[test]
fn test_local_paths_never_probe() {
    let (_dir, base) = tree();
    fs::create_dir_all(format!("{base}/usr/bin")).unwrap();
    let mounts = vec![nfs_mount("elsewhere", "/nfs/elsewhere")];
    let prober = ScriptedProber::new(&[]);

    let mut driver = driver(mounts, &prober, DriverOptions::default());
    let report = driver
        .run(&[format!("{base}/usr/bin"), format!("{base}/usr/missing")])
        .unwrap();

    assert_eq!(report.survivors, vec![format!("{base}/usr/bin")]);
    assert!(prober.calls().is_empty());
    assert_eq!(driver.cache().probe_count(), 0);
}

#[test]
fn test_dead_host_path_is_dropped() {
    let (_dir, base) = tree();
    fs::create_dir(format!("{base}/netmnt")).unwrap();
    // the mount point is absent: any filesystem call would fail differently
    let mount = format!("{base}/netmnt/deadhost");
    let prober = ScriptedProber::new(&["deadhost"]);

    let mut driver = driver(vec![nfs_mount("deadhost", &mount)], &prober, DriverOptions::default());
    let report = driver.run(&[format!("{mount}/bin")]).unwrap();

    assert!(!report.any_survived());
    assert_eq!(report.render(':'), None);
    match &report.verdicts[0].status {
        PathStatus::Skipped(WalkError::HostDead { host, .. }) => assert_eq!(host, "deadhost"),
        other => panic!("expected HostDead, got {other:?}"),
    }
    assert!(!report.verdicts[0].hosts[0].alive);
}

#[test]
fn test_alive_mount_is_traversed() {
    let (_dir, base) = tree();
    let mount = format!("{base}/netmnt/newton");
    fs::create_dir_all(format!("{mount}/bin")).unwrap();
    let prober = ScriptedProber::new(&[]);

    let mut driver = driver(vec![nfs_mount("newton", &mount)], &prober, DriverOptions::default());
    let report = driver.run(&[format!("{mount}/bin")]).unwrap();

    assert_eq!(report.survivors, vec![format!("{mount}/bin")]);
    assert_eq!(prober.calls(), vec!["newton"]);
    assert!(report.verdicts[0].hosts[0].alive);
}

#[test]
fn test_symlink_canonical_output() {
    let (_dir, base) = tree();
    fs::create_dir_all(format!("{base}/local/target")).unwrap();
    fs::create_dir(format!("{base}/netmnt")).unwrap();
    symlink(format!("{base}/local/target"), format!("{base}/netmnt/link")).unwrap();
    let prober = ScriptedProber::new(&[]);
    let input = format!("{base}/netmnt/link");

    let options = DriverOptions {
        canonical: true,
        ..DriverOptions::default()
    };
    let mut canonical = driver(vec![], &prober, options);
    let report = canonical.run(&[input.clone()]).unwrap();
    assert_eq!(report.survivors, vec![format!("{base}/local/target")]);

    let mut literal = driver(vec![], &prober, DriverOptions::default());
    let report = literal.run(&[input.clone()]).unwrap();
    assert_eq!(report.survivors, vec![input]);
}

#[test]
fn test_symlink_into_dead_mount() {
    let (_dir, base) = tree();
    fs::create_dir(format!("{base}/netmnt")).unwrap();
    let mount = format!("{base}/netmnt/zaphod");
    symlink(format!("{mount}/bin"), format!("{base}/shortcut")).unwrap();
    let prober = ScriptedProber::new(&["zaphod"]);

    let mut driver = driver(vec![nfs_mount("zaphod", &mount)], &prober, DriverOptions::default());
    let report = driver.run(&[format!("{base}/shortcut")]).unwrap();

    assert!(!report.any_survived());
    assert_eq!(prober.calls(), vec!["zaphod"]);
}

#[test]
fn test_relative_duplicates_unique() {
    let (_dir, base) = tree();
    fs::create_dir(format!("{base}/a")).unwrap();
    symlink(format!("{base}/a"), format!("{base}/b")).unwrap();
    let prober = ScriptedProber::new(&[]);

    let options = DriverOptions {
        unique: true,
        ..DriverOptions::default()
    };
    let mut unique = Driver::new(Box::new(StaticMounts::default()), &prober, options)
        .with_working_dir(base.clone());
    let report = unique.run(&["a", "a", "b"]).unwrap();
    assert_eq!(report.survivors, vec!["a"]);
    assert!(matches!(report.verdicts[1].status, PathStatus::Duplicate));
    assert!(matches!(report.verdicts[2].status, PathStatus::Duplicate));

    let mut all = Driver::new(
        Box::new(StaticMounts::default()),
        &prober,
        DriverOptions::default(),
    )
    .with_working_dir(base.clone());
    let report = all.run(&["a", "a"]).unwrap();
    assert_eq!(report.survivors, vec!["a", "a"]);
}

#[test]
fn test_one_probe_per_host() {
    let (_dir, base) = tree();
    let first = format!("{base}/nfs/one");
    let second = format!("{base}/nfs/two");
    fs::create_dir_all(&first).unwrap();
    fs::create_dir_all(&second).unwrap();
    let mounts = vec![nfs_mount("Server", &first), nfs_mount("server", &second)];
    let prober = ScriptedProber::new(&[]);

    let mut driver = driver(mounts, &prober, DriverOptions::default());
    let report = driver.run(&[first.clone(), second.clone(), first]).unwrap();

    assert_eq!(report.survivors.len(), 3);
    assert_eq!(prober.calls(), vec!["server"]);
    assert_eq!(driver.cache().probe_count(), 1);
    assert_eq!(report.verdicts[2].hosts.len(), 1);
}

#[test]
fn test_symlink_chain_longer_than_budget() {
    let (_dir, base) = tree();
    fs::create_dir(format!("{base}/end")).unwrap();
    let mut previous = format!("{base}/end");
    for i in 0..5 {
        let link = format!("{base}/link{i}");
        symlink(&previous, &link).unwrap();
        previous = link;
    }
    let prober = ScriptedProber::new(&[]);

    let options = |max_symlinks| DriverOptions {
        walk: WalkOptions {
            max_symlinks,
            ..WalkOptions::default()
        },
        ..DriverOptions::default()
    };

    let mut exact = driver(vec![], &prober, options(5));
    assert!(exact.run(&[previous.clone()]).unwrap().any_survived());

    let mut short = driver(vec![], &prober, options(4));
    let report = short.run(&[previous]).unwrap();
    assert!(matches!(
        report.verdicts[0].status,
        PathStatus::Skipped(WalkError::SymlinkDepthExceeded { .. })
    ));
}

#[test]
fn test_accept_any_type() {
    let (_dir, base) = tree();
    fs::write(format!("{base}/tool"), b"#!/bin/sh\n").unwrap();
    let prober = ScriptedProber::new(&[]);
    let input = format!("{base}/tool");

    let mut strict = driver(vec![], &prober, DriverOptions::default());
    let report = strict.run(&[input.clone()]).unwrap();
    assert!(matches!(
        report.verdicts[0].status,
        PathStatus::Skipped(WalkError::NotADirectory { .. })
    ));

    let options = DriverOptions {
        walk: WalkOptions {
            accept_any_type: true,
            ..WalkOptions::default()
        },
        ..DriverOptions::default()
    };
    let mut any = driver(vec![], &prober, options);
    assert_eq!(any.run(&[input.clone()]).unwrap().survivors, vec![input]);
}

#[test]
fn test_dot_paths_trusted_without_probe() {
    let prober = ScriptedProber::new(&["everything"]);
    let mut driver = driver(vec![], &prober, DriverOptions::default());
    let report = driver.run(&["./bin", ".hidden"]).unwrap();
    assert_eq!(report.survivors, vec!["./bin", ".hidden"]);
}

#[test]
fn test_missing_mount_table_is_fatal() {
    let (_dir, base) = tree();
    let prober = ScriptedProber::new(&[]);
    let mut driver = Driver::new(
        Box::new(MountTableFile::new(format!("{base}/no-such-mtab"))),
        &prober,
        DriverOptions::default(),
    );

    let err = driver.run(&[base]).unwrap_err();
    assert!(err.is_fatal());
    assert!(matches!(err, CheckError::MountTable(_)));
}

#[test]
fn test_mount_table_file() {
    let (_dir, base) = tree();
    let mount = format!("{base}/nfs/bardeen");
    fs::create_dir_all(&mount).unwrap();
    let table = format!("{base}/mtab");
    fs::write(
        &table,
        format!("/dev/sda1 / ext4 rw 0 0\nbardeen:/apps {mount} nfs rw,vers=3 0 0\n"),
    )
    .unwrap();
    let prober = ScriptedProber::new(&["bardeen"]);

    let mut driver = Driver::new(
        Box::new(MountTableFile::new(table)),
        &prober,
        DriverOptions::default(),
    );
    let report = driver.run(&[base.clone(), mount]).unwrap();
    assert_eq!(report.survivors, vec![base]);
}

#[test]
fn test_dotdot_climbs_out_of_directory() {
    let (_dir, base) = tree();
    fs::create_dir_all(format!("{base}/a/b")).unwrap();
    let prober = ScriptedProber::new(&[]);
    let options = DriverOptions {
        canonical: true,
        ..DriverOptions::default()
    };

    let mut driver = driver(vec![], &prober, options);
    let report = driver.run(&[format!("{base}/a/b/../..")]).unwrap();
    assert_eq!(report.survivors, vec![base]);
}

/// Portmapper and NFS NULL responder on loopback (TCP)
fn fake_nfs_server() -> (u16, Vec<thread::JoinHandle<()>>) {
    let nfs = TcpListener::bind("127.0.0.1:0").unwrap();
    let nfs_port = nfs.local_addr().unwrap().port();
    let pmap = TcpListener::bind("127.0.0.1:0").unwrap();
    let pmap_port = pmap.local_addr().unwrap().port();

    let pmap_handle = thread::spawn(move || {
        let (mut conn, _) = pmap.accept().unwrap();
        let msg = rpc::read_record(&mut conn).unwrap();
        let (header, _) = rpc::decode_call(&msg).unwrap();
        assert_eq!(header.program, rpc::PMAP_PROGRAM);
        assert_eq!(header.procedure, rpc::PMAPPROC_GETPORT);
        let port = u32::from(nfs_port).to_be_bytes();
        let reply = rpc::encode_reply(header.xid, accept_stat::SUCCESS, &port);
        conn.write_all(&rpc::frame_record(&reply)).unwrap();
    });

    let nfs_handle = thread::spawn(move || {
        let (mut conn, _) = nfs.accept().unwrap();
        let msg = rpc::read_record(&mut conn).unwrap();
        let (header, _) = rpc::decode_call(&msg).unwrap();
        assert_eq!(header.program, rpc::NFS_PROGRAM);
        assert_eq!(header.procedure, rpc::NULLPROC);
        let reply = rpc::encode_reply(header.xid, accept_stat::SUCCESS, &[]);
        conn.write_all(&rpc::frame_record(&reply)).unwrap();
    });

    (pmap_port, vec![pmap_handle, nfs_handle])
}

#[test]
fn test_rpc_prober_against_loopback_server() {
    let (_dir, base) = tree();
    let mount = format!("{base}/nfs/loop");
    fs::create_dir_all(format!("{mount}/bin")).unwrap();
    let (pmap_port, handles) = fake_nfs_server();

    let entry = MountEntry::new(
        "loophost:/export",
        &mount,
        "nfs",
        "rw,vers=3,proto=tcp,addr=127.0.0.1",
    );
    let prober = RpcProber::new(ProbeConfig::new(Duration::from_secs(5)).portmap_port(pmap_port));
    let mut driver = Driver::new(
        Box::new(StaticMounts(vec![entry])),
        prober,
        DriverOptions::default(),
    );

    let report = driver.run(&[format!("{mount}/bin")]).unwrap();
    assert_eq!(report.survivors, vec![format!("{mount}/bin")]);
    assert_eq!(driver.cache().probe_count(), 1);
    for handle in handles {
        handle.join().unwrap();
    }
}

#[test]
fn test_silent_server_bounded_by_timeout() {
    let (_dir, base) = tree();
    let mount = format!("{base}/nfs/silent");
    fs::create_dir_all(&mount).unwrap();
    // accepts connections, never answers
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    let entry = MountEntry::new(
        "silent:/export",
        &mount,
        "nfs",
        "rw,vers=3,proto=tcp,addr=127.0.0.1",
    );
    let timeout = Duration::from_secs(1);
    let prober = RpcProber::new(ProbeConfig::new(timeout).portmap_port(port));
    let mut driver = Driver::new(
        Box::new(StaticMounts(vec![entry])),
        prober,
        DriverOptions::default(),
    );

    let started = Instant::now();
    let report = driver.run(&[mount.clone(), mount]).unwrap();
    assert!(started.elapsed() < timeout + Duration::from_secs(2));

    assert!(!report.any_survived());
    assert_eq!(driver.cache().probe_count(), 1);
    match &report.verdicts[0].status {
        PathStatus::Skipped(WalkError::HostDead { source, .. }) => {
            assert!(source.is_unreachable())
        }
        other => panic!("expected HostDead, got {other:?}"),
    }
    drop(listener);
}
