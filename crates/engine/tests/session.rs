//! Drives whole sessions through the dispatcher the way a transport would.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use obexbox_auth::{AuthResponse, AuthState, Challenge, ChallengeOptions, Credentials, Realm};
use obexbox_engine::{
    AllowList, Event, EngineConfig, Object, Services, Session, Target, dispatch,
};
use obexbox_protocol::{Command, ConnectInfo, FTP_TARGET, Header, HeaderSet, ResponseCode};
use obexbox_storage::{
    Backend, BackendFactory, BackendKind, FileBackend, OpenKind, StorageConfig, StorageError,
    TransferContext, VirtualPath,
};

struct Reply {
    code: ResponseCode,
    headers: HeaderSet,
    body: Vec<u8>,
}

fn file_storage(root: &Path) -> Arc<dyn BackendFactory> {
    StorageConfig::new(root, BackendKind::File).into_factory()
}

fn session(config: EngineConfig) -> Session {
    Session::new(Arc::new(config), Some("127.0.0.1:40000".parse().unwrap()))
}

fn headers(list: Vec<Header>) -> HeaderSet {
    list.into_iter().collect()
}

/// Runs one request: hint, body chunks, final request, response body, complete.
fn exchange(
    session: &mut Session,
    command: Command,
    nonheader: &[u8],
    hdrs: HeaderSet,
    body: &[&[u8]],
) -> Reply {
    let object = Object::with_headers(hdrs.clone()).nonheader(nonheader);
    dispatch(session, Event::RequestHint, Some(command), &object);
    for chunk in body {
        let chunk_object = Object::with_headers(hdrs.clone()).body(chunk.to_vec());
        dispatch(session, Event::StreamAvailable, None, &chunk_object);
    }
    dispatch(session, Event::Request, Some(command), &object);

    let mut code = session.response().code;
    let headers = session.response().headers.clone();
    let mut out = Vec::new();
    if command == Command::Get && code.is_success() {
        loop {
            dispatch(session, Event::StreamEmpty, None, &Object::new());
            out.append(&mut session.response_mut().body);
            if session.response().last_chunk {
                break;
            }
        }
        code = session.response().code;
    }
    dispatch(session, Event::RequestComplete, Some(command), &Object::new());
    Reply {
        code,
        headers,
        body: out,
    }
}

fn connect(session: &mut Session, extra: Vec<Header>) -> Reply {
    let nonheader = ConnectInfo::new(0x2000).encode();
    exchange(session, Command::Connect, &nonheader, headers(extra), &[])
}

fn connect_ftp(session: &mut Session, mut extra: Vec<Header>) -> Reply {
    extra.insert(0, Header::Target(FTP_TARGET.as_bytes().to_vec()));
    connect(session, extra)
}

fn setpath(session: &mut Session, flags: u8, name: Option<&str>) -> ResponseCode {
    let hdrs = headers(name.map(|n| Header::Name(n.into())).into_iter().collect());
    exchange(session, Command::SetPath, &[flags, 0], hdrs, &[]).code
}

fn put(session: &mut Session, name: &str, body: &[u8]) -> ResponseCode {
    let hdrs = headers(vec![
        Header::Name(name.into()),
        Header::Length(body.len() as u32),
    ]);
    exchange(session, Command::Put, &[], hdrs, &[body]).code
}

fn get(session: &mut Session, hdrs: Vec<Header>) -> Reply {
    exchange(session, Command::Get, &[], headers(hdrs), &[])
}

fn realm_config(root: &Path) -> EngineConfig {
    let realm = Realm::new(
        Some("inbox".into()),
        ChallengeOptions::empty(),
        Arc::new(Credentials::new().with_anonymous("secret")),
    );
    EngineConfig::new(file_storage(root))
        .with_realms(vec![realm])
        .unwrap()
}

fn challenge_of(reply: &Reply) -> Challenge {
    let payload = reply
        .headers
        .iter()
        .find_map(|h| match h {
            Header::AuthChallenge(data) => Some(data.clone()),
            _ => None,
        })
        .expect("challenge header");
    Challenge::decode(&payload).unwrap()
}

fn answer(challenge: &Challenge, password: &str) -> Header {
    let rsp = AuthResponse::answer(&challenge.nonce, password, None);
    Header::AuthResponse(rsp.encode().unwrap())
}

#[test]
fn ftp_connect_setpath_put_scenario() {
    let tmp = tempfile::tempdir().unwrap();
    let mut s = session(EngineConfig::new(file_storage(tmp.path())));

    let reply = connect_ftp(&mut s, vec![]);
    assert_eq!(reply.code, ResponseCode::Success);
    assert_eq!(s.target(), Target::FileTransfer);
    assert!(
        reply
            .headers
            .iter()
            .any(|h| *h == Header::Who(FTP_TARGET.as_bytes().to_vec()))
    );
    assert!(reply.headers.connection_id().is_some());

    assert_eq!(setpath(&mut s, 0, Some("incoming")), ResponseCode::Success);
    assert!(tmp.path().join("incoming").is_dir());

    assert_eq!(put(&mut s, "a.txt", b"xyz"), ResponseCode::Success);
    assert_eq!(
        std::fs::read(tmp.path().join("incoming/a.txt")).unwrap(),
        b"xyz"
    );
}

#[test]
fn put_then_get_roundtrip() {
    let tmp = tempfile::tempdir().unwrap();
    let mut s = session(EngineConfig::new(file_storage(tmp.path())).with_mtu(300));
    assert_eq!(connect(&mut s, vec![]).code, ResponseCode::Success);
    assert_eq!(s.target(), Target::ObjectPush);

    let content: Vec<u8> = (0..2000u32).map(|i| (i % 251) as u8).collect();
    let time = "20230102T030405Z";
    let hdrs = headers(vec![
        Header::Name("data.bin".into()),
        Header::Length(content.len() as u32),
        Header::TimeIso(time.into()),
    ]);
    let chunks: Vec<&[u8]> = content.chunks(700).collect();
    let reply = exchange(&mut s, Command::Put, &[], hdrs, &chunks);
    assert_eq!(reply.code, ResponseCode::Success);

    let reply = get(&mut s, vec![Header::Name("data.bin".into())]);
    assert_eq!(reply.code, ResponseCode::Success);
    assert_eq!(reply.body, content);
    assert_eq!(reply.headers.length(), Some(content.len() as u32));
    assert!(
        reply
            .headers
            .iter()
            .any(|h| *h == Header::TimeIso(time.into()))
    );
}

#[test]
fn zero_byte_put_creates_empty_object() {
    let tmp = tempfile::tempdir().unwrap();
    let mut s = session(EngineConfig::new(file_storage(tmp.path())));
    connect(&mut s, vec![]);
    let hdrs = headers(vec![Header::Name("empty".into())]);
    let reply = exchange(&mut s, Command::Put, &[], hdrs, &[b""]);
    assert_eq!(reply.code, ResponseCode::Success);
    assert_eq!(std::fs::read(tmp.path().join("empty")).unwrap(), b"");
}

#[test]
fn put_rejects_invalid_names() {
    let tmp = tempfile::tempdir().unwrap();
    let mut s = session(EngineConfig::new(file_storage(tmp.path())));
    connect(&mut s, vec![]);
    assert_eq!(put(&mut s, "../escape", b"x"), ResponseCode::BadRequest);
    assert_eq!(put(&mut s, "a/b", b"x"), ResponseCode::BadRequest);
    assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 0);
}

#[test]
fn put_over_existing_object_is_forbidden() {
    let tmp = tempfile::tempdir().unwrap();
    std::fs::write(tmp.path().join("taken"), "old").unwrap();
    let mut s = session(EngineConfig::new(file_storage(tmp.path())));
    connect(&mut s, vec![]);
    assert_eq!(put(&mut s, "taken", b"new"), ResponseCode::Forbidden);
    assert_eq!(std::fs::read(tmp.path().join("taken")).unwrap(), b"old");
}

#[test]
fn abort_mid_put_removes_partial_object() {
    let tmp = tempfile::tempdir().unwrap();
    let mut s = session(EngineConfig::new(file_storage(tmp.path())));
    connect(&mut s, vec![]);

    let hdrs = headers(vec![Header::Name("big.bin".into()), Header::Length(100)]);
    dispatch(&mut s, Event::RequestHint, Some(Command::Put), &Object::with_headers(hdrs.clone()));
    dispatch(
        &mut s,
        Event::StreamAvailable,
        None,
        &Object::with_headers(hdrs).body(vec![1u8; 40]),
    );
    assert!(tmp.path().join("big.bin").exists());

    // Bare ABORT without the PUT opcode.
    dispatch(&mut s, Event::Request, Some(Command::Abort), &Object::new());
    assert_eq!(s.response().code, ResponseCode::Success);
    assert!(!tmp.path().join("big.bin").exists());

    // A second abort is harmless.
    dispatch(&mut s, Event::Abort, None, &Object::new());
    assert!(!tmp.path().join("big.bin").exists());
}

#[test]
fn link_error_mid_put_cleans_up_and_closes() {
    let tmp = tempfile::tempdir().unwrap();
    let mut s = session(EngineConfig::new(file_storage(tmp.path())));
    connect_ftp(&mut s, vec![]);

    let hdrs = headers(vec![Header::Name("x".into())]);
    dispatch(&mut s, Event::RequestHint, Some(Command::Put), &Object::with_headers(hdrs.clone()));
    dispatch(&mut s, Event::StreamAvailable, None, &Object::with_headers(hdrs).body(b"abc".to_vec()));
    dispatch(&mut s, Event::LinkError, None, &Object::new());

    assert!(!tmp.path().join("x").exists());
    assert!(s.is_closed());
    assert_eq!(s.target(), Target::None);
}

/// File backend whose writes fail after the first one.
struct FlakyBackend {
    inner: FileBackend,
    writes: usize,
}

impl Backend for FlakyBackend {
    fn name(&self) -> &'static str {
        "flaky"
    }
    fn open(&mut self, t: &mut TransferContext, kind: OpenKind) -> Result<(), StorageError> {
        self.inner.open(t, kind)
    }
    fn close(&mut self, t: &TransferContext, keep: bool) -> Result<(), StorageError> {
        self.inner.close(t, keep)
    }
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, StorageError> {
        self.inner.read(buf)
    }
    fn write(&mut self, buf: &[u8]) -> Result<usize, StorageError> {
        self.writes += 1;
        if self.writes > 1 {
            return Err(std::io::Error::other("disk full").into());
        }
        self.inner.write(buf)
    }
    fn check_directory(&mut self, path: &VirtualPath) -> Result<bool, StorageError> {
        self.inner.check_directory(path)
    }
    fn create_directory(&mut self, path: &VirtualPath) -> Result<(), StorageError> {
        self.inner.create_directory(path)
    }
    fn delete(&mut self, t: &TransferContext) -> Result<(), StorageError> {
        self.inner.delete(t)
    }
}

#[test]
fn failed_write_drains_and_leaves_no_partial_file() {
    let tmp = tempfile::tempdir().unwrap();
    let root: PathBuf = tmp.path().to_path_buf();
    let factory: Arc<dyn BackendFactory> = Arc::new(move || -> Box<dyn Backend> {
        Box::new(FlakyBackend {
            inner: FileBackend::new(root.clone()),
            writes: 0,
        })
    });
    let mut s = session(EngineConfig::new(factory));
    connect(&mut s, vec![]);

    let hdrs = headers(vec![Header::Name("f.bin".into())]);
    dispatch(&mut s, Event::RequestHint, Some(Command::Put), &Object::with_headers(hdrs.clone()));
    for _ in 0..3 {
        dispatch(
            &mut s,
            Event::StreamAvailable,
            None,
            &Object::with_headers(hdrs.clone()).body(vec![7u8; 10]),
        );
        // Still draining: no early failure on the wire.
        assert!(s.response().code.is_success());
    }
    dispatch(&mut s, Event::Request, Some(Command::Put), &Object::with_headers(hdrs));
    assert_eq!(s.response().code, ResponseCode::Forbidden);
    dispatch(&mut s, Event::RequestComplete, Some(Command::Put), &Object::new());
    assert!(!tmp.path().join("f.bin").exists());
}

#[test]
fn setpath_navigation() {
    let tmp = tempfile::tempdir().unwrap();
    let mut s = session(EngineConfig::new(file_storage(tmp.path())));
    connect_ftp(&mut s, vec![]);

    assert_eq!(setpath(&mut s, 0, Some("a")), ResponseCode::Success);
    assert_eq!(s.path().to_string(), "a");
    assert_eq!(setpath(&mut s, 0x01, None), ResponseCode::Success);
    assert_eq!(setpath(&mut s, 0x01, None), ResponseCode::Success);
    assert!(s.path().is_root());

    assert_eq!(setpath(&mut s, 0, Some("..")), ResponseCode::BadRequest);
    assert!(s.path().is_root());

    assert_eq!(setpath(&mut s, 0x02, Some("missing")), ResponseCode::BadRequest);
    assert!(s.path().is_root());
    assert!(!tmp.path().join("missing").exists());

    assert_eq!(setpath(&mut s, 0, Some("a")), ResponseCode::Success);
    assert_eq!(setpath(&mut s, 0, Some("b")), ResponseCode::Success);
    assert_eq!(s.path().to_string(), "a/b");
    assert_eq!(setpath(&mut s, 0x01, Some("c")), ResponseCode::Success);
    assert_eq!(s.path().to_string(), "a/c");
    assert_eq!(setpath(&mut s, 0, Some("")), ResponseCode::Success);
    assert!(s.path().is_root());
}

#[test]
fn setpath_needs_file_transfer() {
    let tmp = tempfile::tempdir().unwrap();
    let mut s = session(EngineConfig::new(file_storage(tmp.path())));
    connect(&mut s, vec![]);
    assert_eq!(setpath(&mut s, 0, Some("a")), ResponseCode::Forbidden);
    assert!(!tmp.path().join("a").exists());
}

#[test]
fn folder_listing_requires_file_transfer() {
    let tmp = tempfile::tempdir().unwrap();
    std::fs::write(tmp.path().join("one.txt"), "1").unwrap();
    let listing = || vec![Header::Type("x-obex/folder-listing".into())];

    let mut push = session(EngineConfig::new(file_storage(tmp.path())));
    connect(&mut push, vec![]);
    assert_eq!(get(&mut push, listing()).code, ResponseCode::Forbidden);

    let mut ftp = session(EngineConfig::new(file_storage(tmp.path())));
    connect_ftp(&mut ftp, vec![]);
    let reply = get(&mut ftp, listing());
    assert_eq!(reply.code, ResponseCode::Success);
    assert_eq!(reply.headers.length(), Some(reply.body.len() as u32));
    let xml = String::from_utf8(reply.body).unwrap();
    assert!(xml.contains("<folder-listing version=\"1.0\">"));
    assert!(xml.contains("one.txt"));
}

#[test]
fn get_admissibility() {
    let tmp = tempfile::tempdir().unwrap();
    let mut s = session(EngineConfig::new(file_storage(tmp.path())));
    connect(&mut s, vec![]);

    assert_eq!(get(&mut s, vec![Header::Type("text/plain".into())]).code, ResponseCode::Forbidden);
    assert_eq!(get(&mut s, vec![Header::Name("".into())]).code, ResponseCode::Forbidden);
    assert_eq!(
        get(&mut s, vec![Header::Name("absent".into())]).code,
        ResponseCode::InternalServerError
    );

    let caps = get(&mut s, vec![Header::Type("x-obex/capability".into())]);
    assert_eq!(caps.code, ResponseCode::Success);
    assert!(String::from_utf8(caps.body).unwrap().contains("<Capability"));
}

#[test]
fn put_without_body_deletes_under_file_transfer() {
    let tmp = tempfile::tempdir().unwrap();
    std::fs::write(tmp.path().join("old.txt"), "x").unwrap();

    let mut push = session(EngineConfig::new(file_storage(tmp.path())));
    connect(&mut push, vec![]);
    let hdrs = headers(vec![Header::Name("old.txt".into())]);
    assert_eq!(
        exchange(&mut push, Command::Put, &[], hdrs.clone(), &[]).code,
        ResponseCode::Forbidden
    );
    assert!(tmp.path().join("old.txt").exists());

    let mut ftp = session(EngineConfig::new(file_storage(tmp.path())));
    connect_ftp(&mut ftp, vec![]);
    assert_eq!(
        exchange(&mut ftp, Command::Put, &[], hdrs, &[]).code,
        ResponseCode::Success
    );
    assert!(!tmp.path().join("old.txt").exists());
}

#[test]
fn authentication_flow() {
    let tmp = tempfile::tempdir().unwrap();
    let mut s = session(realm_config(tmp.path()));

    let first = connect(&mut s, vec![]);
    assert_eq!(first.code, ResponseCode::Unauthorized);
    assert_eq!(s.auth_state(), AuthState::ChallengeSent);
    assert_eq!(s.target(), Target::None);
    let challenge = challenge_of(&first);
    assert_eq!(challenge.realm.as_deref(), Some("inbox"));

    // Not yet verified: the PUT is silently dropped.
    assert_eq!(put(&mut s, "early.txt", b"x"), ResponseCode::NotImplemented);
    assert!(!tmp.path().join("early.txt").exists());

    let second = connect(&mut s, vec![answer(&challenge, "secret")]);
    assert_eq!(second.code, ResponseCode::Success);
    assert_eq!(s.auth_state(), AuthState::Verified);
    assert_eq!(s.target(), Target::ObjectPush);

    assert_eq!(put(&mut s, "late.txt", b"ok"), ResponseCode::Success);
    assert!(tmp.path().join("late.txt").exists());
}

#[test]
fn wrong_digest_fails_without_state_corruption() {
    let tmp = tempfile::tempdir().unwrap();
    let mut s = session(realm_config(tmp.path()));
    let challenge = challenge_of(&connect(&mut s, vec![]));

    let reply = connect(&mut s, vec![answer(&challenge, "guess")]);
    assert_eq!(reply.code, ResponseCode::BadRequest);
    assert_eq!(s.auth_state(), AuthState::ChallengeSent);
    assert_eq!(s.target(), Target::None);
}

#[test]
fn stale_nonce_is_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    let mut s = session(realm_config(tmp.path()));
    let stale = challenge_of(&connect(&mut s, vec![]));
    let _fresh = challenge_of(&connect(&mut s, vec![]));

    let reply = connect(&mut s, vec![answer(&stale, "secret")]);
    assert_eq!(reply.code, ResponseCode::BadRequest);
    assert_eq!(s.auth_state(), AuthState::ChallengeSent);
}

#[test]
fn unknown_target_and_disabled_service() {
    let tmp = tempfile::tempdir().unwrap();
    let mut s = session(EngineConfig::new(file_storage(tmp.path())));
    let reply = connect(&mut s, vec![Header::Target(vec![0xAA; 16])]);
    assert_eq!(reply.code, ResponseCode::BadRequest);
    assert_eq!(s.target(), Target::None);

    let config = EngineConfig::new(file_storage(tmp.path())).with_services(Services::OBJECT_PUSH);
    let mut s = session(config);
    assert_eq!(connect_ftp(&mut s, vec![]).code, ResponseCode::BadRequest);
}

#[test]
fn commands_before_connect_are_forbidden() {
    let tmp = tempfile::tempdir().unwrap();
    let mut s = session(EngineConfig::new(file_storage(tmp.path())));
    assert_eq!(put(&mut s, "x", b"1"), ResponseCode::Forbidden);
    assert!(!tmp.path().join("x").exists());
}

#[test]
fn unknown_commands_are_not_implemented() {
    let tmp = tempfile::tempdir().unwrap();
    let mut s = session(EngineConfig::new(file_storage(tmp.path())));
    connect(&mut s, vec![]);
    let reply = exchange(&mut s, Command::Other(0x06), &[], HeaderSet::new(), &[]);
    assert_eq!(reply.code, ResponseCode::NotImplemented);
}

#[test]
fn disconnect_tears_down() {
    let tmp = tempfile::tempdir().unwrap();
    let mut s = session(EngineConfig::new(file_storage(tmp.path())));
    connect_ftp(&mut s, vec![]);
    setpath(&mut s, 0, Some("d"));
    let reply = exchange(&mut s, Command::Disconnect, &[], HeaderSet::new(), &[]);
    assert_eq!(reply.code, ResponseCode::Success);
    assert_eq!(s.target(), Target::None);
    assert!(s.path().is_root());
    assert!(s.is_closed());
}

#[test]
fn peer_outside_allow_list_gets_no_transfers() {
    let tmp = tempfile::tempdir().unwrap();
    std::fs::write(tmp.path().join("kept.txt"), "kept").unwrap();
    let config = EngineConfig::new(file_storage(tmp.path()))
        .with_access(Arc::new(AllowList::new(["10.0.0.9".parse().unwrap()])));
    let mut s = session(config);

    assert_eq!(connect_ftp(&mut s, vec![]).code, ResponseCode::Success);
    assert_eq!(s.target(), Target::FileTransfer);

    assert_eq!(put(&mut s, "new.txt", b"data"), ResponseCode::NotImplemented);
    assert!(!tmp.path().join("new.txt").exists());

    let reply = get(&mut s, vec![Header::Name("kept.txt".into())]);
    assert_eq!(reply.code, ResponseCode::NotImplemented);
    assert!(reply.headers.is_empty());
    assert!(reply.body.is_empty());

    assert_eq!(setpath(&mut s, 0, Some("sub")), ResponseCode::NotImplemented);
    assert!(!tmp.path().join("sub").exists());
    assert!(s.path().is_root());

    let reply = exchange(&mut s, Command::Disconnect, &[], HeaderSet::new(), &[]);
    assert_eq!(reply.code, ResponseCode::Success);
    assert!(s.is_closed());
}

#[test]
fn peer_on_allow_list_transfers() {
    let tmp = tempfile::tempdir().unwrap();
    let config = EngineConfig::new(file_storage(tmp.path()))
        .with_access(Arc::new(AllowList::new(["127.0.0.1".parse().unwrap()])));
    let mut s = session(config);
    connect(&mut s, vec![]);
    assert_eq!(put(&mut s, "in.txt", b"ok"), ResponseCode::Success);
    assert_eq!(std::fs::read(tmp.path().join("in.txt")).unwrap(), b"ok");
}

#[cfg(unix)]
#[test]
fn get_shorter_than_announced_is_an_error() {
    use std::os::unix::fs::PermissionsExt;

    // One helper dies after a partial body, the other exits cleanly but
    // still delivers less than it announced.
    for status in [1, 0] {
        let tmp = tempfile::tempdir().unwrap();
        let helper = tmp.path().join("helper.sh");
        let script = format!(
            "#!/bin/sh\ncat > /dev/null\nprintf 'Length: 10\\n\\nabc'\nexit {status}\n"
        );
        std::fs::write(&helper, script).unwrap();
        std::fs::set_permissions(&helper, std::fs::Permissions::from_mode(0o755)).unwrap();

        let storage =
            StorageConfig::new(tmp.path(), BackendKind::Script { helper }).into_factory();
        let mut s = session(EngineConfig::new(storage));
        connect(&mut s, vec![]);

        let reply = get(&mut s, vec![Header::Name("x".into())]);
        assert_eq!(reply.headers.length(), Some(10));
        assert_eq!(reply.code, ResponseCode::InternalServerError, "exit {status}");
        assert!(reply.body.len() < 10);
    }
}
