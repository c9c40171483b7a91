//! Integration tests for the patcher client.
//!
//! The audio server is the in-memory one; instance directories live in
//! temp dirs. The last tests run the session front end against a fake
//! daemon socket.
//!
//! Tests CAN use `.unwrap()` and `.expect()`.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use fx_console::patcher::{
    patch_path, run_session, Patcher, PatcherAction, PatcherConfig, PatcherError, CLIENT_NAME,
    CONFIG_FILE,
};
use fx_core::PatchbayName;
use fx_jack::{JackTools, MemoryJack};
use fx_protocol::{OscArg, OscMessage, OscUrl, PatchbayDocument};
use tempfile::TempDir;
use tokio::net::UdpSocket;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

// ============================================================================
// Test Helpers
// ============================================================================

fn rack() -> Arc<MemoryJack> {
    Arc::new(
        MemoryJack::default()
            .output("system:capture_1", "mic_l")
            .input("system:playback_1", "out_l")
            .input("system:playback_2", "out_r")
            .output("synth:out", "synth"),
    )
}

fn wire(jack: &MemoryJack) {
    jack.connect("system:capture_1", "system:playback_1").unwrap();
    jack.connect("synth:out", "system:playback_2").unwrap();
}

fn name(s: &str) -> PatchbayName {
    PatchbayName::parse(s).unwrap()
}

fn saved_links(instance: &Path, patchbay: &str) -> usize {
    let contents = fs::read_to_string(patch_path(instance, &name(patchbay))).unwrap();
    PatchbayDocument::parse(&contents)
        .unwrap()
        .to_graph()
        .connection_set()
        .len()
}

fn opened(jack: &Arc<MemoryJack>, instance: &Path) -> Patcher {
    let mut patcher = Patcher::new(jack.clone());
    patcher
        .apply(PatcherAction::Open {
            instance: instance.to_path_buf(),
        })
        .unwrap();
    patcher
}

/// Opens `instance`, wires the rack and saves it as the current patchbay.
fn wired(jack: &Arc<MemoryJack>, instance: &Path) -> Patcher {
    let mut patcher = opened(jack, instance);
    wire(jack);
    patcher.apply(PatcherAction::Save).unwrap();
    patcher
}

// ============================================================================
// Patcher Actions
// ============================================================================

#[test]
fn test_first_open_starts_from_empty_graph() {
    let dir = TempDir::new().unwrap();
    let instance = dir.path().join("SessionFX-Patcher.nABCD");
    let jack = rack();
    wire(&jack);

    let patcher = opened(&jack, &instance);

    assert_eq!(patcher.current().as_str(), PatchbayName::DEFAULT);
    assert_eq!(
        fs::read_to_string(instance.join(CONFIG_FILE)).unwrap().trim(),
        PatchbayName::DEFAULT
    );
    assert!(jack.links().is_empty());
    assert_eq!(saved_links(&instance, PatchbayName::DEFAULT), 0);
}

#[test]
fn test_open_restores_saved_patchbay() {
    let dir = TempDir::new().unwrap();
    let jack = rack();
    let mut patcher = wired(&jack, dir.path());

    // Rewire by hand, then reopen: the saved patchbay wins.
    jack.disconnect("mic_l", "out_l").unwrap();
    jack.connect("synth", "out_l").unwrap();
    patcher
        .apply(PatcherAction::Open {
            instance: dir.path().to_path_buf(),
        })
        .unwrap();

    let mut links = jack.links();
    links.sort();
    assert_eq!(
        links,
        vec![
            ("synth:out".to_string(), "system:playback_2".to_string()),
            ("system:capture_1".to_string(), "system:playback_1".to_string()),
        ]
    );
}

#[test]
fn test_save_before_open_is_rejected() {
    let mut patcher = Patcher::new(rack());
    assert!(matches!(
        patcher.apply(PatcherAction::Save),
        Err(PatcherError::NotOpen)
    ));
}

#[test]
fn test_new_starts_empty_and_keeps_previous() {
    let dir = TempDir::new().unwrap();
    let jack = rack();
    let mut patcher = wired(&jack, dir.path());

    patcher.apply(PatcherAction::New(name("empty.pbay"))).unwrap();

    assert!(jack.links().is_empty());
    assert_eq!(patcher.current().as_str(), "empty.pbay");
    assert_eq!(saved_links(dir.path(), "empty.pbay"), 0);
    assert_eq!(saved_links(dir.path(), PatchbayName::DEFAULT), 2);
    assert_eq!(
        PatcherConfig::load(dir.path()).unwrap().current.as_str(),
        "empty.pbay"
    );
}

#[test]
fn test_load_switches_between_patchbays() {
    let dir = TempDir::new().unwrap();
    let jack = rack();
    let mut patcher = wired(&jack, dir.path());

    patcher.apply(PatcherAction::New(name("solo.pbay"))).unwrap();
    jack.connect("synth", "out_l").unwrap();

    let report = patcher
        .apply(PatcherAction::Load(name(PatchbayName::DEFAULT)))
        .unwrap();
    assert!(report.is_clean(), "failures: {:?}", report.failures);

    // Leaving solo.pbay saved its single link.
    assert_eq!(saved_links(dir.path(), "solo.pbay"), 1);
    assert_eq!(jack.links().len(), 2);
    assert_eq!(patcher.current().as_str(), PatchbayName::DEFAULT);
}

#[test]
fn test_load_unknown_patchbay_leaves_graph() {
    let dir = TempDir::new().unwrap();
    let jack = rack();
    let mut patcher = wired(&jack, dir.path());

    let err = patcher
        .apply(PatcherAction::Load(name("missing.pbay")))
        .unwrap_err();
    assert!(matches!(err, PatcherError::UnknownPatchbay(_)));
    assert_eq!(jack.links().len(), 2);
    assert_eq!(patcher.current().as_str(), PatchbayName::DEFAULT);
}

#[test]
fn test_load_corrupt_patchbay_leaves_graph() {
    let dir = TempDir::new().unwrap();
    let jack = rack();
    let mut patcher = wired(&jack, dir.path());
    fs::write(patch_path(dir.path(), &name("bad.pbay")), "[(1, 2)]").unwrap();

    let err = patcher.apply(PatcherAction::Load(name("bad.pbay"))).unwrap_err();
    assert!(matches!(err, PatcherError::Patchbay(_)));
    assert_eq!(jack.links().len(), 2);
}

#[test]
fn test_clear_disconnects_everything() {
    let dir = TempDir::new().unwrap();
    let jack = rack();
    let mut patcher = wired(&jack, dir.path());

    let report = patcher.apply(PatcherAction::Clear).unwrap();
    assert_eq!(report.attempted, 2);
    assert!(jack.links().is_empty());
    // Clearing does not touch the saved patchbay.
    assert_eq!(saved_links(dir.path(), PatchbayName::DEFAULT), 2);
}

// ============================================================================
// Session Mode
// ============================================================================

async fn recv(socket: &UdpSocket) -> (OscMessage, std::net::SocketAddr) {
    let mut buf = vec![0u8; 4096];
    let (len, from) = timeout(Duration::from_secs(5), socket.recv_from(&mut buf))
        .await
        .expect("timed out waiting for patcher")
        .unwrap();
    (OscMessage::decode(&buf[..len]).unwrap(), from)
}

#[tokio::test]
async fn test_session_announce_open_and_save() {
    let dir = TempDir::new().unwrap();
    let instance = dir.path().join("patcher");
    let jack = rack();
    wire(&jack);

    let daemon = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let daemon_url = OscUrl::new("127.0.0.1", daemon.local_addr().unwrap().port());
    let cancel = CancellationToken::new();

    let task = tokio::spawn({
        let tools: Arc<dyn JackTools> = jack.clone();
        let cancel = cancel.clone();
        async move { run_session(tools, &daemon_url, "nsm", "fx-patcher", cancel).await }
    });

    let (hello, client) = recv(&daemon).await;
    assert_eq!(hello.path, "/nsm/server/announce");
    assert_eq!(hello.str_arg(0), Some(CLIENT_NAME));
    assert_eq!(hello.type_tags(), "sssiii");
    assert!((8000..9000).contains(&client.port()));

    let open = OscMessage::new(
        "/nsm/client/open",
        vec![
            OscArg::from(instance.to_string_lossy().to_string()),
            OscArg::from("SessionFX-Patcher"),
            OscArg::from("nABCD"),
        ],
    );
    daemon.send_to(&open.encode(), client).await.unwrap();

    let (reply, _) = recv(&daemon).await;
    assert_eq!(reply.path, "/reply");
    assert_eq!(reply.str_arg(0), Some("/nsm/client/open"));
    assert_eq!(reply.str_arg(1), Some("OK"));
    assert!(instance.join(CONFIG_FILE).exists());
    assert!(jack.links().is_empty());

    let save = OscMessage::new("/nsm/client/save", Vec::new());
    daemon.send_to(&save.encode(), client).await.unwrap();
    let (reply, _) = recv(&daemon).await;
    assert_eq!(reply.str_arg(0), Some("/nsm/client/save"));
    assert_eq!(reply.str_arg(1), Some("OK"));

    cancel.cancel();
    timeout(Duration::from_secs(5), task)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_session_save_before_open_answers_error() {
    let jack = rack();
    let daemon = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let daemon_url = OscUrl::new("127.0.0.1", daemon.local_addr().unwrap().port());
    let cancel = CancellationToken::new();

    let task = tokio::spawn({
        let tools: Arc<dyn JackTools> = jack.clone();
        let cancel = cancel.clone();
        async move { run_session(tools, &daemon_url, "nsm", "fx-patcher", cancel).await }
    });

    let (_hello, client) = recv(&daemon).await;
    let save = OscMessage::new("/nsm/client/save", Vec::new());
    daemon.send_to(&save.encode(), client).await.unwrap();

    let (reply, _) = recv(&daemon).await;
    assert_eq!(reply.path, "/error");
    assert_eq!(reply.str_arg(0), Some("/nsm/client/save"));
    assert_eq!(reply.int_arg(1), Some(-1));

    cancel.cancel();
    task.await.unwrap().unwrap();
}
