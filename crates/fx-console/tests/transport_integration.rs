//! Loopback tests for the transport and listeners.
//!
//! A plain UDP socket plays the session daemon: it receives what the
//! console sends through its [`DaemonLink`] and answers the endpoint the
//! message came from.
//!
//! Tests CAN use `.unwrap()` and `.expect()`.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use fx_console::listener::{discovery_table, reply_table, Notice, NoticeKind};
use fx_console::{spawn_session, DaemonLink, Endpoint, SessionHandle};
use fx_core::{SessionName, SessionStatus};
use fx_protocol::{ErrorReply, OscArg, OscMessage, Reply, ServerCommand};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

// ============================================================================
// Test Helpers
// ============================================================================

struct Harness {
    daemon: UdpSocket,
    session: SessionHandle,
    notices: mpsc::Receiver<Notice>,
    cancel: CancellationToken,
}

async fn harness() -> Harness {
    let daemon = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let endpoint = Endpoint::bind_loopback().await.unwrap();
    let link = DaemonLink::new(endpoint.clone(), daemon.local_addr().unwrap());
    let session = spawn_session(Arc::new(link), "nsm");

    let (notice_tx, notices) = mpsc::channel(16);
    let cancel = CancellationToken::new();
    endpoint.listen(reply_table(session.clone(), notice_tx), cancel.clone());

    Harness {
        daemon,
        session,
        notices,
        cancel,
    }
}

async fn daemon_recv(daemon: &UdpSocket) -> (OscMessage, SocketAddr) {
    let mut buf = vec![0u8; 4096];
    let (len, from) = timeout(Duration::from_secs(5), daemon.recv_from(&mut buf))
        .await
        .expect("nothing reached the daemon")
        .unwrap();
    (OscMessage::decode(&buf[..len]).unwrap(), from)
}

async fn next_notice(notices: &mut mpsc::Receiver<Notice>) -> Notice {
    timeout(Duration::from_secs(5), notices.recv())
        .await
        .expect("no notice")
        .expect("notice channel closed")
}

/// Polls until nothing is outstanding; replies are recorded asynchronously.
async fn settled(session: &SessionHandle) -> usize {
    for _ in 0..50 {
        let outstanding = session.snapshot().await.outstanding;
        if outstanding == 0 {
            return 0;
        }
        sleep(Duration::from_millis(20)).await;
    }
    session.snapshot().await.outstanding
}

// ============================================================================
// Reply Path
// ============================================================================

#[tokio::test]
async fn test_reply_reaches_session_and_console() {
    let mut h = harness().await;

    h.session
        .execute(ServerCommand::Open {
            project: SessionName::new("demo"),
        })
        .await
        .unwrap();

    let (sent, console) = daemon_recv(&h.daemon).await;
    assert_eq!(sent.path, "/nsm/server/open");
    assert_eq!(sent.args, vec![OscArg::Str("demo".to_string())]);

    let reply = Reply {
        path: sent.path.clone(),
        message: "Loaded.".to_string(),
    };
    h.daemon
        .send_to(&reply.to_message().encode(), console)
        .await
        .unwrap();

    let notice = next_notice(&mut h.notices).await;
    assert_eq!(notice.kind, NoticeKind::Reply(reply));
    assert_eq!(settled(&h.session).await, 0);
    assert_eq!(h.session.snapshot().await.status, SessionStatus::Open);

    h.cancel.cancel();
}

#[tokio::test]
async fn test_error_reply_is_shown() {
    let mut h = harness().await;

    h.session.execute(ServerCommand::Save).await.unwrap();
    let (sent, console) = daemon_recv(&h.daemon).await;

    let err = ErrorReply {
        path: sent.path,
        code: -6,
        message: "No session open".to_string(),
    };
    h.daemon
        .send_to(&err.to_message().encode(), console)
        .await
        .unwrap();

    let notice = next_notice(&mut h.notices).await;
    assert!(notice.to_string().contains("/nsm/server/save failed (-6)"));
    assert_eq!(settled(&h.session).await, 0);

    h.cancel.cancel();
}

#[tokio::test]
async fn test_heartbeat_and_garbage_are_not_shown() {
    let mut h = harness().await;

    h.session.execute(ServerCommand::List).await.unwrap();
    let (sent, console) = daemon_recv(&h.daemon).await;

    let heartbeat = Reply {
        path: sent.path.clone(),
        message: String::new(),
    };
    h.daemon
        .send_to(&heartbeat.to_message().encode(), console)
        .await
        .unwrap();
    h.daemon.send_to(b"not osc", console).await.unwrap();

    let listing = Reply {
        path: sent.path,
        message: "demo".to_string(),
    };
    h.daemon
        .send_to(&listing.to_message().encode(), console)
        .await
        .unwrap();

    // The first notice is the real listing.
    let notice = next_notice(&mut h.notices).await;
    assert_eq!(notice.kind, NoticeKind::Reply(listing));

    h.cancel.cancel();
}

#[tokio::test]
async fn test_heartbeat_settles_outstanding_command() {
    let mut h = harness().await;

    h.session.execute(ServerCommand::Save).await.unwrap();
    let (sent, console) = daemon_recv(&h.daemon).await;
    assert_eq!(h.session.snapshot().await.outstanding, 1);

    let heartbeat = Reply {
        path: sent.path,
        message: String::new(),
    };
    h.daemon
        .send_to(&heartbeat.to_message().encode(), console)
        .await
        .unwrap();

    assert_eq!(settled(&h.session).await, 0);
    assert!(timeout(Duration::from_millis(200), h.notices.recv())
        .await
        .is_err());

    h.cancel.cancel();
}

// ============================================================================
// Discovery Path
// ============================================================================

#[tokio::test]
async fn test_discovery_announcement_is_shown() {
    let control = Endpoint::bind_loopback().await.unwrap();
    let (notice_tx, mut notices) = mpsc::channel(16);
    let cancel = CancellationToken::new();
    let task = control.listen(discovery_table("nsm", notice_tx), cancel.clone());

    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let hello = OscMessage::new(
        "/nsm/new/client",
        vec![OscArg::from("nABCD"), OscArg::Int(8123)],
    );
    client
        .send_to(&hello.encode(), control.local_addr())
        .await
        .unwrap();

    let notice = next_notice(&mut notices).await;
    assert!(notice.to_string().contains("client nABCD registered on port 8123"));

    cancel.cancel();
    timeout(Duration::from_secs(5), task).await.unwrap().unwrap();
}
