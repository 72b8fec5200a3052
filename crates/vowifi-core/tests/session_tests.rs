//! Session behavior over real loopback sockets and a mock MMSC

use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use mms_vowifi_core::prelude::*;
use mms_vowifi_core::StaticResolver;
#[cfg(target_os = "linux")]
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const NETWORK_ID: i32 = 104;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("mms_vowifi_core=debug")
        .with_test_writer()
        .try_init();
}

fn ip(text: &str) -> IpAddr {
    text.parse().unwrap()
}

fn session_with(resolver: Arc<StaticResolver>, local_ipv4: &str) -> NetworkSession {
    NetworkSession::builder(NETWORK_ID, 1)
        .sub_id(1)
        .apn_type(ApnType::MMS)
        .state(SessionState::Connected)
        .local_ipv4(local_ipv4)
        .resolver(resolver)
        .build()
}

#[test]
fn copies_are_never_torn() {
    let session = Arc::new(NetworkSession::builder(NETWORK_ID, 1).build());
    let stop = Arc::new(AtomicBool::new(false));

    let writer = {
        let session = session.clone();
        let stop = stop.clone();
        thread::spawn(move || {
            let mut i: u32 = 0;
            while !stop.load(Ordering::Relaxed) {
                i = i.wrapping_add(1);
                let tag = i.to_string();
                session.update(|fields| {
                    fields.local_ipv4 = Some(tag.clone());
                    fields.dns_ipv4 = Some(tag.clone());
                    fields.network_id = i as i32;
                    fields.prefer_ipv4 = i % 2 == 0;
                });
            }
        })
    };

    for _ in 0..20_000 {
        let copy = (*session).clone();
        let snap = copy.snapshot();
        assert_eq!(snap.local_ipv4, snap.dns_ipv4);
        if let Some(tag) = &snap.local_ipv4 {
            let i: u32 = tag.parse().unwrap();
            assert_eq!(snap.network_id, i as i32);
            assert_eq!(snap.prefer_ipv4, i % 2 == 0);
        }
    }

    stop.store(true, Ordering::Relaxed);
    writer.join().unwrap();
}

#[tokio::test]
async fn resolution_follows_runtime_preference() {
    init_tracing();
    let resolver = Arc::new(StaticResolver::new().with_host(
        "mmsc.test",
        [ip("2001:db8::1"), ip("10.0.0.1"), ip("2001:db8::2"), ip("10.0.0.2")],
    ));
    let session = session_with(resolver.clone(), "10.0.0.9");

    assert_eq!(
        session.resolve_all("mmsc.test").await.unwrap(),
        vec![ip("10.0.0.1"), ip("10.0.0.2"), ip("2001:db8::1"), ip("2001:db8::2")]
    );
    assert_eq!(session.resolve_one("mmsc.test").await.unwrap(), Some(ip("10.0.0.1")));

    session.set_prefer_ipv4(false);
    assert_eq!(
        session.resolve_all("mmsc.test").await.unwrap(),
        vec![ip("2001:db8::1"), ip("2001:db8::2"), ip("10.0.0.1"), ip("10.0.0.2")]
    );

    // Every lookup went to the session's network
    assert!(resolver.queries().iter().all(|(_, net)| *net == NETWORK_ID));

    session.set_network_id(105);
    session.resolve_one("mmsc.test").await.unwrap();
    assert_eq!(resolver.queries().last().unwrap().1, 105);
}

#[tokio::test]
async fn resolve_one_has_no_family_fallback() {
    let resolver = Arc::new(StaticResolver::new().with_host("v6only.test", [ip("2001:db8::1")]));
    let session = session_with(resolver, "10.0.0.9");

    assert_eq!(session.resolve_one("v6only.test").await.unwrap(), None);
    assert_eq!(session.resolve_all("v6only.test").await.unwrap(), vec![ip("2001:db8::1")]);
}

#[tokio::test]
async fn unknown_host_is_reported() {
    let session = session_with(Arc::new(StaticResolver::new()), "127.0.0.1");

    assert!(session.resolve_all("nowhere.test").await.unwrap_err().is_unknown_host());
    let err = session
        .socket_factory()
        .connect_host("nowhere.test", 80)
        .await
        .unwrap_err();
    assert!(err.is_unknown_host());
}

#[tokio::test]
async fn connects_from_the_session_address() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let server = listener.local_addr().unwrap();
    let resolver = Arc::new(StaticResolver::new().with_host("mmsc.test", [server.ip()]));
    let session = session_with(resolver, "127.0.0.1");

    let factory = session.socket_factory();
    let stream = factory.connect_host("mmsc.test", server.port()).await.unwrap();
    assert_eq!(stream.peer_addr().unwrap(), server);
    assert_eq!(stream.local_addr().unwrap().ip(), ip("127.0.0.1"));

    let stream = factory.connect_addr(server.ip(), server.port()).await.unwrap();
    assert_eq!(stream.peer_addr().unwrap(), server);

    let socket = factory.unconnected().unwrap();
    let stream = socket.connect(server).await.unwrap();
    assert_eq!(stream.local_addr().unwrap().ip(), ip("127.0.0.1"));
}

#[tokio::test]
async fn caller_local_address_used_without_session_address() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let server = listener.local_addr().unwrap();
    // Prefers IPv4 but has no IPv4 address: nothing to bind by default
    let session = NetworkSession::builder(NETWORK_ID, 1)
        .local_ipv6("2001:db8::2")
        .resolver(Arc::new(StaticResolver::new().with_host("mmsc.test", [server.ip()])))
        .build();

    let factory = session.socket_factory();
    assert_eq!(factory.local_addr(), None);

    let stream = factory
        .connect_addr_from(server.ip(), server.port(), Some(ip("127.0.0.1")), 0)
        .await
        .unwrap();
    assert_eq!(stream.local_addr().unwrap().ip(), ip("127.0.0.1"));

    let stream = factory
        .connect_host_from("mmsc.test", server.port(), Some(ip("127.0.0.1")), 0)
        .await
        .unwrap();
    assert_eq!(stream.peer_addr().unwrap(), server);
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn binds_to_non_default_loopback_address() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let server = listener.local_addr().unwrap();
    let session = session_with(Arc::new(StaticResolver::new()), "127.0.0.5");

    let stream = session
        .socket_factory()
        .connect_addr(server.ip(), server.port())
        .await
        .unwrap();
    assert_eq!(stream.local_addr().unwrap().ip(), ip("127.0.0.5"));
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn session_address_wins_over_caller_address() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let server = listener.local_addr().unwrap();
    let resolver = Arc::new(StaticResolver::new().with_host("mmsc.test", [server.ip()]));
    let factory = session_with(resolver, "127.0.0.5").socket_factory();

    let stream = factory
        .connect_host_from("mmsc.test", server.port(), Some(ip("127.0.0.1")), 0)
        .await
        .unwrap();
    assert_eq!(stream.local_addr().unwrap().ip(), ip("127.0.0.5"));
    assert_eq!(stream.peer_addr().unwrap(), server);

    let stream = factory
        .connect_addr_from(server.ip(), server.port(), Some(ip("127.0.0.1")), 0)
        .await
        .unwrap();
    assert_eq!(stream.local_addr().unwrap().ip(), ip("127.0.0.5"));
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn falls_through_refused_candidates() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let server = listener.local_addr().unwrap();
    // Nothing listens on .2 and .3, so those connects are refused
    let resolver = Arc::new(StaticResolver::new().with_host(
        "mmsc.test",
        [ip("127.0.0.2"), ip("127.0.0.3"), ip("127.0.0.1")],
    ));
    let session = session_with(resolver, "127.0.0.1");

    let stream = session
        .socket_factory()
        .connect_host("mmsc.test", server.port())
        .await
        .unwrap();
    assert_eq!(stream.peer_addr().unwrap(), SocketAddr::new(ip("127.0.0.1"), server.port()));
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn all_candidates_refused_surfaces_io_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let resolver = Arc::new(StaticResolver::new().with_host(
        "mmsc.test",
        [ip("127.0.0.2"), ip("127.0.0.3"), ip("127.0.0.4")],
    ));
    let session = session_with(resolver, "127.0.0.1");

    let err = session
        .socket_factory()
        .connect_host("mmsc.test", port)
        .await
        .unwrap_err();
    match err {
        Error::Io(e) => assert_eq!(e.kind(), std::io::ErrorKind::ConnectionRefused),
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn http_pool_is_built_once_under_contention() {
    let session = Arc::new(session_with(Arc::new(StaticResolver::new()), "127.0.0.1"));
    let barrier = Arc::new(tokio::sync::Barrier::new(16));

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let session = session.clone();
            let barrier = barrier.clone();
            tokio::spawn(async move {
                barrier.wait().await;
                session.connection_factory().unwrap()
            })
        })
        .collect();

    let factories: Vec<_> = futures::future::join_all(handles)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    assert!(factories.iter().all(|f| Arc::ptr_eq(f, &factories[0])));
    assert!(Arc::ptr_eq(&session.connection_factory().unwrap(), &factories[0]));
    assert_eq!(factories[0].local_addr(), Some(ip("127.0.0.1")));
}

#[tokio::test]
async fn sessions_do_not_share_pools() {
    let a = session_with(Arc::new(StaticResolver::new()), "127.0.0.1");
    let b = a.clone();
    assert!(!Arc::ptr_eq(&a.connection_factory().unwrap(), &b.connection_factory().unwrap()));
}

#[tokio::test]
async fn http_requests_resolve_on_the_session() {
    init_tracing();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/mms"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .expect(1)
        .mount(&server)
        .await;

    let resolver = Arc::new(StaticResolver::new().with_host("mmsc.test", [server.address().ip()]));
    let session = session_with(resolver.clone(), "127.0.0.1")
        .with_pool_settings(PoolSettings::default());

    let url = format!("http://mmsc.test:{}/mms", server.address().port());
    let connection = session.open_connection(&url).unwrap();
    assert_eq!(connection.url().host_str(), Some("mmsc.test"));

    let response = connection.post().body("m-send-req").send().await.unwrap();
    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(response.text().await.unwrap(), "ok");

    assert!(resolver
        .queries()
        .contains(&("mmsc.test".to_string(), NETWORK_ID)));
}

#[tokio::test]
async fn http_fails_for_names_unknown_to_the_network() {
    let session = session_with(Arc::new(StaticResolver::new()), "127.0.0.1");
    let connection = session.open_connection("http://nowhere.test/mms").unwrap();
    assert!(connection.get().send().await.is_err());
}

#[tokio::test]
async fn rejects_non_http_urls() {
    let session = session_with(Arc::new(StaticResolver::new()), "127.0.0.1");
    assert!(matches!(
        session.open_connection("ftp://mmsc.test/mms"),
        Err(Error::MalformedUrl(_))
    ));

    let proxy = ConnectionProxy::Http("http://127.0.0.1:3128".parse().unwrap());
    let connection = session.open_connection_via("http://mmsc.test/mms", &proxy).unwrap();
    assert_eq!(connection.url().path(), "/mms");
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn http_traffic_leaves_from_session_address() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let server = listener.local_addr().unwrap();

    let mmsc = tokio::spawn(async move {
        let (mut stream, peer) = listener.accept().await.unwrap();
        let mut request = vec![0u8; 4096];
        let _ = stream.read(&mut request).await.unwrap();
        stream
            .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 0\r\nconnection: close\r\n\r\n")
            .await
            .unwrap();
        peer
    });

    let resolver = Arc::new(StaticResolver::new().with_host("mmsc.test", [server.ip()]));
    let session = session_with(resolver, "127.0.0.5");

    let url = format!("http://mmsc.test:{}/mms", server.port());
    let response = session.open_connection(&url).unwrap().get().send().await.unwrap();
    assert_eq!(response.status().as_u16(), 200);

    let peer = mmsc.await.unwrap();
    assert_eq!(peer.ip(), ip("127.0.0.5"));
}
