use netaudit_core::budget::SocketBudget;
use netaudit_core::fingerprint::extract_fingerprint;
use netaudit_core::probes::grab_banner;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;

#[tokio::test]
async fn identifies_ssh_banner_from_a_live_socket() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        if let Ok((mut stream, _)) = listener.accept().await {
            let _ = stream
                .write_all(b"SSH-2.0-OpenSSH_9.3p1 Debian-3\r\n")
                .await;
        }
    });

    let budget = SocketBudget::new(64);
    let banner = grab_banner("127.0.0.1", addr.port(), Duration::from_millis(500), &budget)
        .await
        .expect("banner expected");

    let fp = extract_fingerprint(&banner).expect("fingerprint expected");
    assert_eq!(fp.vendor, "openbsd");
    assert_eq!(fp.product, "openssh");
    assert_eq!(fp.version.as_deref(), Some("9.3p1"));
}

#[tokio::test]
async fn identifies_http_banner_from_a_live_socket() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        if let Ok((mut stream, _)) = listener.accept().await {
            let _ = stream
                .write_all(b"HTTP/1.1 200 OK\r\nServer: Apache/2.4.49\r\n\r\n")
                .await;
        }
    });

    let budget = SocketBudget::new(64);
    let banner = grab_banner("127.0.0.1", addr.port(), Duration::from_millis(500), &budget)
        .await
        .expect("banner expected");

    let fp = extract_fingerprint(&banner).expect("fingerprint expected");
    assert_eq!(fp.vendor, "apache");
    assert_eq!(fp.product, "http_server");
    assert_eq!(fp.version.as_deref(), Some("2.4.49"));
}
