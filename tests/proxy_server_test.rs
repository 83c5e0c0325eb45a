use dat_proxy::api::ApiClient;
use dat_proxy::config::UpstreamConfig;
use dat_proxy::proxy::{Dispatcher, Forwarder, ProxyServer};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct RunningProxy {
    addr: SocketAddr,
    shutdown_tx: broadcast::Sender<()>,
    handle: JoinHandle<dat_proxy::error::Result<()>>,
}

async fn start_proxy(base_url: String) -> RunningProxy {
    let config = UpstreamConfig {
        base_url,
        app_key: "a".repeat(30),
        hmac_key: "h".repeat(30),
        ..UpstreamConfig::default()
    };
    let client = Arc::new(ApiClient::new(&config).unwrap());
    let forwarder = Forwarder::new("Monazilla/1.00 (JaneStyle/3.84)").unwrap();
    let dispatcher = Arc::new(Dispatcher::new(client, forwarder).unwrap());

    let server = ProxyServer::bind("127.0.0.1:0", dispatcher).await.unwrap();
    let addr = server.local_addr().unwrap();
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let handle = tokio::spawn(server.run(shutdown_rx));

    RunningProxy {
        addr,
        shutdown_tx,
        handle,
    }
}

fn proxied_client(addr: SocketAddr) -> reqwest::Client {
    reqwest::Client::builder()
        .proxy(reqwest::Proxy::http(format!("http://{addr}")).unwrap())
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap()
}

fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

#[tokio::test]
async fn test_dat_request_through_proxy() {
    let api = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/auth/"))
        .respond_with(ResponseTemplate::new(200).set_body_string("SESSION-ID=Monazilla/1.00:sid"))
        .expect(1)
        .mount(&api)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/news/newsplus/1234567890"))
        .and(header("accept-encoding", "gzip"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Thread-Status", "1")
                .insert_header("Content-Encoding", "gzip")
                .set_body_bytes(gzip(b"test-body")),
        )
        .expect(2)
        .mount(&api)
        .await;

    let proxy = start_proxy(api.uri()).await;
    let client = proxied_client(proxy.addr);

    for _ in 0..2 {
        let response = client
            .get("http://news.2ch.net/newsplus/dat/1234567890.dat")
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        assert_eq!(response.text().await.unwrap(), "test-body");
    }

    proxy.shutdown_tx.send(()).unwrap();
    proxy.handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_missing_thread_status_through_proxy() {
    let api = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/auth/"))
        .respond_with(ResponseTemplate::new(200).set_body_string("SESSION-ID=Monazilla/1.00:sid"))
        .mount(&api)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/news/newsplus/1"))
        .respond_with(ResponseTemplate::new(200).insert_header("Thread-Status", "0"))
        .mount(&api)
        .await;

    let proxy = start_proxy(api.uri()).await;
    let client = reqwest::Client::builder()
        .proxy(reqwest::Proxy::http(format!("http://{}", proxy.addr)).unwrap())
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap();

    let response = client
        .get("http://news.2ch.net/newsplus/dat/1.dat")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 302);

    let response = client
        .get("http://news.2ch.net/newsplus/dat/1.dat")
        .header("Range", "bytes=10-")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 416);

    proxy.shutdown_tx.send(()).unwrap();
}

#[tokio::test]
async fn test_pass_through_request_with_body() {
    let api = MockServer::start().await;
    let origin = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/test/bbs.cgi"))
        .and(header("user-agent", "Monazilla/1.00 (JaneStyle/3.84)"))
        .respond_with(|req: &wiremock::Request| {
            ResponseTemplate::new(200).set_body_bytes(req.body.clone())
        })
        .expect(1)
        .mount(&origin)
        .await;

    let proxy = start_proxy(api.uri()).await;
    let response = proxied_client(proxy.addr)
        .post(format!("{}/test/bbs.cgi", origin.uri()))
        .body("FROM=&mail=sage&MESSAGE=hello")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    assert_eq!(
        response.text().await.unwrap(),
        "FROM=&mail=sage&MESSAGE=hello"
    );
    assert!(api.received_requests().await.unwrap().is_empty());

    proxy.shutdown_tx.send(()).unwrap();
}

#[tokio::test]
async fn test_shutdown_stops_accepting() {
    let api = MockServer::start().await;
    let proxy = start_proxy(api.uri()).await;

    proxy.shutdown_tx.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(5), proxy.handle)
        .await
        .expect("accept loop exits after shutdown")
        .unwrap()
        .unwrap();

    assert!(tokio::net::TcpStream::connect(proxy.addr).await.is_err());
}

/// Read one HTTP/1.1 request, including a `Content-Length` body.
async fn read_request(stream: &mut TcpStream) -> String {
    let mut data = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        let n = stream.read(&mut buf).await.unwrap();
        if n == 0 {
            break;
        }
        data.extend_from_slice(&buf[..n]);

        let text = String::from_utf8_lossy(&data);
        if let Some(end) = text.find("\r\n\r\n") {
            let length = text[..end]
                .lines()
                .filter_map(|line| line.split_once(':'))
                .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
                .and_then(|(_, value)| value.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if data.len() >= end + 4 + length {
                break;
            }
        }
    }
    String::from_utf8_lossy(&data).into_owned()
}

/// API double whose thread responses never finish. Each thread connection
/// reports on the returned channel once the proxy side has gone away.
async fn endless_thread_upstream() -> (String, mpsc::UnboundedReceiver<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (closed_tx, closed_rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            let closed_tx = closed_tx.clone();
            tokio::spawn(async move {
                let request = read_request(&mut stream).await;
                if request.starts_with("POST /v1/auth/") {
                    let body = "SESSION-ID=Monazilla/1.00:sid";
                    let reply = format!(
                        "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                        body.len()
                    );
                    let _ = stream.write_all(reply.as_bytes()).await;
                    return;
                }

                let (mut reader, mut writer) = stream.into_split();
                let head = "HTTP/1.1 200 OK\r\nThread-Status: 1\r\n\
                            Transfer-Encoding: chunked\r\n\r\n5\r\nfirst\r\n";
                if writer.write_all(head.as_bytes()).await.is_ok() {
                    let mut buf = [0u8; 1024];
                    loop {
                        tokio::select! {
                            read = reader.read(&mut buf) => {
                                if matches!(read, Ok(0) | Err(_)) {
                                    break;
                                }
                            }
                            _ = tokio::time::sleep(Duration::from_millis(100)) => {
                                if writer.write_all(b"4\r\nmore\r\n").await.is_err() {
                                    break;
                                }
                            }
                        }
                    }
                }
                let _ = closed_tx.send(());
            });
        }
    });

    (format!("http://{addr}"), closed_rx)
}

#[tokio::test]
async fn test_client_disconnect_abandons_upstream_stream() {
    let (base_url, mut closed_rx) = endless_thread_upstream().await;
    let proxy = start_proxy(base_url).await;

    let mut client = TcpStream::connect(proxy.addr).await.unwrap();
    client
        .write_all(
            b"GET http://news.2ch.net/newsplus/dat/1234567890.dat HTTP/1.1\r\n\
              Host: news.2ch.net\r\n\r\n",
        )
        .await
        .unwrap();

    let mut received = Vec::new();
    let mut buf = [0u8; 1024];
    tokio::time::timeout(Duration::from_secs(5), async {
        while !String::from_utf8_lossy(&received).contains("first") {
            let n = client.read(&mut buf).await.unwrap();
            assert!(n > 0, "proxy closed the connection before streaming");
            received.extend_from_slice(&buf[..n]);
        }
    })
    .await
    .expect("first chunk is streamed before the body completes");
    assert!(String::from_utf8_lossy(&received).starts_with("HTTP/1.1 200"));

    drop(client);
    tokio::time::timeout(Duration::from_secs(5), closed_rx.recv())
        .await
        .expect("upstream body read is abandoned after the client leaves")
        .unwrap();

    proxy.shutdown_tx.send(()).unwrap();
}
