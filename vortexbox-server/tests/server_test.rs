use clap::Parser;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use vortexbox_server::Server;
use vortexbox_server::config::{Args, Config};
use vortexbox_server::types::{SessionResponse, UploadArtifact};

struct RunningServer {
    addr: SocketAddr,
    shutdown: CancellationToken,
    handle: JoinHandle<anyhow::Result<()>>,
}

impl RunningServer {
    async fn start(upload_dir: &Path, extra: &[&str]) -> Self {
        let dir = upload_dir.to_str().unwrap();
        let mut argv = vec![
            "vortexbox-server",
            "127.0.0.1",
            "8080",
            "--store",
            "memory",
            "--upload-dir",
            dir,
            "--max-upload-bytes",
            "4096",
            "--shutdown-grace",
            "2",
        ];
        argv.extend_from_slice(extra);

        let config = Config::from_args(Args::try_parse_from(argv).unwrap()).unwrap();
        let server = Server::new(config).unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(server.run(listener, shutdown.clone()));

        Self {
            addr,
            shutdown,
            handle,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    async fn stop(self) {
        self.shutdown.cancel();
        let result = tokio::time::timeout(Duration::from_secs(5), self.handle)
            .await
            .expect("server did not stop within 5s")
            .unwrap();
        assert!(result.is_ok());
    }
}

#[tokio::test]
async fn test_upload_list_download() {
    let dir = tempfile::tempdir().unwrap();
    let server = RunningServer::start(dir.path(), &[]).await;
    let client = reqwest::Client::new();

    let form = reqwest::multipart::Form::new().part(
        "file",
        reqwest::multipart::Part::bytes(b"mode=station\nchannel=6\n".to_vec())
            .file_name("vortex.cfg"),
    );
    let response = client
        .post(server.url("/upload"))
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 201);
    let artifact: UploadArtifact = response.json().await.unwrap();
    assert_eq!(artifact.filename, "vortex.cfg");
    assert_eq!(artifact.size, 23);

    let listed: Vec<UploadArtifact> = client
        .get(server.url("/files"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listed, vec![artifact.clone()]);

    let response = client
        .get(server.url(&format!("/files/{}", artifact.id)))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(
        response.bytes().await.unwrap().as_ref(),
        b"mode=station\nchannel=6\n"
    );

    server.stop().await;
}

#[tokio::test]
async fn test_oversized_upload_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let server = RunningServer::start(dir.path(), &[]).await;
    let client = reqwest::Client::new();

    let form = reqwest::multipart::Form::new().part(
        "file",
        reqwest::multipart::Part::bytes(vec![0u8; 8192]).file_name("big.bin"),
    );
    let response = client
        .post(server.url("/upload"))
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 413);

    // Nothing left behind, not even a partial file
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);

    server.stop().await;
}

#[tokio::test]
async fn test_rate_limit_over_the_wire() {
    let dir = tempfile::tempdir().unwrap();
    let server = RunningServer::start(dir.path(), &["--rate-limit", "3"]).await;
    let client = reqwest::Client::new();

    for _ in 0..3 {
        let response = client.get(server.url("/files")).send().await.unwrap();
        assert_eq!(response.status(), 200);
    }

    let response = client.get(server.url("/files")).send().await.unwrap();
    assert_eq!(response.status(), 429);
    assert!(response.headers().contains_key("retry-after"));

    let response = client.get(server.url("/health")).send().await.unwrap();
    assert_eq!(response.status(), 200);

    server.stop().await;
}

#[tokio::test]
async fn test_register_then_login() {
    let dir = tempfile::tempdir().unwrap();
    let server = RunningServer::start(dir.path(), &["--require-session"]).await;
    let client = reqwest::Client::new();

    let response = client
        .post(server.url("/register"))
        .json(&serde_json::json!({ "type": "reg", "login": "dev01", "password": "s3cret" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let response = client
        .post(server.url("/login"))
        .json(&serde_json::json!({ "type": "login", "login": "dev01", "password": "s3cret" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let session: SessionResponse = response.json().await.unwrap();

    let response = client.get(server.url("/files")).send().await.unwrap();
    assert_eq!(response.status(), 401);

    let response = client
        .get(server.url("/files"))
        .header("x-session-id", &session.session_id)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    server.stop().await;
}

#[tokio::test]
async fn test_shutdown_stops_accepting() {
    let dir = tempfile::tempdir().unwrap();
    let server = RunningServer::start(dir.path(), &[]).await;
    let addr = server.addr;

    let response = reqwest::get(server.url("/health")).await.unwrap();
    assert_eq!(response.status(), 200);

    server.stop().await;

    assert!(TcpStream::connect(addr).await.is_err());
}

fn write_tls_pair(dir: &Path) -> (rustls::pki_types::CertificateDer<'static>, String, String) {
    let rcgen::CertifiedKey { cert, key_pair } =
        rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();

    let cert_path = dir.join("cert.pem");
    let key_path = dir.join("key.pem");
    std::fs::write(&cert_path, cert.pem()).unwrap();
    std::fs::write(&key_path, key_pair.serialize_pem()).unwrap();

    (
        cert.der().clone(),
        cert_path.to_str().unwrap().to_string(),
        key_path.to_str().unwrap().to_string(),
    )
}

#[tokio::test]
async fn test_tls_transport() {
    let dir = tempfile::tempdir().unwrap();
    let uploads = dir.path().join("uploads");
    let (der, cert_path, key_path) = write_tls_pair(dir.path());

    let server = RunningServer::start(
        &uploads,
        &[
            "--ssl-public-key",
            &cert_path,
            "--ssl-private-key",
            &key_path,
        ],
    )
    .await;

    let mut roots = rustls::RootCertStore::empty();
    roots.add(der).unwrap();
    let client_config = rustls::ClientConfig::builder_with_provider(Arc::new(
        rustls::crypto::ring::default_provider(),
    ))
    .with_safe_default_protocol_versions()
    .unwrap()
    .with_root_certificates(roots)
    .with_no_client_auth();
    let connector = tokio_rustls::TlsConnector::from(Arc::new(client_config));

    let tcp = TcpStream::connect(server.addr).await.unwrap();
    let server_name = rustls::pki_types::ServerName::try_from("localhost").unwrap();
    let mut tls = connector.connect(server_name, tcp).await.unwrap();

    tls.write_all(b"GET /health HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();
    let mut response = Vec::new();
    // A missing close_notify surfaces as an error after the full response
    let _ = tls.read_to_end(&mut response).await;
    let response = String::from_utf8_lossy(&response);
    assert!(response.starts_with("HTTP/1.1 200"), "{response}");
    assert!(response.ends_with("OK"));

    // Plaintext clients never get an HTTP answer
    assert!(reqwest::get(server.url("/health")).await.is_err());

    server.stop().await;
}
