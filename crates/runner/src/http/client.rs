//! Socket-level HTTP client

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio_rustls::rustls;
use tokio_rustls::TlsConnector;
use tracing::{debug, trace};
use wafreplay_common::{Destination, Protocol};

use super::response::{read_response, ParsedResponse};
use super::{HttpError, HttpResult, Request, Response, Transport};

/// Timeouts applied by [`HttpClient`]
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(3),
            read_timeout: Duration::from_secs(1),
        }
    }
}

trait Stream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> Stream for T {}

struct Connection {
    dest: Destination,
    reader: BufReader<Box<dyn Stream>>,
}

/// HTTP client holding at most one open connection
pub struct HttpClient {
    config: ClientConfig,
    connection: Option<Connection>,
    tls: TlsConnector,
}

impl HttpClient {
    pub fn new(config: ClientConfig) -> Self {
        let tls_config = rustls::ClientConfig::builder()
            .with_safe_defaults()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyCertificate))
            .with_no_client_auth();

        Self {
            config,
            connection: None,
            tls: TlsConnector::from(Arc::new(tls_config)),
        }
    }

    /// Whether a reusable connection to `dest` is open. Connections the
    /// server closed, or that failed, are dropped as soon as that is known.
    pub fn is_connected_to(&self, dest: &Destination) -> bool {
        self.connection
            .as_ref()
            .map(|c| c.dest == *dest)
            .unwrap_or(false)
    }
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new(ClientConfig::default())
    }
}

#[async_trait]
impl Transport for HttpClient {
    async fn connect(&mut self, dest: &Destination) -> HttpResult<()> {
        self.connection = None;
        self.connection = Some(open(&self.config, &self.tls, dest).await?);
        Ok(())
    }

    async fn connect_or_reuse(&mut self, dest: &Destination) -> HttpResult<()> {
        if self.is_connected_to(dest) {
            trace!("Reusing connection to {}", dest);
            return Ok(());
        }
        self.connect(dest).await
    }

    async fn send(&mut self, request: &Request) -> HttpResult<Response> {
        let read_timeout = self.config.read_timeout;
        let conn = self.connection.as_mut().ok_or(HttpError::NotConnected)?;

        let bytes = request.to_bytes();
        trace!("Sending {} bytes to {}", bytes.len(), conn.dest);

        let result: HttpResult<ParsedResponse> = async {
            let writer = conn.reader.get_mut();
            writer.write_all(&bytes).await?;
            writer.flush().await?;

            match tokio::time::timeout(read_timeout, read_response(&mut conn.reader, request.is_head())).await {
                Ok(parsed) => parsed,
                Err(_) => Err(HttpError::ReadTimeout {
                    timeout: read_timeout,
                }),
            }
        }
        .await;

        match result {
            Ok(parsed) => {
                trace!(
                    "Received status {} with {} body bytes",
                    parsed.response.status,
                    parsed.response.body.len()
                );
                if !parsed.keep_alive {
                    self.connection = None;
                }
                Ok(parsed.response)
            }
            Err(e) => {
                self.connection = None;
                Err(e)
            }
        }
    }
}

async fn open(config: &ClientConfig, tls: &TlsConnector, dest: &Destination) -> HttpResult<Connection> {
    let addr = format!("{}:{}", dest.dest_addr, dest.port);
    let timeout = config.connect_timeout;

    let tcp = match tokio::time::timeout(timeout, TcpStream::connect(&addr)).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(source)) => return Err(HttpError::Connect { addr, source }),
        Err(_) => return Err(HttpError::ConnectTimeout { addr, timeout }),
    };
    let _ = tcp.set_nodelay(true);

    let stream: Box<dyn Stream> = match dest.protocol {
        Protocol::Http => Box::new(tcp),
        Protocol::Https => {
            let server_name = rustls::ServerName::try_from(dest.dest_addr.as_str())
                .map_err(|e| HttpError::Tls(format!("invalid server name {}: {}", dest.dest_addr, e)))?;
            let stream = match tokio::time::timeout(timeout, tls.connect(server_name, tcp)).await {
                Ok(Ok(stream)) => stream,
                Ok(Err(e)) => return Err(HttpError::Tls(e.to_string())),
                Err(_) => return Err(HttpError::ConnectTimeout { addr, timeout }),
            };
            Box::new(stream)
        }
    };

    debug!("Connected to {}", dest);
    Ok(Connection {
        dest: dest.clone(),
        reader: BufReader::new(stream),
    })
}

/// WAF test rigs run behind self-signed certificates
struct AcceptAnyCertificate;

impl rustls::client::ServerCertVerifier for AcceptAnyCertificate {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::Certificate,
        _intermediates: &[rustls::Certificate],
        _server_name: &rustls::ServerName,
        _scts: &mut dyn Iterator<Item = &[u8]>,
        _ocsp_response: &[u8],
        _now: std::time::SystemTime,
    ) -> Result<rustls::client::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::ServerCertVerified::assertion())
    }
}
