use std::time::{Duration, Instant};

use casefile_core::constants::SCAN_CHUNK_SIZE;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

/// Streaming-scan command. The trailing NUL selects the
/// NUL-delimited reply framing; it is part of the command bytes.
const INSTREAM_COMMAND: &[u8] = b"zINSTREAM\0";

/// Health-check command, newline-delimited.
const PING_COMMAND: &[u8] = b"PING\n";

const DEFAULT_SCAN_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_PING_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum ClamdError {
    #[error("Failed to connect to clamd at {address}: {source}")]
    Connect {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("clamd socket error: {0}")]
    Io(#[from] std::io::Error),

    #[error("clamd {operation} timed out after {seconds}s")]
    Timeout { operation: &'static str, seconds: u64 },

    #[error("Unexpected clamd response: {0}")]
    InvalidResponse(String),
}

/// Outcome of a completed scan. `Infected` is authoritative even when the
/// daemon's response could not be parsed for malware names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanVerdict {
    Clean,
    Infected { threats: Vec<String> },
}

impl ScanVerdict {
    pub fn is_infected(&self) -> bool {
        matches!(self, ScanVerdict::Infected { .. })
    }
}

/// Client for the clamd daemon.
///
/// Every call opens its own connection; there is no pooling or reuse. A
/// failed `ping` says nothing about whether a `scan` will be attempted --
/// that decision belongs to configuration, not to live health.
#[derive(Clone)]
pub struct ClamdClient {
    host: String,
    port: u16,
    scan_timeout: Duration,
    ping_timeout: Duration,
}

impl ClamdClient {
    pub fn new(host: String, port: u16) -> Self {
        Self::with_timeouts(host, port, DEFAULT_SCAN_TIMEOUT, DEFAULT_PING_TIMEOUT)
    }

    /// Create with custom timeouts (large files, slow daemons, tests).
    pub fn with_timeouts(
        host: String,
        port: u16,
        scan_timeout: Duration,
        ping_timeout: Duration,
    ) -> Self {
        Self {
            host,
            port,
            scan_timeout,
            ping_timeout,
        }
    }

    fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    async fn connect(&self) -> Result<TcpStream, ClamdError> {
        TcpStream::connect(self.address())
            .await
            .map_err(|source| ClamdError::Connect {
                address: self.address(),
                source,
            })
    }

    /// Health check: healthy iff the daemon answers exactly `PONG` within
    /// the ping timeout.
    pub async fn ping(&self) -> Result<(), ClamdError> {
        let response = timeout(self.ping_timeout, self.ping_inner())
            .await
            .map_err(|_| ClamdError::Timeout {
                operation: "ping",
                seconds: self.ping_timeout.as_secs(),
            })??;

        if response == "PONG" {
            Ok(())
        } else {
            Err(ClamdError::InvalidResponse(response))
        }
    }

    async fn ping_inner(&self) -> Result<String, ClamdError> {
        let mut stream = self.connect().await?;
        stream.write_all(PING_COMMAND).await?;

        let mut buf = Vec::new();
        stream.read_to_end(&mut buf).await?;
        Ok(trim_response(&buf))
    }

    /// Scan a payload via `zINSTREAM`.
    ///
    /// The payload is streamed in fixed-size chunks, each preceded by its
    /// length as a 4-byte big-endian integer, followed by a zero-length
    /// terminator frame. The daemon's reply is read until it closes the
    /// connection.
    pub async fn scan(&self, data: &[u8], name: &str) -> Result<ScanVerdict, ClamdError> {
        let start = Instant::now();
        tracing::debug!(
            address = %self.address(),
            filename = %name,
            bytes = data.len(),
            "Starting clamd scan"
        );

        let response = timeout(self.scan_timeout, self.scan_inner(data))
            .await
            .map_err(|_| ClamdError::Timeout {
                operation: "scan",
                seconds: self.scan_timeout.as_secs(),
            })??;

        let verdict = parse_scan_response(&response);
        match &verdict {
            ScanVerdict::Clean => {
                tracing::info!(
                    filename = %name,
                    duration_ms = start.elapsed().as_millis(),
                    "Scan completed: clean"
                );
            }
            ScanVerdict::Infected { threats } => {
                tracing::warn!(
                    filename = %name,
                    threats = ?threats,
                    duration_ms = start.elapsed().as_millis(),
                    "Scan detected malware"
                );
            }
        }

        Ok(verdict)
    }

    async fn scan_inner(&self, data: &[u8]) -> Result<String, ClamdError> {
        let mut stream = self.connect().await?;

        stream.write_all(INSTREAM_COMMAND).await?;

        // An empty payload sends no data frames, only the terminator.
        for chunk in data.chunks(SCAN_CHUNK_SIZE) {
            stream.write_all(&(chunk.len() as u32).to_be_bytes()).await?;
            stream.write_all(chunk).await?;
        }
        stream.write_all(&0u32.to_be_bytes()).await?;
        stream.flush().await?;

        let mut buf = Vec::new();
        stream.read_to_end(&mut buf).await?;
        Ok(trim_response(&buf))
    }
}

/// Decode and trim a daemon reply; replies are NUL- or newline-terminated
/// depending on the command framing.
fn trim_response(buf: &[u8]) -> String {
    String::from_utf8_lossy(buf)
        .trim_matches(|c: char| c == '\0' || c.is_whitespace())
        .to_string()
}

/// Parse the daemon's reply into a verdict.
///
/// Any reply containing `FOUND` is an infection; malware names come from
/// lines of the form `stream: <name> FOUND`. A positive reply with no
/// parseable name still blocks the file.
fn parse_scan_response(response: &str) -> ScanVerdict {
    if !response.contains("FOUND") {
        return ScanVerdict::Clean;
    }

    let mut threats = Vec::new();
    for line in response.lines() {
        let line = line.trim_matches(|c: char| c == '\0' || c.is_whitespace());
        if let Some(rest) = line.strip_prefix("stream: ") {
            if let Some(name) = rest.strip_suffix(" FOUND") {
                let name = name.trim();
                if !name.is_empty() {
                    threats.push(name.to_string());
                }
            }
        }
    }

    ScanVerdict::Infected { threats }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;

    /// Frames a scripted daemon observed on one `zINSTREAM` session.
    struct ObservedStream {
        command: Vec<u8>,
        data_frames: Vec<usize>,
        total_bytes: usize,
        saw_terminator: bool,
    }

    /// Accept one connection, run the daemon's half of an INSTREAM session,
    /// reply with `response`, and report what was observed.
    async fn spawn_instream_daemon(
        response: &'static [u8],
    ) -> (SocketAddr, oneshot::Receiver<ObservedStream>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = oneshot::channel();

        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();

            let mut command = vec![0u8; INSTREAM_COMMAND.len()];
            stream.read_exact(&mut command).await.unwrap();

            let mut data_frames = Vec::new();
            let mut total_bytes = 0usize;
            let mut saw_terminator = false;
            loop {
                let mut len_buf = [0u8; 4];
                stream.read_exact(&mut len_buf).await.unwrap();
                let len = u32::from_be_bytes(len_buf) as usize;
                if len == 0 {
                    saw_terminator = true;
                    break;
                }
                let mut chunk = vec![0u8; len];
                stream.read_exact(&mut chunk).await.unwrap();
                data_frames.push(len);
                total_bytes += len;
            }

            stream.write_all(response).await.unwrap();
            stream.shutdown().await.unwrap();

            let _ = tx.send(ObservedStream {
                command,
                data_frames,
                total_bytes,
                saw_terminator,
            });
        });

        (addr, rx)
    }

    fn client_for(addr: SocketAddr) -> ClamdClient {
        ClamdClient::with_timeouts(
            addr.ip().to_string(),
            addr.port(),
            Duration::from_secs(5),
            Duration::from_millis(500),
        )
    }

    #[tokio::test]
    async fn ping_healthy_on_exact_pong() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut command = vec![0u8; PING_COMMAND.len()];
            stream.read_exact(&mut command).await.unwrap();
            assert_eq!(command, PING_COMMAND);
            stream.write_all(b"PONG\n").await.unwrap();
            stream.shutdown().await.unwrap();
        });

        client_for(addr).ping().await.unwrap();
    }

    #[tokio::test]
    async fn ping_unhealthy_on_unexpected_reply() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut command = vec![0u8; PING_COMMAND.len()];
            stream.read_exact(&mut command).await.unwrap();
            stream.write_all(b"I am not clamd\n").await.unwrap();
            stream.shutdown().await.unwrap();
        });

        let err = client_for(addr).ping().await.unwrap_err();
        assert!(matches!(err, ClamdError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn ping_times_out_on_silent_daemon() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            // Accept and go silent; never reply, never close.
            let (_stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
        });

        let err = client_for(addr).ping().await.unwrap_err();
        assert!(matches!(
            err,
            ClamdError::Timeout {
                operation: "ping",
                ..
            }
        ));
    }

    #[tokio::test]
    async fn chunking_reconstructs_payload_exactly() {
        for n in [1usize, 100, 8192, 8193, 3 * 8192 + 17] {
            let (addr, rx) = spawn_instream_daemon(b"stream: OK\0").await;
            let payload = vec![0xABu8; n];

            let verdict = client_for(addr).scan(&payload, "blob.bin").await.unwrap();
            assert_eq!(verdict, ScanVerdict::Clean);

            let observed = rx.await.unwrap();
            assert_eq!(observed.command, INSTREAM_COMMAND);
            assert_eq!(observed.total_bytes, n, "payload size {} mangled", n);
            assert!(observed.saw_terminator);
            // Every frame but the last is exactly one full chunk.
            for frame in &observed.data_frames[..observed.data_frames.len() - 1] {
                assert_eq!(*frame, SCAN_CHUNK_SIZE);
            }
            assert!(*observed.data_frames.last().unwrap() <= SCAN_CHUNK_SIZE);
        }
    }

    #[tokio::test]
    async fn empty_payload_sends_only_the_terminator() {
        let (addr, rx) = spawn_instream_daemon(b"stream: OK\0").await;

        let verdict = client_for(addr).scan(&[], "empty.bin").await.unwrap();
        assert_eq!(verdict, ScanVerdict::Clean);

        let observed = rx.await.unwrap();
        assert!(observed.data_frames.is_empty());
        assert_eq!(observed.total_bytes, 0);
        assert!(observed.saw_terminator);
    }

    #[tokio::test]
    async fn eicar_response_parses_threat_name() {
        let (addr, _rx) = spawn_instream_daemon(b"stream: Eicar-Signature FOUND\0").await;

        let verdict = client_for(addr).scan(b"payload", "eicar.com").await.unwrap();
        assert_eq!(
            verdict,
            ScanVerdict::Infected {
                threats: vec!["Eicar-Signature".to_string()]
            }
        );
    }

    #[tokio::test]
    async fn unparseable_positive_response_still_blocks() {
        let (addr, _rx) = spawn_instream_daemon(b"something terrible FOUND here\0").await;

        let verdict = client_for(addr).scan(b"payload", "odd.bin").await.unwrap();
        assert_eq!(verdict, ScanVerdict::Infected { threats: vec![] });
        assert!(verdict.is_infected());
    }

    #[tokio::test]
    async fn connect_failure_is_not_a_verdict() {
        // Bind then drop to get a port with nothing listening.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = client_for(addr).scan(b"payload", "file.bin").await.unwrap_err();
        assert!(matches!(err, ClamdError::Connect { .. }));
    }

    #[test]
    fn parse_clean_response() {
        assert_eq!(parse_scan_response("stream: OK"), ScanVerdict::Clean);
        assert_eq!(parse_scan_response(""), ScanVerdict::Clean);
    }

    #[test]
    fn parse_multiple_threat_lines() {
        let response = "stream: Eicar-Signature FOUND\nstream: Trojan.Generic FOUND";
        assert_eq!(
            parse_scan_response(response),
            ScanVerdict::Infected {
                threats: vec![
                    "Eicar-Signature".to_string(),
                    "Trojan.Generic".to_string()
                ]
            }
        );
    }
}
