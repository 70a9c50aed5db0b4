// HTTP stream fetcher
// The station body is pulled on its own thread with a small tokio runtime.
// Cancelling the token drops the response and the runtime, which closes the
// connection even while the server is sending nothing.

use reqwest::header::CONTENT_TYPE;
use std::io::{self, Read};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{PlaybackError, Result};
use crate::state::StreamSource;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const CHUNK_QUEUE: usize = 64;

type Head = Result<Option<String>>;

/// Blocking reader over the body chunks delivered by the fetch thread
pub struct HttpStream {
    chunks: mpsc::Receiver<Vec<u8>>,
    current: Vec<u8>,
    pos: usize,
    mime_type: Option<String>,
}

impl HttpStream {
    /// Connect and wait for the response headers. Must not be called from
    /// inside an async context.
    pub fn open(source: &StreamSource, cancel: CancellationToken) -> Result<Self> {
        let (head_tx, head_rx) = oneshot::channel();
        let (chunk_tx, chunk_rx) = mpsc::channel(CHUNK_QUEUE);
        let url = source.as_str().to_string();

        std::thread::Builder::new()
            .name("stream-fetch".to_string())
            .spawn(move || fetch(url, cancel, head_tx, chunk_tx))
            .map_err(|e| {
                PlaybackError::preparation(format!("Failed to spawn fetch thread: {}", e))
            })?;

        let mime_type = head_rx
            .blocking_recv()
            .map_err(|_| PlaybackError::preparation("Stream fetch cancelled"))??;

        Ok(Self {
            chunks: chunk_rx,
            current: Vec::new(),
            pos: 0,
            mime_type,
        })
    }

    /// Content type without parameters, used as a decoder hint
    pub fn mime_type(&self) -> Option<&str> {
        self.mime_type.as_deref()
    }
}

impl Read for HttpStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        while self.pos >= self.current.len() {
            match self.chunks.blocking_recv() {
                Some(chunk) => {
                    self.current = chunk;
                    self.pos = 0;
                }
                // Body ended, failed, or the player was released
                None => return Ok(0),
            }
        }

        let n = buf.len().min(self.current.len() - self.pos);
        buf[..n].copy_from_slice(&self.current[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

fn fetch(
    url: String,
    cancel: CancellationToken,
    head: oneshot::Sender<Head>,
    chunks: mpsc::Sender<Vec<u8>>,
) {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            let _ = head.send(Err(PlaybackError::preparation(format!(
                "Failed to start fetch runtime: {}",
                e
            ))));
            return;
        }
    };

    runtime.block_on(async move {
        tokio::select! {
            _ = cancel.cancelled() => debug!("Stream fetch cancelled"),
            _ = stream_body(&url, head, chunks) => {}
        }
    });
    // Dropping the runtime here closes the connection
}

async fn stream_body(url: &str, head: oneshot::Sender<Head>, chunks: mpsc::Sender<Vec<u8>>) {
    let mut response = match connect(url).await {
        Ok(response) => response,
        Err(e) => {
            let _ = head.send(Err(e));
            return;
        }
    };

    let mime_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.split(';').next().unwrap_or(value).trim().to_string());
    if head.send(Ok(mime_type)).is_err() {
        return;
    }

    loop {
        match response.chunk().await {
            Ok(Some(chunk)) => {
                if chunks.send(chunk.to_vec()).await.is_err() {
                    return;
                }
            }
            Ok(None) => {
                debug!("Stream body ended");
                return;
            }
            Err(e) => {
                warn!("Stream read failed: {}", e);
                return;
            }
        }
    }
}

async fn connect(url: &str) -> Result<reqwest::Response> {
    // No total timeout: the body never ends on a live stream
    let client = reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .user_agent(concat!("wxyc-radio/", env!("CARGO_PKG_VERSION")))
        .build()?;

    Ok(client.get(url).send().await?.error_for_status()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::net::TcpListener;

    /// Serve one response, then keep the socket open until the client hangs up
    fn serve_once(response: &'static [u8]) -> (StreamSource, std::thread::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = std::thread::spawn(move || {
            if let Ok((mut socket, _)) = listener.accept() {
                let mut request = [0u8; 1024];
                let _ = socket.read(&mut request);
                let _ = socket.write_all(response);
                let _ = socket.set_read_timeout(Some(Duration::from_secs(5)));
                let _ = socket.read(&mut request);
            }
        });
        let source = StreamSource::new(&format!("http://127.0.0.1:{}/wxyc.mp3", port)).unwrap();
        (source, server)
    }

    #[test]
    fn test_reads_body_and_mime_type() {
        let (source, _server) = serve_once(
            b"HTTP/1.1 200 OK\r\nContent-Type: audio/mpeg; charset=x\r\nContent-Length: 5\r\n\r\nhello",
        );
        let mut stream = HttpStream::open(&source, CancellationToken::new()).unwrap();
        assert_eq!(stream.mime_type(), Some("audio/mpeg"));

        let mut body = Vec::new();
        stream.read_to_end(&mut body).unwrap();
        assert_eq!(body, b"hello");
    }

    #[test]
    fn test_error_status_fails_to_open() {
        let (source, _server) = serve_once(b"HTTP/1.1 503 Service Unavailable\r\nContent-Length: 0\r\n\r\n");
        let result = HttpStream::open(&source, CancellationToken::new());
        assert!(matches!(result, Err(PlaybackError::Http(_))));
    }

    #[test]
    fn test_cancel_ends_blocked_read() {
        let (source, _server) = serve_once(b"HTTP/1.1 200 OK\r\nContent-Type: audio/mpeg\r\n\r\n");
        let cancel = CancellationToken::new();
        let mut stream = HttpStream::open(&source, cancel.clone()).unwrap();

        let canceller = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(100));
            cancel.cancel();
        });

        let mut buf = [0u8; 16];
        assert_eq!(stream.read(&mut buf).unwrap(), 0);
        canceller.join().unwrap();
    }
}
