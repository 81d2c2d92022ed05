use std::io::{Read, Write};
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{ACCEPT_ENCODING, CONTENT_DISPOSITION};
use tracing::debug;

use crate::error::{Error, Result};
use crate::progress::ProgressIndicator;

/// Copy buffer size; the cancellation probe runs between chunks.
const CHUNK_SIZE: usize = 8 * 1024;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Response metadata the pipeline needs once the body is on disk.
#[derive(Debug)]
pub struct FetchedResponse {
    /// URL the final response actually came from, after redirects.
    pub effective_url: String,
    pub content_disposition: Option<String>,
}

/// Build the blocking client used for artifact downloads. Redirects
/// are followed by the default policy.
pub fn client() -> Result<Client> {
    Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .build()
        .map_err(|err| Error::Transport(err.to_string()))
}

/// Stream `url` into `sink`, reporting progress and honouring the
/// cancellation probe between chunks.
pub fn fetch(
    client: &Client,
    url: &str,
    sink: &mut dyn Write,
    progress: &dyn ProgressIndicator,
) -> Result<FetchedResponse> {
    progress.check_cancelled()?;

    // The artifact is a compressed archive already; ask for the raw
    // body so Content-Length matches what lands on disk.
    let response = client
        .get(url)
        .header(ACCEPT_ENCODING, "identity")
        .send()
        .map_err(|err| Error::Transport(err.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        return Err(Error::Transport(format!("HTTP {status} from {url}")));
    }

    let effective_url = response.url().to_string();
    let content_disposition = response
        .headers()
        .get(CONTENT_DISPOSITION)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned);
    let total = response.content_length();

    copy_with_progress(response, sink, total, progress)?;

    debug!(url = %effective_url, "artifact downloaded");
    Ok(FetchedResponse {
        effective_url,
        content_disposition,
    })
}

fn copy_with_progress(
    mut body: impl Read,
    sink: &mut dyn Write,
    total: Option<u64>,
    progress: &dyn ProgressIndicator,
) -> Result<()> {
    let mut buf = [0u8; CHUNK_SIZE];
    let mut written: u64 = 0;
    loop {
        progress.check_cancelled()?;
        let read = body
            .read(&mut buf)
            .map_err(|err| Error::Transport(err.to_string()))?;
        if read == 0 {
            break;
        }
        sink.write_all(&buf[..read])?;
        written += read as u64;
        if let Some(total) = total.filter(|total| *total > 0) {
            progress.fraction(written as f64 / total as f64);
        }
    }
    sink.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::testserver::{TestServer, ok_response, redirect_response};
    use crate::progress::SilentProgress;
    use std::cell::Cell;

    struct CancelAfter {
        remaining: Cell<usize>,
    }

    impl CancelAfter {
        fn new(checks: usize) -> Self {
            Self {
                remaining: Cell::new(checks),
            }
        }
    }

    impl ProgressIndicator for CancelAfter {
        fn check_cancelled(&self) -> Result<()> {
            let left = self.remaining.get();
            if left == 0 {
                return Err(Error::Cancelled);
            }
            self.remaining.set(left - 1);
            Ok(())
        }
    }

    #[test]
    fn downloads_body_and_reports_headers() {
        let server = TestServer::spawn(vec![ok_response(
            b"artifact-bytes",
            &["Content-Disposition: attachment; filename=\"a.plug\""],
        )]);

        let client = client().unwrap();
        let mut sink = Vec::new();
        let fetched = fetch(&client, &server.url("/a"), &mut sink, &SilentProgress).unwrap();

        assert_eq!(sink, b"artifact-bytes");
        assert_eq!(fetched.effective_url, server.url("/a"));
        assert_eq!(
            fetched.content_disposition.as_deref(),
            Some("attachment; filename=\"a.plug\"")
        );
    }

    #[test]
    fn follows_redirects_and_reports_the_effective_url() {
        let server = TestServer::spawn(Vec::new());
        let target = server.url("/real/plugin.zip");
        server.push(redirect_response(&target));
        server.push(ok_response(b"zip-bytes", &[]));

        let client = client().unwrap();
        let mut sink = Vec::new();
        let fetched = fetch(&client, &server.url("/moved"), &mut sink, &SilentProgress).unwrap();

        assert_eq!(sink, b"zip-bytes");
        assert_eq!(fetched.effective_url, target);
        assert_eq!(server.hits(), 2);
    }

    #[test]
    fn non_success_status_is_a_transport_error() {
        let server = TestServer::spawn(vec![
            b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_vec(),
        ]);

        let client = client().unwrap();
        let mut sink = Vec::new();
        let err = fetch(&client, &server.url("/gone"), &mut sink, &SilentProgress).unwrap_err();
        assert!(matches!(err, Error::Transport(message) if message.contains("404")));
    }

    #[test]
    fn cancellation_interrupts_the_copy() {
        let body = vec![7u8; 3 * CHUNK_SIZE];
        let server = TestServer::spawn(vec![ok_response(&body, &[])]);

        let client = client().unwrap();
        let mut sink = Vec::new();
        // One check before the request, one before the first chunk,
        // then cancel mid-copy.
        let err = fetch(
            &client,
            &server.url("/big"),
            &mut sink,
            &CancelAfter::new(2),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Cancelled));
        assert!(sink.len() < body.len());
    }
}
