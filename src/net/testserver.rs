//! Minimal canned-response HTTP server for transport and pipeline
//! tests. Serves queued raw responses to consecutive connections.

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{Sender, channel};
use std::sync::Arc;
use std::thread;

pub(crate) struct TestServer {
    addr: SocketAddr,
    responses: Sender<Vec<u8>>,
    hits: Arc<AtomicUsize>,
}

impl TestServer {
    /// Bind on an ephemeral port and serve `responses` in order, one
    /// per connection. Further responses can be queued with [`push`].
    ///
    /// [`push`]: TestServer::push
    pub(crate) fn spawn(responses: Vec<Vec<u8>>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind test server");
        let addr = listener.local_addr().expect("test server addr");
        let (tx, rx) = channel::<Vec<u8>>();
        let hits = Arc::new(AtomicUsize::new(0));

        let thread_hits = Arc::clone(&hits);
        thread::spawn(move || {
            while let Ok((mut stream, _)) = listener.accept() {
                thread_hits.fetch_add(1, Ordering::SeqCst);
                read_request(&mut stream);
                let Ok(response) = rx.recv() else {
                    return;
                };
                let _ = stream.write_all(&response);
            }
        });

        let server = Self {
            addr,
            responses: tx,
            hits,
        };
        for response in responses {
            server.push(response);
        }
        server
    }

    pub(crate) fn push(&self, response: Vec<u8>) {
        self.responses.send(response).expect("test server alive");
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    /// Connections accepted so far.
    pub(crate) fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

fn read_request(stream: &mut TcpStream) {
    let mut buf = [0u8; 1024];
    let mut seen = Vec::new();
    while let Ok(read) = stream.read(&mut buf) {
        if read == 0 {
            break;
        }
        seen.extend_from_slice(&buf[..read]);
        if seen.windows(4).any(|window| window == b"\r\n\r\n") {
            break;
        }
    }
}

/// Plain 200 with the given body and extra header lines.
pub(crate) fn ok_response(body: &[u8], extra_headers: &[&str]) -> Vec<u8> {
    let mut head = format!(
        "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n",
        body.len()
    );
    for header in extra_headers {
        head.push_str(header);
        head.push_str("\r\n");
    }
    head.push_str("\r\n");
    let mut response = head.into_bytes();
    response.extend_from_slice(body);
    response
}

pub(crate) fn redirect_response(location: &str) -> Vec<u8> {
    format!(
        "HTTP/1.1 302 Found\r\nLocation: {location}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
    )
    .into_bytes()
}
