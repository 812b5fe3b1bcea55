//! Minimal HTTP/1.1 server for integration tests.
//!
//! Serves static bodies by path. Answers HEAD with Content-Length and
//! Accept-Ranges, GET with Range with 206 Partial Content, and unknown paths
//! with 404. Every response closes the connection.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Ways a 206 response can disagree with the requested range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeFault {
    None,
    /// Content-Range names the range one byte later than requested.
    ShiftedContentRange,
    /// Body is one byte shorter than the range.
    ShortBody,
    /// Body carries one byte more than the range.
    LongBody,
}

#[derive(Debug, Clone, Copy)]
pub struct RangeServerOptions {
    /// If false, HEAD returns 405.
    pub head_allowed: bool,
    /// If false, GET ignores Range and always returns 200 with the full body.
    pub support_ranges: bool,
    /// Send `Accept-Ranges: bytes` on HEAD even when ranges are ignored.
    pub advertise_ranges: bool,
    /// Delay before each GET response body.
    pub delay: Duration,
    /// Corruption applied to every 206 response.
    pub fault: RangeFault,
}

impl Default for RangeServerOptions {
    fn default() -> Self {
        Self {
            head_allowed: true,
            support_ranges: true,
            advertise_ranges: true,
            delay: Duration::ZERO,
            fault: RangeFault::None,
        }
    }
}

pub struct RangeServer {
    base: String,
    requests: Arc<AtomicUsize>,
}

impl RangeServer {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path.trim_start_matches('/'))
    }

    /// Number of requests received so far.
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

pub fn start(routes: Vec<(&str, Vec<u8>)>) -> RangeServer {
    start_with_options(routes, RangeServerOptions::default())
}

pub fn start_with_options(routes: Vec<(&str, Vec<u8>)>, opts: RangeServerOptions) -> RangeServer {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    let routes: Arc<HashMap<String, Vec<u8>>> = Arc::new(
        routes
            .into_iter()
            .map(|(p, b)| (format!("/{}", p.trim_start_matches('/')), b))
            .collect(),
    );
    let requests = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&requests);
    thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            let routes = Arc::clone(&routes);
            let counter = Arc::clone(&counter);
            thread::spawn(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                handle(stream, &routes, opts);
            });
        }
    });
    RangeServer {
        base: format!("http://127.0.0.1:{}/", port),
        requests,
    }
}

fn handle(mut stream: TcpStream, routes: &HashMap<String, Vec<u8>>, opts: RangeServerOptions) {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(2)));
    let _ = stream.set_write_timeout(Some(Duration::from_secs(5)));
    let mut buf = [0u8; 8192];
    let n = match stream.read(&mut buf) {
        Ok(0) | Err(_) => return,
        Ok(n) => n,
    };
    let request = match std::str::from_utf8(&buf[..n]) {
        Ok(s) => s,
        Err(_) => return,
    };
    let (method, path, range) = parse_request(request);

    let body = match routes.get(path) {
        Some(body) => body,
        None => {
            let _ = stream.write_all(
                b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
            );
            return;
        }
    };
    let total = body.len() as u64;
    let accept_ranges = if opts.advertise_ranges {
        "Accept-Ranges: bytes\r\n"
    } else {
        ""
    };

    if method.eq_ignore_ascii_case("HEAD") {
        if !opts.head_allowed {
            let _ = stream.write_all(
                b"HTTP/1.1 405 Method Not Allowed\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
            );
            return;
        }
        let response = format!(
            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\n{}Connection: close\r\n\r\n",
            total, accept_ranges
        );
        let _ = stream.write_all(response.as_bytes());
        return;
    }

    if !method.eq_ignore_ascii_case("GET") {
        let _ = stream.write_all(
            b"HTTP/1.1 405 Method Not Allowed\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        );
        return;
    }

    if !opts.delay.is_zero() {
        thread::sleep(opts.delay);
    }

    let (status, content_range, slice): (&str, Option<String>, Vec<u8>) =
        match range.filter(|_| opts.support_ranges) {
            Some((start, end_incl)) => {
                let end_incl = end_incl.min(total.saturating_sub(1));
                if total == 0 || start > end_incl {
                    ("416 Range Not Satisfiable", Some(format!("bytes */{}", total)), Vec::new())
                } else {
                    let mut slice = body[start as usize..=end_incl as usize].to_vec();
                    let mut shown = (start, end_incl);
                    match opts.fault {
                        RangeFault::None => {}
                        RangeFault::ShiftedContentRange => shown = (start + 1, end_incl + 1),
                        RangeFault::ShortBody => {
                            slice.pop();
                        }
                        RangeFault::LongBody => slice.push(0),
                    }
                    (
                        "206 Partial Content",
                        Some(format!("bytes {}-{}/{}", shown.0, shown.1, total)),
                        slice,
                    )
                }
            }
            None => ("200 OK", None, body.clone()),
        };

    let content_range = content_range
        .map(|v| format!("Content-Range: {}\r\n", v))
        .unwrap_or_default();
    let response = format!(
        "HTTP/1.1 {}\r\nContent-Length: {}\r\n{}{}Connection: close\r\n\r\n",
        status,
        slice.len(),
        content_range,
        accept_ranges
    );
    let _ = stream.write_all(response.as_bytes());
    let _ = stream.write_all(&slice);
}

/// Returns (method, path, optional inclusive range from `Range: bytes=X-Y`).
fn parse_request(request: &str) -> (&str, &str, Option<(u64, u64)>) {
    let mut lines = request.lines();
    let mut first = lines.next().unwrap_or("").split_whitespace();
    let method = first.next().unwrap_or("");
    let path = first.next().unwrap_or("/");
    let mut range = None;
    for line in lines {
        let line = line.trim();
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            if name.trim().eq_ignore_ascii_case("range") {
                if let Some(spec) = value.trim().strip_prefix("bytes=") {
                    if let Some((a, b)) = spec.split_once('-') {
                        let start = a.trim().parse::<u64>().unwrap_or(0);
                        let end = b.trim().parse::<u64>().unwrap_or(u64::MAX);
                        range = Some((start, end));
                    }
                }
            }
        }
    }
    (method, path, range)
}
