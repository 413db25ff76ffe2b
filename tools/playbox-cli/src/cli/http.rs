use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::Duration;

const MAX_HEAD_BYTES: usize = 16 * 1024;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Request {
    pub method: String,
    /// Percent-decoded route, query removed.
    pub path: String,
    pub query: String,
}

impl Request {
    pub fn parse(head: &str) -> Option<Self> {
        let request_line = head.lines().next()?;
        let mut parts = request_line.split_whitespace();
        let method = parts.next()?.to_ascii_uppercase();
        let target = parts.next()?;
        let (route, query) = split_query(target);
        Some(Self {
            method,
            path: decode_path(route),
            query: query.to_string(),
        })
    }
}

/// Reads up to the end of the request head. Bodies are never needed.
pub fn read_request(stream: &mut TcpStream) -> Result<Option<Request>, String> {
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .map_err(|e| e.to_string())?;
    let mut head = Vec::new();
    let mut buf = [0u8; 2048];
    loop {
        let size = match stream.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(err) => return Err(err.to_string()),
        };
        head.extend_from_slice(&buf[..size]);
        if head.windows(4).any(|w| w == b"\r\n\r\n") || head.len() >= MAX_HEAD_BYTES {
            break;
        }
    }
    if head.is_empty() {
        return Ok(None);
    }
    Ok(Request::parse(&String::from_utf8_lossy(&head)))
}

#[derive(Clone, Debug)]
pub struct Response {
    status: &'static str,
    content_type: String,
    headers: Vec<(&'static str, String)>,
    body: Vec<u8>,
}

impl Response {
    pub fn new(status: &'static str, content_type: &str, body: Vec<u8>) -> Self {
        Self {
            status,
            content_type: content_type.to_string(),
            headers: Vec::new(),
            body,
        }
    }

    pub fn html(status: &'static str, body: String) -> Self {
        Self::new(status, "text/html; charset=utf-8", body.into_bytes())
    }

    pub fn text(status: &'static str, body: &str) -> Self {
        Self::new(status, "text/plain; charset=utf-8", body.as_bytes().to_vec())
    }

    pub fn empty(status: &'static str) -> Self {
        Self::text(status, "")
    }

    pub fn with_header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }

    pub fn status(&self) -> &str {
        self.status
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).to_string()
    }

    pub fn write_to<W: Write>(&self, out: &mut W) -> Result<(), String> {
        let mut head = format!(
            "HTTP/1.1 {}\r\nAccess-Control-Allow-Origin: *\r\nAccess-Control-Allow-Methods: GET, POST, OPTIONS\r\nAccess-Control-Allow-Headers: Content-Type\r\nCache-Control: no-store\r\nContent-Type: {}\r\nContent-Length: {}\r\n",
            self.status,
            self.content_type,
            self.body.len()
        );
        for (name, value) in &self.headers {
            head.push_str(&format!("{}: {}\r\n", name, value));
        }
        head.push_str("Connection: close\r\n\r\n");
        out.write_all(head.as_bytes()).map_err(|e| e.to_string())?;
        out.write_all(&self.body).map_err(|e| e.to_string())?;
        out.flush().map_err(|e| e.to_string())
    }
}

fn split_query(path: &str) -> (&str, &str) {
    let path = path.split_once('#').map(|(p, _)| p).unwrap_or(path);
    if let Some((route, query)) = path.split_once('?') {
        (route, query)
    } else {
        (path, "")
    }
}

fn decode_path(value: &str) -> String {
    let bytes = value.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut idx = 0usize;
    while idx < bytes.len() {
        match bytes[idx] {
            b'%' if idx + 2 < bytes.len() => {
                match (from_hex(bytes[idx + 1]), from_hex(bytes[idx + 2])) {
                    (Some(hi), Some(lo)) => {
                        out.push(hi << 4 | lo);
                        idx += 3;
                    }
                    _ => {
                        out.push(b'%');
                        idx += 1;
                    }
                }
            }
            byte => {
                out.push(byte);
                idx += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).to_string()
}

fn from_hex(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(10 + (byte - b'a')),
        b'A'..=b'F' => Some(10 + (byte - b'A')),
        _ => None,
    }
}
