//! Minimal HTTP/1.1 object store + metadata registry for integration tests.
//!
//! One request per connection (`Connection: close`). Understands the REST
//! layout used by `RestObjectStore` / `RestMetadataRegistry`, plus a few
//! diagnostic routes under `/api`. Faults can be injected per route.

use serde_json::{json, Value};
use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: String,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body_len: usize,
}

impl Recorded {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

struct Fault {
    method: String,
    path_contains: String,
    remaining: u32,
    status: u16,
}

struct Session {
    object_key: String,
    total: usize,
    data: Vec<u8>,
}

#[derive(Default)]
pub struct State {
    pub requests: Vec<Recorded>,
    /// locator -> bytes
    pub objects: HashMap<String, Vec<u8>>,
    /// Registered metadata bodies, in order.
    pub media: Vec<Value>,
    sessions: HashMap<String, Session>,
    faults: Vec<Fault>,
    next_id: u64,
}

#[derive(Clone)]
pub struct StoreServer {
    /// e.g. "http://127.0.0.1:12345" (no trailing slash).
    pub base: String,
    state: Arc<Mutex<State>>,
}

impl StoreServer {
    /// Starts the server in a background thread. It runs until the process exits.
    pub fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let port = listener.local_addr().unwrap().port();
        let state = Arc::new(Mutex::new(State::default()));
        let shared = Arc::clone(&state);
        thread::spawn(move || {
            for stream in listener.incoming().flatten() {
                let state = Arc::clone(&shared);
                thread::spawn(move || handle(stream, &state));
            }
        });
        StoreServer {
            base: format!("http://127.0.0.1:{port}"),
            state,
        }
    }

    /// The next `times` requests whose path contains `path_contains` get `status`.
    pub fn fail(&self, method: &str, path_contains: &str, times: u32, status: u16) {
        self.state().faults.push(Fault {
            method: method.to_string(),
            path_contains: path_contains.to_string(),
            remaining: times,
            status,
        });
    }

    pub fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    pub fn count(&self, method: &str, path_suffix: &str) -> usize {
        self.state()
            .requests
            .iter()
            .filter(|r| r.method == method && r.path.ends_with(path_suffix))
            .count()
    }
}

fn lock(state: &Mutex<State>) -> MutexGuard<'_, State> {
    state.lock().unwrap()
}

struct Request {
    method: String,
    path: String,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

fn read_request(stream: &mut TcpStream) -> Option<Request> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 64 * 1024];
    let header_end = loop {
        let n = stream.read(&mut chunk).ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos;
        }
    };
    let head = std::str::from_utf8(&buf[..header_end]).ok()?.to_string();
    let mut lines = head.lines();
    let mut first = lines.next()?.split_whitespace();
    let method = first.next()?.to_string();
    let path = first.next()?.to_string();
    let headers: Vec<(String, String)> = lines
        .filter_map(|l| l.split_once(':'))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect();
    let content_length = headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("content-length"))
        .and_then(|(_, v)| v.parse::<usize>().ok())
        .unwrap_or(0);

    let mut body = buf[header_end + 4..].to_vec();
    while body.len() < content_length {
        let n = stream.read(&mut chunk).ok()?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&chunk[..n]);
    }
    Some(Request {
        method,
        path,
        headers,
        body,
    })
}

fn respond(stream: &mut TcpStream, status: u16, body: &[u8]) {
    let reason = match status {
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        400 => "Bad Request",
        404 => "Not Found",
        409 => "Conflict",
        503 => "Service Unavailable",
        _ => "Status",
    };
    let head = format!(
        "HTTP/1.1 {status} {reason}\r\nContent-Length: {}\r\nContent-Type: application/json\r\nConnection: close\r\n\r\n",
        body.len()
    );
    let _ = stream.write_all(head.as_bytes());
    let _ = stream.write_all(body);
}

fn json_reply(stream: &mut TcpStream, status: u16, v: Value) {
    respond(stream, status, v.to_string().as_bytes());
}

fn handle(mut stream: TcpStream, state: &Mutex<State>) {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(10)));
    let _ = stream.set_write_timeout(Some(Duration::from_secs(10)));
    let Some(req) = read_request(&mut stream) else {
        return;
    };

    let fault = {
        let mut s = lock(state);
        s.requests.push(Recorded {
            method: req.method.clone(),
            path: req.path.clone(),
            headers: req.headers.clone(),
            body_len: req.body.len(),
        });
        s.faults
            .iter_mut()
            .find(|f| f.remaining > 0 && f.method == req.method && req.path.contains(&f.path_contains))
            .map(|f| {
                f.remaining -= 1;
                f.status
            })
    };
    if let Some(status) = fault {
        return respond(&mut stream, status, b"{\"error\":\"injected\"}");
    }

    let segments: Vec<&str> = req.path.trim_start_matches('/').split('/').collect();
    match (req.method.as_str(), segments.as_slice()) {
        ("PUT", ["store", "objects", key @ ..]) => {
            let locator = format!("obj/{}", key.join("/"));
            lock(state).objects.insert(locator.clone(), req.body);
            json_reply(&mut stream, 200, json!({ "locator": locator }));
        }
        ("DELETE", ["store", "objects"]) => {
            let v: Value = serde_json::from_slice(&req.body).unwrap_or(Value::Null);
            let locator = v["locator"].as_str().unwrap_or_default().to_string();
            let removed = lock(state).objects.remove(&locator).is_some();
            respond(&mut stream, if removed { 204 } else { 404 }, b"");
        }
        ("POST", ["store", "uploads"]) => {
            let v: Value = serde_json::from_slice(&req.body).unwrap_or(Value::Null);
            let mut s = lock(state);
            s.next_id += 1;
            let id = format!("s{}", s.next_id);
            s.sessions.insert(
                id.clone(),
                Session {
                    object_key: v["object_key"].as_str().unwrap_or_default().to_string(),
                    total: v["total_bytes"].as_u64().unwrap_or(0) as usize,
                    data: Vec::new(),
                },
            );
            drop(s);
            json_reply(&mut stream, 201, json!({ "session_id": id }));
        }
        ("PUT", ["store", "uploads", sid, "chunks", _index]) => {
            let start = req
                .headers
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case("content-range"))
                .and_then(|(_, v)| v.strip_prefix("bytes "))
                .and_then(|v| v.split('-').next())
                .and_then(|v| v.parse::<usize>().ok());
            let mut s = lock(state);
            let status = match (s.sessions.get_mut(*sid), start) {
                (Some(session), Some(start)) if start == session.data.len() => {
                    session.data.extend_from_slice(&req.body);
                    200
                }
                (Some(_), _) => 409,
                (None, _) => 404,
            };
            drop(s);
            respond(&mut stream, status, b"{}");
        }
        ("POST", ["store", "uploads", sid, "finalize"]) => {
            let mut s = lock(state);
            match s.sessions.remove(*sid) {
                Some(session) if session.data.len() == session.total => {
                    let locator = format!("obj/{}", session.object_key);
                    s.objects.insert(locator.clone(), session.data);
                    drop(s);
                    json_reply(&mut stream, 200, json!({ "locator": locator }));
                }
                Some(_) => {
                    drop(s);
                    respond(&mut stream, 400, b"{\"error\":\"incomplete\"}");
                }
                None => {
                    drop(s);
                    respond(&mut stream, 404, b"{}");
                }
            }
        }
        ("POST", ["api", "media"]) => {
            let v: Value = serde_json::from_slice(&req.body).unwrap_or(Value::Null);
            let mut s = lock(state);
            s.media.push(v);
            let id = s.media.len();
            drop(s);
            json_reply(&mut stream, 201, json!({ "id": id }));
        }
        ("GET", ["api", "whoami"]) => {
            let auth = req
                .headers
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case("authorization"))
                .map(|(_, v)| v.clone());
            json_reply(&mut stream, 200, json!({ "authorization": auth }));
        }
        ("GET", ["api", "slow", ms]) => {
            let ms = ms.parse::<u64>().unwrap_or(0);
            thread::sleep(Duration::from_millis(ms));
            json_reply(&mut stream, 200, json!({ "slept_ms": ms }));
        }
        ("GET", ["api", "status", code]) => {
            let code = code.parse::<u16>().unwrap_or(500);
            respond(&mut stream, code, b"{}");
        }
        ("GET", ["api", "items", id]) => {
            json_reply(&mut stream, 200, json!({ "id": id }));
        }
        _ => respond(&mut stream, 404, b"{}"),
    }
}
