//! Shared fixtures for the integration tests: a local HTTP file server,
//! a scripted system for git/pip commands and manifest helpers.

#![allow(dead_code)]

use std::collections::HashMap;
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use benchpack::system::{CommandOutput, CommandSpec, SystemError, SystemOps, SystemResult};
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use tiny_http::{Header, Method, Request, Response, Server, StatusCode};

pub fn sha256_hex(data: &[u8]) -> String {
    format!("{:x}", Sha256::digest(data))
}

/// Deterministic payload of `len` bytes.
pub fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

/// A file served by [`FileServer`].
#[derive(Clone, Default)]
pub struct Route {
    pub body: Vec<u8>,
    /// Status for every request; 200/206 when `None`.
    pub status: Option<u16>,
    /// Delay before answering a GET.
    pub delay: Option<Duration>,
    /// Bearer token the request must carry.
    pub require_token: Option<String>,
    /// `x-linked-etag` header value.
    pub linked_etag: Option<String>,
    /// Answer with a 302 to this location instead of the body.
    pub redirect: Option<String>,
    /// Send no `content-length` (chunked bodies).
    pub hide_length: bool,
}

impl Route {
    pub fn file(body: impl Into<Vec<u8>>) -> Self {
        Self {
            body: body.into(),
            ..Default::default()
        }
    }

    pub fn status(code: u16) -> Self {
        Self {
            status: Some(code),
            ..Default::default()
        }
    }

    pub fn redirect(location: &str) -> Self {
        Self {
            redirect: Some(location.to_string()),
            ..Default::default()
        }
    }

    pub fn without_length(mut self) -> Self {
        self.hide_length = true;
        self
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn gated(mut self, token: &str) -> Self {
        self.require_token = Some(token.to_string());
        self
    }

    pub fn with_etag(mut self, etag: &str) -> Self {
        self.linked_etag = Some(etag.to_string());
        self
    }
}

#[derive(Default)]
struct ServerState {
    routes: Mutex<HashMap<String, Route>>,
    gets: Mutex<HashMap<String, usize>>,
    ranges: Mutex<Vec<String>>,
    total_gets: AtomicUsize,
}

/// Range-capable HTTP file server on an ephemeral port.
pub struct FileServer {
    base: String,
    state: Arc<ServerState>,
}

impl FileServer {
    pub fn start() -> Self {
        let server = Server::http("127.0.0.1:0").unwrap();
        let addr = server.server_addr().to_ip().unwrap();
        let state = Arc::new(ServerState::default());

        let shared = Arc::clone(&state);
        thread::spawn(move || {
            for request in server.incoming_requests() {
                let state = Arc::clone(&shared);
                thread::spawn(move || handle(request, &state));
            }
        });

        Self {
            base: format!("http://{}", addr),
            state,
        }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base, path.trim_start_matches('/'))
    }

    pub fn route(&self, path: &str, route: Route) {
        self.state
            .routes
            .lock()
            .insert(format!("/{}", path.trim_start_matches('/')), route);
    }

    /// GET requests seen for `path`.
    pub fn gets(&self, path: &str) -> usize {
        let key = format!("/{}", path.trim_start_matches('/'));
        self.state.gets.lock().get(&key).copied().unwrap_or(0)
    }

    pub fn total_gets(&self) -> usize {
        self.state.total_gets.load(Ordering::SeqCst)
    }

    /// `Range` headers received, in arrival order.
    pub fn ranges(&self) -> Vec<String> {
        self.state.ranges.lock().clone()
    }
}

fn header(name: &str, value: &str) -> Header {
    Header::from_bytes(name.as_bytes(), value.as_bytes()).unwrap()
}

fn request_header(request: &Request, name: &str) -> Option<String> {
    request
        .headers()
        .iter()
        .find(|h| h.field.as_str().as_str().eq_ignore_ascii_case(name))
        .map(|h| h.value.as_str().to_string())
}

fn handle(request: Request, state: &ServerState) {
    let path = request.url().split('?').next().unwrap_or("").to_string();
    let route = state.routes.lock().get(&path).cloned();
    let is_get = *request.method() == Method::Get;

    let Some(route) = route else {
        let _ = request.respond(Response::empty(StatusCode(404)));
        return;
    };

    if let Some(required) = &route.require_token {
        let expected = format!("Bearer {}", required);
        if request_header(&request, "Authorization").as_deref() != Some(expected.as_str()) {
            let _ = request.respond(Response::empty(StatusCode(401)));
            return;
        }
    }

    if is_get {
        state.total_gets.fetch_add(1, Ordering::SeqCst);
        *state.gets.lock().entry(path.clone()).or_insert(0) += 1;
        if let Some(delay) = route.delay {
            thread::sleep(delay);
        }
    }

    if let Some(code) = route.status {
        let _ = request.respond(Response::empty(StatusCode(code)));
        return;
    }

    if let Some(location) = &route.redirect {
        let mut response = Response::empty(StatusCode(302)).with_header(header("Location", location));
        if let Some(etag) = &route.linked_etag {
            response.add_header(header("X-Linked-Etag", &format!("\"{}\"", etag)));
        }
        let _ = request.respond(response);
        return;
    }

    let range_start = request_header(&request, "Range").and_then(|r| {
        state.ranges.lock().push(r.clone());
        r.strip_prefix("bytes=")
            .and_then(|s| s.trim_end_matches('-').parse::<usize>().ok())
    });

    let len = route.body.len();
    if matches!(range_start, Some(start) if is_get && start >= len) {
        let _ = request.respond(Response::empty(StatusCode(416)));
        return;
    }

    let length = |n: usize| (!route.hide_length).then_some(n);
    let mut response = match range_start {
        Some(start) if is_get && start < len => {
            Response::new(
                StatusCode(206),
                vec![header(
                    "Content-Range",
                    &format!("bytes {}-{}/{}", start, len - 1, len),
                )],
                Cursor::new(route.body[start..].to_vec()),
                length(len - start),
                None,
            )
        }
        _ => Response::new(
            StatusCode(200),
            Vec::new(),
            Cursor::new(route.body.clone()),
            length(len),
            None,
        ),
    };
    response.add_header(header("Accept-Ranges", "bytes"));
    if let Some(etag) = &route.linked_etag {
        response.add_header(header("X-Linked-Etag", &format!("\"{}\"", etag)));
    }
    let _ = request.respond(response);
}

type Handler = Box<dyn Fn(&CommandSpec) -> SystemResult<CommandOutput> + Send + Sync>;

/// Records commands and answers git/pip calls from a script.
///
/// `git clone` creates `<dest>/.git` unless a handler overrides it; other
/// unmatched commands succeed with empty output.
#[derive(Default)]
pub struct FakeSystem {
    calls: Mutex<Vec<String>>,
    script: Mutex<Vec<(String, Handler)>>,
}

impl FakeSystem {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Answer commands starting with `prefix` (space-joined) with `handler`.
    pub fn on<F>(&self, prefix: &str, handler: F)
    where
        F: Fn(&CommandSpec) -> SystemResult<CommandOutput> + Send + Sync + 'static,
    {
        self.script.lock().push((prefix.to_string(), Box::new(handler)));
    }

    pub fn commands(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.calls.lock().iter().filter(|c| c.starts_with(prefix)).count()
    }
}

pub fn output(stdout: &str) -> SystemResult<CommandOutput> {
    Ok(CommandOutput {
        stdout: stdout.to_string(),
        stderr: String::new(),
    })
}

pub fn failure(program: &str, stderr: &str) -> SystemResult<CommandOutput> {
    Err(SystemError::Exit {
        program: program.to_string(),
        code: Some(128),
        stderr: stderr.to_string(),
    })
}

impl SystemOps for FakeSystem {
    fn run(&self, spec: &CommandSpec) -> SystemResult<CommandOutput> {
        let mut parts = vec![spec.program_name()];
        parts.extend(spec.arg_strings());
        let line = parts.join(" ");
        self.calls.lock().push(line.clone());

        let script = self.script.lock();
        if let Some((_, handler)) = script.iter().find(|(prefix, _)| line.starts_with(prefix.as_str())) {
            return handler(spec);
        }
        drop(script);

        if line.starts_with("git clone") {
            if let Some(dest) = spec.args.last() {
                let dest = PathBuf::from(dest);
                fs::create_dir_all(dest.join(".git")).unwrap();
            }
        }
        output("")
    }
}

/// Write a YAML manifest with `items` into `dir`.
pub fn write_manifest(dir: &Path, items: serde_json::Value) -> PathBuf {
    let doc = serde_json::json!({
        "package": { "name": "test-pack", "version": "1.0", "description": "fixture" },
        "items": items
    });
    let path = dir.join("manifest.yaml");
    fs::write(&path, serde_yaml::to_string(&doc).unwrap()).unwrap();
    path
}

/// Every file under `root` with its contents, for before/after comparisons.
pub fn snapshot(root: &Path) -> Vec<(PathBuf, Vec<u8>)> {
    let mut files: Vec<_> = walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(Result::ok)
        .map(|e| {
            let data = if e.file_type().is_file() {
                fs::read(e.path()).unwrap()
            } else {
                Vec::new()
            };
            (e.path().to_path_buf(), data)
        })
        .collect();
    files.sort();
    files
}
