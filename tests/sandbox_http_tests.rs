//! Integration tests for the HTTP sandbox client against a loopback stub
//! speaking just enough HTTP/1.1 to stand in for the Cuckoo REST API.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::path::Path;
use std::sync::{Arc, Mutex};

use cuckoolyse::config::{Config, SandboxConfig};
use cuckoolyse::error::{CuckooError, FailureKind};
use cuckoolyse::model::attachment::{AnalysisMode, Attachment};
use cuckoolyse::parser::mime::parse_email;
use cuckoolyse::pipeline::{Outcome, Pipeline};
use cuckoolyse::sandbox::{CuckooClient, Novelty, Sandbox, Submission};
use cuckoolyse::unpack::NoUnpack;

#[derive(Debug, Clone)]
struct Request {
    method: String,
    path: String,
    head: String,
    body: Vec<u8>,
}

impl Request {
    fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

type Route = dyn Fn(&Request) -> (u16, String) + Send + Sync;

struct Stub {
    url: String,
    requests: Arc<Mutex<Vec<Request>>>,
}

impl Stub {
    /// Serve `route` on an ephemeral loopback port, one request per connection.
    fn start(route: impl Fn(&Request) -> (u16, String) + Send + Sync + 'static) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let requests = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&requests);
        let route: Box<Route> = Box::new(route);

        std::thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(mut stream) = stream else { continue };
                let Ok(request) = read_request(&mut stream) else {
                    continue;
                };
                let (status, body) = route(&request);
                recorded.lock().unwrap().push(request);
                let response = format!(
                    "HTTP/1.1 {status} Stub\r\n\
                     Content-Type: application/json\r\n\
                     Content-Length: {}\r\n\
                     Connection: close\r\n\
                     \r\n\
                     {body}",
                    body.len()
                );
                let _ = stream.write_all(response.as_bytes());
                let _ = stream.flush();
            }
        });

        Self { url, requests }
    }

    fn config(&self) -> SandboxConfig {
        SandboxConfig {
            url: self.url.clone(),
            timeout_secs: 5,
            use_proxy: false,
            ..SandboxConfig::default()
        }
    }

    fn requests(&self) -> Vec<Request> {
        self.requests.lock().unwrap().clone()
    }

    fn posts(&self) -> Vec<Request> {
        self.requests()
            .into_iter()
            .filter(|r| r.method == "POST")
            .collect()
    }
}

/// Accept connections on a loopback port and never answer.
fn silent_server() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    std::thread::spawn(move || {
        let mut held = Vec::new();
        for stream in listener.incoming() {
            held.extend(stream.ok());
        }
    });
    url
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn read_request(stream: &mut TcpStream) -> std::io::Result<Request> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 8192];

    let header_end = loop {
        if let Some(pos) = find(&buf, b"\r\n\r\n") {
            break pos + 4;
        }
        let n = stream.read(&mut chunk)?;
        if n == 0 {
            return Err(std::io::ErrorKind::UnexpectedEof.into());
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).into_owned();
    let mut request_line = head.lines().next().unwrap_or("").split_whitespace();
    let method = request_line.next().unwrap_or("").to_string();
    let path = request_line.next().unwrap_or("").to_string();

    let header = |name: &str| {
        head.lines().skip(1).find_map(|line| {
            let (key, value) = line.split_once(':')?;
            key.trim()
                .eq_ignore_ascii_case(name)
                .then(|| value.trim().to_string())
        })
    };
    let chunked = header("transfer-encoding").is_some_and(|v| v.eq_ignore_ascii_case("chunked"));
    let content_length: usize = header("content-length")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);

    let mut body = buf[header_end..].to_vec();
    if chunked {
        while find(&body, b"0\r\n\r\n").is_none() {
            let n = stream.read(&mut chunk)?;
            if n == 0 {
                break;
            }
            body.extend_from_slice(&chunk[..n]);
        }
        body = dechunk(&body);
    } else {
        while body.len() < content_length {
            let n = stream.read(&mut chunk)?;
            if n == 0 {
                break;
            }
            body.extend_from_slice(&chunk[..n]);
        }
    }

    Ok(Request {
        method,
        path,
        head,
        body,
    })
}

fn dechunk(mut data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    while let Some(line_end) = find(data, b"\r\n") {
        let size_str = String::from_utf8_lossy(&data[..line_end]);
        let size = usize::from_str_radix(size_str.split(';').next().unwrap_or("0").trim(), 16)
            .unwrap_or(0);
        if size == 0 {
            break;
        }
        let start = line_end + 2;
        out.extend_from_slice(&data[start..start + size]);
        data = &data[start + size + 2..];
    }
    out
}

fn fixture(name: &str) -> Vec<u8> {
    std::fs::read(
        Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("tests")
            .join("fixtures")
            .join(name),
    )
    .unwrap()
}

// ─── Novelty lookups ────────────────────────────────────────────────

#[test]
fn test_lookup_uses_sha256_path() {
    let stub = Stub::start(|_| (404, r#"{"message": "File not found"}"#.into()));
    let client = CuckooClient::new(&stub.config()).unwrap();

    assert!(matches!(client.check_novelty("abc123"), Novelty::Unknown));

    let requests = stub.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].method, "GET");
    assert_eq!(requests[0].path, "/files/view/sha256/abc123");
}

#[test]
fn test_lookup_found_is_known() {
    let stub = Stub::start(|_| (200, r#"{"sample": {"id": 3}}"#.into()));
    let client = CuckooClient::new(&stub.config()).unwrap();
    assert!(matches!(client.check_novelty("ff"), Novelty::Known(_)));
}

#[test]
fn test_lookup_server_error_is_indeterminate() {
    let stub = Stub::start(|_| (500, "{}".into()));
    let client = CuckooClient::new(&stub.config()).unwrap();
    match client.check_novelty("ff") {
        Novelty::Indeterminate(e) => assert_eq!(e.kind(), FailureKind::Protocol),
        other => panic!("expected Indeterminate, got {other:?}"),
    }
}

#[test]
fn test_api_token_is_sent_as_bearer() {
    let stub = Stub::start(|_| (404, "{}".into()));
    let config = SandboxConfig {
        api_token: Some("t0ken".into()),
        ..stub.config()
    };
    let client = CuckooClient::new(&config).unwrap();
    client.check_novelty("ff");

    let head = stub.requests()[0].head.to_ascii_lowercase();
    assert!(head.contains("authorization: bearer t0ken"), "{head}");
}

#[test]
fn test_silent_sandbox_times_out() {
    let config = SandboxConfig {
        url: silent_server(),
        timeout_secs: 1,
        use_proxy: false,
        ..SandboxConfig::default()
    };
    let client = CuckooClient::new(&config).unwrap();
    match client.check_novelty("ff") {
        Novelty::Indeterminate(e) => {
            assert!(matches!(e, CuckooError::Timeout(1)), "{e:?}");
            assert_eq!(e.kind(), FailureKind::Transport);
        }
        other => panic!("expected Indeterminate, got {other:?}"),
    }
}

#[test]
fn test_timeout_fails_only_the_candidate() {
    let mut config = Config::default();
    config.sandbox = SandboxConfig {
        url: silent_server(),
        timeout_secs: 1,
        use_proxy: false,
        ..SandboxConfig::default()
    };
    let client = CuckooClient::new(&config.sandbox).unwrap();
    let tree = parse_email(&fixture("invoice_docm.eml")).unwrap();

    let reports = Pipeline::new(&config, client, NoUnpack).process(&tree);

    assert_eq!(reports.len(), 1);
    assert!(matches!(
        reports[0].outcome,
        Outcome::Failed(CuckooError::Timeout(1))
    ));
}

// ─── Submission ─────────────────────────────────────────────────────

#[test]
fn test_submit_sends_file_and_options() {
    let stub = Stub::start(|_| (200, r#"{"task_id": 77}"#.into()));
    let client = CuckooClient::new(&stub.config()).unwrap();
    let att = Attachment::new("q3.xlsm", b"spreadsheet-bytes".to_vec());

    let task = client
        .submit(&Submission::new("CUCKOOLYSE-", &att, AnalysisMode::Office))
        .unwrap();
    assert_eq!(task.as_str(), "77");

    let post = &stub.posts()[0];
    assert_eq!(post.path, "/tasks/create/file");
    let body = post.body_text();
    assert!(body.contains(r#"name="file"; filename="CUCKOOLYSE-q3.xlsm""#), "{body}");
    assert!(body.contains("spreadsheet-bytes"));
    assert!(body.contains(r#"name="options""#));
    assert!(body.contains("mode=office"));
}

#[test]
fn test_submit_without_mode_sends_no_options() {
    let stub = Stub::start(|_| (200, r#"{"task_id": "12"}"#.into()));
    let client = CuckooClient::new(&stub.config()).unwrap();
    let att = Attachment::new("a.exe", b"MZ".to_vec());

    client
        .submit(&Submission::new("CUCKOOLYSE-", &att, AnalysisMode::None))
        .unwrap();
    assert!(!stub.posts()[0].body_text().contains("options"));
}

#[test]
fn test_submit_null_task_id_is_protocol_failure() {
    let stub = Stub::start(|_| (200, r#"{"task_id": null}"#.into()));
    let client = CuckooClient::new(&stub.config()).unwrap();
    let att = Attachment::new("a.exe", b"MZ".to_vec());

    let err = client
        .submit(&Submission::new("P-", &att, AnalysisMode::None))
        .unwrap_err();
    assert!(matches!(err, CuckooError::MissingTaskId));
    assert_eq!(err.kind(), FailureKind::Protocol);
}

#[test]
fn test_submit_http_error_is_protocol_failure() {
    let stub = Stub::start(|_| (400, r#"{"message": "bad"}"#.into()));
    let client = CuckooClient::new(&stub.config()).unwrap();
    let att = Attachment::new("a.exe", b"MZ".to_vec());

    let err = client
        .submit(&Submission::new("P-", &att, AnalysisMode::None))
        .unwrap_err();
    assert!(matches!(err, CuckooError::UnexpectedStatus { status: 400, .. }));
}

// ─── End to end over HTTP ───────────────────────────────────────────

fn cuckoo_route(known: bool) -> impl Fn(&Request) -> (u16, String) + Send + Sync + 'static {
    move |request| match (request.method.as_str(), known) {
        ("GET", true) => (200, r#"{"sample": {"id": 1}}"#.into()),
        ("GET", false) => (404, r#"{"message": "File not found"}"#.into()),
        _ => (200, r#"{"task_id": 9}"#.into()),
    }
}

#[test]
fn test_unknown_attachment_is_posted_once() {
    let stub = Stub::start(cuckoo_route(false));
    let mut config = Config::default();
    config.sandbox = stub.config();
    let client = CuckooClient::new(&config.sandbox).unwrap();
    let tree = parse_email(&fixture("invoice_docm.eml")).unwrap();

    let reports = Pipeline::new(&config, client, NoUnpack).process(&tree);

    assert!(matches!(reports[0].outcome, Outcome::Submitted(ref id) if id.as_str() == "9"));
    let posts = stub.posts();
    assert_eq!(posts.len(), 1);
    let body = posts[0].body_text();
    assert!(body.contains(r#"filename="CUCKOOLYSE-invoice.docm""#));
    assert!(body.contains("mode=office"));
}

#[test]
fn test_known_attachment_is_never_posted() {
    let stub = Stub::start(cuckoo_route(true));
    let mut config = Config::default();
    config.sandbox = stub.config();
    let client = CuckooClient::new(&config.sandbox).unwrap();
    let tree = parse_email(&fixture("invoice_docm.eml")).unwrap();

    let reports = Pipeline::new(&config, client, NoUnpack).process(&tree);

    assert!(matches!(reports[0].outcome, Outcome::SkippedKnown));
    assert!(stub.posts().is_empty());
    assert_eq!(stub.requests().len(), 1);
}
