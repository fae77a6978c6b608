use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpListener;
#[cfg(unix)]
use std::os::unix::net::UnixListener;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use bytes::BytesMut;
use clamd_client::{eicar, Client, InstreamCodec, ScanStatus, Target};
use tokio_util::codec::Decoder;

/// `StreamMaxLength` of the fake daemon. Must exceed the 68-byte EICAR pattern.
const MAX_STREAM: usize = 128;

const LIMIT_REPLY: &str = "INSTREAM size limit exceeded. ERROR\n";

/// What the fake daemon received on one connection.
#[derive(Debug, Default)]
struct Request {
    line: String,
    payload: Vec<u8>,
    chunks: usize,
}

/// Scripted clamd stand-in. Serves `connections` connections one after
/// another, answering each with `respond(&request)`, then returns what it saw.
struct FakeDaemon {
    target: Target,
    handle: JoinHandle<Vec<Request>>,
    _dir: Option<tempfile::TempDir>,
}

impl FakeDaemon {
    #[cfg(unix)]
    fn unix<F>(connections: usize, respond: F) -> Self
    where
        F: Fn(&Request) -> String + Send + 'static,
    {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clamd.ctl");
        let listener = UnixListener::bind(&path).unwrap();
        let handle = thread::spawn(move || {
            (0..connections)
                .map(|_| {
                    let (stream, _) = listener.accept().unwrap();
                    serve(stream, &respond)
                })
                .collect::<Vec<_>>()
        });
        Self {
            target: Target::unix(path),
            handle,
            _dir: Some(dir),
        }
    }

    /// Accepts one INSTREAM connection, reads the command and the first chunk
    /// header, writes `reply` and hangs up without draining the upload.
    #[cfg(unix)]
    fn unix_hang_up(reply: &'static str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clamd.ctl");
        let listener = UnixListener::bind(&path).unwrap();
        let handle = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream);
            let mut line = String::new();
            reader.read_line(&mut line).unwrap();
            let mut prefix = [0u8; 4];
            reader.read_exact(&mut prefix).unwrap();
            let _ = reader.get_mut().write_all(reply.as_bytes());
            vec![Request {
                line,
                ..Request::default()
            }]
        });
        Self {
            target: Target::unix(path),
            handle,
            _dir: Some(dir),
        }
    }

    fn tcp<F>(connections: usize, respond: F) -> Self
    where
        F: Fn(&Request) -> String + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let handle = thread::spawn(move || {
            (0..connections)
                .map(|_| {
                    let (stream, _) = listener.accept().unwrap();
                    stream
                        .set_read_timeout(Some(Duration::from_secs(5)))
                        .unwrap();
                    serve(stream, &respond)
                })
                .collect::<Vec<_>>()
        });
        Self {
            target: Target::tcp("127.0.0.1", port),
            handle,
            _dir: None,
        }
    }

    fn client(&self) -> Client {
        Client::new(self.target.clone()).with_timeout(Duration::from_secs(5))
    }

    fn requests(self) -> Vec<Request> {
        self.handle.join().expect("fake daemon panicked")
    }
}

fn serve<S: Read + Write>(stream: S, respond: &impl Fn(&Request) -> String) -> Request {
    let mut reader = BufReader::new(stream);
    let mut line = Vec::new();
    reader.read_until(b'\n', &mut line).unwrap();
    let mut request = Request {
        line: String::from_utf8(line).unwrap(),
        ..Request::default()
    };

    if request.line == "nINSTREAM\n" {
        let mut buf = BytesMut::new();
        'frames: loop {
            while let Some(chunk) = InstreamCodec.decode(&mut buf).unwrap() {
                if chunk.is_empty() {
                    break 'frames;
                }
                request.chunks += 1;
                request.payload.extend_from_slice(&chunk);
            }
            let mut tmp = [0u8; 4096];
            let n = reader.read(&mut tmp).unwrap();
            assert!(n > 0, "client hung up before the terminator");
            buf.extend_from_slice(&tmp[..n]);
        }
    }

    let reply = respond(&request);
    // The client may have timed out and gone away.
    let _ = reader.get_mut().write_all(reply.as_bytes());
    request
}

/// INSTREAM verdict the fake daemon gives for a payload.
fn stream_verdict(req: &Request) -> String {
    if req.payload.len() > MAX_STREAM {
        LIMIT_REPLY.to_string()
    } else if req.payload == eicar() {
        "stream: Eicar-Test-Signature FOUND\n".to_string()
    } else {
        "stream: OK\n".to_string()
    }
}

// ─── Scalar commands ────────────────────────────────────────────────────────

#[cfg(unix)]
#[test]
fn ping_pong() {
    let daemon = FakeDaemon::unix(1, |_| "PONG\n".into());
    assert!(daemon.client().ping().unwrap());
    let requests = daemon.requests();
    assert_eq!(requests[0].line, "nPING\n");
}

#[cfg(unix)]
#[test]
fn ping_twice_uses_fresh_connections() {
    let daemon = FakeDaemon::unix(2, |_| "PONG\n".into());
    let client = daemon.client();
    assert!(client.ping().unwrap());
    assert!(client.ping().unwrap());
    let requests = daemon.requests();
    assert_eq!(requests.len(), 2);
    assert!(requests.iter().all(|r| r.line == "nPING\n"));
}

#[cfg(unix)]
#[test]
fn ping_unexpected_reply_is_connection_error() {
    let daemon = FakeDaemon::unix(1, |_| "PANG\n".into());
    let err = daemon.client().ping().unwrap_err();
    assert!(err.is_connection_error());
    assert!(err.to_string().contains("PANG"));
    daemon.requests();
}

#[cfg(unix)]
#[test]
fn ping_without_reply_is_connection_error() {
    let daemon = FakeDaemon::unix(1, |_| String::new());
    assert!(daemon.client().ping().unwrap_err().is_connection_error());
    daemon.requests();
}

#[cfg(unix)]
#[test]
fn version_and_reload_return_reply_line() {
    let daemon = FakeDaemon::unix(2, |req| match req.line.as_str() {
        "nVERSION\n" => "ClamAV 1.4.1/27480/Mon Dec  9 09:33:41 2024\n".into(),
        "nRELOAD\n" => "RELOADING\n".into(),
        other => panic!("unexpected request {other:?}"),
    });
    let client = daemon.client();
    assert!(client.version().unwrap().starts_with("ClamAV"));
    assert_eq!(client.reload().unwrap(), "RELOADING");
    daemon.requests();
}

#[cfg(unix)]
#[test]
fn scalar_error_suffix_is_response_error() {
    let daemon = FakeDaemon::unix(1, |_| "Command not allowed ERROR\n".into());
    let err = daemon.client().version().unwrap_err();
    assert!(err.is_response_error());
    assert_eq!(err.to_string(), "clamd response error: Command not allowed");
    daemon.requests();
}

#[cfg(unix)]
#[test]
fn shutdown_ignores_reply() {
    let daemon = FakeDaemon::unix(1, |_| String::new());
    daemon.client().shutdown().unwrap();
    let requests = daemon.requests();
    assert_eq!(requests[0].line, "nSHUTDOWN\n");
}

#[cfg(unix)]
#[test]
fn stats_returned_raw() {
    const STATS: &str = "POOLS: 1\n\nSTATE: VALID PRIMARY\nTHREADS: live 1  idle 0 max 12 idle-timeout 30\nQUEUE: 0 items\nEND\n";
    let daemon = FakeDaemon::unix(1, |_| STATS.into());
    assert_eq!(daemon.client().stats().unwrap(), STATS);
    assert_eq!(daemon.requests()[0].line, "nSTATS\n");
}

// ─── File system scans ──────────────────────────────────────────────────────

#[cfg(unix)]
#[test]
fn scan_infected_file() {
    let daemon = FakeDaemon::unix(1, |req| {
        let path = req.line.trim_start_matches("nSCAN ").trim_end();
        format!("{path}: Eicar-Test-Signature FOUND\n")
    });
    let results = daemon.client().scan("/tmp/eicar.com").unwrap();
    assert_eq!(results.len(), 1);
    let entry = results.get("/tmp/eicar.com").unwrap();
    assert_eq!(entry.status, ScanStatus::Found);
    assert_eq!(entry.signature(), Some("Eicar-Test-Signature"));
    assert_eq!(daemon.requests()[0].line, "nSCAN /tmp/eicar.com\n");
}

#[cfg(unix)]
#[test]
fn scan_clean_file_keeps_ok_entry() {
    let daemon = FakeDaemon::unix(1, |_| "/srv/readme.txt: OK\n".into());
    let results = daemon.client().scan("/srv/readme.txt").unwrap();
    assert!(results.is_clean());
    assert_eq!(
        results.get("/srv/readme.txt").map(|e| e.status),
        Some(ScanStatus::Ok)
    );
    daemon.requests();
}

#[cfg(unix)]
#[test]
fn multiscan_reports_only_infected_files() {
    let daemon = FakeDaemon::unix(1, |_| {
        (0..10)
            .map(|i| format!("/data/in/file{i}: Eicar-Test-Signature FOUND\n"))
            .collect()
    });
    let results = daemon.client().multiscan("/data/in").unwrap();
    assert_eq!(results.len(), 10);
    assert_eq!(results.found().count(), 10);
    assert!(results.get("/data/in/file3").is_some());
    assert!(results.get("/data/in").is_none());
    assert_eq!(daemon.requests()[0].line, "nMULTISCAN /data/in\n");
}

#[cfg(unix)]
#[test]
fn contscan_keeps_colon_paths_and_errors() {
    let daemon = FakeDaemon::unix(1, |_| {
        "/share/Q3: budget.xls: Xls.Dropper.Agent-1 FOUND\n/share/locked: Access denied. ERROR\n"
            .into()
    });
    let results = daemon.client().contscan("/share").unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(
        results
            .get("/share/Q3: budget.xls")
            .and_then(|e| e.signature()),
        Some("Xls.Dropper.Agent-1")
    );
    let locked = results.get("/share/locked").unwrap();
    assert_eq!(locked.status, ScanStatus::Error);
    assert_eq!(locked.detail.as_deref(), Some("Access denied."));
    assert_eq!(daemon.requests()[0].line, "nCONTSCAN /share\n");
}

#[cfg(unix)]
#[test]
fn scan_with_no_lines_is_empty() {
    let daemon = FakeDaemon::unix(1, |_| String::new());
    assert!(daemon.client().scan("/empty").unwrap().is_empty());
    daemon.requests();
}

#[cfg(unix)]
#[test]
fn malformed_scan_line_is_response_error() {
    let daemon = FakeDaemon::unix(1, |_| "/a: OK\nCOMMAND READ TIMED OUT\n".into());
    let err = daemon.client().scan("/a").unwrap_err();
    assert!(err.is_response_error());
    assert!(!err.is_buffer_too_long());
    daemon.requests();
}

// ─── INSTREAM ───────────────────────────────────────────────────────────────

#[cfg(unix)]
#[test]
fn instream_clean_buffer() {
    let daemon = FakeDaemon::unix(1, stream_verdict);
    let results = daemon.client().instream(&b"foo"[..]).unwrap();
    assert_eq!(results.len(), 1);
    let entry = results.get("stream").unwrap();
    assert_eq!(entry.status, ScanStatus::Ok);
    assert!(entry.detail.is_none());

    let requests = daemon.requests();
    assert_eq!(requests[0].line, "nINSTREAM\n");
    assert_eq!(requests[0].payload, b"foo");
    assert_eq!(requests[0].chunks, 1);
}

#[cfg(unix)]
#[test]
fn instream_eicar_in_small_chunks() {
    let daemon = FakeDaemon::unix(1, stream_verdict);
    let results = daemon
        .client()
        .with_chunk_size(16)
        .instream(eicar())
        .unwrap();
    assert_eq!(
        results.get("stream").and_then(|e| e.signature()),
        Some("Eicar-Test-Signature")
    );

    let requests = daemon.requests();
    assert_eq!(requests[0].payload, eicar());
    assert_eq!(requests[0].chunks, 5); // 68 bytes in 16-byte chunks
}

#[cfg(unix)]
#[test]
fn instream_empty_source_sends_terminator_only() {
    let daemon = FakeDaemon::unix(1, stream_verdict);
    let results = daemon.client().instream(std::io::empty()).unwrap();
    assert!(results.is_clean());
    let requests = daemon.requests();
    assert_eq!(requests[0].chunks, 0);
    assert!(requests[0].payload.is_empty());
}

#[cfg(unix)]
#[test]
fn instream_over_limit_is_buffer_too_long() {
    let daemon = FakeDaemon::unix(1, stream_verdict);
    let big = vec![b'a'; MAX_STREAM * 4];
    let err = daemon.client().instream(&big[..]).unwrap_err();
    assert!(err.is_buffer_too_long());
    assert!(err.is_response_error());
    assert_eq!(daemon.requests()[0].payload.len(), MAX_STREAM * 4);
}

#[cfg(unix)]
#[test]
fn instream_rejected_mid_upload_is_buffer_too_long() {
    let daemon = FakeDaemon::unix_hang_up(LIMIT_REPLY);
    let big = vec![b'a'; 8 * 1024 * 1024];
    let err = daemon
        .client()
        .with_chunk_size(64 * 1024)
        .instream(&big[..])
        .unwrap_err();
    assert!(err.is_buffer_too_long(), "unexpected error: {err}");
    assert_eq!(daemon.requests()[0].line, "nINSTREAM\n");
}

#[cfg(unix)]
#[test]
fn instream_hang_up_without_reply_is_connection_error() {
    let daemon = FakeDaemon::unix_hang_up("");
    let big = vec![b'a'; 8 * 1024 * 1024];
    let err = daemon
        .client()
        .with_chunk_size(64 * 1024)
        .instream(&big[..])
        .unwrap_err();
    assert!(err.is_connection_error(), "unexpected error: {err}");
    daemon.requests();
}

#[cfg(unix)]
#[test]
fn instream_from_file() {
    let mut file = tempfile::tempfile().unwrap();
    file.write_all(b"plain text attachment").unwrap();
    std::io::Seek::rewind(&mut file).unwrap();

    let daemon = FakeDaemon::unix(1, stream_verdict);
    let results = daemon.client().instream(file).unwrap();
    assert!(results.is_clean());
    assert_eq!(daemon.requests()[0].payload, b"plain text attachment");
}

// ─── Transport ──────────────────────────────────────────────────────────────

#[test]
fn tcp_target_round_trip() {
    let daemon = FakeDaemon::tcp(3, |req| match req.line.as_str() {
        "nPING\n" => "PONG\n".into(),
        "nINSTREAM\n" => stream_verdict(req),
        other => format!("{}: OK\n", other.trim_start_matches("nSCAN ").trim_end()),
    });
    let client = daemon.client();
    assert!(client.ping().unwrap());
    assert!(client.instream(&b"foo"[..]).unwrap().is_clean());
    assert!(client.scan("/srv/www").unwrap().is_clean());
    assert_eq!(daemon.requests().len(), 3);
}

#[cfg(unix)]
#[test]
fn read_timeout_is_connection_error() {
    let daemon = FakeDaemon::unix(1, |_| {
        thread::sleep(Duration::from_millis(500));
        "PONG\n".into()
    });
    let client = Client::new(daemon.target.clone()).with_timeout(Duration::from_millis(100));
    let err = client.ping().unwrap_err();
    assert!(err.is_connection_error());
    daemon.requests();
}

#[test]
fn missing_socket_is_connection_error() {
    let dir = tempfile::tempdir().unwrap();
    let client = Client::unix(dir.path().join("404"));
    let err = client.version().unwrap_err();
    assert!(err.is_connection_error());
    assert!(err.to_string().contains("404"));
}
