/// Integration test suite: drives the compiled `remark` binary against temporary directory trees.
///
/// `CARGO_BIN_EXE_remark` is set by Cargo during `cargo test` to point to the compiled binary for
/// the current profile. Every command runs with the fixture directory as its working directory,
/// since remark always watches from the directory it is started in.
///
/// `serve` tests bind port 0 and read the chosen address from the startup log line.
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::mpsc;
use std::time::{Duration, Instant};

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_remark"))
}

/// Build a fixture tree: each entry is (relative path, contents).
fn fixture(files: &[(&str, &str)]) -> tempfile::TempDir {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    for (path, contents) in files {
        let full = dir.path().join(path);
        if let Some(parent) = full.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(full, contents).unwrap();
    }
    dir
}

/// Run a remark command in `dir` and assert it exits successfully.
/// Returns stdout as a String.
fn run_success(dir: &Path, args: &[&str]) -> String {
    let out = Command::new(binary())
        .args(args)
        .current_dir(dir)
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to invoke remark binary");
    let stdout = String::from_utf8_lossy(&out.stdout).to_string();
    let stderr = String::from_utf8_lossy(&out.stderr).to_string();
    assert!(
        out.status.success(),
        "command {:?} failed with status {:?}\nstdout: {}\nstderr: {}",
        args,
        out.status,
        stdout,
        stderr
    );
    stdout
}

/// Run a remark command in `dir` and assert it exits with a non-zero status.
/// Returns (stdout, stderr) as Strings.
fn run_failure(dir: &Path, args: &[&str]) -> (String, String) {
    let out = Command::new(binary())
        .args(args)
        .current_dir(dir)
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to invoke remark binary");
    let stdout = String::from_utf8_lossy(&out.stdout).to_string();
    let stderr = String::from_utf8_lossy(&out.stderr).to_string();
    assert!(
        !out.status.success(),
        "command {:?} expected to fail but exited successfully\nstdout: {}\nstderr: {}",
        args,
        stdout,
        stderr
    );
    (stdout, stderr)
}

/// Kills the server process when the test ends, pass or fail.
struct ServerGuard(Child);

impl Drop for ServerGuard {
    fn drop(&mut self) {
        let _ = self.0.kill();
        let _ = self.0.wait();
    }
}

/// Start `remark serve` on an ephemeral port in `dir` and return the guard and base address
/// (`127.0.0.1:PORT`).
fn start_server(dir: &Path, extra: &[&str]) -> (ServerGuard, String) {
    let mut child = Command::new(binary())
        .args(["serve", "-p", "0"])
        .args(extra)
        .current_dir(dir)
        .env_remove("RUST_LOG")
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to start remark serve");
    let stderr = child.stderr.take().unwrap();
    let guard = ServerGuard(child);

    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        for line in BufReader::new(stderr).lines().map_while(Result::ok) {
            if let Some(rest) = line.split("remark running at http://").nth(1) {
                let addr = rest.split_whitespace().next().unwrap_or_default().to_owned();
                let _ = tx.send(addr);
            }
        }
    });

    let addr = rx
        .recv_timeout(Duration::from_secs(10))
        .expect("server did not report its address");
    (guard, addr)
}

/// HTTP client that reports redirects instead of following them.
fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap()
}

/// GET `path` and return (status, body).
async fn get(addr: &str, path: &str) -> (reqwest::StatusCode, String) {
    let response = client()
        .get(format!("http://{addr}{path}"))
        .send()
        .await
        .expect("request failed");
    let status = response.status();
    (status, response.text().await.unwrap())
}

/// Poll `path` until the body satisfies `accept`, or panic after a few seconds.
async fn wait_for(addr: &str, path: &str, accept: impl Fn(&str) -> bool) -> String {
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        let (_, body) = get(addr, path).await;
        if accept(&body) {
            return body;
        }
        assert!(
            Instant::now() < deadline,
            "timed out waiting on {path}\nlast body: {body}"
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn open_socket(addr: &str, filename: &str) -> Socket {
    let (socket, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/watch?filename={filename}"))
        .await
        .expect("websocket handshake failed");
    socket
}

/// Read frames until a text frame contains `needle`; every frame seen must be text.
async fn next_push_containing(socket: &mut Socket, needle: &str) -> String {
    loop {
        let message = tokio::time::timeout(Duration::from_secs(10), socket.next())
            .await
            .unwrap_or_else(|_| panic!("no push containing {needle:?}"))
            .expect("socket ended before push")
            .expect("socket error");
        assert!(message.is_text(), "unexpected frame: {message:?}");
        let text = message.to_text().unwrap();
        if text.contains(needle) {
            return text.to_owned();
        }
    }
}

/// Collect text frames that arrive within `window`.
async fn drain(socket: &mut Socket, window: Duration) -> Vec<String> {
    let mut frames = Vec::new();
    while let Ok(Some(Ok(message))) = tokio::time::timeout(window, socket.next()).await {
        if let Ok(text) = message.to_text() {
            frames.push(text.to_owned());
        }
    }
    frames
}

// ---------------------------------------------------------------------------
// CLI surface
// ---------------------------------------------------------------------------

/// test_help — `--help` lists both subcommands.
#[test]
fn test_help() {
    let dir = fixture(&[]);
    let stdout = run_success(dir.path(), &["--help"]);
    assert!(stdout.contains("serve"), "help should mention serve\n{stdout}");
    assert!(stdout.contains("list"), "help should mention list\n{stdout}");
}

// ---------------------------------------------------------------------------
// list
// ---------------------------------------------------------------------------

/// test_list_default_pattern — with no flags every Markdown file is listed, nested paths first,
/// case-insensitive within each group.
#[test]
fn test_list_default_pattern() {
    let dir = fixture(&[
        ("b.md", "# B\n"),
        ("A.md", "# A\n"),
        ("docs/c.md", "# C\n"),
        ("notes.txt", "not markdown\n"),
    ]);
    let stdout = run_success(dir.path(), &["list"]);
    let lines: Vec<&str> = stdout.lines().collect();
    let nested = Path::new("docs").join("c.md");
    assert_eq!(lines, vec![nested.to_str().unwrap(), "A.md", "b.md"]);
}

/// test_list_json — `--json` prints a JSON array of display names.
#[test]
fn test_list_json() {
    let dir = fixture(&[("a.md", "# A\n"), ("b.txt", "B\n")]);
    let stdout = run_success(dir.path(), &["list", "--json", "-w", "*.md *.txt"]);
    let parsed: Vec<String> = serde_json::from_str(&stdout).expect("list --json is not valid JSON");
    assert_eq!(parsed, vec!["a.md", "b.txt"]);
}

/// test_list_repeated_watch_flags — repeated `-w` flags are unioned.
#[test]
fn test_list_repeated_watch_flags() {
    let dir = fixture(&[("a.md", ""), ("b.txt", ""), ("c.rs", "")]);
    let stdout = run_success(dir.path(), &["list", "-w", "*.md", "-w", "*.rs"]);
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines, vec!["a.md", "c.rs"]);
}

/// test_list_no_matches — an empty match set is not an error.
#[test]
fn test_list_no_matches() {
    let dir = fixture(&[("a.txt", "")]);
    let stdout = run_success(dir.path(), &["list"]);
    assert!(stdout.trim().is_empty(), "expected no output\n{stdout}");
}

/// test_list_invalid_pattern — a malformed glob is reported and exits non-zero.
#[test]
fn test_list_invalid_pattern() {
    let dir = fixture(&[]);
    let (_, stderr) = run_failure(dir.path(), &["list", "-w", "["]);
    assert!(
        stderr.contains("invalid glob pattern"),
        "stderr should name the bad pattern\nstderr: {stderr}"
    );
}

/// test_list_config_patterns — patterns from remark.toml apply when no `-w` is given, and `-w`
/// overrides them.
#[test]
fn test_list_config_patterns() {
    let dir = fixture(&[
        ("remark.toml", "patterns = [\"notes/*.txt\"]\n"),
        ("notes/todo.txt", "todo\n"),
        ("readme.md", "# Readme\n"),
    ]);

    let stdout = run_success(dir.path(), &["list"]);
    let expected = Path::new("notes").join("todo.txt");
    assert_eq!(stdout.trim(), expected.to_str().unwrap());

    let stdout = run_success(dir.path(), &["list", "-w", "*.md"]);
    assert_eq!(stdout.trim(), "readme.md");
}

// ---------------------------------------------------------------------------
// serve
// ---------------------------------------------------------------------------

/// test_serve_invalid_pattern — startup fails before binding when a pattern is malformed.
#[test]
fn test_serve_invalid_pattern() {
    let dir = fixture(&[]);
    let (_, stderr) = run_failure(dir.path(), &["serve", "-p", "0", "-w", "["]);
    assert!(
        stderr.contains("invalid glob pattern"),
        "stderr should name the bad pattern\nstderr: {stderr}"
    );
}

/// test_serve_end_to_end — the sidebar lists discovered files, rendered fragments come back for
/// watched files, unknown files redirect home, and files created later are picked up.
#[tokio::test]
async fn test_serve_end_to_end() {
    let dir = fixture(&[("docs/a.md", "# Hello\n\nsome *text*\n")]);
    let (_server, addr) = start_server(dir.path(), &["-w", "docs/*.md"]);

    let sidebar = wait_for(&addr, "/sidebar", |body| body.contains("a.md")).await;
    assert!(sidebar.contains("href=\"/?filename=docs%2Fa.md\""), "{sidebar}");

    let (status, page) = get(&addr, "/markdown?filename=docs/a.md").await;
    assert_eq!(status, reqwest::StatusCode::OK, "{page}");
    assert!(page.contains("<h1 id=\"hello\">Hello</h1>"), "{page}");
    assert!(page.contains("<em>text</em>"), "{page}");

    let (status, _) = get(&addr, "/markdown?filename=docs/missing.md").await;
    assert_eq!(status, reqwest::StatusCode::TEMPORARY_REDIRECT);

    std::fs::write(dir.path().join("docs/b.md"), "# Later\n").unwrap();
    wait_for(&addr, "/sidebar", |body| body.contains("b.md")).await;

    let (status, page) = get(&addr, "/").await;
    assert_eq!(status, reqwest::StatusCode::OK, "{page}");
    assert!(page.contains("/static/remark.js"), "{page}");
}

/// test_serve_pushes_over_websocket — a viewer socket receives the fresh render when its file
/// changes; closing one viewer leaves another on the same file receiving pushes.
#[tokio::test]
async fn test_serve_pushes_over_websocket() {
    let dir = fixture(&[("docs/a.md", "# Original\n"), ("docs/b.md", "# Other\n")]);
    let (_server, addr) = start_server(dir.path(), &["-w", "docs/*.md"]);
    wait_for(&addr, "/sidebar", |body| body.contains("a.md") && body.contains("b.md")).await;

    let mut first = open_socket(&addr, "docs/a.md").await;
    let mut second = open_socket(&addr, "docs/a.md").await;
    let mut other = open_socket(&addr, "docs/b.md").await;

    std::fs::write(dir.path().join("docs/a.md"), "# Fresh\n").unwrap();
    let push = next_push_containing(&mut first, "<h1 id=\"fresh\">Fresh</h1>").await;
    assert!(push.starts_with("<div id=\"markdown\""), "{push}");
    next_push_containing(&mut second, "Fresh").await;

    // One save may surface as more than one modification; each push re-renders the same file.
    for frame in drain(&mut first, Duration::from_millis(300)).await {
        assert!(frame.contains("Fresh"), "stale or foreign push: {frame}");
    }
    assert!(
        drain(&mut other, Duration::from_millis(300)).await.is_empty(),
        "viewer of another file must not be pushed"
    );

    first.send(Message::Close(None)).await.unwrap();
    let after_close = tokio::time::timeout(Duration::from_secs(5), first.next())
        .await
        .expect("closed socket did not finish");
    assert!(
        matches!(after_close, None | Some(Ok(Message::Close(_))) | Some(Err(_))),
        "unexpected frame after close: {after_close:?}"
    );

    std::fs::write(dir.path().join("docs/a.md"), "# Again\n").unwrap();
    next_push_containing(&mut second, "<h1 id=\"again\">Again</h1>").await;
}

/// test_serve_rejects_socket_for_unwatched_file — the handshake is refused with a redirect.
#[tokio::test]
async fn test_serve_rejects_socket_for_unwatched_file() {
    let dir = fixture(&[("docs/a.md", "# A\n")]);
    let (_server, addr) = start_server(dir.path(), &["-w", "docs/*.md"]);
    wait_for(&addr, "/sidebar", |body| body.contains("a.md")).await;

    let result =
        tokio_tungstenite::connect_async(format!("ws://{addr}/watch?filename=docs/missing.md"))
            .await;
    assert!(result.is_err(), "handshake for an unwatched file must fail");
}
