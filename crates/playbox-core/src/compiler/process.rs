//! External component compiler over newline-delimited JSON.
//!
//! Keeps a long-running child process and sends one request per line on its
//! stdin: `{"id","code","filename"}`. The child answers each with one line on
//! stdout: `{"id","ok","js","css","error"}`. The child is spawned on first use
//! and respawned if it dies. A child that does not answer within the timeout
//! is killed and the compile fails.

use serde::{Deserialize, Serialize};
use std::io::{self, BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tempfile::TempDir;
use tracing::{debug, warn};

use super::{CompiledComponent, ComponentCompiler, CompilerError};

/// The embedded driver for the `ripple/compiler` Node package.
const RIPPLE_DRIVER_JS: &str = include_str!("ripple_compiler.mjs");

/// How long one compile may take before the child is killed.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Serialize)]
struct CompileRequest<'a> {
    id: String,
    code: &'a str,
    filename: &'a str,
}

#[derive(Debug, Deserialize)]
struct CompileResponse {
    id: String,
    ok: bool,
    #[serde(default)]
    js: String,
    #[serde(default)]
    css: String,
    #[serde(default)]
    error: Option<String>,
}

struct Running {
    child: Child,
    stdin: ChildStdin,
    /// Stdout lines, read on a helper thread so waits can time out.
    lines: Receiver<io::Result<String>>,
}

impl Running {
    fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }
}

impl Drop for Running {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

struct State {
    running: Option<Running>,
    next_id: u64,
}

/// Component compiler backed by a warm child process.
pub struct ProcessCompiler {
    program: PathBuf,
    args: Vec<String>,
    cwd: Option<PathBuf>,
    timeout: Duration,
    state: Mutex<State>,
    /// Holds the written driver script alive for the child's lifetime.
    _driver_dir: Option<TempDir>,
}

impl std::fmt::Debug for ProcessCompiler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessCompiler")
            .field("program", &self.program)
            .field("args", &self.args)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl ProcessCompiler {
    /// Compiler that runs `program args...`.
    #[must_use]
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            cwd: None,
            timeout: DEFAULT_TIMEOUT,
            state: Mutex::new(State {
                running: None,
                next_id: 0,
            }),
            _driver_dir: None,
        }
    }

    /// Compiler driving the `ripple/compiler` package with `node`.
    pub fn ripple(node: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = tempfile::Builder::new().prefix("playbox-ripple-").tempdir()?;
        let script = dir.path().join("ripple-compiler.mjs");
        std::fs::write(&script, RIPPLE_DRIVER_JS)?;
        let mut compiler = Self::new(node, vec![script.to_string_lossy().into_owned()]);
        compiler._driver_dir = Some(dir);
        Ok(compiler)
    }

    /// Directory the child runs in (where it resolves packages from).
    #[must_use]
    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Per-compile deadline. Defaults to two minutes.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn spawn(&self) -> io::Result<Running> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(cwd) = &self.cwd {
            command.current_dir(cwd);
        }
        let mut child = command.spawn()?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| io::Error::other("failed to capture stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::other("failed to capture stdout"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| io::Error::other("failed to capture stderr"))?;

        // Drain stderr so a chatty compiler cannot fill the pipe and block.
        std::thread::Builder::new()
            .name("component-compiler-stderr".to_string())
            .spawn(move || {
                let mut reader = BufReader::new(stderr);
                let mut line = String::new();
                loop {
                    line.clear();
                    match reader.read_line(&mut line) {
                        Ok(0) | Err(_) => break,
                        Ok(_) => debug!(target: "playbox_core::compiler::stderr", "{}", line.trim_end()),
                    }
                }
            })?;

        let (tx, lines) = mpsc::channel();
        std::thread::Builder::new()
            .name("component-compiler-stdout".to_string())
            .spawn(move || {
                let mut reader = BufReader::new(stdout);
                loop {
                    let mut line = String::new();
                    let read = reader.read_line(&mut line);
                    let done = !matches!(read, Ok(n) if n > 0);
                    if tx.send(read.map(|_| line)).is_err() || done {
                        break;
                    }
                }
            })?;

        debug!(program = %self.program.display(), pid = child.id(), "Spawned component compiler");
        Ok(Running {
            child,
            stdin,
            lines,
        })
    }

    fn roundtrip(&self, source: &str, filename: &str) -> io::Result<CompileResponse> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        let alive = state.running.as_mut().is_some_and(Running::is_alive);
        if !alive {
            if state.running.is_some() {
                warn!("Component compiler died, respawning");
            }
            state.running = Some(self.spawn()?);
        }

        state.next_id += 1;
        let id = format!("c{}", state.next_id);
        let request = CompileRequest {
            id: id.clone(),
            code: source,
            filename,
        };
        let mut json = serde_json::to_string(&request)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        json.push('\n');

        let running = state
            .running
            .as_mut()
            .ok_or_else(|| io::Error::other("component compiler not running"))?;
        let result = exchange(running, &json, &id, self.timeout);
        if result.is_err() {
            // Drop the child; the next call starts a fresh one.
            state.running = None;
        }
        result
    }
}

fn exchange(
    running: &mut Running,
    request: &str,
    id: &str,
    timeout: Duration,
) -> io::Result<CompileResponse> {
    running.stdin.write_all(request.as_bytes())?;
    running.stdin.flush()?;

    let line = match running.lines.recv_timeout(timeout) {
        Ok(line) => line?,
        Err(RecvTimeoutError::Timeout) => {
            warn!(?timeout, "Component compiler timed out");
            return Err(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("no response within {}ms", timeout.as_millis()),
            ));
        }
        Err(RecvTimeoutError::Disconnected) => String::new(),
    };
    if line.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "component compiler closed stdout",
        ));
    }
    let response: CompileResponse = serde_json::from_str(line.trim())
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    if response.id != id {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("response id mismatch: expected {id}, got {}", response.id),
        ));
    }
    Ok(response)
}

impl ComponentCompiler for ProcessCompiler {
    fn name(&self) -> &'static str {
        "process"
    }

    fn compile(&self, source: &str, id: &str) -> Result<CompiledComponent, CompilerError> {
        let response = self.roundtrip(source, id).map_err(|e| {
            CompilerError::unavailable(format!(
                "component compiler `{}` failed: {e}",
                self.program.display()
            ))
        })?;
        if response.ok {
            Ok(CompiledComponent {
                code: response.js,
                css: response.css,
            })
        } else {
            Err(CompilerError::component_error(
                response
                    .error
                    .unwrap_or_else(|| "component compiler reported an error".to_string()),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A shell stand-in for the compiler: echoes the request id back with fixed output.
    #[cfg(unix)]
    fn echo_compiler(ok: bool) -> ProcessCompiler {
        let reply = if ok {
            r#"{"id":"%s","ok":true,"js":"export default 1;","css":"p{}"}"#
        } else {
            r#"{"id":"%s","ok":false,"error":"boom"}"#
        };
        let script = format!(
            r#"while IFS= read -r line; do id=$(printf '%s' "$line" | sed 's/^{{"id":"\([^"]*\)".*/\1/'); printf '{reply}\n' "$id"; done"#
        );
        ProcessCompiler::new("sh", vec!["-c".to_string(), script])
    }

    #[cfg(unix)]
    #[test]
    fn test_roundtrip_over_ndjson() {
        let compiler = echo_compiler(true);
        for _ in 0..2 {
            let out = compiler.compile("<x/>", "/A.ripple").unwrap();
            assert_eq!(out.code, "export default 1;");
            assert_eq!(out.css, "p{}");
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_compiler_error_is_reported() {
        let err = echo_compiler(false).compile("x", "/B.ripple").unwrap_err();
        assert_eq!(err.code, "COMPONENT_ERROR");
        assert_eq!(err.message, "boom");
    }

    #[cfg(unix)]
    #[test]
    fn test_silent_compiler_times_out_and_is_killed() {
        let compiler = ProcessCompiler::new(
            "sh",
            vec!["-c".to_string(), "cat >/dev/null".to_string()],
        )
        .with_timeout(Duration::from_millis(200));

        let started = std::time::Instant::now();
        let err = compiler.compile("x", "/D.ripple").unwrap_err();
        assert!(started.elapsed() < Duration::from_secs(10));
        assert_eq!(err.code, "COMPILER_UNAVAILABLE");
        assert!(err.message.contains("no response within 200ms"), "{}", err.message);

        let state = compiler.state.lock().unwrap();
        assert!(state.running.is_none());
    }

    #[test]
    fn test_missing_program_is_unavailable() {
        let compiler = ProcessCompiler::new("playbox-no-such-compiler", Vec::new());
        let err = compiler.compile("x", "/C.ripple").unwrap_err();
        assert_eq!(err.code, "COMPILER_UNAVAILABLE");
    }

    #[test]
    fn test_ripple_driver_is_written() {
        let compiler = ProcessCompiler::ripple("node").unwrap();
        let script = PathBuf::from(&compiler.args[0]);
        assert_eq!(std::fs::read_to_string(script).unwrap(), RIPPLE_DRIVER_JS);
    }
}
