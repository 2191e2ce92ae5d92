//! Recording fakes for the collaborator traits.
//!
//! Every fake appends a line to a shared [`CallLog`] so tests can assert on
//! exactly which commands ran, where, and in what order.

use crate::collab::{
    ArtifactTransfer, BuildOutput, Builder, Collaborators, LocalExecutor, Notifier, RemoteExecutor,
};
use crate::context::{CommandResult, ExecOptions};
use crate::error::{Result, RolloutError};
use crate::host::{Host, Inventory, Role};
use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::{Arc, Mutex};
use tracing_subscriber::fmt::MakeWriter;

/// Commands containing this marker exit with status 1.
pub const FAIL: &str = "fail";
/// Commands containing this marker report a transport failure.
pub const UNREACHABLE: &str = "unreachable";

#[derive(Debug, Clone, Default)]
pub struct CallLog(Rc<RefCell<Vec<String>>>);

impl CallLog {
    pub fn push(&self, entry: String) {
        self.0.borrow_mut().push(entry);
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.borrow().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }
}

fn scripted(command: &str) -> Result<CommandResult> {
    if command.contains(UNREACHABLE) {
        return Err(RolloutError::Transport("connection refused".into()));
    }
    if command.contains(FAIL) {
        return Ok(CommandResult::failed(1, "boom"));
    }
    Ok(CommandResult::ok("ok"))
}

struct FakeLocal(CallLog);

impl LocalExecutor for FakeLocal {
    fn run(&self, command: &str, _opts: ExecOptions) -> Result<CommandResult> {
        self.0.push(format!("local: {command}"));
        scripted(command)
    }
}

struct FakeRemote(CallLog);

impl RemoteExecutor for FakeRemote {
    fn execute(&self, host: &Host, command: &str, opts: ExecOptions) -> Result<CommandResult> {
        let pty = if opts.pty { " [pty]" } else { "" };
        self.0.push(format!("{}: {command}{pty}", host.name));
        scripted(command)
    }
}

struct FakeTransfer {
    log: CallLog,
    fail_on: Vec<String>,
}

impl ArtifactTransfer for FakeTransfer {
    fn upload(&self, local_path: &Path, host: &Host, remote_path: &str) -> Result<()> {
        self.log.push(format!(
            "{}: upload {} -> {remote_path}",
            host.name,
            local_path.display()
        ));
        if self.fail_on.contains(&host.name) {
            return Err(RolloutError::Transport(format!("scp to {} failed", host.name)));
        }
        Ok(())
    }
}

struct FakeBuilder {
    log: CallLog,
    success: bool,
}

impl Builder for FakeBuilder {
    fn build(&self) -> Result<BuildOutput> {
        self.log.push("local: build".to_string());
        Ok(BuildOutput {
            artifact: PathBuf::from("build/node"),
            success: self.success,
            message: if self.success { "built" } else { "compile error" }.to_string(),
        })
    }
}

struct FakeNotifier {
    log: CallLog,
    fail: bool,
}

impl Notifier for FakeNotifier {
    fn notify(&self, message: &str) -> Result<()> {
        self.log.push(format!("notify: {message}"));
        if self.fail {
            return Err(RolloutError::Transport("chat hook down".into()));
        }
        Ok(())
    }
}

/// Knobs for the fake collaborators.
#[derive(Debug, Clone)]
pub struct Fakes {
    pub log: CallLog,
    pub build_succeeds: bool,
    pub upload_fails_on: Vec<String>,
    pub notify_fails: bool,
}

impl Default for Fakes {
    fn default() -> Self {
        Self {
            log: CallLog::default(),
            build_succeeds: true,
            upload_fails_on: Vec::new(),
            notify_fails: false,
        }
    }
}

impl Fakes {
    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            local: Box::new(FakeLocal(self.log.clone())),
            remote: Box::new(FakeRemote(self.log.clone())),
            transfer: Box::new(FakeTransfer {
                log: self.log.clone(),
                fail_on: self.upload_fails_on.clone(),
            }),
            builder: Box::new(FakeBuilder {
                log: self.log.clone(),
                success: self.build_succeeds,
            }),
            notifier: Box::new(FakeNotifier {
                log: self.log.clone(),
                fail: self.notify_fails,
            }),
        }
    }
}

/// `app = [h1, h2]`, `db = [d1]`, `spare = []`.
pub fn inventory() -> Inventory {
    Inventory::new(vec![
        Role::new(
            "app",
            vec![Host::new("h1", "10.0.0.1"), Host::new("h2", "10.0.0.2")],
        ),
        Role::new("db", vec![Host::new("d1", "10.0.1.1")]),
        Role::new("spare", vec![]),
    ])
}

/// In-memory sink for formatted log lines.
#[derive(Debug, Clone, Default)]
struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl std::io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogBuffer {
    type Writer = LogBuffer;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Run `f` with a thread-local subscriber and return everything it logged
/// at warn level or above.
pub fn capture_logs(f: impl FnOnce()) -> String {
    let buffer = LogBuffer::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(buffer.clone())
        .with_ansi(false)
        .with_target(false)
        .with_max_level(tracing::Level::WARN)
        .finish();
    tracing::subscriber::with_default(subscriber, f);
    let bytes = buffer.0.lock().unwrap().clone();
    String::from_utf8_lossy(&bytes).into_owned()
}
