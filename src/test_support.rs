//! Test support utilities shared across unit and integration tests.

use std::collections::{BTreeSet, VecDeque};
use std::env;
use std::ffi::OsString;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, MutexGuard as AsyncMutexGuard};

use crate::exec::{CommandOutput, CommandRunner, EnvMap, ExecError, RunnerFuture};
use crate::report::Reporter;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Scripted command runner that returns pre-seeded outputs in FIFO order.
///
/// Used to drive deterministic command outcomes without spawning processes.
/// Clones share the same queue, so a runner handed to an adapter can still be
/// inspected by the test afterwards.
#[derive(Clone, Debug, Default)]
pub struct ScriptedRunner {
    responses: Arc<Mutex<VecDeque<CommandOutput>>>,
    invocations: Arc<Mutex<Vec<CommandInvocation>>>,
}

/// Records a single invocation made through [`ScriptedRunner`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandInvocation {
    /// Program name as passed to the runner.
    pub program: String,
    /// Arguments passed to the program.
    pub args: Vec<OsString>,
    /// Replacement environment passed to the runner, when any.
    pub env: Option<EnvMap>,
}

impl CommandInvocation {
    /// Returns a shell-like command string for assertions.
    #[must_use]
    pub fn command_string(&self) -> String {
        let mut parts = Vec::with_capacity(self.args.len() + 1);
        parts.push(self.program.clone());
        parts.extend(
            self.args
                .iter()
                .map(|arg| arg.to_string_lossy().into_owned()),
        );
        parts.join(" ")
    }
}

impl ScriptedRunner {
    /// Creates a new runner with no queued responses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of all invocations recorded so far.
    #[must_use]
    pub fn invocations(&self) -> Vec<CommandInvocation> {
        lock(&self.invocations).clone()
    }

    /// Pushes a successful exit status.
    pub fn push_success(&self) {
        self.push_output(Some(0), "", "");
    }

    /// Pushes a specific exit code.
    pub fn push_exit_code(&self, code: i32) {
        self.push_output(Some(code), "", "");
    }

    /// Pushes a failing exit code with stderr text.
    pub fn push_failure(&self, code: i32) {
        self.push_output(Some(code), "", "simulated failure");
    }

    /// Pushes a response with no exit code to simulate abnormal termination.
    pub fn push_missing_exit_code(&self) {
        self.push_output(None, "", "");
    }

    /// Pushes an explicit command output response.
    pub fn push_output(
        &self,
        code: Option<i32>,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
    ) {
        lock(&self.responses).push_back(CommandOutput {
            code,
            stdout: stdout.into(),
            stderr: stderr.into(),
        });
    }
}

impl CommandRunner for ScriptedRunner {
    fn run<'a>(
        &'a self,
        program: &'a str,
        args: &'a [OsString],
        env: Option<&'a EnvMap>,
    ) -> RunnerFuture<'a> {
        Box::pin(async move {
            lock(&self.invocations).push(CommandInvocation {
                program: program.to_owned(),
                args: args.to_vec(),
                env: env.cloned(),
            });
            lock(&self.responses)
                .pop_front()
                .ok_or_else(|| ExecError::Spawn {
                    program: program.to_owned(),
                    message: String::from("no scripted response available"),
                })
        })
    }
}

/// Reporter that records emitted lines for assertions.
#[derive(Clone, Debug, Default)]
pub struct RecordingReporter {
    lines: Arc<Mutex<Vec<String>>>,
}

impl RecordingReporter {
    /// Creates a reporter with an empty line buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of all lines emitted so far.
    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        lock(&self.lines).clone()
    }
}

impl Reporter for RecordingReporter {
    fn emit(&self, line: &str) {
        lock(&self.lines).push(line.to_owned());
    }
}

/// Global mutex used to serialise environment mutation in tests.
pub static ENV_LOCK: AsyncMutex<()> = AsyncMutex::const_new(());

/// Guard that holds the env mutex and cleans up variables on drop.
pub struct EnvGuard {
    previous: Vec<(String, Option<OsString>)>,
    _guard: AsyncMutexGuard<'static, ()>,
}

impl EnvGuard {
    /// Sets multiple environment variables while holding a global mutex.
    pub async fn set_vars(pairs: &[(&str, &str)]) -> Self {
        debug_assert!(
            {
                let mut seen = BTreeSet::new();
                pairs.iter().all(|(key, _)| seen.insert(*key))
            },
            "duplicate environment variable keys passed to EnvGuard::set_vars"
        );

        let guard = ENV_LOCK.lock().await;
        let mut previous = Vec::with_capacity(pairs.len());
        for (key, value) in pairs {
            let old = env::var_os(key);
            // SAFETY: Environment mutation is serialised by `ENV_LOCK`, preventing races.
            unsafe { env::set_var(key, value) };
            previous.push(((*key).to_owned(), old));
        }

        Self {
            previous,
            _guard: guard,
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, old) in &self.previous {
            // SAFETY: Environment mutation is serialised by holding `_guard`.
            unsafe {
                match old {
                    Some(val) => env::set_var(key, val),
                    None => env::remove_var(key),
                }
            }
        }
    }
}

/// Renders a `docker-machine env --shell sh` export script from pairs.
#[must_use]
pub fn machine_env_script(pairs: &[(&str, &str)]) -> String {
    let mut script = pairs
        .iter()
        .map(|(key, value)| format!("export {key}=\"{value}\""))
        .collect::<Vec<_>>()
        .join("\n");
    script.push_str("\n# Run this command to configure your shell:\n");
    script
}

/// Produces a minimal JSON payload matching `aws ec2 describe-instances`.
#[must_use]
pub fn json_described_instance(
    name: &str,
    state: &str,
    private_ip: Option<&str>,
    public_dns: Option<&str>,
) -> String {
    let mut fields = vec![
        format!("\"State\":{{\"Name\":\"{state}\"}}"),
        format!("\"Tags\":[{{\"Key\":\"Name\",\"Value\":\"{name}\"}}]"),
    ];
    if let Some(ip) = private_ip {
        fields.push(format!("\"PrivateIpAddress\":\"{ip}\""));
    }
    if let Some(dns) = public_dns {
        fields.push(format!("\"PublicDnsName\":\"{dns}\""));
    }
    format!(
        "{{\"Reservations\":[{{\"Instances\":[{{{}}}]}}]}}",
        fields.join(",")
    )
}

/// Produces the describe-instances payload for an unknown machine name.
#[must_use]
pub fn json_no_reservations() -> String {
    String::from("{\"Reservations\":[]}")
}
