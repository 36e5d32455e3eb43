/*
 * Licensed to the Apache Software Foundation (ASF) under one
 * or more contributor license agreements.  See the NOTICE file
 * distributed with this work for additional information
 * regarding copyright ownership.  The ASF licenses this file
 * to you under the Apache License, Version 2.0 (the
 * "License"); you may not use this file except in compliance
 * with the License.  You may obtain a copy of the License at
 *
 *   http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing,
 * software distributed under the License is distributed on an
 * "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
 * KIND, either express or implied.  See the License for the
 * specific language governing permissions and limitations
 * under the License.
 */

//! Scoped execution of external commands with captured output and a hard
//! per-invocation timeout. Arguments are passed as discrete tokens, never
//! through a shell, so constructed paths and usernames cannot inject.

use crate::error::FixtureError;
use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread::{self, JoinHandle, sleep};
use std::time::{Duration, Instant};

const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(20);
const SIGTERM_GRACE: Duration = Duration::from_secs(5);

pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(120);

/// Captured result of a finished invocation. A nonzero exit code is not an
/// error at this layer; exit-code semantics are command-specific and belong
/// to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug, Clone)]
pub struct ExecRequest {
    binary: PathBuf,
    args: Vec<String>,
    envs: HashMap<String, String>,
    working_dir: Option<PathBuf>,
    timeout: Duration,
}

impl ExecRequest {
    pub fn new<I, S>(binary: impl Into<PathBuf>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            binary: binary.into(),
            args: args.into_iter().map(Into::into).collect(),
            envs: HashMap::new(),
            working_dir: None,
            timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.insert(key.into(), value.into());
        self
    }

    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.envs
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// `binary arg1 arg2 ...` for diagnostics.
    fn command_line(&self) -> String {
        let mut line = self.binary.display().to_string();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

#[derive(Debug, Default)]
pub struct ProcessExecutor;

impl ProcessExecutor {
    pub fn new() -> Self {
        Self
    }

    /// Runs the command to completion, capturing stdout and stderr. On
    /// timeout the process is terminated (SIGTERM, grace period, SIGKILL),
    /// all handles are reclaimed, and the call fails with partial output.
    /// A single invocation is never retried: the commands driven through
    /// this layer have non-idempotent side effects.
    pub fn execute(&self, request: &ExecRequest) -> Result<CommandOutput, FixtureError> {
        validate_binary(&request.binary)?;

        let mut command = Command::new(&request.binary);
        command
            .args(&request.args)
            .envs(&request.envs)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &request.working_dir {
            command.current_dir(dir);
        }

        log::debug!("executing `{}`", request.command_line());

        let mut child = command.spawn().map_err(|e| FixtureError::ProcessSpawn {
            binary: request.binary.display().to_string(),
            source: e,
        })?;

        let stdout_reader = drain_pipe(child.stdout.take());
        let stderr_reader = drain_pipe(child.stderr.take());

        let deadline = Instant::now() + request.timeout;
        loop {
            match child.try_wait()? {
                Some(status) => {
                    let stdout = join_reader(stdout_reader);
                    let stderr = join_reader(stderr_reader);
                    let exit_code = status.code().unwrap_or(-1);
                    log::debug!(
                        "`{}` exited with code {}",
                        request.command_line(),
                        exit_code
                    );
                    return Ok(CommandOutput {
                        exit_code,
                        stdout,
                        stderr,
                    });
                }
                None if Instant::now() >= deadline => {
                    log::warn!(
                        "`{}` exceeded its {}s timeout, reclaiming process",
                        request.command_line(),
                        request.timeout.as_secs()
                    );
                    graceful_kill(&mut child);
                    let _ = child.wait();
                    return Err(FixtureError::Timeout {
                        command: request.command_line(),
                        timeout_secs: request.timeout.as_secs(),
                        stdout: join_reader(stdout_reader),
                        stderr: join_reader(stderr_reader),
                    });
                }
                None => sleep(WAIT_POLL_INTERVAL),
            }
        }
    }
}

fn validate_binary(binary: &Path) -> Result<(), FixtureError> {
    let metadata = std::fs::metadata(binary).map_err(|_| {
        FixtureError::validation(format!("binary does not exist: {}", binary.display()))
    })?;
    if !metadata.is_file() {
        return Err(FixtureError::validation(format!(
            "binary is not a regular file: {}",
            binary.display()
        )));
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if metadata.permissions().mode() & 0o111 == 0 {
            return Err(FixtureError::validation(format!(
                "binary is not executable: {}",
                binary.display()
            )));
        }
    }
    Ok(())
}

/// Drains a captured pipe on its own thread so a chatty child cannot block
/// on a full pipe buffer while we poll for exit.
fn drain_pipe<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<String>> {
    let mut pipe = pipe?;
    let handle = thread::Builder::new()
        .name("command-output-drain".to_string())
        .spawn(move || {
            let mut buffer = Vec::new();
            let _ = pipe.read_to_end(&mut buffer);
            String::from_utf8_lossy(&buffer).into_owned()
        })
        .ok()?;
    Some(handle)
}

fn join_reader(reader: Option<JoinHandle<String>>) -> String {
    reader
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default()
}

/// SIGTERM, wait up to the grace period, then SIGKILL.
fn graceful_kill(child: &mut Child) {
    let pid = child.id() as libc::pid_t;

    unsafe {
        libc::kill(pid, libc::SIGTERM);
    }

    let deadline = Instant::now() + SIGTERM_GRACE;
    while Instant::now() < deadline {
        match child.try_wait() {
            Ok(Some(_)) => return,
            Ok(None) => sleep(Duration::from_millis(50)),
            Err(_) => return,
        }
    }

    unsafe {
        libc::kill(pid, libc::SIGKILL);
    }
}
