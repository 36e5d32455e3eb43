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

use crate::models::ServerVersion;
use std::io;
use std::path::PathBuf;

#[derive(Debug)]
pub enum FixtureError {
    Io(io::Error),
    /// A caller-supplied argument violated a stated precondition.
    /// Raised before any external process is spawned.
    Validation {
        message: String,
    },
    /// No known client bundle or server image for the requested version.
    Compatibility {
        version: ServerVersion,
    },
    /// A command exited nonzero or its output could not be parsed
    /// into the expected structure.
    Command {
        command: String,
        exit_code: i32,
        stdout: String,
        stderr: String,
    },
    /// A command exceeded its allotted duration and was forcibly reclaimed.
    /// Carries whatever output was captured before the kill.
    Timeout {
        command: String,
        timeout_secs: u64,
        stdout: String,
        stderr: String,
    },
    ProcessSpawn {
        binary: String,
        source: io::Error,
    },
    FileSystem {
        path: PathBuf,
        source: io::Error,
    },
    Container {
        message: String,
    },
    InvalidState {
        message: String,
    },
}

impl FixtureError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        FixtureError::Validation {
            message: message.into(),
        }
    }

    pub(crate) fn invalid_state(message: impl Into<String>) -> Self {
        FixtureError::InvalidState {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for FixtureError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FixtureError::Io(e) => write!(f, "IO error: {}", e),
            FixtureError::Validation { message } => {
                write!(f, "Validation failed: {}", message)
            }
            FixtureError::Compatibility { version } => {
                write!(f, "No compatible bundle for iRODS version {}", version)
            }
            FixtureError::Command {
                command,
                exit_code,
                stdout,
                stderr,
            } => {
                write!(
                    f,
                    "`{}` failed with exit code {}\n=== STDOUT ===\n{}\n=== STDERR ===\n{}",
                    command, exit_code, stdout, stderr
                )
            }
            FixtureError::Timeout {
                command,
                timeout_secs,
                stdout,
                stderr,
            } => {
                write!(
                    f,
                    "`{}` did not finish within {} seconds\n=== STDOUT ===\n{}\n=== STDERR ===\n{}",
                    command, timeout_secs, stdout, stderr
                )
            }
            FixtureError::ProcessSpawn { binary, source } => {
                write!(f, "Failed to spawn {}: {}", binary, source)
            }
            FixtureError::FileSystem { path, source } => {
                write!(f, "Filesystem error for {:?}: {}", path, source)
            }
            FixtureError::Container { message } => {
                write!(f, "Container runtime error: {}", message)
            }
            FixtureError::InvalidState { message } => {
                write!(f, "Invalid state: {}", message)
            }
        }
    }
}

impl std::error::Error for FixtureError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FixtureError::Io(e) => Some(e),
            FixtureError::ProcessSpawn { source, .. } => Some(source),
            FixtureError::FileSystem { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<io::Error> for FixtureError {
    fn from(e: io::Error) -> Self {
        FixtureError::Io(e)
    }
}
