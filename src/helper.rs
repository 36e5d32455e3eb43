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

//! High-level fixture operations against a resolved client bundle and a
//! running server. Every operation validates its arguments before any
//! process is spawned, then drives one or more icommands through the
//! executor and parses the textual output into structured values.

use crate::binaries::BinaryBundle;
use crate::controller::ServerInstance;
use crate::dialect::Dialect;
use crate::error::FixtureError;
use crate::executor::{CommandOutput, ExecRequest, ProcessExecutor};
use crate::models::{
    AccessLevel, ChecksumDescriptor, IrodsUser, Metadata, Resource, ServerStatus, ServerVersion,
};
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use uuid::Uuid;

pub struct SetupHelper {
    binaries_dir: PathBuf,
    envs: Vec<(String, String)>,
    host: String,
    dialect: &'static Dialect,
    executor: ProcessExecutor,
    command_timeout: Duration,
    /// Upload staging files live here. The directory is announced to the
    /// client binaries through `IRODS_STAGING_DIR` so the proxies can
    /// bind-mount it; a path outside it would not resolve in the container.
    staging_dir: tempfile::TempDir,
}

impl std::fmt::Debug for SetupHelper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SetupHelper")
            .field("binaries_dir", &self.binaries_dir)
            .field("host", &self.host)
            .finish_non_exhaustive()
    }
}

impl SetupHelper {
    /// Binds the helper to a resolved bundle and a running instance. The
    /// instance must already be Running: operating on anything else is a
    /// usage error, not a recoverable condition.
    pub fn new(bundle: &BinaryBundle, server: &ServerInstance) -> Result<Self, FixtureError> {
        if server.status() != ServerStatus::Running {
            return Err(FixtureError::invalid_state(format!(
                "server instance is {:?}, operations require Running",
                server.status()
            )));
        }
        Self::with_binaries(
            bundle.path().to_path_buf(),
            server.connection_envs(),
            server.host().to_string(),
            server.version(),
        )
    }

    /// Escape hatch for targeting a pre-provisioned deployment (or, in
    /// tests, a directory of stand-in commands) without a `ServerInstance`.
    pub fn with_binaries(
        binaries_dir: PathBuf,
        mut envs: Vec<(String, String)>,
        host: String,
        version: ServerVersion,
    ) -> Result<Self, FixtureError> {
        let dialect =
            Dialect::for_version(&version).ok_or(FixtureError::Compatibility { version })?;
        let staging_dir = tempfile::Builder::new()
            .prefix("irods_staging_")
            .tempdir()?;
        envs.push((
            crate::binaries::STAGING_DIR_ENV_VAR.to_string(),
            staging_dir.path().to_string_lossy().into_owned(),
        ));
        Ok(Self {
            binaries_dir,
            envs,
            host,
            dialect,
            executor: ProcessExecutor::new(),
            command_timeout: crate::executor::DEFAULT_COMMAND_TIMEOUT,
            staging_dir,
        })
    }

    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// The fragment an ACL listing shows for a level on this server's
    /// dialect, e.g. `read object`.
    pub fn acl_fragment(&self, level: AccessLevel) -> &'static str {
        self.dialect.acl_fragment(level)
    }

    /// Runs an arbitrary icommand and returns its trimmed stdout. Fails
    /// with a command error (carrying stderr) on nonzero exit.
    pub fn run_icommand(&self, args: &[&str]) -> Result<String, FixtureError> {
        let (command, rest) = args
            .split_first()
            .ok_or_else(|| FixtureError::validation("no icommand given"))?;
        let output = self.invoke_ok(command, rest.iter().map(|s| s.to_string()).collect())?;
        Ok(output.stdout.trim().to_string())
    }

    /// Creates a data object with the given contents in the admin's current
    /// working collection and returns its absolute path.
    pub fn create_data_object(
        &self,
        name: &str,
        contents: &str,
    ) -> Result<String, FixtureError> {
        validate_bare_name(name, "data object")?;

        let mut staging = tempfile::Builder::new()
            .prefix("upload_")
            .tempfile_in(self.staging_dir.path())?;
        staging.write_all(contents.as_bytes())?;
        staging.flush()?;
        let staging_path = staging.path().to_string_lossy().into_owned();

        self.invoke_ok("iput", vec![staging_path, name.to_string()])?;
        Ok(format!("{}/{}", self.working_collection()?, name))
    }

    /// Creates a collection and returns its absolute path.
    pub fn create_collection(&self, name: &str) -> Result<String, FixtureError> {
        validate_bare_name(name, "collection")?;
        self.invoke_ok("imkdir", vec![name.to_string()])?;
        Ok(format!("{}/{}", self.working_collection()?, name))
    }

    /// Reads the contents of an existing data object, exactly as stored.
    pub fn read_data_object(&self, path: &str) -> Result<String, FixtureError> {
        let output = self.invoke_ok("iget", vec![path.to_string(), "-".to_string()])?;
        Ok(output.stdout)
    }

    /// Attaches every (attribute, value) pair to the target, one `imeta`
    /// invocation per pair. Multi-valued attributes become repeated
    /// entries, never merged. The target kind (object vs collection) is
    /// probed once before any mutation.
    pub fn add_metadata_to(&self, target: &str, metadata: &Metadata) -> Result<(), FixtureError> {
        let flag = self.entity_flag(target)?;
        for (attribute, values) in metadata.iter() {
            for value in values {
                self.invoke_ok(
                    "imeta",
                    vec![
                        "add".to_string(),
                        flag.to_string(),
                        target.to_string(),
                        attribute.to_string(),
                        value.to_string(),
                    ],
                )?;
            }
        }
        Ok(())
    }

    /// Creates a fresh unix-filesystem storage resource with a
    /// collision-resistant generated name and location.
    pub fn create_replica_storage(&self) -> Result<Resource, FixtureError> {
        let suffix = Uuid::new_v4().to_string()[..8].to_string();
        let name = format!("resource_{suffix}");
        let location = format!("/tmp/{name}");
        let args = self.dialect.mkresc_args(&name, &self.host, &location);
        self.invoke_ok("iadmin", args)?;
        Ok(Resource::new(name, location))
    }

    /// Replicates a data object onto an existing storage resource.
    pub fn replicate_data_object(
        &self,
        path: &str,
        resource: &Resource,
    ) -> Result<(), FixtureError> {
        self.invoke_ok(
            "irepl",
            vec!["-R".to_string(), resource.name.clone(), path.to_string()],
        )?;
        Ok(())
    }

    /// Computes and stores checksums for every replica of the object.
    pub fn update_checksums(&self, path: &str) -> Result<(), FixtureError> {
        self.invoke_ok(
            "ichksum",
            vec!["-f".to_string(), "-a".to_string(), path.to_string()],
        )?;
        Ok(())
    }

    /// Returns the stored checksum of the object in the version-appropriate
    /// encoding. Fails if no replica has a stored checksum.
    pub fn get_checksum(&self, path: &str) -> Result<ChecksumDescriptor, FixtureError> {
        let listing = self
            .invoke_ok("ils", vec!["-L".to_string(), path.to_string()])?
            .stdout;
        self.dialect
            .extract_checksum(&listing)
            .ok_or(FixtureError::Command {
                command: format!("ils -L {path}"),
                exit_code: 0,
                stdout: listing,
                stderr: "no stored checksum found in listing".to_string(),
            })
    }

    /// Creates a rodsuser. Duplicate usernames within a zone are rejected
    /// before any mutation runs, leaving the user set unchanged.
    pub fn create_user(&self, username: &str, zone: &str) -> Result<IrodsUser, FixtureError> {
        validate_username(username)?;
        let user = IrodsUser::new(username, zone);

        let listing = self.invoke_ok("iadmin", vec!["lu".to_string()])?.stdout;
        let qualified = user.to_string();
        if listing.lines().any(|line| line.trim() == qualified) {
            return Err(FixtureError::validation(format!(
                "user {qualified} already exists"
            )));
        }

        self.invoke_ok(
            "iadmin",
            vec!["mkuser".to_string(), qualified, "rodsuser".to_string()],
        )?;
        Ok(user)
    }

    /// Grants the user an access level on a data object or collection.
    pub fn set_access(
        &self,
        username: &str,
        level: AccessLevel,
        path: &str,
    ) -> Result<(), FixtureError> {
        self.invoke_ok(
            "ichmod",
            vec![
                level.as_argument().to_string(),
                username.to_string(),
                path.to_string(),
            ],
        )?;
        Ok(())
    }

    /// Queries the catalog version as seen by the client toolchain.
    pub fn get_icat_version(&self) -> Result<ServerVersion, FixtureError> {
        let output = self.invoke_ok("ienv", vec![])?;
        ServerVersion::from_query_output(&output.stdout).ok_or(FixtureError::Command {
            command: "ienv".to_string(),
            exit_code: 0,
            stdout: output.stdout,
            stderr: "no version descriptor in output".to_string(),
        })
    }

    /// The admin's current working collection, from `ipwd`.
    fn working_collection(&self) -> Result<String, FixtureError> {
        let output = self.invoke_ok("ipwd", vec![])?;
        let collection = output.stdout.trim().to_string();
        if collection.is_empty() {
            return Err(FixtureError::Command {
                command: "ipwd".to_string(),
                exit_code: 0,
                stdout: output.stdout,
                stderr: "empty working collection".to_string(),
            });
        }
        Ok(collection)
    }

    /// `imeta` needs to be told whether the target is a data object (-d) or
    /// a collection (-c); a collection listing echoes the path with a
    /// trailing colon.
    fn entity_flag(&self, target: &str) -> Result<&'static str, FixtureError> {
        let listing = self.invoke_ok("ils", vec![target.to_string()])?.stdout;
        let collection_marker = format!("{target}:");
        if listing
            .lines()
            .any(|line| line.trim() == collection_marker)
        {
            Ok("-c")
        } else {
            Ok("-d")
        }
    }

    fn invoke(&self, command: &str, args: Vec<String>) -> Result<CommandOutput, FixtureError> {
        let request = ExecRequest::new(self.binaries_dir.join(command), args)
            .envs(self.envs.iter().cloned())
            .timeout(self.command_timeout);
        self.executor.execute(&request)
    }

    fn invoke_ok(&self, command: &str, args: Vec<String>) -> Result<CommandOutput, FixtureError> {
        let output = self.invoke(command, args.clone())?;
        if output.exit_code != 0 {
            let mut line = command.to_string();
            for arg in &args {
                line.push(' ');
                line.push_str(arg);
            }
            return Err(FixtureError::Command {
                command: line,
                exit_code: output.exit_code,
                stdout: output.stdout,
                stderr: output.stderr,
            });
        }
        Ok(output)
    }
}

fn validate_bare_name(name: &str, kind: &str) -> Result<(), FixtureError> {
    if name.is_empty() {
        return Err(FixtureError::validation(format!("{kind} name is empty")));
    }
    if name.contains('/') {
        return Err(FixtureError::validation(format!(
            "{kind} name `{name}` contains a path separator; a bare name is required"
        )));
    }
    Ok(())
}

fn validate_username(username: &str) -> Result<(), FixtureError> {
    if username.is_empty() {
        return Err(FixtureError::validation("username is empty"));
    }
    if username.contains(['#', '/']) || username.chars().any(char::is_whitespace) {
        return Err(FixtureError::validation(format!(
            "username `{username}` contains reserved characters"
        )));
    }
    Ok(())
}
