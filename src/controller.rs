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

//! Lifecycle of a containerized catalog server: start on an isolated Docker
//! network, wait until the store accepts administrative commands, seed the
//! baseline users, and reclaim everything on stop. The container runtime
//! sits behind this module alone; nothing above it talks to Docker.

use crate::binaries::DOCKER_NETWORK_ENV_VAR;
use crate::config::{ServerConfig, StorageTopology};
use crate::dialect::Dialect;
use crate::error::FixtureError;
use crate::models::{IrodsUser, ServerStatus, ServerVersion, VersionRange};
use std::thread::sleep;
use std::time::{Duration, Instant};
use testcontainers::core::{ExecCommand, IntoContainerPort, WaitFor};
use testcontainers::runners::SyncRunner;
use testcontainers::{Container, GenericImage, ImageExt};
use uuid::Uuid;

pub const IRODS_PORT: u16 = 1247;

/// Zone and administrative credentials baked into the catalog images.
pub const DEFAULT_ZONE: &str = "tempZone";
pub const DEFAULT_ADMIN_USERNAME: &str = "rods";
pub const DEFAULT_ADMIN_PASSWORD: &str = "rods";

/// Service account that owns the server process inside the container.
const SERVICE_ACCOUNT: &str = "irods";

/// Baseline rodsusers seeded into every instance, after the admin.
const SEEDED_USERNAMES: [&str; 2] = ["fixture_user_1", "fixture_user_2"];

/// Extra storage resource provisioned for the replicated-pair topology.
const REPLICA_RESOURCE_NAME: &str = "fixtureReplResc";

const READINESS_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Catalog server images per supported release line. Same shape as the
/// client-image table in `binaries`; both must stay total over
/// `config::SUPPORTED_VERSIONS`.
static SERVER_IMAGES: &[(VersionRange, &str)] = &[
    (
        VersionRange::exact(ServerVersion::new(3, 3, 1)),
        "mercury/icat:3.3.1",
    ),
    (
        VersionRange::new(ServerVersion::new(4, 1, 8), ServerVersion::new(4, 1, 12)),
        "mercury/icat:4.1.10",
    ),
    (
        VersionRange::new(ServerVersion::new(4, 2, 0), ServerVersion::new(4, 2, 11)),
        "mercury/icat:4.2.7",
    ),
];

fn server_image_for(version: &ServerVersion) -> Option<&'static str> {
    SERVER_IMAGES
        .iter()
        .find(|(range, _)| range.contains(version))
        .map(|(_, image)| *image)
}

fn container_error(e: impl std::fmt::Display) -> FixtureError {
    FixtureError::Container {
        message: e.to_string(),
    }
}

/// A running (or stopped) catalog server. Exactly one per fixture lifetime;
/// Stopped is terminal — a new instance must be started instead.
pub struct ServerInstance {
    version: ServerVersion,
    host: String,
    port: u16,
    host_port: u16,
    zone: String,
    admin: IrodsUser,
    admin_password: String,
    users: Vec<IrodsUser>,
    network: String,
    status: ServerStatus,
    container: Option<Container<GenericImage>>,
}

impl std::fmt::Debug for ServerInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerInstance")
            .field("version", &self.version)
            .field("host", &self.host)
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

impl ServerInstance {
    pub fn version(&self) -> ServerVersion {
        self.version
    }

    /// Container name, resolvable on the fixture network.
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// The port mapped onto the Docker host, for callers outside the
    /// fixture network.
    pub fn host_port(&self) -> u16 {
        self.host_port
    }

    pub fn zone(&self) -> &str {
        &self.zone
    }

    pub fn admin(&self) -> &IrodsUser {
        &self.admin
    }

    /// Seeded users, admin first. Order is deterministic.
    pub fn users(&self) -> &[IrodsUser] {
        &self.users
    }

    pub fn network(&self) -> &str {
        &self.network
    }

    pub fn status(&self) -> ServerStatus {
        self.status
    }

    /// Connection environment injected into every client invocation, in
    /// both the modern and the legacy variable spelling.
    pub fn connection_envs(&self) -> Vec<(String, String)> {
        vec![
            ("IRODS_HOST".to_string(), self.host.clone()),
            ("IRODS_PORT".to_string(), self.port.to_string()),
            ("IRODS_USER_NAME".to_string(), self.admin.username.clone()),
            ("IRODS_ZONE_NAME".to_string(), self.zone.clone()),
            ("IRODS_PASSWORD".to_string(), self.admin_password.clone()),
            ("irodsHost".to_string(), self.host.clone()),
            ("irodsPort".to_string(), self.port.to_string()),
            ("irodsUserName".to_string(), self.admin.username.clone()),
            ("irodsZone".to_string(), self.zone.clone()),
            (DOCKER_NETWORK_ENV_VAR.to_string(), self.network.clone()),
        ]
    }
}

impl Drop for ServerInstance {
    fn drop(&mut self) {
        if let Some(container) = self.container.take() {
            log::debug!("reclaiming catalog container {} on drop", self.host);
            let _ = container.stop();
        }
        self.status = ServerStatus::Stopped;
    }
}

#[derive(Debug, Default)]
pub struct ServerLifecycleController;

impl ServerLifecycleController {
    pub fn new() -> Self {
        Self
    }

    /// Provisions an isolated catalog server for the requested
    /// configuration and blocks until it accepts administrative commands.
    /// Any failure after the container is allocated releases it before the
    /// error propagates; no partial instance ever leaks.
    pub fn start(&self, config: &ServerConfig) -> Result<ServerInstance, FixtureError> {
        let image = match &config.image {
            Some(image) => image.clone(),
            None => server_image_for(&config.version)
                .ok_or(FixtureError::Compatibility {
                    version: config.version,
                })?
                .to_string(),
        };
        let (repository, tag) = split_image(&image)?;

        let suffix = Uuid::new_v4().to_string()[..8].to_string();
        let container_name = format!("irods-catalog-{suffix}");
        let network = format!("irods-fixture-{suffix}");

        log::info!("starting catalog container {container_name} from {image}");

        let mut request = GenericImage::new(repository, tag)
            .with_exposed_port(IRODS_PORT.tcp())
            .with_wait_for(WaitFor::Nothing)
            .with_container_name(&container_name)
            .with_network(&network);
        for (key, value) in &config.extra_envs {
            request = request.with_env_var(key, value);
        }

        let container = request.start().map_err(container_error)?;

        match Self::provision(&container, config) {
            Ok(host_port) => {
                let admin = IrodsUser::new(DEFAULT_ADMIN_USERNAME, DEFAULT_ZONE);
                let mut users = vec![admin.clone()];
                users.extend(
                    SEEDED_USERNAMES
                        .iter()
                        .map(|username| IrodsUser::new(*username, DEFAULT_ZONE)),
                );
                log::info!("catalog container {container_name} is running");
                Ok(ServerInstance {
                    version: config.version,
                    host: container_name,
                    port: IRODS_PORT,
                    host_port,
                    zone: DEFAULT_ZONE.to_string(),
                    admin,
                    admin_password: DEFAULT_ADMIN_PASSWORD.to_string(),
                    users,
                    network,
                    status: ServerStatus::Running,
                    container: Some(container),
                })
            }
            Err(e) => {
                log::error!("catalog startup failed, releasing container {container_name}: {e}");
                let _ = container.stop();
                Err(e)
            }
        }
    }

    /// Stops the instance and releases its container and network. Idempotent:
    /// stopping an already-stopped instance is a no-op.
    pub fn stop(&self, instance: &mut ServerInstance) -> Result<(), FixtureError> {
        if instance.status == ServerStatus::Stopped {
            return Ok(());
        }
        instance.status = ServerStatus::Stopped;
        if let Some(container) = instance.container.take() {
            log::info!("stopping catalog container {}", instance.host);
            container.stop().map_err(container_error)?;
            container.rm().map_err(container_error)?;
        }
        Ok(())
    }

    fn provision(
        container: &Container<GenericImage>,
        config: &ServerConfig,
    ) -> Result<u16, FixtureError> {
        Self::wait_until_ready(container, config.startup_timeout)?;
        Self::seed_users(container)?;
        if config.topology == StorageTopology::ReplicatedPair {
            Self::provision_replica_resource(container, config)?;
        }
        container
            .get_host_port_ipv4(IRODS_PORT.tcp())
            .map_err(container_error)
    }

    /// The store is ready once a plain listing succeeds for the service
    /// account. Command availability drifts less across majors than log
    /// formats do, so no log scraping here.
    fn wait_until_ready(
        container: &Container<GenericImage>,
        timeout: Duration,
    ) -> Result<(), FixtureError> {
        let deadline = Instant::now() + timeout;
        let mut last_stdout = String::new();
        let mut last_stderr = String::new();

        loop {
            match exec_as_service_account(container, "ils") {
                Ok((0, _, _)) => return Ok(()),
                Ok((_, stdout, stderr)) => {
                    last_stdout = stdout;
                    last_stderr = stderr;
                }
                // exec can fail while the container entrypoint is still
                // initializing; treat it as not-ready.
                Err(e) => last_stderr = e.to_string(),
            }

            if Instant::now() >= deadline {
                return Err(FixtureError::Timeout {
                    command: "readiness probe (ils)".to_string(),
                    timeout_secs: timeout.as_secs(),
                    stdout: last_stdout,
                    stderr: last_stderr,
                });
            }

            sleep(READINESS_POLL_INTERVAL);
        }
    }

    fn seed_users(container: &Container<GenericImage>) -> Result<(), FixtureError> {
        for username in SEEDED_USERNAMES {
            let script = format!("iadmin mkuser {username} rodsuser");
            let (exit_code, stdout, stderr) = exec_as_service_account(container, &script)?;
            if exit_code != 0 {
                return Err(FixtureError::Command {
                    command: script,
                    exit_code: exit_code as i32,
                    stdout,
                    stderr,
                });
            }
        }
        Ok(())
    }

    fn provision_replica_resource(
        container: &Container<GenericImage>,
        config: &ServerConfig,
    ) -> Result<(), FixtureError> {
        let dialect =
            Dialect::for_version(&config.version).ok_or(FixtureError::Compatibility {
                version: config.version,
            })?;
        let vault = format!("/tmp/{REPLICA_RESOURCE_NAME}");
        let args = dialect.mkresc_args(REPLICA_RESOURCE_NAME, "localhost", &vault);
        let script = format!(
            "iadmin {}",
            args.iter()
                .map(|arg| format!("'{arg}'"))
                .collect::<Vec<_>>()
                .join(" ")
        );
        let (exit_code, stdout, stderr) = exec_as_service_account(container, &script)?;
        if exit_code != 0 {
            return Err(FixtureError::Command {
                command: script,
                exit_code: exit_code as i32,
                stdout,
                stderr,
            });
        }
        Ok(())
    }
}

fn exec_as_service_account(
    container: &Container<GenericImage>,
    script: &str,
) -> Result<(i64, String, String), FixtureError> {
    let mut result = container
        .exec(ExecCommand::new(["su", "-", SERVICE_ACCOUNT, "-c", script]))
        .map_err(container_error)?;
    let exit_code = result
        .exit_code()
        .map_err(container_error)?
        .unwrap_or(-1);
    let stdout =
        String::from_utf8_lossy(&result.stdout_to_vec().map_err(container_error)?).into_owned();
    let stderr =
        String::from_utf8_lossy(&result.stderr_to_vec().map_err(container_error)?).into_owned();
    Ok((exit_code, stdout, stderr))
}

fn split_image(image: &str) -> Result<(&str, &str), FixtureError> {
    image.rsplit_once(':').ok_or_else(|| {
        FixtureError::invalid_state(format!("image `{image}` has no tag component"))
    })
}
