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

//! Orchestrates one complete fixture: server lifecycle, client-bundle
//! resolution and the setup helper, with teardown guaranteed on every exit
//! path.

use crate::binaries::{BinaryBundle, ClientBinaryResolver};
use crate::config::ServerConfig;
use crate::context::FixtureContext;
use crate::controller::{ServerInstance, ServerLifecycleController};
use crate::error::FixtureError;
use crate::helper::SetupHelper;
use std::path::Path;

pub struct IrodsFixture {
    context: FixtureContext,
    config: ServerConfig,
    controller: ServerLifecycleController,
    server: Option<ServerInstance>,
    bundle: Option<BinaryBundle>,
    helper: Option<SetupHelper>,
    started: bool,
}

impl std::fmt::Debug for IrodsFixture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IrodsFixture")
            .field("fixture_name", &self.context.fixture_name())
            .field("version", &self.config.version)
            .field("started", &self.started)
            .finish()
    }
}

impl IrodsFixture {
    pub fn builder() -> IrodsFixtureBuilder {
        IrodsFixtureBuilder::default()
    }

    /// Starts the server, resolves a compatible client bundle and binds the
    /// helper. If any step fails, everything allocated before it is
    /// released before the error propagates.
    pub fn start(&mut self) -> Result<(), FixtureError> {
        if self.started {
            return Err(FixtureError::invalid_state("fixture already started"));
        }

        let server = self.controller.start(&self.config)?;
        self.server = Some(server);

        let resolver = ClientBinaryResolver::new(self.context.bundles_dir());
        let version = self.config.version;
        let bundle = match resolver.resolve(&version) {
            Ok(bundle) => bundle,
            Err(e) => {
                self.release_all();
                return Err(e);
            }
        };

        let helper = match SetupHelper::new(
            &bundle,
            self.server.as_ref().ok_or_else(|| {
                FixtureError::invalid_state("server vanished during fixture start")
            })?,
        ) {
            Ok(helper) => helper.with_command_timeout(self.config.command_timeout),
            Err(e) => {
                drop(bundle);
                self.release_all();
                return Err(e);
            }
        };

        self.bundle = Some(bundle);
        self.helper = Some(helper);
        self.started = true;
        Ok(())
    }

    /// Tears the fixture down. Bundle cleanup and server stop are each
    /// attempted exactly once and independently: a failure in one is
    /// logged and does not prevent the other. The first teardown error is
    /// reported after both ran. Idempotent.
    pub fn stop(&mut self) -> Result<(), FixtureError> {
        self.helper = None;
        self.started = false;

        let mut first_error = None;

        if let Some(bundle) = self.bundle.take()
            && let Err(e) = bundle.cleanup()
        {
            log::error!("client bundle cleanup failed: {e}");
            first_error.get_or_insert(e);
        }

        if let Some(mut server) = self.server.take()
            && let Err(e) = self.controller.stop(&mut server)
        {
            log::error!("server stop failed: {e}");
            first_error.get_or_insert(e);
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Best-effort release used on partial start failure; errors are logged
    /// so the original startup error stays the one the caller sees.
    fn release_all(&mut self) {
        if let Err(e) = self.stop() {
            log::error!("teardown after failed start reported: {e}");
        }
    }

    pub fn helper(&self) -> Result<&SetupHelper, FixtureError> {
        self.helper
            .as_ref()
            .ok_or_else(|| FixtureError::invalid_state("fixture is not started"))
    }

    pub fn server(&self) -> Result<&ServerInstance, FixtureError> {
        self.server
            .as_ref()
            .ok_or_else(|| FixtureError::invalid_state("fixture is not started"))
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn fixture_dir(&self) -> &Path {
        self.context.base_dir()
    }
}

impl Drop for IrodsFixture {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

/// Builder for `IrodsFixture`. `build()` only creates the scratch context;
/// nothing external is provisioned until `start()`.
#[derive(Default)]
pub struct IrodsFixtureBuilder {
    fixture_name: Option<String>,
    server_config: Option<ServerConfig>,
    cleanup: Option<bool>,
}

impl IrodsFixtureBuilder {
    /// Override the fixture name (defaults to thread name or a UUID).
    pub fn fixture_name(mut self, name: impl Into<String>) -> Self {
        self.fixture_name = Some(name.into());
        self
    }

    pub fn server(mut self, config: ServerConfig) -> Self {
        self.server_config = Some(config);
        self
    }

    /// Whether to remove the scratch directory on successful completion.
    /// Defaults to the server config's cleanup flag.
    pub fn cleanup(mut self, cleanup: bool) -> Self {
        self.cleanup = Some(cleanup);
        self
    }

    pub fn build(self) -> Result<IrodsFixture, FixtureError> {
        let config = self
            .server_config
            .ok_or_else(|| FixtureError::invalid_state("no server configuration given"))?;
        let cleanup = self.cleanup.unwrap_or(config.cleanup);

        let mut context = FixtureContext::new(self.fixture_name, cleanup)?;
        context.ensure_created()?;

        Ok(IrodsFixture {
            context,
            config,
            controller: ServerLifecycleController::new(),
            server: None,
            bundle: None,
            helper: None,
            started: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::models::ServerVersion;

    #[test]
    fn test_builder_requires_server_config() {
        assert!(IrodsFixture::builder().build().is_err());
    }

    #[test]
    fn test_build_creates_context_only() {
        let fixture = IrodsFixture::builder()
            .fixture_name("test_build_creates_context_only")
            .server(ServerConfig::for_version(ServerVersion::new(4, 1, 10)))
            .build()
            .unwrap();

        assert!(!fixture.is_started());
        assert!(fixture.fixture_dir().exists());
    }

    #[test]
    fn test_accessors_before_start_are_invalid_state() {
        let fixture = IrodsFixture::builder()
            .fixture_name("test_accessors_before_start")
            .server(ServerConfig::for_version(ServerVersion::new(4, 1, 10)))
            .build()
            .unwrap();

        assert!(matches!(
            fixture.helper(),
            Err(FixtureError::InvalidState { .. })
        ));
        assert!(matches!(
            fixture.server(),
            Err(FixtureError::InvalidState { .. })
        ));
    }

    #[test]
    fn test_stop_before_start_is_noop() {
        let mut fixture = IrodsFixture::builder()
            .fixture_name("test_stop_before_start_is_noop")
            .server(ServerConfig::for_version(ServerVersion::new(4, 1, 10)))
            .build()
            .unwrap();

        fixture.stop().unwrap();
        fixture.stop().unwrap();
    }
}
