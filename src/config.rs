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
use bon::Builder;
use std::collections::HashMap;
use std::time::Duration;

/// Storage layout the fixture provisions at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StorageTopology {
    /// Only the catalog's default resource.
    #[default]
    SingleResource,
    /// Default resource plus one extra unix-filesystem resource, for tests
    /// that exercise replication out of the box.
    ReplicatedPair,
}

#[derive(Debug, Clone, Builder)]
pub struct ServerConfig {
    /// Catalog server release to provision. Determines the client bundle
    /// and the output dialect.
    pub version: ServerVersion,
    #[builder(default)]
    pub topology: StorageTopology,
    /// Per client-command invocation timeout.
    #[builder(default = Duration::from_secs(120))]
    pub command_timeout: Duration,
    /// How long to wait for the catalog to accept administrative commands.
    #[builder(default = Duration::from_secs(300))]
    pub startup_timeout: Duration,
    #[builder(default = true)]
    pub cleanup: bool,
    #[builder(default)]
    pub extra_envs: HashMap<String, String>,
    /// Override the catalog image chosen from the version table.
    #[builder(into)]
    pub image: Option<String>,
}

impl ServerConfig {
    pub fn for_version(version: ServerVersion) -> Self {
        Self::builder().version(version).build()
    }
}

/// Server versions the compatibility tables cover, one per release line.
pub const SUPPORTED_VERSIONS: [ServerVersion; 3] = [
    ServerVersion::new(3, 3, 1),
    ServerVersion::new(4, 1, 10),
    ServerVersion::new(4, 2, 7),
];

/// The fixed configuration matrix the end-to-end suites iterate: every
/// supported release crossed with every storage topology. Each combination
/// is an explicit, independently attributable test case.
pub fn supported_configurations() -> Vec<ServerConfig> {
    let mut configurations = Vec::new();
    for version in SUPPORTED_VERSIONS {
        for topology in [StorageTopology::SingleResource, StorageTopology::ReplicatedPair] {
            configurations.push(
                ServerConfig::builder()
                    .version(version)
                    .topology(topology)
                    .build(),
            );
        }
    }
    configurations
}
