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

//! Disposable, version-matched iRODS test fixtures.
//!
//! Provisions a containerized catalog server of a chosen release, resolves
//! a client toolchain compatible with that release, and exposes structured
//! setup operations over the clients' free-text output. Everything is
//! ephemeral: teardown reclaims the container, the network and the
//! extracted binaries on every exit path.
//!
//! # Example
//!
//! ```ignore
//! use irods_fixtures::{IrodsFixture, ServerConfig, ServerVersion};
//!
//! let mut fixture = IrodsFixture::builder()
//!     .server(ServerConfig::for_version(ServerVersion::new(4, 1, 10)))
//!     .build()?;
//! fixture.start()?;
//!
//! let helper = fixture.helper()?;
//! let path = helper.create_data_object("data-object-name", "Test contents")?;
//! assert_eq!(helper.read_data_object(&path)?, "Test contents");
//!
//! fixture.stop()?;
//! ```

pub mod binaries;
pub mod config;
pub mod context;
pub mod controller;
pub mod dialect;
mod error;
pub mod executor;
pub mod fixture;
pub mod helper;
pub mod models;

pub use binaries::{BinaryBundle, ClientBinaryResolver, ICOMMANDS};
pub use config::{ServerConfig, StorageTopology, SUPPORTED_VERSIONS, supported_configurations};
pub use context::FixtureContext;
pub use controller::{ServerInstance, ServerLifecycleController};
pub use error::FixtureError;
pub use executor::{CommandOutput, ExecRequest, ProcessExecutor};
pub use fixture::{IrodsFixture, IrodsFixtureBuilder};
pub use helper::SetupHelper;
pub use models::{
    AccessLevel, ChecksumDescriptor, IrodsUser, Metadata, Resource, ServerStatus, ServerVersion,
};
