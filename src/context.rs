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

use crate::error::FixtureError;
use once_cell::sync::Lazy;
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use uuid::Uuid;

/// Set to `true`/`1` to keep scratch directories around after a run, e.g.
/// to inspect resolved proxy bundles from a failed fixture.
const CLEANUP_DISABLED_ENV_VAR: &str = "IRODS_TEST_CLEANUP_DISABLED";

static FIXTURE_LOGS_DIR: Lazy<PathBuf> =
    Lazy::new(|| PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("test_logs"));

fn is_cleanup_disabled_by_env() -> bool {
    std::env::var(CLEANUP_DISABLED_ENV_VAR)
        .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1"))
        .unwrap_or(false)
}

/// Owns the per-fixture scratch directory holding extracted client bundles
/// and captured logs. One context per fixture; nothing under it is shared
/// across concurrent fixtures.
pub struct FixtureContext {
    fixture_name: String,
    base_dir: PathBuf,
    cleanup: bool,
    created: bool,
}

impl FixtureContext {
    pub fn new(fixture_name: Option<String>, cleanup: bool) -> Result<Self, FixtureError> {
        let fixture_name = fixture_name.unwrap_or_else(Self::derive_fixture_name);
        let uuid_suffix = Uuid::new_v4().to_string()[..8].to_string();
        let dir_name = format!("{}_{}", sanitize_path(&fixture_name), uuid_suffix);

        Ok(Self {
            fixture_name,
            base_dir: (*FIXTURE_LOGS_DIR).join(dir_name),
            cleanup,
            created: false,
        })
    }

    /// Creates the scratch directory. Called lazily on first access.
    pub fn ensure_created(&mut self) -> Result<(), FixtureError> {
        if self.created {
            return Ok(());
        }
        fs::create_dir_all(&self.base_dir).map_err(|e| FixtureError::FileSystem {
            path: self.base_dir.clone(),
            source: e,
        })?;
        self.created = true;
        Ok(())
    }

    fn derive_fixture_name() -> String {
        thread::current()
            .name()
            .map(|s| s.to_string())
            .unwrap_or_else(|| Uuid::new_v4().to_string())
    }

    pub fn fixture_name(&self) -> &str {
        &self.fixture_name
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Parent directory for resolved client bundles.
    pub fn bundles_dir(&self) -> PathBuf {
        self.base_dir.join("bundles")
    }

    pub fn cleanup(&self) {
        if !self.cleanup || is_cleanup_disabled_by_env() {
            return;
        }
        if self.base_dir.exists() {
            let _ = fs::remove_dir_all(&self.base_dir);
        }
    }
}

impl Drop for FixtureContext {
    fn drop(&mut self) {
        if !thread::panicking() {
            self.cleanup();
        }
    }
}

fn sanitize_path(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            c if c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.' => c,
            _ => '_',
        })
        .collect()
}
