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

//! Resolution of a client-binary bundle compatible with a given server
//! version.
//!
//! The bundle is a directory of proxy executables, one per icommand. Each
//! proxy runs the version-matched client image on the fixture's Docker
//! network, forwards the `IRODS_*` connection environment, and bind-mounts
//! the staging directory so host paths handed to `iput` resolve inside the
//! container. The helper can treat the proxies as ordinary local binaries.

use crate::error::FixtureError;
use crate::models::{ServerVersion, VersionRange};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// The icommands every bundle materializes.
pub const ICOMMANDS: &[&str] = &[
    "ils", "ipwd", "icd", "iput", "iget", "imkdir", "imeta", "iadmin", "ichmod", "ichksum",
    "irepl", "ienv",
];

/// Environment variables forwarded into the client container. The modern
/// `IRODS_*` names and the legacy `irods*` names are both forwarded so one
/// bundle shape serves every supported dialect.
const FORWARDED_ENV_VARS: &[&str] = &[
    "IRODS_HOST",
    "IRODS_PORT",
    "IRODS_USER_NAME",
    "IRODS_ZONE_NAME",
    "IRODS_PASSWORD",
    "irodsHost",
    "irodsPort",
    "irodsUserName",
    "irodsZone",
];

/// Name of the variable the proxies read to join the fixture network.
pub const DOCKER_NETWORK_ENV_VAR: &str = "IRODS_DOCKER_NETWORK";

/// Host directory the proxies bind-mount into the client container, at the
/// same path on both sides. Upload staging files live here so the path an
/// `iput` invocation carries resolves inside the container too.
pub const STAGING_DIR_ENV_VAR: &str = "IRODS_STAGING_DIR";

/// Client images known to interoperate with each server release line.
/// Total over the supported version space; an unmapped version is a
/// compatibility failure, never a guess.
static CLIENT_IMAGES: &[(VersionRange, &str)] = &[
    (
        VersionRange::exact(ServerVersion::new(3, 3, 1)),
        "mercury/icommands:3.3.1",
    ),
    (
        VersionRange::new(ServerVersion::new(4, 1, 8), ServerVersion::new(4, 1, 12)),
        "mercury/icommands:4.1.10",
    ),
    (
        VersionRange::new(ServerVersion::new(4, 2, 0), ServerVersion::new(4, 2, 11)),
        "mercury/icommands:4.2.7",
    ),
];

fn client_image_for(version: &ServerVersion) -> Option<&'static str> {
    CLIENT_IMAGES
        .iter()
        .find(|(range, _)| range.contains(version))
        .map(|(_, image)| *image)
}

/// An extracted, isolated set of client proxies. Cleanup runs exactly once:
/// either through the explicit consuming call or through `Drop`.
#[derive(Debug)]
pub struct BinaryBundle {
    dir: PathBuf,
    image: &'static str,
    cleaned: bool,
}

impl BinaryBundle {
    pub fn path(&self) -> &Path {
        &self.dir
    }

    pub fn image(&self) -> &str {
        self.image
    }

    pub fn command_path(&self, command: &str) -> PathBuf {
        self.dir.join(command)
    }

    /// Removes the extraction directory. Consumes the bundle so a second
    /// cleanup cannot be expressed.
    pub fn cleanup(mut self) -> Result<(), FixtureError> {
        self.remove()
    }

    fn remove(&mut self) -> Result<(), FixtureError> {
        if self.cleaned {
            return Ok(());
        }
        self.cleaned = true;
        if self.dir.exists() {
            fs::remove_dir_all(&self.dir).map_err(|e| FixtureError::FileSystem {
                path: self.dir.clone(),
                source: e,
            })?;
        }
        Ok(())
    }
}

impl Drop for BinaryBundle {
    fn drop(&mut self) {
        if let Err(e) = self.remove() {
            log::error!("failed to clean up client bundle: {e}");
        }
    }
}

/// Resolves client bundles into per-resolution scratch directories under a
/// fixed root, so concurrently resolved versions never collide.
#[derive(Debug)]
pub struct ClientBinaryResolver {
    root: PathBuf,
}

impl ClientBinaryResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Materializes the proxy bundle for a server version. Deterministic:
    /// the same version always resolves to the same client image. Partial
    /// extraction failures release the scratch directory before the error
    /// propagates.
    pub fn resolve(&self, version: &ServerVersion) -> Result<BinaryBundle, FixtureError> {
        let image =
            client_image_for(version).ok_or(FixtureError::Compatibility { version: *version })?;

        let suffix = Uuid::new_v4().to_string()[..8].to_string();
        let dir = self.root.join(format!("icommands_{suffix}"));
        fs::create_dir_all(&dir).map_err(|e| FixtureError::FileSystem {
            path: dir.clone(),
            source: e,
        })?;

        let mut bundle = BinaryBundle {
            dir: dir.clone(),
            image,
            cleaned: false,
        };

        log::info!(
            "resolved iRODS {version} to client image {image}, extracting proxies to {}",
            dir.display()
        );

        for command in ICOMMANDS {
            if let Err(e) = write_proxy(&dir, command, image) {
                let _ = bundle.remove();
                return Err(e);
            }
        }

        Ok(bundle)
    }
}

fn write_proxy(dir: &Path, command: &str, image: &str) -> Result<(), FixtureError> {
    let path = dir.join(command);
    let mut script = String::from("#!/bin/sh\n");
    script.push_str(&format!(
        "# Proxy for `{command}` from {image}; generated per resolution.\n"
    ));
    script.push_str("exec docker run --rm -i \\\n");
    script.push_str(&format!(
        "  --network \"${{{DOCKER_NETWORK_ENV_VAR}:-bridge}}\" \\\n"
    ));
    script.push_str(&format!(
        "  -v \"${{{STAGING_DIR_ENV_VAR}:-/tmp}}\":\"${{{STAGING_DIR_ENV_VAR}:-/tmp}}\":ro \\\n"
    ));
    for var in FORWARDED_ENV_VARS {
        script.push_str(&format!("  -e {var} \\\n"));
    }
    script.push_str(&format!("  {image} \\\n  {command} \"$@\"\n"));

    let mut file = fs::File::create(&path).map_err(|e| FixtureError::FileSystem {
        path: path.clone(),
        source: e,
    })?;
    file.write_all(script.as_bytes())
        .map_err(|e| FixtureError::FileSystem {
            path: path.clone(),
            source: e,
        })?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).map_err(|e| {
            FixtureError::FileSystem {
                path: path.clone(),
                source: e,
            }
        })?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SUPPORTED_VERSIONS;

    #[test]
    fn test_image_table_covers_supported_versions() {
        for version in SUPPORTED_VERSIONS {
            assert!(client_image_for(&version).is_some(), "{version}");
        }
    }

    #[test]
    fn test_unmapped_version_is_compatibility_error() {
        let scratch = tempfile::tempdir().unwrap();
        let resolver = ClientBinaryResolver::new(scratch.path());
        let unsupported = ServerVersion::new(9, 9, 9);
        match resolver.resolve(&unsupported) {
            Err(FixtureError::Compatibility { version }) => assert_eq!(version, unsupported),
            other => panic!("expected Compatibility error, got {other:?}"),
        }
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let version = ServerVersion::new(4, 1, 9);
        assert_eq!(client_image_for(&version), client_image_for(&version));
    }

    #[test]
    fn test_resolve_materializes_executable_proxies() {
        let scratch = tempfile::tempdir().unwrap();
        let resolver = ClientBinaryResolver::new(scratch.path());
        let bundle = resolver.resolve(&ServerVersion::new(4, 2, 7)).unwrap();

        for command in ICOMMANDS {
            let path = bundle.command_path(command);
            assert!(path.is_file(), "{command} proxy missing");
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                let mode = fs::metadata(&path).unwrap().permissions().mode();
                assert_ne!(mode & 0o111, 0, "{command} proxy not executable");
            }
            let script = fs::read_to_string(&path).unwrap();
            assert!(script.starts_with("#!/bin/sh"));
            assert!(script.contains("mercury/icommands:4.2.7"));
            assert!(script.contains(DOCKER_NETWORK_ENV_VAR));
            assert!(script.contains("-e IRODS_HOST"));
            // The staging dir must be reachable inside the container at the
            // same path the host-side `iput` argument names.
            assert!(script.contains(&format!(
                "-v \"${{{STAGING_DIR_ENV_VAR}:-/tmp}}\":\"${{{STAGING_DIR_ENV_VAR}:-/tmp}}\":ro"
            )));
        }
    }

    #[test]
    fn test_concurrent_resolutions_are_isolated() {
        let scratch = tempfile::tempdir().unwrap();
        let resolver = ClientBinaryResolver::new(scratch.path());
        let first = resolver.resolve(&ServerVersion::new(4, 2, 7)).unwrap();
        let second = resolver.resolve(&ServerVersion::new(4, 2, 7)).unwrap();
        assert_ne!(first.path(), second.path());
    }

    #[test]
    fn test_cleanup_removes_bundle_dir() {
        let scratch = tempfile::tempdir().unwrap();
        let resolver = ClientBinaryResolver::new(scratch.path());
        let bundle = resolver.resolve(&ServerVersion::new(3, 3, 1)).unwrap();
        let dir = bundle.path().to_path_buf();
        assert!(dir.exists());
        bundle.cleanup().unwrap();
        assert!(!dir.exists());
    }

    #[test]
    fn test_drop_cleans_up_bundle_dir() {
        let scratch = tempfile::tempdir().unwrap();
        let resolver = ClientBinaryResolver::new(scratch.path());
        let dir = {
            let bundle = resolver.resolve(&ServerVersion::new(3, 3, 1)).unwrap();
            bundle.path().to_path_buf()
        };
        assert!(!dir.exists());
    }
}
