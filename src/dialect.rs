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

//! Output-format dialects of the store, keyed by version range.
//!
//! The checksum encoding, the ACL listing fragments and the resource
//! administration syntax all drifted across major releases. Each variance is
//! a column in the dialect table below; supporting a new release line is a
//! table edit, not a logic change.

use crate::models::{AccessLevel, ChecksumDescriptor, ServerVersion, VersionRange};
use once_cell::sync::Lazy;
use regex::Regex;

/// How a stored checksum appears in a long-form listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumEncoding {
    /// 3.x: bare 32-character hexadecimal MD5 digest.
    Hex32,
    /// 4.x and later: `<algorithm>:<base64 digest>`.
    AlgorithmPrefixed,
}

/// Shape of the `iadmin mkresc` argument list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceSyntax {
    /// 3.x: `mkresc <name> "unix file system" cache <host> <vault>`.
    Legacy,
    /// 4.x and later: `mkresc <name> unixfilesystem <host>:<vault>`.
    Composable,
}

#[derive(Debug)]
pub struct Dialect {
    range: VersionRange,
    checksum: ChecksumEncoding,
    resource_syntax: ResourceSyntax,
    acl_read: &'static str,
    acl_write: &'static str,
    acl_own: &'static str,
}

/// One row per supported release line, scanned in order. The ACL fragments
/// happen to agree across the observed dialects but live here so a rename in
/// a future major stays a data edit.
static DIALECTS: &[Dialect] = &[
    Dialect {
        range: VersionRange::major(3),
        checksum: ChecksumEncoding::Hex32,
        resource_syntax: ResourceSyntax::Legacy,
        acl_read: "read object",
        acl_write: "modify object",
        acl_own: "own",
    },
    Dialect {
        range: VersionRange::new(ServerVersion::new(4, 0, 0), ServerVersion::new(4, u32::MAX, u32::MAX)),
        checksum: ChecksumEncoding::AlgorithmPrefixed,
        resource_syntax: ResourceSyntax::Composable,
        acl_read: "read object",
        acl_write: "modify object",
        acl_own: "own",
    },
];

static HEX32_CHECKSUM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b[0-9a-f]{32}\b").expect("invalid hex32 regex"));

static PREFIXED_CHECKSUM: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:sha2|sha256|sha512|md5):[A-Za-z0-9+/=]+").expect("invalid prefixed regex")
});

impl Dialect {
    /// Looks up the dialect for a server version. `None` means the version
    /// sits outside the supported space and must surface as a
    /// compatibility failure, never as a guessed dialect.
    pub fn for_version(version: &ServerVersion) -> Option<&'static Dialect> {
        DIALECTS.iter().find(|d| d.range.contains(version))
    }

    pub fn checksum_encoding(&self) -> ChecksumEncoding {
        self.checksum
    }

    /// The fragment an ACL listing shows for a granted level, e.g. the
    /// `read object` in `alice#testZone:read object`.
    pub fn acl_fragment(&self, level: AccessLevel) -> &'static str {
        match level {
            AccessLevel::Read => self.acl_read,
            AccessLevel::Write => self.acl_write,
            AccessLevel::Own => self.acl_own,
        }
    }

    /// Scans a long-form listing for the first stored checksum in this
    /// dialect's encoding. Surrounding unrelated lines are tolerated.
    pub fn extract_checksum(&self, listing: &str) -> Option<ChecksumDescriptor> {
        let pattern: &Regex = match self.checksum {
            ChecksumEncoding::Hex32 => &HEX32_CHECKSUM,
            ChecksumEncoding::AlgorithmPrefixed => &PREFIXED_CHECKSUM,
        };
        pattern
            .find(listing)
            .map(|m| ChecksumDescriptor(m.as_str().to_string()))
    }

    /// Arguments for `iadmin` to create a unix-filesystem storage resource.
    pub fn mkresc_args(&self, name: &str, host: &str, vault_path: &str) -> Vec<String> {
        match self.resource_syntax {
            ResourceSyntax::Legacy => vec![
                "mkresc".to_string(),
                name.to_string(),
                "unix file system".to_string(),
                "cache".to_string(),
                host.to_string(),
                vault_path.to_string(),
            ],
            ResourceSyntax::Composable => vec![
                "mkresc".to_string(),
                name.to_string(),
                "unixfilesystem".to_string(),
                format!("{host}:{vault_path}"),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_covers_supported_majors() {
        for version in [
            ServerVersion::new(3, 3, 1),
            ServerVersion::new(4, 1, 8),
            ServerVersion::new(4, 2, 7),
        ] {
            assert!(Dialect::for_version(&version).is_some(), "{version}");
        }
    }

    #[test]
    fn test_lookup_rejects_unmapped_version() {
        assert!(Dialect::for_version(&ServerVersion::new(2, 5, 0)).is_none());
        assert!(Dialect::for_version(&ServerVersion::new(5, 0, 0)).is_none());
    }

    #[test]
    fn test_checksum_encoding_per_major() {
        let v3 = Dialect::for_version(&ServerVersion::new(3, 3, 1)).unwrap();
        let v4 = Dialect::for_version(&ServerVersion::new(4, 1, 10)).unwrap();
        assert_eq!(v3.checksum_encoding(), ChecksumEncoding::Hex32);
        assert_eq!(v4.checksum_encoding(), ChecksumEncoding::AlgorithmPrefixed);
    }

    #[test]
    fn test_extract_hex32_checksum_from_listing() {
        let dialect = Dialect::for_version(&ServerVersion::new(3, 3, 1)).unwrap();
        let listing = "\
  rods              0 demoResc          3 2016-05-20.10:23 & data-object-name
        900150983cd24fb0d6963f7d28e17f72    generic    /var/lib/irods/Vault/home/rods/data-object-name\n";
        assert_eq!(
            dialect.extract_checksum(listing).unwrap().0,
            "900150983cd24fb0d6963f7d28e17f72"
        );
    }

    #[test]
    fn test_extract_prefixed_checksum_from_listing() {
        let dialect = Dialect::for_version(&ServerVersion::new(4, 2, 7)).unwrap();
        let listing = "\
  rods              0 demoResc            3 2020-01-01.00:00 & data-object-name
    sha2:ungWv48Bz+pBQUDeXa4iI7ADYaOWF3qctBD/YfIAFa0=    generic    /var/lib/irods/Vault/home/rods/data-object-name\n";
        assert_eq!(
            dialect.extract_checksum(listing).unwrap().0,
            "sha2:ungWv48Bz+pBQUDeXa4iI7ADYaOWF3qctBD/YfIAFa0="
        );
    }

    #[test]
    fn test_extract_checksum_absent() {
        let dialect = Dialect::for_version(&ServerVersion::new(4, 2, 7)).unwrap();
        assert!(dialect.extract_checksum("  rods 0 demoResc data-object-name\n").is_none());
    }

    #[test]
    fn test_wrong_encoding_does_not_match() {
        let v4 = Dialect::for_version(&ServerVersion::new(4, 2, 7)).unwrap();
        assert!(v4.extract_checksum("900150983cd24fb0d6963f7d28e17f72").is_none());
    }

    #[test]
    fn test_acl_fragments() {
        let dialect = Dialect::for_version(&ServerVersion::new(4, 1, 8)).unwrap();
        assert_eq!(dialect.acl_fragment(AccessLevel::Read), "read object");
        assert_eq!(dialect.acl_fragment(AccessLevel::Write), "modify object");
        assert_eq!(dialect.acl_fragment(AccessLevel::Own), "own");
    }

    #[test]
    fn test_mkresc_args_per_syntax() {
        let v3 = Dialect::for_version(&ServerVersion::new(3, 3, 1)).unwrap();
        let v4 = Dialect::for_version(&ServerVersion::new(4, 2, 7)).unwrap();
        assert_eq!(
            v3.mkresc_args("resc1", "catalog", "/tmp/resc1"),
            ["mkresc", "resc1", "unix file system", "cache", "catalog", "/tmp/resc1"]
        );
        assert_eq!(
            v4.mkresc_args("resc1", "catalog", "/tmp/resc1"),
            ["mkresc", "resc1", "unixfilesystem", "catalog:/tmp/resc1"]
        );
    }
}
