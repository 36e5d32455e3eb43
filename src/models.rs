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

//! Immutable value objects shared across the fixture layers.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use std::str::FromStr;

/// Version of the iRODS catalog server. The major component selects the
/// output dialect (checksum encoding, resource administration syntax).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ServerVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

static VERSION_IN_QUERY_OUTPUT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:irods_version[^0-9]*|release version[^0-9]*rods|\brods)(\d+)\.(\d+)\.(\d+)")
        .expect("invalid version regex")
});

impl ServerVersion {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Scans the output of an administrative version query (`ienv`) for a
    /// version descriptor. Both the `irods_version - 4.1.8` form of modern
    /// releases and the `Release Version = rods3.3.1` form of the 3.x line
    /// are recognized; unrelated surrounding lines are ignored.
    pub fn from_query_output(output: &str) -> Option<Self> {
        VERSION_IN_QUERY_OUTPUT.captures(output).map(|caps| {
            Self::new(
                caps[1].parse().unwrap_or(0),
                caps[2].parse().unwrap_or(0),
                caps[3].parse().unwrap_or(0),
            )
        })
    }
}

impl FromStr for ServerVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim().trim_start_matches("rods");
        let mut parts = trimmed.splitn(3, '.');
        let mut component = |name: &str| -> Result<u32, String> {
            parts
                .next()
                .ok_or_else(|| format!("missing {name} component in version `{s}`"))?
                .parse()
                .map_err(|_| format!("non-numeric {name} component in version `{s}`"))
        };
        Ok(Self {
            major: component("major")?,
            minor: component("minor")?,
            patch: component("patch")?,
        })
    }
}

impl std::fmt::Display for ServerVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Inclusive version range used by the compatibility lookup tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionRange {
    pub min: ServerVersion,
    pub max: ServerVersion,
}

impl VersionRange {
    pub const fn new(min: ServerVersion, max: ServerVersion) -> Self {
        Self { min, max }
    }

    pub const fn exact(version: ServerVersion) -> Self {
        Self {
            min: version,
            max: version,
        }
    }

    /// Every release with the given major component.
    pub const fn major(major: u32) -> Self {
        Self {
            min: ServerVersion::new(major, 0, 0),
            max: ServerVersion::new(major, u32::MAX, u32::MAX),
        }
    }

    pub fn contains(&self, version: &ServerVersion) -> bool {
        *version >= self.min && *version <= self.max
    }
}

/// A user known to the catalog. Usernames are unique within a zone.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IrodsUser {
    pub username: String,
    pub zone: String,
}

impl IrodsUser {
    pub fn new(username: impl Into<String>, zone: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            zone: zone.into(),
        }
    }
}

impl std::fmt::Display for IrodsUser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.username, self.zone)
    }
}

/// AVU metadata: attribute names map to one or more string values.
/// A single-value assignment and a one-element sequence are the same thing;
/// consumers always observe a slice of values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    attributes: BTreeMap<String, Vec<String>>,
}

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assigns a single value to an attribute, replacing any previous values.
    pub fn set(&mut self, attribute: impl Into<String>, value: impl Into<String>) {
        self.attributes.insert(attribute.into(), vec![value.into()]);
    }

    /// Assigns multiple values to an attribute, replacing any previous values.
    /// Repeated values are preserved as repeated entries.
    pub fn set_many<I, V>(&mut self, attribute: impl Into<String>, values: I)
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        self.attributes.insert(
            attribute.into(),
            values.into_iter().map(Into::into).collect(),
        );
    }

    pub fn values(&self, attribute: &str) -> Option<&[String]> {
        self.attributes.get(attribute).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.attributes
            .iter()
            .map(|(attribute, values)| (attribute.as_str(), values.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }
}

/// A storage resource the catalog can place replicas on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    pub name: String,
    pub location: String,
}

impl Resource {
    pub fn new(name: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            location: location.into(),
        }
    }
}

/// Access level grantable on a data object or collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessLevel {
    Read,
    Write,
    Own,
}

impl AccessLevel {
    pub const ALL: [AccessLevel; 3] = [AccessLevel::Read, AccessLevel::Write, AccessLevel::Own];

    /// The token `ichmod` expects. The fragment shown in ACL listings is a
    /// separate, dialect-owned concern.
    pub fn as_argument(&self) -> &'static str {
        match self {
            AccessLevel::Read => "read",
            AccessLevel::Write => "write",
            AccessLevel::Own => "own",
        }
    }
}

/// An opaque stored checksum, already validated against the dialect encoding
/// it was parsed with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChecksumDescriptor(pub String);

impl std::fmt::Display for ChecksumDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle state of a server instance. Stopped is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerStatus {
    Starting,
    Running,
    Stopped,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_parse_and_display() {
        let version: ServerVersion = "4.1.8".parse().unwrap();
        assert_eq!(version, ServerVersion::new(4, 1, 8));
        assert_eq!(version.to_string(), "4.1.8");

        let legacy: ServerVersion = "rods3.3.1".parse().unwrap();
        assert_eq!(legacy, ServerVersion::new(3, 3, 1));
    }

    #[test]
    fn test_version_parse_rejects_garbage() {
        assert!("4.1".parse::<ServerVersion>().is_err());
        assert!("four.one.eight".parse::<ServerVersion>().is_err());
    }

    #[test]
    fn test_version_from_query_output_modern() {
        let output = "irods_host - localhost\nirods_port - 1247\nirods_version - 4.2.7\n";
        assert_eq!(
            ServerVersion::from_query_output(output),
            Some(ServerVersion::new(4, 2, 7))
        );
    }

    #[test]
    fn test_version_from_query_output_legacy() {
        let output = "NOTICE: Release Version = rods3.3.1, API Version = d\n";
        assert_eq!(
            ServerVersion::from_query_output(output),
            Some(ServerVersion::new(3, 3, 1))
        );
    }

    #[test]
    fn test_version_from_query_output_absent() {
        assert_eq!(ServerVersion::from_query_output("no version here"), None);
    }

    #[test]
    fn test_version_range() {
        let range = VersionRange::new(ServerVersion::new(4, 1, 8), ServerVersion::new(4, 1, 12));
        assert!(range.contains(&ServerVersion::new(4, 1, 10)));
        assert!(!range.contains(&ServerVersion::new(4, 2, 0)));

        let major = VersionRange::major(3);
        assert!(major.contains(&ServerVersion::new(3, 3, 1)));
        assert!(!major.contains(&ServerVersion::new(4, 0, 0)));
    }

    #[test]
    fn test_user_equality_and_display() {
        let a = IrodsUser::new("alice", "testZone");
        let b = IrodsUser::new("alice", "testZone");
        let c = IrodsUser::new("alice", "otherZone");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.to_string(), "alice#testZone");
    }

    #[test]
    fn test_metadata_single_and_many_are_uniform() {
        let mut metadata = Metadata::new();
        metadata.set("attribute_3", "value_5");
        metadata.set_many("attribute_1", ["value_1", "value_2"]);

        assert_eq!(
            metadata.values("attribute_3"),
            Some(["value_5".to_string()].as_slice())
        );
        assert_eq!(metadata.values("attribute_1").unwrap().len(), 2);
        assert_eq!(metadata.len(), 2);
    }

    #[test]
    fn test_metadata_set_replaces() {
        let mut metadata = Metadata::new();
        metadata.set_many("attr", ["a", "b"]);
        metadata.set("attr", "c");
        assert_eq!(
            metadata.values("attr"),
            Some(["c".to_string()].as_slice())
        );
    }

    #[test]
    fn test_access_level_arguments() {
        assert_eq!(AccessLevel::Read.as_argument(), "read");
        assert_eq!(AccessLevel::Write.as_argument(), "write");
        assert_eq!(AccessLevel::Own.as_argument(), "own");
    }
}
