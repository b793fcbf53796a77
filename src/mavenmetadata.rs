//! # Maven Metadata
//!
//! Parsing for `maven-metadata.xml`, the canonical source of symbolic
//! version mappings in a Maven repository.

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("artifact metadata does not have a RELEASE version")]
    MissingRelease,
    #[error("artifact metadata does not have a LATEST version")]
    MissingLatest,
    #[error("{0}")]
    Parse(String),
}

/// Top-level structure of Maven metadata XML
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MavenMetadata {
    pub group_id: String,
    pub artifact_id: String,
    pub version: String,
    pub versioning: Versioning,
}

/// The `versioning` element
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Versioning {
    pub latest: String,
    pub release: String,
    pub versions: Versions,
    pub last_updated: String,
    pub snapshot: Snapshot,
    pub snapshot_versions: SnapshotVersions,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Versions {
    #[serde(rename = "version")]
    pub versions: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Snapshot {
    pub timestamp: String,
    pub build_number: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SnapshotVersions {
    #[serde(rename = "snapshotVersion")]
    pub snapshot_versions: Vec<SnapshotVersion>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SnapshotVersion {
    pub extension: String,
    pub value: String,
    pub updated: String,
}

impl MavenMetadata {
    pub fn release_version(&self) -> Result<&str, MetadataError> {
        if self.versioning.release.is_empty() {
            return Err(MetadataError::MissingRelease);
        }
        Ok(&self.versioning.release)
    }

    pub fn latest_version(&self) -> Result<&str, MetadataError> {
        if self.versioning.latest.is_empty() {
            return Err(MetadataError::MissingLatest);
        }
        Ok(&self.versioning.latest)
    }

    /// Resolved version for a snapshot request.
    ///
    /// Matches the snapshot-version entry whose extension equals the
    /// requested file type and whose value equals
    /// `<version minus "-SNAPSHOT">-<timestamp>-<buildNumber>`. Falls back
    /// to the requested version when no entry matches.
    pub fn snapshot_resolved_version(&self, requested_version: &str, filetype: &str) -> String {
        let expected = format!(
            "{}-{}-{}",
            requested_version
                .strip_suffix("-SNAPSHOT")
                .unwrap_or(requested_version),
            self.versioning.snapshot.timestamp,
            self.versioning.snapshot.build_number
        );

        self.versioning
            .snapshot_versions
            .snapshot_versions
            .iter()
            .find(|sv| sv.extension == filetype && sv.value == expected)
            .map(|sv| sv.value.clone())
            .unwrap_or_else(|| requested_version.to_string())
    }
}

/// Parse marshaled Maven metadata XML
pub fn parse(input: &[u8]) -> Result<MavenMetadata, MetadataError> {
    let text =
        std::str::from_utf8(input).map_err(|e| MetadataError::Parse(format!("invalid utf-8: {e}")))?;
    quick_xml::de::from_str(text).map_err(|e| MetadataError::Parse(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const RELEASE_METADATA: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<metadata>
  <groupId>com.example</groupId>
  <artifactId>my-artifact</artifactId>
  <versioning>
    <latest>2.0.1</latest>
    <release>2.0.0</release>
    <versions>
      <version>1.0.0</version>
      <version>2.0.0</version>
      <version>2.0.1</version>
    </versions>
    <lastUpdated>20220708171442</lastUpdated>
  </versioning>
</metadata>"#;

    const SNAPSHOT_METADATA: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<metadata>
  <groupId>com.example</groupId>
  <artifactId>my-artifact</artifactId>
  <version>2.7.0-SNAPSHOT</version>
  <versioning>
    <snapshot>
      <timestamp>20220708.171442</timestamp>
      <buildNumber>1</buildNumber>
    </snapshot>
    <lastUpdated>20220708171442</lastUpdated>
    <snapshotVersions>
      <snapshotVersion>
        <extension>jar</extension>
        <value>2.7.0-20220708.171442-1</value>
        <updated>20220708171442</updated>
      </snapshotVersion>
      <snapshotVersion>
        <extension>pom</extension>
        <value>2.7.0-20220708.171442-1</value>
        <updated>20220708171442</updated>
      </snapshotVersion>
    </snapshotVersions>
  </versioning>
</metadata>"#;

    #[test]
    fn parses_release_and_latest() {
        let meta = parse(RELEASE_METADATA.as_bytes()).unwrap();
        assert_eq!(meta.release_version().unwrap(), "2.0.0");
        assert_eq!(meta.latest_version().unwrap(), "2.0.1");
        assert_eq!(meta.versioning.versions.versions.len(), 3);
    }

    #[test]
    fn missing_release_is_an_error() {
        let meta = parse(
            br#"<metadata><versioning><latest>1.0.0</latest></versioning></metadata>"#,
        )
        .unwrap();
        let err = meta.release_version().unwrap_err();
        assert_eq!(
            err.to_string(),
            "artifact metadata does not have a RELEASE version"
        );
    }

    #[test]
    fn missing_latest_is_an_error() {
        let meta = parse(br#"<metadata><versioning/></metadata>"#).unwrap();
        assert_eq!(
            meta.latest_version().unwrap_err().to_string(),
            "artifact metadata does not have a LATEST version"
        );
    }

    #[test]
    fn snapshot_resolution_matches_extension_and_value() {
        let meta = parse(SNAPSHOT_METADATA.as_bytes()).unwrap();
        assert_eq!(
            meta.snapshot_resolved_version("2.7.0-SNAPSHOT", "jar"),
            "2.7.0-20220708.171442-1"
        );
    }

    #[test]
    fn snapshot_resolution_falls_back_to_requested_version() {
        let meta = parse(SNAPSHOT_METADATA.as_bytes()).unwrap();
        // no matching extension
        assert_eq!(
            meta.snapshot_resolved_version("2.7.0-SNAPSHOT", "war"),
            "2.7.0-SNAPSHOT"
        );
    }

    #[test]
    fn malformed_xml_is_a_parse_error() {
        assert!(matches!(
            parse(b"<metadata><versioning>").unwrap_err(),
            MetadataError::Parse(_)
        ));
    }
}
