//! # Maven Version Resolution
//!
//! Emulates Maven's symbolic-version rules: `RELEASE` and `LATEST` resolve
//! through the artifact-level `maven-metadata.xml`, `-SNAPSHOT` versions
//! through the version-level metadata, and anything else is a pinned
//! version requiring no metadata fetch. Version ranges are rejected.

use crate::controller::download::{fetch_bytes, BasicAuth, DownloadError};
use crate::crd::MavenArtifactType;
use crate::mavenmetadata::{self, MavenMetadata};

/// Failure modes of version resolution
#[derive(Debug)]
pub enum ResolveError {
    /// Metadata could not be downloaded; classified by the caller
    Download(DownloadError),
    /// Remote data shape is unusable (missing RELEASE/LATEST, malformed
    /// XML, unsupported version ranges)
    Version(String),
}

/// Resolved remote location of an artifact
#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactDetails {
    /// Artifact file name in the remote repository
    pub resolved_filename: String,
    /// Version after symbolic resolution. May differ from the spec version
    /// (e.g. LATEST resolving to a concrete version).
    pub artifact_version: String,
    /// Download URL ending in the resolved file name
    pub download_url: String,
}

/// Resolver for one artifact against one repository
#[derive(Debug, Clone)]
pub struct MavenResolver {
    /// Requested coordinates; the version is rewritten when LATEST
    /// delegates to a concrete or snapshot version
    pub artifact: MavenArtifactType,
    /// Repository URL from the record spec
    pub repository_url: String,
    /// `<groupId with '.' replaced by '/'>/<artifactId>`
    pub request_path: String,
    /// Concrete version, possibly timestamped for snapshots
    pub resolved_version: String,
    /// File name of the artifact in the remote repository
    pub resolved_filename: String,
    /// Download URL for the artifact
    pub download_url: String,
}

impl MavenResolver {
    pub fn new(artifact: MavenArtifactType, repository_url: &str) -> Self {
        let request_path = format!(
            "{}/{}",
            artifact.group_id.replace('.', "/"),
            artifact.artifact_id
        );
        Self {
            artifact,
            repository_url: repository_url.to_string(),
            request_path,
            resolved_version: String::new(),
            resolved_filename: String::new(),
            download_url: String::new(),
        }
    }

    /// Details for the fetch stage once resolution succeeded
    pub fn details(&self) -> ArtifactDetails {
        ArtifactDetails {
            resolved_filename: self.resolved_filename.clone(),
            artifact_version: self.artifact.version.clone(),
            download_url: self.download_url.clone(),
        }
    }

    /// Resolve the requested version against the remote repository
    pub async fn resolve(
        &mut self,
        client: &reqwest::Client,
        auth: Option<&BasicAuth>,
    ) -> Result<(), ResolveError> {
        let version = self.artifact.version.clone();

        if version.starts_with('[') || version.starts_with('(') {
            return Err(ResolveError::Version(format!(
                "Invalid version \"{version}\"; ranges are not supported"
            )));
        }

        if version == "RELEASE" {
            let metadata = self.download_metadata(client, auth, None).await?;
            return self.apply_release(&metadata);
        }

        if version == "LATEST" {
            let metadata = self.download_metadata(client, auth, None).await?;
            match self.apply_latest(&metadata)? {
                LatestOutcome::Resolved => return Ok(()),
                LatestOutcome::Snapshot => {
                    // fall through to snapshot resolution with the rewritten version
                }
            }
        }

        if self.artifact.version.ends_with("-SNAPSHOT") {
            let snapshot_version = self.artifact.version.clone();
            let metadata = self
                .download_metadata(client, auth, Some(&snapshot_version))
                .await?;
            self.apply_snapshot(&metadata);
            return Ok(());
        }

        if version != "LATEST" {
            self.apply_pinned();
        }
        Ok(())
    }

    /// Fetch and parse metadata. `version_dir` is set for the snapshot
    /// case, where the metadata lives under the requested version.
    async fn download_metadata(
        &self,
        client: &reqwest::Client,
        auth: Option<&BasicAuth>,
        version_dir: Option<&str>,
    ) -> Result<MavenMetadata, ResolveError> {
        let url = match version_dir {
            Some(version) => format!(
                "{}/{}/{}/maven-metadata.xml",
                self.repository_url, self.request_path, version
            ),
            None => format!(
                "{}/{}/maven-metadata.xml",
                self.repository_url, self.request_path
            ),
        };

        let body = fetch_bytes(client, &url, auth)
            .await
            .map_err(ResolveError::Download)?;
        mavenmetadata::parse(&body).map_err(|e| {
            ResolveError::Version(format!("Error \"{e}\" while parsing XML data at \"{url}\""))
        })
    }

    /// RELEASE: the resolved version is `versioning.release`
    pub fn apply_release(&mut self, metadata: &MavenMetadata) -> Result<(), ResolveError> {
        let release = metadata
            .release_version()
            .map_err(|e| ResolveError::Version(e.to_string()))?
            .to_string();

        self.artifact.version = release.clone();
        self.resolved_version = release;
        self.resolved_filename = self.filename();
        self.download_url = self.url_for(&self.resolved_version);
        Ok(())
    }

    /// LATEST: `versioning.latest`, re-entering snapshot resolution when it
    /// points at a `-SNAPSHOT` version
    pub fn apply_latest(&mut self, metadata: &MavenMetadata) -> Result<LatestOutcome, ResolveError> {
        let latest = metadata
            .latest_version()
            .map_err(|e| ResolveError::Version(e.to_string()))?
            .to_string();

        self.artifact.version = latest.clone();
        if latest.ends_with("-SNAPSHOT") {
            return Ok(LatestOutcome::Snapshot);
        }

        self.resolved_version = latest;
        self.resolved_filename = self.filename();
        self.download_url = self.url_for(&self.resolved_version);
        Ok(LatestOutcome::Resolved)
    }

    /// SNAPSHOT: pick the timestamped snapshot entry matching the file
    /// type; an empty `snapshotVersions` keeps the requested version
    /// verbatim (filename then contains `-SNAPSHOT`). The download path
    /// always uses the requested `-SNAPSHOT` directory.
    pub fn apply_snapshot(&mut self, metadata: &MavenMetadata) {
        let requested = self.artifact.version.clone();
        self.resolved_version = if metadata
            .versioning
            .snapshot_versions
            .snapshot_versions
            .is_empty()
        {
            requested.clone()
        } else {
            metadata.snapshot_resolved_version(&requested, self.artifact.effective_type())
        };
        self.resolved_filename = self.filename();
        self.download_url = self.url_for(&requested);
    }

    /// Pinned version: no metadata fetch
    pub fn apply_pinned(&mut self) {
        self.resolved_version = self.artifact.version.clone();
        self.resolved_filename = self.filename();
        self.download_url = self.url_for(&self.resolved_version);
    }

    /// `<artifactId>-<resolvedVersion>[-<classifier>].<type>`
    fn filename(&self) -> String {
        match self
            .artifact
            .classifier
            .as_deref()
            .filter(|c| !c.is_empty())
        {
            Some(classifier) => format!(
                "{}-{}-{}.{}",
                self.artifact.artifact_id,
                self.resolved_version,
                classifier,
                self.artifact.effective_type()
            ),
            None => format!(
                "{}-{}.{}",
                self.artifact.artifact_id,
                self.resolved_version,
                self.artifact.effective_type()
            ),
        }
    }

    fn url_for(&self, version_dir: &str) -> String {
        format!(
            "{}/{}/{}/{}",
            self.repository_url, self.request_path, version_dir, self.resolved_filename
        )
    }
}

/// Outcome of LATEST resolution
pub enum LatestOutcome {
    /// Latest was a concrete version; resolution is complete
    Resolved,
    /// Latest was a snapshot; resolution continues against the snapshot
    /// directory
    Snapshot,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mavenmetadata::parse;

    fn artifact(version: &str) -> MavenArtifactType {
        MavenArtifactType {
            group_id: "com.example".into(),
            artifact_id: "my-artifact".into(),
            version: version.into(),
            r#type: None,
            classifier: None,
        }
    }

    fn resolver(version: &str) -> MavenResolver {
        MavenResolver::new(artifact(version), "https://repo.example/m2")
    }

    #[test]
    fn request_path_replaces_group_dots() {
        let r = resolver("1.0.0");
        assert_eq!(r.request_path, "com/example/my-artifact");
    }

    #[test]
    fn pinned_version_needs_no_metadata() {
        let mut r = resolver("1.0.0");
        r.apply_pinned();
        assert_eq!(r.resolved_version, "1.0.0");
        assert_eq!(r.resolved_filename, "my-artifact-1.0.0.jar");
        assert_eq!(
            r.download_url,
            "https://repo.example/m2/com/example/my-artifact/1.0.0/my-artifact-1.0.0.jar"
        );
    }

    #[test]
    fn classifier_lands_between_version_and_type() {
        let mut spec = artifact("1.0.0");
        spec.classifier = Some("sources".into());
        spec.r#type = Some("war".into());
        let mut r = MavenResolver::new(spec, "https://repo.example/m2");
        r.apply_pinned();
        assert_eq!(r.resolved_filename, "my-artifact-1.0.0-sources.war");
    }

    #[test]
    fn release_resolves_through_metadata() {
        let metadata = parse(
            br#"<metadata><versioning><latest>2.0.1</latest><release>2.0.0</release></versioning></metadata>"#,
        )
        .unwrap();
        let mut r = resolver("RELEASE");
        r.apply_release(&metadata).unwrap();
        assert_eq!(r.resolved_version, "2.0.0");
        assert_eq!(r.artifact.version, "2.0.0");
        assert_eq!(
            r.download_url,
            "https://repo.example/m2/com/example/my-artifact/2.0.0/my-artifact-2.0.0.jar"
        );
    }

    #[test]
    fn release_missing_from_metadata_is_a_version_error() {
        let metadata = parse(
            br#"<metadata><versioning><latest>2.0.1</latest></versioning></metadata>"#,
        )
        .unwrap();
        let mut r = resolver("RELEASE");
        match r.apply_release(&metadata) {
            Err(ResolveError::Version(msg)) => {
                assert_eq!(msg, "artifact metadata does not have a RELEASE version");
            }
            other => panic!("expected version error, got {other:?}"),
        }
    }

    #[test]
    fn latest_with_concrete_version_resolves_directly() {
        let metadata = parse(
            br#"<metadata><versioning><latest>3.1.4</latest></versioning></metadata>"#,
        )
        .unwrap();
        let mut r = resolver("LATEST");
        assert!(matches!(
            r.apply_latest(&metadata).unwrap(),
            LatestOutcome::Resolved
        ));
        assert_eq!(r.resolved_version, "3.1.4");
    }

    #[test]
    fn latest_with_snapshot_tip_reenters_snapshot_resolution() {
        let metadata = parse(
            br#"<metadata><versioning><latest>0.0.5-SNAPSHOT</latest></versioning></metadata>"#,
        )
        .unwrap();
        let mut r = resolver("LATEST");
        assert!(matches!(
            r.apply_latest(&metadata).unwrap(),
            LatestOutcome::Snapshot
        ));
        // the version is rewritten so snapshot resolution uses the latest
        // snapshot directory
        assert_eq!(r.artifact.version, "0.0.5-SNAPSHOT");
    }

    #[test]
    fn snapshot_resolves_to_the_timestamped_entry() {
        let metadata = parse(
            br#"<metadata>
                 <version>2.7.0-SNAPSHOT</version>
                 <versioning>
                   <snapshot><timestamp>20220708.171442</timestamp><buildNumber>1</buildNumber></snapshot>
                   <snapshotVersions>
                     <snapshotVersion><extension>jar</extension><value>2.7.0-20220708.171442-1</value></snapshotVersion>
                   </snapshotVersions>
                 </versioning>
               </metadata>"#,
        )
        .unwrap();
        let mut r = resolver("2.7.0-SNAPSHOT");
        r.apply_snapshot(&metadata);
        assert_eq!(r.resolved_version, "2.7.0-20220708.171442-1");
        assert_eq!(
            r.resolved_filename,
            "my-artifact-2.7.0-20220708.171442-1.jar"
        );
        // the download path uses the requested -SNAPSHOT directory, not the
        // timestamped one
        assert_eq!(
            r.download_url,
            "https://repo.example/m2/com/example/my-artifact/2.7.0-SNAPSHOT/my-artifact-2.7.0-20220708.171442-1.jar"
        );
    }

    #[test]
    fn snapshot_without_entries_keeps_the_requested_version() {
        let metadata = parse(br#"<metadata><versioning/></metadata>"#).unwrap();
        let mut r = resolver("2.7.0-SNAPSHOT");
        r.apply_snapshot(&metadata);
        assert_eq!(r.resolved_version, "2.7.0-SNAPSHOT");
        assert_eq!(r.resolved_filename, "my-artifact-2.7.0-SNAPSHOT.jar");
    }
}
