//! # Maven Resolution Tests
//!
//! End-to-end coverage of the symbolic-version rules: pinned versions,
//! RELEASE, LATEST (including a snapshot tip), SNAPSHOT resolution and the
//! rejected version ranges.

use source_controller::controller::maven::resolver::{
    LatestOutcome, MavenResolver, ResolveError,
};
use source_controller::crd::MavenArtifactType;
use source_controller::mavenmetadata::parse;

fn artifact(version: &str) -> MavenArtifactType {
    MavenArtifactType {
        group_id: "com.example".into(),
        artifact_id: "my-artifact".into(),
        version: version.into(),
        r#type: Some("jar".into()),
        classifier: None,
    }
}

fn resolver(version: &str) -> MavenResolver {
    MavenResolver::new(artifact(version), "https://repo.example/m2")
}

#[test]
fn pinned_version_resolves_without_metadata() {
    let mut r = resolver("1.0.0");
    r.apply_pinned();

    assert_eq!(r.resolved_version, "1.0.0");
    assert_eq!(r.resolved_filename, "my-artifact-1.0.0.jar");
    assert_eq!(
        r.download_url,
        "https://repo.example/m2/com/example/my-artifact/1.0.0/my-artifact-1.0.0.jar"
    );
}

#[tokio::test]
async fn version_ranges_are_rejected_before_any_download() {
    for version in ["[1.0,2.0)", "(,1.0]", "[1.5]"] {
        let mut r = resolver(version);
        // the client is never used; ranges fail up front
        let client = reqwest::Client::new();
        match r.resolve(&client, None).await {
            Err(ResolveError::Version(msg)) => {
                assert_eq!(
                    msg,
                    format!("Invalid version \"{version}\"; ranges are not supported")
                );
            }
            other => panic!("expected version error for {version}, got {other:?}"),
        }
    }
}

#[test]
fn release_takes_the_release_field() {
    let metadata = parse(
        br#"<metadata>
             <versioning>
               <latest>2.0.1</latest>
               <release>2.0.0</release>
               <versions><version>1.0.0</version><version>2.0.0</version><version>2.0.1</version></versions>
             </versioning>
           </metadata>"#,
    )
    .unwrap();

    let mut r = resolver("RELEASE");
    r.apply_release(&metadata).unwrap();
    assert_eq!(r.resolved_version, "2.0.0");
    assert_eq!(
        r.download_url,
        "https://repo.example/m2/com/example/my-artifact/2.0.0/my-artifact-2.0.0.jar"
    );
}

#[test]
fn release_without_release_field_fails_with_the_documented_message() {
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
fn latest_with_concrete_tip_is_final() {
    let metadata = parse(
        br#"<metadata><versioning><latest>3.2.1</latest></versioning></metadata>"#,
    )
    .unwrap();

    let mut r = resolver("LATEST");
    assert!(matches!(
        r.apply_latest(&metadata).unwrap(),
        LatestOutcome::Resolved
    ));
    assert_eq!(r.resolved_version, "3.2.1");
    assert_eq!(r.resolved_filename, "my-artifact-3.2.1.jar");
}

#[test]
fn latest_with_snapshot_tip_reenters_snapshot_resolution() {
    let tip = parse(
        br#"<metadata><versioning><latest>0.0.5-SNAPSHOT</latest></versioning></metadata>"#,
    )
    .unwrap();
    let snapshot = parse(
        br#"<metadata>
             <version>0.0.5-SNAPSHOT</version>
             <versioning>
               <snapshot><timestamp>20220921.064511</timestamp><buildNumber>7</buildNumber></snapshot>
               <snapshotVersions>
                 <snapshotVersion><extension>jar</extension><value>0.0.5-20220921.064511-7</value></snapshotVersion>
               </snapshotVersions>
             </versioning>
           </metadata>"#,
    )
    .unwrap();

    let mut r = resolver("LATEST");
    assert!(matches!(
        r.apply_latest(&tip).unwrap(),
        LatestOutcome::Snapshot
    ));
    r.apply_snapshot(&snapshot);

    assert_eq!(r.resolved_version, "0.0.5-20220921.064511-7");
    // the download directory is the latest snapshot version, not LATEST
    assert_eq!(
        r.download_url,
        "https://repo.example/m2/com/example/my-artifact/0.0.5-SNAPSHOT/my-artifact-0.0.5-20220921.064511-7.jar"
    );
}

#[test]
fn snapshot_uses_requested_directory_with_timestamped_filename() {
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

    assert_eq!(
        r.resolved_filename,
        "my-artifact-2.7.0-20220708.171442-1.jar"
    );
    assert_eq!(
        r.download_url,
        "https://repo.example/m2/com/example/my-artifact/2.7.0-SNAPSHOT/my-artifact-2.7.0-20220708.171442-1.jar"
    );
}

#[test]
fn snapshot_with_empty_entries_keeps_the_requested_version_verbatim() {
    let metadata = parse(br#"<metadata><versioning/></metadata>"#).unwrap();

    let mut r = resolver("2.7.0-SNAPSHOT");
    r.apply_snapshot(&metadata);

    assert_eq!(r.resolved_version, "2.7.0-SNAPSHOT");
    assert_eq!(r.resolved_filename, "my-artifact-2.7.0-SNAPSHOT.jar");
    assert_eq!(
        r.download_url,
        "https://repo.example/m2/com/example/my-artifact/2.7.0-SNAPSHOT/my-artifact-2.7.0-SNAPSHOT.jar"
    );
}

/// The download path always ends in
/// `<base>/<requested-dir-version>/<filename>`: the requested version for
/// pinned and snapshot requests, the resolved version otherwise.
#[test]
fn download_path_property_holds_across_version_shapes() {
    let base = "https://repo.example/m2/com/example/my-artifact";

    // pinned: directory is the requested version
    let mut pinned = resolver("1.2.3");
    pinned.apply_pinned();
    assert_eq!(
        pinned.download_url,
        format!("{base}/1.2.3/{}", pinned.resolved_filename)
    );

    // snapshot: directory is the requested -SNAPSHOT version
    let metadata = parse(br#"<metadata><versioning/></metadata>"#).unwrap();
    let mut snapshot = resolver("9.9.9-SNAPSHOT");
    snapshot.apply_snapshot(&metadata);
    assert_eq!(
        snapshot.download_url,
        format!("{base}/9.9.9-SNAPSHOT/{}", snapshot.resolved_filename)
    );

    // release: directory is the resolved version
    let release_meta = parse(
        br#"<metadata><versioning><release>4.5.6</release></versioning></metadata>"#,
    )
    .unwrap();
    let mut release = resolver("RELEASE");
    release.apply_release(&release_meta).unwrap();
    assert_eq!(
        release.download_url,
        format!("{base}/4.5.6/{}", release.resolved_filename)
    );
}

#[test]
fn classifier_and_type_shape_the_filename() {
    let mut spec = artifact("1.0.0");
    spec.classifier = Some("sources".into());
    spec.r#type = Some("war".into());

    let mut r = MavenResolver::new(spec, "https://repo.example/m2");
    r.apply_pinned();
    assert_eq!(r.resolved_filename, "my-artifact-1.0.0-sources.war");
}
