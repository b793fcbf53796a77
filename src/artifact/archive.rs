//! # Archive Handling
//!
//! Deterministic tar.gz packaging plus ZIP sniffing/extraction and SHA-1
//! checksums. All functions are synchronous; callers on the async path run
//! them under `spawn_blocking`.

use std::fs::{self, File, FileTimes};
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use anyhow::{Context, Result};
use flate2::write::GzEncoder;
use flate2::Compression;
use sha1::{Digest, Sha1};

/// ZIP local-file-header magic, the prefix MIME sniffing keys on for
/// `application/zip`
const ZIP_MAGIC: [u8; 4] = [b'P', b'K', 0x03, 0x04];

/// Package a directory as a deterministic tar.gz.
///
/// Only regular files become entries (directories are skipped); entry names
/// are forward-slash paths relative to `dir`, walked in sorted order; every
/// header carries uid=0/gid=0 and empty user/group names with mode and
/// mtime taken from the filesystem.
pub fn create_tar_gz(dir: &Path, dest: &Path) -> Result<()> {
    let file = File::create(dest)
        .with_context(|| format!("unable to create archive {}", dest.display()))?;
    let encoder = GzEncoder::new(file, Compression::default());
    let mut builder = tar::Builder::new(encoder);

    let mut files = Vec::new();
    collect_files(dir, dir, &mut files)?;
    files.sort();

    for rel in files {
        let full = dir.join(&rel);
        let meta = fs::metadata(&full)
            .with_context(|| format!("unable to stat {}", full.display()))?;

        let mut header = tar::Header::new_gnu();
        header.set_size(meta.len());
        header.set_mode(meta.permissions().mode() & 0o7777);
        header.set_uid(0);
        header.set_gid(0);
        let mtime = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs())
            .unwrap_or(0);
        header.set_mtime(mtime);

        let mut reader = File::open(&full)
            .with_context(|| format!("unable to open {}", full.display()))?;
        let name = rel
            .to_str()
            .with_context(|| format!("non-utf8 path {}", rel.display()))?
            .replace('\\', "/");
        builder
            .append_data(&mut header, name, &mut reader)
            .with_context(|| format!("unable to append {}", rel.display()))?;
    }

    let encoder = builder.into_inner().context("unable to finish archive")?;
    encoder.finish().context("unable to finish compression")?;
    Ok(())
}

fn collect_files(root: &Path, current: &Path, files: &mut Vec<PathBuf>) -> Result<()> {
    for entry in fs::read_dir(current)
        .with_context(|| format!("unable to read directory {}", current.display()))?
    {
        let entry = entry?;
        let path = entry.path();
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            collect_files(root, &path, files)?;
        } else if file_type.is_file() {
            files.push(
                path.strip_prefix(root)
                    .expect("walked path is under the root")
                    .to_path_buf(),
            );
        }
    }
    Ok(())
}

/// SHA-1 hex digest of a file's contents
pub fn sha1_checksum(path: &Path) -> Result<String> {
    let mut file =
        File::open(path).with_context(|| format!("unable to open {}", path.display()))?;
    let mut hasher = Sha1::new();
    io::copy(&mut file, &mut hasher)
        .with_context(|| format!("unable to read {}", path.display()))?;
    Ok(format!("{:x}", hasher.finalize()))
}

/// Whether the file's first bytes sniff as a ZIP archive
pub fn is_zip_archive(path: &Path) -> bool {
    let Ok(mut file) = File::open(path) else {
        return false;
    };
    let mut buffer = [0u8; 512];
    let Ok(n) = io::Read::read(&mut file, &mut buffer) else {
        return false;
    };
    n >= ZIP_MAGIC.len() && buffer[..ZIP_MAGIC.len()] == ZIP_MAGIC
}

/// Extract a ZIP archive into `dest`, zeroing every entry's mtime for
/// deterministic repackaging
pub fn extract_zip(archive: &Path, dest: &Path) -> Result<()> {
    let file =
        File::open(archive).with_context(|| format!("unable to open {}", archive.display()))?;
    let mut zip = zip::ZipArchive::new(file)
        .with_context(|| format!("unable to read archive {}", archive.display()))?;

    fs::create_dir_all(dest)?;
    for i in 0..zip.len() {
        let mut entry = zip.by_index(i)?;
        let Some(rel) = entry.enclosed_name() else {
            // entries escaping the destination are dropped
            continue;
        };
        let out_path = dest.join(rel);

        if entry.is_dir() {
            fs::create_dir_all(&out_path)?;
        } else {
            if let Some(parent) = out_path.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut out = File::create(&out_path)
                .with_context(|| format!("unable to create {}", out_path.display()))?;
            io::copy(&mut entry, &mut out)?;
            if let Some(mode) = entry.unix_mode() {
                fs::set_permissions(&out_path, fs::Permissions::from_mode(mode))?;
            }
            set_epoch_mtime(&out_path)?;
        }
    }
    Ok(())
}

/// Zero a file's modification time
pub fn set_epoch_mtime(path: &Path) -> Result<()> {
    let file = File::options()
        .write(true)
        .open(path)
        .with_context(|| format!("unable to open {}", path.display()))?;
    file.set_times(FileTimes::new().set_accessed(UNIX_EPOCH).set_modified(UNIX_EPOCH))
        .with_context(|| format!("unable to set times on {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(path: &Path, contents: &[u8]) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        let mut f = File::create(path).unwrap();
        f.write_all(contents).unwrap();
        drop(f);
        set_epoch_mtime(path).unwrap();
    }

    #[test]
    fn tar_gz_is_deterministic_across_runs() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        write_file(&src.join("b.txt"), b"beta");
        write_file(&src.join("a/a.txt"), b"alpha");

        let first = dir.path().join("first.tar.gz");
        let second = dir.path().join("second.tar.gz");
        create_tar_gz(&src, &first).unwrap();
        create_tar_gz(&src, &second).unwrap();

        assert_eq!(
            sha1_checksum(&first).unwrap(),
            sha1_checksum(&second).unwrap()
        );
    }

    #[test]
    fn tar_gz_round_trip_preserves_checksum() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        write_file(&src.join("hello.txt"), b"hello");
        write_file(&src.join("nested/answer.txt"), b"42");

        let packed = dir.path().join("packed.tar.gz");
        create_tar_gz(&src, &packed).unwrap();

        // unpack and re-pack with the same rules
        let unpacked = dir.path().join("unpacked");
        let tar = flate2::read::GzDecoder::new(File::open(&packed).unwrap());
        tar::Archive::new(tar).unpack(&unpacked).unwrap();

        let repacked = dir.path().join("repacked.tar.gz");
        create_tar_gz(&unpacked, &repacked).unwrap();

        assert_eq!(
            sha1_checksum(&packed).unwrap(),
            sha1_checksum(&repacked).unwrap()
        );
    }

    #[test]
    fn zip_sniffing_matches_magic_only() {
        let dir = tempfile::tempdir().unwrap();

        let zip_path = dir.path().join("artifact.jar");
        let mut writer = zip::ZipWriter::new(File::create(&zip_path).unwrap());
        writer
            .start_file("inner.txt", zip::write::SimpleFileOptions::default())
            .unwrap();
        writer.write_all(b"inside").unwrap();
        writer.finish().unwrap();
        assert!(is_zip_archive(&zip_path));

        let plain = dir.path().join("artifact.pom");
        write_file(&plain, b"<project/>");
        assert!(!is_zip_archive(&plain));
    }

    #[test]
    fn zip_extraction_zeroes_mtimes() {
        let dir = tempfile::tempdir().unwrap();
        let zip_path = dir.path().join("artifact.jar");
        let mut writer = zip::ZipWriter::new(File::create(&zip_path).unwrap());
        writer
            .start_file("sub/file.txt", zip::write::SimpleFileOptions::default())
            .unwrap();
        writer.write_all(b"contents").unwrap();
        writer.finish().unwrap();

        let out = dir.path().join("out");
        extract_zip(&zip_path, &out).unwrap();

        let extracted = out.join("sub/file.txt");
        assert_eq!(fs::read(&extracted).unwrap(), b"contents");
        let mtime = fs::metadata(&extracted).unwrap().modified().unwrap();
        assert_eq!(mtime, UNIX_EPOCH);
    }

    #[test]
    fn sha1_checksum_matches_known_value() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data");
        write_file(&path, b"hello");
        // sha1("hello")
        assert_eq!(
            sha1_checksum(&path).unwrap(),
            "aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d"
        );
    }
}
