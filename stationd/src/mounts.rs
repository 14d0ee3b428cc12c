//! Mount table lookups.

use std::io;
use std::path::{Path, PathBuf};

const MOUNTINFO: &str = "/proc/self/mountinfo";

/// Mount points listed in a `/proc/<pid>/mountinfo` document.
///
/// Field 5 of each line is the mount point, with space, tab, newline and
/// backslash written as octal escapes.
pub fn parse_mountinfo(contents: &str) -> Vec<PathBuf> {
    contents
        .lines()
        .filter_map(|line| line.split_whitespace().nth(4))
        .map(|field| PathBuf::from(unescape_octal(field)))
        .collect()
}

fn unescape_octal(field: &str) -> String {
    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 3 < bytes.len() {
            let digits = &bytes[i + 1..i + 4];
            if digits.iter().all(|d| (b'0'..=b'7').contains(d)) {
                let value = digits
                    .iter()
                    .fold(0u32, |acc, d| acc * 8 + u32::from(d - b'0'));
                if let Ok(byte) = u8::try_from(value) {
                    out.push(byte);
                    i += 4;
                    continue;
                }
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Current mount points of this process's mount namespace.
pub async fn mount_points() -> io::Result<Vec<PathBuf>> {
    let contents = tokio::fs::read_to_string(MOUNTINFO).await?;
    Ok(parse_mountinfo(&contents))
}

/// Whether `path` is itself a mount point. Paths are compared after resolving
/// symlinks where possible, so `/mnt/vlf/Alpha/` and `/mnt/vlf/Alpha` agree.
pub async fn is_mount_point(path: &Path) -> io::Result<bool> {
    let points = mount_points().await?;
    Ok(contains_mount_point(&points, &normalize(path)))
}

pub fn contains_mount_point(points: &[PathBuf], path: &Path) -> bool {
    points.iter().any(|p| p.as_path() == path)
}

fn normalize(path: &Path) -> PathBuf {
    // Canonicalizing a dead FUSE mount fails with ENOTCONN; fall back to the
    // lexical form, which is what the mount table records for our own mounts.
    match path.parent().map(std::fs::canonicalize) {
        Some(Ok(parent)) => match path.file_name() {
            Some(name) => parent.join(name),
            None => parent,
        },
        _ => path.components().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
22 1 8:1 / / rw,relatime shared:1 - ext4 /dev/sda1 rw
35 22 0:31 / /proc rw,nosuid,nodev,noexec,relatime shared:12 - proc proc rw
101 22 0:52 / /mnt/vlf/Alpha rw,nosuid,nodev,relatime shared:60 - fuse.sshfs vlf@10.8.0.2:C:/Data rw,user_id=0,group_id=0
102 22 0:53 / /mnt/vlf/Station\\040Two rw,relatime shared:61 - fuse.sshfs vlf@10.8.0.3:/d rw
";

    #[test]
    fn test_parse_mountinfo() {
        let points = parse_mountinfo(SAMPLE);
        assert_eq!(points.len(), 4);
        assert!(contains_mount_point(&points, Path::new("/mnt/vlf/Alpha")));
        assert!(contains_mount_point(&points, Path::new("/mnt/vlf/Station Two")));
        assert!(!contains_mount_point(&points, Path::new("/mnt/vlf")));
        assert!(!contains_mount_point(&points, Path::new("/mnt/vlf/Alpha/sub")));
    }

    #[test]
    fn test_unescape_octal() {
        assert_eq!(unescape_octal("a\\040b"), "a b");
        assert_eq!(unescape_octal("tab\\011"), "tab\t");
        assert_eq!(unescape_octal("back\\134slash"), "back\\slash");
        assert_eq!(unescape_octal("trailing\\04"), "trailing\\04");
        assert_eq!(unescape_octal("plain"), "plain");
    }

    #[tokio::test]
    async fn test_plain_directory_is_not_a_mount_point() {
        let dir = tempfile::tempdir().unwrap();
        let stale = dir.path().join("Alpha");
        std::fs::create_dir(&stale).unwrap();
        if Path::new(MOUNTINFO).exists() {
            assert!(!is_mount_point(&stale).await.unwrap());
        }
    }
}
