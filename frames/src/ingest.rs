//! Builds catalog rows from a mount tree laid out as
//! `<root>/<station>/<resolution>/**/<file>`.
//!
//! Keys are `<station>/<path below the resolution directory>`, so a frame URL
//! reads `<base>/files/<resolution>/<station>/<path>`. The file server maps
//! that back onto `<root>/<station>/<resolution>/<path>`.

use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use common::{Resolution, to_forward_slashes};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::domain::frame::{Frame, FrameRepository};
use crate::error::QueryError;

#[derive(Debug, Default)]
pub struct Scan {
    pub frames: Vec<Frame>,
    /// Entries that could not be read, e.g. behind a dropped mount.
    pub unreadable: usize,
}

/// Walks every station directory under `root`, or only those named in
/// `only` when it is non-empty. Directories are visited in name order.
pub fn scan_mount(root: &Path, only: &[String]) -> std::io::Result<Scan> {
    let mut stations: Vec<_> = fs::read_dir(root)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_dir())
        .collect();
    stations.sort_by_key(|entry| entry.file_name());

    let mut scan = Scan::default();
    for entry in stations {
        let Some(station) = entry.file_name().to_str().map(str::to_owned) else {
            warn!("skipping station directory with a non UTF-8 name: {:?}", entry.path());
            continue;
        };
        if !only.is_empty() && !only.contains(&station) {
            continue;
        }
        for resolution in Resolution::ALL {
            let dir = entry.path().join(resolution.as_str());
            if dir.is_dir() {
                scan_resolution(&station, resolution, &dir, &mut scan);
            }
        }
    }
    Ok(scan)
}

fn scan_resolution(station: &str, resolution: Resolution, dir: &Path, scan: &mut Scan) {
    let before = scan.frames.len();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("cannot read {}: {e}", dir.display());
                scan.unreadable += 1;
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let accepted = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| resolution.accepts_extension(ext));
        if !accepted {
            continue;
        }

        let modified = match entry.metadata().map(|m| m.modified()) {
            Ok(Ok(modified)) => modified,
            Ok(Err(e)) => {
                warn!("no modification time for {}: {e}", entry.path().display());
                scan.unreadable += 1;
                continue;
            }
            Err(e) => {
                warn!("cannot stat {}: {e}", entry.path().display());
                scan.unreadable += 1;
                continue;
            }
        };
        let Ok(relative) = entry.path().strip_prefix(dir) else {
            continue;
        };
        let key = format!(
            "{station}/{}",
            to_forward_slashes(&relative.to_string_lossy())
        );
        scan.frames.push(Frame::new(
            station,
            resolution,
            DateTime::<Utc>::from(modified),
            key,
        ));
    }
    debug!(
        "{station}/{resolution}: {} files",
        scan.frames.len() - before
    );
}

/// Inserts scanned frames, returning how many were new to the catalog.
pub async fn ingest(repo: &dyn FrameRepository, frames: &[Frame]) -> Result<u64, QueryError> {
    if frames.is_empty() {
        return Ok(0);
    }
    let inserted = repo.insert_frames(frames).await?;
    info!(
        "inserted {inserted} of {} scanned frames ({} already catalogued)",
        frames.len(),
        frames.len() as u64 - inserted
    );
    Ok(inserted)
}
