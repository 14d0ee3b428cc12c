//! Conventions shared by `stationd` and `frames`.
//!
//! The two services never talk to each other at runtime. They only agree on
//! how a catalog key turns into a URL inside the served mount tree, and on the
//! names of the resolution directories a station exports.

use std::fmt;

/// Path segment under which the file server exposes the mount tree.
pub const FILES_PREFIX: &str = "files";

/// Directory names a station exports below its remote base.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resolution {
    LoRes,
    HiRes,
    Wav,
}

impl Resolution {
    pub const ALL: [Resolution; 3] = [Resolution::LoRes, Resolution::HiRes, Resolution::Wav];

    pub fn as_str(&self) -> &'static str {
        match self {
            Resolution::LoRes => "LoRes",
            Resolution::HiRes => "HiRes",
            Resolution::Wav => "Wav",
        }
    }

    /// Whether a file with extension `ext` belongs in this resolution's directory.
    /// Comparison is case-insensitive.
    pub fn accepts_extension(&self, ext: &str) -> bool {
        let ext = ext.to_ascii_lowercase();
        match self {
            Resolution::Wav => ext == "wav",
            Resolution::LoRes | Resolution::HiRes => {
                matches!(ext.as_str(), "jpg" | "jpeg" | "png")
            }
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Build the URL of a catalog entry: `<base>/files/<resolution>/<key>`.
///
/// Redundant slashes at the joints are collapsed, so `http://host/` and
/// `http://host` produce the same URL. The target is not checked for existence.
pub fn frame_url(base: &str, resolution: &str, key: &str) -> String {
    let base = base.trim_end_matches('/');
    let resolution = resolution.trim_matches('/');
    let key = to_forward_slashes(key);
    let key = key.trim_start_matches('/');
    format!("{base}/{FILES_PREFIX}/{resolution}/{key}")
}

/// Stations run Windows, so configured paths may use either separator.
pub fn to_forward_slashes(path: &str) -> String {
    path.replace('\\', "/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_url_joins_segments() {
        assert_eq!(
            frame_url("http://localhost:8080", "hi", "Alpha/2025/a.jpg"),
            "http://localhost:8080/files/hi/Alpha/2025/a.jpg"
        );
        assert_eq!(
            frame_url("http://localhost:8080/", "LoRes", "/Alpha/a.jpg"),
            "http://localhost:8080/files/LoRes/Alpha/a.jpg"
        );
    }

    #[test]
    fn test_frame_url_normalizes_backslashes_in_key() {
        assert_eq!(
            frame_url("http://h", "Wav", r"Alpha\day1\x.wav"),
            "http://h/files/Wav/Alpha/day1/x.wav"
        );
    }

    #[test]
    fn test_resolution_extensions() {
        assert!(Resolution::Wav.accepts_extension("WAV"));
        assert!(!Resolution::Wav.accepts_extension("jpg"));
        assert!(Resolution::LoRes.accepts_extension("JPeg"));
        assert!(Resolution::HiRes.accepts_extension("png"));
        assert!(!Resolution::HiRes.accepts_extension("wav"));
    }

    #[test]
    fn test_forward_slashes() {
        assert_eq!(to_forward_slashes(r"C:\Data\VLF"), "C:/Data/VLF");
        assert_eq!(to_forward_slashes("/data/vlf"), "/data/vlf");
    }
}
