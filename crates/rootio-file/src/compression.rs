use serde::{Deserialize, Serialize};

/// Compression algorithm identifiers as numbered by ROOT.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Algorithm {
    /// Inherit the file-level setting.
    Global,
    #[default]
    Zlib,
    Lzma,
    /// The pre-6.x LZ77 codec.
    Old,
    Lz4,
    Zstd,
}

impl Algorithm {
    pub fn code(self) -> i32 {
        match self {
            Algorithm::Global => 0,
            Algorithm::Zlib => 1,
            Algorithm::Lzma => 2,
            Algorithm::Old => 3,
            Algorithm::Lz4 => 4,
            Algorithm::Zstd => 5,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        Some(match code {
            0 => Algorithm::Global,
            1 => Algorithm::Zlib,
            2 => Algorithm::Lzma,
            3 => Algorithm::Old,
            4 => Algorithm::Lz4,
            5 => Algorithm::Zstd,
            _ => return None,
        })
    }
}

/// Algorithm/level pair carried by write configuration.
///
/// The tag is recorded on branches but never applied: payloads are stored
/// raw and codecs are expected to live outside this workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct Compression {
    pub algorithm: Algorithm,
    /// 0 disables compression, 1..=9 select increasingly aggressive settings.
    pub level: i32,
}

impl Default for Compression {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::Zlib,
            level: 1,
        }
    }
}

impl Compression {
    pub fn none() -> Self {
        Self {
            algorithm: Algorithm::Zlib,
            level: 0,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.level > 0
    }

    /// ROOT's packed `algorithm*100 + level` form.
    pub fn settings(&self) -> i32 {
        self.algorithm.code() * 100 + self.level.clamp(0, 99)
    }

    /// Inverse of [`Compression::settings`]; unknown algorithms map to zlib.
    pub fn from_settings(settings: i32) -> Self {
        let settings = settings.max(0);
        Self {
            algorithm: Algorithm::from_code(settings / 100).unwrap_or_default(),
            level: settings % 100,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn settings_vectors() {
        assert_eq!(Compression::default().settings(), 101);
        assert_eq!(Compression::none().settings(), 100);
        let zstd = Compression {
            algorithm: Algorithm::Zstd,
            level: 5,
        };
        assert_eq!(zstd.settings(), 505);
        assert_eq!(Compression::from_settings(505), zstd);
        assert_eq!(Compression::from_settings(404).algorithm, Algorithm::Lz4);
        assert_eq!(Compression::from_settings(906).algorithm, Algorithm::Zlib);
    }

    #[test]
    fn serde_uses_lowercase_algorithm_names() {
        let json = serde_json::to_string(&Compression {
            algorithm: Algorithm::Lzma,
            level: 7,
        })
        .unwrap();
        assert_eq!(json, r#"{"algorithm":"lzma","level":7}"#);

        let back: Compression = serde_json::from_str(r#"{"level":0}"#).unwrap();
        assert_eq!(back, Compression::none());
    }
}
