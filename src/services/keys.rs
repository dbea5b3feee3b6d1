//! Object key derivation.

use crate::media::AspectClass;
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::RngCore;
use std::fmt;

/// Bytes of CSPRNG output behind every key.
pub const KEY_ENTROPY_BYTES: usize = 32;

/// Key under which a blob is stored: `{class}/{random}{extension}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectKey(String);

impl ObjectKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ObjectKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Derives collision-resistant keys with a fixed extension.
#[derive(Debug, Clone)]
pub struct KeyDeriver {
    extension: String,
}

impl KeyDeriver {
    /// `extension` is appended verbatim, e.g. `".mp4"`.
    pub fn new(extension: impl Into<String>) -> Self {
        Self {
            extension: extension.into(),
        }
    }

    pub fn derive(&self, class: AspectClass) -> ObjectKey {
        let mut entropy = [0u8; KEY_ENTROPY_BYTES];
        rand::rng().fill_bytes(&mut entropy);
        ObjectKey(format!(
            "{}/{}{}",
            class.as_str(),
            URL_SAFE_NO_PAD.encode(entropy),
            self.extension
        ))
    }
}

/// File extension for a `type/subtype` media type, e.g. `video/mp4` -> `.mp4`.
pub fn extension_for(media_type: &str) -> String {
    match media_type.split_once('/') {
        Some((_, subtype)) if !subtype.is_empty() => format!(".{}", subtype),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn key_layout() {
        let key = KeyDeriver::new(".mp4").derive(AspectClass::Landscape);
        let s = key.as_str();
        assert!(s.starts_with("landscape/"));
        assert!(s.ends_with(".mp4"));

        let random = &s["landscape/".len()..s.len() - ".mp4".len()];
        // 32 bytes, unpadded base64
        assert_eq!(random.len(), 43);
        assert!(
            random
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
        );
    }

    #[test]
    fn each_class_gets_its_own_prefix() {
        let deriver = KeyDeriver::new(".mp4");
        assert!(deriver.derive(AspectClass::Portrait).as_str().starts_with("portrait/"));
        assert!(deriver.derive(AspectClass::Other).as_str().starts_with("other/"));
    }

    #[test]
    fn no_collisions_across_ten_thousand_keys() {
        let deriver = KeyDeriver::new(".mp4");
        let keys: HashSet<ObjectKey> = (0..10_000)
            .map(|_| deriver.derive(AspectClass::Landscape))
            .collect();
        assert_eq!(keys.len(), 10_000);
    }

    #[test]
    fn extension_from_media_type() {
        assert_eq!(extension_for("video/mp4"), ".mp4");
        assert_eq!(extension_for("video/"), "");
        assert_eq!(extension_for("mp4"), "");
    }
}
