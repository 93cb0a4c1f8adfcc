use std::path::{Component, Path, PathBuf};

/// Opaque key identifying a file in the remote object store. Also the logical
/// key in both caches and the relative path on local disk, so construction
/// rejects anything that could escape `cache_dir`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlobKey(String);

impl BlobKey {
    pub fn new(s: impl Into<String>) -> Option<Self> {
        let s = s.into();
        if s.is_empty() {
            return None;
        }
        let path = Path::new(&s);
        if path.is_absolute() {
            return None;
        }
        if path
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return None;
        }
        if s.ends_with(".tmp") {
            return None;
        }
        Some(Self(s))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn local_path(&self, cache_dir: &Path) -> PathBuf {
        cache_dir.join(&self.0)
    }

    pub fn tmp_path(&self, cache_dir: &Path) -> PathBuf {
        cache_dir.join(format!("{}.tmp", self.0))
    }
}

impl std::fmt::Display for BlobKey {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for BlobKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_nested_paths() {
        let k = BlobKey::new("a/b.json.gz").unwrap();
        assert_eq!(k.as_str(), "a/b.json.gz");
    }

    #[test]
    fn rejects_traversal() {
        assert!(BlobKey::new("../etc/passwd").is_none());
        assert!(BlobKey::new("a/../../b").is_none());
        assert!(BlobKey::new("/abs/path").is_none());
        assert!(BlobKey::new("").is_none());
        assert!(BlobKey::new("x.tmp").is_none());
    }

    #[test]
    fn local_and_tmp_paths() {
        let k = BlobKey::new("a/b.json.gz").unwrap();
        let dir = Path::new("/data/cache");
        assert_eq!(k.local_path(dir), dir.join("a/b.json.gz"));
        assert_eq!(k.tmp_path(dir), dir.join("a/b.json.gz.tmp"));
    }
}
