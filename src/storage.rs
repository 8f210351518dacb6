//! On-disk text store for page OCR output.
//!
//! Canonical text lives next to the source image as a `.txt` file. Replacing
//! text goes through a temp-file-plus-rename so a crash mid-write can never
//! leave a partial file where readers look.

use std::io::Write;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

/// Text store rooted at the data directory.
#[derive(Clone)]
pub struct TextStore {
    data_dir: PathBuf,
}

impl TextStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Resolve a relative path against the data directory.
    pub fn resolve(&self, rel_path: &str) -> PathBuf {
        self.data_dir.join(rel_path)
    }

    /// Canonical text path for an image path: same location, `.txt` extension.
    pub fn text_path_for_image(image_path: &str) -> String {
        match image_path.rsplit_once('.') {
            Some((stem, _ext)) => format!("{}.txt", stem),
            None => format!("{}.txt", image_path),
        }
    }

    /// Read stored text. Returns None when the file does not exist.
    ///
    /// Invalid UTF-8 is replaced rather than rejected; scanned archives
    /// contain OCR output from many tools and encodings.
    pub fn read(&self, rel_path: &str) -> std::io::Result<Option<String>> {
        let path = self.resolve(rel_path);
        if !path.exists() {
            return Ok(None);
        }
        let bytes = std::fs::read(&path)?;
        Ok(Some(String::from_utf8_lossy(&bytes).into_owned()))
    }

    /// Atomically replace the text at `rel_path`.
    ///
    /// The full content is written to a temporary file in the target
    /// directory, then renamed over the canonical path. Readers see either
    /// the old text or the new text, never a partial write.
    pub fn write_atomic(&self, rel_path: &str, text: &str) -> std::io::Result<()> {
        let target = self.resolve(rel_path);
        let parent = target
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.data_dir.clone());
        std::fs::create_dir_all(&parent)?;

        let mut tmp = tempfile::NamedTempFile::new_in(&parent)?;
        tmp.write_all(text.as_bytes())?;
        tmp.flush()?;
        tmp.persist(&target).map_err(|e| e.error)?;
        Ok(())
    }

    /// SHA-256 of text content, hex encoded.
    pub fn content_hash(text: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        hex::encode(hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_path_for_image() {
        assert_eq!(
            TextStore::text_path_for_image("prod01/VOL001/IMG-0042.tif"),
            "prod01/VOL001/IMG-0042.txt"
        );
        assert_eq!(TextStore::text_path_for_image("noext"), "noext.txt");
    }

    #[test]
    fn test_write_read_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = TextStore::new(dir.path());

        assert_eq!(store.read("a/b.txt").unwrap(), None);

        store.write_atomic("a/b.txt", "first version").unwrap();
        assert_eq!(
            store.read("a/b.txt").unwrap().as_deref(),
            Some("first version")
        );

        store.write_atomic("a/b.txt", "second version").unwrap();
        assert_eq!(
            store.read("a/b.txt").unwrap().as_deref(),
            Some("second version")
        );
    }

    #[test]
    fn test_orphaned_temp_file_does_not_shadow_canonical() {
        // A crashed writer leaves a temp file behind; the canonical path
        // must still read the last complete version.
        let dir = tempfile::tempdir().unwrap();
        let store = TextStore::new(dir.path());

        store.write_atomic("page.txt", "complete text").unwrap();

        // Simulate an interrupted attempt: temp file written, rename never ran.
        let mut tmp = tempfile::NamedTempFile::new_in(dir.path()).unwrap();
        tmp.write_all(b"partial garb").unwrap();
        std::mem::forget(tmp);

        assert_eq!(
            store.read("page.txt").unwrap().as_deref(),
            Some("complete text")
        );
    }

    #[test]
    fn test_content_hash_stable() {
        let h1 = TextStore::content_hash("hello");
        let h2 = TextStore::content_hash("hello");
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 64);
        assert_ne!(TextStore::content_hash("other"), h1);
    }
}
