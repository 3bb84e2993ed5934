use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use md5::{Digest, Md5};

/// digest of the empty input. Treated as a sentinel: a staged file hashing to
/// this value is never renamed onto a canonical blob name, which keeps
/// zero-byte writes from orphaning the content they would replace.
pub const EMPTY_FILE_HASH: &str = "D41D8CD98F00B204E9800998ECF8427E";

/// suffix of the staging file a writer appends to while a file is open
pub const WRITE_SUFFIX: &str = ".WRITE";

/// suffix of the side-copy taken before truncating a shared blob
pub const TRUNCATE_SUFFIX: &str = ".TRUNCATE";

/// A flat directory of content-addressed blobs, each named by the 32-char
/// uppercase MD5 hex of its contents.
pub struct ObjectStore {
    root: PathBuf,
}

impl ObjectStore {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        ObjectStore { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// canonical location of the blob with the given digest
    pub fn blob_path(&self, hash: &str) -> PathBuf {
        self.root.join(hash)
    }

    /// location of a staging sibling (`.WRITE` / `.TRUNCATE`) of a blob
    pub fn staging_path(&self, hash: &str, suffix: &str) -> PathBuf {
        self.root.join(format!("{hash}{suffix}"))
    }

    pub fn contains(&self, hash: &str) -> bool {
        self.blob_path(hash).exists()
    }

    /// atomically renames a staged file onto its canonical blob name
    pub fn materialize(&self, staged: &Path, hash: &str) -> io::Result<()> {
        fs::rename(staged, self.blob_path(hash))
    }

    pub fn remove(&self, hash: &str) -> io::Result<()> {
        fs::remove_file(self.blob_path(hash))
    }

    /// copies a blob to a staging sibling and returns the copy's path
    pub fn copy_to_staging(&self, hash: &str, suffix: &str) -> io::Result<PathBuf> {
        let copy = self.staging_path(hash, suffix);
        fs::copy(self.blob_path(hash), &copy)?;
        Ok(copy)
    }
}

/// digests a host file, streaming its contents in 4 KiB chunks, and returns
/// the 32-char uppercase hex form
pub fn digest_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Md5::new();
    let mut buffer = [0u8; 4096];
    loop {
        let bytes_read = file.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }
    Ok(format!("{:X}", hasher.finalize()))
}

#[cfg(test)]
mod digest_tests {
    use super::{digest_file, EMPTY_FILE_HASH};
    use std::fs;

    #[test]
    fn digest_matches_known_value() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("input");
        fs::write(&path, "hello").unwrap();
        assert_eq!(
            "5D41402ABC4B2A76B9719D911017C592",
            digest_file(&path).unwrap()
        );
    }

    #[test]
    fn empty_file_digests_to_the_sentinel() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty");
        fs::write(&path, "").unwrap();
        assert_eq!(EMPTY_FILE_HASH, digest_file(&path).unwrap());
    }

    #[test]
    fn digest_is_stable_across_chunk_boundaries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big");
        fs::write(&path, vec![0x41u8; 10_000]).unwrap();
        let first = digest_file(&path).unwrap();
        let second = digest_file(&path).unwrap();
        assert_eq!(first, second);
        assert_eq!(32, first.len());
    }
}
