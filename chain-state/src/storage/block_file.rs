//! Append-only block body files: `blocks/NNNNNN.bin`, one record per
//! block, `{u32 length, block_bytes, u32 crc32}`. Rolled to a new file
//! once the current one passes [`ROLL_SIZE`].

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::error::StorageError;

/// Roughly 64 MiB per file before rolling to the next one.
const ROLL_SIZE: u64 = 64 * 1024 * 1024;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct BlockLocation {
    pub file_id: u32,
    pub offset: u64,
    /// Whether this record lives in the gzip-compressed cold store
    /// rather than the hot, uncompressed one.
    pub compressed: bool,
}

fn file_path(dir: &Path, file_id: u32) -> PathBuf {
    dir.join(format!("{:06}.bin", file_id))
}

fn set_owner_only_permissions(file: &File) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = file.metadata()?.permissions();
        perms.set_mode(0o600);
        file.set_permissions(perms)?;
    }
    #[cfg(not(unix))]
    {
        let _ = file;
    }
    Ok(())
}

pub struct BlockFiles {
    dir: PathBuf,
    current_file_id: u32,
    current_len: u64,
}

impl BlockFiles {
    pub fn open(dir: &Path) -> Result<Self, StorageError> {
        std::fs::create_dir_all(dir)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = std::fs::metadata(dir)?.permissions();
            perms.set_mode(0o700);
            std::fs::set_permissions(dir, perms)?;
        }

        let mut max_file_id = 0u32;
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            if let Some(stem) = entry.path().file_stem().and_then(|s| s.to_str()) {
                if let Ok(id) = stem.parse::<u32>() {
                    max_file_id = max_file_id.max(id);
                }
            }
        }

        let current_len = match File::open(file_path(dir, max_file_id)) {
            Ok(f) => f.metadata()?.len(),
            Err(_) => 0,
        };

        Ok(BlockFiles {
            dir: dir.to_path_buf(),
            current_file_id: max_file_id,
            current_len,
        })
    }

    /// Appends one block record, rolling to a new file first if the
    /// current one would exceed [`ROLL_SIZE`]. Returns where it landed.
    pub fn append(&mut self, block_bytes: &[u8]) -> Result<BlockLocation, StorageError> {
        if self.current_len > 0 && self.current_len + block_bytes.len() as u64 > ROLL_SIZE {
            self.current_file_id += 1;
            self.current_len = 0;
        }

        let path = file_path(&self.dir, self.current_file_id);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)?;
        set_owner_only_permissions(&file)?;

        let offset = self.current_len;
        let crc = crc32fast::hash(block_bytes);

        file.write_all(&(block_bytes.len() as u32).to_be_bytes())?;
        file.write_all(block_bytes)?;
        file.write_all(&crc.to_be_bytes())?;
        file.sync_all()?;

        let record_len = 4 + block_bytes.len() as u64 + 4;
        self.current_len += record_len;

        Ok(BlockLocation {
            file_id: self.current_file_id,
            offset,
            compressed: false,
        })
    }

    /// Reads one block record, verifying its CRC32.
    pub fn read(&self, location: BlockLocation) -> Result<Vec<u8>, StorageError> {
        let path = file_path(&self.dir, location.file_id);
        self.validate_path(&path)?;

        let mut file = File::open(&path)?;
        file.seek(SeekFrom::Start(location.offset))?;

        let mut len_buf = [0u8; 4];
        file.read_exact(&mut len_buf)?;
        let len = u32::from_be_bytes(len_buf) as usize;

        let mut block_bytes = vec![0u8; len];
        file.read_exact(&mut block_bytes)?;

        let mut crc_buf = [0u8; 4];
        file.read_exact(&mut crc_buf)?;
        let expected_crc = u32::from_be_bytes(crc_buf);

        if crc32fast::hash(&block_bytes) != expected_crc {
            return Err(StorageError::CrcMismatch);
        }

        Ok(block_bytes)
    }

    /// Any path derived from an index lookup must resolve underneath
    /// the configured block directory; a relative-path escape (e.g. a
    /// corrupted or adversarial `file_id` somehow mapping outside the
    /// directory) is a security event, not an I/O error.
    fn validate_path(&self, path: &Path) -> Result<(), StorageError> {
        let canonical_dir = self
            .dir
            .canonicalize()
            .unwrap_or_else(|_| self.dir.clone());
        match path.canonicalize() {
            Ok(canonical_path) if canonical_path.starts_with(&canonical_dir) => Ok(()),
            Ok(_) => Err(StorageError::PathEscape),
            // A file that doesn't exist yet can't escape; let the caller's
            // subsequent `File::open` surface the real I/O error.
            Err(_) => Ok(()),
        }
    }

    pub fn file_path_for(&self, file_id: u32) -> PathBuf {
        file_path(&self.dir, file_id)
    }

    pub fn current_file_id(&self) -> u32 {
        self.current_file_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let mut files = BlockFiles::open(dir.path()).unwrap();
        let data = b"a block's worth of bytes".to_vec();
        let loc = files.append(&data).unwrap();
        assert_eq!(files.read(loc).unwrap(), data);
    }

    #[test]
    fn corrupted_record_fails_crc() {
        let dir = tempfile::tempdir().unwrap();
        let mut files = BlockFiles::open(dir.path()).unwrap();
        let loc = files.append(b"hello").unwrap();

        let path = files.file_path_for(loc.file_id);
        let mut bytes = std::fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        std::fs::write(&path, bytes).unwrap();

        assert!(matches!(files.read(loc), Err(StorageError::CrcMismatch)));
    }
}
