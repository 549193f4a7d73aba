//! `wal/reorg.log`: the write-ahead log that makes reorganization
//! crash-safe. Records are
//! `{u8 kind, u64 seq, payload_len, payload, crc32}`, appended and
//! fsynced one at a time; recovery replays the tail to find an
//! uncommitted `REORG_BEGIN`.

use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use chain_types::codec::{Canonical, MapDecoder, MapEncoder};
use chain_types::hash::Hash;
use chain_types::error::CodecError;

use crate::error::StorageError;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum WalKind {
    ReorgBegin = 0,
    ReorgCommit = 1,
    ReorgAbort = 2,
    Checkpoint = 3,
}

impl WalKind {
    fn from_u8(b: u8) -> Result<Self, StorageError> {
        match b {
            0 => Ok(WalKind::ReorgBegin),
            1 => Ok(WalKind::ReorgCommit),
            2 => Ok(WalKind::ReorgAbort),
            3 => Ok(WalKind::Checkpoint),
            other => Err(StorageError::Corrupted(format!("bad WAL record kind {}", other))),
        }
    }
}

/// Payload of a `REORG_BEGIN` record: enough to replay or roll back the
/// reorg if the process crashes mid-flight.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ReorgBeginPayload {
    pub old_tip: Hash,
    pub new_tip: Hash,
    pub disconnect: Vec<Hash>,
    pub connect: Vec<Hash>,
}

impl Canonical for ReorgBeginPayload {
    fn encode(&self, out: &mut Vec<u8>) {
        MapEncoder::new()
            .field("old_tip", &self.old_tip)
            .field("new_tip", &self.new_tip)
            .field("disconnect", &self.disconnect)
            .field("connect", &self.connect)
            .finish(out);
    }
    fn decode(buf: &mut &[u8]) -> Result<Self, CodecError> {
        let mut dec = MapDecoder::parse(buf)?;
        let old_tip = dec.field("old_tip")?;
        let new_tip = dec.field("new_tip")?;
        let disconnect = dec.field("disconnect")?;
        let connect = dec.field("connect")?;
        dec.finish_strict()?;
        Ok(ReorgBeginPayload {
            old_tip,
            new_tip,
            disconnect,
            connect,
        })
    }
}

pub struct WalRecord {
    pub kind: WalKind,
    pub seq: u64,
    pub payload: Vec<u8>,
}

pub struct Wal {
    path: PathBuf,
    next_seq: u64,
}

impl Wal {
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        OpenOptions::new().create(true).append(true).open(path)?;

        let records = Self::read_all(path)?;
        let next_seq = records.last().map(|r| r.seq + 1).unwrap_or(0);

        Ok(Wal {
            path: path.to_path_buf(),
            next_seq,
        })
    }

    pub fn append(&mut self, kind: WalKind, payload: &[u8]) -> Result<u64, StorageError> {
        let seq = self.next_seq;
        self.next_seq += 1;

        let mut file = OpenOptions::new().append(true).open(&self.path)?;
        let crc = crc32fast::hash(payload);

        file.write_all(&[kind as u8])?;
        file.write_all(&seq.to_be_bytes())?;
        file.write_all(&(payload.len() as u32).to_be_bytes())?;
        file.write_all(payload)?;
        file.write_all(&crc.to_be_bytes())?;
        file.sync_all()?;

        Ok(seq)
    }

    pub fn read_all(path: &Path) -> Result<Vec<WalRecord>, StorageError> {
        let mut file = match File::open(path) {
            Ok(f) => f,
            Err(_) => return Ok(Vec::new()),
        };
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;

        let mut records = Vec::new();
        let mut cursor = bytes.as_slice();
        while !cursor.is_empty() {
            if cursor.len() < 1 + 8 + 4 {
                // Truncated tail record from a crash mid-write; stop
                // replaying rather than erroring the whole log out.
                break;
            }
            let kind = WalKind::from_u8(cursor[0])?;
            let seq = u64::from_be_bytes(cursor[1..9].try_into().unwrap());
            let payload_len = u32::from_be_bytes(cursor[9..13].try_into().unwrap()) as usize;
            let header_len = 1 + 8 + 4;
            if cursor.len() < header_len + payload_len + 4 {
                break;
            }
            let payload = cursor[header_len..header_len + payload_len].to_vec();
            let crc_offset = header_len + payload_len;
            let expected_crc =
                u32::from_be_bytes(cursor[crc_offset..crc_offset + 4].try_into().unwrap());
            if crc32fast::hash(&payload) != expected_crc {
                break;
            }
            records.push(WalRecord { kind, seq, payload });
            cursor = &cursor[crc_offset + 4..];
        }
        Ok(records)
    }

    /// Scans the log for the most recent `REORG_BEGIN` that an `ABORT`
    /// hasn't cleared, reporting whether a matching `COMMIT` was durably
    /// recorded for it. `Some((payload, false))` is a begin the previous
    /// run never resolved either way — safe to abort, since storage is
    /// never mutated before the commit record lands. `Some((payload,
    /// true))` is a begin whose commit record made it to disk, but the
    /// storage-side disconnect/connect may not have (fully) run — the
    /// caller must redo it. `None` means the log ends in an explicit
    /// abort, or is empty: nothing left to reconcile.
    pub fn last_reorg_intent(path: &Path) -> Result<Option<(ReorgBeginPayload, bool)>, StorageError> {
        let records = Self::read_all(path)?;
        let mut pending: Option<(ReorgBeginPayload, bool)> = None;
        for record in records {
            match record.kind {
                WalKind::ReorgBegin => {
                    let mut slice = record.payload.as_slice();
                    pending = Some((ReorgBeginPayload::decode(&mut slice)?, false));
                }
                WalKind::ReorgCommit => {
                    if let Some((payload, _)) = pending.take() {
                        pending = Some((payload, true));
                    }
                }
                WalKind::ReorgAbort => pending = None,
                WalKind::Checkpoint => {}
            }
        }
        Ok(pending)
    }
}
