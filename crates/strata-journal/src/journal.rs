use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{JournalError, Result};
use crate::record::JournalRecord;

/// When the journal forces data to stable storage.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// `fsync` before every durability acknowledgment.
    #[default]
    EveryWrite,
    /// Flush to the OS page cache only.
    OsDefault,
}

/// Configuration for the journal.
#[derive(Clone, Debug, Default)]
pub struct JournalConfig {
    pub sync_mode: SyncMode,
}

/// Header size: 4 bytes length + 4 bytes CRC.
const HEADER_SIZE: usize = 8;

struct JournalWriter {
    writer: BufWriter<File>,
    /// End of the last appended record.
    offset: u64,
}

impl JournalWriter {
    /// Drop a partially written frame so the next append starts at `offset`.
    fn discard_tail(&mut self) {
        let file = match self.writer.get_ref().try_clone() {
            Ok(file) => file,
            Err(e) => {
                warn!(error = %e, "journal handle clone failed");
                return;
            }
        };
        // The old writer may flush its buffer on drop; the truncate below
        // removes whatever reached the file.
        self.writer = BufWriter::new(file);
        if let Err(e) = self.writer.get_ref().set_len(self.offset) {
            warn!(offset = self.offset, error = %e, "journal tail truncate failed");
        }
    }
}

/// Crash-recoverable journal of [`JournalRecord`]s.
///
/// On-disk format, repeated:
/// ```text
/// [4 bytes: payload length (little-endian u32)]
/// [4 bytes: CRC32 of payload (little-endian u32)]
/// [N bytes: payload (bincode-serialized JournalRecord)]
/// ```
///
/// Appends only reach the OS page cache. [`Journal::sync_through`] makes a
/// prefix of the journal durable; concurrent callers share one `fsync`
/// (group commit).
pub struct Journal {
    path: PathBuf,
    writer: Mutex<JournalWriter>,
    /// Offset known to be on stable storage. Also serializes syncs.
    synced: Mutex<u64>,
    config: JournalConfig,
}

impl Journal {
    /// Open (or create) the journal file at `path`.
    pub fn open(path: &Path, config: JournalConfig) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;
        let offset = file.metadata()?.len();

        debug!(path = %path.display(), offset, "journal opened");
        Ok(Self {
            path: path.to_path_buf(),
            writer: Mutex::new(JournalWriter {
                writer: BufWriter::new(file),
                offset,
            }),
            synced: Mutex::new(offset),
            config,
        })
    }

    /// Append one record. Returns the offset just past it.
    ///
    /// Callers that need records in a particular order must append them in
    /// that order; the journal does not reorder.
    pub fn append(&self, record: &JournalRecord) -> Result<u64> {
        let payload = encode(record)?;
        let length = u32::try_from(payload.len())
            .map_err(|_| JournalError::RecordTooLarge(payload.len()))?;
        let crc = crc32fast::hash(&payload);

        let mut w = self.writer.lock().expect("journal mutex poisoned");
        let written =
            write_frame(&mut w.writer, length, crc, &payload).and_then(|()| w.writer.flush());
        if let Err(e) = written {
            w.discard_tail();
            return Err(e.into());
        }
        w.offset += HEADER_SIZE as u64 + payload.len() as u64;

        debug!(offset = w.offset, len = payload.len(), "journal append");
        Ok(w.offset)
    }

    /// Make every record ending at or before `offset` durable.
    ///
    /// Returns immediately when an earlier sync already covered `offset`.
    pub fn sync_through(&self, offset: u64) -> Result<()> {
        let mut synced = self.synced.lock().expect("journal mutex poisoned");
        if *synced >= offset {
            return Ok(());
        }

        let (target, file) = {
            let mut w = self.writer.lock().expect("journal mutex poisoned");
            w.writer.flush()?;
            (w.offset, w.writer.get_ref().try_clone()?)
        };
        if matches!(self.config.sync_mode, SyncMode::EveryWrite) {
            file.sync_data()?;
        }
        *synced = target;

        debug!(through = target, "journal sync");
        Ok(())
    }

    /// Make everything appended so far durable.
    pub fn sync(&self) -> Result<()> {
        self.sync_through(self.offset())
    }

    /// Read every valid record front to back.
    ///
    /// Records failing the CRC check are skipped. A truncated tail (torn
    /// write from a crash) ends recovery.
    pub fn recover(&self) -> Result<Vec<JournalRecord>> {
        let mut file = BufReader::new(File::open(&self.path)?);
        let file_len = file.get_ref().metadata()?.len();
        let mut records = Vec::new();
        let mut offset: u64 = 0;

        while offset + HEADER_SIZE as u64 <= file_len {
            let mut header = [0u8; HEADER_SIZE];
            match file.read_exact(&mut header) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e.into()),
            }

            let length = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
            let expected_crc = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);

            if length == 0 || offset + HEADER_SIZE as u64 + u64::from(length) > file_len {
                warn!(offset, length, file_len, "invalid journal record length; stopping recovery");
                break;
            }

            let mut payload = vec![0u8; length as usize];
            match file.read_exact(&mut payload) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    warn!(offset, "truncated journal record; stopping recovery");
                    break;
                }
                Err(e) => return Err(e.into()),
            }
            offset += HEADER_SIZE as u64 + u64::from(length);

            let actual_crc = crc32fast::hash(&payload);
            if actual_crc != expected_crc {
                warn!(
                    offset,
                    expected = expected_crc,
                    actual = actual_crc,
                    "CRC mismatch; skipping record"
                );
                continue;
            }

            match bincode::deserialize::<JournalRecord>(&payload) {
                Ok(record) => records.push(record),
                Err(e) => warn!(offset, error = %e, "undecodable journal record; skipping"),
            }
        }

        debug!(recovered = records.len(), "journal recovery complete");
        Ok(records)
    }

    /// Replace the whole journal with `records`.
    ///
    /// The new contents are written and synced to a sibling file which is
    /// then renamed over the journal, so a crash leaves either the old or
    /// the new journal in place.
    pub fn rewrite(&self, records: &[JournalRecord]) -> Result<()> {
        // Same lock order as `sync_through`: synced, then writer.
        let mut synced = self.synced.lock().expect("journal mutex poisoned");
        let mut w = self.writer.lock().expect("journal mutex poisoned");
        let staging = self.path.with_extension("compact");

        let mut out = BufWriter::new(File::create(&staging)?);
        let mut written: u64 = 0;
        for record in records {
            let payload = encode(record)?;
            let length = u32::try_from(payload.len())
                .map_err(|_| JournalError::RecordTooLarge(payload.len()))?;
            write_frame(&mut out, length, crc32fast::hash(&payload), &payload)?;
            written += HEADER_SIZE as u64 + payload.len() as u64;
        }
        out.flush()?;
        out.get_ref().sync_all()?;
        drop(out);

        fs::rename(&staging, &self.path)?;
        let file = OpenOptions::new().read(true).append(true).open(&self.path)?;
        w.writer = BufWriter::new(file);
        w.offset = written;
        *synced = written;

        info!(records = records.len(), bytes = written, "journal compacted");
        Ok(())
    }

    /// Offset just past the last appended record.
    pub fn offset(&self) -> u64 {
        self.writer.lock().expect("journal mutex poisoned").offset
    }

    /// Offset known to be on stable storage.
    pub fn synced_offset(&self) -> u64 {
        *self.synced.lock().expect("journal mutex poisoned")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn sync_mode(&self) -> SyncMode {
        self.config.sync_mode
    }
}

impl std::fmt::Debug for Journal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Journal")
            .field("path", &self.path)
            .field("offset", &self.offset())
            .field("sync_mode", &self.config.sync_mode)
            .finish()
    }
}

fn write_frame(out: &mut impl Write, length: u32, crc: u32, payload: &[u8]) -> io::Result<()> {
    out.write_all(&length.to_le_bytes())?;
    out.write_all(&crc.to_le_bytes())?;
    out.write_all(payload)
}

fn encode(record: &JournalRecord) -> Result<Vec<u8>> {
    bincode::serialize(record).map_err(|e| JournalError::Serialization(e.to_string()))
}
