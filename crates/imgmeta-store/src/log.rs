use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use imgmeta_types::{MetaError, Result};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::journal::{Journal, LogRecord};

/// File name of the metadata log inside a data directory.
pub const LOG_FILE_NAME: &str = "meta.log";

/// Header size: 4 bytes length + 4 bytes CRC.
const HEADER_SIZE: usize = 8;

/// Flush/sync strategy for the metadata log.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// `fsync` after every append.
    EveryWrite,
    /// Flush to the OS and let the page cache decide.
    #[default]
    OsDefault,
}

struct LogWriter {
    /// `None` once a failed append could not be rolled back.
    writer: Option<BufWriter<File>>,
    /// End of the last complete frame.
    offset: u64,
}

/// Append-only metadata log.
///
/// Each accepted mutation is serialized with bincode and framed as:
///
/// ```text
/// [4 bytes: payload length (little-endian u32)]
/// [4 bytes: CRC32 of payload (little-endian u32)]
/// [N bytes: payload (bincode-serialized LogRecord)]
/// ```
///
/// Recovery reads front-to-back. Frames that fail the CRC check or do not
/// decode are skipped; a frame running past the end of the file is a torn
/// write, ends recovery and is cut off so later appends follow the last
/// complete frame.
///
/// An append that fails part-way is rolled back by truncating the file to
/// the previous end. If even that fails, the log refuses further appends
/// until it is rewritten or reopened.
pub struct MetaLog {
    path: PathBuf,
    writer: Mutex<LogWriter>,
    sync: SyncMode,
}

impl MetaLog {
    /// Open (or create) the log file at `path`.
    pub fn open(path: &Path, sync: SyncMode) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let writer = open_append(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            writer: Mutex::new(writer),
            sync,
        })
    }

    /// Append one record. Returns the byte offset of its frame.
    pub fn append(&self, record: &LogRecord) -> Result<u64> {
        let frame = encode_frame(record)?;
        let mut w = self.lock_writer()?;
        let frame_offset = w.offset;

        let written = match w.writer.as_mut() {
            Some(writer) => write_frame(writer, &frame, self.sync),
            None => return Err(self.disabled()),
        };
        if let Err(e) = written {
            self.discard_tail(&mut w);
            return Err(e.into());
        }
        w.offset += frame.len() as u64;

        debug!(offset = frame_offset, len = frame.len(), "log append");
        Ok(frame_offset)
    }

    /// Read back every intact record, oldest first.
    ///
    /// A torn frame at the end of the file is truncated away.
    pub fn recover(&self) -> Result<Vec<LogRecord>> {
        let mut w = self.lock_writer()?;
        let mut file = BufReader::new(File::open(&self.path)?);
        let file_len = file.get_ref().metadata()?.len();
        let mut records = Vec::new();
        let mut offset: u64 = 0;

        while offset + HEADER_SIZE as u64 <= file_len {
            file.seek(SeekFrom::Start(offset))?;

            let mut header = [0u8; HEADER_SIZE];
            match file.read_exact(&mut header) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e.into()),
            }
            let length = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
            let expected_crc = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);

            if length == 0 || offset + HEADER_SIZE as u64 + length as u64 > file_len {
                warn!(offset, length, file_len, "torn log frame; stopping recovery");
                break;
            }

            let mut payload = vec![0u8; length as usize];
            file.read_exact(&mut payload)?;
            let next = offset + HEADER_SIZE as u64 + length as u64;

            let actual_crc = crc32fast::hash(&payload);
            if actual_crc != expected_crc {
                warn!(
                    offset,
                    expected = expected_crc,
                    actual = actual_crc,
                    "CRC mismatch; skipping log frame"
                );
                offset = next;
                continue;
            }

            match bincode::deserialize::<LogRecord>(&payload) {
                Ok(record) => records.push(record),
                Err(e) => warn!(offset, error = %e, "undecodable log frame; skipping"),
            }
            offset = next;
        }

        if offset < file_len {
            warn!(offset, file_len, "truncating torn log tail");
            if let Some(stale) = w.writer.take() {
                let _ = stale.into_parts();
            }
            w.writer = Some(self.reopen_at(offset)?);
            w.offset = offset;
        }

        debug!(recovered = records.len(), "log recovery complete");
        Ok(records)
    }

    /// Replace the whole log with `records`.
    ///
    /// The new content is written to a temporary file in the same directory
    /// and renamed over the log, so a crash leaves either the old or the new
    /// log in place. Appends wait until the rewrite finishes.
    pub fn rewrite(&self, records: &[LogRecord]) -> Result<()> {
        let mut w = self.lock_writer()?;
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));

        let mut tmp = NamedTempFile::new_in(dir)?;
        let mut written = 0u64;
        {
            let mut out = BufWriter::new(tmp.as_file_mut());
            for record in records {
                let frame = encode_frame(record)?;
                out.write_all(&frame)?;
                written += frame.len() as u64;
            }
            out.flush()?;
        }
        tmp.as_file().sync_all()?;

        // Nothing fallible may run between the rename and the writer swap.
        let file = tmp.as_file().try_clone()?;
        tmp.persist(&self.path).map_err(|e| MetaError::Io(e.error))?;
        *w = LogWriter {
            writer: Some(BufWriter::new(file)),
            offset: written,
        };
        debug!(records = records.len(), bytes = written, "log rewritten");
        Ok(())
    }

    /// Current size of the log in bytes.
    pub fn offset(&self) -> Result<u64> {
        Ok(self.lock_writer()?.offset)
    }

    /// Path to the log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Drop whatever a failed append left behind, buffered or on disk.
    fn discard_tail(&self, w: &mut LogWriter) {
        if let Some(stale) = w.writer.take() {
            // The failed frame's buffered bytes must never reach the file.
            let _ = stale.into_parts();
        }
        match self.reopen_at(w.offset) {
            Ok(writer) => {
                w.writer = Some(writer);
                warn!(offset = w.offset, "rolled back partial log frame");
            }
            Err(e) => {
                warn!(offset = w.offset, error = %e, "cannot roll back partial log frame; log disabled");
            }
        }
    }

    /// A writer on the log file cut to `len` bytes.
    fn reopen_at(&self, len: u64) -> io::Result<BufWriter<File>> {
        let file = OpenOptions::new().read(true).append(true).open(&self.path)?;
        file.set_len(len)?;
        Ok(BufWriter::new(file))
    }

    fn disabled(&self) -> MetaError {
        MetaError::Io(io::Error::other(format!(
            "metadata log {} is disabled after a failed write",
            self.path.display()
        )))
    }

    fn lock_writer(&self) -> Result<MutexGuard<'_, LogWriter>> {
        self.writer
            .lock()
            .map_err(|e| MetaError::LockPoisoned(e.to_string()))
    }
}

impl Journal for MetaLog {
    fn record(&self, entry: &LogRecord) -> Result<()> {
        self.append(entry).map(|_| ())
    }
}

impl std::fmt::Debug for MetaLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetaLog")
            .field("path", &self.path)
            .field("sync", &self.sync)
            .finish_non_exhaustive()
    }
}

fn open_append(path: &Path) -> Result<LogWriter> {
    let file = OpenOptions::new()
        .create(true)
        .read(true)
        .append(true)
        .open(path)?;
    let offset = file.metadata()?.len();
    Ok(LogWriter {
        writer: Some(BufWriter::new(file)),
        offset,
    })
}

fn write_frame(writer: &mut BufWriter<File>, frame: &[u8], sync: SyncMode) -> io::Result<()> {
    writer.write_all(frame)?;
    writer.flush()?;
    if sync == SyncMode::EveryWrite {
        writer.get_ref().sync_all()?;
    }
    Ok(())
}

fn encode_frame(record: &LogRecord) -> Result<Vec<u8>> {
    let payload =
        bincode::serialize(record).map_err(|e| MetaError::Serialization(e.to_string()))?;
    let mut frame = Vec::with_capacity(HEADER_SIZE + payload.len());
    frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    frame.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

#[cfg(test)]
mod tests {
    use super::*;
    use imgmeta_types::{FragmentRecord, MetaInfo};

    fn store(path: &str, index: u64, start: u64, end: u64) -> LogRecord {
        LogRecord::Store(MetaInfo::fragment(
            path,
            FragmentRecord::new(index, start, end, 1, index),
        ))
    }

    fn open(dir: &tempfile::TempDir) -> MetaLog {
        MetaLog::open(&dir.path().join(LOG_FILE_NAME), SyncMode::OsDefault).unwrap()
    }

    #[test]
    fn append_and_recover_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let log = open(&dir);

        let first = store("/img/1", 1, 0, 10);
        let second = LogRecord::Store(MetaInfo::marker("/img/DIRECTORY_sub"));
        let third = LogRecord::Delete("/img/1".into());

        assert_eq!(log.append(&first).unwrap(), 0);
        assert!(log.append(&second).unwrap() > 0);
        log.append(&third).unwrap();

        assert_eq!(log.recover().unwrap(), vec![first, second, third]);
    }

    #[test]
    fn recover_empty_log() {
        let dir = tempfile::tempdir().unwrap();
        let log = open(&dir);
        assert!(log.recover().unwrap().is_empty());
        assert_eq!(log.offset().unwrap(), 0);
    }

    #[test]
    fn reopen_continues_at_end() {
        let dir = tempfile::tempdir().unwrap();
        let size = {
            let log = open(&dir);
            log.append(&store("/a", 1, 0, 5)).unwrap();
            log.offset().unwrap()
        };
        let log = MetaLog::open(&dir.path().join(LOG_FILE_NAME), SyncMode::EveryWrite).unwrap();
        assert_eq!(log.offset().unwrap(), size);
        assert_eq!(log.append(&store("/a", 2, 5, 9)).unwrap(), size);
        assert_eq!(log.recover().unwrap().len(), 2);
    }

    #[test]
    fn corrupted_frame_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let log = open(&dir);
        log.append(&store("/a", 1, 0, 5)).unwrap();
        log.append(&store("/a", 2, 5, 9)).unwrap();
        drop(log);

        // Flip the first payload byte of the first frame.
        let path = dir.path().join(LOG_FILE_NAME);
        {
            let mut file = OpenOptions::new().read(true).write(true).open(&path).unwrap();
            let mut buf = [0u8; 1];
            file.seek(SeekFrom::Start(HEADER_SIZE as u64)).unwrap();
            file.read_exact(&mut buf).unwrap();
            buf[0] ^= 0xFF;
            file.seek(SeekFrom::Start(HEADER_SIZE as u64)).unwrap();
            file.write_all(&buf).unwrap();
        }

        let log = open(&dir);
        assert_eq!(log.recover().unwrap(), vec![store("/a", 2, 5, 9)]);
    }

    #[test]
    fn torn_tail_ends_recovery() {
        let dir = tempfile::tempdir().unwrap();
        let log = open(&dir);
        log.append(&store("/a", 1, 0, 5)).unwrap();
        let keep = log.offset().unwrap();
        log.append(&store("/a", 2, 5, 9)).unwrap();
        drop(log);

        let path = dir.path().join(LOG_FILE_NAME);
        let file = OpenOptions::new().write(true).open(&path).unwrap();
        file.set_len(keep + 5).unwrap();
        drop(file);

        let log = open(&dir);
        assert_eq!(log.recover().unwrap(), vec![store("/a", 1, 0, 5)]);
        assert_eq!(log.offset().unwrap(), keep);
        assert_eq!(fs::metadata(&path).unwrap().len(), keep);

        // Appends after recovery follow the last complete frame.
        log.append(&store("/a", 3, 5, 9)).unwrap();
        drop(log);
        let log = open(&dir);
        assert_eq!(
            log.recover().unwrap(),
            vec![store("/a", 1, 0, 5), store("/a", 3, 5, 9)]
        );
    }

    #[test]
    fn failed_append_is_rolled_back() {
        let dir = tempfile::tempdir().unwrap();
        let log = open(&dir);
        log.append(&store("/a", 1, 0, 5)).unwrap();
        let keep = log.offset().unwrap();

        {
            // Part of a frame reaches the file and the rest sits in the buffer,
            // as after a short write.
            let frame = encode_frame(&store("/a", 2, 5, 9)).unwrap();
            let mut w = log.lock_writer().unwrap();
            let writer = w.writer.as_mut().unwrap();
            writer.get_mut().write_all(&frame[..12]).unwrap();
            writer.write_all(&frame[12..]).unwrap();
            log.discard_tail(&mut w);
        }
        assert_eq!(fs::metadata(log.path()).unwrap().len(), keep);

        let acknowledged: Vec<_> = (3..=6).map(|i| store("/a", i, i * 10, i * 10 + 5)).collect();
        for record in &acknowledged {
            log.append(record).unwrap();
        }
        drop(log);

        let recovered = open(&dir).recover().unwrap();
        assert_eq!(recovered.len(), 5);
        assert_eq!(recovered[0], store("/a", 1, 0, 5));
        assert_eq!(&recovered[1..], acknowledged.as_slice());
    }

    #[test]
    fn disabled_log_rejects_appends_until_rewritten() {
        let dir = tempfile::tempdir().unwrap();
        let log = open(&dir);
        let first = store("/a", 1, 0, 5);
        log.append(&first).unwrap();

        log.lock_writer().unwrap().writer = None;
        let err = log.append(&store("/a", 2, 5, 9)).unwrap_err();
        assert!(matches!(err, MetaError::Io(_)));
        assert_eq!(log.recover().unwrap(), vec![first.clone()]);

        log.rewrite(std::slice::from_ref(&first)).unwrap();
        let second = store("/a", 2, 5, 9);
        log.append(&second).unwrap();
        assert_eq!(log.recover().unwrap(), vec![first, second]);
    }

    #[test]
    fn rewrite_replaces_content() {
        let dir = tempfile::tempdir().unwrap();
        let log = open(&dir);
        for i in 1..=20 {
            log.append(&store("/a", i, (i - 1) * 10, i * 10)).unwrap();
        }
        let before = log.offset().unwrap();

        let snapshot = vec![store("/b", 1, 0, 3)];
        log.rewrite(&snapshot).unwrap();
        assert!(log.offset().unwrap() < before);
        assert_eq!(log.recover().unwrap(), snapshot);

        // Appends land in the renamed file, after the rewritten content.
        log.append(&LogRecord::Delete("/b".into())).unwrap();
        assert_eq!(fs::metadata(log.path()).unwrap().len(), log.offset().unwrap());
        assert_eq!(log.recover().unwrap().len(), 2);
        drop(log);
        assert_eq!(open(&dir).recover().unwrap().len(), 2);
    }

    #[test]
    fn sync_mode_parses_snake_case() {
        #[derive(Deserialize)]
        struct Wrapper {
            sync: SyncMode,
        }
        let w: Wrapper = toml::from_str("sync = \"every_write\"").unwrap();
        assert_eq!(w.sync, SyncMode::EveryWrite);
        assert_eq!(SyncMode::default(), SyncMode::OsDefault);
    }
}
