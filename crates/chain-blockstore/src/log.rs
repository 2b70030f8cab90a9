//! Chunked, append-only, CRC-framed record log (spec.md §4.3, §6).
//!
//! Every record is `[magic(4 LE) | size(4 LE) | crc24q(4 LE) | payload]`.
//! Files are named `{prefix}_NNNNNN.dat` and bounded to [`MAX_FILE_SIZE`]
//! bytes; a write that would exceed the bound rotates to a new file first.
//! [`ChunkedLog::open`] replays every file at startup and repairs a
//! truncated trailing record the way spec.md §4.3 requires: the file is
//! rewritten minus the bad tail and any files after it are removed.

use crate::crc24q::crc24q;
use chain_types::{DiskPos, Error, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

pub const MAGIC: u32 = 0x8A5C_A1E8;
pub const MAX_FILE_SIZE: u32 = 0x7F00_0000;
const HEADER_LEN: usize = 12;

pub struct ChunkedLog {
    dir: PathBuf,
    prefix: &'static str,
    current_file: u32,
    current_offset: u32,
    writer: File,
}

fn filename(prefix: &str, number: u32) -> String {
    format!("{prefix}_{number:06}.dat")
}

fn existing_file_numbers(dir: &Path, prefix: &str) -> Result<Vec<u32>> {
    let mut numbers = Vec::new();
    if !dir.exists() {
        return Ok(numbers);
    }
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if let Some(rest) = name
            .strip_prefix(prefix)
            .and_then(|s| s.strip_prefix('_'))
            .and_then(|s| s.strip_suffix(".dat"))
        {
            if let Ok(n) = rest.parse::<u32>() {
                numbers.push(n);
            }
        }
    }
    numbers.sort_unstable();
    Ok(numbers)
}

/// Reads one record from an open, positioned reader. Returns `None` at a
/// clean end-of-file (no more bytes), `Some(Err)` on a truncated/corrupt
/// record, `Some(Ok(payload))` on success.
fn read_one_record(file: &mut File) -> Option<Result<Vec<u8>>> {
    let mut header = [0u8; HEADER_LEN];
    match file.read(&mut header) {
        Ok(0) => return None,
        Ok(n) if n < HEADER_LEN => {
            return Some(Err(Error::DbCorrupt("truncated record header".into())))
        }
        Ok(_) => {}
        Err(e) => return Some(Err(e.into())),
    }
    let magic = u32::from_le_bytes(header[0..4].try_into().unwrap());
    let size = u32::from_le_bytes(header[4..8].try_into().unwrap());
    let crc = u32::from_le_bytes(header[8..12].try_into().unwrap());
    if magic != MAGIC {
        return Some(Err(Error::DbCorrupt("bad record magic".into())));
    }
    let mut payload = vec![0u8; size as usize];
    match file.read_exact(&mut payload) {
        Ok(()) => {}
        Err(_) => return Some(Err(Error::DbCorrupt("truncated record payload".into()))),
    }
    if crc24q(&payload) != crc {
        return Some(Err(Error::DbCorrupt("record crc mismatch".into())));
    }
    Some(Ok(payload))
}

impl ChunkedLog {
    /// Opens (creating if absent) the log under `dir`, repairing a
    /// truncated tail left by an unclean shutdown (spec.md §4.3).
    pub fn open(dir: &Path, prefix: &'static str) -> Result<Self> {
        fs::create_dir_all(dir)?;
        let numbers = existing_file_numbers(dir, prefix)?;

        for &n in &numbers {
            let path = dir.join(filename(prefix, n));
            let mut file = File::open(&path)?;
            let mut good_end: u64 = 0;
            loop {
                match read_one_record(&mut file) {
                    None => break,
                    Some(Ok(_)) => {
                        good_end = file.stream_position()?;
                    }
                    Some(Err(_)) => {
                        truncate_file(&path, good_end)?;
                        remove_files_after(dir, prefix, n)?;
                        return Self::open_at(dir, prefix, n, good_end as u32);
                    }
                }
            }
        }

        match numbers.last() {
            Some(&n) => {
                let len = fs::metadata(dir.join(filename(prefix, n)))?.len();
                Self::open_at(dir, prefix, n, len as u32)
            }
            None => Self::open_at(dir, prefix, 0, 0),
        }
    }

    fn open_at(dir: &Path, prefix: &'static str, file_no: u32, offset: u32) -> Result<Self> {
        let path = dir.join(filename(prefix, file_no));
        let writer = OpenOptions::new()
            .create(true)
            .write(true)
            .read(true)
            .open(&path)?;
        Ok(ChunkedLog {
            dir: dir.to_path_buf(),
            prefix,
            current_file: file_no,
            current_offset: offset,
            writer,
        })
    }

    fn current_path(&self) -> PathBuf {
        self.dir.join(filename(self.prefix, self.current_file))
    }

    /// Appends `payload`, rotating to a new file first if it would not fit
    /// under [`MAX_FILE_SIZE`] (spec.md §4.3 "Writer rotates when the next
    /// record would exceed the bound").
    pub fn append(&mut self, payload: &[u8]) -> Result<DiskPos> {
        let record_len = HEADER_LEN as u32 + payload.len() as u32;
        if self.current_offset > 0 && self.current_offset + record_len > MAX_FILE_SIZE {
            self.current_file += 1;
            self.current_offset = 0;
            self.writer = OpenOptions::new()
                .create(true)
                .write(true)
                .read(true)
                .open(self.current_path())?;
        }
        let pos = DiskPos {
            file: self.current_file,
            offset: self.current_offset,
        };
        self.writer.seek(SeekFrom::Start(pos.offset as u64))?;
        self.writer.write_all(&MAGIC.to_le_bytes())?;
        self.writer.write_all(&(payload.len() as u32).to_le_bytes())?;
        self.writer.write_all(&crc24q(payload).to_le_bytes())?;
        self.writer.write_all(payload)?;
        self.writer.flush()?;
        self.current_offset += record_len;
        Ok(pos)
    }

    /// Reads the record written at `pos` (spec.md §4.3 "Readers locate
    /// records by `(fileNumber, offset)` returned at write time").
    pub fn read(&self, pos: DiskPos) -> Result<Vec<u8>> {
        let path = self.dir.join(filename(self.prefix, pos.file));
        let mut file = File::open(&path)?;
        file.seek(SeekFrom::Start(pos.offset as u64))?;
        match read_one_record(&mut file) {
            Some(Ok(payload)) => Ok(payload),
            Some(Err(e)) => Err(e),
            None => Err(Error::NotFound(format!(
                "no record at {}:{}",
                pos.file, pos.offset
            ))),
        }
    }

    /// Replays every record across every file, in write order
    /// (spec.md §8 property 5: "write N blocks, close, reopen, walk —
    /// observe N blocks in write order").
    pub fn walk(&self) -> Result<Vec<(DiskPos, Vec<u8>)>> {
        let mut out = Vec::new();
        let numbers = existing_file_numbers(&self.dir, self.prefix)?;
        for n in numbers {
            let path = self.dir.join(filename(self.prefix, n));
            let mut file = File::open(&path)?;
            loop {
                let offset = file.stream_position()? as u32;
                match read_one_record(&mut file) {
                    None => break,
                    Some(Ok(payload)) => out.push((DiskPos { file: n, offset }, payload)),
                    Some(Err(e)) => return Err(e),
                }
            }
        }
        Ok(out)
    }
}

fn truncate_file(path: &Path, len: u64) -> Result<()> {
    let file = OpenOptions::new().write(true).open(path)?;
    file.set_len(len)?;
    Ok(())
}

fn remove_files_after(dir: &Path, prefix: &str, keep_up_to: u32) -> Result<()> {
    for n in existing_file_numbers(dir, prefix)? {
        if n > keep_up_to {
            fs::remove_file(dir.join(filename(prefix, n)))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn write_close_reopen_walk_round_trips_in_order() {
        let dir = tempdir().unwrap();
        {
            let mut log = ChunkedLog::open(dir.path(), "block").unwrap();
            log.append(b"one").unwrap();
            log.append(b"two").unwrap();
            log.append(b"three").unwrap();
        }
        let log = ChunkedLog::open(dir.path(), "block").unwrap();
        let records: Vec<Vec<u8>> = log.walk().unwrap().into_iter().map(|(_, p)| p).collect();
        assert_eq!(records, vec![b"one".to_vec(), b"two".to_vec(), b"three".to_vec()]);
    }

    #[test]
    fn read_by_disk_pos_returns_the_right_record() {
        let dir = tempdir().unwrap();
        let mut log = ChunkedLog::open(dir.path(), "block").unwrap();
        log.append(b"first").unwrap();
        let pos2 = log.append(b"second").unwrap();
        assert_eq!(log.read(pos2).unwrap(), b"second".to_vec());
    }

    #[test]
    fn truncated_trailing_record_is_repaired_on_reopen() {
        let dir = tempdir().unwrap();
        {
            let mut log = ChunkedLog::open(dir.path(), "block").unwrap();
            log.append(b"good-one").unwrap();
            log.append(b"good-two").unwrap();
        }
        let path = dir.path().join("block_000000.dat");
        let full_len = fs::metadata(&path).unwrap().len();
        truncate_file(&path, full_len - 3).unwrap();

        let log = ChunkedLog::open(dir.path(), "block").unwrap();
        let records: Vec<Vec<u8>> = log.walk().unwrap().into_iter().map(|(_, p)| p).collect();
        assert_eq!(records, vec![b"good-one".to_vec()]);
    }

    #[test]
    fn subsequent_writes_after_repair_succeed() {
        let dir = tempdir().unwrap();
        {
            let mut log = ChunkedLog::open(dir.path(), "block").unwrap();
            log.append(b"good-one").unwrap();
            log.append(b"good-two").unwrap();
        }
        let path = dir.path().join("block_000000.dat");
        let full_len = fs::metadata(&path).unwrap().len();
        truncate_file(&path, full_len - 3).unwrap();

        let mut log = ChunkedLog::open(dir.path(), "block").unwrap();
        log.append(b"good-three").unwrap();
        let records: Vec<Vec<u8>> = log.walk().unwrap().into_iter().map(|(_, p)| p).collect();
        assert_eq!(records, vec![b"good-one".to_vec(), b"good-three".to_vec()]);
    }
}
