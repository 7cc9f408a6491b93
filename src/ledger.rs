use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Version stamped on every row written by this build.
pub const ROW_VERSION: u16 = 1;

/// Largest encoded row accepted on write or read. A length prefix above this
/// marks a corrupt frame.
pub const MAX_ROW_BYTES: usize = 1 << 20;

/// Bytes of framing around each payload: length prefix and CRC.
const FRAME_OVERHEAD: u64 = 8;

/// One persisted record: a versioned, positional field set.
///
/// Rows are positional so that a newer field set can be read by appending
/// columns; fields absent from an older row read back as empty strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Row {
    pub version: u16,
    pub fields: Vec<String>,
}

impl Row {
    pub fn new(fields: Vec<String>) -> Self {
        Self {
            version: ROW_VERSION,
            fields,
        }
    }

    pub fn field(&self, idx: usize) -> &str {
        self.fields.get(idx).map(String::as_str).unwrap_or("")
    }
}

/// Encode a single row to [len][bincode][crc32] format.
fn encode_row(writer: &mut impl Write, row: &Row) -> io::Result<()> {
    let payload =
        bincode::serialize(row).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    if payload.len() > MAX_ROW_BYTES {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("row of {} bytes exceeds {MAX_ROW_BYTES}", payload.len()),
        ));
    }
    let len = payload.len() as u32;
    let crc = crc32fast::hash(&payload);
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(&payload)?;
    writer.write_all(&crc.to_le_bytes())?;
    Ok(())
}

/// Flat file of framed rows.
///
/// Format per entry: `[u32: len][bincode: Row][u32: crc32]`
/// - `len` is the byte length of the bincode payload (not including the CRC).
/// - A torn last entry is discarded on read via length-prefix + CRC check.
///
/// The file is used in one of two ways: rewritten whole (`rewrite`) for the
/// active reservation set, or only ever appended to (`append`) for the archive.
#[derive(Debug, Clone)]
pub struct RecordLog {
    path: PathBuf,
}

impl RecordLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append rows and fsync. Creates the file if needed.
    ///
    /// A batch that fails part way is cut back off the file, so rows appended
    /// later are never stranded behind a torn frame.
    pub fn append(&self, rows: &[Row]) -> io::Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let start = file.metadata()?.len();
        let mut writer = BufWriter::new(file);
        let written = rows
            .iter()
            .try_for_each(|row| encode_row(&mut writer, row))
            .and_then(|()| writer.flush());
        let (file, _unwritten) = writer.into_parts();
        if let Err(e) = written.and_then(|()| file.sync_all()) {
            if let Err(trunc) = file.set_len(start) {
                tracing::error!("{}: cannot drop partial append: {trunc}", self.path.display());
            }
            return Err(e);
        }
        Ok(())
    }

    /// Cut a torn or corrupt tail off the file so appends land after the last
    /// valid row. Returns the number of bytes dropped.
    pub fn repair(&self) -> io::Result<u64> {
        let (rows, valid) = match self.scan()? {
            Some(scanned) => scanned,
            None => return Ok(0),
        };
        let file = OpenOptions::new().write(true).open(&self.path)?;
        let len = file.metadata()?.len();
        if len <= valid {
            return Ok(0);
        }
        file.set_len(valid)?;
        file.sync_all()?;
        tracing::warn!(
            "{}: dropped {} unreadable bytes after {} rows",
            self.path.display(),
            len - valid,
            rows.len()
        );
        Ok(len - valid)
    }

    /// Replace the whole file: write a temp file, fsync, then rename over.
    pub fn rewrite(&self, rows: &[Row]) -> io::Result<()> {
        let tmp_path = self.tmp_path();
        let file = File::create(&tmp_path)?;
        let mut writer = BufWriter::new(file);
        for row in rows {
            encode_row(&mut writer, row)?;
        }
        writer.flush()?;
        writer.get_ref().sync_all()?;
        fs::rename(&tmp_path, &self.path)
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }

    /// Read every valid row. A missing file reads as empty.
    /// Truncated/corrupt trailing entries are silently discarded.
    pub fn replay(&self) -> io::Result<Vec<Row>> {
        Ok(self.scan()?.map(|(rows, _)| rows).unwrap_or_default())
    }

    /// Valid rows and the byte length they span. `None` when the file is missing.
    fn scan(&self) -> io::Result<Option<(Vec<Row>, u64)>> {
        let file = match File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };
        let mut reader = BufReader::new(file);
        let mut rows = Vec::new();
        let mut valid = 0u64;

        loop {
            let mut len_buf = [0u8; 4];
            match reader.read_exact(&mut len_buf) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e),
            }
            let len = u32::from_le_bytes(len_buf) as usize;
            if len > MAX_ROW_BYTES {
                tracing::warn!("{}: oversized entry after {} rows, ignoring tail", self.path.display(), rows.len());
                break;
            }

            let mut payload = vec![0u8; len];
            match reader.read_exact(&mut payload) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break, // truncated
                Err(e) => return Err(e),
            }

            let mut crc_buf = [0u8; 4];
            match reader.read_exact(&mut crc_buf) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break, // truncated
                Err(e) => return Err(e),
            }
            if u32::from_le_bytes(crc_buf) != crc32fast::hash(&payload) {
                tracing::warn!("{}: corrupt entry after {} rows, ignoring tail", self.path.display(), rows.len());
                break;
            }

            match bincode::deserialize::<Row>(&payload) {
                Ok(row) => rows.push(row),
                Err(_) => break,
            }
            valid += len as u64 + FRAME_OVERHEAD;
        }

        Ok(Some((rows, valid)))
    }
}
