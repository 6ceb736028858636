//! Binary ledger file format
//!
//! Layout: a big-endian `i32` record count followed by that many records of
//! three strings `{output path, source url, artifact name}`. Each string is an
//! `i32` byte length followed by UTF-8 bytes; a length of `-1` encodes an
//! absent string. An absent or zero-length file is an empty ledger. A file
//! cut short in the middle of a record keeps the records before the cut.

use crate::ledger::{DeletionEntry, normalize_path};
use crate::{LedgerError, LedgerResult};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Cursor, Read, Write};
use std::path::Path;
use tracing::warn;

/// Write one optional length-prefixed string
pub fn write_string<W: Write>(out: &mut W, value: Option<&str>) -> io::Result<()> {
    match value {
        Some(value) => {
            let len = i32::try_from(value.len())
                .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "string too long"))?;
            out.write_i32::<BigEndian>(len)?;
            out.write_all(value.as_bytes())
        }
        None => out.write_i32::<BigEndian>(-1),
    }
}

/// Read one optional length-prefixed string
pub fn read_string<R: Read>(input: &mut R) -> LedgerResult<Option<String>> {
    let len = input.read_i32::<BigEndian>().map_err(truncated)?;
    if len == -1 {
        return Ok(None);
    }
    let len = u64::try_from(len).map_err(|_| LedgerError::Corrupt(format!("negative string length {len}")))?;
    // The length comes from the file, so only allocate what is actually there
    let mut buf = Vec::new();
    let read = input.by_ref().take(len).read_to_end(&mut buf).map_err(truncated)?;
    if u64::try_from(read).ok() != Some(len) {
        return Err(LedgerError::Corrupt(format!(
            "truncated record: string of {len} bytes, {read} available"
        )));
    }
    String::from_utf8(buf)
        .map(Some)
        .map_err(|e| LedgerError::Corrupt(format!("invalid UTF-8: {e}")))
}

fn truncated(e: io::Error) -> LedgerError {
    LedgerError::Corrupt(format!("truncated record: {e}"))
}

/// Encode ledger entries into the file format
pub fn encode(entries: &BTreeMap<String, DeletionEntry>) -> LedgerResult<Vec<u8>> {
    let count = i32::try_from(entries.len())
        .map_err(|_| LedgerError::Corrupt(format!("too many entries: {}", entries.len())))?;
    let mut out = Vec::new();
    let encode_err = |e: io::Error| LedgerError::Corrupt(e.to_string());

    out.write_i32::<BigEndian>(count).map_err(encode_err)?;
    for (output_path, entry) in entries {
        write_string(&mut out, Some(normalize_path(output_path).as_str())).map_err(encode_err)?;
        write_string(&mut out, Some(entry.source_url.as_str())).map_err(encode_err)?;
        write_string(&mut out, entry.artifact_name.as_deref()).map_err(encode_err)?;
    }
    Ok(out)
}

/// Decode ledger entries from the file format
///
/// Records without an output path or a source url are skipped. A damaged
/// header is an error; a damaged record ends decoding and the complete
/// records before it are kept.
pub fn decode(bytes: &[u8]) -> LedgerResult<BTreeMap<String, DeletionEntry>> {
    let mut entries = BTreeMap::new();
    if bytes.is_empty() {
        return Ok(entries);
    }

    let mut input = Cursor::new(bytes);
    let count = input.read_i32::<BigEndian>().map_err(truncated)?;
    if count < 0 {
        return Err(LedgerError::Corrupt(format!("negative record count {count}")));
    }

    for index in 0..count {
        match read_record(&mut input) {
            Ok((Some(output_path), Some(source_url), artifact_name)) => {
                let _ = entries.insert(
                    normalize_path(&output_path),
                    DeletionEntry {
                        source_url,
                        artifact_name,
                    },
                );
            }
            Ok(_) => {}
            Err(e) => {
                warn!(
                    record = index,
                    expected = count,
                    kept = entries.len(),
                    error = %e,
                    "Deletion ledger is damaged, keeping the records before the damage"
                );
                break;
            }
        }
    }
    Ok(entries)
}

type RawRecord = (Option<String>, Option<String>, Option<String>);

fn read_record<R: Read>(input: &mut R) -> LedgerResult<RawRecord> {
    let output_path = read_string(input)?;
    let source_url = read_string(input)?;
    let artifact_name = read_string(input)?;
    Ok((output_path, source_url, artifact_name))
}

/// Load a ledger file; a missing file is an empty ledger
pub fn load(path: &Path) -> LedgerResult<BTreeMap<String, DeletionEntry>> {
    match fs::read(path) {
        Ok(bytes) => decode(&bytes),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(BTreeMap::new()),
        Err(e) => Err(LedgerError::io(path, e)),
    }
}

/// Rewrite a ledger file with the full set of entries
pub fn save(path: &Path, entries: &BTreeMap<String, DeletionEntry>) -> LedgerResult<()> {
    let data = encode(entries)?;
    atomic_write(path, &data).map_err(|e| LedgerError::io(path, e))
}

/// Write data to a file atomically: temp file, fsync, rename, fsync directory
///
/// The parent directory must exist.
pub fn atomic_write(path: &Path, data: &[u8]) -> io::Result<()> {
    let temp_path = path.with_extension("tmp");
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&temp_path)?;

    file.write_all(data)?;
    file.sync_all()?;
    drop(file);

    fs::rename(&temp_path, path)?;

    if let Some(parent) = path.parent()
        && let Ok(dir) = File::open(parent)
    {
        let _ = dir.sync_all(); // Best effort, not every filesystem supports it
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn entry(url: &str, name: Option<&str>) -> DeletionEntry {
        DeletionEntry::new(url, name)
    }

    #[test]
    fn test_round_trip_sizes() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("paths_to_delete.dat");

        let empty = BTreeMap::new();
        save(&path, &empty).unwrap();
        assert_eq!(load(&path).unwrap(), empty);

        let mut one = BTreeMap::new();
        let _ = one.insert("out/A.class".to_string(), entry("file:///src/A.java", Some("A")));
        save(&path, &one).unwrap();
        assert_eq!(load(&path).unwrap(), one);

        // Several outputs of one source share the same url
        let mut many = BTreeMap::new();
        let _ = many.insert("out/B.class".to_string(), entry("file:///src/B.java", Some("B")));
        let _ = many.insert("out/B$1.class".to_string(), entry("file:///src/B.java", Some("B$1")));
        let _ = many.insert("out/B$Inner.class".to_string(), entry("file:///src/B.java", None));
        let _ = many.insert("out/C.class".to_string(), entry("file:///src/C.java", Some("C")));
        save(&path, &many).unwrap();
        assert_eq!(load(&path).unwrap(), many);
    }

    #[test]
    fn test_missing_and_empty_files() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("paths_to_delete.dat");
        assert!(load(&path).unwrap().is_empty());

        fs::write(&path, b"").unwrap();
        assert!(load(&path).unwrap().is_empty());
    }

    #[test]
    fn test_truncated_tail_keeps_complete_records() {
        let mut bytes = Vec::new();
        bytes.write_i32::<BigEndian>(2).unwrap();
        write_string(&mut bytes, Some("out/A.class")).unwrap();
        write_string(&mut bytes, Some("file:///src/A.java")).unwrap();
        write_string(&mut bytes, None).unwrap();
        write_string(&mut bytes, Some("out/B.class")).unwrap();

        let entries = decode(&bytes).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries["out/A.class"], entry("file:///src/A.java", None));
    }

    #[test]
    fn test_damaged_header_is_corrupt() {
        let err = decode(&[0, 0]).unwrap_err();
        assert!(matches!(err, LedgerError::Corrupt(_)));

        let mut bytes = Vec::new();
        bytes.write_i32::<BigEndian>(-3).unwrap();
        let err = decode(&bytes).unwrap_err();
        assert!(matches!(err, LedgerError::Corrupt(_)));
    }

    #[test]
    fn test_oversized_string_length_is_corrupt() {
        let mut bytes = Vec::new();
        bytes.write_i32::<BigEndian>(i32::MAX).unwrap();
        bytes.extend_from_slice(b"out/A.class");

        let err = read_string(&mut Cursor::new(bytes.as_slice())).unwrap_err();
        assert!(matches!(err, LedgerError::Corrupt(msg) if msg.contains("11 available")));
    }

    #[test]
    fn test_no_temp_file_left_behind() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("paths_to_delete.dat");
        save(&path, &BTreeMap::new()).unwrap();

        let names: Vec<_> = fs::read_dir(temp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec!["paths_to_delete.dat".to_string()]);
    }
}
