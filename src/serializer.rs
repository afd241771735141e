// src/serializer.rs
// Emits/ingests rows as a fixed-width 28-byte binary record preceded by a
// 100-line JSON metadata header (spec.md S4.4). The on-disk column order is
// the file-suffix convention `A, C, G, T`; `Row.child` is kept in base-idx
// order `{A=0, C=1, T=2, G=3}` (up2bit.rs), so every read/write here
// permutes between the two (spec.md S9 Open Question 1).

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::TrieConfig;
use crate::error::AcgTrieError;
use crate::row_store::{Row, RowStore};
use crate::trie::Trie;

const HEADER_JSON_LINES: usize = 98;
const HEADER_TOTAL_LINES: usize = 100;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructFormats {
    pub count: String,
    pub a: String,
    pub c: String,
    pub g: String,
    pub t: String,
    pub seq: String,
}

impl Default for StructFormats {
    fn default() -> Self {
        StructFormats {
            count: "uint32".to_string(),
            a: "uint32".to_string(),
            c: "uint32".to_string(),
            g: "uint32".to_string(),
            t: "uint32".to_string(),
            seq: "int64".to_string(),
        }
    }
}

/// Build-time statistics the header records but the trie itself doesn't
/// track (those belong to whatever streamed fragments into it).
#[derive(Debug, Clone)]
pub struct BuildStats {
    pub fragments: u64,
    pub fragment_avg_len: f64,
    pub analysis_time: String,
    pub analysis_duration: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrieHeader {
    pub structs: StructFormats,
    pub fragments: u64,
    pub fragment_avg_len: f64,
    pub rows: u64,
    pub analysis_time: String,
    pub analysis_duration: f64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub count_overflow: BTreeMap<u32, u64>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub warp_overflow: BTreeMap<u32, u32>,
}

impl TrieHeader {
    fn from_trie(trie: &Trie, stats: &BuildStats) -> Self {
        TrieHeader {
            structs: StructFormats::default(),
            fragments: stats.fragments,
            fragment_avg_len: stats.fragment_avg_len,
            rows: trie.len() as u64,
            analysis_time: stats.analysis_time.clone(),
            analysis_duration: stats.analysis_duration,
            count_overflow: trie.count_overflow().clone(),
            warp_overflow: BTreeMap::new(),
        }
    }
}

fn write_header<W: Write>(writer: &mut W, header: &TrieHeader) -> Result<(), AcgTrieError> {
    writer.write_all(b"HEADER_START\n")?;

    let pretty = serde_json::to_string_pretty(header)?;
    let pretty_lines = pretty.lines().count();
    let body = if pretty_lines <= HEADER_JSON_LINES {
        pretty
    } else {
        serde_json::to_string(header)?
    };

    let body_lines = body.lines().count().max(1);
    writer.write_all(body.as_bytes())?;
    writer.write_all(b"\n")?;
    for _ in body_lines..HEADER_JSON_LINES {
        writer.write_all(b"\n")?;
    }
    writer.write_all(b"HEADER_END\n")?;
    Ok(())
}

fn read_header<R: BufRead>(reader: &mut R) -> Result<TrieHeader, AcgTrieError> {
    let mut first = String::new();
    reader.read_line(&mut first)?;
    if first.trim_end() != "HEADER_START" {
        return Err(AcgTrieError::CorruptFile { reason: "missing HEADER_START line".to_string() });
    }

    let mut body_lines = Vec::new();
    let mut line_count = 0usize;
    loop {
        let mut line = String::new();
        let n = reader.read_line(&mut line)?;
        if n == 0 {
            return Err(AcgTrieError::CorruptFile { reason: "truncated header".to_string() });
        }
        if line.trim_end() == "HEADER_END" {
            break;
        }
        body_lines.push(line);
        line_count += 1;
        if line_count > HEADER_TOTAL_LINES {
            return Err(AcgTrieError::CorruptFile { reason: "header exceeds 100 lines".to_string() });
        }
    }

    let json_text: String = body_lines.concat();
    let header: TrieHeader = serde_json::from_str(json_text.trim_end())?;
    Ok(header)
}

fn write_row<W: Write>(writer: &mut W, row: &Row) -> Result<(), AcgTrieError> {
    writer.write_all(&row.count.to_le_bytes())?;
    writer.write_all(&row.child[0].to_le_bytes())?; // A
    writer.write_all(&row.child[1].to_le_bytes())?; // C
    writer.write_all(&row.child[3].to_le_bytes())?; // G
    writer.write_all(&row.child[2].to_le_bytes())?; // T
    writer.write_all(&(row.seq as i64).to_le_bytes())?;
    Ok(())
}

fn read_row<R: Read>(reader: &mut R) -> Result<Row, AcgTrieError> {
    let mut buf = [0u8; 28];
    reader.read_exact(&mut buf)?;
    let count = u32::from_le_bytes(buf[0..4].try_into().unwrap());
    let a = u32::from_le_bytes(buf[4..8].try_into().unwrap());
    let c = u32::from_le_bytes(buf[8..12].try_into().unwrap());
    let g = u32::from_le_bytes(buf[12..16].try_into().unwrap());
    let t = u32::from_le_bytes(buf[16..20].try_into().unwrap());
    let seq = i64::from_le_bytes(buf[20..28].try_into().unwrap()) as u64;
    Ok(Row { count, child: [a, c, t, g], seq })
}

fn validate_row(row_idx: u32, row: &Row, row_count: u32) -> Result<(), AcgTrieError> {
    for &child in &row.child {
        if child == 0 {
            continue;
        }
        if child >= row_count {
            return Err(AcgTrieError::CorruptFile {
                reason: format!("row {row_idx} has out-of-range child {child}"),
            });
        }
        if child == row_idx {
            return Err(AcgTrieError::CorruptFile {
                reason: format!("row {row_idx} is its own child"),
            });
        }
    }
    Ok(())
}

/// Writes the header followed by all rows, record-striped, to a single
/// combined file (the §4.4 "single file" alternative to six column files).
pub fn save<W: Write>(writer: &mut W, trie: &Trie, stats: &BuildStats) -> Result<(), AcgTrieError> {
    let header = TrieHeader::from_trie(trie, stats);
    write_header(writer, &header)?;
    for i in 0..trie.len() as u32 {
        write_row(writer, &trie.row(i))?;
    }
    writer.flush()?;
    tracing::info!(rows = trie.len(), "wrote trie");
    Ok(())
}

/// Reads a combined file written by `save` back into a `Trie`.
pub fn load<R: Read>(reader: &mut R) -> Result<(Trie, TrieHeader), AcgTrieError> {
    let mut buffered = BufReader::new(reader);
    let header = read_header(&mut buffered)?;

    let mut store = RowStore::new(header.rows.max(1) as usize);
    for i in 0..header.rows as u32 {
        let row = read_row(&mut buffered)?;
        validate_row(i, &row, header.rows as u32)?;
        if i == 0 {
            store.set(0, row);
        } else {
            let allocated = store.alloc()?;
            debug_assert_eq!(allocated, i);
            store.set(i, row);
        }
    }

    let count_overflow = header.count_overflow.clone();
    let trie = Trie::from_parts(store, TrieConfig::default(), count_overflow);
    tracing::info!(rows = header.rows, "loaded trie");
    Ok((trie, header))
}

/// Writes the legacy six-file layout: `<out>.A .C .G .T .COUNT .SEQ`, each
/// carrying a copy of the header followed by just that column's values.
pub fn save_split(out_prefix: &Path, trie: &Trie, stats: &BuildStats) -> Result<(), AcgTrieError> {
    let header = TrieHeader::from_trie(trie, stats);

    let mut a = BufWriter::new(File::create(out_prefix.with_extension("A"))?);
    let mut c = BufWriter::new(File::create(out_prefix.with_extension("C"))?);
    let mut g = BufWriter::new(File::create(out_prefix.with_extension("G"))?);
    let mut t = BufWriter::new(File::create(out_prefix.with_extension("T"))?);
    let mut count = BufWriter::new(File::create(out_prefix.with_extension("COUNT"))?);
    let mut seq = BufWriter::new(File::create(out_prefix.with_extension("SEQ"))?);

    write_header(&mut a, &header)?;
    write_header(&mut c, &header)?;
    write_header(&mut g, &header)?;
    write_header(&mut t, &header)?;
    write_header(&mut count, &header)?;
    write_header(&mut seq, &header)?;

    for i in 0..trie.len() as u32 {
        let row = trie.row(i);
        count.write_all(&row.count.to_le_bytes())?;
        a.write_all(&row.child[0].to_le_bytes())?;
        c.write_all(&row.child[1].to_le_bytes())?;
        g.write_all(&row.child[3].to_le_bytes())?;
        t.write_all(&row.child[2].to_le_bytes())?;
        seq.write_all(&(row.seq as i64).to_le_bytes())?;
    }

    for w in [&mut a, &mut c, &mut g, &mut t, &mut count, &mut seq] {
        w.flush()?;
    }
    tracing::info!(rows = trie.len(), prefix = %out_prefix.display(), "wrote split trie");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn stats() -> BuildStats {
        BuildStats {
            fragments: 2,
            fragment_avg_len: 3.5,
            analysis_time: "2026-07-27T00:00:00Z".to_string(),
            analysis_duration: 0.01,
        }
    }

    #[test]
    fn round_trips_a_small_trie() {
        let mut trie = Trie::new();
        trie.add_subsequence("ACG", 0, 3, 1).unwrap();
        trie.add_subsequence("ACGT", 0, 4, 1).unwrap();

        let mut buf = Vec::new();
        save(&mut buf, &trie, &stats()).unwrap();

        let (loaded, header) = load(&mut Cursor::new(buf)).unwrap();
        assert_eq!(loaded.len(), trie.len());
        assert_eq!(header.rows, trie.len() as u64);
        for i in 0..trie.len() as u32 {
            assert_eq!(loaded.row(i), trie.row(i));
        }
    }

    #[test]
    fn header_has_exactly_100_lines() {
        // Row bytes are arbitrary binary, not necessarily valid UTF-8, so
        // this only decodes the header prefix (scanned by byte, not by
        // `str::lines`) rather than the whole buffer.
        let trie = Trie::new();
        let mut buf = Vec::new();
        save(&mut buf, &trie, &stats()).unwrap();

        let mut newlines_seen = 0;
        let mut header_end = 0;
        for (i, &b) in buf.iter().enumerate() {
            if b == b'\n' {
                newlines_seen += 1;
                if newlines_seen == HEADER_TOTAL_LINES {
                    header_end = i + 1;
                    break;
                }
            }
        }
        assert_eq!(newlines_seen, HEADER_TOTAL_LINES);

        let header_text = std::str::from_utf8(&buf[..header_end]).unwrap();
        let header_lines: Vec<&str> = header_text.lines().collect();
        assert_eq!(header_lines.len(), HEADER_TOTAL_LINES);
        assert_eq!(header_lines[0], "HEADER_START");
        assert_eq!(header_lines[HEADER_TOTAL_LINES - 1], "HEADER_END");
    }

    #[test]
    fn corrupt_child_index_rejected() {
        let mut buf = Vec::new();
        let header = TrieHeader {
            structs: StructFormats::default(),
            fragments: 0,
            fragment_avg_len: 0.0,
            rows: 1,
            analysis_time: "now".to_string(),
            analysis_duration: 0.0,
            count_overflow: BTreeMap::new(),
            warp_overflow: BTreeMap::new(),
        };
        write_header(&mut buf, &header).unwrap();
        // A single row whose A-child points at row 5, which does not exist.
        write_row(&mut buf, &Row { count: 0, child: [5, 0, 0, 0], seq: 1 }).unwrap();

        let err = load(&mut Cursor::new(buf)).unwrap_err();
        assert!(matches!(err, AcgTrieError::CorruptFile { .. }));
    }
}
