// src/stream.rs
// Memory-bounded batching over the CLI's input format: CSV `DNA,count\n` or
// bare `DNA\n` (count defaults to 1), one fragment per line (spec.md S6).
// Adapted from the FASTA batch iterator's flush-on-count-or-bytes policy,
// simplified since a fragment is always a single line (no multi-line
// continuation to track across batch boundaries).

use std::io::{self, BufRead};

use crate::error::AcgTrieError;

/// One fragment read from the input stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    pub dna: String,
    pub count: u32,
}

fn parse_line(line: &str) -> Result<Option<Fragment>, AcgTrieError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    match line.split_once(',') {
        Some((dna, count_str)) => {
            let count: u32 = count_str.trim().parse().map_err(|_| AcgTrieError::CorruptFile {
                reason: format!("invalid count {count_str:?} in line {line:?}"),
            })?;
            Ok(Some(Fragment { dna: dna.trim().to_string(), count }))
        }
        None => Ok(Some(Fragment { dna: line.to_string(), count: 1 })),
    }
}

/// Iterates batches of fragments, flushing once a batch reaches `max_items`
/// lines or `max_bytes` of estimated fragment data — whichever comes first —
/// so the caller's trie never has to absorb an unbounded batch in one go.
pub struct FragmentBatchIterator<R> {
    lines: io::Lines<R>,
    max_items: usize,
    max_bytes: usize,
    exhausted: bool,
}

impl<R: BufRead> FragmentBatchIterator<R> {
    pub fn new(reader: R, max_items: usize, max_bytes: usize) -> Self {
        Self { lines: reader.lines(), max_items, max_bytes, exhausted: false }
    }
}

impl<R: BufRead> Iterator for FragmentBatchIterator<R> {
    type Item = Result<Vec<Fragment>, AcgTrieError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.exhausted {
            return None;
        }

        let mut batch = Vec::new();
        let mut batch_bytes = 0usize;

        loop {
            if !batch.is_empty() && (batch.len() >= self.max_items || batch_bytes >= self.max_bytes) {
                return Some(Ok(batch));
            }

            match self.lines.next() {
                Some(Ok(raw_line)) => match parse_line(&raw_line) {
                    Ok(Some(fragment)) => {
                        batch_bytes += fragment.dna.len() + 8;
                        batch.push(fragment);
                    }
                    Ok(None) => continue,
                    Err(e) => return Some(Err(e)),
                },
                Some(Err(e)) => return Some(Err(AcgTrieError::Io(e))),
                None => {
                    self.exhausted = true;
                    break;
                }
            }
        }

        if batch.is_empty() {
            None
        } else {
            Some(Ok(batch))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn collect(input: &str, max_items: usize) -> Vec<Fragment> {
        let iter = FragmentBatchIterator::new(Cursor::new(input), max_items, usize::MAX);
        iter.flat_map(|batch| batch.unwrap()).collect()
    }

    #[test]
    fn bare_dna_defaults_to_count_one() {
        let fragments = collect("ACGT\nTTTT\n", 10);
        assert_eq!(fragments, vec![
            Fragment { dna: "ACGT".to_string(), count: 1 },
            Fragment { dna: "TTTT".to_string(), count: 1 },
        ]);
    }

    #[test]
    fn csv_count_is_parsed() {
        let fragments = collect("ACGT,3\nGGGG,1\n", 10);
        assert_eq!(fragments[0].count, 3);
        assert_eq!(fragments[1].count, 1);
    }

    #[test]
    fn blank_lines_are_skipped() {
        let fragments = collect("ACGT\n\n\nTTTT\n", 10);
        assert_eq!(fragments.len(), 2);
    }

    #[test]
    fn batches_split_on_max_items() {
        let iter = FragmentBatchIterator::new(Cursor::new("A\nC\nG\nT\n"), 2, usize::MAX);
        let batches: Vec<_> = iter.map(|b| b.unwrap().len()).collect();
        assert_eq!(batches, vec![2, 2]);
    }

    #[test]
    fn malformed_count_is_rejected() {
        let iter = FragmentBatchIterator::new(Cursor::new("ACGT,notanumber\n"), 10, usize::MAX);
        let results: Vec<_> = iter.collect();
        assert_eq!(results.len(), 1);
        assert!(results[0].is_err());
    }
}
