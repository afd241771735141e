// src/main.rs
// ACGTRIE: exact DNA subsequence counting.
// Thin CLI wrapper around the trie: streams fragments from stdin, builds
// a trie, and serializes it; or loads a saved trie and answers lookups.

mod cli;

use acgtrie::{BuildStats, FragmentBatchIterator, TrieConfig};
use crate::cli::{Cli, Commands};

use anyhow::{Context, Result};
use clap::Parser;
use std::fs::File;
use std::io::{self, BufReader, BufWriter};
use std::path::Path;
use std::time::Instant;

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match &cli.command {
        Commands::Build { output, split, all_suffixes, initial_capacity, batch_items } => {
            run_build(output, *split, *all_suffixes, *initial_capacity, *batch_items)
        }
        Commands::Lookup { input, sequences } => run_lookup(input, sequences),
    }
}

fn run_build(
    output: &str,
    split: bool,
    all_suffixes: bool,
    initial_capacity: usize,
    batch_items: usize,
) -> Result<()> {
    println!("[*] Reading fragments from stdin...");

    let started = Instant::now();
    let analysis_time = chrono::Utc::now().to_rfc3339();

    let config = TrieConfig { initial_capacity, ..TrieConfig::default() };
    let mut trie = acgtrie::Trie::with_config(config);

    let stdin = io::stdin();
    let batcher = FragmentBatchIterator::new(stdin.lock(), batch_items, 64 * 1024 * 1024);

    let mut fragments = 0u64;
    let mut total_len = 0u64;

    for batch in batcher {
        let batch = batch.context("failed to read a fragment batch from stdin")?;
        trie.begin_batch();
        for fragment in batch {
            fragments += 1;
            total_len += fragment.dna.len() as u64;

            if all_suffixes {
                trie.add_sequence(&fragment.dna, fragment.count).with_context(|| {
                    format!("failed to insert fragment {:?}", fragment.dna)
                })?;
            } else {
                let end = fragment.dna.len();
                trie.add_subsequence(&fragment.dna, 0, end, fragment.count).with_context(|| {
                    format!("failed to insert fragment {:?}", fragment.dna)
                })?;
            }
        }
        trie.end_batch();
        tracing::debug!(fragments, rows = trie.len(), "processed batch");
    }

    let fragment_avg_len = if fragments > 0 { total_len as f64 / fragments as f64 } else { 0.0 };
    let stats = BuildStats {
        fragments,
        fragment_avg_len,
        analysis_time,
        analysis_duration: started.elapsed().as_secs_f64(),
    };

    let out_path = Path::new(output);
    if split {
        acgtrie::serializer::save_split(out_path, &trie, &stats)
            .with_context(|| format!("failed to write split trie to {output}"))?;
    } else {
        let file = File::create(out_path).with_context(|| format!("failed to create {output}"))?;
        let mut writer = BufWriter::new(file);
        acgtrie::serializer::save(&mut writer, &trie, &stats)
            .with_context(|| format!("failed to write trie to {output}"))?;
    }

    println!("[+] Build finished.");
    println!("--------------------------------------------------");
    println!("    Fragments read:   {fragments}");
    println!("    Avg fragment len: {fragment_avg_len:.2}");
    println!("    Rows:             {}", trie.len());
    println!("    Elapsed:          {:.2}s", stats.analysis_duration);
    println!("    Output:           {output}{}", if split { " (.A/.C/.G/.T/.COUNT/.SEQ)" } else { "" });
    println!("--------------------------------------------------");
    Ok(())
}

fn run_lookup(input: &str, sequences: &[String]) -> Result<()> {
    let file = File::open(input).with_context(|| format!("failed to open trie file {input}"))?;
    let mut reader = BufReader::new(file);
    let (trie, header) = acgtrie::serializer::load(&mut reader)
        .with_context(|| format!("failed to load trie from {input}"))?;

    println!("[i] Loaded trie: {} rows, built {}", header.rows, header.analysis_time);

    let owned_stdin;
    let queries: &[String] = if sequences.is_empty() {
        let mut lines = Vec::new();
        for line in io::stdin().lines() {
            let line = line.context("failed to read a lookup sequence from stdin")?;
            let line = line.trim();
            if !line.is_empty() {
                lines.push(line.to_string());
            }
        }
        owned_stdin = lines;
        &owned_stdin
    } else {
        sequences
    };

    for seq in queries {
        match trie.count_of(seq) {
            Ok(count) => println!("{seq}\t{count}"),
            Err(e) => println!("{seq}\tERROR: {e}"),
        }
    }

    Ok(())
}
