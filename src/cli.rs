// src/cli.rs
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "acgtrie", author, version, about, long_about = None)]
#[command(propagate_version = true)]
#[command(help_template = "\
{before-help}{name} v{version}
{author-with-newline}{about-with-newline}
{usage-heading}
{usage}

{all-args}{after-help}
")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build a trie from CSV `DNA,count` (or bare `DNA`) lines on stdin.
    Build {
        /// Output path. Written as one combined file unless --split.
        #[arg(short, long, default_value = "acgtrie.out", value_name = "OUTPUT")]
        output: String,

        /// Write the legacy six-file layout (<output>.A .C .G .T .COUNT .SEQ)
        /// instead of one combined file.
        #[arg(long)]
        split: bool,

        /// Also insert every suffix of each fragment, not just the fragment
        /// itself. Use when stdin has not already been pre-fragmented by an
        /// external preprocessor.
        #[arg(long)]
        all_suffixes: bool,

        /// Rows to pre-allocate before the first growth event.
        #[arg(long, default_value_t = 1024, value_name = "ROWS")]
        initial_capacity: usize,

        /// Fragments per read batch.
        #[arg(long, default_value_t = 100_000, value_name = "N")]
        batch_items: usize,
    },

    /// Load a saved trie and report the count for one or more sequences.
    Lookup {
        /// Path to a trie file written by `build`.
        #[arg(value_name = "TRIE_FILE")]
        input: String,

        /// DNA sequences to look up. Reads from stdin (one per line) if omitted.
        #[arg(value_name = "SEQUENCE")]
        sequences: Vec<String>,
    },
}
