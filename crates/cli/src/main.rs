//! # CLI - spilling sorted set shell
//!
//! A REPL-style command-line interface over a
//! [`DistributedSpillingSortedSet`] of strings. Reads commands from stdin,
//! runs them against the set, and prints results to stdout. Works both
//! interactively and scripted (pipe commands via stdin).
//!
//! ## Commands
//!
//! ```text
//! ADD value          Insert a value (the rest of the line)
//! CONTAINS value     Print "true" or "false"
//! REMOVE value       Remove a value wherever it is stored
//! FIRST / LAST       Smallest / largest value, or "(empty)"
//! SIZE               Number of distinct values
//! SCAN [from] [to]   Values in order, optionally limited to [from, to)
//! PERSIST            Write the in-memory buffer out as a segment
//! COMPACT [max]      Compact segments down to `max` (default SPILL_MAX_SEGMENTS)
//! STATS              Print set debug info
//! CLEAR              Remove every value and segment file
//! EXIT / QUIT        Shut down
//! ```
//!
//! ## Configuration
//!
//! ```text
//! SPILL_DIR          segment directory                 (default: "data/spill")
//! SPILL_THRESHOLD    buffered values before a persist  (default: 1000)
//! SPILL_MAX_SEGMENTS segments before compaction        (default: 100, 0 = off)
//! SPILL_RETRIES      retries per persist               (default: 2)
//! SPILL_VERIFY       verify every written segment      (default: "true")
//! RUST_LOG           log filter                        (default: "warn")
//! ```
//!
//! ## Example
//!
//! ```text
//! $ cargo run -p cli
//! spillset started (dir=data/spill, threshold=1000, max_segments=100, recovered=0)
//! > ADD banana
//! OK
//! > ADD apple
//! OK
//! > SCAN
//! apple
//! banana
//! (2 entries)
//! > EXIT
//! bye
//! ```

use std::io::{self, BufRead, Write};
use std::sync::Arc;

use anyhow::Result;
use config::{PersistOptions, SpillConfig};
use sortedset::{DirectoryHandleFactory, SortOrder, SortedSet, SortedSetError};
use spillset::DistributedSpillingSortedSet;
use tracing_subscriber::EnvFilter;

/// Reads a configuration value from the environment, falling back to `default`.
fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Prints a fetched end value, or `(empty)` for an empty set.
fn print_end(result: sortedset::Result<String>) {
    match result {
        Ok(v) => println!("{}", v),
        Err(SortedSetError::NoSuchElement(_)) => println!("(empty)"),
        Err(e) => println!("ERR read failed: {}", e),
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("warn"))?,
        )
        .with_writer(io::stderr)
        .init();

    let dir = env_or("SPILL_DIR", "data/spill");
    let threshold: usize = env_or("SPILL_THRESHOLD", "1000").parse().unwrap_or(1000);
    let max_segments: usize = env_or("SPILL_MAX_SEGMENTS", "100").parse().unwrap_or(100);
    let retries: usize = env_or("SPILL_RETRIES", "2").parse().unwrap_or(2);
    let verify: bool = env_or("SPILL_VERIFY", "true").parse().unwrap_or(true);

    let config = SpillConfig::default()
        .with_buffer_persist_threshold(threshold)
        .with_max_open_segments(max_segments)
        .with_retries_per_factory(retries)
        .with_persist_options(PersistOptions::verify(verify));
    let factory = Arc::new(DirectoryHandleFactory::local(&dir));
    let mut set = DistributedSpillingSortedSet::new(SortOrder::natural(), None, factory, config)?;

    println!(
        "spillset started (dir={}, threshold={}, max_segments={}, recovered={})",
        dir,
        threshold,
        max_segments,
        set.segment_count()
    );
    println!("Commands: ADD v | CONTAINS v | REMOVE v | FIRST | LAST | SIZE | SCAN [from] [to]");
    println!("          PERSIST | COMPACT [max] | STATS | CLEAR | EXIT");
    print!("> ");
    io::stdout().flush().ok();

    let stdin = io::stdin();

    for line in stdin.lock().lines() {
        let line = line?;
        let mut parts = line.split_whitespace();
        if let Some(cmd) = parts.next() {
            let rest = parts.clone().collect::<Vec<&str>>().join(" ");
            match cmd.to_uppercase().as_str() {
                "ADD" => {
                    if rest.is_empty() {
                        println!("ERR usage: ADD value");
                    } else {
                        match set.add(rest) {
                            Ok(_) => println!("OK"),
                            Err(e) => println!("ERR add failed: {}", e),
                        }
                    }
                }
                "CONTAINS" => {
                    if rest.is_empty() {
                        println!("ERR usage: CONTAINS value");
                    } else {
                        match set.contains(&rest) {
                            Ok(found) => println!("{}", found),
                            Err(e) => println!("ERR read failed: {}", e),
                        }
                    }
                }
                "REMOVE" => {
                    if rest.is_empty() {
                        println!("ERR usage: REMOVE value");
                    } else {
                        match set.remove(&rest) {
                            Ok(true) => println!("OK"),
                            Ok(false) => println!("(not found)"),
                            Err(e) => println!("ERR remove failed: {}", e),
                        }
                    }
                }
                "FIRST" => print_end(set.first()),
                "LAST" => print_end(set.last()),
                "SIZE" => match set.len() {
                    Ok(n) => println!("{}", n),
                    Err(e) => println!("ERR read failed: {}", e),
                },
                "SCAN" => {
                    let from = parts.next().map(str::to_string);
                    let to = parts.next().map(str::to_string);
                    match set.iter() {
                        Ok(values) => {
                            let mut shown = 0usize;
                            for value in values {
                                let value = match value {
                                    Ok(v) => v,
                                    Err(e) => {
                                        println!("ERR scan failed: {}", e);
                                        break;
                                    }
                                };
                                if from.as_ref().is_some_and(|f| &value < f) {
                                    continue;
                                }
                                if to.as_ref().is_some_and(|t| &value >= t) {
                                    break;
                                }
                                println!("{}", value);
                                shown += 1;
                            }
                            if shown == 0 {
                                println!("(empty)");
                            } else {
                                println!("({} entries)", shown);
                            }
                        }
                        Err(e) => println!("ERR scan failed: {}", e),
                    }
                }
                "PERSIST" => match set.persist() {
                    Ok(()) => println!("OK (segments={})", set.segment_count()),
                    Err(e) => println!("ERR persist failed: {}", e),
                },
                "COMPACT" => {
                    let max = parts
                        .next()
                        .and_then(|m| m.parse().ok())
                        .unwrap_or(max_segments.max(1));
                    match set.compact(max) {
                        Ok(()) => println!("OK (segments={})", set.segment_count()),
                        Err(e) => println!("ERR compact failed: {}", e),
                    }
                }
                "STATS" => {
                    println!("{:?}", set);
                }
                "CLEAR" => match set.clear() {
                    Ok(()) => println!("OK"),
                    Err(e) => println!("ERR clear failed: {}", e),
                },
                "EXIT" | "QUIT" => {
                    println!("bye");
                    break;
                }
                other => {
                    println!("unknown command: {}", other);
                }
            }
        }

        print!("> ");
        io::stdout().flush().ok();
    }

    Ok(())
}
