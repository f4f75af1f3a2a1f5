///! # CLI - CascadeKV Interactive Shell
///!
///! A REPL-style command-line interface for the CascadeKV storage engine.
///! Reads commands from stdin, executes them against the tree, and prints
///! results to stdout. Designed for both interactive use and scripted testing
///! (pipe commands via stdin).
///!
///! ## Commands
///!
///! ```text
///! SET key value      Insert or update a key-value pair
///! GET key            Look up a key (prints value or "(nil)")
///! DEL key            Delete a key (writes a tombstone)
///! SCAN [start] [end] Range scan (inclusive start, exclusive end)
///! FLUSH              Force flush the nursery to a level-0 file
///! STATS              Print tree debug info
///! EXIT / QUIT        Shut down gracefully
///! ```
///!
///! ## Configuration
///!
///! All settings are controlled via environment variables:
///!
///! ```text
///! CASCADE_DIR          Tree directory              (default: "data")
///! CASCADE_NURSERY_MAX  Nursery record bound        (default: 256)
///! CASCADE_LOG_SYNC     fsync every log append      (default: "true")
///! CASCADE_CHUNK        Async fold chunk size       (default: 100)
///! ```
///!
///! ## Example
///!
///! ```text
///! $ cargo run -p cli
///! CascadeKV started (dir=data, nursery_max=256, log_sync=true)
///! > SET name Alice
///! OK
///! > GET name
///! Alice
///! > SCAN
///! name -> Alice
///! (1 entries)
///! > EXIT
///! bye
///! ```

use anyhow::Result;
use engine::{Range, Tree, TreeOptions};
use std::io::{self, BufRead, Write};

/// Reads a configuration value from the environment, falling back to `default`.
fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Builds the scan range from optional start (inclusive) and end (exclusive)
/// arguments; an empty string leaves the side unbounded.
fn scan_range(start: &str, end: &str) -> Range {
    let from = (!start.is_empty()).then(|| start.as_bytes().to_vec());
    let to = (!end.is_empty()).then(|| end.as_bytes().to_vec());
    Range::new(from, to)
}

fn main() -> Result<()> {
    let dir = env_or("CASCADE_DIR", "data");
    let nursery_max: usize = env_or("CASCADE_NURSERY_MAX", "256").parse().unwrap_or(256);
    let log_sync: bool = env_or("CASCADE_LOG_SYNC", "true").parse().unwrap_or(true);
    let chunk_size: usize = env_or("CASCADE_CHUNK", "100").parse().unwrap_or(100);

    let opts = TreeOptions {
        nursery_max,
        log_sync,
        chunk_size,
        ..TreeOptions::default()
    };
    let mut tree = Tree::open_with(&dir, opts)?;

    println!(
        "CascadeKV started (dir={}, nursery_max={}, log_sync={})",
        dir, nursery_max, log_sync
    );
    println!("Commands: SET key value | GET key | DEL key | SCAN [start] [end]");
    println!("          FLUSH | STATS | EXIT");
    print!("> ");
    io::stdout().flush().ok();

    let stdin = io::stdin();

    for line in stdin.lock().lines() {
        let line = line?;
        let mut parts = line.split_whitespace();
        if let Some(cmd) = parts.next() {
            match cmd.to_uppercase().as_str() {
                "SET" => {
                    if let Some(k) = parts.next() {
                        let v: String = parts.collect::<Vec<&str>>().join(" ");
                        if v.is_empty() {
                            println!("ERR usage: SET key value");
                        } else {
                            match tree.put(k.as_bytes().to_vec(), v.as_bytes().to_vec()) {
                                Ok(()) => println!("OK"),
                                Err(e) => println!("ERR set failed: {}", e),
                            }
                        }
                    } else {
                        println!("ERR usage: SET key value");
                    }
                }
                "GET" => {
                    if let Some(k) = parts.next() {
                        match tree.lookup(k.as_bytes()) {
                            Ok(Some(v)) => println!("{}", String::from_utf8_lossy(&v)),
                            Ok(None) => println!("(nil)"),
                            Err(e) => println!("ERR read failed: {}", e),
                        }
                    } else {
                        println!("ERR usage: GET key");
                    }
                }
                "DEL" => {
                    if let Some(k) = parts.next() {
                        match tree.delete(k.as_bytes().to_vec()) {
                            Ok(()) => println!("OK"),
                            Err(e) => println!("ERR del failed: {}", e),
                        }
                    } else {
                        println!("ERR usage: DEL key");
                    }
                }
                "SCAN" => {
                    let start = parts.next().unwrap_or("");
                    let end = parts.next().unwrap_or("");
                    match tree.sync_range(&scan_range(start, end)) {
                        Ok(results) => {
                            if results.is_empty() {
                                println!("(empty)");
                            } else {
                                for (k, v) in &results {
                                    println!(
                                        "{} -> {}",
                                        String::from_utf8_lossy(k),
                                        String::from_utf8_lossy(v)
                                    );
                                }
                                println!("({} entries)", results.len());
                            }
                        }
                        Err(e) => println!("ERR scan failed: {}", e),
                    }
                }
                "FLUSH" => match tree.force_flush() {
                    Ok(()) => println!(
                        "OK (depth={}, files={})",
                        tree.depth(),
                        tree.file_count()
                    ),
                    Err(e) => println!("ERR flush failed: {}", e),
                },
                "STATS" => {
                    println!("{:?}", tree);
                }
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

    tree.close()?;
    Ok(())
}
