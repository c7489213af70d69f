//! Buffer pipeline: one round of reading, parallel parsing, and residue
//! stitching (C4).

use std::io::Read;
use std::sync::Mutex;

use crate::error::TailError;
use crate::model::Entry;
use crate::parser;
use crate::pool::{BufferPool, EntryPool};
use crate::queue::EntryQueue;

/// Runs one round: drains `reader` into pooled buffers, parses each slab
/// concurrently, stitches residues across slab boundaries, and appends the
/// round's sorted entries to `queue`. Returns the new leftover bytes to
/// carry into the next round.
///
/// A read error other than end-of-stream ends the read loop the same way
/// end-of-stream does (matching the reference's `if err == io.EOF || err
/// != nil { break }`): the fault is logged and the round proceeds with
/// whatever slabs were already read, rather than aborting the tick loop.
pub fn run_round<R: Read>(
    reader: &mut R,
    buffer_pool: &BufferPool,
    entry_pool: &EntryPool,
    queue: &EntryQueue,
    leftover: Vec<u8>,
) -> Result<Vec<u8>, TailError> {
    let mut slabs: Vec<Vec<u8>> = Vec::new();
    loop {
        let mut buf = buffer_pool.get();
        match reader.read(&mut buf) {
            Ok(0) => {
                buffer_pool.recycle(buf);
                break;
            }
            Ok(n) => {
                buf.truncate(n);
                slabs.push(buf);
            }
            Err(err) => {
                tracing::error!(%err, "read fault, ending round early");
                buffer_pool.recycle(buf);
                break;
            }
        }
    }

    // Position 0 is reserved for the previous round's leftover; workers
    // claim positions 1..=slabs.len() in reading order.
    let (mut combined, residues) = std::thread::scope(|scope| {
        let residue_map: Mutex<Vec<Option<Vec<u8>>>> = Mutex::new(vec![None; slabs.len() + 1]);
        residue_map.lock().expect("residue map lock poisoned")[0] = Some(leftover);

        let handles: Vec<_> = slabs
            .iter()
            .enumerate()
            .map(|(i, slab)| {
                let position = i + 1;
                let residue_map = &residue_map;
                scope.spawn(move || {
                    let mut local_entries = Vec::new();
                    let residue = extract_lines(slab, entry_pool, &mut local_entries);
                    residue_map.lock().expect("residue map lock poisoned")[position] =
                        Some(residue);
                    local_entries
                })
            })
            .collect();

        let mut combined = Vec::new();
        for h in handles {
            combined.extend(h.join().expect("pipeline worker thread panicked"));
        }

        let residues = residue_map.into_inner().expect("residue map lock poisoned");
        (combined, residues)
    });

    for buf in slabs {
        buffer_pool.recycle(buf);
    }

    let mut concat = Vec::new();
    for residue in residues.into_iter().flatten() {
        concat.extend_from_slice(&residue);
    }

    let stitched = extract_lines(&concat, entry_pool, &mut combined);
    let leftover = extract_line(&stitched, entry_pool, &mut combined);

    combined.sort_by_key(|e| e.timestamp());
    queue.add_sorted_batch(combined);

    Ok(leftover)
}

/// Locates the head fragment (through the first `\n`), the tail fragment
/// (after the last `\n`), and parses every complete line strictly between
/// them. Returns `head + tail` as the slab's residue. A slab with zero or
/// one newline is returned unchanged as residue.
fn extract_lines(slab: &[u8], entry_pool: &EntryPool, out: &mut Vec<Entry>) -> Vec<u8> {
    let Some(first_nl) = slab.iter().position(|&b| b == b'\n') else {
        return slab.to_vec();
    };
    let last_nl = slab.iter().rposition(|&b| b == b'\n').unwrap();

    if first_nl == last_nl {
        return slab.to_vec();
    }

    let head = &slab[..=first_nl];
    let tail = &slab[last_nl + 1..];
    let between = &slab[first_nl + 1..last_nl]; // excludes both boundary newlines

    for line in between.split(|&b| b == b'\n') {
        parse_and_push(line, entry_pool, out);
    }

    let mut residue = Vec::with_capacity(head.len() + tail.len());
    residue.extend_from_slice(head);
    residue.extend_from_slice(tail);
    residue
}

/// Parses the single complete line at the front of `residue`, if any, and
/// returns the bytes after it. Returns `residue` unchanged if it contains
/// no newline.
fn extract_line(residue: &[u8], entry_pool: &EntryPool, out: &mut Vec<Entry>) -> Vec<u8> {
    match residue.iter().position(|&b| b == b'\n') {
        Some(idx) => {
            parse_and_push(&residue[..idx], entry_pool, out);
            residue[idx + 1..].to_vec()
        }
        None => residue.to_vec(),
    }
}

fn parse_and_push(line: &[u8], entry_pool: &EntryPool, out: &mut Vec<Entry>) {
    if line.is_empty() {
        return;
    }
    let mut entry = entry_pool.get();
    match parser::parse_line(line, &mut entry) {
        Ok(()) => out.push(entry),
        Err(err) => {
            tracing::warn!(%err, "dropping unparseable log line");
            entry_pool.recycle(entry);
        }
    }
}
