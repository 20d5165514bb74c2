//! Two-segment compaction: merge the victims into a fresh segment, publish
//! it, retire the inputs, and delete them once in-flight readers have had
//! time to finish.

use std::cmp::Ordering;
use std::fs::File;
use std::io::{self, BufReader};

use crate::codec::Record;
use crate::config::Config;
use crate::dir::Directory;
use crate::error::Result;
use crate::segment::writer::SegmentWriter;

/// Outcome of one merge: the published output segment and the two retired
/// inputs awaiting deletion after the grace period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Merge {
    pub output: u64,
    pub retired: [u64; 2],
}

/// Picks the two victims: the smallest segment (by file size) at an even
/// position and the smallest at an odd position of the ascending-id
/// listing. The split guarantees two distinct segments without a global
/// sort by size.
fn pick_victims(dir: &Directory) -> Result<Option<(u64, u64)>> {
    let mut even: Option<(u64, u64)> = None; // (size, id)
    let mut odd: Option<(u64, u64)> = None;
    for (position, id) in dir.segment_ids()?.into_iter().enumerate() {
        let size = match std::fs::metadata(dir.segment_path(id)) {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
            Err(e) => return Err(e.into()),
        };
        let slot = if position % 2 == 0 { &mut even } else { &mut odd };
        match slot {
            Some((best, _)) if *best <= size => {}
            _ => *slot = Some((size, id)),
        }
    }
    match (even, odd) {
        (Some((_, a)), Some((_, b))) => Ok(Some((a, b))),
        _ => Ok(None),
    }
}

/// Runs one compaction round if the directory is eligible: no unavailable
/// marker anywhere (one means a publish or an earlier merge is still in
/// flight) and more than `compaction_threshold` segments on disk.
///
/// On a merge, the output is published before the inputs are retired, so
/// every key stays readable in at least one segment throughout; a key
/// briefly readable from both sides resolves to the same value by the
/// timestamp-max rule. The caller deletes the retired files after the
/// grace period.
pub fn run(dir: &Directory, config: &Config) -> Result<Option<Merge>> {
    if dir.any_marker()? {
        return Ok(None);
    }
    if dir.segment_ids()?.len() <= config.compaction_threshold {
        return Ok(None);
    }
    let Some((a, b)) = pick_victims(dir)? else {
        return Ok(None);
    };

    let output = dir.next_segment_id()?;
    let mut writer = SegmentWriter::create(dir, output, config.index_stride)?;
    let mut left = BufReader::new(File::open(dir.segment_path(a))?);
    let mut right = BufReader::new(File::open(dir.segment_path(b))?);

    // Two-way stream merge: one pending record per side, smaller key
    // first. Equal keys collapse to the higher timestamp, first input
    // winning ties.
    let mut pending_left = Record::read_from(&mut left)?;
    let mut pending_right = Record::read_from(&mut right)?;
    loop {
        match (pending_left.take(), pending_right.take()) {
            (None, None) => break,
            (Some(l), None) => {
                writer.append(&l)?;
                pending_left = Record::read_from(&mut left)?;
            }
            (None, Some(r)) => {
                writer.append(&r)?;
                pending_right = Record::read_from(&mut right)?;
            }
            (Some(l), Some(r)) => match l.key.cmp(&r.key) {
                Ordering::Less => {
                    writer.append(&l)?;
                    pending_left = Record::read_from(&mut left)?;
                    pending_right = Some(r);
                }
                Ordering::Greater => {
                    writer.append(&r)?;
                    pending_right = Record::read_from(&mut right)?;
                    pending_left = Some(l);
                }
                Ordering::Equal => {
                    writer.append(if l.timestamp >= r.timestamp { &l } else { &r })?;
                    pending_left = Record::read_from(&mut left)?;
                    pending_right = Record::read_from(&mut right)?;
                }
            },
        }
    }

    let records = writer.finish()?; // publish the output
    dir.create_marker(a)?; // then retire the inputs
    dir.create_marker(b)?;
    tracing::info!(output, records, retired_a = a, retired_b = b, "merged two segments");
    Ok(Some(Merge { output, retired: [a, b] }))
}

/// Deletes one retired segment: data file, index file, and marker.
pub fn remove_retired(dir: &Directory, id: u64) -> Result<()> {
    std::fs::remove_file(dir.segment_path(id))?;
    std::fs::remove_file(dir.index_path(id))?;
    dir.remove_marker(id)?;
    Ok(())
}

/// Deletes segments a previous run left behind under an unavailable
/// marker: either an unpublished merge output (its records still live in
/// the two inputs) or a retired input whose grace period never completed
/// (its records live in the published output). Both are safe to drop.
///
/// Runs at open only, before any background task starts, so it can never
/// race a transient marker from an in-flight publish.
pub fn sweep_stale(dir: &Directory) -> Result<usize> {
    let marked = dir.marker_ids()?;
    for &id in &marked {
        let segment = dir.segment_path(id);
        if segment.exists() {
            std::fs::remove_file(segment)?;
        }
        let index = dir.index_path(id);
        if index.exists() {
            std::fs::remove_file(index)?;
        }
        dir.remove_marker(id)?;
        tracing::warn!(segment = id, "swept stale unavailable segment");
    }
    Ok(marked.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::reader::lookup;
    use tempfile::TempDir;

    fn write_segment(dir: &Directory, id: u64, records: &[(&str, &str, u64)]) {
        let mut writer = SegmentWriter::create(dir, id, 1000).expect("create writer");
        for (key, value, timestamp) in records {
            writer
                .append(&Record {
                    key: key.as_bytes().to_vec(),
                    value: value.as_bytes().to_vec(),
                    timestamp: *timestamp,
                })
                .expect("append");
        }
        writer.finish().expect("finish");
    }

    fn test_config(dir: &Directory) -> Config {
        Config::new(dir.path()).compaction_threshold(2)
    }

    #[test]
    fn test_below_threshold_is_not_eligible() {
        let tmp = TempDir::new().expect("temp dir");
        let dir = Directory::new(tmp.path());
        write_segment(&dir, 0, &[("a", "1", 1)]);
        write_segment(&dir, 1, &[("b", "2", 2)]);

        assert_eq!(run(&dir, &test_config(&dir)).unwrap(), None);
    }

    #[test]
    fn test_marker_blocks_compaction() {
        let tmp = TempDir::new().expect("temp dir");
        let dir = Directory::new(tmp.path());
        for id in 0..4 {
            write_segment(&dir, id, &[("a", "1", 1)]);
        }
        dir.create_marker(9).unwrap();

        assert_eq!(run(&dir, &test_config(&dir)).unwrap(), None);
    }

    #[test]
    fn test_merge_publishes_then_retires() {
        let tmp = TempDir::new().expect("temp dir");
        let dir = Directory::new(tmp.path());
        write_segment(&dir, 0, &[("a", "1", 1), ("c", "3", 3)]);
        write_segment(&dir, 1, &[("b", "2", 2), ("d", "4", 4)]);
        write_segment(&dir, 2, &[("e", "5", 5)]);

        let merge = run(&dir, &test_config(&dir)).unwrap().expect("a merge ran");
        assert!(!dir.has_marker(merge.output));
        for id in merge.retired {
            assert!(dir.has_marker(id));
        }

        // Every key is still readable, from the output or the survivor.
        for (key, value) in [("a", "1"), ("b", "2"), ("c", "3"), ("d", "4"), ("e", "5")] {
            let hit = lookup(&dir, key.as_bytes()).unwrap().expect("key readable");
            assert_eq!(hit.value, value.as_bytes());
        }

        for id in merge.retired {
            remove_retired(&dir, id).unwrap();
            assert!(!dir.segment_path(id).exists());
            assert!(!dir.index_path(id).exists());
            assert!(!dir.has_marker(id));
        }
    }

    #[test]
    fn test_merge_resolves_duplicates_by_timestamp() {
        let tmp = TempDir::new().expect("temp dir");
        let dir = Directory::new(tmp.path());
        write_segment(&dir, 0, &[("k", "stale", 10), ("x", "left", 1)]);
        write_segment(&dir, 1, &[("k", "fresh", 20), ("y", "right", 2)]);
        // bulky enough that the even-position pick is segment 0, not 2
        let padding = "p".repeat(100);
        write_segment(&dir, 2, &[("z", padding.as_str(), 3)]);

        let merge = run(&dir, &test_config(&dir)).unwrap().expect("a merge ran");
        assert_eq!(merge.retired, [0, 1]);

        let bytes = std::fs::read(dir.segment_path(merge.output)).unwrap();
        let mut cursor = std::io::Cursor::new(bytes.as_slice());
        let mut merged = Vec::new();
        while let Some(record) = Record::read_from(&mut cursor).unwrap() {
            merged.push((record.key, record.value, record.timestamp));
        }
        assert_eq!(
            merged,
            vec![
                (b"k".to_vec(), b"fresh".to_vec(), 20),
                (b"x".to_vec(), b"left".to_vec(), 1),
                (b"y".to_vec(), b"right".to_vec(), 2),
            ]
        );
    }

    #[test]
    fn test_victims_are_smallest_of_even_and_odd_positions() {
        let tmp = TempDir::new().expect("temp dir");
        let dir = Directory::new(tmp.path());
        let big: Vec<(String, String, u64)> = (0..20)
            .map(|i| (format!("k{i:02}"), "x".repeat(40), i as u64))
            .collect();
        let big_refs: Vec<(&str, &str, u64)> =
            big.iter().map(|(k, v, t)| (k.as_str(), v.as_str(), *t)).collect();

        // positions 0..4 hold ids 0..4; small segments at ids 2 and 3
        write_segment(&dir, 0, &big_refs);
        write_segment(&dir, 1, &big_refs);
        write_segment(&dir, 2, &[("small-even", "1", 1)]);
        write_segment(&dir, 3, &[("small-odd", "2", 2)]);
        write_segment(&dir, 4, &big_refs);

        let merge = run(&dir, &test_config(&dir)).unwrap().expect("a merge ran");
        assert_eq!(merge.retired, [2, 3]);
        // the smallest free id is 5 only because 0..4 are taken
        assert_eq!(merge.output, 5);
    }

    #[test]
    fn test_sweep_stale_removes_marked_segments() {
        let tmp = TempDir::new().expect("temp dir");
        let dir = Directory::new(tmp.path());
        write_segment(&dir, 0, &[("keep", "1", 1)]);
        write_segment(&dir, 1, &[("drop", "2", 2)]);
        dir.create_marker(1).unwrap();
        dir.create_marker(8).unwrap(); // marker with no files at all

        assert_eq!(sweep_stale(&dir).unwrap(), 2);
        assert!(dir.segment_path(0).exists());
        assert!(!dir.segment_path(1).exists());
        assert!(!dir.index_path(1).exists());
        assert!(!dir.any_marker().unwrap());
    }
}
