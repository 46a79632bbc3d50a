//! Touch-v2: per-path event counts in dynamically allocated circular
//! buffers, bucketed by wall-clock time modulo the period.
//!
//! The file is a header followed by one block per (path, period) set; each
//! block is a small set header and `samplesPerSet` 32-bit counts. Counts are
//! absolute per bucket, addressed by `(epoch / secondsPerSample) mod
//! samplesPerSet`. The whole file is memory-mapped for the duration of one
//! operation; growth is `posix_fallocate` plus a fresh mapping, and every
//! write ends with a garbage-collection pass that evicts sets idle for
//! longer than their ring spans and truncates the file.
//!
//! All multi-byte fields go through the little-endian accessors in
//! [`crate::codec`]; nothing here depends on host byte order or struct
//! layout.

use std::fs::File;
use std::io::Write;

use crate::codec::{self, i64_at, put_i64_at, put_u32_at, u32_at};
use crate::error::{Error, Result};
use crate::ffi;
use crate::period::Period;

use map::Map;

mod map;
#[cfg(test)]
mod test;

pub const DEFAULT_MAX_SETS: u32 = 50;
pub const DEFAULT_SAMPLES_PER_SET: u32 = 2000;
/// On-disk size of a path, NUL padding included.
pub const PATH_LEN: usize = 100;

// header: version u32, sets u32, samplesPerSet u32
const HEADER_LEN: usize = 12;
const SETS_OFF: usize = 4;
const SPS_OFF: usize = 8;

// set block header: lastTouch i64, path [u8; 100], period u32
const SET_LAST_TOUCH: usize = 0;
const SET_PATH: usize = 8;
const SET_PERIOD: usize = 108;
const SET_HEADER_LEN: usize = 112;

#[derive(Clone, Copy, Debug)]
struct Layout {
    sets: u32,
    samples_per_set: u32,
}

impl Layout {
    fn read(bytes: &[u8]) -> Result<Layout> {
        if bytes.len() < HEADER_LEN {
            return Err(Error::Corrupt("touch header short"));
        }
        if u32_at(bytes, 0) != codec::VERSION_TOUCH_V2 {
            return Err(Error::UnknownVersion);
        }
        let layout = Layout {
            sets: u32_at(bytes, SETS_OFF),
            samples_per_set: u32_at(bytes, SPS_OFF),
        };
        if layout.samples_per_set == 0 {
            return Err(Error::Corrupt("zero samples per set"));
        }
        // trailing bytes can outlive an interrupted grow; the next
        // collection pass truncates them away
        if bytes.len() < layout.file_len() {
            return Err(Error::Corrupt("touch image shorter than its header claims"));
        }
        Ok(layout)
    }

    fn block_len(&self) -> usize {
        SET_HEADER_LEN + 4 * self.samples_per_set as usize
    }

    fn set_off(&self, index: u32) -> usize {
        HEADER_LEN + index as usize * self.block_len()
    }

    fn file_len(&self) -> usize {
        HEADER_LEN + self.sets as usize * self.block_len()
    }
}

fn map_whole(file: &File) -> Result<(Map, Layout)> {
    let len = file.metadata()?.len() as usize;
    if len < HEADER_LEN {
        return Err(Error::Corrupt("touch header short"));
    }
    let map = Map::new(file, len)?;
    let layout = Layout::read(map.bytes())?;
    Ok((map, layout))
}

fn path_matches(bytes: &[u8], off: usize, path: &str) -> bool {
    let stored = &bytes[off + SET_PATH..off + SET_PATH + PATH_LEN];
    let end = stored.iter().position(|b| *b == 0).unwrap_or(PATH_LEN);
    &stored[..end] == path.as_bytes()
}

fn path_str(bytes: &[u8], off: usize) -> String {
    let stored = &bytes[off + SET_PATH..off + SET_PATH + PATH_LEN];
    let end = stored.iter().position(|b| *b == 0).unwrap_or(PATH_LEN);
    String::from_utf8_lossy(&stored[..end]).into_owned()
}

/// Seconds per bucket of the set at `off`. An unrecognized stored period
/// reads as one day.
fn tps_at(bytes: &[u8], off: usize) -> i64 {
    Period::from_wire(u32_at(bytes, off + SET_PERIOD))
        .unwrap_or(Period::OneDay)
        .seconds_per_sample()
}

fn bucket_index(t: i64, tps: i64, samples_per_set: u32) -> usize {
    t.div_euclid(tps).rem_euclid(samples_per_set as i64) as usize
}

/// Clear the buckets skipped since the previous touch, then count one event
/// in the bucket holding `now`. `counts` is the raw little-endian count
/// region of one set.
///
/// A gap of a whole ring or more resets every bucket. A shorter gap clears
/// the skipped range; when the range wraps the end of the ring the two
/// pieces are cleared separately, leaving the still-live span between the
/// current and previous bucket untouched.
fn update_buckets(counts: &mut [u8], samples_per_set: u32, last: i64, now: i64, tps: i64) {
    let sps = samples_per_set as i64;
    let now_steps = now.div_euclid(tps);
    let last_steps = last.div_euclid(tps);
    let now_idx = now_steps.rem_euclid(sps) as usize;
    let last_idx = last_steps.rem_euclid(sps) as usize;
    let gap = now_steps - last_steps;

    if gap >= sps {
        counts.fill(0);
    } else if gap > 1 {
        if now_idx > last_idx {
            zero_counts(counts, 0, now_idx);
            zero_counts(counts, last_idx + 1, samples_per_set as usize);
        } else {
            zero_counts(counts, last_idx + 1, samples_per_set as usize);
            zero_counts(counts, 0, now_idx);
        }
    }

    let off = 4 * now_idx;
    put_u32_at(counts, off, u32_at(counts, off).wrapping_add(1));
}

fn zero_counts(counts: &mut [u8], from: usize, to: usize) {
    counts[4 * from..4 * to].fill(0);
}

fn init_set(bytes: &mut [u8], off: usize, layout: Layout, now: i64, path: &str, period: Period) {
    put_i64_at(bytes, off + SET_LAST_TOUCH, now);
    let stored = &mut bytes[off + SET_PATH..off + SET_PATH + PATH_LEN];
    stored.fill(0);
    stored[..path.len()].copy_from_slice(path.as_bytes());
    put_u32_at(bytes, off + SET_PERIOD, period as u32);

    let counts = &mut bytes[off + SET_HEADER_LEN..off + layout.block_len()];
    counts.fill(0);
    let idx = bucket_index(now, period.seconds_per_sample(), layout.samples_per_set);
    put_u32_at(counts, 4 * idx, 1);
}

/// Create the header of an empty file; reject anything that is not a touch
/// file.
fn ensure_header(file: &File, samples_per_set: u32) -> Result<()> {
    let len = file.metadata()?.len();
    if len == 0 {
        ffi::fallocate(file, 0, HEADER_LEN as u64)?;
        let mut map = Map::new(file, HEADER_LEN)?;
        let bytes = map.bytes_mut();
        put_u32_at(bytes, 0, codec::VERSION_TOUCH_V2);
        put_u32_at(bytes, SETS_OFF, 0);
        put_u32_at(bytes, SPS_OFF, samples_per_set);
        return Ok(());
    }
    if len < HEADER_LEN as u64 {
        return Err(Error::Corrupt("touch header short"));
    }
    let map = Map::new(file, HEADER_LEN)?;
    if u32_at(map.bytes(), 0) != codec::VERSION_TOUCH_V2 {
        return Err(Error::UnknownVersion);
    }
    Ok(())
}

/// Count one event at `now` for every `(path component, period)` pair, then
/// collect stale sets and shrink the file.
///
/// `path` is slash-separated; each component is its own counted set.
/// `periods` is a comma-separated list of period names; unknown names count
/// as one hour. Zero `max_sets` or `samples_per_set` pick the defaults.
pub fn touch(
    file: &File,
    now: i64,
    path: &str,
    periods: &str,
    max_sets: u32,
    samples_per_set: u32,
) -> Result<()> {
    let max_sets = if max_sets == 0 { DEFAULT_MAX_SETS } else { max_sets };
    let samples_per_set = if samples_per_set == 0 {
        DEFAULT_SAMPLES_PER_SET
    } else {
        samples_per_set
    };

    ensure_header(file, samples_per_set)?;

    let mut parsed: Vec<Period> = periods
        .split(',')
        .filter(|p| !p.is_empty())
        .map(Period::parse_or_hour)
        .collect();
    if parsed.is_empty() {
        parsed.push(Period::OneHour);
    }

    for component in path.split('/').filter(|c| !c.is_empty()) {
        if component.len() >= PATH_LEN {
            return Err(Error::input(format!(
                "touch path component {component:?} is too long"
            )));
        }
        for period in &parsed {
            touch_one(file, now, component, *period, max_sets)?;
        }
    }

    collect_stale(file, now)
}

fn touch_one(file: &File, now: i64, path: &str, period: Period, max_sets: u32) -> Result<()> {
    let (mut map, layout) = map_whole(file)?;
    let block = layout.block_len();

    let mut oldest: Option<(u32, i64)> = None;
    for i in 0..layout.sets {
        let off = layout.set_off(i);
        let last = i64_at(map.bytes(), off + SET_LAST_TOUCH);
        if oldest.map_or(true, |(_, t)| last < t) {
            oldest = Some((i, last));
        }
        let bytes = map.bytes();
        if !path_matches(bytes, off, path) || u32_at(bytes, off + SET_PERIOD) != period as u32 {
            continue;
        }

        let bytes = map.bytes_mut();
        let counts = &mut bytes[off + SET_HEADER_LEN..off + block];
        update_buckets(counts, layout.samples_per_set, last, now, period.seconds_per_sample());
        put_i64_at(bytes, off + SET_LAST_TOUCH, now);
        return Ok(());
    }

    if layout.sets >= max_sets {
        if let Some((index, last)) = oldest {
            tracing::debug!(index, last_touch = last, "reusing oldest touch set");
            init_set(map.bytes_mut(), layout.set_off(index), layout, now, path, period);
            return Ok(());
        }
    }

    // no match: grow by one block and claim it; the header learns about
    // the new set only once the space exists
    let old_len = layout.file_len();
    drop(map);
    ffi::fallocate(file, old_len as u64, block as u64)?;
    let mut map = Map::new(file, old_len + block)?;
    put_u32_at(map.bytes_mut(), SETS_OFF, layout.sets + 1);
    init_set(map.bytes_mut(), old_len, layout, now, path, period);
    Ok(())
}

/// Evict every set whose last touch is older than the span its ring covers.
/// The last set is swapped into the hole and the scan restarts until a full
/// pass removes nothing; the file is then truncated to the surviving sets.
fn collect_stale(file: &File, now: i64) -> Result<()> {
    let (mut map, layout) = map_whole(file)?;
    let block = layout.block_len();
    let mut sets = layout.sets;
    let mut removed = 0u32;

    'scan: loop {
        for i in 0..sets {
            let off = HEADER_LEN + i as usize * block;
            let bytes = map.bytes();
            let last = i64_at(bytes, off + SET_LAST_TOUCH);
            let span = tps_at(bytes, off) * layout.samples_per_set as i64;
            if last < now - span {
                let last_off = HEADER_LEN + (sets - 1) as usize * block;
                if off != last_off {
                    map.bytes_mut().copy_within(last_off..last_off + block, off);
                }
                sets -= 1;
                removed += 1;
                continue 'scan;
            }
        }
        break;
    }

    if removed > 0 {
        tracing::debug!(removed, remaining = sets, "evicted stale touch sets");
        put_u32_at(map.bytes_mut(), SETS_OFF, sets);
        drop(map);
        ffi::ftruncate(file, (HEADER_LEN + sets as usize * block) as u64)?;
    }
    Ok(())
}

/// Print the non-empty buckets of the set matching `(path, period)` as
/// `sec:count`, newest bucket first, labelled by bucket start. Buckets
/// older than the last touch by a whole ring are not shown. An empty path
/// matches the first set with the right period.
pub fn write_samples(
    file: &File,
    now: i64,
    path: &str,
    period_name: &str,
    out: &mut dyn Write,
) -> Result<()> {
    let period = Period::parse_or_hour(period_name);
    let (map, layout) = map_whole(file)?;
    let bytes = map.bytes();

    for i in 0..layout.sets {
        let off = layout.set_off(i);
        if !path.is_empty() && !path_matches(bytes, off, path) {
            continue;
        }
        if u32_at(bytes, off + SET_PERIOD) != period as u32 {
            continue;
        }

        let tps = period.seconds_per_sample();
        let sps = layout.samples_per_set as i64;
        let last = i64_at(bytes, off + SET_LAST_TOUCH);
        let missing = now.div_euclid(tps) - last.div_euclid(tps);
        let emit = (sps - missing).clamp(0, sps);

        let mut sample_time = last.div_euclid(tps) * tps;
        for _ in 0..emit {
            let idx = bucket_index(sample_time, tps, layout.samples_per_set);
            let count = u32_at(bytes, off + SET_HEADER_LEN + 4 * idx);
            if count != 0 {
                writeln!(out, "{sample_time}:{count}")?;
            }
            sample_time -= tps;
        }
        break;
    }
    Ok(())
}

/// Print `2:sets:samplesPerSet`, then `path:secondsPerSample` per set.
pub fn write_info(file: &File, out: &mut dyn Write) -> Result<()> {
    let (map, layout) = map_whole(file)?;
    let bytes = map.bytes();
    writeln!(out, "2:{}:{}", layout.sets, layout.samples_per_set)?;
    for i in 0..layout.sets {
        let off = layout.set_off(i);
        writeln!(out, "{}:{}", path_str(bytes, off), tps_at(bytes, off))?;
    }
    Ok(())
}
