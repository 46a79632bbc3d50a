//! RRDB-v1: a fixed-shape sample ring with derived aggregate streams.
//!
//! One file holds a time column, up to [`MAX_SETS`] parallel value columns
//! sharing that time column, and up to [`MAX_XFORMS`] aggregate streams.
//! Every update advances the main write cursor and folds the new sample
//! into each stream's calendar-aligned window, then the whole image is
//! rewritten in place. The record owns its columns as indexed arrays; slot
//! addressing goes through [`Ring`] and nothing hands out raw offsets.

use std::io::{self, Write};

use arrayvec::ArrayVec;

use crate::codec::{self, Reader, Writer};
use crate::error::{Error, Result};
use crate::period::Period;
use crate::reducer::Reducer;
use crate::ring::Ring;


/// Most value sets one file can carry.
pub const MAX_SETS: usize = 20;
/// Most aggregate streams per set, five per set across twenty sets.
pub const MAX_XFORMS_PER_SET: usize = 5;
/// Most aggregate streams one file can carry.
pub const MAX_XFORMS: usize = MAX_SETS * MAX_XFORMS_PER_SET;

/// One slot of a time column. A slot is valid once it has been written
/// since file creation; invalid slots are skipped when printing.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TimePoint {
    pub secs: i64,
    pub micros: u32,
    pub valid: bool,
}

/// A wall-clock reading taken after the file lock was acquired, so write
/// order on any single file equals lock-acquisition order.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WallTime {
    pub secs: i64,
    pub micros: u32,
}

/// One aggregate stream: a reducer folded over calendar windows of one
/// source set, stored in its own ring of the shared sample count.
#[derive(Clone, Debug, PartialEq)]
pub struct Xform {
    pub reducer: Reducer,
    pub period: Period,
    pub set_index: u32,
    pub window_position: u32,
    pub times: Vec<TimePoint>,
    pub data: Vec<f64>,
}

impl Xform {
    fn new(reducer: Reducer, period: Period, set_index: u32, sample_count: u32) -> Xform {
        Xform {
            reducer,
            period,
            set_index,
            window_position: 0,
            times: vec![TimePoint::default(); sample_count as usize],
            data: vec![0.0; sample_count as usize],
        }
    }

    /// Fold one sample into this stream.
    ///
    /// If the write slot already carries the current window start the value
    /// is updated in place; otherwise the cursor advances and a new window
    /// opens. The mean keeps its running sample count in the slot after the
    /// write slot, valid flag cleared so readers never see it.
    fn fold_sample(&mut self, ring: Ring, start: i64, incoming: f64) {
        let moved = self.times[self.window_position as usize].secs != start;
        let write = if moved {
            ring.advance(self.window_position)
        } else {
            self.window_position
        };
        let w = write as usize;

        let value = match self.reducer {
            Reducer::Mean => {
                let hidden = ring.advance(write) as usize;
                if moved {
                    self.times[hidden].valid = false;
                    self.data[hidden] = 1.0;
                    self.reducer.seed(incoming)
                } else {
                    // a stored count of zero or less means a corrupt hidden
                    // slot; fold as if one sample were present
                    let folded = self.data[hidden].max(1.0);
                    let value = self.reducer.fold(self.data[w], incoming, folded);
                    self.data[hidden] = folded + 1.0;
                    value
                }
            }
            reducer => {
                if moved {
                    reducer.seed(incoming)
                } else {
                    reducer.fold(self.data[w], incoming, 1.0)
                }
            }
        };

        self.data[w] = value;
        self.times[w] = TimePoint { secs: start, micros: 0, valid: true };
        self.window_position = write;
    }
}

/// In-memory image of one RRDB-v1 file.
#[derive(Clone, Debug, PartialEq)]
pub struct Series {
    pub window_position: u32,
    pub sample_count: u32,
    pub times: Vec<TimePoint>,
    pub sets: ArrayVec<Vec<f64>, MAX_SETS>,
    pub xforms: ArrayVec<Xform, MAX_XFORMS>,
}

impl Series {
    /// A zero-initialized file image: every slot invalid, every cursor at 0.
    pub fn create(set_count: u32, sample_count: u32, xform_spec: &str) -> Result<Series> {
        if sample_count == 0 {
            return Err(Error::input("sample count too small, must be more than zero."));
        }
        if set_count as usize > MAX_SETS {
            return Err(Error::input(format!(
                "set count {set_count} is over the format limit of {MAX_SETS}"
            )));
        }
        let xforms = parse_xform_spec(xform_spec, set_count, sample_count)?;
        Ok(Series {
            window_position: 0,
            sample_count,
            times: vec![TimePoint::default(); sample_count as usize],
            sets: (0..set_count)
                .map(|_| vec![0.0; sample_count as usize])
                .collect(),
            xforms,
        })
    }

    fn ring(&self) -> Ring {
        Ring::new(self.sample_count)
    }

    /// Append one observation: advance the cursor, stamp the slot, store one
    /// value per set (missing values read as 0), fold into every stream.
    pub fn update(&mut self, now: WallTime, values: &[f64]) {
        let ring = self.ring();
        self.window_position = ring.advance(self.window_position);
        let slot = self.window_position as usize;

        self.times[slot] = TimePoint { secs: now.secs, micros: now.micros, valid: true };
        for (i, set) in self.sets.iter_mut().enumerate() {
            set[slot] = values.get(i).copied().unwrap_or(0.0);
        }

        for xform in &mut self.xforms {
            let incoming = match xform.reducer {
                // count streams track events, not a source column
                Reducer::Count => 0.0,
                _ => self.sets[xform.set_index as usize][slot],
            };
            xform.fold_sample(ring, xform.period.window_start(now.secs), incoming);
        }
    }

    /// Samples of `set_index` inside `[start, start + seconds)`, scanned
    /// newest-first from the write cursor. The scan stops at the first
    /// invalid slot or the first timestamp outside the window; insertion
    /// order is time order, so nothing beyond that point qualifies.
    pub fn window_samples(
        &self,
        set_index: usize,
        start: i64,
        seconds: i64,
    ) -> impl Iterator<Item = f64> + '_ {
        self.ring()
            .backward_from(self.window_position)
            .take_while(move |i| {
                let t = &self.times[*i];
                t.valid && t.secs >= start && t.secs < start + seconds
            })
            .map(move |i| self.sets[set_index][i])
    }

    /// How many valid samples fall inside `[start, start + seconds)`, via
    /// the same newest-first early-terminating scan.
    pub fn window_sample_count(&self, start: i64, seconds: i64) -> usize {
        self.ring()
            .backward_from(self.window_position)
            .take_while(|i| {
                let t = &self.times[*i];
                t.valid && t.secs >= start && t.secs < start + seconds
            })
            .count()
    }

    /// Print every valid sample oldest-first: `sec.usec:v0:v1:…`.
    pub fn write_samples(&self, out: &mut dyn Write) -> io::Result<()> {
        for i in self.ring().forward_from(self.window_position) {
            let t = &self.times[i];
            if !t.valid {
                continue;
            }
            write!(out, "{}.{}", t.secs, t.micros)?;
            for set in &self.sets {
                write!(out, ":{:.6}", set[i])?;
            }
            writeln!(out)?;
        }
        Ok(())
    }

    /// Print one aggregate stream oldest-first: `sec:value`.
    pub fn write_xform(&self, index: usize, out: &mut dyn Write) -> Result<()> {
        let xform = self.xforms.get(index).ok_or(Error::XformIndexOutOfBounds)?;
        for i in self.ring().forward_from(xform.window_position) {
            if xform.times[i].valid {
                writeln!(out, "{}:{:.6}", xform.times[i].secs, xform.data[i])?;
            }
        }
        Ok(())
    }

    pub fn write_info(&self, out: &mut dyn Write) -> io::Result<()> {
        writeln!(out, "Version is {}", codec::VERSION_V1)?;
        writeln!(out, "Number of sets {}", self.sets.len())?;
        writeln!(out, "Number of samples {}", self.sample_count)?;
        writeln!(out, "Current window position {}", self.window_position)?;
        writeln!(out, "Contains #{} xformations", self.xforms.len())?;
        for xform in &self.xforms {
            writeln!(out, "{}:{}", xform.reducer, xform.period)?;
        }
        Ok(())
    }

    /// Replace the values of the first valid sample stamped exactly
    /// `secs.micros` in every set. Returns whether anything matched.
    pub fn modify_raw(&mut self, secs: i64, micros: u32, value: f64) -> bool {
        for i in 0..self.sample_count as usize {
            let t = &self.times[i];
            if t.valid && t.secs == secs && t.micros == micros {
                for set in &mut self.sets {
                    set[i] = value;
                }
                return true;
            }
        }
        false
    }

    /// Replace the value of the first slot of stream `index` whose window
    /// start equals `secs`. Returns whether anything matched.
    pub fn modify_xform(&mut self, index: usize, secs: i64, value: f64) -> Result<bool> {
        let xform = self
            .xforms
            .get_mut(index)
            .ok_or(Error::XformIndexOutOfBounds)?;
        for i in 0..xform.times.len() {
            if xform.times[i].secs == secs {
                xform.data[i] = value;
                return Ok(true);
            }
        }
        Ok(false)
    }

    pub fn decode(image: &[u8]) -> Result<Series> {
        let mut r = Reader::new(image);
        if r.u32()? != codec::VERSION_V1 {
            return Err(Error::UnknownVersion);
        }
        let window_position = r.u32()?;
        let set_count = r.u32()?;
        let sample_count = r.u32()?;
        if sample_count == 0 {
            return Err(Error::Corrupt("zero sample count"));
        }
        if set_count as usize > MAX_SETS {
            return Err(Error::Corrupt("set count over format limit"));
        }
        if window_position >= sample_count {
            return Err(Error::Corrupt("window position out of range"));
        }

        let times = read_times(&mut r, sample_count)?;
        let mut sets = ArrayVec::new();
        for _ in 0..set_count {
            sets.push(read_numbers(&mut r, sample_count)?);
        }

        let xform_count = r.u32()?;
        if xform_count as usize > MAX_XFORMS {
            return Err(Error::Corrupt("xform count over format limit"));
        }
        let mut xforms = ArrayVec::new();
        for _ in 0..xform_count {
            let period =
                Period::from_wire(r.u32()?).ok_or(Error::Corrupt("unknown xform period"))?;
            let reducer =
                Reducer::from_wire(r.u32()?).ok_or(Error::Corrupt("unknown xform reducer"))?;
            let set_index = r.u32()?;
            if reducer.takes_set_index() && set_index >= set_count {
                return Err(Error::Corrupt("xform set index out of range"));
            }
            let window_position = r.u32()?;
            if window_position >= sample_count {
                return Err(Error::Corrupt("window position out of range"));
            }
            let times = read_times(&mut r, sample_count)?;
            let data = read_numbers(&mut r, sample_count)?;
            xforms.push(Xform { reducer, period, set_index, window_position, times, data });
        }

        Ok(Series { window_position, sample_count, times, sets, xforms })
    }

    pub fn encode(&self) -> Vec<u8> {
        let n = self.sample_count as usize;
        let per_column = n * 13 + n * 8;
        let mut w = Writer::with_capacity(
            16 + n * 13 + self.sets.len() * n * 8 + 4 + self.xforms.len() * (16 + per_column),
        );

        w.u32(codec::VERSION_V1);
        w.u32(self.window_position);
        w.u32(self.sets.len() as u32);
        w.u32(self.sample_count);
        write_times(&mut w, &self.times);
        for set in &self.sets {
            for value in set {
                w.f64(*value);
            }
        }
        w.u32(self.xforms.len() as u32);
        for xform in &self.xforms {
            w.u32(xform.period as u32);
            w.u32(xform.reducer as u32);
            w.u32(xform.set_index);
            w.u32(xform.window_position);
            write_times(&mut w, &xform.times);
            for value in &xform.data {
                w.f64(*value);
            }
        }
        w.into_bytes()
    }
}

fn read_times(r: &mut Reader, sample_count: u32) -> Result<Vec<TimePoint>> {
    let mut times = Vec::with_capacity(sample_count as usize);
    for _ in 0..sample_count {
        times.push(TimePoint { secs: r.i64()?, micros: r.u32()?, valid: r.u8()? != 0 });
    }
    Ok(times)
}

fn write_times(w: &mut Writer, times: &[TimePoint]) {
    for t in times {
        w.i64(t.secs);
        w.u32(t.micros);
        w.u8(t.valid as u8);
    }
}

fn read_numbers(r: &mut Reader, sample_count: u32) -> Result<Vec<f64>> {
    let mut numbers = Vec::with_capacity(sample_count as usize);
    for _ in 0..sample_count {
        numbers.push(r.f64()?);
    }
    Ok(numbers)
}

/// Parse a `Reducer:Period[:setIndex]` spec, `:`-concatenated.
///
/// The set index is required for everything but count streams. Unknown
/// reducer or period names skip that stream; a missing period or index, a
/// bad index or too many streams abort the whole command.
fn parse_xform_spec(
    spec: &str,
    set_count: u32,
    sample_count: u32,
) -> Result<ArrayVec<Xform, MAX_XFORMS>> {
    let mut xforms = ArrayVec::new();
    if spec.is_empty() {
        return Ok(xforms);
    }

    let mut tokens = spec.split(':');
    while let Some(name) = tokens.next() {
        if name.is_empty() {
            continue;
        }
        let reducer = Reducer::parse(name);
        let period = tokens
            .next()
            .ok_or_else(|| Error::input("xform needs a time period"))?;
        let period = Period::parse(period);
        let needs_index = reducer.is_some_and(Reducer::takes_set_index);
        let set_index = if needs_index {
            let token = tokens
                .next()
                .ok_or_else(|| Error::input("xform needs a set index"))?;
            token
                .parse::<u32>()
                .map_err(|_| Error::input(format!("bad xform set index {token:?}")))?
        } else {
            0
        };

        let (Some(reducer), Some(period)) = (reducer, period) else {
            continue;
        };
        if needs_index && set_index >= set_count {
            return Err(Error::input(format!(
                "xform set index {set_index} does not name a set"
            )));
        }
        if xforms.is_full() {
            return Err(Error::input("too many xformations"));
        }
        xforms.push(Xform::new(reducer, period, set_index, sample_count));
    }
    Ok(xforms)
}
