//! Maps a verb plus arguments onto the two file engines.
//!
//! The dispatcher owns no global state: each call gets a [`Request`] and
//! the output stream to write protocol lines to. Errors bubble up as
//! [`Error`] and are rendered as a single `ERROR: …` line by the caller
//! (the binary or the pipe loop); the process exit status stays zero.

use std::io::Write;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::codec;
use crate::error::{Error, Result};
use crate::series::{Series, WallTime};
use crate::store::LockedFile;
use crate::touch;

mod pipe;

pub use pipe::{install_sigint_flag, pipe_loop};

/// Longest accepted value/xform/path argument, in bytes.
pub const MAX_ARG_LEN: usize = 600;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Verb {
    #[default]
    Pipe,
    Create,
    Update,
    Fetch,
    Info,
    Touch,
    Modify,
}

impl Verb {
    pub fn parse(name: &str) -> Option<Verb> {
        match name {
            "-" => Some(Verb::Pipe),
            "create" => Some(Verb::Create),
            "update" => Some(Verb::Update),
            "fetch" => Some(Verb::Fetch),
            "info" => Some(Verb::Info),
            "touch" => Some(Verb::Touch),
            "modify" => Some(Verb::Modify),
            _ => None,
        }
    }
}

/// One resolved invocation: the verb and every argument it may consume.
/// `xform` doubles as the touch path, the way the flag surface overloads it.
#[derive(Clone, Debug, Default)]
pub struct Request {
    pub verb: Verb,
    pub path: PathBuf,
    pub set_count: u32,
    pub sample_count: u32,
    pub values: String,
    pub xform: String,
    pub period: String,
}

/// Wall clock as (seconds, microseconds) since the epoch.
pub fn now() -> WallTime {
    let elapsed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    WallTime { secs: elapsed.as_secs() as i64, micros: elapsed.subsec_micros() }
}

/// Run one command against the wall clock.
pub fn run(req: &Request, out: &mut dyn Write) -> Result<()> {
    dispatch(req, None, out)
}

/// Run one command at a fixed time. Tests use this to drive window
/// rollover and set eviction without sleeping.
pub fn run_at(req: &Request, at: WallTime, out: &mut dyn Write) -> Result<()> {
    dispatch(req, Some(at), out)
}

/// The timestamp for this operation, read only after the file lock is held
/// so write order matches lock-acquisition order.
fn stamp(at: Option<WallTime>) -> WallTime {
    at.unwrap_or_else(now)
}

fn dispatch(req: &Request, at: Option<WallTime>, out: &mut dyn Write) -> Result<()> {
    if req.values.len() > MAX_ARG_LEN {
        return Err(Error::input("Length of value string too long"));
    }
    if req.xform.len() > MAX_ARG_LEN {
        return Err(Error::input("Length of xformation string too long"));
    }

    match req.verb {
        Verb::Pipe => Err(Error::input("pipe mode is not a file command")),

        Verb::Create => {
            let series = Series::create(req.set_count, req.sample_count, &req.xform)?;
            let locked = LockedFile::create(&req.path, 0o666)?;
            locked.write_image(&series.encode(), true)
        }

        Verb::Update => {
            let locked = LockedFile::open(&req.path)?;
            if locked.version()? != codec::VERSION_V1 {
                return Err(Error::UnknownVersion);
            }
            let mut series = Series::decode(&locked.read_image()?)?;
            series.update(stamp(at), &parse_values(&req.values));
            locked.write_image(&series.encode(), false)
        }

        Verb::Fetch => {
            let locked = LockedFile::open(&req.path)?;
            match locked.version()? {
                codec::VERSION_V1 => {
                    let series = Series::decode(&locked.read_image()?)?;
                    if req.xform.is_empty() {
                        series.write_samples(out)?;
                        Ok(())
                    } else {
                        series.write_xform(parse_index(&req.xform)?, out)
                    }
                }
                codec::VERSION_TOUCH_V2 => touch::write_samples(
                    locked.file(),
                    stamp(at).secs,
                    &req.xform,
                    &req.period,
                    out,
                ),
                _ => Err(Error::UnknownVersion),
            }
        }

        Verb::Info => {
            let locked = LockedFile::open(&req.path)?;
            match locked.version()? {
                codec::VERSION_V1 => {
                    let series = Series::decode(&locked.read_image()?)?;
                    series.write_info(out)?;
                    Ok(())
                }
                codec::VERSION_TOUCH_V2 => touch::write_info(locked.file(), out),
                _ => Err(Error::UnknownVersion),
            }
        }

        Verb::Touch => {
            let locked = LockedFile::create(&req.path, 0o644)?;
            touch::touch(
                locked.file(),
                stamp(at).secs,
                &req.xform,
                &req.period,
                req.set_count,
                req.sample_count,
            )
        }

        Verb::Modify => {
            let locked = LockedFile::open(&req.path)?;
            if locked.version()? != codec::VERSION_V1 {
                return Err(Error::input("modify supports only version 1 files"));
            }
            let mut series = Series::decode(&locked.read_image()?)?;
            let (secs, micros, value) = parse_modify(&req.values)?;
            let modified = if req.xform.is_empty() {
                series.modify_raw(secs, micros, value)
            } else {
                series.modify_xform(parse_index(&req.xform)?, secs, value)?
            };
            if modified {
                tracing::debug!(secs, micros, value, "modified sample");
                locked.write_image(&series.encode(), false)?;
            }
            Ok(())
        }
    }
}

/// Colon-separated update values; anything unparseable counts as zero, the
/// update itself never fails on bad numbers.
fn parse_values(values: &str) -> Vec<f64> {
    values
        .split(':')
        .filter(|t| !t.is_empty())
        .map(|t| t.parse().unwrap_or(0.0))
        .collect()
}

fn parse_index(token: &str) -> Result<usize> {
    token
        .trim()
        .parse()
        .map_err(|_| Error::input(format!("bad xform index {token:?}")))
}

/// `time:value` or `time.usec:value`.
fn parse_modify(values: &str) -> Result<(i64, u32, f64)> {
    let (stamp, value) = values
        .split_once(':')
        .ok_or_else(|| Error::input("modify needs time:value"))?;
    let (secs, micros) = match stamp.split_once('.') {
        Some((secs, micros)) => (secs, micros),
        None => (stamp, "0"),
    };
    let secs = secs
        .parse()
        .map_err(|_| Error::input(format!("bad modify time {stamp:?}")))?;
    let micros = micros
        .parse()
        .map_err(|_| Error::input(format!("bad modify time {stamp:?}")))?;
    let value = value
        .parse()
        .map_err(|_| Error::input(format!("bad modify value {value:?}")))?;
    Ok((secs, micros, value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_parse_leniently() {
        assert_eq!(parse_values("10:20.5:x:30"), vec![10.0, 20.5, 0.0, 30.0]);
        assert_eq!(parse_values(""), Vec::<f64>::new());
        assert_eq!(parse_values("1::2"), vec![1.0, 2.0]);
    }

    #[test]
    fn modify_spec_parses_both_shapes() {
        assert_eq!(parse_modify("1234:111").unwrap(), (1234, 0, 111.0));
        assert_eq!(parse_modify("1234.33:1.5").unwrap(), (1234, 33, 1.5));
        assert!(parse_modify("1234").is_err());
        assert!(parse_modify("x:1").is_err());
    }

    #[test]
    fn verbs_parse_by_name() {
        assert_eq!(Verb::parse("-"), Some(Verb::Pipe));
        assert_eq!(Verb::parse("create"), Some(Verb::Create));
        assert_eq!(Verb::parse("modify"), Some(Verb::Modify));
        assert_eq!(Verb::parse("drop"), None);
    }
}
