//! Line-oriented pipe mode: one command per line on standard input, one
//! `OK` or `ERROR: …` acknowledgement per command on standard output.
//! Commands run strictly one at a time; end of input ends the loop.

use std::io::{self, BufRead, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{Error, Result};
use crate::ffi;

use super::{run, Request, Verb};

/// Longest accepted command line, in bytes.
pub const MAX_COMMAND_LEN: usize = 600;

static INTERRUPTED: AtomicBool = AtomicBool::new(false);

extern "C" fn on_sigint(_signum: i32) {
    INTERRUPTED.store(true, Ordering::SeqCst);
}

/// Route SIGINT to an atomic flag and return it. The pipe loop polls the
/// flag between commands, so an interrupt never fires while a file lock is
/// held; the handler is installed without `SA_RESTART` so a blocked read
/// wakes up with `EINTR`.
pub fn install_sigint_flag() -> Result<&'static AtomicBool> {
    ffi::sigaction(libc::SIGINT, on_sigint)?;
    Ok(&INTERRUPTED)
}

/// Read commands from `input` until end of input or `stop` is raised.
///
/// Every command resolves its filename under `dir`. A failing command
/// reports and the loop keeps going; only I/O trouble on the output stream
/// ends it early.
pub fn pipe_loop(
    dir: &Path,
    input: &mut dyn BufRead,
    out: &mut dyn Write,
    stop: &AtomicBool,
) -> io::Result<()> {
    let mut line = String::new();
    loop {
        if stop.load(Ordering::SeqCst) {
            tracing::info!("interrupted, leaving pipe mode");
            return Ok(());
        }

        line.clear();
        match input.read_line(&mut line) {
            Ok(0) => return Ok(()),
            Ok(_) => {}
            // EINTR from the signal handler: go round and check the flag
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }

        let command = line.trim_end_matches(['\r', '\n']);
        if command.len() > MAX_COMMAND_LEN {
            writeln!(out, "ERROR: command too long")?;
            continue;
        }

        match parse_line(dir, command).and_then(|req| run(&req, out)) {
            Ok(()) => writeln!(out, "OK")?,
            Err(e) => writeln!(out, "ERROR: {e}")?,
        }
        out.flush()?;
    }
}

/// Space-delimited pipe grammar:
///
/// ```text
/// create  <file> <setCount> <sampleCount> [<xformSpec>]
/// update  <file> [<v0>:<v1>:…]
/// fetch   <file> [<xformIndex> | <path> <period>]
/// info    <file>
/// touch   <file> <maxSets> <sampleCount> <path> [<period>]
/// ```
fn parse_line(dir: &Path, line: &str) -> Result<Request> {
    let mut tokens = line.split_whitespace();

    let verb = match tokens.next() {
        Some("create") => Verb::Create,
        Some("update") => Verb::Update,
        Some("fetch") => Verb::Fetch,
        Some("info") => Verb::Info,
        Some("touch") => Verb::Touch,
        _ => return Err(Error::input("no valid command")),
    };
    let name = tokens
        .next()
        .ok_or_else(|| Error::input("missing filename"))?;

    let mut req = Request { verb, path: dir.join(name), ..Request::default() };
    match verb {
        Verb::Create => {
            req.set_count = parse_u32(tokens.next(), "set count")?;
            req.sample_count = parse_u32(tokens.next(), "sample count")?;
            req.xform = tokens.next().unwrap_or_default().to_string();
        }
        Verb::Update => {
            req.values = tokens.next().unwrap_or_default().to_string();
        }
        Verb::Fetch => {
            req.xform = tokens.next().unwrap_or_default().to_string();
            req.period = tokens.next().unwrap_or_default().to_string();
        }
        Verb::Info => {}
        Verb::Touch => {
            req.set_count = parse_u32(tokens.next(), "max sets")?;
            req.sample_count = parse_u32(tokens.next(), "sample count")?;
            req.xform = tokens
                .next()
                .ok_or_else(|| Error::input("missing touch path"))?
                .to_string();
            req.period = tokens.next().unwrap_or_default().to_string();
        }
        // not part of the pipe grammar
        Verb::Pipe | Verb::Modify => {}
    }
    Ok(req)
}

fn parse_u32(token: Option<&str>, what: &str) -> Result<u32> {
    let token = token.ok_or_else(|| Error::input(format!("missing {what}")))?;
    token
        .parse()
        .map_err(|_| Error::input(format!("bad {what} {token:?}")))
}
