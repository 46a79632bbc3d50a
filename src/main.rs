//! rrdb entrypoint: long-only flags or line-oriented pipe mode.

use std::io::{self, Write};
use std::path::PathBuf;

use clap::Parser;
use rrdb::command::{self, Request, Verb};
use tracing_subscriber::EnvFilter;

/// Round-robin time-series store.
///
/// Without `--command` (or with `--command=-`) the process enters pipe
/// mode and executes newline-terminated commands from standard input until
/// end of file. Errors are reported as `ERROR: …` lines on standard output
/// and the exit status stays zero.
#[derive(Parser, Debug)]
#[command(name = "rrdb", version)]
struct Args {
    /// `-` (pipe mode), create, update, fetch, info, touch or modify.
    #[arg(long, default_value = "-")]
    command: String,
    /// Value sets for create; maximum sets for touch.
    #[arg(long, default_value_t = 0)]
    setcount: u32,
    /// Samples per ring.
    #[arg(long, default_value_t = 0)]
    samplecount: u32,
    /// Directory prepended to --filename.
    #[arg(long, default_value = "")]
    dir: String,
    #[arg(long, default_value = "")]
    filename: String,
    /// Colon-separated values (update), or time[.usec]:value (modify).
    #[arg(long, default_value = "")]
    values: String,
    /// xform spec (create) or xform index (fetch, modify).
    #[arg(long, default_value = "")]
    xform: String,
    /// Slash-separated path components to count against.
    #[arg(long, default_value = "")]
    touchpath: String,
    /// Comma-separated period names.
    #[arg(long, default_value = "")]
    period: String,
}

fn main() {
    // diagnostics go to stderr; stdout carries protocol output only
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .try_init();

    let args = Args::parse();
    let mut out = io::stdout();

    let Some(verb) = Verb::parse(&args.command) else {
        let _ = writeln!(out, "ERROR: no valid command");
        return;
    };
    let dir = PathBuf::from(&args.dir);

    if verb == Verb::Pipe {
        let stop = match command::install_sigint_flag() {
            Ok(flag) => flag,
            Err(e) => {
                let _ = writeln!(out, "ERROR: can't catch SIGINT ({e})");
                return;
            }
        };
        tracing::info!("entering pipe mode");
        if let Err(e) = command::pipe_loop(&dir, &mut io::stdin().lock(), &mut out, stop) {
            tracing::warn!("pipe loop ended on I/O error: {e}");
        }
        return;
    }

    let req = Request {
        verb,
        path: dir.join(&args.filename),
        set_count: args.setcount,
        sample_count: args.samplecount,
        values: args.values,
        // --touchpath shares the slot --xform fills for the other verbs
        xform: match verb {
            Verb::Touch => args.touchpath,
            _ if args.xform.is_empty() => args.touchpath,
            _ => args.xform,
        },
        period: args.period,
    };
    if let Err(e) = command::run(&req, &mut out) {
        let _ = writeln!(out, "ERROR: {e}");
    }
}
