//! The operator console: one command per line on stdin.

use massbus::{MassbusResult, Server, ShareMode};
use std::io::{BufRead, Write};
use std::path::Path;

pub const HELP: &str = "\
Commands:
  show                          list every unit
  attach UNIT PATH [ro] [shared] attach an image (unit stays offline)
  detach UNIT                   close the image
  online UNIT | offline UNIT    change the unit's online state
  ro UNIT | rw UNIT             write lock or unlock
  width UNIT 16|18              disk word width
  serial UNIT N                 set the serial number
  alias UNIT [NAME]             set or remove an alias
  rewind UNIT                   rewind a tape
  quit                          stop the server and exit";

/// What the console loop should do after a line.
#[derive(Debug, PartialEq, Eq)]
pub enum Outcome {
    Continue,
    Quit,
}

/// Carry out one console line, writing any reply to `out`.
pub fn execute(server: &Server, line: &str, out: &mut impl Write) -> MassbusResult<Outcome> {
    let words: Vec<&str> = line.split_whitespace().collect();
    let arg = |i: usize| words.get(i).copied();
    let usage = |out: &mut dyn Write| -> MassbusResult<Outcome> {
        writeln!(out, "Bad command '{}'. Type 'help' for a list.", line.trim())?;
        Ok(Outcome::Continue)
    };
    match (arg(0), arg(1)) {
        (None, _) => {}
        (Some("quit"), _) | (Some("exit"), _) => return Ok(Outcome::Quit),
        (Some("help"), _) => writeln!(out, "{}", HELP)?,
        (Some("show"), _) => {
            for status in server.status()? {
                writeln!(out, "{}", status)?;
            }
        }
        (Some("attach"), Some(unit)) => {
            let path = match arg(2) {
                Some(path) => Path::new(path),
                None => return usage(out),
            };
            let flags = &words[3..];
            let share = if flags.contains(&"shared") { ShareMode::Shared } else { ShareMode::Exclusive };
            server.attach(unit, path, flags.contains(&"ro"), share)?;
        }
        (Some("detach"), Some(unit)) => server.detach(unit)?,
        (Some("online"), Some(unit)) => server.set_online(unit, true)?,
        (Some("offline"), Some(unit)) => server.set_online(unit, false)?,
        (Some("ro"), Some(unit)) => server.set_read_only(unit, true)?,
        (Some("rw"), Some(unit)) => server.set_read_only(unit, false)?,
        (Some("width"), Some(unit)) => match arg(2) {
            Some("16") => server.set_word_width(unit, false)?,
            Some("18") => server.set_word_width(unit, true)?,
            _ => return usage(out),
        },
        (Some("serial"), Some(unit)) => match arg(2).and_then(|n| n.parse().ok()) {
            Some(serial) => server.set_serial(unit, serial)?,
            None => return usage(out),
        },
        (Some("alias"), Some(unit)) => server.set_alias(unit, arg(2))?,
        (Some("rewind"), Some(unit)) => server.rewind(unit)?,
        _ => return usage(out),
    }
    Ok(Outcome::Continue)
}

/// Read commands until `quit` or end of input. Failed commands are
/// reported and the loop carries on.
pub fn run(server: &Server, input: impl BufRead, out: &mut impl Write) -> MassbusResult<()> {
    for line in input.lines() {
        let line = line?;
        match execute(server, &line, out) {
            Ok(Outcome::Quit) => break,
            Ok(Outcome::Continue) => {}
            Err(e) => writeln!(out, "Error: {}", e)?,
        }
        out.flush()?;
    }
    Ok(())
}
