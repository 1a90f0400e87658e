//! Terminal formatting for looked-up and dumped terms

use crate::index::types::{BlockTermState, DocId};
use std::io::{self, Write};
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

fn stdout(color: bool) -> StandardStream {
    let choice = if color {
        ColorChoice::Auto
    } else {
        ColorChoice::Never
    };
    StandardStream::stdout(choice)
}

/// Printable form of a term: UTF-8 as is, anything else byte-escaped
pub fn display_term(term: &[u8]) -> String {
    match std::str::from_utf8(term) {
        Ok(text) => text.to_string(),
        Err(_) => term.escape_ascii().to_string(),
    }
}

fn print_stats(stdout: &mut StandardStream, state: &BlockTermState) -> io::Result<()> {
    stdout.set_color(ColorSpec::new().set_fg(Some(Color::Cyan)))?;
    write!(stdout, "df={} ttf={}", state.doc_freq, state.total_term_freq)?;
    stdout.reset()
}

/// Print the result of an exact lookup
pub fn print_lookup(
    field: &str,
    term: &[u8],
    found: Option<(&BlockTermState, &[(DocId, u32)])>,
    color: bool,
) -> io::Result<()> {
    let mut stdout = stdout(color);

    stdout.set_color(ColorSpec::new().set_fg(Some(Color::Magenta)).set_bold(true))?;
    write!(stdout, "{}", field)?;
    stdout.reset()?;
    write!(stdout, ":")?;

    let Some((state, docs)) = found else {
        stdout.set_color(ColorSpec::new().set_fg(Some(Color::Red)))?;
        writeln!(stdout, "{} not found", display_term(term))?;
        stdout.reset()?;
        return Ok(());
    };

    stdout.set_color(ColorSpec::new().set_fg(Some(Color::Green)).set_bold(true))?;
    write!(stdout, "{}", display_term(term))?;
    stdout.reset()?;
    write!(stdout, " ")?;
    print_stats(&mut stdout, state)?;
    writeln!(stdout)?;

    for (doc, freq) in docs {
        if *freq == 1 {
            writeln!(stdout, "  {}", doc)?;
        } else {
            writeln!(stdout, "  {} (x{})", doc, freq)?;
        }
    }
    Ok(())
}

/// Print enumerated terms, one per line
pub fn print_terms(terms: &[(Vec<u8>, BlockTermState)], color: bool) -> io::Result<()> {
    let mut stdout = stdout(color);
    for (term, state) in terms {
        stdout.set_color(ColorSpec::new().set_fg(Some(Color::Green)))?;
        write!(stdout, "{}", display_term(term))?;
        stdout.reset()?;
        write!(stdout, "\t")?;
        print_stats(&mut stdout, state)?;
        writeln!(stdout)?;
    }
    stdout.flush()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_term() {
        assert_eq!(display_term(b"apple"), "apple");
        assert_eq!(display_term("caf\u{e9}".as_bytes()), "caf\u{e9}");
        assert_eq!(display_term(&[b'a', 0xff, b'b']), "a\\xffb");
    }
}
