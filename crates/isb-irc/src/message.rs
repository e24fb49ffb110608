//! IRC line grammar
//!
//! ```text
//! [:<prefix> ]<command>[ <arg>]*[ :<trailing>]
//! ```
//!
//! Parsing works on a single line with the `\n` already removed; a trailing
//! `\r` is tolerated. Runs of spaces between tokens count as one separator.
//! Serialization always renders the last argument in trailing form.

use crate::error::{IrcError, Result};

/// One IRC protocol message. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    prefix: Option<String>,
    command: String,
    args: Vec<String>,
}

impl Message {
    pub fn new<C, I, A>(prefix: Option<String>, command: C, args: I) -> Self
    where
        C: Into<String>,
        I: IntoIterator<Item = A>,
        A: Into<String>,
    {
        Self {
            prefix,
            command: command.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Argument at `index`, if present
    pub fn arg(&self, index: usize) -> Option<&str> {
        self.args.get(index).map(String::as_str)
    }

    /// Parse one line.
    pub fn parse(line: &str) -> Result<Self> {
        let malformed = || IrcError::MalformedLine(line.to_string());

        let mut rest = line.strip_suffix('\r').unwrap_or(line);

        let mut prefix = None;
        if let Some(after_marker) = rest.strip_prefix(':') {
            let (token, tail) = split_token(after_marker, false).ok_or_else(malformed)?;
            prefix = Some(token.to_string());
            // a prefix with nothing after it has no command
            rest = tail.ok_or_else(malformed)?;
        }

        let (command, mut tail) = split_token(rest, false).ok_or_else(malformed)?;

        let mut args = Vec::new();
        while let Some(remaining) = tail {
            let (arg, next) = split_token(remaining, true).ok_or_else(malformed)?;
            args.push(arg.to_string());
            tail = next;
        }

        Ok(Self {
            prefix,
            command: command.to_string(),
            args,
        })
    }

    /// Render to a wire line, without the line terminator.
    ///
    /// Fails rather than mangling anything that would not parse back to the
    /// same message: a non-final argument that is empty, contains a space or
    /// starts with `:`, or any token containing a line break.
    pub fn deparse(&self) -> Result<String> {
        let mut out = String::new();

        if let Some(prefix) = &self.prefix {
            if prefix.is_empty() || prefix.contains(' ') || has_line_break(prefix) {
                return Err(IrcError::InvalidArgument(format!("Bad prefix: {:?}", prefix)));
            }
            out.push(':');
            out.push_str(prefix);
            out.push(' ');
        }

        if self.command.is_empty()
            || self.command.contains(' ')
            || self.command.starts_with(':')
            || has_line_break(&self.command)
        {
            return Err(IrcError::InvalidArgument(format!("Bad command: {:?}", self.command)));
        }
        out.push_str(&self.command);

        let last = self.args.len().saturating_sub(1);
        for (i, arg) in self.args.iter().enumerate() {
            if has_line_break(arg) {
                return Err(IrcError::InvalidArgument(format!("Line break in argument: {:?}", arg)));
            }
            if i < last {
                if arg.is_empty() || arg.contains(' ') || arg.starts_with(':') {
                    return Err(IrcError::InvalidArgument(format!(
                        "Bad non-final argument: {:?}",
                        arg
                    )));
                }
                out.push(' ');
                out.push_str(arg);
            } else {
                out.push_str(" :");
                out.push_str(arg);
            }
        }

        Ok(out)
    }
}

fn has_line_break(s: &str) -> bool {
    s.contains(['\r', '\n'])
}

/// Split the next token off `input`.
///
/// Returns the token and whatever follows its separating spaces (`None`
/// when the token ran to the end of the input). `None` overall means the
/// token is missing or starts with a space.
fn split_token(input: &str, allow_trailing: bool) -> Option<(&str, Option<&str>)> {
    if input.is_empty() || input.starts_with(' ') {
        return None;
    }

    if allow_trailing {
        if let Some(trailing) = input.strip_prefix(':') {
            return Some((trailing, None));
        }
    }

    match input.find(' ') {
        Some(idx) => Some((&input[..idx], Some(input[idx..].trim_start_matches(' ')))),
        None => Some((input, None)),
    }
}
