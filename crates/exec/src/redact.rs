//! Line-buffered scrubbing of tracked credentials from step output.

use std::io::{self, Write};

use crate::build_vars::BuildVariables;

/// Replacement written in place of a credential.
pub const REDACTED: &str = "((redacted))";

/// Forwards whole lines to `sink` with every tracked credential replaced by
/// [`REDACTED`].
///
/// Bytes after the last newline are held back until the line completes or
/// the writer is closed, so a secret split across writes is still caught.
/// Dropping the writer closes it, ignoring errors.
pub struct RedactingWriter<W: Write> {
    sink: W,
    vars: BuildVariables,
    dangling: Vec<u8>,
    closed: bool,
}

impl<W: Write> RedactingWriter<W> {
    pub fn new(sink: W, vars: BuildVariables) -> Self {
        Self {
            sink,
            vars,
            dangling: Vec::new(),
            closed: false,
        }
    }

    /// Flush whatever is still buffered through the filter, then the sink.
    pub fn close(&mut self) -> io::Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        if !self.dangling.is_empty() {
            let remaining = std::mem::take(&mut self.dangling);
            let filtered = filter(&remaining, &self.vars.secrets());
            self.sink.write_all(&filtered)?;
        }
        self.sink.flush()
    }

    pub fn get_ref(&self) -> &W {
        &self.sink
    }
}

impl<W: Write> Write for RedactingWriter<W> {
    fn write(&mut self, chunk: &[u8]) -> io::Result<usize> {
        let mut buf = std::mem::take(&mut self.dangling);
        buf.extend_from_slice(chunk);

        if ends_mid_char(&buf) {
            self.dangling = buf;
            return Ok(chunk.len());
        }

        match buf.iter().rposition(|b| *b == b'\n') {
            Some(newline) => {
                self.dangling = buf.split_off(newline + 1);
                let filtered = filter(&buf, &self.vars.secrets());
                self.sink.write_all(&filtered)?;
            }
            None => self.dangling = buf,
        }

        Ok(chunk.len())
    }

    /// Flushes the sink; an incomplete line stays buffered.
    fn flush(&mut self) -> io::Result<()> {
        self.sink.flush()
    }
}

impl<W: Write> Drop for RedactingWriter<W> {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

/// Whether `buf` stops part-way through a UTF-8 encoded character.
fn ends_mid_char(buf: &[u8]) -> bool {
    let tail_start = buf.len().saturating_sub(4);
    for (offset, byte) in buf[tail_start..].iter().enumerate().rev() {
        if byte & 0b1100_0000 == 0b1000_0000 {
            continue;
        }
        let expected = match byte.leading_ones() {
            0 => 1,
            2 => 2,
            3 => 3,
            4 => 4,
            _ => return false,
        };
        let available = buf.len() - (tail_start + offset);
        return available < expected;
    }
    false
}

/// Replace every line of every secret in `buf`.
///
/// Multi-line secrets are redacted line by line; lines of a single
/// character are left alone.
fn filter(buf: &[u8], secrets: &[String]) -> Vec<u8> {
    let mut needles: Vec<&str> = secrets
        .iter()
        .flat_map(|secret| secret.split('\n'))
        .map(str::trim)
        .filter(|line| line.chars().count() > 1)
        .collect();
    needles.sort_by_key(|needle| std::cmp::Reverse(needle.len()));
    needles.dedup();

    let mut output = buf.to_vec();
    for needle in needles {
        output = replace_all(&output, needle.as_bytes(), REDACTED.as_bytes());
    }
    output
}

fn replace_all(haystack: &[u8], needle: &[u8], replacement: &[u8]) -> Vec<u8> {
    let mut output = Vec::with_capacity(haystack.len());
    let mut rest = haystack;
    while let Some(idx) = rest
        .windows(needle.len())
        .position(|window| window == needle)
    {
        output.extend_from_slice(&rest[..idx]);
        output.extend_from_slice(replacement);
        rest = &rest[idx + needle.len()..];
    }
    output.extend_from_slice(rest);
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use vars::{interpolate_str, EvaluateOpts, NamedVariables, StaticVariables};

    fn vars_with(secrets: &[&str]) -> BuildVariables {
        let vars = BuildVariables::new(StaticVariables::new(), true);
        for (i, secret) in secrets.iter().enumerate() {
            vars.add_local_var(format!("s{}", i), json!(secret), true);
        }
        vars
    }

    fn redact_chunks(vars: &BuildVariables, chunks: &[&[u8]]) -> Vec<u8> {
        let mut writer = RedactingWriter::new(Vec::new(), vars.clone());
        for chunk in chunks {
            assert_eq!(writer.write(chunk).unwrap(), chunk.len());
        }
        writer.close().unwrap();
        writer.get_ref().clone()
    }

    #[test]
    fn test_redacts_whole_lines() {
        let vars = vars_with(&["hunter2"]);
        let out = redact_chunks(&vars, &[b"password is hunter2\nok\n"]);
        assert_eq!(out, b"password is ((redacted))\nok\n");
    }

    #[test]
    fn test_holds_back_partial_lines() {
        let vars = vars_with(&["hunter2"]);
        let mut writer = RedactingWriter::new(Vec::new(), vars);

        writer.write_all(b"pass: hun").unwrap();
        assert!(writer.get_ref().is_empty());

        writer.write_all(b"ter2\nnext").unwrap();
        assert_eq!(writer.get_ref().as_slice(), b"pass: ((redacted))\n");

        writer.close().unwrap();
        assert_eq!(writer.get_ref().as_slice(), b"pass: ((redacted))\nnext");
    }

    #[test]
    fn test_secret_split_at_every_position() {
        let vars = vars_with(&["s3cr3t-välue"]);
        let input = "token=s3cr3t-välue done\n".as_bytes();
        for split in 0..=input.len() {
            let out = redact_chunks(&vars, &[&input[..split], &input[split..]]);
            assert_eq!(out, b"token=((redacted)) done\n", "split at {}", split);
        }
    }

    #[test]
    fn test_multibyte_split_is_buffered() {
        assert!(ends_mid_char("é".as_bytes().split_last().unwrap().1));
        assert!(!ends_mid_char("é".as_bytes()));
        assert!(!ends_mid_char(b"plain"));
        assert!(!ends_mid_char(b""));

        let snowman = "☃\n".as_bytes();
        let vars = vars_with(&[]);
        let mut writer = RedactingWriter::new(Vec::new(), vars);
        writer.write_all(&snowman[..1]).unwrap();
        writer.write_all(&snowman[1..2]).unwrap();
        assert!(writer.get_ref().is_empty());
        writer.write_all(&snowman[2..]).unwrap();
        assert_eq!(writer.get_ref().as_slice(), snowman);
    }

    #[test]
    fn test_multi_line_secrets_are_redacted_per_line() {
        let key = "-----BEGIN KEY-----\nabc123\n-----END KEY-----\n";
        let vars = vars_with(&[key]);
        let out = redact_chunks(&vars, &[key.as_bytes()]);
        assert_eq!(out, b"((redacted))\n((redacted))\n((redacted))\n");
    }

    #[test]
    fn test_single_character_secrets_are_ignored() {
        let vars = vars_with(&["x", " y "]);
        let out = redact_chunks(&vars, &[b"x y z\n"]);
        assert_eq!(out, b"x y z\n");
    }

    #[test]
    fn test_close_without_trailing_newline() {
        let vars = vars_with(&["hunter2"]);
        let out = redact_chunks(&vars, &[b"hunter2"]);
        assert_eq!(out, b"((redacted))");
    }

    #[test]
    fn test_interpolated_secret_is_redacted_from_output() {
        let creds =
            NamedVariables::new().with("secret", StaticVariables::new().with("key", json!("s3cr3t")));
        let vars = BuildVariables::new(creds, true);

        let line = interpolate_str("token: ((secret:key))", &vars, EvaluateOpts::default()).unwrap();
        assert_eq!(line, "token: s3cr3t");

        let out = redact_chunks(&vars, &[line.as_bytes(), b"\n"]);
        assert_eq!(out, b"token: ((redacted))\n");
    }

    #[test]
    fn test_resolved_credential_shadowed_by_local_var_is_redacted() {
        let creds = NamedVariables::new()
            .with("vault", StaticVariables::new().with("password", json!("hunter2")));
        let vars = BuildVariables::new(creds, true);

        let line = interpolate_str("a=((vault:password))", &vars, EvaluateOpts::default()).unwrap();
        vars.add_local_var("password", json!("loaded-pw"), true);

        let out = redact_chunks(&vars, &[line.as_bytes(), b" b=loaded-pw\n"]);
        assert_eq!(out, b"a=((redacted)) b=((redacted))\n");
    }

    #[test]
    fn test_parent_secret_shadowed_in_child_scope_is_redacted() {
        let parent = BuildVariables::new(StaticVariables::new(), true);
        parent.add_local_var("v", json!("outer-secret"), true);
        let child = parent.new_local_scope();
        child.add_local_var("v", json!("inner-secret"), true);

        let out = redact_chunks(&child, &[b"outer-secret inner-secret\n"]);
        assert_eq!(out, b"((redacted)) ((redacted))\n");
    }

    #[test]
    fn test_replace_all() {
        assert_eq!(replace_all(b"aXbXc", b"X", b"--"), b"a--b--c");
        assert_eq!(replace_all(b"none", b"zz", b"!"), b"none");
    }
}
