//! Mines a parent's instruction for the messages it hands to sub-tasks.
//!
//! Parents usually enumerate their delegations as list steps, each carrying
//! the exact message in quotes after a label:
//!
//! ```text
//! 1. Spawn the reviewer. **Message:** "Review the storage layer"
//! 2. Spawn the fixer with message: "Fix whatever the reviewer found"
//! ```
//!
//! This is a heuristic line scanner, not a grammar. It never fails; malformed
//! input just yields fewer literals.

use std::mem;

use crate::canonical::normalize_line_breaks;

/// Quoted sub-instructions in `parent_text`, in document order.
pub fn extract_sub_instructions(parent_text: &str) -> Vec<String> {
    let text = normalize_line_breaks(parent_text);
    let lines: Vec<&str> = text.split('\n').collect();
    let mut scanner = Scanner::default();
    let mut out = Vec::new();

    let mut i = 0;
    while i < lines.len() {
        i = match scanner.feed_line(lines[i], i, &mut out) {
            Some(resume) => resume,
            None => i + 1,
        };
        if i == lines.len() {
            if let Some(resume) = scanner.finish(&mut out) {
                i = resume;
            }
        }
    }
    out
}

#[derive(Default)]
struct Scanner {
    in_fence: bool,
    in_step: bool,
    /// Step text since the marker or the last literal.
    context: String,
    after_literal: bool,
    open: Option<OpenQuote>,
}

struct OpenQuote {
    close: char,
    buf: String,
    /// `buf` length and line index at the first step marker crossed while open.
    boundary: Option<(usize, usize)>,
}

impl Scanner {
    /// Returns a line to restart from when an open quote turned out to be
    /// unterminated.
    fn feed_line(&mut self, line: &str, line_no: usize, out: &mut Vec<String>) -> Option<usize> {
        if let Some(open) = self.open.as_mut() {
            if open.boundary.is_none() && step_body(line).is_some() {
                open.boundary = Some((open.buf.len(), line_no));
            }
            open.buf.push('\n');
            return self.scan(line, out);
        }

        let trimmed = line.trim_start();
        if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            self.in_fence = !self.in_fence;
            return None;
        }
        if self.in_fence {
            return None;
        }

        let rest = match step_body(line) {
            Some(body) => {
                self.in_step = true;
                self.after_literal = false;
                self.context.clear();
                body
            }
            None if self.in_step => {
                self.context.push('\n');
                line
            }
            None => return None,
        };
        self.scan(rest, out)
    }

    fn scan(&mut self, s: &str, out: &mut Vec<String>) -> Option<usize> {
        let mut chars = s.chars().peekable();
        let mut in_code = false;
        let mut ignored: Option<char> = None;

        while let Some(c) = chars.next() {
            if let Some(open) = self.open.as_mut() {
                if c == '\\' {
                    match chars.peek() {
                        Some(&next) if next == open.close || next == '"' || next == '\\' => {
                            open.buf.push(next);
                            chars.next();
                        }
                        _ => open.buf.push(c),
                    }
                } else if c == open.close {
                    if let Some((cut, resume)) = open.boundary {
                        // The "closing" quote opens the next step's message.
                        if ends_with_label(&open.buf[cut..]) {
                            let mut literal = mem::take(&mut open.buf);
                            literal.truncate(cut);
                            self.open = None;
                            self.emit(literal.trim_end(), out);
                            return Some(resume);
                        }
                    }
                    let literal = mem::take(&mut open.buf);
                    self.open = None;
                    self.emit(&literal, out);
                } else {
                    open.buf.push(c);
                }
                continue;
            }

            if let Some(close) = ignored {
                if c == close {
                    ignored = None;
                }
                self.context.push(c);
                continue;
            }
            if c == '`' {
                in_code = !in_code;
            } else if !in_code {
                if let Some(close) = closing_quote(c) {
                    if self.opens_message() {
                        self.open = Some(OpenQuote {
                            close,
                            buf: String::new(),
                            boundary: None,
                        });
                        continue;
                    }
                    ignored = Some(close);
                }
            }
            self.context.push(c);
        }
        None
    }

    /// Flush a quote still open at end of text.
    fn finish(&mut self, out: &mut Vec<String>) -> Option<usize> {
        let open = self.open.take()?;
        match open.boundary {
            Some((cut, resume)) => {
                self.emit(open.buf[..cut].trim_end(), out);
                Some(resume)
            }
            None => {
                self.emit(open.buf.trim_end(), out);
                None
            }
        }
    }

    fn emit(&mut self, literal: &str, out: &mut Vec<String>) {
        if is_sub_instruction(literal) {
            out.push(literal.to_string());
        }
        self.context.clear();
        self.after_literal = true;
    }

    fn opens_message(&self) -> bool {
        if ends_with_label(&self.context) {
            return true;
        }
        self.after_literal
            && self
                .context
                .split(|c: char| c.is_whitespace() || matches!(c, ',' | ';' | '.' | '(' | ')'))
                .filter(|w| !w.is_empty())
                .all(|w| matches!(w.to_ascii_lowercase().as_str(), "and" | "or" | "then"))
    }
}

/// Body of a list item line (`1.`, `2)`, `-`, `*`, `+`), if `line` is one.
fn step_body(line: &str) -> Option<&str> {
    let trimmed = line.trim_start();
    let rest = match trimmed.strip_prefix(|c: char| matches!(c, '-' | '*' | '+')) {
        Some(rest) => rest,
        None => {
            let digits = trimmed
                .chars()
                .take_while(|c| c.is_ascii_digit())
                .count();
            if digits == 0 || digits > 3 {
                return None;
            }
            trimmed[digits..].strip_prefix(|c: char| c == '.' || c == ')')?
        }
    };
    if rest.starts_with(char::is_whitespace) {
        Some(rest.trim_start())
    } else {
        None
    }
}

/// `label:`, `**label:**`, `**label**:` and the like.
fn ends_with_label(s: &str) -> bool {
    s.trim_end()
        .trim_end_matches(|c: char| c == '*' || c == '_')
        .trim_end()
        .ends_with(':')
}

fn closing_quote(c: char) -> Option<char> {
    match c {
        '"' => Some('"'),
        '\u{201C}' => Some('\u{201D}'),
        _ => None,
    }
}

fn is_sub_instruction(literal: &str) -> bool {
    let t = literal.trim();
    !t.is_empty() && !looks_like_path(t)
}

fn looks_like_path(s: &str) -> bool {
    if s.contains(char::is_whitespace) {
        return false;
    }
    if s.contains('/') || s.contains('\\') {
        return true;
    }
    match s.rsplit_once('.') {
        Some((stem, ext)) => {
            !stem.is_empty()
                && (1..=5).contains(&ext.len())
                && ext.chars().all(|c| c.is_ascii_alphanumeric())
        }
        None => false,
    }
}
