//! Built-in layout engine.
//!
//! A small engine that ships with the bridge so the driver and the C ABI work
//! without an external one. Whole-buffer formatting normalizes whitespace
//! line by line; tree formatting lays leaves out by nesting depth and keeps
//! the comments found between them.

use super::tree::{Leaf, SyntaxTree};
use super::Engine;
use crate::buffer::ResultBuffer;
use crate::error::{BridgeError, FormatFailure};
use crate::token::{Token, TokenStream};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::str;

/// Largest indent width the engine accepts.
pub const MAX_INDENT_WIDTH: usize = 16;

/// Layout settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Spaces per indentation level (and per leading tab).
    pub indent_width: usize,
    /// Longest run of blank lines kept.
    pub max_blank_lines: usize,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            indent_width: 2,
            max_blank_lines: 1,
        }
    }
}

/// The default engine.
#[derive(Debug, Clone, Default)]
pub struct BuiltinEngine {
    config: LayoutConfig,
}

impl BuiltinEngine {
    #[must_use]
    pub fn new(config: LayoutConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &LayoutConfig {
        &self.config
    }
}

impl Engine for BuiltinEngine {
    fn name(&self) -> &str {
        "builtin"
    }

    fn initialize(&self) -> Result<(), BridgeError> {
        if self.config.indent_width > MAX_INDENT_WIDTH {
            return Err(BridgeError::Initialization(format!(
                "indent width {} exceeds {}",
                self.config.indent_width, MAX_INDENT_WIDTH
            )));
        }
        Ok(())
    }

    fn format(&self, source: &[u8]) -> Result<ResultBuffer, FormatFailure> {
        let source = decode_source(source)?;
        Ok(ResultBuffer::from(normalize(source, &self.config)))
    }

    fn render<'s>(&self, source: &'s [u8], tree: &[u8]) -> Result<TokenStream<'s>, FormatFailure> {
        let source = decode_source(source)?;
        let tree = SyntaxTree::decode(tree, source)?;
        let leaves = tree.leaves(source);
        tracing::debug!(leaves = leaves.len(), "rendering tree");
        Ok(Box::new(Rendering::new(source, leaves, self.config)))
    }
}

fn decode_source(source: &[u8]) -> Result<&str, FormatFailure> {
    str::from_utf8(source).map_err(|e| FormatFailure::Syntax {
        message: format!("invalid UTF-8 at byte {}", e.valid_up_to()),
    })
}

/// Normalize whitespace line by line.
///
/// Line endings become `\n`, trailing whitespace is removed, leading tabs
/// become `indent_width` spaces, leading blank lines are dropped, blank runs
/// are capped at `max_blank_lines` and the result ends with exactly one
/// newline (blank input gives empty output). Applying it twice gives the
/// same result as applying it once.
#[must_use]
pub fn normalize(source: &str, config: &LayoutConfig) -> String {
    let mut out = String::with_capacity(source.len() + 1);
    let mut blank = 0;

    for line in source.split('\n') {
        let line = line.trim_end();
        if line.is_empty() {
            blank += 1;
            continue;
        }
        if !out.is_empty() {
            for _ in 0..blank.min(config.max_blank_lines) {
                out.push('\n');
            }
        }
        push_expanding_tabs(&mut out, line, config.indent_width);
        out.push('\n');
        blank = 0;
    }

    out
}

fn push_expanding_tabs(out: &mut String, line: &str, indent_width: usize) {
    let body = line.trim_start_matches([' ', '\t']);
    for c in line[..line.len() - body.len()].chars() {
        match c {
            '\t' => out.extend(std::iter::repeat(' ').take(indent_width)),
            _ => out.push(' '),
        }
    }
    out.push_str(body);
}

/// Lazy token producer for a validated tree.
///
/// Tokens are produced one leaf (plus the gap before it) at a time.
struct Rendering<'s> {
    source: &'s str,
    leaves: Vec<Leaf>,
    next: usize,
    pending: VecDeque<Token<'s>>,
    config: LayoutConfig,
    emitted_any: bool,
    at_line_start: bool,
    done: bool,
}

impl<'s> Rendering<'s> {
    fn new(source: &'s str, leaves: Vec<Leaf>, config: LayoutConfig) -> Self {
        Self {
            source,
            leaves,
            next: 0,
            pending: VecDeque::new(),
            config,
            emitted_any: false,
            at_line_start: true,
            done: false,
        }
    }

    fn push(&mut self, token: Token<'s>) {
        if token.is_empty() {
            return;
        }
        self.emitted_any = true;
        self.at_line_start = token.as_bytes().ends_with(b"\n");
        self.pending.push_back(token);
    }

    /// End the current line, keep up to `max_blank_lines` of `blank`, and
    /// indent the next one. Nothing is emitted before the first content.
    fn newline(&mut self, blank: usize, depth: usize) {
        if self.emitted_any {
            self.push(Token::from("\n"));
            for _ in 0..blank.min(self.config.max_blank_lines) {
                self.push(Token::from("\n"));
            }
        }
        self.push(Token::from(" ".repeat(self.config.indent_width * depth)));
    }

    /// Lay out the text between two leaves (or before the first one).
    fn gap(&mut self, gap: &'s str, depth: usize) {
        let mut lines = gap.split('\n');
        let head = lines.next().unwrap_or("").trim();
        let rest: Vec<&'s str> = lines.collect();

        if rest.is_empty() {
            if !head.is_empty() {
                self.separate();
                self.push(Token::from(head));
                self.push(Token::from(" "));
            } else if !gap.is_empty() {
                self.separate();
            }
            return;
        }

        if !head.is_empty() {
            self.separate();
            self.push(Token::from(head));
        }

        let (last, middle) = rest.split_last().map_or(("", &[][..]), |(l, m)| (*l, m));
        let mut blank = 0;
        for line in middle {
            let text = line.trim();
            if text.is_empty() {
                blank += 1;
                continue;
            }
            self.newline(blank, depth);
            self.push(Token::from(text));
            blank = 0;
        }

        self.newline(blank, depth);
        let last = last.trim();
        if !last.is_empty() {
            self.push(Token::from(last));
            self.push(Token::from(" "));
        }
    }

    /// Keep whatever follows the last leaf, then end the output with one newline.
    fn trailer(&mut self, trailer: &'s str) {
        let mut lines = trailer.split('\n');
        let head = lines.next().unwrap_or("").trim();
        if !head.is_empty() {
            self.separate();
            self.push(Token::from(head));
        }

        let mut blank = 0;
        for line in lines {
            let text = line.trim();
            if text.is_empty() {
                blank += 1;
                continue;
            }
            self.newline(blank, 0);
            self.push(Token::from(text));
            blank = 0;
        }

        if self.emitted_any && !self.at_line_start {
            self.push(Token::from("\n"));
        }
    }

    fn separate(&mut self) {
        if self.emitted_any && !self.at_line_start {
            self.push(Token::from(" "));
        }
    }

    fn advance(&mut self) {
        let source = self.source;
        let index = self.next;
        self.next += 1;

        if index == self.leaves.len() {
            let tail_start = self.leaves.last().map_or(0, |l| l.end);
            self.trailer(&source[tail_start..]);
            self.done = true;
            return;
        }

        let leaf = self.leaves[index];
        let gap_start = if index == 0 {
            0
        } else {
            self.leaves[index - 1].end
        };
        self.gap(&source[gap_start..leaf.start], leaf.depth);
        self.push(Token::from(&source[leaf.start..leaf.end]));
    }
}

impl<'s> Iterator for Rendering<'s> {
    type Item = Token<'s>;

    fn next(&mut self) -> Option<Token<'s>> {
        loop {
            if let Some(token) = self.pending.pop_front() {
                return Some(token);
            }
            if self.done {
                return None;
            }
            self.advance();
        }
    }
}
