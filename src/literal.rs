//! Parser for the mapping literal returned by the language model.
//!
//! Accepts exactly one `{ "key": "value", ... }` literal whose keys and
//! values are single- or double-quoted strings. Anything else, including
//! prose around the literal, is an error. A response wrapped in a markdown
//! code block is unwrapped first.

use crate::affiliations::AffiliationMap;
use crate::error::{Result, ScrapeError};

/// Parse a model response into an [`AffiliationMap`].
///
/// `{}` and `{ }` yield an empty map, which is a valid result and not an error.
pub fn parse_mapping(content: &str) -> Result<AffiliationMap> {
    let body = strip_code_block(content);
    let mut parser = Parser::new(body);
    let map = parser.mapping()?;
    parser.skip_whitespace();
    if !parser.at_end() {
        return Err(parser.error("unexpected trailing content"));
    }
    Ok(map)
}

/// Unwrap a markdown code block (```` ``` ```` or ```` ```python ````)
fn strip_code_block(content: &str) -> &str {
    let trimmed = content.trim();
    if !trimmed.starts_with("```") {
        return trimmed;
    }

    let after_ticks = &trimmed[3..];
    let after_fence = match after_ticks.find('\n') {
        Some(idx) => &after_ticks[idx + 1..],
        // Fence and literal on one line: drop the language tag
        None => after_ticks.trim_start_matches(|c: char| c.is_ascii_alphanumeric()),
    };
    let after_fence = after_fence.trim();
    after_fence
        .strip_suffix("```")
        .unwrap_or(after_fence)
        .trim()
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn at_end(&self) -> bool {
        self.pos >= self.src.len()
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.bump();
        }
    }

    fn error(&self, msg: &str) -> ScrapeError {
        ScrapeError::Literal(format!("{} at offset {}", msg, self.pos))
    }

    fn expect(&mut self, want: char) -> Result<()> {
        match self.bump() {
            Some(c) if c == want => Ok(()),
            Some(c) => Err(self.error(&format!("expected '{}', found '{}'", want, c))),
            None => Err(self.error(&format!("expected '{}', found end of input", want))),
        }
    }

    fn mapping(&mut self) -> Result<AffiliationMap> {
        let mut map = AffiliationMap::new();

        self.skip_whitespace();
        self.expect('{')?;
        self.skip_whitespace();
        if self.peek() == Some('}') {
            self.bump();
            return Ok(map);
        }

        loop {
            let key = self.string()?;
            self.skip_whitespace();
            self.expect(':')?;
            self.skip_whitespace();
            let value = self.string()?;
            map.insert(key, value);

            self.skip_whitespace();
            match self.bump() {
                Some(',') => {
                    self.skip_whitespace();
                    // Trailing comma
                    if self.peek() == Some('}') {
                        self.bump();
                        return Ok(map);
                    }
                }
                Some('}') => return Ok(map),
                Some(c) => return Err(self.error(&format!("expected ',' or '}}', found '{}'", c))),
                None => return Err(self.error("unterminated mapping")),
            }
        }
    }

    fn string(&mut self) -> Result<String> {
        let quote = match self.peek() {
            Some(q @ ('"' | '\'')) => q,
            Some(c) => return Err(self.error(&format!("expected string, found '{}'", c))),
            None => return Err(self.error("expected string, found end of input")),
        };
        self.bump();

        let mut out = String::new();
        loop {
            match self.bump() {
                None => return Err(self.error("unterminated string")),
                Some('\n') => return Err(self.error("newline in string")),
                Some(c) if c == quote => return Ok(out),
                Some('\\') => self.escape(&mut out)?,
                Some(c) => out.push(c),
            }
        }
    }

    fn escape(&mut self, out: &mut String) -> Result<()> {
        match self.bump() {
            None => Err(self.error("unterminated escape")),
            Some('n') => {
                out.push('\n');
                Ok(())
            }
            Some('t') => {
                out.push('\t');
                Ok(())
            }
            Some('r') => {
                out.push('\r');
                Ok(())
            }
            Some('0') => {
                out.push('\0');
                Ok(())
            }
            Some(c @ ('\\' | '\'' | '"')) => {
                out.push(c);
                Ok(())
            }
            // Line continuation
            Some('\n') => Ok(()),
            Some('x') => self.hex_escape(2, out),
            Some('u') => self.hex_escape(4, out),
            Some('U') => self.hex_escape(8, out),
            Some(c) => {
                // Unknown escapes keep the backslash
                out.push('\\');
                out.push(c);
                Ok(())
            }
        }
    }

    fn hex_escape(&mut self, digits: usize, out: &mut String) -> Result<()> {
        let end = self.pos + digits;
        let hex = self
            .src
            .get(self.pos..end)
            .ok_or_else(|| self.error("truncated hex escape"))?;
        let code = u32::from_str_radix(hex, 16).map_err(|_| self.error("invalid hex escape"))?;
        let c = char::from_u32(code).ok_or_else(|| self.error("invalid code point"))?;
        self.pos = end;
        out.push(c);
        Ok(())
    }
}
