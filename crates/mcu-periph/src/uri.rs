//! Cursor-based matcher for connection strings.
//!
//! Connection strings look like `scheme[://[authority]][/path]`, but every
//! backend accepts a slightly different shape (`pigpiod://host:port/1`,
//! `mpsse://0403:6014/`, bare `linuxdev`). Instead of a grammar, each backend
//! strings together a handful of scan primitives on a [`Cursor`]:
//!
//! ```
//! use mcu_periph::uri::Cursor;
//!
//! let mut cursor = Cursor::from("pigpiod://raspberrypi:8888/1");
//! assert_eq!(cursor.match_literal("pigpiod").unwrap(), 7);
//! assert_eq!(cursor.match_literal("://").unwrap(), 3);
//!
//! let mut host = heapless::String::<32>::new();
//! cursor.capture_until(":/", &mut host).unwrap();
//! assert_eq!(host.as_str(), "raspberrypi");
//! ```
//!
//! Every primitive returns how many characters it consumed; `0` is a
//! mismatch, not an error, so callers can branch between alternatives.

use bitflags::bitflags;
use tracing::trace;

use crate::error::{Error, Result};

bitflags! {
    /// Modifiers for [`Cursor::scan`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct MatchFlags: u8 {
        /// Report the match length without advancing the cursor.
        const PRESERVE = 0x10;
    }
}

/// Hexadecimal digit class, for VID/PID style fields.
pub const HEX_DIGITS: &str = "0123456789abcdefABCDEF";
/// Decimal digit class.
pub const DEC_DIGITS: &str = "0123456789";

/// What a single [`Cursor::scan`] call matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Match<'p> {
    /// The whole pattern, in order, or nothing.
    Literal(&'p str),
    /// The longest run of characters contained in the set.
    Chars(&'p str),
    /// The longest run of characters not contained in the set.
    Until(&'p str),
}

/// Destination for characters consumed by a scan.
///
/// Fixed-capacity buffers truncate silently once full.
pub trait Capture {
    fn clear(&mut self);
    /// Append one character; returns `false` once the buffer is full.
    fn push(&mut self, c: char) -> bool;
}

impl<const N: usize> Capture for heapless::String<N> {
    fn clear(&mut self) {
        heapless::String::clear(self);
    }

    fn push(&mut self, c: char) -> bool {
        heapless::String::push(self, c).is_ok()
    }
}

impl Capture for String {
    fn clear(&mut self) {
        String::clear(self);
    }

    fn push(&mut self, c: char) -> bool {
        String::push(self, c);
        true
    }
}

/// Read position within an optional connection string.
///
/// A cursor built without a source (`Cursor::new(None)`) reports
/// [`Error::InvalidUri`] from every scan; an exhausted cursor simply matches
/// nothing.
#[derive(Debug, Clone, Copy)]
pub struct Cursor<'a> {
    src: Option<&'a str>,
    pos: usize,
}

impl<'a> From<&'a str> for Cursor<'a> {
    fn from(src: &'a str) -> Self {
        Self::new(Some(src))
    }
}

impl<'a> Cursor<'a> {
    pub const fn new(src: Option<&'a str>) -> Self {
        Self { src, pos: 0 }
    }

    /// Whether a source string was supplied at all.
    pub fn has_source(&self) -> bool {
        self.src.is_some()
    }

    /// The unconsumed remainder.
    pub fn rest(&self) -> &'a str {
        self.src.map_or("", |s| &s[self.pos..])
    }

    pub fn is_at_end(&self) -> bool {
        self.rest().is_empty()
    }

    /// Byte offset of the cursor within the source.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Run one match against the remainder.
    ///
    /// Consumed characters are copied into `capture` (cleared first). A
    /// partial [`Match::Literal`] consumes and captures nothing. With
    /// [`MatchFlags::PRESERVE`] the cursor stays where it was.
    pub fn scan(
        &mut self,
        pattern: Match<'_>,
        flags: MatchFlags,
        mut capture: Option<&mut dyn Capture>,
    ) -> Result<usize> {
        let rest = self.source()?.get(self.pos..).unwrap_or("");
        if let Some(buf) = capture.as_deref_mut() {
            buf.clear();
        }

        let mut literal = match pattern {
            Match::Literal(p) => Some(p.chars()),
            _ => None,
        };
        let mut consumed = 0;
        let mut bytes = 0;
        let mut full = false;

        for c in rest.chars() {
            let matched = match (pattern, literal.as_mut()) {
                (Match::Chars(set), _) => set.contains(c),
                (Match::Until(set), _) => !set.contains(c),
                (Match::Literal(_), Some(expected)) => {
                    match expected.clone().next() {
                        Some(e) if e == c => {
                            expected.next();
                            true
                        }
                        _ => false,
                    }
                }
                (Match::Literal(_), None) => false,
            };
            trace!(ch = %c, ?pattern, matched, "uri scan");
            if !matched {
                break;
            }
            if let Some(buf) = capture.as_deref_mut() {
                if !full && !buf.push(c) {
                    full = true;
                }
            }
            consumed += 1;
            bytes += c.len_utf8();
        }

        if let Some(mut expected) = literal {
            if expected.next().is_some() {
                // Pattern not fully matched.
                if let Some(buf) = capture.as_deref_mut() {
                    buf.clear();
                }
                return Ok(0);
            }
        }

        if !flags.contains(MatchFlags::PRESERVE) {
            self.pos += bytes;
        }
        Ok(consumed)
    }

    pub fn match_literal(&mut self, pattern: &str) -> Result<usize> {
        self.scan(Match::Literal(pattern), MatchFlags::empty(), None)
    }

    pub fn match_chars(&mut self, set: &str) -> Result<usize> {
        self.scan(Match::Chars(set), MatchFlags::empty(), None)
    }

    pub fn match_until(&mut self, set: &str) -> Result<usize> {
        self.scan(Match::Until(set), MatchFlags::empty(), None)
    }

    /// Like [`match_chars`](Self::match_chars), copying the run into `buf`.
    pub fn capture_chars(
        &mut self,
        set: &str,
        buf: &mut dyn Capture,
    ) -> Result<usize> {
        self.scan(Match::Chars(set), MatchFlags::empty(), Some(buf))
    }

    /// Like [`match_until`](Self::match_until), copying the run into `buf`.
    pub fn capture_until(
        &mut self,
        set: &str,
        buf: &mut dyn Capture,
    ) -> Result<usize> {
        self.scan(Match::Until(set), MatchFlags::empty(), Some(buf))
    }

    /// Parse an integer the way C's `strtol` does.
    ///
    /// Leading whitespace and a sign are accepted. Base `0` picks 16 for a
    /// `0x` prefix, 8 for a leading `0` and 10 otherwise; base 16 also
    /// accepts the `0x` prefix. Returns the characters consumed and the
    /// value, saturating on overflow. No digits means `(0, 0)`.
    pub fn match_integer(
        &mut self,
        base: u32,
        flags: MatchFlags,
    ) -> Result<(usize, i64)> {
        if base == 1 || base > 36 {
            return Err(Error::InvalidArgument);
        }
        let rest = self.source()?.get(self.pos..).unwrap_or("");
        let bytes = rest.as_bytes();

        let mut i = 0;
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        let negative = match bytes.get(i) {
            Some(b'-') => {
                i += 1;
                true
            }
            Some(b'+') => {
                i += 1;
                false
            }
            _ => false,
        };

        let has_hex_prefix = bytes.get(i) == Some(&b'0')
            && matches!(bytes.get(i + 1), Some(b'x' | b'X'))
            && bytes.get(i + 2).is_some_and(|b| b.is_ascii_hexdigit());
        let radix = match base {
            0 | 16 if has_hex_prefix => {
                i += 2;
                16
            }
            0 if bytes.get(i) == Some(&b'0') => 8,
            0 => 10,
            b => b,
        };

        let start = i;
        while i < bytes.len() && (bytes[i] as char).is_digit(radix) {
            i += 1;
        }
        if i == start {
            trace!(rest, base, "uri integer: no digits");
            return Ok((0, 0));
        }

        let magnitude = i64::from_str_radix(&rest[start..i], radix);
        let value = match (magnitude, negative) {
            (Ok(v), false) => v,
            (Ok(v), true) => -v,
            (Err(_), false) => i64::MAX,
            (Err(_), true) => i64::MIN,
        };

        if !flags.contains(MatchFlags::PRESERVE) {
            self.pos += i;
        }
        Ok((i, value))
    }

    fn source(&self) -> Result<&'a str> {
        self.src.ok_or(Error::InvalidUri)
    }
}
