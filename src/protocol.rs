//! Length-prefixed request protocol parsing.
//!
//! A request frame is an ASCII decimal body length, a `:` delimiter,
//! then exactly that many body bytes. The body is itself `:`-separated:
//! `get:<key>`, `set:<key>:<value>`, or `del:<key>`.
//!
//! The protocol carries no error channel: anything that does not parse
//! into a command is dropped without a reply.

use std::str;

/// Longest accepted length prefix: the decimal digit count of
/// `u64::MAX`. A header running longer without its `:` is malformed,
/// so frame headers stay bounded.
const MAX_LENGTH_DIGITS: usize = 20;

/// A decoded request command. Commands are case-sensitive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Look up a key; a hit is answered with the raw value bytes.
    Get { key: Vec<u8> },
    /// Store a key-value pair. Never answered.
    Set { key: Vec<u8>, value: Vec<u8> },
    /// Delete a key. Never answered.
    Del { key: Vec<u8> },
}

/// Result of scanning a buffer for the `<digits>:` length prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LengthParse {
    /// Prefix complete: the body length and the bytes the header used.
    Complete { body_len: usize, header_len: usize },
    /// No `:` seen yet; more bytes needed.
    Incomplete,
    /// Prefix is not a decimal number, or ran past the digit budget.
    Malformed,
}

/// Scan `buffer` for the length prefix.
pub fn parse_length(buffer: &[u8]) -> LengthParse {
    match buffer.iter().position(|&b| b == b':') {
        Some(pos) => {
            let digits = &buffer[..pos];
            if digits.is_empty()
                || digits.len() > MAX_LENGTH_DIGITS
                || !digits.iter().all(u8::is_ascii_digit)
            {
                return LengthParse::Malformed;
            }
            // All-ASCII digits, so conversion can only fail on u64
            // overflow.
            match str::from_utf8(digits).ok().and_then(|s| s.parse::<u64>().ok()) {
                Some(len) => LengthParse::Complete {
                    body_len: len as usize,
                    header_len: pos + 1,
                },
                None => LengthParse::Malformed,
            }
        }
        None if buffer.len() > MAX_LENGTH_DIGITS => LengthParse::Malformed,
        None => LengthParse::Incomplete,
    }
}

/// Parse a request body into a command.
///
/// Tokenization follows `strtok`: empty tokens are skipped and tokens
/// past the ones a command consumes are ignored. Unknown commands and
/// commands missing arguments parse to `None`; the caller drops them
/// silently.
pub fn parse_command(body: &[u8]) -> Option<Command> {
    let mut tokens = body.split(|&b| b == b':').filter(|t| !t.is_empty());

    match tokens.next()? {
        b"get" => Some(Command::Get {
            key: tokens.next()?.to_vec(),
        }),
        b"set" => Some(Command::Set {
            key: tokens.next()?.to_vec(),
            value: tokens.next()?.to_vec(),
        }),
        b"del" => Some(Command::Del {
            key: tokens.next()?.to_vec(),
        }),
        _ => None,
    }
}
