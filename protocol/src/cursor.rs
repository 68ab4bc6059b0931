// SPDX-License-Identifier: LGPL-3.0-only
// SPDX-FileCopyrightText: 2023 Denis Drakhnia <numas13@gmail.com>

mod read;
mod write;

pub use read::{Cursor, GetKeyValue};
pub use write::{CursorMut, PutKeyValue};

/// Field delimiter.
pub const DELIMITER: u8 = b'\\';
/// Key that terminates a message.
pub const FINAL: &str = "final";
/// Key that numbers the datagrams of a response, not part of the payload.
pub const QUERY_ID: &str = "queryid";

/// Decoded key/value message.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Decoded {
    /// Key/value pairs in the order they were received.
    pub entries: Vec<(String, String)>,
    /// `true` if the `final` key was seen.
    pub terminated: bool,
}

impl Decoded {
    /// Returns `true` if nothing was decoded.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && !self.terminated
    }

    /// Appends pairs from another message.
    pub fn extend(&mut self, other: Decoded) {
        self.entries.extend(other.entries);
        self.terminated |= other.terminated;
    }
}

/// Decodes a `\key\value` message.
///
/// Never fails, malformed input yields whatever pairs could be extracted.
/// Empty tokens are skipped, a trailing key without a value is dropped.
pub fn decode(src: &[u8]) -> Decoded {
    let tokens: Vec<&[u8]> = Cursor::new(src).collect();
    let mut ret = Decoded::default();

    for pair in tokens.chunks_exact(2) {
        let key = read::to_text(pair[0]);
        if key.eq_ignore_ascii_case(FINAL) {
            ret.terminated = true;
            continue;
        }
        if key.eq_ignore_ascii_case(QUERY_ID) {
            continue;
        }
        ret.entries.push((key, read::to_text(pair[1])));
    }

    // "final" may be the unpaired last token
    if !ret.terminated {
        if let Some(last) = tokens.last() {
            ret.terminated = last.eq_ignore_ascii_case(FINAL.as_bytes());
        }
    }

    ret
}

/// Encodes pairs as a `\key\value` message.
pub fn encode<K, V>(entries: &[(K, V)]) -> Vec<u8>
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut buf = Vec::new();
    let mut cur = CursorMut::new(&mut buf);
    for (key, value) in entries {
        cur.put_key(key.as_ref(), value.as_ref());
    }
    buf
}
