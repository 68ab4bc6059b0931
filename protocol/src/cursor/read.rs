// SPDX-License-Identifier: LGPL-3.0-only
// SPDX-FileCopyrightText: 2023 Denis Drakhnia <numas13@gmail.com>

use core::str;

use super::DELIMITER;

/// Converts raw token to a string.
///
/// Old servers send Latin-1 names, newer ones UTF-8.
pub(crate) fn to_text(raw: &[u8]) -> String {
    match str::from_utf8(raw) {
        Ok(s) => s.to_owned(),
        Err(_) => raw.iter().map(|&c| c as char).collect(),
    }
}

/// Typed value of a key.
pub trait GetKeyValue<'a>: Sized {
    /// Parses the value, returns `None` if it is malformed.
    fn get_key_value(value: &'a str) -> Option<Self>;
}

impl<'a> GetKeyValue<'a> for &'a str {
    fn get_key_value(value: &'a str) -> Option<Self> {
        Some(value)
    }
}

impl GetKeyValue<'_> for String {
    fn get_key_value(value: &str) -> Option<Self> {
        Some(value.to_owned())
    }
}

impl GetKeyValue<'_> for bool {
    fn get_key_value(value: &str) -> Option<Self> {
        match value.trim() {
            "1" => Some(true),
            "0" => Some(false),
            s if s.eq_ignore_ascii_case("true") => Some(true),
            s if s.eq_ignore_ascii_case("false") => Some(false),
            _ => None,
        }
    }
}

macro_rules! impl_get_value {
    ($($t:ty),+ $(,)?) => {
        $(impl GetKeyValue<'_> for $t {
            fn get_key_value(value: &str) -> Option<Self> {
                // some servers pad numbers with spaces
                value.trim().parse().ok()
            }
        })+
    };
}

impl_get_value! {
    u8,
    u16,
    u32,
    u64,

    i8,
    i16,
    i32,
    i64,
}

/// Iterator over non-empty tokens of a `\`-delimited message.
#[derive(Copy, Clone)]
pub struct Cursor<'a> {
    buffer: &'a [u8],
}

impl<'a> Cursor<'a> {
    /// Creates a new cursor.
    pub fn new(buffer: &'a [u8]) -> Self {
        Self { buffer }
    }

    /// Returns unread bytes.
    pub fn end(self) -> &'a [u8] {
        self.buffer
    }

    #[inline(always)]
    /// Returns the number of unread bytes.
    pub fn remaining(&self) -> usize {
        self.buffer.len()
    }

    #[inline(always)]
    /// Returns `true` if there are unread bytes.
    pub fn has_remaining(&self) -> bool {
        self.remaining() != 0
    }

    fn skip_delimiters(&mut self) {
        let n = self
            .buffer
            .iter()
            .position(|&c| c != DELIMITER)
            .unwrap_or(self.buffer.len());
        self.buffer = &self.buffer[n..];
    }

    /// Returns the next non-empty token.
    pub fn get_token(&mut self) -> Option<&'a [u8]> {
        self.skip_delimiters();
        if !self.has_remaining() {
            return None;
        }
        let n = self
            .buffer
            .iter()
            .position(|&c| c == DELIMITER)
            .unwrap_or(self.buffer.len());
        let (head, tail) = self.buffer.split_at(n);
        self.buffer = tail;
        Some(head)
    }

    /// Returns the next token as a string.
    pub fn get_str(&mut self) -> Option<String> {
        self.get_token().map(to_text)
    }

    /// Returns the next key and the value.
    ///
    /// Returns `None` if the message ends before the value.
    pub fn get_key(&mut self) -> Option<(String, String)> {
        let mut cur = *self;
        let key = cur.get_str()?;
        let value = cur.get_str()?;
        *self = cur;
        Some((key, value))
    }

    /// Returns `true` if the next token equals `s` ignoring case.
    pub fn peek_token_is(&self, s: &str) -> bool {
        let mut cur = *self;
        cur.get_token()
            .map_or(false, |t| t.eq_ignore_ascii_case(s.as_bytes()))
    }
}

impl<'a> Iterator for Cursor<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        self.get_token()
    }
}
