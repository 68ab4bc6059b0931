// SPDX-License-Identifier: LGPL-3.0-only
// SPDX-FileCopyrightText: 2023 Denis Drakhnia <numas13@gmail.com>

use core::fmt::{self, Write};

use super::{DELIMITER, FINAL};

/// Value that can be written after a key.
pub trait PutKeyValue {
    /// Writes the value to the cursor.
    fn put_key_value<'a, 'b>(&self, cur: &'b mut CursorMut<'a>) -> &'b mut CursorMut<'a>;
}

impl<T> PutKeyValue for &T
where
    T: PutKeyValue + ?Sized,
{
    fn put_key_value<'a, 'b>(&self, cur: &'b mut CursorMut<'a>) -> &'b mut CursorMut<'a> {
        (*self).put_key_value(cur)
    }
}

impl PutKeyValue for str {
    fn put_key_value<'a, 'b>(&self, cur: &'b mut CursorMut<'a>) -> &'b mut CursorMut<'a> {
        cur.put_str(self)
    }
}

impl PutKeyValue for String {
    fn put_key_value<'a, 'b>(&self, cur: &'b mut CursorMut<'a>) -> &'b mut CursorMut<'a> {
        cur.put_str(self)
    }
}

impl PutKeyValue for bool {
    fn put_key_value<'a, 'b>(&self, cur: &'b mut CursorMut<'a>) -> &'b mut CursorMut<'a> {
        cur.put_u8(if *self { b'1' } else { b'0' })
    }
}

macro_rules! impl_put_key_value {
    ($($t:ty),+ $(,)?) => {
        $(impl PutKeyValue for $t {
            fn put_key_value<'a, 'b>(&self, cur: &'b mut CursorMut<'a>) -> &'b mut CursorMut<'a> {
                cur.put_as_str(self)
            }
        })+
    };
}

impl_put_key_value! {
    u8,
    u16,
    u32,
    u64,

    i8,
    i16,
    i32,
    i64,
}

/// Writer for `\key\value` messages.
pub struct CursorMut<'a> {
    buffer: &'a mut Vec<u8>,
}

impl<'a> CursorMut<'a> {
    /// Creates a new cursor appending to `buffer`.
    pub fn new(buffer: &'a mut Vec<u8>) -> Self {
        Self { buffer }
    }

    /// Returns the number of bytes in the buffer.
    pub fn pos(&self) -> usize {
        self.buffer.len()
    }

    /// Appends raw bytes.
    pub fn put_bytes(&mut self, s: &[u8]) -> &mut Self {
        self.buffer.extend_from_slice(s);
        self
    }

    /// Appends a string.
    pub fn put_str(&mut self, s: &str) -> &mut Self {
        self.put_bytes(s.as_bytes())
    }

    /// Appends a byte.
    #[inline(always)]
    pub fn put_u8(&mut self, n: u8) -> &mut Self {
        self.buffer.push(n);
        self
    }

    /// Appends a formatted value.
    pub fn put_as_str<T: fmt::Display>(&mut self, value: T) -> &mut Self {
        // writing into a Vec can not fail
        let _ = write!(self, "{}", value);
        self
    }

    /// Appends a value.
    pub fn put_key_value<T: PutKeyValue>(&mut self, value: T) -> &mut Self {
        value.put_key_value(self)
    }

    /// Appends a key without a value, `\key\`.
    pub fn put_verb(&mut self, key: &str) -> &mut Self {
        self.put_u8(DELIMITER).put_str(key).put_u8(DELIMITER)
    }

    /// Appends `\key\value`.
    pub fn put_key<T: PutKeyValue>(&mut self, key: &str, value: T) -> &mut Self {
        self.put_u8(DELIMITER)
            .put_str(key)
            .put_u8(DELIMITER)
            .put_key_value(value)
    }

    /// Appends the terminator, `\final\`.
    pub fn put_final(&mut self) -> &mut Self {
        self.put_verb(FINAL)
    }
}

impl fmt::Write for CursorMut<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.put_str(s);
        Ok(())
    }
}
