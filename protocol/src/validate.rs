// SPDX-License-Identifier: LGPL-3.0-only
// SPDX-FileCopyrightText: 2023 Denis Drakhnia <numas13@gmail.com>

//! Answer to the master server `secure` challenge.
//!
//! The master server sends `\basic\\secure\CHALLENGE` right after the
//! connection is accepted and expects a `validate` key computed from the
//! challenge and the handoff key of the game. The algorithm is a RC4 style
//! key schedule followed by a base64 like encoding with its own alphabet.

use crate::cursor::DELIMITER;

/// Index of the challenge field in the first master server message.
const CHALLENGE_FIELD: usize = 4;

/// Minimal size of the work buffer.
const MIN_KEY_LEN: usize = 6;

/// Returns the challenge from the first master server message.
///
/// Returns an empty string if the message has too few fields.
pub fn extract_challenge(msg: &[u8]) -> &[u8] {
    msg.split(|&c| c == DELIMITER)
        .nth(CHALLENGE_FIELD)
        .unwrap_or_default()
}

fn encode_char(value: u8) -> char {
    let c = match value {
        0..=25 => value + 65,
        26..=51 => value + 71,
        52..=61 => value - 4,
        62 => b'+',
        _ => b'/',
    };
    c as char
}

/// Computes the `validate` token for a `challenge`.
///
/// Only complete 3-byte groups are encoded, trailing bytes are dropped.
pub fn scramble(challenge: &[u8], handoff: &[u8]) -> String {
    let mut table = [0_u8; 256];
    for (i, v) in table.iter_mut().enumerate() {
        *v = i as u8;
    }

    let mut acc = 0_u8;
    for i in 0..table.len() {
        let h = match handoff.len() {
            0 => 0,
            n => handoff[i % n],
        };
        acc = acc.wrapping_add(table[i]).wrapping_add(h);
        table.swap(i, acc as usize);
    }

    let mut key = vec![0_u8; challenge.len().max(MIN_KEY_LEN)];
    let mut x = 0_u8;
    let mut y = 0_u8;
    for (i, &c) in challenge.iter().enumerate() {
        x = x.wrapping_add(c).wrapping_add(1);
        let a = table[x as usize];
        y = y.wrapping_add(a);
        let b = table[y as usize];
        table[y as usize] = a;
        table[x as usize] = b;
        key[i] = c ^ table[a.wrapping_add(b) as usize];
    }

    let groups = challenge.len() / 3;
    let mut out = String::with_capacity(groups * 4);
    for g in key.chunks_exact(3).take(groups) {
        let (a, b, c) = (g[0], g[1], g[2]);
        out.push(encode_char(a >> 2));
        out.push(encode_char(((a & 3) << 4) | (b >> 4)));
        out.push(encode_char(((b & 15) << 2) | (c >> 6)));
        out.push(encode_char(c & 63));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::HANDOFF_KEY;

    #[test]
    fn challenge_field() {
        assert_eq!(extract_challenge(b"\\basic\\\\secure\\wookie"), b"wookie");
        assert_eq!(
            extract_challenge(b"\\basic\\\\secure\\TXKOAT\\final\\"),
            b"TXKOAT"
        );
        assert_eq!(extract_challenge(b"\\basic\\\\secure"), b"");
        assert_eq!(extract_challenge(b""), b"");
    }

    #[test]
    fn known_answers() {
        assert_eq!(scramble(b"wookie", HANDOFF_KEY), "2/TYFMRc");
        assert_eq!(scramble(b"ABCDEF", HANDOFF_KEY), "5OOIQ5Ha");
        assert_eq!(scramble(b"TXKOAT", HANDOFF_KEY), "wptAmKCn");
    }

    #[test]
    fn short_challenge() {
        assert_eq!(scramble(b"abc", HANDOFF_KEY), "QnhL");
        assert_eq!(scramble(b"ab", HANDOFF_KEY), "");
        assert_eq!(scramble(b"", HANDOFF_KEY), "");
    }

    #[test]
    fn trailing_bytes_dropped() {
        // the key stream does not depend on the bytes after a group
        assert_eq!(scramble(b"abcdefgh", HANDOFF_KEY), "QnhL/w4k");
        assert_eq!(scramble(b"abcdefgh", HANDOFF_KEY), scramble(b"abcdefg", HANDOFF_KEY));
    }

    #[test]
    fn deterministic_length() {
        let mut rng = fastrand::Rng::with_seed(0x5ec0de);
        for len in 0..40 {
            let challenge: Vec<u8> = (0..len).map(|_| rng.alphanumeric() as u8).collect();
            let a = scramble(&challenge, HANDOFF_KEY);
            let b = scramble(&challenge, HANDOFF_KEY);
            assert_eq!(a, b);
            assert_eq!(a.len(), 4 * (len / 3));
            assert!(a.chars().all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '/'));
        }
    }

    #[test]
    fn empty_handoff() {
        assert_eq!(scramble(b"wookie", b"").len(), 8);
    }
}
