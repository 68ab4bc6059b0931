// SPDX-License-Identifier: LGPL-3.0-only
// SPDX-FileCopyrightText: 2023 Denis Drakhnia <numas13@gmail.com>

//! Game server query packets.

use std::fmt;

use crate::cursor::CursorMut;
use crate::Error;

/// Query sent to a game server over UDP.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Query {
    /// Short server information, the answer contains `gametype`.
    Info,
    /// Full server rules, may include the player list.
    Status,
    /// Player list.
    Players,
}

impl Query {
    /// Returns the query verb.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Status => "status",
            Self::Players => "players",
        }
    }

    /// Parses a query verb ignoring case and surrounding delimiters.
    pub fn parse(s: &str) -> Result<Self, Error> {
        let s = s.trim_matches('\\');
        [Self::Info, Self::Status, Self::Players]
            .into_iter()
            .find(|q| q.as_str().eq_ignore_ascii_case(s))
            .ok_or(Error::InvalidPacket)
    }

    /// Encode packet to `buf`.
    pub fn encode(&self, buf: &mut Vec<u8>) -> usize {
        CursorMut::new(buf).put_verb(self.as_str()).pos()
    }
}

impl fmt::Display for Query {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode() {
        let mut buf = Vec::new();
        let n = Query::Info.encode(&mut buf);
        assert_eq!(&buf[..n], b"\\info\\");

        buf.clear();
        Query::Status.encode(&mut buf);
        assert_eq!(&buf[..], b"\\status\\");

        buf.clear();
        Query::Players.encode(&mut buf);
        assert_eq!(&buf[..], b"\\players\\");
    }

    #[test]
    fn parse() {
        assert_eq!(Query::parse("info"), Ok(Query::Info));
        assert_eq!(Query::parse("\\STATUS\\"), Ok(Query::Status));
        assert_eq!(Query::parse("Players"), Ok(Query::Players));
        assert_eq!(Query::parse("rules"), Err(Error::InvalidPacket));
        assert_eq!(Query::parse(""), Err(Error::InvalidPacket));
    }
}
