// SPDX-License-Identifier: LGPL-3.0-only
// SPDX-FileCopyrightText: 2023 Denis Drakhnia <numas13@gmail.com>

use std::{fmt, io, str::FromStr, time::Duration};

use log::{debug, trace};
use tacops_protocol::{
    master::{Challenge, ListRequest, ServerList, Validate},
    types::Str,
    Error as ProtocolError, GAME_NAME, HANDOFF_KEY,
};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
    time,
};

use crate::Error;

/// Time budget for the whole master server exchange.
pub const MASTER_TIMEOUT: Duration = Duration::from_secs(2);

const READ_BUFFER_SIZE: usize = 8192;

/// Master server address.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MasterEndpoint {
    /// Host name or IP address.
    pub host: String,
    /// TCP port.
    pub port: u16,
}

impl MasterEndpoint {
    /// Creates a new `MasterEndpoint`.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl FromStr for MasterEndpoint {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (host, port) = s
            .rsplit_once(':')
            .filter(|(host, _)| !host.is_empty() && !host.contains(':'))
            .ok_or_else(|| ProtocolError::InvalidAddress(s.to_owned()))?;
        let port = port
            .parse::<u16>()
            .ok()
            .filter(|&i| i != 0)
            .ok_or_else(|| ProtocolError::InvalidPort(port.to_owned()))?;
        Ok(Self::new(host, port))
    }
}

impl fmt::Display for MasterEndpoint {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "{}:{}", self.host, self.port)
    }
}

/// Progress of a master server exchange.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum State {
    /// Opening the TCP connection.
    Connecting,
    /// Waiting for the `secure` challenge.
    AwaitingChallenge,
    /// Sending the answer to the challenge.
    Validating,
    /// Sending the list request.
    RequestingList,
    /// Receiving the address list.
    ReceivingList,
    /// The list was received.
    Done,
    /// The exchange failed.
    Failed,
}

impl fmt::Display for State {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            Self::Connecting => "connecting",
            Self::AwaitingChallenge => "awaiting challenge",
            Self::Validating => "validating",
            Self::RequestingList => "requesting list",
            Self::ReceivingList => "receiving list",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        fmt.write_str(s)
    }
}

/// Downloads game server addresses from a master server.
///
/// The whole exchange is bounded by `timeout`. Returned addresses are not
/// validated and may contain duplicates.
pub async fn download_server_list(
    endpoint: &MasterEndpoint,
    timeout: Duration,
) -> Result<Vec<String>, Error> {
    let mut state = State::Connecting;
    let list = run(endpoint, timeout, &mut state).await?;
    debug!("master {endpoint}: received {} addresses", list.len());
    Ok(list)
}

/// Leaves `state` at `Done` or `Failed`.
async fn run(
    endpoint: &MasterEndpoint,
    timeout: Duration,
    state: &mut State,
) -> Result<Vec<String>, Error> {
    let result = match time::timeout(timeout, exchange(endpoint, state)).await {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout),
    };
    if let Err(e) = &result {
        debug!("master {endpoint}: failed while {state}: {e}");
        *state = State::Failed;
    }
    result
}

async fn exchange(endpoint: &MasterEndpoint, state: &mut State) -> Result<Vec<String>, Error> {
    let mut stream = TcpStream::connect((endpoint.host.as_str(), endpoint.port)).await?;
    let mut buf = vec![0; READ_BUFFER_SIZE];

    *state = State::AwaitingChallenge;
    let n = stream.read(&mut buf).await?;
    if n == 0 {
        return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into());
    }
    trace!("master {endpoint}: recv \"{}\"", Str(&buf[..n]));
    let challenge = Challenge::decode(&buf[..n])?;

    *state = State::Validating;
    let token = challenge.validate(HANDOFF_KEY);
    let mut out = Vec::new();
    Validate::new(GAME_NAME, &token).encode(&mut out);
    stream.write_all(&out).await?;

    *state = State::RequestingList;
    out.clear();
    ListRequest::new(GAME_NAME).encode(&mut out);
    stream.write_all(&out).await?;

    *state = State::ReceivingList;
    let mut list = ServerList::new();
    while !list.is_complete() {
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        list.push(&buf[..n]);
    }
    trace!("master {endpoint}: list of {} bytes", list.len());

    *state = State::Done;
    Ok(list.addresses())
}
