// Copyright 2022 OpenStax Poland
// Licensed under the MIT license. See LICENSE file in the project root for
// full license text.

//! Frontend SMTP state machine, from greeting up to the STARTTLS upgrade

use std::io;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::util;
use super::{command, error::{CommandError, Error, SmtpError}};

/// Longest command line accepted, including CRLF (RFC 5321 section 4.5.3.1.4)
pub const MAX_LINE_LEN: usize = 512;

/// Extensions advertised in reply to EHLO, in wire order
pub const CAPABILITIES: &[&str] = &[
    "250-PIPELINING",
    "250-8BITMIME",
    "250-ENHANCEDSTATUSCODES",
    "250-CHUNKING",
    "250-STARTTLS",
    "250-SMTPUTF8",
    "250 SIZE 33554432",
];

pub const STARTTLS_READY: &[u8] = b"220 2.0.0 Ready to start TLS\r\n";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum State {
    Greeting,
    AwaitEhlo,
    Capabilities,
    AwaitStartTls,
    /// Plaintext negotiation is over, the next bytes are a TLS ClientHello
    Sniffing,
}

pub struct Session<S> {
    conn: BufReader<S>,
    peer: String,
    state: State,
    ehlo_domain: String,
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(conn: S, peer: String) -> Self {
        Session {
            conn: BufReader::new(conn),
            peer,
            state: State::Greeting,
            ehlo_domain: String::new(),
        }
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Domain the client announced in EHLO, empty until EHLO succeeded
    pub fn ehlo_domain(&self) -> &str {
        &self.ehlo_domain
    }

    /// Underlying connection
    ///
    /// Reading through the returned reader also drains bytes that were
    /// buffered while reading command lines.
    pub fn conn_mut(&mut self) -> &mut BufReader<S> {
        &mut self.conn
    }

    /// Run the plaintext part of the session, leaving it in [`State::Sniffing`]
    pub async fn negotiate(&mut self, advertise_name: &str) -> Result<(), Error> {
        self.greet(advertise_name).await?;
        self.expect_ehlo().await?;
        self.advertise().await?;
        self.expect_starttls().await
    }

    async fn greet(&mut self, advertise_name: &str) -> Result<(), Error> {
        debug_assert_eq!(self.state, State::Greeting);

        let greeting = format!("220 {advertise_name} ESMTP server is submissive (and breedable)\r\n");
        self.write(greeting.as_bytes()).await?;
        self.state = State::AwaitEhlo;
        Ok(())
    }

    async fn expect_ehlo(&mut self) -> Result<(), Error> {
        debug_assert_eq!(self.state, State::AwaitEhlo);

        let line = self.read_line().await?;
        self.ehlo_domain = command::parse_ehlo(&line)?;
        self.state = State::Capabilities;

        log::debug!("[{}] EHLO {}", self.peer, self.ehlo_domain);
        Ok(())
    }

    async fn advertise(&mut self) -> Result<(), Error> {
        debug_assert_eq!(self.state, State::Capabilities);

        let mut response = format!("250-Hello {}\r\n", self.ehlo_domain);
        for capability in CAPABILITIES {
            response.push_str(capability);
            response.push_str("\r\n");
        }

        self.write(response.as_bytes()).await?;
        self.state = State::AwaitStartTls;
        Ok(())
    }

    async fn expect_starttls(&mut self) -> Result<(), Error> {
        debug_assert_eq!(self.state, State::AwaitStartTls);

        let line = self.read_line().await?;
        command::parse_starttls(&line)?;

        if self.ehlo_domain.is_empty() {
            return Err(SmtpError::bad_sequence().into());
        }

        self.write(STARTTLS_READY).await?;
        self.state = State::Sniffing;
        Ok(())
    }

    /// Read single line, including its terminator
    async fn read_line(&mut self) -> Result<Vec<u8>, Error> {
        let mut line = Vec::new();
        (&mut self.conn).take(MAX_LINE_LEN as u64).read_until(b'\n', &mut line).await?;

        if !line.ends_with(b"\n") {
            if line.len() == MAX_LINE_LEN {
                return Err(CommandError::TooLong { limit: MAX_LINE_LEN }.into());
            }

            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "connection closed mid-command").into());
        }

        log::trace!("[{}] >> {}", self.peer, util::printable(&line));
        Ok(line)
    }

    async fn write(&mut self, data: &[u8]) -> io::Result<()> {
        log::trace!("[{}] << {}", self.peer, util::printable(data));
        self.conn.write_all(data).await?;
        self.conn.flush().await
    }
}
