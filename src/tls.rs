// Copyright 2022 OpenStax Poland
// Licensed under the MIT license. See LICENSE file in the project root for
// full license text.

//! Server name sniffing from a TLS ClientHello
//!
//! Handshake records are read off the client connection through [`Capture`]
//! until a whole ClientHello has arrived, and its `server_name` extension is
//! parsed with `tls-parser`. No TLS state machine runs on our side, so every
//! protocol version and extension set the client offers is left for the
//! backend to accept or refuse. The sniffer only ever holds a reader, nothing
//! can be written to the client, and every byte read is kept for replay.

use std::{io, pin::Pin, task::{Context, Poll}};
use thiserror::Error;
use tls_parser::{
    MAX_RECORD_LEN, SNIType, TlsExtension, TlsHandshakeType, TlsMessage, TlsMessageHandshake,
    TlsRecordType,
};
use tokio::io::{AsyncRead, AsyncReadExt, ReadBuf};

use crate::smtp::error::{Error, SmtpError};

const RECORD_HEADER_LEN: usize = 5;

const HANDSHAKE_HEADER_LEN: usize = 4;

/// Largest ClientHello handshake message we are willing to buffer
const MAX_CLIENT_HELLO_LEN: usize = 64 * 1024;

/// Reader which records everything read through it
pub struct Capture<'a, S> {
    inner: &'a mut S,
    transcript: &'a mut Vec<u8>,
}

impl<'a, S> Capture<'a, S> {
    pub fn new(inner: &'a mut S, transcript: &'a mut Vec<u8>) -> Self {
        Capture { inner, transcript }
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for Capture<'_, S> {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>)
    -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let before = buf.filled().len();

        let result = Pin::new(&mut *this.inner).poll_read(cx, buf);

        if let Poll::Ready(Ok(())) = result {
            this.transcript.extend_from_slice(&buf.filled()[before..]);
        }

        result
    }
}

/// Why no server name could be taken from the client's first flight
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SniffError {
    #[error("expected a TLS handshake record, got content type {0:#04x}")]
    NotHandshake(u8),
    #[error("invalid TLS record length {0}")]
    RecordLength(u16),
    #[error("expected a ClientHello, got handshake message type {0:#04x}")]
    NotClientHello(u8),
    #[error("ClientHello of {0} bytes is too large")]
    TooLarge(usize),
    #[error("malformed ClientHello")]
    Malformed,
    #[error("ClientHello carries no host name")]
    NoServerName,
    #[error("host name in ClientHello is not valid UTF-8")]
    Encoding,
}

/// Read the client's ClientHello and return the server name it asks for
///
/// All bytes read from `conn` are appended to `client_hello`, whether or not
/// a server name was found. Nothing is ever written to `conn`.
pub async fn sniff_server_name<S>(conn: &mut S, client_hello: &mut Vec<u8>) -> Result<String, Error>
where
    S: AsyncRead + Unpin,
{
    let mut capture = Capture::new(conn, client_hello);
    let handshake = read_client_hello(&mut capture).await?;

    server_name(&handshake).map_err(|err| Error::from(SmtpError::no_server_name().caused_by(err)))
}

fn refuse(cause: SniffError) -> Error {
    SmtpError::no_server_name().caused_by(cause).into()
}

/// Reassemble the ClientHello handshake message from one or more records
async fn read_client_hello<R>(reader: &mut R) -> Result<Vec<u8>, Error>
where
    R: AsyncRead + Unpin,
{
    let mut handshake = Vec::new();
    let mut header = [0; RECORD_HEADER_LEN];

    loop {
        reader.read_exact(&mut header).await?;

        let (_, record) = tls_parser::parse_tls_record_header(&header)
            .map_err(|_| refuse(SniffError::Malformed))?;

        if record.record_type != TlsRecordType::Handshake {
            return Err(refuse(SniffError::NotHandshake(record.record_type.0)));
        }

        // Zero-length handshake fragments are forbidden
        if record.len == 0 || record.len > MAX_RECORD_LEN {
            return Err(refuse(SniffError::RecordLength(record.len)));
        }

        let start = handshake.len();
        handshake.resize(start + usize::from(record.len), 0);
        reader.read_exact(&mut handshake[start..]).await?;

        if handshake.len() < HANDSHAKE_HEADER_LEN {
            continue;
        }

        if TlsHandshakeType(handshake[0]) != TlsHandshakeType::ClientHello {
            return Err(refuse(SniffError::NotClientHello(handshake[0])));
        }

        let length = HANDSHAKE_HEADER_LEN
            + (usize::from(handshake[1]) << 16 | usize::from(handshake[2]) << 8 | usize::from(handshake[3]));

        if length > MAX_CLIENT_HELLO_LEN {
            return Err(refuse(SniffError::TooLarge(length)));
        }

        if handshake.len() >= length {
            handshake.truncate(length);
            return Ok(handshake);
        }
    }
}

/// Host name from the `server_name` extension of a ClientHello message
///
/// The name is returned exactly as the client sent it.
fn server_name(handshake: &[u8]) -> Result<String, SniffError> {
    let hello = match tls_parser::parse_tls_message_handshake(handshake) {
        Ok((_, TlsMessage::Handshake(TlsMessageHandshake::ClientHello(hello)))) => hello,
        _ => return Err(SniffError::Malformed),
    };

    let (_, extensions) = tls_parser::parse_tls_client_hello_extensions(hello.ext.unwrap_or_default())
        .map_err(|_| SniffError::Malformed)?;

    let name = extensions.iter()
        .find_map(|extension| match extension {
            TlsExtension::SNI(names) => names.iter()
                .find(|(kind, _)| *kind == SNIType::HostName)
                .map(|&(_, name)| name),
            _ => None,
        })
        .filter(|name| !name.is_empty())
        .ok_or(SniffError::NoServerName)?;

    let name = std::str::from_utf8(name).map_err(|_| SniffError::Encoding)?;
    Ok(name.to_string())
}
