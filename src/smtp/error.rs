// Copyright 2022 OpenStax Poland
// Licensed under the MIT license. See LICENSE file in the project root for
// full license text.

//! Errors a session can end with

use std::{error::Error as StdError, io, time::Duration};
use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt};

type Cause = Box<dyn StdError + Send + Sync + 'static>;

/// An error with an SMTP status which can be reported to the client
#[derive(Debug, Error)]
#[error("{code} {enhanced} {message}")]
pub struct SmtpError {
    pub code: u16,
    pub enhanced: &'static str,
    pub message: String,
    #[source]
    pub cause: Option<Cause>,
}

impl SmtpError {
    pub fn new(code: u16, enhanced: &'static str, message: impl Into<String>) -> Self {
        SmtpError {
            code,
            enhanced,
            message: message.into(),
            cause: None,
        }
    }

    pub fn caused_by(mut self, cause: impl Into<Cause>) -> Self {
        self.cause = Some(cause.into());
        self
    }

    pub fn bad_sequence() -> Self {
        SmtpError::new(503, "5.5.1", "Bad sequence of commands")
    }

    pub fn starttls_required() -> Self {
        SmtpError::new(503, "5.5.1", "STARTTLS is required")
    }

    pub fn no_server_name() -> Self {
        SmtpError::new(501, "5.5.4", "No server name provided")
    }

    pub fn no_backend(server_name: &str) -> Self {
        SmtpError::new(501, "5.5.4", format!("No backend found for server name {server_name:?}"))
    }

    pub fn backend_unavailable() -> Self {
        SmtpError::new(451, "4.3.0", "Backend unavailable")
    }

    pub fn service_unavailable() -> Self {
        SmtpError::new(451, "4.3.0", "Service Unavailable")
    }

    /// Status line as sent on the wire
    pub fn line(&self) -> String {
        format!("{} {} {}\r\n", self.code, self.enhanced, self.message)
    }

    pub async fn write_to<W>(&self, writer: &mut W) -> io::Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        writer.write_all(self.line().as_bytes()).await?;
        writer.flush().await
    }
}

/// Command line which could not be parsed
///
/// Unlike [`SmtpError`] this is not answered with a protocol status of its
/// own, since the client's framing can no longer be trusted.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("expected {expected} tokens, got {got}")]
    TokenCount { expected: usize, got: usize },
    #[error("command line is not valid UTF-8")]
    Encoding,
    #[error("command line longer than {limit} octets")]
    TooLong { limit: usize },
}

/// Terminal error of a session
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Smtp(#[from] SmtpError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Command(#[from] CommandError),
    #[error("negotiation did not finish within {0:?}")]
    Timeout(Duration),
}

impl Error {
    /// Status to report to the client, if the connection is still usable
    ///
    /// I/O errors mean the connection is already broken or closed by the
    /// peer, so nothing is reported for them.
    pub fn into_report(self) -> Option<SmtpError> {
        match self {
            Error::Smtp(err) => Some(err),
            Error::Io(_) => None,
            other => Some(SmtpError::service_unavailable().caused_by(other)),
        }
    }
}
