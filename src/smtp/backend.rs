// Copyright 2022 OpenStax Poland
// Licensed under the MIT license. See LICENSE file in the project root for
// full license text.

//! Backend side of the STARTTLS upgrade

use std::io;
use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, ReadHalf, WriteHalf,
};

use crate::{config::Backend, net::Stream, util};
use super::error::SmtpError;

/// Prefix of the backend's reply accepting STARTTLS
const READY_PREFIX: &[u8] = b"220 2.0.0";

/// Backend connection which has acknowledged STARTTLS and received the
/// client's ClientHello
pub struct Upstream<S = Stream> {
    pub reader: BufReader<ReadHalf<S>>,
    pub writer: WriteHalf<S>,
}

/// Dial `backend`, upgrade it with STARTTLS and replay `client_hello` to it
pub async fn connect(backend: &Backend, ehlo_domain: &str, client_hello: &[u8])
-> Result<Upstream, SmtpError> {
    let stream = Stream::connect(backend.protocol, &backend.address)
        .await
        .map_err(|err| SmtpError::backend_unavailable().caused_by(err))?;

    log::debug!("connected to backend {}://{}", backend.protocol, backend.address);

    negotiate(stream, ehlo_domain, client_hello)
        .await
        .map_err(|err| SmtpError::backend_unavailable().caused_by(err))
}

/// Upgrade an already connected backend stream
pub async fn negotiate<S>(stream: S, ehlo_domain: &str, client_hello: &[u8])
-> io::Result<Upstream<S>>
where
    S: AsyncRead + AsyncWrite,
{
    let (reader, mut writer) = tokio::io::split(stream);
    let mut reader = BufReader::new(reader);

    // The backend may answer before our writes complete
    tokio::try_join!(
        wait_ready(&mut reader),
        request_starttls(&mut writer, ehlo_domain),
    )?;

    writer.write_all(client_hello).await?;
    writer.flush().await?;

    log::debug!("replayed {} bytes of ClientHello to backend", client_hello.len());

    Ok(Upstream { reader, writer })
}

async fn request_starttls<W>(writer: &mut W, ehlo_domain: &str) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(format!("EHLO {ehlo_domain}\r\n").as_bytes()).await?;
    writer.write_all(b"STARTTLS\r\n").await?;
    writer.flush().await
}

/// Read reply lines until the backend accepts STARTTLS
///
/// Greeting and EHLO replies are skipped. A final reply with a transient or
/// permanent failure status ends the wait early.
async fn wait_ready<R>(reader: &mut R) -> io::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = Vec::new();

    loop {
        line.clear();

        if reader.read_until(b'\n', &mut line).await? == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "backend closed connection before accepting STARTTLS",
            ));
        }

        log::trace!("backend >> {}", util::printable(&line));

        if line.starts_with(READY_PREFIX) {
            return Ok(());
        }

        if is_final_failure(&line) {
            let reply = String::from_utf8_lossy(&line);
            return Err(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                format!("backend refused STARTTLS: {}", reply.trim_end()),
            ));
        }
    }
}

/// Is this the last line of a 4xx or 5xx reply?
fn is_final_failure(line: &[u8]) -> bool {
    matches!(line, [b'4' | b'5', b'0'..=b'9', b'0'..=b'9', b' ' | b'\r' | b'\n', ..])
}
