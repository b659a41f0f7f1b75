//! Byte-transparent relay between client and backend

use std::io;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

use crate::smtp::backend::Upstream;

/// Copy bytes both ways until either side finishes
///
/// When one direction ends, by EOF or error, both connections are shut down
/// and that direction's outcome is returned. The backend connection is
/// closed on return, the client connection is left to the caller.
pub async fn relay<C, S>(client: &mut C, upstream: Upstream<S>) -> io::Result<()>
where
    C: AsyncRead + AsyncWrite + Unpin,
    S: AsyncRead + AsyncWrite,
{
    let (mut client_reader, mut client_writer) = tokio::io::split(client);
    let Upstream { reader: mut backend_reader, writer: mut backend_writer } = upstream;

    let result = tokio::select! {
        result = tokio::io::copy(&mut client_reader, &mut backend_writer) => {
            log::debug!("client closed after {} bytes", Transferred(&result));
            result
        }
        result = tokio::io::copy_buf(&mut backend_reader, &mut client_writer) => {
            log::debug!("backend closed after {} bytes", Transferred(&result));
            result
        }
    };

    let _ = backend_writer.shutdown().await;
    let _ = client_writer.shutdown().await;

    result.map(drop)
}

struct Transferred<'a>(&'a io::Result<u64>);

impl std::fmt::Display for Transferred<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self.0 {
            Ok(bytes) => write!(f, "{bytes}"),
            Err(err) => write!(f, "an error ({err})"),
        }
    }
}
