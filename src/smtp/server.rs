// Copyright 2022 OpenStax Poland
// Licensed under the MIT license. See LICENSE file in the project root for
// full license text.

//! SMTP server

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::{config::Config, net::{Listener, Stream}, relay, route, tls};
use super::{backend::{self, Upstream}, error::Error, session::Session};

pub async fn start(config: Arc<Config>) -> Result<()> {
    let listener = Listener::bind(config.listen_protocol, &config.listen_address)
        .await
        .with_context(|| format!(
            "could not listen on {}://{}", config.listen_protocol, config.listen_address))?;

    serve(listener, config).await;
    Ok(())
}

/// Accept connections forever, serving each on its own task
pub async fn serve(listener: Listener, config: Arc<Config>) {
    match listener.local_addr() {
        Ok(addr) => log::info!("Listening on {}://{}", config.listen_protocol, addr),
        Err(err) => log::warn!("Listening on unknown address: {err}"),
    }

    loop {
        let (socket, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(err) => {
                log::error!("could not accept connection: {err}");
                continue;
            }
        };

        let config = config.clone();

        tokio::spawn(async move {
            handle_client(&config, socket, peer).await;
        });
    }
}

/// Handle one SMTP connection
///
/// The connection is closed when this returns.
async fn handle_client(config: &Config, socket: Stream, peer: String) {
    log::debug!("[{peer}] connected");

    let mut session = Session::new(socket, peer);

    match handle_session(config, &mut session).await {
        Ok(()) => log::debug!("[{}] closed", session.peer()),
        Err(err) => report(&mut session, err).await,
    }
}

async fn handle_session<S>(config: &Config, session: &mut Session<S>) -> Result<(), Error>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let upstream = match config.negotiation_timeout() {
        None => open_tunnel(config, session).await?,
        Some(limit) => tokio::time::timeout(limit, open_tunnel(config, session))
            .await
            .map_err(|_| Error::Timeout(limit))??,
    };

    relay::relay(session.conn_mut(), upstream).await?;
    Ok(())
}

/// Everything up to and including the ClientHello replay
async fn open_tunnel<S>(config: &Config, session: &mut Session<S>) -> Result<Upstream, Error>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    session.negotiate(&config.advertise_name).await?;

    let mut client_hello = Vec::new();
    let server_name = tls::sniff_server_name(session.conn_mut(), &mut client_hello).await?;
    log::info!("[{}] client requested server name {server_name:?}", session.peer());

    let target = route::select(&config.backends, &server_name)?;
    let upstream = backend::connect(target, session.ehlo_domain(), &client_hello).await?;
    log::info!(
        "[{}] relaying to {}://{}", session.peer(), target.protocol, target.address);

    Ok(upstream)
}

/// Tell the client why its session ended, if it can still hear it
async fn report<S>(session: &mut Session<S>, err: Error)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let peer = session.peer().to_string();
    let state = session.state();

    match err {
        Error::Smtp(ref smtp) => log::error!("[{peer}] SMTP error in {state:?}: {}", Chain(smtp)),
        ref other => log::error!("[{peer}] unhandled error in {state:?}: {}", Chain(other)),
    }

    if let Some(status) = err.into_report() {
        if let Err(err) = status.write_to(session.conn_mut()).await {
            log::debug!("[{peer}] could not report status: {err}");
        }
    }
}

/// Display an error together with its chain of causes
struct Chain<'a>(&'a dyn std::error::Error);

impl std::fmt::Display for Chain<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.0)?;

        let mut source = self.0.source();
        while let Some(cause) = source {
            write!(f, ": {cause}")?;
            source = cause.source();
        }

        Ok(())
    }
}
