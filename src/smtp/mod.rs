//! SMTP side of the proxy

pub mod backend;
pub mod command;
pub mod error;
pub mod server;
pub mod session;
pub mod syntax;
