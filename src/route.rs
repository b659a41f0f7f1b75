//! Backend selection by TLS server name

use crate::{config::Backend, smtp::error::SmtpError};

/// Select the first backend whose hostname is exactly `server_name`
///
/// Comparison is byte-for-byte, there is no case folding and no wildcard
/// matching.
pub fn select<'a>(backends: &'a [Backend], server_name: &str) -> Result<&'a Backend, SmtpError> {
    backends.iter()
        .find(|backend| backend.hostname == server_name)
        .ok_or_else(|| SmtpError::no_backend(server_name)
            .caused_by(format!("no backend found for server name {server_name:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::Transport;

    fn backend(hostname: &str, address: &str) -> Backend {
        Backend {
            hostname: hostname.to_string(),
            protocol: Transport::Tcp,
            address: address.to_string(),
        }
    }

    #[test]
    fn exact_match() {
        let backends = [backend("a.example", "10.0.0.1:25"), backend("b.example", "10.0.0.2:25")];

        assert_eq!(select(&backends, "b.example").unwrap().address, "10.0.0.2:25");
        assert_eq!(select(&backends, "a.example").unwrap().address, "10.0.0.1:25");
    }

    #[test]
    fn first_entry_wins() {
        let backends = [backend("a.example", "first"), backend("a.example", "second")];

        for _ in 0..3 {
            assert_eq!(select(&backends, "a.example").unwrap().address, "first");
        }
    }

    #[test]
    fn no_folding_or_wildcards() {
        let backends = [backend("mail.example.com", "x"), backend("*.example.org", "y")];

        assert!(select(&backends, "MAIL.example.com").is_err());
        assert!(select(&backends, "example.com").is_err());
        assert!(select(&backends, "mx.example.org").is_err());
    }

    #[test]
    fn unmatched_name_is_quoted() {
        let err = select(&[], "example.com").unwrap_err();
        assert_eq!(err.line(), "501 5.5.4 No backend found for server name \"example.com\"\r\n");
    }
}
