//! Commands accepted before the TLS upgrade

use std::str;

use super::{error::{CommandError, Error, SmtpError}, syntax};

/// Parse `EHLO <domain>`, returning the domain verbatim
pub fn parse_ehlo(line: &[u8]) -> Result<String, Error> {
    let line = syntax::trim_line_end(line);
    expect_command(line, b"EHLO", SmtpError::bad_sequence)?;

    let [_, domain] = syntax::tokens::<2>(line)
        .map_err(|got| CommandError::TokenCount { expected: 2, got })?;

    let domain = str::from_utf8(domain).map_err(|_| CommandError::Encoding)?;

    Ok(domain.to_string())
}

/// Parse `STARTTLS`
pub fn parse_starttls(line: &[u8]) -> Result<(), Error> {
    let line = syntax::trim_line_end(line);
    expect_command(line, b"STARTTLS", SmtpError::starttls_required)?;

    syntax::tokens::<1>(line)
        .map_err(|got| CommandError::TokenCount { expected: 1, got })?;

    Ok(())
}

/// Check the leading verb of a command line
///
/// A line with no verb at all is a framing problem rather than a wrong
/// command, so it is not answered with `unexpected`.
fn expect_command(
    mut line: &[u8],
    verb: &[u8],
    unexpected: fn() -> SmtpError,
) -> Result<(), Error> {
    use syntax::SliceExt;

    match line.token() {
        None => Err(CommandError::TokenCount { expected: 1, got: 0 }.into()),
        Some(command) if command.eq_ignore_ascii_case(verb) => Ok(()),
        Some(_) => Err(unexpected().into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(err: Error) -> String {
        match err {
            Error::Smtp(err) => err.line(),
            other => panic!("expected SMTP error, got {other:?}"),
        }
    }

    #[test]
    fn ehlo_domain_verbatim() {
        assert_eq!(parse_ehlo(b"EHLO client.example\r\n").unwrap(), "client.example");
        assert_eq!(parse_ehlo(b"EHLO [192.0.2.1]\r\n").unwrap(), "[192.0.2.1]");
        assert_eq!(parse_ehlo(b"ehlo MiXeD.Example\n").unwrap(), "MiXeD.Example");
    }

    #[test]
    fn other_command_before_ehlo() {
        for line in [&b"HELO client.example\r\n"[..], b"MAIL FROM:<a@b>\r\n", b"QUIT\r\n", b"STARTTLS\r\n"] {
            assert_eq!(status(parse_ehlo(line).unwrap_err()), "503 5.5.1 Bad sequence of commands\r\n");
        }
    }

    #[test]
    fn malformed_ehlo() {
        assert!(matches!(
            parse_ehlo(b"EHLO\r\n"),
            Err(Error::Command(CommandError::TokenCount { expected: 2, got: 1 })),
        ));
        assert!(matches!(
            parse_ehlo(b"EHLO a b\r\n"),
            Err(Error::Command(CommandError::TokenCount { expected: 2, got: 3 })),
        ));
        assert!(matches!(
            parse_ehlo(b"\r\n"),
            Err(Error::Command(CommandError::TokenCount { got: 0, .. })),
        ));
        assert!(matches!(
            parse_ehlo(b"EHLO \xff\xfe\r\n"),
            Err(Error::Command(CommandError::Encoding)),
        ));
    }

    #[test]
    fn starttls() {
        assert!(parse_starttls(b"STARTTLS\r\n").is_ok());
        assert!(parse_starttls(b"starttls\n").is_ok());
        assert_eq!(status(parse_starttls(b"MAIL FROM:<a@b>\r\n").unwrap_err()), "503 5.5.1 STARTTLS is required\r\n");
        assert_eq!(status(parse_starttls(b"EHLO again\r\n").unwrap_err()), "503 5.5.1 STARTTLS is required\r\n");
        assert!(matches!(
            parse_starttls(b"STARTTLS now\r\n"),
            Err(Error::Command(CommandError::TokenCount { expected: 1, got: 2 })),
        ));
    }
}
