// Copyright 2022 OpenStax Poland
// Licensed under the MIT license. See LICENSE file in the project root for
// full license text.

use std::fmt;

/// Render wire bytes for a log line
///
/// Printable ASCII is kept, line endings and everything else are escaped, so
/// a logged SMTP line always stays on one log line.
pub fn printable(data: &[u8]) -> Printable<'_> {
    Printable(data)
}

pub struct Printable<'a>(&'a [u8]);

impl fmt::Display for Printable<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for &byte in self.0 {
            match byte {
                b'\r' => f.write_str("\\r")?,
                b'\n' => f.write_str("\\n")?,
                b'\\' => f.write_str("\\\\")?,
                b' ' => f.write_str(" ")?,
                _ if byte.is_ascii_graphic() => write!(f, "{}", byte as char)?,
                _ => write!(f, "\\x{:02x}", byte)?,
            }
        }
        Ok(())
    }
}
