//! Tokenizing of SMTP command lines

pub trait SliceExt<'a> {
    /// Advance this slice by `number` positions
    fn advance(&mut self, number: usize);

    /// Return longest prefix whose characters match `test`, advancing this
    /// slice by its length
    fn take_while(&mut self, test: impl FnMut(u8) -> bool) -> &'a [u8];

    /// Skip leading whitespace and return the next whitespace-delimited token,
    /// or `None` if only whitespace remains
    fn token(&mut self) -> Option<&'a [u8]>;
}

impl<'a> SliceExt<'a> for &'a [u8] {
    fn advance(&mut self, by: usize) {
        *self = &self[by..];
    }

    fn take_while(&mut self, mut test: impl FnMut(u8) -> bool) -> &'a [u8] {
        let offset = self.iter().position(|&c| !test(c)).unwrap_or(self.len());
        let result = &self[..offset];
        self.advance(offset);
        result
    }

    fn token(&mut self) -> Option<&'a [u8]> {
        self.take_while(|c| c.is_ascii_whitespace());
        let token = self.take_while(|c| !c.is_ascii_whitespace());

        if token.is_empty() {
            None
        } else {
            Some(token)
        }
    }
}

/// Strip the line terminator: the final `\n` and at most one `\r` before it
pub fn trim_line_end(mut line: &[u8]) -> &[u8] {
    if let Some(rest) = line.strip_suffix(b"\n") {
        line = rest;
    }

    line.strip_suffix(b"\r").unwrap_or(line)
}

/// Split a line into at most `N` tokens, reporting how many were present
///
/// Returns `Err(count)` when the line does not contain exactly `N` tokens.
pub fn tokens<const N: usize>(mut line: &[u8]) -> Result<[&[u8]; N], usize> {
    let mut tokens = [&b""[..]; N];
    let mut count = 0;

    while let Some(token) = line.token() {
        if count < N {
            tokens[count] = token;
        }
        count += 1;
    }

    if count == N {
        Ok(tokens)
    } else {
        Err(count)
    }
}
