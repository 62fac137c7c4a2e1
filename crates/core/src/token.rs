//! Output tokens for streaming emission.

use std::borrow::Cow;
use std::fmt;

/// One indivisible unit of already-formatted output.
///
/// Tokens have no structure beyond "bytes to emit next". They usually borrow
/// from the source being formatted and only own their bytes when the engine
/// synthesized them (whitespace, indentation).
#[derive(Clone, PartialEq, Eq)]
pub struct Token<'a>(Cow<'a, [u8]>);

impl<'a> Token<'a> {
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Detach the token from the buffer it borrows from.
    #[must_use]
    pub fn into_owned(self) -> Token<'static> {
        Token(Cow::Owned(self.0.into_owned()))
    }
}

impl<'a> From<&'a str> for Token<'a> {
    fn from(s: &'a str) -> Self {
        Token(Cow::Borrowed(s.as_bytes()))
    }
}

impl<'a> From<&'a [u8]> for Token<'a> {
    fn from(b: &'a [u8]) -> Self {
        Token(Cow::Borrowed(b))
    }
}

impl From<String> for Token<'static> {
    fn from(s: String) -> Self {
        Token(Cow::Owned(s.into_bytes()))
    }
}

impl From<Vec<u8>> for Token<'static> {
    fn from(v: Vec<u8>) -> Self {
        Token(Cow::Owned(v))
    }
}

impl fmt::Debug for Token<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Token({:?})", String::from_utf8_lossy(&self.0))
    }
}

/// Lazily produced, strictly ordered sequence of tokens.
pub type TokenStream<'a> = Box<dyn Iterator<Item = Token<'a>> + 'a>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_conversions() {
        let borrowed = Token::from("def");
        let owned = Token::from(String::from("def"));
        assert_eq!(borrowed, owned);
        assert_eq!(borrowed.len(), 3);
        assert_eq!(Token::from(&b"\n"[..]).as_bytes(), b"\n");
    }

    #[test]
    fn test_into_owned_outlives_source() {
        let token = {
            let source = String::from("end");
            Token::from(source.as_str()).into_owned()
        };
        assert_eq!(token.as_bytes(), b"end");
    }

    #[test]
    fn test_debug_is_lossy_text() {
        assert_eq!(format!("{:?}", Token::from("x")), "Token(\"x\")");
    }
}
