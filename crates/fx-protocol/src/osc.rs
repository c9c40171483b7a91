//! Minimal OSC 1.0 message codec.
//!
//! Only what the session protocol uses: single messages (no bundles) with
//! int32, float32 and string arguments. Everything on the wire is
//! big-endian and padded to 4-byte boundaries.

use std::fmt;

use thiserror::Error;

/// Errors produced while decoding a datagram.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OscError {
    /// The datagram ended in the middle of a field.
    #[error("datagram truncated at byte {0}")]
    Truncated(usize),

    /// Address did not start with '/'.
    #[error("invalid address pattern: {0:?}")]
    InvalidAddress(String),

    /// Type tag string missing or not starting with ','.
    #[error("missing type tag string")]
    MissingTypeTags,

    /// Argument type this codec does not handle.
    #[error("unsupported argument type tag '{0}'")]
    UnsupportedTag(char),

    /// OSC bundles are not used by the session protocol.
    #[error("bundles are not supported")]
    Bundle,

    /// String payload was not valid UTF-8.
    #[error("string at byte {0} is not valid UTF-8")]
    InvalidUtf8(usize),
}

/// A single typed OSC argument.
#[derive(Debug, Clone, PartialEq)]
pub enum OscArg {
    Int(i32),
    Float(f32),
    Str(String),
}

impl OscArg {
    fn tag(&self) -> char {
        match self {
            Self::Int(_) => 'i',
            Self::Float(_) => 'f',
            Self::Str(_) => 's',
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }
}

impl From<&str> for OscArg {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for OscArg {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<i32> for OscArg {
    fn from(i: i32) -> Self {
        Self::Int(i)
    }
}

impl fmt::Display for OscArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Str(s) => write!(f, "{s:?}"),
        }
    }
}

/// An OSC message: address path plus ordered arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct OscMessage {
    pub path: String,
    pub args: Vec<OscArg>,
}

impl OscMessage {
    pub fn new(path: impl Into<String>, args: Vec<OscArg>) -> Self {
        Self {
            path: path.into(),
            args,
        }
    }

    /// Returns the string argument at `index`, if it is a string.
    pub fn str_arg(&self, index: usize) -> Option<&str> {
        self.args.get(index).and_then(OscArg::as_str)
    }

    /// Returns the int argument at `index`, if it is an int.
    pub fn int_arg(&self, index: usize) -> Option<i32> {
        self.args.get(index).and_then(OscArg::as_int)
    }

    /// The type tag string without the leading ',' (e.g. "ss").
    pub fn type_tags(&self) -> String {
        self.args.iter().map(OscArg::tag).collect()
    }

    /// Encodes the message into a datagram.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(64);
        write_padded_str(&mut buf, &self.path);
        write_padded_str(&mut buf, &format!(",{}", self.type_tags()));
        for arg in &self.args {
            match arg {
                OscArg::Int(i) => buf.extend_from_slice(&i.to_be_bytes()),
                OscArg::Float(x) => buf.extend_from_slice(&x.to_be_bytes()),
                OscArg::Str(s) => write_padded_str(&mut buf, s),
            }
        }
        buf
    }

    /// Decodes a datagram into a message.
    pub fn decode(bytes: &[u8]) -> Result<Self, OscError> {
        let mut pos = 0;
        let path = read_padded_str(bytes, &mut pos)?;
        if path == "#bundle" {
            return Err(OscError::Bundle);
        }
        if !path.starts_with('/') {
            return Err(OscError::InvalidAddress(path.to_string()));
        }

        // A message with no type tag string at all is treated as argument-less.
        if pos >= bytes.len() {
            return Ok(Self::new(path, Vec::new()));
        }
        let tags = read_padded_str(bytes, &mut pos)?;
        let tags = tags.strip_prefix(',').ok_or(OscError::MissingTypeTags)?;

        let mut args = Vec::with_capacity(tags.len());
        for tag in tags.chars() {
            let arg = match tag {
                'i' => OscArg::Int(i32::from_be_bytes(read_word(bytes, &mut pos)?)),
                'f' => OscArg::Float(f32::from_be_bytes(read_word(bytes, &mut pos)?)),
                's' => OscArg::Str(read_padded_str(bytes, &mut pos)?.to_string()),
                other => return Err(OscError::UnsupportedTag(other)),
            };
            args.push(arg);
        }

        Ok(Self::new(path, args))
    }
}

impl fmt::Display for OscMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

fn write_padded_str(buf: &mut Vec<u8>, s: &str) {
    buf.extend_from_slice(s.as_bytes());
    buf.push(0);
    while buf.len() % 4 != 0 {
        buf.push(0);
    }
}

fn read_padded_str<'a>(bytes: &'a [u8], pos: &mut usize) -> Result<&'a str, OscError> {
    let start = *pos;
    let rest = bytes.get(start..).ok_or(OscError::Truncated(start))?;
    let len = rest
        .iter()
        .position(|b| *b == 0)
        .ok_or(OscError::Truncated(bytes.len()))?;
    let raw = rest.get(..len).ok_or(OscError::Truncated(start))?;
    let s = std::str::from_utf8(raw).map_err(|_| OscError::InvalidUtf8(start))?;

    // Skip the terminator and padding; the padding may be cut short only
    // at the very end of the datagram.
    let end = start + len + 1;
    *pos = (end + 3) & !3;
    if *pos > bytes.len() {
        *pos = bytes.len();
    }
    Ok(s)
}

fn read_word(bytes: &[u8], pos: &mut usize) -> Result<[u8; 4], OscError> {
    let start = *pos;
    let word = bytes
        .get(start..start + 4)
        .and_then(|w| <[u8; 4]>::try_from(w).ok())
        .ok_or(OscError::Truncated(start))?;
    *pos = start + 4;
    Ok(word)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_layout_is_padded() {
        let msg = OscMessage::new("/nsm/server/open", vec!["demo".into()]);
        let bytes = msg.encode();
        // "/nsm/server/open" is 16 bytes -> 20 with terminator and padding
        assert_eq!(&bytes[..20], b"/nsm/server/open\0\0\0\0");
        assert_eq!(&bytes[20..24], b",s\0\0");
        assert_eq!(&bytes[24..32], b"demo\0\0\0\0");
        assert_eq!(bytes.len(), 32);
    }

    #[test]
    fn test_decode_mixed_arguments() {
        let msg = OscMessage::new(
            "/nsm/server/announce",
            vec!["fx".into(), ":".into(), OscArg::Int(1), OscArg::Float(0.5)],
        );
        let decoded = OscMessage::decode(&msg.encode()).unwrap();
        assert_eq!(decoded, msg);
        assert_eq!(decoded.type_tags(), "ssif");
        assert_eq!(decoded.int_arg(2), Some(1));
        assert_eq!(decoded.str_arg(2), None);
    }

    #[test]
    fn test_decode_without_type_tags() {
        let decoded = OscMessage::decode(b"/ping\0\0\0").unwrap();
        assert_eq!(decoded.path, "/ping");
        assert!(decoded.args.is_empty());
    }

    #[test]
    fn test_decode_rejects_bundle() {
        let bytes = OscMessage::new("#bundle", vec![]).encode();
        assert_eq!(OscMessage::decode(&bytes), Err(OscError::Bundle));
    }

    #[test]
    fn test_decode_rejects_truncated_int() {
        let mut bytes = OscMessage::new("/x", vec![OscArg::Int(7)]).encode();
        bytes.truncate(bytes.len() - 2);
        assert!(matches!(OscMessage::decode(&bytes), Err(OscError::Truncated(_))));
    }

    #[test]
    fn test_decode_rejects_unterminated_string() {
        let mut bytes = OscMessage::new("/x", vec![]).encode();
        bytes.truncate(4);
        bytes.extend_from_slice(b",s\0\0abcd");
        assert!(matches!(OscMessage::decode(&bytes), Err(OscError::Truncated(_))));
    }

    #[test]
    fn test_decode_rejects_unknown_tag() {
        let mut bytes = OscMessage::new("/x", vec![]).encode();
        bytes.truncate(4);
        bytes.extend_from_slice(b",b\0\0");
        assert_eq!(OscMessage::decode(&bytes), Err(OscError::UnsupportedTag('b')));
    }

    #[test]
    fn test_decode_rejects_bad_address() {
        assert!(matches!(
            OscMessage::decode(b"nope\0\0\0\0"),
            Err(OscError::InvalidAddress(_))
        ));
    }
}
