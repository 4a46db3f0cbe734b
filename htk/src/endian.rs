//! Byte order selection for the binary label and chunk formats.

use std::fmt;
use std::str::FromStr;

use bytes::{Buf, BufMut};
use serde::{Deserialize, Serialize};

/// Byte order of multi-byte integer fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ByteOrder {
    Big,
    #[default]
    Little,
}

impl ByteOrder {
    /// Byte order of the running platform.
    pub const fn native() -> Self {
        if cfg!(target_endian = "big") {
            ByteOrder::Big
        } else {
            ByteOrder::Little
        }
    }

    /// Maps a "big endian?" flag to a byte order.
    pub const fn from_big_endian(big: bool) -> Self {
        if big { ByteOrder::Big } else { ByteOrder::Little }
    }

    pub fn put_u16<B: BufMut>(self, buf: &mut B, v: u16) {
        match self {
            ByteOrder::Big => buf.put_u16(v),
            ByteOrder::Little => buf.put_u16_le(v),
        }
    }

    pub fn put_u32<B: BufMut>(self, buf: &mut B, v: u32) {
        match self {
            ByteOrder::Big => buf.put_u32(v),
            ByteOrder::Little => buf.put_u32_le(v),
        }
    }

    /// Reads a u16, or `None` if fewer than 2 bytes remain.
    pub fn get_u16<B: Buf>(self, buf: &mut B) -> Option<u16> {
        if buf.remaining() < 2 {
            return None;
        }
        Some(match self {
            ByteOrder::Big => buf.get_u16(),
            ByteOrder::Little => buf.get_u16_le(),
        })
    }

    /// Reads a u32, or `None` if fewer than 4 bytes remain.
    pub fn get_u32<B: Buf>(self, buf: &mut B) -> Option<u32> {
        if buf.remaining() < 4 {
            return None;
        }
        Some(match self {
            ByteOrder::Big => buf.get_u32(),
            ByteOrder::Little => buf.get_u32_le(),
        })
    }
}

impl fmt::Display for ByteOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ByteOrder::Big => write!(f, "big"),
            ByteOrder::Little => write!(f, "little"),
        }
    }
}

impl FromStr for ByteOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "big" | "be" => Ok(ByteOrder::Big),
            "little" | "le" => Ok(ByteOrder::Little),
            other => Err(format!("unknown byte order {other:?} (want big or little)")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn test_put_get() {
        for order in [ByteOrder::Big, ByteOrder::Little] {
            let mut buf = BytesMut::new();
            order.put_u32(&mut buf, 0x0102_0304);
            order.put_u16(&mut buf, 0x0506);

            let mut rd = &buf[..];
            assert_eq!(order.get_u32(&mut rd), Some(0x0102_0304));
            assert_eq!(order.get_u16(&mut rd), Some(0x0506));
            assert_eq!(order.get_u16(&mut rd), None);
        }
    }

    #[test]
    fn test_layout_on_wire() {
        let mut buf = BytesMut::new();
        ByteOrder::Big.put_u32(&mut buf, 1);
        ByteOrder::Little.put_u32(&mut buf, 1);
        assert_eq!(&buf[..], &[0, 0, 0, 1, 1, 0, 0, 0]);
    }

    #[test]
    fn test_native() {
        let mut buf = BytesMut::new();
        ByteOrder::native().put_u32(&mut buf, 0x0102_0304);
        assert_eq!(&buf[..], &0x0102_0304u32.to_ne_bytes());
        assert_eq!(
            ByteOrder::native() == ByteOrder::Big,
            cfg!(target_endian = "big")
        );
    }

    #[test]
    fn test_parse() {
        assert_eq!("big".parse::<ByteOrder>().unwrap(), ByteOrder::Big);
        assert_eq!("LE".parse::<ByteOrder>().unwrap(), ByteOrder::Little);
        assert!("middle".parse::<ByteOrder>().is_err());
        assert_eq!(ByteOrder::from_big_endian(true), ByteOrder::Big);
        assert_eq!(ByteOrder::default(), ByteOrder::Little);
    }
}
