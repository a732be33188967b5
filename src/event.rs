//! Event records and their compact binary encoding.
//!
//! Every action the simulation takes is reported as one `Event`. The wire
//! form is a tightly packed little-endian record; sinks that persist events
//! frame each record with a 4-byte little-endian length prefix so streams
//! can be re-read without any out-of-band schema.

use std::fmt;

use thiserror::Error;

/// Order side (buy = bid, sell = ask).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Side {
    Buy = 0,
    Sell = 1,
}

impl Side {
    /// Returns the opposite side.
    #[inline]
    pub const fn opposite(self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    /// Wire encoding: `b'B'` / `b'S'`.
    #[inline]
    pub const fn wire_byte(self) -> u8 {
        match self {
            Side::Buy => b'B',
            Side::Sell => b'S',
        }
    }

    #[inline]
    fn from_wire_byte(b: u8) -> Result<Self, CodecError> {
        match b {
            b'B' => Ok(Side::Buy),
            b'S' => Ok(Side::Sell),
            other => Err(CodecError::BadSide(other)),
        }
    }
}

/// Kind of simulation event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum EventKind {
    OrderAdd = 1,
    OrderCancel = 2,
    Trade = 3,
}

impl EventKind {
    #[inline]
    fn from_wire_byte(b: u8) -> Result<Self, CodecError> {
        match b {
            1 => Ok(EventKind::OrderAdd),
            2 => Ok(EventKind::OrderCancel),
            3 => Ok(EventKind::Trade),
            other => Err(CodecError::BadKind(other)),
        }
    }
}

/// Errors produced when decoding event records from bytes.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("truncated record: need {need} bytes, have {have}")]
    Truncated { need: usize, have: usize },
    #[error("unknown event kind byte {0:#04x}")]
    BadKind(u8),
    #[error("unknown side byte {0:#04x}")]
    BadSide(u8),
    #[error("symbol is not valid UTF-8")]
    BadSymbol(#[from] std::str::Utf8Error),
    #[error("frame length {framed} does not match record length {record}")]
    BadFrame { framed: usize, record: usize },
}

/// One simulation event.
///
/// Cancel events carry `price = 0.0`, `qty = 0` and `side = Buy`; the side
/// field is filler for cancels and must be ignored by consumers.
#[derive(Clone, Debug, PartialEq)]
pub struct Event {
    pub ts_ns: u64,
    pub kind: EventKind,
    pub symbol: String,
    pub price: f64,
    pub qty: i32,
    pub side: Side,
}

impl Event {
    /// Size of the encoded record in bytes.
    ///
    /// Layout (little-endian, no padding):
    /// symbol length `u16`, symbol bytes, `ts_ns: u64`, kind `u8`,
    /// `price: f64`, `qty: i32`, side `u8` (`b'B'` / `b'S'`).
    #[inline]
    pub fn encoded_len(&self) -> usize {
        2 + self.symbol.len() + 8 + 1 + 8 + 4 + 1
    }

    /// Append the encoded record to `out`.
    ///
    /// # Panics
    ///
    /// Panics if the symbol is longer than `u16::MAX` bytes.
    pub fn encode_into(&self, out: &mut Vec<u8>) {
        assert!(
            self.symbol.len() <= u16::MAX as usize,
            "symbol too long to encode: {} bytes",
            self.symbol.len()
        );
        out.reserve(self.encoded_len());
        out.extend_from_slice(&(self.symbol.len() as u16).to_le_bytes());
        out.extend_from_slice(self.symbol.as_bytes());
        out.extend_from_slice(&self.ts_ns.to_le_bytes());
        out.push(self.kind as u8);
        out.extend_from_slice(&self.price.to_le_bytes());
        out.extend_from_slice(&self.qty.to_le_bytes());
        out.push(self.side.wire_byte());
    }

    /// Encode into a fresh buffer.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        self.encode_into(&mut out);
        out
    }

    /// Decode one record from the front of `buf`.
    ///
    /// Returns the event and the number of bytes consumed. Inputs shorter
    /// than the declared prefix, or truncated after the length field, are
    /// rejected.
    pub fn decode(buf: &[u8]) -> Result<(Event, usize), CodecError> {
        if buf.len() < 2 {
            return Err(CodecError::Truncated { need: 2, have: buf.len() });
        }
        let sl = u16::from_le_bytes([buf[0], buf[1]]) as usize;
        let need = 2 + sl + 8 + 1 + 8 + 4 + 1;
        if buf.len() < need {
            return Err(CodecError::Truncated { need, have: buf.len() });
        }
        let symbol = std::str::from_utf8(&buf[2..2 + sl])?.to_owned();
        let mut off = 2 + sl;

        let mut u64_bytes = [0u8; 8];
        u64_bytes.copy_from_slice(&buf[off..off + 8]);
        let ts_ns = u64::from_le_bytes(u64_bytes);
        off += 8;

        let kind = EventKind::from_wire_byte(buf[off])?;
        off += 1;

        let mut f64_bytes = [0u8; 8];
        f64_bytes.copy_from_slice(&buf[off..off + 8]);
        let price = f64::from_le_bytes(f64_bytes);
        off += 8;

        let mut i32_bytes = [0u8; 4];
        i32_bytes.copy_from_slice(&buf[off..off + 4]);
        let qty = i32::from_le_bytes(i32_bytes);
        off += 4;

        let side = Side::from_wire_byte(buf[off])?;
        off += 1;

        Ok((Event { ts_ns, kind, symbol, price, qty, side }, off))
    }

    /// Append the framed stream form: 4-byte little-endian record length,
    /// then the record bytes.
    pub fn encode_framed(&self, out: &mut Vec<u8>) {
        let n = self.encoded_len() as u32;
        out.reserve(4 + n as usize);
        out.extend_from_slice(&n.to_le_bytes());
        self.encode_into(out);
    }

    /// Decode one framed record from the front of `buf`; returns the event
    /// and the total bytes consumed including the length prefix.
    pub fn decode_framed(buf: &[u8]) -> Result<(Event, usize), CodecError> {
        if buf.len() < 4 {
            return Err(CodecError::Truncated { need: 4, have: buf.len() });
        }
        let n = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
        if buf.len() < 4 + n {
            return Err(CodecError::Truncated { need: 4 + n, have: buf.len() });
        }
        let (event, consumed) = Event::decode(&buf[4..4 + n])?;
        if consumed != n {
            return Err(CodecError::BadFrame { framed: n, record: consumed });
        }
        Ok((event, 4 + n))
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.kind {
            EventKind::OrderAdd => "ADD",
            EventKind::OrderCancel => "CXL",
            EventKind::Trade => "TRD",
        };
        write!(
            f,
            "[{tag}] {} {:.2} x {} ({}) t={}",
            self.symbol,
            self.price,
            self.qty,
            self.side.wire_byte() as char,
            self.ts_ns
        )
    }
}
