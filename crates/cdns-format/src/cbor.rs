//! Streaming CBOR primitive encoder.
//!
//! Writes the shortest encoding for every integer and buffers output in a
//! small internal buffer before handing it to the underlying writer. The
//! byte count only advances when the buffer is flushed, which is what the
//! size-based rotation check wants: it measures bytes pushed towards the
//! sink, before any compression.

use chrono::{DateTime, Duration, Utc};
use std::io::{self, Write};

/// CBOR major types.
const MAJOR_UINT: u8 = 0;
const MAJOR_NINT: u8 = 1;
const MAJOR_BYTES: u8 = 2;
const MAJOR_TEXT: u8 = 3;
const MAJOR_ARRAY: u8 = 4;
const MAJOR_MAP: u8 = 5;
const MAJOR_SIMPLE: u8 = 7;

/// Additional-information value opening an indefinite-length item.
const INDEFINITE: u8 = 31;

/// Internal accumulation buffer size.
const WRITE_BUF_SIZE: usize = 2048;

const NS_PER_SEC: u64 = 1_000_000_000;

/// Streaming CBOR encoder over any byte writer.
#[derive(Debug)]
pub struct CborEncoder<W: Write> {
    inner: W,
    buf: Vec<u8>,
    written: u64,
}

impl<W: Write> CborEncoder<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            buf: Vec::with_capacity(WRITE_BUF_SIZE),
            written: 0,
        }
    }

    /// Bytes pushed to the underlying writer since construction.
    #[must_use]
    pub fn bytes_written(&self) -> u64 {
        self.written
    }

    /// Force out any accumulated output.
    pub fn flush(&mut self) -> io::Result<()> {
        if !self.buf.is_empty() {
            self.inner.write_all(&self.buf)?;
            self.written += self.buf.len() as u64;
            self.buf.clear();
        }
        Ok(())
    }

    /// Flush and return the underlying writer.
    pub fn into_inner(mut self) -> io::Result<W> {
        self.flush()?;
        Ok(self.inner)
    }

    /// The underlying writer.
    #[must_use]
    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    fn push(&mut self, byte: u8) -> io::Result<()> {
        self.buf.push(byte);
        if self.buf.len() >= WRITE_BUF_SIZE {
            self.flush()?;
        }
        Ok(())
    }

    /// Write a major type with its argument in the shortest form.
    fn type_value(&mut self, major: u8, value: u64) -> io::Result<()> {
        let hi = major << 5;
        if value < 24 {
            self.push(hi | value as u8)
        } else if value <= u64::from(u8::MAX) {
            self.push(hi | 24)?;
            self.push(value as u8)
        } else if value <= u64::from(u16::MAX) {
            self.push(hi | 25)?;
            for shift in [8, 0] {
                self.push((value >> shift) as u8)?;
            }
            Ok(())
        } else if value <= u64::from(u32::MAX) {
            self.push(hi | 26)?;
            for shift in [24, 16, 8, 0] {
                self.push((value >> shift) as u8)?;
            }
            Ok(())
        } else {
            self.push(hi | 27)?;
            for shift in [56, 48, 40, 32, 24, 16, 8, 0] {
                self.push((value >> shift) as u8)?;
            }
            Ok(())
        }
    }

    pub fn write_uint(&mut self, value: u64) -> io::Result<()> {
        self.type_value(MAJOR_UINT, value)
    }

    /// Write a signed integer; negatives use the CBOR negative major type.
    pub fn write_int(&mut self, value: i64) -> io::Result<()> {
        if value < 0 {
            self.type_value(MAJOR_NINT, !(value as u64))
        } else {
            self.type_value(MAJOR_UINT, value as u64)
        }
    }

    pub fn write_bool(&mut self, value: bool) -> io::Result<()> {
        self.push((MAJOR_SIMPLE << 5) | if value { 21 } else { 20 })
    }

    pub fn write_null(&mut self) -> io::Result<()> {
        self.push((MAJOR_SIMPLE << 5) | 22)
    }

    pub fn write_bytes(&mut self, value: &[u8]) -> io::Result<()> {
        self.type_value(MAJOR_BYTES, value.len() as u64)?;
        for &b in value {
            self.push(b)?;
        }
        Ok(())
    }

    pub fn write_text(&mut self, value: &str) -> io::Result<()> {
        self.type_value(MAJOR_TEXT, value.len() as u64)?;
        for &b in value.as_bytes() {
            self.push(b)?;
        }
        Ok(())
    }

    /// Open an array with a known element count.
    pub fn write_array(&mut self, len: usize) -> io::Result<()> {
        self.type_value(MAJOR_ARRAY, len as u64)
    }

    /// Open an array of unspecified length; terminate with
    /// [`write_break`](Self::write_break).
    pub fn write_array_indefinite(&mut self) -> io::Result<()> {
        self.push((MAJOR_ARRAY << 5) | INDEFINITE)
    }

    /// Open a map with a known entry count.
    pub fn write_map(&mut self, len: usize) -> io::Result<()> {
        self.type_value(MAJOR_MAP, len as u64)
    }

    /// Open a map of unspecified length; terminate with
    /// [`write_break`](Self::write_break).
    pub fn write_map_indefinite(&mut self) -> io::Result<()> {
        self.push((MAJOR_MAP << 5) | INDEFINITE)
    }

    /// Close the innermost indefinite-length item.
    pub fn write_break(&mut self) -> io::Result<()> {
        self.push((MAJOR_SIMPLE << 5) | INDEFINITE)
    }

    /// Write a time point as a `[seconds, ticks]` pair, with the
    /// sub-second part scaled to `ticks_per_second`.
    pub fn write_time(&mut self, t: DateTime<Utc>, ticks_per_second: u64) -> io::Result<()> {
        let subsec_ticks =
            u64::from(t.timestamp_subsec_nanos()) * ticks_per_second / NS_PER_SEC;
        self.write_array(2)?;
        self.write_int(t.timestamp())?;
        self.write_uint(subsec_ticks)
    }

    /// Write a duration as a signed tick count.
    pub fn write_duration(&mut self, d: Duration, ticks_per_second: u64) -> io::Result<()> {
        let ns = d.num_nanoseconds().unwrap_or_else(|| {
            if d < Duration::zero() {
                i64::MIN
            } else {
                i64::MAX
            }
        });
        let ticks = i128::from(ns) * i128::from(ticks_per_second) / i128::from(NS_PER_SEC);
        self.write_int(ticks as i64)
    }
}
