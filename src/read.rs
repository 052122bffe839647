// Copyright (c) 2024 The brine developers.  Licensed under the Apache License,
// Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at
// your option. This file may not be copied, modified, or distributed except
// according to those terms.

//! The byte reader feeding the pickle machine.

use std::io::{self, BufRead, BufReader, Read};
use byteorder::{BigEndian, ByteOrder, LittleEndian};

/// A thin buffered adapter over a sequential byte source.
///
/// Exposes the access patterns opcode arguments need: single bytes, fixed
/// length runs, newline-delimited lines, and fixed-endian numbers.  The
/// reader is sequential and non-seekable; it tracks the number of bytes
/// consumed for diagnostics.  End of input surfaces as
/// `io::ErrorKind::UnexpectedEof`.
pub struct OpReader<R> {
    rdr: BufReader<R>,
    pos: usize,
}

impl<R: Read> OpReader<R> {
    pub fn new(rdr: R) -> OpReader<R> {
        OpReader { rdr: BufReader::new(rdr), pos: 0 }
    }

    /// Number of bytes consumed so far.
    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn read_byte(&mut self) -> io::Result<u8> {
        let mut buf = [0];
        self.rdr.read_exact(&mut buf)?;
        self.pos += 1;
        Ok(buf[0])
    }

    pub fn read_bytes(&mut self, n: usize) -> io::Result<Vec<u8>> {
        // Grow the buffer while reading instead of trusting the declared
        // length, so a lying prefix on a truncated stream fails early.
        let mut buf = Vec::new();
        let read = (&mut self.rdr).take(n as u64).read_to_end(&mut buf)?;
        self.pos += read;
        if read < n {
            return Err(io::ErrorKind::UnexpectedEof.into());
        }
        Ok(buf)
    }

    /// Reads up to and excluding the next `0x0a` byte; the terminator is
    /// consumed.  An empty payload is valid.  Input ending before the
    /// terminator is an error.
    pub fn read_line(&mut self) -> io::Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(16);
        let n = self.rdr.read_until(b'\n', &mut buf)?;
        self.pos += n;
        if buf.last() != Some(&b'\n') {
            return Err(io::ErrorKind::UnexpectedEof.into());
        }
        buf.pop();
        Ok(buf)
    }

    pub fn read_u8(&mut self) -> io::Result<u8> {
        self.read_byte()
    }

    pub fn read_u16_le(&mut self) -> io::Result<u16> {
        let buf = self.read_bytes(2)?;
        Ok(LittleEndian::read_u16(&buf))
    }

    pub fn read_u32_le(&mut self) -> io::Result<u32> {
        let buf = self.read_bytes(4)?;
        Ok(LittleEndian::read_u32(&buf))
    }

    pub fn read_i32_le(&mut self) -> io::Result<i32> {
        let buf = self.read_bytes(4)?;
        Ok(LittleEndian::read_i32(&buf))
    }

    pub fn read_f64_be(&mut self) -> io::Result<f64> {
        let buf = self.read_bytes(8)?;
        Ok(BigEndian::read_f64(&buf))
    }
}
