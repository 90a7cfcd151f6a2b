// BSD 2-Clause License
//
// Copyright (c) 2019, 2020 Alasdair Armstrong
//
// All rights reserved.
//
// Redistribution and use in source and binary forms, with or without
// modification, are permitted provided that the following conditions are
// met:
//
// 1. Redistributions of source code must retain the above copyright
// notice, this list of conditions and the following disclaimer.
//
// 2. Redistributions in binary form must reproduce the above copyright
// notice, this list of conditions and the following disclaimer in the
// documentation and/or other materials provided with the distribution.
//
// THIS SOFTWARE IS PROVIDED BY THE COPYRIGHT HOLDERS AND CONTRIBUTORS
// "AS IS" AND ANY EXPRESS OR IMPLIED WARRANTIES, INCLUDING, BUT NOT
// LIMITED TO, THE IMPLIED WARRANTIES OF MERCHANTABILITY AND FITNESS FOR
// A PARTICULAR PURPOSE ARE DISCLAIMED. IN NO EVENT SHALL THE COPYRIGHT
// HOLDER OR CONTRIBUTORS BE LIABLE FOR ANY DIRECT, INDIRECT, INCIDENTAL,
// SPECIAL, EXEMPLARY, OR CONSEQUENTIAL DAMAGES (INCLUDING, BUT NOT
// LIMITED TO, PROCUREMENT OF SUBSTITUTE GOODS OR SERVICES; LOSS OF USE,
// DATA, OR PROFITS; OR BUSINESS INTERRUPTION) HOWEVER CAUSED AND ON ANY
// THEORY OF LIABILITY, WHETHER IN CONTRACT, STRICT LIABILITY, OR TORT
// (INCLUDING NEGLIGENCE OR OTHERWISE) ARISING IN ANY WAY OUT OF THE USE
// OF THIS SOFTWARE, EVEN IF ADVISED OF THE POSSIBILITY OF SUCH DAMAGE.


//! Messages between the portfolio racer and its candidate
//! processes. Every message is a frame: a little-endian `u32` length
//! followed by that many bytes of `bincode`.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::convert::TryFrom;
use std::io::{ErrorKind, Read, Write};

use crate::config::SolverOptions;
use crate::error::Error;
use crate::formula::PortableFormula;

/// The largest payload either side will send or accept.
pub const MAX_FRAME: u32 = 1 << 28;

/// Sent once to a candidate when it is launched. The formula has a
/// single root, the conjunction of everything asserted.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Job {
    pub backend: String,
    pub options: SolverOptions,
    pub formula: PortableFormula,
}

/// Requests to the surviving candidate after a race.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Command {
    GetValue(PortableFormula),
    GetModel,
    Exit,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Reply {
    /// The outcome of the race for this candidate.
    Solved(bool),
    /// The candidate could not solve the job and is exiting.
    Failed(String),
    Value(PortableFormula),
    /// Symbol and value pairs flattened as `[s0, v0, s1, v1, ...]`.
    Model(PortableFormula),
    Error(String),
}

pub fn write_frame<W: Write, T: Serialize>(writer: &mut W, message: &T) -> Result<(), Error> {
    let payload = bincode::serialize(message)?;
    let length = u32::try_from(payload.len())
        .ok()
        .filter(|length| *length <= MAX_FRAME)
        .ok_or_else(|| Error::Protocol(format!("message of {} bytes is too large", payload.len())))?;
    writer.write_all(&length.to_le_bytes())?;
    writer.write_all(&payload)?;
    writer.flush()?;
    Ok(())
}

/// Read one frame. A stream that ends cleanly before a frame starts
/// yields `None`, which callers treat as the peer having exited. A
/// stream ending anywhere else is a protocol error.
pub fn read_frame<R: Read, T: DeserializeOwned>(reader: &mut R) -> Result<Option<T>, Error> {
    let mut length_buf: [u8; 4] = [0; 4];
    let mut filled = 0;
    while filled < length_buf.len() {
        match reader.read(&mut length_buf[filled..]) {
            Ok(0) if filled == 0 => return Ok(None),
            Ok(0) => return Err(Error::Protocol(format!("truncated frame header of {} bytes", filled))),
            Ok(n) => filled += n,
            Err(err) if err.kind() == ErrorKind::Interrupted => (),
            Err(err) => return Err(err.into()),
        }
    }
    let length = u32::from_le_bytes(length_buf);
    if length > MAX_FRAME {
        return Err(Error::Protocol(format!("frame of {} bytes exceeds the limit of {}", length, MAX_FRAME)));
    }

    let mut buf = vec![0; length as usize];
    reader.read_exact(&mut buf).map_err(|_| Error::Protocol(format!("truncated frame of {} bytes", length)))?;
    Ok(Some(bincode::deserialize(&buf)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::{FormulaManager, Ty};
    use std::io::Cursor;

    #[test]
    fn frames_in_sequence() {
        let mut fm = FormulaManager::new();
        let x = fm.symbol("x", Ty::BitVec(8)).unwrap();
        let one = fm.bv(1, 8).unwrap();
        let f = fm.bvult(x, one).unwrap();

        let mut buf = Vec::new();
        let job = Job { backend: "bounded".to_string(), options: SolverOptions::default(), formula: fm.export(&[f]) };
        write_frame(&mut buf, &job).unwrap();
        write_frame(&mut buf, &Command::GetModel).unwrap();
        let length = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
        assert!(buf.len() > length + 4);

        let mut reader = Cursor::new(buf);
        let read: Job = read_frame(&mut reader).unwrap().unwrap();
        assert_eq!(read.backend, "bounded");
        let mut other = FormulaManager::new();
        let roots = other.import(&read.formula).unwrap();
        assert_eq!(other.show(roots[0]).to_string(), fm.show(f).to_string());

        assert!(matches!(read_frame::<_, Command>(&mut reader).unwrap(), Some(Command::GetModel)));
        assert!(read_frame::<_, Command>(&mut reader).unwrap().is_none())
    }

    #[test]
    fn truncated_frames_are_errors() {
        let mut buf = Vec::new();
        write_frame(&mut buf, &Reply::Solved(true)).unwrap();
        buf.pop();
        assert!(matches!(read_frame::<_, Reply>(&mut Cursor::new(buf)), Err(Error::Protocol(_))));

        // Cut inside the length prefix
        for cut in 1..4 {
            let header = vec![8u8, 0, 0, 0][..cut].to_vec();
            assert!(matches!(read_frame::<_, Reply>(&mut Cursor::new(header)), Err(Error::Protocol(_))))
        }
        assert!(read_frame::<_, Reply>(&mut Cursor::new(Vec::new())).unwrap().is_none());

        let oversized = (MAX_FRAME + 1).to_le_bytes().to_vec();
        match read_frame::<_, Reply>(&mut Cursor::new(oversized)) {
            Err(Error::Protocol(msg)) => assert!(msg.contains("exceeds")),
            other => panic!("expected a protocol error, got {:?}", other),
        }
    }
}
