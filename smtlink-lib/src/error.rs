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


//! The error type shared by every layer of the library. Each
//! variant is fatal to the operation that raised it; nothing is
//! retried internally.

use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// A formula was built or used at the wrong type.
    #[error("type error: {0}")]
    Type(String),
    /// There is no conversion rule for an operator or term shape, in
    /// either direction.
    #[error("unsupported expression: {0}")]
    Unsupported(String),
    /// The backend refused to build a sort, declaration or term. The
    /// payload is the backend's own diagnostic.
    #[error("backend error: {0}")]
    Backend(String),
    #[error("solver returned unknown")]
    Unknown,
    #[error("solver was not configured to produce unsat cores in this mode")]
    NotConfiguredForUnsatCores,
    /// A query was made in a solver state where it has no meaning,
    /// e.g. an unsat core after an intervening assertion.
    #[error("{0}")]
    Status(String),
    /// A multiplication with more than one non-constant operand.
    #[error("non-linear expression: {0}")]
    NonLinear(String),
    #[error("cannot pop {requested} levels, only {available} backtrack points exist")]
    Pop { requested: usize, available: usize },
    /// A solver parameter was rejected by the backend.
    #[error("invalid solver option {key} = {value}: {reason}")]
    Option { key: String, value: String, reason: String },
    #[error("no model available")]
    NoModel,
    #[error("symbol names starting with '$' are reserved: {0}")]
    ReservedName(String),
    #[error("unknown solver {0}")]
    UnknownSolver(String),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("failed to encode message: {0}")]
    Encoding(#[from] bincode::Error),
    /// An error reported by a portfolio candidate process.
    #[error("candidate solver failed: {0}")]
    Remote(String),
    #[error("configuration error: {0}")]
    Config(String),
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Config(err.to_string())
    }
}
