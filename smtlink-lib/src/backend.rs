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


//! The interface a native solver engine has to provide. The
//! converter and solver only ever talk to a backend through this
//! trait, so any engine with booleans, linear integer and real
//! arithmetic, fixed-width bitvectors, arrays and uninterpreted
//! functions can be plugged in.

use num_bigint::{BigInt, BigUint};
use num_rational::BigRational;
use std::fmt;

use crate::error::Error;

/// The structure of a backend sort.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum SortShape<S> {
    Bool,
    Int,
    Real,
    BitVec(u32),
    Array(S, S),
    Function(Vec<S>, S),
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Numeral {
    Int(BigInt),
    Real(BigRational),
    Bits(BigUint, u32),
}

/// The native operators of a backend. This is intentionally looser
/// than the formula language: `and` and `or` are binary, `leq` is the
/// only comparison, there is no subtraction or coercion, and integer
/// and real arguments may be mixed.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Kind<S, D> {
    True,
    False,
    Numeral(Numeral),
    /// A declared nullary symbol.
    Constant(D),
    /// An application of a declared function symbol.
    Uf(D),
    And,
    Or,
    Not,
    Iff,
    Ite,
    Eq,
    Leq,
    Plus,
    Times,
    BvNot,
    BvAnd,
    BvOr,
    BvXor,
    BvNeg,
    BvAdd,
    BvSub,
    BvMul,
    BvUdiv,
    BvUrem,
    BvSdiv,
    BvSrem,
    BvShl,
    BvLshr,
    BvAshr,
    BvUlt,
    BvUle,
    BvSlt,
    BvSle,
    BvConcat,
    BvComp,
    BvExtract(u32, u32),
    BvZeroExtend(u32),
    BvSignExtend(u32),
    BvRotateLeft(u32),
    BvRotateRight(u32),
    ArrayRead,
    ArrayWrite,
    /// A constant array of the given (array) sort.
    ArrayConst(S),
}

impl<S, D> Kind<S, D> {
    /// Rebuild a kind with its sort and declaration payloads replaced.
    pub fn try_map<S2, D2, E, FS, FD>(self, mut sort: FS, mut decl: FD) -> Result<Kind<S2, D2>, E>
    where
        FS: FnMut(S) -> Result<S2, E>,
        FD: FnMut(D) -> Result<D2, E>,
    {
        use Kind::*;
        Ok(match self {
            True => True,
            False => False,
            Numeral(n) => Numeral(n),
            Constant(d) => Constant(decl(d)?),
            Uf(d) => Uf(decl(d)?),
            And => And,
            Or => Or,
            Not => Not,
            Iff => Iff,
            Ite => Ite,
            Eq => Eq,
            Leq => Leq,
            Plus => Plus,
            Times => Times,
            BvNot => BvNot,
            BvAnd => BvAnd,
            BvOr => BvOr,
            BvXor => BvXor,
            BvNeg => BvNeg,
            BvAdd => BvAdd,
            BvSub => BvSub,
            BvMul => BvMul,
            BvUdiv => BvUdiv,
            BvUrem => BvUrem,
            BvSdiv => BvSdiv,
            BvSrem => BvSrem,
            BvShl => BvShl,
            BvLshr => BvLshr,
            BvAshr => BvAshr,
            BvUlt => BvUlt,
            BvUle => BvUle,
            BvSlt => BvSlt,
            BvSle => BvSle,
            BvConcat => BvConcat,
            BvComp => BvComp,
            BvExtract(hi, lo) => BvExtract(hi, lo),
            BvZeroExtend(n) => BvZeroExtend(n),
            BvSignExtend(n) => BvSignExtend(n),
            BvRotateLeft(n) => BvRotateLeft(n),
            BvRotateRight(n) => BvRotateRight(n),
            ArrayRead => ArrayRead,
            ArrayWrite => ArrayWrite,
            ArrayConst(s) => ArrayConst(sort(s)?),
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SmtResult {
    Sat,
    Unsat,
    Unknown,
}

impl fmt::Display for SmtResult {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SmtResult::Sat => write!(f, "sat"),
            SmtResult::Unsat => write!(f, "unsat"),
            SmtResult::Unknown => write!(f, "unknown"),
        }
    }
}

/// A handle on one native solver context. A handle is owned by
/// exactly one converter and is never shared between threads; its
/// native resources are released when it is dropped.
pub trait Backend {
    type Sort: Clone + fmt::Debug;
    type Decl: Clone + fmt::Debug;
    type Term: Clone + fmt::Debug;
    type Model;

    fn name(&self) -> &str;

    fn mk_sort(&mut self, shape: SortShape<Self::Sort>) -> Result<Self::Sort, Error>;

    fn sort_shape(&self, sort: &Self::Sort) -> Result<SortShape<Self::Sort>, Error>;

    fn declare(&mut self, name: &str, sort: &Self::Sort) -> Result<Self::Decl, Error>;

    /// A number identifying the declaration within this handle.
    fn decl_id(&self, decl: &Self::Decl) -> u64;

    fn decl_name(&self, decl: &Self::Decl) -> String;

    /// The sort of a declaration, which is a function sort for
    /// declarations with parameters.
    fn decl_sort(&self, decl: &Self::Decl) -> Result<Self::Sort, Error>;

    fn mk_term(&mut self, kind: Kind<Self::Sort, Self::Decl>, args: &[Self::Term]) -> Result<Self::Term, Error>;

    /// Decompose a term into its operator and children.
    fn view(&mut self, term: &Self::Term) -> Result<(Kind<Self::Sort, Self::Decl>, Vec<Self::Term>), Error>;

    fn term_sort(&self, term: &Self::Term) -> Result<Self::Sort, Error>;

    /// A number identifying the term within this handle for as long
    /// as the term is alive.
    fn term_id(&self, term: &Self::Term) -> u64;

    fn is_numeral(&mut self, term: &Self::Term) -> Result<bool, Error> {
        Ok(matches!(self.view(term)?.0, Kind::Numeral(_)))
    }

    fn assert(&mut self, term: &Self::Term) -> Result<(), Error>;

    fn push(&mut self) -> Result<(), Error>;

    fn pop(&mut self) -> Result<(), Error>;

    /// Remove every assertion and backtrack point.
    fn reset(&mut self) -> Result<(), Error>;

    /// Check the current assertions under the given assumptions,
    /// which must be boolean constants or their negations.
    fn check(&mut self, assumptions: &[Self::Term]) -> Result<SmtResult, Error>;

    /// The asserted terms of an unsatisfiable core of the last check.
    fn unsat_core(&mut self) -> Result<Vec<Self::Term>, Error>;

    /// The subset of the last check's assumptions responsible for
    /// unsatisfiability.
    fn unsat_assumptions(&mut self) -> Result<Vec<Self::Term>, Error>;

    /// Evaluate a term in the model of the last satisfiable check.
    fn value(&mut self, term: &Self::Term) -> Result<Self::Term, Error>;

    /// A copy of the model of the last satisfiable check, unaffected
    /// by later assertions.
    fn model(&mut self) -> Result<Self::Model, Error>;

    fn model_eval(&mut self, model: &Self::Model, term: &Self::Term) -> Result<Self::Term, Error>;

    /// Every (term, value) pair the model assigns, including function
    /// applications.
    fn model_entries(&mut self, model: &Self::Model) -> Result<Vec<(Self::Term, Self::Term)>, Error>;
}
