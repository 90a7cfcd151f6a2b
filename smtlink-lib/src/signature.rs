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


//! Backend terms are more loosely typed than formulas: a numeral
//! may be an integer or a real, and equality, `ite` and arithmetic
//! freely mix the two. This module recovers the formula type of a
//! backend term, together with the types its arguments have to be
//! coerced to, from the types of its already converted children.

use num_rational::BigRational;

use crate::backend::Kind;
use crate::error::Error;
use crate::formula::{FNode, FormulaManager, Op, Ty};

/// A backend operator with its sorts converted to types and its
/// declarations resolved to symbols.
pub type ResolvedKind = Kind<Ty, FNode>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Signature {
    pub result: Ty,
    pub params: Vec<Ty>,
}

impl Signature {
    fn new(result: Ty, params: Vec<Ty>) -> Self {
        Signature { result, params }
    }

    fn leaf(result: Ty) -> Self {
        Signature { result, params: Vec::new() }
    }
}

/// The least type both arguments can be coerced to. Reals dominate
/// integers; any other mismatch is a type error.
pub fn most_generic(lhs: &Ty, rhs: &Ty) -> Result<Ty, Error> {
    if lhs == rhs {
        Ok(lhs.clone())
    } else if lhs.is_numeric() && rhs.is_numeric() {
        Ok(Ty::Real)
    } else {
        Err(Error::Type(format!("incompatible operand types {} and {}", lhs, rhs)))
    }
}

fn unify(tys: &[&Ty]) -> Result<Ty, Error> {
    match tys.split_first() {
        Some((first, rest)) => rest.iter().try_fold((*first).clone(), |acc, ty| most_generic(&acc, ty)),
        None => Err(Error::Unsupported("n-ary operator with no arguments".to_string())),
    }
}

fn nth<'a>(kind: &ResolvedKind, tys: &[&'a Ty], n: usize) -> Result<&'a Ty, Error> {
    tys.get(n).copied().ok_or_else(|| Error::Unsupported(format!("{:?} with {} arguments", kind, tys.len())))
}

fn bv_width(kind: &ResolvedKind, ty: &Ty) -> Result<u32, Error> {
    ty.bv_width().ok_or_else(|| Error::Unsupported(format!("{:?} applied to {}", kind, ty)))
}

/// Infer the signature of a backend term whose children have
/// already been converted to `args`.
pub fn infer(fm: &FormulaManager, kind: &ResolvedKind, args: &[FNode]) -> Result<Signature, Error> {
    use Kind::*;
    let tys: Vec<&Ty> = args.iter().map(|arg| fm.ty(*arg)).collect();

    let sig = match kind {
        True | False => Signature::leaf(Ty::Bool),
        Numeral(crate::backend::Numeral::Int(_)) => Signature::leaf(Ty::Int),
        Numeral(crate::backend::Numeral::Real(_)) => Signature::leaf(Ty::Real),
        Numeral(crate::backend::Numeral::Bits(_, w)) => Signature::leaf(Ty::BitVec(*w)),
        Constant(symbol) => Signature::leaf(fm.ty(*symbol).clone()),
        Uf(function) => match fm.ty(*function) {
            Ty::Function(params, ret) => Signature::new((**ret).clone(), params.clone()),
            ty => return Err(Error::Type(format!("application of a symbol of type {}", ty))),
        },
        And | Or => Signature::new(Ty::Bool, vec![Ty::Bool; tys.len()]),
        Not => Signature::new(Ty::Bool, vec![Ty::Bool]),
        Iff => Signature::new(Ty::Bool, vec![Ty::Bool, Ty::Bool]),
        Ite => {
            let ty = most_generic(nth(kind, &tys, 1)?, nth(kind, &tys, 2)?)?;
            Signature::new(ty.clone(), vec![Ty::Bool, ty.clone(), ty])
        }
        Eq | Leq => {
            let ty = most_generic(nth(kind, &tys, 0)?, nth(kind, &tys, 1)?)?;
            Signature::new(Ty::Bool, vec![ty.clone(), ty])
        }
        Plus | Times => {
            let ty = unify(&tys)?;
            Signature::new(ty.clone(), vec![ty; tys.len()])
        }
        BvNot | BvNeg | BvRotateLeft(_) | BvRotateRight(_) => {
            let ty = nth(kind, &tys, 0)?;
            bv_width(kind, ty)?;
            Signature::new(ty.clone(), vec![ty.clone()])
        }
        BvAnd | BvOr | BvXor | BvAdd | BvSub | BvMul | BvUdiv | BvUrem | BvSdiv | BvSrem | BvShl | BvLshr | BvAshr => {
            let ty = nth(kind, &tys, 0)?;
            bv_width(kind, ty)?;
            Signature::new(ty.clone(), vec![ty.clone(), ty.clone()])
        }
        BvUlt | BvUle | BvSlt | BvSle | BvComp => {
            let ty = nth(kind, &tys, 0)?;
            bv_width(kind, ty)?;
            let result = if matches!(kind, BvComp) { Ty::BitVec(1) } else { Ty::Bool };
            Signature::new(result, vec![ty.clone(), ty.clone()])
        }
        BvConcat => {
            let (lhs, rhs) = (nth(kind, &tys, 0)?, nth(kind, &tys, 1)?);
            Signature::new(Ty::BitVec(bv_width(kind, lhs)? + bv_width(kind, rhs)?), vec![lhs.clone(), rhs.clone()])
        }
        BvExtract(hi, lo) => {
            let ty = nth(kind, &tys, 0)?;
            let width = bv_width(kind, ty)?;
            match hi.checked_sub(*lo) {
                Some(span) if *hi < width => Signature::new(Ty::BitVec(span + 1), vec![ty.clone()]),
                _ => return Err(Error::Unsupported(format!("{:?} applied to {}", kind, ty))),
            }
        }
        BvZeroExtend(n) | BvSignExtend(n) => {
            let ty = nth(kind, &tys, 0)?;
            Signature::new(Ty::BitVec(bv_width(kind, ty)? + n), vec![ty.clone()])
        }
        ArrayRead => match nth(kind, &tys, 0)? {
            array @ Ty::Array(index, elem) => Signature::new((**elem).clone(), vec![array.clone(), (**index).clone()]),
            ty => return Err(Error::Unsupported(format!("array read from {}", ty))),
        },
        ArrayWrite => match nth(kind, &tys, 0)? {
            array @ Ty::Array(index, elem) => {
                Signature::new(array.clone(), vec![array.clone(), (**index).clone(), (**elem).clone()])
            }
            ty => return Err(Error::Unsupported(format!("array write to {}", ty))),
        },
        ArrayConst(ty) => match ty {
            Ty::Array(_, elem) => Signature::new(ty.clone(), vec![(**elem).clone()]),
            ty => return Err(Error::Unsupported(format!("constant array of sort {}", ty))),
        },
    };

    if sig.params.len() != args.len() {
        return Err(Error::Unsupported(format!("{:?} with {} arguments", kind, args.len())));
    }
    Ok(sig)
}

/// Coerce a converted child to the type its position expects.
pub fn coerce(fm: &mut FormulaManager, f: FNode, expected: &Ty) -> Result<FNode, Error> {
    let actual = fm.ty(f).clone();
    match (&actual, expected) {
        _ if actual == *expected => Ok(f),
        (Ty::Int, Ty::Real) => fm.to_real(f),
        _ => Err(Error::Type(format!("cannot coerce {} to {}", actual, expected))),
    }
}

/// Backends may evaluate a real valued term to an integer numeral
/// when the value happens to be whole. Bring such a value back to
/// the static type of the query.
pub fn widen(fm: &mut FormulaManager, value: FNode, expected: &Ty) -> Result<FNode, Error> {
    match (fm.op(value), expected) {
        (Op::Int(n), Ty::Real) => {
            let q = BigRational::from_integer(n.clone());
            fm.real_q(q)
        }
        _ => coerce(fm, value, expected),
    }
}

/// Build the formula for a backend operator from arguments that have
/// already been coerced to its signature.
pub fn build(fm: &mut FormulaManager, kind: ResolvedKind, args: Vec<FNode>) -> Result<FNode, Error> {
    use Kind::*;
    match kind {
        True => fm.bool(true),
        False => fm.bool(false),
        Numeral(crate::backend::Numeral::Int(n)) => fm.int_big(n),
        Numeral(crate::backend::Numeral::Real(q)) => fm.real_q(q),
        Numeral(crate::backend::Numeral::Bits(v, w)) => fm.bv_big(v, w),
        Constant(symbol) => Ok(symbol),
        Uf(function) => fm.apply(function, args),
        And => fm.and(args),
        Or => fm.or(args),
        Not => fm.not(args[0]),
        Iff => fm.iff(args[0], args[1]),
        Ite => fm.ite(args[0], args[1], args[2]),
        Eq => fm.eq(args[0], args[1]),
        Leq => fm.le(args[0], args[1]),
        Plus => fm.plus(args),
        Times => fm.times(args),
        BvNot => fm.mk(Op::BvNot, args),
        BvAnd => fm.mk(Op::BvAnd, args),
        BvOr => fm.mk(Op::BvOr, args),
        BvXor => fm.mk(Op::BvXor, args),
        BvNeg => fm.mk(Op::BvNeg, args),
        BvAdd => fm.mk(Op::BvAdd, args),
        BvSub => fm.mk(Op::BvSub, args),
        BvMul => fm.mk(Op::BvMul, args),
        BvUdiv => fm.mk(Op::BvUdiv, args),
        BvUrem => fm.mk(Op::BvUrem, args),
        BvSdiv => fm.mk(Op::BvSdiv, args),
        BvSrem => fm.mk(Op::BvSrem, args),
        BvShl => fm.mk(Op::BvShl, args),
        BvLshr => fm.mk(Op::BvLshr, args),
        BvAshr => fm.mk(Op::BvAshr, args),
        BvUlt => fm.mk(Op::BvUlt, args),
        BvUle => fm.mk(Op::BvUle, args),
        BvSlt => fm.mk(Op::BvSlt, args),
        BvSle => fm.mk(Op::BvSle, args),
        BvConcat => fm.mk(Op::BvConcat, args),
        BvComp => fm.mk(Op::BvComp, args),
        BvExtract(hi, lo) => fm.mk(Op::BvExtract(hi, lo), args),
        BvZeroExtend(n) => fm.mk(Op::BvZeroExtend(n), args),
        BvSignExtend(n) => fm.mk(Op::BvSignExtend(n), args),
        BvRotateLeft(n) => fm.mk(Op::BvRotateLeft(n), args),
        BvRotateRight(n) => fm.mk(Op::BvRotateRight(n), args),
        ArrayRead => fm.select(args[0], args[1]),
        ArrayWrite => fm.store(args[0], args[1], args[2]),
        ArrayConst(Ty::Array(index, _)) => fm.array_value(*index, args[0], &[]),
        ArrayConst(ty) => Err(Error::Unsupported(format!("constant array of sort {}", ty))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Numeral;
    use num_bigint::BigInt;

    #[test]
    fn real_dominates_int() {
        assert_eq!(most_generic(&Ty::Int, &Ty::Real).unwrap(), Ty::Real);
        assert_eq!(most_generic(&Ty::Int, &Ty::Int).unwrap(), Ty::Int);
        assert!(most_generic(&Ty::Bool, &Ty::Int).is_err());
    }

    #[test]
    fn mixed_ite_and_equality() {
        let mut fm = FormulaManager::new();
        let p = fm.symbol("p", Ty::Bool).unwrap();
        let x = fm.symbol("x", Ty::Int).unwrap();
        let r = fm.symbol("r", Ty::Real).unwrap();

        let sig = infer(&fm, &Kind::Ite, &[p, x, r]).unwrap();
        assert_eq!(sig.result, Ty::Real);
        assert_eq!(sig.params, vec![Ty::Bool, Ty::Real, Ty::Real]);

        let sig = infer(&fm, &Kind::Eq, &[x, r]).unwrap();
        assert_eq!(sig.result, Ty::Bool);
        assert_eq!(sig.params, vec![Ty::Real, Ty::Real]);

        let sig = infer(&fm, &Kind::Plus, &[x, x, r]).unwrap();
        assert_eq!(sig.result, Ty::Real);
    }

    #[test]
    fn numerals_and_arrays() {
        let mut fm = FormulaManager::new();
        let n = Kind::Numeral(Numeral::Int(BigInt::from(3)));
        assert_eq!(infer(&fm, &n, &[]).unwrap().result, Ty::Int);

        let zero = fm.int(0).unwrap();
        let array = Ty::array(Ty::Int, Ty::Real);
        let sig = infer(&fm, &Kind::ArrayConst(array.clone()), &[zero]).unwrap();
        assert_eq!(sig.result, array);
        // The integer default needs coercing to the element type
        assert_eq!(sig.params, vec![Ty::Real]);
        let coerced = coerce(&mut fm, zero, &sig.params[0]).unwrap();
        assert_eq!(fm.op(coerced), &Op::ToReal);
    }

    #[test]
    fn wrong_arity_is_unsupported() {
        let mut fm = FormulaManager::new();
        let p = fm.symbol("p", Ty::Bool).unwrap();
        assert!(matches!(infer(&fm, &Kind::Not, &[p, p]), Err(Error::Unsupported(_))));
        assert!(matches!(infer(&fm, &Kind::Ite, &[p]), Err(Error::Unsupported(_))));
    }

    #[test]
    fn malformed_extracts_are_unsupported() {
        let mut fm = FormulaManager::new();
        let x = fm.symbol("x", Ty::BitVec(8)).unwrap();
        assert_eq!(infer(&fm, &Kind::BvExtract(7, 4), &[x]).unwrap().result, Ty::BitVec(4));
        assert!(matches!(infer(&fm, &Kind::BvExtract(2, 5), &[x]), Err(Error::Unsupported(_))));
        assert!(matches!(infer(&fm, &Kind::BvExtract(8, 0), &[x]), Err(Error::Unsupported(_))));
    }

    #[test]
    fn widening() {
        let mut fm = FormulaManager::new();
        let two = fm.int(2).unwrap();
        let widened = widen(&mut fm, two, &Ty::Real).unwrap();
        assert_eq!(fm.op(widened), &Op::Real(BigRational::from_integer(BigInt::from(2))));
        assert_eq!(widen(&mut fm, two, &Ty::Int).unwrap(), two);
    }
}
