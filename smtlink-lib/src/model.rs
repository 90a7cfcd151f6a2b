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


//! Models of satisfiable solves. A [Model] holds a copy of the
//! backend's model, so it is unaffected by assertions made after it
//! was created.

use crate::backend::Backend;
use crate::convert::Converter;
use crate::error::Error;
use crate::formula::{FNode, FormulaManager};
use crate::signature;

pub struct Model<'s, B: Backend> {
    converter: &'s mut Converter<B>,
    model: B::Model,
}

impl<'s, B: Backend> Model<'s, B> {
    pub(crate) fn new(converter: &'s mut Converter<B>) -> Result<Self, Error> {
        let model = converter.backend_mut().model()?;
        Ok(Model { converter, model })
    }

    /// Evaluate a formula in the model. Symbols the model does not
    /// mention get a default value.
    pub fn get_value(&mut self, fm: &mut FormulaManager, formula: FNode) -> Result<FNode, Error> {
        let term = self.converter.convert(fm, formula)?;
        let value = self.converter.backend_mut().model_eval(&self.model, &term)?;
        let value = self.converter.back(fm, &value)?;
        let ty = fm.ty(formula).clone();
        signature::widen(fm, value, &ty)
    }

    pub fn get_values(&mut self, fm: &mut FormulaManager, formulas: &[FNode]) -> Result<Vec<(FNode, FNode)>, Error> {
        formulas.iter().map(|f| self.get_value(fm, *f).map(|value| (*f, value))).collect()
    }

    /// Iterate over the symbols assigned by the model. Function
    /// symbols are skipped.
    pub fn iter<'m>(&'m mut self, fm: &'m mut FormulaManager) -> Result<ModelIter<'m, B>, Error> {
        let entries = self.converter.backend_mut().model_entries(&self.model)?;
        Ok(ModelIter { converter: &mut *self.converter, fm, entries: entries.into_iter() })
    }

    pub fn contains(&mut self, fm: &mut FormulaManager, symbol: FNode) -> Result<bool, Error> {
        for entry in self.iter(fm)? {
            if entry?.0 == symbol {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Copy every assignment of the model out, independently of the
    /// solver it came from.
    pub fn snapshot(&mut self, fm: &mut FormulaManager) -> Result<ModelSnapshot, Error> {
        let assignments = self.iter(fm)?.collect::<Result<Vec<_>, _>>()?;
        Ok(ModelSnapshot { assignments })
    }
}

pub struct ModelIter<'m, B: Backend> {
    converter: &'m mut Converter<B>,
    fm: &'m mut FormulaManager,
    entries: std::vec::IntoIter<(B::Term, B::Term)>,
}

impl<'m, B: Backend> ModelIter<'m, B> {
    fn convert_entry(&mut self, symbol: &B::Term, value: &B::Term) -> Result<Option<(FNode, FNode)>, Error> {
        if !self.converter.is_constant(symbol)? {
            return Ok(None);
        }
        let symbol = self.converter.back(self.fm, symbol)?;
        let value = self.converter.back(self.fm, value)?;
        let ty = self.fm.ty(symbol).clone();
        Ok(Some((symbol, signature::widen(self.fm, value, &ty)?)))
    }
}

impl<'m, B: Backend> Iterator for ModelIter<'m, B> {
    type Item = Result<(FNode, FNode), Error>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let (symbol, value) = self.entries.next()?;
            match self.convert_entry(&symbol, &value) {
                Ok(None) => continue,
                Ok(Some(entry)) => return Some(Ok(entry)),
                Err(err) => return Some(Err(err)),
            }
        }
    }
}

/// An eagerly evaluated model: a list of symbol and value pairs.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ModelSnapshot {
    assignments: Vec<(FNode, FNode)>,
}

impl ModelSnapshot {
    pub fn new(assignments: Vec<(FNode, FNode)>) -> Self {
        ModelSnapshot { assignments }
    }

    pub fn get(&self, symbol: FNode) -> Option<FNode> {
        self.assignments.iter().find(|(s, _)| *s == symbol).map(|(_, v)| *v)
    }

    pub fn contains(&self, symbol: FNode) -> bool {
        self.get(symbol).is_some()
    }

    pub fn len(&self) -> usize {
        self.assignments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, (FNode, FNode)> {
        self.assignments.iter()
    }

    /// Flatten into the root list `[s0, v0, s1, v1, ...]` for export.
    pub fn roots(&self) -> Vec<FNode> {
        self.assignments.iter().flat_map(|(s, v)| vec![*s, *v]).collect()
    }

    pub fn from_roots(roots: &[FNode]) -> Self {
        ModelSnapshot { assignments: roots.chunks(2).filter(|pair| pair.len() == 2).map(|pair| (pair[0], pair[1])).collect() }
    }
}

impl IntoIterator for ModelSnapshot {
    type Item = (FNode, FNode);
    type IntoIter = std::vec::IntoIter<(FNode, FNode)>;

    fn into_iter(self) -> Self::IntoIter {
        self.assignments.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use crate::backends::bounded::Bounded;
    use crate::config::SolverOptions;
    use crate::formula::{FormulaManager, Op, Ty};
    use crate::solver::Solver;
    use num_bigint::BigInt;
    use num_rational::BigRational;

    #[test]
    fn iteration_skips_functions() {
        let mut fm = FormulaManager::new();
        let x = fm.symbol("x", Ty::Int).unwrap();
        let r = fm.symbol("r", Ty::Real).unwrap();
        let f = fm.symbol("f", Ty::function(vec![Ty::Int], Ty::Int)).unwrap();
        let two = fm.int(2).unwrap();
        let fx = fm.apply(f, vec![x]).unwrap();
        let c1 = fm.eq(fx, two).unwrap();
        let c2 = fm.eq(x, two).unwrap();
        let two_r = fm.real(2, 1).unwrap();
        let c3 = fm.eq(r, two_r).unwrap();
        let formula = fm.and(vec![c1, c2, c3]).unwrap();

        let options = SolverOptions::default();
        let mut s = Solver::new(Bounded::new(&options).unwrap(), options);
        s.add_assertion(&mut fm, formula).unwrap();
        assert!(s.solve(&mut fm, &[]).unwrap());

        let mut model = s.get_model().unwrap();
        let entries = model.iter(&mut fm).unwrap().collect::<Result<Vec<_>, _>>().unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|(s, _)| fm.is_symbol(*s) && !fm.ty(*s).is_function()));
        assert!(model.contains(&mut fm, x).unwrap());
        assert!(!model.contains(&mut fm, f).unwrap());

        let value = model.get_value(&mut fm, r).unwrap();
        assert_eq!(fm.op(value), &Op::Real(BigRational::from_integer(BigInt::from(2))));
        assert_eq!(model.get_value(&mut fm, fx).unwrap(), two);

        let snapshot = model.snapshot(&mut fm).unwrap();
        assert_eq!(snapshot.get(x), Some(two));
        assert_eq!(snapshot.len(), 2);
    }

    #[test]
    fn models_survive_later_assertions() {
        let mut fm = FormulaManager::new();
        let x = fm.symbol("x", Ty::BitVec(4)).unwrap();
        let three = fm.bv(3, 4).unwrap();
        let eq = fm.eq(x, three).unwrap();
        let options = SolverOptions::default();
        let mut s = Solver::new(Bounded::new(&options).unwrap(), options);
        s.add_assertion(&mut fm, eq).unwrap();
        assert!(s.solve(&mut fm, &[]).unwrap());
        let snapshot = s.get_model().unwrap().snapshot(&mut fm).unwrap();

        let ne = fm.not(eq).unwrap();
        s.add_assertion(&mut fm, ne).unwrap();
        assert!(!s.solve(&mut fm, &[]).unwrap());
        assert_eq!(snapshot.get(x), Some(three));
        assert!(s.get_model().is_err())
    }
}
