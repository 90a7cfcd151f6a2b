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


//! An assertion stack with backtracking points, shared by the
//! incremental solver and the portfolio.

use crate::error::Error;

#[derive(Clone, Debug)]
pub struct AssertionStack<R> {
    records: Vec<R>,
    points: Vec<usize>,
}

impl<R> Default for AssertionStack<R> {
    fn default() -> Self {
        AssertionStack { records: Vec::new(), points: Vec::new() }
    }
}

impl<R> AssertionStack<R> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, record: R) {
        self.records.push(record)
    }

    pub fn push(&mut self, levels: usize) {
        for _ in 0..levels {
            self.points.push(self.records.len())
        }
    }

    /// Discard every record added since the `levels`-th most recent
    /// backtracking point.
    pub fn pop(&mut self, levels: usize) -> Result<(), Error> {
        if levels > self.points.len() {
            return Err(Error::Pop { requested: levels, available: self.points.len() });
        }
        if levels > 0 {
            let point = self.points[self.points.len() - levels];
            self.points.truncate(self.points.len() - levels);
            self.records.truncate(point)
        }
        Ok(())
    }

    pub fn clear(&mut self) {
        self.records.clear();
        self.points.clear()
    }

    pub fn depth(&self) -> usize {
        self.points.len()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[R] {
        &self.records
    }

    pub fn iter(&self) -> std::slice::Iter<'_, R> {
        self.records.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn pop_discards_records() {
        let mut stack = AssertionStack::new();
        stack.add(1);
        stack.push(1);
        stack.add(2);
        stack.push(2);
        stack.add(3);
        assert_eq!(stack.records(), &[1, 2, 3]);
        stack.pop(2).unwrap();
        assert_eq!(stack.records(), &[1, 2]);
        stack.pop(1).unwrap();
        assert_eq!(stack.records(), &[1]);
        assert!(matches!(stack.pop(1), Err(Error::Pop { requested: 1, available: 0 })));
    }

    #[derive(Clone, Debug)]
    enum Command {
        Add(u8),
        Push(usize),
        Pop(usize),
    }

    fn command() -> impl Strategy<Value = Command> {
        prop_oneof![any::<u8>().prop_map(Command::Add), (1..4usize).prop_map(Command::Push), (1..4usize).prop_map(Command::Pop)]
    }

    proptest! {
        #[test]
        fn balanced_push_pop_restores(initial in prop::collection::vec(any::<u8>(), 0..5), commands in prop::collection::vec(command(), 0..50)) {
            let mut stack = AssertionStack::new();
            for r in &initial {
                stack.add(*r)
            }
            stack.push(1);
            let before = stack.records().to_vec();

            // Track how deep we are relative to the outer push, and
            // never pop past it
            let mut pushed = 0;
            for command in commands {
                match command {
                    Command::Add(r) => stack.add(r),
                    Command::Push(n) => {
                        stack.push(n);
                        pushed += n
                    }
                    Command::Pop(n) => {
                        let n = n.min(pushed);
                        stack.pop(n).unwrap();
                        pushed -= n
                    }
                }
            }
            stack.pop(pushed).unwrap();
            stack.pop(1).unwrap();
            prop_assert_eq!(stack.records(), &before[..]);
            prop_assert_eq!(stack.depth(), 0);
            prop_assert!(stack.pop(1).is_err());
        }
    }
}
