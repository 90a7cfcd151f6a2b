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


use crossbeam::channel;
use std::thread;
use std::time::Duration;

use smtlink_lib::backends::bounded::Bounded;
use smtlink_lib::config::SolverOptions;
use smtlink_lib::error::Error;
use smtlink_lib::formula::{FormulaManager, Ty};
use smtlink_lib::portfolio::Portfolio;
use smtlink_lib::solver::Solver;

fn worker() -> &'static str {
    env!("CARGO_BIN_EXE_smtlink-worker")
}

fn alive(pid: u32) -> bool {
    unsafe { libc::kill(pid as libc::pid_t, 0) == 0 }
}

fn portfolio() -> Portfolio {
    Portfolio::new(worker(), &["bounded", "bounded-rev"], SolverOptions::default()).unwrap()
}

#[test]
fn agreeing_candidates_decide_the_race() {
    let mut fm = FormulaManager::new();
    let x = fm.symbol("x", Ty::BitVec(8)).unwrap();
    let zero = fm.bv(0, 8).unwrap();
    let one = fm.bv(1, 8).unwrap();
    let above = fm.bvult(zero, x).unwrap();
    let below = fm.bvult(x, one).unwrap();

    let mut racer = portfolio();
    racer.add_assertion(&fm, above).unwrap();
    racer.add_assertion(&fm, below).unwrap();
    assert!(!racer.solve(&mut fm, &[]).unwrap());
    assert_eq!(racer.last_race().len(), 2);

    racer.reset_assertions();
    racer.add_assertion(&fm, above).unwrap();
    assert!(!racer.solve(&mut fm, &[below]).unwrap());
    assert!(racer.solve(&mut fm, &[]).unwrap())
}

#[test]
fn post_race_queries_match_a_direct_solve() {
    let mut fm = FormulaManager::new();
    let x = fm.symbol("x", Ty::Int).unwrap();
    let y = fm.symbol("y", Ty::Int).unwrap();
    let sum = fm.plus(vec![x, y]).unwrap();
    let five = fm.int(5).unwrap();
    let two = fm.int(2).unwrap();
    let c1 = fm.eq(sum, five).unwrap();
    let c2 = fm.eq(x, two).unwrap();

    let mut racer = portfolio();
    racer.add_assertion(&fm, c1).unwrap();
    racer.add_assertion(&fm, c2).unwrap();
    assert!(racer.solve(&mut fm, &[]).unwrap());
    let raced = racer.get_value(&mut fm, y).unwrap();

    let options = SolverOptions::default();
    let mut direct = Solver::new(Bounded::new(&options).unwrap(), options);
    direct.add_assertion(&mut fm, c1).unwrap();
    direct.add_assertion(&mut fm, c2).unwrap();
    assert!(direct.solve(&mut fm, &[]).unwrap());
    assert_eq!(raced, direct.get_value(&mut fm, y).unwrap());

    let model = racer.get_model(&mut fm).unwrap();
    assert_eq!(model.get(x), Some(two));
    assert_eq!(model.get(y), Some(raced));
    assert!(racer.winner().is_some())
}

#[test]
fn losers_are_terminated() {
    let mut fm = FormulaManager::new();
    let x = fm.symbol("x", Ty::BitVec(8)).unwrap();
    let k = fm.bv(0x2a, 8).unwrap();
    let f = fm.eq(x, k).unwrap();

    let mut racer = portfolio();
    racer.add_assertion(&fm, f).unwrap();
    assert!(racer.solve(&mut fm, &[]).unwrap());
    let survivor = racer.survivor().unwrap();
    for pid in racer.last_race() {
        assert_eq!(alive(*pid), *pid == survivor)
    }

    // A new race replaces the survivor
    assert!(racer.solve(&mut fm, &[]).unwrap());
    assert!(!alive(survivor));

    let last = racer.survivor().unwrap();
    racer.close();
    assert!(!alive(last));
    assert!(racer.survivor().is_none());
    assert!(matches!(racer.get_value(&mut fm, x), Err(Error::NoModel)))
}

#[test]
fn failed_candidates_do_not_win() {
    let mut fm = FormulaManager::new();
    let x = fm.symbol("x", Ty::Int).unwrap();
    let zero = fm.int(0).unwrap();
    let f = fm.ge(x, zero).unwrap();

    // The bounded finder rejects unknown options, so only
    // bounded-rev can answer
    let bad = SolverOptions::default().with_option("no_such_option", "1");
    let mut racer = portfolio().with_solver_options("bounded", bad.clone()).unwrap();
    racer.add_assertion(&fm, f).unwrap();
    assert!(racer.solve(&mut fm, &[]).unwrap());
    assert_eq!(racer.winner(), Some("bounded-rev"));

    // With nobody left to answer, the race does not finish
    let (tx, rx) = channel::bounded(1);
    thread::spawn(move || {
        let mut fm = FormulaManager::new();
        let x = fm.symbol("x", Ty::Int).unwrap();
        let zero = fm.int(0).unwrap();
        let f = fm.ge(x, zero).unwrap();
        let mut racer = Portfolio::new(worker(), &["bounded"], bad).unwrap();
        racer.add_assertion(&fm, f).unwrap();
        let _ = tx.send(racer.solve(&mut fm, &[]).is_ok());
    });
    assert!(matches!(rx.recv_timeout(Duration::from_secs(2)), Err(channel::RecvTimeoutError::Timeout)))
}

#[test]
fn remote_errors_are_reported() {
    let mut fm = FormulaManager::new();
    let f = fm.symbol("f", Ty::function(vec![Ty::Int], Ty::Int)).unwrap();
    let x = fm.symbol("x", Ty::Int).unwrap();
    let fx = fm.apply(f, vec![x]).unwrap();
    let f_is_x = fm.eq(fx, x).unwrap();

    let mut racer = portfolio();
    racer.add_assertion(&fm, f_is_x).unwrap();
    assert!(racer.solve(&mut fm, &[]).unwrap());
    assert!(matches!(racer.get_value(&mut fm, f), Err(Error::Remote(_))))
}
