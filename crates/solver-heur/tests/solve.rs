use std::collections::HashMap;

use proptest::prelude::*;
use solver_heur::HeurSolver;
use test_support::{quick_config, room_koma, InputBuilder};
use timetable_core::{RunContext, SolveError, Solver};
use types::{Severity, SolverConfig, SolverInput, SolverResult};

fn solve(input: &SolverInput, config: &SolverConfig) -> Vec<SolverResult> {
    HeurSolver::new()
        .solve(input, config, &mut RunContext::detached())
        .unwrap()
}

/// Pairs of slots sharing a cell and a teacher, class or room.
fn double_bookings(input: &SolverInput, r: &SolverResult) -> usize {
    let komas: HashMap<_, _> = input.komas.iter().map(|k| (&k.id, k)).collect();
    let mut n = 0;
    for (i, a) in r.assignments.iter().enumerate() {
        for b in &r.assignments[i + 1..] {
            if a.cell() != b.cell() {
                continue;
            }
            let (ka, kb) = (komas[&a.koma_id], komas[&b.koma_id]);
            let shares = ka.id == kb.id
                || ka.teachers.iter().any(|t| kb.teachers.iter().any(|u| u.teacher_id == t.teacher_id))
                || ka.class_ids.iter().any(|c| kb.class_ids.contains(c))
                || ka.room_ids.iter().any(|x| kb.room_ids.contains(x));
            if shares {
                n += 1;
            }
        }
    }
    n
}

#[test]
fn five_independent_komas_solve_perfectly() {
    let input = InputBuilder::new(5, 6)
        .koma("k1", "math", &["t1"], &["1A"], 1)
        .koma("k2", "eng", &["t2"], &["1B"], 1)
        .koma("k3", "sci", &["t3"], &["1C"], 1)
        .koma("k4", "soc", &["t4"], &["1D"], 1)
        .koma("k5", "pe", &["t5"], &["1E"], 1)
        .build();
    let rs = solve(&input, &quick_config(1));
    assert_eq!(rs.len(), 1);
    let r = &rs[0];
    assert!(r.is_complete);
    assert_eq!(r.score, 0);
    assert_eq!(r.assignments.len(), 5);
    assert!(r.violations.is_empty());
}

#[test]
fn shared_teacher_with_one_slot_leaves_one_shortfall() {
    let input = InputBuilder::new(5, 6)
        .koma("a", "math", &["t1"], &["1A"], 1)
        .koma("b", "eng", &["t1"], &["1B"], 1)
        .only_available("t1", &[(3, 2)])
        .build();
    let r = &solve(&input, &quick_config(2))[0];
    let errors = r.violations.iter().filter(|v| v.severity == Severity::Error).count();
    assert_eq!(errors + r.shortfalls.len(), 1);
    assert_eq!(r.assignments.len(), 1);
    assert!(!r.is_complete);
    assert_eq!(double_bookings(&input, r), 0);
}

#[test]
fn identical_input_gives_identical_patterns() {
    let input = test_support::school_week(2, 3);
    let config = SolverConfig {
        max_patterns: 2,
        ..quick_config(3)
    };
    let strip = |mut rs: Vec<SolverResult>| {
        for r in &mut rs {
            r.elapsed_ms = 0;
        }
        serde_json::to_string(&rs).unwrap()
    };
    let a = strip(solve(&input, &config));
    let b = strip(solve(&input, &config));
    assert_eq!(a, b);
}

#[test]
fn search_never_ends_worse_than_construction() {
    let input = test_support::school_week(3, 4);
    for r in solve(&input, &quick_config(4)) {
        let built = r.stats["constructScore"].as_i64().unwrap();
        assert!(r.score <= built, "{} > {}", r.score, built);
        assert_eq!(double_bookings(&input, &r), 0);
    }
}

#[test]
fn fixed_slots_come_back_unchanged() {
    let input = InputBuilder::new(5, 6)
        .koma("m", "math", &["t1"], &["1A"], 3)
        .koma("e", "eng", &["t2"], &["1A"], 3)
        .fixed("m", 0, 1)
        .fixed("e", 0, 2)
        .build();
    let r = &solve(&input, &quick_config(3))[0];
    for f in &input.fixed_slots {
        let back = r.assignments.iter().find(|s| s.id == f.id).unwrap();
        assert_eq!(back.cell(), f.cell());
        assert!(back.is_fixed);
    }
    assert!(r.is_complete);
}

#[test]
fn patterns_are_ranked_and_named() {
    let input = test_support::school_week(1, 2);
    let config = SolverConfig {
        max_patterns: 3,
        ..quick_config(1)
    };
    let rs = solve(&input, &config);
    assert_eq!(rs.len(), 3);
    assert!(rs.windows(2).all(|w| (!w[0].is_complete, w[0].score) <= (!w[1].is_complete, w[1].score)));
    let mut ids: Vec<&str> = rs.iter().map(|r| r.pattern_id.0.as_str()).collect();
    ids.sort();
    assert_eq!(ids, vec!["pattern-0", "pattern-1", "pattern-2"]);
}

#[test]
fn bad_config_and_input_are_errors() {
    let input = test_support::school_week(1, 1);
    let config = SolverConfig {
        ils_restarts: 0,
        ..quick_config(1)
    };
    let err = HeurSolver::new()
        .solve(&input, &config, &mut RunContext::detached())
        .unwrap_err();
    assert!(matches!(err, SolveError::Config(_)));

    let mut broken = input.clone();
    broken.komas[0].subject_id = "nowhere".into();
    let err = HeurSolver::new()
        .solve(&broken, &quick_config(1), &mut RunContext::detached())
        .unwrap_err();
    assert!(matches!(err, SolveError::Invalid(_)));
}

prop_compose! {
    fn small_input()(
        days in 3u8..=5,
        periods in 4u8..=6,
        komas in prop::collection::vec(
            (0usize..3, 0usize..3, prop::option::of(0usize..2), 1u8..=3),
            1..8,
        ),
        closed in prop::collection::vec((0usize..2, 0u8..3, 1u8..=4), 0..4),
    ) -> SolverInput {
        let mut b = InputBuilder::new(days, periods);
        for (i, (t, c, room, count)) in komas.into_iter().enumerate() {
            let teacher = format!("t{t}");
            let class = format!("c{c}");
            let rooms: Vec<String> = room.map(|r| format!("r{r}")).into_iter().collect();
            let rooms: Vec<&str> = rooms.iter().map(String::as_str).collect();
            b = b.koma_with(room_koma(&format!("k{i}"), &format!("s{i}"), &[&teacher], &[&class], &rooms, count));
        }
        for (r, day, period) in closed {
            b = b.room_unavailable(&format!("r{r}"), &[(day, period)]);
        }
        b.build()
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn results_never_double_book(input in small_input()) {
        let rs = solve(&input, &quick_config(1));
        for r in &rs {
            prop_assert_eq!(double_bookings(&input, r), 0);
            let errors = r.violations.iter().filter(|v| v.severity == Severity::Error).count();
            prop_assert_eq!(errors, 0);
        }
    }
}
