use std::sync::{Arc, Mutex};

use adam_core::storage::parse_sheet_content;
use adam_core::{
    AdamError, CellState, LinePosition, Name, RelateTerm, Sheet, SolverConfig, Value, compile,
};
use pretty_assertions::assert_eq;

fn built(content: &str) -> Sheet {
    let mut sheet = parse_sheet_content(content, Some("test.adm")).unwrap();
    sheet.build().unwrap();
    sheet
}

fn names(list: &[Name]) -> Vec<&'static str> {
    list.iter().map(|n| n.as_str()).collect()
}

/// Record every value a cell is notified with.
fn record(sheet: &mut Sheet, cell: &str) -> Arc<Mutex<Vec<Value>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    sheet
        .monitor_value(cell, move |value, _| sink.lock().unwrap().push(value.clone()))
        .unwrap();
    seen
}

#[test]
fn test_sum_scenario() {
    let mut sheet = built("input a: 1\ninput b: 2\noutput sum <== a + b\n");
    assert_eq!(sheet.get("sum").unwrap(), Value::from(3));

    let seen = record(&mut sheet, "sum");
    sheet.set("a", 5).unwrap();
    let report = sheet.update().unwrap();
    assert_eq!(sheet.get("sum").unwrap(), Value::from(7));
    assert_eq!(*seen.lock().unwrap(), vec![Value::from(7)]);
    assert_eq!(names(&report.changed), vec!["a", "sum"]);

    let report = sheet.update().unwrap();
    assert!(report.recomputed.is_empty());
    assert_eq!(report.sweeps, 0);
    assert_eq!(seen.lock().unwrap().len(), 1);
}

#[test]
fn test_cycle_between_logic_cells_is_reported_in_declaration_order() {
    let mut sheet = parse_sheet_content("logic x <== y + 1\nlogic y <== x + 1\n", None).unwrap();
    match sheet.build().unwrap_err() {
        AdamError::CircularDependency { cells } => assert_eq!(names(&cells), vec!["x", "y"]),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_self_reference_is_a_cycle() {
    let mut sheet = parse_sheet_content("input a: 1\nlogic x <== x + a\n", None).unwrap();
    assert!(matches!(
        sheet.build(),
        Err(AdamError::CircularDependency { cells }) if names(&cells) == vec!["x"]
    ));
}

#[test]
fn test_relation_feedback_that_never_settles() {
    let mut sheet = built(
        r#"
input a: 0
input b: 0
logic c <== b
relate { a <== b - 1; b <== c + 1 }
"#,
    );
    sheet.set_config(SolverConfig { max_iterations: 16 });
    sheet.set("a", 10).unwrap();
    match sheet.update().unwrap_err() {
        AdamError::NonConvergent { iterations, pending } => {
            assert_eq!(iterations, 16);
            assert!(pending.contains(&Name::new("b")));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_relation_solves_the_cell_that_was_not_set() {
    let mut sheet = built("input a: 2\ninput b: 1\nrelate { a <== b * 2; b <== a / 2 }\n");

    sheet.set("a", 10).unwrap();
    let report = sheet.update().unwrap();
    assert_eq!(sheet.get("b").unwrap(), Value::from(5));
    assert_eq!(sheet.get("a").unwrap(), Value::from(10));
    assert_eq!(names(&report.recomputed), vec!["b"]);

    sheet.set("b", 3).unwrap();
    sheet.update().unwrap();
    assert_eq!(sheet.get("a").unwrap(), Value::from(6));
    assert_eq!(sheet.get("b").unwrap(), Value::from(3));
}

#[test]
fn test_relation_with_both_members_set_solves_earliest_declared() {
    let mut sheet = built("input a: 2\ninput b: 1\nrelate { b <== a / 2; a <== b * 2 }\n");
    sheet.set("b", 3).unwrap();
    sheet.set("a", 10).unwrap();
    sheet.update().unwrap();
    // `a` is declared before `b`, so its term is the unknown.
    assert_eq!(sheet.get("a").unwrap(), Value::from(6));
    assert_eq!(sheet.get("b").unwrap(), Value::from(3));
}

#[test]
fn test_relation_feeds_downstream_logic() {
    let mut sheet = built(
        r#"
input fahrenheit: 0
input celsius: 100
relate { fahrenheit <== celsius * 9 / 5 + 32; celsius <== (fahrenheit - 32) * 5 / 9 }
output hot <== celsius > 30
"#,
    );
    assert_eq!(sheet.get("fahrenheit").unwrap(), Value::from(212));
    assert_eq!(sheet.get("hot").unwrap(), Value::from(true));

    let hot = record(&mut sheet, "hot");
    sheet.set("fahrenheit", 50).unwrap();
    sheet.update().unwrap();
    assert_eq!(sheet.get("celsius").unwrap(), Value::from(10));
    assert_eq!(*hot.lock().unwrap(), vec![Value::from(false)]);
}

#[test]
fn test_invariant_violation_does_not_abort_update() {
    let mut sheet = built(
        r#"
input width: 10
logic area <== width * 2
invariant positive <== width > 0
output doubled <== area * 2
"#,
    );
    sheet.set("width", -1).unwrap();
    let report = sheet.update().unwrap();
    assert_eq!(sheet.get("doubled").unwrap(), Value::from(-4));
    assert_eq!(report.violations.len(), 1);
    assert_eq!(report.violations[0].name.as_str(), "positive");
    assert_eq!(report.violations[0].expression.as_deref(), Some("width > 0"));
    assert!(!report.is_consistent());

    sheet.set("width", 4).unwrap();
    assert!(sheet.update().unwrap().is_consistent());
}

#[test]
fn test_non_bool_invariant_is_an_evaluation_error() {
    let mut sheet = parse_sheet_content("input a: 1\ninvariant bad <== a + 1\n", None).unwrap();
    let err = sheet.build().unwrap_err();
    assert!(err.is_evaluation());
    assert_eq!(sheet.state("bad").unwrap(), CellState::Error);
}

#[test]
fn test_each_dependent_recomputed_once_in_dependency_order() {
    let mut sheet = built(
        r#"
input a: 1
logic b <== a + 1
logic c <== a + b
output d <== b + c
output unrelated <== 7
"#,
    );
    sheet.set("a", 2).unwrap();
    let report = sheet.update().unwrap();
    assert_eq!(names(&report.recomputed), vec!["b", "c", "d"]);
    assert_eq!(sheet.get("d").unwrap(), Value::from(8));
}

#[test]
fn test_same_sets_replay_identically() {
    let content = r#"
input a: 1
input b: 2
input c: 3
logic x <== a * b
logic y <== x + c
output z <== [x, y]
relate { b <== c - a; c <== a + b }
"#;
    let run = || {
        let mut sheet = built(content);
        let log = Arc::new(Mutex::new(Vec::new()));
        for cell in ["x", "y", "z", "b", "c"] {
            let log = log.clone();
            sheet
                .monitor_value(cell, move |value, _| {
                    log.lock().unwrap().push(format!("{cell}={value:?}"))
                })
                .unwrap();
        }
        let mut reports = Vec::new();
        for (name, value) in [("a", 5), ("c", 9), ("a", 2)] {
            sheet.set(name, value).unwrap();
            reports.push(sheet.update().unwrap());
        }
        let log = log.lock().unwrap().clone();
        (reports, sheet.snapshot(), log)
    };
    assert_eq!(run(), run());
}

#[test]
fn test_update_is_idempotent() {
    let mut sheet = built(
        "input a: 1\ninput b: 3\nrelate { b <== a * 3; a <== b / 3 }\nlogic total <== a + b\n",
    );
    let _ = sheet.update().unwrap();
    let before = sheet.snapshot();
    let report = sheet.update().unwrap();
    assert_eq!(sheet.snapshot(), before);
    assert!(report.recomputed.is_empty());
    assert!(report.changed.is_empty());
}

#[test]
fn test_monitor_set_is_applied_in_same_update() {
    let mut sheet = built("input a: 1\ninput b: 0\noutput total <== a + b\n");
    sheet
        .monitor_value("a", |value, pending| {
            if let Some(n) = value.as_number() {
                pending.set("b", n * 10.0);
            }
        })
        .unwrap();
    sheet.set("a", 2).unwrap();
    let report = sheet.update().unwrap();
    assert_eq!(sheet.get("b").unwrap(), Value::from(20));
    assert_eq!(sheet.get("total").unwrap(), Value::from(22));
    assert_eq!(report.sweeps, 2);
}

#[test]
fn test_monitor_not_called_for_unchanged_value() {
    let mut sheet = built("input a: 3\noutput parity <== a % 2\n");
    let seen = record(&mut sheet, "parity");
    sheet.set("a", 5).unwrap();
    sheet.update().unwrap();
    assert!(seen.lock().unwrap().is_empty());
    sheet.set("a", 6).unwrap();
    sheet.update().unwrap();
    assert_eq!(*seen.lock().unwrap(), vec![Value::from(0)]);
}

#[test]
fn test_monitors_fire_in_registration_order() {
    let mut sheet = built("input a: 1\n");
    let order = Arc::new(Mutex::new(Vec::new()));
    for tag in 0..3 {
        let order = order.clone();
        sheet
            .monitor_value("a", move |_, _| order.lock().unwrap().push(tag))
            .unwrap();
    }
    sheet.set("a", 2).unwrap();
    sheet.update().unwrap();
    assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
}

#[test]
fn test_setting_back_to_original_value_is_not_a_change() {
    let mut sheet = built("input a: 1\n");
    let seen = record(&mut sheet, "a");
    sheet.set("a", 9).unwrap();
    sheet.set("a", 1).unwrap();
    let report = sheet.update().unwrap();
    assert!(report.changed.is_empty());
    assert!(seen.lock().unwrap().is_empty());
}

#[test]
fn test_host_misuse_errors() {
    let mut sheet = built("constant k: 1\ninput a: 1\noutput o <== a + k\n");
    assert!(matches!(sheet.set("k", 2), Err(AdamError::NotSettable { .. })));
    assert!(matches!(sheet.set("o", 2), Err(AdamError::NotSettable { .. })));
    assert!(matches!(sheet.set("missing", 2), Err(AdamError::UnknownCell(_))));
    assert!(matches!(sheet.cell_value("missing"), Err(AdamError::UnknownCell(_))));
}

#[test]
fn test_unknown_reference_fails_build() {
    let mut sheet =
        parse_sheet_content("input a: 1\noutput o <== a + nope\n", Some("s.adm")).unwrap();
    match sheet.build().unwrap_err() {
        AdamError::UnknownCellReference { name, position, .. } => {
            assert_eq!(name.as_str(), "nope");
            assert_eq!(position.line, 2);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_evaluation_error_is_retried_after_fix() {
    let mut sheet = built("input items: [1, 2, 3]\ninput i: 0\noutput pick <== items[i]\n");
    sheet.set("i", 7).unwrap();
    let err = sheet.update().unwrap_err();
    assert!(err.is_evaluation());
    assert_eq!(sheet.state("pick").unwrap(), CellState::Error);

    sheet.set("i", 2).unwrap();
    sheet.update().unwrap();
    assert_eq!(sheet.get("pick").unwrap(), Value::from(3));
    assert_eq!(sheet.state("pick").unwrap(), CellState::Clean);
}

#[test]
fn test_linked_interface_override_lasts_until_dependency_changes() {
    let mut sheet = built("interface w: 10\ninterface h <== w * 2\noutput area <== w * h\n");
    assert_eq!(sheet.get("h").unwrap(), Value::from(20));

    sheet.set("h", 7).unwrap();
    sheet.update().unwrap();
    assert_eq!(sheet.get("h").unwrap(), Value::from(7));
    assert_eq!(sheet.get("area").unwrap(), Value::from(70));

    sheet.set("w", 3).unwrap();
    sheet.update().unwrap();
    assert_eq!(sheet.get("h").unwrap(), Value::from(6));
    assert_eq!(sheet.get("area").unwrap(), Value::from(18));
}

#[test]
fn test_external_cells_start_undefined_and_accept_values() {
    let mut sheet = built("external host\noutput greeting <== host == empty ? 'none' : host\n");
    assert_eq!(sheet.get("greeting").unwrap(), Value::from("none"));
    sheet.set("host", "adam").unwrap();
    sheet.update().unwrap();
    assert_eq!(sheet.get("greeting").unwrap(), Value::from("adam"));
}

#[test]
fn test_constants_are_not_dependencies() {
    let sheet = built("constant k: 2\ninput a: 1\nlogic x <== a * k\n");
    assert_eq!(names(&sheet.dependencies("x").unwrap()), vec!["a"]);
    assert_eq!(sheet.priority("x").unwrap(), 1);
}

#[test]
fn test_builder_api_and_host_functions() {
    let mut sheet = Sheet::new();
    sheet
        .functions_mut()
        .register("clamp", |args| {
            let values = args.positional(Name::new("clamp"))?;
            let (v, lo, hi) = (
                values[0].as_number().unwrap_or(0.0),
                values[1].as_number().unwrap_or(0.0),
                values[2].as_number().unwrap_or(0.0),
            );
            Ok(Value::from(v.max(lo).min(hi)))
        });
    sheet
        .add_input("raw", LinePosition::line(1), compile("150").unwrap())
        .unwrap();
    sheet
        .add_output("level", LinePosition::line(2), compile("clamp(raw, 0, 100)").unwrap())
        .unwrap();
    sheet.build().unwrap();
    assert_eq!(sheet.get("level").unwrap(), Value::from(100));
}

#[test]
fn test_declarations_after_build_rebuild_on_update() {
    let mut sheet = built("input a: 1\n");
    sheet
        .add_logic("b", LinePosition::line(2), compile("a + 1").unwrap())
        .unwrap();
    assert!(!sheet.is_built());
    sheet.update().unwrap();
    assert!(sheet.is_built());
    assert_eq!(sheet.get("b").unwrap(), Value::from(2));
}

#[test]
fn test_relations_sharing_a_member_propagate() {
    let mut sheet = Sheet::new();
    for (line, (name, init)) in [("a", "1"), ("b", "2"), ("c", "20")].into_iter().enumerate() {
        sheet
            .add_input(name, LinePosition::line(line + 1), compile(init).unwrap())
            .unwrap();
    }
    sheet
        .add_relation(
            LinePosition::line(4),
            None,
            vec![
                RelateTerm::new("b", compile("a + 1").unwrap()),
                RelateTerm::new("a", compile("b - 1").unwrap()),
            ],
        )
        .unwrap();
    sheet
        .add_relation(
            LinePosition::line(5),
            None,
            vec![
                RelateTerm::new("c", compile("b * 10").unwrap()),
                RelateTerm::new("b", compile("c / 10").unwrap()),
            ],
        )
        .unwrap();
    sheet.build().unwrap();
    assert_eq!(sheet.get("b").unwrap(), Value::from(2));
    assert_eq!(sheet.get("c").unwrap(), Value::from(20));

    sheet.set("a", 4).unwrap();
    sheet.update().unwrap();
    assert_eq!(sheet.get("b").unwrap(), Value::from(5));
    assert_eq!(sheet.get("c").unwrap(), Value::from(50));
}

#[test]
fn test_relation_waits_for_cells_its_chosen_term_reads() {
    let mut sheet = built(
        "input a: 1\ninput b: 2\nlogic c <== b * 2\nrelate { a <== c + 1; b <== a - 1 }\n",
    );
    assert_eq!(sheet.get("c").unwrap(), Value::from(4));
    assert_eq!(sheet.get("a").unwrap(), Value::from(5));
    assert_eq!(sheet.get("b").unwrap(), Value::from(2));

    sheet.set("b", 10).unwrap();
    let report = sheet.update().unwrap();
    assert_eq!(names(&report.recomputed), vec!["c", "a"]);
    assert_eq!(report.sweeps, 1);
    assert_eq!(sheet.get("c").unwrap(), Value::from(20));
    assert_eq!(sheet.get("a").unwrap(), Value::from(21));
}

#[test]
fn test_unknown_solved_once_when_other_term_reads_it() {
    let mut sheet = built(
        r#"
input a: 1
input b: 2
logic c <== b * 2
relate { a <== (c == empty ? 0 : c) + 1; b <== a - 1 }
"#,
    );
    let seen = record(&mut sheet, "a");
    sheet.set("b", 10).unwrap();
    let report = sheet.update().unwrap();
    assert_eq!(names(&report.recomputed), vec!["c", "a"]);
    assert_eq!(*seen.lock().unwrap(), vec![Value::from(21)]);
}

#[test]
fn test_monitor_set_on_relation_member_picks_a_new_unknown() {
    let mut sheet = built(
        "input a: 2\ninput b: 1\ninput trigger: 0\nrelate { a <== b * 2; b <== a / 2 }\n",
    );
    sheet
        .monitor_value("trigger", |_, pending| pending.set("b", 100))
        .unwrap();
    sheet.set("a", 10).unwrap();
    sheet.set("trigger", 1).unwrap();
    sheet.update().unwrap();
    // The queued `b` stands; both members are now set, so the earliest
    // declared one is solved.
    assert_eq!(sheet.get("b").unwrap(), Value::from(100));
    assert_eq!(sheet.get("a").unwrap(), Value::from(200));
}

#[test]
fn test_nan_result_is_not_a_change() {
    let mut sheet = built("input a: 0\ninput z: 0\noutput ratio <== z / a\n");
    let seen = record(&mut sheet, "ratio");
    sheet.set("z", 0).unwrap();
    sheet.set("a", 0).unwrap();
    let report = sheet.update().unwrap();
    assert!(report.changed.is_empty());
    assert!(seen.lock().unwrap().is_empty());
}
