use std::collections::HashMap;

use oj_core::{NodeState, NodeStatus};
use serde_json::json;

use super::*;

fn ctx(vars: &HashMap<String, Value>) -> EvalContext {
    EvalContext::new(vars, 1_000)
}

fn eval_ok(src: &str) -> Value {
    let vars = HashMap::new();
    evaluate(src, &ctx(&vars)).unwrap_or_else(|e| panic!("{src:?} failed to evaluate: {e}"))
}

#[yare::parameterized(
    integer = { "1", json!(1.0) },
    decimal = { "1.5", json!(1.5) },
    string_single_quoted = { "'hi'", json!("hi") },
    string_double_quoted = { "\"hi\"", json!("hi") },
    bool_true = { "true", json!(true) },
    bool_false = { "false", json!(false) },
)]
fn evaluates_literals(src: &str, expected: Value) {
    assert_eq!(eval_ok(src), expected);
}

#[yare::parameterized(
    add_numbers = { "1 + 2", json!(3.0) },
    sub_numbers = { "5 - 2", json!(3.0) },
    mul_numbers = { "3 * 4", json!(12.0) },
    div_numbers = { "9 / 2", json!(4.5) },
    div_by_zero_yields_zero = { "9 / 0", json!(0.0) },
    string_concat_via_plus = { "'a' + 'b'", json!("ab") },
    string_and_number_concat = { "'n=' + 3", json!("n=3") },
)]
fn evaluates_arithmetic(src: &str, expected: Value) {
    assert_eq!(eval_ok(src), expected);
}

#[yare::parameterized(
    precedence_mul_before_add = { "1 + 2 * 3", json!(7.0) },
    precedence_parens_override = { "(1 + 2) * 3", json!(9.0) },
    precedence_comparison_after_arithmetic = { "1 + 1 == 2", json!(true) },
    precedence_not_binds_tighter_than_and = { "not false and true", json!(true) },
    unary_negation = { "-(3 + 2)", json!(-5.0) },
    double_negation = { "not not true", json!(true) },
)]
fn honors_operator_precedence(src: &str, expected: Value) {
    assert_eq!(eval_ok(src), expected);
}

#[yare::parameterized(
    eq_numbers = { "1 == 1", true },
    eq_int_and_float = { "1 == 1.0", true },
    neq_numbers = { "1 != 2", true },
    lt = { "1 < 2", true },
    le_equal = { "2 <= 2", true },
    gt = { "3 > 2", true },
    ge_equal = { "2 >= 2", true },
    string_eq = { "'a' == 'a'", true },
    string_neq = { "'a' == 'b'", false },
)]
fn evaluates_comparisons(src: &str, expected: bool) {
    assert_eq!(eval_ok(src), json!(expected));
}

#[test]
fn ternary_picks_the_matching_branch() {
    assert_eq!(eval_ok("true ? 1 : 2"), json!(1.0));
    assert_eq!(eval_ok("false ? 1 : 2"), json!(2.0));
    assert_eq!(eval_ok("1 == 1 ? 'yes' : 'no'"), json!("yes"));
}

#[test]
fn and_short_circuits_without_evaluating_the_right_side() {
    assert_eq!(eval_ok("false and unknown_fn()"), json!(false));
}

#[test]
fn or_short_circuits_without_evaluating_the_right_side() {
    assert_eq!(eval_ok("true or unknown_fn()"), json!(true));
}

#[test]
fn and_or_evaluate_the_right_side_when_needed() {
    assert_eq!(eval_ok("true and false"), json!(false));
    assert_eq!(eval_ok("true and true"), json!(true));
    assert_eq!(eval_ok("false or true"), json!(true));
    assert_eq!(eval_ok("false or false"), json!(false));
}

#[test]
fn resolves_outputs_variables_and_inputs_paths() {
    let vars = HashMap::from([("threshold".to_string(), json!(10))]);
    let mut outputs = HashMap::new();
    outputs.insert("verify_consistency".to_string(), json!({"score": 42, "nested": {"ok": true}}));
    let mut inputs = HashMap::new();
    inputs.insert("goal".to_string(), json!("ship it"));

    let mut c = ctx(&vars).with_outputs(outputs);
    c.inputs = inputs;

    assert_eq!(evaluate("outputs.verify_consistency.score", &c).unwrap(), json!(42));
    assert_eq!(evaluate("outputs.verify_consistency.nested.ok", &c).unwrap(), json!(true));
    assert_eq!(evaluate("variables.threshold", &c).unwrap(), json!(10));
    assert_eq!(evaluate("inputs.goal", &c).unwrap(), json!("ship it"));
}

#[test]
fn bracket_path_segments_convert_hyphens_to_underscores() {
    let vars = HashMap::new();
    let mut outputs = HashMap::new();
    outputs.insert("verify_consistency".to_string(), json!({"score": 7}));
    let c = ctx(&vars).with_outputs(outputs);

    assert_eq!(
        evaluate("outputs['verify-consistency'].score", &c).unwrap(),
        evaluate("outputs.verify_consistency.score", &c).unwrap(),
    );
}

#[test]
fn missing_output_falls_back_to_raw_placeholder() {
    let vars = HashMap::new();
    let c = ctx(&vars);
    assert_eq!(evaluate("outputs.missing._raw", &c).unwrap(), json!(""));
}

#[test]
fn missing_variable_and_input_resolve_to_null() {
    let vars = HashMap::new();
    let c = ctx(&vars);
    assert_eq!(evaluate("variables.missing", &c).unwrap(), Value::Null);
    assert_eq!(evaluate("inputs.missing", &c).unwrap(), Value::Null);
}

#[test]
fn resolves_node_states_by_name() {
    let vars = HashMap::new();
    let mut node_states = HashMap::new();
    node_states.insert("deploy".to_string(), NodeState { status: NodeStatus::Running, attempts: 2, ..Default::default() });
    let c = ctx(&vars).with_node_states(node_states);

    assert_eq!(evaluate("nodeStates.deploy.status", &c).unwrap(), json!("running"));
    assert_eq!(evaluate("nodeStates.deploy.attempts", &c).unwrap(), json!(2));
    assert_eq!(evaluate("nodeStates.missing.status", &c).unwrap(), Value::Null);
}

#[test]
fn resolves_loop_bindings() {
    let vars = HashMap::new();
    let c = ctx(&vars).with_loop(2, json!("widget"), 5);

    assert_eq!(evaluate("index", &c).unwrap(), json!(2));
    assert_eq!(evaluate("total", &c).unwrap(), json!(5));
    assert_eq!(evaluate("item", &c).unwrap(), json!("widget"));
}

#[test]
fn loop_bindings_are_null_outside_a_loop() {
    let vars = HashMap::new();
    let c = ctx(&vars);
    assert_eq!(evaluate("index", &c).unwrap(), Value::Null);
    assert_eq!(evaluate("total", &c).unwrap(), Value::Null);
    assert_eq!(evaluate("item", &c).unwrap(), Value::Null);
}

#[test]
fn len_counts_arrays_objects_and_strings() {
    let vars = HashMap::from([
        ("arr".to_string(), json!([1, 2, 3])),
        ("obj".to_string(), json!({"a": 1, "b": 2})),
        ("s".to_string(), json!("hello")),
    ]);
    let c = ctx(&vars);
    assert_eq!(evaluate("len(variables.arr)", &c).unwrap(), json!(3));
    assert_eq!(evaluate("len(variables.obj)", &c).unwrap(), json!(2));
    assert_eq!(evaluate("len(variables.s)", &c).unwrap(), json!(5));
}

#[test]
fn has_and_get_read_object_keys() {
    let vars = HashMap::from([("obj".to_string(), json!({"a": 1}))]);
    let c = ctx(&vars);
    assert_eq!(evaluate("has(variables.obj, 'a')", &c).unwrap(), json!(true));
    assert_eq!(evaluate("has(variables.obj, 'b')", &c).unwrap(), json!(false));
    assert_eq!(evaluate("get(variables.obj, 'a')", &c).unwrap(), json!(1));
    assert_eq!(evaluate("get(variables.obj, 'b', 99)", &c).unwrap(), json!(99));
}

#[test]
fn str_num_bool_convert_between_types() {
    assert_eq!(eval_ok("str(1)"), json!("1"));
    assert_eq!(eval_ok("num('3.5')"), json!(3.5));
    assert_eq!(eval_ok("bool('x')"), json!(true));
    assert_eq!(eval_ok("bool('')"), json!(false));
}

#[test]
fn now_returns_the_context_clock() {
    let vars = HashMap::new();
    let c = EvalContext::new(&vars, 42_000);
    assert_eq!(evaluate("now()", &c).unwrap(), json!(42_000));
}

#[yare::parameterized(
    floor = { "floor(1.9)", json!(1.0) },
    ceil = { "ceil(1.1)", json!(2.0) },
    round = { "round(1.5)", json!(2.0) },
    abs = { "abs(-3)", json!(3.0) },
    min = { "min(3, 1, 2)", json!(1.0) },
    max = { "max(3, 1, 2)", json!(3.0) },
    includes_true = { "includes('hello world', 'world')", json!(true) },
    includes_false = { "includes('hello world', 'xyz')", json!(false) },
    starts_with_true = { "startsWith('hello', 'he')", json!(true) },
    starts_with_false = { "startsWith('hello', 'lo')", json!(false) },
    lower = { "lower('ABC')", json!("abc") },
    upper = { "upper('abc')", json!("ABC") },
)]
fn builtin_functions_evaluate_correctly(src: &str, expected: Value) {
    assert_eq!(eval_ok(src), expected);
}

#[test]
fn unknown_function_is_a_runtime_error() {
    let vars = HashMap::new();
    let err = evaluate("nope(1)", &ctx(&vars)).unwrap_err();
    assert!(matches!(err, EvalError::Runtime(_)), "expected Runtime error, got {err:?}");
}

#[yare::parameterized(
    unterminated_string = { "'abc" },
    unexpected_character = { "1 $ 2" },
    unexpected_trailing_token = { "1 2" },
    missing_close_paren = { "(1 + 2" },
    missing_close_bracket = { "outputs['x'" },
    missing_ternary_colon = { "true ? 1" },
    bang_without_equals = { "1 ! 2" },
)]
fn syntax_errors_are_reported(src: &str) {
    let vars = HashMap::new();
    let err = evaluate(src, &ctx(&vars)).unwrap_err();
    assert!(matches!(err, EvalError::Syntax(_)), "expected Syntax error for {src:?}, got {err:?}");
}

#[test]
fn evaluate_bool_treats_syntax_errors_as_false() {
    let vars = HashMap::new();
    assert!(!evaluate_bool("'unterminated", &ctx(&vars)));
}

#[test]
fn evaluate_bool_treats_runtime_errors_as_false() {
    let vars = HashMap::new();
    assert!(!evaluate_bool("nope(1)", &ctx(&vars)));
}

#[test]
fn evaluate_bool_passes_through_a_valid_result() {
    let vars = HashMap::new();
    assert!(evaluate_bool("1 == 1", &ctx(&vars)));
    assert!(!evaluate_bool("1 == 2", &ctx(&vars)));
    assert!(evaluate_bool("'non-empty'", &ctx(&vars)));
    assert!(!evaluate_bool("''", &ctx(&vars)));
}

#[yare::parameterized(
    null_is_false = { Value::Null, false },
    zero_is_false = { json!(0), false },
    nonzero_is_true = { json!(1), true },
    empty_string_is_false = { json!(""), false },
    nonempty_string_is_true = { json!("x"), true },
    empty_array_is_false = { json!([]), false },
    nonempty_array_is_true = { json!([1]), true },
    empty_object_is_false = { json!({}), false },
    nonempty_object_is_true = { json!({"a": 1}), true },
)]
fn to_bool_converts_every_value_variant(value: Value, expected: bool) {
    assert_eq!(to_bool(&value), expected);
}

#[yare::parameterized(
    number = { json!(3.5), 3.5 },
    numeric_string = { json!("3.5"), 3.5 },
    non_numeric_string = { json!("abc"), 0.0 },
    bool_true = { json!(true), 1.0 },
    bool_false = { json!(false), 0.0 },
    null_is_zero = { Value::Null, 0.0 },
)]
fn to_num_converts_every_value_variant(value: Value, expected: f64) {
    assert_eq!(to_num(&value), expected);
}

#[test]
fn to_str_converts_every_value_variant() {
    assert_eq!(to_str(&json!("hi")), "hi");
    assert_eq!(to_str(&Value::Null), "");
    assert_eq!(to_str(&json!(3)), "3");
    assert_eq!(to_str(&json!(true)), "true");
    assert_eq!(to_str(&json!([1, 2])), "[1,2]");
}

fn sample_workflow() -> oj_core::Workflow {
    let task_id = oj_core::TaskId::new();
    let mut wf = oj_core::Workflow::new(task_id, 0);
    let start = oj_core::Node::new("start", oj_core::NodePayload::Start);
    let work = oj_core::Node::new("do-work", oj_core::NodePayload::Script { expression: "1".into() });
    let end = oj_core::Node::new("end", oj_core::NodePayload::End);
    let (start_id, work_id, end_id) = (start.id, work.id, end.id);
    wf.nodes = vec![start, work, end];
    wf.edges = vec![oj_core::Edge::new(start_id, work_id), oj_core::Edge::new(work_id, end_id)];
    wf
}

#[test]
fn outputs_by_name_maps_node_ids_to_names_with_a_raw_default_for_missing() {
    let wf = sample_workflow();
    let mut outputs = HashMap::new();
    outputs.insert(wf.nodes[1].id, json!({"score": 1}));

    let by_name = outputs_by_name(&wf, &outputs);
    assert_eq!(by_name.get(&wf.nodes[1].name), Some(&json!({"score": 1})));
    assert_eq!(by_name.get(&wf.nodes[0].name), Some(&json!({"_raw": ""})));
    assert_eq!(by_name.get(&wf.nodes[2].name), Some(&json!({"_raw": ""})));
}

#[test]
fn node_states_by_name_only_includes_nodes_with_recorded_state() {
    let wf = sample_workflow();
    let mut states = HashMap::new();
    states.insert(wf.nodes[1].id, NodeState { status: NodeStatus::Done, ..Default::default() });

    let by_name = node_states_by_name(&wf, &states);
    assert_eq!(by_name.len(), 1);
    assert_eq!(by_name.get(&wf.nodes[1].name).map(|s| s.status), Some(NodeStatus::Done));
}
