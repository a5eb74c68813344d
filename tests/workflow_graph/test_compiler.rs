use std::time::Duration;
use workflow_runner::core::workflow_graph::compiler::{
    CompiledKind, ResolvedFlow, DEFAULT_LISTEN_TIMEOUT,
};
use workflow_runner::core::workflow_graph::{
    compile_definition, verify_handlers, CompileOptions, ExecutableGraph, WorkflowDefinition,
};

fn header() -> &'static str {
    "document: {dsl: \"1.0.0\", namespace: test, name: graph, version: \"1.0.0\"}\n"
}

fn compile_text(body: &str) -> Result<ExecutableGraph, workflow_runner::core::AppError> {
    let definition = WorkflowDefinition::parse(&format!("{}{}", header(), body))?;
    compile_definition(&definition, CompileOptions::validation_only())
}

fn compile_error_code(body: &str) -> String {
    match compile_text(body) {
        Ok(_) => panic!("expected compile failure for:\n{}", body),
        Err(err) => err.code,
    }
}

#[test]
fn every_kind_has_a_handler() {
    verify_handlers().unwrap();
}

#[test]
fn validation_only_graph_is_not_executable() {
    let graph = compile_text("do:\n  - a: {set: {x: 1}}\n").unwrap();
    assert!(!graph.is_executable());
    assert_eq!(graph.task_count(), 1);
    assert_eq!(graph.tasks[0].id, "a-0");
}

#[test]
fn flows_resolve_to_sibling_indices() {
    let graph = compile_text(
        r#"
do:
  - first: {set: {x: 1}, then: third}
  - second: {set: {x: 2}, then: end}
  - third: {set: {x: 3}, then: second}
  - fourth: {set: {x: 4}, then: exit}
"#,
    )
    .unwrap();
    let flows: Vec<ResolvedFlow> = graph.tasks.iter().map(|t| t.flow).collect();
    assert_eq!(
        flows,
        vec![
            ResolvedFlow::Jump(2),
            ResolvedFlow::End,
            ResolvedFlow::Jump(1),
            ResolvedFlow::Exit,
        ]
    );
}

#[test]
fn nested_bodies_are_compiled_and_counted() {
    let graph = compile_text(
        r#"
do:
  - loop:
      for: {in: "${ $input.items }", each: order}
      do:
        - charge: {set: {charged: "${ $data.order }"}}
  - fan:
      fork:
        branches:
          - name: left
            do:
              - l: {set: {side: left}}
          - name: right
            do:
              - r: {set: {side: right}}
  - guarded:
      try:
        - risky: {raise: {error: runtime}}
      catch:
        as: failure
        do:
          - recover: {set: {ok: false}}
"#,
    )
    .unwrap();
    assert_eq!(graph.task_count(), 8);

    match &graph.tasks[0].kind {
        CompiledKind::For { each, at, body, .. } => {
            assert_eq!(each, "order");
            assert_eq!(at, "index");
            assert_eq!(body[0].id, "charge-0");
        }
        other => panic!("expected for, got {:?}", other.tag()),
    }
    match &graph.tasks[2].kind {
        CompiledKind::Try { catch, .. } => {
            assert_eq!(catch.as_ref().map(|c| c.as_name.as_str()), Some("failure"));
        }
        other => panic!("expected try, got {:?}", other.tag()),
    }
}

#[test]
fn switch_rules() {
    // Two defaults.
    assert_eq!(
        compile_error_code(
            r#"
do:
  - pick:
      switch:
        cases:
          - name: a
          - name: b
"#
        ),
        "WFG-COMP-003"
    );
    // Every case statically false and no default.
    assert_eq!(
        compile_error_code(
            r#"
do:
  - pick:
      switch:
        cases:
          - {name: never, when: "false"}
"#
        ),
        "WFG-COMP-004"
    );

    let graph = compile_text(
        r#"
do:
  - pick:
      switch:
        cases:
          - {name: big, when: "${ $input.n > 10 }", then: big}
          - {name: other, then: end}
  - small: {set: {size: small}}
  - big: {set: {size: big}}
"#,
    )
    .unwrap();
    match &graph.tasks[0].kind {
        CompiledKind::Switch { cases, default } => {
            assert_eq!(cases.len(), 1);
            assert_eq!(cases[0].flow, ResolvedFlow::Jump(2));
            assert_eq!(*default, Some(ResolvedFlow::End));
        }
        other => panic!("expected switch, got {:?}", other.tag()),
    }
}

#[test]
fn expression_syntax_is_checked_at_compile_time() {
    let code = compile_error_code("do:\n  - a: {set: {x: \"${ $data.( }\"}}\n");
    assert_eq!(code, "WFG-EXPR-001");

    let code = compile_error_code("do:\n  - a: {set: {x: 1}, if: \"${ 1 + }\"}\n");
    assert_eq!(code, "WFG-EXPR-001");
}

#[test]
fn per_kind_checks() {
    let cases = [
        ("do:\n  - f: {fork: {branches: []}}\n", "WFG-COMP-007"),
        (
            "do:\n  - f: {fork: {branches: [{name: a, do: [{x: {set: {}}}]}, {name: a, do: [{y: {set: {}}}]}]}}\n",
            "WFG-COMP-007",
        ),
        ("do:\n  - l: {listen: {to: {any: []}}}\n", "WFG-COMP-008"),
        (
            "do:\n  - l: {listen: {to: {one: {with: {id: x}}}}, metadata: {timeout: later}}\n",
            "WFG-COMP-008",
        ),
        ("do:\n  - w: {wait: soon}\n", "WFG-COMP-009"),
        ("do:\n  - r: {run: {workflow: \"\"}}\n", "WFG-COMP-010"),
        ("do:\n  - c: {call: activity, with: {name: legacy}}\n", "WFG-COMP-011"),
        ("do:\n  - r: {raise: {error: oops}}\n", "WFG-COMP-012"),
        ("do:\n  - t: {try: []}\n", "WFG-COMP-005"),
        (
            "do:\n  - c: {set: {}, metadata: {activityOptions: {retryPolicy: {maximumAttempts: 0}}}}\n",
            "WFG-COMP-006",
        ),
        (
            "do:\n  - c: {set: {}, metadata: {searchAttributes: {Stage: {type: colour, value: red}}}}\n",
            "WFG-SA-001",
        ),
    ];
    for (body, code) in cases {
        assert_eq!(compile_error_code(body), code, "{}", body);
    }
}

#[test]
fn raise_accepts_uri_types() {
    compile_text("do:\n  - r: {raise: {error: \"https://errors.example.com/out-of-stock\"}}\n")
        .unwrap();
}

#[test]
fn listen_timeout_comes_from_metadata() {
    let graph = compile_text(
        r#"
do:
  - quick:
      listen: {to: {one: {with: {id: a}}}}
      metadata: {timeout: 5s}
  - default:
      listen: {to: {one: {with: {id: b}}}}
"#,
    )
    .unwrap();
    let timeouts: Vec<Duration> = graph
        .tasks
        .iter()
        .filter_map(|task| match &task.kind {
            CompiledKind::Listen { timeout, .. } => Some(*timeout),
            _ => None,
        })
        .collect();
    assert_eq!(timeouts, vec![Duration::from_secs(5), DEFAULT_LISTEN_TIMEOUT]);
}

#[test]
fn activity_options_layer_document_then_task() {
    let graph = compile_text(
        r#"
timeout: {after: 45s}
metadata:
  activityOptions:
    retryPolicy: {maximumAttempts: 2, initialInterval: 10ms}
do:
  - plain:
      call: http
      with: {method: get, endpoint: "https://example.com"}
  - tuned:
      call: http
      with: {method: get, endpoint: "https://example.com"}
      metadata:
        activityOptions:
          startToCloseTimeout: 3s
          retryPolicy: {maximumAttempts: 7}
"#,
    )
    .unwrap();
    let plain = &graph.tasks[0].activity;
    assert_eq!(plain.start_to_close_timeout, Duration::from_secs(45));
    assert_eq!(plain.retry.maximum_attempts, 2);
    assert_eq!(plain.retry.initial_interval, Duration::from_millis(10));

    let tuned = &graph.tasks[1].activity;
    assert_eq!(tuned.start_to_close_timeout, Duration::from_secs(3));
    assert_eq!(tuned.retry.maximum_attempts, 7);
    assert_eq!(tuned.retry.initial_interval, Duration::from_millis(10));
}

#[test]
fn nested_tasks_layer_their_own_metadata_over_the_document() {
    let graph = compile_text(
        r#"
timeout: {after: 30s}
metadata:
  activityOptions:
    retryPolicy: {maximumAttempts: 4}
do:
  - each:
      for: {in: 2}
      do:
        - fetch:
            call: http
            with: {method: get, endpoint: "https://example.com"}
            metadata:
              activityOptions:
                retryPolicy: {backoffCoefficient: 3.0}
"#,
    )
    .unwrap();
    let body = match &graph.tasks[0].kind {
        CompiledKind::For { body, .. } => body.clone(),
        other => panic!("expected a for loop, got {:?}", other),
    };
    let fetch = &body[0].activity;
    assert_eq!(fetch.start_to_close_timeout, Duration::from_secs(30));
    assert_eq!(fetch.retry.maximum_attempts, 4);
    assert_eq!(fetch.retry.backoff_coefficient, 3.0);
}

#[test]
fn invalid_document_activity_options_fail_the_compile() {
    let code = compile_error_code(
        "metadata:\n  activityOptions: {retryPolicy: {backoffCoefficient: 0.5}}\ndo:\n  - a: {set: {x: 1}}\n",
    );
    assert_eq!(code, "WFG-COMP-006");
}
