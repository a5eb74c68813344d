use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use workflow_runner::core::error::AppError;
use workflow_runner::core::types::{ErrorCategory, ExecutionPhase};
use workflow_runner::core::workflow_graph::backend::{GrpcInvoker, GrpcRequest};
use workflow_runner::core::workflow_graph::status::RecordingStatusSink;
use workflow_runner::core::workflow_graph::{
    compile_definition, execute_workflow, CompileOptions, ExecutableGraph, LocalBackend,
    WorkflowDefinition, WorkflowExecutor,
};
use workflow_runner::core::RunnerConfig;

const HEADER: &str = "document: {dsl: \"1.0.0\", namespace: test, name: exec, version: \"1.0.0\"}\n";

fn definition(body: &str) -> WorkflowDefinition {
    let definition = WorkflowDefinition::parse(&format!("{}{}", HEADER, body)).unwrap();
    definition.validate().unwrap();
    definition
}

fn build(body: &str) -> (Arc<LocalBackend>, WorkflowExecutor) {
    build_with(body, RunnerConfig::default(), Map::new())
}

fn build_with(
    body: &str,
    config: RunnerConfig,
    env: Map<String, Value>,
) -> (Arc<LocalBackend>, WorkflowExecutor) {
    let backend = LocalBackend::new(&config).unwrap();
    let options = CompileOptions::from_config(&config)
        .unwrap()
        .with_env(env)
        .with_backend(backend.clone());
    let graph = compile_definition(&definition(body), options).unwrap();
    (backend, WorkflowExecutor::new(Arc::new(graph)).unwrap())
}

#[tokio::test]
async fn set_threads_data_and_export() {
    let (_, executor) = build(
        r#"
do:
  - init:
      set: {count: "${ $input.start }"}
      export: {as: "${ $data.count }"}
  - bump:
      set: {count: "${ $data.count + 1 }", seen: "${ $context.init }"}
"#,
    );
    let outcome = executor.execute(json!({"start": 1})).await.unwrap();
    assert_eq!(outcome.output, json!({"count": 2, "seen": 1}));
    assert_eq!(outcome.state.context, json!({"init": 1}));
    assert_eq!(outcome.state.data["count"], 2);
}

#[tokio::test]
async fn output_transform_replaces_task_output() {
    let (_, executor) = build(
        r#"
do:
  - shape:
      set: {a: 1, b: 2}
      output: {as: "${ $output.a + $output.b }"}
"#,
    );
    let outcome = executor.execute(Value::Null).await.unwrap();
    assert_eq!(outcome.output, json!(3));
}

#[tokio::test]
async fn false_guard_skips_the_task() {
    let (_, executor) = build(
        r#"
do:
  - always: {set: {ran: yes}}
  - optional: {set: {extra: true}, if: "${ $input.enabled }"}
"#,
    );
    let outcome = executor.execute(json!({"enabled": false})).await.unwrap();
    assert!(outcome.state.data.get("extra").is_none());
    assert_eq!(outcome.output, json!({"ran": "yes"}));

    let outcome = executor.execute(json!({"enabled": true})).await.unwrap();
    assert_eq!(outcome.state.data["extra"], true);
}

#[tokio::test]
async fn non_boolean_guard_is_an_error() {
    let (_, executor) = build("do:\n  - a: {set: {x: 1}, if: \"${ $input.count }\"}\n");
    let err = executor.execute(json!({"count": 3})).await.unwrap_err();
    assert_eq!(err.code, "WFG-EXPR-002");
    assert_eq!(err.context.get("task").map(String::as_str), Some("a"));
}

#[tokio::test]
async fn switch_routes_by_case() {
    let body = r#"
do:
  - pick:
      switch:
        cases:
          - {name: large, when: "${ $input.n > 10 }", then: big}
          - {name: fallback, then: small}
  - small: {set: {size: small}, then: end}
  - big: {set: {size: big}}
"#;
    let (_, executor) = build(body);
    let big = executor.execute(json!({"n": 20})).await.unwrap();
    assert_eq!(big.output, json!({"size": "big"}));
    assert!(big.state.data.get("size").is_some());

    let small = executor.execute(json!({"n": 1})).await.unwrap();
    assert_eq!(small.output, json!({"size": "small"}));
}

#[tokio::test]
async fn for_binds_each_and_at() {
    let (_, executor) = build(
        r#"
do:
  - loop:
      for: {in: "${ $input.items }", each: item, at: idx}
      do:
        - record: {set: {last: "${ $data.item }", position: "${ $data.idx }"}}
"#,
    );
    let outcome = executor
        .execute(json!({"items": ["a", "b", "c"]}))
        .await
        .unwrap();
    assert_eq!(outcome.output, json!({"last": "c", "position": 2}));
    assert!(outcome.state.data.get("last").is_none());
}

#[tokio::test]
async fn for_stops_when_while_turns_false() {
    let (_, executor) = build(
        r#"
do:
  - loop:
      for: {in: 5}
      while: "${ $data.index < 2 }"
      do:
        - record: {set: {seen: "${ $data.item }"}}
"#,
    );
    let outcome = executor.execute(Value::Null).await.unwrap();
    assert_eq!(outcome.output, json!({"seen": 1}));
}

#[tokio::test]
async fn try_catch_binds_the_error() {
    let (_, executor) = build(
        r#"
do:
  - guarded:
      try:
        - fail: {raise: {error: validation, title: Bad input, status: 422}}
      catch:
        as: problem
        do:
          - note:
              set:
                reason: "${ $data.problem.title }"
                status: "${ $data.problem.status }"
                kind: "${ $data.problem.type }"
"#,
    );
    let outcome = executor.execute(Value::Null).await.unwrap();
    assert_eq!(
        outcome.output,
        json!({"reason": "Bad input", "status": 422, "kind": "validation"})
    );
}

#[tokio::test]
async fn uncaught_raise_is_terminal() {
    let sink = Arc::new(RecordingStatusSink::new());
    let (_, executor) = build(
        "do:\n  - fail: {raise: {error: runtime, message: \"${ $input.why }\"}}\n",
    );
    let executor = executor.with_status_sink(sink.clone());
    let err = executor.execute(json!({"why": "broken"})).await.unwrap_err();
    assert_eq!(err.code, "WFG-RAISE-001");
    assert_eq!(err.category, ErrorCategory::TaskError);
    assert_eq!(err.message, "broken");
    assert!(!err.is_retryable());
    assert_eq!(err.context.get("task").map(String::as_str), Some("fail"));

    assert_eq!(
        sink.phases(),
        vec![
            ExecutionPhase::Pending,
            ExecutionPhase::InProgress,
            ExecutionPhase::Failed
        ]
    );
    assert_eq!(sink.terminal_count(), 1);
}

#[tokio::test]
async fn successful_run_reports_completed_once() {
    let sink = Arc::new(RecordingStatusSink::new());
    let (_, executor) = build("do:\n  - a: {set: {x: 1}}\n");
    let executor = executor.with_status_sink(sink.clone());
    let outcome = executor.execute(Value::Null).await.unwrap();

    let updates = sink.updates();
    assert_eq!(updates.len(), 3);
    assert!(updates.iter().all(|u| u.execution_id == outcome.execution_id));
    assert_eq!(updates[2].phase, ExecutionPhase::Completed);
    assert_eq!(sink.terminal_count(), 1);
}

#[tokio::test]
async fn cancellation_stops_a_wait() {
    let (_, executor) = build("do:\n  - nap: {wait: 30}\n");
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });
    let err = executor
        .execute_with_cancel(Value::Null, cancel)
        .await
        .unwrap_err();
    assert_eq!(err.category, ErrorCategory::CancelledError);
}

#[tokio::test]
async fn visit_cap_stops_runaway_loops() {
    let mut config = RunnerConfig::default();
    config.engine.max_task_iterations = 5;
    let (_, executor) = build_with(
        "do:\n  - spin: {set: {x: 1}, then: spin}\n",
        config,
        Map::new(),
    );
    let err = executor.execute(Value::Null).await.unwrap_err();
    assert_eq!(err.code, "WFG-EXEC-004");
}

#[tokio::test]
async fn env_values_are_visible() {
    let mut env = Map::new();
    env.insert("REGION".to_string(), json!("eu-west-1"));
    let (_, executor) = build_with(
        "do:\n  - where: {set: {region: \"${ $env.REGION }\"}}\n",
        RunnerConfig::default(),
        env,
    );
    let outcome = executor.execute(Value::Null).await.unwrap();
    assert_eq!(outcome.output, json!({"region": "eu-west-1"}));
}

#[tokio::test]
async fn listen_receives_a_published_event() {
    let (backend, executor) = build(
        r#"
do:
  - approval:
      listen: {to: {one: {with: {type: approved}}}}
      metadata: {timeout: 5s}
"#,
    );
    backend.publish_event(json!({"type": "rejected"}));
    let publisher = backend.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        publisher.publish_event(json!({"type": "approved", "by": "ops"}));
    });
    let outcome = executor.execute(Value::Null).await.unwrap();
    assert_eq!(outcome.output, json!({"type": "approved", "by": "ops"}));
    assert_eq!(backend.pending_events(), 1);
}

#[tokio::test]
async fn listen_times_out() {
    let (_, executor) = build(
        r#"
do:
  - approval:
      listen: {to: {any: [{with: {type: approved}}]}}
      metadata: {timeout: 20ms}
"#,
    );
    let err = executor.execute(Value::Null).await.unwrap_err();
    assert_eq!(err.code, "WFG-EXEC-007");
    assert_eq!(err.category, ErrorCategory::TimeoutError);
}

#[tokio::test]
async fn run_executes_a_registered_child() {
    let (backend, executor) = build(
        r#"
do:
  - delegate:
      run: {workflow: doubler, with: {n: "${ $input.n }"}}
"#,
    );
    backend.register_workflow(
        WorkflowDefinition::parse(
            "document: {dsl: \"1.0.0\", namespace: test, name: doubler, version: \"1.0.0\"}\ndo:\n  - twice: {set: {result: \"${ $input.n * 2 }\"}}\n",
        )
        .unwrap(),
    );
    let outcome = executor.execute(json!({"n": 21})).await.unwrap();
    assert_eq!(outcome.output, json!({"result": 42}));
}

#[tokio::test]
async fn run_of_unknown_child_fails() {
    let (_, executor) = build("do:\n  - delegate: {run: {workflow: missing}}\n");
    let err = executor.execute(Value::Null).await.unwrap_err();
    assert_eq!(err.code, "WFG-EXEC-008");
}

#[tokio::test]
async fn detached_child_yields_null() {
    let (backend, executor) = build(
        "do:\n  - fire: {run: {workflow: side, await: false}}\n",
    );
    backend.register_workflow(
        WorkflowDefinition::parse(
            "document: {dsl: \"1.0.0\", namespace: test, name: side, version: \"1.0.0\"}\ndo:\n  - noop: {set: {done: true}}\n",
        )
        .unwrap(),
    );
    let outcome = executor.execute(Value::Null).await.unwrap();
    assert_eq!(outcome.output, Value::Null);
}

#[tokio::test]
async fn search_attributes_are_typed_and_upserted() {
    let (backend, executor) = build(
        r#"
do:
  - ship:
      set: {stage: shipping}
      metadata:
        searchAttributes:
          Stage: {type: keyword, value: "${ $input.stage }"}
          Attempts: {type: int, value: "3"}
"#,
    );
    executor.execute(json!({"stage": "shipping"})).await.unwrap();
    assert_eq!(backend.search_attribute("Stage"), Some(json!("shipping")));
    assert_eq!(backend.search_attribute("Attempts"), Some(json!(3)));
}

#[tokio::test]
async fn mistyped_search_attribute_fails_the_task() {
    let (_, executor) = build(
        r#"
do:
  - ship:
      set: {stage: shipping}
      metadata:
        searchAttributes:
          Attempts: {type: int, value: "${ $input.attempts }"}
"#,
    );
    let err = executor
        .execute(json!({"attempts": "several"}))
        .await
        .unwrap_err();
    assert_eq!(err.code, "WFG-SA-002");
}

struct EchoInvoker;

#[async_trait]
impl GrpcInvoker for EchoInvoker {
    async fn invoke(&self, request: &GrpcRequest) -> Result<Value, AppError> {
        Ok(json!({
            "service": request.service.name,
            "method": request.method,
            "request": request.request,
        }))
    }
}

#[tokio::test]
async fn grpc_calls_go_through_the_invoker() {
    let config = RunnerConfig::default();
    let backend = LocalBackend::with_grpc(&config, Some(Arc::new(EchoInvoker))).unwrap();
    let options = CompileOptions::from_config(&config)
        .unwrap()
        .with_backend(backend);
    let graph = compile_definition(
        &definition(
            r#"
do:
  - reserve:
      call: grpc
      with:
        service: inventory
        method: Reserve
        request: {sku: "${ $input.sku }"}
"#,
        ),
        options,
    )
    .unwrap();
    let outcome = execute_workflow(Arc::new(graph), json!({"sku": "A-1"}))
        .await
        .unwrap();
    assert_eq!(
        outcome.output,
        json!({"service": "inventory", "method": "Reserve", "request": {"sku": "A-1"}})
    );
    assert_eq!(outcome.state.data["reserve"], outcome.output);
}

#[test]
fn validation_only_graph_cannot_execute() {
    let graph: ExecutableGraph =
        compile_definition(&definition("do:\n  - a: {set: {x: 1}}\n"), CompileOptions::validation_only())
            .unwrap();
    let err = WorkflowExecutor::new(Arc::new(graph)).unwrap_err();
    assert_eq!(err.code, "WFG-EXEC-001");
}
