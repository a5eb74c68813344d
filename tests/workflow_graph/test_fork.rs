use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};
use workflow_runner::core::types::ErrorCategory;
use workflow_runner::core::workflow_graph::{
    compile_definition, CompileOptions, LocalBackend, WorkflowDefinition, WorkflowExecutor,
};
use workflow_runner::core::RunnerConfig;

fn executor(body: &str) -> WorkflowExecutor {
    let text = format!(
        "document: {{dsl: \"1.0.0\", namespace: test, name: fork, version: \"1.0.0\"}}\n{}",
        body
    );
    let definition = WorkflowDefinition::parse(&text).unwrap();
    definition.validate().unwrap();
    let config = RunnerConfig::default();
    let options = CompileOptions::from_config(&config)
        .unwrap()
        .with_backend(LocalBackend::new(&config).unwrap());
    let graph = compile_definition(&definition, options).unwrap();
    WorkflowExecutor::new(Arc::new(graph)).unwrap()
}

#[tokio::test]
async fn waits_for_every_branch_and_keys_by_name() {
    let executor = executor(
        r#"
do:
  - seed: {set: {base: 10}}
  - fan:
      fork:
        branches:
          - name: left
            do:
              - slow: {wait: 50ms}
              - l: {set: {left: "${ $data.base + 1 }"}}
          - name: right
            do:
              - r: {set: {right: "${ $data.base + 2 }"}}
"#,
    );
    let outcome = executor.execute(Value::Null).await.unwrap();
    assert_eq!(
        outcome.output,
        json!({"left": {"left": 11}, "right": {"right": 12}})
    );
    assert!(outcome.state.data.get("left").is_none());
    assert!(outcome.state.data.get("right").is_none());
    assert_eq!(outcome.state.data["base"], 10);
}

#[tokio::test]
async fn race_returns_first_success_and_cancels_the_rest() {
    let executor = executor(
        r#"
do:
  - fan:
      fork:
        compete: true
        branches:
          - name: sleepy
            do:
              - nap: {wait: 30}
              - late: {set: {winner: sleepy}}
          - name: quick
            do:
              - now: {set: {winner: quick}}
"#,
    );
    let outcome = tokio::time::timeout(Duration::from_secs(5), executor.execute(Value::Null))
        .await
        .expect("race should not wait for the losing branch")
        .unwrap();
    assert_eq!(outcome.output, json!({"winner": "quick"}));
}

#[tokio::test]
async fn race_ignores_failed_branches_while_another_can_win() {
    let executor = executor(
        r#"
do:
  - fan:
      fork:
        compete: true
        branches:
          - name: broken
            do:
              - boom: {raise: {error: runtime, title: broken}}
          - name: steady
            do:
              - pause: {wait: 20ms}
              - done: {set: {winner: steady}}
"#,
    );
    let outcome = executor.execute(Value::Null).await.unwrap();
    assert_eq!(outcome.output, json!({"winner": "steady"}));
}

#[tokio::test]
async fn branch_failure_fails_the_fork() {
    let executor = executor(
        r#"
do:
  - fan:
      fork:
        branches:
          - name: good
            do:
              - ok: {set: {fine: true}}
          - name: bad
            do:
              - boom: {raise: {error: communication, message: upstream down}}
"#,
    );
    let err = executor.execute(Value::Null).await.unwrap_err();
    assert_eq!(err.code, "WFG-FORK-001");
    assert_eq!(err.category, ErrorCategory::TaskError);
    assert!(err.message.contains("bad: upstream down"));
    assert_eq!(err.context.get("task").map(String::as_str), Some("fan"));
}

#[tokio::test]
async fn race_with_no_survivor_fails() {
    let executor = executor(
        r#"
do:
  - fan:
      fork:
        compete: true
        branches:
          - name: a
            do:
              - boom: {raise: {error: runtime}}
          - name: b
            do:
              - boom: {raise: {error: timeout}}
"#,
    );
    let err = executor.execute(Value::Null).await.unwrap_err();
    assert_eq!(err.code, "WFG-FORK-002");
}

#[tokio::test]
async fn fork_failure_can_be_caught() {
    let executor = executor(
        r#"
do:
  - guarded:
      try:
        - fan:
            fork:
              branches:
                - name: only
                  do:
                    - boom: {raise: {error: runtime}}
      catch:
        as: failure
        do:
          - note: {set: {code: "${ $data.failure.code }"}}
"#,
    );
    let outcome = executor.execute(Value::Null).await.unwrap();
    assert_eq!(outcome.output, json!({"code": "WFG-FORK-001"}));
}

#[tokio::test]
async fn failing_branch_lets_slower_siblings_finish_first() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/done"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(1)
        .mount(&server)
        .await;

    let executor = executor(&format!(
        r#"
do:
  - fan:
      fork:
        branches:
          - name: failing
            do:
              - boom: {{raise: {{error: runtime, message: early}}}}
          - name: slow
            do:
              - pause: {{wait: 100ms}}
              - report:
                  call: http
                  with: {{method: post, endpoint: "{}/done"}}
          - name: quick
            do:
              - mark: {{set: {{quick: true}}}}
"#,
        server.uri()
    ));
    let started = Instant::now();
    let err = executor.execute(Value::Null).await.unwrap_err();
    assert!(started.elapsed() >= Duration::from_millis(100));
    assert_eq!(err.code, "WFG-FORK-001");
    assert!(err.message.starts_with("1 of 3 fork branches failed"), "{}", err.message);
    assert!(err.message.contains("failing: early"));

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
}

#[tokio::test]
async fn race_loser_never_reaches_its_next_task() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/late"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(0)
        .mount(&server)
        .await;

    let executor = executor(&format!(
        r#"
do:
  - fan:
      fork:
        compete: true
        branches:
          - name: slow
            do:
              - pause: {{wait: 150ms}}
              - report:
                  call: http
                  with: {{method: post, endpoint: "{}/late"}}
          - name: quick
            do:
              - now: {{set: {{winner: quick}}}}
"#,
        server.uri()
    ));
    let outcome = executor.execute(Value::Null).await.unwrap();
    assert_eq!(outcome.output, json!({"winner": "quick"}));

    tokio::time::sleep(Duration::from_millis(400)).await;
    let requests = server.received_requests().await.unwrap();
    assert!(requests.is_empty(), "cancelled branch still called out");
}

#[tokio::test]
async fn race_branches_do_not_see_each_others_writes() {
    let executor = executor(
        r#"
do:
  - seed: {set: {shared: parent}}
  - fan:
      fork:
        compete: true
        branches:
          - name: writer
            do:
              - write: {set: {shared: writer}}
              - linger: {wait: 30}
          - name: reader
            do:
              - pause: {wait: 50ms}
              - read: {set: {seen: "${ $data.shared }"}}
"#,
    );
    let outcome = tokio::time::timeout(Duration::from_secs(5), executor.execute(Value::Null))
        .await
        .expect("reader should win long before the writer lingers out")
        .unwrap();
    assert_eq!(outcome.output, json!({"seen": "parent"}));
    assert_eq!(outcome.state.data["shared"], "parent");
}
