use workflow_runner::core::types::ErrorCategory;
use workflow_runner::core::workflow_graph::tasks::{
    FlowDirective, HttpOutputMode, ListenMode, TaskKind, TaskKindTag, WaitDuration,
};
use workflow_runner::core::workflow_graph::WorkflowDefinition;

const ORDER_FLOW: &str = r#"
document:
  dsl: "1.0.0"
  namespace: shop
  name: order-flow
  version: "2.1.0"
  description: Places an order and waits for payment
timeout:
  after: 10m
metadata:
  activityOptions:
    retryPolicy:
      maximumAttempts: 3
do:
  - init:
      set:
        attempts: 0
      export:
        as: "${ $data }"
  - fetch:
      call: http
      with:
        method: get
        endpoint:
          uri: "https://api.example.com/orders/${ $input.id }"
        output: response
  - route:
      switch:
        cases:
          - name: paid
            when: "${ $data.fetch.content.paid }"
            then: done
          - name: otherwise
            then: continue
  - payment:
      listen:
        to:
          one:
            with:
              type: payment.received
  - pause:
      wait: 5
  - done:
      set:
        finished: true
      then: end
"#;

#[test]
fn parses_every_section() {
    let definition = WorkflowDefinition::parse(ORDER_FLOW).unwrap();
    assert_eq!(definition.document.identity(), "shop-order-flow");
    assert_eq!(definition.timeout.as_deref(), Some("10m"));
    assert!(definition.metadata.contains_key("activityOptions"));

    let tags: Vec<TaskKindTag> = definition.tasks.iter().map(|t| t.task.kind.tag()).collect();
    assert_eq!(
        tags,
        vec![
            TaskKindTag::Set,
            TaskKindTag::HttpCall,
            TaskKindTag::Switch,
            TaskKindTag::Listen,
            TaskKindTag::Wait,
            TaskKindTag::Set,
        ]
    );

    match &definition.tasks[1].task.kind {
        TaskKind::HttpCall(http) => {
            assert_eq!(http.method, "get");
            assert_eq!(http.output, HttpOutputMode::Response);
            assert!(http.endpoint.contains("${ $input.id }"));
        }
        other => panic!("expected http call, got {:?}", other),
    }
    match &definition.tasks[3].task.kind {
        TaskKind::Listen(listen) => {
            assert_eq!(listen.mode, ListenMode::One);
            assert_eq!(listen.events.len(), 1);
        }
        other => panic!("expected listen, got {:?}", other),
    }
    assert!(matches!(
        definition.tasks[4].task.kind,
        TaskKind::Wait(WaitDuration::Seconds(5))
    ));
    assert_eq!(definition.tasks[5].task.then, Some(FlowDirective::End));
    definition.validate().unwrap();
}

#[test]
fn canonical_yaml_is_stable() {
    let first = WorkflowDefinition::parse(ORDER_FLOW).unwrap();
    let yaml = first.to_yaml().unwrap();
    let second = WorkflowDefinition::parse(&yaml).unwrap();
    assert_eq!(first, second);
    assert_eq!(second.to_yaml().unwrap(), yaml);
}

#[test]
fn missing_header_fields_are_named() {
    for field in ["namespace", "name", "version"] {
        let text = ORDER_FLOW.replacen(&format!("  {}: ", field), "  ignored: ", 1);
        let err = match WorkflowDefinition::parse(&text) {
            Ok(definition) => definition.validate().unwrap_err(),
            Err(err) => err,
        };
        assert!(
            err.message.contains(&format!("document.{}", field)) || err.code == "WFG-DSL-002",
            "{}: {}",
            field,
            err
        );
    }
}

#[test]
fn missing_dsl_is_rejected_by_validate() {
    let text = ORDER_FLOW.replace("  dsl: \"1.0.0\"\n", "");
    let definition = WorkflowDefinition::parse(&text).unwrap();
    let err = definition.validate().unwrap_err();
    assert_eq!(err.code, "WFG-DSL-003");
    assert!(err.message.contains("document.dsl"));
}

#[test]
fn dsl_major_two_is_unsupported() {
    let err = WorkflowDefinition::parse(&ORDER_FLOW.replace("\"1.0.0\"", "\"2.0.0\"")).unwrap_err();
    assert_eq!(err.category, ErrorCategory::UnsupportedDsl);
    assert_eq!(err.code, "WFG-DSL-001");
}

#[test]
fn empty_task_list_is_rejected() {
    let text = r#"
document: {dsl: "1.0.0", namespace: a, name: b, version: "1.0.0"}
do: []
"#;
    let err = WorkflowDefinition::parse(text).unwrap().validate().unwrap_err();
    assert_eq!(err.code, "WFG-DSL-004");
}

#[test]
fn duplicate_names_and_dangling_then_are_rejected() {
    let duplicate = r#"
document: {dsl: "1.0.0", namespace: a, name: b, version: "1.0.0"}
do:
  - step: {set: {x: 1}}
  - step: {set: {x: 2}}
"#;
    let err = WorkflowDefinition::parse(duplicate).unwrap().validate().unwrap_err();
    assert_eq!(err.code, "WFG-DSL-005");

    let dangling = r#"
document: {dsl: "1.0.0", namespace: a, name: b, version: "1.0.0"}
do:
  - step: {set: {x: 1}, then: nowhere}
"#;
    let err = WorkflowDefinition::parse(dangling).unwrap().validate().unwrap_err();
    assert_eq!(err.code, "WFG-DSL-006");
    assert!(err.message.contains("nowhere"));
}

#[test]
fn unknown_kind_and_keys_are_rejected() {
    let unknown_kind = r#"
document: {dsl: "1.0.0", namespace: a, name: b, version: "1.0.0"}
do:
  - step: {emit: {event: x}}
"#;
    let err = WorkflowDefinition::parse(unknown_kind).unwrap_err();
    assert!(err.message.contains("unknown task kind"), "{}", err);

    let two_kinds = r#"
document: {dsl: "1.0.0", namespace: a, name: b, version: "1.0.0"}
do:
  - step: {set: {x: 1}, wait: 3}
"#;
    let err = WorkflowDefinition::parse(two_kinds).unwrap_err();
    assert!(err.message.contains("more than one kind"), "{}", err);

    let unknown_top = r#"
document: {dsl: "1.0.0", namespace: a, name: b, version: "1.0.0"}
use: {}
do:
  - step: {set: {x: 1}}
"#;
    let err = WorkflowDefinition::parse(unknown_top).unwrap_err();
    assert_eq!(err.code, "WFG-DSL-002");
}

#[test]
fn nested_lists_are_validated() {
    let text = r#"
document: {dsl: "1.0.0", namespace: a, name: b, version: "1.0.0"}
do:
  - loop:
      for: {in: "${ $input.items }"}
      do:
        - inner: {set: {x: 1}}
        - inner: {set: {x: 2}}
"#;
    let err = WorkflowDefinition::parse(text).unwrap().validate().unwrap_err();
    assert_eq!(err.code, "WFG-DSL-005");
    assert!(err.message.contains("loop"), "{}", err);
}

#[test]
fn bad_schedule_and_timeout_are_rejected() {
    let schedule = r#"
document: {dsl: "1.0.0", namespace: a, name: b, version: "1.0.0"}
schedule: {cron: "not a cron"}
do:
  - step: {set: {x: 1}}
"#;
    assert!(WorkflowDefinition::parse(schedule).unwrap().validate().is_err());

    let timeout = r#"
document: {dsl: "1.0.0", namespace: a, name: b, version: "1.0.0"}
timeout: {after: soon}
do:
  - step: {set: {x: 1}}
"#;
    let err = WorkflowDefinition::parse(timeout).unwrap().validate().unwrap_err();
    assert!(err.message.contains("timeout.after"));
}
