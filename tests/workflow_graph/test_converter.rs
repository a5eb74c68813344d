use insta::assert_snapshot;
use serde_json::{json, Value};
use workflow_runner::core::types::ErrorCategory;
use workflow_runner::core::workflow_graph::tasks::{
    FlowDirective, HttpOutputMode, ListenMode, TaskKind, TaskKindTag,
};
use workflow_runner::core::workflow_graph::{
    convert, convert_to_yaml, DocumentSpec, TaskSpec, WorkflowDefinition, WorkflowSpec,
};

fn document() -> DocumentSpec {
    DocumentSpec {
        dsl: "1.0.0".into(),
        namespace: "demo".into(),
        name: "hello".into(),
        version: "0.1.0".into(),
        ..Default::default()
    }
}

fn spec(tasks: Vec<TaskSpec>) -> WorkflowSpec {
    WorkflowSpec {
        document: Some(document()),
        tasks,
    }
}

fn sample_config(kind: TaskKindTag) -> Value {
    match kind {
        TaskKindTag::Set => json!({"variables": {"x": 1}}),
        TaskKindTag::HttpCall => json!({"method": "GET", "endpoint": {"uri": "https://example.com"}}),
        TaskKindTag::GrpcCall => json!({"service": {"name": "inventory", "host": "localhost", "port": 50051}, "method": "Reserve"}),
        TaskKindTag::Switch => json!({"cases": [{"name": "yes", "when": "${ $input.ok }", "then": "end"}, {"name": "fallback"}]}),
        TaskKindTag::For => json!({"in": "${ $input.items }", "do": [{"name": "visit", "kind": "SET", "task_config": {"variables": {"seen": true}}}]}),
        TaskKindTag::Fork => json!({"compete": true, "branches": [{"name": "a", "do": [{"name": "a1", "kind": "WAIT", "task_config": {"seconds": 1}}]}]}),
        TaskKindTag::Try => json!({"try": [{"name": "risky", "kind": "RAISE", "task_config": {"error": "runtime"}}], "catch": {"do": [{"name": "recover", "kind": "SET", "task_config": {"variables": {"ok": false}}}]}}),
        TaskKindTag::Listen => json!({"to": {"mode": "all", "events": [{"with": {"type": "a"}}, {"with": {"type": "b"}}]}}),
        TaskKindTag::Wait => json!({"duration": "2s"}),
        TaskKindTag::Raise => json!({"error": "validation", "title": "Bad", "status": 400}),
        TaskKindTag::Run => json!({"workflow": "child", "input": {"id": 1}, "await": false}),
        TaskKindTag::CallActivity => json!({"activity": "legacy"}),
    }
}

#[test]
fn every_supported_kind_converts() {
    for kind in TaskKindTag::ALL {
        let task = TaskSpec::new("step", kind, sample_config(kind));
        let result = convert(Some(&spec(vec![task])));
        if kind == TaskKindTag::CallActivity {
            let err = result.unwrap_err();
            assert_eq!(err.code, "WFG-CONV-006");
            continue;
        }
        let definition = result.unwrap_or_else(|err| panic!("{}: {}", kind, err));
        assert_eq!(definition.tasks[0].task.kind.tag(), kind);
        definition.validate().unwrap();
    }
}

#[test]
fn nil_inputs_are_rejected() {
    assert_eq!(convert(None).unwrap_err().code, "WFG-CONV-001");

    let no_document = WorkflowSpec {
        document: None,
        tasks: vec![TaskSpec::new("a", TaskKindTag::Set, Value::Null)],
    };
    assert_eq!(convert(Some(&no_document)).unwrap_err().code, "WFG-CONV-002");
    assert_eq!(convert(Some(&spec(vec![]))).unwrap_err().code, "WFG-CONV-003");

    let unnamed = TaskSpec::new("", TaskKindTag::Set, Value::Null);
    assert_eq!(
        convert(Some(&spec(vec![unnamed]))).unwrap_err().code,
        "WFG-CONV-004"
    );
}

#[test]
fn payload_errors_name_the_task() {
    let task = TaskSpec::new("charge", TaskKindTag::HttpCall, json!({"method": "POST"}));
    let err = convert(Some(&spec(vec![task]))).unwrap_err();
    assert_eq!(err.code, "WFG-CONV-005");
    assert_eq!(err.category, ErrorCategory::ValidationError);
    assert!(err.message.contains("charge"));
}

#[test]
fn common_fields_carry_over() {
    let mut task = TaskSpec::new("guarded", TaskKindTag::Set, json!({"variables": {"y": 2}}))
        .with_export("${ $data.y }")
        .with_then("exit");
    task.condition = Some("${ $input.enabled }".into());
    task.metadata
        .insert("searchAttributes".into(), json!({"Stage": {"type": "keyword", "value": "init"}}));

    let definition = convert(Some(&spec(vec![task]))).unwrap();
    let converted = &definition.tasks[0].task;
    assert_eq!(converted.condition.as_deref(), Some("${ $input.enabled }"));
    assert_eq!(converted.export, Some(json!("${ $data.y }")));
    assert_eq!(converted.then, Some(FlowDirective::Exit));
    assert!(converted.metadata.contains_key("searchAttributes"));
}

#[test]
fn nested_structures_are_converted() {
    let fork = TaskSpec::new("fan", TaskKindTag::Fork, sample_config(TaskKindTag::Fork));
    let listen = TaskSpec::new("gather", TaskKindTag::Listen, sample_config(TaskKindTag::Listen));
    let http = TaskSpec::new(
        "raw",
        TaskKindTag::HttpCall,
        json!({"method": "GET", "endpoint": {"uri": "https://example.com"}, "output": "raw"}),
    );
    let definition = convert(Some(&spec(vec![fork, listen, http]))).unwrap();

    match &definition.tasks[0].task.kind {
        TaskKind::Fork(fork) => {
            assert!(fork.compete);
            assert_eq!(fork.branches[0].name, "a");
            assert_eq!(fork.branches[0].tasks[0].name, "a1");
        }
        other => panic!("expected fork, got {:?}", other),
    }
    match &definition.tasks[1].task.kind {
        TaskKind::Listen(listen) => {
            assert_eq!(listen.mode, ListenMode::All);
            assert_eq!(listen.events.len(), 2);
        }
        other => panic!("expected listen, got {:?}", other),
    }
    match &definition.tasks[2].task.kind {
        TaskKind::HttpCall(http) => assert_eq!(http.output, HttpOutputMode::Raw),
        other => panic!("expected http, got {:?}", other),
    }
}

#[test]
fn unknown_output_mode_is_rejected() {
    let http = TaskSpec::new(
        "call",
        TaskKindTag::HttpCall,
        json!({"method": "GET", "endpoint": {"uri": "https://example.com"}, "output": "stream"}),
    );
    let err = convert(Some(&spec(vec![http]))).unwrap_err();
    assert!(err.message.contains("stream"));
}

#[test]
fn converted_yaml_round_trips() {
    let tasks = TaskKindTag::ALL
        .iter()
        .filter(|kind| **kind != TaskKindTag::CallActivity)
        .map(|kind| TaskSpec::new(format!("task-{}", kind.as_str().to_lowercase()), *kind, sample_config(*kind)))
        .collect();
    let yaml = convert_to_yaml(Some(&spec(tasks))).unwrap();
    let reparsed = WorkflowDefinition::parse(&yaml).unwrap();
    assert_eq!(reparsed.to_yaml().unwrap(), yaml);
    assert_eq!(reparsed.tasks.len(), 11);
}

#[test]
fn canonical_yaml_snapshot() {
    let greet = TaskSpec::new("greet", TaskKindTag::Set, json!({"variables": {"message": "hi"}}));
    let pause = TaskSpec::new("pause", TaskKindTag::Wait, json!({"seconds": 3})).with_then("end");
    let yaml = convert_to_yaml(Some(&spec(vec![greet, pause]))).unwrap();
    assert_snapshot!(yaml, @r###"
    do:
    - greet:
        set:
          message: hi
    - pause:
        then: end
        wait: 3
    document:
      dsl: 1.0.0
      name: hello
      namespace: demo
      version: 0.1.0
    "###);
}
