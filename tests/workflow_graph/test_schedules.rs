use std::time::Duration;
use workflow_runner::core::workflow_graph::schedule::{
    register_schedule, trigger_for, InMemoryScheduleStore, ScheduleStore, ScheduleTrigger,
};
use workflow_runner::core::workflow_graph::schema::ScheduleSpec;
use workflow_runner::core::workflow_graph::WorkflowDefinition;

fn definition(schedule: Option<&str>) -> WorkflowDefinition {
    let text = format!(
        "document: {{dsl: \"1.0.0\", namespace: billing, name: invoices, version: \"1.0.0\"}}\n{}do:\n  - bill: {{set: {{ok: true}}}}\n",
        schedule
            .map(|s| format!("schedule: {}\n", s))
            .unwrap_or_default()
    );
    let definition = WorkflowDefinition::parse(&text).unwrap();
    definition.validate().unwrap();
    definition
}

#[tokio::test]
async fn cron_schedule_is_installed_under_the_identity() {
    let store = InMemoryScheduleStore::new();
    let record = register_schedule(&store, &definition(Some("{cron: \"0 */5 * * *\"}")))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.id, "billing-invoices");
    assert_eq!(record.workflow, "invoices");
    assert_eq!(record.task_queue, "billing");
    assert_eq!(record.trigger, ScheduleTrigger::Cron("0 */5 * * *".to_string()));
    assert_eq!(store.get("billing-invoices"), Some(record));
}

#[tokio::test]
async fn re_registering_replaces_the_prior_schedule() {
    let store = InMemoryScheduleStore::new();
    register_schedule(&store, &definition(Some("{cron: \"0 0 * * *\"}")))
        .await
        .unwrap();
    let record = register_schedule(&store, &definition(Some("{every: 15m}")))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.trigger, ScheduleTrigger::Interval(Duration::from_secs(900)));

    let installed = store.list().await.unwrap();
    assert_eq!(installed.len(), 1);
    assert_eq!(installed[0].trigger, record.trigger);
}

#[tokio::test]
async fn dropping_the_schedule_uninstalls_it() {
    let store = InMemoryScheduleStore::new();
    register_schedule(&store, &definition(Some("{every: 1h}")))
        .await
        .unwrap();
    let record = register_schedule(&store, &definition(None)).await.unwrap();
    assert!(record.is_none());
    assert!(store.list().await.unwrap().is_empty());
}

#[test]
fn triggers_reject_ambiguous_or_unsupported_specs() {
    let both = ScheduleSpec {
        cron: Some("0 * * * *".into()),
        every: Some("1m".into()),
        after: None,
    };
    assert_eq!(trigger_for(&both).unwrap_err().code, "WFG-SCHED-001");

    let after = ScheduleSpec {
        after: Some("10m".into()),
        ..Default::default()
    };
    assert_eq!(trigger_for(&after).unwrap_err().code, "WFG-SCHED-001");

    assert!(trigger_for(&ScheduleSpec::default()).is_err());

    let zero = ScheduleSpec {
        every: Some("0s".into()),
        ..Default::default()
    };
    assert!(trigger_for(&zero).is_err());
}
