mod common;

use ck_context::harness::generate_test_name_prefix;
use ck_context::{Configuration, ContextInputs, Example, State};
use pretty_assertions::{assert_eq, assert_ne};

#[test]
fn subcontext_example() {
    let name = generate_test_name_prefix("sub");
    let config = Configuration::example(Example::Subcontext, ContextInputs::new(name.clone()));
    let mut state = State::new();

    let plan = config.plan(&state, &common::fake_repo()).unwrap();
    let text = plan.render();
    assert!(!text.is_empty());
    assert!(text.contains("No changes"));
    assert!(text.contains("module.primary_context.data.external.git_repo[0]"));
    assert!(text.contains("module.failover_context.data.external.git_repo[0]"));

    plan.apply(&mut state);

    let primary_prefix = state.output("primary_name_prefix").unwrap();
    let failover_prefix = state.output("failover_name_prefix").unwrap();
    assert!(primary_prefix.contains(&format!("ck-qaprim-{name}")));
    assert!(failover_prefix.contains(&format!("ck-qafo-{name}")));
    assert_ne!(primary_prefix, failover_prefix);

    let primary_context = state.output_map("primary_context").unwrap();
    let failover_context = state.output_map("failover_context").unwrap();
    assert_eq!(primary_context["namespace"], failover_context["namespace"]);
    assert_eq!(primary_context["name"], failover_context["name"]);
    assert_eq!(primary_context["environment"], "qaprim");
    assert_eq!(failover_context["environment"], "qafo");
    assert_eq!(primary_context["environment_name"], "QA Primary");
    assert_eq!(failover_context["environment_name"], "QA Failover");

    let primary_tags = state.output_map("primary_tags").unwrap();
    let failover_tags = state.output_map("failover_tags").unwrap();
    assert_eq!(primary_tags["ck-namespace"], failover_tags["ck-namespace"]);
    assert_eq!(primary_tags["ck-name"], failover_tags["ck-name"]);
    assert_eq!(primary_tags["ck-product"], failover_tags["ck-product"]);
    assert_eq!(primary_tags["ck-environment"], "qaprim");
    assert_eq!(failover_tags["ck-environment"], "qafo");
    assert_eq!(primary_tags["ck-environment-name"], "QA Primary");
    assert_eq!(failover_tags["ck-environment-name"], "QA Failover");

    let primary_data_tags = state.output_map("primary_data_tags").unwrap();
    let failover_data_tags = state.output_map("failover_data_tags").unwrap();
    assert_eq!(primary_data_tags["DataClassification"], failover_data_tags["DataClassification"]);
    assert_eq!(primary_data_tags["RetentionPeriod"], failover_data_tags["RetentionPeriod"]);
    assert!(failover_data_tags["FailoverPrimary"].contains(&format!("ck-qaprim-{name}")));
    assert!(!primary_data_tags.contains_key("FailoverPrimary"));

    state.destroy();
}

#[test]
fn subcontext_without_source_tags_reads_nothing() {
    let repo = common::fake_repo();
    let base = ContextInputs::new("sub1").with_source_repo_tags(false);
    let plan = Configuration::example(Example::Subcontext, base)
        .plan(&State::new(), &repo)
        .unwrap();

    assert!(plan.data_reads().is_empty());
    assert!(!plan.render().contains("git_repo"));
    assert_eq!(repo.calls(), 0);
}

#[test]
fn subcontext_ignores_environment_and_failover_vars() {
    let vars: ContextInputs = serde_json::from_str(
        r#"{"name": "sub1", "environment": "qa", "failover_primary": "ck-x-sub1"}"#,
    )
    .unwrap();
    let mut state = State::new();
    Configuration::example(Example::Subcontext, vars)
        .plan(&state, &common::fake_repo())
        .unwrap()
        .apply(&mut state);

    let primary_prefix = state.output("primary_name_prefix").unwrap();
    let failover_prefix = state.output("failover_name_prefix").unwrap();
    assert_eq!(primary_prefix, "ck-qaprim-sub1");
    assert_eq!(failover_prefix, "ck-qafo-sub1");
    assert_ne!(primary_prefix, failover_prefix);

    let primary_data_tags = state.output_map("primary_data_tags").unwrap();
    let failover_data_tags = state.output_map("failover_data_tags").unwrap();
    assert!(!primary_data_tags.contains_key("FailoverPrimary"));
    assert_eq!(failover_data_tags["FailoverPrimary"], "ck-qaprim-sub1");
}
