mod common;

use ck_context::{compose, primary_failover, Context, ContextInputs, EnvironmentType};
use proptest::prelude::*;

fn environment() -> impl Strategy<Value = EnvironmentType> {
    proptest::sample::select(EnvironmentType::all().collect::<Vec<_>>())
}

proptest! {
    // Same inputs, same outputs.
    #[test]
    fn name_prefix_is_deterministic(name in "[a-z][a-z0-9-]{0,20}", env in environment()) {
        let inputs = ContextInputs::new(name.clone()).with_environment_type(env);
        let a = Context::evaluate(&inputs, &common::fake_repo()).unwrap();
        let b = Context::evaluate(&inputs, &common::fake_repo()).unwrap();
        prop_assert_eq!(&a, &b);
        prop_assert!(a.name_prefix.starts_with("ck-"));
        prop_assert!(a.name_prefix.ends_with(&name));
    }

    #[test]
    fn distinct_environments_share_identity_tags(
        name in "[a-z][a-z0-9]{0,12}",
        primary in environment(),
        failover in environment(),
    ) {
        prop_assume!(primary.abbreviation() != failover.abbreviation());
        let subs = primary_failover(primary, failover);
        let out = compose(&ContextInputs::new(name), &subs, &common::fake_repo()).unwrap();
        let (p, f) = (&out[0].1, &out[1].1);

        for key in ["ck-namespace", "ck-name", "ck-product"] {
            prop_assert_eq!(&p.tags[key], &f.tags[key]);
        }
        prop_assert_ne!(&p.name_prefix, &f.name_prefix);
        prop_assert_ne!(&p.tags["ck-environment-name"], &f.tags["ck-environment-name"]);
        prop_assert_eq!(&f.data_tags["FailoverPrimary"], &p.name_prefix);
        prop_assert!(!p.data_tags.contains_key("FailoverPrimary"));
    }

    #[test]
    fn disabled_context_never_looks_up(name in "\\PC*", tags_on in any::<bool>()) {
        let repo = common::fake_repo();
        let inputs = ContextInputs::new(name).with_enabled(false).with_source_repo_tags(tags_on);
        let ctx = Context::evaluate(&inputs, &repo).unwrap();
        prop_assert_eq!(repo.calls(), 0);
        prop_assert!(ctx.name_prefix.is_empty());
        prop_assert!(ctx.tags.is_empty());
    }
}
