//! ActionStore interface tests.

use periscope::interfaces::ActionStore;
use periscope::retention::{Action, ActionStep, PropertyFilter, PropertyOperator, UrlMatching};

fn make_action(id: i64, team_id: i64, steps: Vec<ActionStep>) -> Action {
    Action {
        id,
        team_id,
        name: format!("Action {id}"),
        steps,
    }
}

pub async fn test_put_and_get<S: ActionStore>(store: &S) {
    let action = make_action(
        8001,
        201,
        vec![
            ActionStep::event("signup"),
            ActionStep::event("$pageview")
                .with_url("https://example.com/welcome", UrlMatching::Exact)
                .with_property(PropertyFilter::exact("plan", "pro")),
            ActionStep {
                url: Some("/pricing".to_string()),
                properties: vec![PropertyFilter::exact("email", serde_json::Value::Null)
                    .with_operator(PropertyOperator::IsSet)],
                ..Default::default()
            },
        ],
    );

    store.put_action(&action).await.expect("put should succeed");

    let loaded = store.get_action(201, 8001).await.expect("get should succeed");
    assert_eq!(loaded, Some(action), "steps keep their order and clauses");
}

pub async fn test_get_missing<S: ActionStore>(store: &S) {
    let loaded = store.get_action(201, 8999).await.expect("get should succeed");
    assert!(loaded.is_none());
}

pub async fn test_team_scoping<S: ActionStore>(store: &S) {
    let action = make_action(8003, 203, vec![ActionStep::event("signup")]);
    store.put_action(&action).await.expect("put should succeed");

    let other_team = store.get_action(204, 8003).await.expect("get should succeed");
    assert!(other_team.is_none(), "actions are scoped to their team");
}

pub async fn test_put_replaces_steps<S: ActionStore>(store: &S) {
    let first = make_action(
        8002,
        202,
        vec![ActionStep::event("a"), ActionStep::event("b")],
    );
    store.put_action(&first).await.expect("put should succeed");

    let mut second = make_action(8002, 202, vec![ActionStep::event("c")]);
    second.name = "Renamed".to_string();
    store.put_action(&second).await.expect("replace should succeed");

    let loaded = store.get_action(202, 8002).await.expect("get should succeed");
    assert_eq!(loaded, Some(second));
}

/// Run all ActionStore interface tests against a store implementation.
#[macro_export]
macro_rules! run_action_store_tests {
    ($store:expr) => {
        use $crate::storage::action_store_tests::*;

        test_put_and_get($store).await;
        println!("  test_put_and_get: PASSED");

        test_get_missing($store).await;
        println!("  test_get_missing: PASSED");

        test_team_scoping($store).await;
        println!("  test_team_scoping: PASSED");

        test_put_replaces_steps($store).await;
        println!("  test_put_replaces_steps: PASSED");
    };
}
