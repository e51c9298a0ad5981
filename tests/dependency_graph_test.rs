use plon_canvas::domain::connection::{ConnectionError, ConnectionType};
use plon_canvas::domain::task::Task;
use plon_canvas::services::CanvasError;
use plon_canvas::test_helpers::TestContext;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rstest::rstest;

const TASKS: usize = 12;

fn context() -> TestContext {
    TestContext::with_tasks((0..TASKS).map(|i| Task::new(format!("t{i}"), format!("Task {i}"))).collect())
}

fn connection_type(rng: &mut StdRng) -> ConnectionType {
    match rng.gen_range(0..4) {
        0 => ConnectionType::Sequential,
        1 => ConnectionType::Reference,
        _ => ConnectionType::Dependency,
    }
}

#[rstest]
#[case(1)]
#[case(7)]
#[case(42)]
#[case(2024)]
fn test_random_edge_sequences_stay_acyclic(#[case] seed: u64) {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut ctx = context();
    let mut accepted = 0;

    for _ in 0..400 {
        let from = format!("t{}", rng.gen_range(0..TASKS));
        let to = format!("t{}", rng.gen_range(0..TASKS));
        let kind = connection_type(&mut rng);
        let before = ctx.engine.connections().len();

        match ctx.engine.create_connection(&from, &to, kind) {
            Ok(_) => accepted += 1,
            Err(CanvasError::Connection(err)) => {
                assert_eq!(ctx.engine.connections().len(), before);
                match err {
                    ConnectionError::SelfLoop { .. } => assert_eq!(from, to),
                    ConnectionError::Cycle { .. } => assert_eq!(kind, ConnectionType::Dependency),
                    ConnectionError::Duplicate { .. } => {}
                    ConnectionError::DuplicateId { .. } => panic!("fresh connections get fresh ids"),
                }
            }
            Err(other) => panic!("unexpected error: {other}"),
        }

        // Occasionally remove an edge to exercise graph bookkeeping.
        if rng.gen_bool(0.1) {
            let first = ctx.engine.connections().iter().next().map(|c| c.id);
            if let Some(id) = first {
                assert!(ctx.engine.remove_connection(&id));
            }
        }
        assert!(!ctx.engine.connections().dependency_graph().has_cycle());
    }

    assert!(accepted > 0);
    let order = ctx.engine.dependency_order().expect("dependency subgraph is acyclic");
    for connection in ctx.engine.connections().iter() {
        if connection.connection_type != ConnectionType::Dependency {
            continue;
        }
        let from = order.iter().position(|id| *id == connection.from_task_id);
        let to = order.iter().position(|id| *id == connection.to_task_id);
        assert!(from < to, "{} must precede {}", connection.from_task_id, connection.to_task_id);
    }
    // Only tasks that still take part in a dependency are ordered.
    for task_id in &order {
        assert!(ctx
            .engine
            .connections()
            .iter()
            .any(|c| c.connection_type == ConnectionType::Dependency && c.touches(task_id)));
    }
}

#[test]
fn test_duplicate_triple_rejected_but_other_types_allowed() {
    let mut ctx = context();
    ctx.engine
        .create_connection("t0", "t1", ConnectionType::Dependency)
        .unwrap();
    assert!(matches!(
        ctx.engine.create_connection("t0", "t1", ConnectionType::Dependency),
        Err(CanvasError::Connection(ConnectionError::Duplicate { .. }))
    ));
    ctx.engine
        .create_connection("t0", "t1", ConnectionType::Reference)
        .unwrap();
    // Non-dependency edges do not take part in cycle detection.
    ctx.engine
        .create_connection("t1", "t0", ConnectionType::Sequential)
        .unwrap();
    assert_eq!(ctx.engine.connections().len(), 3);
}

#[test]
fn test_long_chain_cycle_detection() {
    let mut ctx = context();
    for i in 0..TASKS - 1 {
        ctx.engine
            .create_connection(&format!("t{i}"), &format!("t{}", i + 1), ConnectionType::Dependency)
            .unwrap();
    }
    let last = format!("t{}", TASKS - 1);
    assert!(ctx
        .engine
        .create_connection(&last, "t0", ConnectionType::Dependency)
        .is_err());
    assert!(ctx
        .engine
        .create_connection("t0", &last, ConnectionType::Dependency)
        .is_ok());
}

#[test]
fn test_dependency_order_forgets_deleted_tasks() {
    let mut ctx = context();
    ctx.engine
        .create_connection("t0", "t1", ConnectionType::Dependency)
        .unwrap();
    ctx.engine
        .create_connection("t2", "t3", ConnectionType::Dependency)
        .unwrap();

    assert!(ctx.tasks.remove("t0"));
    let removed = ctx.engine.cleanup_orphaned_connections();
    assert_eq!(removed.len(), 1);

    let order = ctx.engine.dependency_order().unwrap();
    assert_eq!(order, vec!["t2".to_string(), "t3".to_string()]);
    assert!(ctx.engine.dependencies_of("t1").is_empty());
    assert!(ctx
        .engine
        .create_connection("t3", "t2", ConnectionType::Sequential)
        .is_ok());
    assert!(ctx
        .engine
        .create_connection("t3", "t2", ConnectionType::Dependency)
        .is_err());
}
