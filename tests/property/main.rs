// tests/property/main.rs

use proptest::prelude::*;

use avian::build::BuildEvent;
use avian::coord::{Coordinator, CoordinatorOptions, Decision};
use avian::types::PipelineKind;

#[derive(Debug, Clone)]
enum Step {
    Start(PipelineKind),
    Complete(PipelineKind, Vec<String>),
}

fn pipeline_strategy() -> impl Strategy<Value = PipelineKind> {
    prop_oneof![Just(PipelineKind::Components), Just(PipelineKind::Services)]
}

fn chunk_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("main".to_string()),
        Just("index.client".to_string()),
        Just("index.server".to_string()),
        Just("admin/users.server.routes".to_string()),
        Just("observer".to_string()),
    ]
}

fn step_strategy() -> impl Strategy<Value = Step> {
    prop_oneof![
        pipeline_strategy().prop_map(Step::Start),
        (pipeline_strategy(), proptest::collection::vec(chunk_strategy(), 0..4))
            .prop_map(|(p, changed)| Step::Complete(p, changed)),
    ]
}

proptest! {
    /// Start/restart decisions only happen when no pipeline is building, the
    /// change-set is empty after every decision, and client-only change-sets
    /// never restart a running pool.
    #[test]
    fn decisions_only_at_quiescence(steps in proptest::collection::vec(step_strategy(), 1..40)) {
        let mut c = Coordinator::new(CoordinatorOptions::default());
        let mut pool_running = false;
        let mut since_decision: Vec<String> = Vec::new();

        for step in steps {
            let event = match step {
                Step::Start(p) => BuildEvent::Started { pipeline: p },
                Step::Complete(p, changed) => BuildEvent::Completed { pipeline: p, changed },
            };
            if let BuildEvent::Completed { changed, .. } = &event {
                since_decision.extend(changed.iter().cloned());
            }

            let decision = c.step(event, pool_running);

            if !c.is_quiescent() {
                prop_assert_eq!(decision, Decision::None);
                continue;
            }

            match decision {
                Decision::StartPool => {
                    prop_assert!(!pool_running);
                    pool_running = true;
                }
                Decision::RestartPool => {
                    prop_assert!(pool_running);
                    prop_assert!(since_decision.iter().any(|c| c.contains("server")));
                }
                Decision::None => {
                    if pool_running {
                        prop_assert!(!since_decision
                            .iter()
                            .any(|c| avian::coord::is_server_chunk(c, "server")));
                    }
                }
                other => prop_assert!(false, "unexpected decision {:?}", other),
            }

            prop_assert!(c.pending().is_empty());
            since_decision.clear();
        }
    }
}
