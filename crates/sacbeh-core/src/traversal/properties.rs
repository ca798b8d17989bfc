//! Navigation laws checked over generated walks of the sales fixture

use std::sync::Arc;

use proptest::prelude::*;

use super::{PathSeed, TraversalSession};
use crate::backend::MemoryBackend;
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::path::AggFn;
use crate::result::AggregationResult;
use crate::testing::sales_connector;

const DIMENSIONS: [&str; 3] = ["region", "product", "quarter"];

#[derive(Debug, Clone)]
enum Step {
    /// Drill into the n-th row of the current result (wrapping)
    Drill(usize),
    DrillThenBack(usize),
    Detour(usize),
    Back,
}

fn arb_step() -> impl Strategy<Value = Step> {
    prop_oneof![
        (0..4usize).prop_map(Step::Drill),
        (0..4usize).prop_map(Step::DrillThenBack),
        (0..DIMENSIONS.len()).prop_map(Step::Detour),
        Just(Step::Back),
    ]
}

fn fail(err: EngineError) -> TestCaseError {
    TestCaseError::fail(err.to_string())
}

fn pick(result: &AggregationResult, n: usize) -> String {
    result.rows[n % result.rows.len()].key.clone()
}

async fn walk(steps: Vec<Step>) -> Result<(), TestCaseError> {
    let mut session = TraversalSession::new(Arc::new(EngineConfig::default()));
    session
        .load(
            sales_connector(),
            Arc::new(MemoryBackend::new()),
            PathSeed::new("region", Some("sales"), AggFn::Sum),
        )
        .await
        .map_err(fail)?;

    for step in steps {
        let before = session.current_path().cloned().ok_or_else(|| TestCaseError::fail("no path"))?;
        let depth = session.depth();
        let result = session.current_result().await.map_err(fail)?;
        prop_assert_eq!(&result, &session.current_result().await.map_err(fail)?);
        prop_assert!(!result.is_empty());

        match step {
            Step::Drill(n) | Step::DrillThenBack(n) => {
                let value = pick(&result, n);
                match session.drill_into(&value, None) {
                    Ok(child) => {
                        prop_assert_eq!(child.depth(), before.depth() + 1);
                        prop_assert!(child.extends(&before));
                        prop_assert_eq!(session.history().last(), Some(&before));

                        // Drilling narrows the rows to the clicked group
                        let narrowed = session.current_result().await.map_err(fail)?;
                        prop_assert_eq!(Some(narrowed.grand_total()), result.value_of(&value));

                        if matches!(step, Step::DrillThenBack(_)) {
                            let parent = session.go_back().map_err(fail)?;
                            prop_assert_eq!(&parent, &before);
                            prop_assert_eq!(session.current_path(), Some(&before));
                            prop_assert_eq!(session.depth(), depth);
                        }
                    }
                    Err(err) => {
                        prop_assert!(before.group_by.is_none());
                        prop_assert!(matches!(err, EngineError::NoDimensionToFilter { .. }), "unexpected error: {:?}", err);
                        prop_assert_eq!(session.current_path(), Some(&before));
                        prop_assert_eq!(session.depth(), depth);
                    }
                }
            }
            Step::Detour(d) => {
                let path = session.detour(DIMENSIONS[d]).map_err(fail)?;
                prop_assert_eq!(&path.filters, &before.filters);
                prop_assert_eq!(path.group_by.as_deref(), Some(DIMENSIONS[d]));
                prop_assert_eq!(session.depth(), depth);

                // Re-slicing keeps the same rows in scope
                let resliced = session.current_result().await.map_err(fail)?;
                prop_assert_eq!(resliced.grand_total(), result.grand_total());
            }
            Step::Back => match session.go_back() {
                Ok(parent) => {
                    prop_assert_eq!(session.depth(), depth - 1);
                    prop_assert_eq!(parent.depth() + 1, before.depth());
                }
                Err(err) => {
                    prop_assert!(matches!(err, EngineError::AtRoot { .. }), "unexpected error: {:?}", err);
                    prop_assert_eq!(depth, 0);
                    prop_assert_eq!(session.current_path(), Some(&before));
                }
            },
        }
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_navigation_laws(steps in prop::collection::vec(arb_step(), 1..12)) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(walk(steps))?;
    }
}
