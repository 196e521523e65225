//! Property-based tests for the evaluator partition using proptest.

use proptest::prelude::*;

use jury_core::evaluators::{Evaluator, RequirementEvaluator};
use jury_core::llm::MockLlmClient;
use jury_core::model::{ModelMeta, ModelType, ReplayModel};
use jury_core::{Dataset, Record};
use serde_json::json;
use std::collections::BTreeSet;
use std::sync::Arc;

#[derive(Debug, Clone, Copy)]
enum Verdict {
    Pass,
    Fail,
    Malformed,
}

fn verdict() -> impl Strategy<Value = Verdict> {
    prop_oneof![
        Just(Verdict::Pass),
        Just(Verdict::Fail),
        Just(Verdict::Malformed)
    ]
}

fn model() -> ReplayModel {
    ReplayModel::new(
        ModelMeta::new(ModelType::TextGeneration)
            .with_name("bot")
            .with_description("answers")
            .with_feature_names(["q"]),
        "a",
    )
}

fn dataset(n: usize) -> Dataset {
    Dataset::from_records(
        (0..n)
            .map(|i| {
                Record::from([
                    ("q".to_string(), json!(format!("question {}", i))),
                    ("a".to_string(), json!(format!("answer {}", i))),
                ])
            })
            .collect(),
    )
}

// --- Partition properties ---

proptest! {
    #[test]
    fn every_row_lands_in_exactly_one_bucket(verdicts in prop::collection::vec(verdict(), 0..24)) {
        let llm = Arc::new(MockLlmClient::new());
        for v in &verdicts {
            match v {
                Verdict::Pass => llm.queue_verdict(true, None),
                Verdict::Fail => llm.queue_verdict(false, Some("nope")),
                Verdict::Malformed => llm.queue_function_call("evaluate_model", json!({})),
            }
        }

        let ds = dataset(verdicts.len());
        let result = tokio_test::block_on(
            RequirementEvaluator::new(["Be correct"], llm).evaluate(&model(), &ds),
        )
        .unwrap();

        let expected_fail: BTreeSet<usize> = verdicts
            .iter()
            .enumerate()
            .filter(|(_, v)| matches!(v, Verdict::Fail))
            .map(|(i, _)| i)
            .collect();
        let passes = verdicts.iter().filter(|v| matches!(v, Verdict::Pass)).count();
        let errors = verdicts.iter().filter(|v| matches!(v, Verdict::Malformed)).count();

        prop_assert_eq!(result.total(), ds.len());
        prop_assert_eq!(result.success_examples().len(), passes);
        prop_assert_eq!(result.failure_examples().len(), expected_fail.len());
        prop_assert_eq!(result.errors().len(), errors);

        let failing: BTreeSet<usize> = result
            .output_ds()
            .unwrap()
            .rows()
            .iter()
            .map(|r| r.index)
            .collect();
        prop_assert_eq!(failing, expected_fail.clone());

        prop_assert_eq!(result.passed(), expected_fail.is_empty() && passes > 0);
    }
}
