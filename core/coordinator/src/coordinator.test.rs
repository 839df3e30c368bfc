use super::*;
use async_trait::async_trait;
use bson::doc;
use chrono::TimeZone;
use chrono::Utc;
use pretty_assertions::assert_eq;
use tally_dispatch::DispatchError;
use tally_pool::PoolError;
use tally_protocol::QueryMetrics;
use tally_protocol::WireError;
use tokio::sync::Mutex;

type Handler = Box<dyn Fn(&DispatchRequest) -> QueryOutcome + Send + Sync>;

/// Scripted executor: records every request and answers via a closure.
struct ScriptedExecutor {
    handler: Handler,
    seen: Mutex<Vec<DispatchRequest>>,
}

impl ScriptedExecutor {
    fn new(handler: Handler) -> Arc<Self> {
        Arc::new(Self {
            handler,
            seen: Mutex::new(Vec::new()),
        })
    }

    async fn seen(&self) -> Vec<DispatchRequest> {
        self.seen.lock().await.clone()
    }
}

#[async_trait]
impl QueryExecutor for ScriptedExecutor {
    async fn execute(
        &self,
        requests: Vec<DispatchRequest>,
        _options: ExecuteOptions,
    ) -> std::result::Result<Vec<QueryOutcome>, DispatchError> {
        let mut outcomes = Vec::with_capacity(requests.len());
        for request in requests {
            outcomes.push((self.handler)(&request));
            self.seen.lock().await.push(request);
        }
        Ok(outcomes)
    }
}

fn ok_outcome(documents: Vec<Document>) -> QueryOutcome {
    QueryOutcome {
        id: "scripted".to_string(),
        result: Some(documents),
        error: None,
        metrics: QueryMetrics {
            query_time: 1.5,
            query_size: Some(10),
            result_size: Some(25),
        },
    }
}

fn error_outcome(message: &str) -> QueryOutcome {
    QueryOutcome::failure("scripted", WireError::new("MongoError", message))
}

fn fact() -> Fact {
    Fact {
        id: "fact-0".to_string(),
        fact_type: 1,
        created_at: Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap(),
        data: serde_json::json!({ "amount": 150 }),
    }
}

fn descriptor(type_name: &str, hash: &str) -> IndexDescriptor {
    IndexDescriptor {
        type_code: 1,
        type_name: type_name.to_string(),
        hash_value: hash.to_string(),
    }
}

fn plan_with(entries: &[(&str, &str)]) -> CounterPlan {
    let mut plan = CounterPlan::new();
    for (type_name, counter) in entries {
        plan.entry((*type_name).to_string()).or_default().insert(
            (*counter).to_string(),
            vec![serde_json::json!({
                "$group": { "_id": null, "count": { "$sum": 1 } }
            })],
        );
    }
    plan
}

/// The request's first `$match` stage, for assertions.
fn first_match(request: &DispatchRequest) -> Value {
    request.query.as_array().unwrap()[0]["$match"].clone()
}

fn has_facet(request: &DispatchRequest) -> bool {
    request
        .query
        .as_array()
        .unwrap()
        .iter()
        .any(|stage| stage.get("$facet").is_some())
}

#[tokio::test]
async fn happy_path_single_index_type() {
    // Three facts share the hashed value; the facet returns the summed
    // group document.
    let executor = ScriptedExecutor::new(Box::new(|request| {
        if request.collection_name == "factIndex" {
            ok_outcome(vec![
                doc! { "f": "fact-1" },
                doc! { "f": "fact-2" },
                doc! { "f": "fact-3" },
            ])
        } else {
            ok_outcome(vec![doc! {
                "total": { "_id": null, "count": 3_i32, "sumA": 920_i32 },
            }])
        }
    }));
    let coordinator = CounterCoordinator::new(
        Arc::clone(&executor),
        CoordinatorSettings::default(),
    );

    let plan = plan_with(&[("T1", "total")]);
    let report = coordinator
        .compute(&fact(), &plan, &[descriptor("T1", "1:abc")])
        .await;

    let total = &report.counters["total"];
    assert_eq!(total.get_i32("count").unwrap(), 3);
    assert_eq!(total.get_i32("sumA").unwrap(), 920);
    assert_eq!(report.metrics.relevant_facts_count, 3);
    assert_eq!(report.metrics.counter_index_count, 1);
    assert!(report.pipelines.is_none());

    // Two queries: lookup on the index collection, facet on facts.
    let seen = executor.seen().await;
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0].collection_name, "factIndex");
    assert_eq!(seen[1].collection_name, "facts");
    assert_eq!(
        first_match(&seen[1]),
        serde_json::json!({ "_id": { "$in": ["fact-1", "fact-2", "fact-3"] } })
    );
}

#[tokio::test]
async fn lookup_filter_carries_hash_floor_and_exclusion() {
    let executor = ScriptedExecutor::new(Box::new(|_| ok_outcome(Vec::new())));
    let settings = CoordinatorSettings {
        depth_from_date: Some(Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap()),
        per_type_limit: Some(10),
        ..CoordinatorSettings::default()
    };
    let coordinator = CounterCoordinator::new(Arc::clone(&executor), settings);

    let plan = plan_with(&[("T1", "total")]);
    coordinator
        .compute(&fact(), &plan, &[descriptor("T1", "1:abc")])
        .await;

    let seen = executor.seen().await;
    let stages = seen[0].query.as_array().unwrap();
    assert_eq!(
        stages[0]["$match"],
        serde_json::json!({
            "h": "1:abc",
            "dt": { "$gte": "2024-04-01T00:00:00.000Z" },
            "f": { "$ne": "fact-0" },
        })
    );
    assert_eq!(stages[1], serde_json::json!({ "$sort": { "h": 1, "dt": -1 } }));
    assert_eq!(stages[2], serde_json::json!({ "$project": { "f": 1 } }));
    assert_eq!(stages[3], serde_json::json!({ "$limit": 10 }));
}

#[tokio::test]
async fn no_relevant_facts_skips_the_facet_stage() {
    let executor = ScriptedExecutor::new(Box::new(|_| ok_outcome(Vec::new())));
    let coordinator = CounterCoordinator::new(
        Arc::clone(&executor),
        CoordinatorSettings::default(),
    );

    let plan = plan_with(&[("T1", "total")]);
    let report = coordinator
        .compute(&fact(), &plan, &[descriptor("T1", "1:abc")])
        .await;

    assert!(report.counters.is_empty());
    let type_metrics = &report.metrics.per_type["T1"];
    assert!(type_metrics.no_relevant_facts);
    assert_eq!(type_metrics.relevant_facts_count, 0);
    // Only the lookup ran.
    assert_eq!(executor.seen().await.len(), 1);
}

#[tokio::test]
async fn errors_are_isolated_per_index_type() {
    let executor = ScriptedExecutor::new(Box::new(|request| {
        let on_bad_type = first_match(request)
            .get("h")
            .is_some_and(|hash| hash == "2:bad");
        if on_bad_type {
            error_outcome("cursor lost")
        } else if request.collection_name == "factIndex" {
            ok_outcome(vec![doc! { "f": "fact-1" }])
        } else {
            ok_outcome(vec![doc! { "ok": { "_id": null, "count": 1_i32 } }])
        }
    }));
    let coordinator = CounterCoordinator::new(
        Arc::clone(&executor),
        CoordinatorSettings::default(),
    );

    let plan = plan_with(&[("T1", "ok"), ("T2", "broken")]);
    let report = coordinator
        .compute(
            &fact(),
            &plan,
            &[descriptor("T1", "1:good"), descriptor("T2", "2:bad")],
        )
        .await;

    // T1 produced its counter; T2 recorded its failure without stopping T1.
    assert!(report.counters.contains_key("ok"));
    assert!(!report.counters.contains_key("broken"));
    assert_eq!(report.metrics.counter_index_count, 2);
    assert_eq!(
        report.metrics.per_type["T2"].error.as_deref(),
        Some("cursor lost")
    );
    assert!(report.metrics.per_type["T1"].error.is_none());
}

#[tokio::test]
async fn counter_name_collisions_resolve_last_write_wins() {
    let executor = ScriptedExecutor::new(Box::new(|request| {
        if request.collection_name == "factIndex" {
            ok_outcome(vec![doc! { "f": "fact-1" }])
        } else {
            // Tag the result with the facet branch it answers.
            let marker = if first_match(request)["_id"]["$in"][0] == "fact-1" {
                1_i32
            } else {
                0_i32
            };
            ok_outcome(vec![doc! { "total": { "_id": null, "from": marker } }])
        }
    }));
    let coordinator = CounterCoordinator::new(
        Arc::clone(&executor),
        CoordinatorSettings::default(),
    );

    let plan = plan_with(&[("T1", "total"), ("T2", "total")]);
    let report = coordinator
        .compute(
            &fact(),
            &plan,
            &[descriptor("T1", "1:a"), descriptor("T2", "2:b")],
        )
        .await;

    // Both types computed "total"; exactly one survived the merge.
    assert_eq!(report.counters.len(), 1);
    assert!(report.counters.contains_key("total"));
}

#[tokio::test]
async fn single_stage_mode_runs_one_query_per_type() {
    let executor = ScriptedExecutor::new(Box::new(|_| {
        ok_outcome(vec![doc! { "total": { "_id": null, "count": 2_i32 } }])
    }));
    let settings = CoordinatorSettings {
        single_stage: true,
        ..CoordinatorSettings::default()
    };
    let coordinator = CounterCoordinator::new(Arc::clone(&executor), settings);

    let plan = plan_with(&[("T1", "total")]);
    let report = coordinator
        .compute(&fact(), &plan, &[descriptor("T1", "1:abc")])
        .await;

    assert_eq!(report.counters["total"].get_i32("count").unwrap(), 2);

    let seen = executor.seen().await;
    assert_eq!(seen.len(), 1);
    // Everything runs on the index collection, facet included.
    assert_eq!(seen[0].collection_name, "factIndex");
    assert!(has_facet(&seen[0]));
}

#[tokio::test]
async fn debug_mode_reports_the_literal_pipelines() {
    let executor = ScriptedExecutor::new(Box::new(|request| {
        if request.collection_name == "factIndex" {
            ok_outcome(vec![doc! { "f": "fact-1" }])
        } else {
            ok_outcome(vec![doc! { "total": { "_id": null, "count": 1_i32 } }])
        }
    }));
    let settings = CoordinatorSettings {
        debug: true,
        ..CoordinatorSettings::default()
    };
    let coordinator = CounterCoordinator::new(Arc::clone(&executor), settings);

    let plan = plan_with(&[("T1", "total")]);
    let report = coordinator
        .compute(&fact(), &plan, &[descriptor("T1", "1:abc")])
        .await;

    let pipelines = report.pipelines.unwrap();
    // Lookup pipeline plus facet pipeline.
    assert_eq!(pipelines["T1"].len(), 2);
}

#[tokio::test]
async fn planned_types_without_descriptors_are_skipped() {
    let executor = ScriptedExecutor::new(Box::new(|_| ok_outcome(Vec::new())));
    let coordinator = CounterCoordinator::new(
        Arc::clone(&executor),
        CoordinatorSettings::default(),
    );

    let plan = plan_with(&[("T1", "total"), ("T2", "other")]);
    let report = coordinator
        .compute(&fact(), &plan, &[descriptor("T1", "1:abc")])
        .await;

    assert_eq!(report.metrics.counter_index_count, 1);
    assert!(report.metrics.per_type.contains_key("T1"));
    assert!(!report.metrics.per_type.contains_key("T2"));
}

#[tokio::test]
async fn dispatch_level_failures_mark_the_type_as_errored() {
    struct FailingExecutor;

    #[async_trait]
    impl QueryExecutor for FailingExecutor {
        async fn execute(
            &self,
            _requests: Vec<DispatchRequest>,
            _options: ExecuteOptions,
        ) -> std::result::Result<Vec<QueryOutcome>, DispatchError> {
            Err(DispatchError::Pool(PoolError::NoReadyWorkers))
        }
    }

    let coordinator = CounterCoordinator::new(
        Arc::new(FailingExecutor),
        CoordinatorSettings::default(),
    );
    let plan = plan_with(&[("T1", "total")]);
    let report = coordinator
        .compute(&fact(), &plan, &[descriptor("T1", "1:abc")])
        .await;

    assert!(report.counters.is_empty());
    assert!(report.metrics.per_type["T1"].error.is_some());
}

#[tokio::test]
async fn metrics_accumulate_query_times_and_sizes() {
    let executor = ScriptedExecutor::new(Box::new(|request| {
        if request.collection_name == "factIndex" {
            ok_outcome(vec![doc! { "f": "fact-1" }])
        } else {
            ok_outcome(vec![doc! { "total": { "_id": null, "count": 1_i32 } }])
        }
    }));
    let coordinator = CounterCoordinator::new(
        Arc::clone(&executor),
        CoordinatorSettings::default(),
    );

    let plan = plan_with(&[("T1", "total")]);
    let report = coordinator
        .compute(&fact(), &plan, &[descriptor("T1", "1:abc")])
        .await;

    let type_metrics = &report.metrics.per_type["T1"];
    // Two queries at 1.5ms / 10B / 25B each.
    assert_eq!(type_metrics.query_time, 3.0);
    assert_eq!(type_metrics.query_size, 20);
    assert_eq!(type_metrics.result_size, 50);
    assert!(report.processing_time >= 0.0);
}
