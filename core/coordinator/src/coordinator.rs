//! The counter execution coordinator.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use bson::Document;
use serde_json::Value;
use serde_json::json;

use crate::executor::QueryExecutor;
use crate::report::CounterReport;
use crate::report::IndexTypeMetrics;
use crate::settings::CoordinatorSettings;
use tally_dispatch::DispatchRequest;
use tally_dispatch::ExecuteOptions;
use tally_model::Fact;
use tally_model::IndexDescriptor;
use tally_plan::CounterPipelines;
use tally_plan::CounterPlan;
use tally_pool::QueryOutcome;
use tally_protocol::format_wire_date;

/// Runs a fact's counter plan and merges the per-index-type results.
///
/// One aggregation chain per index type, executed concurrently; an error in
/// one index type produces an error entry for that type only.
pub struct CounterCoordinator<E: QueryExecutor> {
    executor: Arc<E>,
    settings: CoordinatorSettings,
}

/// Result of executing one index type.
struct TypeRun {
    counters: BTreeMap<String, Document>,
    metrics: IndexTypeMetrics,
    pipelines: Vec<Value>,
}

impl<E: QueryExecutor> CounterCoordinator<E> {
    /// Build a coordinator over a query executor.
    pub fn new(executor: Arc<E>, settings: CoordinatorSettings) -> Self {
        Self { executor, settings }
    }

    /// The coordinator's settings.
    pub fn settings(&self) -> &CoordinatorSettings {
        &self.settings
    }

    /// Compute the counters of `plan` for `fact`.
    ///
    /// `descriptors` are the index-entry descriptors the indexer produced
    /// for this fact; a plan entry without a matching descriptor is skipped
    /// with a warning.
    pub async fn compute(
        &self,
        fact: &Fact,
        plan: &CounterPlan,
        descriptors: &[IndexDescriptor],
    ) -> CounterReport {
        let started = Instant::now();

        let jobs: Vec<(&str, &CounterPipelines, &IndexDescriptor)> = plan
            .iter()
            .filter_map(|(type_name, counters)| {
                match descriptors
                    .iter()
                    .find(|descriptor| descriptor.type_name == *type_name)
                {
                    Some(descriptor) => Some((type_name.as_str(), counters, descriptor)),
                    None => {
                        tracing::warn!(
                            index_type = type_name.as_str(),
                            fact = fact.id.as_str(),
                            "No index descriptor for planned index type; skipping"
                        );
                        None
                    }
                }
            })
            .collect();

        let tasks = jobs.into_iter().map(|(type_name, counters, descriptor)| async move {
            let run = if self.settings.single_stage {
                self.run_single_stage(fact, counters, descriptor).await
            } else {
                self.run_two_stage(fact, counters, descriptor).await
            };
            (type_name.to_string(), run)
        });
        let runs = futures::future::join_all(tasks).await;

        let mut report = CounterReport {
            pipelines: self.settings.debug.then(BTreeMap::new),
            ..CounterReport::default()
        };
        report.metrics.counter_index_count = runs.len() as i64;
        for (type_name, run) in runs {
            for (counter, document) in run.counters {
                if report.counters.insert(counter.clone(), document).is_some() {
                    tracing::warn!(
                        counter = counter.as_str(),
                        index_type = type_name.as_str(),
                        "Counter name collision across index types; last write wins"
                    );
                }
            }
            report.metrics.relevant_facts_count += run.metrics.relevant_facts_count;
            if let Some(pipelines) = &mut report.pipelines {
                pipelines.insert(type_name.clone(), run.pipelines);
            }
            report.metrics.per_type.insert(type_name, run.metrics);
        }
        report.processing_time = started.elapsed().as_secs_f64() * 1_000.0;

        tracing::debug!(
            fact = fact.id.as_str(),
            index_types = report.metrics.counter_index_count,
            counters = report.counters.len(),
            relevant_facts = report.metrics.relevant_facts_count,
            "Counter computation finished"
        );
        report
    }

    /// Mode A: lookup on the index collection, then a facet aggregation
    /// over the fact collection restricted to the found fact ids.
    async fn run_two_stage(
        &self,
        fact: &Fact,
        counters: &CounterPipelines,
        descriptor: &IndexDescriptor,
    ) -> TypeRun {
        let mut run = TypeRun {
            counters: BTreeMap::new(),
            metrics: IndexTypeMetrics::default(),
            pipelines: Vec::new(),
        };

        let lookup = self.lookup_stages(fact, descriptor);
        run.pipelines.push(json!(lookup.clone()));
        let outcome = self
            .execute_one(&self.settings.index_collection, lookup)
            .await;
        let documents = match self.unpack(outcome, &mut run.metrics) {
            Some(documents) => documents,
            None => return run,
        };

        let fact_ids: Vec<String> = documents
            .iter()
            .filter_map(|document| document.get_str("f").ok().map(str::to_string))
            .collect();
        run.metrics.relevant_facts_count = fact_ids.len() as i64;
        if fact_ids.is_empty() {
            run.metrics.no_relevant_facts = true;
            tracing::debug!(
                index_type = descriptor.type_name.as_str(),
                fact = fact.id.as_str(),
                "No relevant facts for index type"
            );
            return run;
        }

        let facet = facet_stages(&fact_ids, counters);
        run.pipelines.push(json!(facet.clone()));
        let outcome = self
            .execute_one(&self.settings.facts_collection, facet)
            .await;
        if let Some(documents) = self.unpack(outcome, &mut run.metrics) {
            run.counters = extract_counters(&documents, counters);
        }
        run
    }

    /// Mode B: one pipeline on the index collection, relying on embedded
    /// fact data in the index entries.
    async fn run_single_stage(
        &self,
        fact: &Fact,
        counters: &CounterPipelines,
        descriptor: &IndexDescriptor,
    ) -> TypeRun {
        let mut run = TypeRun {
            counters: BTreeMap::new(),
            metrics: IndexTypeMetrics::default(),
            pipelines: Vec::new(),
        };

        let mut stages = self.match_sort_limit(fact, descriptor);
        stages.extend(facet_tail(counters));
        run.pipelines.push(json!(stages.clone()));

        let outcome = self
            .execute_one(&self.settings.index_collection, stages)
            .await;
        if let Some(documents) = self.unpack(outcome, &mut run.metrics) {
            run.counters = extract_counters(&documents, counters);
        }
        run
    }

    /// Dispatch a single aggregation and return its outcome.
    async fn execute_one(&self, collection: &str, stages: Vec<Value>) -> Option<QueryOutcome> {
        let request = DispatchRequest::new(collection, Value::Array(stages));
        let options = ExecuteOptions::default()
            .with_timeout_ms(self.settings.query_timeout_ms)
            .with_max_concurrency(self.settings.max_concurrency);
        match self.executor.execute(vec![request], options).await {
            Ok(outcomes) => outcomes.into_iter().next(),
            Err(e) => {
                tracing::warn!(collection, error = %e, "Dispatch failed");
                None
            }
        }
    }

    /// Fold an outcome into the metrics, returning its documents on success.
    fn unpack(
        &self,
        outcome: Option<QueryOutcome>,
        metrics: &mut IndexTypeMetrics,
    ) -> Option<Vec<Document>> {
        let Some(outcome) = outcome else {
            metrics.error = Some("dispatch failed".to_string());
            return None;
        };
        metrics.query_time += outcome.metrics.query_time;
        metrics.query_size += outcome.metrics.query_size.unwrap_or(0);
        metrics.result_size += outcome.metrics.result_size.unwrap_or(0);
        if let Some(error) = outcome.error {
            metrics.error = Some(error.message);
            return None;
        }
        outcome.result
    }

    /// The relevant-facts filter: `h` equals the descriptor's hash, `dt` at
    /// or above the time floor, the current fact excluded.
    fn match_sort_limit(&self, fact: &Fact, descriptor: &IndexDescriptor) -> Vec<Value> {
        let mut filter = serde_json::Map::new();
        filter.insert("h".to_string(), json!(descriptor.hash_value));
        if let Some(floor) = self.settings.depth_from_date {
            filter.insert("dt".to_string(), json!({ "$gte": format_wire_date(floor) }));
        }
        if self.settings.exclude_current_fact {
            filter.insert("f".to_string(), json!({ "$ne": fact.id }));
        }
        vec![
            json!({ "$match": Value::Object(filter) }),
            json!({ "$sort": { "h": 1, "dt": -1 } }),
            json!({ "$limit": self.settings.effective_limit() }),
        ]
    }

    /// Mode A stage-one pipeline: match, sort, project `f` only, limit.
    fn lookup_stages(&self, fact: &Fact, descriptor: &IndexDescriptor) -> Vec<Value> {
        let mut stages = self.match_sort_limit(fact, descriptor);
        // Keep only the fact reference; the limit stays last.
        stages.insert(2, json!({ "$project": { "f": 1 } }));
        stages
    }
}

/// Facet plus unwrap stages shared by both modes.
fn facet_tail(counters: &CounterPipelines) -> Vec<Value> {
    let mut facet = serde_json::Map::new();
    let mut unwrap = serde_json::Map::new();
    for (name, stages) in counters {
        facet.insert(name.clone(), Value::Array(stages.clone()));
        unwrap.insert(
            name.clone(),
            json!({ "$arrayElemAt": [format!("${name}"), 0] }),
        );
    }
    vec![
        json!({ "$facet": Value::Object(facet) }),
        json!({ "$project": Value::Object(unwrap) }),
    ]
}

/// Mode A stage-two pipeline: restrict to the found facts, then facet.
fn facet_stages(fact_ids: &[String], counters: &CounterPipelines) -> Vec<Value> {
    let mut stages = vec![json!({ "$match": { "_id": { "$in": fact_ids } } })];
    stages.extend(facet_tail(counters));
    stages
}

/// Pull each counter's unwrapped group document out of the facet result.
fn extract_counters(
    documents: &[Document],
    counters: &CounterPipelines,
) -> BTreeMap<String, Document> {
    let mut extracted = BTreeMap::new();
    let Some(first) = documents.first() else {
        return extracted;
    };
    for name in counters.keys() {
        match first.get_document(name) {
            Ok(document) => {
                extracted.insert(name.clone(), document.clone());
            }
            // An empty facet branch unwraps to a missing field: the counter
            // matched no documents and stays absent from the result map.
            Err(_) => {
                tracing::debug!(counter = name.as_str(), "Counter produced no group result");
            }
        }
    }
    extracted
}

#[cfg(test)]
#[path = "coordinator.test.rs"]
mod tests;
