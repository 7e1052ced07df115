//! Search Fan-out (C4).

use qorch_core::{CallOutcome, SearchResult, SourceDescriptor, SourceOutcome, SourceQueryOutcome};
use qorch_resilience::{CircuitBreakerRegistry, Permit};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;

/// One item of the concatenated, source-order-preserving fan-out output.
pub struct FanoutResults {
    pub results: Vec<SearchResult>,
    pub outcomes: Vec<SourceQueryOutcome>,
}

fn is_transient(err: &qorch_core::Error) -> bool {
    matches!(
        err,
        qorch_core::Error::Timeout(_) | qorch_core::Error::Internal(_)
    )
}

/// Launches one concurrent task per source, each bound by
/// `per_source_deadline` and the overall `global_deadline`. A transient
/// per-source failure gets a single retry after a fixed 1s delay, budget
/// permitting; any other failure or a timeout yields an empty result set for
/// that source without failing the others (§4.4).
pub async fn search_all(
    query: &str,
    sources: &[(SourceDescriptor, Arc<dyn qorch_core::SourceClient>)],
    result_limit_per_source: usize,
    per_source_deadline: Duration,
    global_deadline: Duration,
    breakers: Arc<CircuitBreakerRegistry>,
) -> FanoutResults {
    let start = Instant::now();
    let remaining = |consumed: Duration| global_deadline.saturating_sub(consumed);

    let tasks = sources.iter().map(|(descriptor, client)| {
        let query = query.to_string();
        let breakers = breakers.clone();
        let descriptor = descriptor.clone();
        let client = client.clone();
        async move {
            let key = client.dependency_key().to_string();
            let permit = match breakers.check(&key) {
                Ok(permit) => permit,
                Err(_) => {
                    return (
                        Vec::new(),
                        SourceQueryOutcome {
                            name: descriptor.name.clone(),
                            outcome: SourceOutcome::CircuitOpen,
                            result_count: 0,
                        },
                    );
                }
            };

            let budget = per_source_deadline.min(remaining(start.elapsed()));
            let first = timeout(budget, client.search(&query, result_limit_per_source)).await;

            let (outcome, results) = match first {
                Ok(Ok(results)) => {
                    record_permit(&breakers, &key, permit, CallOutcome::Success);
                    (SourceOutcome::Ok, results)
                }
                Ok(Err(err)) if is_transient(&err) => {
                    record_permit(&breakers, &key, permit, CallOutcome::TransientFailure);
                    retry_once(&client, &query, result_limit_per_source, &descriptor, start, global_deadline, per_source_deadline, &breakers).await
                }
                Ok(Err(_)) => {
                    record_permit(&breakers, &key, permit, CallOutcome::PermanentFailure);
                    (SourceOutcome::Error, Vec::new())
                }
                Err(_) => {
                    record_permit(&breakers, &key, permit, CallOutcome::TransientFailure);
                    retry_once(&client, &query, result_limit_per_source, &descriptor, start, global_deadline, per_source_deadline, &breakers).await
                }
            };

            (
                results,
                SourceQueryOutcome {
                    name: descriptor.name.clone(),
                    outcome,
                    result_count: 0,
                },
            )
        }
    });

    let gathered = timeout(global_deadline, futures::future::join_all(tasks))
        .await
        .unwrap_or_default();

    let mut results = Vec::new();
    let mut outcomes = Vec::new();
    for (mut r, mut outcome) in gathered {
        outcome.result_count = r.len();
        outcomes.push(outcome);
        results.append(&mut r);
    }
    FanoutResults { results, outcomes }
}

fn record_permit(
    breakers: &CircuitBreakerRegistry,
    key: &str,
    _permit: Permit,
    outcome: CallOutcome,
) {
    breakers.record(key, outcome);
}

async fn retry_once(
    client: &Arc<dyn qorch_core::SourceClient>,
    query: &str,
    limit: usize,
    descriptor: &SourceDescriptor,
    start: Instant,
    global_deadline: Duration,
    per_source_deadline: Duration,
    breakers: &Arc<CircuitBreakerRegistry>,
) -> (SourceOutcome, Vec<qorch_core::SearchResult>) {
    let elapsed = start.elapsed();
    if elapsed >= global_deadline {
        return (SourceOutcome::Timeout, Vec::new());
    }
    tokio::time::sleep(Duration::from_secs(1).min(global_deadline - elapsed)).await;

    let elapsed = start.elapsed();
    if elapsed >= global_deadline {
        return (SourceOutcome::Timeout, Vec::new());
    }
    let budget = per_source_deadline.min(global_deadline - elapsed);
    let key = client.dependency_key().to_string();
    match timeout(budget, client.search(query, limit)).await {
        Ok(Ok(results)) => {
            breakers.record(&key, CallOutcome::Success);
            (SourceOutcome::Ok, results)
        }
        Ok(Err(_)) => {
            breakers.record(&key, CallOutcome::TransientFailure);
            (SourceOutcome::Error, Vec::new())
        }
        Err(_) => {
            breakers.record(&key, CallOutcome::TransientFailure);
            tracing::warn!(source = %descriptor.name, "source timed out on retry");
            (SourceOutcome::Timeout, Vec::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use qorch_core::{SourceCapability, SourceClient, SourceKind};
    use qorch_resilience::BreakerParams;

    struct StubSource {
        key: String,
        result: qorch_core::Result<Vec<SearchResult>>,
    }

    #[async_trait]
    impl SourceClient for StubSource {
        async fn search(&self, _query: &str, _limit: usize) -> qorch_core::Result<Vec<SearchResult>> {
            match &self.result {
                Ok(v) => Ok(v.clone()),
                Err(_) => Err(qorch_core::Error::Internal("boom".to_string())),
            }
        }
        fn dependency_key(&self) -> &str {
            &self.key
        }
    }

    fn descriptor(name: &str) -> SourceDescriptor {
        SourceDescriptor {
            name: name.to_string(),
            kind: SourceKind::InternalKb,
            capabilities: vec![SourceCapability::Hybrid],
            sla_ms: 5000,
        }
    }

    #[tokio::test]
    async fn one_failing_source_does_not_block_others() {
        let ok = SearchResult {
            source: "kb".to_string(),
            content: "hit".to_string(),
            relevance: 0.9,
            title: None,
            url: None,
            evidence_grade: None,
            external_id: None,
        };
        let sources: Vec<(SourceDescriptor, std::sync::Arc<dyn SourceClient>)> = vec![
            (
                descriptor("kb"),
                std::sync::Arc::new(StubSource {
                    key: "kb".to_string(),
                    result: Ok(vec![ok]),
                }),
            ),
            (
                descriptor("lit"),
                std::sync::Arc::new(StubSource {
                    key: "lit".to_string(),
                    result: Err(qorch_core::Error::Internal("down".to_string())),
                }),
            ),
        ];
        let breakers = Arc::new(CircuitBreakerRegistry::new(BreakerParams::default()));
        let out = search_all(
            "query",
            &sources,
            10,
            Duration::from_millis(200),
            Duration::from_secs(2),
            breakers,
        )
        .await;
        assert_eq!(out.results.len(), 1);
        assert_eq!(out.outcomes.len(), 2);
    }

    #[tokio::test]
    async fn open_circuit_is_skipped_immediately() {
        let breakers = Arc::new(CircuitBreakerRegistry::new(BreakerParams {
            failure_threshold: 1,
            ..Default::default()
        }));
        breakers.record("kb", CallOutcome::TransientFailure);
        let sources: Vec<(SourceDescriptor, std::sync::Arc<dyn SourceClient>)> = vec![(
            descriptor("kb"),
            std::sync::Arc::new(StubSource {
                key: "kb".to_string(),
                result: Ok(vec![]),
            }),
        )];
        let out = search_all(
            "query",
            &sources,
            10,
            Duration::from_millis(200),
            Duration::from_secs(2),
            breakers,
        )
        .await;
        assert_eq!(out.outcomes[0].outcome, SourceOutcome::CircuitOpen);
    }
}
