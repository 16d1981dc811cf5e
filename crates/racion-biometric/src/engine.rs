//! 1:N identification over the device worker.

use racion_core::Identity;
use racion_core::constants::DEFAULT_VERIFY_THRESHOLD;
use racion_hardware::DeviceWorker;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Outcome of an identification pass. Derived, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentificationResult {
    /// Best-scoring identity, at or above the threshold.
    Identified { identity: Identity, score: i32 },
    /// No enrolled template scored at or above the threshold.
    NoMatch,
}

impl IdentificationResult {
    pub fn identity(&self) -> Option<&Identity> {
        match self {
            IdentificationResult::Identified { identity, .. } => Some(identity),
            IdentificationResult::NoMatch => None,
        }
    }
}

/// Running maximum over scored candidates.
///
/// Negative scores (failed matches) are ignored and the first identity to
/// reach a score keeps it on ties.
#[derive(Debug, Default)]
struct BestMatch {
    best: Option<(Identity, i32)>,
    scored: usize,
}

impl BestMatch {
    fn consider(&mut self, identity: &Identity, score: i32) {
        if score < 0 {
            return;
        }
        self.scored += 1;
        match &self.best {
            Some((_, best)) if score <= *best => {}
            _ => self.best = Some((identity.clone(), score)),
        }
    }

    fn finish(self, threshold: i32) -> IdentificationResult {
        match self.best {
            Some((identity, score)) if score >= threshold => {
                IdentificationResult::Identified { identity, score }
            }
            best => {
                debug!(
                    best_score = best.map(|(_, score)| score),
                    threshold, "No template above threshold"
                );
                IdentificationResult::NoMatch
            }
        }
    }
}

/// Pick the best identity from already computed scores.
///
/// Candidates are considered in iteration order: the first identity to reach
/// the maximum wins ties, negative scores are skipped, and the winner must
/// score at least `threshold`.
///
/// # Examples
///
/// ```
/// use racion_biometric::{IdentificationResult, best_match};
/// use racion_core::Identity;
///
/// let a = Identity::new("A").unwrap();
/// let b = Identity::new("B").unwrap();
///
/// let result = best_match([(a.clone(), 80), (b, 40)], 60);
/// assert_eq!(result, IdentificationResult::Identified { identity: a, score: 80 });
/// ```
pub fn best_match<I>(scores: I, threshold: i32) -> IdentificationResult
where
    I: IntoIterator<Item = (Identity, i32)>,
{
    let mut best = BestMatch::default();
    for (identity, score) in scores {
        best.consider(&identity, score);
    }
    best.finish(threshold)
}

/// Resolves a live capture to an enrolled identity.
///
/// Every comparison is a match command routed through the shared
/// [`DeviceWorker`]; the engine never touches the SDK. Other callers'
/// commands interleave with the scan in FIFO order.
#[derive(Debug, Clone)]
pub struct IdentificationEngine {
    worker: Arc<DeviceWorker>,
}

impl IdentificationEngine {
    pub fn new(worker: Arc<DeviceWorker>) -> Self {
        Self { worker }
    }

    /// The worker this engine scores through.
    pub fn worker(&self) -> &Arc<DeviceWorker> {
        &self.worker
    }

    /// Identify on the calling thread, blocking on each match.
    ///
    /// # Panics
    ///
    /// Panics if called from within an async runtime; use
    /// [`identify_async`](Self::identify_async) there.
    pub fn identify(
        &self,
        live_template: &[u8],
        templates: &BTreeMap<Identity, Arc<[u8]>>,
        threshold: i32,
    ) -> IdentificationResult {
        let live: Arc<[u8]> = Arc::from(live_template);
        let mut best = BestMatch::default();

        for (identity, stored) in templates {
            let score = self
                .worker
                .match_blocking(Arc::clone(&live), Arc::clone(stored));
            best.consider(identity, score);
        }

        self.report(best, templates.len(), threshold)
    }

    /// Identify from async code, awaiting each match in turn.
    pub async fn identify_async(
        &self,
        live_template: &[u8],
        templates: &BTreeMap<Identity, Arc<[u8]>>,
        threshold: i32,
    ) -> IdentificationResult {
        let live: Arc<[u8]> = Arc::from(live_template);
        let mut best = BestMatch::default();

        for (identity, stored) in templates {
            let score = self
                .worker
                .submit_match(Arc::clone(&live), Arc::clone(stored))
                .await;
            best.consider(identity, score);
        }

        self.report(best, templates.len(), threshold)
    }

    /// 1:1 check of a live capture against one stored template.
    pub async fn verify(&self, live_template: &[u8], stored: Arc<[u8]>) -> bool {
        let score = self
            .worker
            .submit_match(Arc::<[u8]>::from(live_template), stored)
            .await;
        score >= DEFAULT_VERIFY_THRESHOLD
    }

    fn report(&self, best: BestMatch, candidates: usize, threshold: i32) -> IdentificationResult {
        let scored = best.scored;
        let result = best.finish(threshold);
        if let IdentificationResult::Identified { identity, score } = &result {
            info!(%identity, score, candidates, "Identified");
        } else {
            debug!(candidates, scored, "Identification found no match");
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;
    use racion_hardware::WorkerConfig;
    use racion_hardware::mock::{MockSensor, MockSensorHandle};

    fn id(s: &str) -> Identity {
        Identity::new(s).unwrap()
    }

    fn templates(entries: &[(&str, u8)]) -> BTreeMap<Identity, Arc<[u8]>> {
        entries
            .iter()
            .map(|(name, byte)| (id(name), Arc::from(vec![*byte])))
            .collect()
    }

    /// Mock whose score for a stored template is its first byte.
    fn engine() -> (IdentificationEngine, MockSensorHandle) {
        let (_sensor, handle) = MockSensor::new();
        handle.set_scorer(|_, stored| i32::from(stored[0]));
        let sensor_handle = handle.clone();
        let worker = Arc::new(DeviceWorker::new(WorkerConfig::default(), move || {
            sensor_handle.sensor()
        }));
        worker.start().unwrap();
        (IdentificationEngine::new(worker), handle)
    }

    #[rstest]
    #[case::above(60, Some(("A", 80)))]
    #[case::at_threshold(80, Some(("A", 80)))]
    #[case::below(90, None)]
    fn test_identify_threshold(#[case] threshold: i32, #[case] expected: Option<(&str, i32)>) {
        let (engine, handle) = engine();
        let cache = templates(&[("A", 80), ("B", 40)]);

        let expected = match expected {
            Some((identity, score)) => IdentificationResult::Identified {
                identity: id(identity),
                score,
            },
            None => IdentificationResult::NoMatch,
        };
        assert_eq!(engine.identify(&[1], &cache, threshold), expected);
        assert_eq!(handle.match_count(), 2);
    }

    #[test]
    fn test_identify_empty_cache() {
        let (engine, handle) = engine();
        assert_eq!(
            engine.identify(&[1], &BTreeMap::new(), 0),
            IdentificationResult::NoMatch
        );
        assert_eq!(handle.match_count(), 0);
    }

    #[test]
    fn test_identify_scans_in_identity_order() {
        let (engine, handle) = engine();
        let cache = templates(&[("C", 3), ("A", 1), ("B", 2)]);

        engine.identify(&[9], &cache, 0);

        let stored: Vec<u8> = handle.match_calls().iter().map(|(_, s)| s[0]).collect();
        assert_eq!(stored, vec![1, 2, 3]);
    }

    #[test]
    fn test_degraded_worker_never_identifies() {
        let (_sensor, handle) = MockSensor::new();
        handle.fail_open(racion_hardware::InitError::device_not_found("usb"));
        let sensor_handle = handle.clone();
        let worker = Arc::new(DeviceWorker::new(WorkerConfig::default(), move || {
            sensor_handle.sensor()
        }));
        assert!(worker.start().is_err());

        let engine = IdentificationEngine::new(worker);
        let cache = templates(&[("A", 100)]);
        assert_eq!(engine.identify(&[1], &cache, 0), IdentificationResult::NoMatch);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_identify_async_matches_blocking() {
        let (engine, _handle) = engine();
        let cache = templates(&[("A", 80), ("B", 40)]);

        let result = engine.identify_async(&[1], &cache, 60).await;
        assert_eq!(result.identity(), Some(&id("A")));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_verify_uses_stricter_threshold() {
        let (engine, _handle) = engine();
        assert!(engine.verify(&[1], Arc::from(vec![65u8])).await);
        assert!(!engine.verify(&[1], Arc::from(vec![64u8])).await);
    }

    #[test]
    fn test_negative_scores_are_skipped() {
        let result = best_match([(id("A"), -1), (id("B"), 0)], 0);
        assert_eq!(
            result,
            IdentificationResult::Identified {
                identity: id("B"),
                score: 0
            }
        );
        assert_eq!(best_match([(id("A"), -1)], -5), IdentificationResult::NoMatch);
    }

    #[test]
    fn test_tie_goes_to_first_seen() {
        let result = best_match([(id("A"), 70), (id("B"), 70)], 60);
        assert_eq!(result.identity(), Some(&id("A")));
    }

    proptest! {
        #[test]
        fn prop_best_match_is_first_maximum(
            scores in proptest::collection::vec(-1i32..=100, 0..20),
            threshold in 0i32..=100,
        ) {
            let candidates: Vec<(Identity, i32)> = scores
                .iter()
                .enumerate()
                .map(|(i, &s)| (Identity::new(&format!("ID{i:03}")).unwrap(), s))
                .collect();

            let result = best_match(candidates.clone(), threshold);

            let max = scores.iter().copied().filter(|s| *s >= 0).max();
            match max {
                Some(max) if max >= threshold => {
                    let first = scores.iter().position(|&s| s == max).unwrap();
                    prop_assert_eq!(
                        result,
                        IdentificationResult::Identified {
                            identity: candidates[first].0.clone(),
                            score: max,
                        }
                    );
                }
                _ => prop_assert_eq!(result, IdentificationResult::NoMatch),
            }
        }
    }
}
