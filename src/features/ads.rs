use std::collections::{HashSet, VecDeque};

use chrono::{DateTime, Utc};

use crate::types::ad::{AdMarker, AdMarkerKind};
use crate::types::telemetry::AdSignal;

type MarkerKey = (DateTime<Utc>, AdMarkerKind);

/// Turns signaling tags into markers, one per transition. The collector
/// re-reports tags on every manifest refresh, so repeats are dropped.
#[derive(Debug, Clone, Default)]
pub struct AdDetector {
    seen: HashSet<MarkerKey>,
    order: VecDeque<MarkerKey>,
}

impl AdDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn detect(&mut self, signal: AdSignal) -> Option<AdMarker> {
        let key = (signal.timestamp, signal.kind);
        if !self.seen.insert(key) {
            return None;
        }
        self.order.push_back(key);
        Some(AdMarker {
            stream_id: signal.stream_id,
            timestamp: signal.timestamp,
            kind: signal.kind,
            duration: signal.duration,
            metadata: signal.metadata,
        })
    }

    /// Forget keys older than `cutoff`, matching marker retention.
    pub fn prune_before(&mut self, cutoff: DateTime<Utc>) {
        while self.order.front().is_some_and(|(at, _)| *at < cutoff) {
            if let Some(key) = self.order.pop_front() {
                self.seen.remove(&key);
            }
        }
    }

    pub fn remembered(&self) -> usize {
        self.seen.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ad::{AdMetadata, SpliceDirection};
    use chrono::Duration;

    fn signal(kind: AdMarkerKind, at: DateTime<Utc>) -> AdSignal {
        AdSignal {
            stream_id: "s1".into(),
            timestamp: at,
            kind,
            duration: Some(30.0),
            metadata: AdMetadata {
                direction: Some(SpliceDirection::Out),
                ..AdMetadata::default()
            },
        }
    }

    #[test]
    fn repeated_signal_yields_one_marker() {
        let mut detector = AdDetector::new();
        let at = Utc::now();
        assert!(detector.detect(signal(AdMarkerKind::SpliceNull, at)).is_some());
        assert!(detector.detect(signal(AdMarkerKind::SpliceNull, at)).is_none());
        // Same instant, different kind is a separate transition.
        assert!(detector.detect(signal(AdMarkerKind::AdInsertion, at)).is_some());
        assert_eq!(detector.remembered(), 2);
    }

    #[test]
    fn pruned_keys_are_forgotten() {
        let mut detector = AdDetector::new();
        let at = Utc::now();
        detector.detect(signal(AdMarkerKind::SpliceNull, at));
        detector.detect(signal(AdMarkerKind::SpliceNull, at + Duration::seconds(60)));
        detector.prune_before(at + Duration::seconds(1));
        assert_eq!(detector.remembered(), 1);
        assert!(detector.detect(signal(AdMarkerKind::SpliceNull, at)).is_some());
    }
}
