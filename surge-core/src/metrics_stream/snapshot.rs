use serde::{Deserialize, Deserializer, Serialize};

/// Cumulative counters self-reported by the system under test at one point in time.
///
/// Every field is optional: a sample that omits a counter leaves the computations that need it
/// unavailable instead of being rejected.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    #[serde(default, deserialize_with = "counter")]
    pub received_total: Option<u64>,
    #[serde(default, deserialize_with = "counter")]
    pub written_total: Option<u64>,
    #[serde(default, deserialize_with = "finite")]
    pub avg_processing_ms: Option<f64>,
    #[serde(default, deserialize_with = "gauge")]
    pub lag: Option<i64>,
    #[serde(default, alias = "ts")]
    pub timestamp: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum MalformedSnapshot {
    #[error("payload is not valid json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("payload is not a json object")]
    NotObject,
}

impl MetricsSnapshot {
    pub fn parse(data: &str) -> Result<Self, MalformedSnapshot> {
        let value: serde_json::Value = serde_json::from_str(data)?;
        if !value.is_object() {
            return Err(MalformedSnapshot::NotObject);
        }
        Ok(serde_json::from_value(value)?)
    }

    /// Events processed since `baseline`, if both samples carry the counter.
    pub fn received_since(&self, baseline: &MetricsSnapshot) -> Option<u64> {
        Some(self.received_total?.saturating_sub(baseline.received_total?))
    }

    /// Events written since `baseline`, if both samples carry the counter.
    pub fn written_since(&self, baseline: &MetricsSnapshot) -> Option<u64> {
        Some(self.written_total?.saturating_sub(baseline.written_total?))
    }
}

// Counters may be published as doubles (`1450.0`).
fn counter<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u64>, D::Error> {
    let v: Option<serde_json::Number> = Option::deserialize(d)?;
    Ok(v.and_then(|n| {
        n.as_u64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && *f >= 0.0)
                .map(|f| f as u64)
        })
    }))
}

fn gauge<'de, D: Deserializer<'de>>(d: D) -> Result<Option<i64>, D::Error> {
    let v: Option<serde_json::Number> = Option::deserialize(d)?;
    Ok(v.and_then(|n| {
        n.as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f as i64))
    }))
}

fn finite<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
    let v: Option<f64> = Option::deserialize(d)?;
    Ok(v.filter(|f| f.is_finite()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(data: &str) -> MetricsSnapshot {
        match MetricsSnapshot::parse(data) {
            Ok(s) => s,
            Err(err) => panic!("failed to parse {data}: {err}"),
        }
    }

    #[test]
    fn parses_processor_payload() {
        let s = parse(
            r#"{"receivedTotal":1450.0,"writtenTotal":1400.0,"avgProcessingMs":1.25,"lag":-1,"ts":"2024-05-01T10:00:00.000Z"}"#,
        );
        assert_eq!(s.received_total, Some(1450));
        assert_eq!(s.written_total, Some(1400));
        assert_eq!(s.avg_processing_ms, Some(1.25));
        assert_eq!(s.lag, Some(-1));
        assert_eq!(s.timestamp.as_deref(), Some("2024-05-01T10:00:00.000Z"));
    }

    #[test]
    fn integer_counters_and_timestamp_name() {
        let s = parse(r#"{"receivedTotal":10,"writtenTotal":9,"timestamp":"t"}"#);
        assert_eq!(s.received_total, Some(10));
        assert_eq!(s.written_total, Some(9));
        assert_eq!(s.timestamp.as_deref(), Some("t"));
    }

    #[test]
    fn missing_fields_stay_unavailable() {
        let s = parse(r#"{"writtenTotal":5}"#);
        assert_eq!(s.received_total, None);
        assert_eq!(s.written_total, Some(5));
        assert_eq!(s.lag, None);

        let baseline = parse(r#"{"receivedTotal":1,"writtenTotal":1}"#);
        assert_eq!(s.received_since(&baseline), None);
        assert_eq!(s.written_since(&baseline), Some(4));
    }

    #[test]
    fn rejects_non_objects() {
        assert!(matches!(
            MetricsSnapshot::parse("not-json"),
            Err(MalformedSnapshot::Json(_))
        ));
        assert!(matches!(
            MetricsSnapshot::parse("[1,2]"),
            Err(MalformedSnapshot::NotObject)
        ));
        assert!(matches!(
            MetricsSnapshot::parse(r#"{"receivedTotal":"many"}"#),
            Err(MalformedSnapshot::Json(_))
        ));
    }

    #[test]
    fn deltas_against_baseline() {
        let baseline = parse(r#"{"receivedTotal":500,"writtenTotal":480}"#);
        let later = parse(r#"{"receivedTotal":1450,"writtenTotal":1400}"#);
        assert_eq!(later.received_since(&baseline), Some(950));
        assert_eq!(later.written_since(&baseline), Some(920));

        // A counter reset upstream never yields a negative delta.
        assert_eq!(baseline.received_since(&later), Some(0));
    }
}
