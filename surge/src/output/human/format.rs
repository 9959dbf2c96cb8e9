use std::time::Duration;

/// Whole events per second, or `n/a` when undefined.
pub(crate) fn format_rate(v: Option<f64>) -> String {
    match v {
        Some(v) if v.is_finite() => format!("{v:.0}"),
        _ => "n/a".to_string(),
    }
}

/// Percentage with one decimal, or `n/a` when undefined.
pub(crate) fn format_pct(v: Option<f64>) -> String {
    match v {
        Some(v) if v.is_finite() => format!("{v:.1}%"),
        _ => "n/a".to_string(),
    }
}

pub(crate) fn format_count(v: Option<u64>) -> String {
    v.map_or_else(|| "n/a".to_string(), |v| v.to_string())
}

/// Seconds with two decimals.
pub(crate) fn format_secs(secs: f64) -> String {
    format!("{secs:.2}s")
}

pub(crate) fn format_duration(d: Duration) -> String {
    // Always render as a single rounded component in one of: ms, s.
    let total_ms = d.as_millis();
    if total_ms >= 1_000 {
        return format!("{:.1}s", d.as_secs_f64());
    }
    format!("{total_ms}ms")
}
