use crate::config::RouterSettings;
use crate::models::{Classification, CourtRegistry, CourtScore, RoutingOutcome, RoutingSignal};

/// Rank courts by total score and apply the threshold and margin rules.
///
/// Ties keep registry order, which is the configured court priority.
pub fn classify(
    signals: Vec<(String, RoutingSignal)>,
    registry: &CourtRegistry,
    settings: &RouterSettings,
) -> Classification {
    let mut ranked: Vec<CourtScore> = signals
        .into_iter()
        .map(|(court_code, signal)| CourtScore {
            total: signal.total(),
            court_code,
            signal,
        })
        .collect();
    ranked.sort_by(|a, b| {
        b.total
            .cmp(&a.total)
            .then_with(|| registry.rank(&a.court_code).cmp(&registry.rank(&b.court_code)))
            .then_with(|| a.court_code.cmp(&b.court_code))
    });

    decide(ranked, settings.routing_threshold, settings.routing_margin)
}

/// Threshold and margin rules over an already ranked list.
pub fn decide(ranked: Vec<CourtScore>, threshold: u32, required_margin: u32) -> Classification {
    let best = ranked.first().map(|s| (s.court_code.clone(), s.total));
    let second = ranked.get(1).map(|s| (s.court_code.clone(), s.total));

    let best_total = best.as_ref().map_or(0, |(_, t)| *t);
    let second_total = second.as_ref().map_or(0, |(_, t)| *t);
    let margin = best_total.saturating_sub(second_total);

    let best_label = match &best {
        Some((code, total)) => format!("{code}({total})"),
        None => "none(0)".to_string(),
    };
    let pair_label = match &second {
        Some((code, total)) => format!("best={best_label} second={code}({total}) margin={margin}"),
        None => format!("best={best_label} margin={margin}"),
    };

    let (outcome, explanation) = if best.is_none() || best_total < threshold {
        (
            RoutingOutcome::Unknown,
            format!("best={best_label} < threshold {threshold}"),
        )
    } else if margin < required_margin {
        (
            RoutingOutcome::Ambiguous,
            format!("{pair_label} < required {required_margin}"),
        )
    } else {
        (
            RoutingOutcome::Confirmed,
            format!("{pair_label} >= required {required_margin}"),
        )
    };

    Classification {
        outcome,
        ranked,
        margin,
        threshold,
        required_margin,
        explanation,
    }
}
