use pidtune_backend::{History, RunSummary, Termination};

fn cell(v: f64) -> String {
    if v.is_finite() {
        format!("{:>9.2}", v)
    } else {
        format!("{:>9}", v)
    }
}

/// Console table of every iteration followed by a one-line outcome.
pub fn render(history: &History, summary: &RunSummary) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "{:>4} {:>9} {:>9} {:>9} {:>9} {:>9} {:>9} {:>9} {:>9} {:>9}\n",
        "#", "Kp", "Ti", "Td", "tr[s]", "os[%]", "ts[s]", "tr%", "os%", "ts%"
    ));
    for (i, entry) in history.iter().enumerate() {
        let p = &entry.parameters;
        let m = &entry.metrics;
        let cells = [
            p.kp,
            p.ti,
            p.td,
            m.rise_time,
            m.overshoot,
            m.settling_time,
            m.rise_time_pct,
            m.overshoot_pct,
            m.settling_time_pct,
        ]
        .map(cell);
        out.push_str(&format!("{:>4} {}", i, cells.join(" ")));
        if m.early_stop {
            out.push_str("  *");
        }
        out.push('\n');
    }

    match summary.termination {
        Termination::StoppedEarly => out.push_str("Early stop.\n"),
        Termination::ExhaustedIterations => out.push_str(&format!(
            "Iteration limit reached after {} iterations.\n",
            summary.iterations
        )),
    }
    out.push_str(&format!(
        "Final gains: {} ({} advisory calls, {} kept current gains)\n",
        summary.final_gains, summary.advisory_calls, summary.advisory_fallbacks
    ));
    out
}
