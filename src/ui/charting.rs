/// One point per second of the run, starting at second 1.
pub fn wpm_points(wpm_history: &[f64]) -> Vec<(f64, f64)> {
    wpm_history
        .iter()
        .enumerate()
        .map(|(i, wpm)| ((i + 1) as f64, *wpm))
        .collect()
}

/// Compute X (seconds) and Y (WPM) bounds for the results chart
pub fn compute_chart_params(wpm_coords: &[(f64, f64)]) -> (f64, f64) {
    let highest_wpm = wpm_coords
        .iter()
        .map(|&(_, wpm)| wpm)
        .fold(0.0, f64::max);

    let overall_duration = wpm_coords.last().map_or(1.0, |p| p.0).max(1.0);

    (overall_duration, highest_wpm.round())
}

/// Format a simple numeric label consistently
pub fn format_label(val: f64) -> String {
    if (val - val.round()).abs() < f64::EPSILON {
        format!("{}", val.round())
    } else {
        format!("{val:.2}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compute_chart_params_empty() {
        let (x, y) = compute_chart_params(&[]);
        assert_eq!(x, 1.0);
        assert_eq!(y, 0.0);
    }

    #[test]
    fn test_compute_chart_params_uses_peak() {
        let points = wpm_points(&[20.0, 64.6, 41.0]);
        assert_eq!(points[0], (1.0, 20.0));
        assert_eq!(compute_chart_params(&points), (3.0, 65.0));
    }

    #[test]
    fn test_format_label() {
        assert_eq!(format_label(1.0), "1");
        assert_eq!(format_label(1.2345), "1.23");
    }
}
