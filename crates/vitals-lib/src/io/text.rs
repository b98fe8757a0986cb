use anyhow::{Context, Result};
use std::path::Path;

/// Parse a newline-delimited series. `#` lines are comments; `nan` or an
/// empty line inside the data marks a gap. Trailing blank lines are ignored.
pub fn parse_f64_series(text: &str) -> Result<Vec<f64>> {
    let mut out = Vec::new();
    let mut pending_gaps = 0usize;
    for (idx, line) in text.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.starts_with('#') {
            continue;
        }
        if trimmed.is_empty() {
            if !out.is_empty() {
                pending_gaps += 1;
            }
            continue;
        }
        let val: f64 = trimmed
            .parse()
            .with_context(|| format!("line {} is not f64: {}", idx + 1, trimmed))?;
        out.extend(std::iter::repeat(f64::NAN).take(pending_gaps));
        pending_gaps = 0;
        out.push(val);
    }
    if !out.iter().any(|v| v.is_finite()) {
        anyhow::bail!("no numeric samples found");
    }
    Ok(out)
}

pub fn read_f64_series(path: &Path) -> Result<Vec<f64>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    parse_f64_series(&text)
}

/// Parse newline-delimited sample indices, e.g. beat annotations.
pub fn parse_event_indices(text: &str) -> Result<Vec<usize>> {
    let mut out = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let val: usize = trimmed
            .parse()
            .with_context(|| format!("line {} is not an integer index: {}", idx + 1, trimmed))?;
        out.push(val);
    }
    if out.is_empty() {
        anyhow::bail!("no annotation indices found");
    }
    Ok(out)
}

pub fn read_event_indices(path: &Path) -> Result<Vec<usize>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    parse_event_indices(&text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gaps_and_comments() {
        let series = parse_f64_series("# ecg lead II\n0.1\nnan\n0.3\n\n0.5\n\n\n").unwrap();
        assert_eq!(series.len(), 5);
        assert_eq!(series[0], 0.1);
        assert!(series[1].is_nan());
        assert!(series[3].is_nan());
        assert_eq!(series[4], 0.5);
    }

    #[test]
    fn rejects_garbage_and_empty_input() {
        let err = parse_f64_series("1.0\nabc\n").unwrap_err();
        assert!(err.to_string().contains("line 2"));
        assert!(parse_f64_series("# nothing\n\n").is_err());
        assert!(parse_f64_series("nan\nnan\n").is_err());
    }

    #[test]
    fn annotation_indices() {
        assert_eq!(parse_event_indices("# beats\n10\n 250 \n").unwrap(), vec![10, 250]);
        assert!(parse_event_indices("1.5\n").is_err());
    }
}
