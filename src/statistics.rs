use crate::error::{ClientError, ClientResult};
use crate::model::TargetId;
use crate::output::DisplayItem;
use crate::registry::TargetRegistry;
use crate::style::Style;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub rate_percent: u64,
    pub passed: bool,
}

/// Success rate over the window, rounded down, and whether it reaches the
/// threshold. A zero window is rejected rather than evaluated.
pub fn classify(
    success_count: u64,
    window_size: u64,
    threshold_percent: u64,
) -> ClientResult<Classification> {
    if window_size == 0 {
        return Err(ClientError::config("window size must be greater than zero"));
    }
    let rate = u128::from(success_count) * 100 / u128::from(window_size);
    let rate_percent = u64::try_from(rate).unwrap_or(u64::MAX);
    Ok(Classification {
        rate_percent,
        passed: rate_percent >= threshold_percent,
    })
}

/// `S O - <now> - <address> - 090% in last 10 - <comment>`
pub fn statistics_line(
    classification: Classification,
    timestamp: &str,
    window_size: u64,
    address: &str,
    comment: &str,
) -> DisplayItem {
    let mark = if classification.passed { "O" } else { "X" };
    DisplayItem::styled(
        format!(
            "S {} - {} - {:>15} - {:03}% in last {} - {}",
            mark, timestamp, address, classification.rate_percent, window_size, comment
        ),
        Style::from_pass(classification.passed),
    )
}

/// Evaluator bound to one run: its window, the client threshold and the
/// run's targets.
#[derive(Debug, Clone)]
pub struct StatisticsEvaluator {
    window_size: u64,
    threshold_percent: u64,
    registry: TargetRegistry,
}

impl StatisticsEvaluator {
    pub fn new(
        window_size: u64,
        threshold_percent: u64,
        registry: TargetRegistry,
    ) -> ClientResult<Self> {
        if window_size == 0 {
            return Err(ClientError::config(
                "run reports a statistics window of zero samples",
            ));
        }
        Ok(Self {
            window_size,
            threshold_percent,
            registry,
        })
    }

    pub fn line(
        &self,
        target_id: TargetId,
        success_count: u64,
        timestamp: &str,
    ) -> ClientResult<DisplayItem> {
        let classification = classify(success_count, self.window_size, self.threshold_percent)?;
        Ok(statistics_line(
            classification,
            timestamp,
            self.window_size,
            self.registry.address(target_id),
            self.registry.comment(target_id),
        ))
    }
}

#[cfg(test)]
mod tests {
    use more_asserts::assert_ge;

    use super::*;

    #[test]
    fn seven_of_ten_fails_eighty_percent() {
        let c = classify(7, 10, 80).expect("classify");
        assert_eq!(c.rate_percent, 70);
        assert!(!c.passed);
        let item = statistics_line(c, "2024/01/01 00:00:00.000", 10, "10.0.0.1", "gateway");
        assert_eq!(
            item.text,
            "S X - 2024/01/01 00:00:00.000 -        10.0.0.1 - 070% in last 10 - gateway"
        );
        assert_eq!(item.style, Style::Failure);
    }

    #[test]
    fn rate_rounds_down() {
        assert_eq!(classify(2, 3, 0).expect("classify").rate_percent, 66);
    }

    #[test]
    fn full_window_always_passes() {
        for n in 1..=50 {
            for t in 0..=100 {
                assert!(classify(n, n, t).expect("classify").passed);
            }
        }
    }

    #[test]
    fn monotonic_in_success_count() {
        for window in 1..=20 {
            for threshold in [0, 50, 80, 100] {
                let mut previous = classify(0, window, threshold).expect("classify");
                for count in 1..=window {
                    let current = classify(count, window, threshold).expect("classify");
                    assert_ge!(current.rate_percent, previous.rate_percent);
                    assert!(current.passed || !previous.passed);
                    previous = current;
                }
            }
        }
    }

    #[test]
    fn zero_window_is_rejected() {
        assert!(classify(1, 0, 80).is_err());
        assert!(StatisticsEvaluator::new(0, 80, TargetRegistry::default()).is_err());
    }

    #[test]
    fn huge_counts_do_not_overflow() {
        let c = classify(u64::MAX, u64::MAX, 100).expect("classify");
        assert_eq!(c.rate_percent, 100);
    }
}
