use checkloop_common::{RunConfig, Verdict};

/// Outcome of the stop rule after a checker step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub should_stop: bool,
    pub success: bool,
}

impl Decision {
    pub const CONTINUE: Self = Self {
        should_stop: false,
        success: false,
    };
}

/// Apply the stop rule, in order:
///
/// 1. passed with confidence at or above the threshold and auto-stop on: stop, success
/// 2. iteration budget exhausted: stop, failure (even if the last check passed)
/// 3. otherwise continue
pub fn decide(verdict: &Verdict, current_iteration: u32, config: &RunConfig) -> Decision {
    if config.auto_stop_on_pass && verdict.meets(config.confidence_threshold) {
        return Decision {
            should_stop: true,
            success: true,
        };
    }
    if current_iteration >= config.max_iterations {
        return Decision {
            should_stop: true,
            success: false,
        };
    }
    Decision::CONTINUE
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verdict(passed: bool, confidence: f64) -> Verdict {
        Verdict {
            passed,
            confidence,
            feedback: String::new(),
            issues: vec![],
        }
    }

    fn config(max_iterations: u32, threshold: f64, auto_stop: bool) -> RunConfig {
        RunConfig {
            max_iterations,
            confidence_threshold: threshold,
            auto_stop_on_pass: auto_stop,
        }
    }

    #[test]
    fn test_confident_pass_stops_with_success() {
        let d = decide(&verdict(true, 0.9), 3, &config(20, 0.8, true));
        assert_eq!(d, Decision { should_stop: true, success: true });
    }

    #[test]
    fn test_exhausted_budget_fails_even_if_passed() {
        let d = decide(&verdict(true, 0.9), 5, &config(5, 0.8, false));
        assert_eq!(d, Decision { should_stop: true, success: false });
    }

    #[test]
    fn test_failed_check_continues_within_budget() {
        assert_eq!(decide(&verdict(false, 0.95), 2, &config(5, 0.8, true)), Decision::CONTINUE);
    }

    #[test]
    fn test_low_confidence_pass_continues() {
        assert_eq!(decide(&verdict(true, 0.5), 1, &config(5, 0.8, true)), Decision::CONTINUE);
    }

    #[test]
    fn test_threshold_is_inclusive() {
        assert!(decide(&verdict(true, 0.8), 1, &config(5, 0.8, true)).success);
    }

    #[test]
    fn test_pass_on_last_iteration_with_auto_stop_succeeds() {
        let d = decide(&verdict(true, 1.0), 5, &config(5, 0.8, true));
        assert_eq!(d, Decision { should_stop: true, success: true });
    }
}
