//! 严重级别聚合
//!
//! 任一 critical ⇒ critical；否则任一 warning 或 unknown ⇒ warning；否则 healthy。
//! 规则与输入顺序无关，空集合视为 healthy。

use crate::health::outcome::{CheckOutcome, Severity};

/// 聚合一组严重级别
pub fn aggregate<I>(severities: I) -> Severity
where
    I: IntoIterator<Item = Severity>,
{
    let mut overall = Severity::Healthy;
    for severity in severities {
        match severity {
            Severity::Critical => return Severity::Critical,
            Severity::Warning | Severity::Unknown => overall = Severity::Warning,
            Severity::Healthy => {}
        }
    }
    overall
}

/// 聚合一组检测结果
pub fn aggregate_outcomes<'a, I>(outcomes: I) -> Severity
where
    I: IntoIterator<Item = &'a CheckOutcome>,
{
    aggregate(outcomes.into_iter().map(|o| o.severity))
}

#[cfg(test)]
mod tests {
    use super::*;
    use Severity::*;

    #[test]
    fn test_precedence() {
        assert_eq!(aggregate([Healthy, Warning]), Warning);
        assert_eq!(aggregate([Healthy, Warning, Critical]), Critical);
        assert_eq!(aggregate([Healthy]), Healthy);
        assert_eq!(aggregate([Unknown]), Warning);
        assert_eq!(aggregate([]), Healthy);
    }

    #[test]
    fn test_outcomes() {
        let outcomes = vec![
            CheckOutcome::healthy("a"),
            CheckOutcome::new(Unknown, "b"),
        ];
        assert_eq!(aggregate_outcomes(&outcomes), Warning);
    }
}
