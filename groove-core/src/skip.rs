use serde::Serialize;

/// How many skip votes evict the playing item, given the current member count.
/// Never below one, so an empty room can't skip on its own.
pub fn skip_threshold(member_count: usize, ratio: f32) -> usize {
    let threshold = (member_count as f64 * ratio as f64).ceil() as usize;
    threshold.max(1)
}

/// The result of evaluating skip votes on the playing item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkipDecision {
    pub count: usize,
    pub threshold: usize,
    pub skipped: bool,
}

impl SkipDecision {
    pub fn evaluate(count: usize, member_count: usize, ratio: f32) -> Self {
        let threshold = skip_threshold(member_count, ratio);

        Self {
            count,
            threshold,
            skipped: count >= threshold,
        }
    }
}

#[cfg(test)]
mod test {
    use super::{skip_threshold, SkipDecision};

    #[test]
    fn threshold_is_half_rounded_up() {
        assert_eq!(skip_threshold(4, 0.5), 2);
        assert_eq!(skip_threshold(5, 0.5), 3);
        assert_eq!(skip_threshold(1, 0.5), 1);
        assert_eq!(skip_threshold(0, 0.5), 1);
    }

    #[test]
    fn four_members_need_two_skips() {
        assert!(!SkipDecision::evaluate(1, 4, 0.5).skipped);
        assert_eq!(
            SkipDecision::evaluate(2, 4, 0.5),
            SkipDecision {
                count: 2,
                threshold: 2,
                skipped: true
            }
        );
    }
}
