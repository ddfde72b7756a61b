use serde::{Deserialize, Serialize};

use super::super::domain::{Color, ScoreCard};

const RED_CEILING: f64 = 45.0;
const YELLOW_CEILING: f64 = 75.0;

/// Relative contribution of each component score to the weighted average.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Weights {
    pub scheduling: f64,
    pub alignment: f64,
    pub workload: f64,
}

impl Weights {
    /// Workload-dominant weighting used for every verdict.
    pub const CANONICAL: Weights = Weights {
        scheduling: 0.25,
        alignment: 0.25,
        workload: 0.5,
    };

    pub fn average(&self, scores: &ScoreCard) -> f64 {
        self.scheduling * f64::from(scores.scheduling_score)
            + self.alignment * f64::from(scores.alignment_score)
            + self.workload * f64::from(scores.workload_score)
    }
}

impl Default for Weights {
    fn default() -> Self {
        Self::CANONICAL
    }
}

/// Weighted average (rounded to 2 decimals) and the verdict band it falls in.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub weighted_avg: f64,
    pub color: Color,
    pub scores: ScoreCard,
}

/// Band an unrounded average: `<= 45` red, `<= 75` yellow, above that green.
pub fn color_for_average(average: f64) -> Color {
    if average <= RED_CEILING {
        Color::Red
    } else if average <= YELLOW_CEILING {
        Color::Yellow
    } else {
        Color::Green
    }
}

pub fn classify(scores: ScoreCard) -> Classification {
    classify_with(&Weights::CANONICAL, scores)
}

pub fn classify_with(weights: &Weights, scores: ScoreCard) -> Classification {
    let average = weights.average(&scores);
    Classification {
        weighted_avg: round_to_cents(average),
        color: color_for_average(average),
        scores,
    }
}

fn round_to_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn band_edges_use_inclusive_ceilings() {
        assert_eq!(color_for_average(45.0), Color::Red);
        assert_eq!(color_for_average(45.01), Color::Yellow);
        assert_eq!(color_for_average(75.0), Color::Yellow);
        assert_eq!(color_for_average(75.01), Color::Green);
        assert_eq!(color_for_average(0.0), Color::Red);
        assert_eq!(color_for_average(100.0), Color::Green);
    }

    #[test]
    fn workload_carries_half_the_weight() {
        let result = classify(ScoreCard::new(40, 60, 80));
        assert_eq!(result.weighted_avg, 65.0);
        assert_eq!(result.color, Color::Yellow);

        let result = classify(ScoreCard::new(45, 45, 45));
        assert_eq!(result.weighted_avg, 45.0);
        assert_eq!(result.color, Color::Red);

        let result = classify(ScoreCard::new(46, 45, 45));
        assert_eq!(result.weighted_avg, 45.25);
        assert_eq!(result.color, Color::Yellow);
    }

    #[test]
    fn alternate_weights_can_be_supplied() {
        let weights = Weights {
            scheduling: 0.4,
            alignment: 0.4,
            workload: 0.2,
        };
        let result = classify_with(&weights, ScoreCard::new(33, 33, 34));
        assert_eq!(result.weighted_avg, 33.2);
        assert_eq!(result.color, Color::Red);
    }

    #[test]
    fn reported_average_is_rounded_but_banding_is_not() {
        let thirds = Weights {
            scheduling: 1.0 / 3.0,
            alignment: 1.0 / 3.0,
            workload: 1.0 / 3.0,
        };
        let result = classify_with(&thirds, ScoreCard::new(10, 10, 11));
        assert_eq!(result.weighted_avg, 10.33);

        let result = classify_with(&thirds, ScoreCard::new(45, 45, 46));
        assert_eq!(result.weighted_avg, 45.33);
        assert_eq!(result.color, Color::Yellow);
    }

    #[test]
    fn classification_is_deterministic_across_the_grid() {
        for scheduling in (0..=100).step_by(5) {
            for alignment in (0..=100).step_by(5) {
                for workload in (0..=100).step_by(5) {
                    let scores = ScoreCard::new(scheduling, alignment, workload);
                    let first = classify(scores);
                    assert_eq!(first, classify(scores));
                    assert!((0.0..=100.0).contains(&first.weighted_avg));
                }
            }
        }
    }
}
