use std::fmt::Write as _;

use super::domain::{
    Color, DecisionSource, HumanDecision, ScoreCard, StudyPlanEvaluation, StudyPlanState,
};
use super::scoring::Weights;

pub const DEFAULT_REJECTION_NOTE: &str = "Study plan requires major revisions.";

pub fn overall_recommendation(color: Color) -> &'static str {
    match color {
        Color::Green => "Approve: the plan is well balanced and can proceed as submitted.",
        Color::Yellow => {
            "Review: the plan is workable but has issues an advisor should confirm before approval."
        }
        Color::Red => "Revise: the plan has significant problems and should not be approved as is.",
    }
}

/// Final evaluation for `state`, scored with `scores` and verdict `color`.
///
/// The reasoning discloses who decided the verdict: nobody (automated), a live
/// reviewer, or a decision reused from case memory.
pub fn compose(
    state: &StudyPlanState,
    weighted_avg: f64,
    color: Color,
    scores: ScoreCard,
) -> StudyPlanEvaluation {
    let mut reasoning = analysis(state, weighted_avg, color, scores);

    match (state.human_decision, state.human_decision_source) {
        (Some(decision), Some(DecisionSource::Memory)) => {
            let _ = write!(
                reasoning,
                " No new review was requested: a '{}' decision was reused from case memory entry {} (similarity {:.2}).",
                decision.label(),
                state.memory_match_id.as_deref().unwrap_or("unknown"),
                state.memory_match_score.unwrap_or_default(),
            );
            reasoning.push(' ');
            reasoning.push_str(&decision_effect(state, decision, weighted_avg, scores));
        }
        (Some(decision), _) => {
            let _ = write!(
                reasoning,
                " This evaluation includes human review: the reviewer {} the automated assessment.",
                decision.past_tense(),
            );
            reasoning.push(' ');
            reasoning.push_str(&decision_effect(state, decision, weighted_avg, scores));
            if let Some(note) = state.reviewer_note.as_deref() {
                let _ = write!(reasoning, " Reviewer note: {note}");
            }
        }
        (None, _) => {
            reasoning.push_str(" The verdict was reached automatically without human review.");
        }
    }

    StudyPlanEvaluation {
        weighted_avg,
        color,
        overall_recommendation: overall_recommendation(color).to_string(),
        reasoning,
        scores,
    }
}

fn analysis(state: &StudyPlanState, weighted_avg: f64, color: Color, scores: ScoreCard) -> String {
    let weights = Weights::CANONICAL;
    let mut text = format!(
        "Weighted average {weighted_avg:.2} (scheduling {:.0}%, alignment {:.0}%, workload {:.0}%) places the plan in the {} band.",
        weights.scheduling * 100.0,
        weights.alignment * 100.0,
        weights.workload * 100.0,
        color.label().to_ascii_uppercase(),
    );
    let _ = write!(
        text,
        " Scheduling {}/100: {}",
        scores.scheduling_score,
        state.scheduling_reasoning.as_deref().unwrap_or("N/A"),
    );
    let _ = write!(
        text,
        " Alignment {}/100: {}",
        scores.alignment_score,
        state.alignment_reasoning.as_deref().unwrap_or("N/A"),
    );
    match state.num_courses {
        Some(count) => {
            let _ = write!(text, " Workload {}/100 for {count} courses.", scores.workload_score);
        }
        None => {
            let _ = write!(text, " Workload {}/100.", scores.workload_score);
        }
    }
    text
}

fn decision_effect(
    state: &StudyPlanState,
    decision: HumanDecision,
    weighted_avg: f64,
    scores: ScoreCard,
) -> String {
    match decision {
        HumanDecision::Approve => "Scores and verdict are unchanged.".to_string(),
        HumanDecision::Edit => match state.stage_scores() {
            Some(original) => format!(
                "Scores were adjusted from scheduling {}, alignment {}, workload {} to scheduling {}, alignment {}, workload {} and the verdict was recomputed.",
                original.scheduling_score,
                original.alignment_score,
                original.workload_score,
                scores.scheduling_score,
                scores.alignment_score,
                scores.workload_score,
            ),
            None => "Scores were replaced and the verdict was recomputed.".to_string(),
        },
        HumanDecision::Reject => format!(
            "The plan was rejected, so the color is RED regardless of the weighted average of {weighted_avg:.2}."
        ),
    }
}
