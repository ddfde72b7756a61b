use crate::infra::{build_review_service, parse_scores, ReviewService};
use clap::Args;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use study_eval::config::AppConfig;
use study_eval::error::AppError;
use study_eval::telemetry;
use study_eval::workflows::study_plan::service::ReviewAction;
use study_eval::workflows::study_plan::{
    DecisionRequest, EditedScores, EvaluationView, HitlResponse, HumanDecision, ScoreCard,
    StudyPlanState,
};

const SAMPLE_PLANS: [&str; 3] = ["green", "yellow", "red"];

#[derive(Args, Debug)]
pub(crate) struct EvaluateArgs {
    /// Study plan text file to evaluate
    #[arg(long)]
    pub(crate) plan: PathBuf,
    /// Route yellow verdicts through human review instead of a one-shot evaluation
    #[arg(long)]
    pub(crate) hitl: bool,
    /// Review decision to apply when the plan needs review (prompted when absent)
    #[arg(long, value_parser = parse_decision)]
    pub(crate) decision: Option<HumanDecision>,
    /// Replacement scores for an edit decision, as scheduling,alignment,workload
    #[arg(long, value_parser = parse_scores)]
    pub(crate) scores: Option<ScoreCard>,
    /// Reviewer note attached to the decision
    #[arg(long)]
    pub(crate) message: Option<String>,
}

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Directory holding green.txt, yellow.txt and red.txt (defaults to data/plans)
    #[arg(long)]
    pub(crate) plans_dir: Option<PathBuf>,
    /// Decision applied to plans that need review (defaults to approve)
    #[arg(long, value_parser = parse_decision)]
    pub(crate) decision: Option<HumanDecision>,
}

fn parse_decision(raw: &str) -> Result<HumanDecision, String> {
    HumanDecision::parse(raw)
        .ok_or_else(|| format!("decision must be approve, edit or reject (got '{raw}')"))
}

fn cli_service() -> Result<ReviewService, AppError> {
    let config = AppConfig::load()?;
    telemetry::init_cli(&config.telemetry)?;
    build_review_service(&config.evaluation)
}

pub(crate) fn run_evaluate(args: EvaluateArgs) -> Result<(), AppError> {
    let EvaluateArgs {
        plan,
        hitl,
        decision,
        scores,
        message,
    } = args;

    let service = cli_service()?;
    let study_plan = std::fs::read_to_string(&plan)?;

    if !hitl {
        let view = service.evaluate(&study_plan)?;
        render_view(&view);
        return Ok(());
    }

    match service.start_evaluation(&study_plan, None)? {
        HitlResponse::Complete { result, .. } => render_state(&result),
        HitlResponse::Interrupt {
            thread_id, action, ..
        } => {
            render_review_request(&action);
            let stdin = io::stdin();
            let mut input = stdin.lock();
            let decision = match decision {
                Some(decision) => decision,
                None => prompt_decision(&mut input)?,
            };
            let scores = match (decision, scores) {
                (HumanDecision::Edit, None) => Some(prompt_scores(&mut input)?),
                (_, scores) => scores,
            };

            let response = service.submit_decision(DecisionRequest {
                thread_id: thread_id.to_string(),
                decision: decision.label().to_string(),
                edited_scores: scores.map(EditedScores::from),
                message,
            })?;
            render_state(response.result());
        }
    }

    Ok(())
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        plans_dir,
        decision,
    } = args;
    let plans_dir = plans_dir.unwrap_or_else(|| PathBuf::from("data/plans"));
    let decision = decision.unwrap_or(HumanDecision::Approve);

    let service = cli_service()?;

    println!("Study plan evaluation demo");
    for name in SAMPLE_PLANS {
        let study_plan = read_sample(&plans_dir, name)?;
        println!("\n== {name} sample plan ==");
        let state = run_with_decision(&service, &study_plan, decision)?;
        println!("{}", summary_line(&state));
    }

    println!("\n== yellow sample plan, second submission ==");
    let study_plan = read_sample(&plans_dir, "yellow")?;
    let state = run_with_decision(&service, &study_plan, decision)?;
    println!("{}", summary_line(&state));

    Ok(())
}

fn read_sample(dir: &Path, name: &str) -> Result<String, AppError> {
    Ok(std::fs::read_to_string(dir.join(format!("{name}.txt")))?)
}

fn run_with_decision(
    service: &ReviewService,
    study_plan: &str,
    decision: HumanDecision,
) -> Result<StudyPlanState, AppError> {
    match service.start_evaluation(study_plan, None)? {
        HitlResponse::Complete { result, .. } => Ok(result),
        HitlResponse::Interrupt {
            thread_id, action, ..
        } => {
            render_review_request(&action);
            println!("  Applying reviewer decision: {}", decision.label());
            let edited_scores = (decision == HumanDecision::Edit).then(|| {
                let original = &action.details.evaluation_summary;
                EditedScores::from(ScoreCard::new(
                    original.scheduling_score,
                    original.alignment_score,
                    original.workload_score.saturating_add(10).min(100),
                ))
            });
            let response = service.submit_decision(DecisionRequest {
                thread_id: thread_id.to_string(),
                decision: decision.label().to_string(),
                edited_scores,
                message: None,
            })?;
            Ok(response.result().clone())
        }
    }
}

fn prompt_decision(input: &mut impl BufRead) -> Result<HumanDecision, AppError> {
    loop {
        let line = prompt(input, "Decision [approve/edit/reject]: ")?;
        match parse_decision(&line) {
            Ok(decision) => return Ok(decision),
            Err(message) => println!("  {message}"),
        }
    }
}

fn prompt_scores(input: &mut impl BufRead) -> Result<ScoreCard, AppError> {
    loop {
        let line = prompt(input, "New scores as scheduling,alignment,workload: ")?;
        match parse_scores(&line) {
            Ok(scores) => return Ok(scores),
            Err(message) => println!("  {message}"),
        }
    }
}

fn prompt(input: &mut impl BufRead, label: &str) -> Result<String, AppError> {
    print!("{label}");
    io::stdout().flush()?;
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "no reviewer input").into());
    }
    Ok(line.trim().to_string())
}

fn render_view(view: &EvaluationView) {
    println!(
        "Verdict: {} (weighted average {:.2})",
        view.color.label().to_ascii_uppercase(),
        view.weighted_avg
    );
    println!(
        "Scores: scheduling {} | alignment {} | workload {}",
        view.scores.scheduling_score, view.scores.alignment_score, view.scores.workload_score
    );
    println!("Scheduling: {}", view.reasons.scheduling);
    println!("Alignment: {}", view.reasons.alignment);
    println!("Overall: {}", view.reasons.overall);
}

fn render_review_request(action: &ReviewAction) {
    let summary = &action.details.evaluation_summary;
    println!("{}", action.description);
    println!(
        "  Weighted average {:.2}: scheduling {} | alignment {} | workload {}",
        summary.weighted_avg,
        summary.scheduling_score,
        summary.alignment_score,
        summary.workload_score
    );
    println!("  Scheduling: {}", summary.scheduling_reasoning);
    println!("  Alignment: {}", summary.alignment_reasoning);
    println!("  {}", action.details.instructions.action);
}

fn render_state(state: &StudyPlanState) {
    println!("{}", summary_line(state));
    if let Some(evaluation) = &state.final_evaluation {
        println!("Recommendation: {}", evaluation.overall_recommendation);
        println!("Reasoning: {}", evaluation.reasoning);
    }
}

fn summary_line(state: &StudyPlanState) -> String {
    let Some(evaluation) = &state.final_evaluation else {
        return "Evaluation incomplete".to_string();
    };

    let mut line = format!(
        "{} | weighted average {:.2} | scheduling {} | alignment {} | workload {}",
        evaluation.color.label().to_ascii_uppercase(),
        evaluation.weighted_avg,
        evaluation.scores.scheduling_score,
        evaluation.scores.alignment_score,
        evaluation.scores.workload_score,
    );
    if let Some(decision) = state.human_decision {
        if state.memory_used {
            line.push_str(&format!(
                " | reused '{}' from case memory ({:.2})",
                decision.label(),
                state.memory_match_score.unwrap_or_default()
            ));
        } else {
            line.push_str(&format!(" | reviewer {}", decision.past_tense()));
        }
    }
    line
}
