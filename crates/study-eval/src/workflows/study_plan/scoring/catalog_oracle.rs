use std::collections::{BTreeMap, BTreeSet};

use super::{
    extract_course_codes, OracleError, ScoringOracle, SubScore, ToolId, ToolInput, ToolOutput,
    ToolScope, WorkloadAssessment,
};

const LECTURE_CLASH_PENALTY: u32 = 15;
const EXAM_CLASH_PENALTY: u32 = 20;
const CROWDED_EXAM_DAY_PENALTY: u32 = 10;
const MISSING_TIMETABLE_PENALTY: u32 = 5;
const CROWDED_EXAM_DAY_LIMIT: usize = 2;

const UNDECLARED_PROGRAM_BASE: u32 = 60;
const UNKNOWN_COURSE_PENALTY: u32 = 10;
const MISSING_DESCRIPTION_PENALTY: u32 = 5;

/// Deterministic oracle that scores a plan from the reference timetables and
/// course catalog alone.
#[derive(Debug, Clone, Copy, Default)]
pub struct CatalogOracle;

impl CatalogOracle {
    pub fn new() -> Self {
        Self
    }

    fn courses(stage: &'static str, study_plan: &str) -> Result<Vec<String>, OracleError> {
        let codes = extract_course_codes(study_plan);
        if codes.is_empty() {
            return Err(OracleError::Unscorable {
                stage,
                reason: "no course codes found in the study plan".to_string(),
            });
        }
        Ok(codes)
    }
}

fn declared_program(study_plan: &str) -> Option<String> {
    study_plan.lines().find_map(|line| {
        let line = line.trim();
        let (label, value) = line.split_once(':')?;
        let label = label.trim();
        let is_program = label.eq_ignore_ascii_case("major") || label.eq_ignore_ascii_case("program");
        let value = value.trim();
        (is_program && !value.is_empty()).then(|| value.to_string())
    })
}

fn departments_match(program: &str, department: &str) -> bool {
    let program = program.to_ascii_lowercase();
    let department = department.to_ascii_lowercase();
    !department.is_empty() && (program.contains(&department) || department.contains(&program))
}

fn clamp_score(score: i64) -> u8 {
    // Bounded to 0..=100 before narrowing.
    score.clamp(0, 100) as u8
}

impl ScoringOracle for CatalogOracle {
    fn evaluate_scheduling(
        &self,
        study_plan: &str,
        tools: &ToolScope<'_>,
    ) -> Result<SubScore, OracleError> {
        let courses = Self::courses("scheduling", study_plan)?;

        let mut lecture_slots: BTreeMap<(String, String), BTreeSet<String>> = BTreeMap::new();
        let mut exam_slots: BTreeMap<(String, String), BTreeSet<String>> = BTreeMap::new();
        let mut exams_per_day: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        let mut unscheduled = Vec::new();

        for course in &courses {
            let query = format!("course_id == '{course}'");
            let lectures = tools.query(ToolId::LecturesQuery, query.as_str())?;
            let exams = tools.query(ToolId::ExamsQuery, query)?;

            if lectures.is_failed() || exams.is_failed() {
                tracing::debug!(%course, "timetable lookup failed");
            }
            if lectures.rows().is_empty() && exams.rows().is_empty() {
                unscheduled.push(course.clone());
                continue;
            }

            for row in lectures.rows() {
                let day = lectures.value(row, "day").unwrap_or_default().to_string();
                let slot = lectures.value(row, "slot").unwrap_or_default().to_string();
                lecture_slots
                    .entry((day, slot))
                    .or_default()
                    .insert(course.clone());
            }
            for row in exams.rows() {
                let date = exams.value(row, "date").unwrap_or_default().to_string();
                let slot = exams.value(row, "slot").unwrap_or_default().to_string();
                exams_per_day
                    .entry(date.clone())
                    .or_default()
                    .insert(course.clone());
                exam_slots
                    .entry((date, slot))
                    .or_default()
                    .insert(course.clone());
            }
        }

        let mut penalty = 0u32;
        let mut findings = Vec::new();

        for ((day, slot), clashing) in lecture_slots.iter().filter(|(_, c)| c.len() > 1) {
            penalty += LECTURE_CLASH_PENALTY * (clashing.len() as u32 - 1);
            findings.push(format!(
                "lecture clash on {day} slot {slot}: {}",
                clashing.iter().cloned().collect::<Vec<_>>().join(", ")
            ));
        }
        for ((date, slot), clashing) in exam_slots.iter().filter(|(_, c)| c.len() > 1) {
            penalty += EXAM_CLASH_PENALTY * (clashing.len() as u32 - 1);
            findings.push(format!(
                "exam clash on {date} slot {slot}: {}",
                clashing.iter().cloned().collect::<Vec<_>>().join(", ")
            ));
        }
        for (date, examined) in exams_per_day
            .iter()
            .filter(|(_, e)| e.len() > CROWDED_EXAM_DAY_LIMIT)
        {
            penalty += CROWDED_EXAM_DAY_PENALTY;
            findings.push(format!("{} exams on {date}", examined.len()));
        }
        if !unscheduled.is_empty() {
            penalty += MISSING_TIMETABLE_PENALTY * unscheduled.len() as u32;
            findings.push(format!("not in the timetable: {}", unscheduled.join(", ")));
        }

        let score = clamp_score(100 - i64::from(penalty));
        let reasoning = if findings.is_empty() {
            format!(
                "No lecture or exam conflicts across {} courses.",
                courses.len()
            )
        } else {
            format!("{}.", findings.join("; "))
        };

        Ok(SubScore { score, reasoning })
    }

    fn evaluate_alignment(
        &self,
        study_plan: &str,
        tools: &ToolScope<'_>,
    ) -> Result<SubScore, OracleError> {
        let courses = Self::courses("alignment", study_plan)?;
        let program = declared_program(study_plan);

        let mut matching = Vec::new();
        let mut off_program = Vec::new();
        let mut unknown = Vec::new();
        let mut undescribed = 0u32;

        for course in &courses {
            let query = format!("course_id == '{course}'");
            let masterlist = tools.query(ToolId::CourseMasterlistQuery, query.as_str())?;
            let Some(row) = masterlist.rows().first() else {
                unknown.push(course.clone());
                continue;
            };
            let department = masterlist.value(row, "Department").unwrap_or_default();

            match &program {
                Some(program) if departments_match(program, department) => {
                    matching.push(course.clone())
                }
                _ => off_program.push(format!("{course} ({department})")),
            }

            let description = tools.query(ToolId::CourseDescriptionQuery, query)?;
            let described = description
                .rows()
                .first()
                .and_then(|row| description.value(row, "Description"))
                .is_some_and(|text| !text.is_empty());
            if !described {
                undescribed += 1;
            }
        }

        let known = matching.len() + off_program.len();
        let base = match (&program, known) {
            (None, _) => i64::from(UNDECLARED_PROGRAM_BASE),
            (Some(_), 0) => 0,
            (Some(_), known) => 40 + (60 * matching.len() as i64) / known as i64,
        };
        let penalty = UNKNOWN_COURSE_PENALTY * unknown.len() as u32
            + MISSING_DESCRIPTION_PENALTY * undescribed;
        let score = clamp_score(base - i64::from(penalty));

        let mut findings = Vec::new();
        match &program {
            Some(program) => findings.push(format!(
                "{} of {known} catalogued courses belong to {program}",
                matching.len()
            )),
            None => findings.push("no major or program declared".to_string()),
        }
        if !off_program.is_empty() && program.is_some() {
            findings.push(format!("outside the program: {}", off_program.join(", ")));
        }
        if !unknown.is_empty() {
            findings.push(format!("not in the course catalog: {}", unknown.join(", ")));
        }
        if undescribed > 0 {
            findings.push(format!("{undescribed} courses lack a description"));
        }

        Ok(SubScore {
            score,
            reasoning: format!("{}.", findings.join("; ")),
        })
    }

    fn evaluate_workload(
        &self,
        study_plan: &str,
        tools: &ToolScope<'_>,
    ) -> Result<WorkloadAssessment, OracleError> {
        let courses = Self::courses("workload", study_plan)?;
        let num_courses = courses.len() as u32;

        match tools.invoke(ToolId::WorkloadScore, ToolInput::CourseCount(num_courses))? {
            ToolOutput::Workload(workload_score) => Ok(WorkloadAssessment {
                workload_score,
                num_courses,
            }),
            other => Err(OracleError::Unscorable {
                stage: "workload",
                reason: format!("unexpected workload tool output {other:?}"),
            }),
        }
    }
}
