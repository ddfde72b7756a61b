use std::collections::BTreeSet;
use std::sync::OnceLock;

use regex::Regex;

/// Score for a plan carrying `num_courses` courses.
///
/// Six or fewer courses is a light load (80), seven to ten is moderate (60),
/// anything above ten is heavy (30).
pub const fn workload_score(num_courses: u32) -> u8 {
    match num_courses {
        0..=6 => 80,
        7..=10 => 60,
        _ => 30,
    }
}

const TERM_WORDS: &[&str] = &[
    "FALL", "SPRING", "SUMMER", "WINTER", "TERM", "YEAR", "WEEK", "ROOM", "SEM", "WS", "SS",
];

fn course_code_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\b([A-Z]{2,5})[ -]?(\d{3,4}[A-Z]?)\b").expect("course code pattern compiles")
    })
}

/// Distinct course codes in order of first mention, normalized without separators (`CS 101` -> `CS101`).
pub fn extract_course_codes(study_plan: &str) -> Vec<String> {
    let mut seen = BTreeSet::new();
    let mut codes = Vec::new();

    for captures in course_code_pattern().captures_iter(study_plan) {
        let prefix = &captures[1];
        if TERM_WORDS.contains(&prefix) {
            continue;
        }
        let code = format!("{prefix}{}", &captures[2]);
        if seen.insert(code.clone()) {
            codes.push(code);
        }
    }

    codes
}
