pub mod catalog;
pub mod study_plan;
