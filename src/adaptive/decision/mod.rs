pub mod coldstart;
pub mod difficulty;
pub mod grading;

pub use coldstart::{education_to_difficulty, next_domain_difficulty, ColdStartProfiler, SimilarUser};
pub use difficulty::{answer_confidence, DifficultyAdapter, ProficiencyEstimate};
pub use grading::{grade_answer, is_answer_correct, GradedResponse, Question, QuestionType};
