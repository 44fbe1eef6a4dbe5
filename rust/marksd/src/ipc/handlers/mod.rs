pub mod assignments;
pub mod backup;
pub mod calc;
pub mod core;
pub mod exams;
pub mod import_legacy;
pub mod semesters;
pub mod subjects;
