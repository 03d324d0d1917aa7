pub mod core;
pub mod grades;
pub mod history;
pub mod import;
pub mod normalize;
pub mod students;
