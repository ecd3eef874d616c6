pub mod core;
pub mod grades;
pub mod marks;
pub mod students;
