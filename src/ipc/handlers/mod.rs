pub mod accounts;
pub mod assignments;
pub mod core;
pub mod courses;
pub mod marks;
pub mod notifications;
pub mod setup;
pub mod students;
pub mod subjects;
pub mod tutors;
