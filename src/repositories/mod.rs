pub(crate) mod answers;
pub(crate) mod attempts;
pub(crate) mod exams;
pub(crate) mod finalize_jobs;
pub(crate) mod health;
pub(crate) mod historical_stats;
pub(crate) mod questions;
pub(crate) mod stats;
pub(crate) mod topics;
pub(crate) mod users;
