pub(crate) mod attempts;
pub(crate) mod errors;
pub(crate) mod exams;
pub(crate) mod finalize_schedule;
pub(crate) mod leaderboard;
pub(crate) mod locks;
pub(crate) mod prediction;
pub(crate) mod ranking;
pub(crate) mod scoring;
