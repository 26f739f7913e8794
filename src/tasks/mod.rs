pub(crate) mod finalize;
pub(crate) mod scheduler;
