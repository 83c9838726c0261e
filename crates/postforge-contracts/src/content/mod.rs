mod normalizer;
mod store;

pub use normalizer::{
    normalize, normalize_content, normalize_result, result_rows, Envelope, JobResult,
};
pub use store::{ResultKey, ResultStore};
