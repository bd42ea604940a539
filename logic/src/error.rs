use thiserror::Error;

/// Failures raised while inserting into a single [`crate::bucket::Bucket`].
///
/// `BucketHasSelf` is a control-flow signal, not a real failure: it tells the
/// caller (the [`crate::ktree::BucketTree`]) to split this leaf and retry,
/// rather than "the insert was rejected".
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketError {
    #[error("node already present in this bucket")]
    AlreadyPresent,
    #[error("bucket holds SelfNode, split it and retry")]
    BucketHasSelf,
    #[error("bucket and its replacement cache are both full")]
    BucketFull,
    #[error("node not found in this bucket")]
    NotFound,
}
