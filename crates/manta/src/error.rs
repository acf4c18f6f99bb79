#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("invalid affinity graph: {reason}")]
    InvalidGraph { reason: String },

    #[error("position buffer has {actual} entries, expected {expected} (2 x N)")]
    PositionBufferLength { expected: usize, actual: usize },

    #[error("at least two points are required, got {n}")]
    TooFewPoints { n: usize },

    #[error("failed to allocate {bytes} bytes for {what}")]
    Allocation { what: &'static str, bytes: usize },

    #[error("index space of {required} slots does not fit in a 32-bit tree index")]
    IndexSpaceExceeded { required: usize },

    #[error("quadtree ran out of cells (capacity {capacity})")]
    NodeCapacityExceeded { capacity: usize },

    #[error("point {point} gave up after {retries} contended insertion attempts")]
    InsertionContention { point: usize, retries: u32 },

    #[error("bounding box is degenerate (non-finite coordinates)")]
    DegenerateBoundingBox,

    #[error("quadtree is inconsistent: {reason}")]
    CorruptTree { reason: String },

    #[error("summary for cell {cell} never became available")]
    SummaryUnavailable { cell: usize },

    #[error("normalization constant cannot be inverted: Z = {z}")]
    DegenerateNormalization { z: f64 },

    #[error("trustworthiness needs n_neighbors < n / 2 (n = {n}, n_neighbors = {n_neighbors})")]
    NeighborhoodTooLarge { n: usize, n_neighbors: usize },
}

pub type Result<T> = std::result::Result<T, Error>;
