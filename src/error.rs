use snafu::Location;
use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display(
        "Invalid capacity {}, offsets must fit in 32 bits",
        capacity
    ))]
    InvalidCapacity {
        capacity: usize,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("Invalid parameter, detail: {}", detail))]
    InvalidParameter {
        detail: String,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("Worker slot {} is already registered", index))]
    OutOfWorkers {
        index: usize,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display(
        "Exceed capacity, expected: {}, capacity: {}",
        expected,
        capacity
    ))]
    ExceedCapacity {
        expected: u64,
        capacity: u64,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("Not enough contiguous space, requested: {}", requested))]
    NotEnoughSpace {
        requested: u64,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("A consumer is already attached to this ring buffer"))]
    ConsumerAttached {
        #[snafu(implicit)]
        location: Location,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
