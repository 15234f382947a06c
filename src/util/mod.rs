pub mod signing;

pub use signing::{Clock, FixedClock, SignedRequestBuilder, SystemClock};
