//! Pure price-reduction strategies

pub mod engine;

pub use engine::{compute_next_price, Computation};
