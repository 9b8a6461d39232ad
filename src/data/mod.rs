pub mod loader;

pub use loader::{synthetic_batch, Dataset, DigitDataLoader};
