pub mod input;

pub use input::{LineInput, StdinInput};
