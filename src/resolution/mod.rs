mod chain;

pub use chain::{ConverterFactory, ResolutionChain};
