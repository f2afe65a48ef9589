mod chain;
mod handler;
mod pipeline;

pub use chain::*;
pub use handler::*;
pub use pipeline::*;
