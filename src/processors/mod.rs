//! Built-in processors covering local transforms and I/O.
//!
//! Everything here is plain local compute; processors talking to external
//! services belong in application code.

mod func;
mod io;
mod passthrough;
mod regex_matcher;

pub use func::FuncTransformer;
pub use io::{IoReader, IoWriter};
pub use passthrough::Passthrough;
pub use regex_matcher::RegexMatcher;
