mod data;
mod reader;
mod writer;

pub use data::*;
pub use reader::*;
pub use writer::*;
