pub mod defs;
pub mod util;
pub mod vset;
