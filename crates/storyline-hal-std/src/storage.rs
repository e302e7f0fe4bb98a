pub use fs::StdResourceFs;
pub use seal::{SealReport, seal_tree};

mod fs;
mod seal;
