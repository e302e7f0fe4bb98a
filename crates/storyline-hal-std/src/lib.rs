//! Host-side backends for `storyline-core`: a directory-backed resource
//! tree, the sidecar sealing tool and a simulated app host.

pub mod host;
pub mod storage;

#[cfg(test)]
mod tests;
