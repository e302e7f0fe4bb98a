pub use simulated::{DEFAULT_AUDIO_DURATION_MS, SimulatedAppHost, SimulatedAppHostConfig};

mod simulated;
