//! Receiver abstraction: capability envelopes, frame sources and the
//! device registry

pub mod capabilities;
pub mod registry;
pub mod source;

pub use capabilities::{DeviceCapabilities, DeviceInfo};
pub use registry::{DeviceRegistry, DeviceStats};
pub use source::{SpectrumSource, SyntheticSource, SyntheticTransmission};
