//! Media capture implementations

pub mod devices;

pub use devices::SimulatedCaptureDevices;
