//! Multi-device spectrum monitoring
//!
//! Watch lists ([`MonitoringConfiguration`]) are allocated across devices,
//! each (device, configuration) pair runs as a [`MonitoringSession`], and
//! the [`MonitoringCoordinator`] drives their sampling loops.

pub mod allocation;
pub mod config;
pub mod coordinator;
pub mod session;
pub mod tracker;

pub use allocation::{
    allocate_frequencies, AllocationFailure, AllocationOptions, AllocationReport, AllocationStrategy,
    DeviceAllocationPlan, PrimaryDeviceStrategy,
};
pub use config::{FrequencyPurpose, FrequencyRange, MonitoringConfiguration};
pub use coordinator::{MonitoringCoordinator, MonitoringEvent, TickReport};
pub use session::{MonitoringSession, MonitoringSessionInfo, MonitoringStatistics, MonitoringStatus};
pub use tracker::{SignalTrack, SignalTracker, TrackerStats};
