//! Distributing monitoring configurations across devices
//!
//! Configurations are visited by descending priority; equal priorities keep
//! their input order, and devices are considered in the order given, so the
//! same inputs always yield the same plan.

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::config::MonitoringConfiguration;
use crate::device::DeviceInfo;
use crate::error::DiscoveryError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AllocationStrategy {
    /// First device whose envelope can host the configuration
    #[default]
    CapabilityBased,
    /// Capable device holding the fewest configurations
    LoadBalanced,
    /// Cycle through capable devices
    RoundRobin,
    /// Everything on one primary device
    PriorityBased,
}

impl FromStr for AllocationStrategy {
    type Err = DiscoveryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "capability" | "capability_based" => Ok(Self::CapabilityBased),
            "load" | "load_balanced" => Ok(Self::LoadBalanced),
            "round_robin" | "round-robin" => Ok(Self::RoundRobin),
            "priority" | "priority_based" => Ok(Self::PriorityBased),
            other => Err(DiscoveryError::Validation(format!(
                "unknown allocation strategy '{}'",
                other
            ))),
        }
    }
}

/// How the primary device is chosen for [`AllocationStrategy::PriorityBased`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PrimaryDeviceStrategy {
    #[default]
    HighestBandwidth,
    LowestNoiseFloor,
    MostRecentlySeen,
}

impl FromStr for PrimaryDeviceStrategy {
    type Err = DiscoveryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bandwidth" | "highest_bandwidth" => Ok(Self::HighestBandwidth),
            "noise_floor" | "lowest_noise_floor" => Ok(Self::LowestNoiseFloor),
            "recent" | "most_recent" => Ok(Self::MostRecentlySeen),
            other => Err(DiscoveryError::Validation(format!(
                "unknown primary device strategy '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationOptions {
    pub strategy: AllocationStrategy,
    pub primary: PrimaryDeviceStrategy,
    pub redundancy_enabled: bool,
    /// Extra devices each emergency configuration is copied to
    pub critical_frequency_redundancy: usize,
}

impl Default for AllocationOptions {
    fn default() -> Self {
        Self {
            strategy: AllocationStrategy::CapabilityBased,
            primary: PrimaryDeviceStrategy::HighestBandwidth,
            redundancy_enabled: true,
            critical_frequency_redundancy: 1,
        }
    }
}

/// Device id to the configurations it runs, in assignment order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceAllocationPlan {
    pub assignments: BTreeMap<String, Vec<MonitoringConfiguration>>,
}

impl DeviceAllocationPlan {
    pub fn configs_for(&self, device_id: &str) -> &[MonitoringConfiguration] {
        self.assignments.get(device_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Devices a configuration ended up on
    pub fn devices_for(&self, config_id: &str) -> Vec<&str> {
        self.assignments
            .iter()
            .filter(|(_, configs)| configs.iter().any(|c| c.id == config_id))
            .map(|(device, _)| device.as_str())
            .collect()
    }

    pub fn total_assignments(&self) -> usize {
        self.assignments.values().map(Vec::len).sum()
    }

    /// (device id, config id) pairs in plan order
    pub fn pairs(&self) -> Vec<(String, String)> {
        self.assignments
            .iter()
            .flat_map(|(device, configs)| configs.iter().map(move |c| (device.clone(), c.id.clone())))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationFailure {
    pub config_id: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AllocationReport {
    pub plan: DeviceAllocationPlan,
    pub failures: Vec<AllocationFailure>,
}

impl AllocationReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Assign every configuration to a connected device under `options`.
/// Configurations no device can take are reported in `failures`.
pub fn allocate_frequencies(
    configs: &[MonitoringConfiguration],
    devices: &[DeviceInfo],
    options: &AllocationOptions,
) -> AllocationReport {
    let devices: Vec<&DeviceInfo> = devices.iter().filter(|d| d.connected).collect();
    let mut report = AllocationReport::default();
    for d in &devices {
        report.plan.assignments.insert(d.device_id.clone(), Vec::new());
    }

    // Stable: equal priorities keep input order
    let mut order: Vec<&MonitoringConfiguration> = configs.iter().collect();
    order.sort_by(|a, b| b.priority().cmp(&a.priority()));

    let primary = select_primary(&devices, options.primary);
    let mut cursor = 0usize;

    for config in order {
        let outcome = config
            .validate()
            .and_then(|_| choose_device(config, &devices, options, &report.plan, primary, &mut cursor));

        let device_id = match outcome {
            Ok(id) => id,
            Err(e) => {
                warn!("allocation failed for {}: {}", config.id, e);
                report.failures.push(AllocationFailure {
                    config_id: config.id.clone(),
                    reason: e.to_string(),
                });
                continue;
            }
        };
        debug!("{} -> {}", config.id, device_id);
        push_assignment(&mut report.plan, &device_id, config);

        if options.redundancy_enabled && config.is_critical() && options.critical_frequency_redundancy > 0 {
            add_replicas(config, &device_id, &devices, options.critical_frequency_redundancy, &mut report.plan);
        }
    }

    report
}

fn push_assignment(plan: &mut DeviceAllocationPlan, device_id: &str, config: &MonitoringConfiguration) {
    let mut assigned = config.clone();
    assigned.assigned_device = Some(device_id.to_string());
    plan.assignments.entry(device_id.to_string()).or_default().push(assigned);
}

fn hosts(device: &DeviceInfo, config: &MonitoringConfiguration) -> bool {
    let (center, bandwidth) = config.span();
    device.capabilities.can_host(center, bandwidth)
}

fn load(plan: &DeviceAllocationPlan, device_id: &str) -> usize {
    plan.assignments.get(device_id).map_or(0, Vec::len)
}

fn choose_device(
    config: &MonitoringConfiguration,
    devices: &[&DeviceInfo],
    options: &AllocationOptions,
    plan: &DeviceAllocationPlan,
    primary: Option<usize>,
    cursor: &mut usize,
) -> crate::error::Result<String> {
    if devices.is_empty() {
        return Err(DiscoveryError::DeviceCapability("no connected devices".into()));
    }
    let (center, bandwidth) = config.span();

    // A pinned configuration goes to its device or nowhere
    if let Some(pinned) = &config.assigned_device {
        let device = devices
            .iter()
            .find(|d| &d.device_id == pinned)
            .ok_or_else(|| DiscoveryError::not_found("device", pinned.clone()))?;
        device.capabilities.check(&device.device_id, center, bandwidth)?;
        return Ok(device.device_id.clone());
    }

    let chosen = match options.strategy {
        AllocationStrategy::CapabilityBased => devices.iter().find(|d| hosts(d, config)),
        AllocationStrategy::LoadBalanced => devices
            .iter()
            .filter(|d| hosts(d, config))
            .min_by_key(|d| load(plan, &d.device_id)),
        AllocationStrategy::RoundRobin => {
            let n = devices.len();
            let found = (0..n).map(|k| (*cursor + k) % n).find(|&i| hosts(devices[i], config));
            found.map(|i| {
                *cursor = (i + 1) % n;
                &devices[i]
            })
        }
        AllocationStrategy::PriorityBased => {
            let device = primary.map(|i| devices[i]);
            if let Some(device) = device {
                device.capabilities.check(&device.device_id, center, bandwidth)?;
            }
            primary.map(|i| &devices[i])
        }
    };

    chosen.map(|d| d.device_id.clone()).ok_or_else(|| {
        DiscoveryError::DeviceCapability(format!(
            "no device can host {:.0} Hz +/- {:.0} Hz",
            center,
            bandwidth / 2.0
        ))
    })
}

/// Copy a critical configuration onto `extra` more capable devices, least
/// loaded first. Nothing is copied unless that many are connected.
fn add_replicas(
    config: &MonitoringConfiguration,
    primary_device: &str,
    devices: &[&DeviceInfo],
    extra: usize,
    plan: &mut DeviceAllocationPlan,
) {
    let mut candidates: Vec<&DeviceInfo> = devices
        .iter()
        .copied()
        .filter(|d| d.device_id != primary_device && hosts(d, config))
        .collect();
    if candidates.len() < extra {
        warn!(
            "{}: redundancy needs {} more capable devices, {} connected; not replicated",
            config.id,
            extra,
            candidates.len()
        );
        return;
    }
    candidates.sort_by_key(|d| load(plan, &d.device_id));

    let replicas: Vec<String> = candidates.iter().take(extra).map(|d| d.device_id.clone()).collect();
    for device_id in replicas {
        push_assignment(plan, &device_id, config);
    }
}

/// Index of the primary device. Ties go to the earlier device.
pub fn select_primary(devices: &[&DeviceInfo], strategy: PrimaryDeviceStrategy) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (i, d) in devices.iter().enumerate() {
        let better = match best.map(|b| devices[b]) {
            None => true,
            Some(current) => match strategy {
                PrimaryDeviceStrategy::HighestBandwidth => {
                    d.capabilities.max_bandwidth > current.capabilities.max_bandwidth
                }
                PrimaryDeviceStrategy::LowestNoiseFloor => d.noise_floor < current.noise_floor,
                PrimaryDeviceStrategy::MostRecentlySeen => d.last_seen > current.last_seen,
            },
        };
        if better {
            best = Some(i);
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceCapabilities;
    use crate::monitor::config::{FrequencyPurpose, FrequencyRange};

    fn config(id: &str, center: f64, purpose: FrequencyPurpose, priority: u8) -> MonitoringConfiguration {
        MonitoringConfiguration::new(id, vec![FrequencyRange::new(center, 10_000.0, purpose, priority)])
    }

    fn devices() -> Vec<DeviceInfo> {
        vec![
            DeviceInfo::new("hf-0", DeviceCapabilities::hf()),
            DeviceInfo::new("hf-1", DeviceCapabilities::hf()),
            DeviceInfo::new("rtl-0", DeviceCapabilities::rtl_sdr()),
        ]
    }

    fn watch_list() -> Vec<MonitoringConfiguration> {
        vec![
            config("20m-content", 14_085_000.0, FrequencyPurpose::ContentDiscovery, 5),
            config("2m-aprs", 144_390_000.0, FrequencyPurpose::MeshCoordination, 6),
            config("40m-content", 7_100_000.0, FrequencyPurpose::ContentDiscovery, 5),
            config("20m-emcomm", 14_300_000.0, FrequencyPurpose::Emergency, 9),
        ]
    }

    fn no_redundancy(strategy: AllocationStrategy) -> AllocationOptions {
        AllocationOptions {
            strategy,
            redundancy_enabled: false,
            ..AllocationOptions::default()
        }
    }

    #[test]
    fn test_capability_based_is_deterministic() {
        let options = AllocationOptions::default();
        let first = allocate_frequencies(&watch_list(), &devices(), &options);
        for _ in 0..5 {
            assert_eq!(allocate_frequencies(&watch_list(), &devices(), &options), first);
        }
        assert!(first.is_complete());

        // Emergency first, then the 2m config, then equal priorities in input order
        let hf0: Vec<&str> = first.plan.configs_for("hf-0").iter().map(|c| c.id.as_str()).collect();
        assert_eq!(hf0, vec!["20m-emcomm", "20m-content", "40m-content"]);
        assert_eq!(first.plan.configs_for("rtl-0")[0].id, "2m-aprs");
        // Emergency replicated onto one more HF receiver
        assert_eq!(first.plan.devices_for("20m-emcomm"), vec!["hf-0", "hf-1"]);
        assert_eq!(
            first.plan.configs_for("hf-0")[0].assigned_device.as_deref(),
            Some("hf-0")
        );
    }

    #[test]
    fn test_unhostable_config_reported() {
        let mut list = watch_list();
        list.push(config("70cm", 432_100_000.0, FrequencyPurpose::General, 2));
        let only_hf = vec![DeviceInfo::new("hf-0", DeviceCapabilities::hf())];

        let report = allocate_frequencies(&list, &only_hf, &no_redundancy(AllocationStrategy::CapabilityBased));
        let failed: Vec<&str> = report.failures.iter().map(|f| f.config_id.as_str()).collect();
        assert_eq!(failed, vec!["2m-aprs", "70cm"]);
        assert_eq!(report.plan.total_assignments(), 3);
    }

    #[test]
    fn test_load_balanced_spreads() {
        let list = vec![
            config("a", 14_085_000.0, FrequencyPurpose::General, 3),
            config("b", 7_100_000.0, FrequencyPurpose::General, 3),
            config("c", 10_140_000.0, FrequencyPurpose::General, 3),
            config("d", 3_590_000.0, FrequencyPurpose::General, 3),
        ];
        let hf = vec![
            DeviceInfo::new("hf-0", DeviceCapabilities::hf()),
            DeviceInfo::new("hf-1", DeviceCapabilities::hf()),
        ];
        let report = allocate_frequencies(&list, &hf, &no_redundancy(AllocationStrategy::LoadBalanced));
        assert_eq!(report.plan.configs_for("hf-0").len(), 2);
        assert_eq!(report.plan.configs_for("hf-1").len(), 2);
        assert_eq!(report.plan.devices_for("b"), vec!["hf-1"]);
    }

    #[test]
    fn test_round_robin_skips_incapable() {
        let list = vec![
            config("a", 14_085_000.0, FrequencyPurpose::General, 3),
            config("b", 7_100_000.0, FrequencyPurpose::General, 3),
            config("c", 10_140_000.0, FrequencyPurpose::General, 3),
        ];
        let report = allocate_frequencies(&list, &devices(), &no_redundancy(AllocationStrategy::RoundRobin));
        assert_eq!(report.plan.devices_for("a"), vec!["hf-0"]);
        assert_eq!(report.plan.devices_for("b"), vec!["hf-1"]);
        // rtl-0 cannot tune HF, wraps back to hf-0
        assert_eq!(report.plan.devices_for("c"), vec!["hf-0"]);
    }

    #[test]
    fn test_priority_based_uses_primary() {
        let mut devs = devices();
        devs[1].noise_floor = -60.0;
        let options = AllocationOptions {
            strategy: AllocationStrategy::PriorityBased,
            primary: PrimaryDeviceStrategy::LowestNoiseFloor,
            redundancy_enabled: false,
            critical_frequency_redundancy: 0,
        };
        let report = allocate_frequencies(&watch_list(), &devs, &options);
        assert_eq!(report.plan.configs_for("hf-1").len(), 3);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].config_id, "2m-aprs");

        let refs: Vec<&DeviceInfo> = devs.iter().collect();
        assert_eq!(select_primary(&refs, PrimaryDeviceStrategy::HighestBandwidth), Some(2));
    }

    #[test]
    fn test_disconnected_devices_ignored() {
        let mut devs = devices();
        devs[0].connected = false;
        let report = allocate_frequencies(&watch_list(), &devs, &no_redundancy(AllocationStrategy::CapabilityBased));
        assert!(!report.plan.assignments.contains_key("hf-0"));
        assert_eq!(report.plan.devices_for("20m-content"), vec!["hf-1"]);
    }

    #[test]
    fn test_pinned_device_respected() {
        let mut pinned = config("pinned", 14_085_000.0, FrequencyPurpose::General, 3);
        pinned.assigned_device = Some("hf-1".into());
        let report = allocate_frequencies(&[pinned], &devices(), &AllocationOptions::default());
        assert_eq!(report.plan.devices_for("pinned"), vec!["hf-1"]);

        let mut wrong = config("wrong", 14_085_000.0, FrequencyPurpose::General, 3);
        wrong.assigned_device = Some("rtl-0".into());
        let report = allocate_frequencies(&[wrong], &devices(), &AllocationOptions::default());
        assert_eq!(report.failures.len(), 1);
    }

    #[test]
    fn test_redundancy_needs_enough_devices() {
        let list = vec![config("20m-emcomm", 14_300_000.0, FrequencyPurpose::Emergency, 9)];
        let options = AllocationOptions {
            critical_frequency_redundancy: 2,
            ..AllocationOptions::default()
        };

        // Only hf-1 could take a copy; two are required
        let report = allocate_frequencies(&list, &devices(), &options);
        assert!(report.is_complete());
        assert_eq!(report.plan.devices_for("20m-emcomm"), vec!["hf-0"]);

        let mut more = devices();
        more.push(DeviceInfo::new("hf-2", DeviceCapabilities::hf()));
        let report = allocate_frequencies(&list, &more, &options);
        assert_eq!(report.plan.devices_for("20m-emcomm"), vec!["hf-0", "hf-1", "hf-2"]);

        let disabled = AllocationOptions {
            redundancy_enabled: false,
            ..options
        };
        let report = allocate_frequencies(&list, &more, &disabled);
        assert_eq!(report.plan.devices_for("20m-emcomm"), vec!["hf-0"]);
    }

    #[test]
    fn test_strategy_parsing() {
        assert_eq!("load".parse::<AllocationStrategy>().unwrap(), AllocationStrategy::LoadBalanced);
        assert_eq!(
            "recent".parse::<PrimaryDeviceStrategy>().unwrap(),
            PrimaryDeviceStrategy::MostRecentlySeen
        );
        assert!("fastest".parse::<AllocationStrategy>().is_err());
    }
}
