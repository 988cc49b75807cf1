//! Network Conflict Resolver.
//!
//! Docker refuses to create the project network when another network
//! already claims an overlapping subnet. Foreign networks on that range are
//! removed when nothing is attached to them and left alone otherwise.

use ipnet::Ipv4Net;
use stack_config::Settings;
use stack_core::error::{Result, StackError};
use stack_core::{stack_info, stack_success, stack_warning};
use stack_messages::{msg, MESSAGES};
use stack_runtime::NetworkDescriptor;
use tracing::{debug, info, info_span, warn};

use crate::gateway::Gateway;
use crate::prompt::Confirm;

const BUILTIN_NETWORKS: &[&str] = &["bridge", "host", "none"];

/// Parse an IPv4 CIDR, dropping any host bits.
pub fn parse_subnet(s: &str) -> Result<Ipv4Net> {
    s.trim()
        .parse::<Ipv4Net>()
        .map(|net| net.trunc())
        .map_err(|_| StackError::Configuration(format!("Invalid IPv4 subnet '{}'", s)))
}

/// True when the two ranges share at least one address. CIDR blocks either
/// nest or are disjoint, so one must contain the other's network address.
pub fn overlaps(a: &Ipv4Net, b: &Ipv4Net) -> bool {
    a.contains(&b.network()) || b.contains(&a.network())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkConflict {
    pub network: String,
    pub subnet: String,
    pub attached_containers: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkReport {
    pub removed: Vec<String>,
    /// Conflicting networks kept because containers are attached.
    pub in_use: Vec<NetworkConflict>,
    /// Conflicting networks the operator chose to keep, or that could not
    /// be removed.
    pub skipped: Vec<String>,
}

impl NetworkReport {
    pub fn is_clear(&self) -> bool {
        self.in_use.is_empty() && self.skipped.is_empty()
    }
}

pub struct NetworkResolver<'a> {
    gateway: &'a Gateway<'a>,
    target: Ipv4Net,
    quiet: bool,
}

impl<'a> NetworkResolver<'a> {
    pub fn new(gateway: &'a Gateway<'a>, settings: &Settings) -> Result<Self> {
        Ok(Self {
            gateway,
            target: parse_subnet(&settings.network_subnet)?,
            quiet: false,
        })
    }

    pub fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    pub fn target(&self) -> Ipv4Net {
        self.target
    }

    fn is_project_owned(&self, network: &NetworkDescriptor) -> bool {
        let project = &self.gateway.context().project_name;
        network.project.as_deref() == Some(project.as_str())
            || network.name.starts_with(&format!("{}_", project))
    }

    /// The first subnet of `network` that overlaps the target, if any.
    fn conflicting_subnet(&self, network: &NetworkDescriptor) -> Option<String> {
        network
            .subnets
            .iter()
            .find(|subnet| match parse_subnet(subnet) {
                Ok(net) => overlaps(&net, &self.target),
                // IPv6 and malformed ranges cannot clash with an IPv4 pool.
                Err(_) => false,
            })
            .cloned()
    }

    /// Foreign networks whose subnet overlaps the target.
    pub fn find_conflicts(&self) -> Result<Vec<NetworkConflict>> {
        let mut conflicts = Vec::new();
        for name in self.gateway.networks()? {
            if BUILTIN_NETWORKS.contains(&name.as_str()) {
                continue;
            }
            let Some(network) = self.gateway.inspect_network(&name)? else {
                continue;
            };
            if self.is_project_owned(&network) {
                debug!("Skipping project network {}", name);
                continue;
            }
            if let Some(subnet) = self.conflicting_subnet(&network) {
                conflicts.push(NetworkConflict {
                    network: network.name.clone(),
                    subnet,
                    attached_containers: network.attached_containers,
                });
            }
        }
        Ok(conflicts)
    }

    /// Remove every unused conflicting network the operator agrees to.
    ///
    /// A network conflicts when any of its subnets overlaps the target, not
    /// only when it equals it, so a wider foreign range such as
    /// `172.0.0.0/8` is a removal candidate too.
    ///
    /// Each candidate is inspected again right before removal; a network
    /// that gained containers in the meantime is kept.
    pub fn resolve_conflicts(&self, confirm: &dyn Confirm) -> Result<NetworkReport> {
        let span = info_span!("network_resolve", subnet = %self.target);
        let _enter = span.enter();

        if !self.quiet {
            stack_info!(
                "{}",
                msg!(MESSAGES.network_checking, subnet = self.target.to_string())
            );
        }

        let mut report = NetworkReport::default();
        for conflict in self.find_conflicts()? {
            if !self.quiet {
                stack_warning!(
                    "{}",
                    msg!(
                        MESSAGES.network_conflict_found,
                        network = conflict.network.as_str(),
                        subnet = conflict.subnet.as_str(),
                        target = self.target.to_string()
                    )
                );
            }

            let current = match self.gateway.inspect_network(&conflict.network)? {
                Some(current) => current,
                None => {
                    debug!("Network {} disappeared before removal", conflict.network);
                    continue;
                }
            };
            if current.attached_containers > 0 {
                self.report_in_use(&conflict.network, current.attached_containers);
                report.in_use.push(NetworkConflict {
                    attached_containers: current.attached_containers,
                    ..conflict
                });
                continue;
            }

            let prompt = msg!(
                MESSAGES.network_confirm_remove,
                network = conflict.network.as_str()
            );
            if !confirm.confirm(&prompt, true) {
                info!("Operator kept network {}", conflict.network);
                report.skipped.push(conflict.network);
                continue;
            }

            let output = self.gateway.remove_network(&conflict.network)?;
            if output.success() {
                if !self.quiet {
                    stack_success!(
                        "{}",
                        msg!(MESSAGES.network_removed, network = conflict.network.as_str())
                    );
                }
                report.removed.push(conflict.network);
            } else {
                warn!(
                    "Could not remove network {}: {}",
                    conflict.network,
                    output.combined().trim()
                );
                report.skipped.push(conflict.network);
            }
        }

        if !self.quiet && report.removed.is_empty() && report.in_use.is_empty() && report.skipped.is_empty() {
            stack_success!("{}", MESSAGES.network_no_conflicts);
        }
        Ok(report)
    }

    fn report_in_use(&self, network: &str, count: usize) {
        warn!(network, count, "Conflicting network has attached containers");
        if !self.quiet {
            stack_warning!(
                "{}",
                msg!(
                    MESSAGES.network_in_use,
                    network = network,
                    count = count.to_string()
                )
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn net(s: &str) -> Ipv4Net {
        parse_subnet(s).unwrap()
    }

    #[test]
    fn test_parse_normalises_host_bits() {
        assert_eq!(net("172.20.5.9/16").to_string(), "172.20.0.0/16");
        assert!(parse_subnet("172.20.0.0").is_err());
        assert!(parse_subnet("172.20.0.0/33").is_err());
        assert!(parse_subnet("fd00::/64").is_err());
    }

    #[test]
    fn test_overlap() {
        let target = net("172.20.0.0/16");
        assert!(overlaps(&net("172.20.0.0/16"), &target));
        assert!(overlaps(&net("172.20.128.0/24"), &target));
        assert!(overlaps(&net("172.0.0.0/8"), &target));
        assert!(!overlaps(&net("172.21.0.0/16"), &target));
        assert!(!overlaps(&net("10.0.0.0/8"), &target));
        assert!(overlaps(&net("0.0.0.0/0"), &target));
    }
}
