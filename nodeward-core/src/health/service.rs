use std::collections::HashSet;

use super::HealthReport;
use crate::models::ServiceRecord;

/// Services known to never report healthy while legitimately running
pub const DEFAULT_HEALTH_EXEMPT_SERVICES: &[&str] = &[
    "dashboard",
    "ext-iscsid",
    "ext-qemu-guest-agent",
    "ext-lldpd",
];

/// The state every service is expected to be in
pub const RUNNING_STATE: &str = "Running";

/// Evaluate service records.
///
/// A record reported unhealthy (and not exempt) and a record not in the
/// `Running` state each contribute a reason; one record may contribute both.
#[must_use]
pub fn evaluate_services(records: &[ServiceRecord], exempt: &HashSet<String>) -> HealthReport {
    let mut reasons = Vec::new();

    for record in records {
        let health_exempt = exempt.contains(&record.service_id);

        if !health_exempt && record.healthy == Some(false) {
            reasons.push(format!(
                "Service '{}' on {} not healthy",
                record.service_id, record.host_node
            ));
        }
        if record.state != RUNNING_STATE {
            reasons.push(format!(
                "Service '{}' on {} not running",
                record.service_id, record.host_node
            ));
        }
    }

    HealthReport::from_reasons(reasons)
}
