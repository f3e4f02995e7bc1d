use std::collections::BTreeSet;

use super::HealthReport;
use crate::models::{ConsensusAlarm, ConsensusMemberStatus};

/// In-use share of the database above which a member is flagged
pub const FRAGMENTATION_THRESHOLD: f64 = 0.5;

/// Prefix of the single reason emitted when leaders diverge
pub const LEADER_DISAGREEMENT: &str = "Members don't agree on the same leader";

/// Evaluate consensus-store member status.
///
/// Members must agree on one leader; a leader id of `0` means the member has
/// not observed a leader yet and is ignored. Disagreement yields exactly one
/// reason naming every member's view. Independently, each member whose
/// database is larger than `min_db_size` is flagged when
/// `db_size_in_use / db_size` exceeds [`FRAGMENTATION_THRESHOLD`].
#[must_use]
pub fn evaluate_consensus(members: &[ConsensusMemberStatus], min_db_size: u64) -> HealthReport {
    let mut reasons = Vec::new();

    let leaders: BTreeSet<u64> = members
        .iter()
        .map(|m| m.leader_id)
        .filter(|&leader| leader != 0)
        .collect();
    if leaders.len() > 1 {
        let mut views: Vec<String> = members
            .iter()
            .map(|m| format!("{}: {}", m.host_node, m.leader_id))
            .collect();
        views.sort();
        reasons.push(format!("{LEADER_DISAGREEMENT} ({})", views.join(", ")));
    }

    for member in members {
        if member.db_size_bytes <= 0 || member.db_size_bytes as u64 <= min_db_size {
            continue;
        }
        let ratio = member.db_size_in_use_bytes as f64 / member.db_size_bytes as f64;
        if ratio > FRAGMENTATION_THRESHOLD {
            reasons.push(format!(
                "db on {} exceeds 50% fragmentation ({} of {} bytes in use)",
                member.host_node, member.db_size_in_use_bytes, member.db_size_bytes
            ));
        }
    }

    HealthReport::from_reasons(reasons)
}

/// Evaluate consensus-store alarms: any alarm at all is a failure, and each
/// alarm becomes one reason.
#[must_use]
pub fn evaluate_alarms(alarms: &[ConsensusAlarm]) -> HealthReport {
    let reasons = alarms
        .iter()
        .map(|alarm| {
            format!(
                "Alarm {} raised by member {:x} on {}",
                alarm.alarm_kind, alarm.member_id, alarm.host_node
            )
        })
        .collect();

    HealthReport::from_reasons(reasons)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::Judgement;
    use crate::units::DEFAULT_MIN_DB_SIZE;
    use std::collections::HashSet;

    const MIB: i64 = 1024 * 1024;

    fn member(host: &str, leader: u64, db_size: i64, in_use: i64) -> ConsensusMemberStatus {
        ConsensusMemberStatus {
            host_node: host.to_string(),
            member_id: 1,
            leader_id: leader,
            db_size_bytes: db_size,
            db_size_in_use_bytes: in_use,
            raft_index: 100,
            raft_term: 2,
            is_learner: false,
            errors: Vec::new(),
        }
    }

    #[test]
    fn test_agreeing_members_are_ok() {
        let members = vec![
            member("cp-1", 7, 1024 * MIB, 400 * MIB),
            member("cp-2", 7, 1024 * MIB, 512 * MIB),
            member("cp-3", 7, 64 * MIB, 60 * MIB),
        ];

        let report = evaluate_consensus(&members, DEFAULT_MIN_DB_SIZE);
        assert_eq!(report, HealthReport::ok());
    }

    #[test]
    fn test_leader_disagreement_reported_once() {
        let members = vec![
            member("cp-1", 7, 10 * MIB, 5 * MIB),
            member("cp-2", 7, 10 * MIB, 5 * MIB),
            member("cp-3", 3, 10 * MIB, 5 * MIB),
        ];

        let report = evaluate_consensus(&members, DEFAULT_MIN_DB_SIZE);
        assert_eq!(report.judgement, Judgement::Degraded);
        let disagreements = report
            .reasons
            .iter()
            .filter(|r| r.starts_with(LEADER_DISAGREEMENT))
            .count();
        assert_eq!(disagreements, 1);
        assert_eq!(report.reasons.len(), 1);
        assert!(report.reasons[0].contains("cp-3: 3"));
    }

    #[test]
    fn test_unobserved_leader_is_not_disagreement() {
        let members = vec![
            member("cp-1", 0, 10 * MIB, 5 * MIB),
            member("cp-2", 7, 10 * MIB, 5 * MIB),
            member("cp-3", 0, 10 * MIB, 5 * MIB),
        ];

        assert!(evaluate_consensus(&members, DEFAULT_MIN_DB_SIZE).is_ok());
    }

    #[test]
    fn test_fragmentation_above_threshold() {
        let members = vec![
            member("cp-1", 7, 1024 * MIB, 600 * MIB),
            member("cp-2", 7, 1024 * MIB, 100 * MIB),
        ];

        let report = evaluate_consensus(&members, DEFAULT_MIN_DB_SIZE);
        assert_eq!(report.reasons.len(), 1);
        assert!(report.reasons[0].starts_with("db on cp-1 exceeds 50% fragmentation"));
    }

    #[test]
    fn test_small_databases_skip_fragmentation_check() {
        let members = vec![member("cp-1", 7, 100 * MIB, 90 * MIB)];

        assert!(evaluate_consensus(&members, DEFAULT_MIN_DB_SIZE).is_ok());
        assert!(!evaluate_consensus(&members, 50 * MIB as u64).is_ok());
    }

    #[test]
    fn test_consensus_is_order_independent() {
        let mut members = vec![
            member("cp-1", 7, 1024 * MIB, 900 * MIB),
            member("cp-2", 3, 10 * MIB, 5 * MIB),
            member("cp-3", 7, 10 * MIB, 5 * MIB),
        ];
        let first = evaluate_consensus(&members, DEFAULT_MIN_DB_SIZE);
        members.reverse();
        let second = evaluate_consensus(&members, DEFAULT_MIN_DB_SIZE);

        let a: HashSet<_> = first.reasons.into_iter().collect();
        let b: HashSet<_> = second.reasons.into_iter().collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_no_alarms_is_ok() {
        assert_eq!(evaluate_alarms(&[]), HealthReport::ok());
    }

    #[test]
    fn test_one_reason_per_alarm() {
        let alarms = vec![
            ConsensusAlarm {
                host_node: "cp-1".to_string(),
                member_id: 0xabc,
                alarm_kind: "NOSPACE".to_string(),
            },
            ConsensusAlarm {
                host_node: "cp-2".to_string(),
                member_id: 0xdef,
                alarm_kind: "CORRUPT".to_string(),
            },
        ];

        let report = evaluate_alarms(&alarms);
        assert_eq!(report.judgement, Judgement::Degraded);
        assert_eq!(report.reasons.len(), alarms.len());
        assert_eq!(report.reasons[0], "Alarm NOSPACE raised by member abc on cp-1");
    }
}
