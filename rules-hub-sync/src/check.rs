//! Desynchronization checks between a rule file and the runtime's index
//!
//! The runtime is the source of truth for ids and positions. A mismatch is
//! reported as a warning and never blocks a save.

use rules_hub_core::{Block, RuleStatusInfo};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;

use crate::file::{rule_id, rule_name};

/// A rule as the runtime last reported it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnownRule {
    pub id: u32,
    /// 1-based position in its file
    pub idx: usize,
    pub name: String,
}

impl KnownRule {
    /// Ascending by name, ties broken by id
    pub fn cmp_by_name(&self, other: &Self) -> Ordering {
        self.name
            .cmp(&other.name)
            .then_with(|| self.id.cmp(&other.id))
    }
}

impl From<&RuleStatusInfo> for KnownRule {
    fn from(info: &RuleStatusInfo) -> Self {
        Self {
            id: info.rule_id,
            idx: info.idx,
            name: info.name.clone(),
        }
    }
}

/// Index of the rules of one file, in file order
pub fn known_rules(file_name: &str, statuses: &[RuleStatusInfo]) -> Vec<KnownRule> {
    let mut known: Vec<KnownRule> = statuses
        .iter()
        .filter(|s| s.file_name == file_name)
        .map(KnownRule::from)
        .collect();
    known.sort_by_key(|rule| rule.idx);
    known
}

/// The same index sorted for listings
pub fn sorted_by_name(known: &[KnownRule]) -> Vec<KnownRule> {
    let mut sorted = known.to_vec();
    sorted.sort_by(KnownRule::cmp_by_name);
    sorted
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SyncWarning {
    CountMismatch { expected: usize, found: usize },
    /// `moved_from` is the known position of the id found instead
    IdMismatch {
        idx: usize,
        expected: u32,
        found: u32,
        moved_from: Option<usize>,
    },
    NameMismatch {
        idx: usize,
        expected: String,
        found: String,
    },
    MissingRule { idx: usize, id: u32, name: String },
    DuplicateName { name: String, positions: Vec<usize> },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub warnings: Vec<SyncWarning>,
    /// `(idx, id)` of rules that received their runtime id
    pub assigned: Vec<(usize, u32)>,
}

impl SyncReport {
    pub fn is_synchronized(&self) -> bool {
        self.warnings.is_empty()
    }
}

/// Compare file blocks against the known rules and adopt pending ids
///
/// For each known rule, the block at its position must carry the same id
/// and name. A block without an id whose name matches is given the known
/// id by rewriting its `id` field.
pub fn check_synchronization(blocks: &mut [Block], known: &[KnownRule]) -> SyncReport {
    let mut report = SyncReport::default();

    if blocks.len() != known.len() {
        report.warnings.push(SyncWarning::CountMismatch {
            expected: known.len(),
            found: blocks.len(),
        });
    }

    for rule in known {
        let Some(block) = rule.idx.checked_sub(1).and_then(|i| blocks.get_mut(i)) else {
            report.warnings.push(SyncWarning::MissingRule {
                idx: rule.idx,
                id: rule.id,
                name: rule.name.clone(),
            });
            continue;
        };
        let name = rule_name(block).to_string();
        match rule_id(block) {
            None if name == rule.name => {
                block.set_field("id", rule.id.to_string());
                report.assigned.push((rule.idx, rule.id));
            }
            Some(id) if id != rule.id => {
                report.warnings.push(SyncWarning::IdMismatch {
                    idx: rule.idx,
                    expected: rule.id,
                    found: id,
                    moved_from: known.iter().find(|k| k.id == id).map(|k| k.idx),
                });
            }
            _ if name != rule.name => {
                report.warnings.push(SyncWarning::NameMismatch {
                    idx: rule.idx,
                    expected: rule.name.clone(),
                    found: name,
                });
            }
            _ => {}
        }
    }

    let mut positions: HashMap<&str, Vec<usize>> = HashMap::new();
    for (i, block) in blocks.iter().enumerate() {
        positions.entry(rule_name(block)).or_default().push(i + 1);
    }
    let mut duplicates: Vec<(&str, Vec<usize>)> = positions
        .into_iter()
        .filter(|(name, at)| !name.is_empty() && at.len() > 1)
        .collect();
    duplicates.sort_by_key(|(_, at)| at[0]);
    let duplicates = duplicates
        .into_iter()
        .map(|(name, positions)| SyncWarning::DuplicateName {
            name: name.to_string(),
            positions,
        });
    report.warnings.extend(duplicates);

    for warning in &report.warnings {
        tracing::warn!("Rule file out of sync: {:?}", warning);
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use rules_hub_codec::RuleCodec;
    use rules_hub_core::RuleDocument;

    fn block(id: Option<u32>, name: &str) -> Block {
        let mut rule = RuleDocument::new(name);
        rule.id = id;
        RuleCodec::new().encode(&rule)
    }

    fn known(id: u32, idx: usize, name: &str) -> KnownRule {
        KnownRule {
            id,
            idx,
            name: name.to_string(),
        }
    }

    #[test]
    fn test_matching_file_is_synchronized() {
        let mut blocks = vec![block(Some(1), "Hall"), block(Some(2), "Garage")];
        let index = [known(1, 1, "Hall"), known(2, 2, "Garage")];
        let report = check_synchronization(&mut blocks, &index);
        assert!(report.is_synchronized());
        assert!(report.assigned.is_empty());
    }

    #[test]
    fn test_swapped_rules_give_two_id_mismatches() {
        let mut blocks = vec![block(Some(2), "Garage"), block(Some(1), "Hall")];
        let index = [known(1, 1, "Hall"), known(2, 2, "Garage")];
        let report = check_synchronization(&mut blocks, &index);

        assert_eq!(
            report.warnings,
            vec![
                SyncWarning::IdMismatch {
                    idx: 1,
                    expected: 1,
                    found: 2,
                    moved_from: Some(2)
                },
                SyncWarning::IdMismatch {
                    idx: 2,
                    expected: 2,
                    found: 1,
                    moved_from: Some(1)
                },
            ]
        );
    }

    #[test]
    fn test_new_rule_with_matching_name_adopts_id() {
        let mut blocks = vec![block(Some(1), "Hall"), block(None, "Garage")];
        let index = [known(1, 1, "Hall"), known(5, 2, "Garage")];
        let report = check_synchronization(&mut blocks, &index);

        assert!(report.is_synchronized());
        assert_eq!(report.assigned, vec![(2, 5)]);
        assert_eq!(rule_id(&blocks[1]), Some(5));
    }

    #[test]
    fn test_new_rule_with_other_name_is_flagged() {
        let mut blocks = vec![block(None, "Porch")];
        let report = check_synchronization(&mut blocks, &[known(5, 1, "Garage")]);

        assert_eq!(
            report.warnings,
            vec![SyncWarning::NameMismatch {
                idx: 1,
                expected: "Garage".to_string(),
                found: "Porch".to_string()
            }]
        );
        assert_eq!(rule_id(&blocks[0]), None);
    }

    #[test]
    fn test_count_and_missing_rules() {
        let mut blocks = vec![block(Some(1), "Hall")];
        let index = [known(1, 1, "Hall"), known(2, 2, "Garage")];
        let report = check_synchronization(&mut blocks, &index);

        assert_eq!(
            report.warnings,
            vec![
                SyncWarning::CountMismatch { expected: 2, found: 1 },
                SyncWarning::MissingRule {
                    idx: 2,
                    id: 2,
                    name: "Garage".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_duplicate_names_are_warnings() {
        let mut blocks = vec![block(None, "Hall"), block(None, "Hall")];
        let report = check_synchronization(&mut blocks, &[]);

        assert!(report.warnings.contains(&SyncWarning::DuplicateName {
            name: "Hall".to_string(),
            positions: vec![1, 2]
        }));
    }

    #[test]
    fn test_known_rules_for_one_file_sorted() {
        let status = |id: u32, idx: usize, file: &str, name: &str| RuleStatusInfo {
            rule_id: id,
            idx,
            file_name: file.to_string(),
            name: name.to_string(),
            ..RuleStatusInfo::default()
        };
        let statuses = vec![
            status(3, 2, "a.xml", "Alpha"),
            status(1, 1, "a.xml", "Zulu"),
            status(2, 1, "b.xml", "Beta"),
        ];

        let known = known_rules("a.xml", &statuses);
        assert_eq!(known.iter().map(|k| k.id).collect::<Vec<_>>(), vec![1, 3]);
        let listed = sorted_by_name(&known);
        assert_eq!(listed[0].name, "Alpha");
    }
}
