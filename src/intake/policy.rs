//! Uniqueness policy: which fields must be unique, and against whom.
//!
//! Family numbers may repeat because siblings share one household
//! registration, so they are excluded from the in-message check and only
//! clash across senders. The whole rule set is a value so callers can swap
//! it in tests or for a stricter program.

use serde::{Deserialize, Serialize};

use super::types::{Field, ParsedFields, PriorRecord};

/// Whose prior records count as a conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OwnerScope {
    /// Any earlier record, including the sender's own.
    AnySender,
    /// Only records submitted by someone else.
    OtherSenders,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayRule {
    pub field: Field,
    pub scope: OwnerScope,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UniquenessPolicy {
    /// Fields that must not repeat between records of one message.
    pub within_message: Vec<Field>,
    /// Rules checked against records already stored for the day, in order.
    pub per_day: Vec<DayRule>,
}

impl Default for UniquenessPolicy {
    fn default() -> Self {
        Self {
            within_message: vec![Field::Card, Field::Id],
            per_day: vec![
                DayRule {
                    field: Field::Name,
                    scope: OwnerScope::AnySender,
                },
                DayRule {
                    field: Field::Card,
                    scope: OwnerScope::AnySender,
                },
                DayRule {
                    field: Field::Id,
                    scope: OwnerScope::AnySender,
                },
                DayRule {
                    field: Field::Family,
                    scope: OwnerScope::OtherSenders,
                },
            ],
        }
    }
}

impl UniquenessPolicy {
    /// Every `(field, value)` the per-day rules need looked up.
    pub fn lookups(&self, fields: &ParsedFields) -> Vec<(Field, String)> {
        self.per_day
            .iter()
            .filter_map(|rule| fields.value(rule.field).map(|v| (rule.field, v)))
            .collect()
    }

    /// Rules a prior record violates for this candidate, in policy order.
    pub fn violations(
        &self,
        candidate: &ParsedFields,
        sender: &str,
        prior: &PriorRecord,
    ) -> Vec<DayRule> {
        self.per_day
            .iter()
            .copied()
            .filter(|rule| match rule.scope {
                OwnerScope::AnySender => true,
                OwnerScope::OtherSenders => prior.sender != sender,
            })
            .filter(|rule| {
                let mine = candidate.value(rule.field);
                mine.is_some() && mine == prior.values.value(rule.field)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intake::types::PriorValues;

    fn fields(name: &str, card: &str, id: &str, family: &str) -> ParsedFields {
        ParsedFields {
            name: name.to_string(),
            card: card.to_string(),
            id: id.to_string(),
            family: family.to_string(),
            ..ParsedFields::default()
        }
    }

    fn prior(sender: &str, f: &ParsedFields) -> PriorRecord {
        PriorRecord {
            sender: sender.to_string(),
            values: PriorValues::from(f),
        }
    }

    #[test]
    fn family_only_clashes_across_senders() {
        let policy = UniquenessPolicy::default();
        let stored = fields("ANI", "5049488500000001", "3173000000000001", "3173000000000009");
        let sibling = fields("BUDI", "5049488500000002", "3173000000000002", "3173000000000009");

        assert!(policy.violations(&sibling, "alice", &prior("alice", &stored)).is_empty());

        let v = policy.violations(&sibling, "bob", &prior("alice", &stored));
        assert_eq!(v.len(), 1);
        assert_eq!(v[0].field, Field::Family);
    }

    #[test]
    fn card_and_name_clash_for_anyone() {
        let policy = UniquenessPolicy::default();
        let stored = fields("ANI", "5049488500000001", "3173000000000001", "3173000000000009");
        let again = fields("ani", "5049488500000001", "3173000000000005", "3173000000000008");

        let v = policy.violations(&again, "alice", &prior("alice", &stored));
        let hit: Vec<Field> = v.iter().map(|r| r.field).collect();
        assert_eq!(hit, vec![Field::Name, Field::Card]);
    }

    #[test]
    fn swapped_policy_without_name_rule() {
        let mut policy = UniquenessPolicy::default();
        policy.per_day.retain(|r| r.field != Field::Name);
        let stored = fields("ANI", "5049488500000001", "3173000000000001", "3173000000000009");
        let same_name = fields("ANI", "5049488500000002", "3173000000000002", "3173000000000008");
        assert!(policy.violations(&same_name, "x", &prior("y", &stored)).is_empty());
        assert_eq!(policy.lookups(&same_name).len(), 3);
    }
}
