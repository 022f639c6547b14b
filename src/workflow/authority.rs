//! Approval authorities
//!
//! Each approval stage is signed off by the holder of one authority. Users
//! carry an explicit set of authorities; nothing is inferred from titles.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::models::ApprovalStage;

/// Authorities that can sign off a closure stage, lowest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Authority {
    /// Head of a unit; scoped to that unit
    UnitHead,
    /// Assistant commissioner (Ag. AC/PAP); scoped to a department
    AssistantCommissioner,
    /// Commissioner (Ag. C/PAP); scoped to a department
    Commissioner,
}

impl Authority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Authority::UnitHead => "unit_head",
            Authority::AssistantCommissioner => "assistant_commissioner",
            Authority::Commissioner => "commissioner",
        }
    }

    /// The stage this authority signs off
    pub fn stage(&self) -> ApprovalStage {
        match self {
            Authority::UnitHead => ApprovalStage::UnitHead,
            Authority::AssistantCommissioner => ApprovalStage::AssistantCommissioner,
            Authority::Commissioner => ApprovalStage::Commissioner,
        }
    }

    /// The authority required to act at a stage, if the stage awaits anyone
    pub fn for_stage(stage: ApprovalStage) -> Option<Authority> {
        match stage {
            ApprovalStage::UnitHead => Some(Authority::UnitHead),
            ApprovalStage::AssistantCommissioner => Some(Authority::AssistantCommissioner),
            ApprovalStage::Commissioner => Some(Authority::Commissioner),
            ApprovalStage::None | ApprovalStage::Closed | ApprovalStage::Rejected => None,
        }
    }

    /// The next authority up the chain, `None` after the commissioner
    pub fn next(&self) -> Option<Authority> {
        match self {
            Authority::UnitHead => Some(Authority::AssistantCommissioner),
            Authority::AssistantCommissioner => Some(Authority::Commissioner),
            Authority::Commissioner => None,
        }
    }
}

impl std::str::FromStr for Authority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unit_head" => Ok(Authority::UnitHead),
            "assistant_commissioner" => Ok(Authority::AssistantCommissioner),
            "commissioner" => Ok(Authority::Commissioner),
            _ => Err(format!("Invalid authority: {}", s)),
        }
    }
}

/// A set of authorities held by one user
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuthoritySet {
    authorities: BTreeSet<Authority>,
}

impl AuthoritySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has(&self, authority: Authority) -> bool {
        self.authorities.contains(&authority)
    }

    pub fn add(&mut self, authority: Authority) {
        self.authorities.insert(authority);
    }

    pub fn remove(&mut self, authority: Authority) {
        self.authorities.remove(&authority);
    }

    pub fn is_empty(&self) -> bool {
        self.authorities.is_empty()
    }

    /// Highest authority in the set
    pub fn highest(&self) -> Option<Authority> {
        self.authorities.iter().next_back().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = Authority> + '_ {
        self.authorities.iter().copied()
    }
}

impl From<Vec<Authority>> for AuthoritySet {
    fn from(authorities: Vec<Authority>) -> Self {
        Self {
            authorities: authorities.into_iter().collect(),
        }
    }
}
