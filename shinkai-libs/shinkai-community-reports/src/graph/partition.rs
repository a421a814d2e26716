use serde::{Deserialize, Serialize};

use super::knowledge_graph::KnowledgeGraph;

/// Communities smaller than this never produce a report.
pub const MIN_COMMUNITY_SIZE: usize = 2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Community {
    pub id: String,
    pub weight: f64,
    pub nodes: Vec<String>,
}

impl Community {
    pub fn new(id: &str, weight: f64, nodes: Vec<String>) -> Self {
        Community {
            id: id.to_string(),
            weight,
            nodes,
        }
    }

    pub fn is_reportable(&self) -> bool {
        self.nodes.len() >= MIN_COMMUNITY_SIZE
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionLevel {
    pub level: String,
    pub communities: Vec<Community>,
}

/// Output of community detection: levels in detection order, each holding its communities
/// in detection order. Reports are scheduled in exactly this order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Partition {
    pub levels: Vec<PartitionLevel>,
}

impl Partition {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `community` to `level`, creating the level at the end if it is new.
    pub fn add_community(&mut self, level: &str, community: Community) {
        match self.levels.iter_mut().find(|existing| existing.level == level) {
            Some(existing) => existing.communities.push(community),
            None => self.levels.push(PartitionLevel {
                level: level.to_string(),
                communities: vec![community],
            }),
        }
    }

    pub fn total_communities(&self) -> usize {
        self.levels.iter().map(|level| level.communities.len()).sum()
    }

    /// Every community of every level, flattened in scheduling order.
    pub fn communities(&self) -> impl Iterator<Item = &Community> {
        self.levels.iter().flat_map(|level| level.communities.iter())
    }
}

/// Partitions a graph into weighted communities. Implementations live outside this crate.
pub trait CommunityDetector: Send + Sync {
    fn detect(&self, graph: &KnowledgeGraph) -> anyhow::Result<Partition>;
}

/// A precomputed partition detects itself.
impl CommunityDetector for Partition {
    fn detect(&self, _graph: &KnowledgeGraph) -> anyhow::Result<Partition> {
        Ok(self.clone())
    }
}
