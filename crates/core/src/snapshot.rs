//! Persisted quest state, restored on cold start.

use std::collections::HashMap;
use serde::{Deserialize, Serialize};
use crate::goal::Goal;
use crate::id::GoalId;
use crate::roadmap::{ActiveRoadmap, CacheEntry, Roadmap};
use crate::Time;

/// What survives an app restart. Loading, error and poll state is
/// deliberately absent and starts from defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestSnapshot {
    /// Goals as last fetched
    #[serde(default)]
    pub goals: Vec<Goal>,

    /// Roadmap cache keyed by goal
    #[serde(default)]
    pub roadmap_cache: HashMap<GoalId, CacheEntry<Roadmap>>,

    /// Active roadmap selection
    #[serde(default)]
    pub active_roadmap: Option<ActiveRoadmap>,

    /// When the goal list was last fetched
    #[serde(default)]
    pub last_fetch: Option<Time>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{GoalStatus, Milestone, MilestoneId, MilestoneStatus, RoadmapStatus};

    fn goal() -> Goal {
        let at = "2026-05-01T08:00:00Z".parse::<Time>().unwrap();
        Goal {
            id: GoalId::new("g1"),
            title: "Run a marathon".to_string(),
            description: String::new(),
            category: "health".to_string(),
            target_date: None,
            status: GoalStatus::Active,
            roadmap_status: RoadmapStatus::Ready,
            created_at: at,
            updated_at: at,
        }
    }

    #[test]
    fn test_snapshot_layout() {
        let goal = goal();
        let milestones = vec![Milestone {
            id: MilestoneId::new("m1"),
            goal_id: goal.id.clone(),
            sequence: 1,
            title: "Base mileage".to_string(),
            description: String::new(),
            duration_estimate: Some("3 weeks".to_string()),
            status: MilestoneStatus::Active,
        }];
        let fetched_at = "2026-05-01T09:00:00Z".parse::<Time>().unwrap();

        let mut snapshot = QuestSnapshot {
            goals: vec![goal.clone()],
            last_fetch: Some(fetched_at),
            ..Default::default()
        };
        snapshot.roadmap_cache.insert(
            goal.id.clone(),
            CacheEntry {
                value: Roadmap {
                    goal: goal.clone(),
                    milestones: milestones.clone(),
                },
                fetched_at,
            },
        );
        snapshot.active_roadmap = Some(ActiveRoadmap::new(goal, milestones));

        let json = serde_json::to_value(&snapshot).unwrap();
        let entry = &json["roadmapCache"]["g1"];
        assert!(entry["milestones"].is_array());
        assert_eq!(entry["fetchedAt"], "2026-05-01T09:00:00Z");
        assert_eq!(entry["goal"]["id"], "g1");
        assert_eq!(json["activeRoadmap"]["goalId"], "g1");
        assert!(json["activeRoadmap"].get("roadmapUnavailable").is_none());
        assert_eq!(json["lastFetch"], "2026-05-01T09:00:00Z");

        let back: QuestSnapshot = serde_json::from_value(json).unwrap();
        assert_eq!(back, snapshot);
    }

    #[test]
    fn test_empty_document_restores_defaults() {
        let snapshot: QuestSnapshot = serde_json::from_str("{}").unwrap();
        assert!(snapshot.goals.is_empty());
        assert!(snapshot.active_roadmap.is_none());
        assert!(snapshot.last_fetch.is_none());
    }
}
