//! Inbound notice that quest data changed elsewhere, e.g. because the chat
//! assistant created a task on the user's behalf.

use regex::Regex;

/// Kind of entity another subsystem changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutatedEntity {
    /// Goals
    Goals,
    /// Roadmaps or milestones
    Roadmaps,
    /// Tasks
    Tasks,
}

/// How much the signal can be trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalConfidence {
    /// The producer reported exactly what it changed
    Structured,
    /// Guessed from free text; expect false positives and misses
    Heuristic,
}

/// Request to resynchronize quest data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestMutationSignal {
    /// What changed
    pub entities: Vec<MutatedEntity>,

    /// Trust level
    pub confidence: SignalConfidence,
}

const ACTION_PATTERN: &str =
    r"(?i)\b(created?|add(ed)?|updated?|scheduled?|deleted?|removed?|completed?|generated?)\b";
const GOAL_PATTERN: &str = r"(?i)\b(goals?|quests?|epics?)\b";
const ROADMAP_PATTERN: &str = r"(?i)\b(roadmaps?|milestones?)\b";
const TASK_PATTERN: &str = r"(?i)\b(tasks?|to-?dos?|dailies|daily quests?)\b";

impl QuestMutationSignal {
    /// Signal from a producer that knows what it changed.
    pub fn structured(entities: Vec<MutatedEntity>) -> Self {
        Self {
            entities,
            confidence: SignalConfidence::Structured,
        }
    }

    /// Guess from an assistant reply whether it changed quest data.
    ///
    /// Keyword matching only: an action verb plus an entity noun. Replies
    /// that merely talk about tasks will match too, and changes described
    /// in other words will be missed.
    pub fn from_reply_heuristic(reply: &str) -> Option<Self> {
        let action = Regex::new(ACTION_PATTERN).ok()?;
        if !action.is_match(reply) {
            return None;
        }

        let mut entities = Vec::new();
        for (pattern, entity) in [
            (GOAL_PATTERN, MutatedEntity::Goals),
            (ROADMAP_PATTERN, MutatedEntity::Roadmaps),
            (TASK_PATTERN, MutatedEntity::Tasks),
        ] {
            if let Ok(re) = Regex::new(pattern) {
                if re.is_match(reply) {
                    entities.push(entity);
                }
            }
        }

        if entities.is_empty() {
            return None;
        }
        Some(Self {
            entities,
            confidence: SignalConfidence::Heuristic,
        })
    }

    /// Whether anything the quest store caches is affected.
    pub fn touches_quests(&self) -> bool {
        !self.entities.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heuristic_detects_created_task() {
        let signal =
            QuestMutationSignal::from_reply_heuristic("Done! I created a task for tomorrow.")
                .unwrap();
        assert_eq!(signal.entities, vec![MutatedEntity::Tasks]);
        assert_eq!(signal.confidence, SignalConfidence::Heuristic);
        assert!(signal.touches_quests());
    }

    #[test]
    fn test_heuristic_needs_action_and_entity() {
        assert!(QuestMutationSignal::from_reply_heuristic("How are your tasks going?").is_none());
        assert!(QuestMutationSignal::from_reply_heuristic("I updated my playlist").is_none());
    }

    #[test]
    fn test_heuristic_collects_several_entities() {
        let signal = QuestMutationSignal::from_reply_heuristic(
            "I added a new goal and generated its roadmap with 4 milestones.",
        )
        .unwrap();
        assert_eq!(
            signal.entities,
            vec![MutatedEntity::Goals, MutatedEntity::Roadmaps]
        );
    }

    #[test]
    fn test_structured_signal() {
        let signal = QuestMutationSignal::structured(vec![MutatedEntity::Goals]);
        assert_eq!(signal.confidence, SignalConfidence::Structured);
        assert!(!QuestMutationSignal::structured(vec![]).touches_quests());
    }
}
