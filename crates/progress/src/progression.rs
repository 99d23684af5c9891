//! Active roadmap selection and the milestone state machine.
//!
//! Milestones move `locked -> active -> completed` and never back. At most
//! one milestone per goal is active; completing it activates the locked
//! milestone with the lowest sequence number.
//!
//! Selection requests are identified by [`SelectionTicket`]s. Every explicit
//! selection bumps the engine's intent counter, so a response that belongs
//! to an older intent is discarded instead of overwriting a newer choice,
//! regardless of the order in which responses arrive.

use questline_core::{ActiveRoadmap, Goal, GoalId, Milestone, MilestoneId, MilestoneStatus};
use tracing::{debug, info, warn};

use crate::error::{QuestError, Result};

/// Inconsistencies in a roadmap received from the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoadmapAnomaly {
    /// Two milestones share a sequence number
    DuplicateSequence(u32),
    /// More than one milestone is active
    MultipleActive(Vec<MilestoneId>),
    /// A completed milestone follows one that is not completed
    CompletedOutOfOrder(MilestoneId),
    /// Milestone belongs to another goal
    ForeignMilestone(MilestoneId),
}

impl std::fmt::Display for RoadmapAnomaly {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DuplicateSequence(seq) => write!(f, "duplicate sequence number {}", seq),
            Self::MultipleActive(ids) => write!(f, "{} active milestones", ids.len()),
            Self::CompletedOutOfOrder(id) => write!(f, "milestone {} completed out of order", id),
            Self::ForeignMilestone(id) => write!(f, "milestone {} belongs to another goal", id),
        }
    }
}

/// Check a roadmap (ordered by sequence) against the milestone invariants.
pub fn check_roadmap(goal_id: &GoalId, milestones: &[Milestone]) -> Vec<RoadmapAnomaly> {
    let mut anomalies = Vec::new();

    for pair in milestones.windows(2) {
        if pair[0].sequence == pair[1].sequence {
            anomalies.push(RoadmapAnomaly::DuplicateSequence(pair[1].sequence));
        }
    }

    let active: Vec<MilestoneId> = milestones
        .iter()
        .filter(|m| m.status == MilestoneStatus::Active)
        .map(|m| m.id.clone())
        .collect();
    if active.len() > 1 {
        anomalies.push(RoadmapAnomaly::MultipleActive(active));
    }

    let mut open_seen = false;
    for milestone in milestones {
        if &milestone.goal_id != goal_id {
            anomalies.push(RoadmapAnomaly::ForeignMilestone(milestone.id.clone()));
        }
        match milestone.status {
            MilestoneStatus::Completed if open_seen => {
                anomalies.push(RoadmapAnomaly::CompletedOutOfOrder(milestone.id.clone()));
            }
            MilestoneStatus::Completed => {}
            _ => open_seen = true,
        }
    }

    anomalies
}

/// Order milestones by sequence and report anomalies. Nothing is repaired.
pub fn normalize_roadmap(goal_id: &GoalId, mut milestones: Vec<Milestone>) -> Vec<Milestone> {
    milestones.sort_by_key(|m| m.sequence);
    for anomaly in check_roadmap(goal_id, &milestones) {
        warn!("Roadmap for goal {}: {}", goal_id, anomaly);
    }
    milestones
}

/// Activate the first locked milestone if none is active.
///
/// Returns the activated milestone, or `None` when a milestone is already
/// active or nothing is left locked (the roadmap is finished).
pub fn activate_next(milestones: &mut [Milestone]) -> Option<MilestoneId> {
    if milestones.iter().any(|m| m.status == MilestoneStatus::Active) {
        return None;
    }

    let next = milestones
        .iter_mut()
        .filter(|m| m.status == MilestoneStatus::Locked)
        .min_by_key(|m| m.sequence)?;
    next.activate().ok()?;
    debug!("Activated milestone {} (#{})", next.id, next.sequence);
    Some(next.id.clone())
}

/// Complete the active milestone and activate the next one.
///
/// Only the active milestone may be completed, which keeps completions in
/// sequence order.
pub fn complete_and_advance(
    milestones: &mut [Milestone],
    milestone_id: &MilestoneId,
) -> Result<Option<MilestoneId>> {
    let milestone = milestones
        .iter_mut()
        .find(|m| &m.id == milestone_id)
        .ok_or_else(|| QuestError::NotFound(format!("milestone {}", milestone_id)))?;

    if milestone.status != MilestoneStatus::Active {
        return Err(QuestError::InvalidTransition(format!(
            "milestone {} is {}; only the active milestone can be completed",
            milestone_id, milestone.status
        )));
    }
    milestone.complete()?;

    Ok(activate_next(milestones))
}

/// Check a task may be attached to a milestone.
pub fn ensure_can_bind(milestones: &[Milestone], milestone_id: &MilestoneId) -> Result<()> {
    let milestone = milestones
        .iter()
        .find(|m| &m.id == milestone_id)
        .ok_or_else(|| QuestError::NotFound(format!("milestone {}", milestone_id)))?;

    if !milestone.can_hold_tasks() {
        return Err(QuestError::InvalidTransition(format!(
            "milestone {} is locked and cannot hold tasks",
            milestone_id
        )));
    }
    Ok(())
}

/// Identity of an in-flight selection request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionTicket {
    goal_id: GoalId,
    intent: u64,
    refresh: bool,
}

impl SelectionTicket {
    /// Goal the request was made for.
    pub fn goal_id(&self) -> &GoalId {
        &self.goal_id
    }
}

/// Owner of the active roadmap selection.
#[derive(Debug, Default)]
pub struct ProgressionEngine {
    selection: Option<ActiveRoadmap>,
    /// Bumped on every explicit selection or clear
    intent: u64,
    /// Goal of the latest explicit selection, applied or still in flight
    intended: Option<GoalId>,
}

impl ProgressionEngine {
    /// Engine with nothing selected.
    pub fn new() -> Self {
        Self::default()
    }

    /// Engine resuming a persisted selection.
    pub fn restore(selection: Option<ActiveRoadmap>) -> Self {
        Self {
            intended: selection.as_ref().map(|s| s.goal_id.clone()),
            selection,
            intent: 0,
        }
    }

    /// Current selection.
    pub fn selection(&self) -> Option<&ActiveRoadmap> {
        self.selection.as_ref()
    }

    /// Goal of the current selection.
    pub fn selected_goal(&self) -> Option<&GoalId> {
        self.selection.as_ref().map(|s| &s.goal_id)
    }

    /// Milestone in progress within the selection.
    pub fn active_milestone(&self) -> Option<&Milestone> {
        self.selection.as_ref().and_then(|s| s.active_milestone())
    }

    /// Current intent counter.
    pub fn intent(&self) -> u64 {
        self.intent
    }

    /// Start an explicit selection of `goal_id`. Supersedes every earlier
    /// request.
    pub fn begin_selection(&mut self, goal_id: &GoalId) -> SelectionTicket {
        self.intent += 1;
        self.intended = Some(goal_id.clone());
        SelectionTicket {
            goal_id: goal_id.clone(),
            intent: self.intent,
            refresh: false,
        }
    }

    /// Start an automatic selection. Only granted while nothing has been
    /// selected or requested in this session.
    pub fn begin_auto_selection(&mut self, goal_id: &GoalId) -> Option<SelectionTicket> {
        if self.selection.is_some() || self.intended.is_some() || self.intent != 0 {
            return None;
        }
        Some(self.begin_selection(goal_id))
    }

    /// Start a selection on behalf of a background job that began when the
    /// intent counter was `since`. Refused if the user chose since then.
    pub fn begin_selection_since(&mut self, goal_id: &GoalId, since: u64) -> Option<SelectionTicket> {
        if self.intent != since {
            debug!(
                "Not selecting goal {}: selection intent changed ({} -> {})",
                goal_id, since, self.intent
            );
            return None;
        }
        Some(self.begin_selection(goal_id))
    }

    /// Start a refresh of the selected roadmap. Its result only lands if the
    /// same goal is still selected and nothing newer was requested.
    pub fn begin_refresh(&self, goal_id: &GoalId) -> SelectionTicket {
        SelectionTicket {
            goal_id: goal_id.clone(),
            intent: self.intent,
            refresh: true,
        }
    }

    /// Whether a response for `ticket` may still be applied.
    pub fn is_current(&self, ticket: &SelectionTicket) -> bool {
        ticket.intent == self.intent
            && (!ticket.refresh || self.selected_goal() == Some(&ticket.goal_id))
    }

    /// Install `selection` if `ticket` is still current.
    pub fn apply(&mut self, ticket: &SelectionTicket, selection: ActiveRoadmap) -> bool {
        if selection.goal_id != ticket.goal_id || !self.is_current(ticket) {
            warn!(
                "Discarding stale roadmap response for goal {} (intent {}, now {})",
                ticket.goal_id, ticket.intent, self.intent
            );
            return false;
        }

        if self.selected_goal() != Some(&selection.goal_id) {
            info!("Active roadmap -> goal {}", selection.goal_id);
        }
        self.selection = Some(selection);
        true
    }

    /// Drop the selection and any in-flight request.
    pub fn clear(&mut self) {
        self.intent += 1;
        self.intended = None;
        if let Some(previous) = self.selection.take() {
            info!("Active roadmap cleared (was goal {})", previous.goal_id);
        }
    }

    /// Forget a deleted goal: clears the selection or cancels an in-flight
    /// request if either refers to it.
    pub fn forget_goal(&mut self, goal_id: &GoalId) -> bool {
        let selected = self.selected_goal() == Some(goal_id);
        let requested = self.intended.as_ref() == Some(goal_id);
        if selected || requested {
            self.clear();
            return true;
        }
        false
    }

    /// Refresh the denormalized goal inside the selection.
    pub fn update_goal(&mut self, goal: &Goal) {
        if let Some(selection) = self.selection.as_mut() {
            if selection.goal_id == goal.id {
                selection.goal = goal.clone();
            }
        }
    }

    /// Replace the selected goal's milestones with a server-confirmed list.
    pub fn replace_milestones(&mut self, goal_id: &GoalId, milestones: Vec<Milestone>) -> bool {
        match self.selection.as_mut() {
            Some(selection) if &selection.goal_id == goal_id => {
                selection.milestones = milestones;
                selection.roadmap_unavailable = false;
                true
            }
            _ => false,
        }
    }
}

/// First goal whose roadmap is ready, the candidate for auto-selection.
pub fn auto_select_candidate(goals: &[Goal]) -> Option<&Goal> {
    goals.iter().find(|g| g.has_roadmap())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use questline_core::{GoalStatus, RoadmapStatus};

    fn goal(id: &str, roadmap_status: RoadmapStatus) -> Goal {
        Goal {
            id: GoalId::new(id),
            title: format!("Goal {}", id),
            description: String::new(),
            category: String::new(),
            target_date: None,
            status: GoalStatus::Active,
            roadmap_status,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn milestone(sequence: u32, status: MilestoneStatus) -> Milestone {
        Milestone {
            id: MilestoneId::new(format!("m{}", sequence)),
            goal_id: GoalId::new("g1"),
            sequence,
            title: format!("Step {}", sequence),
            description: String::new(),
            duration_estimate: None,
            status,
        }
    }

    fn roadmap() -> Vec<Milestone> {
        vec![
            milestone(1, MilestoneStatus::Active),
            milestone(2, MilestoneStatus::Locked),
            milestone(3, MilestoneStatus::Locked),
        ]
    }

    fn active_count(milestones: &[Milestone]) -> usize {
        milestones
            .iter()
            .filter(|m| m.status == MilestoneStatus::Active)
            .count()
    }

    #[test]
    fn test_completion_walks_sequence_in_order() {
        let mut milestones = roadmap();

        let next = complete_and_advance(&mut milestones, &MilestoneId::new("m1")).unwrap();
        assert_eq!(next, Some(MilestoneId::new("m2")));
        assert_eq!(active_count(&milestones), 1);

        let next = complete_and_advance(&mut milestones, &MilestoneId::new("m2")).unwrap();
        assert_eq!(next, Some(MilestoneId::new("m3")));

        let next = complete_and_advance(&mut milestones, &MilestoneId::new("m3")).unwrap();
        assert_eq!(next, None);
        assert!(milestones.iter().all(|m| m.status == MilestoneStatus::Completed));
        assert!(check_roadmap(&GoalId::new("g1"), &milestones).is_empty());
    }

    #[test]
    fn test_cannot_complete_locked_or_completed() {
        let mut milestones = roadmap();

        let err = complete_and_advance(&mut milestones, &MilestoneId::new("m3")).unwrap_err();
        assert!(matches!(err, QuestError::InvalidTransition(_)));
        assert_eq!(milestones, roadmap());

        complete_and_advance(&mut milestones, &MilestoneId::new("m1")).unwrap();
        let err = complete_and_advance(&mut milestones, &MilestoneId::new("m1")).unwrap_err();
        assert!(matches!(err, QuestError::InvalidTransition(_)));

        let err = complete_and_advance(&mut milestones, &MilestoneId::new("m9")).unwrap_err();
        assert!(matches!(err, QuestError::NotFound(_)));
    }

    #[test]
    fn test_activate_next_respects_single_active() {
        let mut milestones = roadmap();
        assert_eq!(activate_next(&mut milestones), None);

        let mut all_locked = vec![
            milestone(5, MilestoneStatus::Locked),
            milestone(2, MilestoneStatus::Locked),
        ];
        assert_eq!(activate_next(&mut all_locked), Some(MilestoneId::new("m2")));
        assert_eq!(activate_next(&mut all_locked), None);
    }

    #[test]
    fn test_locked_milestone_cannot_hold_tasks() {
        let milestones = roadmap();
        assert!(ensure_can_bind(&milestones, &MilestoneId::new("m1")).is_ok());
        assert!(matches!(
            ensure_can_bind(&milestones, &MilestoneId::new("m2")),
            Err(QuestError::InvalidTransition(_))
        ));
    }

    #[test]
    fn test_check_roadmap_reports_anomalies() {
        let goal_id = GoalId::new("g1");
        let milestones = normalize_roadmap(
            &goal_id,
            vec![
                milestone(3, MilestoneStatus::Completed),
                milestone(1, MilestoneStatus::Active),
                milestone(2, MilestoneStatus::Active),
            ],
        );
        assert_eq!(milestones[0].sequence, 1);

        let anomalies = check_roadmap(&goal_id, &milestones);
        assert!(anomalies.contains(&RoadmapAnomaly::MultipleActive(vec![
            MilestoneId::new("m1"),
            MilestoneId::new("m2"),
        ])));
        assert!(anomalies.contains(&RoadmapAnomaly::CompletedOutOfOrder(MilestoneId::new("m3"))));
        assert!(check_roadmap(&GoalId::new("other"), &milestones)
            .contains(&RoadmapAnomaly::ForeignMilestone(MilestoneId::new("m1"))));
    }

    #[test]
    fn test_stale_selection_discarded() {
        let mut engine = ProgressionEngine::new();
        let a = goal("a", RoadmapStatus::Ready);
        let b = goal("b", RoadmapStatus::Ready);

        let ticket_a = engine.begin_selection(&a.id);
        let ticket_b = engine.begin_selection(&b.id);

        assert!(engine.apply(&ticket_b, ActiveRoadmap::without_roadmap(b.clone())));
        assert!(!engine.apply(&ticket_a, ActiveRoadmap::without_roadmap(a)));
        assert_eq!(engine.selected_goal(), Some(&b.id));
    }

    #[test]
    fn test_ticket_rejects_mismatched_goal() {
        let mut engine = ProgressionEngine::new();
        let ticket = engine.begin_selection(&GoalId::new("a"));
        assert!(!engine.apply(
            &ticket,
            ActiveRoadmap::without_roadmap(goal("b", RoadmapStatus::Ready))
        ));
        assert!(engine.selection().is_none());
    }

    #[test]
    fn test_refresh_dropped_after_switch() {
        let a = goal("a", RoadmapStatus::Ready);
        let b = goal("b", RoadmapStatus::Ready);
        let mut engine = ProgressionEngine::restore(Some(ActiveRoadmap::without_roadmap(a.clone())));

        let refresh = engine.begin_refresh(&a.id);
        assert!(engine.is_current(&refresh));

        let select_b = engine.begin_selection(&b.id);
        engine.apply(&select_b, ActiveRoadmap::without_roadmap(b.clone()));

        assert!(!engine.apply(&refresh, ActiveRoadmap::new(a, roadmap())));
        assert_eq!(engine.selected_goal(), Some(&b.id));
    }

    #[test]
    fn test_auto_selection_only_when_nothing_chosen() {
        let mut engine = ProgressionEngine::new();
        let explicit = engine.begin_selection(&GoalId::new("b"));
        assert!(engine.begin_auto_selection(&GoalId::new("a")).is_none());
        assert!(engine.is_current(&explicit));

        let mut fresh = ProgressionEngine::new();
        assert!(fresh.begin_auto_selection(&GoalId::new("a")).is_some());
    }

    #[test]
    fn test_background_selection_refused_after_user_choice() {
        let mut engine = ProgressionEngine::new();
        let since = engine.intent();
        engine.begin_selection(&GoalId::new("b"));
        assert!(engine.begin_selection_since(&GoalId::new("a"), since).is_none());

        let since = engine.intent();
        assert!(engine.begin_selection_since(&GoalId::new("a"), since).is_some());
    }

    #[test]
    fn test_forget_goal_clears_selection_and_pending_request() {
        let a = goal("a", RoadmapStatus::Ready);
        let mut engine = ProgressionEngine::restore(Some(ActiveRoadmap::without_roadmap(a.clone())));
        assert!(!engine.forget_goal(&GoalId::new("other")));
        assert!(engine.forget_goal(&a.id));
        assert!(engine.selection().is_none());

        let ticket = engine.begin_selection(&a.id);
        assert!(engine.forget_goal(&a.id));
        assert!(!engine.apply(&ticket, ActiveRoadmap::without_roadmap(a)));
    }

    #[test]
    fn test_auto_select_candidate_picks_first_ready() {
        let goals = vec![
            goal("a", RoadmapStatus::Generating),
            goal("b", RoadmapStatus::Ready),
            goal("c", RoadmapStatus::Ready),
        ];
        assert_eq!(auto_select_candidate(&goals).map(|g| g.id.as_str()), Some("b"));
        assert!(auto_select_candidate(&goals[..1]).is_none());
    }
}
