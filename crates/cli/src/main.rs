//! Questline CLI - goals, roadmaps and daily quests from the terminal.

mod config;

use std::sync::Arc;

use anyhow::Result;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use questline_core::{
    Goal, GoalId, MilestoneId, MilestoneStatus, NewGoal, NewTask, RoadmapStatus, Task, TaskId,
    TaskPriority, TaskStatus,
};
use questline_gateway::HttpQuestGateway;
use questline_progress::PollOutcome;
use questline_storage::JsonSnapshotStore;
use questline_store::{QuestStore, StoreConfig};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::CliConfig;

#[derive(Parser)]
#[command(name = "questline")]
#[command(about = "Goals, roadmaps and daily quests", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List goals
    Goals {
        /// Bypass the cache
        #[arg(long)]
        force: bool,
    },
    /// Create a goal
    AddGoal {
        /// Goal title
        title: String,
        /// Longer description
        #[arg(long, default_value = "")]
        description: String,
        /// Category
        #[arg(long, default_value = "")]
        category: String,
        /// Target date (YYYY-MM-DD)
        #[arg(long)]
        target: Option<NaiveDate>,
    },
    /// Delete a goal
    DeleteGoal {
        /// Goal ID
        goal: String,
    },
    /// Show today's tasks and, if unlocked, tomorrow's
    Today {
        /// Bypass the cache
        #[arg(long)]
        force: bool,
    },
    /// Make a goal's roadmap the active one
    Select {
        /// Goal ID
        goal: String,
    },
    /// Show a goal's roadmap
    Roadmap {
        /// Goal ID
        goal: String,
        /// Bypass the cache
        #[arg(long)]
        force: bool,
    },
    /// Generate a goal's roadmap
    Generate {
        /// Goal ID
        goal: String,
        /// Wait until generation finishes
        #[arg(long)]
        wait: bool,
    },
    /// Complete the active milestone of a goal
    CompleteMilestone {
        /// Goal ID
        goal: String,
        /// Milestone ID
        milestone: String,
    },
    /// Add a task
    AddTask {
        /// Task title
        title: String,
        /// Priority (low, medium, high)
        #[arg(long, default_value = "medium")]
        priority: TaskPriority,
        /// Due date (YYYY-MM-DD), defaults to today
        #[arg(long)]
        due: Option<NaiveDate>,
        /// Goal the task belongs to
        #[arg(long)]
        goal: Option<String>,
    },
    /// Mark a task completed
    CompleteTask {
        /// Task ID
        task: String,
    },
    /// Delete a task
    DeleteTask {
        /// Task ID
        task: String,
    },
    /// Reload goals, the active roadmap and today's tasks
    Refresh,
}

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let cli = Cli::parse();
    let config = CliConfig::from_env()?;

    let gateway = Arc::new(HttpQuestGateway::new(config.gateway())?);
    let snapshots = Arc::new(JsonSnapshotStore::new(&config.snapshot_path).await?);
    let store = QuestStore::new(gateway, snapshots, StoreConfig::default());
    if let Err(e) = store.restore().await {
        warn!("Starting without snapshot: {}", e);
    }

    match cli.command {
        Commands::Goals { force } => {
            let goals = store.fetch_goals(force).await?;
            let active = store.active_roadmap().await.map(|a| a.goal_id);

            println!("Goals ({})", goals.len());
            for goal in &goals {
                let marker = if active.as_ref() == Some(&goal.id) { "*" } else { " " };
                println!(" {} {}", marker, format_goal(goal));
            }
        }
        Commands::AddGoal {
            title,
            description,
            category,
            target,
        } => {
            let goal = store
                .create_goal(NewGoal {
                    title,
                    description,
                    category,
                    target_date: target,
                })
                .await?;
            println!("Added goal: {} - {}", goal.id, goal.title);
        }
        Commands::DeleteGoal { goal } => {
            store.delete_goal(&GoalId::new(goal.clone())).await?;
            println!("Deleted goal {}", goal);
        }
        Commands::Today { force } => {
            store.fetch_today_tasks(force).await?;
            store.fetch_future_tasks(force).await?;
            let available = store.get_available_tasks().await;

            println!("Today ({})", available.today.len());
            for task in &available.today {
                println!("  {}", format_task(task));
            }
            if available.show_future {
                println!("Tomorrow ({})", available.future.len());
                for task in &available.future {
                    println!("  {}", format_task(task));
                }
            } else {
                println!("Tomorrow: locked until 80% of today is done");
            }
        }
        Commands::Select { goal } => {
            match store.set_active_roadmap(&GoalId::new(goal)).await? {
                Some(active) => {
                    println!("Active roadmap: {}", active.goal.title);
                    if let Some(milestone) = active.active_milestone() {
                        println!("  Current milestone: {}", milestone.title);
                    }
                }
                None => println!("Selection superseded"),
            }
        }
        Commands::Roadmap { goal, force } => {
            let roadmap = store.fetch_roadmap(&GoalId::new(goal), force).await?;
            println!("{}", format_goal(&roadmap.goal));
            for milestone in &roadmap.milestones {
                println!(
                    "  {:>2}. [{}] {} ({})",
                    milestone.sequence,
                    format_milestone_status(milestone.status),
                    milestone.title,
                    milestone.id,
                );
            }
        }
        Commands::Generate { goal, wait } => {
            let goal_id = GoalId::new(goal);
            let Some(handle) = store.generate_roadmap(&goal_id).await? else {
                println!("Generation already in progress");
                return Ok(());
            };
            if !wait {
                println!("Generation started for {}", goal_id);
                return Ok(());
            }

            match handle.wait().await {
                Some(Ok(PollOutcome::Ready(goal))) => println!("Roadmap ready: {}", goal.title),
                Some(Ok(PollOutcome::Failed(_))) => println!("Roadmap generation failed"),
                Some(Ok(PollOutcome::TimedOut { attempts })) => {
                    println!("Gave up after {} checks; try `questline roadmap` later", attempts)
                }
                Some(Err(e)) => return Err(e.into()),
                None => println!("Generation polling cancelled"),
            }
        }
        Commands::CompleteMilestone { goal, milestone } => {
            let next = store
                .complete_milestone(&GoalId::new(goal), &MilestoneId::new(milestone))
                .await?;
            match next {
                Some(next) => println!("Milestone completed, next up: {}", next),
                None => println!("Milestone completed, roadmap finished"),
            }
        }
        Commands::AddTask {
            title,
            priority,
            due,
            goal,
        } => {
            let due = due.unwrap_or_else(|| store.today());
            let mut task = NewTask::new(title, due);
            task.priority = priority;
            task.goal_id = goal.map(GoalId::new);

            let task = store.create_task(task).await?;
            println!("Added task: {} - {}", task.id, task.title);
        }
        Commands::CompleteTask { task } => {
            let task = store.complete_task(&TaskId::new(task)).await?;
            println!("Completed: {}", task.title);
            if store.can_access_future().await {
                println!("Tomorrow's quests are unlocked");
            }
        }
        Commands::DeleteTask { task } => {
            store.delete_task(&TaskId::new(task.clone())).await?;
            println!("Deleted task {}", task);
        }
        Commands::Refresh => {
            store.refresh_quests_data().await?;
            info!("Refreshed {} goals", store.goals().await.len());
        }
    }

    Ok(())
}

fn format_goal(goal: &Goal) -> String {
    format!(
        "{} | {} | roadmap {}",
        goal.id,
        goal.title,
        format_roadmap_status(goal.roadmap_status)
    )
}

fn format_task(task: &Task) -> String {
    let check = match task.status {
        TaskStatus::Completed => "x",
        TaskStatus::InProgress => "~",
        TaskStatus::Pending => " ",
    };
    format!("[{}] {} | {:?} - {}", check, task.id, task.priority, task.title)
}

fn format_roadmap_status(status: RoadmapStatus) -> &'static str {
    match status {
        RoadmapStatus::None => "NONE",
        RoadmapStatus::Generating => "GENERATING",
        RoadmapStatus::Ready => "READY",
        RoadmapStatus::Error => "ERROR",
    }
}

fn format_milestone_status(status: MilestoneStatus) -> &'static str {
    match status {
        MilestoneStatus::Locked => " ",
        MilestoneStatus::Active => ">",
        MilestoneStatus::Completed => "x",
    }
}
