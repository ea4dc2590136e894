use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use cron::Schedule;
use tokio::time::{self, Duration};
use uuid::Uuid;

use crate::registry::TaskRegistry;

struct Job {
    goal: String,
    schedule: Schedule,
    next_fire: DateTime<Utc>,
}

/// Cron-driven resubmission of goals through the same entry point used by
/// `POST /task/submit`. Jobs live only in memory for this process's lifetime;
/// they are not persisted across daemon restarts.
pub struct Scheduler {
    registry: Arc<TaskRegistry>,
    jobs: Mutex<HashMap<String, Job>>,
}

/// The `cron` crate parses six-field, seconds-first expressions; the daemon's
/// public contract is standard five-field cron (minute hour dom month dow).
/// Bridge the two by prepending a `0` seconds field to a five-field expression.
fn to_six_field(cron_expr: &str) -> String {
    let field_count = cron_expr.split_whitespace().count();
    if field_count == 5 {
        format!("0 {cron_expr}")
    } else {
        cron_expr.to_string()
    }
}

impl Scheduler {
    pub fn new(registry: Arc<TaskRegistry>) -> Arc<Self> {
        Arc::new(Self {
            registry,
            jobs: Mutex::new(HashMap::new()),
        })
    }

    pub fn schedule(&self, goal: String, cron_expr: &str) -> Result<String, String> {
        let schedule = Schedule::from_str(&to_six_field(cron_expr))
            .map_err(|e| format!("invalid cron expression: {e}"))?;
        let next_fire = schedule
            .upcoming(Utc)
            .next()
            .ok_or_else(|| "cron expression has no upcoming fire time".to_string())?;

        let job_id = Uuid::new_v4().to_string();
        self.jobs.lock().unwrap().insert(
            job_id.clone(),
            Job {
                goal,
                schedule,
                next_fire,
            },
        );
        Ok(job_id)
    }

    pub fn start(self: Arc<Self>, submit: Arc<dyn Fn(String) + Send + Sync>) {
        let this = self;
        tokio::spawn(async move {
            tracing::info!("scheduler started, 60s tick");
            loop {
                time::sleep(Duration::from_secs(60)).await;
                let now = Utc::now();
                let due_goals: Vec<(String, String)> = {
                    let mut jobs = this.jobs.lock().unwrap();
                    let mut due = Vec::new();
                    for (id, job) in jobs.iter_mut() {
                        if job.next_fire <= now {
                            due.push((id.clone(), job.goal.clone()));
                            if let Some(next) = job.schedule.upcoming(Utc).next() {
                                job.next_fire = next;
                            }
                        }
                    }
                    due
                };

                for (job_id, goal) in due_goals {
                    tracing::info!(job_id, goal, "cron job due, resubmitting goal");
                    submit(goal);
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_invalid_cron_expression() {
        let registry = Arc::new(TaskRegistry::new(8));
        let scheduler = Scheduler::new(registry);
        assert!(scheduler.schedule("goal".to_string(), "not a cron").is_err());
    }

    #[test]
    fn accepts_valid_six_field_cron_expression() {
        let registry = Arc::new(TaskRegistry::new(8));
        let scheduler = Scheduler::new(registry);
        let job_id = scheduler.schedule("goal".to_string(), "0 0 * * * *").unwrap();
        assert!(scheduler.jobs.lock().unwrap().contains_key(&job_id));
    }

    #[test]
    fn accepts_standard_five_field_cron_expression() {
        let registry = Arc::new(TaskRegistry::new(8));
        let scheduler = Scheduler::new(registry);
        let job_id = scheduler.schedule("goal".to_string(), "0 9 * * 1-5").unwrap();
        assert!(scheduler.jobs.lock().unwrap().contains_key(&job_id));
    }
}
