//! End-to-end tests for a fleet of schedulers sharing one coordination
//! store.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use pretty_assertions::assert_eq;
use tokio::sync::watch;

use chime_coord::{CoordinationStore, ManualClock, MemoryStore};
use chime_scheduler::{
    PassOutcome, RepeatingTask, Scheduler, SchedulerConfig, SelectError, SubmitError,
    TaskRepository,
};

/// Repeating task that advances its own `next_run` by one hour on submit.
struct CountingTask {
    id: String,
    next_run: std::sync::Mutex<DateTime<Utc>>,
    submissions: AtomicUsize,
}

impl CountingTask {
    fn new(id: &str, next_run: DateTime<Utc>) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            next_run: std::sync::Mutex::new(next_run),
            submissions: AtomicUsize::new(0),
        })
    }

    fn submissions(&self) -> usize {
        self.submissions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RepeatingTask for CountingTask {
    fn id(&self) -> &str {
        &self.id
    }

    fn next_run(&self) -> DateTime<Utc> {
        *self.next_run.lock().unwrap()
    }

    async fn submit(&self) -> Result<(), SubmitError> {
        self.submissions.fetch_add(1, Ordering::SeqCst);
        let mut next_run = self.next_run.lock().unwrap();
        *next_run += chrono::Duration::hours(1);
        Ok(())
    }
}

struct InMemoryRepository {
    tasks: Vec<Arc<CountingTask>>,
}

#[async_trait]
impl TaskRepository for InMemoryRepository {
    async fn due_tasks(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<Arc<dyn RepeatingTask>>, SelectError> {
        Ok(self
            .tasks
            .iter()
            .filter(|t| t.next_run() <= now)
            .map(|t| Arc::clone(t) as Arc<dyn RepeatingTask>)
            .collect())
    }
}

fn fleet(
    size: usize,
    tasks: Vec<Arc<CountingTask>>,
    clock: &ManualClock,
) -> (Vec<Scheduler>, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new(Arc::new(clock.clone())));
    let repository = Arc::new(InMemoryRepository { tasks });
    let schedulers = (0..size)
        .map(|_| {
            Scheduler::new(
                Arc::clone(&store) as Arc<dyn CoordinationStore>,
                Arc::clone(&repository) as Arc<dyn TaskRepository>,
                Arc::new(clock.clone()),
                SchedulerConfig::default(),
            )
        })
        .collect();
    (schedulers, store)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn fleet_elects_one_scheduler_per_tick() {
    let nine = Utc.with_ymd_and_hms(2024, 5, 6, 9, 0, 0).unwrap();
    let clock = ManualClock::new(nine);
    let task = CountingTask::new("report", nine - chrono::Duration::minutes(10));
    let (schedulers, _store) = fleet(3, vec![Arc::clone(&task)], &clock);

    let (first, second, third) = tokio::join!(
        schedulers[0].tick(),
        schedulers[1].tick(),
        schedulers[2].tick()
    );

    let outcomes = [first, second, third];
    let winners: Vec<_> = outcomes.iter().flatten().collect();
    assert_eq!(winners.len(), 1, "exactly one instance runs the pass");
    assert_eq!(
        *winners[0],
        PassOutcome::Completed {
            submitted: 1,
            failed: 0
        }
    );
    assert_eq!(task.submissions(), 1, "the due task was submitted once");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn gate_reopens_for_the_following_tick() {
    let nine = Utc.with_ymd_and_hms(2024, 5, 6, 9, 0, 0).unwrap();
    let clock = ManualClock::new(nine);
    let task = CountingTask::new("report", nine - chrono::Duration::minutes(10));
    let (schedulers, _store) = fleet(3, vec![Arc::clone(&task)], &clock);

    let first_tick: Vec<_> = [
        schedulers[0].tick().await,
        schedulers[1].tick().await,
        schedulers[2].tick().await,
    ]
    .into_iter()
    .flatten()
    .collect();
    assert_eq!(first_tick.len(), 1);
    assert_eq!(task.submissions(), 1);

    // One minute later: the 30s gate marker has lapsed, the race reruns.
    clock.advance(chrono::Duration::seconds(60));
    let second_tick: Vec<_> = [
        schedulers[0].tick().await,
        schedulers[1].tick().await,
        schedulers[2].tick().await,
    ]
    .into_iter()
    .flatten()
    .collect();
    assert_eq!(second_tick.len(), 1, "a fresh election happens every tick");
    assert_eq!(
        second_tick[0],
        PassOutcome::Completed {
            submitted: 0,
            failed: 0
        },
        "the task advanced an hour, so nothing is due yet"
    );
    assert_eq!(task.submissions(), 1);
}

#[tokio::test]
async fn passive_instance_does_nothing_while_gate_is_held() {
    let now = Utc::now();
    let clock = ManualClock::new(now);
    let task = CountingTask::new("report", now - chrono::Duration::minutes(10));
    let (schedulers, _store) = fleet(2, vec![Arc::clone(&task)], &clock);

    assert!(schedulers[0].tick().await.is_some());
    assert_eq!(
        schedulers[1].tick().await,
        None,
        "the loser of the gate stays passive for the tick"
    );
    assert_eq!(task.submissions(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn loop_runs_one_pass_then_waits_for_the_boundary() {
    // 45 seconds of minute left: the first tick fires immediately, then
    // the loop parks until the boundary.
    let start = Utc.with_ymd_and_hms(2024, 5, 6, 9, 0, 15).unwrap();
    let clock = ManualClock::new(start);
    let task = CountingTask::new("report", start - chrono::Duration::minutes(10));
    let (mut schedulers, _store) = fleet(1, vec![Arc::clone(&task)], &clock);
    let scheduler = schedulers.remove(0);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(async move { scheduler.run(shutdown_rx).await });

    let mut waited = 0;
    while task.submissions() == 0 && waited < 200 {
        tokio::time::sleep(Duration::from_millis(10)).await;
        waited += 1;
    }
    assert_eq!(task.submissions(), 1, "the loop ran exactly one pass");

    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("loop should exit promptly on shutdown")
        .unwrap();

    assert_eq!(task.submissions(), 1, "no extra pass ran during shutdown");
}

#[tokio::test]
async fn loop_exits_without_a_pass_when_already_shut_down() {
    let now = Utc::now();
    let clock = ManualClock::new(now);
    let task = CountingTask::new("report", now - chrono::Duration::minutes(10));
    let (mut schedulers, _store) = fleet(1, vec![Arc::clone(&task)], &clock);
    let scheduler = schedulers.remove(0);

    let (_shutdown_tx, shutdown_rx) = watch::channel(true);
    tokio::time::timeout(Duration::from_secs(5), scheduler.run(shutdown_rx))
        .await
        .expect("run should return immediately");

    assert_eq!(task.submissions(), 0);
}
