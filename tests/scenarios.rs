use std::sync::Arc;
use std::time::Duration;

use loadgen_scheduler::client::ClientRegistry;
use loadgen_scheduler::config::{ConfigHandle, SchedulerTunables};
use loadgen_scheduler::domain::client::{ClientKind, ClientRecord};
use loadgen_scheduler::domain::job::{DependencyId, Job, JobState};
use loadgen_scheduler::domain::job_group::{JobGroup, JobGroupMember, TemplateCommon};
use loadgen_scheduler::domain::optimizing_job::OptimizingJob;
use loadgen_scheduler::domain::parameter::{Parameter, ParameterValue};
use loadgen_scheduler::group::JobGroupComposer;
use loadgen_scheduler::optimizing::OptimizingController;
use loadgen_scheduler::repository::memory::InMemoryRepository;
use loadgen_scheduler::repository::Repository;
use loadgen_scheduler::scheduler::{JobOutcome, SchedulerCore};

fn fast_tunables() -> SchedulerTunables {
    SchedulerTunables {
        scheduler_delay: Duration::from_millis(5),
        start_buffer: Duration::from_millis(0),
    }
}

async fn wait_until<F: Fn() -> bool>(cond: F) {
    for _ in 0..200 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached in time");
}

async fn job_state(repo: &dyn Repository, id: loadgen_scheduler::id::JobId) -> JobState {
    repo.get_job(id).await.unwrap().unwrap().state
}

#[tokio::test]
async fn happy_path_single_job_runs_to_completion() {
    let repo: Arc<dyn Repository> = Arc::new(InMemoryRepository::new());
    let registry = Arc::new(ClientRegistry::new());
    registry.register(ClientRecord::new(ClientKind::Worker, "w1")).unwrap();
    let (_cfg, sub) = ConfigHandle::new(fast_tunables());
    let scheduler = SchedulerCore::new(repo.clone(), registry, sub);
    let handle = scheduler.handle();
    let runner = tokio::spawn(scheduler.clone().run());

    let job = Job::new("single", 1, Vec::new());
    let id = scheduler.submit(job).await.unwrap();

    wait_until(|| scheduler.metrics().running_now.load(std::sync::atomic::Ordering::Relaxed) == 1).await;
    handle.job_finished(id, JobOutcome::Completed { score: 1.0 }).await;

    wait_until(|| scheduler.metrics().completed.load(std::sync::atomic::Ordering::Relaxed) == 1).await;
    assert_eq!(job_state(repo.as_ref(), id).await, JobState::Completed);

    scheduler.shutdown();
    let _ = runner.await;
}

#[tokio::test]
async fn dependency_chain_runs_parent_before_child() {
    let repo: Arc<dyn Repository> = Arc::new(InMemoryRepository::new());
    let registry = Arc::new(ClientRegistry::new());
    registry.register(ClientRecord::new(ClientKind::Worker, "w1")).unwrap();
    let (_cfg, sub) = ConfigHandle::new(fast_tunables());
    let scheduler = SchedulerCore::new(repo.clone(), registry, sub);
    let handle = scheduler.handle();
    let runner = tokio::spawn(scheduler.clone().run());

    let parent = Job::new("parent", 1, Vec::new());
    let parent_id = parent.id;
    let mut child = Job::new("child", 1, Vec::new());
    child.depends_on.push(DependencyId::Job(parent_id));

    scheduler.submit(parent).await.unwrap();
    let child_id = scheduler.submit(child).await.unwrap();

    wait_until(|| scheduler.metrics().running_now.load(std::sync::atomic::Ordering::Relaxed) == 1).await;
    assert_eq!(job_state(repo.as_ref(), child_id).await, JobState::NotYetStarted);

    handle.job_finished(parent_id, JobOutcome::Completed { score: 1.0 }).await;
    wait_until(|| {
        futures::executor::block_on(job_state(repo.as_ref(), child_id)) == JobState::Running
    })
    .await;

    scheduler.shutdown();
    let _ = runner.await;
}

#[tokio::test]
async fn insufficient_clients_leaves_job_pending_without_blocking_indefinitely() {
    let repo: Arc<dyn Repository> = Arc::new(InMemoryRepository::new());
    let registry = Arc::new(ClientRegistry::new());
    registry.register(ClientRecord::new(ClientKind::Worker, "w1")).unwrap();
    let (_cfg, sub) = ConfigHandle::new(fast_tunables());
    let scheduler = SchedulerCore::new(repo.clone(), registry, sub);
    let runner = tokio::spawn(scheduler.clone().run());

    let job = Job::new("needs-two", 2, Vec::new());
    let id = scheduler.submit(job).await.unwrap();

    tokio::time::sleep(Duration::from_millis(40)).await;
    assert_eq!(job_state(repo.as_ref(), id).await, JobState::NotYetStarted);

    scheduler.shutdown();
    let _ = runner.await;
}

#[tokio::test]
async fn job_group_expands_into_independent_members() {
    let repo: Arc<dyn Repository> = Arc::new(InMemoryRepository::new());
    let registry = Arc::new(ClientRegistry::new());
    registry.register(ClientRecord::new(ClientKind::Worker, "w1")).unwrap();
    registry.register(ClientRecord::new(ClientKind::Worker, "w2")).unwrap();
    let (_cfg, sub) = ConfigHandle::new(fast_tunables());
    let scheduler = SchedulerCore::new(repo.clone(), registry, sub);
    let controller = OptimizingController::new(repo.clone(), scheduler.clone());
    let composer = JobGroupComposer::new(repo.clone(), scheduler.clone(), controller);
    let runner = tokio::spawn(scheduler.clone().run());

    let mut group = JobGroup::new("suite", vec![Parameter::fixed("rate", ParameterValue::Int(10))]);
    group.members.push(JobGroupMember::Job(TemplateCommon {
        name: "a".into(),
        job_class: "load-test".into(),
        client_requirement: 1,
        fixed_parameters: Vec::new(),
        mapped_parameters: Vec::new(),
        depends_on: Vec::new(),
        external_depends_on: Vec::new(),
    }));
    group.members.push(JobGroupMember::Job(TemplateCommon {
        name: "b".into(),
        job_class: "load-test".into(),
        client_requirement: 1,
        fixed_parameters: Vec::new(),
        mapped_parameters: Vec::new(),
        depends_on: Vec::new(),
        external_depends_on: Vec::new(),
    }));

    let ids = composer.submit(group, Vec::new()).await.unwrap();
    assert_eq!(ids.len(), 2);

    wait_until(|| scheduler.metrics().running_now.load(std::sync::atomic::Ordering::Relaxed) == 2).await;

    scheduler.shutdown();
    let _ = runner.await;
}

#[tokio::test]
async fn optimizing_job_runs_every_iteration_then_reruns_best() {
    let repo: Arc<dyn Repository> = Arc::new(InMemoryRepository::new());
    let registry = Arc::new(ClientRegistry::new());
    registry.register(ClientRecord::new(ClientKind::Worker, "w1")).unwrap();
    let (_cfg, sub) = ConfigHandle::new(fast_tunables());
    let scheduler = SchedulerCore::new(repo.clone(), registry, sub);
    let scheduler_handle = scheduler.handle();
    let controller = OptimizingController::new(repo.clone(), scheduler.clone());
    let runner = tokio::spawn(scheduler.clone().run());

    let oj = OptimizingJob::new("tune", 1, vec![Parameter::fixed("base", ParameterValue::Int(1))], 3);
    let oj_id = oj.id;
    controller.submit(oj).await.unwrap();

    for expected_iteration in 1..=3u32 {
        wait_until(|| {
            futures::executor::block_on(async {
                repo.get_optimizing_job(oj_id).await.unwrap().unwrap().current_iteration_job.is_some()
            })
        })
        .await;
        let job_id = repo
            .get_optimizing_job(oj_id)
            .await
            .unwrap()
            .unwrap()
            .current_iteration_job
            .unwrap();
        scheduler_handle.job_finished(job_id, JobOutcome::Completed { score: expected_iteration as f64 }).await;
        controller.on_job_finished(job_id, JobOutcome::Completed { score: expected_iteration as f64 }).await.unwrap();
    }

    wait_until(|| {
        futures::executor::block_on(async {
            repo.get_optimizing_job(oj_id).await.unwrap().unwrap().current_iteration_job.is_some()
        })
    })
    .await;
    let rerun_job_id = repo
        .get_optimizing_job(oj_id)
        .await
        .unwrap()
        .unwrap()
        .current_iteration_job
        .unwrap();
    scheduler_handle.job_finished(rerun_job_id, JobOutcome::Completed { score: 3.0 }).await;
    controller.on_job_finished(rerun_job_id, JobOutcome::Completed { score: 3.0 }).await.unwrap();

    let final_state = repo.get_optimizing_job(oj_id).await.unwrap().unwrap();
    assert!(final_state.is_complete());
    assert_eq!(final_state.best().unwrap().score, 3.0);

    scheduler.shutdown();
    let _ = runner.await;
}
