use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::job::{DependencyId, Job, JobState};
use crate::domain::parameter::Parameter;
use crate::error::{Error, Result};
use crate::id::{JobGroupId, JobId, OptimizingJobId};

/// Outcome recorded for one completed iteration of an optimizing job's
/// thread-count search (§3.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IterationResult {
    pub iteration: u32,
    pub job_id: JobId,
    pub thread_count: u32,
    pub score: f64,
    pub finished_at: DateTime<Utc>,
}

/// Why an optimizing job's search stopped (§4.2 point 2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    ReachedMaxThreads,
    NonImprovingStreakExhausted,
    Explicit,
}

impl StopReason {
    pub fn message(self) -> &'static str {
        match self {
            StopReason::ReachedMaxThreads => "reached maxThreads",
            StopReason::NonImprovingStreakExhausted => "non-improving streak hit threshold",
            StopReason::Explicit => "explicit stop",
        }
    }
}

/// An iterative meta-job (C8, §3.2, §4.2). The controller schedules one
/// child `Job` at a time, growing `threadCount(iteration) = minThreads +
/// iteration * threadIncrement` (clipped at `maxThreads`), until either the
/// clipped thread count has been reached or `maxNonImproving` consecutive
/// iterations fail to beat the running best score. If `rerunBestIteration`
/// is set and the best iteration did not run at the most recently tried
/// thread count, one further child is admitted at that thread count before
/// the optimizing job itself is reported `Completed`.
///
/// Invariant: at most one iteration is ever outstanding (`current_iteration_job`
/// is `Some` for exactly one child at a time, whether a regular iteration or
/// the best re-run).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizingJob {
    pub id: OptimizingJobId,
    pub name: String,
    pub job_class: String,
    pub client_requirement: u32,
    pub base_parameters: Vec<Parameter>,
    pub min_threads: u32,
    pub max_threads: Option<u32>,
    pub thread_increment: u32,
    pub max_non_improving: u32,
    pub iteration_duration_secs: u64,
    pub collection_interval_secs: u32,
    pub delay_between_iterations_secs: u64,
    pub thread_startup_delay_ms: u64,
    pub rerun_best_iteration: bool,
    pub rerun_duration_secs: Option<u64>,
    #[serde(default)]
    pub depends_on: Vec<DependencyId>,
    #[serde(default)]
    pub group_id: Option<JobGroupId>,
    pub state: JobState,
    pub actual_start_time: Option<DateTime<Utc>>,
    pub history: Vec<IterationResult>,
    #[serde(default)]
    pub non_improving_streak: u32,
    pub current_iteration_job: Option<JobId>,
    pub rerun_job: Option<JobId>,
    pub best_iteration_index: Option<usize>,
    pub stop_reason: Option<String>,
    #[serde(default)]
    pub version: u32,
}

impl OptimizingJob {
    pub fn new(name: impl Into<String>, client_requirement: u32, base_parameters: Vec<Parameter>, max_iterations: u32) -> Self {
        let name = name.into();
        Self {
            id: OptimizingJobId::new(),
            job_class: name.clone(),
            name,
            client_requirement,
            base_parameters,
            min_threads: 1,
            max_threads: Some(max_iterations.max(1)),
            thread_increment: 1,
            max_non_improving: max_iterations.max(1),
            iteration_duration_secs: 30,
            collection_interval_secs: 5,
            delay_between_iterations_secs: 0,
            thread_startup_delay_ms: 0,
            rerun_best_iteration: false,
            rerun_duration_secs: None,
            depends_on: Vec::new(),
            group_id: None,
            state: JobState::NotYetStarted,
            actual_start_time: None,
            history: Vec::new(),
            non_improving_streak: 0,
            current_iteration_job: None,
            rerun_job: None,
            best_iteration_index: None,
            stop_reason: None,
            version: 0,
        }
    }

    pub fn with_thread_search(mut self, min: u32, max: Option<u32>, increment: u32, max_non_improving: u32) -> Self {
        self.min_threads = min;
        self.max_threads = max;
        self.thread_increment = increment.max(1);
        self.max_non_improving = max_non_improving.max(1);
        self
    }

    pub fn with_rerun_best(mut self, rerun: bool, duration_secs: Option<u64>) -> Self {
        self.rerun_best_iteration = rerun;
        self.rerun_duration_secs = duration_secs;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.thread_increment == 0 {
            return Err(Error::admission("optimizing job thread increment must be at least 1"));
        }
        if let Some(max) = self.max_threads {
            if max < self.min_threads {
                return Err(Error::admission("optimizing job maxThreads must be >= minThreads"));
            }
        }
        for p in &self.base_parameters {
            p.validate()?;
        }
        Ok(())
    }

    pub fn iterations_run(&self) -> u32 {
        self.history.len() as u32
    }

    /// `threadCount(iteration k) = minThreads + k * threadIncrement`, clipped
    /// at `maxThreads` (§3.2 invariant).
    pub fn thread_count(&self, iteration_index: u32) -> u32 {
        let raw = self.min_threads + iteration_index * self.thread_increment;
        match self.max_threads {
            Some(max) => raw.min(max),
            None => raw,
        }
    }

    pub fn next_thread_count(&self) -> u32 {
        self.thread_count(self.iterations_run())
    }

    /// True iff the optimizing job's own state is terminal (§4.2).
    pub fn done_running(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn is_complete(&self) -> bool {
        self.state == JobState::Completed
    }

    /// The best-scoring iteration recorded so far, if any.
    pub fn best(&self) -> Option<&IterationResult> {
        self.best_iteration_index.and_then(|i| self.history.get(i))
    }

    /// Folds one finished iteration's score into the running best and the
    /// non-improving streak, per §4.2 point 2.
    pub fn record_iteration(&mut self, job_id: JobId, threads: u32, score: f64) {
        let iteration = self.iterations_run() + 1;
        let result = IterationResult {
            iteration,
            job_id,
            thread_count: threads,
            score,
            finished_at: Utc::now(),
        };
        let improved = self.best().map(|b| score > b.score).unwrap_or(true);
        self.history.push(result);
        if improved {
            self.best_iteration_index = Some(self.history.len() - 1);
            self.non_improving_streak = 0;
        } else {
            self.non_improving_streak += 1;
        }
        self.current_iteration_job = None;
        self.version += 1;
    }

    /// Decides whether the search should stop after the iteration just
    /// recorded, and why.
    fn stop_reason_after_last(&self) -> Option<StopReason> {
        let last = self.history.last()?;
        if let Some(max) = self.max_threads {
            if last.thread_count >= max {
                return Some(StopReason::ReachedMaxThreads);
            }
        }
        if self.non_improving_streak >= self.max_non_improving {
            return Some(StopReason::NonImprovingStreakExhausted);
        }
        None
    }

    /// Builds the `Job` for the next iteration (or the best-configuration
    /// re-run), or `None` if nothing further should be admitted right now.
    /// Mutates `current_iteration_job`/`rerun_job` bookkeeping and, when the
    /// search has nothing left to try, marks the optimizing job `Completed`.
    pub fn next_child_job(&mut self) -> Option<Job> {
        if self.current_iteration_job.is_some() {
            return None;
        }

        if self.history.is_empty() || self.stop_reason_after_last().is_none() {
            let threads = self.next_thread_count();
            let mut job = Job::new(format!("{} [threads={threads}]", self.name), self.client_requirement, self.base_parameters.clone())
                .with_threads_per_client(threads)
                .with_parent_optimizing_job(self.id)
                .with_max_duration_secs(Some(self.iteration_duration_secs));
            if !self.history.is_empty() && self.delay_between_iterations_secs > 0 {
                job = job.with_start_time(Utc::now() + chrono::Duration::seconds(self.delay_between_iterations_secs as i64));
            }
            self.current_iteration_job = Some(job.id);
            return Some(job);
        }

        if self.stop_reason.is_none() {
            self.stop_reason = Some(self.stop_reason_after_last().unwrap().message().to_string());
        }

        if self.rerun_job.is_some() {
            return None;
        }

        let best = self.best()?.clone();
        let most_recent_threads = self.history.last().map(|h| h.thread_count);
        if self.rerun_best_iteration && Some(best.thread_count) != most_recent_threads {
            let job = Job::new(format!("{} [best re-run @ {} threads]", self.name, best.thread_count), self.client_requirement, self.base_parameters.clone())
                .with_threads_per_client(best.thread_count)
                .with_parent_optimizing_job(self.id)
                .with_max_duration_secs(self.rerun_duration_secs.or(Some(self.iteration_duration_secs)));
            self.rerun_job = Some(job.id);
            self.current_iteration_job = Some(job.id);
            return Some(job);
        }

        None
    }

    /// Called once the best-iteration re-run (if any) has finished, or
    /// immediately once the search stops if no re-run was warranted.
    pub fn finish(&mut self, final_state: JobState) -> Result<()> {
        self.current_iteration_job = None;
        if !self.state.can_transition_to(final_state) {
            return Err(Error::InvalidStateTransition {
                job_id: self.id.to_string(),
                from: self.state,
                to: final_state,
            });
        }
        self.state = final_state;
        self.version += 1;
        Ok(())
    }

    /// The parent becomes `Running` as soon as its first iteration is
    /// admitted (§4.1: "if the job has a parent optimizing-job that is not
    /// yet Running, also transition the parent to Running").
    pub fn mark_running(&mut self) {
        if self.state == JobState::NotYetStarted {
            self.state = JobState::Running;
            self.actual_start_time = Some(Utc::now());
            self.version += 1;
        }
    }
}

/// Maps a finished iteration `Job`'s terminal state to a numeric score used
/// for best-configuration selection. Jobs that did not `Complete` score
/// negative infinity so they are never chosen as best.
pub fn score_for_state(state: JobState, raw_score: f64) -> f64 {
    if state == JobState::Completed {
        raw_score
    } else {
        f64::NEG_INFINITY
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::parameter::ParameterValue;

    fn sample() -> OptimizingJob {
        OptimizingJob::new("tune-concurrency", 1, vec![Parameter::fixed("base", ParameterValue::Int(1))], 10)
            .with_thread_search(1, Some(4), 1, 1)
            .with_rerun_best(true, Some(10))
    }

    #[test]
    fn thread_count_follows_linear_formula_clipped_at_max() {
        let oj = sample();
        assert_eq!(oj.thread_count(0), 1);
        assert_eq!(oj.thread_count(1), 2);
        assert_eq!(oj.thread_count(2), 3);
        assert_eq!(oj.thread_count(3), 4);
        assert_eq!(oj.thread_count(10), 4);
    }

    #[test]
    fn full_search_then_best_rerun_matches_scenario() {
        let mut oj = sample();
        let scores = [10.0, 20.0, 30.0, 25.0];
        for &score in &scores {
            let job = oj.next_child_job().expect("expected an iteration job");
            assert!(oj.next_child_job().is_none(), "only one outstanding iteration at a time");
            let threads = job.threads_per_client;
            oj.record_iteration(job.id, threads, score);
        }
        // iteration 4 hit maxThreads=4, so the search stops there even
        // though the non-improving streak (1) also hit max_non_improving.
        assert_eq!(oj.best().unwrap().score, 30.0);
        assert_eq!(oj.best().unwrap().thread_count, 3);

        let rerun = oj.next_child_job().expect("expected a best-iteration rerun");
        assert_eq!(rerun.threads_per_client, 3);
        assert!(oj.next_child_job().is_none());
        assert_eq!(oj.stop_reason.as_deref(), Some("reached maxThreads"));

        oj.finish(JobState::Completed).unwrap();
        assert!(oj.is_complete());
        assert!(oj.done_running());
    }

    #[test]
    fn no_rerun_when_best_is_most_recent_iteration() {
        let mut oj = OptimizingJob::new("tune", 1, Vec::new(), 10)
            .with_thread_search(1, Some(3), 1, 5)
            .with_rerun_best(true, None);
        for score in [1.0, 2.0, 3.0] {
            let job = oj.next_child_job().unwrap();
            let threads = job.threads_per_client;
            oj.record_iteration(job.id, threads, score);
        }
        assert!(oj.next_child_job().is_none(), "best ran most recently, no rerun needed");
    }

    #[test]
    fn non_improving_streak_stops_search_before_max_threads() {
        let mut oj = OptimizingJob::new("tune", 1, Vec::new(), 10).with_thread_search(1, Some(100), 1, 2);
        for score in [10.0, 5.0, 4.0] {
            let job = oj.next_child_job().unwrap();
            let threads = job.threads_per_client;
            oj.record_iteration(job.id, threads, score);
        }
        assert!(oj.next_child_job().is_none());
        assert_eq!(oj.stop_reason.as_deref(), Some("non-improving streak hit threshold"));
    }
}
