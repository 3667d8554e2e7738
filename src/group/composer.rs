use std::collections::HashMap;
use std::sync::Arc;

use tracing::warn;

use crate::domain::job::{DependencyId, Job};
use crate::domain::job_group::{JobGroup, JobGroupMember, ParameterMapping, TemplateCommon};
use crate::domain::optimizing_job::OptimizingJob;
use crate::domain::parameter::Parameter;
use crate::error::Result;
use crate::id::{JobId, OptimizingJobId};
use crate::optimizing::OptimizingController;
use crate::repository::Repository;
use crate::scheduler::SchedulerCore;

/// The job admitted for one job-group member: a plain `Job` if the template
/// was a `JobGroupMember::Job`, or the controller-owned `OptimizingJob` if it
/// was a `JobGroupMember::OptimizingJob`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmittedMember {
    Job(JobId),
    OptimizingJob(OptimizingJobId),
}

impl From<AdmittedMember> for DependencyId {
    fn from(member: AdmittedMember) -> Self {
        match member {
            AdmittedMember::Job(id) => DependencyId::Job(id),
            AdmittedMember::OptimizingJob(id) => DependencyId::Optimizing(id),
        }
    }
}

/// Expands a submitted `JobGroup` template into its member jobs and admits
/// each one independently (C7, §4.5). Per the resolved Open Question (a),
/// members are not serialized against each other here — the scheduler's
/// normal client-availability gate decides how much of the group actually
/// runs concurrently.
pub struct JobGroupComposer {
    repository: Arc<dyn Repository>,
    scheduler: Arc<SchedulerCore>,
    optimizing_controller: Arc<OptimizingController>,
}

impl JobGroupComposer {
    pub fn new(repository: Arc<dyn Repository>, scheduler: Arc<SchedulerCore>, optimizing_controller: Arc<OptimizingController>) -> Arc<Self> {
        Arc::new(Self { repository, scheduler, optimizing_controller })
    }

    /// Admits `group`, resolving each member's mapped parameters against
    /// `group_parameter_values` (caller-supplied values for the names
    /// declared in `group.group_parameters`; a name with no caller-supplied
    /// value falls back to the group's own declared default, if any).
    /// Members are processed in template order and intra-group dependencies
    /// may only reference a sibling that appears earlier in that order —
    /// matching §4.5 point 2's "substitute the id of the already-scheduled
    /// job from the earlier iteration of this loop". A submission failure
    /// aborts the remaining members; those already admitted stay scheduled.
    pub async fn submit(&self, group: JobGroup, group_parameter_values: Vec<Parameter>) -> Result<Vec<AdmittedMember>> {
        group.validate()?;
        self.repository.put_job_group(&group).await?;

        let mut effective_group_parameters = group.group_parameters.clone();
        for value in group_parameter_values {
            match effective_group_parameters.iter_mut().find(|p| p.name == value.name) {
                Some(existing) => *existing = value,
                None => effective_group_parameters.push(value),
            }
        }

        let mut resolved: HashMap<String, DependencyId> = HashMap::new();
        let mut admitted = Vec::with_capacity(group.members.len());

        for member in &group.members {
            let common = member.common();
            let parameters = build_parameters(common, &effective_group_parameters, &group.name);
            let depends_on = resolve_dependencies(common, &resolved, &group.name);

            let id = match member {
                JobGroupMember::Job(common) => {
                    let mut job = Job::new(format!("{}/{}", group.name, common.name), common.client_requirement, parameters);
                    job.job_class = common.job_class.clone();
                    job.group_id = Some(group.id);
                    job.depends_on = depends_on;
                    let job_id = self.scheduler.submit(job).await?;
                    AdmittedMember::Job(job_id)
                }
                JobGroupMember::OptimizingJob(common, attrs) => {
                    let mut oj = OptimizingJob::new(format!("{}/{}", group.name, common.name), common.client_requirement, parameters, 1)
                        .with_thread_search(attrs.min_threads, attrs.max_threads, attrs.thread_increment, attrs.max_non_improving)
                        .with_rerun_best(attrs.rerun_best_iteration, attrs.rerun_duration_secs);
                    oj.job_class = common.job_class.clone();
                    oj.group_id = Some(group.id);
                    oj.depends_on = depends_on;
                    oj.iteration_duration_secs = attrs.iteration_duration_secs;
                    oj.collection_interval_secs = attrs.collection_interval_secs;
                    oj.delay_between_iterations_secs = attrs.delay_between_iterations_secs;
                    let oj_id = self.optimizing_controller.submit(oj).await?;
                    AdmittedMember::OptimizingJob(oj_id)
                }
            };

            resolved.insert(common.name.clone(), id.into());
            admitted.push(id);
        }

        Ok(admitted)
    }
}

/// Clones the template's fixed parameters and overlays the mapped ones
/// resolved against the effective group parameter values, mapped winning on
/// conflict (§4.5 point 1).
fn build_parameters(common: &TemplateCommon, group_values: &[Parameter], group_name: &str) -> Vec<Parameter> {
    let mut parameters = common.fixed_parameters.clone();
    for ParameterMapping { template_parameter_name, group_parameter_name } in &common.mapped_parameters {
        let Some(group_value) = group_values.iter().find(|p| &p.name == group_parameter_name) else {
            warn!(
                group = %group_name,
                member = %common.name,
                mapping = %group_parameter_name,
                "job group member maps an unknown group parameter name, skipping"
            );
            continue;
        };
        let mut resolved = group_value.clone();
        resolved.name = template_parameter_name.clone();
        match parameters.iter_mut().find(|p| p.name == resolved.name) {
            Some(existing) => *existing = resolved,
            None => parameters.push(resolved),
        }
    }
    parameters
}

/// Prepends the template's external dependencies, then resolves each
/// intra-group sibling name against members already admitted earlier in the
/// loop; an unknown name is logged and skipped rather than rejecting the
/// whole group (§4.5 point 2).
fn resolve_dependencies(common: &TemplateCommon, resolved: &HashMap<String, DependencyId>, group_name: &str) -> Vec<DependencyId> {
    let mut depends_on = common.external_depends_on.clone();
    for dep_name in &common.depends_on {
        match resolved.get(dep_name) {
            Some(dep_id) => depends_on.push(*dep_id),
            None => warn!(
                group = %group_name,
                member = %common.name,
                dependency = %dep_name,
                "job group member depends on an unknown or not-yet-admitted sibling name, skipping"
            ),
        }
    }
    depends_on
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ClientRegistry;
    use crate::config::{ConfigHandle, SchedulerTunables};
    use crate::domain::job_group::{JobGroupMember, OptimizingTemplateAttrs, TemplateCommon};
    use crate::domain::parameter::ParameterValue;
    use crate::repository::memory::InMemoryRepository;

    fn job_template(name: &str, depends_on: Vec<String>, mapped: Vec<ParameterMapping>) -> JobGroupMember {
        JobGroupMember::Job(TemplateCommon {
            name: name.into(),
            job_class: "load-test".into(),
            client_requirement: 1,
            fixed_parameters: Vec::new(),
            mapped_parameters: mapped,
            depends_on,
            external_depends_on: Vec::new(),
        })
    }

    fn setup() -> (Arc<dyn Repository>, Arc<SchedulerCore>, Arc<OptimizingController>) {
        let repo: Arc<dyn Repository> = Arc::new(InMemoryRepository::new());
        let registry = Arc::new(ClientRegistry::new());
        let (_handle, sub) = ConfigHandle::new(SchedulerTunables::default());
        let scheduler = SchedulerCore::new(repo.clone(), registry, sub);
        let controller = OptimizingController::new(repo.clone(), scheduler.clone());
        (repo, scheduler, controller)
    }

    #[tokio::test]
    async fn submit_admits_one_job_per_member() {
        let (repo, scheduler, controller) = setup();
        let composer = JobGroupComposer::new(repo, scheduler, controller);

        let mut group = JobGroup::new("suite", Vec::new());
        group.members.push(job_template("a", Vec::new(), Vec::new()));
        group.members.push(job_template("b", vec!["a".into()], Vec::new()));

        let ids = composer.submit(group, Vec::new()).await.unwrap();
        assert_eq!(ids.len(), 2);
    }

    #[tokio::test]
    async fn mapped_parameter_resolves_against_caller_supplied_group_values() {
        let (repo, scheduler, controller) = setup();
        let composer = JobGroupComposer::new(repo.clone(), scheduler.clone(), controller);

        let mapping = vec![ParameterMapping {
            template_parameter_name: "rate".into(),
            group_parameter_name: "target_rate".into(),
        }];
        let mut group = JobGroup::new("suite", vec![Parameter::fixed("target_rate", ParameterValue::Int(1))]);
        group.members.push(job_template("a", Vec::new(), mapping));

        let ids = composer
            .submit(group, vec![Parameter::fixed("target_rate", ParameterValue::Int(99))])
            .await
            .unwrap();
        let AdmittedMember::Job(job_id) = ids[0] else { panic!("expected a Job member") };
        let job = scheduler.get(job_id).unwrap();
        let rate = job.parameters.iter().find(|p| p.name == "rate").unwrap();
        assert_eq!(rate.value, ParameterValue::Int(99));
    }

    #[tokio::test]
    async fn optimizing_member_is_admitted_through_the_controller() {
        let (repo, scheduler, controller) = setup();
        let composer = JobGroupComposer::new(repo, scheduler, controller.clone());

        let mut group = JobGroup::new("suite", Vec::new());
        group.members.push(JobGroupMember::OptimizingJob(
            TemplateCommon {
                name: "tune".into(),
                job_class: "load-test".into(),
                client_requirement: 1,
                fixed_parameters: Vec::new(),
                mapped_parameters: Vec::new(),
                depends_on: Vec::new(),
                external_depends_on: Vec::new(),
            },
            OptimizingTemplateAttrs {
                min_threads: 1,
                max_threads: Some(2),
                thread_increment: 1,
                max_non_improving: 2,
                iteration_duration_secs: 30,
                collection_interval_secs: 5,
                delay_between_iterations_secs: 0,
                rerun_best_iteration: false,
                rerun_duration_secs: None,
            },
        ));

        let ids = composer.submit(group, Vec::new()).await.unwrap();
        assert!(matches!(ids[0], AdmittedMember::OptimizingJob(_)));
        let AdmittedMember::OptimizingJob(oj_id) = ids[0] else { unreachable!() };
        assert!(controller.get(oj_id).is_some());
    }

    #[tokio::test]
    async fn unknown_dependency_name_is_skipped_not_fatal() {
        let (repo, scheduler, controller) = setup();
        let composer = JobGroupComposer::new(repo, scheduler.clone(), controller);

        let mut group = JobGroup::new("suite", Vec::new());
        group.members.push(job_template("only", vec!["missing".into()], Vec::new()));

        let ids = composer.submit(group, Vec::new()).await.unwrap();
        let AdmittedMember::Job(job_id) = ids[0] else { panic!("expected a Job member") };
        assert!(scheduler.get(job_id).unwrap().depends_on.is_empty());
    }
}
