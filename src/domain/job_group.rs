use serde::{Deserialize, Serialize};

use crate::domain::job::DependencyId;
use crate::domain::parameter::Parameter;
use crate::error::{Error, Result};
use crate::id::JobGroupId;

/// A template submitted once that the composer expands into one independent
/// job (or optimizing job) per member (§3.3). `group_parameters` declares the
/// names a caller may supply values for at admit time; a member's
/// `mapped_parameters` resolve against those caller-supplied values, while
/// `fixed_parameters` are literal overrides baked into the template itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobGroup {
    pub id: JobGroupId,
    pub name: String,
    pub group_parameters: Vec<Parameter>,
    pub members: Vec<JobGroupMember>,
}

/// A single named mapping from a template's own parameter name to the name
/// of a group-level parameter supplied by the caller at admit time. Mapped
/// parameters win over fixed ones of the same name (§4.5 point 1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterMapping {
    pub template_parameter_name: String,
    pub group_parameter_name: String,
}

/// Fields every job-group template carries regardless of which job shape it
/// expands into (§9 "Polymorphism over job-group items": {name, jobClass,
/// encode, schedule}).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateCommon {
    pub name: String,
    pub job_class: String,
    pub client_requirement: u32,
    #[serde(default)]
    pub fixed_parameters: Vec<Parameter>,
    #[serde(default)]
    pub mapped_parameters: Vec<ParameterMapping>,
    /// Names of sibling members within the same group that this member
    /// depends on (§4.5 point 2). Resolved by the composer into concrete
    /// `DependencyId` references once the named member has itself been
    /// submitted; a name that matches no earlier member is logged and
    /// skipped rather than rejecting the whole group.
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Dependency ids from outside the group, prepended unchanged ahead of
    /// any resolved intra-group dependency (§4.5 point 2).
    #[serde(default)]
    pub external_depends_on: Vec<DependencyId>,
}

/// The extra attributes an optimizing-job template carries on top of
/// `TemplateCommon` (§3.2, §3.3 "JobGroupOptimizingJob").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizingTemplateAttrs {
    pub min_threads: u32,
    pub max_threads: Option<u32>,
    pub thread_increment: u32,
    pub max_non_improving: u32,
    pub iteration_duration_secs: u64,
    #[serde(default)]
    pub collection_interval_secs: u32,
    #[serde(default)]
    pub delay_between_iterations_secs: u64,
    #[serde(default)]
    pub rerun_best_iteration: bool,
    #[serde(default)]
    pub rerun_duration_secs: Option<u64>,
}

/// Tagged job-group template variant; the composer dispatches on the tag,
/// admitting a `Job` template through `SchedulerCore::submit` and an
/// `OptimizingJob` template through `OptimizingController::submit` (§4.5
/// point 3: "submit via `scheduler.Admit` / `AdmitOptimizing`").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum JobGroupMember {
    Job(TemplateCommon),
    OptimizingJob(TemplateCommon, OptimizingTemplateAttrs),
}

impl JobGroupMember {
    pub fn common(&self) -> &TemplateCommon {
        match self {
            JobGroupMember::Job(common) => common,
            JobGroupMember::OptimizingJob(common, _) => common,
        }
    }

    pub fn name(&self) -> &str {
        &self.common().name
    }
}

impl JobGroup {
    pub fn new(name: impl Into<String>, group_parameters: Vec<Parameter>) -> Self {
        Self {
            id: JobGroupId::new(),
            name: name.into(),
            group_parameters,
            members: Vec::new(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.members.is_empty() {
            return Err(Error::admission("job group must have at least one member"));
        }
        for p in &self.group_parameters {
            p.validate()?;
        }
        for m in &self.members {
            let common = m.common();
            if common.client_requirement == 0 {
                return Err(Error::admission(format!(
                    "group member {} must require at least one client",
                    common.name
                )));
            }
            for p in &common.fixed_parameters {
                p.validate()?;
            }
            if let JobGroupMember::OptimizingJob(_, attrs) = m {
                if attrs.thread_increment == 0 {
                    return Err(Error::admission(format!(
                        "group member {} thread increment must be at least 1",
                        common.name
                    )));
                }
                if let Some(max) = attrs.max_threads {
                    if max < attrs.min_threads {
                        return Err(Error::admission(format!(
                            "group member {} maxThreads must be >= minThreads",
                            common.name
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::parameter::ParameterValue;

    fn job_member(name: &str, depends_on: Vec<String>) -> JobGroupMember {
        JobGroupMember::Job(TemplateCommon {
            name: name.into(),
            job_class: "load-test".into(),
            client_requirement: 1,
            fixed_parameters: Vec::new(),
            mapped_parameters: Vec::new(),
            depends_on,
            external_depends_on: Vec::new(),
        })
    }

    #[test]
    fn empty_group_rejected() {
        let group = JobGroup::new("empty", Vec::new());
        assert!(group.validate().is_err());
    }

    #[test]
    fn zero_client_requirement_member_rejected() {
        let mut group = JobGroup::new("suite", Vec::new());
        let mut member = job_member("a", Vec::new());
        if let JobGroupMember::Job(common) = &mut member {
            common.client_requirement = 0;
        }
        group.members.push(member);
        assert!(group.validate().is_err());
    }

    #[test]
    fn optimizing_member_with_bad_thread_search_rejected() {
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
                min_threads: 4,
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
        assert!(group.validate().is_err());
    }

    #[test]
    fn mapped_parameter_is_declared_on_the_template() {
        let member = TemplateCommon {
            name: "a".into(),
            job_class: "load-test".into(),
            client_requirement: 1,
            fixed_parameters: vec![Parameter::fixed("rate", ParameterValue::Int(10))],
            mapped_parameters: vec![ParameterMapping {
                template_parameter_name: "rate".into(),
                group_parameter_name: "target_rate".into(),
            }],
            depends_on: vec!["warmup".into()],
            external_depends_on: Vec::new(),
        };
        assert_eq!(member.mapped_parameters[0].group_parameter_name, "target_rate");
    }
}
