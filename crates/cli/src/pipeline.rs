use std::collections::{BTreeSet, HashMap, VecDeque};
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use tracing::debug;

use tickler::{JobOptions, SchedulerConfig};

/// A pipeline file: optional scheduler settings plus `[[job]]` tables.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineFile {
    #[serde(default)]
    pub scheduler: Option<SchedulerConfig>,
    #[serde(default)]
    pub job: Vec<JobSpec>,
}

/// One command to run, with its dependencies on other jobs by name.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobSpec {
    pub name: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub wait_for: Vec<String>,
    #[serde(default)]
    pub if_success: Vec<String>,
    #[serde(default)]
    pub if_failure: Vec<String>,
}

impl JobSpec {
    pub fn options(&self) -> JobOptions {
        JobOptions::new()
            .wait_for(self.wait_for.iter().cloned())
            .if_success(self.if_success.iter().cloned())
            .if_failure(self.if_failure.iter().cloned())
    }

    /// `command arg1 arg2 ...` for display.
    pub fn command_line(&self) -> String {
        std::iter::once(self.command.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// A validated pipeline with its jobs in dependency order.
#[derive(Debug)]
pub struct Pipeline {
    pub scheduler: Option<SchedulerConfig>,
    /// Jobs sorted so that every job comes after everything it references.
    pub jobs: Vec<JobSpec>,
}

impl Pipeline {
    pub fn load(path: &Path) -> Result<Self> {
        debug!(path = %path.display(), "loading pipeline");
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read pipeline: {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("invalid pipeline: {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let file: PipelineFile = toml::from_str(content).context("failed to parse pipeline TOML")?;
        Self::from_file(file)
    }

    pub fn from_file(file: PipelineFile) -> Result<Self> {
        validate(&file.job)?;
        let order = topological_order(&file.job)?;

        let mut slots: Vec<Option<JobSpec>> = file.job.into_iter().map(Some).collect();
        let jobs = order.into_iter().filter_map(|i| slots[i].take()).collect();
        Ok(Self {
            scheduler: file.scheduler,
            jobs,
        })
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.jobs.iter().map(|job| job.name.as_str())
    }
}

fn validate(jobs: &[JobSpec]) -> Result<()> {
    if jobs.is_empty() {
        bail!("pipeline defines no jobs");
    }

    let mut seen = BTreeSet::new();
    for job in jobs {
        if job.name.trim().is_empty() {
            bail!("job name must not be empty");
        }
        if job.command.trim().is_empty() {
            bail!("job '{}' has an empty command", job.name);
        }
        if !seen.insert(job.name.as_str()) {
            bail!("duplicate job name '{}'", job.name);
        }
    }

    for job in jobs {
        let options = job.options();
        for dep in options.dependencies() {
            if dep == job.name {
                bail!("job '{}' depends on itself", job.name);
            }
            if !seen.contains(dep) {
                bail!("job '{}' references undefined job '{dep}'", job.name);
            }
        }
    }
    Ok(())
}

/// Kahn's algorithm over job indices. Ties keep file order.
fn topological_order(jobs: &[JobSpec]) -> Result<Vec<usize>> {
    let index: HashMap<&str, usize> = jobs
        .iter()
        .enumerate()
        .map(|(i, job)| (job.name.as_str(), i))
        .collect();

    let mut in_degree = vec![0usize; jobs.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); jobs.len()];
    for (i, job) in jobs.iter().enumerate() {
        for dep in job.options().dependencies() {
            if let Some(&d) = index.get(dep) {
                dependents[d].push(i);
                in_degree[i] += 1;
            }
        }
    }

    let mut queue: VecDeque<usize> = (0..jobs.len()).filter(|&i| in_degree[i] == 0).collect();
    let mut sorted = Vec::with_capacity(jobs.len());

    while let Some(node) = queue.pop_front() {
        sorted.push(node);
        for &dependent in &dependents[node] {
            in_degree[dependent] -= 1;
            if in_degree[dependent] == 0 {
                queue.push_back(dependent);
            }
        }
    }

    if sorted.len() != jobs.len() {
        let in_cycle: Vec<&str> = (0..jobs.len())
            .filter(|&i| in_degree[i] > 0)
            .map(|i| jobs[i].name.as_str())
            .collect();
        bail!("dependency cycle among jobs: {}", in_cycle.join(", "));
    }

    Ok(sorted)
}
