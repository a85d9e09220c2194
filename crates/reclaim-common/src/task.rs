//! GC task names
//!
//! A task narrows which cleanup modules run for a cluster. The selection is
//! stored on the infrastructure object as a comma separated annotation.

use std::fmt;
use std::str::FromStr;

use crate::Error;

/// A unit of external resource cleanup that can be switched on per cluster
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum GcTask {
    /// Classic, network and application load balancers
    LoadBalancer,
    /// Target groups of v2 load balancers
    TargetGroup,
    /// Security groups created for Service load balancers
    SecurityGroup,
}

impl GcTask {
    /// Every task, in the order cleanup runs them
    pub const ALL: [GcTask; 3] = [
        GcTask::LoadBalancer,
        GcTask::TargetGroup,
        GcTask::SecurityGroup,
    ];

    /// The name used in annotations and on the command line
    pub fn as_str(&self) -> &'static str {
        match self {
            GcTask::LoadBalancer => "load-balancer",
            GcTask::TargetGroup => "target-group",
            GcTask::SecurityGroup => "security-group",
        }
    }
}

impl fmt::Display for GcTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GcTask {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        GcTask::ALL
            .into_iter()
            .find(|task| task.as_str() == s)
            .ok_or_else(|| {
                Error::validation(format!(
                    "invalid gc task {s:?}, valid values are: {}",
                    join_tasks(&GcTask::ALL)
                ))
            })
    }
}

/// Parse a comma separated task list, dropping blanks and duplicates
pub fn parse_task_list(value: &str) -> Result<Vec<GcTask>, Error> {
    let mut tasks = Vec::new();
    for name in value.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let task: GcTask = name.parse()?;
        if !tasks.contains(&task) {
            tasks.push(task);
        }
    }
    Ok(tasks)
}

/// Join tasks into the annotation representation
pub fn join_tasks(tasks: &[GcTask]) -> String {
    tasks
        .iter()
        .map(GcTask::as_str)
        .collect::<Vec<_>>()
        .join(",")
}
