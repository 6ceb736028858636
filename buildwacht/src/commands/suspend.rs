//! Stop tracking a workspace until its next full rebuild

use crate::error::BuildResult;
use crate::project::{Project, ProjectOptions};
use tracing::info;

/// Suspend the workspace: drop its pending state and request a full rebuild
pub fn suspend(options: &ProjectOptions) -> BuildResult<()> {
    let project = Project::open(options, false)?;
    project.monitor().suspend(project.workspace())?;
    info!(workspace = %project.workspace().id(), "Workspace suspended");
    project.close()
}
