pub mod cpp;

use grader_utils::os_cmd::OsCmd;

use std::path::Path;

/// A compiled language: how to build a source file in a work area and how
/// to start the artifact.
pub trait Language: Send + Sync {
    fn lang_name(&self) -> &str;

    /// File name the submission is written to inside the work area.
    fn src_name(&self) -> &str;

    fn exe_name(&self) -> &str;

    /// Line-comment token used by structural comparison.
    fn comment_token(&self) -> &str;

    fn compile_cmd(&self, workspace: &Path) -> OsCmd;

    fn run_cmd(&self, workspace: &Path) -> OsCmd;
}
