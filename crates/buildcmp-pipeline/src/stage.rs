//! Per-revision build stages.

use serde::{Deserialize, Serialize};

/// Where a revision is in its build.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BuildStage {
    /// git reset --hard
    Reset,

    /// git clean -f -x -d
    Clean,

    /// git checkout <rev>
    Checkout,

    /// git apply <patch>
    Patch,

    /// ./autogen.sh && ./configure ...
    Configure,

    /// make, copy and strip every executable
    Compile,

    Done,
}

impl BuildStage {
    pub const FIRST: BuildStage = BuildStage::Reset;

    pub fn name(&self) -> &'static str {
        match self {
            BuildStage::Reset => "reset",
            BuildStage::Clean => "clean",
            BuildStage::Checkout => "checkout",
            BuildStage::Patch => "patch",
            BuildStage::Configure => "configure",
            BuildStage::Compile => "compile",
            BuildStage::Done => "done",
        }
    }

    /// The stage that follows; `Done` is terminal.
    pub fn next(&self) -> Option<BuildStage> {
        match self {
            BuildStage::Reset => Some(BuildStage::Clean),
            BuildStage::Clean => Some(BuildStage::Checkout),
            BuildStage::Checkout => Some(BuildStage::Patch),
            BuildStage::Patch => Some(BuildStage::Configure),
            BuildStage::Configure => Some(BuildStage::Compile),
            BuildStage::Compile => Some(BuildStage::Done),
            BuildStage::Done => None,
        }
    }
}

impl std::fmt::Display for BuildStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
