//! Build configuration: external tools, deterministic flags, run options.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{CompareError, Result};
use crate::revision::DEFAULT_PATCH;

pub const DEFAULT_PARALLELISM: usize = 4;
pub const DEFAULT_OBJECT_EXT: &str = ".o";
pub const DEFAULT_EXECUTABLE: &str = "src/koyotecoind";

/// Configure switches that keep the build minimal and cache-free.
pub const CONFIGURE_SWITCHES: &[&str] = &[
    "--disable-hardening",
    "--without-cli",
    "--disable-tests",
    "--disable-bench",
    "--disable-ccache",
];

/// objcopy arguments: drop the build-id note, debug info and all symbols.
pub const STRIP_ARGS: &[&str] = &["-R.note.gnu.build-id", "-g", "-S"];

/// objdump arguments: demangle, no raw bytes, disassemble, show relocations.
pub const DISASSEMBLE_ARGS: &[&str] = &["-C", "--no-show-raw-insn", "-d", "-r"];

/// Baseline C/C++ optimization flags.
///
/// `-O` and `-Os` cross-contaminate unchanged functions in the same
/// translation unit, so only the individual passes that stay local are
/// enabled on top of `-O0`.
pub fn baseline_opt_flags() -> Vec<String> {
    let mut flags = vec!["-O0", "-g0"];
    flags.extend([
        "-fcombine-stack-adjustments",
        "-fcompare-elim",
        "-fcprop-registers",
        "-fdefer-pop",
        "-fforward-propagate",
        "-fif-conversion",
        "-fif-conversion2",
        "-finline-functions-called-once",
        "-fshrink-wrap",
        "-fsplit-wide-types",
        "-ftree-bit-ccp",
        "-ftree-ccp",
        "-ftree-ch",
        "-ftree-copy-prop",
        "-ftree-copyrename",
        "-ftree-dce",
        "-ftree-dominator-opts",
        "-ftree-dse",
        "-ftree-fre",
        "-ftree-sink",
        "-ftree-slsr",
        "-ftree-sra",
        "-ftree-ter",
    ]);
    // One section per function and data object; the analysis depends on it.
    flags.extend(["-ffunction-sections", "-fdata-sections"]);
    flags.push("-frandom-seed=notsorandom");
    flags.push("-fmerge-all-constants");
    // ipa-sra creates renamed variants of functions.
    flags.push("-fno-ipa-sra");
    // reorder-functions moves code into .text.hot/.text.unlikely.
    flags.push("-fno-reorder-functions");
    flags.into_iter().map(String::from).collect()
}

/// Environment pinned for every child process.
pub fn deterministic_env() -> Vec<(String, String)> {
    vec![("QT_RCC_SOURCE_DATE_OVERRIDE".to_string(), "1".to_string())]
}

/// An external program plus any leading arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tool {
    pub program: String,
    pub args: Vec<String>,
}

impl Tool {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Parse a shell-style command string such as `"rsync -v"`.
    pub fn parse(command: &str) -> Result<Self> {
        let mut words = shlex::split(command)
            .ok_or_else(|| CompareError::InvalidConfig(format!("cannot parse command {command:?}")))?;
        if words.is_empty() {
            return Err(CompareError::InvalidConfig("empty command".to_string()));
        }
        let program = words.remove(0);
        Ok(Self {
            program,
            args: words,
        })
    }

    fn from_env_or(var: &str, default: &str) -> Result<Self> {
        match std::env::var(var) {
            Ok(value) if !value.trim().is_empty() => Self::parse(&value),
            _ => Ok(Self::new(default)),
        }
    }
}

/// The external toolchain, overridable through the environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Toolchain {
    pub git: Tool,
    pub make: Tool,
    pub rsync: Tool,
    pub objcopy: Tool,
    pub objdump: Tool,
    pub object_ext: String,
}

impl Default for Toolchain {
    fn default() -> Self {
        Self {
            git: Tool::new("git"),
            make: Tool::new("make"),
            rsync: Tool::new("rsync"),
            objcopy: Tool::new("objcopy"),
            objdump: Tool::new("objdump"),
            object_ext: DEFAULT_OBJECT_EXT.to_string(),
        }
    }
}

impl Toolchain {
    /// Read `GIT`, `MAKE`, `RSYNC`, `OBJCOPY`, `OBJDUMP` and `OBJEXT`.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            git: Tool::from_env_or("GIT", "git")?,
            make: Tool::from_env_or("MAKE", "make")?,
            rsync: Tool::from_env_or("RSYNC", "rsync")?,
            objcopy: Tool::from_env_or("OBJCOPY", "objcopy")?,
            objdump: Tool::from_env_or("OBJDUMP", "objdump")?,
            object_ext: std::env::var("OBJEXT")
                .ok()
                .filter(|ext| !ext.is_empty())
                .unwrap_or_else(|| DEFAULT_OBJECT_EXT.to_string()),
        })
    }
}

/// Parse an `--opt` override.
///
/// The value must start with `+` so that flags such as `-O2` are not taken
/// for options of this program; the rest is split like a shell would.
pub fn parse_opt_override(value: &str) -> Result<Vec<String>> {
    let rest = value.strip_prefix('+').ok_or_else(|| {
        CompareError::InvalidConfig("\"opt\" argument must start with +".to_string())
    })?;
    shlex::split(rest)
        .ok_or_else(|| CompareError::InvalidConfig(format!("cannot parse opt flags {rest:?}")))
}

/// Quote a command line for logs.
pub fn shell_join<S: AsRef<str>>(words: &[S]) -> String {
    words
        .iter()
        .map(|w| {
            shlex::try_quote(w.as_ref())
                .map(|q| q.into_owned())
                .unwrap_or_else(|_| w.as_ref().to_string())
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Everything one run needs to build and analyse its revisions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Executables to build, relative to the source tree.
    pub executables: Vec<String>,
    /// `make -j` level.
    pub parallelism: usize,
    /// Keep assertions enabled (no `-DNDEBUG`).
    pub assertions: bool,
    /// Flags for CFLAGS, CXXFLAGS and LDFLAGS.
    pub opt_flags: Vec<String>,
    /// Extra CPPFLAGS.
    pub cpp_flags: Vec<String>,
    /// Depends prefix handed to configure.
    pub prefix: Option<PathBuf>,
    /// Additional configure arguments, appended last.
    pub configure_extra: Vec<String>,
    /// Directory the build-info stripping patches live in.
    pub patch_dir: PathBuf,
    /// Patch applied to revisions without an override.
    pub default_patch: String,
    /// Environment pinned for every child process.
    pub env: Vec<(String, String)>,
    pub toolchain: Toolchain,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            executables: vec![DEFAULT_EXECUTABLE.to_string()],
            parallelism: DEFAULT_PARALLELISM,
            assertions: false,
            opt_flags: baseline_opt_flags(),
            cpp_flags: Vec::new(),
            prefix: None,
            configure_extra: Vec::new(),
            patch_dir: PathBuf::from("patches"),
            default_patch: DEFAULT_PATCH.to_string(),
            env: deterministic_env(),
            toolchain: Toolchain::default(),
        }
    }
}

impl BuildConfig {
    /// CPPFLAGS value, with `-DNDEBUG` unless assertions are requested.
    pub fn cpp_flags_value(&self) -> String {
        let mut flags = self.cpp_flags.clone();
        if !self.assertions {
            flags.push("-DNDEBUG".to_string());
        }
        flags.join(" ")
    }

    /// Optimization flags as a single quoted string.
    pub fn opt_flags_value(&self) -> String {
        shell_join(&self.opt_flags)
    }

    /// Full `./configure` argument list (excluding the program itself).
    pub fn configure_args(&self) -> Vec<String> {
        let mut args: Vec<String> = CONFIGURE_SWITCHES.iter().map(|s| s.to_string()).collect();
        args.push(match &self.prefix {
            Some(prefix) => format!("--prefix={}", prefix.display()),
            None => "--with-incompatible-bdb".to_string(),
        });
        let opt = self.opt_flags_value();
        args.push(format!("CPPFLAGS={}", self.cpp_flags_value()));
        args.push(format!("CFLAGS={opt}"));
        args.push(format!("CXXFLAGS={opt}"));
        args.push(format!("LDFLAGS={opt}"));
        args.extend(self.configure_extra.iter().cloned());
        args
    }

    pub fn validate(&self) -> Result<()> {
        if self.executables.is_empty() || self.executables.iter().any(|e| e.trim().is_empty()) {
            return Err(CompareError::InvalidConfig(
                "at least one non-empty executable is required".to_string(),
            ));
        }
        if self.parallelism == 0 {
            return Err(CompareError::InvalidConfig(
                "parallelism must be at least 1".to_string(),
            ));
        }
        if !self.toolchain.object_ext.starts_with('.') {
            return Err(CompareError::InvalidConfig(format!(
                "object extension {:?} must start with '.'",
                self.toolchain.object_ext
            )));
        }
        Ok(())
    }
}
