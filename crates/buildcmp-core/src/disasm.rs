//! Disassembly parsing: tokenizer, section splitter and volatile-line filter.
//!
//! The disassembler prints a preamble followed by one block per section,
//! each introduced by `Disassembly of section <name>:`. With
//! `-ffunction-sections` every function gets its own section, so a section
//! is the unit of comparison between two builds.

use std::fmt;

use regex::Regex;

use crate::error::{CompareError, Result};

const SECTION_HEADER_PREFIX: &str = "Disassembly of section ";
const FILE_FORMAT_MARKER: &str = "file format ";

/// One classified line of disassembler output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineToken<'a> {
    /// `Disassembly of section <name>:`
    SectionHeader(&'a str),
    /// Anything else.
    Body(&'a str),
}

impl<'a> LineToken<'a> {
    pub fn classify(line: &'a str) -> Self {
        match line
            .strip_prefix(SECTION_HEADER_PREFIX)
            .and_then(|rest| rest.strip_suffix(':'))
        {
            Some(name) if !name.is_empty() => LineToken::SectionHeader(name),
            _ => LineToken::Body(line),
        }
    }
}

/// A named block of filtered disassembly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub name: String,
    /// Header line first, then the surviving body lines.
    pub lines: Vec<String>,
}

impl Section {
    fn new(name: &str, header: &str) -> Self {
        Self {
            name: name.to_string(),
            lines: vec![header.to_string()],
        }
    }

    /// Whether anything besides the header and blank lines survived.
    pub fn has_content(&self) -> bool {
        self.lines.iter().skip(1).any(|l| !l.trim().is_empty())
    }

    /// The text that gets hashed and persisted.
    pub fn text(&self) -> String {
        self.lines.join("\n")
    }
}

/// How a line is matched for removal.
#[derive(Debug, Clone)]
enum Matcher {
    Substrings(Vec<String>),
    Pattern(Regex),
}

/// Policy that drops lines carrying incidental read-only-data addresses.
///
/// Relocations into merged constant sections (e.g.
/// `ebc: R_X86_64_32 .rodata+0x1944`) change whenever any unrelated
/// constant moves, so they are removed before hashing. Which sections hold
/// such data depends on the object format, so every policy names the formats
/// it understands.
#[derive(Debug, Clone)]
pub struct VolatileFilter {
    name: String,
    formats: Vec<String>,
    matcher: Matcher,
}

impl VolatileFilter {
    /// ELF objects: `.rodata*`.
    pub fn elf() -> Self {
        Self::substrings("elf", &["elf"], &[".rodata"])
    }

    /// PE/COFF objects: `.rdata*`.
    pub fn pe() -> Self {
        Self::substrings("pe", &["pe-", "pei-"], &[".rdata"])
    }

    /// Mach-O objects: constant and literal sections.
    pub fn macho() -> Self {
        Self::substrings("macho", &["mach-o"], &["__const", "__cstring", "__literal"])
    }

    /// Look up a preset by name.
    pub fn preset(name: &str) -> Result<Self> {
        match name {
            "elf" => Ok(Self::elf()),
            "pe" => Ok(Self::pe()),
            "macho" | "mach-o" => Ok(Self::macho()),
            other => Err(CompareError::InvalidConfig(format!(
                "unknown filter preset {other:?} (expected elf, pe or macho)"
            ))),
        }
    }

    fn substrings(name: &str, formats: &[&str], markers: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            formats: formats.iter().map(|s| s.to_string()).collect(),
            matcher: Matcher::Substrings(markers.iter().map(|s| s.to_string()).collect()),
        }
    }

    /// Keep this policy's formats but match lines with a regex instead.
    pub fn with_pattern(mut self, pattern: &str) -> Result<Self> {
        let regex = Regex::new(pattern).map_err(|e| {
            CompareError::InvalidConfig(format!("invalid filter pattern {pattern:?}: {e}"))
        })?;
        self.name = format!("{}+pattern", self.name);
        self.matcher = Matcher::Pattern(regex);
        Ok(self)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the policy knows how `format` prints read-only data.
    pub fn supports(&self, format: &str) -> bool {
        self.formats.iter().any(|f| format.starts_with(f.as_str()))
    }

    /// Whether `line` should be dropped.
    pub fn is_volatile(&self, line: &str) -> bool {
        match &self.matcher {
            Matcher::Substrings(markers) => markers.iter().any(|m| line.contains(m.as_str())),
            Matcher::Pattern(regex) => regex.is_match(line),
        }
    }
}

impl Default for VolatileFilter {
    fn default() -> Self {
        Self::elf()
    }
}

impl fmt::Display for VolatileFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Parsed disassembly of one object file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Disassembly {
    /// Object format from the preamble, e.g. `elf64-x86-64`.
    pub format: Option<String>,
    /// Named sections in order of first appearance.
    pub sections: Vec<Section>,
}

impl Disassembly {
    /// Sections worth persisting.
    pub fn persistable(&self) -> impl Iterator<Item = &Section> {
        self.sections.iter().filter(|s| s.has_content())
    }
}

/// Split disassembler output into filtered sections.
///
/// Lines before the first section header form an unnamed preamble that is
/// only scanned for the object format. A header seen twice appends to the
/// existing section.
pub fn parse(output: &str, filter: &VolatileFilter) -> Disassembly {
    let mut format = None;
    let mut sections: Vec<Section> = Vec::new();
    let mut current: Option<usize> = None;

    for line in output.lines() {
        match LineToken::classify(line) {
            LineToken::SectionHeader(name) => {
                let idx = match sections.iter().position(|s| s.name == name) {
                    Some(idx) => idx,
                    None => {
                        sections.push(Section::new(name, line));
                        sections.len() - 1
                    }
                };
                current = Some(idx);
            }
            LineToken::Body(text) => match current {
                None => {
                    if format.is_none() {
                        format = file_format(text);
                    }
                }
                Some(idx) => {
                    if !filter.is_volatile(text) {
                        sections[idx].lines.push(text.to_string());
                    }
                }
            },
        }
    }

    Disassembly { format, sections }
}

fn file_format(line: &str) -> Option<String> {
    let (_, rest) = line.split_once(FILE_FORMAT_MARKER)?;
    let format = rest.trim();
    (!format.is_empty()).then(|| format.to_string())
}
