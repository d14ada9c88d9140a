//! Skills: markdown instruction files exposed to the model as `skill__<name>` tools.
//!
//! A skill lives in `<skills dir>/<skill>/SKILL.md`:
//!
//! ```markdown
//! ---
//! name: summarize
//! description: Summarize a document
//! argument-hint: <path>
//! ---
//! Read $1 and write a three-line summary.
//! ```
//!
//! Calling the tool returns the body with its arguments substituted; the
//! model then follows those instructions.

mod frontmatter;
mod source;

pub use frontmatter::{ParsedDocument, parse_frontmatter};
pub use source::{SKILL_FILE, SkillFrontmatter, SkillToolSource};

pub const SKILL_TOOL_PREFIX: &str = "skill__";

/// Tool name for a skill: `skill__<name>`.
pub fn make_skill_name(skill: &str) -> String {
    format!("{}{}", SKILL_TOOL_PREFIX, skill)
}

pub fn parse_skill_name(name: &str) -> Option<&str> {
    name.strip_prefix(SKILL_TOOL_PREFIX)
        .filter(|skill| !skill.is_empty())
}

/// Substitute `$ARGUMENTS`, `${ARGUMENTS}` and positional `$1`..`$9`.
pub fn substitute_args(content: &str, arguments: &str) -> String {
    let mut result = content.to_string();
    let args: Vec<&str> = arguments.split_whitespace().collect();

    for (i, arg) in args.iter().take(9).enumerate() {
        result = result.replace(&format!("${}", i + 1), arg);
    }

    result
        .replace("${ARGUMENTS}", arguments)
        .replace("$ARGUMENTS", arguments)
}
