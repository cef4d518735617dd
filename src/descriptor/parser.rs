//! Build Task records from descriptor sections
//!
//! The tool's own data lives in the entry section; every test may have a
//! section named after it. Missing or malformed values fall back to defaults.
//! Only a missing entry section is an error.

use std::collections::HashSet;

use crate::common::{Error, Result};
use crate::model::{Invocation, Task};

use super::section::{Section, Sections};

pub const ENTRY_SECTION: &str = "Alterator Entry";

pub const TYPE_KEY: &str = "Type";
pub const NAME_KEY: &str = "Name";
pub const DISPLAY_NAME_KEY: &str = "DisplayName";
pub const ICON_KEY: &str = "Icon";
pub const REPORT_SUFFIX_KEY: &str = "ReportSuffix";
pub const COMMENT_KEY: &str = "Comment";
pub const ARGS_KEY: &str = "Arguments";
pub const EXEC_KEY: &str = "Exec";

/// Value of the entry-type marker for diagnostic tools
pub const DIAG_ENTRY_TYPE: &str = "Diag";

pub const DEFAULT_ICON: &str = "system-run";
pub const DEFAULT_REPORT_SUFFIX: &str = "tar";

/// Build the tool Task and one Task per test name
///
/// Test tasks inherit the tool's invocation coordinates. Blank and repeated
/// test names are skipped so ids stay unique within the tool.
pub fn build_executables(
    sections: &Sections,
    test_names: &[String],
    invocation: &Invocation,
) -> Result<(Task, Vec<Task>)> {
    let entry = sections
        .get(ENTRY_SECTION)
        .ok_or_else(|| Error::MissingEntrySection(invocation.endpoint.object.clone()))?;

    let tool = build_tool(entry, invocation);

    let mut seen = HashSet::new();
    let tests = test_names
        .iter()
        .map(|name| name.trim())
        .filter(|name| !name.is_empty() && seen.insert(*name))
        .map(|name| build_test(sections.get(name), name, &tool))
        .collect();

    Ok((tool, tests))
}

fn build_tool(entry: &Section, invocation: &Invocation) -> Task {
    match entry.get(TYPE_KEY) {
        Some(DIAG_ENTRY_TYPE) => {}
        other => tracing::warn!(
            object = %invocation.endpoint.object,
            entry_type = ?other,
            "Unexpected entry type, treating as diagnostic tool"
        ),
    }

    let id = entry
        .get(NAME_KEY)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| fallback_id(&invocation.endpoint.object));

    let mut tool = Task::new(&id, invocation.clone());
    tool.names = entry.localized(DISPLAY_NAME_KEY);
    tool.descriptions = entry.localized(COMMENT_KEY);
    tool.icons = entry.localized(ICON_KEY);
    tool.arguments = entry.list(ARGS_KEY).unwrap_or_default();
    tool.report_suffix = entry
        .get(REPORT_SUFFIX_KEY)
        .filter(|suffix| !suffix.is_empty())
        .unwrap_or(DEFAULT_REPORT_SUFFIX)
        .trim_start_matches('.')
        .to_string();
    tool.localize(&Default::default());
    tool
}

fn build_test(section: Option<&Section>, name: &str, tool: &Task) -> Task {
    let mut test = Task::new(name, tool.invocation.clone());
    test.report_suffix = tool.report_suffix.clone();
    test.arguments = tool.arguments.clone();

    match section {
        Some(section) => {
            test.names = section.localized(DISPLAY_NAME_KEY);
            test.descriptions = section.localized(COMMENT_KEY);
            test.icons = if section.contains(ICON_KEY) {
                section.localized(ICON_KEY)
            } else {
                tool.icons.clone()
            };
            match section.list(ARGS_KEY) {
                Some(args) => test.arguments.extend(args),
                None => test.arguments.push(name.to_string()),
            }
        }
        None => {
            tracing::debug!(test = name, tool = %tool.id, "No section for test, synthesizing");
            test.icons = tool.icons.clone();
            test.arguments.push(name.to_string());
        }
    }

    test.localize(&Default::default());
    test
}

/// Last path segment of an object identity
fn fallback_id(object: &str) -> String {
    object
        .rsplit('/')
        .find(|segment| !segment.is_empty())
        .unwrap_or(object)
        .to_string()
}
