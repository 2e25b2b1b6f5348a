// SPDX-License-Identifier: MIT OR Apache-2.0
//! Builtin tool implementations, one per file.
//!
//! [`all`] assembles the full set at startup; there is no run-time plugin
//! loading.

/// Base64 encode/decode.
pub mod base64_codec;
/// CSV parse/stringify.
pub mod csv_data;
/// Environment inspection behind the sensitive-name filter.
pub mod env_inspect;
/// Path-confined file read/write/list.
pub mod file_io;
/// SHA-2 digests.
pub mod hash_digest;
/// HTTP fetch.
pub mod http_fetch;
/// JSON query/validate/format.
pub mod json_data;
/// Markdown rendering.
pub mod markdown;
/// Arithmetic expression evaluation.
pub mod math_calculate;
/// Denylist-gated command execution.
pub mod system_exec;
/// Regex find/extract/replace.
pub mod text_regex;
/// Case/replace/split text helpers.
pub mod text_transform;

use crate::{SafetyPolicy, ToolPlugin};
use std::sync::Arc;

/// Assemble every builtin tool under the given safety policy.
#[must_use]
pub fn all(policy: SafetyPolicy) -> Vec<Arc<dyn ToolPlugin>> {
    vec![
        Arc::new(file_io::FileIoTool::new(policy.clone())),
        Arc::new(http_fetch::HttpFetchTool::new()),
        Arc::new(math_calculate::MathTool),
        Arc::new(text_transform::TextTransformTool),
        Arc::new(text_regex::TextRegexTool),
        Arc::new(markdown::MarkdownTool),
        Arc::new(hash_digest::HashTool),
        Arc::new(base64_codec::Base64Tool),
        Arc::new(csv_data::CsvTool),
        Arc::new(json_data::JsonTool),
        Arc::new(env_inspect::EnvTool::new(policy.clone())),
        Arc::new(system_exec::ExecTool::new(policy)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn tool_ids_are_unique_and_dotted() {
        let tools = all(SafetyPolicy::rooted_at("."));
        let mut seen = BTreeSet::new();
        for tool in &tools {
            let d = tool.descriptor();
            assert!(d.tool_id.contains('.'), "{} is not dotted", d.tool_id);
            assert!(seen.insert(d.tool_id.clone()), "duplicate {}", d.tool_id);
            assert!(!d.capabilities.is_empty(), "{} has no capabilities", d.tool_id);
            assert_eq!(d.category, d.tool_id.split('.').next().unwrap());
        }
        assert_eq!(tools.len(), 12);
    }
}
