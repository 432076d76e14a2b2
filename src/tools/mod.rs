// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Tool system.
//!
//! Tools are the side-effect seam of an agent: the model proposes calls, a
//! human (or the continuous-mode policy) approves them, and the registry
//! dispatches each call to its handler. Execution failures fold into tool
//! output the model can read; they never abort a turn.
//!
//! - [`ToolHandler`] trait - core abstraction for tool implementations
//! - [`ToolRegistry`] - maps tool names to handlers, dispatches calls

pub mod registry;

pub use registry::{DispatchResult, ToolHandler, ToolOutput, ToolRegistry, ToolRegistryBuilder};

/// Line cap on tool output folded into history notes.
pub const HISTORY_NOTE_MAX_LINES: usize = 64;

/// Truncate output by lines, keeping first and last portions.
pub fn truncate_output(output: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = output.lines().collect();
    let total = lines.len();

    if total <= max_lines {
        return output.to_string();
    }

    // Keep first half and last half
    let keep = max_lines / 2;
    let first_part: Vec<&str> = lines.iter().take(keep).copied().collect();
    let last_part: Vec<&str> = lines.iter().skip(total - keep).copied().collect();
    let omitted = total - max_lines;

    format!(
        "{}\n\n... [{omitted} lines omitted] ...\n\n{}",
        first_part.join("\n"),
        last_part.join("\n")
    )
}
