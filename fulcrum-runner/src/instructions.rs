//! Instruction assembly for one agent invocation (spec §4.4 "Instruction
//! assembly"). Grounded on `neuron-op-react::ReactOperator::resolve_config`'s
//! system-prompt composition, generalized from a single addendum string into
//! the full block sequence the Task Runner assembles per invocation.

use fulcrum_core::{MailboxKind, MailboxMessage, Task, TaskStatus};

/// Dependency outputs are truncated to this many bytes each before being
/// folded into the dependency context block (spec §4.4).
const DEPENDENCY_OUTPUT_CAP_BYTES: usize = 1024;

/// The persona layer and operating instructions shared by every invocation
/// in a deployment (spec §4.4: "the persona layer, the operating
/// instructions (tool reference + memory protocol + workflow rules)").
/// Supplied once at Task Runner construction, not per task.
#[derive(Debug, Clone, Default)]
pub struct PersonaLayer {
    /// Free-form persona description.
    pub persona: String,
    /// Tool reference, memory protocol, and workflow rules, concatenated.
    pub operating_instructions: String,
}

/// One dependency's resolved output, fed into the dependency context block.
pub struct DependencyOutput<'a> {
    /// The dependency task's title.
    pub title: &'a str,
    /// The dependency task's terminal status.
    pub status: TaskStatus,
    /// The dependency task's output blob, if any was written.
    pub output: Option<&'a str>,
}

/// Assemble the full instruction string for one agent invocation: persona +
/// operating instructions + task title/description + execution-context
/// block + dependency context + mailbox context (spec §4.4).
pub fn assemble(
    persona: &PersonaLayer,
    task: &Task,
    dependencies: &[DependencyOutput<'_>],
    mailbox: &[MailboxMessage],
) -> String {
    let mut out = String::new();

    if !persona.persona.is_empty() {
        out.push_str(&persona.persona);
        out.push_str("\n\n");
    }
    if !persona.operating_instructions.is_empty() {
        out.push_str(&persona.operating_instructions);
        out.push_str("\n\n");
    }

    out.push_str("## Task\n");
    out.push_str(&task.title);
    out.push_str("\n\n");
    out.push_str(&task.description);
    out.push_str("\n\n");

    out.push_str(&execution_context_block(task));

    if !dependencies.is_empty() {
        out.push_str(&dependency_context_block(dependencies));
    }

    let mailbox_context = summarize_mailbox(mailbox);
    if !mailbox_context.is_empty() {
        out.push_str("## Prior validation exchanges\n");
        out.push_str(&mailbox_context);
        out.push('\n');
    }

    out
}

fn execution_context_block(task: &Task) -> String {
    let mut block = String::from("## Execution context\n");
    if let Some(dir) = &task.config.working_directory {
        block.push_str(&format!(
            "Working directory: {dir}. Do not assume any other directory; verify paths before use.\n"
        ));
    }
    if !task.config.environment.is_empty() {
        let mut keys: Vec<&String> = task.config.environment.keys().collect();
        keys.sort();
        block.push_str("Environment:\n");
        for key in keys {
            block.push_str(&format!("  {key}={}\n", task.config.environment[key]));
        }
    }
    block.push('\n');
    block
}

fn dependency_context_block(dependencies: &[DependencyOutput<'_>]) -> String {
    let mut block = String::from(
        "## Dependency outputs\n\
         The tasks below have already completed — do NOT redo their work, \
         build on their output instead.\n\n",
    );
    for dep in dependencies {
        block.push_str(&format!("### {} ({:?})\n", dep.title, dep.status));
        match dep.output {
            Some(output) => block.push_str(&truncate_bytes(output, DEPENDENCY_OUTPUT_CAP_BYTES)),
            None => block.push_str("(no output recorded)"),
        }
        block.push_str("\n\n");
    }
    block
}

/// Summarize prior validation exchanges into a compact text block (spec
/// §4.4: "an accumulated mailbox context summarizing prior validation
/// exchanges").
pub fn summarize_mailbox(mailbox: &[MailboxMessage]) -> String {
    let mut out = String::new();
    for entry in mailbox {
        match entry.kind {
            MailboxKind::Request => {
                out.push_str("You previously requested validation:\n");
                out.push_str(&entry.content);
                out.push('\n');
            }
            MailboxKind::Response => {
                out.push_str(&format!(
                    "The user responded ({}): {}\n",
                    entry
                        .status
                        .map(|s| format!("{s:?}"))
                        .unwrap_or_else(|| "unknown".to_string()),
                    entry.content
                ));
            }
            MailboxKind::Exploration => {
                out.push_str("Earlier exploration notes:\n");
                out.push_str(&entry.content);
                out.push('\n');
            }
        }
    }
    out
}

fn truncate_bytes(s: &str, cap: usize) -> String {
    if s.len() <= cap {
        return s.to_string();
    }
    let mut end = cap;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}\u{2026} [truncated]", &s[..end])
}
