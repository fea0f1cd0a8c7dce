//! Best-effort extraction of a structured [`Plan`] from a validation
//! request's markdown content (spec §4.4 self-suspension protocol step (c):
//! "attempts to parse a structured plan from the content's markdown — if
//! successful, stores it on the task for later precise execution").
//!
//! Recognizes a flat numbered or bulleted list as the plan's steps. Anything
//! else (prose, nested structure) yields `None` rather than a guess — the
//! task still suspends and waits for the user either way; only the
//! *precision* of the later execution phase depends on this parse
//! succeeding.

use fulcrum_core::{Plan, PlanStep, StepStatus};

/// Parse `markdown` into a [`Plan`], or `None` if no list of steps was
/// recognized.
pub fn parse_plan(markdown: &str) -> Option<Plan> {
    let mut steps = Vec::new();
    for (i, line) in markdown.lines().enumerate() {
        let trimmed = line.trim();
        let title = strip_numbered_prefix(trimmed).or_else(|| strip_bullet_prefix(trimmed));
        if let Some(title) = title {
            if title.is_empty() {
                continue;
            }
            steps.push(PlanStep {
                id: format!("step-{}", i + 1),
                title: title.to_string(),
                description: title.to_string(),
                status: StepStatus::Pending,
            });
        }
    }

    if steps.is_empty() {
        None
    } else {
        Some(Plan { steps })
    }
}

fn strip_numbered_prefix(line: &str) -> Option<&str> {
    let digits_end = line.find(|c: char| !c.is_ascii_digit())?;
    if digits_end == 0 {
        return None;
    }
    let rest = &line[digits_end..];
    let rest = rest.strip_prefix('.').or_else(|| rest.strip_prefix(')'))?;
    Some(rest.trim())
}

fn strip_bullet_prefix(line: &str) -> Option<&str> {
    line.strip_prefix("- ")
        .or_else(|| line.strip_prefix("* "))
        .map(str::trim)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_numbered_list() {
        let md = "Here is my plan:\n1. Gather requirements\n2. Draft the report\n3. Send for review\n";
        let plan = parse_plan(md).unwrap();
        assert_eq!(plan.steps.len(), 3);
        assert_eq!(plan.steps[0].title, "Gather requirements");
        assert_eq!(plan.steps[2].title, "Send for review");
        assert!(plan.steps.iter().all(|s| s.status == StepStatus::Pending));
    }

    #[test]
    fn parses_bulleted_list() {
        let md = "- Step one\n- Step two\n";
        let plan = parse_plan(md).unwrap();
        assert_eq!(plan.steps.len(), 2);
        assert_eq!(plan.steps[1].title, "Step two");
    }

    #[test]
    fn prose_with_no_list_yields_none() {
        let md = "I think we should just look into this further before committing.";
        assert!(parse_plan(md).is_none());
    }

    #[test]
    fn step_ids_are_stable_and_unique() {
        let md = "1. a\n2. b\n";
        let plan = parse_plan(md).unwrap();
        assert_eq!(plan.steps[0].id, "step-1");
        assert_eq!(plan.steps[1].id, "step-2");
    }
}
