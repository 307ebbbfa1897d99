use crate::models::{KnowledgeEntry, KnowledgeExport};
use std::fmt::Write;

/// Human-readable knowledge document
pub fn render_markdown(export: &KnowledgeExport) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "# Incident Knowledge Base Export");
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "_Generated {} | {} | {} incidents, {} solutions, {} lessons_",
        export.generated_at.format("%Y-%m-%d %H:%M:%S UTC"),
        export.filter,
        export.total_incidents,
        export.total_solutions,
        export.total_lessons
    );

    for entry in &export.entries {
        let _ = writeln!(out);
        write_entry(&mut out, entry);
    }

    out
}

fn write_entry(out: &mut String, entry: &KnowledgeEntry) {
    let incident = &entry.incident;

    let _ = writeln!(out, "## {}", incident.title);
    let _ = writeln!(out);
    let _ = writeln!(out, "- **ID:** `{}`", incident.id);
    let _ = writeln!(out, "- **Category:** {}", incident.category);
    let _ = writeln!(out, "- **Severity:** {}", incident.severity);
    let _ = writeln!(out, "- **Status:** {}", incident.status);
    if let Some(env) = &incident.environment {
        let _ = writeln!(out, "- **Environment:** {}", env);
    }
    if let Some(frequency) = &incident.frequency {
        let _ = writeln!(out, "- **Frequency:** {}", frequency);
    }
    let _ = writeln!(out, "- **Created:** {}", incident.created.format("%Y-%m-%d"));
    if let Some(resolved) = incident.resolved_at {
        let _ = writeln!(out, "- **Resolved:** {}", resolved.format("%Y-%m-%d"));
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "{}", incident.description.trim());

    if let Some(symptoms) = &incident.symptoms {
        let _ = writeln!(out);
        let _ = writeln!(out, "**Symptoms:** {}", symptoms.trim());
    }
    if let Some(root_cause) = &incident.root_cause {
        let _ = writeln!(out);
        let _ = writeln!(out, "**Root cause:** {}", root_cause.trim());
    }

    if !entry.solutions.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "### Solutions");
        for solution in &entry.solutions {
            let _ = writeln!(out);
            let rating = if solution.effectiveness > 0 {
                format!(" ({}/5)", solution.effectiveness)
            } else {
                String::new()
            };
            let _ = writeln!(out, "#### {}{}", solution.title, rating);
            if !solution.description.trim().is_empty() {
                let _ = writeln!(out);
                let _ = writeln!(out, "{}", solution.description.trim());
            }
            let steps = solution.steps_list();
            if !steps.is_empty() {
                let _ = writeln!(out);
                for (i, step) in steps.iter().enumerate() {
                    let marker = format!("{}. ", i + 1);
                    let indent = " ".repeat(marker.len());
                    let _ = writeln!(out, "{}{}", marker, continued(step.trim(), &indent));
                }
            }
            if let Some(warnings) = &solution.warnings {
                let _ = writeln!(out);
                let _ = writeln!(out, "> **Warning:** {}", continued(warnings.trim(), "> "));
            }
        }
    }

    if !entry.lessons.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "### Lessons Learned");
        let _ = writeln!(out);
        for lesson in &entry.lessons {
            let _ = writeln!(out, "- **{}** ({})", lesson.title, lesson.lesson_type);
            if !lesson.prevention.trim().is_empty() {
                let _ = writeln!(
                    out,
                    "  - Prevention: {}",
                    continued(lesson.prevention.trim(), "    ")
                );
            }
        }
    }
}

/// Prefix every line after the first so it stays inside its list item
fn continued(text: &str, indent: &str) -> String {
    text.lines()
        .collect::<Vec<_>>()
        .join(&format!("\n{}", indent))
}
