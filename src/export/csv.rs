use crate::models::KnowledgeExport;

const HEADER: [&str; 9] = [
    "id",
    "title",
    "category",
    "severity",
    "status",
    "root_cause",
    "solutions",
    "lessons",
    "created",
];

/// Escape one CSV field per RFC 4180
pub fn escape_field(field: &str) -> String {
    if field.contains(|c: char| matches!(c, ',' | '"' | '\r' | '\n')) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn push_row<I, S>(out: &mut String, fields: I)
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let row: Vec<String> = fields
        .into_iter()
        .map(|f| escape_field(f.as_ref()))
        .collect();
    out.push_str(&row.join(","));
    out.push_str("\r\n");
}

/// One row per incident; solution and lesson titles joined with `"; "`
pub fn render_csv(export: &KnowledgeExport) -> String {
    let mut out = String::new();
    push_row(&mut out, HEADER);

    for entry in &export.entries {
        let incident = &entry.incident;
        let solutions = entry
            .solutions
            .iter()
            .map(|s| s.title.as_str())
            .collect::<Vec<_>>()
            .join("; ");
        let lessons = entry
            .lessons
            .iter()
            .map(|l| l.title.as_str())
            .collect::<Vec<_>>()
            .join("; ");

        push_row(
            &mut out,
            [
                incident.id.clone(),
                incident.title.clone(),
                incident.category.to_string(),
                incident.severity.to_string(),
                incident.status.to_string(),
                incident.root_cause.clone().unwrap_or_default(),
                solutions,
                lessons,
                incident.created.to_rfc3339(),
            ],
        );
    }

    out
}
