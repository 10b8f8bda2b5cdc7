//! Cypher DUMP export: serialize a progression graph as Cypher statements.
//!
//! Produces a Cypher script that can be loaded into Neo4j or any
//! Cypher-compatible database for inspection.
//!
//! ```text
//! DagSnapshot → export_cypher_dump() → CREATE (:Disease) / PROGRESSES_TO statements
//!   → paste into Neo4j Browser, or pipe into cypher-shell
//! ```

use std::io::Write;

use smallvec::SmallVec;

use crate::config::VocabularyEntry;
use crate::model::{DagSnapshot, GraphEdge};
use crate::Result;

/// Cypher literal.
enum Literal<'a> {
    Str(&'a str),
    Float(f64),
    Int(u32),
}

/// Export a snapshot as a Cypher DUMP script.
///
/// Nodes become `:Disease` nodes keyed by `code` (with the vocabulary name
/// when known); edges become `PROGRESSES_TO` relationships carrying weight,
/// fit score, origin and reason.
pub fn export_cypher_dump(dag: &DagSnapshot, vocabulary: &[VocabularyEntry], writer: &mut dyn Write) -> Result<()> {
    // Header
    writeln!(writer, "// prognos Cypher DUMP")?;
    writeln!(writer, "// Nodes: {}", dag.node_count())?;
    writeln!(writer, "// Relationships: {}", dag.edge_count())?;
    writeln!(writer, "// Global fit: {}", dag.global_fit())?;
    writeln!(writer)?;

    for code in dag.nodes() {
        let mut props: SmallVec<[(&str, Literal<'_>); 2]> = SmallVec::new();
        props.push(("code", Literal::Str(code.as_str())));
        if let Some(entry) = vocabulary.iter().find(|v| v.code == *code) {
            props.push(("name", Literal::Str(&entry.name)));
        }
        writeln!(writer, "CREATE (:Disease {{{}}});", format_properties(&props))?;
    }

    writeln!(writer)?;
    writeln!(writer, "// Relationships")?;

    for edge in dag.edges() {
        writeln!(
            writer,
            "MATCH (a:Disease {{code: {}}}), (b:Disease {{code: {}}}) CREATE (a)-[:PROGRESSES_TO {{{}}}]->(b);",
            format_value(&Literal::Str(edge.from.as_str())),
            format_value(&Literal::Str(edge.to.as_str())),
            format_properties(&edge_properties(dag, edge)),
        )?;
    }

    Ok(())
}

fn edge_properties<'a>(dag: &DagSnapshot, edge: &'a GraphEdge) -> SmallVec<[(&'static str, Literal<'a>); 5]> {
    let mut props: SmallVec<[(&'static str, Literal<'a>); 5]> = SmallVec::new();
    props.push(("weight", Literal::Float(edge.weight)));
    props.push(("fitScore", Literal::Float(edge.fit_score)));
    props.push(("origin", Literal::Str(edge.origin.as_str())));
    if let Some(reason) = &edge.reason {
        props.push(("reason", Literal::Str(reason)));
    }
    if dag.iteration() > 0 {
        props.push(("iteration", Literal::Int(dag.iteration())));
    }
    props
}

/// Format properties as a Cypher property string (key: value, ...).
fn format_properties(props: &[(&str, Literal<'_>)]) -> String {
    props
        .iter()
        .map(|(key, value)| format!("{}: {}", key, format_value(value)))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Format a literal for Cypher.
fn format_value(value: &Literal<'_>) -> String {
    match value {
        Literal::Str(s) => format!("'{}'", s.replace('\\', "\\\\").replace('\'', "\\'")),
        Literal::Float(f) if f.is_finite() => format!("{}", f),
        Literal::Float(_) => "null".to_string(),
        Literal::Int(i) => i.to_string(),
    }
}
