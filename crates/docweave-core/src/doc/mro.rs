//! C3 linearization of class hierarchies

use std::collections::HashMap;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MroError {
    #[error("cannot create a consistent method resolution order for {class} (bases {bases})")]
    Inconsistent { class: String, bases: String },

    #[error("{0} inherits from itself")]
    Cycle(String),
}

/// Class name to direct bases; classes missing from the map have no bases
pub type BaseGraph = HashMap<String, Vec<String>>;

/// The C3 linearization of `class`, starting with `class` itself
pub fn linearize(class: &str, graph: &BaseGraph) -> Result<Vec<String>, MroError> {
    let mut stack = Vec::new();
    let mut memo = HashMap::new();
    linearize_inner(class, graph, &mut stack, &mut memo)
}

fn linearize_inner(
    class: &str,
    graph: &BaseGraph,
    stack: &mut Vec<String>,
    memo: &mut HashMap<String, Vec<String>>,
) -> Result<Vec<String>, MroError> {
    if let Some(done) = memo.get(class) {
        return Ok(done.clone());
    }
    if stack.iter().any(|c| c == class) {
        return Err(MroError::Cycle(class.to_string()));
    }
    let bases = graph.get(class).cloned().unwrap_or_default();
    stack.push(class.to_string());
    let mut sequences = Vec::with_capacity(bases.len() + 1);
    for base in &bases {
        sequences.push(linearize_inner(base, graph, stack, memo)?);
    }
    stack.pop();
    sequences.push(bases.clone());

    let mut result = vec![class.to_string()];
    result.extend(merge(sequences).ok_or_else(|| MroError::Inconsistent {
        class: class.to_string(),
        bases: bases.join(", "),
    })?);
    memo.insert(class.to_string(), result.clone());
    Ok(result)
}

/// Repeatedly take the first head that appears in no tail
fn merge(mut sequences: Vec<Vec<String>>) -> Option<Vec<String>> {
    let mut result = Vec::new();
    loop {
        sequences.retain(|s| !s.is_empty());
        if sequences.is_empty() {
            return Some(result);
        }
        let head = sequences
            .iter()
            .map(|s| &s[0])
            .find(|head| !sequences.iter().any(|s| s[1..].contains(head)))?
            .clone();
        for sequence in &mut sequences {
            if sequence[0] == head {
                sequence.remove(0);
            }
        }
        result.push(head);
    }
}

/// Depth-first, left-to-right order without duplicates, starting with `class`
///
/// Used when no consistent linearization exists.
#[must_use]
pub fn depth_first(class: &str, graph: &BaseGraph) -> Vec<String> {
    fn visit(class: &str, graph: &BaseGraph, out: &mut Vec<String>) {
        if out.iter().any(|c| c == class) {
            return;
        }
        out.push(class.to_string());
        for base in graph.get(class).into_iter().flatten() {
            visit(base, graph, out);
        }
    }
    let mut out = Vec::new();
    visit(class, graph, &mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(edges: &[(&str, &[&str])]) -> BaseGraph {
        edges
            .iter()
            .map(|(class, bases)| {
                (
                    (*class).to_string(),
                    bases.iter().map(|b| (*b).to_string()).collect(),
                )
            })
            .collect()
    }

    #[test]
    fn test_single_inheritance() {
        let g = graph(&[("Bar", &["Foo"])]);
        assert_eq!(linearize("Bar", &g).unwrap(), vec!["Bar", "Foo"]);
        assert_eq!(linearize("Foo", &g).unwrap(), vec!["Foo"]);
    }

    #[test]
    fn test_diamond() {
        let g = graph(&[("B", &["A"]), ("C", &["A"]), ("D", &["B", "C"])]);
        assert_eq!(linearize("D", &g).unwrap(), vec!["D", "B", "C", "A"]);
    }

    #[test]
    fn test_classic_c3_example() {
        let g = graph(&[
            ("K1", &["A", "B", "C"]),
            ("K2", &["D", "B", "E"]),
            ("K3", &["D", "A"]),
            ("Z", &["K1", "K2", "K3"]),
        ]);
        assert_eq!(
            linearize("Z", &g).unwrap(),
            vec!["Z", "K1", "K2", "K3", "D", "A", "B", "C", "E"]
        );
    }

    #[test]
    fn test_inconsistent_order_falls_back() {
        let g = graph(&[("B", &["A"]), ("C", &["A", "B"])]);
        assert!(matches!(
            linearize("C", &g),
            Err(MroError::Inconsistent { .. })
        ));
        assert_eq!(depth_first("C", &g), vec!["C", "A", "B"]);
    }

    #[test]
    fn test_cycles_are_errors() {
        let g = graph(&[("A", &["B"]), ("B", &["A"])]);
        assert!(matches!(linearize("A", &g), Err(MroError::Cycle(_))));
        assert_eq!(depth_first("A", &g), vec!["A", "B"]);
    }
}
