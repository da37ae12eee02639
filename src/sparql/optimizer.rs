//! Join reordering for basic graph patterns. A real cost-based optimizer
//! needs index cardinality statistics we don't keep; this applies the one
//! heuristic that is cheap and almost always right — match the
//! most-constrained triple patterns first, since each one narrows the
//! candidate bindings the remaining patterns have to scan.

use spargebra::term::{NamedNodePattern, TermPattern, TriplePattern};

fn bound_positions(pattern: &TriplePattern) -> u8 {
    let mut n = 0;
    if !matches!(pattern.subject, TermPattern::Variable(_)) {
        n += 1;
    }
    if !matches!(pattern.predicate, NamedNodePattern::Variable(_)) {
        n += 1;
    }
    if !matches!(pattern.object, TermPattern::Variable(_)) {
        n += 1;
    }
    n
}

/// Reorders a basic graph pattern's triple patterns, most-constrained first.
/// Stable on ties so a query's own ordering is preserved when no pattern is
/// more selective than another.
pub fn reorder_bgp(patterns: &mut [TriplePattern]) {
    patterns.sort_by(|a, b| bound_positions(b).cmp(&bound_positions(a)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use spargebra::term::{NamedNode, Variable};

    fn var(name: &str) -> TermPattern {
        TermPattern::Variable(Variable::new(name).unwrap())
    }

    fn named(iri: &str) -> NamedNodePattern {
        NamedNodePattern::NamedNode(NamedNode::new(iri).unwrap())
    }

    #[test]
    fn fully_unbound_pattern_sorts_after_constrained_ones() {
        let mut patterns = vec![
            TriplePattern { subject: var("s"), predicate: NamedNodePattern::Variable(Variable::new("p").unwrap()), object: var("o") },
            TriplePattern { subject: TermPattern::NamedNode(NamedNode::new("http://e/s").unwrap()), predicate: named("http://e/p"), object: var("o2") },
        ];
        reorder_bgp(&mut patterns);
        assert_eq!(bound_positions(&patterns[0]), 2);
        assert_eq!(bound_positions(&patterns[1]), 0);
    }
}
