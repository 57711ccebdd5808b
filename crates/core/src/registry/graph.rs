//! Dependency ordering
//!
//! Depth-first topological sort. Nodes are visited in the order given and
//! dependencies in declaration order, so the result is deterministic.
//! Dependencies on ids outside the node set are skipped.

use std::collections::HashMap;

use faultline_domain::{FaultlineError, Result};

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

struct Walk<'a> {
    edges: HashMap<&'a str, &'a [String]>,
    marks: HashMap<&'a str, Mark>,
    path: Vec<&'a str>,
    order: Vec<String>,
}

impl<'a> Walk<'a> {
    fn visit(&mut self, id: &'a str) -> Result<()> {
        match self.marks.get(id) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::Visiting) => {
                let start = self.path.iter().position(|node| *node == id).unwrap_or(0);
                let mut cycle: Vec<String> =
                    self.path[start..].iter().map(|node| (*node).to_string()).collect();
                cycle.push(id.to_string());
                return Err(FaultlineError::CircularDependency { cycle });
            }
            None => {}
        }
        let Some(&dependencies) = self.edges.get(id) else {
            return Ok(());
        };

        self.marks.insert(id, Mark::Visiting);
        self.path.push(id);
        for dependency in dependencies {
            self.visit(dependency.as_str())?;
        }
        self.path.pop();
        self.marks.insert(id, Mark::Done);
        self.order.push(id.to_string());
        Ok(())
    }
}

/// Order `nodes` so every node comes after its dependencies
///
/// Fails with `CircularDependency` naming the cycle (first node repeated at
/// the end).
pub fn dependency_order<'a, I>(nodes: I) -> Result<Vec<String>>
where
    I: IntoIterator<Item = (&'a str, &'a [String])>,
{
    let nodes: Vec<(&'a str, &'a [String])> = nodes.into_iter().collect();
    let mut walk = Walk {
        edges: nodes.iter().copied().collect(),
        marks: HashMap::with_capacity(nodes.len()),
        path: Vec::new(),
        order: Vec::with_capacity(nodes.len()),
    };
    for &(id, _) in &nodes {
        walk.visit(id)?;
    }
    Ok(walk.order)
}
