//! Output visitors
//!
//! A visitor drives a node iterator and hands each visited node to an
//! output strategy. The strategy owns the target format; the visitor owns
//! the call ordering — header, one node per visit in iterator order,
//! footer — and never mutates a node.

use crate::core::error::{Error, Result};
use crate::core::node::Node;
use crate::core::types::PropertyKey;
use crate::graph::traversal::NodeIterator;
use serde_json::json;

/// Format-specific output target driven by the visitor
pub trait OutputStrategy {
    /// Called once before the first node
    fn write_header(&mut self) -> Result<()>;

    /// Called once per visited node, in iterator order
    fn write_node(&mut self, node: &Node) -> Result<()>;

    /// Called once after the last node
    fn write_footer(&mut self) -> Result<()>;
}

/// Drives a traversal through an output strategy
#[derive(Default)]
pub struct OutputVisitor {
    strategy: Option<Box<dyn OutputStrategy>>,
}

impl OutputVisitor {
    /// Create a visitor with no strategy set
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a visitor over the given strategy
    pub fn with_strategy(strategy: Box<dyn OutputStrategy>) -> Self {
        Self {
            strategy: Some(strategy),
        }
    }

    /// Set or replace the output strategy
    pub fn set_strategy(&mut self, strategy: Box<dyn OutputStrategy>) {
        self.strategy = Some(strategy);
    }

    /// Take back the strategy, e.g. to read collected output
    pub fn into_strategy(self) -> Option<Box<dyn OutputStrategy>> {
        self.strategy
    }

    /// Walk the iterator through the strategy.
    ///
    /// Fails with [`Error::Config`] if no strategy is set. Returns the
    /// number of nodes written.
    pub fn visit(&mut self, iterator: NodeIterator<'_>) -> Result<usize> {
        let strategy = self
            .strategy
            .as_mut()
            .ok_or_else(|| Error::config("no output strategy set"))?;

        strategy.write_header()?;
        let mut written = 0;
        for handle in iterator {
            strategy.write_node(&handle.read())?;
            written += 1;
        }
        strategy.write_footer()?;
        Ok(written)
    }
}

/// JSON output strategy collecting visited nodes into a document array.
///
/// Attribute keys are emitted sorted so the output is deterministic.
#[derive(Default)]
pub struct JsonStrategy {
    nodes: Vec<serde_json::Value>,
    rendered: Option<String>,
}

impl JsonStrategy {
    /// Create an empty JSON strategy
    pub fn new() -> Self {
        Self::default()
    }

    /// The rendered document, available after the footer was written
    pub fn rendered(&self) -> Option<&str> {
        self.rendered.as_deref()
    }
}

impl OutputStrategy for JsonStrategy {
    fn write_header(&mut self) -> Result<()> {
        self.nodes.clear();
        self.rendered = None;
        Ok(())
    }

    fn write_node(&mut self, node: &Node) -> Result<()> {
        let mut attributes = serde_json::Map::new();
        let mut keys: Vec<&PropertyKey> = node.attributes().keys().collect();
        keys.sort();
        for key in keys {
            attributes.insert(key.to_string(), serde_json::to_value(&node.attributes()[key])?);
        }

        let relations: Vec<serde_json::Value> = node
            .relations()
            .iter()
            .map(|relation| {
                json!({
                    "name": relation.name,
                    "targets": relation
                        .targets
                        .iter()
                        .map(|t| t.to_string())
                        .collect::<Vec<String>>(),
                })
            })
            .collect();

        self.nodes.push(json!({
            "oid": node.oid().to_string(),
            "attributes": attributes,
            "relations": relations,
        }));
        Ok(())
    }

    fn write_footer(&mut self) -> Result<()> {
        self.rendered = Some(serde_json::to_string_pretty(&self.nodes)?);
        Ok(())
    }
}
