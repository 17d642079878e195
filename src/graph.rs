//! The circuit graph projector: turns a linked macro's instances into a
//! bipartite net/terminal graph and reports basic connectivity statistics.
//!
//! Rendering backends (DOT export, matplotlib) are explicitly out of scope;
//! this module only builds the graph and summarizes it.

use std::collections::HashMap;

use arcstr::ArcStr;
use indexmap::IndexMap;
use petgraph::graph::{NodeIndex, UnGraph};
use tracing::instrument;

use crate::model::{Child, Macro, Netlist};

/// One node of the bipartite graph: either a net or an instance terminal.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
enum Node {
    Net(ArcStr),
    /// `"{ref_des}.{port}"`, or bare `ref_des` when the port could not be
    /// resolved against a definition.
    Terminal(String),
}

/// Summary statistics over a [`CircuitGraph`]'s nets.
#[derive(Clone, Debug, PartialEq)]
pub struct ConnectivityStats {
    pub net_count: usize,
    pub average_fanout: f64,
    pub max_fanout: Option<(String, usize)>,
}

/// A projection of one macro's instances into nets and the terminals
/// attached to each, suitable for connectivity analysis independent of any
/// particular rendering backend.
pub struct CircuitGraph {
    /// Net name -> ordered list of terminal identifiers connected to it.
    pub nets: IndexMap<ArcStr, Vec<String>>,
    /// Ref-des -> metadata (currently just the resolved or textual model
    /// name), mirroring the "model" key captured for visualization in the
    /// original projector.
    pub instance_metadata: IndexMap<ArcStr, HashMap<String, String>>,
    graph: UnGraph<Node, ()>,
    node_index: HashMap<Node, NodeIndex>,
}

impl CircuitGraph {
    fn empty() -> Self {
        Self {
            nets: IndexMap::new(),
            instance_metadata: IndexMap::new(),
            graph: UnGraph::new_undirected(),
            node_index: HashMap::new(),
        }
    }

    /// Projects the netlist's synthesized top-level macro.
    pub fn from_netlist(netlist: &Netlist) -> Self {
        Self::from_macro(&netlist.top())
    }

    /// Projects a single macro's direct instance children.
    #[instrument(skip(macro_), fields(macro_name = %macro_.name))]
    pub fn from_macro(macro_: &Macro) -> Self {
        let mut graph = Self::empty();
        for child in &macro_.children {
            if let Child::Instance(instance) = child {
                graph.process_instance(instance);
            }
        }
        graph
    }

    fn process_instance(&mut self, instance: &crate::model::Instance) {
        let ref_des = instance.name.to_string();

        let model_name = match (&instance.definition, &instance.definition_name) {
            (Some(def), _) => def.name(),
            (None, Some(name)) => name.to_string(),
            (None, None) => "Unknown".to_string(),
        };
        let mut metadata = HashMap::new();
        metadata.insert("model".to_string(), model_name);
        self.instance_metadata.insert(instance.name.clone(), metadata);

        for (net_name, formal_port) in &instance.nets {
            let identifier = match formal_port {
                Some(port) => format!("{ref_des}.{}", port.name),
                None => ref_des.clone(),
            };
            self.add_connection(net_name.clone(), identifier);
        }
    }

    fn node(&mut self, node: Node) -> NodeIndex {
        if let Some(&idx) = self.node_index.get(&node) {
            return idx;
        }
        let idx = self.graph.add_node(node.clone());
        self.node_index.insert(node, idx);
        idx
    }

    /// Records one net-to-terminal connection.
    pub fn add_connection(&mut self, net_name: ArcStr, terminal: String) {
        self.nets.entry(net_name.clone()).or_default().push(terminal.clone());
        let net_idx = self.node(Node::Net(net_name));
        let terminal_idx = self.node(Node::Terminal(terminal));
        self.graph.add_edge(net_idx, terminal_idx, ());
    }

    /// Net count, average fanout and the highest-fanout net, or `None` stats
    /// when the graph has no nets at all.
    pub fn analyze_connectivity(&self) -> ConnectivityStats {
        let degrees: Vec<(ArcStr, usize)> = self
            .nets
            .iter()
            .map(|(name, terminals)| (name.clone(), terminals.len()))
            .collect();

        let net_count = degrees.len();
        let average_fanout = if net_count == 0 {
            0.0
        } else {
            degrees.iter().map(|(_, d)| *d as f64).sum::<f64>() / net_count as f64
        };
        let max_fanout = degrees
            .into_iter()
            .max_by_key(|(_, d)| *d)
            .map(|(name, d)| (name.to_string(), d));

        ConnectivityStats {
            net_count,
            average_fanout,
            max_fanout,
        }
    }
}
