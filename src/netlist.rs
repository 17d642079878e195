//! Indented text dump of a linked netlist, mirroring the 4-space-per-level
//! rendering of the reference model's `write(stream, indent)` methods.

use std::io::{self, Write};

use crate::error::EngineError;
use crate::model::{Child, Definition, Instance, Macro, Model, Netlist, Port, PrimitiveKind};

const INDENT_WIDTH: usize = 4;

/// A sink that knows how to write one indented line at a time. Blanket
/// implemented over any [`Write`] so callers can dump a netlist straight to
/// a file, a buffer, or stdout.
pub trait IndentedSink {
    fn write_indented(&mut self, indent: usize, value: &str) -> io::Result<()>;
}

impl<W: Write> IndentedSink for W {
    fn write_indented(&mut self, indent: usize, value: &str) -> io::Result<()> {
        writeln!(self, "{}{}", " ".repeat(indent * INDENT_WIDTH), value)
    }
}

impl Port {
    fn write(&self, sink: &mut dyn IndentedSink, indent: usize) -> Result<(), EngineError> {
        sink.write_indented(indent, &format!("Port: {}", self.name))?;
        Ok(())
    }
}

impl PrimitiveKind {
    fn write(&self, sink: &mut dyn IndentedSink, indent: usize) -> Result<(), EngineError> {
        sink.write_indented(indent, &format!("Primitive: {}", self.name()))?;
        for port in self.port_list() {
            port.write(sink, indent + 1)?;
        }
        Ok(())
    }
}

impl Model {
    fn write(&self, sink: &mut dyn IndentedSink, indent: usize) -> Result<(), EngineError> {
        sink.write_indented(indent, &format!("Model: {} ({})", self.name, self.base_type))?;
        let params = self
            .params
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(", ");
        sink.write_indented(indent + 1, &params)?;
        Ok(())
    }
}

impl Definition {
    fn write(&self, sink: &mut dyn IndentedSink, indent: usize) -> Result<(), EngineError> {
        match self {
            Definition::Macro(m) => m.write(sink, indent),
            Definition::Primitive(p) => p.write(sink, indent),
        }
    }
}

impl Instance {
    fn write(&self, sink: &mut dyn IndentedSink, indent: usize) -> Result<(), EngineError> {
        sink.write_indented(indent, &format!("Instance: {}", self.name))?;
        for (net, port) in &self.nets {
            let line = match port {
                Some(p) => format!("Port: {} -> Net: {}", p.name, net),
                None => format!("Net: {net}"),
            };
            sink.write_indented(indent + 1, &line)?;
        }
        let params = self
            .params
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(", ");
        sink.write_indented(indent + 1, &params)?;
        sink.write_indented(indent + 1, "Model:")?;
        match &self.definition {
            Some(def) => def.write(sink, indent + 2)?,
            None => {
                let name = self.definition_name.as_deref().unwrap_or("");
                sink.write_indented(indent + 2, &format!("Unresolved: {name}"))?;
            }
        }
        Ok(())
    }
}

impl Macro {
    fn write(&self, sink: &mut dyn IndentedSink, indent: usize) -> Result<(), EngineError> {
        sink.write_indented(indent, &format!("Macro: {}", self.name))?;
        for child in &self.children {
            write_child(child, sink, indent + 1)?;
        }
        Ok(())
    }
}

fn write_child(child: &Child, sink: &mut dyn IndentedSink, indent: usize) -> Result<(), EngineError> {
    match child {
        Child::Instance(inst) => inst.write(sink, indent),
        Child::Model(model) => model.write(sink, indent),
        Child::Macro(m) => m.write(sink, indent),
    }
}

impl Netlist {
    /// Writes the full netlist dump: primitives actually used, macros in
    /// dependency order, then the top-level instances under a synthesized
    /// "(virtual top)" heading.
    pub fn write(&self, sink: &mut dyn IndentedSink) -> Result<(), EngineError> {
        self.write_indented(sink, 0)
    }

    fn write_indented(&self, sink: &mut dyn IndentedSink, indent: usize) -> Result<(), EngineError> {
        sink.write_indented(indent, &format!("Netlist: {}", self.name))?;

        sink.write_indented(indent, "Primitives:")?;
        for primitive in self.primitives.values() {
            primitive.write(sink, indent + 1)?;
        }

        sink.write_indented(indent, "Macros:")?;
        for macro_ in self.macros.values() {
            macro_.write(sink, indent + 1)?;
        }

        sink.write_indented(indent, "Top-Level Instances:")?;
        sink.write_indented(indent + 1, "(virtual top)")?;
        for instance in &self.top_instances {
            instance.write(sink, indent + 2)?;
        }

        Ok(())
    }
}

/// Writes `netlist` to `path`, creating or truncating the file.
pub fn write_to_path(netlist: &Netlist, path: &std::path::Path) -> Result<(), EngineError> {
    let mut file = std::fs::File::create(path).map_err(EngineError::Write)?;
    netlist.write(&mut file)
}
