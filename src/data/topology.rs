//! `.net` network descriptions.
//!
//! ```text
//! # <processing modules> <input modules>
//! 1 1
//! # name  type  size        (input modules first)
//! pat     input 3
//! cat     calm  2
//! # per processing module: name, number of incoming links, then the links
//! cat 1
//! pat normal                # or: pat delay <ticks>
//! ```

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use super::Tokens;
use crate::core::{CalmError, CalmResult, LinkMode, ModuleKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleSpec {
    pub name: String,
    pub kind: ModuleKind,
    pub size: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkSpec {
    pub to: String,
    pub from: String,
    pub mode: LinkMode,
}

/// Parsed network description.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Topology {
    pub modules: Vec<ModuleSpec>,
    pub links: Vec<LinkSpec>,
}

impl Topology {
    pub fn num_inputs(&self) -> usize {
        self.modules
            .iter()
            .filter(|m| m.kind == ModuleKind::Input)
            .count()
    }

    fn has_module(&self, name: &str) -> bool {
        self.modules.iter().any(|m| m.name == name)
    }

    /// Write the description in `.net` form.
    pub fn save(&self, path: &Path) -> CalmResult<()> {
        std::fs::write(path, self.to_string())?;
        Ok(())
    }
}

impl FromStr for Topology {
    type Err = CalmError;

    fn from_str(text: &str) -> CalmResult<Self> {
        let mut t = Tokens::new(text);
        let num_calm: usize = t.parse("number of processing modules")?;
        let num_inputs: usize = t.parse("number of input modules")?;

        let mut topo = Topology::default();
        for i in 0..num_calm + num_inputs {
            let line = t.line();
            let name = t.next_token("module name")?.to_string();
            let kind: ModuleKind = t.next_token("module type")?.parse().map_err(|e| {
                CalmError::Parse {
                    line,
                    msg: format!("{e}"),
                }
            })?;
            let size: usize = t.parse("module size")?;
            if (i < num_inputs) != (kind == ModuleKind::Input) {
                return Err(CalmError::Parse {
                    line,
                    msg: format!(
                        "expected {num_inputs} input modules before the others, found '{name}' of type {kind}"
                    ),
                });
            }
            topo.modules.push(ModuleSpec { name, kind, size });
        }

        for _ in 0..num_calm {
            let to = t.next_token("destination module")?.to_string();
            if !topo.has_module(&to) {
                return Err(CalmError::UnknownModule(to));
            }
            let count: usize = t.parse("number of connections")?;
            for _ in 0..count {
                let from = t.next_token("source module")?.to_string();
                if !topo.has_module(&from) {
                    return Err(CalmError::UnknownModule(from));
                }
                let line = t.line();
                let mode = match t.next_token("link type")? {
                    "normal" => LinkMode::Immediate,
                    "delay" => LinkMode::Delayed(t.parse("delay ticks")?),
                    other => {
                        return Err(CalmError::Parse {
                            line,
                            msg: format!("unknown link type '{other}'"),
                        })
                    }
                };
                topo.links.push(LinkSpec {
                    to: to.clone(),
                    from,
                    mode,
                });
            }
        }
        Ok(topo)
    }
}

impl fmt::Display for Topology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inputs = self.num_inputs();
        writeln!(f, "# processing modules, input modules")?;
        writeln!(f, "{} {}", self.modules.len() - inputs, inputs)?;
        writeln!(f, "# name type size")?;
        for m in &self.modules {
            writeln!(f, "{} {} {}", m.name, m.kind, m.size)?;
        }
        writeln!(f, "# connections")?;
        for m in self.modules.iter().filter(|m| m.kind != ModuleKind::Input) {
            let links: Vec<&LinkSpec> = self.links.iter().filter(|l| l.to == m.name).collect();
            writeln!(f, "{} {}", m.name, links.len())?;
            for l in links {
                match l.mode {
                    LinkMode::Immediate => writeln!(f, "{} normal", l.from)?,
                    LinkMode::Delayed(d) => writeln!(f, "{} delay {}", l.from, d)?,
                }
            }
        }
        Ok(())
    }
}

/// Read and parse a `.net` file.
pub fn load_topology(path: &Path) -> CalmResult<Topology> {
    std::fs::read_to_string(path)?.parse()
}
