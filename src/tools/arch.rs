//! Architecture inspection.
//!
//! The architecture XML is parsed into a tree and walked; two properties feed
//! synthesis: the LUT size and the memory address width.

use std::path::Path;

use crate::{FlowError, FlowResult};

/// Properties of an architecture file used by the flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ArchInfo {
    /// Widest `.names` primitive input (LUT K); 0 if the architecture has none
    pub lut_size: u32,
    /// Widest address port on a `port_ram` primitive; 0 if there is none
    pub memory_addr_width: u32,
}

impl ArchInfo {
    pub fn inspect(path: &Path) -> FlowResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|_| FlowError::file_missing(path, "architecture"))?;
        Self::from_xml(&text).map_err(|message| FlowError::config(path, 0, message))
    }

    pub fn from_xml(text: &str) -> Result<Self, String> {
        let doc = roxmltree::Document::parse(text).map_err(|e| e.to_string())?;
        let mut info = ArchInfo::default();

        for pb_type in doc
            .descendants()
            .filter(|n| n.has_tag_name("pb_type"))
        {
            let Some(model) = pb_type.attribute("blif_model") else {
                continue;
            };
            let inputs = pb_type.children().filter(|n| n.has_tag_name("input"));

            if model == ".names" {
                for input in inputs {
                    info.lut_size = info.lut_size.max(num_pins(&input)?);
                }
            } else if model.contains("port_ram") {
                for input in inputs.filter(|n| {
                    n.attribute("port_class")
                        .is_some_and(|c| c.starts_with("address"))
                }) {
                    info.memory_addr_width = info.memory_addr_width.max(num_pins(&input)?);
                }
            }
        }

        Ok(info)
    }
}

fn num_pins(node: &roxmltree::Node<'_, '_>) -> Result<u32, String> {
    let raw = node.attribute("num_pins").unwrap_or("0");
    raw.trim().parse().map_err(|_| {
        format!(
            "bad num_pins '{}' on <{}> at byte {}",
            raw,
            node.tag_name().name(),
            node.range().start
        )
    })
}
