//! Placeholder templating for tool scripts and configs.
//!
//! Templates are plain text with three-letter placeholder tokens. Each template
//! kind declares which tokens it understands and whether they must appear; a
//! declared token without a value is an error, and so is a required token the
//! template never mentions.
//!
//! | Token | Meaning |
//! |---|---|
//! | `XXX` | circuit inputs (ODIN file list, Yosys read commands, ABC input netlist) |
//! | `YYY` | architecture file |
//! | `ZZZ` | output netlist |
//! | `PPP` | memory address width from the architecture |
//! | `MMM` | minimum hard multiplier size |
//! | `AAA` | minimum hard adder size |
//! | `KKK` | LUT size from the architecture |

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::{FlowError, FlowResult};

/// Substitution keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Placeholder {
    Inputs,
    Arch,
    Output,
    MemAddrWidth,
    MinHardMult,
    MinHardAdder,
    LutSize,
}

impl Placeholder {
    pub fn token(&self) -> &'static str {
        match self {
            Placeholder::Inputs => "XXX",
            Placeholder::Arch => "YYY",
            Placeholder::Output => "ZZZ",
            Placeholder::MemAddrWidth => "PPP",
            Placeholder::MinHardMult => "MMM",
            Placeholder::MinHardAdder => "AAA",
            Placeholder::LutSize => "KKK",
        }
    }
}

impl fmt::Display for Placeholder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// The kinds of template the flow renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateKind {
    OdinConfig,
    YosysScript,
    AbcScript,
}

impl TemplateKind {
    /// Declared keys in substitution order, with their `required` flag.
    pub fn keys(&self) -> &'static [(Placeholder, bool)] {
        match self {
            TemplateKind::OdinConfig => &[
                (Placeholder::Inputs, true),
                (Placeholder::Arch, true),
                (Placeholder::Output, true),
                (Placeholder::MemAddrWidth, false),
                (Placeholder::MinHardMult, false),
                (Placeholder::MinHardAdder, false),
            ],
            TemplateKind::YosysScript => &[
                (Placeholder::Inputs, true),
                (Placeholder::Arch, true),
                (Placeholder::Output, true),
                (Placeholder::MemAddrWidth, false),
                (Placeholder::MinHardMult, false),
                (Placeholder::MinHardAdder, false),
            ],
            TemplateKind::AbcScript => &[
                (Placeholder::Inputs, true),
                (Placeholder::Output, true),
                (Placeholder::LutSize, true),
            ],
        }
    }

    fn builtin(&self) -> &'static str {
        match self {
            TemplateKind::OdinConfig => ODIN_CONFIG,
            TemplateKind::YosysScript => YOSYS_SCRIPT,
            TemplateKind::AbcScript => ABC_SCRIPT,
        }
    }
}

/// Values for one rendering.
#[derive(Debug, Clone, Default)]
pub struct Substitutions(BTreeMap<Placeholder, String>);

impl Substitutions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, key: Placeholder, value: impl ToString) -> Self {
        self.0.insert(key, value.to_string());
        self
    }

    pub fn get(&self, key: Placeholder) -> Option<&str> {
        self.0.get(&key).map(String::as_str)
    }
}

/// A loaded template.
#[derive(Debug, Clone)]
pub struct Template {
    kind: TemplateKind,
    /// File the text came from, `None` for the built-in text
    source: Option<PathBuf>,
    text: String,
}

impl Template {
    pub fn builtin(kind: TemplateKind) -> Self {
        Template {
            kind,
            source: None,
            text: kind.builtin().to_string(),
        }
    }

    pub fn from_file(kind: TemplateKind, path: &Path) -> FlowResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|_| FlowError::file_missing(path, "template"))?;
        Ok(Template {
            kind,
            source: Some(path.to_path_buf()),
            text,
        })
    }

    /// Use the file at `path` if there is one, else the built-in text.
    pub fn load_or_builtin(kind: TemplateKind, path: &Path) -> FlowResult<Self> {
        if path.is_file() {
            Self::from_file(kind, path)
        } else {
            tracing::debug!("no template at {}, using built-in", path.display());
            Ok(Self::builtin(kind))
        }
    }

    fn origin(&self) -> PathBuf {
        self.source
            .clone()
            .unwrap_or_else(|| PathBuf::from(format!("<built-in {:?}>", self.kind)))
    }

    /// Substitute every declared key, in declared order.
    pub fn render(&self, values: &Substitutions) -> FlowResult<String> {
        let mut out = self.text.clone();
        for &(key, required) in self.kind.keys() {
            let present = out.contains(key.token());
            if required && !present {
                return Err(FlowError::config(
                    self.origin(),
                    0,
                    format!("required placeholder {key} does not appear"),
                ));
            }
            let value = values.get(key).ok_or_else(|| {
                FlowError::config(self.origin(), 0, format!("no value for placeholder {key}"))
            })?;
            if present {
                out = out.replace(key.token(), value);
            }
        }
        Ok(out)
    }

    /// Render into `path`.
    pub fn write(&self, values: &Substitutions, path: &Path) -> FlowResult<()> {
        std::fs::write(path, self.render(values)?)?;
        Ok(())
    }
}

const ODIN_CONFIG: &str = r#"<config>
    <verilog_files>
        <verilog_file>XXX</verilog_file>
    </verilog_files>
    <output>
        <output_type>blif</output_type>
        <output_path_and_name>ZZZ</output_path_and_name>
        <target>
            <arch_file>YYY</arch_file>
        </target>
    </output>
    <optimizations>
        <multiply size="MMM" fixed="1" fracture="0" padding="-1"/>
        <memory split_memory_width="1" split_memory_depth="PPP"/>
        <adder size="0" threshold_size="AAA"/>
    </optimizations>
    <debug_outputs>
        <debug_output_path>.</debug_output_path>
        <output_ast_graphs>0</output_ast_graphs>
        <output_netlist_graphs>0</output_netlist_graphs>
    </debug_outputs>
</config>
"#;

const YOSYS_SCRIPT: &str = r#"yosys -import
plugin -i parmys
yosys -import

scratchpad -set parmys.mem_addr_width PPP
scratchpad -set parmys.min_hard_mult_size MMM
scratchpad -set parmys.min_hard_adder_size AAA

XXX

hierarchy -check -auto-top -purge_lib
proc
opt_expr
opt_clean
check
opt -nodffe -nosdff
fsm
opt -nodffe -nosdff
wreduce
peepopt
opt_clean
share
opt -nodffe -nosdff
memory -nomap
opt_clean

parmys_arch -a YYY
parmys -a YYY -nopass

opt -full -nodffe -nosdff
techmap
opt -fast -nodffe -nosdff
clean
flatten
setundef -zero
stat
write_blif -true + vcc -false + gnd -undef + unconn -blackbox ZZZ
"#;

const ABC_SCRIPT: &str = "read XXX
time
resyn
resyn2
if -K KKK
time
scleanup
time
scleanup
time
write_hie XXX ZZZ
print_stats
";

#[cfg(test)]
mod tests {
    use super::*;

    fn abc_values() -> Substitutions {
        Substitutions::new()
            .set(Placeholder::Inputs, "in.blif")
            .set(Placeholder::Output, "out.blif")
            .set(Placeholder::LutSize, 6)
    }

    #[test]
    fn test_builtin_abc_script() {
        let text = Template::builtin(TemplateKind::AbcScript)
            .render(&abc_values())
            .unwrap();
        assert!(text.starts_with("read in.blif\n"));
        assert!(text.contains("if -K 6\n"));
        assert!(text.contains("write_hie in.blif out.blif\n"));
        assert!(!text.contains("XXX"));
    }

    #[test]
    fn test_missing_value_is_error() {
        let values = Substitutions::new().set(Placeholder::Inputs, "in.blif");
        let err = Template::builtin(TemplateKind::AbcScript)
            .render(&values)
            .unwrap_err();
        assert_eq!(err.class(), "ConfigError");
        assert!(err.to_string().contains("ZZZ"));
    }

    #[test]
    fn test_required_token_absent_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.abc");
        std::fs::write(&path, "read XXX\nwrite_hie XXX out.blif\n").unwrap();

        let err = Template::from_file(TemplateKind::AbcScript, &path)
            .unwrap()
            .render(&abc_values())
            .unwrap_err();
        assert!(err.to_string().contains("custom.abc"));
        assert!(err.to_string().contains("ZZZ"));
    }

    #[test]
    fn test_optional_tokens_may_be_absent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("odin.xml");
        std::fs::write(&path, "<a>XXX</a><b>YYY</b><c>ZZZ</c>").unwrap();

        let values = Substitutions::new()
            .set(Placeholder::Inputs, "top.v")
            .set(Placeholder::Arch, "arch.xml")
            .set(Placeholder::Output, "top.odin.blif")
            .set(Placeholder::MemAddrWidth, 15)
            .set(Placeholder::MinHardMult, 3)
            .set(Placeholder::MinHardAdder, 1);
        let text = Template::load_or_builtin(TemplateKind::OdinConfig, &path)
            .unwrap()
            .render(&values)
            .unwrap();
        assert_eq!(text, "<a>top.v</a><b>arch.xml</b><c>top.odin.blif</c>");
    }

    #[test]
    fn test_builtin_odin_config_substitutes_all() {
        let values = Substitutions::new()
            .set(Placeholder::Inputs, "top.v")
            .set(Placeholder::Arch, "arch.xml")
            .set(Placeholder::Output, "top.odin.blif")
            .set(Placeholder::MemAddrWidth, 15)
            .set(Placeholder::MinHardMult, 3)
            .set(Placeholder::MinHardAdder, 1);
        let text = Template::builtin(TemplateKind::OdinConfig)
            .render(&values)
            .unwrap();
        assert!(text.contains("<verilog_file>top.v</verilog_file>"));
        assert!(text.contains("split_memory_depth=\"15\""));
        for key in TemplateKind::OdinConfig.keys() {
            assert!(!text.contains(key.0.token()));
        }
    }
}
