//! BLIF netlist post-processing.
//!
//! Latches are hidden from technology mapping by turning each `.latch` record
//! into an opaque sub-circuit whose model name carries the latch fields
//! (`latch@<type>@<control>@<init>`), and turned back into canonical
//! `.latch <in> <out> <type> <control> <init>` records afterwards.

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::{FlowError, FlowResult};

const BLACKBOX_PREFIX: &str = "latch@";

/// Reads BLIF logical lines: `\` continuations joined, `#` comments and
/// blank lines dropped.
pub struct BlifReader<R> {
    inner: R,
    line_no: usize,
    start_line: usize,
}

impl BlifReader<BufReader<File>> {
    pub fn open(path: &Path) -> FlowResult<Self> {
        let file = File::open(path).map_err(|_| FlowError::file_missing(path, "netlist"))?;
        Ok(BlifReader::new(BufReader::new(file)))
    }
}

impl<R: BufRead> BlifReader<R> {
    pub fn new(inner: R) -> Self {
        BlifReader {
            inner,
            line_no: 0,
            start_line: 0,
        }
    }

    /// Physical line number where the last returned logical line started.
    pub fn line(&self) -> usize {
        self.start_line
    }

    fn next_physical(&mut self) -> std::io::Result<Option<String>> {
        let mut buf = Vec::new();
        if self.inner.read_until(b'\n', &mut buf)? == 0 {
            return Ok(None);
        }
        self.line_no += 1;
        Ok(Some(String::from_utf8_lossy(&buf).into_owned()))
    }
}

impl<R: BufRead> Iterator for BlifReader<R> {
    type Item = std::io::Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut logical = String::new();
        let mut started = false;
        loop {
            let raw = match self.next_physical() {
                Ok(Some(raw)) => raw,
                Ok(None) if logical.trim().is_empty() => return None,
                Ok(None) => return Some(Ok(normalise(&logical))),
                Err(e) => return Some(Err(e)),
            };
            if !started {
                self.start_line = self.line_no;
                started = true;
            }
            let text = raw.split('#').next().unwrap_or("").trim_end();
            match text.strip_suffix('\\') {
                Some(head) => {
                    logical.push_str(head);
                    logical.push(' ');
                }
                None => {
                    logical.push_str(text);
                    if logical.trim().is_empty() {
                        logical.clear();
                        started = false;
                        continue;
                    }
                    return Some(Ok(normalise(&logical)));
                }
            }
        }
    }
}

fn normalise(line: &str) -> String {
    line.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// A canonical latch record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Latch {
    pub input: String,
    pub output: String,
    /// `fe`, `re`, `ah`, `al` or `as`
    pub kind: String,
    /// Clock net, `NIL` when unclocked
    pub control: String,
    /// 0, 1, 2 (don't care) or 3 (unknown)
    pub init: String,
}

impl Latch {
    /// Parse the fields of a `.latch` line, keyword included.
    pub fn parse(line: &str) -> Option<Self> {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.first() != Some(&".latch") {
            return None;
        }
        let (kind, control, init) = match fields.len() {
            3 => ("re", "NIL", "3"),
            4 => ("re", "NIL", fields[3]),
            5 => (fields[3], fields[4], "3"),
            6 => (fields[3], fields[4], fields[5]),
            _ => return None,
        };
        Some(Latch {
            input: fields[1].to_string(),
            output: fields[2].to_string(),
            kind: kind.to_string(),
            control: control.to_string(),
            init: init.to_string(),
        })
    }

    pub fn is_clocked(&self) -> bool {
        self.control != "NIL"
    }

    pub fn record(&self) -> String {
        format!(
            ".latch {} {} {} {} {}",
            self.input, self.output, self.kind, self.control, self.init
        )
    }

    fn model_name(&self) -> String {
        format!(
            "{BLACKBOX_PREFIX}{}@{}@{}",
            self.kind, self.control, self.init
        )
    }

    fn subckt(&self) -> String {
        if self.is_clocked() {
            format!(
                ".subckt {} I={} C={} O={}",
                self.model_name(),
                self.input,
                self.control,
                self.output
            )
        } else {
            format!(".subckt {} I={} O={}", self.model_name(), self.input, self.output)
        }
    }

    fn model_declaration(&self) -> String {
        let inputs = if self.is_clocked() { "I C" } else { "I" };
        format!(
            ".model {}\n.inputs {inputs}\n.outputs O\n.blackbox\n.end",
            self.model_name()
        )
    }

    /// Decode an opaque-latch `.subckt` line.
    fn from_subckt(line: &str) -> Option<Self> {
        let mut fields = line.split_whitespace();
        if fields.next() != Some(".subckt") {
            return None;
        }
        let header = fields.next()?.strip_prefix(BLACKBOX_PREFIX)?;
        let (kind, rest) = header.split_once('@')?;
        let (control, init) = rest.rsplit_once('@')?;

        let pins: HashMap<&str, &str> = fields.filter_map(|f| f.split_once('=')).collect();
        Some(Latch {
            input: pins.get("I")?.to_string(),
            output: pins.get("O")?.to_string(),
            kind: kind.to_string(),
            control: control.to_string(),
            init: init.to_string(),
        })
    }
}

fn read_lines(path: &Path) -> FlowResult<Vec<(usize, String)>> {
    let mut reader = BlifReader::open(path)?;
    let mut lines = Vec::new();
    while let Some(line) = reader.next() {
        lines.push((reader.line(), line?));
    }
    Ok(lines)
}

fn write_lines(path: &Path, lines: &[String]) -> FlowResult<()> {
    let mut text = lines.join("\n");
    text.push('\n');
    std::fs::write(path, text)?;
    Ok(())
}

fn parse_latch(path: &Path, line_no: usize, line: &str) -> FlowResult<Latch> {
    Latch::parse(line)
        .ok_or_else(|| FlowError::config(path, line_no, format!("malformed latch '{line}'")))
}

/// The single clock driving every latch of the netlist.
///
/// # Errors
/// `Unsupported("asynchronous")` when no latch names a clock,
/// `Unsupported("multi-clock")` when more than one distinct clock is used.
pub fn extract_clock(path: &Path) -> FlowResult<String> {
    let mut clocks: Vec<String> = Vec::new();
    for (line_no, line) in read_lines(path)? {
        if line.starts_with(".latch") {
            let latch = parse_latch(path, line_no, &line)?;
            if latch.is_clocked() && !clocks.contains(&latch.control) {
                clocks.push(latch.control);
            }
        }
    }

    match clocks.len() {
        0 => Err(FlowError::Unsupported("asynchronous".into())),
        1 => Ok(clocks.remove(0)),
        _ => Err(FlowError::Unsupported("multi-clock".into())),
    }
}

/// Replace every `.latch` with an opaque sub-circuit. Returns the latch count.
pub fn blackbox_latches(input: &Path, output: &Path) -> FlowResult<usize> {
    let mut out = Vec::new();
    let mut models: BTreeMap<String, String> = BTreeMap::new();
    let mut count = 0;

    for (line_no, line) in read_lines(input)? {
        if line.starts_with(".latch") {
            let latch = parse_latch(input, line_no, &line)?;
            models
                .entry(latch.model_name())
                .or_insert_with(|| latch.model_declaration());
            out.push(latch.subckt());
            count += 1;
        } else {
            out.push(line);
        }
    }

    if !models.is_empty() {
        out.push(String::new());
        out.extend(models.into_values());
    }
    write_lines(output, &out)?;
    Ok(count)
}

/// Turn opaque-latch sub-circuits back into `.latch` records and drop their
/// model declarations. Returns the latch count.
pub fn restore_latches(input: &Path, output: &Path) -> FlowResult<usize> {
    let mut out = Vec::new();
    let mut in_latch_model = false;
    let mut count = 0;

    for (line_no, line) in read_lines(input)? {
        if in_latch_model {
            in_latch_model = line != ".end";
            continue;
        }
        if line.starts_with(".model") && line.contains(&format!(" {BLACKBOX_PREFIX}")) {
            in_latch_model = true;
            continue;
        }
        if line.starts_with(".subckt") && line.contains(&format!(" {BLACKBOX_PREFIX}")) {
            let latch = Latch::from_subckt(&line).ok_or_else(|| {
                FlowError::config(input, line_no, format!("malformed latch box '{line}'"))
            })?;
            out.push(latch.record());
            count += 1;
        } else {
            out.push(line);
        }
    }

    write_lines(output, &out)?;
    Ok(count)
}

/// Latches of a netlist keyed by output net, used to put back what activity
/// estimation rewrites.
#[derive(Debug, Clone, Default)]
pub struct LatchTable {
    by_output: HashMap<String, Latch>,
}

impl LatchTable {
    pub fn capture(path: &Path) -> FlowResult<Self> {
        let mut by_output = HashMap::new();
        for (line_no, line) in read_lines(path)? {
            if line.starts_with(".latch") {
                let latch = parse_latch(path, line_no, &line)?;
                by_output.insert(latch.output.clone(), latch);
            }
        }
        Ok(LatchTable { by_output })
    }

    pub fn len(&self) -> usize {
        self.by_output.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_output.is_empty()
    }

    /// Copy `input` to `output`, replacing every latch whose output net is
    /// known with its captured record. Returns how many were replaced.
    pub fn apply(&self, input: &Path, output: &Path) -> FlowResult<usize> {
        let mut out = Vec::new();
        let mut restored = 0;

        for (line_no, line) in read_lines(input)? {
            if line.starts_with(".latch") {
                let latch = parse_latch(input, line_no, &line)?;
                match self.by_output.get(&latch.output) {
                    Some(original) => {
                        out.push(original.record());
                        restored += 1;
                    }
                    None => out.push(latch.record()),
                }
            } else {
                out.push(line);
            }
        }

        write_lines(output, &out)?;
        Ok(restored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const NETLIST: &str = "\
# generated by synthesis
.model top
.inputs clk a b \\
    c
.outputs q
.names a b n1
11 1
.latch n1 q re clk 0
.latch c r re clk 3   # second latch
.end
";

    fn write(dir: &Path, name: &str, text: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, text).unwrap();
        path
    }

    #[test]
    fn test_reader_joins_continuations_and_drops_comments() {
        let mut reader = BlifReader::new(Cursor::new(NETLIST));
        let first = reader.next().unwrap().unwrap();
        assert_eq!(first, ".model top");
        assert_eq!(reader.line(), 2);

        let second = reader.next().unwrap().unwrap();
        assert_eq!(second, ".inputs clk a b c");
        assert_eq!(reader.line(), 3);

        let rest: Vec<String> = reader.map(|l| l.unwrap()).collect();
        assert!(rest.contains(&".latch c r re clk 3".to_string()));
        assert_eq!(rest.last().map(String::as_str), Some(".end"));
    }

    #[test]
    fn test_latch_field_arity() {
        let latch = Latch::parse(".latch d q").unwrap();
        assert_eq!(latch.record(), ".latch d q re NIL 3");
        assert!(!latch.is_clocked());

        let latch = Latch::parse(".latch d q fe clk").unwrap();
        assert_eq!(latch.record(), ".latch d q fe clk 3");

        assert!(Latch::parse(".latch d").is_none());
        assert!(Latch::parse(".names a b").is_none());
    }

    #[test]
    fn test_extract_single_clock() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "top.blif", NETLIST);
        assert_eq!(extract_clock(&path).unwrap(), "clk");
    }

    #[test]
    fn test_extract_multi_clock() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "top.blif",
            ".model top\n.latch a q re clk_a 0\n.latch b r re clk_b 0\n.end\n",
        );
        match extract_clock(&path).unwrap_err() {
            FlowError::Unsupported(feature) => assert_eq!(feature, "multi-clock"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_extract_no_clock() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "top.blif", ".model top\n.names a b\n1 1\n.end\n");
        match extract_clock(&path).unwrap_err() {
            FlowError::Unsupported(feature) => assert_eq!(feature, "asynchronous"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_blackbox_then_restore() {
        let dir = tempfile::tempdir().unwrap();
        let input = write(dir.path(), "top.blif", NETLIST);
        let boxed = dir.path().join("top.boxed.blif");
        let restored = dir.path().join("top.restored.blif");

        assert_eq!(blackbox_latches(&input, &boxed).unwrap(), 2);
        let text = std::fs::read_to_string(&boxed).unwrap();
        assert!(!text.contains(".latch"));
        assert!(text.contains(".subckt latch@re@clk@0 I=n1 C=clk O=q"));
        assert!(text.contains(".model latch@re@clk@3\n.inputs I C\n.outputs O\n.blackbox\n.end"));

        assert_eq!(restore_latches(&boxed, &restored).unwrap(), 2);
        let text = std::fs::read_to_string(&restored).unwrap();
        assert!(text.contains(".latch n1 q re clk 0\n"));
        assert!(text.contains(".latch c r re clk 3\n"));
        assert!(!text.contains("latch@"));
        assert!(!text.contains(".blackbox"));
        assert_eq!(text.matches(".model").count(), 1);
    }

    #[test]
    fn test_restore_canonical_field_order() {
        let dir = tempfile::tempdir().unwrap();
        let input = write(
            dir.path(),
            "mapped.blif",
            ".model top\n.subckt latch@fe@my@clk@1 O=q I=d C=my@clk\n.end\n",
        );
        let output = dir.path().join("out.blif");
        restore_latches(&input, &output).unwrap();
        let text = std::fs::read_to_string(&output).unwrap();
        assert!(text.contains(".latch d q fe my@clk 1"));
    }

    #[test]
    fn test_round_trip_keeps_type_and_init() {
        let dir = tempfile::tempdir().unwrap();
        let input = write(
            dir.path(),
            "top.blif",
            ".model top\n.inputs d e en clk\n.outputs q r\n\
             .latch d q ah en 2\n.latch e r fe clk 1\n.end\n",
        );
        let boxed = dir.path().join("top.boxed.blif");
        let restored = dir.path().join("top.restored.blif");

        assert_eq!(blackbox_latches(&input, &boxed).unwrap(), 2);
        let text = std::fs::read_to_string(&boxed).unwrap();
        assert!(text.contains(".subckt latch@ah@en@2 I=d C=en O=q"));
        assert!(text.contains(".subckt latch@fe@clk@1 I=e C=clk O=r"));

        assert_eq!(restore_latches(&boxed, &restored).unwrap(), 2);
        let text = std::fs::read_to_string(&restored).unwrap();
        assert!(text.contains(".latch d q ah en 2\n"));
        assert!(text.contains(".latch e r fe clk 1\n"));
        let latch = Latch::parse(".latch d q ah en 2").unwrap();
        assert_eq!((latch.kind.as_str(), latch.init.as_str()), ("ah", "2"));
    }

    #[test]
    fn test_latch_table_restores_rewritten_latches() {
        let dir = tempfile::tempdir().unwrap();
        let original = write(dir.path(), "top.blif", NETLIST);
        let ace_out = write(
            dir.path(),
            "top.ace.raw.blif",
            ".model top\n.latch n1 q 0\n.latch c r 3\n.latch x y 0\n.end\n",
        );
        let fixed = dir.path().join("top.ace.blif");

        let table = LatchTable::capture(&original).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.apply(&ace_out, &fixed).unwrap(), 2);

        let text = std::fs::read_to_string(&fixed).unwrap();
        assert!(text.contains(".latch n1 q re clk 0"));
        assert!(text.contains(".latch c r re clk 3"));
        assert!(text.contains(".latch x y re NIL 0"));
    }
}
