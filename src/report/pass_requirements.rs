//! Pass-requirement files: `metric;Requirement(args)` per line.
//!
//! - `Equal()`: values must be identical strings
//! - `Range(min_ratio,max_ratio)`: `current / golden` must fall in the range
//! - `RangeAbs(min_ratio,max_ratio,abs_threshold)`: as `Range`, but any
//!   difference within `abs_threshold` passes

use std::fmt;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::parse::read_with_includes;
use crate::{FlowError, FlowResult};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Requirement {
    Equal,
    Range {
        min_ratio: f64,
        max_ratio: f64,
    },
    RangeAbs {
        min_ratio: f64,
        max_ratio: f64,
        abs_threshold: f64,
    },
}

/// Outcome of checking one value pair.
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub pass: bool,
    /// `current / golden` when both are numeric and golden is non-zero
    pub ratio: Option<f64>,
    pub reason: Option<String>,
}

impl Verdict {
    fn pass(ratio: Option<f64>) -> Self {
        Verdict {
            pass: true,
            ratio,
            reason: None,
        }
    }

    fn fail(ratio: Option<f64>, reason: impl Into<String>) -> Self {
        Verdict {
            pass: false,
            ratio,
            reason: Some(reason.into()),
        }
    }
}

impl Requirement {
    fn parse(text: &str) -> Result<Self, String> {
        let text = text.trim();
        let (name, args) = text
            .strip_suffix(')')
            .and_then(|t| t.split_once('('))
            .ok_or_else(|| format!("expected Requirement(args), got '{text}'"))?;

        let args: Vec<f64> = if args.trim().is_empty() {
            Vec::new()
        } else {
            args.split(',')
                .map(|a| {
                    a.trim()
                        .parse::<f64>()
                        .map_err(|_| format!("bad number '{}' in {name}()", a.trim()))
                })
                .collect::<Result<_, _>>()?
        };

        let requirement = match (name.trim(), args.as_slice()) {
            ("Equal", []) => Requirement::Equal,
            ("Range", [min, max]) => Requirement::Range {
                min_ratio: *min,
                max_ratio: *max,
            },
            ("RangeAbs", [min, max, abs]) => Requirement::RangeAbs {
                min_ratio: *min,
                max_ratio: *max,
                abs_threshold: *abs,
            },
            (name, args) => {
                return Err(format!(
                    "unknown requirement {name}() with {} arguments",
                    args.len()
                ));
            }
        };

        match requirement {
            Requirement::Range {
                min_ratio,
                max_ratio,
            }
            | Requirement::RangeAbs {
                min_ratio,
                max_ratio,
                ..
            } if min_ratio > max_ratio => Err(format!(
                "min ratio {min_ratio} exceeds max ratio {max_ratio}"
            )),
            Requirement::RangeAbs { abs_threshold, .. } if abs_threshold < 0.0 => {
                Err(format!("negative absolute threshold {abs_threshold}"))
            }
            ok => Ok(ok),
        }
    }

    /// Check `current` against `golden`.
    pub fn check(&self, golden: &str, current: &str) -> Verdict {
        let (golden, current) = (golden.trim(), current.trim());
        let (min_ratio, max_ratio, abs_threshold) = match *self {
            Requirement::Equal => {
                return if golden == current {
                    Verdict::pass(None)
                } else {
                    Verdict::fail(None, format!("expected '{golden}', got '{current}'"))
                };
            }
            Requirement::Range {
                min_ratio,
                max_ratio,
            } => (min_ratio, max_ratio, None),
            Requirement::RangeAbs {
                min_ratio,
                max_ratio,
                abs_threshold,
            } => (min_ratio, max_ratio, Some(abs_threshold)),
        };

        let (Ok(g), Ok(c)) = (golden.parse::<f64>(), current.parse::<f64>()) else {
            return if golden == current {
                Verdict::pass(None)
            } else {
                Verdict::fail(None, format!("non-numeric values '{golden}' / '{current}'"))
            };
        };

        let ratio = (g != 0.0).then(|| c / g);
        if g == c {
            return Verdict::pass(ratio);
        }
        if let Some(abs) = abs_threshold {
            if (c - g).abs() <= abs {
                return Verdict::pass(ratio);
            }
        }
        match ratio {
            None => Verdict::fail(None, format!("golden is 0, current is {current}")),
            Some(r) if r >= min_ratio && r <= max_ratio => Verdict::pass(ratio),
            Some(r) => Verdict::fail(
                ratio,
                format!("ratio {r:.4} outside [{min_ratio}, {max_ratio}]"),
            ),
        }
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Requirement::Equal => write!(f, "Equal()"),
            Requirement::Range {
                min_ratio,
                max_ratio,
            } => write!(f, "Range({min_ratio},{max_ratio})"),
            Requirement::RangeAbs {
                min_ratio,
                max_ratio,
                abs_threshold,
            } => write!(f, "RangeAbs({min_ratio},{max_ratio},{abs_threshold})"),
        }
    }
}

/// Requirements of a task, in file order.
#[derive(Debug, Clone, Default)]
pub struct PassRequirements {
    pub source: PathBuf,
    pub requirements: IndexMap<String, Requirement>,
}

impl PassRequirements {
    /// Load a requirements file, following `%include` lines.
    pub fn load(path: &Path) -> FlowResult<Self> {
        let mut requirements = IndexMap::new();
        for line in read_with_includes(path, "pass requirements")? {
            let err = |message: String| FlowError::config(&line.file, line.line, message);
            let (metric, requirement) = line
                .text
                .split_once(';')
                .ok_or_else(|| err(format!("expected metric;Requirement(), got '{}'", line.text)))?;
            let metric = metric.trim();
            let requirement = Requirement::parse(requirement).map_err(err)?;
            if requirements.insert(metric.to_string(), requirement).is_some() {
                return Err(err(format!("duplicate requirement for '{metric}'")));
            }
        }
        Ok(PassRequirements {
            source: path.to_path_buf(),
            requirements,
        })
    }

    /// Every metric checked exactly, for tasks without a requirements file.
    pub fn exact(metrics: &[String]) -> Self {
        PassRequirements {
            source: PathBuf::new(),
            requirements: metrics
                .iter()
                .map(|m| (m.clone(), Requirement::Equal))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_requirements() {
        assert_eq!(Requirement::parse("Equal()").unwrap(), Requirement::Equal);
        assert_eq!(
            Requirement::parse(" Range(0.95, 1.05) ").unwrap(),
            Requirement::Range {
                min_ratio: 0.95,
                max_ratio: 1.05
            }
        );
        assert!(Requirement::parse("Range(1.05,0.95)").is_err());
        assert!(Requirement::parse("Range(0.9)").is_err());
        assert!(Requirement::parse("Within(1)").is_err());
        assert!(Requirement::parse("Range(a,b)").is_err());
    }

    #[test]
    fn test_range_check() {
        let req = Requirement::Range {
            min_ratio: 0.95,
            max_ratio: 1.05,
        };
        assert!(req.check("100", "104").pass);
        assert!(!req.check("100", "110").pass);
        assert!(!req.check("100", "90").pass);
        assert!(req.check("0", "0").pass);
        assert!(!req.check("0", "1").pass);
        assert!(req.check("-1", "-1").pass);
        assert!(!req.check("abc", "abd").pass);
        assert!(req.check("pass", "pass").pass);

        let verdict = req.check("100", "110");
        assert!((verdict.ratio.unwrap() - 1.1).abs() < 1e-9);
        assert!(verdict.reason.unwrap().contains("outside"));
    }

    #[test]
    fn test_range_abs_floor() {
        let req = Requirement::RangeAbs {
            min_ratio: 0.9,
            max_ratio: 1.1,
            abs_threshold: 2.0,
        };
        assert!(req.check("0", "1.5").pass);
        assert!(req.check("1", "3").pass);
        assert!(!req.check("1", "3.5").pass);
        assert!(req.check("100", "109").pass);
    }

    #[test]
    fn test_equal_check() {
        assert!(Requirement::Equal.check("success", " success").pass);
        assert!(!Requirement::Equal.check("4.20", "4.2").pass);
    }

    #[test]
    fn test_load_file_with_include() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("common.txt"),
            "vpr_status;Equal()\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("pass.txt"),
            "%include \"common.txt\"\ncrit;Range(0.95,1.05)\nmin_chan_width;RangeAbs(0.9,1.1,2)\n",
        )
        .unwrap();

        let reqs = PassRequirements::load(&dir.path().join("pass.txt")).unwrap();
        let names: Vec<&str> = reqs.requirements.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["vpr_status", "crit", "min_chan_width"]);
        assert_eq!(reqs.requirements["crit"].to_string(), "Range(0.95,1.05)");
    }

    #[test]
    fn test_duplicate_requirement() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pass.txt");
        std::fs::write(&path, "crit;Equal()\ncrit;Range(0.9,1.1)\n").unwrap();
        let err = PassRequirements::load(&path).unwrap_err();
        assert_eq!(err.to_string(), format!("{}:2: duplicate requirement for 'crit'", path.display()));
    }
}
