//! Applying parameter overrides and staging inputs into a job workspace.
//!
//! Netlists: the value field of a component line whose reference matches a
//! key is replaced, `.param name=value` assignments are rewritten, and an
//! `X1.L` key sets the `L=` instance parameter on the `X1` line (appending
//! it when absent).
//! LTspice schematics: the `SYMATTR Value` of the symbol whose
//! `SYMATTR InstName` matches is replaced, instance parameters are set in its
//! `SYMATTR SpiceLine`, and `.param` directives in `TEXT` lines are
//! rewritten.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use spicerun_spec::{
    is_netlist_path, split_instance_key, JobError, JobResult, ParameterOverrides,
};

use crate::text::{read_text, TextFormat};
use crate::workspace::JobWorkspace;

/// Extensions copied next to a staged LTspice schematic so that custom
/// symbols and model files resolve from the job directory.
const SCHEMATIC_SIDECARS: &[&str] = &["asy", "lib", "sub", "inc", "mod"];

/// Copies `source` into the workspace with overrides applied and relative
/// `.include`/`.lib` paths made absolute. Returns the staged path.
pub fn stage_input(
    source: &Path,
    workspace: &JobWorkspace,
    overrides: &ParameterOverrides,
) -> JobResult<PathBuf> {
    let file_name = source
        .file_name()
        .ok_or_else(|| JobError::workspace(format!("{} has no file name", source.display())))?;
    let (text, format) = read_text(source)
        .map_err(|e| JobError::workspace(format!("cannot read {}: {e}", source.display())))?;
    let base = source
        .parent()
        .map(absolute)
        .transpose()?
        .unwrap_or_default();

    let staged_text = if is_netlist_path(source) {
        let text = rewrite_includes(&text, &base);
        apply_to_netlist(&text, overrides).map_err(|e| with_source(e, source))?
    } else {
        let text = rewrite_schematic_includes(&text, &base);
        copy_sidecars(&base, workspace.path())?;
        apply_to_schematic(&text, overrides).map_err(|e| with_source(e, source))?
    };

    let target = workspace.path().join(file_name);
    std::fs::write(&target, format.encode(&staged_text))
        .map_err(|e| JobError::workspace(format!("cannot write {}: {e}", target.display())))?;
    Ok(target)
}

fn with_source(err: JobError, source: &Path) -> JobError {
    match err {
        JobError::ParameterOverrideFailed { message } => {
            JobError::override_failed(format!("{message} in {}", source.display()))
        }
        other => other,
    }
}

fn absolute(path: &Path) -> JobResult<PathBuf> {
    if path.as_os_str().is_empty() {
        return std::env::current_dir().map_err(JobError::workspace);
    }
    path.canonicalize()
        .map_err(|e| JobError::workspace(format!("cannot resolve {}: {e}", path.display())))
}

fn copy_sidecars(from: &Path, to: &Path) -> JobResult<()> {
    let entries = std::fs::read_dir(from)
        .map_err(|e| JobError::workspace(format!("cannot list {}: {e}", from.display())))?;
    for entry in entries.flatten() {
        let path = entry.path();
        let is_sidecar = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|ext| SCHEMATIC_SIDECARS.iter().any(|s| s.eq_ignore_ascii_case(ext)))
            .unwrap_or(false);
        if is_sidecar && path.is_file() {
            if let Some(name) = path.file_name() {
                std::fs::copy(&path, to.join(name)).map_err(|e| {
                    JobError::workspace(format!("cannot copy {}: {e}", path.display()))
                })?;
            }
        }
    }
    Ok(())
}

fn include_regex() -> &'static Regex {
    static INCLUDE_REGEX: OnceLock<Regex> = OnceLock::new();
    INCLUDE_REGEX.get_or_init(|| {
        Regex::new(r#"(?i)^(\s*\.(?:include|inc|lib)\s+)"?([^"\s]+)"?(.*)$"#)
            .expect("invalid regex pattern")
    })
}

fn rewrite_directive(line: &str, base: &Path, re: &Regex) -> Option<String> {
    let caps = re.captures(line)?;
    let path = Path::new(&caps[2]);
    if path.is_absolute() {
        return None;
    }
    Some(format!(
        "{}\"{}\"{}",
        &caps[1],
        base.join(path).display(),
        &caps[3]
    ))
}

/// Makes relative `.include`, `.inc` and `.lib` paths in a netlist absolute.
pub fn rewrite_includes(text: &str, base: &Path) -> String {
    let re = include_regex();
    map_lines(text, |line| rewrite_directive(line, base, re))
}

fn rewrite_schematic_includes(text: &str, base: &Path) -> String {
    let re = include_regex();
    map_lines(text, |line| {
        let (head, directive) = line.split_once('!')?;
        if !head.trim_start().starts_with("TEXT ") {
            return None;
        }
        rewrite_directive(directive, base, re).map(|d| format!("{head}!{d}"))
    })
}

/// Applies `f` to every line, keeping line endings. `None` keeps the line.
fn map_lines(text: &str, mut f: impl FnMut(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(text.len());
    for raw in text.split_inclusive('\n') {
        let body = raw.trim_end_matches(['\r', '\n']);
        let ending = &raw[body.len()..];
        match f(body) {
            Some(line) => out.push_str(&line),
            None => out.push_str(body),
        }
        out.push_str(ending);
    }
    out
}

fn param_regex(name: &str) -> Regex {
    Regex::new(&format!(
        r"(?i)(^|[\s,]){}(\s*=\s*)(\{{[^}}]*\}}|[^\s,]+)",
        regex::escape(name)
    ))
    .expect("invalid regex pattern")
}

fn is_param_directive(line: &str) -> bool {
    line.trim_start()
        .get(..6)
        .map(|p| p.eq_ignore_ascii_case(".param"))
        .unwrap_or(false)
}

fn rewrite_params(
    line: &str,
    overrides: &ParameterOverrides,
    matched: &mut BTreeSet<String>,
) -> Option<String> {
    let mut current = line.to_string();
    let mut changed = false;
    for (name, value) in overrides.iter() {
        if split_instance_key(name).is_some() {
            continue;
        }
        let re = param_regex(name);
        if re.is_match(&current) {
            current = re
                .replace_all(&current, |caps: &regex::Captures<'_>| {
                    format!("{}{}{}{}", &caps[1], name, &caps[2], value)
                })
                .into_owned();
            matched.insert(name.to_string());
            changed = true;
        }
    }
    changed.then_some(current)
}

/// Number of node tokens that precede the value field of a SPICE element.
fn node_count(reference: &str) -> Option<usize> {
    let prefix = reference.chars().next()?.to_ascii_uppercase();
    Some(match prefix {
        'R' | 'C' | 'L' | 'V' | 'I' | 'D' | 'B' | 'F' | 'H' | 'K' => 2,
        'Q' | 'J' | 'Z' => 3,
        'M' | 'E' | 'G' | 'S' | 'W' | 'T' | 'O' => 4,
        _ => return None,
    })
}

fn rewrite_value(line: &str, value: &str) -> Option<String> {
    let trimmed = line.trim_start();
    let reference = trimmed.split_whitespace().next()?;
    let indent = &line[..line.len() - trimmed.len()];
    let mut tokens: Vec<&str> = trimmed.split_whitespace().collect();

    let index = if reference.to_ascii_uppercase().starts_with('X') {
        // Subcircuit: the last token that is not a `name=value` parameter.
        tokens.iter().rposition(|t| !t.contains('='))?
    } else {
        1 + node_count(reference)?
    };
    if index == 0 || index >= tokens.len() {
        return None;
    }
    tokens[index] = value;
    if matches!(reference.as_bytes()[0].to_ascii_uppercase(), b'V' | b'I' | b'B') {
        // Source values span the rest of the line.
        tokens.truncate(index + 1);
    }
    Some(format!("{indent}{}", tokens.join(" ")))
}

/// Sets `param=value` in a space-separated parameter list, appending it when
/// the list does not assign `param` yet.
fn set_instance_param(list: &str, param: &str, value: &str) -> String {
    let re = param_regex(param);
    if re.is_match(list) {
        re.replace_all(list, |caps: &regex::Captures<'_>| {
            format!("{}{}{}{}", &caps[1], param, &caps[2], value)
        })
        .into_owned()
    } else if list.trim().is_empty() {
        format!("{param}={value}")
    } else {
        format!("{} {param}={value}", list.trim_end())
    }
}

/// Overrides applying to the instance `reference`: its value first, then
/// its `INSTANCE.PARAM` keys.
fn instance_overrides<'a>(
    overrides: &'a ParameterOverrides,
    reference: &str,
) -> (Option<&'a str>, Vec<(&'a str, &'a str, &'a str)>) {
    let params = overrides
        .iter()
        .filter_map(|(key, value)| {
            let (instance, param) = split_instance_key(key)?;
            instance
                .eq_ignore_ascii_case(reference)
                .then_some((key, param, value))
        })
        .collect();
    (overrides.get(reference), params)
}

fn rewrite_component(
    line: &str,
    overrides: &ParameterOverrides,
    matched: &mut BTreeSet<String>,
) -> Option<String> {
    let reference = line.split_whitespace().next()?;
    let (value, params) = instance_overrides(overrides, reference);
    if value.is_none() && params.is_empty() {
        return None;
    }

    let mut current = line.to_string();
    if let Some(value) = value {
        if let Some(rewritten) = rewrite_value(&current, value) {
            current = rewritten;
            matched.insert(reference.to_string());
        }
    }
    if !params.is_empty() {
        let trimmed = current.trim_start();
        let indent = &current[..current.len() - trimmed.len()];
        let (head, list) = trimmed.split_once(char::is_whitespace)?;
        let mut list = list.to_string();
        for (key, param, value) in params {
            list = set_instance_param(&list, param, value);
            matched.insert(key.to_string());
        }
        current = format!("{indent}{head} {}", list.trim_start());
    }
    (current != line).then_some(current)
}

fn ensure_all_matched(overrides: &ParameterOverrides, matched: &BTreeSet<String>) -> JobResult<()> {
    let missing: Vec<&str> = overrides
        .names()
        .filter(|name| !matched.iter().any(|m| m.eq_ignore_ascii_case(name)))
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(JobError::override_failed(format!(
            "no component or parameter named {}",
            missing
                .iter()
                .map(|m| format!("'{m}'"))
                .collect::<Vec<_>>()
                .join(", ")
        )))
    }
}

/// Applies overrides to netlist text.
pub fn apply_to_netlist(text: &str, overrides: &ParameterOverrides) -> JobResult<String> {
    if overrides.is_empty() {
        return Ok(text.to_string());
    }
    let mut matched = BTreeSet::new();
    let out = map_lines(text, |line| {
        let trimmed = line.trim_start();
        if trimmed.is_empty() || trimmed.starts_with(['*', '+', ';']) {
            None
        } else if is_param_directive(trimmed) {
            rewrite_params(line, overrides, &mut matched)
        } else if trimmed.starts_with('.') {
            None
        } else {
            rewrite_component(line, overrides, &mut matched)
        }
    });
    ensure_all_matched(overrides, &matched)?;
    Ok(out)
}

/// Applies overrides to an LTspice schematic (`.asc`).
pub fn apply_to_schematic(text: &str, overrides: &ParameterOverrides) -> JobResult<String> {
    if overrides.is_empty() {
        return Ok(text.to_string());
    }
    let ending = if text.contains("\r\n") { "\r\n" } else { "\n" };
    let mut lines: Vec<String> = text.lines().map(str::to_string).collect();
    let mut matched = BTreeSet::new();

    for line in lines.iter_mut() {
        if let Some((head, directive)) = line.split_once('!') {
            if head.trim_start().starts_with("TEXT ") && is_param_directive(directive) {
                if let Some(rewritten) = rewrite_params(directive, overrides, &mut matched) {
                    *line = format!("{head}!{rewritten}");
                }
            }
        }
    }

    let mut i = 0;
    while i < lines.len() {
        if !lines[i].starts_with("SYMBOL ") {
            i += 1;
            continue;
        }
        let start = i + 1;
        let mut end = start;
        while end < lines.len()
            && (lines[end].starts_with("SYMATTR ") || lines[end].starts_with("WINDOW "))
        {
            end += 1;
        }

        let attr = |line: &str, key: &str| -> Option<String> {
            line.strip_prefix("SYMATTR ")?
                .strip_prefix(key)?
                .strip_prefix(' ')
                .map(|v| v.trim().to_string())
        };
        let inst = (start..end).find_map(|j| attr(&lines[j], "InstName").map(|n| (j, n)));
        if let Some((inst_line, name)) = inst {
            let (value, params) = instance_overrides(overrides, &name);
            if let Some(value) = value {
                let value_line = format!("SYMATTR Value {value}");
                match (start..end).find(|&j| attr(&lines[j], "Value").is_some()) {
                    Some(j) => lines[j] = value_line,
                    None => {
                        lines.insert(inst_line + 1, value_line);
                        end += 1;
                    }
                }
                matched.insert(name.clone());
            }
            if !params.is_empty() {
                let spice_line =
                    (start..end).find_map(|j| attr(&lines[j], "SpiceLine").map(|l| (j, l)));
                let (index, mut list) = match spice_line {
                    Some((j, list)) => (j, list),
                    None => {
                        // After the value, or after the name when there is none.
                        let after = (start..end)
                            .filter(|&j| {
                                attr(&lines[j], "InstName").is_some()
                                    || attr(&lines[j], "Value").is_some()
                            })
                            .max()
                            .unwrap_or(inst_line);
                        lines.insert(after + 1, String::new());
                        end += 1;
                        (after + 1, String::new())
                    }
                };
                for (key, param, value) in params {
                    list = set_instance_param(&list, param, value);
                    matched.insert(key.to_string());
                }
                lines[index] = format!("SYMATTR SpiceLine {list}");
            }
        }
        i = end;
    }

    ensure_all_matched(overrides, &matched)?;
    let mut out = lines.join(ending);
    if text.ends_with('\n') {
        out.push_str(ending);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use spicerun_spec::{parse_overrides, JobId};

    const NETLIST: &str = "* rc filter\n\
        V1 in 0 PULSE(0 1 0 1n 1n 1m 2m)\n\
        R1 in out 1k\n\
        C1 out 0 100n ic=0\n\
        XU1 out fb vcc opamp gain=10\n\
        .param tau=1m gain = 2\n\
        .tran 0 {5*tau}\n\
        .end\n";

    #[test]
    fn test_netlist_component_and_param() {
        let overrides = parse_overrides("r1=20k,C1=1u,tau=2m,XU1=opamp2").unwrap();
        let out = apply_to_netlist(NETLIST, &overrides).unwrap();
        assert!(out.contains("R1 in out 20k\n"));
        assert!(out.contains("C1 out 0 1u ic=0\n"));
        assert!(out.contains("XU1 out fb vcc opamp2 gain=10\n"));
        assert!(out.contains(".param tau=2m gain = 2\n"));
        assert!(out.contains(".tran 0 {5*tau}\n"));
    }

    #[test]
    fn test_source_value_replaces_rest_of_line() {
        let overrides = parse_overrides("V1=DC 5").unwrap();
        let out = apply_to_netlist(NETLIST, &overrides).unwrap();
        assert!(out.contains("V1 in 0 DC 5\n"));
    }

    #[test]
    fn test_param_with_spaces_around_equals() {
        let overrides = parse_overrides("gain=5").unwrap();
        let out = apply_to_netlist(NETLIST, &overrides).unwrap();
        assert!(out.contains(".param tau=1m gain = 5\n"));
        // The subcircuit instance parameter is not a `.param` line.
        assert!(out.contains("opamp gain=10"));
    }

    #[test]
    fn test_unmatched_key_fails() {
        let overrides = parse_overrides("R9=1k,R1=2k").unwrap();
        let err = apply_to_netlist(NETLIST, &overrides).unwrap_err();
        match err {
            JobError::ParameterOverrideFailed { message } => {
                assert!(message.contains("'R9'"));
                assert!(!message.contains("'R1'"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    const SCHEMATIC: &str = "Version 4\r\n\
        SHEET 1 880 680\r\n\
        SYMBOL res 176 96 R0\r\n\
        SYMATTR InstName R1\r\n\
        SYMATTR Value 8.29\r\n\
        SYMBOL ind 160 192 R0\r\n\
        WINDOW 0 5 56 Left 2\r\n\
        SYMATTR InstName L1\r\n\
        TEXT 56 300 Left 2 !.param Cload=10p\r\n\
        TEXT 56 330 Left 2 !.tran 1m\r\n";

    #[test]
    fn test_schematic_value_replaced_and_inserted() {
        let overrides = parse_overrides("R1=10,L1=175n,Cload=22p").unwrap();
        let out = apply_to_schematic(SCHEMATIC, &overrides).unwrap();
        assert!(out.contains("SYMATTR InstName R1\r\nSYMATTR Value 10\r\n"));
        assert!(out.contains("SYMATTR InstName L1\r\nSYMATTR Value 175n\r\n"));
        assert!(out.contains("!.param Cload=22p\r\n"));
        assert!(out.ends_with("!.tran 1m\r\n"));
    }

    #[test]
    fn test_netlist_instance_parameters_rewritten_or_appended() {
        let text = "* stacks\nX1 in out jpe_stack L=100n R=1\n  X2 out 0 jpe_stack\n.end\n";
        let overrides = parse_overrides("X1.L=175n,X1.C=100n,x2.R=8.29").unwrap();
        let out = apply_to_netlist(text, &overrides).unwrap();
        assert_eq!(
            out,
            "* stacks\nX1 in out jpe_stack L=175n R=1 C=100n\n  X2 out 0 jpe_stack R=8.29\n.end\n"
        );
    }

    #[test]
    fn test_netlist_value_and_instance_parameter_together() {
        let overrides = parse_overrides("XU1=opamp2,XU1.gain=20").unwrap();
        let out = apply_to_netlist(NETLIST, &overrides).unwrap();
        assert!(out.contains("XU1 out fb vcc opamp2 gain=20\n"));
        // Instance keys never touch `.param` lines.
        assert!(out.contains(".param tau=1m gain = 2\n"));
    }

    #[test]
    fn test_instance_parameter_for_unknown_instance_fails() {
        let overrides = parse_overrides("X9.L=1n").unwrap();
        match apply_to_netlist(NETLIST, &overrides).unwrap_err() {
            JobError::ParameterOverrideFailed { message } => assert!(message.contains("'X9.L'")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    const STACKS: &str = "Version 4\n\
        SHEET 1 880 680\n\
        SYMBOL jpe_stack 176 96 R0\n\
        SYMATTR InstName X1\n\
        SYMATTR SpiceLine L=100n R=1\n\
        SYMBOL jpe_stack 176 296 R0\n\
        SYMATTR InstName X2\n\
        SYMATTR Value jpe_stack\n\
        TEXT 56 330 Left 2 !.tran 1m\n";

    #[test]
    fn test_schematic_instance_parameters_in_spice_line() {
        let overrides = parse_overrides("X1.L=175n,X1.C=100n,X2.R=8.29").unwrap();
        let out = apply_to_schematic(STACKS, &overrides).unwrap();
        assert!(out.contains("SYMATTR InstName X1\nSYMATTR SpiceLine L=175n R=1 C=100n\n"));
        assert!(out.contains(
            "SYMATTR InstName X2\nSYMATTR Value jpe_stack\nSYMATTR SpiceLine R=8.29\nTEXT"
        ));
    }

    #[test]
    fn test_schematic_unknown_instance() {
        let overrides = parse_overrides("C7=1n").unwrap();
        assert!(matches!(
            apply_to_schematic(SCHEMATIC, &overrides),
            Err(JobError::ParameterOverrideFailed { .. })
        ));
    }

    #[test]
    fn test_rewrite_includes() {
        let text = ".include models.lib\n.lib \"/abs/std.lib\" tt\n.LIB sub/cmos.lib tt\n";
        let out = rewrite_includes(text, Path::new("/designs/rc"));
        assert_eq!(
            out,
            ".include \"/designs/rc/models.lib\"\n.lib \"/abs/std.lib\" tt\n.LIB \"/designs/rc/sub/cmos.lib\" tt\n"
        );
    }

    #[test]
    fn test_stage_netlist_into_workspace() {
        let src = tempfile::tempdir().unwrap();
        let netlist = src.path().join("rc.cir");
        std::fs::write(&netlist, NETLIST.replace(".end", ".include local.lib\n.end")).unwrap();

        let root = tempfile::tempdir().unwrap();
        let workspace = JobWorkspace::create(root.path(), &JobId::new()).unwrap();
        let overrides = parse_overrides("R1=2k").unwrap();
        let staged = stage_input(&netlist, &workspace, &overrides).unwrap();

        assert_eq!(staged, workspace.path().join("rc.cir"));
        let text = std::fs::read_to_string(&staged).unwrap();
        assert!(text.contains("R1 in out 2k"));
        let expected_lib = src.path().canonicalize().unwrap().join("local.lib");
        assert!(text.contains(&format!(".include \"{}\"", expected_lib.display())));
        // The source is untouched.
        assert!(std::fs::read_to_string(&netlist).unwrap().contains("R1 in out 1k"));
    }

    #[test]
    fn test_stage_schematic_copies_symbols() {
        let src = tempfile::tempdir().unwrap();
        let schematic = src.path().join("buck.asc");
        std::fs::write(&schematic, SCHEMATIC).unwrap();
        std::fs::write(src.path().join("custom.asy"), "Version 4\n").unwrap();

        let root = tempfile::tempdir().unwrap();
        let workspace = JobWorkspace::create(root.path(), &JobId::new()).unwrap();
        let staged = stage_input(&schematic, &workspace, &ParameterOverrides::new()).unwrap();

        assert_eq!(std::fs::read_to_string(staged).unwrap(), SCHEMATIC);
        assert!(workspace.path().join("custom.asy").exists());
    }

    #[test]
    fn test_stage_failure_names_source() {
        let src = tempfile::tempdir().unwrap();
        let netlist = src.path().join("rc.net");
        std::fs::write(&netlist, NETLIST).unwrap();
        let root = tempfile::tempdir().unwrap();
        let workspace = JobWorkspace::create(root.path(), &JobId::new()).unwrap();
        let err = stage_input(&netlist, &workspace, &parse_overrides("Q1=2N2222").unwrap())
            .unwrap_err();
        assert!(err.to_string().contains("rc.net"));
    }
}
