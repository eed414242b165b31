//! Text templates parameterized by a [`DeviceProfile`].
//!
//! The syntax is a small subset of Go templates:
//!
//! ```text
//! font = {{ .font }}
//! {{- if eq .device_type "portable" }}
//! battery = true
//! {{- else }}
//! battery = false
//! {{- end }}
//! ```
//!
//! `{{-` trims whitespace before a tag and `-}}` trims whitespace after it.
//! Only the taken branch of a conditional is evaluated, so variables in the
//! other branch need not exist.
use crate::config::DeviceProfile;
use crate::error::TemplateError;

/// Comparison used by a conditional block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cmp {
    Eq,
    Ne,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Node {
    Text(String),
    Var {
        name: String,
        line: usize,
    },
    If {
        cmp: Cmp,
        name: String,
        value: String,
        line: usize,
        then: Vec<Node>,
        otherwise: Vec<Node>,
    },
}

#[derive(Debug)]
enum Token {
    Text(String),
    Action { body: String, line: usize },
}

/// Render `template` with the variables of `profile`.
///
/// # Errors
///
/// Returns a [`TemplateError`] for malformed templates and for variables
/// referenced in an evaluated branch that the profile does not define.
pub fn render(template: &str, profile: &DeviceProfile) -> Result<String, TemplateError> {
    let tokens = tokenize(template)?;
    let mut tokens = tokens.into_iter();
    let (nodes, terminator) = parse(&mut tokens)?;
    if let Some((keyword, line)) = terminator {
        return Err(TemplateError::Unexpected { keyword, line });
    }
    let mut out = String::with_capacity(template.len());
    eval(&nodes, profile, &mut out)?;
    Ok(out)
}

fn tokenize(src: &str) -> Result<Vec<Token>, TemplateError> {
    let mut tokens = Vec::new();
    let mut rest = src;
    let mut line = 1;
    let mut trim_next = false;

    while let Some(open) = rest.find("{{") {
        let (before, from_open) = rest.split_at(open);
        let after_open = from_open.get(2..).unwrap_or_default();
        let tag_line = line + before.matches('\n').count();
        let Some(close) = after_open.find("}}") else {
            return Err(TemplateError::UnterminatedTag { line: tag_line });
        };
        let (raw_inner, from_close) = after_open.split_at(close);

        let mut text = if trim_next { before.trim_start() } else { before };
        let mut inner = raw_inner;
        if let Some(stripped) = trim_marker_start(inner) {
            text = text.trim_end();
            inner = stripped;
        }
        trim_next = false;
        if let Some(stripped) = trim_marker_end(inner) {
            trim_next = true;
            inner = stripped;
        }

        if !text.is_empty() {
            tokens.push(Token::Text(text.to_string()));
        }
        tokens.push(Token::Action {
            body: inner.trim().to_string(),
            line: tag_line,
        });

        line = tag_line + raw_inner.matches('\n').count();
        rest = from_close.get(2..).unwrap_or_default();
    }

    let tail = if trim_next { rest.trim_start() } else { rest };
    if !tail.is_empty() {
        tokens.push(Token::Text(tail.to_string()));
    }
    Ok(tokens)
}

/// `{{- x` trims only when the dash is followed by whitespace.
fn trim_marker_start(inner: &str) -> Option<&str> {
    let rest = inner.strip_prefix('-')?;
    (rest.is_empty() || rest.starts_with(char::is_whitespace)).then_some(rest)
}

fn trim_marker_end(inner: &str) -> Option<&str> {
    let rest = inner.strip_suffix('-')?;
    (rest.is_empty() || rest.ends_with(char::is_whitespace)).then_some(rest)
}

type Terminator = Option<(String, usize)>;

/// Parse nodes until the token stream ends or an `else`/`end` is reached.
fn parse(tokens: &mut impl Iterator<Item = Token>) -> Result<(Vec<Node>, Terminator), TemplateError> {
    let mut nodes = Vec::new();
    while let Some(token) = tokens.next() {
        let (body, line) = match token {
            Token::Text(text) => {
                nodes.push(Node::Text(text));
                continue;
            }
            Token::Action { body, line } => (body, line),
        };

        if body == "else" || body == "end" {
            return Ok((nodes, Some((body, line))));
        }

        if let Some(name) = body.strip_prefix('.') {
            if !is_identifier(name) {
                return Err(TemplateError::InvalidAction { action: body, line });
            }
            nodes.push(Node::Var {
                name: name.to_string(),
                line,
            });
            continue;
        }

        if let Some(condition) = body.strip_prefix("if ") {
            let (cmp, name, value) = parse_condition(condition.trim())
                .ok_or_else(|| TemplateError::InvalidAction {
                    action: body.clone(),
                    line,
                })?;
            let (then, terminator) = parse(tokens)?;
            let otherwise = match terminator {
                Some((kw, _)) if kw == "end" => Vec::new(),
                Some((kw, else_line)) if kw == "else" => {
                    let (otherwise, terminator) = parse(tokens)?;
                    match terminator {
                        Some((kw, _)) if kw == "end" => otherwise,
                        Some((keyword, line)) => {
                            return Err(TemplateError::Unexpected { keyword, line });
                        }
                        None => return Err(TemplateError::UnclosedBlock { line: else_line }),
                    }
                }
                _ => return Err(TemplateError::UnclosedBlock { line }),
            };
            nodes.push(Node::If {
                cmp,
                name,
                value,
                line,
                then,
                otherwise,
            });
            continue;
        }

        return Err(TemplateError::InvalidAction { action: body, line });
    }
    Ok((nodes, None))
}

/// Parse `eq .name "value"` or `ne .name "value"`.
fn parse_condition(condition: &str) -> Option<(Cmp, String, String)> {
    let (op, rest) = condition.split_once(char::is_whitespace)?;
    let cmp = match op {
        "eq" => Cmp::Eq,
        "ne" => Cmp::Ne,
        _ => return None,
    };
    let (var, literal) = rest.trim_start().split_once(char::is_whitespace)?;
    let name = var.strip_prefix('.').filter(|n| is_identifier(n))?;
    let value = literal
        .trim()
        .strip_prefix('"')?
        .strip_suffix('"')
        .filter(|v| !v.contains('"'))?;
    Some((cmp, name.to_string(), value.to_string()))
}

fn is_identifier(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

fn lookup<'a>(profile: &'a DeviceProfile, name: &str, line: usize) -> Result<&'a str, TemplateError> {
    profile
        .var(name)
        .ok_or_else(|| TemplateError::UnresolvedVariable {
            name: name.to_string(),
            line,
        })
}

fn eval(nodes: &[Node], profile: &DeviceProfile, out: &mut String) -> Result<(), TemplateError> {
    for node in nodes {
        match node {
            Node::Text(text) => out.push_str(text),
            Node::Var { name, line } => out.push_str(lookup(profile, name, *line)?),
            Node::If {
                cmp,
                name,
                value,
                line,
                then,
                otherwise,
            } => {
                let current = lookup(profile, name, *line)?;
                let taken = match cmp {
                    Cmp::Eq => current == value,
                    Cmp::Ne => current != value,
                };
                eval(if taken { then } else { otherwise }, profile, out)?;
            }
        }
    }
    Ok(())
}
