//! Parse protocol definition source into an AST using PEST.

use crate::ast::*;
use pest::Parser;
use pest_derive::Parser as PestParser;

#[derive(PestParser)]
#[grammar = "grammar.pest"]
struct DefinitionParser;

/// Parse protocol definition source into an AST. Parsing stops on the first
/// error; the message carries pest's (line, column) rendering.
pub fn parse(source: &str) -> Result<Definitions, String> {
    let pairs = DefinitionParser::parse(Rule::file, source)
        .map_err(|e| format!("Parse error: {}", e))?;
    let file = pairs.into_iter().next().ok_or("Empty parse")?;

    let mut defs = Definitions::default();
    for inner in file.into_inner() {
        match inner.as_rule() {
            Rule::enum_def => defs.enums.push(build_enum(inner)?),
            Rule::struct_def => defs.structs.push(build_struct(inner)?),
            Rule::protocol_def => {
                if defs.protocol.is_some() {
                    return Err("Multiple protocol blocks".to_string());
                }
                defs.protocol = Some(build_protocol(inner)?);
            }
            _ => {}
        }
    }
    Ok(defs)
}

fn build_enum(pair: pest::iterators::Pair<Rule>) -> Result<EnumDecl, String> {
    let mut annotations = Vec::new();
    let mut name = String::new();
    let mut underlying = None;
    let mut values = Vec::new();

    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::annotation => annotations.push(build_annotation(inner)?),
            Rule::ident => {
                if name.is_empty() {
                    name = inner.as_str().to_string();
                } else {
                    let t = inner.as_str();
                    underlying =
                        Some(Primitive::parse(t).ok_or_else(|| {
                            format!("Unknown enum underlying type: {}", t)
                        })?);
                }
            }
            Rule::enum_value => values.push(build_enum_value(inner)?),
            _ => {}
        }
    }

    Ok(EnumDecl {
        name,
        underlying: underlying.ok_or("Enum missing underlying type")?,
        values,
        annotations,
    })
}

fn build_enum_value(pair: pest::iterators::Pair<Rule>) -> Result<EnumValue, String> {
    let mut annotations = Vec::new();
    let mut name = String::new();
    let mut value = None;

    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::annotation => annotations.push(build_annotation(inner)?),
            Rule::ident => name = inner.as_str().to_string(),
            Rule::number => value = Some(parse_number(inner.as_str())?),
            _ => {}
        }
    }

    Ok(EnumValue {
        name,
        value: value.ok_or("Enum value missing a number")?,
        annotations,
    })
}

fn build_struct(pair: pest::iterators::Pair<Rule>) -> Result<StructDecl, String> {
    let mut annotations = Vec::new();
    let mut name = String::new();
    let mut fields = Vec::new();

    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::annotation => annotations.push(build_annotation(inner)?),
            Rule::ident => name = inner.as_str().to_string(),
            Rule::struct_field => fields.push(build_field(inner)?),
            _ => {}
        }
    }

    Ok(StructDecl { name, fields, annotations })
}

fn build_field(pair: pest::iterators::Pair<Rule>) -> Result<FieldDecl, String> {
    let mut annotations = Vec::new();
    let mut name = String::new();
    let mut type_expr = None;

    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::annotation => annotations.push(build_annotation(inner)?),
            Rule::ident => name = inner.as_str().to_string(),
            Rule::type_expr => type_expr = Some(build_type_expr(inner)?),
            _ => {}
        }
    }

    let (ty, array) = type_expr.ok_or("Field missing a type")?;
    Ok(FieldDecl { name, ty, array, annotations })
}

/// Build a field type. The bracket sizes attach to the base type first for
/// `bytes`/`string` (their capacity), and the outermost bracket is always
/// the array modifier.
fn build_type_expr(
    pair: pest::iterators::Pair<Rule>,
) -> Result<(TypeExpr, Option<u32>), String> {
    let mut name = String::new();
    let mut sizes: Vec<u32> = Vec::new();

    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::ident => name = inner.as_str().to_string(),
            Rule::bracket_size => {
                let num = inner
                    .into_inner()
                    .next()
                    .ok_or("Empty size bracket")?;
                let n = parse_number(num.as_str())?;
                let n = u32::try_from(n)
                    .map_err(|_| format!("Invalid size: {}", n))?;
                sizes.push(n);
            }
            _ => {}
        }
    }

    let sized = matches!(name.as_str(), "bytes" | "string");
    let max_brackets = if sized { 2 } else { 1 };
    if sizes.len() > max_brackets {
        return Err(format!("Too many size brackets on {}", name));
    }

    let (cap, array) = if sized {
        (sizes.first().copied(), sizes.get(1).copied())
    } else {
        (None, sizes.first().copied())
    };

    let ty = match name.as_str() {
        "bytes" => TypeExpr::Bytes(cap),
        "string" => TypeExpr::Str(cap),
        other => match Primitive::parse(other) {
            Some(p) => TypeExpr::Prim(p),
            None => TypeExpr::Named(other.to_string()),
        },
    };
    Ok((ty, array))
}

fn build_protocol(pair: pest::iterators::Pair<Rule>) -> Result<ProtocolDecl, String> {
    let mut annotations = Vec::new();
    let mut options = Vec::new();
    let mut message_ids = Vec::new();

    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::annotation => annotations.push(build_annotation(inner)?),
            Rule::option_def => {
                let mut parts = inner.into_inner();
                let name = parts.next().ok_or("Option missing name")?.as_str().to_string();
                let value = parts
                    .next()
                    .ok_or("Option missing value")?
                    .as_str()
                    .to_string();
                options.push(OptionDecl { name, value });
            }
            Rule::message_ids => {
                for id_pair in inner.into_inner() {
                    if !matches!(id_pair.as_rule(), Rule::message_id) {
                        continue;
                    }
                    let mut parts = id_pair.into_inner();
                    let name = parts
                        .next()
                        .ok_or("Message id missing name")?
                        .as_str()
                        .to_string();
                    let id = parse_number(
                        parts.next().ok_or("Message id missing value")?.as_str(),
                    )?;
                    message_ids.push(MessageIdDecl { name, id });
                }
            }
            _ => {}
        }
    }

    Ok(ProtocolDecl { options, message_ids, annotations })
}

fn build_annotation(pair: pest::iterators::Pair<Rule>) -> Result<Annotation, String> {
    let mut name = String::new();
    let mut args = Vec::new();

    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::ident => name = inner.as_str().to_string(),
            Rule::annotation_args => {
                for arg in inner.into_inner() {
                    if matches!(arg.as_rule(), Rule::annotation_arg) {
                        args.push(build_annotation_arg(arg)?);
                    }
                }
            }
            _ => {}
        }
    }

    Ok(Annotation { name, args })
}

fn build_annotation_arg(pair: pest::iterators::Pair<Rule>) -> Result<AnnotationArg, String> {
    let inner = pair.into_inner().next().ok_or("Empty annotation argument")?;
    match inner.as_rule() {
        Rule::named_arg => {
            let mut parts = inner.into_inner();
            let name = parts.next().ok_or("Named argument missing name")?;
            let value = parts.next().ok_or("Named argument missing value")?;
            Ok(AnnotationArg {
                name: Some(name.as_str().to_string()),
                value: unquote(value.as_str()),
            })
        }
        Rule::arg_value => Ok(AnnotationArg {
            name: None,
            value: unquote(inner.as_str()),
        }),
        _ => Err("Unknown annotation argument".to_string()),
    }
}

fn unquote(s: &str) -> String {
    let s = s.trim();
    if s.len() >= 2 && s.starts_with('"') && s.ends_with('"') {
        s[1..s.len() - 1].to_string()
    } else {
        s.to_string()
    }
}

fn parse_number(s: &str) -> Result<i128, String> {
    let t = s.trim();
    let (neg, t) = match t.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, t),
    };
    let value = if let Some(hex) = t.strip_prefix("0x").or_else(|| t.strip_prefix("0X")) {
        i128::from_str_radix(hex, 16)
    } else {
        t.parse::<i128>()
    }
    .map_err(|_| format!("Invalid integer literal: {}", s))?;
    Ok(if neg { -value } else { value })
}
