use scraper::{ElementRef, Html, Selector};
use serde_json::{Map, Value};

use spinneret_core::{ExtractSpec, FieldRule};

/// Evaluate an extract spec over a parsed document. Fields whose selector
/// fails to parse or matches nothing are simply absent from the result.
pub fn evaluate(document: &Html, spec: &ExtractSpec) -> Value {
    let mut out = Map::new();
    for (name, rule) in spec {
        if let Some(value) = eval_rule(document.root_element(), rule) {
            out.insert(name.clone(), value);
        }
    }
    Value::Object(out)
}

fn eval_rule(scope: ElementRef<'_>, rule: &FieldRule) -> Option<Value> {
    match rule {
        FieldRule::Selector(selector) => {
            let selector = Selector::parse(selector).ok()?;
            scope
                .select(&selector)
                .next()
                .map(|el| Value::String(text_of(el)))
        }
        FieldRule::Rule {
            selector,
            attribute,
            multiple,
            exists,
            fields,
        } => {
            let selector = Selector::parse(selector).ok()?;
            let mut matches = scope.select(&selector).peekable();

            if exists.unwrap_or(false) {
                return Some(Value::Bool(matches.peek().is_some()));
            }

            if multiple.unwrap_or(false) {
                let values: Vec<Value> = matches
                    .filter_map(|el| match fields {
                        Some(nested) => Some(eval_nested(el, nested)),
                        None => scalar_of(el, attribute.as_deref()),
                    })
                    .collect();
                return Some(Value::Array(values));
            }

            let first = matches.next()?;
            match fields {
                Some(nested) => Some(eval_nested(first, nested)),
                None => scalar_of(first, attribute.as_deref()),
            }
        }
    }
}

fn eval_nested(
    scope: ElementRef<'_>,
    fields: &std::collections::HashMap<String, FieldRule>,
) -> Value {
    let mut out = Map::new();
    for (name, rule) in fields {
        if let Some(value) = eval_rule(scope, rule) {
            out.insert(name.clone(), value);
        }
    }
    Value::Object(out)
}

fn scalar_of(el: ElementRef<'_>, attribute: Option<&str>) -> Option<Value> {
    match attribute {
        Some(attr) => el.value().attr(attr).map(|v| Value::String(v.to_string())),
        None => Some(Value::String(text_of(el))),
    }
}

fn text_of(el: ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}
