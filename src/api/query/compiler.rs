//! Query string compilation
//!
//! Renders expression trees and [`FindRequest`] snapshots into the canonical
//! OData query-string form:
//!
//! ```text
//! $filter=<expr>&$select=<csv>&$expand=<csv>&$orderby=<csv of "name dir">
//! ```
//!
//! Parts are emitted in that fixed order and omitted when empty. Rendering is
//! a pure function of its input, so compiling the same request twice always
//! yields the same string.

use super::expression::Expr;
use super::filters::Filter;
use super::orderby::orderby_string;
use super::request::FindRequest;
use crate::api::model::{EntityType, PropertyDescriptor, Value, filter_name, navigation_name, selectable_name};
use chrono::SecondsFormat;
use std::sync::Arc;

/// Range variable bound by `any`/`all` lambdas.
pub const LAMBDA_ALIAS: &str = "o";

/// Writes constant operands into a filter.
pub trait ValueFormatter: Send + Sync {
    fn format(&self, value: &Value) -> String;
}

/// Formatting used by the Dynamics Web API.
///
/// - `null` as the bare literal
/// - strings, guids, dates and anything unrecognised single-quoted, with
///   embedded quotes doubled
/// - numbers unquoted with a `.` decimal point and no grouping
/// - booleans as `true`/`false`
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultValueFormatter;

fn quote(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

impl ValueFormatter for DefaultValueFormatter {
    fn format(&self, value: &Value) -> String {
        match value {
            Value::Null => "null".to_string(),
            Value::String(s) => quote(s),
            Value::Guid(g) => quote(&g.hyphenated().to_string()),
            Value::Integer(i) => i.to_string(),
            Value::Float(f) if f.is_nan() => "NaN".to_string(),
            Value::Float(f) if f.is_infinite() => (if f.is_sign_positive() { "INF" } else { "-INF" }).to_string(),
            Value::Float(f) => f.to_string(),
            Value::Boolean(b) => b.to_string(),
            Value::DateTime(dt) => quote(&dt.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
            Value::Date(d) => quote(&d.format("%Y-%m-%d").to_string()),
            Value::Other(s) => quote(s),
        }
    }
}

/// How parameter values are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encoding {
    /// Human-readable, for logs and `--print-url`.
    #[default]
    Raw,
    /// Each value percent-encoded; `=` and `&` stay structural.
    Escaped,
}

#[derive(Clone)]
pub struct QueryCompiler {
    formatter: Arc<dyn ValueFormatter>,
}

impl QueryCompiler {
    pub fn new() -> Self {
        Self {
            formatter: Arc::new(DefaultValueFormatter),
        }
    }

    pub fn with_formatter(formatter: Arc<dyn ValueFormatter>) -> Self {
        Self { formatter }
    }

    /// Render one expression tree.
    pub fn compile_expr(&self, expr: &Expr) -> String {
        self.render(expr, "")
    }

    /// Render a filter, `None` when it is empty.
    pub fn compile_filter<E: EntityType>(&self, filter: &Filter<E>) -> Option<String> {
        filter.root().map(|root| self.compile_expr(root))
    }

    fn render(&self, expr: &Expr, prefix: &str) -> String {
        match expr {
            Expr::Constant(value) => self.formatter.format(value),
            Expr::Property(descriptor) => format!("{}{}", prefix, filter_name(descriptor)),
            Expr::Binary { left, op, right } => format!(
                "({} {} {})",
                self.render(left, prefix),
                op.as_str(),
                self.render(right, prefix)
            ),
            Expr::Logical { left, op, right } => format!(
                "({} {} {})",
                self.render(left, prefix),
                op.as_str(),
                self.render(right, prefix)
            ),
            Expr::Unary { op, operand } => format!("{} {}", op.as_str(), self.render(operand, prefix)),
            Expr::Function { function, target, args } => {
                let operands: Vec<String> = std::iter::once(target.as_ref())
                    .chain(args.iter())
                    .map(|arg| self.render(arg, prefix))
                    .collect();
                format!("{}({})", function.as_str(), operands.join(","))
            }
            Expr::Lambda {
                collection,
                quantifier,
                body,
            } => {
                let head = navigation_name(collection).unwrap_or_else(|| collection.name());
                let scope = format!("{}/", LAMBDA_ALIAS);
                format!(
                    "{}{}/{}({}:{})",
                    prefix,
                    head,
                    quantifier.as_str(),
                    LAMBDA_ALIAS,
                    self.render(body, &scope)
                )
            }
        }
    }

    /// The non-empty `(name, value)` parameters of a request, in wire order.
    pub fn query_parts<E: EntityType>(&self, request: &FindRequest<E>) -> Vec<(&'static str, String)> {
        let mut parts = Vec::new();

        if let Some(filter) = self.compile_filter(request.filter()) {
            parts.push(("$filter", filter));
        }

        if let Some(select) = join_unique(request.select(), selectable_name) {
            parts.push(("$select", select));
        }

        if let Some(expand) = join_unique(request.expand(), navigation_name) {
            parts.push(("$expand", expand));
        }

        if let Some(orderby) = orderby_string(request.order_by()) {
            parts.push(("$orderby", orderby));
        }

        parts
    }

    /// The full query string of a request, without a leading `?`.
    pub fn query_string<E: EntityType>(&self, request: &FindRequest<E>, encoding: Encoding) -> String {
        self.query_parts(request)
            .into_iter()
            .map(|(name, value)| match encoding {
                Encoding::Raw => format!("{}={}", name, value),
                Encoding::Escaped => format!("{}={}", name, urlencoding::encode(&value)),
            })
            .collect::<Vec<_>>()
            .join("&")
    }
}

impl Default for QueryCompiler {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for QueryCompiler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryCompiler").finish_non_exhaustive()
    }
}

fn join_unique(
    descriptors: &[PropertyDescriptor],
    project: fn(&PropertyDescriptor) -> Option<String>,
) -> Option<String> {
    let mut names: Vec<String> = Vec::new();
    for name in descriptors.iter().filter_map(project) {
        if !names.contains(&name) {
            names.push(name);
        }
    }
    if names.is_empty() { None } else { Some(names.join(",")) }
}
