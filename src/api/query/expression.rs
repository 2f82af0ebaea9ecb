//! Filter expression tree
//!
//! A closed set of node kinds, built bottom-up by the combinators in
//! [`super::filters`] and never mutated afterwards. The compiler walks it with
//! a single recursive `match`.

use crate::api::model::{PropertyDescriptor, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOperator {
    Equal,
    NotEqual,
    GreaterThan,
    LessThan,
    GreaterThanOrEqual,
    LessThanOrEqual,
}

impl ComparisonOperator {
    pub fn as_str(self) -> &'static str {
        match self {
            ComparisonOperator::Equal => "eq",
            ComparisonOperator::NotEqual => "ne",
            ComparisonOperator::GreaterThan => "gt",
            ComparisonOperator::LessThan => "lt",
            ComparisonOperator::GreaterThanOrEqual => "ge",
            ComparisonOperator::LessThanOrEqual => "le",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOperator {
    And,
    Or,
}

impl LogicalOperator {
    pub fn as_str(self) -> &'static str {
        match self {
            LogicalOperator::And => "and",
            LogicalOperator::Or => "or",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    Not,
}

impl UnaryOperator {
    pub fn as_str(self) -> &'static str {
        match self {
            UnaryOperator::Not => "not",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringFunction {
    Contains,
    StartsWith,
    EndsWith,
}

impl StringFunction {
    pub fn as_str(self) -> &'static str {
        match self {
            StringFunction::Contains => "contains",
            StringFunction::StartsWith => "startswith",
            StringFunction::EndsWith => "endswith",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quantifier {
    Any,
    All,
}

impl Quantifier {
    pub fn as_str(self) -> &'static str {
        match self {
            Quantifier::Any => "any",
            Quantifier::All => "all",
        }
    }
}

/// One node of a filter expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Constant(Value),
    Property(PropertyDescriptor),
    Binary {
        left: Box<Expr>,
        op: ComparisonOperator,
        right: Box<Expr>,
    },
    Logical {
        left: Box<Expr>,
        op: LogicalOperator,
        right: Box<Expr>,
    },
    Unary {
        op: UnaryOperator,
        operand: Box<Expr>,
    },
    Function {
        function: StringFunction,
        target: Box<Expr>,
        args: Vec<Expr>,
    },
    Lambda {
        collection: PropertyDescriptor,
        quantifier: Quantifier,
        body: Box<Expr>,
    },
}

impl Expr {
    pub fn constant(value: impl Into<Value>) -> Self {
        Expr::Constant(value.into())
    }

    pub fn property(descriptor: &PropertyDescriptor) -> Self {
        Expr::Property(descriptor.clone())
    }

    pub fn binary(left: Expr, op: ComparisonOperator, right: Expr) -> Self {
        Expr::Binary {
            left: Box::new(left),
            op,
            right: Box::new(right),
        }
    }

    pub fn logical(left: Expr, op: LogicalOperator, right: Expr) -> Self {
        Expr::Logical {
            left: Box::new(left),
            op,
            right: Box::new(right),
        }
    }

    pub fn not(operand: Expr) -> Self {
        Expr::Unary {
            op: UnaryOperator::Not,
            operand: Box::new(operand),
        }
    }

    pub fn function(function: StringFunction, target: Expr, args: Vec<Expr>) -> Self {
        Expr::Function {
            function,
            target: Box::new(target),
            args,
        }
    }

    pub fn lambda(collection: &PropertyDescriptor, quantifier: Quantifier, body: Expr) -> Self {
        Expr::Lambda {
            collection: collection.clone(),
            quantifier,
            body: Box::new(body),
        }
    }

    /// Whether the node may be an operand of `and`/`or`/`not`.
    pub fn is_logical_operand(&self) -> bool {
        !matches!(self, Expr::Constant(_) | Expr::Property(_))
    }

    /// Whether the node may be the predicate of an `any`/`all` lambda.
    pub fn is_lambda_body(&self) -> bool {
        matches!(
            self,
            Expr::Binary { .. } | Expr::Logical { .. } | Expr::Unary { .. } | Expr::Function { .. }
        )
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Expr::Constant(_) => "constant",
            Expr::Property(_) => "property reference",
            Expr::Binary { .. } => "comparison",
            Expr::Logical { .. } => "logical expression",
            Expr::Unary { .. } => "negation",
            Expr::Function { .. } => "function call",
            Expr::Lambda { .. } => "lambda",
        }
    }
}
