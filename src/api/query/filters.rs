//! OData filter building
//!
//! Provides type-safe filter construction over property handles. A [`Filter`]
//! is either empty or wraps an expression that can stand as an operand of
//! `and`/`or`/`not`, which is what makes the `&`, `|` and `!` operators
//! infallible:
//!
//! - `Filter::empty() & f` and `f & Filter::empty()` are `f` (same for `|`)
//! - `!f` wraps `f` in `not`; `!Filter::empty()` stays empty
//! - `!!f` renders as `not not f`, double negation is kept as written

use super::expression::{ComparisonOperator, Expr, LogicalOperator, Quantifier, StringFunction};
use crate::api::model::{EntityId, EntityType, Many, Property, Ref, Scalar, Value};
use crate::error::{DynamicsError, Result};
use std::fmt;
use std::marker::PhantomData;
use std::ops::{BitAnd, BitOr, Not};

/// A possibly empty filter over entity `E`.
pub struct Filter<E> {
    root: Option<Expr>,
    _entity: PhantomData<fn() -> E>,
}

impl<E: EntityType> Filter<E> {
    pub fn empty() -> Self {
        Self {
            root: None,
            _entity: PhantomData,
        }
    }

    /// Wrap a hand-built expression.
    ///
    /// Fails with [`DynamicsError::InvalidFilterComposition`] when the root is
    /// a bare constant or property reference.
    pub fn from_expr(expr: Expr) -> Result<Self> {
        if !expr.is_logical_operand() {
            return Err(DynamicsError::InvalidFilterComposition(format!(
                "a {} cannot be used as a filter",
                expr.kind_name()
            )));
        }
        Ok(Self::wrap(expr))
    }

    fn wrap(expr: Expr) -> Self {
        Self {
            root: Some(expr),
            _entity: PhantomData,
        }
    }

    pub fn root(&self) -> Option<&Expr> {
        self.root.as_ref()
    }

    pub fn into_root(self) -> Option<Expr> {
        self.root
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    fn combine(self, op: LogicalOperator, other: Self) -> Self {
        match (self.root, other.root) {
            (None, None) => Self::empty(),
            (Some(root), None) | (None, Some(root)) => Self::wrap(root),
            (Some(left), Some(right)) => Self::wrap(Expr::logical(left, op, right)),
        }
    }
}

impl<E: EntityType> Default for Filter<E> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<E: EntityType> BitAnd for Filter<E> {
    type Output = Filter<E>;

    fn bitand(self, rhs: Self) -> Self::Output {
        self.combine(LogicalOperator::And, rhs)
    }
}

impl<E: EntityType> BitOr for Filter<E> {
    type Output = Filter<E>;

    fn bitor(self, rhs: Self) -> Self::Output {
        self.combine(LogicalOperator::Or, rhs)
    }
}

impl<E: EntityType> Not for Filter<E> {
    type Output = Filter<E>;

    fn not(self) -> Self::Output {
        match self.root {
            Some(root) => Self::wrap(Expr::not(root)),
            None => Self::empty(),
        }
    }
}

impl<E> Clone for Filter<E> {
    fn clone(&self) -> Self {
        Self {
            root: self.root.clone(),
            _entity: PhantomData,
        }
    }
}

impl<E> PartialEq for Filter<E> {
    fn eq(&self, other: &Self) -> bool {
        self.root == other.root
    }
}

impl<E> fmt::Debug for Filter<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Filter").field(&self.root).finish()
    }
}

fn compare<E: EntityType, T>(property: &Property<E, T>, op: ComparisonOperator, value: Value) -> Filter<E>
where
    T: crate::api::model::PropertyValue,
{
    Filter::wrap(Expr::binary(
        Expr::property(property.descriptor()),
        op,
        Expr::Constant(value),
    ))
}

fn call<E: EntityType>(property: &Property<E, String>, function: StringFunction, value: String) -> Filter<E> {
    Filter::wrap(Expr::function(
        function,
        Expr::property(property.descriptor()),
        vec![Expr::constant(value)],
    ))
}

// Comparison operators

pub fn equal_to<E: EntityType, T: Scalar>(property: &Property<E, T>, value: impl Into<T>) -> Filter<E> {
    compare(property, ComparisonOperator::Equal, value.into().into_value())
}

pub fn not_equal_to<E: EntityType, T: Scalar>(property: &Property<E, T>, value: impl Into<T>) -> Filter<E> {
    compare(property, ComparisonOperator::NotEqual, value.into().into_value())
}

pub fn greater_than<E: EntityType, T: Scalar>(property: &Property<E, T>, value: impl Into<T>) -> Filter<E> {
    compare(property, ComparisonOperator::GreaterThan, value.into().into_value())
}

pub fn less_than<E: EntityType, T: Scalar>(property: &Property<E, T>, value: impl Into<T>) -> Filter<E> {
    compare(property, ComparisonOperator::LessThan, value.into().into_value())
}

pub fn greater_than_or_equal_to<E: EntityType, T: Scalar>(property: &Property<E, T>, value: impl Into<T>) -> Filter<E> {
    compare(property, ComparisonOperator::GreaterThanOrEqual, value.into().into_value())
}

pub fn less_than_or_equal_to<E: EntityType, T: Scalar>(property: &Property<E, T>, value: impl Into<T>) -> Filter<E> {
    compare(property, ComparisonOperator::LessThanOrEqual, value.into().into_value())
}

// String functions

pub fn contains<E: EntityType>(property: &Property<E, String>, value: impl Into<String>) -> Filter<E> {
    call(property, StringFunction::Contains, value.into())
}

pub fn starts_with<E: EntityType>(property: &Property<E, String>, value: impl Into<String>) -> Filter<E> {
    call(property, StringFunction::StartsWith, value.into())
}

pub fn ends_with<E: EntityType>(property: &Property<E, String>, value: impl Into<String>) -> Filter<E> {
    call(property, StringFunction::EndsWith, value.into())
}

// Null tests, usable on scalars and single-valued references alike

pub fn is_null<E: EntityType, T: crate::api::model::Selectable>(property: &Property<E, T>) -> Filter<E> {
    compare(property, ComparisonOperator::Equal, Value::Null)
}

pub fn is_not_null<E: EntityType, T: crate::api::model::Selectable>(property: &Property<E, T>) -> Filter<E> {
    compare(property, ComparisonOperator::NotEqual, Value::Null)
}

// Reference tests

pub fn references<E: EntityType, X: EntityType>(property: &Property<E, Ref<X>>, id: &EntityId) -> Filter<E> {
    compare(property, ComparisonOperator::Equal, Value::from(id))
}

pub fn does_not_reference<E: EntityType, X: EntityType>(property: &Property<E, Ref<X>>, id: &EntityId) -> Filter<E> {
    compare(property, ComparisonOperator::NotEqual, Value::from(id))
}

// Collection quantifiers

fn quantify<E: EntityType, X: EntityType>(
    collection: &Property<E, Many<X>>,
    quantifier: Quantifier,
    predicate: Filter<X>,
) -> Result<Filter<E>> {
    let body = predicate.into_root().ok_or_else(|| {
        DynamicsError::InvalidFilterComposition(format!(
            "{}() over '{}' needs a non-empty predicate",
            quantifier.as_str(),
            collection.name()
        ))
    })?;

    if !body.is_lambda_body() {
        return Err(DynamicsError::InvalidFilterComposition(format!(
            "a {} cannot be the body of {}() over '{}'",
            body.kind_name(),
            quantifier.as_str(),
            collection.name()
        )));
    }

    Ok(Filter::wrap(Expr::lambda(collection.descriptor(), quantifier, body)))
}

/// Matches when at least one related record satisfies `predicate`.
pub fn any<E: EntityType, X: EntityType>(collection: &Property<E, Many<X>>, predicate: Filter<X>) -> Result<Filter<E>> {
    quantify(collection, Quantifier::Any, predicate)
}

/// Matches when every related record satisfies `predicate`.
pub fn all<E: EntityType, X: EntityType>(collection: &Property<E, Many<X>>, predicate: Filter<X>) -> Result<Filter<E>> {
    quantify(collection, Quantifier::All, predicate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::model::PropertyKind;

    struct Contact;
    struct Account;

    impl EntityType for Contact {
        const LOGICAL_NAME: &'static str = "contact";
    }
    impl EntityType for Account {
        const LOGICAL_NAME: &'static str = "account";
    }

    fn firstname() -> Property<Contact, String> {
        Property::required("firstname")
    }

    #[test]
    fn empty_is_identity_for_and_or() {
        let f = equal_to(&firstname(), "Ada");
        assert_eq!(Filter::empty() & f.clone(), f);
        assert_eq!(f.clone() & Filter::empty(), f);
        assert_eq!(Filter::empty() | f.clone(), f);
        assert_eq!(f.clone() | Filter::empty(), f);
        assert!((Filter::<Contact>::empty() & Filter::empty()).is_empty());
    }

    #[test]
    fn not_on_empty_stays_empty() {
        assert!((!Filter::<Contact>::empty()).is_empty());
    }

    #[test]
    fn double_negation_is_not_simplified() {
        let f = equal_to(&firstname(), "Ada");
        let twice = !!f.clone();
        match twice.root() {
            Some(Expr::Unary { operand, .. }) => {
                assert!(matches!(operand.as_ref(), Expr::Unary { .. }));
            }
            other => panic!("expected nested negation, got {:?}", other),
        }
        assert_ne!(twice, f);
    }

    #[test]
    fn from_expr_rejects_bare_operands() {
        assert!(matches!(
            Filter::<Contact>::from_expr(Expr::constant(true)),
            Err(DynamicsError::InvalidFilterComposition(_))
        ));
        let prop = Expr::property(firstname().descriptor());
        assert!(Filter::<Contact>::from_expr(prop).is_err());
    }

    #[test]
    fn quantifier_requires_usable_body() {
        let accounts = Property::<Contact, Many<Account>>::collection("contact_customer_accounts");
        let name = Property::<Account, String>::required("name");
        let contacts = Property::<Account, Many<Contact>>::collection("contact_customer_accounts");

        assert!(any(&accounts, equal_to(&name, "x")).is_ok());
        assert!(matches!(
            all(&accounts, Filter::empty()),
            Err(DynamicsError::InvalidFilterComposition(_))
        ));

        // a lambda cannot itself be a lambda body
        let nested = any(&contacts, equal_to(&firstname(), "Ada")).unwrap();
        assert!(matches!(
            any(&accounts, nested),
            Err(DynamicsError::InvalidFilterComposition(_))
        ));
    }

    #[test]
    fn runtime_properties_compose() {
        let p = Property::<Contact, i32>::parse(PropertyKind::Optional, "statecode").unwrap();
        let f = equal_to(&p, 0) | equal_to(&p, 1);
        assert!(matches!(f.root(), Some(Expr::Logical { op: LogicalOperator::Or, .. })));
    }
}
