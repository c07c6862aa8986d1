// conveyor/src/core/element.rs

//! State element values and the containers that validate them.

use crate::core::step::InvocationId;
use crate::error::{ConveyorError, ConveyorResult};
use anyhow::bail;
use std::any::Any;
use std::marker::PhantomData;
use std::sync::Arc;

/// A published state element. Values are shared, never copied, between the
/// producing invocation and every consumer bound to it.
pub type ElementValue = Arc<dyn Any + Send + Sync>;

/// Wraps a value for publishing.
pub fn element<T: Any + Send + Sync>(value: T) -> ElementValue {
  Arc::new(value)
}

/// Holder bound to a state-element name in the element containers registry.
/// The broker constructs one around every published value and refuses the value
/// when `validate_contents` fails.
pub trait ElementContainer: Send + Sync {
  fn validate_contents(&self) -> anyhow::Result<()>;

  fn element(&self) -> &ElementValue;
}

type Validator<T> = Arc<dyn Fn(&T) -> anyhow::Result<()> + Send + Sync + 'static>;

/// Container for values of one concrete type, checked by a validation closure.
pub struct TypedContainer<T: Any + Send + Sync> {
  value: ElementValue,
  validator: Validator<T>,
  _phantom: PhantomData<fn() -> T>,
}

impl<T: Any + Send + Sync> TypedContainer<T> {
  pub fn new(value: ElementValue, validator: impl Fn(&T) -> anyhow::Result<()> + Send + Sync + 'static) -> Self {
    Self::from_shared(value, Arc::new(validator))
  }

  pub(crate) fn from_shared(value: ElementValue, validator: Validator<T>) -> Self {
    Self {
      value,
      validator,
      _phantom: PhantomData,
    }
  }
}

impl<T: Any + Send + Sync> ElementContainer for TypedContainer<T> {
  fn validate_contents(&self) -> anyhow::Result<()> {
    match self.value.downcast_ref::<T>() {
      Some(typed) => (self.validator)(typed),
      None => bail!("expected a value of type {}", std::any::type_name::<T>()),
    }
  }

  fn element(&self) -> &ElementValue {
    &self.value
  }
}

// Recovers the concrete type of a fetched element.
pub(crate) fn downcast_element<T: Any + Send + Sync>(
  value: ElementValue,
  invocation: &InvocationId,
  element_name: &str,
) -> ConveyorResult<Arc<T>> {
  value.downcast::<T>().map_err(|_| ConveyorError::TypeMismatch {
    invocation: invocation.clone(),
    name: element_name.to_string(),
    expected_type: std::any::type_name::<T>().to_string(),
  })
}
