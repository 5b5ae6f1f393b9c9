//! Type registry with erased operator vtables
//!
//! The server is not generic over document types: one registry serves
//! documents of many types, looked up by name at submission time. Each
//! registered [`OtType`] is wrapped in an object-safe vtable whose
//! snapshots and operations are opaque [`serde_json::Value`] carriers; the
//! concrete typing lives on the client side and in the adapter's encoding.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{OtError, Result};
use crate::types::{OtType, Side};

/// Object-safe view of an [`OtType`] operating on opaque value carriers
pub trait ErasedOtType: Send + Sync {
    /// Registry key
    fn name(&self) -> &str;

    /// Identity of the concrete Rust type behind this vtable
    fn type_id(&self) -> TypeId;

    /// Check that `op` decodes to a well-formed operation
    fn validate(&self, op: &Value) -> Result<()>;

    /// Apply `op` to `snapshot`
    fn apply(&self, snapshot: &Value, op: &Value) -> Result<Value>;

    /// Compose `a` followed by `b`
    fn compose(&self, a: &Value, b: &Value) -> Result<Value>;

    /// Transform `a` against concurrent `b`
    fn transform(&self, a: &Value, b: &Value, side: Side) -> Result<Value>;
}

struct Erased<T>(T);

fn decode_op<Op: DeserializeOwned>(value: &Value) -> Result<Op> {
    serde_json::from_value(value.clone()).map_err(|e| OtError::OpMalformed(e.to_string()))
}

fn decode_snapshot<S: DeserializeOwned>(value: &Value) -> Result<S> {
    // A snapshot that fails to decode means the stored record is corrupt
    serde_json::from_value(value.clone()).map_err(|e| OtError::StorageUnavailable(e.to_string()))
}

impl<T: OtType> ErasedOtType for Erased<T> {
    fn name(&self) -> &str {
        self.0.name()
    }

    fn type_id(&self) -> TypeId {
        TypeId::of::<T>()
    }

    fn validate(&self, op: &Value) -> Result<()> {
        let op: T::Op = decode_op(op)?;
        self.0.validate(&op)
    }

    fn apply(&self, snapshot: &Value, op: &Value) -> Result<Value> {
        let snapshot: T::Snapshot = decode_snapshot(snapshot)?;
        let op: T::Op = decode_op(op)?;
        Ok(serde_json::to_value(self.0.apply(&snapshot, &op)?)?)
    }

    fn compose(&self, a: &Value, b: &Value) -> Result<Value> {
        let a: T::Op = decode_op(a)?;
        let b: T::Op = decode_op(b)?;
        Ok(serde_json::to_value(self.0.compose(&a, &b)?)?)
    }

    fn transform(&self, a: &Value, b: &Value, side: Side) -> Result<Value> {
        let a: T::Op = decode_op(a)?;
        let b: T::Op = decode_op(b)?;
        Ok(serde_json::to_value(self.0.transform(&a, &b, side)?)?)
    }
}

/// Heterogeneous map from type name to erased OT type
#[derive(Default)]
pub struct TypeRegistry {
    types: RwLock<HashMap<String, Arc<dyn ErasedOtType>>>,
}

impl TypeRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a type under its name.
    ///
    /// Re-registering the same concrete type is idempotent; registering a
    /// different type under an already-taken name fails with
    /// [`OtError::TypeConflict`].
    pub fn register<T: OtType>(&self, ty: T) -> Result<()> {
        let name = ty.name().to_string();
        let mut types = self.types.write().unwrap_or_else(|p| p.into_inner());
        if let Some(existing) = types.get(&name) {
            if existing.type_id() == TypeId::of::<T>() {
                return Ok(());
            }
            return Err(OtError::TypeConflict(name));
        }
        types.insert(name, Arc::new(Erased(ty)));
        Ok(())
    }

    /// Look a type up by name
    pub fn get(&self, name: &str) -> Result<Arc<dyn ErasedOtType>> {
        self.types
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .get(name)
            .cloned()
            .ok_or_else(|| OtError::TypeUnknown(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::text::{Operation, TextType};
    use serde_json::json;

    /// A second type that claims the "text" name
    struct ImposterType;

    impl OtType for ImposterType {
        type Snapshot = String;
        type Op = Operation;

        fn name(&self) -> &'static str {
            "text"
        }

        fn apply(&self, snapshot: &String, _op: &Operation) -> Result<String> {
            Ok(snapshot.clone())
        }

        fn compose(&self, a: &Operation, _b: &Operation) -> Result<Operation> {
            Ok(a.clone())
        }

        fn transform(&self, a: &Operation, _b: &Operation, _side: Side) -> Result<Operation> {
            Ok(a.clone())
        }
    }

    #[test]
    fn test_register_and_lookup() {
        let registry = TypeRegistry::new();
        registry.register(TextType::new()).unwrap();

        let ty = registry.get("text").unwrap();
        assert_eq!(ty.name(), "text");
    }

    #[test]
    fn test_unknown_type() {
        let registry = TypeRegistry::new();
        assert!(matches!(
            registry.get("json"),
            Err(OtError::TypeUnknown(_))
        ));
    }

    #[test]
    fn test_reregistration_is_idempotent() {
        let registry = TypeRegistry::new();
        registry.register(TextType::new()).unwrap();
        registry.register(TextType::new()).unwrap();
    }

    #[test]
    fn test_conflicting_registration_fails() {
        let registry = TypeRegistry::new();
        registry.register(TextType::new()).unwrap();
        assert!(matches!(
            registry.register(ImposterType),
            Err(OtError::TypeConflict(name)) if name == "text"
        ));
    }

    #[test]
    fn test_erased_apply() {
        let registry = TypeRegistry::new();
        registry.register(TextType::new()).unwrap();
        let ty = registry.get("text").unwrap();

        let next = ty
            .apply(&json!("Hello"), &json!([{"r": 5}, {"i": " World"}]))
            .unwrap();
        assert_eq!(next, json!("Hello World"));
    }

    #[test]
    fn test_erased_transform_respects_side() {
        let registry = TypeRegistry::new();
        registry.register(TextType::new()).unwrap();
        let ty = registry.get("text").unwrap();

        let a = json!([{"r": 3}, {"i": "A"}]);
        let b = json!([{"r": 3}, {"i": "B"}]);
        assert_eq!(
            ty.transform(&a, &b, Side::Left).unwrap(),
            json!([{"r": 3}, {"i": "A"}, {"r": 1}])
        );
        assert_eq!(
            ty.transform(&b, &a, Side::Right).unwrap(),
            json!([{"r": 4}, {"i": "B"}])
        );
    }

    #[test]
    fn test_erased_validate_rejects_malformed() {
        let registry = TypeRegistry::new();
        registry.register(TextType::new()).unwrap();
        let ty = registry.get("text").unwrap();

        assert!(matches!(
            ty.validate(&json!([{"r": 1, "d": 2}])),
            Err(OtError::OpMalformed(_))
        ));
        assert!(matches!(
            ty.validate(&json!([{"r": 1}, {"r": 2}])),
            Err(OtError::OpMalformed(_))
        ));
        assert!(ty.validate(&json!([{"r": 1}, {"i": "x"}])).is_ok());
    }
}
