pub mod definition;
pub mod interface;

pub use definition::{CallSpecConfig, DefinitionConfig, EventRole, KeySpecConfig, TableSpecConfig};
pub use interface::{
    EventDescription, FunctionDescription, InterfaceDescription, TypedField, Value, ValueType,
};
