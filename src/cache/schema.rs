//! Relational schema materialization for table specs.

use super::mapping;
use super::normalize::TableSpec;
use crate::db::TableSchema;

/// Schema for one table spec: key columns (primary key) followed by value
/// columns with type-appropriate defaults.
pub fn table_schema(spec: &TableSpec) -> TableSchema {
    let mut columns = Vec::with_capacity(spec.inputs.len() + spec.fields.len());
    for input in &spec.inputs {
        columns.push(mapping::column_schema(&input.name, input.ty, true));
    }
    for field in &spec.fields {
        columns.push(mapping::column_schema(&field.name, field.ty, false));
    }
    TableSchema {
        name: spec.name.clone(),
        columns,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::normalize::ColumnDef;
    use crate::db::ColumnType;
    use crate::types::ValueType;

    #[test]
    fn test_key_columns_compose_primary_key() {
        let spec = TableSpec {
            name: "items".to_string(),
            call: "getItemData".to_string(),
            keys: vec!["group".to_string(), "item".to_string()],
            inputs: vec![
                ColumnDef {
                    name: "group".to_string(),
                    ty: ValueType::Int,
                },
                ColumnDef {
                    name: "item".to_string(),
                    ty: ValueType::Int,
                },
            ],
            fields: vec![ColumnDef {
                name: "label".to_string(),
                ty: ValueType::String,
            }],
            paths: vec![],
            key_order: vec![],
            key_set: vec![],
        };

        let schema = table_schema(&spec);
        assert_eq!(schema.name, "items");
        assert_eq!(schema.columns.len(), 3);
        assert!(schema.columns[0].primary_key);
        assert!(schema.columns[1].primary_key);
        assert!(!schema.columns[2].primary_key);
        assert_eq!(schema.columns[2].ty, ColumnType::Text);
        assert_eq!(
            schema.primary_key_columns().count(),
            2
        );
    }
}
