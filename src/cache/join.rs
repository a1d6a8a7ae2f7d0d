//! Merging independently enumerated key sequences into one row-key space.
//!
//! A table with several independent dependency chains gets one enumerated
//! `(key_order, key_set)` pair per chain. Pairs are merged left to right: an
//! equality join on whichever columns are already known, or a cartesian
//! product when the next pair shares none.

use std::collections::HashMap;

use crate::types::Value;

/// Merge per-path key sets into the table's final `(key_order, key_set)`.
pub fn join_key_sets(parts: Vec<(Vec<String>, Vec<Vec<Value>>)>) -> (Vec<String>, Vec<Vec<Value>>) {
    let mut parts = parts.into_iter();

    let (mut key_order, mut key_set) = match parts.next() {
        Some(first) => first,
        // No keys at all: one row with an empty key tuple.
        None => return (Vec::new(), vec![Vec::new()]),
    };

    let mut positions: HashMap<String, usize> = key_order
        .iter()
        .enumerate()
        .map(|(i, name)| (name.clone(), i))
        .collect();

    for (next_order, next_set) in parts {
        // Partition the incoming columns into ones we already track and
        // genuinely new ones.
        let mut matched: Vec<(usize, usize)> = Vec::new();
        let mut unmatched: Vec<usize> = Vec::new();
        for (next_pos, name) in next_order.iter().enumerate() {
            match positions.get(name) {
                Some(&known_pos) => matched.push((known_pos, next_pos)),
                None => unmatched.push(next_pos),
            }
        }

        let mut merged = Vec::new();
        if matched.is_empty() {
            // Nothing shared: full cartesian product.
            for left in &key_set {
                for right in &next_set {
                    let mut tuple = left.clone();
                    tuple.extend(right.iter().cloned());
                    merged.push(tuple);
                }
            }
        } else {
            // Nested-loop equality join on the shared columns.
            for left in &key_set {
                for right in &next_set {
                    let is_match = matched
                        .iter()
                        .all(|&(known_pos, next_pos)| left[known_pos] == right[next_pos]);
                    if is_match {
                        let mut tuple = left.clone();
                        tuple.extend(unmatched.iter().map(|&pos| right[pos].clone()));
                        merged.push(tuple);
                    }
                }
            }
        }

        for &pos in &unmatched {
            positions.insert(next_order[pos].clone(), key_order.len());
            key_order.push(next_order[pos].clone());
        }
        key_set = merged;
    }

    (key_order, key_set)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn uints(tuples: &[&[u64]]) -> Vec<Vec<Value>> {
        tuples
            .iter()
            .map(|t| t.iter().map(|&v| Value::Uint(v)).collect())
            .collect()
    }

    #[test]
    fn test_single_path_passes_through() {
        let set = uints(&[&[0], &[1]]);
        let (order, result) = join_key_sets(vec![(cols(&["a"]), set.clone())]);
        assert_eq!(order, vec!["a"]);
        assert_eq!(result, set);
    }

    #[test]
    fn test_equality_join_on_shared_column() {
        let left = (cols(&["group", "item"]), uints(&[&[0, 0], &[0, 1], &[1, 0]]));
        let right = (cols(&["group", "tag"]), uints(&[&[0, 9], &[1, 8]]));

        let (order, result) = join_key_sets(vec![left, right]);

        assert_eq!(order, vec!["group", "item", "tag"]);
        // Only same-group combinations survive.
        assert_eq!(
            result,
            uints(&[&[0, 0, 9], &[0, 1, 9], &[1, 0, 8]])
        );
    }

    #[test]
    fn test_no_cross_group_matches() {
        let left = (cols(&["g"]), uints(&[&[1], &[2]]));
        let right = (cols(&["g", "x"]), uints(&[&[3, 7]]));

        let (_, result) = join_key_sets(vec![left, right]);
        assert!(result.is_empty());
    }

    #[test]
    fn test_cartesian_product_when_disjoint() {
        let left = (cols(&["a"]), uints(&[&[0], &[1], &[2]]));
        let right = (cols(&["b"]), uints(&[&[7], &[8]]));

        let (order, result) = join_key_sets(vec![left, right]);

        assert_eq!(order, vec!["a", "b"]);
        assert_eq!(result.len(), 6);
        assert_eq!(result[0], vec![Value::Uint(0), Value::Uint(7)]);
        assert_eq!(result[5], vec![Value::Uint(2), Value::Uint(8)]);
    }

    #[test]
    fn test_column_count_is_union_of_inputs() {
        let left = (cols(&["a", "b"]), uints(&[&[1, 2]]));
        let right = (cols(&["b", "c"]), uints(&[&[2, 3]]));
        let third = (cols(&["d"]), uints(&[&[4]]));

        let (order, result) = join_key_sets(vec![left, right, third]);
        assert_eq!(order, vec!["a", "b", "c", "d"]);
        assert_eq!(result, uints(&[&[1, 2, 3, 4]]));
    }

    #[test]
    fn test_no_paths_yields_single_empty_tuple() {
        let (order, result) = join_key_sets(vec![]);
        assert!(order.is_empty());
        assert_eq!(result, vec![Vec::<Value>::new()]);
    }
}
