use oxid_exec::{chunk::DataChunk, types::{LogicalType, Value}, vector::{selection::SelectionVector,
    Vector, VectorType}};
use rand::{rngs::StdRng, Rng, SeedableRng};

fn random_value(rng: &mut StdRng) -> Value {
    if rng.gen_bool(0.2) {
        Value::Null(LogicalType::BigInt)
    } else {
        Value::BigInt(rng.gen_range(-1_000_000..1_000_000))
    }
}

fn values(vector: &Vector, count: usize) -> Vec<Value> {
    (0..count).map(|i| vector.get_value(i).unwrap()).collect()
}

#[test]
fn test_normalify_is_transparent_for_every_representation() {
    let mut rng = StdRng::seed_from_u64(99);
    let count = 700;
    let mut flat = Vector::new(LogicalType::BigInt);
    for i in 0..count {
        flat.set_value(i, &random_value(&mut rng)).unwrap();
    }
    let constant = Vector::from_value(&Value::BigInt(17)).unwrap();
    let null_constant = Vector::from_value(&Value::Null(LogicalType::BigInt)).unwrap();
    let sequence = Vector::sequence(LogicalType::BigInt, 10, -3);
    let selection = SelectionVector::from_vec((0..count as u32).map(|_| rng.gen_range(0..count as u32)).collect());
    let mut dictionary = Vector::new_reference(&flat);
    dictionary.slice(&selection, count).unwrap();
    assert_eq!(dictionary.vector_type(), VectorType::Dictionary);

    for vector in [flat, constant, null_constant, sequence, dictionary] {
        let before = values(&vector, count);
        let mut normalized = Vector::new_reference(&vector);
        normalized.normalify(count).unwrap();
        assert_eq!(normalized.vector_type(), VectorType::Flat);
        assert_eq!(values(&normalized, count), before);
        // and a second time changes nothing
        normalized.normalify(count).unwrap();
        assert_eq!(values(&normalized, count), before);
    }
}

#[test]
fn test_slice_then_reference_reads_selected_rows() {
    let mut chunk = DataChunk::with_types(&[LogicalType::Integer, LogicalType::Varchar]);
    for row in 0..500 {
        let key = if row % 7 == 0 { Value::Null(LogicalType::Integer) } else { Value::Integer(row as i32) };
        chunk.set_value(0, row, &key).unwrap();
        chunk.set_value(1, row, &Value::varchar(format!("payload string number {}", row))).unwrap();
    }
    chunk.set_cardinality(500);
    let original: Vec<Vec<Value>> = (0..500).map(|row| vec![chunk.get_value(0, row).unwrap(), chunk.get_value(1, row).unwrap()]).collect();

    let selection = SelectionVector::from_vec((0..250).rev().map(|i| i * 2).collect());
    let mut sliced = DataChunk::with_types(&chunk.types());
    sliced.reference(&chunk);
    sliced.slice(&selection, 250).unwrap();
    let mut aliased = DataChunk::with_types(&chunk.types());
    aliased.reference(&sliced);
    for i in 0..250 {
        let source_row = selection.get_index(i);
        assert_eq!(aliased.get_value(0, i).unwrap(), original[source_row][0]);
        assert_eq!(aliased.get_value(1, i).unwrap(), original[source_row][1]);
    }
    aliased.normalify().unwrap();
    assert_eq!(aliased.get_value(0, 249).unwrap(), Value::Null(LogicalType::Integer));
}

#[test]
fn test_strings_outlive_their_source() {
    // 13 bytes is the shortest string that leaves the descriptor, the 500 byte one forces the
    // heap to grow behind it
    let short_of_inline = "0123456789ABC";
    let large = "x".repeat(500);
    let mut source = Vector::new(LogicalType::Varchar);
    source.set_value(0, &Value::varchar(short_of_inline)).unwrap();
    source.set_value(1, &Value::varchar(large.clone())).unwrap();
    source.set_value(2, &Value::varchar("inline")).unwrap();
    let mut sliced = Vector::new_reference(&source);
    sliced.slice(&SelectionVector::from_vec(vec![2, 1, 0]), 3).unwrap();
    drop(source);
    assert_eq!(values(&sliced, 3), vec![Value::varchar("inline"), Value::varchar(large), Value::varchar(short_of_inline)]);
    sliced.normalify(3).unwrap();
    assert_eq!(sliced.get_value(2).unwrap(), Value::varchar(short_of_inline));
}
