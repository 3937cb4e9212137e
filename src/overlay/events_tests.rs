use super::*;
use crate::overlay::index::FeatureClassPlan;
use proptest::prelude::*;

fn plan(mappings: &[(&str, &str)]) -> FeatureClassPlan {
    FeatureClassPlan {
        name: "Pavement".to_string(),
        mappings: mappings
            .iter()
            .map(|(input, output)| (input.to_string(), output.to_string()))
            .collect(),
        overlay_order: 1.0,
    }
}

fn source() -> Table {
    let mut table = Table::new(
        "Pavement",
        vec![
            Field::new("RouteID", FieldType::Text),
            Field::new("FromMeasure", FieldType::Integer),
            Field::new("ToMeasure", FieldType::Double),
            Field::new("FromDate", FieldType::Date),
            Field::new("ToDate", FieldType::Date),
            Field::new("surf", FieldType::Text),
            Field::new("width", FieldType::Double),
            Field::new("built", FieldType::Date),
        ],
    );
    let rows = vec![
        vec![
            Value::Text("R1".into()),
            Value::Integer(0),
            Value::Double(1.23456),
            Value::Null,
            Value::Null,
            Value::Text("ASPHALT".into()),
            Value::Double(0.0),
            Value::Null,
        ],
        vec![
            Value::Text("R2".into()),
            Value::Null,
            Value::Null,
            Value::Null,
            Value::Null,
            Value::Null,
            Value::Null,
            Value::Text("2001-05-01".into()),
        ],
    ];
    for row in rows {
        table.push_row(row).expect("push row");
    }
    table
}

#[test]
fn mapping_lists_declared_fields_then_controls() {
    let mappings = build_field_mapping(
        &plan(&[("width", "WIDTH"), ("surf", "SURFACE")]),
        &source(),
        &ControlFields::default(),
    )
    .expect("build mapping");
    let targets: Vec<&str> = mappings.iter().map(|m| m.target.as_str()).collect();
    assert_eq!(
        targets,
        vec!["WIDTH", "SURFACE", "RouteID", "FromMeasure", "ToMeasure"]
    );
    assert_eq!(mappings[0].source, "width");
}

#[test]
fn mapping_fails_on_missing_source_field() {
    let err = build_field_mapping(
        &plan(&[("lanes", "LANES")]),
        &source(),
        &ControlFields::default(),
    )
    .unwrap_err();
    assert!(matches!(err, OverlayError::Mapping { .. }));
}

#[test]
fn mapping_fails_on_duplicate_targets() {
    let err = build_field_mapping(
        &plan(&[("surf", "X"), ("width", "x")]),
        &source(),
        &ControlFields::default(),
    )
    .unwrap_err();
    assert!(matches!(err, OverlayError::Mapping { .. }));
}

#[test]
fn copy_applies_predicate_and_measure_types() {
    let fields = ControlFields::default();
    let mappings = build_field_mapping(&plan(&[("surf", "SURFACE")]), &source(), &fields)
        .expect("build mapping");
    let events = copy_events(&source(), &mappings, &fields, "PAVEMENT_EVENTS", |row| {
        row[0] == Value::Text("R1".into())
    })
    .expect("copy events");
    assert_eq!(events.name, "PAVEMENT_EVENTS");
    assert_eq!(events.len(), 1);
    assert_eq!(
        events
            .field_index("FromMeasure")
            .map(|index| events.fields[index].field_type),
        Some(FieldType::Double)
    );
    assert_eq!(events.get(0, "FromMeasure"), Some(&Value::Double(0.0)));
    assert_eq!(events.get(0, "SURFACE"), Some(&Value::Text("ASPHALT".into())));
}

#[test]
fn normalization_uses_sentinels() {
    let mut table = source();
    normalize_nulls(&mut table, "FromMeasure");

    // from-measure keeps its zero and its null
    assert_eq!(table.get(0, "FromMeasure"), Some(&Value::Integer(0)));
    assert_eq!(table.get(1, "FromMeasure"), Some(&Value::Null));

    assert_eq!(table.get(0, "width"), Some(&Value::Double(-888.0)));
    assert_eq!(table.get(1, "width"), Some(&Value::Double(-999.0)));
    assert_eq!(table.get(1, "ToMeasure"), Some(&Value::Double(-999.0)));
    assert_eq!(table.get(1, "surf"), Some(&Value::Text(".".into())));
    assert_eq!(table.get(0, "built"), Some(&Value::Integer(0)));
    assert_eq!(
        table.get(1, "built"),
        Some(&Value::Text("2001-05-01".into()))
    );
}

#[test]
fn rounding_targets_only_named_fields() {
    let mut table = source();
    round_measures(&mut table, &["ToMeasure", "Missing"], 2);
    assert_eq!(table.get(0, "ToMeasure"), Some(&Value::Double(1.23)));
    assert_eq!(table.get(0, "FromMeasure"), Some(&Value::Integer(0)));
}

fn arb_cell(field_type: FieldType) -> BoxedStrategy<Value> {
    match field_type {
        FieldType::Text => prop_oneof![
            Just(Value::Null),
            "[a-z]{0,4}".prop_map(Value::Text)
        ]
        .boxed(),
        FieldType::Integer => prop_oneof![
            Just(Value::Null),
            Just(Value::Integer(0)),
            (-50i64..50).prop_map(Value::Integer)
        ]
        .boxed(),
        FieldType::Double => prop_oneof![
            Just(Value::Null),
            Just(Value::Double(0.0)),
            (-50.0f64..50.0).prop_map(Value::Double)
        ]
        .boxed(),
        FieldType::Date => prop_oneof![Just(Value::Null), Just(Value::Text("2020-01-01".into()))]
            .boxed(),
    }
}

proptest! {
    #[test]
    fn rounding_is_idempotent(value in -1.0e6f64..1.0e6, places in 0u32..8) {
        let once = round_to(value, places);
        prop_assert_eq!(round_to(once, places), once);
    }

    #[test]
    fn normalized_tables_hold_no_nulls_or_numeric_zeros(
        rows in proptest::collection::vec(
            (
                arb_cell(FieldType::Text),
                arb_cell(FieldType::Double),
                arb_cell(FieldType::Integer),
                arb_cell(FieldType::Double),
            ),
            0..20,
        )
    ) {
        let mut table = Table::new(
            "Events",
            vec![
                Field::new("Name", FieldType::Text),
                Field::new("FromMeasure", FieldType::Double),
                Field::new("Count", FieldType::Integer),
                Field::new("ToMeasure", FieldType::Double),
            ],
        );
        for (name, from, count, to) in rows {
            table.push_row(vec![name, from, count, to]).expect("push row");
        }
        let before: Vec<Value> = table.rows.iter().map(|row| row[1].clone()).collect();
        normalize_nulls(&mut table, "FromMeasure");

        for (row, original_from) in table.rows.iter().zip(before) {
            prop_assert!(!row[0].is_null());
            prop_assert_eq!(&row[1], &original_from);
            for cell in [&row[2], &row[3]] {
                prop_assert!(!cell.is_null());
                prop_assert_ne!(cell.as_f64(), Some(0.0));
            }
        }
    }
}
