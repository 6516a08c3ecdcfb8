/// Property-based tests using proptest
/// Every field codec must satisfy decode(encode(v)) == v over its domain
use std::collections::BTreeMap;

use chrono::NaiveDate;
use proptest::prelude::*;
use rust_amocrm_api::custom_fields::CustomFieldMetadata;
use rust_amocrm_api::field_types::{decode, encode, FieldType, FieldValue};

fn meta(field_type: FieldType, enums: &[(i64, String)]) -> CustomFieldMetadata {
    CustomFieldMetadata {
        id: 42,
        name: "Field".to_string(),
        code: None,
        field_type,
        enums: if enums.is_empty() {
            None
        } else {
            Some(enums.iter().cloned().collect())
        },
        is_deletable: true,
        is_visible: true,
        origin: None,
    }
}

fn round_trips(field_type: FieldType, value: FieldValue, enums: &[(i64, String)]) {
    let m = meta(field_type, enums);
    let wire = encode(field_type, &value, &m).unwrap();
    let back = decode(field_type, Some(&wire), &m).unwrap();
    assert_eq!(back, Some(value));
}

fn date_strategy() -> impl Strategy<Value = NaiveDate> {
    (1970i32..2100, 1u32..=12, 1u32..=28)
        .prop_map(|(y, m, d)| NaiveDate::from_ymd_opt(y, m, d).unwrap())
}

// Unique non-empty labels so enum-constrained round trips are well defined.
fn enum_labels() -> impl Strategy<Value = Vec<String>> {
    proptest::collection::btree_set("[A-Za-z][A-Za-z0-9 ]{0,10}", 1..5)
        .prop_map(|set| set.into_iter().collect())
}

proptest! {
    #[test]
    fn text_round_trips(value in "\\PC*") {
        round_trips(FieldType::Text, FieldValue::Text(value), &[]);
    }

    #[test]
    fn textarea_round_trips(value in "\\PC*") {
        round_trips(FieldType::TextArea, FieldValue::TextArea(value), &[]);
    }

    #[test]
    fn url_round_trips(value in "[a-z]{1,10}://[a-z0-9./]{1,30}") {
        round_trips(FieldType::Url, FieldValue::Url(value), &[]);
    }

    #[test]
    fn street_address_round_trips(value in "\\PC*") {
        round_trips(FieldType::StreetAddress, FieldValue::StreetAddress(value), &[]);
    }

    #[test]
    fn numeric_round_trips(value in any::<i64>()) {
        round_trips(FieldType::Numeric, FieldValue::Numeric(value), &[]);
    }

    #[test]
    fn checkbox_round_trips(value in any::<bool>()) {
        round_trips(FieldType::Checkbox, FieldValue::Checkbox(value), &[]);
    }

    #[test]
    fn date_round_trips(value in date_strategy()) {
        round_trips(FieldType::Date, FieldValue::Date(value), &[]);
    }

    #[test]
    fn birthday_round_trips(value in date_strategy()) {
        round_trips(FieldType::Birthday, FieldValue::Birthday(value), &[]);
    }

    #[test]
    fn select_round_trips(labels in enum_labels(), pick in any::<prop::sample::Index>()) {
        let enums: Vec<(i64, String)> = labels
            .iter()
            .enumerate()
            .map(|(i, l)| (i as i64 + 1, l.clone()))
            .collect();
        let label = labels[pick.index(labels.len())].clone();
        round_trips(FieldType::Select, FieldValue::Select(label.clone()), &enums);
        round_trips(FieldType::RadioButton, FieldValue::RadioButton(label), &enums);
    }

    #[test]
    fn multiselect_round_trips(labels in enum_labels(), mask in any::<u8>()) {
        let enums: Vec<(i64, String)> = labels
            .iter()
            .enumerate()
            .map(|(i, l)| (i as i64 + 1, l.clone()))
            .collect();
        let picked: Vec<String> = labels
            .iter()
            .enumerate()
            .filter(|(i, _)| mask & (1 << (i % 8)) != 0)
            .map(|(_, l)| l.clone())
            .collect();
        prop_assume!(!picked.is_empty());
        round_trips(FieldType::MultiSelect, FieldValue::MultiSelect(picked), &enums);
    }

    #[test]
    fn multitext_round_trips(
        labels in enum_labels(),
        values in proptest::collection::vec("\\PC{1,20}", 1..5)
    ) {
        let enums: Vec<(i64, String)> = labels
            .iter()
            .enumerate()
            .map(|(i, l)| (i as i64 + 1, l.clone()))
            .collect();
        let map: BTreeMap<String, String> = labels
            .iter()
            .zip(values.iter())
            .map(|(l, v)| (l.clone(), v.clone()))
            .collect();
        round_trips(FieldType::MultiText, FieldValue::MultiText(map), &enums);
    }

    // Decoding arbitrary junk may fail but must never panic.
    #[test]
    fn decode_never_panics(raw in any::<i64>(), text in "\\PC*") {
        let m = meta(FieldType::Text, &[]);
        let wire = serde_json::json!([{"value": text}, {"value": raw}]);
        let _ = decode(FieldType::Text, Some(&wire), &m);
        let _ = decode(FieldType::Numeric, Some(&wire), &m);
        let _ = decode(FieldType::MultiText, Some(&wire), &m);
    }
}
