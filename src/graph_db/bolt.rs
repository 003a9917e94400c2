//! Conversions from the crate's property model into Bolt parameter values.
//!
//! Neo4j property values are scalars or homogeneous lists; nested maps are
//! rejected upstream by [`crate::models::PropertyValue`].

use neo4rs::{BoltBoolean, BoltFloat, BoltInteger, BoltList, BoltMap, BoltString, BoltType};

use crate::models::PropertyValue;

pub(crate) fn bolt_string(value: &str) -> BoltType {
    BoltType::String(BoltString::from(value))
}

pub(crate) fn bolt_integer(value: i64) -> BoltType {
    BoltType::Integer(BoltInteger::new(value))
}

pub(crate) fn bolt_float(value: f64) -> BoltType {
    BoltType::Float(BoltFloat::new(value))
}

pub(crate) fn property_to_bolt(value: &PropertyValue) -> BoltType {
    match value {
        PropertyValue::String(s) => bolt_string(s),
        PropertyValue::Integer(i) => bolt_integer(*i),
        PropertyValue::Float(f) => bolt_float(*f),
        PropertyValue::Boolean(b) => BoltType::Boolean(BoltBoolean::new(*b)),
    }
}

pub(crate) fn string_list(values: &[String]) -> BoltType {
    let mut list = BoltList::new();
    for value in values {
        list.push(bolt_string(value));
    }
    BoltType::List(list)
}

pub(crate) fn float_list(values: &[f32]) -> BoltType {
    let mut list = BoltList::new();
    for value in values {
        list.push(bolt_float(*value as f64));
    }
    BoltType::List(list)
}

pub(crate) fn map_list(maps: Vec<BoltMap>) -> BoltType {
    let mut list = BoltList::new();
    for map in maps {
        list.push(BoltType::Map(map));
    }
    BoltType::List(list)
}
