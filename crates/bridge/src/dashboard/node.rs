//! Shape-tolerant accessors for loosely typed dashboard JSON.
//!
//! Every accessor fails closed: a missing key and a key holding the wrong
//! kind of value both read as `None`.

use serde_json::{Map, Value};

pub trait Node {
    fn field(&self, key: &str) -> Option<&Value>;

    fn str_field(&self, key: &str) -> Option<&str> {
        self.field(key).and_then(Value::as_str)
    }

    fn seq_field(&self, key: &str) -> Option<&[Value]> {
        self.field(key).and_then(Value::as_array).map(Vec::as_slice)
    }

    fn map_field(&self, key: &str) -> Option<&Map<String, Value>> {
        self.field(key).and_then(Value::as_object)
    }
}

impl Node for Value {
    fn field(&self, key: &str) -> Option<&Value> {
        self.as_object().and_then(|obj| obj.get(key))
    }
}

impl Node for Map<String, Value> {
    fn field(&self, key: &str) -> Option<&Value> {
        self.get(key)
    }
}
