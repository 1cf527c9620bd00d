//! Packing of free-form tags into a single column value.

use bytes::BufMut;
use serde::ser::{Serialize, Serializer};

use crate::elements::Tag;

fn hstore_quote(out: &mut String, val: &str) {
    out.push('"');
    for c in val.chars() {
        match c {
            // the store strips raw newlines anyway
            '\n' => {}
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
    out.push('"');
}

/// `"k"=>"v", "k2"=>"v2"` in input order.
pub fn pack_hstore_text<'a, I>(tags: I) -> String
where
    I: IntoIterator<Item = &'a Tag>,
{
    let mut out = String::new();
    for (i, tag) in tags.into_iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        hstore_quote(&mut out, &tag.key);
        out.push_str("=>");
        hstore_quote(&mut out, &tag.val);
    }
    out
}

struct JsonTags<'a>(&'a [&'a Tag]);

impl Serialize for JsonTags<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.0.iter().map(|t| (t.key.as_str(), t.val.as_str())))
    }
}

/// JSON object text, keys in input order.
pub fn pack_json_text<'a, I>(tags: I) -> String
where
    I: IntoIterator<Item = &'a Tag>,
{
    let tags: Vec<&Tag> = tags.into_iter().collect();
    // Serializing string pairs into a String cannot fail.
    serde_json::to_string(&JsonTags(&tags)).unwrap_or_else(|_| "{}".to_string())
}

/// Binary `hstore` wire value: pair count, then length-prefixed key and
/// value for each pair. Null values are not representable.
pub fn pack_hstore_binary<'a, I>(tags: I) -> Vec<u8>
where
    I: IntoIterator<Item = &'a Tag>,
{
    let tags: Vec<&Tag> = tags.into_iter().collect();
    let len = 4 + tags
        .iter()
        .map(|t| 8 + t.key.len() + t.val.len())
        .sum::<usize>();

    let mut out = Vec::with_capacity(len);
    out.put_i32(tags.len() as i32);
    for tag in tags {
        out.put_i32(tag.key.len() as i32);
        out.put_slice(tag.key.as_bytes());
        out.put_i32(tag.val.len() as i32);
        out.put_slice(tag.val.as_bytes());
    }
    out
}
