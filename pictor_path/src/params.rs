use serde::{Deserialize, Serialize};

/// A single pipeline filter: a name plus its raw, unparsed argument tuple.
/// Argument interpretation belongs to the processor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Filter {
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub args: String,
}

impl Filter {
    pub fn new(name: impl Into<String>, args: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: args.into(),
        }
    }
}

/// A processing specification parsed from a request path.
///
/// `path` holds the raw spec portion exactly as received; it is the byte
/// string the URL signature covers. All other fields are derived from it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Params {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    #[serde(rename = "unsafe", skip_serializing_if = "is_false")]
    pub unsafe_mode: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub image: String,

    #[serde(skip_serializing_if = "is_false")]
    pub trim: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub trim_by: String,
    #[serde(skip_serializing_if = "is_zero_u32")]
    pub trim_tolerance: u32,

    #[serde(skip_serializing_if = "is_zero_f64")]
    pub crop_left: f64,
    #[serde(skip_serializing_if = "is_zero_f64")]
    pub crop_top: f64,
    #[serde(skip_serializing_if = "is_zero_f64")]
    pub crop_right: f64,
    #[serde(skip_serializing_if = "is_zero_f64")]
    pub crop_bottom: f64,

    #[serde(skip_serializing_if = "is_false")]
    pub fit_in: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub stretch: bool,

    #[serde(skip_serializing_if = "is_zero_i32")]
    pub width: i32,
    #[serde(skip_serializing_if = "is_zero_i32")]
    pub height: i32,

    #[serde(skip_serializing_if = "is_zero_i32")]
    pub padding_left: i32,
    #[serde(skip_serializing_if = "is_zero_i32")]
    pub padding_top: i32,
    #[serde(skip_serializing_if = "is_zero_i32")]
    pub padding_right: i32,
    #[serde(skip_serializing_if = "is_zero_i32")]
    pub padding_bottom: i32,

    #[serde(skip_serializing_if = "is_false")]
    pub h_flip: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub v_flip: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub h_align: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub v_align: String,
    #[serde(skip_serializing_if = "is_false")]
    pub smart: bool,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub filters: Vec<Filter>,
}

impl Params {
    /// True when a filter with the given name is present.
    pub fn has_filter(&self, name: &str) -> bool {
        self.filters.iter().any(|f| f.name == name)
    }
}

fn is_false(v: &bool) -> bool {
    !*v
}

fn is_zero_i32(v: &i32) -> bool {
    *v == 0
}

fn is_zero_u32(v: &u32) -> bool {
    *v == 0
}

fn is_zero_f64(v: &f64) -> bool {
    *v == 0.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_omits_defaults() {
        let params = Params {
            image: "foo.jpg".to_string(),
            width: 100,
            height: 200,
            ..Default::default()
        };
        let json = serde_json::to_value(&params).unwrap();
        assert_eq!(json["image"], "foo.jpg");
        assert_eq!(json["width"], 100);
        assert!(json.get("trim").is_none());
        assert!(json.get("filters").is_none());
    }

    #[test]
    fn test_unsafe_field_name() {
        let params = Params {
            unsafe_mode: true,
            image: "a.png".to_string(),
            ..Default::default()
        };
        let json = serde_json::to_value(&params).unwrap();
        assert_eq!(json["unsafe"], true);
    }
}
